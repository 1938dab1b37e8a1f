//! USB packet memory
//!
//! The packet memory is shared between software and the USB core. It starts with the
//! buffer descriptor table, one TX and one RX descriptor for each endpoint number.
//! Endpoint buffers follow the table.
//!
//! The memory only accepts 32-bit accesses. The copy routines in this module
//! respect that, padding any trailing partial word.

#![allow(non_snake_case, non_upper_case_globals)]

use core::ops::Range;

use crate::peripheral::RegisterFile;

/// Size of the packet memory, in bytes
pub const SRAM_SIZE: usize = 2048;
/// Size of the buffer descriptor table, in bytes
pub const BD_TABLE_SIZE: usize = 64;

/// Returns the offset of endpoint `number`'s TX buffer descriptor
pub const fn txbd(number: u8) -> usize {
    number as usize * 8
}

/// Returns the offset of endpoint `number`'s RX buffer descriptor
pub const fn rxbd(number: u8) -> usize {
    number as usize * 8 + 4
}

/// TX buffer descriptor fields
pub mod TXBD {
    /// Buffer offset in packet memory
    pub mod ADDR {
        pub const offset: u32 = 0;
        pub const mask: u32 = 0xFFFF << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
    /// Number of bytes to transmit
    pub mod COUNT {
        pub const offset: u32 = 16;
        pub const mask: u32 = 0x3FF << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
}

/// RX buffer descriptor fields
pub mod RXBD {
    pub use super::TXBD::ADDR;

    /// Number of bytes received; written by the USB core
    pub mod COUNT {
        pub const offset: u32 = 16;
        pub const mask: u32 = 0x3FF << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
    /// Number of allocated memory blocks
    pub mod NUM_BLOCK {
        pub const offset: u32 = 26;
        pub const mask: u32 = 0x1F << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
    /// Block size
    pub mod BLSIZE {
        pub const offset: u32 = 31;
        pub const mask: u32 = 1 << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {
            /// Two byte blocks
            pub const BYTES_2: u32 = 0;
            /// 32 byte blocks
            pub const BYTES_32: u32 = 1;
        }
    }
}

/// Describe an RX buffer of `max_packet_size` in memory blocks
///
/// Returns the `(BLSIZE, NUM_BLOCK)` field values.
pub const fn rx_blocks(max_packet_size: usize) -> (u32, u32) {
    if max_packet_size <= 62 {
        (RXBD::BLSIZE::RW::BYTES_2, max_packet_size.div_ceil(2) as u32)
    } else {
        // NUM_BLOCK == 0 means one 32 byte block.
        (
            RXBD::BLSIZE::RW::BYTES_32,
            (max_packet_size.div_ceil(32) - 1) as u32,
        )
    }
}

/// Copy `buffer.len()` bytes out of packet memory, starting at `address`
///
/// # Panics
///
/// Panics if `address` isn't word aligned.
pub fn read<R: RegisterFile + ?Sized>(regs: &R, address: usize, buffer: &mut [u8]) {
    assert!(address % 4 == 0, "unaligned packet memory address {}", address);
    for (idx, chunk) in buffer.chunks_mut(4).enumerate() {
        let word = regs.read_sram(address + idx * 4).to_le_bytes();
        chunk.copy_from_slice(&word[..chunk.len()]);
    }
}

/// Copy `data` into packet memory, starting at `address`
///
/// A trailing partial word is padded with zeros.
///
/// # Panics
///
/// Panics if `address` isn't word aligned.
pub fn write<R: RegisterFile + ?Sized>(regs: &R, address: usize, data: &[u8]) {
    assert!(address % 4 == 0, "unaligned packet memory address {}", address);
    for (idx, chunk) in data.chunks(4).enumerate() {
        let mut word = [0; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        regs.write_sram(address + idx * 4, u32::from_le_bytes(word));
    }
}

/// Zero a word-aligned range of packet memory
pub fn clear<R: RegisterFile + ?Sized>(regs: &R, range: Range<usize>) {
    debug_assert!(range.start % 4 == 0 && range.end % 4 == 0);
    for offset in range.step_by(4) {
        regs.write_sram(offset, 0);
    }
}
