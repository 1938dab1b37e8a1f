//! Register file capability
//!
//! The state machine and transaction engine never touch memory-mapped registers
//! directly. They go through a [`RegisterFile`], which is implemented for the real
//! peripheral by [`Instances`](crate::Instances), and by a simulated register
//! file in this crate's tests.

use bitflags::bitflags;

/// A `USB_DRD_FS` register
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Register {
    /// Channel / endpoint register `CHEPnR`, `n` in 0..8
    Chep(u8),
    /// Control register
    Cntr,
    /// Interrupt status register
    Istr,
    /// Frame number register
    Fnr,
    /// Device address register
    Daddr,
    /// LPM control and status register
    Lpmcsr,
    /// Battery charging detector register
    Bcdr,
}

/// Access to the USB registers and the USB packet memory
///
/// Methods take `&self`, like volatile register access. Implementations are
/// expected to reproduce the hardware's write semantics: toggle bits in `CHEPnR`,
/// and clear-by-writing-zero flags in `ISTR`.
pub trait RegisterFile {
    /// Read a register
    fn read(&self, register: Register) -> u32;
    /// Write a register
    fn write(&self, register: Register, value: u32);
    /// Read a word of packet memory
    ///
    /// `offset` is a byte offset into packet memory, and it's always word aligned.
    fn read_sram(&self, offset: usize) -> u32;
    /// Write a word of packet memory
    ///
    /// `offset` is a byte offset into packet memory, and it's always word aligned.
    fn write_sram(&self, offset: usize, value: u32);

    /// Set `bits` with a read-modify-write
    fn set_bits(&self, register: Register, bits: u32) {
        self.write(register, self.read(register) | bits);
    }

    /// Clear `bits` with a read-modify-write
    fn clear_bits(&self, register: Register, bits: u32) {
        self.write(register, self.read(register) & !bits);
    }

    /// Acknowledge `flags` in a register whose flags clear when written with zero
    ///
    /// Writes ones everywhere else, so flags that are raised between a read and
    /// this write are not lost.
    fn clear_flags(&self, register: Register, flags: u32) {
        self.write(register, !flags);
    }
}

bitflags! {
    /// `ISTR` bits
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Istr : u32 {
        /// Endpoint identifier of the last completed transaction
        const IDN = 0xF;
        /// Direction of the last completed transaction; set for OUT / SETUP
        const DIR = 1 << 4;
        const L1REQ = 1 << 7;
        const ESOF = 1 << 8;
        const SOF = 1 << 9;
        /// USB reset request (RST_DCON)
        const RESET = 1 << 10;
        const SUSP = 1 << 11;
        const WKUP = 1 << 12;
        /// NANS, CRC, BST or FVIO error
        const ERR = 1 << 13;
        /// Packet memory overrun / underrun
        const PMAOVR = 1 << 14;
        /// Correct transfer; read only
        const CTR = 1 << 15;
        const THR512 = 1 << 16;
        const DDISC = 1 << 17;
    }
}

bitflags! {
    /// `CNTR` bits
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Cntr : u32 {
        /// Hold the USB core in reset
        const USBRST = 1 << 0;
        const PDWN = 1 << 1;
        /// Ready to suspend; removes static power from the transceiver
        const SUSPRDY = 1 << 2;
        /// Suspend state enable; suspend is no longer checked while set
        const SUSPEN = 1 << 3;
        const L2RES = 1 << 4;
        const L1RES = 1 << 5;
        const L1REQM = 1 << 7;
        const ESOFM = 1 << 8;
        const SOFM = 1 << 9;
        const RESETM = 1 << 10;
        const SUSPM = 1 << 11;
        const WKUPM = 1 << 12;
        const ERRM = 1 << 13;
        const PMAOVRM = 1 << 14;
        const CTRM = 1 << 15;
        const THR512M = 1 << 16;
        const DDISCM = 1 << 17;
        /// Host mode
        const HOST = 1 << 31;
    }
}

bitflags! {
    /// `DADDR` bits
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Daddr : u32 {
        /// Device address
        const ADD = 0x7F;
        /// Enable function
        const EF = 1 << 7;
    }
}

bitflags! {
    /// `BCDR` bits
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Bcdr : u32 {
        const BCDEN = 1 << 0;
        /// D+ pull-up, in device mode
        const DPPU = 1 << 15;
    }
}

impl Cntr {
    /// The interrupt categories the driver services
    ///
    /// Keep this in sync with [`decode()`](crate::interrupt::decode).
    pub const SERVICED: Cntr = Cntr::RESETM
        .union(Cntr::CTRM)
        .union(Cntr::PMAOVRM)
        .union(Cntr::SUSPM)
        .union(Cntr::WKUPM)
        .union(Cntr::ERRM);
}
