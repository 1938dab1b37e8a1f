//! Endpoint buffers in packet memory

use crate::pma;

/// Packet memory arena for endpoint buffers
///
/// Buffers are handed out in ascending, word-aligned order. Endpoint 0's buffers
/// come first, right after the buffer descriptor table. Once they're laid out,
/// [`commit_base()`](Arena::commit_base) marks the start of the region that's
/// rebuilt on every configuration change.
pub struct Arena {
    base: usize,
    cursor: usize,
    end: usize,
}

impl Arena {
    /// Create an arena that spans all packet memory after the descriptor table
    pub const fn new() -> Self {
        Arena {
            base: pma::BD_TABLE_SIZE,
            cursor: pma::BD_TABLE_SIZE,
            end: pma::SRAM_SIZE,
        }
    }

    /// Forget every allocation, including endpoint 0's
    pub fn rewind(&mut self) {
        self.base = pma::BD_TABLE_SIZE;
        self.cursor = pma::BD_TABLE_SIZE;
    }

    /// Allocations made before this call survive [`reset()`](Arena::reset)
    pub fn commit_base(&mut self) {
        self.base = self.cursor;
    }

    /// Forget every allocation made since the last [`commit_base()`](Arena::commit_base)
    pub fn reset(&mut self) {
        self.cursor = self.base;
    }

    /// Allocates a buffer of `size` bytes
    ///
    /// Returns the buffer's word-aligned offset into packet memory, or `None` if
    /// there isn't enough memory left.
    pub fn allocate(&mut self, size: usize) -> Option<usize> {
        let address = self.cursor.checked_add(3)? & !3;
        let next = address.checked_add(size)?;
        if next > self.end {
            None
        } else {
            self.cursor = next;
            Some(address)
        }
    }

    /// Returns the offset of the next allocation, before alignment
    #[cfg(test)]
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}
