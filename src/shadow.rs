//! Register shadow that conforms to the RAL's register API
//!
//! Unlike the registers themselves, a shadow lives in ordinary memory. The driver
//! loads it from hardware, edits fields with `read_reg!` / `write_reg!` /
//! `modify_reg!`, then writes the result back out.

use core::cell::Cell;

#[repr(transparent)]
pub struct Shadow<T>(Cell<T>);

impl<T> Shadow<T> {
    pub const fn new(val: T) -> Self {
        Shadow(Cell::new(val))
    }
}

impl<T: Copy> Shadow<T> {
    pub fn read(&self) -> T {
        self.0.get()
    }
    pub fn write(&self, val: T) {
        self.0.set(val)
    }
}
