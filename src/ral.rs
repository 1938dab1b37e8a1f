//! USB_DRD_FS register access layer
//!
//! A small, `ral-registers` flavored description of the USB register block and the
//! USB packet memory. It's shaped like the generated RALs: a `RegisterBlock` per
//! peripheral, and a module per register field with `offset`, `mask` and
//! enumerated values. That lets the `read_reg!`, `write_reg!` and `modify_reg!`
//! macros work on the hardware, and on the in-memory shadows used by endpoints.
//!
//! It also adds an enhancement for indexing endpoint registers by number.

#![allow(non_snake_case, non_upper_case_globals)]

pub use ral_registers::{modify_reg, read_reg, write_reg, RORegister, RWRegister};

use crate::peripheral::{Register, RegisterFile};

pub mod usb {
    use super::{RORegister, RWRegister};

    #[repr(C)]
    pub struct RegisterBlock {
        pub CHEP0R: RWRegister<u32>,
        pub CHEP1R: RWRegister<u32>,
        pub CHEP2R: RWRegister<u32>,
        pub CHEP3R: RWRegister<u32>,
        pub CHEP4R: RWRegister<u32>,
        pub CHEP5R: RWRegister<u32>,
        pub CHEP6R: RWRegister<u32>,
        pub CHEP7R: RWRegister<u32>,
        _reserved0: [u32; 8],
        pub CNTR: RWRegister<u32>,
        pub ISTR: RWRegister<u32>,
        pub FNR: RORegister<u32>,
        pub DADDR: RWRegister<u32>,
        _reserved1: [u32; 1],
        pub LPMCSR: RWRegister<u32>,
        pub BCDR: RWRegister<u32>,
    }

    /// Fields shared by all `CHEPnR` registers
    pub mod CHEPR {
        /// Endpoint address
        pub mod EA {
            pub const offset: u32 = 0;
            pub const mask: u32 = 0xF << offset;
            pub mod R {}
            pub mod W {}
            pub mod RW {}
        }
        /// Transmission status; toggles when written with 1
        pub mod STATTX {
            pub const offset: u32 = 4;
            pub const mask: u32 = 0b11 << offset;
            pub mod R {}
            pub mod W {}
            pub mod RW {
                pub const DISABLED: u32 = 0b00;
                pub const STALL: u32 = 0b01;
                pub const NAK: u32 = 0b10;
                pub const VALID: u32 = 0b11;
            }
        }
        /// Transmit data toggle; toggles when written with 1
        pub mod DTOGTX {
            pub const offset: u32 = 6;
            pub const mask: u32 = 1 << offset;
            pub mod R {}
            pub mod W {}
            pub mod RW {}
        }
        /// Valid transmission; cleared by writing 0
        pub mod VTTX {
            pub const offset: u32 = 7;
            pub const mask: u32 = 1 << offset;
            pub mod R {}
            pub mod W {}
            pub mod RW {}
        }
        pub mod EPKIND {
            pub const offset: u32 = 8;
            pub const mask: u32 = 1 << offset;
            pub mod R {}
            pub mod W {}
            pub mod RW {}
        }
        pub mod UTYPE {
            pub const offset: u32 = 9;
            pub const mask: u32 = 0b11 << offset;
            pub mod R {}
            pub mod W {}
            pub mod RW {
                pub const BULK: u32 = 0b00;
                pub const CONTROL: u32 = 0b01;
                pub const ISO: u32 = 0b10;
                pub const INTERRUPT: u32 = 0b11;
            }
        }
        /// The last completed reception was a SETUP; read only
        pub mod SETUP {
            pub const offset: u32 = 11;
            pub const mask: u32 = 1 << offset;
            pub mod R {}
            pub mod W {}
            pub mod RW {}
        }
        /// Reception status; toggles when written with 1
        pub mod STATRX {
            pub const offset: u32 = 12;
            pub const mask: u32 = 0b11 << offset;
            pub mod R {}
            pub mod W {}
            pub mod RW {
                pub const DISABLED: u32 = 0b00;
                pub const STALL: u32 = 0b01;
                pub const NAK: u32 = 0b10;
                pub const VALID: u32 = 0b11;
            }
        }
        /// Receive data toggle; toggles when written with 1
        pub mod DTOGRX {
            pub const offset: u32 = 14;
            pub const mask: u32 = 1 << offset;
            pub mod R {}
            pub mod W {}
            pub mod RW {}
        }
        /// Valid reception; cleared by writing 0
        pub mod VTRX {
            pub const offset: u32 = 15;
            pub const mask: u32 = 1 << offset;
            pub mod R {}
            pub mod W {}
            pub mod RW {}
        }
    }
}

pub mod sram {
    use super::RWRegister;

    /// USB packet memory, accessed one word at a time
    #[repr(C)]
    pub struct RegisterBlock {
        pub WORDS: [RWRegister<u32>; crate::pma::SRAM_SIZE / 4],
    }
}

/// The RAL API requires us to treat all endpoint registers as unique.
/// We can make it a little easier with this type and [`chep()`].
pub struct ChepRegister<'a> {
    pub CHEPR: &'a RWRegister<u32>,
}

pub fn chep(usb: &usb::RegisterBlock, endpoint: u8) -> ChepRegister<'_> {
    ChepRegister {
        CHEPR: match endpoint {
            0 => &usb.CHEP0R,
            1 => &usb.CHEP1R,
            2 => &usb.CHEP2R,
            3 => &usb.CHEP3R,
            4 => &usb.CHEP4R,
            5 => &usb.CHEP5R,
            6 => &usb.CHEP6R,
            7 => &usb.CHEP7R,
            _ => unreachable!("CHEPR register {} doesn't exist", endpoint),
        },
    }
}

/// The USB register block, and the USB packet memory
pub struct Instances {
    pub usb: &'static usb::RegisterBlock,
    pub sram: &'static sram::RegisterBlock,
}

// Safety: the `Peripherals` implementation owns the register blocks. Once moved
// into a driver, the driver is their only user.
unsafe impl Send for Instances {}

/// Converts the `Peripherals` addresses into register blocks
#[inline]
pub fn instances<P: crate::Peripherals>(peripherals: P) -> Instances {
    // Safety: the `Peripherals` contract says these pointers are valid for the
    // USB_DRD_FS register block and its packet memory.
    unsafe {
        Instances {
            usb: &*(peripherals.usb() as *const usb::RegisterBlock),
            sram: &*(peripherals.sram() as *const sram::RegisterBlock),
        }
    }
}

impl RegisterFile for Instances {
    fn read(&self, register: Register) -> u32 {
        match register {
            Register::Chep(n) => read_reg!(crate::ral::usb, &chep(self.usb, n), CHEPR),
            Register::Cntr => read_reg!(crate::ral::usb, self.usb, CNTR),
            Register::Istr => read_reg!(crate::ral::usb, self.usb, ISTR),
            Register::Fnr => read_reg!(crate::ral::usb, self.usb, FNR),
            Register::Daddr => read_reg!(crate::ral::usb, self.usb, DADDR),
            Register::Lpmcsr => read_reg!(crate::ral::usb, self.usb, LPMCSR),
            Register::Bcdr => read_reg!(crate::ral::usb, self.usb, BCDR),
        }
    }

    fn write(&self, register: Register, value: u32) {
        match register {
            Register::Chep(n) => write_reg!(crate::ral::usb, &chep(self.usb, n), CHEPR, value),
            Register::Cntr => write_reg!(crate::ral::usb, self.usb, CNTR, value),
            Register::Istr => write_reg!(crate::ral::usb, self.usb, ISTR, value),
            Register::Fnr => unreachable!("FNR is read only"),
            Register::Daddr => write_reg!(crate::ral::usb, self.usb, DADDR, value),
            Register::Lpmcsr => write_reg!(crate::ral::usb, self.usb, LPMCSR, value),
            Register::Bcdr => write_reg!(crate::ral::usb, self.usb, BCDR, value),
        }
    }

    fn read_sram(&self, offset: usize) -> u32 {
        self.sram.WORDS[offset / 4].read()
    }

    fn write_sram(&self, offset: usize, value: u32) {
        self.sram.WORDS[offset / 4].write(value)
    }
}
