//! A simulated USB_DRD_FS register file, and a pretend host
//!
//! Registers follow the hardware's write semantics. `ISTR`'s CTR, DIR and IDN are
//! derived from the endpoint registers on every read, like the hardware does.

extern crate std;

use core::cell::Cell;
use std::vec::Vec;

use crate::endpoint::Status;
use crate::peripheral::{Istr, Register, RegisterFile};
use crate::pma;

pub const STATTX_MASK: u32 = 0b11 << 4;
pub const DTOGTX: u32 = 1 << 6;
pub const VTTX: u32 = 1 << 7;
pub const UTYPE_MASK: u32 = 0b11 << 9;
pub const SETUP: u32 = 1 << 11;
pub const STATRX_MASK: u32 = 0b11 << 12;
pub const DTOGRX: u32 = 1 << 14;
pub const VTRX: u32 = 1 << 15;

const CHEPR_TOGGLE: u32 = STATTX_MASK | DTOGTX | STATRX_MASK | DTOGRX;
const CHEPR_RC_W0: u32 = VTTX | VTRX;
const CHEPR_RO: u32 = SETUP;

const NAK: u32 = 0b10;

pub struct Simulator {
    chep: [Cell<u32>; crate::ENDPOINT_COUNT],
    cntr: Cell<u32>,
    istr: Cell<u32>,
    fnr: Cell<u32>,
    daddr: Cell<u32>,
    lpmcsr: Cell<u32>,
    bcdr: Cell<u32>,
    sram: [Cell<u32>; pma::SRAM_SIZE / 4],
}

impl Simulator {
    pub fn new() -> Self {
        Simulator {
            chep: Default::default(),
            cntr: Cell::new(0),
            istr: Cell::new(0),
            fnr: Cell::new(0),
            daddr: Cell::new(0),
            lpmcsr: Cell::new(0),
            bcdr: Cell::new(0),
            sram: core::array::from_fn(|_| Cell::new(0)),
        }
    }

    fn cell(&self, register: Register) -> &Cell<u32> {
        match register {
            Register::Chep(n) => &self.chep[n as usize],
            Register::Cntr => &self.cntr,
            Register::Istr => &self.istr,
            Register::Fnr => &self.fnr,
            Register::Daddr => &self.daddr,
            Register::Lpmcsr => &self.lpmcsr,
            Register::Bcdr => &self.bcdr,
        }
    }

    /// Set a register without any write semantics
    pub fn force(&self, register: Register, value: u32) {
        self.cell(register).set(value);
    }

    /// Raise interrupt flags in `ISTR`
    pub fn raise(&self, flags: Istr) {
        self.istr.set(self.istr.get() | flags.bits());
    }

    pub fn stat_rx(&self, number: u8) -> Status {
        Status::from_bits(self.chep[number as usize].get() >> 12)
    }

    pub fn stat_tx(&self, number: u8) -> Status {
        Status::from_bits(self.chep[number as usize].get() >> 4)
    }

    /// Packet memory offset and size of endpoint `number`'s RX buffer
    fn rx_buffer(&self, number: u8) -> (usize, usize) {
        let rxbd = self.read_sram(pma::rxbd(number));
        let num_block = ((rxbd >> 26) & 0x1F) as usize;
        let size = if rxbd >> 31 == 1 {
            (num_block + 1) * 32
        } else {
            num_block * 2
        };
        ((rxbd & 0xFFFF) as usize, size)
    }

    fn receive(&self, number: u8, data: &[u8], setup: bool) {
        let (address, size) = self.rx_buffer(number);
        assert!(data.len() <= size, "RX buffer overrun on endpoint {}", number);
        pma::write(self, address, data);

        let rxbd = self.read_sram(pma::rxbd(number));
        self.write_sram(
            pma::rxbd(number),
            (rxbd & !(0x3FF << 16)) | (data.len() as u32) << 16,
        );

        let chep = &self.chep[number as usize];
        let mut value = chep.get() | VTRX;
        value = (value & !STATRX_MASK) | NAK << 12;
        if setup {
            value = (value & !STATTX_MASK) | NAK << 4 | SETUP;
        } else {
            value = (value & !SETUP) ^ DTOGRX;
        }
        chep.set(value);
    }

    /// The host sends a SETUP packet to endpoint `number`
    ///
    /// SETUPs are always accepted. Both directions NAK afterwards.
    pub fn host_setup(&self, number: u8, packet: [u8; 8]) {
        self.receive(number, &packet, true);
    }

    /// The host sends an OUT packet to endpoint `number`
    ///
    /// # Panics
    ///
    /// Panics if the endpoint isn't ready to receive.
    pub fn host_out(&self, number: u8, data: &[u8]) {
        assert_eq!(
            self.stat_rx(number),
            Status::Valid,
            "endpoint {} isn't ready for OUT",
            number
        );
        self.receive(number, data, false);
    }

    /// The host sends an IN token to endpoint `number`, and returns the packet
    ///
    /// # Panics
    ///
    /// Panics if the endpoint isn't ready to transmit.
    pub fn host_in(&self, number: u8) -> Vec<u8> {
        assert_eq!(
            self.stat_tx(number),
            Status::Valid,
            "endpoint {} isn't ready for IN",
            number
        );
        let txbd = self.read_sram(pma::txbd(number));
        let address = (txbd & 0xFFFF) as usize;
        let count = ((txbd >> 16) & 0x3FF) as usize;
        let mut packet = std::vec![0; count];
        pma::read(self, address, &mut packet);

        let chep = &self.chep[number as usize];
        let value = ((chep.get() & !STATTX_MASK) | NAK << 4 | VTTX) ^ DTOGTX;
        chep.set(value);
        packet
    }
}

impl RegisterFile for Simulator {
    fn read(&self, register: Register) -> u32 {
        match register {
            Register::Istr => {
                let mut istr = self.istr.get() & !(Istr::CTR | Istr::DIR | Istr::IDN).bits();
                let pending = self.chep.iter().enumerate().find_map(|(n, chep)| {
                    let chep = chep.get();
                    (chep & (VTRX | VTTX) != 0).then_some((n as u32, chep & VTRX != 0))
                });
                if let Some((n, out)) = pending {
                    istr |= Istr::CTR.bits() | n;
                    if out {
                        istr |= Istr::DIR.bits();
                    }
                }
                istr
            }
            register => self.cell(register).get(),
        }
    }

    fn write(&self, register: Register, value: u32) {
        let cell = self.cell(register);
        let current = cell.get();
        match register {
            Register::Chep(_) => cell.set(
                (value & !(CHEPR_TOGGLE | CHEPR_RC_W0 | CHEPR_RO))
                    | ((current ^ value) & CHEPR_TOGGLE)
                    | (current & value & CHEPR_RC_W0)
                    | (current & CHEPR_RO),
            ),
            Register::Istr => {
                let ro = (Istr::CTR | Istr::DIR | Istr::IDN).bits();
                cell.set(current & value & !ro)
            }
            _ => cell.set(value),
        }
    }

    fn read_sram(&self, offset: usize) -> u32 {
        assert!(offset % 4 == 0);
        self.sram[offset / 4].get()
    }

    fn write_sram(&self, offset: usize, value: u32) {
        assert!(offset % 4 == 0);
        self.sram[offset / 4].set(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chepr_write_semantics() {
        let sim = Simulator::new();
        sim.force(Register::Chep(1), VTRX | VTTX | SETUP | NAK << 12);
        // Toggle STATRX from NAK to VALID, clear VTRX, keep VTTX, try to clear SETUP
        sim.write(Register::Chep(1), 1 | 0b01 << 12 | VTTX);
        let chep = sim.read(Register::Chep(1));
        assert_eq!(chep & 0xF, 1);
        assert_eq!(sim.stat_rx(1), Status::Valid);
        assert_eq!(chep & (VTRX | VTTX | SETUP), VTTX | SETUP);
    }

    #[test]
    fn istr_derives_transactions() {
        let sim = Simulator::new();
        sim.raise(Istr::SUSP | Istr::WKUP);
        sim.force(Register::Chep(3), VTRX);
        let istr = Istr::from_bits_retain(sim.read(Register::Istr));
        assert!(istr.contains(Istr::CTR | Istr::DIR | Istr::SUSP | Istr::WKUP));
        assert_eq!((istr & Istr::IDN).bits(), 3);

        sim.clear_flags(Register::Istr, Istr::SUSP.bits());
        let istr = Istr::from_bits_retain(sim.read(Register::Istr));
        assert!(!istr.contains(Istr::SUSP));
        assert!(istr.contains(Istr::WKUP));
    }
}
