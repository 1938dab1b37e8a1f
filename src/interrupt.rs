//! Interrupt decoding

use crate::peripheral::Istr;
use usb_device::UsbDirection;

/// The interrupt category serviced by one driver call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt {
    /// The host reset the bus
    Reset,
    /// A transaction completed on endpoint `number`
    Transaction { number: u8, direction: UsbDirection },
    /// Packet memory overrun or underrun
    Overrun,
    BusError,
    Wakeup,
    Suspend,
}

/// Decode the highest priority interrupt in `istr`
///
/// Only one category is serviced per call. Returns `None` if no category that the
/// driver unmasks is pending.
pub fn decode(istr: Istr) -> Option<Interrupt> {
    if istr.contains(Istr::RESET) {
        Some(Interrupt::Reset)
    } else if istr.contains(Istr::CTR) {
        let direction = if istr.contains(Istr::DIR) {
            UsbDirection::Out
        } else {
            UsbDirection::In
        };
        Some(Interrupt::Transaction {
            number: (istr & Istr::IDN).bits() as u8,
            direction,
        })
    } else if istr.contains(Istr::PMAOVR) {
        Some(Interrupt::Overrun)
    } else if istr.contains(Istr::ERR) {
        Some(Interrupt::BusError)
    } else if istr.contains(Istr::WKUP) {
        Some(Interrupt::Wakeup)
    } else if istr.contains(Istr::SUSP) {
        Some(Interrupt::Suspend)
    } else {
        None
    }
}
