//! A USB device driver for the STM32H5 USB_DRD_FS peripheral
//!
//! `stm32h5-usbd` runs the device side of a full-speed USB link. It tracks the
//! device's enumeration state, lays out endpoint buffers in packet memory, and moves
//! control and data transfers through the endpoint registers. Request decoding and
//! class behavior stay outside of the driver. They're supplied through a [`Handler`].
//!
//! To interface the library, you must define a safe implementation of [`Peripherals`].
//! See the peripherals documentation for more information.
//!
//! Describe your device with a [`DeviceDescriptor`] tree, then create a [`Driver`].
//! Connect it, and call [`Driver::on_interrupt`] from the USB interrupt. Use a [`Bus`]
//! if you also need to start transfers from application context.
//!
//! Enable the `defmt-03` feature to log driver activity with `defmt`.

#![no_std]

// defmt's macros expand to `::defmt` paths.
#[cfg(feature = "defmt-03")]
extern crate defmt_03 as defmt;

#[macro_use]
mod log;

mod buffer;
mod bus;
mod descriptor;
mod device;
mod driver;
mod endpoint;
mod handler;
mod interrupt;
mod lifecycle;
mod peripheral;
mod pma;
mod ral;
mod registry;
mod request;
mod shadow;
mod transaction;

#[cfg(test)]
mod sim;

pub use bus::Bus;
pub use descriptor::{
    ConfigurationDescriptor, DeviceDescriptor, EndpointDescriptor, InterfaceDescriptor,
    TransferType,
};
pub use device::{ConfigurationHook, DeviceRequests, DeviceState, UnknownConfiguration};
pub use driver::Driver;
pub use endpoint::{Endpoint, InAction, Kind, Status};
pub use handler::{Event, Handler};
pub use interrupt::Interrupt;
pub use peripheral::{Bcdr, Cntr, Daddr, Istr, Register, RegisterFile};
pub use ral::Instances;
pub use request::{SetupPacket, SETUP_PACKET_LEN};
pub use transaction::Stage;

/// Endpoint numbers 0 through 7
const ENDPOINT_COUNT: usize = 8;

/// The largest packet that any endpoint may declare
///
/// Full speed control, bulk and interrupt endpoints never exceed this.
pub const MAX_PACKET_SIZE: usize = 64;

/// A type that owns the USB_DRD_FS register block and its packet memory
///
/// # Safety
///
/// `Peripherals` should only be implemented on a type that owns the USB register
/// block and the USB SRAM. The pointers returned by the methods are assumed to be
/// valid, and will be cast to register definitions.
///
/// # Example
///
/// A safe implementation of `Peripherals` that uses a PAC's singletons. Assume that
/// `pac` is shorthand for your device crate.
///
/// ```
/// # mod pac {
/// #   pub struct USB; impl USB { pub const PTR: *const () = 0x4001_6000 as *const (); }
/// #   pub struct USBSRAM; impl USBSRAM { pub const PTR: *const () = 0x4001_6400 as *const (); }
/// #   pub struct Peripherals { pub USB: USB, pub USBSRAM: USBSRAM }
/// #   impl Peripherals { pub fn take() -> Option<Self> { Some(Peripherals { USB, USBSRAM }) } }
/// # }
/// use stm32h5_usbd::Peripherals;
///
/// struct Usb {
///     _usb: pac::USB,
///     _sram: pac::USBSRAM,
/// }
///
/// unsafe impl Peripherals for Usb {
///     fn usb(&self) -> *const () {
///         pac::USB::PTR
///     }
///     fn sram(&self) -> *const () {
///         pac::USBSRAM::PTR
///     }
/// }
///
/// let p = pac::Peripherals::take().unwrap();
/// let usb = Usb {
///     _usb: p.USB,
///     _sram: p.USBSRAM,
/// };
/// assert_eq!(usb.usb(), 0x4001_6000 as *const ());
/// ```
pub unsafe trait Peripherals {
    /// Returns the address of the USB_DRD_FS registers
    fn usb(&self) -> *const ();
    /// Returns the address of the USB packet memory
    fn sram(&self) -> *const ();
}
