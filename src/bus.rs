//! Interrupt-safe access to a driver
//!
//! A [`Driver`] is serviced from the USB interrupt, and transfers start from
//! application context. `Bus` lets both sides share one driver. Every access runs
//! in a critical section, so the interrupt never observes a half-finished change.

use crate::{
    descriptor::DeviceDescriptor,
    device::{ConfigurationHook, DeviceState, UnknownConfiguration},
    driver::Driver,
    handler::Handler,
    interrupt::Interrupt,
    peripheral::RegisterFile,
    ral,
};
use core::cell::RefCell;
use cortex_m::interrupt::{self, Mutex};
use usb_device::endpoint::EndpointAddress;

/// A [`Driver`] that can live in a `static`
///
/// ```no_run
/// use stm32h5_usbd::{Bus, DeviceDescriptor, Driver, Peripherals};
/// # struct Usb; unsafe impl Peripherals for Usb {
/// #     fn usb(&self) -> *const () { 0x4001_6000 as *const () }
/// #     fn sram(&self) -> *const () { 0x4001_6400 as *const () }
/// # }
/// # static DEVICE: DeviceDescriptor = DeviceDescriptor {
/// #     usb_version: 0x0200, class: 0, sub_class: 0, protocol: 0, max_packet_size_0: 64,
/// #     vendor_id: 0x1209, product_id: 0x0001, device_release: 0x0100, manufacturer: 0,
/// #     product: 0, serial_number: 0, configurations: &[], language_ids: &[], strings: &[],
/// # };
///
/// let bus = Bus::new(Driver::new(Usb, &DEVICE, ()));
/// bus.connect();
/// ```
pub struct Bus<R = ral::Instances, C = ()> {
    driver: Mutex<RefCell<Driver<R, C>>>,
}

impl<R: RegisterFile, C: ConfigurationHook> Bus<R, C> {
    /// Share a driver
    ///
    /// The driver may be connected before, or after, it's shared.
    pub const fn new(driver: Driver<R, C>) -> Self {
        Bus {
            driver: Mutex::new(RefCell::new(driver)),
        }
    }

    /// Interrupt-safe, immutable access to the driver
    pub fn with_driver<T>(&self, func: impl FnOnce(&Driver<R, C>) -> T) -> T {
        interrupt::free(|cs| {
            let driver = self.driver.borrow(cs);
            let driver = driver.borrow();
            func(&driver)
        })
    }

    /// Interrupt-safe, mutable access to the driver
    pub fn with_driver_mut<T>(&self, func: impl FnOnce(&mut Driver<R, C>) -> T) -> T {
        interrupt::free(|cs| {
            let driver = self.driver.borrow(cs);
            let mut driver = driver.borrow_mut();
            func(&mut driver)
        })
    }

    pub fn connect(&self) {
        self.with_driver_mut(|driver| driver.connect())
    }

    pub fn disconnect(&self) {
        self.with_driver_mut(|driver| driver.disconnect())
    }

    /// Call from the USB interrupt; see [`Driver::on_interrupt`]
    pub fn on_interrupt<H: Handler + ?Sized>(&self, handler: &mut H) -> Interrupt {
        self.with_driver_mut(|driver| driver.on_interrupt(handler))
    }

    /// See [`Driver::transmit`]
    pub fn transmit<H: Handler + ?Sized>(
        &self,
        address: EndpointAddress,
        total: usize,
        expected: Option<usize>,
        handler: &mut H,
    ) -> usb_device::Result<()> {
        self.with_driver_mut(|driver| driver.transmit(address, total, expected, handler))
    }

    /// See [`Driver::receive`]
    pub fn receive(&self, address: EndpointAddress) -> usb_device::Result<()> {
        self.with_driver_mut(|driver| driver.receive(address))
    }

    pub fn set_configuration_value(&self, value: u8) -> Result<(), UnknownConfiguration> {
        self.with_driver_mut(|driver| driver.set_configuration_value(value))
    }

    pub fn state(&self) -> DeviceState {
        self.with_driver(|driver| driver.state())
    }

    pub fn is_suspended(&self) -> bool {
        self.with_driver(|driver| driver.is_suspended())
    }

    pub fn device_descriptor(&self) -> &'static DeviceDescriptor {
        self.with_driver(|driver| driver.device_descriptor())
    }
}
