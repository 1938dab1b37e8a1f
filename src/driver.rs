//! USB driver
//!
//! The driver owns everything about one USB_DRD_FS controller: its registers, the
//! device state, the endpoints and the packet memory layout. Call
//! [`on_interrupt()`](Driver::on_interrupt) from the USB interrupt. It services one
//! interrupt category per call, and calls into your [`Handler`] as transfers
//! progress.
//!
//! The remaining methods are for application context. They must not race the
//! interrupt; mask the USB interrupt while calling them, or share the driver
//! through a [`Bus`](crate::Bus).

use crate::{
    buffer::Arena,
    descriptor::DeviceDescriptor,
    device::{
        ConfigurationHook, Device, DeviceControl, DeviceRequests, DeviceState, UnknownConfiguration,
    },
    endpoint::{Endpoint, Status},
    handler::{Event, Handler},
    interrupt::{self, Interrupt},
    lifecycle::{self, Lifecycle},
    peripheral::{Bcdr, Cntr, Istr, Register, RegisterFile},
    pma, ral,
    registry::Registry,
    transaction::{self, Stage},
    MAX_PACKET_SIZE,
};
use usb_device::{endpoint::EndpointAddress, UsbDirection, UsbError};

/// A USB device driver
///
/// After you create a `Driver`, [`connect()`](Driver::connect) it. The host resets
/// the bus, and the driver prepares endpoint 0 for enumeration. Endpoints of a
/// configuration exist once the host selects that configuration.
pub struct Driver<R = ral::Instances, C = ()> {
    regs: R,
    device: Device<C>,
    registry: Registry,
    arena: Arena,
}

impl<C: ConfigurationHook> Driver<ral::Instances, C> {
    /// Create a driver for the USB_DRD_FS peripheral
    ///
    /// Assumes that the USB kernel clock is running, and that the USB supply is
    /// valid. `descriptor` describes the device and its configurations. `hook` runs
    /// whenever the active configuration changes.
    pub fn new<P: crate::Peripherals>(
        peripherals: P,
        descriptor: &'static DeviceDescriptor,
        hook: C,
    ) -> Self {
        Self::with_registers(ral::instances(peripherals), descriptor, hook)
    }
}

impl<R: RegisterFile, C: ConfigurationHook> Driver<R, C> {
    /// Create a driver that uses any register file
    pub fn with_registers(regs: R, descriptor: &'static DeviceDescriptor, hook: C) -> Self {
        Driver {
            regs,
            device: Device::new(descriptor, hook),
            registry: Registry::new(),
            arena: Arena::new(),
        }
    }

    pub fn registers(&self) -> &R {
        &self.regs
    }

    /// Reset the controller, and signal the host that a device is attached
    ///
    /// Every endpoint and all packet memory is cleared. The six serviced interrupt
    /// categories are unmasked.
    pub fn connect(&mut self) {
        pma::clear(&self.regs, 0..pma::SRAM_SIZE);
        self.registry.clear();
        self.arena = Arena::new();

        self.regs.write(Register::Cntr, Cntr::USBRST.bits());
        self.regs.write(Register::Istr, 0);
        self.regs.write(Register::Bcdr, 0);
        self.regs.write(Register::Daddr, 0);

        self.regs.clear_bits(Register::Cntr, Cntr::HOST.bits());
        self.regs.set_bits(Register::Cntr, Cntr::SERVICED.bits());
        self.device.bus_reset(&self.regs);
        self.regs.clear_bits(Register::Cntr, Cntr::USBRST.bits());

        self.regs.set_bits(Register::Bcdr, Bcdr::DPPU.bits());
        debug!("CONNECT");
    }

    /// Detach from the host, and hold the controller in reset
    ///
    /// In-flight transfers are dropped, and the device returns to the Default state.
    pub fn disconnect(&mut self) {
        self.regs.clear_bits(Register::Bcdr, Bcdr::DPPU.bits());
        self.regs.set_bits(Register::Cntr, Cntr::USBRST.bits());
        self.registry.clear();
        self.device.bus_reset(&self.regs);
        debug!("DISCONNECT");
    }

    /// Handle a bus reset
    ///
    /// Every generic endpoint goes away, and endpoint 0 is rebuilt.
    fn bus_reset(&mut self) {
        self.device.bus_reset(&self.regs);
        Lifecycle::new(&self.regs, self.registry.endpoints_mut(), &mut self.arena)
            .release_endpoints();
        lifecycle::recreate_control(
            &self.regs,
            &mut self.registry,
            &mut self.arena,
            usize::from(self.device.descriptor().max_packet_size_0),
        );
        debug!("RESET");
    }

    fn requests(&mut self) -> DeviceControl<'_, R, C> {
        DeviceControl {
            device: &mut self.device,
            lifecycle: Lifecycle::new(&self.regs, self.registry.endpoints_mut(), &mut self.arena),
        }
    }

    pub fn state(&self) -> DeviceState {
        self.device.state()
    }

    pub fn address(&self) -> u8 {
        self.device.address()
    }

    pub fn is_suspended(&self) -> bool {
        self.device.is_suspended()
    }

    pub fn device_descriptor(&self) -> &'static DeviceDescriptor {
        self.device.descriptor()
    }

    /// See [`DeviceRequests::configuration_value`]
    pub fn configuration_value(&self) -> u8 {
        self.device.configuration_value()
    }

    /// See [`DeviceRequests::set_address`]
    pub fn set_address(&mut self, address: u8) {
        self.device.set_address(&self.regs, address)
    }

    /// See [`DeviceRequests::set_configuration_value`]
    pub fn set_configuration_value(&mut self, value: u8) -> Result<(), UnknownConfiguration> {
        self.requests().set_configuration_value(value)
    }

    /// Look up the endpoint that serves `address`
    pub fn endpoint(&self, address: EndpointAddress) -> Option<&Endpoint> {
        self.registry.get(address.index() as u8, address.direction())
    }

    /// Every endpoint that currently exists
    ///
    /// Endpoint 0 comes first, once the host has reset the bus.
    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.registry.iter()
    }

    /// Begin an IN transfer of `total` bytes
    ///
    /// The first packet is pulled from `handler` immediately. See
    /// [`Endpoint::begin_in`] for the meaning of `expected`.
    ///
    /// Returns `WouldBlock` if the endpoint is still sending, and `InvalidEndpoint`
    /// if there's no such IN endpoint.
    pub fn transmit<H: Handler + ?Sized>(
        &mut self,
        address: EndpointAddress,
        total: usize,
        expected: Option<usize>,
        handler: &mut H,
    ) -> usb_device::Result<()> {
        if address.direction() != UsbDirection::In {
            return Err(UsbError::InvalidEndpoint);
        }
        let ep = self
            .registry
            .get_mut(address.index() as u8, UsbDirection::In)
            .ok_or(UsbError::InvalidEndpoint)?;

        ep.sync_from_reg(&self.regs);
        if ep.tx_status() == Status::Valid {
            return Err(UsbError::WouldBlock);
        }
        ep.begin_in(total, expected);
        load_packet(&self.regs, ep, handler);
        ep.sync_to_reg(&self.regs);
        Ok(())
    }

    /// Accept the next OUT transfer
    ///
    /// Returns `WouldBlock` if the endpoint is already receiving, and
    /// `InvalidEndpoint` if there's no such OUT endpoint.
    pub fn receive(&mut self, address: EndpointAddress) -> usb_device::Result<()> {
        if address.direction() != UsbDirection::Out {
            return Err(UsbError::InvalidEndpoint);
        }
        let ep = self
            .registry
            .get_mut(address.index() as u8, UsbDirection::Out)
            .ok_or(UsbError::InvalidEndpoint)?;

        ep.sync_from_reg(&self.regs);
        if ep.rx_status() == Status::Valid {
            return Err(UsbError::WouldBlock);
        }
        ep.begin_out();
        ep.sync_to_reg(&self.regs);
        Ok(())
    }

    /// Service the highest priority USB interrupt
    ///
    /// Returns the category that was serviced.
    ///
    /// # Panics
    ///
    /// Panics if none of the serviced interrupt categories is pending, or if a
    /// transaction completed on an endpoint that doesn't exist. Either means that
    /// the driver and the hardware disagree.
    pub fn on_interrupt<H: Handler + ?Sized>(&mut self, handler: &mut H) -> Interrupt {
        let istr = Istr::from_bits_retain(self.regs.read(Register::Istr));
        let Some(interrupt) = interrupt::decode(istr) else {
            panic!("unexpected USB interrupt, ISTR {:#x}", istr.bits());
        };

        match interrupt {
            Interrupt::Reset => {
                self.regs
                    .clear_flags(Register::Istr, (Istr::RESET | Istr::SUSP).bits());
                self.bus_reset();
                handler.event(Event::Reset);
            }
            Interrupt::Transaction { number, direction } => {
                self.transaction(number, direction, handler)
            }
            Interrupt::Overrun => {
                self.regs.clear_flags(Register::Istr, Istr::PMAOVR.bits());
                warn!("PACKET MEMORY OVERRUN");
                handler.event(Event::BufferOverflow);
            }
            Interrupt::BusError => {
                self.regs.clear_flags(Register::Istr, Istr::ERR.bits());
                warn!("BUS ERROR");
                handler.event(Event::BusError);
            }
            Interrupt::Wakeup => {
                self.regs.clear_flags(Register::Istr, Istr::WKUP.bits());
                self.device.set_suspended(false);
                handler.event(Event::Wakeup);
                self.regs.clear_bits(Register::Cntr, Cntr::SUSPEN.bits());
                debug!("WAKEUP");
            }
            Interrupt::Suspend => {
                // Set before clearing the flag, so the condition isn't signaled again.
                self.regs.set_bits(Register::Cntr, Cntr::SUSPEN.bits());
                self.regs.clear_flags(Register::Istr, Istr::SUSP.bits());
                self.regs.set_bits(Register::Cntr, Cntr::SUSPRDY.bits());
                self.device.set_suspended(true);
                handler.event(Event::Suspend);
                debug!("SUSPEND");
            }
        }
        interrupt
    }

    fn transaction<H: Handler + ?Sized>(
        &mut self,
        number: u8,
        direction: UsbDirection,
        handler: &mut H,
    ) {
        trace!("TRANSACTION EP{} {=u8:#x}", number, direction as u8);
        if number == 0 {
            let (control, endpoints) = self.registry.split_mut();
            let Some(ep0) = control else {
                panic!("transaction on endpoint 0 before a bus reset");
            };
            let mut requests = DeviceControl {
                device: &mut self.device,
                lifecycle: Lifecycle::new(&self.regs, endpoints, &mut self.arena),
            };
            service(&self.regs, ep0, direction, handler, |handler, ep0, stage| {
                match stage {
                    Stage::Setup => handler.setup_stage_completed(ep0, &mut requests),
                    Stage::Out => handler.control_out_stage_completed(ep0, &mut requests),
                    Stage::In => handler.control_in_stage_completed(ep0, &mut requests),
                }
            });
        } else {
            let Some(ep) = self.registry.get_mut(number, direction) else {
                panic!("transaction on unknown endpoint {}", number);
            };
            service(&self.regs, ep, direction, handler, |handler, ep, stage| {
                match stage {
                    Stage::Out => handler.out_stage_completed(ep),
                    Stage::In => handler.in_stage_completed(ep),
                    Stage::Setup => unreachable!("SETUP on endpoint {}", ep.number()),
                }
            });
        }
    }
}

/// Carry one completed transaction through an endpoint
///
/// Loads the shadows, moves the received data or counts the sent data, runs the
/// completion logic, and calls `on_stage` if a stage finished. If the endpoint is
/// then ready to send, the next packet is loaded. Finally, the shadows go back to
/// hardware.
fn service<R, H, F>(
    regs: &R,
    ep: &mut Endpoint,
    direction: UsbDirection,
    handler: &mut H,
    on_stage: F,
) where
    R: RegisterFile + ?Sized,
    H: Handler + ?Sized,
    F: FnOnce(&mut H, &mut Endpoint, Stage),
{
    ep.sync_from_reg(regs);
    ep.track_direction(direction);

    match direction {
        UsbDirection::Out => {
            let mut packet = [0; MAX_PACKET_SIZE];
            let len = ep.rx_count().min(MAX_PACKET_SIZE);
            pma::read(regs, ep.rx_buffer(), &mut packet[..len]);
            if ep.is_setup() {
                ep.receive_setup(&packet[..len]);
            } else {
                let taken = handler.copy_from_endpoint(ep, &packet[..len]);
                ep.record_received(taken);
            }
        }
        UsbDirection::In => {
            let sent = ep.tx_count();
            ep.record_sent(sent);
        }
    }

    if let Some(stage) = transaction::complete(ep, regs) {
        on_stage(handler, ep, stage);
    }

    if ep.owns(UsbDirection::In) && ep.tx_status() == Status::Valid {
        load_packet(regs, ep, handler);
    }
    ep.sync_to_reg(regs);
}

/// Pull the next IN packet from the handler into packet memory
fn load_packet<R, H>(regs: &R, ep: &mut Endpoint, handler: &mut H)
where
    R: RegisterFile + ?Sized,
    H: Handler + ?Sized,
{
    let mut packet = [0; MAX_PACKET_SIZE];
    let len = ep.next_packet_len().min(MAX_PACKET_SIZE);
    let written = handler.copy_to_endpoint(ep, &mut packet[..len]).min(len);
    pma::write(regs, ep.tx_buffer(), &packet[..written]);
    ep.set_tx_count(written);
}
