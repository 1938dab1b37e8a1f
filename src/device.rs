//! USB device state machine
//!
//! Tracks enumeration through the Default, Address and Configured states. Suspend
//! is tracked separately; a suspended device keeps its enumeration state.

use crate::{
    descriptor::DeviceDescriptor,
    lifecycle::Lifecycle,
    peripheral::{Daddr, Register, RegisterFile},
};

/// USB device enumeration state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceState {
    /// Reset, responding at address 0
    Default,
    /// Addressed by the host, but not configured
    Address,
    /// A configuration is active
    Configured,
}

/// No configuration descriptor has the requested `bConfigurationValue`
///
/// Answer the request with a STALL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnknownConfiguration(pub u8);

/// Runs when a configuration becomes active
///
/// Use this to initialize the class that the configuration describes.
pub trait ConfigurationHook {
    /// Activate configuration `value`, or deactivate the current configuration when
    /// `value` is 0
    fn activate(&mut self, value: u8);
}

impl ConfigurationHook for () {
    fn activate(&mut self, _: u8) {}
}

/// The device-level operations available while handling endpoint 0
///
/// See [`Handler`](crate::Handler).
pub trait DeviceRequests {
    fn state(&self) -> DeviceState;

    /// The committed device address
    fn address(&self) -> u8;

    /// Commit a new device address to hardware
    ///
    /// Call this after the SET_ADDRESS status stage completes.
    ///
    /// # Panics
    ///
    /// Panics if the device is configured, or if `address` is larger than 127.
    fn set_address(&mut self, address: u8);

    /// The active configuration value; 0 if the device is addressed
    ///
    /// # Panics
    ///
    /// Panics if the device isn't addressed or configured.
    fn configuration_value(&self) -> u8;

    /// Select configuration `value`, or deconfigure the device if `value` is 0
    ///
    /// On success, the endpoints of the new configuration replace the previous
    /// configuration's endpoints.
    ///
    /// # Panics
    ///
    /// Panics if the device isn't addressed or configured.
    fn set_configuration_value(&mut self, value: u8) -> Result<(), UnknownConfiguration>;

    /// The descriptor tree that describes this device
    fn device_descriptor(&self) -> &'static DeviceDescriptor;
}

/// Device state
pub struct Device<C> {
    descriptor: &'static DeviceDescriptor,
    state: DeviceState,
    address: u8,
    configuration: u8,
    suspended: bool,
    hook: C,
}

impl<C: ConfigurationHook> Device<C> {
    pub const fn new(descriptor: &'static DeviceDescriptor, hook: C) -> Self {
        Device {
            descriptor,
            state: DeviceState::Default,
            address: 0,
            configuration: 0,
            suspended: false,
            hook,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn descriptor(&self) -> &'static DeviceDescriptor {
        self.descriptor
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub(crate) fn set_suspended(&mut self, suspended: bool) {
        self.suspended = suspended;
    }

    /// Return to the Default state, responding at address 0
    ///
    /// Deactivates the configuration, if there is one. This only resets the device
    /// state; the driver rebuilds the endpoints.
    pub fn bus_reset<R: RegisterFile + ?Sized>(&mut self, regs: &R) {
        regs.write(Register::Daddr, Daddr::EF.bits());
        self.state = DeviceState::Default;
        self.address = 0;
        self.suspended = false;
        if self.configuration != 0 {
            self.configuration = 0;
            self.hook.activate(0);
        }
    }

    /// See [`DeviceRequests::set_address`]
    pub fn set_address<R: RegisterFile + ?Sized>(&mut self, regs: &R, address: u8) {
        assert!(address <= 127, "invalid device address {}", address);
        assert!(
            matches!(self.state, DeviceState::Default | DeviceState::Address),
            "SET_ADDRESS in state {:?}",
            self.state
        );
        regs.write(
            Register::Daddr,
            (Daddr::EF | Daddr::from_bits_truncate(address.into())).bits(),
        );
        self.address = address;
        self.state = if address == 0 {
            DeviceState::Default
        } else {
            DeviceState::Address
        };
        debug!("ADDRESS {}", address);
    }

    /// See [`DeviceRequests::configuration_value`]
    pub fn configuration_value(&self) -> u8 {
        match self.state {
            DeviceState::Address => 0,
            DeviceState::Configured => {
                assert!(self.configuration != 0, "configured without a configuration");
                self.configuration
            }
            DeviceState::Default => panic!("configuration requested in the Default state"),
        }
    }

    /// See [`DeviceRequests::set_configuration_value`]
    pub fn set_configuration_value<R: RegisterFile + ?Sized>(
        &mut self,
        value: u8,
        lifecycle: &mut Lifecycle<'_, R>,
    ) -> Result<(), UnknownConfiguration> {
        match (self.state, value) {
            (DeviceState::Default, _) => {
                panic!("SET_CONFIGURATION in the Default state")
            }
            (DeviceState::Configured, 0) => {
                lifecycle.release_endpoints();
                self.configuration = 0;
                self.state = DeviceState::Address;
                self.hook.activate(0);
                debug!("DECONFIGURED");
                Ok(())
            }
            (DeviceState::Address, 0) => Ok(()),
            (_, value) => {
                self.try_change_configuration(value, lifecycle)?;
                self.state = DeviceState::Configured;
                Ok(())
            }
        }
    }

    /// Activate the configuration with `bConfigurationValue == value`
    ///
    /// Nothing changes if there's no such configuration.
    fn try_change_configuration<R: RegisterFile + ?Sized>(
        &mut self,
        value: u8,
        lifecycle: &mut Lifecycle<'_, R>,
    ) -> Result<(), UnknownConfiguration> {
        let Some(config) = self.descriptor.configuration(value) else {
            warn!("UNKNOWN CONFIGURATION {}", value);
            return Err(UnknownConfiguration(value));
        };
        self.hook.activate(value);
        self.configuration = value;
        lifecycle.recreate_endpoints(config);
        debug!("CONFIGURED {}", value);
        Ok(())
    }
}

/// A device, and what it needs to change configurations
///
/// This is the [`DeviceRequests`] implementation handed to endpoint 0 handlers.
pub struct DeviceControl<'a, R: ?Sized, C> {
    pub(crate) device: &'a mut Device<C>,
    pub(crate) lifecycle: Lifecycle<'a, R>,
}

impl<R: RegisterFile + ?Sized, C: ConfigurationHook> DeviceRequests for DeviceControl<'_, R, C> {
    fn state(&self) -> DeviceState {
        self.device.state()
    }

    fn address(&self) -> u8 {
        self.device.address()
    }

    fn set_address(&mut self, address: u8) {
        self.device.set_address(self.lifecycle.regs(), address)
    }

    fn configuration_value(&self) -> u8 {
        self.device.configuration_value()
    }

    fn set_configuration_value(&mut self, value: u8) -> Result<(), UnknownConfiguration> {
        self.device
            .set_configuration_value(value, &mut self.lifecycle)
    }

    fn device_descriptor(&self) -> &'static DeviceDescriptor {
        self.device.descriptor()
    }
}

#[cfg(test)]
mod tests {
    use super::{Device, DeviceState, UnknownConfiguration};
    use crate::buffer::Arena;
    use crate::descriptor::{
        tests::DEVICE, ConfigurationDescriptor, DeviceDescriptor, EndpointDescriptor,
        InterfaceDescriptor,
    };
    use crate::lifecycle::{recreate_control, Lifecycle};
    use crate::peripheral::{Register, RegisterFile};
    use crate::registry::Registry;
    use crate::sim::Simulator;
    use usb_device::UsbDirection;

    extern crate std;
    use std::vec::Vec;

    /// Records every configuration hook call
    type Hook = Vec<u8>;

    impl super::ConfigurationHook for Hook {
        fn activate(&mut self, value: u8) {
            self.push(value);
        }
    }

    /// Configuration 1 has a bulk IN and a bulk OUT endpoint. Configuration 2 has a
    /// single interrupt IN endpoint.
    static TWO_CONFIGURATIONS: DeviceDescriptor = DeviceDescriptor {
        usb_version: 0x0200,
        class: 0xFF,
        sub_class: 0,
        protocol: 0,
        max_packet_size_0: 64,
        vendor_id: 0x0483,
        product_id: 0x5740,
        device_release: 0x0100,
        manufacturer: 0,
        product: 0,
        serial_number: 0,
        configurations: &[
            ConfigurationDescriptor {
                configuration_value: 1,
                configuration: 0,
                attributes: 0x80,
                max_power: 50,
                interfaces: &[InterfaceDescriptor {
                    interface_number: 0,
                    alternate_setting: 0,
                    class: 0xFF,
                    sub_class: 0,
                    protocol: 0,
                    interface: 0,
                    endpoints: &[
                        EndpointDescriptor {
                            address: 0x81,
                            attributes: 0x02,
                            max_packet_size: 64,
                            interval: 0,
                        },
                        EndpointDescriptor {
                            address: 0x02,
                            attributes: 0x02,
                            max_packet_size: 32,
                            interval: 0,
                        },
                    ],
                }],
            },
            ConfigurationDescriptor {
                configuration_value: 2,
                configuration: 0,
                attributes: 0x80,
                max_power: 50,
                interfaces: &[InterfaceDescriptor {
                    interface_number: 0,
                    alternate_setting: 0,
                    class: 0xFF,
                    sub_class: 0,
                    protocol: 0,
                    interface: 0,
                    endpoints: &[EndpointDescriptor {
                        address: 0x83,
                        attributes: 0x03,
                        max_packet_size: 16,
                        interval: 1,
                    }],
                }],
            },
        ],
        language_ids: &[0x0409],
        strings: &[],
    };

    struct Fixture {
        sim: Simulator,
        registry: Registry,
        arena: Arena,
        device: Device<Hook>,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_descriptor(&DEVICE)
        }

        fn with_descriptor(descriptor: &'static DeviceDescriptor) -> Self {
            let mut fixture = Fixture {
                sim: Simulator::new(),
                registry: Registry::new(),
                arena: Arena::new(),
                device: Device::new(descriptor, Vec::new()),
            };
            recreate_control(&fixture.sim, &mut fixture.registry, &mut fixture.arena, 64);
            fixture.device.bus_reset(&fixture.sim);
            fixture
        }

        fn set_configuration_value(&mut self, value: u8) -> Result<(), UnknownConfiguration> {
            let (_, endpoints) = self.registry.split_mut();
            let mut lifecycle = Lifecycle::new(&self.sim, endpoints, &mut self.arena);
            self.device.set_configuration_value(value, &mut lifecycle)
        }

        fn daddr(&self) -> u32 {
            self.sim.read(Register::Daddr)
        }
    }

    #[test]
    fn set_address() {
        let mut fixture = Fixture::new();
        assert_eq!(fixture.daddr(), 0x80);

        for address in [5, 127, 1] {
            fixture.device.set_address(&fixture.sim, address);
            assert_eq!(fixture.device.state(), DeviceState::Address);
            assert_eq!(fixture.daddr(), 0x80 | address as u32);
        }

        fixture.device.set_address(&fixture.sim, 0);
        assert_eq!(fixture.device.state(), DeviceState::Default);
        assert_eq!(fixture.daddr(), 0x80);
    }

    #[test]
    #[should_panic]
    fn set_address_out_of_range() {
        let mut fixture = Fixture::new();
        fixture.device.set_address(&fixture.sim, 128);
    }

    #[test]
    #[should_panic]
    fn set_address_while_configured() {
        let mut fixture = Fixture::new();
        fixture.device.set_address(&fixture.sim, 5);
        fixture.set_configuration_value(1).unwrap();
        fixture.device.set_address(&fixture.sim, 6);
    }

    #[test]
    fn configure_and_deconfigure() {
        let mut fixture = Fixture::new();
        fixture.device.set_address(&fixture.sim, 5);
        assert_eq!(fixture.device.configuration_value(), 0);

        // Already unconfigured
        assert_eq!(fixture.set_configuration_value(0), Ok(()));
        assert_eq!(fixture.device.state(), DeviceState::Address);
        assert!(fixture.device.hook.is_empty());

        assert_eq!(fixture.set_configuration_value(1), Ok(()));
        assert_eq!(fixture.device.state(), DeviceState::Configured);
        assert_eq!(fixture.device.configuration_value(), 1);
        assert!(fixture.registry.get(1, UsbDirection::In).is_some());

        // Reselecting the active configuration rebuilds its endpoints
        assert_eq!(fixture.set_configuration_value(1), Ok(()));
        assert_eq!(fixture.device.state(), DeviceState::Configured);

        assert_eq!(fixture.set_configuration_value(0), Ok(()));
        assert_eq!(fixture.device.state(), DeviceState::Address);
        assert_eq!(fixture.device.configuration_value(), 0);
        assert!(fixture.registry.get(1, UsbDirection::In).is_none());
        assert_eq!(fixture.device.hook, [1, 1, 0]);
    }

    #[test]
    fn switch_between_configurations() {
        let mut fixture = Fixture::with_descriptor(&TWO_CONFIGURATIONS);
        fixture.device.set_address(&fixture.sim, 5);

        fixture.set_configuration_value(1).unwrap();
        assert!(fixture.registry.get(1, UsbDirection::In).is_some());
        assert!(fixture.registry.get(2, UsbDirection::Out).is_some());

        assert_eq!(fixture.set_configuration_value(2), Ok(()));
        assert_eq!(fixture.device.state(), DeviceState::Configured);
        assert_eq!(fixture.device.configuration_value(), 2);
        assert!(fixture.registry.get(1, UsbDirection::In).is_none());
        assert!(fixture.registry.get(2, UsbDirection::Out).is_none());
        assert!(fixture.registry.get(3, UsbDirection::In).is_some());
        assert_eq!(fixture.device.hook, [1, 2]);
    }

    #[test]
    fn unknown_configuration_changes_nothing() {
        let mut fixture = Fixture::new();
        fixture.device.set_address(&fixture.sim, 5);
        assert_eq!(
            fixture.set_configuration_value(9),
            Err(UnknownConfiguration(9))
        );
        assert_eq!(fixture.device.state(), DeviceState::Address);
        assert_eq!(fixture.device.configuration_value(), 0);

        fixture.set_configuration_value(1).unwrap();
        assert_eq!(
            fixture.set_configuration_value(9),
            Err(UnknownConfiguration(9))
        );
        assert_eq!(fixture.device.state(), DeviceState::Configured);
        assert_eq!(fixture.device.configuration_value(), 1);
        assert!(fixture.registry.get(1, UsbDirection::In).is_some());
        assert_eq!(fixture.device.hook, [1]);
    }

    #[test]
    #[should_panic]
    fn configuration_value_in_default_state() {
        let fixture = Fixture::new();
        fixture.device.configuration_value();
    }

    #[test]
    fn bus_reset_returns_to_default() {
        let mut fixture = Fixture::new();
        fixture.device.bus_reset(&fixture.sim);
        assert_eq!(fixture.device.state(), DeviceState::Default);
        assert_eq!(fixture.daddr(), 0x80);
        assert!(fixture.device.hook.is_empty());

        fixture.device.set_address(&fixture.sim, 5);
        fixture.set_configuration_value(1).unwrap();
        fixture.device.set_suspended(true);

        fixture.device.bus_reset(&fixture.sim);
        assert_eq!(fixture.device.state(), DeviceState::Default);
        assert_eq!(fixture.device.address(), 0);
        assert_eq!(fixture.daddr(), 0x80);
        assert!(!fixture.device.is_suspended());
        assert_eq!(fixture.device.hook, [1, 0]);

        // Addressable again, for hosts that enumerate twice
        fixture.device.set_address(&fixture.sim, 7);
        assert_eq!(fixture.daddr(), 0x87);
    }
}
