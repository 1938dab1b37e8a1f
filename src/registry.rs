//! Endpoint registry
//!
//! Maps an endpoint number and direction to the endpoint that serves it. Endpoint 0
//! is a single control endpoint that serves both directions. Every other number
//! has an optional endpoint per direction.

use crate::endpoint::Endpoint;
use usb_device::UsbDirection;

/// Number of generic endpoint numbers, 1 through 7
const GENERIC_COUNT: usize = crate::ENDPOINT_COUNT - 1;

fn index(direction: UsbDirection) -> usize {
    (UsbDirection::In == direction) as usize
}

/// Endpoints 1 through 7
pub struct Endpoints([[Option<Endpoint>; 2]; GENERIC_COUNT]);

impl Endpoints {
    const fn new() -> Self {
        const PAIR: [Option<Endpoint>; 2] = [None, None];
        Endpoints([PAIR; GENERIC_COUNT])
    }

    fn slot(&self, number: u8) -> Option<&[Option<Endpoint>; 2]> {
        self.0.get(usize::from(number).checked_sub(1)?)
    }

    fn slot_mut(&mut self, number: u8) -> Option<&mut [Option<Endpoint>; 2]> {
        self.0.get_mut(usize::from(number).checked_sub(1)?)
    }

    pub fn get(&self, number: u8, direction: UsbDirection) -> Option<&Endpoint> {
        self.slot(number)?[index(direction)].as_ref()
    }

    pub fn get_mut(&mut self, number: u8, direction: UsbDirection) -> Option<&mut Endpoint> {
        self.slot_mut(number)?[index(direction)].as_mut()
    }

    /// Register a generic endpoint, returning the endpoint it replaces
    ///
    /// # Panics
    ///
    /// Panics if `ep` is a control endpoint.
    pub fn insert(&mut self, ep: Endpoint) -> Option<Endpoint> {
        let direction = ep.address().direction();
        assert!(!ep.is_control(), "endpoint 0 isn't a generic endpoint");
        let number = ep.number();
        let Some(slot) = self.slot_mut(number) else {
            panic!("endpoint number {} is out of range", number);
        };
        slot[index(direction)].replace(ep)
    }

    /// Remove every endpoint
    pub fn drain(&mut self) -> impl Iterator<Item = Endpoint> + '_ {
        self.0.iter_mut().flatten().filter_map(Option::take)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.0.iter().flatten().flatten()
    }
}

/// All endpoints of one controller
pub struct Registry {
    control: Option<Endpoint>,
    endpoints: Endpoints,
}

impl Registry {
    pub const fn new() -> Self {
        Registry {
            control: None,
            endpoints: Endpoints::new(),
        }
    }

    /// Look up the endpoint serving `number` in `direction`
    ///
    /// Endpoint 0 serves both directions.
    pub fn get(&self, number: u8, direction: UsbDirection) -> Option<&Endpoint> {
        if number == 0 {
            self.control.as_ref()
        } else {
            self.endpoints.get(number, direction)
        }
    }

    pub fn get_mut(&mut self, number: u8, direction: UsbDirection) -> Option<&mut Endpoint> {
        if number == 0 {
            self.control.as_mut()
        } else {
            self.endpoints.get_mut(number, direction)
        }
    }

    pub fn set_control(&mut self, ep: Endpoint) -> Option<Endpoint> {
        assert!(ep.is_control(), "endpoint {} isn't a control endpoint", ep.number());
        self.control.replace(ep)
    }

    pub fn take_control(&mut self) -> Option<Endpoint> {
        self.control.take()
    }

    /// Every registered endpoint, endpoint 0 first
    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.control.iter().chain(self.endpoints.iter())
    }

    /// Borrow the control endpoint and the generic endpoints separately
    pub fn split_mut(&mut self) -> (Option<&mut Endpoint>, &mut Endpoints) {
        (self.control.as_mut(), &mut self.endpoints)
    }

    pub fn endpoints_mut(&mut self) -> &mut Endpoints {
        &mut self.endpoints
    }

    /// Forget every endpoint without touching hardware
    pub fn clear(&mut self) {
        self.control = None;
        self.endpoints.drain().for_each(drop);
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
