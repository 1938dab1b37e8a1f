//! Endpoint lifecycle
//!
//! Endpoints are never allocated one at a time. Endpoint 0 is rebuilt on every bus
//! reset. Endpoints 1 through 7 are torn down and rebuilt, as a group, on every
//! configuration change. Both operations also lay out the endpoint buffers in
//! packet memory.

use crate::{
    buffer::Arena,
    descriptor::ConfigurationDescriptor,
    endpoint::{Endpoint, Status},
    peripheral::RegisterFile,
    pma,
    registry::{Endpoints, Registry},
};
use usb_device::UsbDirection;

/// Rebuilds the generic endpoints of a configuration
pub struct Lifecycle<'a, R: ?Sized> {
    regs: &'a R,
    endpoints: &'a mut Endpoints,
    arena: &'a mut Arena,
}

impl<'a, R: RegisterFile + ?Sized> Lifecycle<'a, R> {
    pub fn new(regs: &'a R, endpoints: &'a mut Endpoints, arena: &'a mut Arena) -> Self {
        Lifecycle {
            regs,
            endpoints,
            arena,
        }
    }

    pub fn regs(&self) -> &'a R {
        self.regs
    }

    /// Replace the generic endpoints with the endpoints of `config`
    ///
    /// Endpoint 0, and its buffer descriptors, are untouched. Endpoint buffers are
    /// laid out after endpoint 0's buffers, in declaration order.
    ///
    /// # Panics
    ///
    /// Panics if the configuration's endpoints don't fit in packet memory.
    pub fn recreate_endpoints(&mut self, config: &ConfigurationDescriptor) {
        pma::clear(self.regs, pma::txbd(1)..pma::BD_TABLE_SIZE);
        self.release_endpoints();
        self.arena.reset();

        for descriptor in config.endpoints() {
            let max_packet_size = descriptor.max_packet_size();
            let Some(buffer) = self.arena.allocate(max_packet_size) else {
                panic!(
                    "no packet memory for endpoint {:#x} in configuration {}",
                    descriptor.address, config.configuration_value
                );
            };
            let mut ep = Endpoint::generic(descriptor, buffer);
            ep.sync_to_reg(self.regs);
            debug!(
                "CREATED EP{} ADDRESS {:#x} BUFFER {} MPS {}",
                ep.number(),
                descriptor.address,
                buffer,
                max_packet_size
            );
            if let Some(_replaced) = self.endpoints.insert(ep) {
                warn!("DUPLICATE ENDPOINT {:#x}", descriptor.address);
            }
        }
    }

    /// Disable and drop every generic endpoint
    pub fn release_endpoints(&mut self) {
        for ep in self.endpoints.drain() {
            trace!("RELEASED EP{}", ep.number());
            ep.free(self.regs);
        }
    }
}

/// Rebuild endpoint 0 at the start of packet memory
///
/// The new endpoint waits for a SETUP, and stalls IN until the handler has a response.
///
/// # Panics
///
/// Panics if `max_packet_size` isn't one of the control endpoint sizes.
pub fn recreate_control<R: RegisterFile + ?Sized>(
    regs: &R,
    registry: &mut Registry,
    arena: &mut Arena,
    max_packet_size: usize,
) {
    assert!(
        matches!(max_packet_size, 8 | 16 | 32 | 64),
        "invalid control endpoint max packet size {}",
        max_packet_size
    );
    if let Some(ep) = registry.take_control() {
        ep.free(regs);
    }

    arena.rewind();
    let (Some(tx_buffer), Some(rx_buffer)) = (
        arena.allocate(max_packet_size),
        arena.allocate(max_packet_size),
    ) else {
        unreachable!("packet memory always fits endpoint 0");
    };
    arena.commit_base();

    let mut ep = Endpoint::control(max_packet_size, tx_buffer, rx_buffer);
    ep.begin_out();
    ep.set_status(UsbDirection::In, Status::Stall);
    ep.sync_to_reg(regs);
    registry.set_control(ep);
    debug!("CREATED EP0 TX {} RX {}", tx_buffer, rx_buffer);
}
