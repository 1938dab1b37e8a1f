//! Callbacks into the USB stack above the driver

use crate::{device::DeviceRequests, endpoint::Endpoint};

/// Bus events that don't involve an endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    /// The host reset the bus; every transfer is gone
    Reset,
    /// The USB core couldn't access packet memory in time
    BufferOverflow,
    /// No-answer, CRC, bit stuffing or framing error. The hardware retries the
    /// transaction.
    BusError,
    Suspend,
    Wakeup,
}

/// Receives transfer completions, and moves data in and out of endpoints
///
/// The driver calls into the handler from the USB interrupt. Endpoint 0's stages
/// go to the `control_*` and `setup_*` methods, along with the device operations
/// a standard request dispatcher needs. Other endpoints' stages go to
/// [`out_stage_completed`](Handler::out_stage_completed) and
/// [`in_stage_completed`](Handler::in_stage_completed).
///
/// To respond, change the endpoint. Use [`Endpoint::begin_in`] to send data,
/// [`Endpoint::begin_out`] to receive data, and [`Endpoint::stall`] to refuse a
/// request. The driver writes the changes to hardware once the callback returns.
pub trait Handler {
    /// Endpoint 0 received a SETUP packet, available from [`Endpoint::setup`]
    fn setup_stage_completed(&mut self, ep0: &mut Endpoint, device: &mut dyn DeviceRequests);

    /// Endpoint 0 finished an OUT data stage, or the OUT status stage
    fn control_out_stage_completed(&mut self, ep0: &mut Endpoint, device: &mut dyn DeviceRequests);

    /// Endpoint 0 finished an IN data stage, or the IN status stage
    ///
    /// Commit a new device address here, once the SET_ADDRESS status stage is done.
    fn control_in_stage_completed(&mut self, ep0: &mut Endpoint, device: &mut dyn DeviceRequests);

    /// An OUT transfer ended with a short packet
    fn out_stage_completed(&mut self, ep: &mut Endpoint);

    /// An IN transfer sent all of its data
    fn in_stage_completed(&mut self, ep: &mut Endpoint);

    /// Consume a received packet
    ///
    /// Returns the number of bytes taken from `packet`.
    fn copy_from_endpoint(&mut self, ep: &Endpoint, packet: &[u8]) -> usize;

    /// Fill `packet` with the next IN packet
    ///
    /// `packet` is sized for the next packet, and the data belongs at transfer
    /// offset [`Endpoint::tx_sent`]. Returns the number of bytes written.
    fn copy_to_endpoint(&mut self, ep: &Endpoint, packet: &mut [u8]) -> usize;

    /// A bus event happened
    fn event(&mut self, event: Event) {
        let _ = event;
    }
}
