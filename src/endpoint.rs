//! Endpoints, and their register shadows
//!
//! An endpoint never edits `CHEPnR` or its buffer descriptors in place. The driver
//! loads the hardware state into shadows with [`Endpoint::sync_from_reg`], the
//! transaction logic and the handlers change the shadows, and
//! [`Endpoint::sync_to_reg`] writes them back out.
//!
//! `CHEPnR` is awkward to write. The status and data toggle fields flip when written
//! with 1, and the completion flags clear when written with 0. `sync_to_reg` turns
//! the desired statuses into the right toggle pattern.

#![allow(non_snake_case)]

use crate::{
    descriptor::{EndpointDescriptor, TransferType},
    peripheral::{Register, RegisterFile},
    pma, ral,
    request::SetupPacket,
    shadow::Shadow,
};
use usb_device::{endpoint::EndpointAddress, UsbDirection};

mod CHEPR {
    pub use crate::ral::usb::CHEPR::*;
}

mod TXBD {
    pub use crate::pma::TXBD::*;
}

mod RXBD {
    pub use crate::pma::RXBD::*;
}

/// Handshake status of one endpoint direction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Status {
    /// Transactions are ignored
    Disabled = CHEPR::STATRX::RW::DISABLED,
    /// Answer with STALL
    Stall = CHEPR::STATRX::RW::STALL,
    /// Answer with NAK; the endpoint isn't ready
    Nak = CHEPR::STATRX::RW::NAK,
    /// Ready for the next transaction
    Valid = CHEPR::STATRX::RW::VALID,
}

impl Status {
    /// `STATRX` and `STATTX` share their encoding
    pub(crate) fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            CHEPR::STATTX::RW::DISABLED => Status::Disabled,
            CHEPR::STATTX::RW::STALL => Status::Stall,
            CHEPR::STATTX::RW::NAK => Status::Nak,
            _ => Status::Valid,
        }
    }
}

/// The two flavors of endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    /// Endpoint 0. Bidirectional, so it owns both halves of its `CHEPnR`, and both
    /// buffer descriptors.
    Control,
    /// Endpoints 1 through 7. Owns only the half of `CHEPnR`, and the buffer
    /// descriptor, for its direction. An IN and an OUT endpoint with the same number
    /// share a `CHEPnR`.
    Generic(UsbDirection),
}

/// What to do after an IN transaction completes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InAction {
    /// The transfer has more data to send
    SendMore,
    /// All data is sent, but the last packet was full; end the transfer with a ZLP
    SendZlp,
    /// The transfer is done
    Done,
}

struct Shadows {
    CHEPR: Shadow<u32>,
    TXBD: Shadow<u32>,
    RXBD: Shadow<u32>,
}

/// Scratch space for composing `CHEPnR` values
struct Chep {
    CHEPR: Shadow<u32>,
}

impl Chep {
    const fn new(value: u32) -> Self {
        Chep {
            CHEPR: Shadow::new(value),
        }
    }
}

/// A USB endpoint
pub struct Endpoint {
    number: u8,
    kind: Kind,
    utype: u32,
    max_packet_size: usize,
    tx_buffer: usize,
    rx_buffer: usize,
    shadow: Shadows,
    rx_status: Status,
    tx_status: Status,
    /// Reset the data toggles on the next sync to hardware
    reset_toggle: bool,
    setup: Option<SetupPacket>,
    rx_received: usize,
    tx_sent: usize,
    tx_sent_limit: usize,
    tx_expected: Option<usize>,
    tx_zlp_sent: bool,
    last_direction: UsbDirection,
    current_direction: UsbDirection,
}

impl Endpoint {
    fn new(
        number: u8,
        kind: Kind,
        utype: u32,
        max_packet_size: usize,
        tx_buffer: usize,
        rx_buffer: usize,
    ) -> Self {
        let ep = Endpoint {
            number,
            kind,
            utype,
            max_packet_size,
            tx_buffer,
            rx_buffer,
            shadow: Shadows {
                CHEPR: Shadow::new(0),
                TXBD: Shadow::new(0),
                RXBD: Shadow::new(0),
            },
            rx_status: Status::Disabled,
            tx_status: Status::Disabled,
            reset_toggle: true,
            setup: None,
            rx_received: 0,
            tx_sent: 0,
            tx_sent_limit: 0,
            tx_expected: None,
            tx_zlp_sent: false,
            last_direction: UsbDirection::In,
            current_direction: UsbDirection::In,
        };

        let (blsize, num_block) = pma::rx_blocks(max_packet_size);
        ral::write_reg!(self, &ep.shadow, CHEPR, EA: number as u32, UTYPE: utype);
        ral::write_reg!(self, &ep.shadow, TXBD, ADDR: tx_buffer as u32, COUNT: 0);
        ral::write_reg!(self, &ep.shadow, RXBD, ADDR: rx_buffer as u32, COUNT: 0, NUM_BLOCK: num_block, BLSIZE: blsize);
        ep
    }

    /// Create endpoint 0, using the TX and RX buffers at the given packet memory offsets
    pub(crate) fn control(max_packet_size: usize, tx_buffer: usize, rx_buffer: usize) -> Self {
        Self::new(
            0,
            Kind::Control,
            CHEPR::UTYPE::RW::CONTROL,
            max_packet_size,
            tx_buffer,
            rx_buffer,
        )
    }

    /// Create an endpoint described by `descriptor`, using the buffer at the packet
    /// memory offset `buffer`
    ///
    /// An OUT endpoint is immediately ready to receive. An IN endpoint NAKs until a
    /// transfer begins.
    ///
    /// # Panics
    ///
    /// Panics if the descriptor describes endpoint 0, or an endpoint number above 7.
    /// Also panics if the descriptor describes a control endpoint, since only
    /// endpoint 0 handles SETUP packets, or if the max packet size exceeds
    /// [`MAX_PACKET_SIZE`](crate::MAX_PACKET_SIZE).
    pub(crate) fn generic(descriptor: &EndpointDescriptor, buffer: usize) -> Self {
        let number = descriptor.number();
        assert!(
            (1..crate::ENDPOINT_COUNT as u8).contains(&number),
            "endpoint number {} can't be a generic endpoint",
            number
        );
        assert!(
            descriptor.max_packet_size() <= crate::MAX_PACKET_SIZE,
            "endpoint {:#x} max packet size {} is too large",
            descriptor.address,
            descriptor.max_packet_size()
        );
        let utype = match descriptor.transfer_type() {
            TransferType::Bulk => CHEPR::UTYPE::RW::BULK,
            TransferType::Interrupt => CHEPR::UTYPE::RW::INTERRUPT,
            TransferType::Isochronous => CHEPR::UTYPE::RW::ISO,
            TransferType::Control => panic!(
                "endpoint {:#x} is a control endpoint; only endpoint 0 may be",
                descriptor.address
            ),
        };
        let direction = descriptor.direction();
        let mut ep = Self::new(
            number,
            Kind::Generic(direction),
            utype,
            descriptor.max_packet_size(),
            buffer,
            buffer,
        );
        match direction {
            UsbDirection::Out => ep.rx_status = Status::Valid,
            UsbDirection::In => ep.tx_status = Status::Nak,
        }
        ep
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn is_control(&self) -> bool {
        self.kind == Kind::Control
    }

    /// The endpoint address; endpoint 0 reports its OUT address
    pub fn address(&self) -> EndpointAddress {
        let direction = match self.kind {
            Kind::Control => UsbDirection::Out,
            Kind::Generic(direction) => direction,
        };
        EndpointAddress::from_parts(self.number as usize, direction)
    }

    /// Returns `true` if this endpoint owns the `direction` half of its registers
    pub fn owns(&self, direction: UsbDirection) -> bool {
        match self.kind {
            Kind::Control => true,
            Kind::Generic(dir) => dir == direction,
        }
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    /// Offset of the TX buffer in packet memory
    pub fn tx_buffer(&self) -> usize {
        self.tx_buffer
    }

    /// Offset of the RX buffer in packet memory
    pub fn rx_buffer(&self) -> usize {
        self.rx_buffer
    }

    /// The most recent SETUP packet; control endpoints only
    pub fn setup(&self) -> Option<&SetupPacket> {
        self.setup.as_ref()
    }

    /// Bytes received in the current OUT transfer
    pub fn rx_received(&self) -> usize {
        self.rx_received
    }

    /// Bytes sent in the current IN transfer
    pub fn tx_sent(&self) -> usize {
        self.tx_sent
    }

    /// Total bytes to send in the current IN transfer
    pub fn tx_sent_limit(&self) -> usize {
        self.tx_sent_limit
    }

    /// The length the host expects from the current IN transfer, if known
    pub fn tx_expected(&self) -> Option<usize> {
        self.tx_expected
    }

    pub fn rx_status(&self) -> Status {
        self.rx_status
    }

    pub fn tx_status(&self) -> Status {
        self.tx_status
    }

    /// Size of the last packet received, from the RX buffer descriptor
    pub fn rx_count(&self) -> usize {
        ral::read_reg!(self, &self.shadow, RXBD, COUNT) as usize
    }

    /// Size of the last packet queued for sending, from the TX buffer descriptor
    pub fn tx_count(&self) -> usize {
        ral::read_reg!(self, &self.shadow, TXBD, COUNT) as usize
    }

    pub(crate) fn set_tx_count(&mut self, count: usize) {
        ral::modify_reg!(self, &self.shadow, TXBD, COUNT: count as u32);
    }

    /// The last reception completed a SETUP transaction
    pub fn is_setup(&self) -> bool {
        ral::read_reg!(self, &self.shadow, CHEPR, SETUP == 1)
    }

    pub(crate) fn vtrx(&self) -> bool {
        ral::read_reg!(self, &self.shadow, CHEPR, VTRX == 1)
    }

    pub(crate) fn vttx(&self) -> bool {
        ral::read_reg!(self, &self.shadow, CHEPR, VTTX == 1)
    }

    /// Load the shadows from hardware
    ///
    /// The hardware's statuses become the desired statuses.
    pub fn sync_from_reg<R: RegisterFile + ?Sized>(&mut self, regs: &R) {
        self.shadow.CHEPR.write(regs.read(Register::Chep(self.number)));
        if self.owns(UsbDirection::In) {
            self.shadow.TXBD.write(regs.read_sram(pma::txbd(self.number)));
            self.tx_status = Status::from_bits(ral::read_reg!(self, &self.shadow, CHEPR, STATTX));
        }
        if self.owns(UsbDirection::Out) {
            self.shadow.RXBD.write(regs.read_sram(pma::rxbd(self.number)));
            self.rx_status = Status::from_bits(ral::read_reg!(self, &self.shadow, CHEPR, STATRX));
        }
    }

    /// Write the shadows to hardware
    ///
    /// Only the owned buffer descriptors and `CHEPnR` fields change. The data toggles
    /// are reset on the first sync after creation.
    pub fn sync_to_reg<R: RegisterFile + ?Sized>(&mut self, regs: &R) {
        if self.owns(UsbDirection::In) {
            regs.write_sram(pma::txbd(self.number), self.shadow.TXBD.read());
        }
        if self.owns(UsbDirection::Out) {
            regs.write_sram(pma::rxbd(self.number), self.shadow.RXBD.read());
        }
        self.write_chepr(regs, false, false, true);
        self.reset_toggle = false;
    }

    /// Compose and write `CHEPnR`
    ///
    /// `ack_rx` and `ack_tx` clear the completion flags. `update_status` moves the
    /// owned statuses to the desired statuses; otherwise, no toggle bit is touched.
    fn write_chepr<R: RegisterFile + ?Sized>(
        &self,
        regs: &R,
        ack_rx: bool,
        ack_tx: bool,
        update_status: bool,
    ) {
        let current = Chep::new(regs.read(Register::Chep(self.number)));
        let (mut stat_rx, mut dtog_rx, mut stat_tx, mut dtog_tx) = (0, 0, 0, 0);
        if update_status && self.owns(UsbDirection::Out) {
            stat_rx = ral::read_reg!(self, &current, CHEPR, STATRX) ^ self.rx_status as u32;
            if self.reset_toggle {
                dtog_rx = ral::read_reg!(self, &current, CHEPR, DTOGRX);
            }
        }
        if update_status && self.owns(UsbDirection::In) {
            stat_tx = ral::read_reg!(self, &current, CHEPR, STATTX) ^ self.tx_status as u32;
            if self.reset_toggle {
                dtog_tx = ral::read_reg!(self, &current, CHEPR, DTOGTX);
            }
        }
        let epkind = ral::read_reg!(self, &self.shadow, CHEPR, EPKIND);

        let next = Chep::new(0);
        ral::write_reg!(
            self,
            &next,
            CHEPR,
            EA: self.number as u32,
            UTYPE: self.utype,
            EPKIND: epkind,
            VTRX: !ack_rx as u32,
            VTTX: !ack_tx as u32,
            STATRX: stat_rx,
            DTOGRX: dtog_rx,
            STATTX: stat_tx,
            DTOGTX: dtog_tx
        );
        regs.write(Register::Chep(self.number), next.CHEPR.read());
    }

    /// Acknowledge a completed reception
    pub(crate) fn clear_vtrx<R: RegisterFile + ?Sized>(&mut self, regs: &R) {
        self.write_chepr(regs, true, false, false);
        ral::modify_reg!(self, &self.shadow, CHEPR, VTRX: 0);
    }

    /// Acknowledge a completed transmission
    pub(crate) fn clear_vttx<R: RegisterFile + ?Sized>(&mut self, regs: &R) {
        self.write_chepr(regs, false, true, false);
        ral::modify_reg!(self, &self.shadow, CHEPR, VTTX: 0);
    }

    /// Disable the owned halves of `CHEPnR`, and drop the endpoint
    ///
    /// The buffer descriptor table isn't touched.
    pub(crate) fn free<R: RegisterFile + ?Sized>(mut self, regs: &R) {
        if self.owns(UsbDirection::Out) {
            self.rx_status = Status::Disabled;
        }
        if self.owns(UsbDirection::In) {
            self.tx_status = Status::Disabled;
        }
        self.write_chepr(regs, false, false, true);
    }

    /// Set the desired status for `direction`
    ///
    /// Takes effect on the next [`sync_to_reg()`](Endpoint::sync_to_reg).
    ///
    /// # Panics
    ///
    /// Panics if the endpoint doesn't own `direction`.
    pub fn set_status(&mut self, direction: UsbDirection, status: Status) {
        assert!(
            self.owns(direction),
            "endpoint {} doesn't own that direction",
            self.number
        );
        match direction {
            UsbDirection::Out => self.rx_status = status,
            UsbDirection::In => self.tx_status = status,
        }
    }

    /// Stall every owned direction
    pub fn stall(&mut self) {
        if self.owns(UsbDirection::Out) {
            self.rx_status = Status::Stall;
        }
        if self.owns(UsbDirection::In) {
            self.tx_status = Status::Stall;
        }
    }

    /// Begin an IN transfer of `total` bytes
    ///
    /// `expected` is the length the host asked for, if known; `wLength` for a control
    /// transfer. The transfer is clamped to it, and it decides whether a transfer
    /// that ends on a full packet needs a ZLP. The driver pulls each packet's data
    /// from the handler.
    ///
    /// # Panics
    ///
    /// Panics if the endpoint can't transmit.
    pub fn begin_in(&mut self, total: usize, expected: Option<usize>) {
        self.set_status(UsbDirection::In, Status::Valid);
        self.tx_sent = 0;
        self.tx_sent_limit = expected.map_or(total, |expected| total.min(expected));
        self.tx_expected = expected;
        self.tx_zlp_sent = false;
    }

    /// Begin an OUT transfer
    ///
    /// # Panics
    ///
    /// Panics if the endpoint can't receive.
    pub fn begin_out(&mut self) {
        self.set_status(UsbDirection::Out, Status::Valid);
        self.rx_received = 0;
    }

    /// Note the direction of a completed transaction
    ///
    /// The first transaction after a direction change starts a new transfer in that
    /// direction, so its byte counter restarts.
    pub(crate) fn track_direction(&mut self, direction: UsbDirection) {
        self.last_direction = self.current_direction;
        self.current_direction = direction;
        if self.last_direction != self.current_direction {
            match direction {
                UsbDirection::Out => self.rx_received = 0,
                UsbDirection::In => {
                    self.tx_sent = 0;
                    self.tx_zlp_sent = false;
                }
            }
        }
    }

    /// A SETUP packet starts a new control transfer
    pub(crate) fn receive_setup(&mut self, packet: &[u8]) {
        self.rx_received = packet.len();
        self.setup = SetupPacket::parse(packet);
    }

    pub(crate) fn record_received(&mut self, len: usize) {
        self.rx_received += len;
    }

    pub(crate) fn record_sent(&mut self, len: usize) {
        self.tx_sent += len;
    }

    pub(crate) fn mark_zlp_sent(&mut self) {
        self.tx_zlp_sent = true;
    }

    /// Size of the next IN packet
    pub fn next_packet_len(&self) -> usize {
        self.tx_sent_limit
            .saturating_sub(self.tx_sent)
            .min(self.max_packet_size)
    }

    /// Decide what follows a completed IN transaction
    pub fn in_action(&self) -> InAction {
        if self.tx_sent < self.tx_sent_limit {
            InAction::SendMore
        } else if !self.tx_zlp_sent
            && self.tx_count() == self.max_packet_size
            && self
                .tx_expected
                .map_or(true, |expected| self.tx_sent < expected)
        {
            InAction::SendZlp
        } else {
            InAction::Done
        }
    }

    /// A short packet ends an OUT transfer
    ///
    /// Returns `false` if the last packet filled the buffer, meaning more may follow.
    pub fn out_stage_completed(&self) -> bool {
        self.rx_count() < self.max_packet_size
    }
}
