//! Transaction completion
//!
//! Decides what a completed transaction means for its transfer. Data moves in the
//! driver; this module only acknowledges the completion, and changes the
//! endpoint's desired statuses.

use crate::{
    endpoint::{Endpoint, InAction, Status},
    peripheral::RegisterFile,
    request::SETUP_PACKET_LEN,
};
use usb_device::UsbDirection;

/// A finished transfer stage
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// A SETUP packet arrived
    Setup,
    /// An OUT transfer ended with a short packet
    Out,
    /// An IN transfer sent all of its data
    In,
}

/// Handle a completed transaction on `ep`
///
/// Expects the endpoint's shadows to be loaded from hardware. Returns the stage
/// that finished, if any. Otherwise, the endpoint is re-armed for the rest of the
/// transfer.
///
/// # Panics
///
/// Panics if the endpoint has no completed transaction, or if a SETUP packet isn't
/// 8 bytes.
pub fn complete<R: RegisterFile + ?Sized>(ep: &mut Endpoint, regs: &R) -> Option<Stage> {
    if ep.owns(UsbDirection::Out) && ep.vtrx() {
        ep.clear_vtrx(regs);
        if ep.is_setup() {
            assert_eq!(
                ep.rx_received(),
                SETUP_PACKET_LEN,
                "SETUP packet of {} bytes",
                ep.rx_received()
            );
            Some(Stage::Setup)
        } else if ep.out_stage_completed() {
            Some(Stage::Out)
        } else {
            ep.set_status(UsbDirection::Out, Status::Valid);
            if ep.is_control() {
                ep.set_status(UsbDirection::In, Status::Stall);
            }
            None
        }
    } else if ep.owns(UsbDirection::In) && ep.vttx() {
        ep.clear_vttx(regs);
        match ep.in_action() {
            InAction::SendMore => {
                ep.set_status(UsbDirection::In, Status::Valid);
                None
            }
            InAction::SendZlp => {
                trace!("ZLP EP{}", ep.number());
                ep.mark_zlp_sent();
                ep.set_status(UsbDirection::In, Status::Valid);
                None
            }
            InAction::Done => Some(Stage::In),
        }
    } else {
        panic!("no completed transaction on endpoint {}", ep.number())
    }
}

#[cfg(test)]
mod tests {
    use super::{complete, Stage};
    use crate::descriptor::EndpointDescriptor;
    use crate::endpoint::{Endpoint, Status};
    use crate::sim::Simulator;
    use usb_device::UsbDirection;

    fn control(sim: &Simulator) -> Endpoint {
        let mut ep = Endpoint::control(64, 64, 128);
        ep.begin_out();
        ep.set_status(UsbDirection::In, Status::Stall);
        ep.sync_to_reg(sim);
        ep
    }

    #[test]
    fn setup() {
        let sim = Simulator::new();
        let mut ep = control(&sim);
        sim.host_setup(0, [0x80, 6, 0, 1, 0, 0, 18, 0]);
        ep.sync_from_reg(&sim);
        ep.receive_setup(&[0x80, 6, 0, 1, 0, 0, 18, 0]);
        assert_eq!(complete(&mut ep, &sim), Some(Stage::Setup));
        assert!(!ep.vtrx());
    }

    #[test]
    #[should_panic]
    fn short_setup() {
        let sim = Simulator::new();
        let mut ep = control(&sim);
        sim.host_setup(0, [0; 8]);
        ep.sync_from_reg(&sim);
        ep.receive_setup(&[0; 7]);
        complete(&mut ep, &sim);
    }

    #[test]
    fn full_out_packet_rearms() {
        let sim = Simulator::new();
        let mut ep = control(&sim);
        sim.host_out(0, &[0xAA; 64]);
        ep.sync_from_reg(&sim);
        assert_eq!(complete(&mut ep, &sim), None);
        assert_eq!(ep.rx_status(), Status::Valid);
        assert_eq!(ep.tx_status(), Status::Stall);
    }

    #[test]
    fn short_out_packet_completes() {
        let sim = Simulator::new();
        let mut ep = control(&sim);
        sim.host_out(0, &[0xAA; 63]);
        ep.sync_from_reg(&sim);
        assert_eq!(complete(&mut ep, &sim), Some(Stage::Out));

        ep.begin_out();
        ep.sync_to_reg(&sim);
        sim.host_out(0, &[]);
        ep.sync_from_reg(&sim);
        assert_eq!(complete(&mut ep, &sim), Some(Stage::Out));
    }

    #[test]
    fn generic_out_rearm_leaves_in_alone() {
        let sim = Simulator::new();
        let mut ep = Endpoint::generic(
            &EndpointDescriptor {
                address: 0x01,
                attributes: 0x02,
                max_packet_size: 16,
                interval: 0,
            },
            192,
        );
        ep.sync_to_reg(&sim);
        sim.host_out(1, &[0; 16]);
        ep.sync_from_reg(&sim);
        assert_eq!(complete(&mut ep, &sim), None);
        assert_eq!(ep.rx_status(), Status::Valid);
        ep.sync_to_reg(&sim);
        assert_eq!(sim.stat_tx(1), Status::Disabled);
    }

    #[test]
    fn in_transfer_with_zlp() {
        let sim = Simulator::new();
        let mut ep = control(&sim);
        ep.begin_in(64, None);
        ep.set_tx_count(64);
        ep.sync_to_reg(&sim);

        assert_eq!(sim.host_in(0).len(), 64);
        ep.sync_from_reg(&sim);
        ep.record_sent(ep.tx_count());
        assert_eq!(complete(&mut ep, &sim), None);
        assert_eq!(ep.tx_status(), Status::Valid);

        ep.set_tx_count(0);
        ep.sync_to_reg(&sim);
        assert!(sim.host_in(0).is_empty());
        ep.sync_from_reg(&sim);
        assert_eq!(complete(&mut ep, &sim), Some(Stage::In));
    }

    #[test]
    #[should_panic]
    fn nothing_completed() {
        let sim = Simulator::new();
        let mut ep = control(&sim);
        ep.sync_from_reg(&sim);
        complete(&mut ep, &sim);
    }
}
