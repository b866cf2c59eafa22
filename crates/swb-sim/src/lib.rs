//! Simulated switch device for switchboard
//!
//! `swb-sim` implements the [`swb_proto::Transport`] seam against an
//! in-memory device: arbitration with highest-election-id-wins mastership,
//! pipeline-config storage and acknowledgement, an entity store with
//! INSERT/MODIFY/DELETE semantics and template reads, plus injection hooks
//! for packet-ins, digests and idle timeouts. Tests and demos drive the full
//! client stack against it without any hardware or network.
//!
//! ```
//! use swb_sim::SimSwitch;
//!
//! let device = SimSwitch::new(1);
//! let transport = device.transport(); // one per switch client
//! # let _ = transport;
//! ```

mod device;
mod transport;

pub mod fixtures;

pub use device::SimSwitch;
pub use transport::SimTransport;

#[cfg(test)]
mod tests {
    use super::*;
    use swb_proto::stream::{MasterArbitrationUpdate, StreamRequest};
    use swb_proto::{StatusCode, Transport, Uint128};

    fn arbitration(device_id: u64, election: u64) -> StreamRequest {
        StreamRequest::arbitration(MasterArbitrationUpdate {
            device_id,
            role: None,
            election_id: Some(Uint128 {
                high: 0,
                low: election,
            }),
            status: None,
        })
    }

    #[tokio::test]
    async fn highest_election_id_wins() {
        let device = SimSwitch::new(1);
        let first = device.transport();
        let second = device.transport();

        first.connect().await.unwrap();
        second.connect().await.unwrap();
        let (first_tx, mut first_rx) = first.open_stream().await.unwrap();
        let (second_tx, mut second_rx) = second.open_stream().await.unwrap();

        first_tx.send(arbitration(1, 10)).await.unwrap();
        let reply = first_rx.recv().await.unwrap().arbitration.unwrap();
        assert_eq!(reply.status.unwrap().code, StatusCode::Ok.as_i32());

        // The second client outbids the first; both get notified.
        second_tx.send(arbitration(1, 20)).await.unwrap();
        let reply = second_rx.recv().await.unwrap().arbitration.unwrap();
        assert_eq!(reply.status.unwrap().code, StatusCode::Ok.as_i32());
        assert_eq!(reply.election_id.unwrap().low, 20);

        let demotion = first_rx.recv().await.unwrap().arbitration.unwrap();
        assert_eq!(
            demotion.status.unwrap().code,
            StatusCode::AlreadyExists.as_i32()
        );
        assert_eq!(demotion.election_id.unwrap().low, 20);
        assert_eq!(device.primary_election_id(), Some(20));
    }

    #[tokio::test]
    async fn duplicate_election_id_rejected() {
        let device = SimSwitch::new(1);
        let first = device.transport();
        let second = device.transport();
        first.connect().await.unwrap();
        second.connect().await.unwrap();
        let (first_tx, mut first_rx) = first.open_stream().await.unwrap();
        let (second_tx, mut second_rx) = second.open_stream().await.unwrap();

        first_tx.send(arbitration(1, 10)).await.unwrap();
        assert!(first_rx.recv().await.is_some());

        second_tx.send(arbitration(1, 10)).await.unwrap();
        let reply = second_rx.recv().await.unwrap().arbitration.unwrap();
        assert_eq!(
            reply.status.unwrap().code,
            StatusCode::InvalidArgument.as_i32()
        );
    }

    #[tokio::test]
    async fn unreachable_device_refuses_connections() {
        let device = SimSwitch::new(1);
        device.set_reachable(false);
        let transport = device.transport();
        let err = transport.connect().await.unwrap_err();
        assert_eq!(err.code, StatusCode::Unavailable);
    }

    #[tokio::test]
    async fn write_requires_primary_and_pipeline() {
        let device = SimSwitch::new(1);
        let transport = device.transport();
        transport.connect().await.unwrap();
        let (tx, mut rx) = transport.open_stream().await.unwrap();
        tx.send(arbitration(1, 5)).await.unwrap();
        assert!(rx.recv().await.is_some());

        // Primary, but no pipeline yet.
        let err = transport
            .write(swb_proto::WriteRequest {
                device_id: 1,
                role: None,
                election_id: Some(Uint128 { high: 0, low: 5 }),
                updates: vec![],
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, StatusCode::FailedPrecondition);

        // Wrong election id.
        let err = transport
            .write(swb_proto::WriteRequest {
                device_id: 1,
                role: None,
                election_id: Some(Uint128 { high: 0, low: 4 }),
                updates: vec![],
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, StatusCode::PermissionDenied);
    }
}
