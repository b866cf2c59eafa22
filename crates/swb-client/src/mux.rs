//! Stream multiplexer
//!
//! One reader task owns the inbound half of the bidirectional stream and
//! fans frames out by payload kind: arbitration updates go to the lifecycle
//! task, packet-ins/digests/idle-timeouts/errors go to per-kind taps that
//! consumers pull independently. Frames of one kind are delivered in receipt
//! order; a consumer that does not poll its tap never stalls the others
//! (per-kind queues are unbounded; buffering is bounded by the
//! application's consumption discipline, not enforced here).
//!
//! Outbound frames go through a single bounded sink; senders block until the
//! transport accepts the frame.

use std::sync::{Arc, Mutex, PoisonError};

use swb_proto::stream::{
    DigestList, IdleTimeoutNotification, MasterArbitrationUpdate, PacketIn, StreamError,
    StreamRequest, StreamResponse,
};
use swb_proto::StreamPair;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::error::ClientError;

type Tap<T> = Mutex<Option<mpsc::UnboundedSender<T>>>;

#[derive(Default)]
struct Taps {
    packets: Tap<PacketIn>,
    digests: Tap<DigestList>,
    idle_timeouts: Tap<IdleTimeoutNotification>,
    errors: Tap<StreamError>,
}

fn forward<T>(tap: &Tap<T>, item: T, kind: &'static str) {
    let mut slot = tap.lock().unwrap_or_else(PoisonError::into_inner);
    match &*slot {
        Some(sender) => {
            if sender.send(item).is_err() {
                // Consumer went away; drop the tap so later frames are
                // discarded without the send overhead.
                debug!(kind, "dropping tap with closed consumer");
                *slot = None;
            }
        }
        None => debug!(kind, "no consumer subscribed, dropping frame"),
    }
}

fn install<T>(tap: &Tap<T>) -> mpsc::UnboundedReceiver<T> {
    let (sender, receiver) = mpsc::unbounded_channel();
    *tap.lock().unwrap_or_else(PoisonError::into_inner) = Some(sender);
    receiver
}

/// The per-session multiplexer over one open stream.
pub(crate) struct StreamMux {
    outbound: mpsc::Sender<StreamRequest>,
    taps: Arc<Taps>,
    done: watch::Receiver<bool>,
}

impl StreamMux {
    /// Spawn the reader task for an open stream. Returns the mux and the
    /// arbitration sequence consumed by the lifecycle task.
    pub fn spawn(pair: StreamPair) -> (Self, mpsc::UnboundedReceiver<MasterArbitrationUpdate>) {
        let (outbound, inbound) = pair;
        let (arbitration_tx, arbitration_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = watch::channel(false);
        let taps = Arc::new(Taps::default());

        tokio::spawn(read_loop(inbound, arbitration_tx, Arc::clone(&taps), done_tx));

        (
            Self {
                outbound,
                taps,
                done: done_rx,
            },
            arbitration_rx,
        )
    }

    /// Send one outbound frame, blocking until the transport accepts it.
    pub async fn send(&self, frame: StreamRequest) -> Result<(), ClientError> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| ClientError::StreamClosed)
    }

    /// Subscribe to packet-ins. Replaces any previous subscription; the
    /// prior receiver sees end-of-stream.
    pub fn tap_packets(&self) -> mpsc::UnboundedReceiver<PacketIn> {
        install(&self.taps.packets)
    }

    /// Subscribe to digest lists (same replacement semantics).
    pub fn tap_digests(&self) -> mpsc::UnboundedReceiver<DigestList> {
        install(&self.taps.digests)
    }

    /// Subscribe to idle-timeout notifications.
    pub fn tap_idle_timeouts(&self) -> mpsc::UnboundedReceiver<IdleTimeoutNotification> {
        install(&self.taps.idle_timeouts)
    }

    /// Subscribe to device-reported stream errors.
    pub fn tap_errors(&self) -> mpsc::UnboundedReceiver<StreamError> {
        install(&self.taps.errors)
    }

    /// Resolves when the inbound stream ends.
    pub async fn closed(&self) {
        let mut done = self.done.clone();
        while !*done.borrow() {
            if done.changed().await.is_err() {
                return;
            }
        }
    }
}

async fn read_loop(
    mut inbound: mpsc::Receiver<StreamResponse>,
    arbitration: mpsc::UnboundedSender<MasterArbitrationUpdate>,
    taps: Arc<Taps>,
    done: watch::Sender<bool>,
) {
    while let Some(frame) = inbound.recv().await {
        if let Some(update) = frame.arbitration {
            // The lifecycle task owns arbitration; if it is gone the
            // session is tearing down anyway.
            let _ = arbitration.send(update);
        } else if let Some(packet) = frame.packet {
            forward(&taps.packets, packet, "packet-in");
        } else if let Some(digest) = frame.digest {
            forward(&taps.digests, digest, "digest");
        } else if let Some(notification) = frame.idle_timeout_notification {
            forward(&taps.idle_timeouts, notification, "idle-timeout");
        } else if let Some(error) = frame.error {
            warn!(
                code = error.canonical_code,
                message = %error.message,
                "device reported stream error"
            );
            forward(&taps.errors, error, "stream-error");
        } else {
            debug!("dropping stream frame with no payload");
        }
    }
    debug!("inbound stream ended");
    let _ = done.send(true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use swb_proto::stream;

    fn packet_frame(tag: u8) -> StreamResponse {
        StreamResponse::packet(stream::PacketIn {
            payload: bytes::Bytes::copy_from_slice(&[tag]),
            metadata: vec![],
        })
    }

    fn digest_frame(list_id: u64) -> StreamResponse {
        StreamResponse::digest(stream::DigestList {
            digest_id: 1,
            list_id,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn routes_by_kind_in_receipt_order() {
        let (frame_tx, frame_rx) = mpsc::channel(16);
        let (out_tx, _out_rx) = mpsc::channel(16);
        let (mux, mut arbitration) = StreamMux::spawn((out_tx, frame_rx));
        let mut packets = mux.tap_packets();
        let mut digests = mux.tap_digests();

        frame_tx.send(packet_frame(1)).await.unwrap();
        frame_tx.send(digest_frame(7)).await.unwrap();
        frame_tx.send(packet_frame(2)).await.unwrap();
        frame_tx
            .send(StreamResponse::arbitration(
                stream::MasterArbitrationUpdate::default(),
            ))
            .await
            .unwrap();

        assert_eq!(packets.recv().await.unwrap().payload.as_ref(), &[1]);
        assert_eq!(packets.recv().await.unwrap().payload.as_ref(), &[2]);
        assert_eq!(digests.recv().await.unwrap().list_id, 7);
        assert!(arbitration.recv().await.is_some());
    }

    #[tokio::test]
    async fn unconsumed_kind_does_not_stall_others() {
        let (frame_tx, frame_rx) = mpsc::channel(16);
        let (out_tx, _out_rx) = mpsc::channel(16);
        let (mux, _arbitration) = StreamMux::spawn((out_tx, frame_rx));
        // No packet tap installed at all; packets are dropped.
        let mut digests = mux.tap_digests();

        for tag in 0..8 {
            frame_tx.send(packet_frame(tag)).await.unwrap();
        }
        frame_tx.send(digest_frame(42)).await.unwrap();

        assert_eq!(digests.recv().await.unwrap().list_id, 42);
    }

    #[tokio::test]
    async fn resubscribe_replaces_previous_tap() {
        let (frame_tx, frame_rx) = mpsc::channel(16);
        let (out_tx, _out_rx) = mpsc::channel(16);
        let (mux, _arbitration) = StreamMux::spawn((out_tx, frame_rx));

        let mut first = mux.tap_packets();
        frame_tx.send(packet_frame(1)).await.unwrap();
        assert_eq!(first.recv().await.unwrap().payload.as_ref(), &[1]);

        let mut second = mux.tap_packets();
        frame_tx.send(packet_frame(2)).await.unwrap();
        assert_eq!(second.recv().await.unwrap().payload.as_ref(), &[2]);
        // The replaced tap ends.
        assert!(first.recv().await.is_none());
    }

    #[tokio::test]
    async fn closed_resolves_when_inbound_ends() {
        let (frame_tx, frame_rx) = mpsc::channel(16);
        let (out_tx, _out_rx) = mpsc::channel(16);
        let (mux, _arbitration) = StreamMux::spawn((out_tx, frame_rx));
        drop(frame_tx);
        mux.closed().await;
    }
}
