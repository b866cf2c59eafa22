//! Connection lifecycle state machine
//!
//! ```text
//! IDLE -> CONNECTING                 on start
//! CONNECTING -> READY                channel ready AND arbitration granted
//!                                    at least backup AND pipeline synced
//! CONNECTING -> TRANSIENT_FAILURE    transport failure, timeout, rejection
//! READY -> TRANSIENT_FAILURE         drop, stream error, arbitration error
//! TRANSIENT_FAILURE -> CONNECTING    after backoff
//! any -> SHUTDOWN                    cancellation; terminal
//! ```
//!
//! Each failure affects only this switch's task: errors become state
//! transitions and a reconnect cycle, never a crash of the controller.

use std::sync::Arc;
use std::time::Instant;

use swb_proto::stream::MasterArbitrationUpdate;
use swb_proto::{Connectivity, ElectionId, ForwardingPipelineConfig, StatusCode, StreamRequest};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::error::ClientError;
use crate::events::{ChannelState, Mastership, SwitchEvent};
use crate::mux::StreamMux;
use crate::switch::{lock, Switch, SwitchInner};

impl SwitchInner {
    fn set_state(&self, state: ChannelState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            info!(switch = %self.name, ?state, "channel state changed");
            let _ = self.events_tx.send(SwitchEvent::StateChanged(state));
        }
    }

    /// Record an arbitration outcome. The reported primary election id is
    /// monotonic: a stale, lower id never rolls the snapshot back.
    fn update_mastership(&self, is_primary: bool, primary_election_id: Option<ElectionId>) {
        let current = *self.mastership_tx.borrow();
        let primary_election_id = match (current.primary_election_id, primary_election_id) {
            (Some(old), Some(new)) => Some(old.max(new)),
            (old, new) => new.or(old),
        };
        let next = Mastership {
            is_primary,
            primary_election_id,
        };
        if next != current {
            info!(
                switch = %self.name,
                is_primary,
                primary_election_id = ?primary_election_id,
                "mastership changed"
            );
            self.mastership_tx.send_replace(next);
            let _ = self.events_tx.send(SwitchEvent::MastershipChanged(next));
        }
    }

    /// Classify an arbitration update: OK grants primary, ALREADY_EXISTS
    /// grants backup, anything else tears the session down.
    fn accept_arbitration(&self, update: MasterArbitrationUpdate) -> Result<(), ClientError> {
        let code = update
            .status
            .as_ref()
            .map(|status| StatusCode::from_i32(status.code))
            .unwrap_or(StatusCode::Ok);
        let primary_id = update.election_id.map(ElectionId::from);
        match code {
            StatusCode::Ok => {
                self.update_mastership(true, primary_id);
                Ok(())
            }
            StatusCode::AlreadyExists => {
                self.update_mastership(false, primary_id);
                Ok(())
            }
            _ => Err(ClientError::ArbitrationRejected {
                code,
                message: update
                    .status
                    .map(|status| status.message)
                    .unwrap_or_default(),
            }),
        }
    }

    pub(crate) async fn run_lifecycle(
        self: &Arc<Self>,
        api: Switch,
        cancel: CancellationToken,
    ) -> Result<(), ClientError> {
        let mut backoff = Backoff::new(self.options.backoff.clone());

        while !cancel.is_cancelled() {
            self.set_state(ChannelState::Connecting);
            let session = self.run_session(&api, &cancel, &mut backoff).await;
            *lock(&self.mux) = None;

            match session {
                Ok(()) => break, // cancelled cleanly
                Err(error) => {
                    warn!(switch = %self.name, error = %error, "session failed");
                    self.set_state(ChannelState::TransientFailure);
                    if backoff.exhausted() {
                        self.set_state(ChannelState::Shutdown);
                        return Err(ClientError::RetriesExhausted(backoff.attempts()));
                    }
                    let delay = backoff.next_delay();
                    debug!(switch = %self.name, ?delay, "waiting before reconnect");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.set_state(ChannelState::Shutdown);
        Ok(())
    }

    /// One connection attempt: connect, open the stream, arbitrate, sync
    /// the pipeline, then supervise until something fails or `cancel`
    /// fires. `Ok(())` means cancellation.
    async fn run_session(
        self: &Arc<Self>,
        api: &Switch,
        cancel: &CancellationToken,
        backoff: &mut Backoff,
    ) -> Result<(), ClientError> {
        timeout(self.options.connect_timeout, self.transport.connect())
            .await
            .map_err(|_| ClientError::Timeout("connection establishment"))??;

        let pair = self.transport.open_stream().await?;
        let (mux, mut arbitration) = StreamMux::spawn(pair);
        let mux = Arc::new(mux);
        *lock(&self.mux) = Some(Arc::clone(&mux));

        // Step 1: propose our election id and role.
        mux.send(StreamRequest::arbitration(MasterArbitrationUpdate {
            device_id: self.options.device_id,
            role: self.role(),
            election_id: Some(self.options.election_id.to_wire()),
            status: None,
        }))
        .await?;

        // Step 2: record the arbitration outcome.
        let reply = timeout(self.options.request_timeout, arbitration.recv())
            .await
            .map_err(|_| ClientError::Timeout("arbitration reply"))?
            .ok_or(ClientError::StreamClosed)?;
        self.accept_arbitration(reply)?;

        // Step 3: synchronize the pipeline config. A primary pushes it:
        // idempotent on the device side but mandatory on every fresh channel
        // to cover device restarts. A backup cannot push; it verifies the
        // device's active config instead.
        if let Some(document) = &self.document {
            let pushed = self.options.cookie;
            let is_primary = self.mastership_tx.borrow().is_primary;
            if is_primary {
                let acked = timeout(
                    self.options.request_timeout,
                    self.transport.set_pipeline_config(
                        self.options.device_id,
                        self.options.election_id.to_wire(),
                        ForwardingPipelineConfig {
                            cookie: pushed,
                            document: document.clone(),
                            device_data: self.device_blob.clone(),
                        },
                    ),
                )
                .await
                .map_err(|_| ClientError::Timeout("pipeline-config acknowledgement"))??;
                if acked != pushed {
                    return Err(ClientError::CookieMismatch { pushed, acked });
                }
            } else {
                let active = timeout(
                    self.options.request_timeout,
                    self.transport.get_pipeline_config(self.options.device_id),
                )
                .await
                .map_err(|_| ClientError::Timeout("pipeline-config acknowledgement"))??;
                match active {
                    Some(active) if active.cookie == pushed => {}
                    Some(active) => {
                        return Err(ClientError::CookieMismatch {
                            pushed,
                            acked: active.cookie,
                        })
                    }
                    // No primary has programmed the device yet; retry via
                    // the normal backoff cycle.
                    None => return Err(ClientError::PipelineUnavailable),
                }
            }
            debug!(switch = %self.name, cookie = pushed, "pipeline config synchronized");
        }

        // Step 4: READY, and the ready handler fires exactly once for this
        // (re)connection, scoped to the session.
        self.set_state(ChannelState::Ready);
        let _ = self.events_tx.send(SwitchEvent::Ready);
        let ready_at = Instant::now();

        let session_token = cancel.child_token();
        if let Some(handler) = &self.options.ready_handler {
            let future = handler(api.clone());
            let token = session_token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = future => {}
                }
            });
        }

        let outcome = self.supervise(&mux, &mut arbitration, cancel).await;
        backoff.note_ready_duration(ready_at.elapsed());
        session_token.cancel();
        outcome
    }

    /// Watch the established session: arbitration updates adjust mastership,
    /// stream or connectivity loss fails the session, cancellation ends it.
    async fn supervise(
        &self,
        mux: &StreamMux,
        arbitration: &mut mpsc::UnboundedReceiver<MasterArbitrationUpdate>,
        cancel: &CancellationToken,
    ) -> Result<(), ClientError> {
        let mut connectivity = self.transport.connectivity();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                update = arbitration.recv() => {
                    match update {
                        Some(update) => self.accept_arbitration(update)?,
                        None => return Err(ClientError::StreamClosed),
                    }
                }
                _ = mux.closed() => return Err(ClientError::StreamClosed),
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        return Err(ClientError::StreamClosed);
                    }
                    let state = *connectivity.borrow();
                    if matches!(
                        state,
                        Connectivity::TransientFailure | Connectivity::Idle | Connectivity::Shutdown
                    ) {
                        return Err(swb_proto::RpcError::unavailable(
                            "channel connectivity lost",
                        )
                        .into());
                    }
                }
            }
        }
    }
}
