//! Transport implementation backed by the simulated device

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use swb_proto::stream::{StreamRequest, StreamResponse};
use swb_proto::{
    Connectivity, ForwardingPipelineConfig, ReadRequest, RpcError, StatusCode, StreamPair,
    Transport, Uint128, WriteRequest,
};
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::device::{
    apply_update, arbitrate_and_broadcast, as_u128, lock, primary_id, read_entities, ClientConn,
    Shared, RESPONSE_CAPACITY,
};

const REQUEST_CAPACITY: usize = 64;

/// One client's transport to a [`crate::SimSwitch`].
pub struct SimTransport {
    shared: Arc<Shared>,
    connectivity: watch::Sender<Connectivity>,
    client_id: Mutex<Option<u64>>,
}

impl SimTransport {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        let (connectivity, _) = watch::channel(Connectivity::Idle);
        Self {
            shared,
            connectivity,
            client_id: Mutex::new(None),
        }
    }

    fn check_reachable(&self) -> Result<(), RpcError> {
        if !lock(&self.shared.state).reachable {
            return Err(RpcError::unavailable("device unreachable"));
        }
        Ok(())
    }

    fn check_primary(&self, election_id: Option<Uint128>) -> Result<(), RpcError> {
        let state = lock(&self.shared.state);
        let primary = primary_id(&state).ok_or_else(|| {
            RpcError::new(StatusCode::PermissionDenied, "device has no primary client")
        })?;
        let proposed = election_id.map(as_u128);
        if proposed != Some(primary) {
            return Err(RpcError::new(
                StatusCode::PermissionDenied,
                "not primary for this device",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for SimTransport {
    async fn connect(&self) -> Result<(), RpcError> {
        if !lock(&self.shared.state).reachable {
            let _ = self.connectivity.send(Connectivity::TransientFailure);
            return Err(RpcError::unavailable("device unreachable"));
        }
        let _ = self.connectivity.send(Connectivity::Ready);
        Ok(())
    }

    fn connectivity(&self) -> watch::Receiver<Connectivity> {
        self.connectivity.subscribe()
    }

    async fn open_stream(&self) -> Result<StreamPair, RpcError> {
        self.check_reachable()?;
        let (request_tx, mut request_rx) = mpsc::channel::<StreamRequest>(REQUEST_CAPACITY);
        let (response_tx, response_rx) = mpsc::channel::<StreamResponse>(RESPONSE_CAPACITY);

        let id = {
            let mut state = lock(&self.shared.state);
            // A reopened stream replaces this transport's previous one.
            let mut slot = lock(&self.client_id);
            if let Some(old) = slot.take() {
                state.clients.retain(|client| client.id != old);
            }
            let id = state.next_client;
            state.next_client += 1;
            state.clients.push(ClientConn {
                id,
                election_id: None,
                role: None,
                sender: response_tx,
            });
            *slot = Some(id);
            id
        };

        let shared = Arc::clone(&self.shared);
        let device_id = shared.device_id;
        tokio::spawn(async move {
            while let Some(frame) = request_rx.recv().await {
                handle_frame(&shared, id, frame);
            }
            // Client hung up: retire the stream and re-arbitrate.
            let mut state = lock(&shared.state);
            state.clients.retain(|client| client.id != id);
            arbitrate_and_broadcast(&state, device_id);
            debug!(client = id, "stream closed");
        });

        Ok((request_tx, response_rx))
    }

    async fn write(&self, request: WriteRequest) -> Result<(), RpcError> {
        self.check_reachable()?;
        self.check_primary(request.election_id)?;
        let mut state = lock(&self.shared.state);
        if state.pipeline.is_none() {
            return Err(RpcError::new(
                StatusCode::FailedPrecondition,
                "no forwarding pipeline config has been pushed",
            ));
        }
        for update in &request.updates {
            apply_update(&mut state, update)?;
        }
        Ok(())
    }

    async fn read(
        &self,
        request: ReadRequest,
    ) -> Result<mpsc::Receiver<Result<Vec<swb_proto::wire::Entity>, RpcError>>, RpcError> {
        self.check_reachable()?;
        let state = lock(&self.shared.state);
        let mut batch = Vec::new();
        for template in &request.entities {
            batch.extend(read_entities(&state, template)?);
        }
        drop(state);
        let (sender, receiver) = mpsc::channel(1);
        let _ = sender.try_send(Ok(batch));
        Ok(receiver)
    }

    async fn set_pipeline_config(
        &self,
        _device_id: u64,
        election_id: Uint128,
        config: ForwardingPipelineConfig,
    ) -> Result<u64, RpcError> {
        self.check_reachable()?;
        self.check_primary(Some(election_id))?;
        let mut state = lock(&self.shared.state);
        let cookie = config.cookie;
        state.pipeline = Some(config);
        Ok(cookie.wrapping_add(state.ack_cookie_offset))
    }

    async fn get_pipeline_config(
        &self,
        _device_id: u64,
    ) -> Result<Option<ForwardingPipelineConfig>, RpcError> {
        self.check_reachable()?;
        Ok(lock(&self.shared.state).pipeline.clone())
    }

    async fn capabilities(&self) -> Result<String, RpcError> {
        self.check_reachable()?;
        Ok("switchboard-sim/1.0".to_string())
    }
}

fn handle_frame(shared: &Arc<Shared>, client_id: u64, frame: StreamRequest) {
    let mut state = lock(&shared.state);
    if let Some(arbitration) = frame.arbitration {
        let proposed = arbitration.election_id.map(as_u128);
        // A proposal colliding with another live client is rejected without
        // disturbing the current arbitration.
        if let Some(proposed) = proposed {
            let collision = state
                .clients
                .iter()
                .any(|client| client.id != client_id && client.election_id == Some(proposed));
            if collision {
                if let Some(client) = state.clients.iter().find(|client| client.id == client_id) {
                    let _ = client.sender.try_send(StreamResponse::arbitration(
                        swb_proto::stream::MasterArbitrationUpdate {
                            device_id: shared.device_id,
                            role: arbitration.role.clone(),
                            election_id: arbitration.election_id,
                            status: Some(swb_proto::stream::Status {
                                code: StatusCode::InvalidArgument.as_i32(),
                                message: "election id already in use".to_string(),
                            }),
                        },
                    ));
                }
                return;
            }
        }
        if let Some(client) = state
            .clients
            .iter_mut()
            .find(|client| client.id == client_id)
        {
            client.election_id = proposed;
            client.role = arbitration.role.as_ref().map(|role| role.name.clone());
        }
        arbitrate_and_broadcast(&state, shared.device_id);
    } else if let Some(packet) = frame.packet {
        state.packet_outs.push(packet);
    } else if let Some(ack) = frame.digest_ack {
        state.digest_acks.push(ack);
    }
}
