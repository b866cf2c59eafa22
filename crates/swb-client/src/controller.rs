//! Controller over many switch lifecycles
//!
//! Runs one lifecycle task per switch. A failure in one switch never stops
//! the others; the controller finishes when every lifecycle reaches
//! SHUTDOWN, and propagates the first fatal error only when configured to
//! fail fast.

use std::collections::HashSet;
use std::sync::Mutex;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::ClientError;
use crate::events::ControllerEvent;
use crate::switch::{lock, Switch};

pub struct Controller {
    switches: Vec<Switch>,
    fail_fast: bool,
    events_tx: mpsc::UnboundedSender<ControllerEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<ControllerEvent>>>,
}

impl Controller {
    /// Build a controller over a set of switches. Duplicate switch names
    /// are a configuration error and fail here, before any connection.
    pub fn new(switches: impl IntoIterator<Item = Switch>) -> Result<Self, ClientError> {
        let switches: Vec<Switch> = switches.into_iter().collect();
        let mut seen = HashSet::new();
        for switch in &switches {
            if !seen.insert(switch.name().to_string()) {
                return Err(ClientError::DuplicateSwitchName(switch.name().to_string()));
            }
        }
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            switches,
            fail_fast: false,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        })
    }

    /// Propagate the first switch failure by cancelling the others.
    pub fn fail_fast(mut self, enabled: bool) -> Self {
        self.fail_fast = enabled;
        self
    }

    pub fn switches(&self) -> &[Switch] {
        &self.switches
    }

    pub fn get(&self, name: &str) -> Option<&Switch> {
        self.switches.iter().find(|switch| switch.name() == name)
    }

    /// Take the aggregated event stream. Yields each switch's lifecycle
    /// events tagged with the switch name; can be taken once.
    pub fn events(&self) -> Option<mpsc::UnboundedReceiver<ControllerEvent>> {
        lock(&self.events_rx).take()
    }

    /// Run every switch lifecycle until `cancel` fires (or, with fail-fast,
    /// until the first fatal switch error).
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ClientError> {
        let local = cancel.child_token();
        let mut tasks = JoinSet::new();

        for switch in &self.switches {
            self.spawn_event_forwarder(switch);
            let switch = switch.clone();
            let token = local.child_token();
            tasks.spawn(async move {
                let result = switch.run(token).await;
                (switch.name().to_string(), result)
            });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    info!(switch = %name, "switch lifecycle finished");
                }
                Ok((name, Err(err))) => {
                    error!(switch = %name, error = %err, "switch lifecycle failed");
                    if first_error.is_none() {
                        first_error = Some(err);
                        if self.fail_fast {
                            local.cancel();
                        }
                    }
                }
                Err(join_err) => {
                    error!(error = %join_err, "switch task aborted");
                    if first_error.is_none() {
                        first_error = Some(ClientError::TaskFailed(join_err.to_string()));
                        if self.fail_fast {
                            local.cancel();
                        }
                    }
                }
            }
        }

        match first_error {
            Some(err) if self.fail_fast => Err(err),
            _ => Ok(()),
        }
    }

    fn spawn_event_forwarder(&self, switch: &Switch) {
        let mut events = switch.subscribe();
        let sender = self.events_tx.clone();
        let name = switch.name().to_string();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if sender
                            .send(ControllerEvent {
                                switch: name.clone(),
                                event,
                            })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(switch = %name, missed, "event subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("switches", &self.switches.len())
            .field("fail_fast", &self.fail_fast)
            .finish()
    }
}
