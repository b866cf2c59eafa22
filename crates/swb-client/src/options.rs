//! Per-switch options

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use swb_proto::ElectionId;

use crate::backoff::BackoffConfig;
use crate::switch::Switch;

/// Callback invoked exactly once per successful (re)connection, after
/// arbitration and pipeline sync complete. Runs as its own task scoped to
/// the session; a reconnect cancels the previous invocation.
pub type ReadyHandler =
    Arc<dyn Fn(Switch) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Immutable per-switch configuration, fixed at construction.
#[derive(Clone)]
pub struct SwitchOptions {
    /// Device id presented in every RPC.
    pub device_id: u64,
    /// Capability document path; enables the schema-driven codec and the
    /// pipeline push.
    pub schema_path: Option<PathBuf>,
    /// Capability document as inline JSON (takes effect when no path is
    /// set; handy for tests and demos).
    pub schema_json: Option<String>,
    /// Compiled device config blob pushed with the pipeline.
    pub device_blob_path: Option<PathBuf>,
    /// Opaque pipeline version cookie.
    pub cookie: u64,
    /// Optional role name; the default role has no restrictions.
    pub role_name: Option<String>,
    /// Opaque role configuration understood by the device.
    pub role_config: Bytes,
    /// Election id proposed in arbitration. Must be unique per client.
    pub election_id: ElectionId,
    /// Ready callback.
    pub ready_handler: Option<ReadyHandler>,
    /// Reconnect backoff tuning.
    pub backoff: BackoffConfig,
    /// Timeout for channel establishment.
    pub connect_timeout: Duration,
    /// Timeout for the arbitration reply and the pipeline acknowledgement.
    pub request_timeout: Duration,
}

impl Default for SwitchOptions {
    fn default() -> Self {
        Self {
            device_id: 1,
            schema_path: None,
            schema_json: None,
            device_blob_path: None,
            cookie: 0,
            role_name: None,
            role_config: Bytes::new(),
            election_id: ElectionId(10),
            ready_handler: None,
            backoff: BackoffConfig::default(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl SwitchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device_id(mut self, device_id: u64) -> Self {
        self.device_id = device_id;
        self
    }

    pub fn with_schema_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_path = Some(path.into());
        self
    }

    pub fn with_schema_json(mut self, document: impl Into<String>) -> Self {
        self.schema_json = Some(document.into());
        self
    }

    pub fn with_device_blob_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.device_blob_path = Some(path.into());
        self
    }

    pub fn with_cookie(mut self, cookie: u64) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn with_role(mut self, name: impl Into<String>, config: impl Into<Bytes>) -> Self {
        self.role_name = Some(name.into());
        self.role_config = config.into();
        self
    }

    pub fn with_election_id(mut self, election_id: impl Into<ElectionId>) -> Self {
        self.election_id = election_id.into();
        self
    }

    pub fn with_ready_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Switch) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.ready_handler = Some(Arc::new(move |switch| Box::pin(handler(switch))));
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl fmt::Debug for SwitchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwitchOptions")
            .field("device_id", &self.device_id)
            .field("schema_path", &self.schema_path)
            .field("device_blob_path", &self.device_blob_path)
            .field("cookie", &self.cookie)
            .field("role_name", &self.role_name)
            .field("election_id", &self.election_id)
            .field("ready_handler", &self.ready_handler.is_some())
            .field("backoff", &self.backoff)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
