//! Switch client for switchboard
//!
//! This crate drives long-lived control-plane sessions against programmable
//! switches:
//!
//! - a per-switch **connection lifecycle state machine** handling channel
//!   connectivity, mastership arbitration, pipeline-config sync and
//!   reconnect with jittered exponential backoff;
//! - a **stream multiplexer** fanning the single bidirectional stream out
//!   into independent, ordered per-kind sequences (packet-ins, digests,
//!   idle timeouts);
//! - a **controller** running many switch lifecycles concurrently, with
//!   per-switch failure isolation.
//!
//! ```no_run
//! use std::sync::Arc;
//! use swb_client::{Switch, SwitchOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(transport: Arc<dyn swb_proto::Transport>) -> anyhow::Result<()> {
//! let options = SwitchOptions::new()
//!     .with_schema_path("basic.json")
//!     .with_ready_handler(|sw: Switch| async move {
//!         let mut packets = sw.read_packets().expect("ready");
//!         while let Some(packet) = packets.next().await {
//!             println!("packet in: {:?}", packet);
//!         }
//!     });
//!
//! let sw = Switch::new("sw1", "127.0.0.1:50001", options, transport)?;
//! sw.run(CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod controller;
pub mod error;
pub mod events;
pub mod options;
pub mod streams;
pub mod switch;

mod lifecycle;
mod mux;

pub use backoff::BackoffConfig;
pub use controller::Controller;
pub use error::ClientError;
pub use events::{ChannelState, ControllerEvent, Mastership, SwitchEvent};
pub use options::{ReadyHandler, SwitchOptions};
pub use streams::{DigestStream, IdleTimeoutStream, PacketStream, ReadStream};
pub use switch::Switch;
