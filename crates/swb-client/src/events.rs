//! Lifecycle states and application-facing events

use swb_proto::ElectionId;

/// Channel state as owned by the lifecycle state machine.
///
/// Transitions are driven by transport connectivity, arbitration outcomes
/// and explicit shutdown; nothing else mutates this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Ready,
    TransientFailure,
    Shutdown,
}

/// Snapshot of this client's arbitration status for the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mastership {
    /// Whether this client currently holds primary for its role.
    pub is_primary: bool,
    /// The highest primary election id observed so far.
    pub primary_election_id: Option<ElectionId>,
}

/// Events raised to the application by one switch lifecycle.
///
/// Mastership is reported, never enforced: whether to program entities
/// while holding only backup status is application policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchEvent {
    /// The channel state changed.
    StateChanged(ChannelState),
    /// Primary/backup status or the observed primary election id changed.
    MastershipChanged(Mastership),
    /// Arbitration and pipeline sync completed; the switch is programmable.
    /// Fires exactly once per successful (re)connection.
    Ready,
}

/// A switch event tagged with its origin, as aggregated by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerEvent {
    pub switch: String,
    pub event: SwitchEvent,
}
