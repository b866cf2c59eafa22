//! Codec validation errors
//!
//! Every schema mismatch the codec can detect gets its own variant so the
//! message names the offending table/action/field. These are reported
//! synchronously to the caller of encode/decode and never swallowed.

use swb_schema::MatchKind;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("no table named '{0}'")]
    UnknownTable(String),

    #[error("no action named '{0}'")]
    UnknownAction(String),

    #[error("no counter named '{0}'")]
    UnknownCounter(String),

    #[error("no meter named '{0}'")]
    UnknownMeter(String),

    #[error("no register named '{0}'")]
    UnknownRegister(String),

    #[error("no digest named '{0}'")]
    UnknownDigest(String),

    #[error("no value set named '{0}'")]
    UnknownValueSet(String),

    #[error("no action profile named '{0}'")]
    UnknownActionProfile(String),

    /// Decode-side failure: the wire id does not exist in this catalog.
    #[error("no {kind} with id {id}")]
    UnknownId { kind: &'static str, id: u32 },

    #[error("'{scope}' has no match field named '{field}'")]
    UnknownMatchField { scope: String, field: String },

    #[error("action '{action}' missing parameters {missing:?}")]
    MissingParams {
        action: String,
        missing: Vec<String>,
    },

    #[error("action '{action}' has no parameter named '{param}'")]
    UnknownParam { action: String, param: String },

    #[error("{direction} missing metadata field '{name}'")]
    MissingMetadata {
        direction: &'static str,
        name: String,
    },

    #[error("{direction} has extra metadata fields {names:?}")]
    ExtraMetadata {
        direction: &'static str,
        names: Vec<String>,
    },

    #[error("schema does not describe {direction} metadata")]
    NoPacketIo { direction: &'static str },

    #[error("value for '{name}' does not fit in {bitwidth} bits")]
    ValueTooWide { name: String, bitwidth: u32 },

    #[error("byte string of {len} bytes exceeds the 128-bit value range")]
    BytesTooWide { len: usize },

    #[error("field '{field}' is {kind:?} but was supplied a {supplied} value")]
    MatchKindMismatch {
        field: String,
        kind: MatchKind,
        supplied: &'static str,
    },

    #[error("prefix length {prefix_len} exceeds the {bitwidth}-bit width of '{field}'")]
    PrefixTooLong {
        field: String,
        prefix_len: u32,
        bitwidth: u32,
    },

    #[error("table '{0}' requires a priority for ternary/range/optional matches")]
    MissingPriority(String),

    #[error("table entry has match fields or an action but no table name")]
    MissingTableName,

    /// A oneof-style container arrived with no populated arm.
    #[error("missing {0}")]
    EmptyContainer(&'static str),

    /// A oneof-style container arrived with more than one populated arm.
    #[error("multiple fields set in {0}")]
    AmbiguousContainer(&'static str),

    #[error("unspecified update type")]
    UnspecifiedUpdateKind,

    #[error("digest '{digest}' list item has {got} members, schema declares {want}")]
    DigestArity {
        digest: String,
        got: usize,
        want: usize,
    },
}
