//! Name-addressed table matches
//!
//! A match is a sparse map from field name to value. A field absent from the
//! map is a wildcard and is omitted from the wire representation entirely,
//! never encoded as a zero mask.

use std::collections::BTreeMap;

use swb_proto::wire;
use swb_schema::MatchKind;

use crate::error::CodecError;
use crate::value;

/// The value supplied for one match field.
///
/// `Exact` doubles as the scalar shorthand against non-exact fields: for an
/// LPM field it means a full-width prefix, for a ternary field a full mask,
/// for a range field a single-point range, for an optional field a present
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchValue {
    Exact(u128),
    Lpm { value: u128, prefix_len: u32 },
    Ternary { value: u128, mask: u128 },
    Range { low: u128, high: u128 },
    Optional(u128),
}

impl MatchValue {
    fn supplied_kind(&self) -> &'static str {
        match self {
            MatchValue::Exact(_) => "exact",
            MatchValue::Lpm { .. } => "lpm",
            MatchValue::Ternary { .. } => "ternary",
            MatchValue::Range { .. } => "range",
            MatchValue::Optional(_) => "optional",
        }
    }

    /// Display form used by `full_match` diagnostics.
    pub fn display(&self) -> String {
        match self {
            MatchValue::Exact(value) | MatchValue::Optional(value) => value.to_string(),
            MatchValue::Lpm { value, prefix_len } => format!("{value}/{prefix_len}"),
            MatchValue::Ternary { value, mask } => format!("{value} &&& {mask:#x}"),
            MatchValue::Range { low, high } => format!("{low}..{high}"),
        }
    }
}

impl From<u128> for MatchValue {
    fn from(value: u128) -> Self {
        MatchValue::Exact(value)
    }
}

impl From<u64> for MatchValue {
    fn from(value: u64) -> Self {
        MatchValue::Exact(value as u128)
    }
}

impl From<u32> for MatchValue {
    fn from(value: u32) -> Self {
        MatchValue::Exact(value as u128)
    }
}

impl From<(u128, u32)> for MatchValue {
    /// `(value, prefix_len)` shorthand for an LPM match.
    fn from((value, prefix_len): (u128, u32)) -> Self {
        MatchValue::Lpm { value, prefix_len }
    }
}

/// Sparse name-to-value match set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableMatch {
    fields: BTreeMap<String, MatchValue>,
}

impl TableMatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<MatchValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<MatchValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&MatchValue> {
        self.fields.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MatchValue)> {
        self.fields.iter()
    }

    /// Encode against a field list, in schema declaration order. `scope`
    /// names the owning table or value set in error messages.
    pub(crate) fn encode_fields(
        &self,
        fields: &[swb_schema::MatchField],
        scope: &str,
    ) -> Result<Vec<wire::FieldMatch>, CodecError> {
        for name in self.fields.keys() {
            if !fields.iter().any(|field| &field.name == name) {
                return Err(CodecError::UnknownMatchField {
                    scope: scope.to_string(),
                    field: name.clone(),
                });
            }
        }

        let mut encoded = Vec::new();
        for field in fields {
            let Some(value) = self.fields.get(&field.name) else {
                continue; // wildcard: omitted from the wire
            };
            encoded.push(wire::FieldMatch {
                field_id: field.id,
                value: Some(encode_one(field, *value)?),
            });
        }
        Ok(encoded)
    }

    /// Decode a wire match list back to the sparse map.
    pub(crate) fn decode_fields(
        encoded: &[wire::FieldMatch],
        fields: &[swb_schema::MatchField],
    ) -> Result<Self, CodecError> {
        let mut decoded = BTreeMap::new();
        for field_match in encoded {
            let field = fields
                .iter()
                .find(|field| field.id == field_match.field_id)
                .ok_or(CodecError::UnknownId {
                    kind: "match field",
                    id: field_match.field_id,
                })?;
            let value = field_match
                .value
                .as_ref()
                .ok_or(CodecError::EmptyContainer("field match type"))?;
            decoded.insert(field.name.clone(), decode_one(value)?);
        }
        Ok(Self { fields: decoded })
    }
}

impl<K: Into<String>, V: Into<MatchValue>> FromIterator<(K, V)> for TableMatch {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

fn encode_one(
    field: &swb_schema::MatchField,
    value: MatchValue,
) -> Result<wire::FieldMatchValue, CodecError> {
    let name = field.name.as_str();
    let width = field.bitwidth;
    match (field.match_kind, value) {
        (MatchKind::Exact, MatchValue::Exact(value)) => Ok(wire::FieldMatchValue::Exact {
            value: value::encode_checked(name, value, width)?,
        }),
        (MatchKind::Lpm, MatchValue::Lpm { value, prefix_len }) => {
            if prefix_len > width {
                return Err(CodecError::PrefixTooLong {
                    field: name.to_string(),
                    prefix_len,
                    bitwidth: width,
                });
            }
            Ok(wire::FieldMatchValue::Lpm {
                value: value::encode_checked(name, value, width)?,
                prefix_len,
            })
        }
        // Bare scalar against an LPM field: full-width exact match.
        (MatchKind::Lpm, MatchValue::Exact(value)) => Ok(wire::FieldMatchValue::Lpm {
            value: value::encode_checked(name, value, width)?,
            prefix_len: width,
        }),
        (MatchKind::Ternary, MatchValue::Ternary { value, mask }) => {
            Ok(wire::FieldMatchValue::Ternary {
                value: value::encode_checked(name, value, width)?,
                mask: value::encode_checked(name, mask, width)?,
            })
        }
        (MatchKind::Ternary, MatchValue::Exact(value)) => Ok(wire::FieldMatchValue::Ternary {
            value: value::encode_checked(name, value, width)?,
            mask: value::to_canonical(value::full_mask(width)),
        }),
        (MatchKind::Range, MatchValue::Range { low, high }) => Ok(wire::FieldMatchValue::Range {
            low: value::encode_checked(name, low, width)?,
            high: value::encode_checked(name, high, width)?,
        }),
        (MatchKind::Range, MatchValue::Exact(value)) => Ok(wire::FieldMatchValue::Range {
            low: value::encode_checked(name, value, width)?,
            high: value::encode_checked(name, value, width)?,
        }),
        (MatchKind::Optional, MatchValue::Optional(value) | MatchValue::Exact(value)) => {
            Ok(wire::FieldMatchValue::Optional {
                value: value::encode_checked(name, value, width)?,
            })
        }
        (kind, value) => Err(CodecError::MatchKindMismatch {
            field: name.to_string(),
            kind,
            supplied: value.supplied_kind(),
        }),
    }
}

fn decode_one(value: &wire::FieldMatchValue) -> Result<MatchValue, CodecError> {
    Ok(match value {
        wire::FieldMatchValue::Exact { value } => MatchValue::Exact(value::from_canonical(value)?),
        wire::FieldMatchValue::Lpm { value, prefix_len } => MatchValue::Lpm {
            value: value::from_canonical(value)?,
            prefix_len: *prefix_len,
        },
        wire::FieldMatchValue::Ternary { value, mask } => MatchValue::Ternary {
            value: value::from_canonical(value)?,
            mask: value::from_canonical(mask)?,
        },
        wire::FieldMatchValue::Range { low, high } => MatchValue::Range {
            low: value::from_canonical(low)?,
            high: value::from_canonical(high)?,
        },
        wire::FieldMatchValue::Optional { value } => {
            MatchValue::Optional(value::from_canonical(value)?)
        }
    })
}
