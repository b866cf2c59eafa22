//! Named actions and their argument validation

use std::collections::BTreeMap;

use swb_proto::wire;
use swb_schema::DeviceSchema;

use crate::error::CodecError;
use crate::value;

/// An action invocation by name with named arguments.
///
/// Encoding requires an exact match between the supplied arguments and the
/// schema's declared parameter set: a missing parameter, an unknown name and
/// an extra argument each fail with their own error naming the offender.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableAction {
    pub name: String,
    pub args: BTreeMap<String, u128>,
}

impl TableAction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: BTreeMap::new(),
        }
    }

    /// Builder-style argument.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<u128>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    pub(crate) fn encode(&self, schema: &DeviceSchema) -> Result<wire::Action, CodecError> {
        let action = schema
            .actions
            .by_name(&self.name)
            .ok_or_else(|| CodecError::UnknownAction(self.name.clone()))?;

        for name in self.args.keys() {
            if action.param(name).is_none() {
                return Err(CodecError::UnknownParam {
                    action: self.name.clone(),
                    param: name.clone(),
                });
            }
        }
        let missing: Vec<String> = action
            .params
            .iter()
            .filter(|param| !self.args.contains_key(&param.name))
            .map(|param| param.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(CodecError::MissingParams {
                action: self.name.clone(),
                missing,
            });
        }

        let params = action
            .params
            .iter()
            .map(|param| {
                let supplied = self.args[&param.name];
                Ok(wire::ActionParam {
                    param_id: param.id,
                    value: value::encode_checked(&param.name, supplied, param.bitwidth)?,
                })
            })
            .collect::<Result<Vec<_>, CodecError>>()?;

        Ok(wire::Action {
            action_id: action.id,
            params,
        })
    }

    pub(crate) fn decode(
        encoded: &wire::Action,
        schema: &DeviceSchema,
    ) -> Result<Self, CodecError> {
        let action = schema
            .actions
            .by_id(encoded.action_id)
            .ok_or(CodecError::UnknownId {
                kind: "action",
                id: encoded.action_id,
            })?;

        let mut args = BTreeMap::new();
        for param in &encoded.params {
            let declared = action
                .param_by_id(param.param_id)
                .ok_or(CodecError::UnknownId {
                    kind: "action parameter",
                    id: param.param_id,
                })?;
            args.insert(declared.name.clone(), value::from_canonical(&param.value)?);
        }
        Ok(Self {
            name: action.name.clone(),
            args,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> DeviceSchema {
        DeviceSchema::from_json(
            r#"{
                "actions": [{
                    "id": 28792405,
                    "name": "ipv4_forward",
                    "params": [
                        {"id": 1, "name": "dstAddr", "bitwidth": 48},
                        {"id": 2, "name": "port", "bitwidth": 9}
                    ]
                }]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn encode_orders_params_by_schema() {
        let schema = schema();
        let action = TableAction::new("ipv4_forward")
            .arg("port", 1u32)
            .arg("dstAddr", 0x0a00_0001u32);
        let encoded = action.encode(&schema).unwrap();
        assert_eq!(encoded.action_id, 28792405);
        assert_eq!(encoded.params[0].param_id, 1);
        assert_eq!(encoded.params[0].value.as_ref(), &[0x0a, 0, 0, 1]);
        assert_eq!(encoded.params[1].param_id, 2);
        assert_eq!(encoded.params[1].value.as_ref(), &[1]);
        assert_eq!(TableAction::decode(&encoded, &schema).unwrap(), action);
    }

    #[test]
    fn unknown_action_name() {
        let err = TableAction::new("nope").encode(&schema()).unwrap_err();
        assert_eq!(err.to_string(), "no action named 'nope'");
    }

    #[test]
    fn missing_parameter_named() {
        let action = TableAction::new("ipv4_forward").arg("port", 1u32);
        let err = action.encode(&schema()).unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"action 'ipv4_forward' missing parameters ["dstAddr"]"#
        );
    }

    #[test]
    fn misspelled_parameter_named() {
        let action = TableAction::new("ipv4_forward")
            .arg("dstAddr", 1u32)
            .arg("prt", 1u32);
        let err = action.encode(&schema()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "action 'ipv4_forward' has no parameter named 'prt'"
        );
    }

    #[test]
    fn extra_parameter_named() {
        let action = TableAction::new("ipv4_forward")
            .arg("dstAddr", 1u32)
            .arg("port", 1u32)
            .arg("extra", 0u32);
        let err = action.encode(&schema()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "action 'ipv4_forward' has no parameter named 'extra'"
        );
    }

    #[test]
    fn oversized_argument_named() {
        let action = TableAction::new("ipv4_forward")
            .arg("dstAddr", 1u32)
            .arg("port", 0x200u32);
        let err = action.encode(&schema()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "value for 'port' does not fit in 9 bits"
        );
    }
}
