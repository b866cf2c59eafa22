//! Action profile members and groups

use swb_proto::wire;
use swb_schema::DeviceSchema;

use crate::action::TableAction;
use crate::entry::{decode_watch_port, encode_watch_port};
use crate::error::CodecError;

/// One member of an action profile. An empty profile name is the wildcard
/// read template.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionProfileMember {
    pub action_profile: String,
    pub member_id: u32,
    pub action: Option<TableAction>,
}

impl ActionProfileMember {
    pub fn new(action_profile: impl Into<String>, member_id: u32) -> Self {
        Self {
            action_profile: action_profile.into(),
            member_id,
            action: None,
        }
    }

    pub fn with_action(mut self, action: TableAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn encode(
        &self,
        schema: &DeviceSchema,
    ) -> Result<wire::ActionProfileMember, CodecError> {
        let action_profile_id = resolve_profile_id(&self.action_profile, schema)?;
        Ok(wire::ActionProfileMember {
            action_profile_id,
            member_id: self.member_id,
            action: self
                .action
                .as_ref()
                .map(|action| action.encode(schema))
                .transpose()?,
        })
    }

    pub fn decode(
        encoded: &wire::ActionProfileMember,
        schema: &DeviceSchema,
    ) -> Result<Self, CodecError> {
        Ok(Self {
            action_profile: resolve_profile_name(encoded.action_profile_id, schema)?,
            member_id: encoded.member_id,
            action: encoded
                .action
                .as_ref()
                .map(|action| TableAction::decode(action, schema))
                .transpose()?,
        })
    }
}

/// A selector group member reference with weight and optional watch port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupMember {
    pub member_id: u32,
    pub weight: i32,
    pub watch_port: Option<u32>,
}

impl GroupMember {
    pub fn new(member_id: u32, weight: i32) -> Self {
        Self {
            member_id,
            weight,
            watch_port: None,
        }
    }

    pub fn watching(mut self, port: u32) -> Self {
        self.watch_port = Some(port);
        self
    }
}

/// A selector group of weighted members.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionProfileGroup {
    pub action_profile: String,
    pub group_id: u32,
    pub max_size: i32,
    pub members: Vec<GroupMember>,
}

impl ActionProfileGroup {
    pub fn new(action_profile: impl Into<String>, group_id: u32) -> Self {
        Self {
            action_profile: action_profile.into(),
            group_id,
            max_size: 0,
            members: Vec::new(),
        }
    }

    pub fn encode(
        &self,
        schema: &DeviceSchema,
    ) -> Result<wire::ActionProfileGroup, CodecError> {
        let action_profile_id = resolve_profile_id(&self.action_profile, schema)?;
        let members = self
            .members
            .iter()
            .map(|member| {
                Ok(wire::GroupMember {
                    member_id: member.member_id,
                    weight: member.weight,
                    watch_port: encode_watch_port(member.watch_port)?,
                })
            })
            .collect::<Result<Vec<_>, CodecError>>()?;
        Ok(wire::ActionProfileGroup {
            action_profile_id,
            group_id: self.group_id,
            members,
            max_size: self.max_size,
        })
    }

    pub fn decode(
        encoded: &wire::ActionProfileGroup,
        schema: &DeviceSchema,
    ) -> Result<Self, CodecError> {
        let members = encoded
            .members
            .iter()
            .map(|member| {
                Ok(GroupMember {
                    member_id: member.member_id,
                    weight: member.weight,
                    watch_port: decode_watch_port(&member.watch_port)?,
                })
            })
            .collect::<Result<Vec<_>, CodecError>>()?;
        Ok(Self {
            action_profile: resolve_profile_name(encoded.action_profile_id, schema)?,
            group_id: encoded.group_id,
            max_size: encoded.max_size,
            members,
        })
    }
}

fn resolve_profile_id(name: &str, schema: &DeviceSchema) -> Result<u32, CodecError> {
    if name.is_empty() {
        return Ok(0);
    }
    schema
        .action_profiles
        .by_name(name)
        .map(|profile| profile.id)
        .ok_or_else(|| CodecError::UnknownActionProfile(name.to_string()))
}

fn resolve_profile_name(id: u32, schema: &DeviceSchema) -> Result<String, CodecError> {
    if id == 0 {
        return Ok(String::new());
    }
    schema
        .action_profiles
        .by_id(id)
        .map(|profile| profile.name.clone())
        .ok_or(CodecError::UnknownId {
            kind: "action profile",
            id,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> DeviceSchema {
        DeviceSchema::from_json(
            r#"{
                "actions": [{"id": 17183246, "name": "pop_vlan", "params": []}],
                "action_profiles": [{
                    "id": 291115404,
                    "name": "hashed_selector",
                    "with_selector": true,
                    "size": 1024,
                    "max_group_size": 16
                }]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn member_roundtrip() {
        let schema = schema();
        let member = ActionProfileMember::new("hashed_selector", 2)
            .with_action(TableAction::new("pop_vlan"));
        let encoded = member.encode(&schema).unwrap();
        assert_eq!(encoded.action_profile_id, 291115404);
        assert_eq!(encoded.member_id, 2);
        assert_eq!(ActionProfileMember::decode(&encoded, &schema).unwrap(), member);
    }

    #[test]
    fn group_roundtrip_with_watch_ports() {
        let schema = schema();
        let group = ActionProfileGroup {
            action_profile: "hashed_selector".to_string(),
            group_id: 2,
            max_size: 3,
            members: vec![
                GroupMember::new(1, 3).watching(0xabc),
                GroupMember::new(2, 4).watching(9),
            ],
        };
        let encoded = group.encode(&schema).unwrap();
        assert_eq!(encoded.members[0].watch_port.as_ref(), &[0x0a, 0xbc]);
        assert_eq!(encoded.members[1].watch_port.as_ref(), &[9]);
        assert_eq!(ActionProfileGroup::decode(&encoded, &schema).unwrap(), group);
    }

    #[test]
    fn wildcard_member_template() {
        let schema = schema();
        let member = ActionProfileMember::default();
        let encoded = member.encode(&schema).unwrap();
        assert_eq!(encoded, wire::ActionProfileMember::default());
        assert_eq!(ActionProfileMember::decode(&encoded, &schema).unwrap(), member);
    }

    #[test]
    fn unknown_profile_named() {
        let schema = schema();
        let err = ActionProfileMember::new("nope", 1)
            .encode(&schema)
            .unwrap_err();
        assert_eq!(err.to_string(), "no action profile named 'nope'");
    }
}
