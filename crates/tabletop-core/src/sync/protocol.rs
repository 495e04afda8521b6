//! JSON wire format.
//!
//! Outbound:
//! ```json
//! { "action": "create", "data": { "id": "…", "x": 50, "y": 100, "icon": "bear" } }
//! { "action": "delete", "data": { "id": "…" } }
//! { "action": "ping", "data": 3 }
//! ```
//!
//! Inbound is either a bare array of entities (full snapshot), the same
//! array wrapped as `{ "type": "state", "data": [...] }`, an incremental
//! mutation in the outbound shape, or a `ping`/`error` envelope.

use serde::{Deserialize, Serialize};

use crate::board::RemoteUpdate;
use crate::entity::{Entity, EntityId, GridPos, Mutation, TemplateCatalog};
use crate::error::{SyncError, SyncResult};

/// An entity as it appears on the wire. Carries no kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEntity {
    pub id: String,
    pub x: i64,
    pub y: i64,
    pub icon: String,
}

impl WireEntity {
    fn into_entity(self, catalog: &TemplateCatalog) -> SyncResult<Entity> {
        if self.id.is_empty() {
            return Err(SyncError::MalformedMessage("entity with empty id".to_string()));
        }
        let kind = catalog.kind_for_icon(&self.icon);
        Ok(Entity::new(
            EntityId::from(self.id),
            kind,
            GridPos::new(self.x, self.y),
            self.icon,
        ))
    }
}

impl From<&Entity> for WireEntity {
    fn from(entity: &Entity) -> Self {
        Self {
            id: entity.id.to_string(),
            x: entity.position.x,
            y: entity.position.y,
            icon: entity.icon.clone(),
        }
    }
}

/// Id reference used by deletes. The object form is what we send; some
/// servers send the bare id string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityRef {
    Object { id: String },
    Bare(String),
}

impl EntityRef {
    pub fn id(&self) -> &str {
        match self {
            EntityRef::Object { id } | EntityRef::Bare(id) => id,
        }
    }
}

/// Messages sent to the server. Also the shape of relayed mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    Create(WireEntity),
    Update(WireEntity),
    Delete(EntityRef),
    /// Keepalive carrying a sequence number.
    Ping(u64),
}

impl From<&Mutation> for ClientMessage {
    fn from(mutation: &Mutation) -> Self {
        match mutation {
            Mutation::Create(entity) => ClientMessage::Create(entity.into()),
            Mutation::Update { id, position, icon } => ClientMessage::Update(WireEntity {
                id: id.to_string(),
                x: position.x,
                y: position.y,
                icon: icon.clone(),
            }),
            Mutation::Delete(id) => ClientMessage::Delete(EntityRef::Object { id: id.to_string() }),
        }
    }
}

/// Enveloped server replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEnvelope {
    State(Vec<WireEntity>),
    Ping(serde_json::Value),
    Error(serde_json::Value),
}

/// Any frame the server may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Snapshot(Vec<WireEntity>),
    Envelope(ServerEnvelope),
    Mutation(ClientMessage),
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Update(RemoteUpdate),
    Pong,
    Rejected(String),
}

/// Serialize a mutation for sending.
pub fn encode_mutation(mutation: &Mutation) -> SyncResult<String> {
    encode(&ClientMessage::from(mutation))
}

pub fn encode(message: &ClientMessage) -> SyncResult<String> {
    serde_json::to_string(message).map_err(|e| SyncError::Serialization(e.to_string()))
}

/// Parse and classify an inbound frame.
pub fn decode_frame(text: &str, catalog: &TemplateCatalog) -> SyncResult<Inbound> {
    let message: ServerMessage = serde_json::from_str(text)
        .map_err(|e| SyncError::MalformedMessage(format!("{e}: {}", preview(text))))?;

    match message {
        ServerMessage::Snapshot(entities) | ServerMessage::Envelope(ServerEnvelope::State(entities)) => {
            let entities = entities
                .into_iter()
                .map(|e| e.into_entity(catalog))
                .collect::<SyncResult<Vec<_>>>()?;
            Ok(Inbound::Update(RemoteUpdate::Snapshot(entities)))
        }
        ServerMessage::Envelope(ServerEnvelope::Ping(_)) => Ok(Inbound::Pong),
        ServerMessage::Envelope(ServerEnvelope::Error(data)) => {
            let reason = match data {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            Ok(Inbound::Rejected(reason))
        }
        ServerMessage::Mutation(message) => decode_mutation(message, catalog),
    }
}

fn decode_mutation(message: ClientMessage, catalog: &TemplateCatalog) -> SyncResult<Inbound> {
    let mutation = match message {
        ClientMessage::Create(wire) => Mutation::Create(wire.into_entity(catalog)?),
        ClientMessage::Update(wire) => {
            let entity = wire.into_entity(catalog)?;
            Mutation::Update {
                id: entity.id,
                position: entity.position,
                icon: entity.icon,
            }
        }
        ClientMessage::Delete(reference) => {
            if reference.id().is_empty() {
                return Err(SyncError::MalformedMessage("delete with empty id".to_string()));
            }
            Mutation::Delete(EntityId::from(reference.id()))
        }
        ClientMessage::Ping(_) => return Ok(Inbound::Pong),
    };
    Ok(Inbound::Update(RemoteUpdate::Mutation(mutation)))
}

/// First 100 chars of a frame, for log messages.
pub(crate) fn preview(text: &str) -> &str {
    match text.char_indices().nth(100) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;

    fn catalog() -> TemplateCatalog {
        TemplateCatalog::default()
    }

    #[test]
    fn test_encode_create() {
        let entity = Entity::new("t1".into(), EntityKind::Token, GridPos::new(50, 100), "bear");
        let json = encode_mutation(&Mutation::Create(entity)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "action": "create",
                "data": { "id": "t1", "x": 50, "y": 100, "icon": "bear" }
            })
        );
    }

    #[test]
    fn test_encode_update() {
        let json = encode_mutation(&Mutation::Update {
            id: "t1".into(),
            position: GridPos::new(0, 50),
            icon: "dwarf".into(),
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["action"], "update");
        assert_eq!(value["data"]["y"], 50);
        assert_eq!(value["data"]["icon"], "dwarf");
    }

    #[test]
    fn test_encode_delete_carries_only_id() {
        let json = encode_mutation(&Mutation::Delete("t1".into())).unwrap();
        assert_eq!(json, r#"{"action":"delete","data":{"id":"t1"}}"#);
    }

    #[test]
    fn test_encode_ping() {
        assert_eq!(
            encode(&ClientMessage::Ping(7)).unwrap(),
            r#"{"action":"ping","data":7}"#
        );
    }

    #[test]
    fn test_decode_bare_snapshot() {
        let json = r#"[{"id":"t1","x":50,"y":100,"icon":"bear"},{"id":"w1","x":0,"y":0,"icon":"wall"}]"#;
        match decode_frame(json, &catalog()).unwrap() {
            Inbound::Update(RemoteUpdate::Snapshot(entities)) => {
                assert_eq!(entities.len(), 2);
                assert_eq!(entities[0].position, GridPos::new(50, 100));
                assert_eq!(entities[1].kind, EntityKind::Wall);
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_empty_snapshot() {
        assert_eq!(
            decode_frame("[]", &catalog()).unwrap(),
            Inbound::Update(RemoteUpdate::Snapshot(vec![]))
        );
    }

    #[test]
    fn test_decode_state_envelope() {
        let json = r#"{"type":"state","data":[{"id":"t1","x":50,"y":100,"icon":"bear"}]}"#;
        assert!(matches!(
            decode_frame(json, &catalog()).unwrap(),
            Inbound::Update(RemoteUpdate::Snapshot(ref e)) if e.len() == 1
        ));
    }

    #[test]
    fn test_decode_incremental_mutations() {
        let create = r#"{"action":"create","data":{"id":"t9","x":100,"y":0,"icon":"dwarf"}}"#;
        assert!(matches!(
            decode_frame(create, &catalog()).unwrap(),
            Inbound::Update(RemoteUpdate::Mutation(Mutation::Create(_)))
        ));

        let update = r#"{"action":"update","data":{"id":"t9","x":150,"y":0,"icon":"dwarf"}}"#;
        assert!(matches!(
            decode_frame(update, &catalog()).unwrap(),
            Inbound::Update(RemoteUpdate::Mutation(Mutation::Update { .. }))
        ));

        let delete = r#"{"action":"delete","data":{"id":"t9"}}"#;
        assert_eq!(
            decode_frame(delete, &catalog()).unwrap(),
            Inbound::Update(RemoteUpdate::Mutation(Mutation::Delete("t9".into())))
        );

        let bare_delete = r#"{"action":"delete","data":"t9"}"#;
        assert_eq!(
            decode_frame(bare_delete, &catalog()).unwrap(),
            Inbound::Update(RemoteUpdate::Mutation(Mutation::Delete("t9".into())))
        );
    }

    #[test]
    fn test_decode_ping_and_error() {
        assert_eq!(
            decode_frame(r#"{"type":"ping","data":4}"#, &catalog()).unwrap(),
            Inbound::Pong
        );
        assert_eq!(
            decode_frame(r#"{"type":"error","data":"That position is occupied"}"#, &catalog()).unwrap(),
            Inbound::Rejected("That position is occupied".to_string())
        );
    }

    #[test]
    fn test_decode_malformed() {
        for bad in [
            "not json",
            r#"{"hello":"world"}"#,
            r#"[{"id":"t1","x":"fifty","y":0,"icon":"bear"}]"#,
            r#"{"action":"teleport","data":{}}"#,
            r#"[{"id":"","x":0,"y":0,"icon":"bear"}]"#,
            r#"42"#,
        ] {
            assert!(
                matches!(decode_frame(bad, &catalog()), Err(SyncError::MalformedMessage(_))),
                "accepted {bad}"
            );
        }
    }

    #[test]
    fn test_decode_extreme_coordinates() {
        let json = r#"[{"id":"t1","x":9223372036854775807,"y":-9223372036854775808,"icon":"bear"}]"#;
        match decode_frame(json, &catalog()).unwrap() {
            Inbound::Update(RemoteUpdate::Snapshot(entities)) => {
                assert_eq!(entities[0].position, GridPos::new(i64::MAX, i64::MIN));
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
        // Past i64 is not a coordinate at all
        let json = r#"[{"id":"t1","x":9223372036854775808,"y":0,"icon":"bear"}]"#;
        assert!(matches!(decode_frame(json, &catalog()), Err(SyncError::MalformedMessage(_))));
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(500);
        assert_eq!(preview(&long).len(), 100);
        assert_eq!(preview("short"), "short");
    }
}
