//! Board entities, mutations and placeable templates.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a board entity.
///
/// Generated client-side at creation time and never reassigned. Ids that
/// arrive from the server are taken verbatim, so this is a string rather
/// than a parsed UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Generate a fresh random (v4) identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an entity represents. Only a rendering hint; sync treats all kinds alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[default]
    Token,
    Wall,
    Floor,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Token, EntityKind::Wall, EntityKind::Floor];
}

/// Integer pixel position of an entity's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridPos {
    pub x: i64,
    pub y: i64,
}

impl GridPos {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A placed object on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub position: GridPos,
    /// Opaque reference to the visual asset.
    pub icon: String,
}

impl Entity {
    pub fn new(id: EntityId, kind: EntityKind, position: GridPos, icon: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            position,
            icon: icon.into(),
        }
    }
}

/// A change to the shared board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Create(Entity),
    Update {
        id: EntityId,
        position: GridPos,
        icon: String,
    },
    Delete(EntityId),
}

impl Mutation {
    /// The id of the entity this mutation affects.
    pub fn id(&self) -> &EntityId {
        match self {
            Mutation::Create(entity) => &entity.id,
            Mutation::Update { id, .. } => id,
            Mutation::Delete(id) => id,
        }
    }

    /// Short lowercase name, matching the wire `action`.
    pub fn action(&self) -> &'static str {
        match self {
            Mutation::Create(_) => "create",
            Mutation::Update { .. } => "update",
            Mutation::Delete(_) => "delete",
        }
    }
}

/// A placeable descriptor offered by the palette.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub icon: String,
    pub kind: EntityKind,
}

impl Template {
    pub fn new(icon: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            icon: icon.into(),
            kind,
        }
    }

    /// Instantiate a new entity with a fresh id at `position`.
    pub fn instantiate(&self, position: GridPos) -> Entity {
        Entity::new(EntityId::generate(), self.kind, position, self.icon.clone())
    }
}

/// The set of templates known to this client.
///
/// Also used to recover an entity's kind from its icon, since the wire
/// format only carries the icon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateCatalog {
    templates: Vec<Template>,
}

impl TemplateCatalog {
    pub fn new(templates: Vec<Template>) -> Self {
        Self { templates }
    }

    pub fn get(&self, icon: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.icon == icon)
    }

    /// Kind for an icon; unknown icons are tokens.
    pub fn kind_for_icon(&self, icon: &str) -> EntityKind {
        self.get(icon).map(|t| t.kind).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.templates.iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::new(vec![
            Template::new("bear", EntityKind::Token),
            Template::new("dwarf", EntityKind::Token),
            Template::new("wall", EntityKind::Wall),
            Template::new("floor", EntityKind::Floor),
        ])
    }
}
