//! Tabletop Core Library
//!
//! Client-side engine for a shared grid tabletop: board state replica,
//! drag/drop hit-testing and the persistent connection that keeps the
//! replica in sync with the server.

pub mod board;
pub mod config;
pub mod drag;
pub mod droppable;
pub mod engine;
pub mod entity;
pub mod error;
pub mod grid;
pub mod input;
pub mod sync;

pub use board::{BoardState, BoardStore, RemoteUpdate, SubscriptionId};
pub use config::{EngineConfig, ReconnectPolicy};
pub use drag::{DragController, DragEnd, DragSession, DragSource, DragState, DropOutcome};
pub use droppable::{DropHandle, DropTarget, DropZone, DroppableRegistry};
pub use engine::Engine;
pub use entity::{Entity, EntityId, EntityKind, GridPos, Mutation, Template, TemplateCatalog};
pub use error::{ConfigError, SyncError, SyncResult};
pub use grid::{DEFAULT_CELL_SIZE, Grid};
pub use input::{InputEvent, PointerButton};
#[cfg(not(target_arch = "wasm32"))]
pub use sync::WsTransport;
pub use sync::{ConnectionEvent, ConnectionState, PlatformTransport, SyncConnection, Transport};
