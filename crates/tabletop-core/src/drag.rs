//! Drag-and-drop state machine.
//!
//! `Idle -> Dragging -> {Dropped, Cancelled}`. A terminal transition
//! discards the session, which puts the controller back in `Idle`. At most
//! one drag is active at a time.

use kurbo::Point;

use crate::droppable::{DropHandle, DropTarget, DropZone, DroppableRegistry};
use crate::entity::{Entity, EntityKind, GridPos, Mutation, Template};
use crate::grid::Grid;

/// What is being dragged.
#[derive(Debug, Clone, PartialEq)]
pub enum DragSource {
    /// An entity already on the board, as it was at pick-up.
    Entity(Entity),
    /// A new entity from the palette.
    Template(Template),
}

impl DragSource {
    pub fn kind(&self) -> EntityKind {
        match self {
            DragSource::Entity(entity) => entity.kind,
            DragSource::Template(template) => template.kind,
        }
    }
}

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging,
}

/// How the last session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragEnd {
    Dropped,
    Cancelled,
}

/// An in-progress drag.
#[derive(Debug, Clone)]
pub struct DragSession {
    pub source: DragSource,
    /// Pointer position at pick-up.
    pub origin: Point,
    /// Latest pointer position.
    pub current: Point,
    /// Target under the pointer, if any.
    pub target: Option<(DropHandle, DropTarget)>,
}

impl DragSession {
    pub fn target(&self) -> Option<&DropTarget> {
        self.target.as_ref().map(|(_, t)| t)
    }
}

/// Result of a drop.
#[derive(Debug, Clone, PartialEq)]
pub struct DropOutcome {
    /// Mutation to hand to the board store, if the drop changes anything.
    pub mutation: Option<Mutation>,
    /// Target the drop landed on.
    pub target: Option<DropTarget>,
}

/// Owns the (at most one) active drag session.
#[derive(Debug, Default)]
pub struct DragController {
    session: Option<DragSession>,
    last_end: Option<DragEnd>,
}

impl DragController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DragState {
        if self.session.is_some() {
            DragState::Dragging
        } else {
            DragState::Idle
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&DragSession> {
        self.session.as_ref()
    }

    pub fn last_end(&self) -> Option<DragEnd> {
        self.last_end
    }

    /// Begin a drag. Ignored if one is already in progress.
    pub fn start(
        &mut self,
        source: DragSource,
        pointer: Point,
        registry: &DroppableRegistry,
    ) -> bool {
        if self.session.is_some() {
            log::debug!("Drag already active, ignoring start");
            return false;
        }
        let target = registry.hit_test_accepting(pointer, source.kind());
        log::debug!("Drag started at ({}, {})", pointer.x, pointer.y);
        self.session = Some(DragSession {
            source,
            origin: pointer,
            current: pointer,
            target,
        });
        true
    }

    /// Track the pointer. Returns the target now under it.
    pub fn move_to(&mut self, pointer: Point, registry: &DroppableRegistry) -> Option<&DropTarget> {
        let session = self.session.as_mut()?;
        session.current = pointer;
        session.target = registry.hit_test_accepting(pointer, session.source.kind());
        session.target()
    }

    /// Finish the drag at `pointer`.
    ///
    /// The target is resolved afresh so a region that unmounted during the
    /// drag can never receive the drop.
    pub fn drop_at(
        &mut self,
        pointer: Point,
        registry: &DroppableRegistry,
        grid: &Grid,
    ) -> Option<DropOutcome> {
        let mut session = self.session.take()?;
        session.current = pointer;
        let target = registry
            .hit_test_accepting(pointer, session.source.kind())
            .map(|(_, t)| t);
        self.last_end = Some(DragEnd::Dropped);

        let removal = target.as_ref().is_some_and(|t| t.zone == DropZone::Removal);
        let mutation = match session.source {
            DragSource::Template(template) => {
                if removal {
                    None
                } else {
                    Some(Mutation::Create(template.instantiate(grid.snap_point(pointer))))
                }
            }
            DragSource::Entity(entity) => {
                if removal {
                    Some(Mutation::Delete(entity.id))
                } else {
                    // Keep the grab offset: move by the pointer delta, then snap
                    let dx = pointer.x - session.origin.x;
                    let dy = pointer.y - session.origin.y;
                    let position = GridPos::new(
                        grid.snap(entity.position.x as f64 + dx),
                        grid.snap(entity.position.y as f64 + dy),
                    );
                    Some(Mutation::Update {
                        id: entity.id,
                        position,
                        icon: entity.icon,
                    })
                }
            }
        };

        log::debug!(
            "Drag dropped at ({}, {}) on {:?}",
            pointer.x,
            pointer.y,
            target.as_ref().map(|t| t.id.as_str())
        );
        Some(DropOutcome { mutation, target })
    }

    /// Abandon the drag. Returns false if nothing was being dragged.
    pub fn cancel(&mut self) -> bool {
        if self.session.take().is_some() {
            self.last_end = Some(DragEnd::Cancelled);
            log::debug!("Drag cancelled");
            true
        } else {
            false
        }
    }

    /// Forget the current target if it is `handle` (its region unmounted).
    pub fn clear_target_if(&mut self, handle: DropHandle) {
        if let Some(session) = self.session.as_mut() {
            if session.target.as_ref().is_some_and(|(h, _)| *h == handle) {
                session.target = None;
            }
        }
    }
}
