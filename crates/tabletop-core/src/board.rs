//! The client's replica of the shared board.
//!
//! [`BoardStore`] is the only place the entity map is mutated. Local
//! mutations are applied immediately and queued for transmission; remote
//! messages are applied without being queued, so nothing echoes back to
//! the server. Ordering is arrival order, last writer wins.

use std::collections::HashMap;

use kurbo::Point;

use crate::entity::{Entity, EntityId, EntityKind, Mutation, TemplateCatalog};
use crate::grid::Grid;

/// Snapshot view of all entities on the board.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardState {
    entities: HashMap<EntityId, Entity>,
}

impl BoardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities sorted by id, for stable output.
    pub fn sorted(&self) -> Vec<&Entity> {
        let mut entities: Vec<_> = self.entities.values().collect();
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        entities
    }
}

/// A message from the server, already decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteUpdate {
    /// The complete authoritative entity set.
    Snapshot(Vec<Entity>),
    /// A single change made by some participant.
    Mutation(Mutation),
}

/// Handle for removing a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&BoardState)>;

/// Owner of the board state.
pub struct BoardStore {
    state: BoardState,
    grid: Grid,
    catalog: TemplateCatalog,
    /// Locally applied mutations waiting to be sent.
    outgoing: Vec<Mutation>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
}

impl BoardStore {
    pub fn new(grid: Grid, catalog: TemplateCatalog) -> Self {
        Self {
            state: BoardState::new(),
            grid,
            catalog,
            outgoing: Vec::new(),
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn state(&self) -> &BoardState {
        &self.state
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.state.get(id)
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    // --- Mutation ---

    /// Apply a mutation made by this participant and queue it for sending.
    pub fn apply_local(&mut self, mutation: Mutation) {
        let (changed, applied) = self.apply(mutation);
        log::debug!("Local {} {}", applied.action(), applied.id());
        self.outgoing.push(applied);
        if changed {
            self.notify();
        }
    }

    /// Apply a message delivered by the server. Never queues anything.
    pub fn apply_remote(&mut self, update: RemoteUpdate) {
        let changed = match update {
            RemoteUpdate::Snapshot(entities) => self.replace_all(entities),
            RemoteUpdate::Mutation(mutation) => {
                log::debug!("Remote {} {}", mutation.action(), mutation.id());
                self.apply(mutation).0
            }
        };
        if changed {
            self.notify();
        }
    }

    /// Apply to the map. Returns whether anything changed and the mutation
    /// as actually applied (snapped, with updates of unknown ids promoted to
    /// creates).
    fn apply(&mut self, mutation: Mutation) -> (bool, Mutation) {
        match mutation {
            Mutation::Create(mut entity) => {
                self.normalize(&mut entity);
                let previous = self.state.entities.insert(entity.id.clone(), entity.clone());
                (previous.as_ref() != Some(&entity), Mutation::Create(entity))
            }
            Mutation::Update { id, position, icon } => {
                let position = self.grid.snap_pos(position);
                match self.state.entities.get_mut(&id) {
                    Some(existing) => {
                        let changed = existing.position != position || existing.icon != icon;
                        if existing.icon != icon {
                            existing.kind = self.catalog.kind_for_icon(&icon);
                        }
                        existing.position = position;
                        existing.icon = icon.clone();
                        (changed, Mutation::Update { id, position, icon })
                    }
                    None => {
                        log::debug!("Update of unknown entity {id}, treating as create");
                        let kind = self.catalog.kind_for_icon(&icon);
                        let entity = Entity::new(id, kind, position, icon);
                        self.state.entities.insert(entity.id.clone(), entity.clone());
                        (true, Mutation::Create(entity))
                    }
                }
            }
            Mutation::Delete(id) => {
                let removed = self.state.entities.remove(&id).is_some();
                (removed, Mutation::Delete(id))
            }
        }
    }

    /// Snap the position and take the kind from the catalog, so an entity
    /// built locally compares equal to the same entity decoded off the wire.
    fn normalize(&self, entity: &mut Entity) {
        entity.position = self.grid.snap_pos(entity.position);
        entity.kind = self.catalog.kind_for_icon(&entity.icon);
    }

    /// Replace the whole map with a server snapshot. The server always wins,
    /// including over local mutations it has not seen yet.
    fn replace_all(&mut self, entities: Vec<Entity>) -> bool {
        let mut next = HashMap::with_capacity(entities.len());
        for mut entity in entities {
            self.normalize(&mut entity);
            next.insert(entity.id.clone(), entity);
        }
        if next == self.state.entities {
            log::debug!("Snapshot matches local state ({} entities)", next.len());
            return false;
        }
        log::debug!(
            "Snapshot replaces local state: {} -> {} entities",
            self.state.entities.len(),
            next.len()
        );
        self.state.entities = next;
        true
    }

    // --- Outbox ---

    /// Take pending outgoing mutations (drains the queue).
    pub fn take_outgoing(&mut self) -> Vec<Mutation> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    // --- Listeners ---

    /// Register a callback invoked after every change with the finished state.
    pub fn subscribe(&mut self, listener: impl FnMut(&BoardState) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    fn notify(&mut self) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(&self.state);
        }
    }

    // --- Queries ---

    /// All entities whose cell is `(col, row)`.
    pub fn entities_in_cell(&self, col: i64, row: i64) -> Vec<&Entity> {
        self.state
            .iter()
            .filter(|e| self.grid.cell_of_pos(e.position) == (col, row))
            .collect()
    }

    /// The entity drawn on top in the cell under `point`: tokens above
    /// walls above floor tiles, ties broken by id.
    pub fn entity_at(&self, point: Point) -> Option<&Entity> {
        let (col, row) = self.grid.cell_of(point);
        self.entities_in_cell(col, row)
            .into_iter()
            .max_by(|a, b| {
                layer(a.kind)
                    .cmp(&layer(b.kind))
                    .then_with(|| b.id.cmp(&a.id))
            })
    }
}

fn layer(kind: EntityKind) -> u8 {
    match kind {
        EntityKind::Floor => 0,
        EntityKind::Wall => 1,
        EntityKind::Token => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{GridPos, Template};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn store() -> BoardStore {
        BoardStore::new(Grid::new(50), TemplateCatalog::default())
    }

    fn token(id: &str, x: i64, y: i64, icon: &str) -> Entity {
        Entity::new(id.into(), EntityKind::Token, GridPos::new(x, y), icon)
    }

    #[test]
    fn test_apply_local_queues_outgoing() {
        let mut store = store();
        store.apply_local(Mutation::Create(token("t1", 50, 100, "bear")));

        assert_eq!(store.len(), 1);
        let outgoing = store.take_outgoing();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].id().as_str(), "t1");
        assert!(!store.has_outgoing());
    }

    #[test]
    fn test_apply_local_snaps_positions() {
        let mut store = store();
        store.apply_local(Mutation::Create(token("t1", 73, 112, "bear")));
        assert_eq!(store.get(&"t1".into()).unwrap().position, GridPos::new(50, 100));

        // The queued mutation carries the snapped position too
        match &store.take_outgoing()[0] {
            Mutation::Create(e) => assert_eq!(e.position, GridPos::new(50, 100)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_apply_remote_does_not_queue() {
        let mut store = store();
        store.apply_remote(RemoteUpdate::Mutation(Mutation::Create(token("t1", 0, 0, "bear"))));
        store.apply_remote(RemoteUpdate::Snapshot(vec![token("t2", 50, 50, "dwarf")]));
        assert!(!store.has_outgoing());
        assert_eq!(store.len(), 1);
        assert!(store.get(&"t2".into()).is_some());
    }

    #[test]
    fn test_delete_unknown_is_noop() {
        let mut store = store();
        store.apply_local(Mutation::Create(token("t1", 0, 0, "bear")));
        store.apply_local(Mutation::Delete("missing".into()));
        assert_eq!(store.len(), 1);
        // Still transmitted
        assert_eq!(store.take_outgoing().len(), 2);
    }

    #[test]
    fn test_update_unknown_promotes_to_create() {
        let mut store = store();
        store.apply_local(Mutation::Update {
            id: "w1".into(),
            position: GridPos::new(100, 100),
            icon: "wall".into(),
        });

        let entity = store.get(&"w1".into()).unwrap();
        assert_eq!(entity.kind, EntityKind::Wall);
        assert_eq!(entity.position, GridPos::new(100, 100));
        assert!(matches!(store.take_outgoing()[0], Mutation::Create(_)));
    }

    #[test]
    fn test_update_moves_entity() {
        let mut store = store();
        store.apply_local(Mutation::Create(token("t1", 0, 0, "bear")));
        store.apply_local(Mutation::Update {
            id: "t1".into(),
            position: GridPos::new(149, 201),
            icon: "bear".into(),
        });
        assert_eq!(store.get(&"t1".into()).unwrap().position, GridPos::new(150, 200));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_optimistic_then_confirm_converges() {
        let mut store = store();
        let notified = Rc::new(RefCell::new(0));
        let counter = notified.clone();
        store.subscribe(move |_| *counter.borrow_mut() += 1);

        store.apply_local(Mutation::Create(token("t1", 50, 100, "bear")));
        let before = store.state().clone();
        assert_eq!(*notified.borrow(), 1);

        store.apply_remote(RemoteUpdate::Snapshot(vec![token("t1", 50, 100, "bear")]));
        assert_eq!(store.state(), &before);
        // No second notification for an identical snapshot
        assert_eq!(*notified.borrow(), 1);
    }

    #[test]
    fn test_uncatalogued_template_converges() {
        let mut store = store();
        let notified = Rc::new(RefCell::new(0));
        let counter = notified.clone();
        store.subscribe(move |_| *counter.borrow_mut() += 1);

        // "tree" is not in the catalog, so the wire cannot say it is a floor
        let tree = Template::new("tree", EntityKind::Floor).instantiate(GridPos::new(73, 112));
        let id = tree.id.clone();
        store.apply_local(Mutation::Create(tree));
        let before = store.state().clone();
        assert_eq!(store.get(&id).unwrap().kind, EntityKind::Token);

        let echo = Entity::new(id, EntityKind::Token, GridPos::new(50, 100), "tree");
        store.apply_remote(RemoteUpdate::Snapshot(vec![echo]));
        assert_eq!(store.state(), &before);
        assert_eq!(*notified.borrow(), 1);
    }

    #[test]
    fn test_kind_follows_catalog() {
        let mut store = store();
        store.apply_local(Mutation::Create(Entity::new(
            "w".into(),
            EntityKind::Token,
            GridPos::new(0, 0),
            "wall",
        )));
        assert_eq!(store.get(&"w".into()).unwrap().kind, EntityKind::Wall);
    }

    #[test]
    fn test_delete_then_recreate() {
        let mut store = store();
        store.apply_local(Mutation::Create(token("x", 100, 100, "bear")));
        store.apply_local(Mutation::Delete("x".into()));
        store.apply_local(Mutation::Create(token("y", 100, 100, "bear")));

        let here = store.entities_in_cell(2, 2);
        assert_eq!(here.len(), 1);
        assert_eq!(here[0].id.as_str(), "y");
    }

    #[test]
    fn test_snapshot_server_wins() {
        let mut store = store();
        store.apply_local(Mutation::Create(token("pending", 0, 0, "bear")));
        store.apply_remote(RemoteUpdate::Snapshot(vec![token("other", 50, 0, "dwarf")]));
        assert!(store.get(&"pending".into()).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_snapshot_positions_are_resnapped() {
        let mut store = store();
        store.apply_remote(RemoteUpdate::Snapshot(vec![token("t1", 73, 112, "bear")]));
        assert_eq!(store.get(&"t1".into()).unwrap().position, GridPos::new(50, 100));
    }

    #[test]
    fn test_last_remote_writer_wins() {
        let mut store = store();
        store.apply_local(Mutation::Create(token("t1", 0, 0, "bear")));
        store.apply_remote(RemoteUpdate::Mutation(Mutation::Update {
            id: "t1".into(),
            position: GridPos::new(200, 0),
            icon: "bear".into(),
        }));
        assert_eq!(store.get(&"t1".into()).unwrap().position, GridPos::new(200, 0));
    }

    #[test]
    fn test_listener_sees_finished_state() {
        let mut store = store();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let id = store.subscribe(move |state| sink.borrow_mut().push(state.len()));

        store.apply_local(Mutation::Create(token("a", 0, 0, "bear")));
        store.apply_local(Mutation::Create(token("b", 50, 0, "bear")));
        store.apply_local(Mutation::Delete("a".into()));
        assert_eq!(*seen.borrow(), vec![1, 2, 1]);

        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.apply_local(Mutation::Delete("b".into()));
        assert_eq!(seen.borrow().len(), 3);
    }

    #[test]
    fn test_entity_at_prefers_tokens() {
        let mut store = store();
        store.apply_local(Mutation::Create(Entity::new(
            "f".into(),
            EntityKind::Floor,
            GridPos::new(50, 50),
            "floor",
        )));
        store.apply_local(Mutation::Create(token("t", 50, 50, "bear")));

        assert_eq!(store.entity_at(Point::new(60.0, 99.0)).unwrap().id.as_str(), "t");
        assert!(store.entity_at(Point::new(10.0, 10.0)).is_none());
        assert_eq!(store.entities_in_cell(1, 1).len(), 2);
    }
}
