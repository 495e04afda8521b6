//! Engine coordinator.
//!
//! Owns the grid, drop target registry, board store, connection and drag
//! controller, and wires them together. Everything runs on the caller's
//! thread: the UI feeds [`InputEvent`]s in and calls [`Engine::poll`] once
//! per frame to pick up server traffic.

use std::sync::Arc;
use std::time::Instant;

use kurbo::Point;

use crate::board::{BoardState, BoardStore, SubscriptionId};
use crate::config::EngineConfig;
use crate::drag::{DragController, DragSource, DropOutcome};
use crate::droppable::{DropHandle, DropTarget, DroppableRegistry};
use crate::entity::{Entity, EntityId, Mutation, Template, TemplateCatalog};
use crate::grid::Grid;
use crate::input::{InputEvent, PointerButton};
#[cfg(not(target_arch = "wasm32"))]
use crate::sync::HttpDiscovery;
use crate::sync::{ConnectionEvent, EndpointDiscovery, PlatformTransport, SyncConnection, Transport};

pub struct Engine<T: Transport = PlatformTransport> {
    config: EngineConfig,
    grid: Grid,
    registry: DroppableRegistry,
    store: BoardStore,
    connection: SyncConnection<T>,
    drag: DragController,
    /// Template placed by a plain click on empty board.
    stamp: Option<Template>,
}

impl<T: Transport> Engine<T> {
    pub fn new(config: EngineConfig, transport: T) -> Self {
        let grid = Grid::new(config.cell_size);
        let registry = DroppableRegistry::new();
        let store = BoardStore::new(grid, config.templates.clone());
        let connection =
            SyncConnection::new(transport, config.templates.clone(), config.reconnect);
        let drag = DragController::new();
        log::debug!("Engine created, cell size {}", grid.cell_size());
        Self {
            config,
            grid,
            registry,
            store,
            connection,
            drag,
            stamp: None,
        }
    }

    // --- Accessors ---

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn state(&self) -> &BoardState {
        self.store.state()
    }

    pub fn store(&self) -> &BoardStore {
        &self.store
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        self.store.catalog()
    }

    pub fn registry(&self) -> &DroppableRegistry {
        &self.registry
    }

    pub fn drag(&self) -> &DragController {
        &self.drag
    }

    pub fn connection(&self) -> &SyncConnection<T> {
        &self.connection
    }

    pub fn stamp(&self) -> Option<&Template> {
        self.stamp.as_ref()
    }

    // --- Connection ---

    pub fn connect(&mut self, discovery: Arc<dyn EndpointDiscovery>) {
        self.connection.connect(discovery);
    }

    /// Connect using the configured discovery URL.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn connect_default(&mut self) {
        let discovery =
            HttpDiscovery::new(self.config.discovery_url.clone(), self.config.discovery_timeout());
        self.connection.connect(Arc::new(discovery));
    }

    pub fn disconnect(&mut self) {
        self.connection.disconnect();
    }

    pub fn ping(&mut self) {
        self.connection.ping();
    }

    pub fn add_connection_observer(&mut self, observer: impl FnMut(&ConnectionEvent) + 'static) {
        self.connection.add_observer(observer);
    }

    /// Process pending server traffic.
    pub fn poll(&mut self) {
        self.poll_at(Instant::now());
    }

    pub fn poll_at(&mut self, now: Instant) {
        for update in self.connection.poll_at(now) {
            self.store.apply_remote(update);
        }
        self.flush();
    }

    fn flush(&mut self) {
        for mutation in self.store.take_outgoing() {
            self.connection.send(&mutation);
        }
    }

    // --- Board ---

    pub fn subscribe(&mut self, listener: impl FnMut(&BoardState) + 'static) -> SubscriptionId {
        self.store.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }

    /// Apply a local change and send it.
    pub fn apply_local(&mut self, mutation: Mutation) {
        self.store.apply_local(mutation);
        self.flush();
    }

    /// Place a new entity from `template` at the cell nearest `point`.
    pub fn place(&mut self, template: &Template, point: Point) -> EntityId {
        let entity = template.instantiate(self.grid.snap_point(point));
        let id = entity.id.clone();
        self.apply_local(Mutation::Create(entity));
        id
    }

    /// Move an existing entity to the cell nearest `point`. Returns false if
    /// the id is unknown.
    pub fn move_entity(&mut self, id: &EntityId, point: Point) -> bool {
        let Some(icon) = self.store.get(id).map(|e| e.icon.clone()) else {
            return false;
        };
        self.apply_local(Mutation::Update {
            id: id.clone(),
            position: self.grid.snap_point(point),
            icon,
        });
        true
    }

    /// Delete every entity in the cell containing `point`. Returns how many.
    pub fn remove_at(&mut self, point: Point) -> usize {
        let (col, row) = self.grid.cell_of(point);
        let ids: Vec<EntityId> = self
            .store
            .entities_in_cell(col, row)
            .into_iter()
            .map(|e| e.id.clone())
            .collect();
        for id in &ids {
            self.apply_local(Mutation::Delete(id.clone()));
        }
        ids.len()
    }

    pub fn entity_at(&self, point: Point) -> Option<&Entity> {
        self.store.entity_at(point)
    }

    /// Arm (or with `None`, disarm) click-to-place.
    pub fn set_stamp(&mut self, template: Option<Template>) {
        self.stamp = template;
    }

    // --- Drop targets ---

    pub fn register_drop_target(&mut self, target: DropTarget) -> DropHandle {
        self.registry.register(target)
    }

    /// Remove a drop target. A drag hovering it forgets it immediately.
    pub fn unregister_drop_target(&mut self, handle: DropHandle) -> bool {
        self.drag.clear_target_if(handle);
        self.registry.unregister(handle)
    }

    // --- Input ---

    /// Start dragging a palette template. The palette lives outside the
    /// board, so the UI calls this instead of sending a pointer-down.
    pub fn begin_template_drag(&mut self, template: Template, pointer: Point) -> bool {
        self.drag
            .start(DragSource::Template(template), pointer, &self.registry)
    }

    /// Feed one UI event. Events must arrive in the order they happened.
    pub fn handle_input(&mut self, event: InputEvent) -> Option<DropOutcome> {
        match event {
            InputEvent::PointerDown {
                position,
                button: PointerButton::Left,
            } => {
                self.pointer_down(position);
                None
            }
            InputEvent::PointerDown {
                position,
                button: PointerButton::Right,
            } => {
                if !self.drag.is_dragging() {
                    let removed = self.remove_at(position);
                    log::debug!("Right click removed {removed} entities");
                }
                None
            }
            InputEvent::PointerDown { .. } => None,
            InputEvent::PointerMove { position } => {
                self.drag.move_to(position, &self.registry);
                None
            }
            InputEvent::PointerUp {
                position,
                button: PointerButton::Left,
            } => {
                let outcome = self.drag.drop_at(position, &self.registry, &self.grid)?;
                if let Some(mutation) = outcome.mutation.clone() {
                    self.apply_local(mutation);
                }
                Some(outcome)
            }
            InputEvent::PointerUp { .. } => None,
            InputEvent::Cancel => {
                self.drag.cancel();
                None
            }
        }
    }

    fn pointer_down(&mut self, position: Point) {
        if self.drag.is_dragging() {
            return;
        }
        if let Some(entity) = self.store.entity_at(position).cloned() {
            self.drag
                .start(DragSource::Entity(entity), position, &self.registry);
        } else if let Some(template) = self.stamp.clone() {
            self.place(&template, position);
        }
    }
}
