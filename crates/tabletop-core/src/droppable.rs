//! Registry of drop targets and point hit-testing.
//!
//! Drop targets are regions mounted by the UI layer (a removal tray, a
//! staging area, a single highlighted cell). The registry keeps them in
//! registration order; later registrations stack above earlier ones, so a
//! hit test scans from the back and returns the first target that contains
//! the point.

use kurbo::{Point, Rect};

use crate::entity::EntityKind;
use crate::grid::Grid;

/// Opaque handle returned by [`DroppableRegistry::register`]. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DropHandle(u64);

/// What happens to an entity dropped onto a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DropZone {
    /// Ordinary special area: placement proceeds, the target is reported.
    #[default]
    Zone,
    /// Removal tray: dropped entities are deleted.
    Removal,
}

/// A droppable region.
#[derive(Debug, Clone, PartialEq)]
pub struct DropTarget {
    /// Identifier chosen by the UI layer.
    pub id: String,
    pub bounds: Rect,
    pub zone: DropZone,
    /// Kinds this target accepts. Empty means every kind.
    pub accepts: Vec<EntityKind>,
}

impl DropTarget {
    pub fn new(id: impl Into<String>, bounds: Rect) -> Self {
        Self {
            id: id.into(),
            bounds,
            zone: DropZone::Zone,
            accepts: Vec::new(),
        }
    }

    /// A target covering exactly one grid cell.
    pub fn cell(id: impl Into<String>, grid: &Grid, col: i64, row: i64) -> Self {
        Self::new(id, grid.cell_rect(col, row))
    }

    pub fn with_zone(mut self, zone: DropZone) -> Self {
        self.zone = zone;
        self
    }

    pub fn accepting(mut self, kinds: &[EntityKind]) -> Self {
        self.accepts = kinds.to_vec();
        self
    }

    pub fn accepts(&self, kind: EntityKind) -> bool {
        self.accepts.is_empty() || self.accepts.contains(&kind)
    }

    /// Half-open containment: the far edges belong to the neighbour.
    pub fn contains(&self, point: Point) -> bool {
        let b = self.bounds;
        point.x >= b.x0 && point.x < b.x1 && point.y >= b.y0 && point.y < b.y1
    }
}

/// The set of currently mounted drop targets.
#[derive(Debug, Clone, Default)]
pub struct DroppableRegistry {
    /// Targets in registration order (back to front).
    targets: Vec<(DropHandle, DropTarget)>,
    next_handle: u64,
}

impl DroppableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a target above all existing ones.
    pub fn register(&mut self, target: DropTarget) -> DropHandle {
        let handle = DropHandle(self.next_handle);
        self.next_handle += 1;
        log::debug!("Registered drop target '{}' as {:?}", target.id, handle);
        self.targets.push((handle, target));
        handle
    }

    /// Remove a target. Returns false if it was already gone.
    pub fn unregister(&mut self, handle: DropHandle) -> bool {
        match self.targets.iter().position(|(h, _)| *h == handle) {
            Some(index) => {
                let (_, target) = self.targets.remove(index);
                log::debug!("Unregistered drop target '{}' ({:?})", target.id, handle);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, handle: DropHandle) -> bool {
        self.targets.iter().any(|(h, _)| *h == handle)
    }

    pub fn get(&self, handle: DropHandle) -> Option<&DropTarget> {
        self.targets
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, t)| t)
    }

    /// Topmost target containing `point`.
    pub fn hit_test(&self, point: Point) -> Option<(DropHandle, DropTarget)> {
        self.scan(point, |_| true)
    }

    /// Topmost target containing `point` that accepts `kind`.
    pub fn hit_test_accepting(
        &self,
        point: Point,
        kind: EntityKind,
    ) -> Option<(DropHandle, DropTarget)> {
        self.scan(point, |t| t.accepts(kind))
    }

    fn scan(
        &self,
        point: Point,
        filter: impl Fn(&DropTarget) -> bool,
    ) -> Option<(DropHandle, DropTarget)> {
        self.targets
            .iter()
            .rev()
            .find(|(_, t)| t.contains(point) && filter(t))
            .map(|(h, t)| (*h, t.clone()))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn clear(&mut self) {
        self.targets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Rect {
        Rect::new(x0, y0, x1, y1)
    }

    #[test]
    fn test_hit_test_empty() {
        let registry = DroppableRegistry::new();
        assert!(registry.hit_test(Point::new(10.0, 10.0)).is_none());
    }

    #[test]
    fn test_hit_test_z_order() {
        let mut registry = DroppableRegistry::new();
        let a = registry.register(DropTarget::new("a", rect(0.0, 0.0, 100.0, 100.0)));
        let b = registry.register(DropTarget::new("b", rect(50.0, 50.0, 150.0, 150.0)));

        // Overlap: most recently registered wins
        let (handle, target) = registry.hit_test(Point::new(75.0, 75.0)).unwrap();
        assert_eq!(handle, b);
        assert_eq!(target.id, "b");

        // Only in a
        let (handle, _) = registry.hit_test(Point::new(10.0, 10.0)).unwrap();
        assert_eq!(handle, a);

        // Outside both
        assert!(registry.hit_test(Point::new(200.0, 10.0)).is_none());
    }

    #[test]
    fn test_half_open_bounds() {
        let grid = Grid::new(50);
        let mut registry = DroppableRegistry::new();
        registry.register(DropTarget::cell("left", &grid, 0, 0));
        registry.register(DropTarget::cell("right", &grid, 1, 0));

        assert_eq!(registry.hit_test(Point::new(0.0, 0.0)).unwrap().1.id, "left");
        assert_eq!(registry.hit_test(Point::new(49.9, 10.0)).unwrap().1.id, "left");
        assert_eq!(registry.hit_test(Point::new(50.0, 10.0)).unwrap().1.id, "right");
        assert!(registry.hit_test(Point::new(100.0, 10.0)).is_none());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let mut registry = DroppableRegistry::new();
        let a = registry.register(DropTarget::new("a", rect(0.0, 0.0, 10.0, 10.0)));
        assert!(registry.unregister(a));
        assert!(!registry.unregister(a));
        assert!(registry.is_empty());
        assert!(registry.hit_test(Point::new(5.0, 5.0)).is_none());
    }

    #[test]
    fn test_handles_are_not_reused() {
        let mut registry = DroppableRegistry::new();
        let a = registry.register(DropTarget::new("a", rect(0.0, 0.0, 10.0, 10.0)));
        registry.unregister(a);
        let b = registry.register(DropTarget::new("a", rect(0.0, 0.0, 20.0, 20.0)));
        assert_ne!(a, b);
        assert!(!registry.contains(a));
        assert!(registry.contains(b));
    }

    #[test]
    fn test_hit_result_survives_unregister() {
        let mut registry = DroppableRegistry::new();
        let a = registry.register(DropTarget::new("a", rect(0.0, 0.0, 10.0, 10.0)));
        let hit = registry.hit_test(Point::new(5.0, 5.0));
        registry.unregister(a);

        // The owned copy is still readable, and a fresh scan no longer sees it
        assert_eq!(hit.unwrap().1.id, "a");
        assert!(registry.hit_test(Point::new(5.0, 5.0)).is_none());
    }

    #[test]
    fn test_hit_test_accepting_skips_to_lower_target() {
        let mut registry = DroppableRegistry::new();
        registry.register(DropTarget::new("any", rect(0.0, 0.0, 100.0, 100.0)));
        registry.register(
            DropTarget::new("walls-only", rect(0.0, 0.0, 100.0, 100.0))
                .accepting(&[EntityKind::Wall]),
        );

        let p = Point::new(50.0, 50.0);
        assert_eq!(
            registry.hit_test_accepting(p, EntityKind::Wall).unwrap().1.id,
            "walls-only"
        );
        assert_eq!(
            registry.hit_test_accepting(p, EntityKind::Token).unwrap().1.id,
            "any"
        );
    }
}
