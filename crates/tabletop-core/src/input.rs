//! Input events fed to the engine by the UI layer.

use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Pointer button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointerButton {
    Left,
    Right,
    Middle,
}

/// A UI event, in board pixel coordinates.
///
/// The engine consumes these strictly in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    PointerDown {
        position: Point,
        button: PointerButton,
    },
    PointerMove {
        position: Point,
    },
    PointerUp {
        position: Point,
        button: PointerButton,
    },
    /// Escape pressed or the board lost focus.
    Cancel,
}

impl InputEvent {
    pub fn down(x: f64, y: f64) -> Self {
        Self::PointerDown {
            position: Point::new(x, y),
            button: PointerButton::Left,
        }
    }

    pub fn right_down(x: f64, y: f64) -> Self {
        Self::PointerDown {
            position: Point::new(x, y),
            button: PointerButton::Right,
        }
    }

    pub fn move_to(x: f64, y: f64) -> Self {
        Self::PointerMove {
            position: Point::new(x, y),
        }
    }

    pub fn up(x: f64, y: f64) -> Self {
        Self::PointerUp {
            position: Point::new(x, y),
            button: PointerButton::Left,
        }
    }

    /// Pointer position carried by the event, if any.
    pub fn position(&self) -> Option<Point> {
        match self {
            InputEvent::PointerDown { position, .. }
            | InputEvent::PointerMove { position }
            | InputEvent::PointerUp { position, .. } => Some(*position),
            InputEvent::Cancel => None,
        }
    }
}
