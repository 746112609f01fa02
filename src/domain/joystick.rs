//! Joystick geometry engine.
//!
//! Maps a 2D pointer offset from a reference center into a
//! magnitude-clamped, Y-inverted, quantized command vector, and tracks
//! the press/drag/release state of the on-screen pad for the UI to
//! redraw.

use crate::domain::models::StickVector;

type MoveHandler = Box<dyn FnMut(StickVector) + Send>;
type StopHandler = Box<dyn FnMut() + Send>;

/// Map a pointer offset from the pad center into a command vector.
///
/// The offset is treated as a polar vector: its magnitude is clamped to
/// `max_radius` with the direction preserved (the stick cannot leave the
/// ring, rather than being boxed into a square), rescaled to `[0, 255]`
/// and projected back to Cartesian. The Y axis is negated so that "up"
/// on the input surface maps to a positive forward command; screen Y
/// grows downward.
pub fn compute_vector(dx: f64, dy: f64, max_radius: f64) -> StickVector {
    if max_radius <= 0.0 {
        return StickVector::default();
    }

    let distance = dx.hypot(dy);
    let angle = dy.atan2(dx);
    let clamped = distance.min(max_radius);

    let x = (clamped * angle.cos() / max_radius * 255.0).round() as i16;
    let y = -((clamped * angle.sin() / max_radius * 255.0).round() as i16);

    StickVector { x, y }
}

/// Pointer-driven joystick pad.
///
/// The pad consumes client coordinates relative to a caller-supplied
/// center and radius; it never reads input events itself. After each
/// recompute the current vector and active flag are available for the
/// surrounding UI to render. `on_move` fires on every recomputed vector
/// while pressed, `on_stop` fires on release; absent handlers are
/// no-ops.
pub struct JoystickPad {
    center_x: f64,
    center_y: f64,
    max_radius: f64,
    active: bool,
    vector: StickVector,
    on_move: Option<MoveHandler>,
    on_stop: Option<StopHandler>,
}

impl JoystickPad {
    pub fn new(center_x: f64, center_y: f64, max_radius: f64) -> Self {
        Self {
            center_x,
            center_y,
            max_radius,
            active: false,
            vector: StickVector::default(),
            on_move: None,
            on_stop: None,
        }
    }

    pub fn set_on_move(&mut self, handler: impl FnMut(StickVector) + Send + 'static) {
        self.on_move = Some(Box::new(handler));
    }

    pub fn set_on_stop(&mut self, handler: impl FnMut() + Send + 'static) {
        self.on_stop = Some(Box::new(handler));
    }

    /// Pointer pressed at `(client_x, client_y)`.
    pub fn press(&mut self, client_x: f64, client_y: f64) {
        self.active = true;
        self.update(client_x, client_y);
    }

    /// Pointer moved while pressed. Ignored when the pad is not active.
    pub fn drag(&mut self, client_x: f64, client_y: f64) {
        if self.active {
            self.update(client_x, client_y);
        }
    }

    /// Pointer released. The vector snaps back to `(0, 0)` regardless of
    /// the last position.
    pub fn release(&mut self) {
        self.active = false;
        self.vector = StickVector::default();

        if let Some(handler) = &mut self.on_stop {
            handler();
        }
    }

    /// Current vector, for redraw.
    pub fn vector(&self) -> StickVector {
        self.vector
    }

    /// Whether the pad is currently pressed, for redraw.
    pub fn is_active(&self) -> bool {
        self.active
    }

    fn update(&mut self, client_x: f64, client_y: f64) {
        let dx = client_x - self.center_x;
        let dy = client_y - self.center_y;
        self.vector = compute_vector(dx, dy, self.max_radius);

        if let Some(handler) = &mut self.on_move {
            handler(self.vector);
        }
    }
}
