//! Plane vector math and the vertical (jump/gravity) body shared by moving actors.

///Represents a vector on the tile plane.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector2 {
    ///Value along the x-axis.
    /// Positive direction is to the right.
    pub x: f32,
    ///Value along the y-axis.
    /// Positive direction is down the grid (increasing row).
    pub y: f32,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    ///Returns the normalized vector.
    pub fn normalize(&self) -> Vector2 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vector2::ZERO
        } else {
            Vector2 {
                x: self.x / mag,
                y: self.y / mag,
            }
        }
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vector2 {
        Vector2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    ///Returns the sum of two vectors.
    pub fn add(&self, other: &Vector2) -> Vector2 {
        Vector2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    /// Right-hand perpendicular for a forward vector with y pointing down the grid.
    pub fn right_of(&self) -> Vector2 {
        Vector2 {
            x: -self.y,
            y: self.x,
        }
    }
}

/// Height at or below which an actor counts as standing on the ground.
pub const GROUND_EPSILON: f32 = 0.01;

/// Persisted vertical state of an actor: height above ground and vertical speed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VerticalBody {
    pub height: f32,
    pub velocity: f32,
}

impl VerticalBody {
    pub fn grounded(&self) -> bool {
        self.height <= GROUND_EPSILON
    }

    /// Starts a jump if the body is on the ground. Returns whether it took off.
    pub fn jump(&mut self, impulse: f32) -> bool {
        if !self.grounded() {
            return false;
        }
        self.velocity = impulse;
        true
    }

    ///Advances the body by one step of gravity and lands it on the ground.
    pub fn simulate(&mut self, gravity: f32, dt: f32) {
        self.velocity -= gravity * dt;
        self.height += self.velocity * dt;

        if self.height <= 0.0 {
            self.height = 0.0;
            self.velocity = 0.0;
        }
    }
}
