//! Server-side movement rules: turning held keys into a planar step and vetting
//! client-proposed positions against the actor's speed limit.

use crate::physics::Vector2;
use log::debug;
use shared::{MovementIntent, Position};

/// Proposed moves shorter than this are accepted before a timing baseline exists.
const BASELINE_SLACK: f32 = 0.5;

/// Displacement for one tick of held movement keys.
///
/// Diagonals are normalised so they are no faster than a single key. With a camera
/// facing, "up" means toward the camera's forward direction instead of screen-up.
pub fn planar_displacement(intent: &MovementIntent, speed: f32, dt: f32) -> Vector2 {
    let forward_amount = intent.up as i8 - intent.down as i8;
    let right_amount = intent.right as i8 - intent.left as i8;
    if forward_amount == 0 && right_amount == 0 {
        return Vector2::ZERO;
    }

    let local = Vector2::new(right_amount as f32, -(forward_amount as f32)).normalize();

    let direction = match intent.camera {
        Some((cx, cy)) => {
            let forward = Vector2::new(cx, cy).normalize();
            if forward == Vector2::ZERO {
                local
            } else {
                // local.y is negative when moving forward
                forward
                    .scale(-local.y)
                    .add(&forward.right_of().scale(local.x))
            }
        }
        None => local,
    };

    direction.scale(speed * dt)
}

/// Last position the server accepted from the client, and when.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub position: Position,
    pub timestamp: u64,
}

/// Speed sanity check for client-proposed positions.
///
/// Every proposal is measured from the last accepted [`Anchor`], not from wherever
/// the player stands now. Held keys keep moving the player between proposals, so
/// that displacement counts against the same budget as the proposal itself and the
/// two paths together can never exceed the speed limit.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementValidator {
    /// Maximum legitimate speed in world units per second.
    max_speed: f32,
    tolerance: f32,
    anchor: Option<Anchor>,
}

impl MovementValidator {
    pub fn new(max_speed: f32, tolerance: f32) -> Self {
        Self {
            max_speed,
            tolerance,
            anchor: None,
        }
    }

    /// Largest speed still accepted, in units per millisecond.
    pub fn speed_limit_per_ms(&self) -> f32 {
        self.max_speed * (1.0 + self.tolerance) / 1000.0
    }

    /// Decides whether reaching `to` at `timestamp` is physically plausible.
    ///
    /// Without an anchor only a move within `BASELINE_SLACK` of `current` passes.
    /// Does not record anything; call
    /// [`MovementValidator::commit`] once the move sticks.
    pub fn check(&self, current: &Position, to: &Position, timestamp: u64) -> bool {
        if !to.is_finite() {
            return false;
        }

        let Some(anchor) = self.anchor else {
            return current.planar_distance(to) <= BASELINE_SLACK;
        };
        if timestamp <= anchor.timestamp {
            debug!(
                "Rejecting position update with non-monotonic timestamp {} <= {}",
                timestamp, anchor.timestamp
            );
            return false;
        }

        let elapsed_ms = (timestamp - anchor.timestamp) as f32;
        let speed = anchor.position.planar_distance(to) / elapsed_ms;
        if speed > self.speed_limit_per_ms() {
            debug!(
                "Rejecting position update: {:.3} units/ms exceeds {:.3}",
                speed,
                self.speed_limit_per_ms()
            );
            return false;
        }
        true
    }

    /// Records `position` at `timestamp` as the new anchor. Timestamps never move backwards.
    pub fn commit(&mut self, position: Position, timestamp: u64) {
        let timestamp = self.anchor.map_or(timestamp, |a| a.timestamp.max(timestamp));
        self.anchor = Some(Anchor {
            position,
            timestamp,
        });
    }

    /// Moves the anchor after a server-side teleport, keeping its timestamp.
    pub fn rebase(&mut self, position: Position) {
        if let Some(anchor) = self.anchor.as_mut() {
            anchor.position = position;
        }
    }
}
