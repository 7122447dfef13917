//! Input handling.
//!
//! A headless client has no keyboard, so input comes from a wander routine:
//! keep a heading for a few steps, then turn by a random amount.

use horde_shared::math::Vec2;
use rand::Rng;

#[derive(Debug, Clone)]
pub struct Wander {
    heading: f32,
    step: f32,
    steps_left: u32,
    /// Keeps the walker inside `[-bound, bound]` on both axes.
    bound: f32,
}

impl Wander {
    pub fn new(step: f32, bound: f32) -> Self {
        Self {
            heading: 0.0,
            step,
            steps_left: 0,
            bound,
        }
    }

    /// Next position from `at`.
    pub fn next(&mut self, at: Vec2, rng: &mut impl Rng) -> Vec2 {
        if self.steps_left == 0 {
            self.heading += rng.gen_range(-1.5..1.5);
            self.steps_left = rng.gen_range(5..20);
        }
        self.steps_left -= 1;

        let mut to = at + Vec2::from_angle(self.heading).scale(self.step);
        if to.x.abs() > self.bound || to.y.abs() > self.bound {
            // Head back toward the origin.
            self.heading = (Vec2::ZERO - at).angle();
            to = at + Vec2::from_angle(self.heading).scale(self.step);
        }
        to
    }
}
