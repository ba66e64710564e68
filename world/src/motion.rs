//! Execution of single grid steps as constant-rate world-space motion.

use glam::Vec2;
use gridroute_core::GridCoord;
use std::time::Duration;

/// Tuning for step execution, shared by every agent in a world.
#[derive(Clone, Copy, Debug)]
pub struct MotionConfig {
    default_speed: f32,
    min_step_time: f32,
    max_step_time: f32,
    retry_delay: Duration,
}

impl MotionConfig {
    /// Creates a config. Step durations derived from agent speeds are
    /// clamped into `min_step_time..=max_step_time` seconds.
    #[must_use]
    pub const fn new(
        default_speed: f32,
        min_step_time: f32,
        max_step_time: f32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            default_speed,
            min_step_time,
            max_step_time,
            retry_delay,
        }
    }

    /// Reference speed that maps to a quarter-second step.
    #[must_use]
    pub const fn default_speed(&self) -> f32 {
        self.default_speed
    }

    /// How long a blocked agent waits before retrying its step.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Seconds one step takes at the given speed, before terrain penalties.
    #[must_use]
    pub fn step_time(&self, speed: f32) -> f32 {
        if speed <= 0.0 {
            return self.max_step_time;
        }
        (0.25 * self.default_speed / speed).clamp(self.min_step_time, self.max_step_time)
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self::new(1.0, 0.05, 1.0, Duration::from_millis(100))
    }
}

/// Result of advancing a step by one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step is still in flight.
    InFlight,
    /// The step ended this tick.
    Completed {
        /// True when the step ended through a cancellation request rather
        /// than by reaching its destination.
        cancelled: bool,
    },
}

/// One in-flight step between adjacent cells.
///
/// The agent's world position moves at a constant rate from the departure
/// cell center toward the arrival cell center. Intermediate steps finish as
/// soon as the position crosses the arrival center on the dominant movement
/// axis; the final step of a path instead finishes when the remaining
/// distance drops inside a snap tolerance, which absorbs the float drift a
/// long path accumulates. Either way the position snaps to the arrival
/// center, except on cancellation, where the position is left where the
/// previous tick put it.
#[derive(Clone, Debug)]
pub struct StepMotion {
    from: GridCoord,
    to: GridCoord,
    from_center: Vec2,
    to_center: Vec2,
    position: Vec2,
    rate: f32,
    tolerance: f32,
    final_step: bool,
    cancel_requested: bool,
}

impl StepMotion {
    /// Begins a step that covers the distance between the two cell centers
    /// in `duration` seconds.
    #[must_use]
    pub fn new(
        from: GridCoord,
        to: GridCoord,
        from_center: Vec2,
        to_center: Vec2,
        duration: f32,
        tolerance: f32,
        final_step: bool,
    ) -> Self {
        let distance = from_center.distance(to_center);
        let rate = if duration > 0.0 {
            distance / duration
        } else {
            distance
        };
        Self {
            from,
            to,
            from_center,
            to_center,
            position: from_center,
            rate,
            tolerance,
            final_step,
            cancel_requested: false,
        }
    }

    /// Cell the step departs from.
    #[must_use]
    pub const fn from(&self) -> GridCoord {
        self.from
    }

    /// Cell the step arrives into.
    #[must_use]
    pub const fn to(&self) -> GridCoord {
        self.to
    }

    /// Current interpolated world position.
    #[must_use]
    pub const fn position(&self) -> Vec2 {
        self.position
    }

    /// Asks the step to end at the next tick without reaching its target.
    pub fn request_cancel(&mut self) {
        self.cancel_requested = true;
    }

    /// Advances the step by `dt` seconds.
    pub fn advance(&mut self, dt: f32) -> StepOutcome {
        if self.cancel_requested {
            return StepOutcome::Completed { cancelled: true };
        }
        let delta = self.to_center - self.from_center;
        let distance = delta.length();
        if distance <= f32::EPSILON {
            self.position = self.to_center;
            return StepOutcome::Completed { cancelled: false };
        }
        let direction = delta / distance;
        let remaining = self.position.distance(self.to_center);
        let travel = self.rate * dt;
        if travel >= remaining {
            self.position = self.to_center;
        } else {
            self.position += direction * travel;
        }
        let arrived = if self.final_step {
            self.position.distance(self.to_center) <= self.tolerance
        } else {
            self.crossed_dominant_axis(delta)
        };
        if arrived {
            self.position = self.to_center;
            StepOutcome::Completed { cancelled: false }
        } else {
            StepOutcome::InFlight
        }
    }

    fn crossed_dominant_axis(&self, delta: Vec2) -> bool {
        if delta.x.abs() >= delta.y.abs() {
            if delta.x >= 0.0 {
                self.position.x >= self.to_center.x
            } else {
                self.position.x <= self.to_center.x
            }
        } else if delta.y >= 0.0 {
            self.position.y >= self.to_center.y
        } else {
            self.position.y <= self.to_center.y
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eastward_step(duration: f32, final_step: bool) -> StepMotion {
        StepMotion::new(
            GridCoord::new(0, 0),
            GridCoord::new(1, 0),
            Vec2::new(0.5, 0.5),
            Vec2::new(1.5, 0.5),
            duration,
            0.05,
            final_step,
        )
    }

    #[test]
    fn step_times_clamp_at_both_ends() {
        let config = MotionConfig::default();
        assert!((config.step_time(1.0) - 0.25).abs() < 1e-6);
        assert!((config.step_time(100.0) - 0.05).abs() < 1e-6);
        assert!((config.step_time(0.01) - 1.0).abs() < 1e-6);
        assert!((config.step_time(0.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn intermediate_step_completes_on_axis_crossing() {
        let mut step = eastward_step(0.25, false);
        assert_eq!(step.advance(0.1), StepOutcome::InFlight);
        assert_eq!(step.advance(0.1), StepOutcome::InFlight);
        assert_eq!(step.advance(0.1), StepOutcome::Completed { cancelled: false });
        assert_eq!(step.position(), Vec2::new(1.5, 0.5));
    }

    #[test]
    fn final_step_completes_inside_tolerance() {
        let mut step = eastward_step(0.2, true);
        assert_eq!(step.advance(0.1), StepOutcome::InFlight);
        assert_eq!(step.advance(0.1), StepOutcome::Completed { cancelled: false });
        assert_eq!(step.position(), Vec2::new(1.5, 0.5));
    }

    #[test]
    fn cancellation_ends_the_step_without_snapping() {
        let mut step = eastward_step(0.25, false);
        assert_eq!(step.advance(0.1), StepOutcome::InFlight);
        let frozen = step.position();
        step.request_cancel();
        assert_eq!(step.advance(0.1), StepOutcome::Completed { cancelled: true });
        assert_eq!(step.position(), frozen);
    }

    #[test]
    fn westward_steps_cross_in_the_negative_direction() {
        let mut step = StepMotion::new(
            GridCoord::new(1, 0),
            GridCoord::new(0, 0),
            Vec2::new(1.5, 0.5),
            Vec2::new(0.5, 0.5),
            0.25,
            0.05,
            false,
        );
        assert_eq!(step.advance(0.2), StepOutcome::InFlight);
        assert_eq!(step.advance(0.2), StepOutcome::Completed { cancelled: false });
    }
}
