use super::types::{clamp_force, GestureState, MotionSample};
use crate::config::{GestureConfig, GesturePolicy};

/// Everything the transition function needs to carry between samples
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierState {
    pub state: GestureState,
    /// Sample time of the last emitted shot
    pub last_fired_at: Option<u64>,
    /// Tilt angle in degrees and sample time of the previous sample
    pub last_angle: Option<(f64, u64)>,
}

impl ClassifierState {
    pub fn idle() -> Self {
        Self {
            state: GestureState::Idle,
            last_fired_at: None,
            last_angle: None,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            state: GestureState::Unavailable,
            ..Self::idle()
        }
    }
}

impl Default for ClassifierState {
    fn default() -> Self {
        Self::idle()
    }
}

/// Elapsed milliseconds on the source clock; a clock going backwards counts as zero
fn elapsed(since: u64, now: u64) -> u64 {
    now.saturating_sub(since)
}

/// Angular velocity in degrees per second against the previous sample
fn angular_velocity(previous: Option<(f64, u64)>, angle: f64, t: u64) -> f64 {
    match previous {
        Some((previous_angle, previous_t)) => {
            let dt = elapsed(previous_t, t);
            if dt == 0 {
                0.0
            } else {
                (angle - previous_angle).abs() / (dt as f64 / 1000.0)
            }
        }
        None => 0.0,
    }
}

/// Advance the classifier by one sample, returning the next state and the
/// force of a shot when this sample fires one.
pub fn transition(
    config: &GestureConfig,
    current: &ClassifierState,
    sample: &MotionSample,
) -> (ClassifierState, Option<f64>) {
    let mut next = current.clone();

    if next.state == GestureState::Unavailable {
        return (next, None);
    }

    let velocity = match config.policy {
        GesturePolicy::AngularVelocity => {
            let angle = sample.tilt_degrees();
            let velocity = angular_velocity(current.last_angle, angle, sample.t);
            next.last_angle = Some((angle, sample.t));
            velocity
        }
        GesturePolicy::Directional => 0.0,
    };

    // The cooldown is anchored on the last shot, not on the visible state,
    // so a reset in between cannot shorten it.
    if let Some(fired_at) = current.last_fired_at {
        if elapsed(fired_at, sample.t) < config.cooldown_ms {
            next.state = GestureState::Cooldown { since: fired_at };
            return (next, None);
        }
    }
    if let GestureState::Cooldown { .. } = next.state {
        next.state = GestureState::Idle;
    }

    let magnitude = sample.magnitude();

    let force = match (config.policy, next.state) {
        (GesturePolicy::Directional, GestureState::Idle) => {
            if sample.axis(config.axis) <= config.pull_back_threshold {
                next.state = GestureState::Charging { since: sample.t };
            }
            None
        }
        (GesturePolicy::Directional, GestureState::Charging { since }) => {
            if elapsed(since, sample.t) > config.max_hold_ms {
                next.state = GestureState::Idle;
                None
            } else if sample.axis(config.axis) > config.release_threshold
                && magnitude >= config.release_min_magnitude
            {
                Some(clamp_force(magnitude / config.normalization_factor))
            } else {
                None
            }
        }
        (GesturePolicy::AngularVelocity, GestureState::Idle) => {
            if velocity > config.angular_velocity_threshold
                && magnitude > config.magnitude_threshold
            {
                Some(clamp_force(velocity / 50.0 + magnitude / 5.0))
            } else {
                None
            }
        }
        // The angular policy has no charging phase; a state left over from a
        // policy switch simply settles back to idle.
        (GesturePolicy::AngularVelocity, GestureState::Charging { .. }) => {
            next.state = GestureState::Idle;
            None
        }
        _ => None,
    };

    if force.is_some() {
        next.state = GestureState::Cooldown { since: sample.t };
        next.last_fired_at = Some(sample.t);
    }

    (next, force)
}
