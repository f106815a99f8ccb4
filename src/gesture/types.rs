use crate::config::Axis;
use serde::{Deserialize, Serialize};

pub const MIN_FORCE: f64 = 1.0;
pub const MAX_FORCE: f64 = 10.0;

/// Clamp a derived force into `[MIN_FORCE, MAX_FORCE]`; NaN maps to the minimum
pub fn clamp_force(force: f64) -> f64 {
    if force.is_nan() {
        MIN_FORCE
    } else {
        force.clamp(MIN_FORCE, MAX_FORCE)
    }
}

/// One accelerometer reading in m/s², stamped in milliseconds on the source clock
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    pub t: u64,
}

impl MotionSample {
    pub fn new(x: f64, y: f64, z: f64, t: u64) -> Self {
        Self { x, y, z, t }
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn axis(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Tilt from vertical in degrees
    pub fn tilt_degrees(&self) -> f64 {
        self.y.atan2(self.z).to_degrees()
    }
}

/// Observable classifier state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GestureState {
    Idle,
    Charging { since: u64 },
    Cooldown { since: u64 },
    Unavailable,
}

impl std::fmt::Display for GestureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GestureState::Idle => write!(f, "idle"),
            GestureState::Charging { since } => write!(f, "charging since {}ms", since),
            GestureState::Cooldown { since } => write!(f, "cooldown since {}ms", since),
            GestureState::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// User-authored content attached to every shot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShotContent {
    pub author_name: String,
    pub author_message: String,
    /// Data URL or bare base64 image
    pub selfie_image: String,
}

impl ShotContent {
    pub fn new(
        author_name: impl Into<String>,
        author_message: impl Into<String>,
        selfie_image: impl Into<String>,
    ) -> Self {
        Self {
            author_name: author_name.into(),
            author_message: author_message.into(),
            selfie_image: selfie_image.into(),
        }
    }
}

/// A detected throw
#[derive(Debug, Clone, PartialEq)]
pub struct ShotEvent {
    pub author_name: String,
    pub author_message: String,
    pub selfie_image: String,
    pub force: f64,
    pub fired_at: u64,
}

impl ShotEvent {
    pub fn new(content: &ShotContent, force: f64, fired_at: u64) -> Self {
        Self {
            author_name: content.author_name.clone(),
            author_message: content.author_message.clone(),
            selfie_image: content.selfie_image.clone(),
            force: clamp_force(force),
            fired_at,
        }
    }
}
