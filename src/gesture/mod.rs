mod classifier;
mod policy;
mod source;
mod types;

#[cfg(test)]
mod tests;

pub use classifier::{drive, GestureClassifier};
pub use policy::{transition, ClassifierState};
pub use source::{MotionSampleSource, ReplaySource, UnavailableSource};
pub use types::{
    clamp_force, GestureState, MotionSample, ShotContent, ShotEvent, MAX_FORCE, MIN_FORCE,
};
