use super::policy::{transition, ClassifierState};
use super::source::MotionSampleSource;
use super::types::{GestureState, MotionSample, ShotContent, ShotEvent};
use crate::config::GestureConfig;
use crate::error::GestureError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Turns a motion sample stream into rate-limited shot events
pub struct GestureClassifier {
    config: GestureConfig,
    state: ClassifierState,
    content: ShotContent,
    pending_condition: Option<GestureError>,
    shots_emitted: u64,
}

impl GestureClassifier {
    /// Create a classifier for a device whose sensor is known to work
    pub fn new(config: GestureConfig, content: ShotContent) -> Self {
        info!(
            "Gesture classifier using {:?} policy (cooldown {}ms)",
            config.policy, config.cooldown_ms
        );
        Self {
            config,
            state: ClassifierState::idle(),
            content,
            pending_condition: None,
            shots_emitted: 0,
        }
    }

    /// Create a classifier that will never emit because the sensor is absent
    pub fn unavailable(config: GestureConfig, content: ShotContent) -> Self {
        warn!("Motion sensor unavailable, gesture classifier is inert");
        Self {
            config,
            state: ClassifierState::unavailable(),
            content,
            pending_condition: Some(GestureError::SensorUnavailable),
            shots_emitted: 0,
        }
    }

    /// Create a classifier matching the availability of a sample source
    pub fn for_source<S: MotionSampleSource + ?Sized>(
        config: GestureConfig,
        content: ShotContent,
        source: &S,
    ) -> Self {
        if source.is_available() {
            Self::new(config, content)
        } else {
            Self::unavailable(config, content)
        }
    }

    /// Feed one sample; returns a shot when this sample completes a gesture
    pub fn feed(&mut self, sample: MotionSample) -> Option<ShotEvent> {
        let (next, force) = transition(&self.config, &self.state, &sample);

        if next.state != self.state.state {
            trace!("Gesture state {} -> {}", self.state.state, next.state);
        }
        self.state = next;

        force.map(|force| {
            self.shots_emitted += 1;
            debug!("Shot detected at {}ms with force {:.2}", sample.t, force);
            ShotEvent::new(&self.content, force, sample.t)
        })
    }

    /// Return to idle and forget angular history; the cooldown anchor survives
    pub fn reset(&mut self) {
        if self.state.state == GestureState::Unavailable {
            return;
        }
        self.state.state = GestureState::Idle;
        self.state.last_angle = None;
    }

    pub fn current_state(&self) -> GestureState {
        self.state.state
    }

    /// Yields `SensorUnavailable` once for a classifier without a sensor
    pub fn sensor_condition(&mut self) -> Option<GestureError> {
        self.pending_condition.take()
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    pub fn shots_emitted(&self) -> u64 {
        self.shots_emitted
    }
}

/// Pump samples from a source through a classifier until the source ends or
/// the token is cancelled. Returns the number of shots forwarded.
pub async fn drive<S: MotionSampleSource + ?Sized>(
    classifier: &mut GestureClassifier,
    source: &mut S,
    shots: mpsc::Sender<ShotEvent>,
    cancel: CancellationToken,
) -> Result<u64, GestureError> {
    if let Some(condition) = classifier.sensor_condition() {
        return Err(condition);
    }

    let mut forwarded = 0;
    loop {
        let sample = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Gesture driver cancelled");
                break;
            }
            sample = source.next_sample() => sample?,
        };

        let Some(sample) = sample else {
            debug!("Motion source exhausted");
            break;
        };

        if let Some(shot) = classifier.feed(sample) {
            if shots.send(shot).await.is_err() {
                debug!("Shot receiver dropped, stopping gesture driver");
                break;
            }
            forwarded += 1;
        }
    }

    Ok(forwarded)
}
