use super::types::MotionSample;
use crate::error::GestureError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Supplier of timestamped acceleration samples
#[async_trait]
pub trait MotionSampleSource: Send {
    /// Whether the underlying sensor exists on this device
    fn is_available(&self) -> bool;

    /// Next sample, or `None` once the stream has ended
    async fn next_sample(&mut self) -> Result<Option<MotionSample>, GestureError>;
}

/// Replays recorded samples, optionally paced by their timestamps
pub struct ReplaySource {
    samples: VecDeque<MotionSample>,
    realtime: bool,
    last_t: Option<u64>,
}

impl ReplaySource {
    pub fn from_samples(samples: Vec<MotionSample>) -> Self {
        Self {
            samples: samples.into(),
            realtime: false,
            last_t: None,
        }
    }

    /// Parse one JSON sample per line, e.g. `{"x":0.1,"y":-7.2,"z":9.8,"t":120}`.
    /// Blank lines and lines starting with `#` are skipped.
    pub fn from_json_lines(text: &str) -> Result<Self, GestureError> {
        let mut samples = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let sample: MotionSample =
                serde_json::from_str(line).map_err(|e| GestureError::Source {
                    details: format!("line {}: {}", index + 1, e),
                })?;
            samples.push(sample);
        }
        Ok(Self::from_samples(samples))
    }

    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self, GestureError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GestureError::Source {
                details: format!("{}: {}", path.display(), e),
            })?;
        let source = Self::from_json_lines(&text)?;
        info!(
            "Loaded {} motion samples from {}",
            source.remaining(),
            path.display()
        );
        Ok(source)
    }

    /// Sleep between samples for the gap between their timestamps
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn remaining(&self) -> usize {
        self.samples.len()
    }
}

#[async_trait]
impl MotionSampleSource for ReplaySource {
    fn is_available(&self) -> bool {
        true
    }

    async fn next_sample(&mut self) -> Result<Option<MotionSample>, GestureError> {
        let Some(sample) = self.samples.pop_front() else {
            return Ok(None);
        };

        if self.realtime {
            if let Some(last_t) = self.last_t {
                let gap = sample.t.saturating_sub(last_t);
                if gap > 0 {
                    tokio::time::sleep(Duration::from_millis(gap)).await;
                }
            }
        }
        self.last_t = Some(sample.t);

        Ok(Some(sample))
    }
}

/// Source for devices without a motion sensor
#[derive(Debug, Default)]
pub struct UnavailableSource;

#[async_trait]
impl MotionSampleSource for UnavailableSource {
    fn is_available(&self) -> bool {
        false
    }

    async fn next_sample(&mut self) -> Result<Option<MotionSample>, GestureError> {
        debug!("Sample requested from unavailable motion source");
        Err(GestureError::SensorUnavailable)
    }
}
