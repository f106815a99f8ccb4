use crate::config::LayoutConfig;
use crate::protocol::DisplayShot;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, trace};

/// How a slot position was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Random,
    Grid,
    Unconstrained,
}

/// One visible item, coordinates in percent of the canvas
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplaySlot {
    pub shot_id: String,
    pub x: f64,
    pub y: f64,
    pub placement: Placement,
}

impl DisplaySlot {
    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        ((self.x - x).powi(2) + (self.y - y).powi(2)).sqrt()
    }
}

/// Bounded, newest-first set of visible slots with overlap avoidance
pub struct LayoutAllocator<R: Rng = StdRng> {
    config: LayoutConfig,
    rng: R,
    slots: VecDeque<DisplaySlot>,
    grid_fallbacks: u64,
    unconstrained_fallbacks: u64,
}

impl LayoutAllocator<StdRng> {
    pub fn new(config: LayoutConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }
}

impl<R: Rng> LayoutAllocator<R> {
    pub fn with_rng(config: LayoutConfig, rng: R) -> Self {
        Self {
            slots: VecDeque::with_capacity(config.capacity + 1),
            config,
            rng,
            grid_fallbacks: 0,
            unconstrained_fallbacks: 0,
        }
    }

    /// Assign a position to an incoming shot and make it the newest slot
    pub fn place(&mut self, shot: &DisplayShot) -> DisplaySlot {
        if let Some(index) = self.slots.iter().position(|s| s.shot_id == shot.id) {
            debug!("Shot {} already visible, moving it", shot.id);
            self.slots.remove(index);
        }

        let (x, y, placement) = self.choose_position();
        let slot = DisplaySlot {
            shot_id: shot.id.clone(),
            x,
            y,
            placement,
        };
        trace!(
            "Placed {} at ({:.1}, {:.1}) via {:?}",
            slot.shot_id,
            slot.x,
            slot.y,
            slot.placement
        );

        self.slots.push_front(slot.clone());
        while self.slots.len() > self.config.capacity {
            if let Some(evicted) = self.slots.pop_back() {
                debug!("Evicted shot {}", evicted.shot_id);
            }
        }

        slot
    }

    fn choose_position(&mut self) -> (f64, f64, Placement) {
        let (x_range, y_range) = (self.config.random_x, self.config.random_y);

        for _ in 0..self.config.max_attempts {
            let x = self.rng.gen_range(x_range.0..x_range.1);
            let y = self.rng.gen_range(y_range.0..y_range.1);
            if self.clears(x, y, self.config.min_distance_percent) {
                return (x, y, Placement::Random);
            }
        }

        if let Some((x, y)) = self.grid_position() {
            self.grid_fallbacks += 1;
            return (x, y, Placement::Grid);
        }

        self.unconstrained_fallbacks += 1;
        debug!("Canvas crowded, placing without spacing");
        let x = self.rng.gen_range(x_range.0..x_range.1);
        let y = self.rng.gen_range(y_range.0..y_range.1);
        (x, y, Placement::Unconstrained)
    }

    /// First jittered grid cell, row by row, that clears the relaxed spacing
    fn grid_position(&mut self) -> Option<(f64, f64)> {
        let cols = self.config.grid_cols.max(1);
        let rows = self.config.grid_rows.max(1);
        let (x0, x1) = self.config.grid_x;
        let (y0, y1) = self.config.grid_y;
        let cell_w = (x1 - x0) / f64::from(cols);
        let cell_h = (y1 - y0) / f64::from(rows);

        for row in 0..rows {
            for col in 0..cols {
                let x = x0 + (f64::from(col) + 0.5) * cell_w + self.jitter();
                let y = y0 + (f64::from(row) + 0.5) * cell_h + self.jitter();
                if self.clears(x, y, self.config.relaxed_distance_percent) {
                    return Some((x, y));
                }
            }
        }
        None
    }

    fn jitter(&mut self) -> f64 {
        (self.rng.gen::<f64>() - 0.5) * self.config.grid_jitter
    }

    fn clears(&self, x: f64, y: f64, min_distance: f64) -> bool {
        self.slots.iter().all(|s| s.distance_to(x, y) >= min_distance)
    }

    /// Visible slots, newest first
    pub fn slots(&self) -> impl Iterator<Item = &DisplaySlot> {
        self.slots.iter()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn grid_fallbacks(&self) -> u64 {
        self.grid_fallbacks
    }

    pub fn unconstrained_fallbacks(&self) -> u64 {
        self.unconstrained_fallbacks
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }
}
