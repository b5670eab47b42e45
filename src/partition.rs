/// Minimal-loss partition of the course into contiguous legs.
///
/// `LOSS[i, k, a]` is the least total loss of splitting `[i, k)` into `a + 1`
/// legs of at least `min_leg` segments each:
///
/// ```text
/// LOSS[i, k, 0] = BASE_LOSS[i, k]                                  k >= i + L
/// LOSS[i, k, a] = min_{j in [i+L, k-L]} LOSS[i, j, 0] + LOSS[j, k, a-1]
///                                                                  k >= i + (a+1)L
/// ```
///
/// Layers are filled on demand and cached (see [`LayerStack`]), so asking for
/// more legs later only computes the missing layers. Rows of a layer depend
/// only on the previous layer and are filled in parallel.
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use tracing::debug;

use crate::error::{PacingError, Result};
use crate::layers::{Layer, LayerStack};
use crate::pace_table::WeightedPaceTable;

/// Candidates within this relative margin of the incumbent count as ties,
/// so rounding noise cannot move a split away from the smallest index.
pub const TIE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct PartitionTable {
    min_leg: usize,
    layers: LayerStack,
}

impl PartitionTable {
    /// Builds the single-leg layer from the interval losses.
    pub fn new(table: &WeightedPaceTable, min_leg: usize) -> Result<Self> {
        if min_leg == 0 {
            return Err(PacingError::domain("minimum leg length must be at least 1 segment"));
        }
        let n = table.n_segments();
        let mut base = Layer::without_splits(n);
        base.loss
            .par_chunks_mut(n + 1)
            .enumerate()
            .for_each(|(i, row)| {
                for k in i.saturating_add(min_leg)..=n {
                    row[k] = table.base_loss_unchecked(i, k);
                }
            });

        let mut layers = LayerStack::new(n);
        layers.push(base);
        Ok(PartitionTable { min_leg, layers })
    }

    pub fn n_segments(&self) -> usize {
        self.layers.n_segments()
    }

    pub fn min_leg_length(&self) -> usize {
        self.min_leg
    }

    /// Largest leg count answerable without further computation.
    pub fn computed_legs(&self) -> usize {
        self.layers.len()
    }

    /// Largest leg count that admits any partition.
    pub fn max_feasible_legs(&self) -> usize {
        self.n_segments() / self.min_leg
    }

    pub fn layers(&self) -> &LayerStack {
        &self.layers
    }

    /// Fills layers until `legs` legs can be answered.
    pub fn ensure_legs(&mut self, legs: usize) -> Result<()> {
        self.ensure_legs_with_cancel(legs, None)
    }

    /// Like [`ensure_legs`](Self::ensure_legs) but checks `cancel` before each
    /// layer. Completed layers stay cached when the flag is raised.
    pub fn ensure_legs_with_cancel(&mut self, legs: usize, cancel: Option<&AtomicBool>) -> Result<()> {
        while self.layers.len() < legs {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                return Err(PacingError::Cancelled {
                    completed_layers: self.layers.len(),
                });
            }
            let changes = self.layers.len();
            let layer = self.fill_layer(changes)?;
            self.layers.push(layer);
            debug!(changes, cells = self.layers.cell_count(), "filled partition layer");
        }
        Ok(())
    }

    /// `LOSS[start, end, changes]`, infinite when infeasible or not yet computed.
    pub fn loss(&self, start: usize, end: usize, changes: usize) -> f64 {
        self.layers.loss(start, end, changes)
    }

    /// `OPT[start, end, changes]`: first index of the second leg.
    pub fn split(&self, start: usize, end: usize, changes: usize) -> Option<usize> {
        self.layers.split(start, end, changes)
    }

    /// Minimal loss over the whole course with `legs` legs, if feasible and computed.
    pub fn root_loss(&self, legs: usize) -> Option<f64> {
        if legs == 0 {
            return None;
        }
        let loss = self.loss(0, self.n_segments(), legs - 1);
        loss.is_finite().then_some(loss)
    }

    fn fill_layer(&self, changes: usize) -> Result<Layer> {
        let (Some(base), Some(prev)) = (self.layers.get(0), self.layers.get(changes - 1)) else {
            return Err(PacingError::InvariantViolation(format!(
                "layer {} requested before its predecessors",
                changes
            )));
        };
        let n = self.n_segments();
        let min_leg = self.min_leg;
        let mut layer = Layer::empty(n);
        let span = (changes + 1).saturating_mul(min_leg);

        layer
            .loss
            .par_chunks_mut(n + 1)
            .zip(layer.split.par_chunks_mut(n + 1))
            .enumerate()
            .for_each(|(i, (loss_row, split_row))| {
                let first_end = i.saturating_add(span);
                for k in first_end..=n {
                    let mut best = f64::INFINITY;
                    let mut best_split = None;
                    for j in (i + min_leg)..=(k - min_leg) {
                        let candidate = base.loss(i, j) + prev.loss(j, k);
                        if improves(candidate, best) {
                            best = candidate;
                            best_split = Some(j);
                        }
                    }
                    loss_row[k] = best;
                    split_row[k] = best_split;
                }
            });

        Ok(layer)
    }
}

/// Strict improvement beyond [`TIE_TOLERANCE`]. A candidate that is lower by
/// less than `TIE_TOLERANCE * max(|incumbent|, 1)` does not replace the
/// incumbent, so the smaller split index is kept even when the later one is
/// marginally better.
fn improves(candidate: f64, incumbent: f64) -> bool {
    if incumbent.is_finite() {
        candidate < incumbent - TIE_TOLERANCE * incumbent.abs().max(1.0)
    } else {
        candidate < incumbent
    }
}
