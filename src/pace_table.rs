/// Interval statistics over the optimal pace profile.
///
/// For every index interval `[i, j)` the table holds the length-weighted mean
/// pace and the loss of running the whole interval at that single pace. Rows are
/// filled independently with running sums, so the build is O(n^2) for the square
/// metric and O(n^2 log n) for the absolute metric.
use rayon::prelude::*;
use tracing::debug;

use crate::config::LossMetric;
use crate::error::{PacingError, Result};

#[derive(Debug, Clone)]
pub struct WeightedPaceTable {
    n: usize,
    metric: LossMetric,
    weighted: Vec<f64>,
    loss: Vec<f64>,
}

impl WeightedPaceTable {
    pub fn build(paces: &[f64], lengths: &[f64], metric: LossMetric) -> Result<Self> {
        if paces.is_empty() {
            return Err(PacingError::domain("no paces to tabulate"));
        }
        if paces.len() != lengths.len() {
            return Err(PacingError::domain(format!(
                "{} paces but {} segment lengths",
                paces.len(),
                lengths.len()
            )));
        }
        if lengths.iter().any(|l| !l.is_finite() || *l <= 0.0) {
            return Err(PacingError::domain("segment lengths must be positive"));
        }

        let n = paces.len();
        let width = n + 1;
        let mut weighted = vec![f64::NAN; n * width];
        let mut loss = vec![f64::NAN; n * width];

        let rows = weighted
            .par_chunks_mut(width)
            .zip(loss.par_chunks_mut(width))
            .enumerate();
        match metric {
            LossMetric::Square => rows.for_each(|(i, (w_row, l_row))| {
                fill_square_row(i, paces, lengths, w_row, l_row)
            }),
            LossMetric::Absolute => {
                let ranks = PaceRanks::new(paces);
                rows.for_each(|(i, (w_row, l_row))| {
                    fill_absolute_row(i, paces, lengths, &ranks, w_row, l_row)
                })
            }
        }

        debug!(segments = n, ?metric, "built weighted pace table");
        Ok(WeightedPaceTable {
            n,
            metric,
            weighted,
            loss,
        })
    }

    pub fn n_segments(&self) -> usize {
        self.n
    }

    pub fn metric(&self) -> LossMetric {
        self.metric
    }

    /// Length-weighted mean optimal pace over `[start, end)`.
    pub fn weighted_pace(&self, start: usize, end: usize) -> Result<f64> {
        self.check_interval(start, end)?;
        Ok(self.weighted[self.index(start, end)])
    }

    /// Loss of collapsing `[start, end)` to its weighted pace.
    pub fn base_loss(&self, start: usize, end: usize) -> Result<f64> {
        self.check_interval(start, end)?;
        Ok(self.loss[self.index(start, end)])
    }

    /// Caller guarantees `start < end <= n`.
    pub(crate) fn base_loss_unchecked(&self, start: usize, end: usize) -> f64 {
        self.loss[self.index(start, end)]
    }

    fn index(&self, start: usize, end: usize) -> usize {
        start * (self.n + 1) + end
    }

    fn check_interval(&self, start: usize, end: usize) -> Result<()> {
        if start == end {
            return Err(PacingError::NumericalDegeneracy { start, end });
        }
        if start > end || end > self.n {
            return Err(PacingError::domain(format!(
                "interval [{}, {}) is outside a course of {} segments",
                start, end, self.n
            )));
        }
        Ok(())
    }
}

fn fill_square_row(i: usize, paces: &[f64], lengths: &[f64], w_row: &mut [f64], l_row: &mut [f64]) {
    let mut pace_sum = 0.0;
    let mut pace_sq_sum = 0.0;
    let mut weighted_sum = 0.0;
    let mut length_sum = 0.0;

    for j in (i + 1)..=paces.len() {
        let pace = paces[j - 1];
        let length = lengths[j - 1];
        pace_sum += pace;
        pace_sq_sum += pace * pace;
        weighted_sum += pace * length;
        length_sum += length;

        let count = (j - i) as f64;
        let mean = if j == i + 1 { pace } else { weighted_sum / length_sum };
        // sum (p - m)^2 = sum p^2 - 2 m sum p + count m^2
        let loss = pace_sq_sum - 2.0 * mean * pace_sum + count * mean * mean;
        w_row[j] = mean;
        l_row[j] = loss.max(0.0);
    }
}

fn fill_absolute_row(
    i: usize,
    paces: &[f64],
    lengths: &[f64],
    ranks: &PaceRanks,
    w_row: &mut [f64],
    l_row: &mut [f64],
) {
    let mut tree = Fenwick::new(paces.len());
    let mut pace_sum = 0.0;
    let mut weighted_sum = 0.0;
    let mut length_sum = 0.0;

    for j in (i + 1)..=paces.len() {
        let pace = paces[j - 1];
        let length = lengths[j - 1];
        tree.add(ranks.rank[j - 1], pace);
        pace_sum += pace;
        weighted_sum += pace * length;
        length_sum += length;

        let count = j - i;
        let mean = if j == i + 1 { pace } else { weighted_sum / length_sum };
        let split = ranks.sorted.partition_point(|&v| v <= mean);
        let (below_count, below_sum) = tree.prefix(split);
        let above_count = count - below_count;
        let above_sum = pace_sum - below_sum;
        let loss = (mean * below_count as f64 - below_sum) + (above_sum - mean * above_count as f64);
        w_row[j] = mean;
        l_row[j] = loss.max(0.0);
    }
}

/// Position of each pace in ascending pace order.
struct PaceRanks {
    rank: Vec<usize>,
    sorted: Vec<f64>,
}

impl PaceRanks {
    fn new(paces: &[f64]) -> Self {
        let mut order: Vec<usize> = (0..paces.len()).collect();
        order.sort_by(|&a, &b| paces[a].total_cmp(&paces[b]));
        let mut rank = vec![0; paces.len()];
        for (position, &segment) in order.iter().enumerate() {
            rank[segment] = position;
        }
        let sorted = order.iter().map(|&s| paces[s]).collect();
        PaceRanks { rank, sorted }
    }
}

/// Binary indexed tree of (count, sum) over pace ranks.
struct Fenwick {
    counts: Vec<usize>,
    sums: Vec<f64>,
}

impl Fenwick {
    fn new(size: usize) -> Self {
        Fenwick {
            counts: vec![0; size + 1],
            sums: vec![0.0; size + 1],
        }
    }

    fn add(&mut self, position: usize, value: f64) {
        let mut idx = position + 1;
        while idx < self.counts.len() {
            self.counts[idx] += 1;
            self.sums[idx] += value;
            idx += idx & idx.wrapping_neg();
        }
    }

    /// Count and sum of entries at positions `< end`.
    fn prefix(&self, end: usize) -> (usize, f64) {
        let mut count = 0;
        let mut sum = 0.0;
        let mut idx = end;
        while idx > 0 {
            count += self.counts[idx];
            sum += self.sums[idx];
            idx &= idx - 1;
        }
        (count, sum)
    }
}
