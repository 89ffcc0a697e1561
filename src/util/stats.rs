use super::history::History;

/// Summary statistics over one rolling window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatSummary {
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    pub stddev: f64,
}

/// A bounded rolling collection of `f64` samples with summary statistics.
///
/// Keeps memory per observation O(1) amortized: once the window is full the
/// oldest sample is dropped. Used for per-phase durations, recovery rates and
/// objective scores across OODA cycles.
#[derive(Debug, Clone)]
pub struct RollingStats {
    window: History<f64>,
}

impl RollingStats {
    /// Default window size for cycle-level statistics.
    pub const DEFAULT_WINDOW: usize = 256;

    pub fn new(window: usize) -> Self { Self { window: History::new(window) } }

    /// Records one sample.
    pub fn push(&mut self, sample: f64) { self.window.push(sample); }

    /// Returns the number of retained samples.
    pub fn len(&self) -> usize { self.window.len() }

    pub fn is_empty(&self) -> bool { self.window.is_empty() }

    /// Computes mean/max/min/stddev over the retained window.
    ///
    /// Returns `None` when no samples have been recorded. The deviation is
    /// the population standard deviation.
    pub fn summary(&self) -> Option<StatSummary> {
        if self.window.is_empty() {
            return None;
        }
        let n = self.window.len() as f64;
        let mut sum = 0.0;
        let mut max = f64::NEG_INFINITY;
        let mut min = f64::INFINITY;
        for &s in self.window.iter() {
            sum += s;
            max = max.max(s);
            min = min.min(s);
        }
        let mean = sum / n;
        let var = self.window.iter().map(|&s| (s - mean) * (s - mean)).sum::<f64>() / n;
        Some(StatSummary { mean, max, min, stddev: var.sqrt() })
    }
}

impl Default for RollingStats {
    fn default() -> Self { Self::new(Self::DEFAULT_WINDOW) }
}
