use crate::data::Value;

/// Accumulator trait for streaming reductions over record values
pub trait Accumulator: Send + Sync {
    /// Add a value; non-numeric values are ignored by numeric accumulators
    fn accumulate(&mut self, value: &Value);
}

/// Finite numeric view of a value
fn sample(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| v.is_finite())
}

#[derive(Debug, Clone, Default)]
pub struct SumAccumulator {
    sum: f64,
    count: u64,
}

impl SumAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sum(&self) -> Option<f64> {
        (self.count > 0).then_some(self.sum)
    }
}

impl Accumulator for SumAccumulator {
    fn accumulate(&mut self, value: &Value) {
        if let Some(v) = sample(value) {
            self.sum += v;
            self.count += 1;
        }
    }
}

/// Running mean and variance (Welford), numerically stable in one pass
#[derive(Debug, Clone, Default)]
pub struct MomentsAccumulator {
    count: u64,
    mean: f64,
    m2: f64,
}

impl MomentsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, v: f64) {
        self.count += 1;
        let delta = v - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (v - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Sample standard deviation; 0 with fewer than two samples
    pub fn std_dev(&self) -> Option<f64> {
        match self.count {
            0 => None,
            1 => Some(0.0),
            n => Some((self.m2 / (n - 1) as f64).sqrt()),
        }
    }
}

impl Accumulator for MomentsAccumulator {
    fn accumulate(&mut self, value: &Value) {
        if let Some(v) = sample(value) {
            self.push(v);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MaxAccumulator {
    max: Option<f64>,
}

impl MaxAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max(&self) -> Option<f64> {
        self.max
    }
}

impl Accumulator for MaxAccumulator {
    fn accumulate(&mut self, value: &Value) {
        if let Some(v) = sample(value) {
            self.max = Some(self.max.map_or(v, |m| m.max(v)));
        }
    }
}

/// Exact percentiles over every accumulated sample
///
/// Result sets are bounded by the tool limit, so all samples are kept and
/// sorted once at read time.
#[derive(Debug, Clone, Default)]
pub struct PercentileAccumulator {
    values: Vec<f64>,
}

impl PercentileAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, v: f64) {
        if v.is_finite() {
            self.values.push(v);
        }
    }

    /// Ascending copy of the samples
    pub fn sorted(&self) -> Vec<f64> {
        let mut sorted = self.values.clone();
        sorted.sort_by(f64::total_cmp);
        sorted
    }
}

/// Linear interpolation at rank `p/100 * (n-1)` over an ascending sample
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 || !p.is_finite() {
        return None;
    }
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}
