//! Time profiles and lookup tables.
//!
//! # `Profile1D` contract
//!
//! A profile is the triple `(start_time, dt, values)` describing a
//! piecewise-constant function of time:
//!
//! ```text
//! f(t) = 0                                  t <  start_time
//! f(t) = values[k]   start_time + k·dt  ≤  t <  start_time + (k+1)·dt
//! f(t) = values[last]                       t ≥  start_time + last·dt
//! ```
//!
//! Demand profiles and profile-driven controllers both depend on exactly
//! this shape (zero before the start, last sample held forever).

use crate::{CoreError, CoreResult, ValidationLog};

/// Breakpoint comparisons tolerate this much floating-point error, so that
/// `t = start + k·dt` computed in a different order still lands on sample `k`.
const TIME_TOL: f64 = 1e-9;

// ── Profile1D ─────────────────────────────────────────────────────────────────

/// Piecewise-constant time series.  See the module docs for the contract.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Profile1D {
    /// Seconds at which `values[0]` takes effect.
    pub start_time: f64,
    /// Seconds between samples.
    pub dt:         f64,
    pub values:     Vec<f64>,
}

impl Profile1D {
    pub fn new(start_time: f64, dt: f64, values: Vec<f64>) -> Self {
        Self { start_time, dt, values }
    }

    /// A profile holding `value` from `start_time` on.
    pub fn constant(start_time: f64, value: f64) -> Self {
        Self::new(start_time, 0.0, vec![value])
    }

    /// Parse a comma-separated list of samples, e.g. `"900, 1200,600"`.
    pub fn from_csv_str(start_time: f64, dt: f64, csv: &str) -> CoreResult<Self> {
        let values = csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<f64>()
                    .map_err(|_| CoreError::Parse(format!("invalid profile sample {s:?}")))
            })
            .collect::<CoreResult<Vec<f64>>>()?;
        Ok(Self::new(start_time, dt, values))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Index of the sample in effect at `t`, or `None` before `start_time`.
    fn index_at(&self, t: f64) -> Option<usize> {
        if self.values.is_empty() || t + TIME_TOL < self.start_time {
            return None;
        }
        if self.values.len() == 1 || self.dt <= 0.0 {
            return Some(0);
        }
        let k = ((t - self.start_time) / self.dt + TIME_TOL).floor() as usize;
        Some(k.min(self.values.len() - 1))
    }

    /// Value of the profile at `t` seconds.
    pub fn value_at(&self, t: f64) -> f64 {
        self.index_at(t).map_or(0.0, |k| self.values[k])
    }

    /// The next breakpoint strictly after `t`, with the value taking effect
    /// there.  Returns `None` once the last sample is in effect.
    pub fn next_change_after(&self, t: f64) -> Option<(f64, f64)> {
        if self.values.is_empty() {
            return None;
        }
        match self.index_at(t) {
            None => Some((self.start_time, self.values[0])),
            Some(k) if k + 1 < self.values.len() && self.dt > 0.0 => {
                let next = self.start_time + (k + 1) as f64 * self.dt;
                Some((next, self.values[k + 1]))
            }
            Some(_) => None,
        }
    }

    /// Multiply every sample by `factor` (e.g. veh/h → veh/s).
    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(self.start_time, self.dt, self.values.iter().map(|v| v * factor).collect())
    }

    /// Accumulate profile problems into `log`.  `what` names the owner.
    pub fn validate(&self, what: &str, log: &mut ValidationLog) {
        if self.values.is_empty() {
            log.add_error(format!("{what}: profile has no samples"));
        }
        if self.values.len() > 1 && self.dt <= 0.0 {
            log.add_error(format!("{what}: profile with several samples needs dt > 0"));
        }
        if self.values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            log.add_error(format!("{what}: profile samples must be finite and non-negative"));
        }
    }
}

// ── LookupTable ───────────────────────────────────────────────────────────────

/// Piecewise-linear `y = f(x)` with flat extrapolation beyond both ends.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LookupTable {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl LookupTable {
    /// Build from `(x, y)` points in any order.
    pub fn new(mut points: Vec<(f64, f64)>) -> Self {
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (x, y) = points.into_iter().unzip();
        Self { x, y }
    }

    /// Parse `"x0,y0;x1,y1;…"`.
    pub fn parse(s: &str) -> CoreResult<Self> {
        let points = s
            .split(';')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| {
                let mut it = p.split(',').map(str::trim);
                match (it.next(), it.next(), it.next()) {
                    (Some(x), Some(y), None) => match (x.parse::<f64>(), y.parse::<f64>()) {
                        (Ok(x), Ok(y)) => Ok((x, y)),
                        _ => Err(CoreError::Parse(format!("invalid lookup point {p:?}"))),
                    },
                    _ => Err(CoreError::Parse(format!("lookup point {p:?} is not \"x,y\""))),
                }
            })
            .collect::<CoreResult<Vec<_>>>()?;
        if points.is_empty() {
            return Err(CoreError::Parse("lookup table has no points".into()));
        }
        Ok(Self::new(points))
    }

    /// Multiply every `x` by `factor` (unit change of the input axis).
    pub fn scale_x(&mut self, factor: f64) {
        self.x.iter_mut().for_each(|x| *x *= factor);
    }

    pub fn value_at(&self, x: f64) -> f64 {
        let n = self.x.len();
        if n == 0 {
            return 0.0;
        }
        if x <= self.x[0] {
            return self.y[0];
        }
        if x >= self.x[n - 1] {
            return self.y[n - 1];
        }
        // First breakpoint strictly greater than x; 1 ≤ hi ≤ n-1 here.
        let hi = self.x.partition_point(|&xi| xi <= x);
        let (x0, x1) = (self.x[hi - 1], self.x[hi]);
        let (y0, y1) = (self.y[hi - 1], self.y[hi]);
        if x1 == x0 {
            return y1;
        }
        y0 + (y1 - y0) * (x - x0) / (x1 - x0)
    }
}
