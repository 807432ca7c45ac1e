//! Simulation time model.
//!
//! # Design
//!
//! Time is a monotonically increasing `SimTime` counted in integer
//! **milliseconds** since the simulation epoch.  Scenario inputs (step sizes,
//! profile breakpoints, controller periods) arrive as `f64` seconds and are
//! rounded to the nearest millisecond once, at the boundary.
//!
//! Using an integer as the canonical time unit means event ordering is exact
//! (no floating-point drift when a 2 s step is added 1,800 times) and
//! `SimTime` can be `Ord + Hash`, which the dispatcher's ordered queue needs.

use std::fmt;

use crate::ValidationLog;

// ── SimTime ───────────────────────────────────────────────────────────────────

/// An absolute simulation timestamp in milliseconds.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimTime(pub u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    /// Convert seconds to a timestamp, rounding to the nearest millisecond.
    /// Negative inputs clamp to zero.
    #[inline]
    pub fn from_secs(secs: f64) -> SimTime {
        SimTime((secs.max(0.0) * 1_000.0).round() as u64)
    }

    /// Timestamp in seconds.
    #[inline]
    pub fn as_secs(self) -> f64 {
        self.0 as f64 / 1_000.0
    }

    /// Return the timestamp `secs` seconds after `self`.
    #[inline]
    pub fn offset_secs(self, secs: f64) -> SimTime {
        SimTime(self.0 + SimTime::from_secs(secs).0)
    }

    /// Milliseconds elapsed from `earlier` to `self`, saturating at zero.
    #[inline]
    pub fn since(self, earlier: SimTime) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl std::ops::Add<u64> for SimTime {
    type Output = SimTime;
    #[inline]
    fn add(self, rhs: u64) -> SimTime {
        SimTime(self.0 + rhs)
    }
}

impl std::ops::Sub for SimTime {
    type Output = u64;
    #[inline]
    fn sub(self, rhs: SimTime) -> u64 {
        self.0 - rhs.0
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.as_secs())
    }
}

// ── SimConfig ─────────────────────────────────────────────────────────────────

/// Top-level simulation configuration.
///
/// Typically built by the application crate and passed to the simulation
/// builder.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimConfig {
    /// Simulation start, seconds after midnight.
    pub start_time_secs: f64,

    /// How long `run` simulates, in seconds.
    pub duration_secs: f64,

    /// Flow-model step.  Cell lengths are derived from it
    /// (`free-flow speed · dt`), so it directly sets the CFL numbers.
    pub sim_dt_secs: f64,
}

impl SimConfig {
    /// Smallest usable flow-model step: one tick of [`SimTime`].
    pub const MIN_STEP_SECS: f64 = 0.001;

    /// Record an error unless the step is finite and at least
    /// [`MIN_STEP_SECS`](Self::MIN_STEP_SECS).  Below that the next model
    /// update would round back onto the current instant.
    pub fn check_step(&self, log: &mut ValidationLog) {
        let dt = self.sim_dt_secs;
        if !(dt.is_finite() && dt >= Self::MIN_STEP_SECS) {
            log.add_error(format!(
                "step must be a finite number of seconds >= {}, got {dt}",
                Self::MIN_STEP_SECS
            ));
        }
    }

    #[inline]
    pub fn start_time(&self) -> SimTime {
        SimTime::from_secs(self.start_time_secs)
    }

    /// The timestamp at which `run` stops (exclusive upper bound).
    #[inline]
    pub fn end_time(&self) -> SimTime {
        SimTime::from_secs(self.start_time_secs + self.duration_secs)
    }

    /// Number of whole flow-model steps in the configured duration.
    pub fn step_count(&self) -> u64 {
        if self.sim_dt_secs <= 0.0 {
            return 0;
        }
        (self.duration_secs / self.sim_dt_secs).floor() as u64
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            start_time_secs: 0.0,
            duration_secs:   3_600.0,
            sim_dt_secs:     2.0,
        }
    }
}
