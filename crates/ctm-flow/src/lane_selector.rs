//! Lane selection: how flow entering a lane group is spread over staying,
//! moving out, and moving in.

/// Lane-selection policy of one commodity in one lane group.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum LaneSelector {
    /// Stay if this lane group gets you there, otherwise head for the side
    /// that does (outer first).
    #[default]
    Keep,
    Logit(LogitSelector),
}

/// Multinomial logit over the feasible options.
///
/// ```text
/// u_stay  = keep   − rho_vehperlane · ρ_own
/// u_in    = add_in − rho_vehperlane · ρ_inner
/// u_out   =        − rho_vehperlane · ρ_outer
/// ```
///
/// Densities are in veh/km/lane.  With `dt_secs` set, they are sampled at
/// each lane-selector poke and held in between; otherwise they are read
/// live every step.
#[derive(Clone, Debug, PartialEq)]
pub struct LogitSelector {
    pub keep:           f64,
    pub rho_vehperlane: f64,
    pub add_in:         f64,
    pub dt_secs:        Option<f64>,
    pub cached:         Option<LaneDensities>,
}

impl LogitSelector {
    pub const DEFAULT_KEEP: f64 = 0.7;
    pub const DEFAULT_RHO_VEHPERLANE: f64 = 0.007147;

    pub fn new(keep: f64, rho_vehperlane: f64, dt_secs: Option<f64>) -> Self {
        Self { keep, rho_vehperlane, add_in: 0.0, dt_secs, cached: None }
    }
}

impl Default for LogitSelector {
    fn default() -> Self {
        Self::new(Self::DEFAULT_KEEP, Self::DEFAULT_RHO_VEHPERLANE, None)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct LaneDensities {
    pub inner: f64,
    pub own:   f64,
    pub outer: f64,
}

/// Which moves lead somewhere useful from a given lane group.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LaneOptions {
    pub stay:  bool,
    pub outer: bool,
    pub inner: bool,
}

/// Fractions of arriving flow assigned to each partition; they sum to 1.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LaneChoice {
    pub dwn: f64,
    pub out: f64,
    pub inn: f64,
}

impl LaneChoice {
    pub const STAY: LaneChoice = LaneChoice { dwn: 1.0, out: 0.0, inn: 0.0 };
    pub const OUT:  LaneChoice = LaneChoice { dwn: 0.0, out: 1.0, inn: 0.0 };
    pub const IN:   LaneChoice = LaneChoice { dwn: 0.0, out: 0.0, inn: 1.0 };
}

impl LaneSelector {
    /// Spread arriving flow over the feasible options.  `live` supplies
    /// current densities when the selector needs them and holds none.
    pub fn choose(&self, options: LaneOptions, live: impl FnOnce() -> LaneDensities) -> LaneChoice {
        let feasible = [options.stay, options.outer, options.inner];
        match feasible.iter().filter(|&&f| f).count() {
            0 => return LaneChoice::STAY,
            1 => {
                return if options.stay {
                    LaneChoice::STAY
                } else if options.outer {
                    LaneChoice::OUT
                } else {
                    LaneChoice::IN
                };
            }
            _ => {}
        }
        match self {
            LaneSelector::Keep => {
                if options.stay {
                    LaneChoice::STAY
                } else {
                    LaneChoice::OUT
                }
            }
            LaneSelector::Logit(l) => {
                let rho = l.cached.unwrap_or_else(live);
                let u = [
                    l.keep - l.rho_vehperlane * rho.own,
                    -l.rho_vehperlane * rho.outer,
                    l.add_in - l.rho_vehperlane * rho.inner,
                ];
                let p = softmax(u, feasible);
                LaneChoice { dwn: p[0], out: p[1], inn: p[2] }
            }
        }
    }
}

/// Softmax over the feasible entries of `u`.  An infinite utility takes
/// everything.
fn softmax(u: [f64; 3], feasible: [bool; 3]) -> [f64; 3] {
    let mut p = [0.0; 3];
    if let Some(i) = (0..3).find(|&i| feasible[i] && u[i] == f64::INFINITY) {
        p[i] = 1.0;
        return p;
    }
    let max = (0..3)
        .filter(|&i| feasible[i])
        .map(|i| u[i])
        .fold(f64::NEG_INFINITY, f64::max);
    for i in (0..3).filter(|&i| feasible[i]) {
        p[i] = (u[i] - max).exp();
    }
    let sum: f64 = p.iter().sum();
    p.iter_mut().for_each(|x| *x /= sum);
    p
}
