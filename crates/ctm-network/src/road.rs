//! Fundamental-diagram parameters shared by every lane of a link.

/// Triangular fundamental diagram, per lane.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoadParams {
    /// Capacity in vehicles per hour per lane.
    pub capacity_vphpl:    f64,
    /// Free-flow speed in km/h.
    pub speed_kph:         f64,
    /// Jam density in vehicles per km per lane.
    pub jam_density_vpkpl: f64,
}

impl RoadParams {
    pub const fn new(capacity_vphpl: f64, speed_kph: f64, jam_density_vpkpl: f64) -> Self {
        Self { capacity_vphpl, speed_kph, jam_density_vpkpl }
    }

    /// Density at which free-flow traffic reaches capacity, veh/km/lane.
    #[inline]
    pub fn critical_density_vpkpl(&self) -> f64 {
        self.capacity_vphpl / self.speed_kph
    }

    /// Backward wave speed in km/h.
    #[inline]
    pub fn wave_speed_kph(&self) -> f64 {
        self.capacity_vphpl / (self.jam_density_vpkpl - self.critical_density_vpkpl())
    }

    /// Problems with these parameters, phrased for a validation log.
    pub fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !(self.capacity_vphpl > 0.0) {
            out.push(format!("capacity must be positive, got {}", self.capacity_vphpl));
        }
        if !(self.speed_kph > 0.0) {
            out.push(format!("free-flow speed must be positive, got {}", self.speed_kph));
        }
        if !(self.jam_density_vpkpl > 0.0) {
            out.push(format!("jam density must be positive, got {}", self.jam_density_vpkpl));
        }
        if out.is_empty() && self.jam_density_vpkpl <= self.critical_density_vpkpl() {
            out.push(format!(
                "jam density {} must exceed critical density {}",
                self.jam_density_vpkpl,
                self.critical_density_vpkpl()
            ));
        }
        out
    }
}

impl Default for RoadParams {
    /// A typical freeway lane: 1800 veh/h, 100 km/h, 100 veh/km.
    fn default() -> Self {
        Self::new(1_800.0, 100.0, 100.0)
    }
}

/// Which supply rule a link's cells follow.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ModelType {
    /// Standard cell transmission: supply from the backward wave.
    #[default]
    Ctm,
    /// Infinite supply; every upstream request is admitted.
    ManyToOne,
}
