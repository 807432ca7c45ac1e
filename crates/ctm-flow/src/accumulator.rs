//! Cumulative vehicle counts, read by sensors and controllers as deltas.

use std::collections::BTreeMap;

use ctm_core::CommodityId;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlowAccumulator {
    per_commodity: BTreeMap<CommodityId, f64>,
    total:         f64,
}

impl FlowAccumulator {
    pub fn add(&mut self, commodity: CommodityId, veh: f64) {
        if veh > 0.0 {
            *self.per_commodity.entry(commodity).or_insert(0.0) += veh;
            self.total += veh;
        }
    }

    pub fn total_count(&self) -> f64 {
        self.total
    }

    pub fn count_for(&self, commodity: CommodityId) -> f64 {
        self.per_commodity.get(&commodity).copied().unwrap_or(0.0)
    }

    pub fn reset(&mut self) {
        self.per_commodity.clear();
        self.total = 0.0;
    }
}
