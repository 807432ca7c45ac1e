//! CSV demand loader.
//!
//! # CSV format
//!
//! One row per demand generator.  `values` is a quoted, comma-separated
//! list of veh/h samples; `path_id` is empty for pathless commodities.
//!
//! ```csv
//! link_id,commodity_id,path_id,start_time,dt,values
//! 0,0,,0,300,"1200,1800,900"
//! 3,1,2,600,0,"400"
//! ```
//!
//! Ids are resolved against the network here, so a file naming an unknown
//! link, commodity, or path fails to load rather than failing validation.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use ctm_core::{CommodityId, DemandId, LinkId, PathId, Profile1D};
use ctm_network::Network;

use crate::{DemandError, DemandGenerator, DemandResult};

// ── CSV record ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct DemandRecord {
    link_id:      u32,
    commodity_id: u32,
    path_id:      Option<u32>,
    start_time:   f64,
    dt:           f64,
    values:       String,
}

/// A demand generator that has not yet been given an id.
#[derive(Clone, Debug, PartialEq)]
pub struct DemandSpec {
    pub link:      LinkId,
    pub commodity: CommodityId,
    pub path:      Option<PathId>,
    /// veh/h
    pub profile:   Profile1D,
}

impl DemandSpec {
    pub fn into_generator(self, id: DemandId) -> DemandGenerator {
        DemandGenerator::new(id, self.link, self.commodity, self.path, self.profile)
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Load demand generators from a CSV file.
pub fn load_demands_csv(path: &Path, net: &Network) -> DemandResult<Vec<DemandSpec>> {
    let file = std::fs::File::open(path)?;
    load_demands_reader(file, net)
}

/// Like [`load_demands_csv`] but accepts any `Read` source.
pub fn load_demands_reader<R: Read>(reader: R, net: &Network) -> DemandResult<Vec<DemandSpec>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut specs = Vec::new();

    for (row_no, result) in csv_reader.deserialize::<DemandRecord>().enumerate() {
        let row = result.map_err(|e| DemandError::Parse(e.to_string()))?;
        let link = LinkId(row.link_id);
        let commodity = CommodityId(row.commodity_id);
        let path = row.path_id.map(PathId);

        net.link(link)?;
        net.commodity(commodity)?;
        if let Some(pid) = path {
            net.path(pid)?;
        }

        let profile = Profile1D::from_csv_str(row.start_time, row.dt, &row.values)
            .map_err(|e| DemandError::Parse(format!("row {}: {e}", row_no + 1)))?;
        specs.push(DemandSpec { link, commodity, path, profile });
    }

    Ok(specs)
}
