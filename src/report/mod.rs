use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::area::RoutingArea;
use crate::entities::{AllocData, Allocation, WireGeometry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalJson {
    pub min: Decimal,
    pub max: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationJson {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub x_interval: IntervalJson,
    pub y_interval: IntervalJson,
}

/// Routing result as serialized to disk: gap allocations keyed by gap id,
/// sub-channel allocations keyed by column then sub-channel id. Decimals
/// travel as strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RoutingResult {
    pub gaps: IndexMap<String, Vec<AllocationJson>>,
    pub subchannel: IndexMap<String, IndexMap<String, Vec<AllocationJson>>>,
}

pub fn allocation_to_json(a: &Allocation) -> AllocationJson {
    AllocationJson {
        name: a.name().to_string(),
        kind: a.kind().to_string(),
        x_interval: IntervalJson { min: a.x_min(), max: a.x_max() },
        y_interval: IntervalJson { min: a.y_min(), max: a.y_max() },
    }
}

/// Assemble the result document. Areas without allocations stay out of the
/// id maps; every sub-channel column is present.
pub fn build_result(
    gaps: &[RoutingArea],
    subchannels: &IndexMap<usize, Vec<RoutingArea>>,
) -> RoutingResult {
    let mut result = RoutingResult::default();
    for g in gaps {
        for a in g.allocations() {
            result
                .gaps
                .entry(g.id.to_string())
                .or_default()
                .push(allocation_to_json(&a));
        }
    }
    for (col, areas) in subchannels {
        let col_map = result.subchannel.entry(col.to_string()).or_default();
        for sc in areas {
            for a in sc.allocations() {
                col_map
                    .entry(sc.id.to_string())
                    .or_default()
                    .push(allocation_to_json(&a));
            }
        }
    }
    result
}

pub fn save_result(save_dir: &Path, fname: &str, result: &RoutingResult) -> Result<PathBuf> {
    fs::create_dir_all(save_dir)
        .with_context(|| format!("cannot create save dir {}", save_dir.display()))?;
    let path = save_dir.join(fname);
    let json = serde_json::to_string_pretty(result).context("cannot serialize routing result")?;
    fs::write(&path, json)
        .with_context(|| format!("cannot write routing result {}", path.display()))?;
    Ok(path)
}

pub fn load_result(path: &Path) -> Result<RoutingResult> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read routing result {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("cannot parse routing result {}", path.display()))
}

/// Number of areas carrying anything beyond their blockages.
pub fn n_routing_areas_used(ras: &[RoutingArea]) -> usize {
    ras.iter()
        .filter(|ra| !ra.allocations_without_blockage().is_empty())
        .count()
}

/// Total vertical wirelength of the nets placed in one area, measured
/// from each pin to the trunk's absolute height.
pub fn area_vertical_wirelength(ra: &RoutingArea) -> Decimal {
    let mut total = Decimal::ZERO;
    for a in ra.allocations() {
        if let AllocData::Net(n) = &a.data {
            total += n.vertical_wirelength(ra.height + a.offset);
        }
    }
    total
}

pub fn total_vertical_wirelength(ras: &[RoutingArea]) -> Decimal {
    ras.iter().map(area_vertical_wirelength).sum()
}
