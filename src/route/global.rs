use anyhow::{Result, bail};

use crate::area::RoutingArea;
use crate::netlist::NetGroups;
use crate::settings::ProblemSettings;
use crate::{algorithms, preprocess, report};

/// Route blockage-crossing net groups across the full-width gaps. Any
/// group that cannot be placed here is a hard failure.
pub fn run(net_groups: &NetGroups, ps: &ProblemSettings) -> Result<Vec<RoutingArea>> {
    let probe = ps.generate_gap();
    let (oids, bundles) = preprocess::run(net_groups, ps.shield_width, &probe)?;
    println!("{}", "=".repeat(50));
    println!("Global Routing");
    println!("#Oids: {}", oids.len());
    println!("#Bundles: {}", bundles.len());

    let mut gaps = ps.generate_gaps();

    let unallocatable = algorithms::greedy_allocate_bundles(&bundles, &mut gaps)?;
    let n_gaps_used_for_bundles = report::n_routing_areas_used(&gaps);
    if !unallocatable.is_empty() {
        bail!("cannot allocate bundles: {}", unallocatable.join(", "));
    }

    let (used_gaps, remaining_gaps, remaining_oids) =
        algorithms::route_oids(oids, gaps, ps.algorithm, ps.use_gco)?;
    if !remaining_oids.is_empty() {
        let names: Vec<&str> = remaining_oids.iter().map(|oid| oid.name()).collect();
        bail!("cannot assign oids: {}", names.join(", "));
    }

    let total_gaps: Vec<RoutingArea> = used_gaps.into_iter().chain(remaining_gaps).collect();
    println!("Routing Summary");
    println!("#gaps used for bundles: {n_gaps_used_for_bundles}");
    println!("#gaps used for total: {}", report::n_routing_areas_used(&total_gaps));

    Ok(total_gaps)
}
