use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;

use crate::Interval;
use crate::area::RoutingArea;
use crate::entities::{Allocatable, Blockage};
use crate::netlist::NetGroups;
use crate::settings::{ProblemSettings, ReservedArea};
use crate::{algorithms, preprocess, report};

/// Assign each net group to the sub-channel column left of the first
/// reserved block strictly right of its trunks; groups past the last
/// block take the rightmost column index.
fn divide_nets_by_block(
    net_groups: &NetGroups,
    ps: &ProblemSettings,
) -> Result<FxHashMap<usize, NetGroups>> {
    let mut by_col: FxHashMap<usize, NetGroups> = FxHashMap::default();
    for (name, nl) in net_groups {
        let mut cols: Vec<usize> = nl
            .iter()
            .map(|n| {
                ps.blockage_x_intervals
                    .iter()
                    .position(|bz| n.x_interval().end < bz.begin)
                    .unwrap_or(ps.blockage_x_intervals.len())
            })
            .collect();
        cols.dedup();
        if cols.len() != 1 {
            bail!("net group {name} spans multiple sub-channel columns");
        }
        by_col.entry(cols[0]).or_default().insert(name.clone(), nl.clone());
    }
    Ok(by_col)
}

/// Reserved rectangles clipped to one column's sub-channels, shifted into
/// each sub-channel's local y-coordinates.
fn column_blockages(
    ps: &ProblemSettings,
    col: usize,
    reserved: &[ReservedArea],
) -> Vec<Vec<Blockage>> {
    let col_iv = ps.subchannel_x_intervals[col];
    let mut blockages = vec![Vec::new(); ps.n_subchannels];
    for (i, out) in blockages.iter_mut().enumerate() {
        let height = ps.subchannel_height(i);
        let y_iv = Interval::new(height, height + ps.subchannel_width);
        for ra in reserved {
            if col_iv.overlap_size(&ra.x_interval) > Decimal::ZERO
                && y_iv.overlap_size(&ra.y_interval) > Decimal::ZERO
            {
                out.push(Blockage::new(
                    col_iv.begin.max(ra.x_interval.begin),
                    col_iv.end.min(ra.x_interval.end),
                    y_iv.begin.max(ra.y_interval.begin) - height,
                    y_iv.end.min(ra.y_interval.end) - height,
                ));
            }
        }
    }
    blockages
}

/// Groups containing a net too wide for a sub-channel even after width
/// division; these can only be demoted to global routing.
fn unroutable_even_divided(net_groups: &NetGroups, ps: &ProblemSettings) -> Vec<String> {
    net_groups
        .iter()
        .filter(|(_, nl)| {
            nl.iter().any(|n| {
                preprocess::max_allocatable_width(n, ps.shield_width, ps.subchannel_width)
                    <= Decimal::ZERO
            })
        })
        .map(|(name, _)| name.clone())
        .collect()
}

/// Route block-avoiding net groups in their per-column sub-channels.
/// Returns the routed sub-channels per column and the groups that must be
/// retried in the gaps.
pub fn run(
    mut net_groups: NetGroups,
    ps: &ProblemSettings,
) -> Result<(IndexMap<usize, Vec<RoutingArea>>, NetGroups)> {
    let mut unallocatable: NetGroups = IndexMap::new();

    for name in unroutable_even_divided(&net_groups, ps) {
        if let Some(nl) = net_groups.shift_remove(&name) {
            unallocatable.insert(name, nl);
        }
    }

    let groups_by_col = divide_nets_by_block(&net_groups, ps)?;
    let reserved = ps.read_reserved_areas()?;

    let mut subchannel_dict: IndexMap<usize, Vec<RoutingArea>> = IndexMap::new();
    for col in 0..ps.num_subchannel_cols() {
        let mut subchannels = ps.generate_subchannels();
        for (i, blocks) in column_blockages(ps, col, &reserved).into_iter().enumerate() {
            for b in blocks {
                subchannels[i].place_blockage(b)?;
            }
        }

        let empty = NetGroups::new();
        let col_groups = groups_by_col.get(&col).unwrap_or(&empty);

        let probe = ps.generate_subchannel();
        let (oids, bundles) = preprocess::run(col_groups, ps.shield_width, &probe)?;

        println!("{}", "=".repeat(50));
        println!("Subchannel Block: {col}");
        println!("#Oids: {}", oids.len());
        println!("#Bundles: {}", bundles.len());

        let bundle_failures = algorithms::greedy_allocate_bundles(&bundles, &mut subchannels)?;
        let n_used_for_bundles = report::n_routing_areas_used(&subchannels);
        for name in bundle_failures {
            let nl = col_groups
                .get(&name)
                .with_context(|| format!("unknown bundle group {name}"))?
                .clone();
            unallocatable.insert(name, nl);
        }

        let (used, remaining, leftover) =
            algorithms::route_oids(oids, subchannels, ps.algorithm, ps.use_gco)?;
        for oid in leftover {
            println!("Unallocatable oids: {}", oid.name());
            let nl = col_groups
                .get(oid.name())
                .with_context(|| format!("unknown net group {}", oid.name()))?
                .clone();
            unallocatable.insert(oid.name().to_string(), nl);
        }

        let total: Vec<RoutingArea> = used.into_iter().chain(remaining).collect();
        println!("Routing Summary");
        println!("#subchannels used for bundles: {n_used_for_bundles}");
        println!("#subchannels used for total: {}", report::n_routing_areas_used(&total));
        subchannel_dict.insert(col, total);
    }

    Ok((subchannel_dict, unallocatable))
}
