pub mod global;
pub mod local;

use std::path::Path;
use std::time::Instant;

use anyhow::{Result, bail};
use indexmap::IndexMap;

use crate::Interval;
use crate::area::RoutingArea;
use crate::entities::Allocatable;
use crate::netlist::{self, NetGroups};
use crate::report;
use crate::settings::{ProblemSettings, RunOptions, SettingsDoc};

/// Drop net groups the run cannot handle: groups off the target layer
/// (silently) and groups whose nets disagree on layer (logged).
pub fn remove_not_assumed_netlist(mut net_groups: NetGroups, ps: &ProblemSettings) -> NetGroups {
    let off_layer: Vec<String> = net_groups
        .iter()
        .filter(|(_, nl)| nl.first().is_none_or(|n| n.layer != ps.target_layer))
        .map(|(name, _)| name.clone())
        .collect();
    for name in off_layer {
        net_groups.shift_remove(&name);
    }

    let mixed: Vec<String> = net_groups
        .iter()
        .filter(|(_, nl)| nl.iter().any(|n| n.layer != nl[0].layer))
        .map(|(name, _)| name.clone())
        .collect();
    println!("{}", "=".repeat(30));
    println!("Remove net group due to not-compatible design rules: ");
    for name in &mixed {
        println!("- {name}");
        net_groups.shift_remove(name);
    }
    println!("{}", "=".repeat(30));
    net_groups
}

/// Partition net groups by whether they cross any reserved block in x.
/// A group mixing crossing and non-crossing nets violates the input
/// contract.
pub fn divide_nets_into_local_or_global(
    net_groups: NetGroups,
    blockage_x_intervals: &[Interval],
) -> Result<(NetGroups, NetGroups)> {
    let crosses = |n: &crate::entities::Net| {
        blockage_x_intervals.iter().any(|bz| n.x_interval().overlaps(bz))
    };

    let mut global_groups: NetGroups = IndexMap::new();
    let mut local_groups: NetGroups = IndexMap::new();
    for (name, nl) in net_groups {
        let (global_nl, local_nl): (Vec<_>, Vec<_>) = nl.into_iter().partition(|n| crosses(n));
        if !global_nl.is_empty() && !local_nl.is_empty() {
            bail!("net group {name} mixes blockage-crossing and blockage-avoiding nets");
        }
        if !global_nl.is_empty() {
            global_groups.insert(name, global_nl);
        } else {
            local_groups.insert(name, local_nl);
        }
    }
    Ok((global_groups, local_groups))
}

/// Two-step routing: block-avoiding groups go to per-column sub-channels,
/// block-crossing ones (plus anything the sub-channels refused) to the
/// full-width gaps. Writes the result JSON and returns the routed areas.
pub fn two_step_routing(
    net_groups: NetGroups,
    ps: &ProblemSettings,
) -> Result<(Vec<RoutingArea>, IndexMap<usize, Vec<RoutingArea>>)> {
    let (mut global_groups, local_groups) =
        divide_nets_into_local_or_global(net_groups, &ps.blockage_x_intervals)?;

    let (subchannels, unallocatable_local) = local::run(local_groups, ps)?;

    for (name, nl) in unallocatable_local {
        if global_groups.contains_key(&name) {
            bail!("net group name duplication: {name}");
        }
        global_groups.insert(name, nl);
    }

    let gaps = global::run(&global_groups, ps)?;

    println!("{}", "=".repeat(50));
    println!("Routing Result Summary");
    println!("#RAs used");
    println!("- #gaps: {}", report::n_routing_areas_used(&gaps));
    for (col, subc) in &subchannels {
        println!("- #subchannels-col{col}: {}", report::n_routing_areas_used(subc));
    }
    println!("Wirelength");
    println!("- gaps: {}", report::total_vertical_wirelength(&gaps));
    for (col, subc) in &subchannels {
        println!("- subchannels-col{col}: {}", report::total_vertical_wirelength(subc));
    }
    println!("{}", "=".repeat(50));

    let prefix = if ps.use_gco {
        format!("{}_gco", ps.algorithm.label())
    } else {
        ps.algorithm.label().to_string()
    };
    let fname = format!("{}_layer{}.json", prefix, ps.target_layer);
    let result = report::build_result(&gaps, &subchannels);
    report::save_result(&ps.save_dir, &fname, &result)?;

    Ok((gaps, subchannels))
}

/// Full pipeline: load settings and netlist, filter, route, report.
pub fn run(netlist_path: &Path, settings_path: &Path, opts: RunOptions) -> Result<()> {
    let doc = SettingsDoc::load(settings_path)?;
    let ps = ProblemSettings::new(doc, opts)?;
    let net_groups = netlist::read_netlist(netlist_path, &ps)?;
    let net_groups = remove_not_assumed_netlist(net_groups, &ps);

    let start = Instant::now();
    two_step_routing(net_groups, &ps)?;
    println!("Elapsed: {:.2} [s]", start.elapsed().as_secs_f64());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Net, Pin, ShieldType};
    use rust_decimal_macros::dec;
    use rust_decimal::Decimal;

    fn net_on(layer: &str, name: &str, x_min: Decimal, x_max: Decimal) -> Net {
        Net::with_extent(
            name,
            layer,
            dec!(1),
            dec!(0.5),
            x_min,
            x_max,
            vec![Pin::new(x_min, dec!(3)), Pin::new(x_max, dec!(3))],
            ShieldType::none(),
            None,
        )
    }

    fn settings() -> ProblemSettings {
        let doc: SettingsDoc = serde_yaml::from_str(crate::settings::tests::SETTINGS_YAML).unwrap();
        ProblemSettings::new(doc, crate::settings::tests::options()).unwrap()
    }

    #[test]
    fn off_layer_and_mixed_groups_are_dropped() {
        let ps = settings();
        let mut groups: NetGroups = IndexMap::new();
        groups.insert("keep".into(), vec![net_on("D1", "keep", dec!(0), dec!(5))]);
        groups.insert("other".into(), vec![net_on("D2", "other", dec!(0), dec!(5))]);
        groups.insert(
            "mixed".into(),
            vec![
                net_on("D1", "mixed1", dec!(0), dec!(5)),
                net_on("D2", "mixed2", dec!(0), dec!(5)),
            ],
        );
        let groups = remove_not_assumed_netlist(groups, &ps);
        let names: Vec<&String> = groups.keys().collect();
        assert_eq!(names, vec!["keep"]);
    }

    #[test]
    fn crossing_and_avoiding_groups_partition() {
        let mut groups: NetGroups = IndexMap::new();
        groups.insert("local".into(), vec![net_on("D1", "local", dec!(0), dec!(8))]);
        groups.insert("global".into(), vec![net_on("D1", "global", dec!(5), dec!(25))]);
        let blocks = vec![Interval::new(dec!(10), dec!(20))];
        let (global_groups, local_groups) =
            divide_nets_into_local_or_global(groups, &blocks).unwrap();
        assert!(global_groups.contains_key("global"));
        assert!(local_groups.contains_key("local"));
    }

    #[test]
    fn mixed_local_global_group_fails() {
        let mut groups: NetGroups = IndexMap::new();
        groups.insert(
            "bad".into(),
            vec![
                net_on("D1", "bad1", dec!(0), dec!(8)),
                net_on("D1", "bad2", dec!(5), dec!(25)),
            ],
        );
        let blocks = vec![Interval::new(dec!(10), dec!(20))];
        assert!(divide_nets_into_local_or_global(groups, &blocks).is_err());
    }
}
