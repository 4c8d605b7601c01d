use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use regex::Regex;
use rust_decimal::Decimal;

use crate::entities::{Net, Pin, ShieldType};
use crate::settings::ProblemSettings;

/// Ordered net groups keyed by derived group name.
pub type NetGroups = IndexMap<String, Vec<Net>>;

/// Read the netlist CSV into net groups, in file order.
///
/// Row layout: `name, layer, width, space, shield_type, pin_name, px, py,
/// ...` where triplets with an empty x-cell are skipped. A `_<digits>`
/// suffix in the name pulls in the matching avoid point as an extra pin; a
/// `<digits>` marker records the bundle group number.
pub fn read_netlist(path: &Path, settings: &ProblemSettings) -> Result<NetGroups> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read netlist {}", path.display()))?;
    parse_netlist(&text, settings)
}

fn parse_netlist(text: &str, settings: &ProblemSettings) -> Result<NetGroups> {
    let avoid_re = Regex::new(r"_(\d+)").expect("valid pattern");
    let group_re = Regex::new(r"<(\d+)>").expect("valid pattern");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.trim_start_matches('\u{feff}').as_bytes());

    let mut groups: NetGroups = IndexMap::new();
    for record in reader.records() {
        let row = record.context("malformed netlist row")?;
        let name = row.get(0).context("netlist row missing name")?;

        let avoid_block_no = avoid_re
            .captures(name)
            .map(|c| c.get(1).map_or("", |m| m.as_str()).to_string());
        let group_no = group_re
            .captures(name)
            .map(|c| c.get(1).map_or("", |m| m.as_str()).to_string());

        let layer = row.get(1).with_context(|| format!("net {name}: missing layer"))?;
        let width = parse_cell(&row, 2, name, "width")?;
        let space = parse_cell(&row, 3, name, "space")?;
        let shield_type = ShieldType::new(row.get(4).unwrap_or_default());

        // pin cells come in (pin_name, px, py) triplets
        let mut pins = Vec::new();
        let mut i = 5;
        while let (Some(px), Some(py)) = (row.get(i + 1), row.get(i + 2)) {
            if !px.is_empty() {
                let x = Decimal::from_str(px.trim())
                    .with_context(|| format!("net {name}: bad pin x {px:?}"))?;
                let y = Decimal::from_str(py.trim())
                    .with_context(|| format!("net {name}: bad pin y {py:?}"))?;
                pins.push(Pin::new(x, y));
            }
            i += 3;
        }

        if let Some(no) = avoid_block_no {
            let p = settings
                .avoid_points
                .get(&no)
                .with_context(|| format!("net {name}: no avoid point for block {no}"))?;
            pins.push(*p);
        }

        let net = Net::from_pins(name, layer, width, space, pins, shield_type, group_no);
        groups.entry(net.group_name().to_string()).or_default().push(net);
    }

    Ok(fix_net_parameters(groups, settings))
}

fn parse_cell(row: &csv::StringRecord, i: usize, name: &str, what: &str) -> Result<Decimal> {
    let cell = row
        .get(i)
        .with_context(|| format!("net {name}: missing {what}"))?;
    Decimal::from_str(cell.trim()).with_context(|| format!("net {name}: bad {what} {cell:?}"))
}

/// Rebuild the nets of groups listed in `fix_net_group` with the
/// overridden spacing.
fn fix_net_parameters(groups: NetGroups, settings: &ProblemSettings) -> NetGroups {
    groups
        .into_iter()
        .map(|(group_name, nl)| {
            let Some(&space) = settings.fix_net_space.get(&group_name) else {
                return (group_name, nl);
            };
            let fixed = nl
                .into_iter()
                .map(|n| {
                    Net::from_pins(
                        &n.name,
                        &n.layer,
                        n.width,
                        space,
                        n.pins,
                        n.shield_type,
                        n.group_no,
                    )
                })
                .collect();
            (group_name, fixed)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{ProblemSettings, tests as settings_tests};
    use rust_decimal_macros::dec;

    fn settings() -> ProblemSettings {
        ProblemSettings::new(
            serde_yaml::from_str(settings_tests::SETTINGS_YAML).unwrap(),
            settings_tests::options(),
        )
        .unwrap()
    }

    #[test]
    fn rows_group_by_derived_name() {
        let csv = "\
net_ax,D1,2,1,S,p1,0,3,p2,5,3
net_ay,D1,2,1,S,p1,1,4
netB<0>,D1,1,0.5,,p1,0,0,p2,2,0
";
        let groups = parse_netlist(csv, &settings()).unwrap();
        let names: Vec<&String> = groups.keys().collect();
        assert_eq!(names, vec!["net_a", "netB"]);
        assert_eq!(groups["net_a"].len(), 2);
        let b = &groups["netB"][0];
        assert_eq!(b.group_no.as_deref(), Some("0"));
        assert_eq!(b.width, dec!(1));
        assert_eq!(b.pins.len(), 2);
    }

    #[test]
    fn empty_x_cells_are_skipped() {
        let csv = "net_ax,D1,2,1,,p1,0,3,p2,,,p3,9,9\n";
        let groups = parse_netlist(csv, &settings()).unwrap();
        let n = &groups["net_a"][0];
        assert_eq!(n.pins.len(), 2);
        assert_eq!(n.pins[1], Pin::new(dec!(9), dec!(9)));
    }

    #[test]
    fn missing_avoid_point_is_an_error() {
        let csv = "esc_9,D1,2,1,,p1,0,3\n";
        assert!(parse_netlist(csv, &settings()).is_err());
    }

    #[test]
    fn avoid_block_suffix_adds_a_pin() {
        let csv = "esc_7,D1,2,1,,p1,0,3\n";
        let groups = parse_netlist(csv, &settings()).unwrap();
        let n = &groups["esc_7"][0];
        assert_eq!(n.pins.len(), 2);
        assert_eq!(n.pins[1], Pin::new(dec!(1.5), dec!(40)));
        // trunk extent includes the avoid point
        assert_eq!(n.x_max, dec!(1.5));
    }

    #[test]
    fn bom_is_tolerated() {
        let csv = "\u{feff}net_a1,D1,2,1,,p1,0,3,p2,5,3\n";
        let groups = parse_netlist(csv, &settings()).unwrap();
        assert_eq!(groups["net_a"].len(), 1);
    }

    #[test]
    fn fixed_groups_get_their_space_overridden() {
        let csv = "fx_ap,D1,2,1,,p1,0,3,p2,5,3\nother,D1,2,1,,p1,0,3,p2,5,3\n";
        let groups = parse_netlist(csv, &settings()).unwrap();
        assert_eq!(groups["fx_a"][0].space, dec!(0.3));
        assert_eq!(groups["other"][0].space, dec!(1));
    }
}
