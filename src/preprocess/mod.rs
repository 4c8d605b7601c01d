use anyhow::{Result, bail};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::area::RoutingArea;
use crate::containers::{Bundle, OverlappedIntervalDict};
use crate::entities::{Allocatable, Net};

/// Build the overlap container for a net list, named after the first
/// net's group.
pub fn make_oid(netlist: &[Net], shield_width: Decimal) -> OverlappedIntervalDict {
    let name = netlist.first().map_or("", |n| n.group_name());
    OverlappedIntervalDict::new(name, netlist, shield_width)
}

/// Split a width into parts no larger than `factor`: quotient copies of
/// the factor followed by the remainder when one exists.
pub fn divide_width(w: Decimal, factor: Decimal) -> Vec<Decimal> {
    let remainder = w % factor;
    let quotient = ((w - remainder) / factor).to_usize().unwrap_or(0);
    let mut widths = vec![factor; quotient];
    if remainder != Decimal::ZERO {
        widths.push(remainder);
    }
    widths
}

/// Widest trunk the area can still take once the net's own clearances
/// (doubled for the shield pair, plus the shields themselves, when the net
/// is shielded) are subtracted.
pub fn max_allocatable_width(net: &Net, shield_width: Decimal, area_width: Decimal) -> Decimal {
    if net.shield_type.is_none() {
        area_width - (net.upper_space() + net.lower_space())
    } else {
        area_width
            - (net.upper_space() * Decimal::TWO
                + net.lower_space() * Decimal::TWO
                + shield_width * Decimal::TWO)
    }
}

/// Divide an oversized trunk into child nets `{name}_c{i}` that each fit
/// the routing area, inheriting every other field.
pub fn trunk_division(net: &Net, shield_width: Decimal, area_width: Decimal) -> Result<Vec<Net>> {
    let max_w = max_allocatable_width(net, shield_width, area_width);
    if max_w <= Decimal::ZERO {
        bail!(
            "trunk {} (width {}) cannot be divided to fit area width {}",
            net.name,
            net.width,
            area_width
        );
    }

    let widths = divide_width(net.width, max_w);
    let children = widths
        .into_iter()
        .enumerate()
        .map(|(i, width)| {
            Net::from_pins(
                &format!("{}_c{}", net.name, i),
                &net.layer,
                width,
                net.upper_space(),
                net.pins.clone(),
                net.shield_type.clone(),
                net.group_no.clone(),
            )
        })
        .collect();
    Ok(children)
}

/// Greedily pack a net list into sub-groups that each fit the routing
/// area. A lone net the area refuses is width-split into singleton groups;
/// otherwise the refused net starts the next group.
pub fn grouping(
    netlist: &[Net],
    shield_width: Decimal,
    area: &RoutingArea,
) -> Result<Vec<Vec<Net>>> {
    let mut groups: Vec<Vec<Net>> = Vec::new();
    let mut tmp: Vec<Net> = Vec::new();
    for n in netlist {
        tmp.push(n.clone());
        let oid = make_oid(&tmp, shield_width);
        if !area.allocatable(&oid, None) {
            if tmp.len() == 1 {
                let split = trunk_division(&tmp[0], shield_width, area.width)?;
                groups.extend(split.into_iter().map(|c| vec![c]));
                tmp.clear();
            } else {
                let last = tmp.pop().unwrap();
                groups.push(std::mem::take(&mut tmp));
                tmp.push(last);
            }
        }
    }
    if !tmp.is_empty() {
        groups.push(tmp);
    }
    Ok(groups)
}

/// Split the input net groups into post-routed OIDs (group fits one area
/// whole) and pre-routed Bundles (group must span consecutive areas).
pub fn run(
    net_groups: &IndexMap<String, Vec<Net>>,
    shield_width: Decimal,
    area: &RoutingArea,
) -> Result<(Vec<OverlappedIntervalDict>, Vec<Bundle>)> {
    let mut oids = Vec::new();
    let mut bundles = Vec::new();

    for (group_name, nl) in net_groups {
        let oid = make_oid(nl, shield_width);
        if area.allocatable(&oid, None) {
            oids.push(oid);
            continue;
        }

        let groups = if nl.len() == 1 {
            let split = trunk_division(&nl[0], shield_width, area.width)?;
            grouping(&split, shield_width, area)?
        } else {
            grouping(nl, shield_width, area)?
        };

        let components = groups
            .iter()
            .map(|sub| make_oid(sub, shield_width))
            .collect();
        bundles.push(Bundle::new(group_name, components));
    }
    Ok((oids, bundles))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Pin, ShieldType};
    use rust_decimal_macros::dec;

    fn net(name: &str, width: Decimal, space: Decimal, shield: &str) -> Net {
        Net::from_pins(
            name,
            "D1",
            width,
            space,
            vec![Pin::new(dec!(0), dec!(0)), Pin::new(dec!(10), dec!(0))],
            ShieldType::new(shield),
            None,
        )
    }

    #[test]
    fn divide_width_uses_minimal_parts() {
        assert_eq!(divide_width(dec!(8), dec!(3)), vec![dec!(3), dec!(3), dec!(2)]);
        assert_eq!(divide_width(dec!(8), dec!(2)), vec![dec!(2); 4]);
        assert_eq!(divide_width(dec!(1.5), dec!(2)), vec![dec!(1.5)]);
        let parts = divide_width(dec!(7.5), dec!(2));
        assert_eq!(parts.iter().copied().sum::<Decimal>(), dec!(7.5));
        assert!(parts.iter().all(|w| *w <= dec!(2)));
        assert_eq!(parts.len(), 4);
    }

    #[test]
    fn trunk_division_names_children() {
        let n = net("fat_1", dec!(8), dec!(1), "");
        // max width 10 - 2 = 8 exactly: single child
        assert_eq!(trunk_division(&n, dec!(0.4), dec!(10)).unwrap().len(), 1);

        let n = net("fat_1", dec!(9), dec!(1), "");
        let children = trunk_division(&n, dec!(0.4), dec!(10)).unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].name, "fat_1_c0");
        assert_eq!(children[1].name, "fat_1_c1");
        assert_eq!(children[0].width, dec!(8));
        assert_eq!(children[1].width, dec!(1));
        assert_eq!(children[0].layer, "D1");
    }

    #[test]
    fn shielded_trunk_reserves_shield_room() {
        let n = net("fat_1", dec!(9), dec!(1), "S");
        // 10 - 2*1 - 2*1 - 2*0.5 = 5
        let children = trunk_division(&n, dec!(0.5), dec!(10)).unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].width, dec!(5));
        assert_eq!(children[1].width, dec!(4));
    }

    #[test]
    fn unsplittable_trunk_is_an_error() {
        let n = net("fat_1", dec!(9), dec!(3), "");
        assert!(trunk_division(&n, dec!(0.4), dec!(6)).is_err());
    }

    #[test]
    fn grouping_closes_before_the_refused_net() {
        let area = RoutingArea::new(0, dec!(10), dec!(0));
        let nl = vec![
            net("a_1", dec!(3), dec!(1), ""),
            net("b_1", dec!(3), dec!(1), ""),
            net("c_1", dec!(3), dec!(1), ""),
        ];
        // a+b stack: 1+3+1+3+1 = 9 fits; adding c needs 13
        let groups = grouping(&nl, dec!(0.4), &area).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1].len(), 1);
    }

    #[test]
    fn grouping_splits_an_oversized_lone_net() {
        let area = RoutingArea::new(0, dec!(10), dec!(0));
        let nl = vec![net("fat_1", dec!(9), dec!(1), ""), net("b_1", dec!(3), dec!(1), "")];
        let groups = grouping(&nl, dec!(0.4), &area).unwrap();
        // fat_1 splits into two singletons, b starts fresh
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0][0].name, "fat_1_c0");
        assert_eq!(groups[1][0].name, "fat_1_c1");
        assert_eq!(groups[2][0].name, "b_1");
        let total: usize = groups.iter().map(|g| g.len()).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn run_separates_oids_from_bundles() {
        let area = RoutingArea::new(0, dec!(10), dec!(0));
        let mut groups: IndexMap<String, Vec<Net>> = IndexMap::new();
        groups.insert("a_1".into(), vec![net("a_1", dec!(3), dec!(1), "")]);
        groups.insert(
            "b_1".into(),
            vec![
                net("b_1x", dec!(3), dec!(1), ""),
                net("b_1y", dec!(3), dec!(1), ""),
                net("b_1z", dec!(3), dec!(1), ""),
            ],
        );
        let (oids, bundles) = run(&groups, dec!(0.4), &area).unwrap();
        assert_eq!(oids.len(), 1);
        assert_eq!(oids[0].name(), "a_1");
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].name(), "b_1");
        assert_eq!(bundles[0].len(), 2);
    }
}
