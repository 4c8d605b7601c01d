use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use anyhow::Result;
use clap::ValueEnum;
use rust_decimal::Decimal;

use crate::Interval;
use crate::area::RoutingArea;
use crate::containers::{Bundle, OverlappedIntervalDict};
use crate::entities::{Allocatable, WireGeometry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Algorithm {
    /// Left-edge sweep
    Le,
    /// Constraint-aware placement
    Cap,
    /// Criticality-aware CAP
    Ccap,
}

impl Algorithm {
    pub fn label(&self) -> &'static str {
        match self {
            Algorithm::Le => "le",
            Algorithm::Cap => "cap",
            Algorithm::Ccap => "ccap",
        }
    }
}

/// Assign each bundle to the window of consecutive routing areas that
/// minimizes its vertical wirelength, committing component offsets and
/// stack tops as initial ceilings. Returns the names of bundles with no
/// feasible window.
pub fn greedy_allocate_bundles(bundles: &[Bundle], ras: &mut [RoutingArea]) -> Result<Vec<String>> {
    let mut sorted: Vec<&Bundle> = bundles.iter().collect();
    sorted.sort_by_key(|b| Reverse(b.pins().len()));
    let gap_heights: Vec<Decimal> = ras.iter().map(|g| g.height).collect();

    let mut unallocatable = Vec::new();
    for b in sorted {
        let k = b.len();
        let mut best: Option<(Decimal, usize)> = None;
        if k > 0 && k <= ras.len() {
            for i in 0..=(ras.len() - k) {
                let assignable = ras[i..i + k]
                    .iter()
                    .zip(b.components())
                    .all(|(g, elm)| g.allocatable(elm, None));
                if !assignable {
                    continue;
                }
                let vwl = b.vertical_wirelength_with_multi_y(&gap_heights[i..i + k]);
                if best.is_none_or(|(best_vwl, _)| best_vwl > vwl) {
                    best = Some((vwl, i));
                }
            }
        }

        match best {
            None => {
                println!("Cannot assign: {}", b.name());
                unallocatable.push(b.name().to_string());
            }
            Some((_, start)) => {
                for (g, elm) in ras[start..start + k].iter_mut().zip(b.components()) {
                    let offset = g.get_offset(elm, None);
                    let y_max_with_space = g.place_oid(elm, None)?;
                    if let Some(o) = offset {
                        g.init_ceilings.push(o);
                    }
                    g.init_ceilings.push(y_max_with_space);
                }
            }
        }
    }
    Ok(unallocatable)
}

/// Indices of areas whose vertical midpoint lies within the OID's median
/// pin band.
fn optimal_area_indices(oid: &OverlappedIntervalDict, ras: &[RoutingArea]) -> Vec<usize> {
    let lo = oid.y_mid_lower();
    let hi = oid.y_mid_upper();
    ras.iter()
        .enumerate()
        .filter(|(_, ra)| lo <= ra.y_mid() && ra.y_mid() <= hi)
        .map(|(i, _)| i)
        .collect()
}

/// The wirelength-better of the two areas closest to the OID's midpoint;
/// ties between their wirelengths go to the second-closest.
fn best_area_index(oid: &OverlappedIntervalDict, ras: &[RoutingArea]) -> usize {
    debug_assert!(!ras.is_empty());
    let y = oid.y_mid();
    let mut order: Vec<usize> = (0..ras.len()).collect();
    order.sort_by(|a, b| (ras[*a].y_mid() - y).abs().cmp(&(ras[*b].y_mid() - y).abs()));
    let first = order[0];
    let second = if order.len() == 1 { first } else { order[1] };
    let first_wl = oid.vertical_wirelength(ras[first].y_mid());
    let second_wl = oid.vertical_wirelength(ras[second].y_mid());
    if first_wl < second_wl { first } else { second }
}

/// Gap-choice ordering: every OID spreads one unit of congestion across
/// its optimal areas (or its single best area when none qualify); areas
/// are served most-congested first.
pub fn prioritize_routing_areas(
    ras: Vec<RoutingArea>,
    oids: &[OverlappedIntervalDict],
) -> Vec<RoutingArea> {
    let mut congestion = vec![Decimal::ZERO; ras.len()];
    for oid in oids {
        let mut opts = optimal_area_indices(oid, &ras);
        if opts.is_empty() {
            opts = vec![best_area_index(oid, &ras)];
        }
        let share = Decimal::ONE / Decimal::from(opts.len() as u64);
        for i in opts {
            congestion[i] += share;
        }
    }
    let mut scored: Vec<(Decimal, RoutingArea)> = congestion.into_iter().zip(ras).collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, ra)| ra).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Add,
    Remove,
}

/// Sweep the OID endpoints left to right tracking the total active width.
/// Returns the maximum density and the half-open x-ranges achieving it.
pub fn max_density_zones(oids: &[OverlappedIntervalDict]) -> (Decimal, Vec<Interval>) {
    let mut events: BTreeMap<Decimal, Vec<(usize, Edge)>> = BTreeMap::new();
    for (i, oid) in oids.iter().enumerate() {
        let iv = oid.x_interval();
        events.entry(iv.begin).or_default().push((i, Edge::Add));
        events.entry(iv.end).or_default().push((i, Edge::Remove));
    }

    let mut max_density = Decimal::ZERO;
    let mut start_x: Option<Decimal> = None;
    let mut zones: Vec<Interval> = Vec::new();
    let mut active: Vec<usize> = Vec::new();

    for (&x, evs) in &events {
        let mut last = Edge::Add;
        for &(i, e) in evs {
            match e {
                Edge::Add => active.push(i),
                Edge::Remove => {
                    if let Some(p) = active.iter().position(|&j| j == i) {
                        active.remove(p);
                    }
                }
            }
            last = e;
        }

        let density: Decimal = active.iter().map(|&i| oids[i].width()).sum();
        match last {
            Edge::Add => {
                if max_density < density {
                    max_density = density;
                    zones.clear();
                    start_x = Some(x);
                } else if max_density == density {
                    start_x = Some(x);
                }
            }
            Edge::Remove => {
                if let Some(s) = start_x.take() {
                    zones.push(Interval::new(s, x));
                }
            }
        }
    }
    (max_density, zones)
}

/// A net is desired unless placing it would jump past a max-density zone
/// that still starts between the sweep cursor and the net.
pub fn is_desired_net(
    cursor: Option<Decimal>,
    zones: &[Interval],
    oid: &OverlappedIntervalDict,
) -> bool {
    let begin = oid.x_interval().begin;
    !zones
        .iter()
        .any(|z| cursor.is_none_or(|x| x < z.begin) && z.begin < begin)
}

fn cursor_allows(cursor: Option<Decimal>, begin: Decimal) -> bool {
    cursor.is_none_or(|x| x < begin)
}

/// CAP net order: widest first, ties left first, then by name for a total
/// order.
pub fn cap_sort(oids: &mut [OverlappedIntervalDict]) {
    oids.sort_by(|a, b| {
        b.width()
            .cmp(&a.width())
            .then_with(|| a.x_interval().begin.cmp(&b.x_interval().begin))
            .then_with(|| a.name().cmp(b.name()))
    });
}

/// CCAP net order for one target area: widest first, then the nets this
/// area serves distinctly better than their runner-up areas, then left
/// first.
fn criticality_sort(
    oids: Vec<OverlappedIntervalDict>,
    remaining: &[RoutingArea],
    target: &RoutingArea,
) -> Vec<OverlappedIntervalDict> {
    let gap_heights: Vec<Decimal> = remaining.iter().map(|g| g.y_mid()).collect();
    let target_y = target.y_mid();

    let mut scored: Vec<(Decimal, OverlappedIntervalDict)> = oids
        .into_iter()
        .map(|oid| {
            let priority = if gap_heights.is_empty() {
                Decimal::ZERO
            } else {
                let y = oid.y_mid();
                let mut order: Vec<usize> = (0..gap_heights.len()).collect();
                order.sort_by(|a, b| {
                    (gap_heights[*a] - y).abs().cmp(&(gap_heights[*b] - y).abs())
                });
                let g1 = gap_heights[order[0]];
                let g2 = if order.len() == 1 { g1 } else { gap_heights[order[1]] };
                let closest_wl = oid.vertical_wirelength(g1).min(oid.vertical_wirelength(g2));
                closest_wl - oid.vertical_wirelength(target_y)
            };
            (priority, oid)
        })
        .collect();

    scored.sort_by(|(pa, a), (pb, b)| {
        b.width()
            .cmp(&a.width())
            .then_with(|| pb.cmp(pa))
            .then_with(|| a.x_interval().begin.cmp(&b.x_interval().begin))
            .then_with(|| a.name().cmp(b.name()))
    });
    scored.into_iter().map(|(_, oid)| oid).collect()
}

fn seed_heap(target: &RoutingArea) -> BinaryHeap<Reverse<Decimal>> {
    target.init_ceilings.iter().copied().map(Reverse).collect()
}

/// Left-Edge: walk nets in x order under each ceiling, placing every net
/// whose trunk starts right of the previous placement.
pub fn left_edge(
    mut oids: Vec<OverlappedIntervalDict>,
    mut remaining_ras: Vec<RoutingArea>,
    use_gco: bool,
) -> Result<(Vec<RoutingArea>, Vec<RoutingArea>, Vec<OverlappedIntervalDict>)> {
    oids.sort_by_key(|o| o.x_interval().begin);
    let mut routed_ras = Vec::new();

    while !oids.is_empty() {
        if remaining_ras.is_empty() {
            break;
        }
        if use_gco {
            remaining_ras = prioritize_routing_areas(remaining_ras, &oids);
        }
        let mut target = remaining_ras.remove(0);
        let mut heap = seed_heap(&target);

        loop {
            let ceiling = heap.peek().map(|Reverse(c)| *c);
            let mut cursor: Option<Decimal> = None;
            let mut placed_any = false;

            let mut i = 0;
            while i < oids.len() {
                let begin = oids[i].x_interval().begin;
                if cursor_allows(cursor, begin) && target.allocatable(&oids[i], ceiling) {
                    target.place_oid(&oids[i], ceiling)?;
                    cursor = Some(oids[i].x_interval().end);
                    oids.remove(i);
                    placed_any = true;
                } else {
                    i += 1;
                }
            }

            if !placed_any {
                if ceiling.is_none() {
                    // nothing fits even at the area top: next area
                    break;
                }
                // drop the tightest ceiling and retry with the next one
                heap.pop();
            }
        }
        routed_ras.push(target);
    }
    Ok((routed_ras, remaining_ras, oids))
}

/// Shared CAP/CCAP sweep over one target area. Placements register their
/// stack tops as new ceiling candidates.
fn sweep_area(
    target: &mut RoutingArea,
    oids: &mut Vec<OverlappedIntervalDict>,
) -> Result<()> {
    let mut heap = seed_heap(target);
    loop {
        let ceiling = heap.peek().map(|Reverse(c)| *c);
        let mut cursor: Option<Decimal> = None;
        let mut routed_any = false;
        let (_, zones) = max_density_zones(oids);
        let mut new_ceilings = Vec::new();

        loop {
            let mut updated = false;
            for i in 0..oids.len() {
                let begin = oids[i].x_interval().begin;
                if cursor_allows(cursor, begin)
                    && is_desired_net(cursor, &zones, &oids[i])
                    && target.allocatable(&oids[i], ceiling)
                {
                    let top = target.place_oid(&oids[i], ceiling)?;
                    new_ceilings.push(top);
                    cursor = Some(oids[i].x_interval().end);
                    oids.remove(i);
                    updated = true;
                    routed_any = true;
                    break;
                }
            }
            if !updated {
                break;
            }
        }

        if !routed_any {
            if ceiling.is_none() {
                return Ok(());
            }
            heap.pop();
            continue;
        }
        for h in new_ceilings {
            heap.push(Reverse(h));
        }
    }
}

/// Constraint-aware placement: widest nets first, held back from jumping
/// over max-density zones.
pub fn cap(
    mut oids: Vec<OverlappedIntervalDict>,
    mut remaining_ras: Vec<RoutingArea>,
    use_gco: bool,
) -> Result<(Vec<RoutingArea>, Vec<RoutingArea>, Vec<OverlappedIntervalDict>)> {
    cap_sort(&mut oids);
    let mut routed_ras = Vec::new();

    while !oids.is_empty() {
        if remaining_ras.is_empty() {
            break;
        }
        if use_gco {
            remaining_ras = prioritize_routing_areas(remaining_ras, &oids);
        }
        let mut target = remaining_ras.remove(0);
        sweep_area(&mut target, &mut oids)?;
        routed_ras.push(target);
    }
    Ok((routed_ras, remaining_ras, oids))
}

/// Criticality-aware CAP: areas served most-congested first, nets
/// re-prioritized per area by how much this area beats the alternatives.
pub fn ccap(
    mut oids: Vec<OverlappedIntervalDict>,
    mut remaining_ras: Vec<RoutingArea>,
) -> Result<(Vec<RoutingArea>, Vec<RoutingArea>, Vec<OverlappedIntervalDict>)> {
    let mut routed_ras = Vec::new();

    while !oids.is_empty() {
        if remaining_ras.is_empty() {
            break;
        }
        remaining_ras = prioritize_routing_areas(remaining_ras, &oids);
        let mut target = remaining_ras.remove(0);
        oids = criticality_sort(oids, &remaining_ras, &target);
        sweep_area(&mut target, &mut oids)?;
        routed_ras.push(target);
    }
    Ok((routed_ras, remaining_ras, oids))
}

/// Run the selected channel algorithm over the remaining OIDs and areas.
pub fn route_oids(
    oids: Vec<OverlappedIntervalDict>,
    ras: Vec<RoutingArea>,
    algorithm: Algorithm,
    use_gco: bool,
) -> Result<(Vec<RoutingArea>, Vec<RoutingArea>, Vec<OverlappedIntervalDict>)> {
    match algorithm {
        Algorithm::Le => left_edge(oids, ras, use_gco),
        Algorithm::Cap => cap(oids, ras, use_gco),
        Algorithm::Ccap => ccap(oids, ras),
    }
}
