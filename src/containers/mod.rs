use indexmap::IndexMap;
use rust_decimal::Decimal;

use crate::Interval;
use crate::entities::{Allocatable, Net, Pin, Shield, ShieldType, WireGeometry};

/// Total y-extent of an ordered stack: the widths plus, between every
/// adjacent pair, the larger of the lower item's upper clearance and the
/// upper item's lower clearance.
pub fn stack_extent<T: Allocatable>(items: &[T]) -> Decimal {
    let mut total: Decimal = items.iter().map(|n| n.width()).sum();
    for w in items.windows(2) {
        total += w[0].upper_space().max(w[1].lower_space());
    }
    total
}

/// One element of a shielded stack.
#[derive(Debug, Clone)]
pub enum StackElem {
    Net(Net),
    Shield(Shield),
}

impl StackElem {
    pub fn name(&self) -> &str {
        match self {
            StackElem::Net(n) => &n.name,
            StackElem::Shield(s) => &s.name,
        }
    }

    pub fn as_net(&self) -> Option<&Net> {
        match self {
            StackElem::Net(n) => Some(n),
            StackElem::Shield(_) => None,
        }
    }
}

impl Allocatable for StackElem {
    fn x_interval(&self) -> Interval {
        match self {
            StackElem::Net(n) => n.x_interval(),
            StackElem::Shield(s) => s.x_interval(),
        }
    }

    fn width(&self) -> Decimal {
        match self {
            StackElem::Net(n) => n.width(),
            StackElem::Shield(s) => s.width(),
        }
    }

    fn upper_space(&self) -> Decimal {
        match self {
            StackElem::Net(n) => n.upper_space(),
            StackElem::Shield(s) => s.upper_space(),
        }
    }

    fn lower_space(&self) -> Decimal {
        match self {
            StackElem::Net(n) => n.lower_space(),
            StackElem::Shield(s) => s.lower_space(),
        }
    }
}

/// An ordered stack built from one net group sharing a single shield type
/// and layer, with shields inserted according to that type.
///
/// Per-net shielding interleaves a shield between every adjacent pair plus
/// one below the first net and one above the last; group shielding wraps
/// the untouched net list in a single bottom/top shield pair spanning the
/// enclosing x-interval.
#[derive(Debug, Clone, Default)]
pub struct ShieldedNetList {
    elements: Vec<StackElem>,
    x_interval: Interval,
    group_name: String,
    shield_type: ShieldType,
    is_group_net: bool,
}

impl ShieldedNetList {
    pub fn new(netlist: Vec<Net>, x_interval: Interval, shield_width: Decimal) -> Self {
        let Some(first) = netlist.first() else {
            return Self::default();
        };
        debug_assert!(
            netlist.iter().all(|n| n.shield_type == first.shield_type),
            "mixed shield types in one stack"
        );

        let layer = first.layer.clone();
        let group_name = first.group_name().to_string();
        let shield_type = first.shield_type.clone();
        let is_group_net = shield_type.is_group_shield();
        let require_shield = first.require_shield();

        let elements = if !require_shield {
            netlist.into_iter().map(StackElem::Net).collect()
        } else if is_group_net {
            Self::build_with_group_shield(&netlist, x_interval, shield_width, &group_name, &shield_type, &layer)
        } else {
            Self::build_with_per_net_shield(&netlist, shield_width, &group_name, &shield_type, &layer)
        };

        Self {
            elements,
            x_interval,
            group_name,
            shield_type,
            is_group_net,
        }
    }

    fn shield(
        group_name: &str,
        shield_type: &ShieldType,
        layer: &str,
        x_min: Decimal,
        x_max: Decimal,
        width: Decimal,
        space: Decimal,
    ) -> StackElem {
        StackElem::Shield(Shield::new(
            &format!("{group_name}-shield"),
            shield_type.clone(),
            layer,
            x_min,
            x_max,
            width,
            space,
        ))
    }

    fn build_with_per_net_shield(
        netlist: &[Net],
        shield_width: Decimal,
        group_name: &str,
        shield_type: &ShieldType,
        layer: &str,
    ) -> Vec<StackElem> {
        let mut elements = Vec::with_capacity(netlist.len() * 2 + 1);
        for (i, n) in netlist.iter().enumerate() {
            // The shield below net i separates it from net i-1; below the
            // first net the stack edge itself sets the clearance, and the
            // neighbor index wraps so a single-net list shields against
            // its own extent.
            let prev = &netlist[if i == 0 { netlist.len() - 1 } else { i - 1 }];
            let space = if i == 0 {
                n.lower_space()
            } else {
                prev.upper_space().max(n.lower_space())
            };
            let x_min = prev.x_min.max(n.x_min);
            let x_max = prev.x_max.max(n.x_max);
            elements.push(Self::shield(group_name, shield_type, layer, x_min, x_max, shield_width, space));
            elements.push(StackElem::Net(n.clone()));
        }
        let last = &netlist[netlist.len() - 1];
        elements.push(Self::shield(
            group_name,
            shield_type,
            layer,
            last.x_min,
            last.x_max,
            shield_width,
            last.upper_space(),
        ));
        elements
    }

    fn build_with_group_shield(
        netlist: &[Net],
        x_interval: Interval,
        shield_width: Decimal,
        group_name: &str,
        shield_type: &ShieldType,
        layer: &str,
    ) -> Vec<StackElem> {
        let bottom = Self::shield(
            group_name,
            shield_type,
            layer,
            x_interval.begin,
            x_interval.end,
            shield_width,
            netlist[0].lower_space(),
        );
        let top = Self::shield(
            group_name,
            shield_type,
            layer,
            x_interval.begin,
            x_interval.end,
            shield_width,
            netlist[netlist.len() - 1].upper_space(),
        );
        let mut elements = vec![bottom];
        elements.extend(netlist.iter().cloned().map(StackElem::Net));
        elements.push(top);
        elements
    }

    pub fn elements(&self) -> &[StackElem] {
        &self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    pub fn shield_type(&self) -> &ShieldType {
        &self.shield_type
    }

    /// True when the stack carries a group shield and must be placed as a
    /// single unit.
    pub fn is_group_net(&self) -> bool {
        self.is_group_net
    }

    pub fn width_with_space(&self) -> Decimal {
        self.width() + self.upper_space() + self.lower_space()
    }
}

impl Allocatable for ShieldedNetList {
    fn x_interval(&self) -> Interval {
        self.x_interval
    }

    fn width(&self) -> Decimal {
        stack_extent(&self.elements)
    }

    fn upper_space(&self) -> Decimal {
        self.elements.last().map_or(Decimal::ZERO, |e| e.upper_space())
    }

    fn lower_space(&self) -> Decimal {
        self.elements.first().map_or(Decimal::ZERO, |e| e.lower_space())
    }
}

impl WireGeometry for ShieldedNetList {
    fn pins(&self) -> Vec<Pin> {
        self.elements
            .iter()
            .filter_map(|e| e.as_net())
            .flat_map(|n| n.pins.clone())
            .collect()
    }
}

/// Independent shielded stacks over one x-interval, keyed by shield type
/// in first-seen order.
#[derive(Debug, Clone)]
pub struct ShieldDict {
    stacks: IndexMap<ShieldType, ShieldedNetList>,
    x_interval: Interval,
}

impl ShieldDict {
    pub fn new(netlist: Vec<Net>, x_interval: Interval, shield_width: Decimal) -> Self {
        let mut by_type: IndexMap<ShieldType, Vec<Net>> = IndexMap::new();
        for n in netlist {
            by_type.entry(n.shield_type.clone()).or_default().push(n);
        }
        let stacks = by_type
            .into_iter()
            .map(|(ty, nl)| (ty, ShieldedNetList::new(nl, x_interval, shield_width)))
            .collect();
        Self { stacks, x_interval }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ShieldType, &ShieldedNetList)> {
        self.stacks.iter()
    }

    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    fn all_elements(&self) -> Vec<&StackElem> {
        self.stacks.values().flat_map(|snl| snl.elements()).collect()
    }

    pub fn width_with_space(&self) -> Decimal {
        self.width() + self.upper_space() + self.lower_space()
    }
}

impl Allocatable for ShieldDict {
    fn x_interval(&self) -> Interval {
        self.x_interval
    }

    fn width(&self) -> Decimal {
        stack_extent(&self.all_elements())
    }

    fn upper_space(&self) -> Decimal {
        self.all_elements().last().map_or(Decimal::ZERO, |e| e.upper_space())
    }

    fn lower_space(&self) -> Decimal {
        self.all_elements().first().map_or(Decimal::ZERO, |e| e.lower_space())
    }
}

impl WireGeometry for ShieldDict {
    fn pins(&self) -> Vec<Pin> {
        self.stacks.values().flat_map(|snl| snl.pins()).collect()
    }
}

/// Net group partitioned into maximal x-overlapping clusters: nets sharing
/// an exact x-interval group together, then overlapping intervals merge
/// greedily left to right. Each merged interval carries one ShieldDict and
/// all clusters must share a single routing-area row.
#[derive(Debug, Clone)]
pub struct OverlappedIntervalDict {
    name: String,
    entries: IndexMap<Interval, ShieldDict>,
}

impl OverlappedIntervalDict {
    pub fn new(name: &str, netlist: &[Net], shield_width: Decimal) -> Self {
        let mut by_interval: IndexMap<Interval, Vec<Net>> = IndexMap::new();
        for n in netlist {
            by_interval.entry(n.x_interval()).or_default().push(n.clone());
        }

        let mut distinct: Vec<Interval> = by_interval.keys().copied().collect();
        distinct.sort_by_key(|iv| iv.begin);
        let merged = Self::merge_intervals(&distinct);

        let mut collected: IndexMap<Interval, Vec<Net>> =
            merged.iter().map(|iv| (*iv, Vec::new())).collect();
        for (iv, nl) in by_interval {
            if let Some(m) = merged.iter().find(|m| m.overlaps(&iv))
                && let Some(bucket) = collected.get_mut(m)
            {
                bucket.extend(nl);
            }
        }

        let entries = collected
            .into_iter()
            .map(|(iv, nl)| (iv, ShieldDict::new(nl, iv, shield_width)))
            .collect();
        Self { name: name.to_string(), entries }
    }

    fn merge_intervals(sorted: &[Interval]) -> Vec<Interval> {
        let mut merged = Vec::new();
        let Some(&first) = sorted.first() else {
            return merged;
        };
        let mut current = first;
        for iv in &sorted[1..] {
            if current.overlaps(iv) {
                current = Interval::new(current.begin, current.end.max(iv.end));
            } else {
                merged.push(current);
                current = *iv;
            }
        }
        merged.push(current);
        merged
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Interval, &ShieldDict)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn width_with_space(&self) -> Decimal {
        self.entries
            .values()
            .map(|sd| sd.width_with_space())
            .max()
            .unwrap_or(Decimal::ZERO)
    }
}

impl Allocatable for OverlappedIntervalDict {
    fn x_interval(&self) -> Interval {
        let mut ivs = self
            .entries
            .values()
            .flat_map(|sd| sd.iter().flat_map(|(_, snl)| snl.elements()))
            .map(|e| e.x_interval());
        let Some(first) = ivs.next() else {
            return Interval::new(Decimal::ZERO, Decimal::ZERO);
        };
        ivs.fold(first, |acc, iv| acc.merge(&iv))
    }

    fn width(&self) -> Decimal {
        self.entries.values().map(|sd| sd.width()).max().unwrap_or(Decimal::ZERO)
    }

    fn upper_space(&self) -> Decimal {
        if self.entries.len() > 1 {
            (self.width_with_space() - self.width()) / Decimal::TWO
        } else {
            self.entries
                .values()
                .next()
                .map_or(Decimal::ZERO, |sd| sd.upper_space())
        }
    }

    fn lower_space(&self) -> Decimal {
        if self.entries.len() > 1 {
            (self.width_with_space() - self.width()) / Decimal::TWO
        } else {
            self.entries
                .values()
                .next()
                .map_or(Decimal::ZERO, |sd| sd.lower_space())
        }
    }
}

impl WireGeometry for OverlappedIntervalDict {
    fn pins(&self) -> Vec<Pin> {
        self.entries.values().flat_map(|sd| sd.pins()).collect()
    }
}

/// A net group too tall for one routing area, pre-split into OID
/// components that must land in consecutive areas.
#[derive(Debug, Clone)]
pub struct Bundle {
    name: String,
    components: Vec<OverlappedIntervalDict>,
}

impl Bundle {
    pub fn new(name: &str, components: Vec<OverlappedIntervalDict>) -> Self {
        Self { name: name.to_string(), components }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn components(&self) -> &[OverlappedIntervalDict] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Wirelength when component i's trunk sits at heights[i].
    pub fn vertical_wirelength_with_multi_y(&self, heights: &[Decimal]) -> Decimal {
        debug_assert_eq!(heights.len(), self.components.len());
        heights
            .iter()
            .zip(&self.components)
            .map(|(h, oid)| oid.vertical_wirelength(*h))
            .sum()
    }
}

impl WireGeometry for Bundle {
    fn pins(&self) -> Vec<Pin> {
        self.components.iter().flat_map(|oid| oid.pins()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn net(name: &str, x_min: Decimal, x_max: Decimal, width: Decimal, space: Decimal, shield: &str) -> Net {
        Net::with_extent(
            name,
            "D1",
            width,
            space,
            x_min,
            x_max,
            vec![Pin::new(x_min, dec!(0)), Pin::new(x_max, dec!(0))],
            ShieldType::new(shield),
            None,
        )
    }

    #[test]
    fn stack_extent_composes_pairwise_spacing() {
        let a = net("a", dec!(0), dec!(5), dec!(2), dec!(1), "");
        let b = net("b", dec!(2), dec!(6), dec!(3), dec!(1), "");
        assert_eq!(stack_extent(&[a, b]), dec!(6));
    }

    #[test]
    fn unshielded_list_is_the_input() {
        let nl = vec![
            net("g_1a", dec!(0), dec!(5), dec!(1), dec!(0.5), ""),
            net("g_1b", dec!(1), dec!(6), dec!(1), dec!(0.5), ""),
        ];
        let snl = ShieldedNetList::new(nl, Interval::new(dec!(0), dec!(6)), dec!(0.4));
        assert_eq!(snl.elements().len(), 2);
        assert!(snl.elements().iter().all(|e| e.as_net().is_some()));
    }

    #[test]
    fn per_net_shield_inserts_k_plus_one_shields() {
        let nl = vec![
            net("g_1a", dec!(0), dec!(5), dec!(1), dec!(0.5), "S"),
            net("g_1b", dec!(1), dec!(6), dec!(1), dec!(0.5), "S"),
        ];
        let snl = ShieldedNetList::new(nl, Interval::new(dec!(0), dec!(6)), dec!(0.4));
        let shields: Vec<_> = snl
            .elements()
            .iter()
            .filter(|e| matches!(e, StackElem::Shield(_)))
            .collect();
        assert_eq!(shields.len(), 3);
        assert_eq!(snl.elements().len(), 5);
        assert!(!snl.is_group_net());
        // every adjacent pair keeps the 0.5 clearance
        for w in snl.elements().windows(2) {
            assert_eq!(w[0].upper_space().max(w[1].lower_space()), dec!(0.5));
        }
        // total extent: 2 nets + 3 shields + 4 gaps
        assert_eq!(snl.width(), dec!(2) + dec!(1.2) + dec!(2));
    }

    #[test]
    fn single_net_per_shield_uses_own_extent() {
        let nl = vec![net("g_1a", dec!(0), dec!(5), dec!(1), dec!(0.5), "S")];
        let snl = ShieldedNetList::new(nl, Interval::new(dec!(0), dec!(5)), dec!(0.4));
        assert_eq!(snl.elements().len(), 3);
        for e in snl.elements() {
            assert_eq!(e.x_interval(), Interval::new(dec!(0), dec!(5)));
        }
    }

    #[test]
    fn group_shield_wraps_once() {
        let nl = vec![
            net("g_1a", dec!(0), dec!(5), dec!(1), dec!(0.5), "GS"),
            net("g_1b", dec!(1), dec!(6), dec!(1), dec!(0.5), "GS"),
        ];
        let enclosing = Interval::new(dec!(0), dec!(6));
        let snl = ShieldedNetList::new(nl, enclosing, dec!(0.4));
        assert!(snl.is_group_net());
        assert_eq!(snl.elements().len(), 4);
        let first = &snl.elements()[0];
        let last = &snl.elements()[3];
        assert!(matches!(first, StackElem::Shield(_)));
        assert!(matches!(last, StackElem::Shield(_)));
        assert_eq!(first.x_interval(), enclosing);
        assert_eq!(last.x_interval(), enclosing);
    }

    #[test]
    fn shield_dict_groups_by_type_in_first_seen_order() {
        let nl = vec![
            net("a_1", dec!(0), dec!(5), dec!(1), dec!(0.5), "S"),
            net("b_1", dec!(0), dec!(5), dec!(1), dec!(0.5), ""),
            net("c_1", dec!(1), dec!(5), dec!(1), dec!(0.5), "S"),
        ];
        let sd = ShieldDict::new(nl, Interval::new(dec!(0), dec!(5)), dec!(0.4));
        let types: Vec<&str> = sd.iter().map(|(ty, _)| ty.tag()).collect();
        assert_eq!(types, vec!["S", ""]);
        let (_, shielded) = sd.iter().next().unwrap();
        assert_eq!(shielded.elements().len(), 5);
    }

    #[test]
    fn oid_merges_overlapping_intervals() {
        let nl = vec![
            net("n_1a", dec!(0), dec!(3), dec!(1), dec!(0.5), ""),
            net("n_1b", dec!(2), dec!(5), dec!(1), dec!(0.5), ""),
            net("n_1c", dec!(8), dec!(9), dec!(1), dec!(0.5), ""),
            net("n_1d", dec!(0), dec!(3), dec!(1), dec!(0.5), ""),
        ];
        let oid = OverlappedIntervalDict::new("n_1", &nl, dec!(0.4));
        let keys: Vec<Interval> = oid.iter().map(|(iv, _)| *iv).collect();
        assert_eq!(keys, vec![
            Interval::new(dec!(0), dec!(5)),
            Interval::new(dec!(8), dec!(9)),
        ]);
        // the merged [0,5) entry holds three nets stacked: 3 widths + 2 gaps
        assert_eq!(oid.width(), dec!(4));
        assert_eq!(oid.x_interval(), Interval::new(dec!(0), dec!(9)));
    }

    #[test]
    fn oid_aggregate_space_with_multiple_entries() {
        let nl = vec![
            net("n_1a", dec!(0), dec!(3), dec!(2), dec!(1), ""),
            net("n_1b", dec!(8), dec!(9), dec!(1), dec!(0.5), ""),
        ];
        let oid = OverlappedIntervalDict::new("n_1", &nl, dec!(0.4));
        assert_eq!(oid.len(), 2);
        // widest entry: width 2, with-space 4; aggregate margin (4-2)/2
        assert_eq!(oid.width(), dec!(2));
        assert_eq!(oid.upper_space(), dec!(1));
        assert_eq!(oid.lower_space(), dec!(1));
    }

    #[test]
    fn bundle_wirelength_sums_per_component() {
        let a = OverlappedIntervalDict::new(
            "n_1",
            &[net("n_1a", dec!(0), dec!(3), dec!(1), dec!(0.5), "")],
            dec!(0.4),
        );
        let b = OverlappedIntervalDict::new(
            "n_1",
            &[net("n_1b", dec!(0), dec!(3), dec!(1), dec!(0.5), "")],
            dec!(0.4),
        );
        let bundle = Bundle::new("n_1", vec![a, b]);
        let wl = bundle.vertical_wirelength_with_multi_y(&[dec!(1), dec!(2)]);
        // each component has pins at y=0,0: |0-1|*2 + |0-2|*2
        assert_eq!(wl, dec!(6));
    }
}
