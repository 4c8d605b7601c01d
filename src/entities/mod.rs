use rust_decimal::Decimal;

use crate::Interval;
use crate::containers::ShieldedNetList;

/// Anything that occupies an x-interval and a y-extent inside a routing
/// area: a width plus the clearance it demands above and below itself.
pub trait Allocatable {
    fn x_interval(&self) -> Interval;
    fn width(&self) -> Decimal;
    fn upper_space(&self) -> Decimal;
    fn lower_space(&self) -> Decimal;
}

impl<T: Allocatable + ?Sized> Allocatable for &T {
    fn x_interval(&self) -> Interval {
        (**self).x_interval()
    }

    fn width(&self) -> Decimal {
        (**self).width()
    }

    fn upper_space(&self) -> Decimal {
        (**self).upper_space()
    }

    fn lower_space(&self) -> Decimal {
        (**self).lower_space()
    }
}

/// Pin-bearing geometry: the vertical cost model shared by nets and the
/// container types that aggregate them.
pub trait WireGeometry {
    fn pins(&self) -> Vec<Pin>;

    /// y of the upper one of the two middle pins (the median pin when the
    /// count is odd).
    fn y_mid_upper(&self) -> Decimal {
        let mut ps = self.pins();
        if ps.is_empty() {
            return Decimal::ZERO;
        }
        ps.sort_by_key(|p| p.y);
        ps[ps.len() / 2].y
    }

    /// y of the lower one of the two middle pins.
    fn y_mid_lower(&self) -> Decimal {
        let mut ps = self.pins();
        if ps.is_empty() {
            return Decimal::ZERO;
        }
        ps.sort_by_key(|p| p.y);
        let n = ps.len();
        if n % 2 == 1 { ps[n / 2].y } else { ps[n / 2 - 1].y }
    }

    fn y_mid(&self) -> Decimal {
        (self.y_mid_lower() + self.y_mid_upper()) / Decimal::TWO
    }

    /// Sum of vertical spur lengths when the trunk sits at `y`.
    fn vertical_wirelength(&self, y: Decimal) -> Decimal {
        self.pins().iter().map(|p| (p.y - y).abs()).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pin {
    pub x: Decimal,
    pub y: Decimal,
}

impl Pin {
    pub fn new(x: Decimal, y: Decimal) -> Self {
        Self { x, y }
    }
}

/// Shield classification tag. An empty tag means "no shield"; a tag
/// containing `G` requests one shield pair enclosing the whole group
/// instead of a shield between every pair of nets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ShieldType {
    tag: String,
}

impl ShieldType {
    pub fn new(tag: &str) -> Self {
        Self { tag: tag.to_string() }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn is_none(&self) -> bool {
        self.tag.is_empty()
    }

    pub fn is_group_shield(&self) -> bool {
        self.tag.contains('G')
    }
}

/// Kind of clearance margin recorded beside an allocation in y-queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceKind {
    Above,
    Below,
}

#[derive(Debug, Clone)]
pub struct Net {
    pub name: String,
    pub layer: String,
    pub width: Decimal,
    pub space: Decimal,
    pub x_min: Decimal,
    pub x_max: Decimal,
    pub pins: Vec<Pin>,
    pub shield_type: ShieldType,
    pub group_no: Option<String>,
}

impl Net {
    /// Trunk extent derived from the pin span. A zero-length trunk is
    /// widened by 1e-7 so its x-interval stays non-degenerate.
    pub fn from_pins(
        name: &str,
        layer: &str,
        width: Decimal,
        space: Decimal,
        pins: Vec<Pin>,
        shield_type: ShieldType,
        group_no: Option<String>,
    ) -> Self {
        let x_min = pins.iter().map(|p| p.x).min().unwrap_or(Decimal::ZERO);
        let mut x_max = pins.iter().map(|p| p.x).max().unwrap_or(Decimal::ZERO);
        if x_min == x_max {
            x_max += Decimal::new(1, 7);
        }
        Self {
            name: name.to_string(),
            layer: layer.to_string(),
            width,
            space,
            x_min,
            x_max,
            pins,
            shield_type,
            group_no,
        }
    }

    pub fn with_extent(
        name: &str,
        layer: &str,
        width: Decimal,
        space: Decimal,
        x_min: Decimal,
        x_max: Decimal,
        pins: Vec<Pin>,
        shield_type: ShieldType,
        group_no: Option<String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            layer: layer.to_string(),
            width,
            space,
            x_min,
            x_max,
            pins,
            shield_type,
            group_no,
        }
    }

    /// Group key derived from the net name: the prefix up to one character
    /// after the first `_` if present, else the prefix before `<`, else the
    /// whole name. Names like `A_12` deliberately truncate to `A_1`.
    pub fn group_name(&self) -> &str {
        if let Some(i) = self.name.find('_') {
            match self.name[i + 1..].chars().next() {
                Some(c) => &self.name[..i + 1 + c.len_utf8()],
                None => &self.name,
            }
        } else if let Some(i) = self.name.find('<') {
            &self.name[..i]
        } else {
            &self.name
        }
    }

    pub fn require_shield(&self) -> bool {
        !self.shield_type.is_none()
    }
}

impl Allocatable for Net {
    fn x_interval(&self) -> Interval {
        Interval::new(self.x_min, self.x_max)
    }

    fn width(&self) -> Decimal {
        self.width
    }

    fn upper_space(&self) -> Decimal {
        self.space
    }

    fn lower_space(&self) -> Decimal {
        self.space
    }
}

impl WireGeometry for Net {
    fn pins(&self) -> Vec<Pin> {
        self.pins.clone()
    }
}

#[derive(Debug, Clone)]
pub struct Shield {
    pub name: String,
    pub kind: ShieldType,
    pub layer: String,
    pub x_min: Decimal,
    pub x_max: Decimal,
    pub width: Decimal,
    pub space: Decimal,
}

impl Shield {
    pub fn new(
        name: &str,
        kind: ShieldType,
        layer: &str,
        x_min: Decimal,
        x_max: Decimal,
        width: Decimal,
        space: Decimal,
    ) -> Self {
        Self {
            name: name.to_string(),
            kind,
            layer: layer.to_string(),
            x_min,
            x_max,
            width,
            space,
        }
    }
}

impl Allocatable for Shield {
    fn x_interval(&self) -> Interval {
        Interval::new(self.x_min, self.x_max)
    }

    fn width(&self) -> Decimal {
        self.width
    }

    fn upper_space(&self) -> Decimal {
        self.space
    }

    fn lower_space(&self) -> Decimal {
        self.space
    }
}

/// Reserved rectangle pinned at absolute coordinates; demands no clearance
/// of its own.
#[derive(Debug, Clone)]
pub struct Blockage {
    pub x_min: Decimal,
    pub x_max: Decimal,
    pub y_min: Decimal,
    pub y_max: Decimal,
}

impl Blockage {
    pub fn new(x_min: Decimal, x_max: Decimal, y_min: Decimal, y_max: Decimal) -> Self {
        Self { x_min, x_max, y_min, y_max }
    }

    pub fn y_interval(&self) -> Interval {
        Interval::new(self.y_min, self.y_max)
    }
}

impl Allocatable for Blockage {
    fn x_interval(&self) -> Interval {
        Interval::new(self.x_min, self.x_max)
    }

    fn width(&self) -> Decimal {
        self.y_max - self.y_min
    }

    fn upper_space(&self) -> Decimal {
        Decimal::ZERO
    }

    fn lower_space(&self) -> Decimal {
        Decimal::ZERO
    }
}

/// What a routing area actually stores per placement. A group-shielded
/// stack is placed as one `Stack` unit and expanded back into per-element
/// allocations when enumerated.
#[derive(Debug, Clone)]
pub enum AllocData {
    Net(Net),
    Shield(Shield),
    Blockage(Blockage),
    Stack(ShieldedNetList),
}

impl AllocData {
    pub fn name(&self) -> &str {
        match self {
            AllocData::Net(n) => &n.name,
            AllocData::Shield(s) => &s.name,
            AllocData::Blockage(_) => "Blockage",
            AllocData::Stack(snl) => snl.group_name(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AllocData::Net(_) => "Net",
            AllocData::Shield(_) => "Shield",
            AllocData::Blockage(_) => "Blockage",
            AllocData::Stack(_) => "ShieldedNetList",
        }
    }
}

impl Allocatable for AllocData {
    fn x_interval(&self) -> Interval {
        match self {
            AllocData::Net(n) => n.x_interval(),
            AllocData::Shield(s) => s.x_interval(),
            AllocData::Blockage(b) => b.x_interval(),
            AllocData::Stack(snl) => snl.x_interval(),
        }
    }

    fn width(&self) -> Decimal {
        match self {
            AllocData::Net(n) => n.width(),
            AllocData::Shield(s) => s.width(),
            AllocData::Blockage(b) => b.width(),
            AllocData::Stack(snl) => snl.width(),
        }
    }

    fn upper_space(&self) -> Decimal {
        match self {
            AllocData::Net(n) => n.upper_space(),
            AllocData::Shield(s) => s.upper_space(),
            AllocData::Blockage(b) => b.upper_space(),
            AllocData::Stack(snl) => snl.upper_space(),
        }
    }

    fn lower_space(&self) -> Decimal {
        match self {
            AllocData::Net(n) => n.lower_space(),
            AllocData::Shield(s) => s.lower_space(),
            AllocData::Blockage(b) => b.lower_space(),
            AllocData::Stack(snl) => snl.lower_space(),
        }
    }
}

/// A placed allocatable: the data plus its vertical offset inside the area.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub data: AllocData,
    pub offset: Decimal,
}

impl Allocation {
    pub fn new(data: AllocData, offset: Decimal) -> Self {
        Self { data, offset }
    }

    pub fn name(&self) -> &str {
        self.data.name()
    }

    pub fn kind(&self) -> &'static str {
        self.data.kind()
    }

    pub fn x_min(&self) -> Decimal {
        self.data.x_interval().begin
    }

    pub fn x_max(&self) -> Decimal {
        self.data.x_interval().end
    }

    pub fn y_min(&self) -> Decimal {
        self.offset
    }

    pub fn y_max(&self) -> Decimal {
        self.offset + self.data.width()
    }

    pub fn y_max_with_space(&self) -> Decimal {
        self.y_max() + self.data.upper_space()
    }

    pub fn y_interval(&self) -> Interval {
        Interval::new(self.y_min(), self.y_max())
    }

    pub fn is_blockage(&self) -> bool {
        matches!(self.data, AllocData::Blockage(_))
    }
}

impl Allocatable for Allocation {
    fn x_interval(&self) -> Interval {
        self.data.x_interval()
    }

    fn width(&self) -> Decimal {
        self.data.width()
    }

    fn upper_space(&self) -> Decimal {
        self.data.upper_space()
    }

    fn lower_space(&self) -> Decimal {
        self.data.lower_space()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pin(x: Decimal, y: Decimal) -> Pin {
        Pin::new(x, y)
    }

    fn plain_net(name: &str, pins: Vec<Pin>) -> Net {
        Net::from_pins(name, "D1", dec!(2), dec!(1), pins, ShieldType::none(), None)
    }

    #[test]
    fn trunk_extent_spans_pins() {
        let n = plain_net("a", vec![pin(dec!(3), dec!(0)), pin(dec!(-1), dec!(5))]);
        assert_eq!(n.x_min, dec!(-1));
        assert_eq!(n.x_max, dec!(3));
    }

    #[test]
    fn zero_length_trunk_is_widened() {
        let n = plain_net("a", vec![pin(dec!(2), dec!(0)), pin(dec!(2), dec!(9))]);
        assert_eq!(n.x_min, dec!(2));
        assert_eq!(n.x_max, dec!(2.0000001));
        assert!(n.x_interval().length() > Decimal::ZERO);
    }

    #[test]
    fn group_name_keeps_one_digit_after_underscore() {
        let mk = |name: &str| plain_net(name, vec![pin(dec!(0), dec!(0)), pin(dec!(1), dec!(0))]);
        assert_eq!(mk("VDD_3").group_name(), "VDD_3");
        assert_eq!(mk("A_12").group_name(), "A_1");
        assert_eq!(mk("CLK<0>").group_name(), "CLK");
        assert_eq!(mk("PLAIN").group_name(), "PLAIN");
        assert_eq!(mk("TAIL_").group_name(), "TAIL_");
    }

    #[test]
    fn shield_type_queries() {
        assert!(ShieldType::new("").is_none());
        assert!(!ShieldType::new("S").is_none());
        assert!(ShieldType::new("GS").is_group_shield());
        assert!(!ShieldType::new("S").is_group_shield());
    }

    #[test]
    fn y_mid_uses_median_pin_pair() {
        let n = plain_net(
            "a",
            vec![pin(dec!(0), dec!(10)), pin(dec!(1), dec!(2)), pin(dec!(2), dec!(6))],
        );
        // odd count: both mids collapse onto the median
        assert_eq!(n.y_mid_lower(), dec!(6));
        assert_eq!(n.y_mid_upper(), dec!(6));
        assert_eq!(n.y_mid(), dec!(6));

        let n = plain_net(
            "b",
            vec![
                pin(dec!(0), dec!(10)),
                pin(dec!(1), dec!(2)),
                pin(dec!(2), dec!(6)),
                pin(dec!(3), dec!(4)),
            ],
        );
        assert_eq!(n.y_mid_lower(), dec!(4));
        assert_eq!(n.y_mid_upper(), dec!(6));
        assert_eq!(n.y_mid(), dec!(5));
    }

    #[test]
    fn vertical_wirelength_is_sum_of_spurs() {
        let n = plain_net("a", vec![pin(dec!(0), dec!(3)), pin(dec!(5), dec!(3))]);
        assert_eq!(n.vertical_wirelength(dec!(1)), dec!(4));
        assert_eq!(n.vertical_wirelength(dec!(3)), dec!(0));
    }

    #[test]
    fn allocation_vertical_bounds() {
        let n = plain_net("a", vec![pin(dec!(0), dec!(0)), pin(dec!(4), dec!(0))]);
        let a = Allocation::new(AllocData::Net(n), dec!(1.5));
        assert_eq!(a.y_min(), dec!(1.5));
        assert_eq!(a.y_max(), dec!(3.5));
        assert_eq!(a.y_max_with_space(), dec!(4.5));
        assert_eq!(a.kind(), "Net");
    }
}
