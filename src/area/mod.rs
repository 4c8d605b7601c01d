use anyhow::{Result, bail};
use rust_decimal::Decimal;

use crate::containers::{OverlappedIntervalDict, ShieldDict, ShieldedNetList, StackElem};
use crate::entities::{AllocData, Allocatable, Allocation, Blockage, Net, Shield, SpaceKind};
use crate::{Interval, IntervalTree};

/// Entry of an ephemeral y-axis query tree: a placed item's y-interval, or
/// one of its clearance margins when margins are requested.
#[derive(Debug, Clone)]
struct YSeg {
    iv: Interval,
    kind: YKind,
    y_max_with_space: Decimal,
    upper_space: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum YKind {
    Alloc,
    Space(SpaceKind),
}

/// A horizontal routing area: a strip of vertical extent `[0, width)`
/// sitting at `height` in the global stack, holding placed allocations in
/// an x-interval tree. All placement queries restrict attention to items
/// whose x-interval overlaps the candidate's.
#[derive(Debug)]
pub struct RoutingArea {
    pub id: usize,
    pub width: Decimal,
    pub height: Decimal,
    tree: IntervalTree<Allocation>,
    /// Ceiling candidates seeded by blockages and pre-routed bundles.
    pub init_ceilings: Vec<Decimal>,
}

impl RoutingArea {
    pub fn new(id: usize, width: Decimal, height: Decimal) -> Self {
        Self {
            id,
            width,
            height,
            tree: IntervalTree::new(),
            init_ceilings: Vec::new(),
        }
    }

    pub fn y_mid(&self) -> Decimal {
        self.height + self.width / Decimal::TWO
    }

    /// Every placed allocation, with group-shield stacks expanded back
    /// into per-element allocations via spacing composition.
    pub fn allocations(&self) -> Vec<Allocation> {
        let mut alcs = Vec::new();
        for a in self.tree.values() {
            match &a.data {
                AllocData::Stack(snl) => {
                    let elems = snl.elements();
                    let Some(first) = elems.first() else {
                        continue;
                    };
                    let mut offset = a.offset;
                    alcs.push(Allocation::new(Self::elem_data(first), offset));
                    let mut prev = first;
                    for o in &elems[1..] {
                        offset += prev.width() + prev.upper_space().max(o.lower_space());
                        alcs.push(Allocation::new(Self::elem_data(o), offset));
                        prev = o;
                    }
                }
                _ => alcs.push(a.clone()),
            }
        }
        alcs
    }

    pub fn allocations_without_blockage(&self) -> Vec<Allocation> {
        self.allocations().into_iter().filter(|a| !a.is_blockage()).collect()
    }

    fn elem_data(e: &StackElem) -> AllocData {
        match e {
            StackElem::Net(n) => AllocData::Net(n.clone()),
            StackElem::Shield(s) => AllocData::Shield(s.clone()),
        }
    }

    fn x_overlapped(&self, x_iv: &Interval) -> Vec<&Allocation> {
        self.tree.overlapping(x_iv)
    }

    fn build_y_tree(allocs: &[&Allocation], include_space: bool) -> IntervalTree<YSeg> {
        let mut y_tree = IntervalTree::new();
        for a in allocs {
            y_tree.insert(
                a.y_interval(),
                YSeg {
                    iv: a.y_interval(),
                    kind: YKind::Alloc,
                    y_max_with_space: a.y_max_with_space(),
                    upper_space: a.data.upper_space(),
                },
            );
            if include_space {
                if a.data.lower_space() > Decimal::ZERO {
                    let iv = Interval::new(a.offset - a.data.lower_space(), a.offset);
                    y_tree.insert(
                        iv,
                        YSeg {
                            iv,
                            kind: YKind::Space(SpaceKind::Below),
                            y_max_with_space: a.y_max_with_space(),
                            upper_space: a.data.upper_space(),
                        },
                    );
                }
                if a.data.upper_space() > Decimal::ZERO {
                    let iv = Interval::new(a.y_max(), a.y_max_with_space());
                    y_tree.insert(
                        iv,
                        YSeg {
                            iv,
                            kind: YKind::Space(SpaceKind::Above),
                            y_max_with_space: a.y_max_with_space(),
                            upper_space: a.data.upper_space(),
                        },
                    );
                }
            }
        }
        y_tree
    }

    /// Highest occupied top (space included) and, among the segments
    /// reaching it, the smallest upper clearance already accounted for.
    fn y_max_space_min(segs: &[&YSeg]) -> (Decimal, Decimal) {
        let Some(y_max) = segs.iter().map(|s| s.y_max_with_space).max() else {
            return (Decimal::ZERO, Decimal::ZERO);
        };
        let space_min = segs
            .iter()
            .filter(|s| s.y_max_with_space == y_max)
            .map(|s| s.upper_space)
            .min()
            .unwrap_or(Decimal::ZERO);
        (y_max, space_min)
    }

    /// Margin usable just below `ceiling` over `x_iv`, or None when the
    /// ceiling is invalid: it stabs an upper clearance margin, or the
    /// interior of a placed item.
    pub fn get_ceiling_space(&self, ceiling: Decimal, x_iv: &Interval) -> Option<Decimal> {
        let x_ov = self.x_overlapped(x_iv);
        let y_tree = Self::build_y_tree(&x_ov, true);
        let mut ceiling_space = Decimal::ZERO;
        for seg in y_tree.at(ceiling) {
            match seg.kind {
                YKind::Alloc => {
                    if seg.iv.begin != ceiling {
                        return None;
                    }
                }
                YKind::Space(SpaceKind::Above) => return None,
                YKind::Space(SpaceKind::Below) => {}
            }
            ceiling_space = ceiling_space.max(ceiling - seg.iv.begin);
        }
        Some(ceiling_space)
    }

    /// Lowest feasible offset for `item` under `ceiling` (area width when
    /// None), or None when the item cannot be placed.
    pub fn get_offset<T: Allocatable>(&self, item: &T, ceiling: Option<Decimal>) -> Option<Decimal> {
        let ceiling = ceiling.unwrap_or(self.width);
        let x_iv = item.x_interval();
        let x_ov = self.x_overlapped(&x_iv);
        let y_tree = Self::build_y_tree(&x_ov, false);

        let ceiling_space = self.get_ceiling_space(ceiling, &x_iv)?;

        // Allocations strictly below the ceiling: overlap [0, ceiling) but
        // do not straddle the ceiling itself.
        let below: Vec<&YSeg> = y_tree
            .overlapping(&Interval::new(Decimal::ZERO, ceiling))
            .into_iter()
            .filter(|seg| !seg.iv.contains_point(ceiling))
            .collect();
        let (y_max, space_min) = Self::y_max_space_min(&below);

        // Reclaim the clearance already counted into y_max, then re-impose
        // whichever adjacent spacing requirement is larger.
        let offset = y_max - space_min + space_min.max(item.lower_space());

        if offset + item.width() + item.upper_space().max(ceiling_space) > ceiling {
            return None;
        }
        Some(offset)
    }

    pub fn allocatable<T: Allocatable>(&self, item: &T, ceiling: Option<Decimal>) -> bool {
        self.get_offset(item, ceiling).is_some()
    }

    fn push(&mut self, data: AllocData, offset: Decimal) -> Decimal {
        let a = Allocation::new(data, offset);
        let y_max_with_space = a.y_max_with_space();
        self.tree.insert(a.x_interval(), a);
        y_max_with_space
    }

    /// Place a blockage at its absolute y-position, recording its edges as
    /// initial ceiling candidates.
    pub fn place_blockage(&mut self, b: Blockage) -> Result<Decimal> {
        let x_ov = self.x_overlapped(&b.x_interval());
        let y_tree = Self::build_y_tree(&x_ov, false);
        if !y_tree.overlapping(&b.y_interval()).is_empty() {
            bail!(
                "blockage collision at x[{}, {}] y[{}, {}] in area {}",
                b.x_min,
                b.x_max,
                b.y_min,
                b.y_max,
                self.id
            );
        }
        self.init_ceilings.push(b.y_min);
        self.init_ceilings.push(b.y_max);
        let y_min = b.y_min;
        Ok(self.push(AllocData::Blockage(b), y_min))
    }

    fn place_net(&mut self, n: &Net, ceiling: Option<Decimal>) -> Result<Decimal> {
        let Some(offset) = self.get_offset(n, ceiling) else {
            bail!("cannot allocate net {} under ceiling {:?} in area {}", n.name, ceiling, self.id);
        };
        Ok(self.push(AllocData::Net(n.clone()), offset))
    }

    fn place_shield(&mut self, s: &Shield, ceiling: Option<Decimal>) -> Result<Decimal> {
        let Some(offset) = self.get_offset(s, ceiling) else {
            bail!("cannot allocate shield {} under ceiling {:?} in area {}", s.name, ceiling, self.id);
        };
        Ok(self.push(AllocData::Shield(s.clone()), offset))
    }

    /// Place a group-shielded stack as one unit; it is expanded back into
    /// elements only when allocations are enumerated.
    fn place_stack_unit(&mut self, snl: &ShieldedNetList, ceiling: Option<Decimal>) -> Result<Decimal> {
        let Some(offset) = self.get_offset(snl, ceiling) else {
            bail!(
                "cannot allocate shielded group {} under ceiling {:?} in area {}",
                snl.group_name(),
                ceiling,
                self.id
            );
        };
        Ok(self.push(AllocData::Stack(snl.clone()), offset))
    }

    /// Place stack elements one by one bottom-up under a shared ceiling;
    /// each element re-queries its offset and lands on top of the previous.
    fn place_stack_elements(&mut self, snl: &ShieldedNetList, ceiling: Option<Decimal>) -> Result<Decimal> {
        let mut y_max = None;
        for e in snl.elements() {
            y_max = Some(match e {
                StackElem::Net(n) => self.place_net(n, ceiling)?,
                StackElem::Shield(s) => self.place_shield(s, ceiling)?,
            });
        }
        match y_max {
            Some(y) => Ok(y),
            None => bail!("empty shielded net list for group {}", snl.group_name()),
        }
    }

    fn place_shield_dict(&mut self, sd: &ShieldDict, ceiling: Option<Decimal>) -> Result<Decimal> {
        let mut y_maxs = Vec::with_capacity(sd.len());
        for (_, snl) in sd.iter() {
            let y = if snl.is_group_net() {
                self.place_stack_unit(snl, ceiling)?
            } else {
                self.place_stack_elements(snl, ceiling)?
            };
            y_maxs.push(y);
        }
        match y_maxs.into_iter().max() {
            Some(y) => Ok(y),
            None => bail!("empty shield dict"),
        }
    }

    /// Place every cluster of the OID into this area, returning the
    /// highest terminal `y_max_with_space` (the next stack ceiling
    /// candidate).
    pub fn place_oid(&mut self, oid: &OverlappedIntervalDict, ceiling: Option<Decimal>) -> Result<Decimal> {
        let mut y_maxs = Vec::with_capacity(oid.len());
        for (_, sd) in oid.iter() {
            y_maxs.push(self.place_shield_dict(sd, ceiling)?);
        }
        match y_maxs.into_iter().max() {
            Some(y) => Ok(y),
            None => bail!("cannot allocate empty net group {}", oid.name()),
        }
    }
}
