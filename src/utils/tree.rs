use rust_decimal::Decimal;

/// Half-open interval `[begin, end)` over exact decimal coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Interval {
    pub begin: Decimal,
    pub end: Decimal,
}

impl Default for Interval {
    fn default() -> Self {
        Interval::new(Decimal::ZERO, Decimal::ZERO)
    }
}

impl Interval {
    pub fn new(begin: Decimal, end: Decimal) -> Self {
        Self { begin, end }
    }

    pub fn length(&self) -> Decimal {
        self.end - self.begin
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.begin < other.end && other.begin < self.end
    }

    pub fn contains_point(&self, p: Decimal) -> bool {
        self.begin <= p && p < self.end
    }

    /// Size of the overlap with `other`; zero when disjoint.
    pub fn overlap_size(&self, other: &Interval) -> Decimal {
        let lo = self.begin.max(other.begin);
        let hi = self.end.min(other.end);
        if hi > lo { hi - lo } else { Decimal::ZERO }
    }

    /// Smallest interval covering both.
    pub fn merge(&self, other: &Interval) -> Interval {
        Interval::new(self.begin.min(other.begin), self.end.max(other.end))
    }
}

/// Center-split interval tree supporting incremental insertion.
///
/// Every entry stored at a node straddles the node's center
/// (`begin <= center < end`), entries entirely left of the center live in
/// the left subtree, entries entirely right in the right subtree. Stabbing
/// and overlap queries therefore only descend into subtrees that can hold
/// a match.
#[derive(Debug)]
pub struct IntervalTree<V> {
    root: Option<Box<Node<V>>>,
    len: usize,
}

#[derive(Debug)]
struct Node<V> {
    center: Decimal,
    entries: Vec<(Interval, V)>,
    left: Option<Box<Node<V>>>,
    right: Option<Box<Node<V>>>,
}

impl<V> Default for IntervalTree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> IntervalTree<V> {
    pub fn new() -> Self {
        Self { root: None, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, iv: Interval, value: V) {
        debug_assert!(iv.begin < iv.end, "degenerate interval {iv:?}");
        Self::insert_rec(&mut self.root, iv, value);
        self.len += 1;
    }

    fn insert_rec(node: &mut Option<Box<Node<V>>>, iv: Interval, value: V) {
        match node {
            None => {
                *node = Some(Box::new(Node {
                    center: iv.begin,
                    entries: vec![(iv, value)],
                    left: None,
                    right: None,
                }));
            }
            Some(n) => {
                if iv.end <= n.center {
                    Self::insert_rec(&mut n.left, iv, value);
                } else if iv.begin > n.center {
                    Self::insert_rec(&mut n.right, iv, value);
                } else {
                    n.entries.push((iv, value));
                }
            }
        }
    }

    /// All values whose interval overlaps `query`.
    pub fn overlapping(&self, query: &Interval) -> Vec<&V> {
        let mut result = Vec::new();
        Self::overlap_rec(&self.root, query, &mut result);
        result
    }

    fn overlap_rec<'a>(node: &'a Option<Box<Node<V>>>, query: &Interval, result: &mut Vec<&'a V>) {
        if let Some(n) = node {
            for (iv, v) in &n.entries {
                if iv.overlaps(query) {
                    result.push(v);
                }
            }
            if query.begin < n.center {
                Self::overlap_rec(&n.left, query, result);
            }
            if query.end > n.center {
                Self::overlap_rec(&n.right, query, result);
            }
        }
    }

    /// All values whose interval contains the point `p` (half-open).
    pub fn at(&self, p: Decimal) -> Vec<&V> {
        let mut result = Vec::new();
        Self::at_rec(&self.root, p, &mut result);
        result
    }

    fn at_rec<'a>(node: &'a Option<Box<Node<V>>>, p: Decimal, result: &mut Vec<&'a V>) {
        if let Some(n) = node {
            for (iv, v) in &n.entries {
                if iv.contains_point(p) {
                    result.push(v);
                }
            }
            // Left entries end at or before the center, right entries begin
            // strictly after it, so p == center stabs node entries only.
            if p < n.center {
                Self::at_rec(&n.left, p, result);
            } else if p > n.center {
                Self::at_rec(&n.right, p, result);
            }
        }
    }

    /// In-order traversal of all stored values.
    pub fn values(&self) -> Vec<&V> {
        let mut result = Vec::new();
        Self::values_rec(&self.root, &mut result);
        result
    }

    fn values_rec<'a>(node: &'a Option<Box<Node<V>>>, result: &mut Vec<&'a V>) {
        if let Some(n) = node {
            Self::values_rec(&n.left, result);
            for (_, v) in &n.entries {
                result.push(v);
            }
            Self::values_rec(&n.right, result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn iv(b: i64, e: i64) -> Interval {
        Interval::new(Decimal::from(b), Decimal::from(e))
    }

    #[test]
    fn interval_overlap_is_half_open() {
        assert!(iv(0, 5).overlaps(&iv(4, 6)));
        assert!(!iv(0, 5).overlaps(&iv(5, 6)));
        assert!(!iv(5, 6).overlaps(&iv(0, 5)));
        assert!(iv(0, 5).contains_point(Decimal::ZERO));
        assert!(!iv(0, 5).contains_point(dec!(5)));
    }

    #[test]
    fn overlap_size_clamps_to_zero() {
        assert_eq!(iv(0, 5).overlap_size(&iv(3, 8)), dec!(2));
        assert_eq!(iv(0, 5).overlap_size(&iv(7, 8)), Decimal::ZERO);
        assert_eq!(iv(0, 5).overlap_size(&iv(5, 8)), Decimal::ZERO);
    }

    #[test]
    fn tree_queries_match_brute_force() {
        let ivs = [
            iv(0, 10),
            iv(2, 4),
            iv(3, 7),
            iv(8, 12),
            iv(12, 15),
            iv(-3, 1),
        ];
        let mut tree = IntervalTree::new();
        for (i, x) in ivs.iter().enumerate() {
            tree.insert(*x, i);
        }
        assert_eq!(tree.len(), ivs.len());

        for q in [iv(-5, 0), iv(0, 3), iv(4, 9), iv(11, 20), iv(15, 16)] {
            let mut got: Vec<usize> = tree.overlapping(&q).into_iter().copied().collect();
            got.sort_unstable();
            let want: Vec<usize> = ivs
                .iter()
                .enumerate()
                .filter(|(_, x)| x.overlaps(&q))
                .map(|(i, _)| i)
                .collect();
            assert_eq!(got, want, "query {q:?}");
        }

        for p in -4..16 {
            let p = Decimal::from(p);
            let mut got: Vec<usize> = tree.at(p).into_iter().copied().collect();
            got.sort_unstable();
            let want: Vec<usize> = ivs
                .iter()
                .enumerate()
                .filter(|(_, x)| x.contains_point(p))
                .map(|(i, _)| i)
                .collect();
            assert_eq!(got, want, "stab {p}");
        }
    }

    #[test]
    fn values_reports_everything_once() {
        let mut tree = IntervalTree::new();
        for i in 0..20i64 {
            tree.insert(iv(i, i + 3), i);
        }
        let mut all: Vec<i64> = tree.values().into_iter().copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..20).collect::<Vec<_>>());
    }
}
