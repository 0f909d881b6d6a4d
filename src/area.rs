use std::fmt::{self, Display};
use bit_set::BitSet;
use rand::Rng;

/// A cell position on the board. Linear indices are row-major
/// (`row * size + col`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellLoc {
    pub row: usize,
    pub col: usize,
}

impl CellLoc {
    pub fn new(row: usize, col: usize) -> Self {
        CellLoc { row, col }
    }

    pub fn index(self, size: usize) -> usize {
        self.row * size + self.col
    }

    pub fn from_index(index: usize, size: usize) -> Self {
        CellLoc { row: index / size, col: index % size }
    }
}

impl Display for CellLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.row, self.col)
    }
}

/// A set of board cells. The side length travels with the set so that
/// complement and location iteration are self-contained; the backing bitset
/// is word-packed and sized at runtime, which covers every board up to
/// 16×16 (256 cells) with the same code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellSet {
    side: usize,
    bits: BitSet,
}

impl CellSet {
    pub fn empty(side: usize) -> Self {
        CellSet { side, bits: BitSet::with_capacity(side * side) }
    }

    pub fn all(side: usize) -> Self {
        let mut s = Self::empty(side);
        for i in 0..side * side {
            s.bits.insert(i);
        }
        s
    }

    pub fn of(side: usize, locs: &[CellLoc]) -> Self {
        let mut s = Self::empty(side);
        for &l in locs {
            s.insert(l);
        }
        s
    }

    pub fn side(&self) -> usize {
        self.side
    }

    pub fn insert(&mut self, l: CellLoc) {
        self.bits.insert(l.index(self.side));
    }

    pub fn remove(&mut self, l: CellLoc) {
        self.bits.remove(l.index(self.side));
    }

    pub fn with(mut self, l: CellLoc) -> Self {
        self.insert(l);
        self
    }

    pub fn without(mut self, l: CellLoc) -> Self {
        self.remove(l);
        self
    }

    pub fn contains(&self, l: CellLoc) -> bool {
        self.bits.contains(l.index(self.side))
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn clear(&mut self) {
        self.bits.clear();
    }

    pub fn and(&self, other: &CellSet) -> CellSet {
        debug_assert_eq!(self.side, other.side);
        let mut s = self.clone();
        s.bits.intersect_with(&other.bits);
        s
    }

    pub fn or(&self, other: &CellSet) -> CellSet {
        debug_assert_eq!(self.side, other.side);
        let mut s = self.clone();
        s.bits.union_with(&other.bits);
        s
    }

    pub fn minus(&self, other: &CellSet) -> CellSet {
        debug_assert_eq!(self.side, other.side);
        let mut s = self.clone();
        s.bits.difference_with(&other.bits);
        s
    }

    pub fn complement(&self) -> CellSet {
        Self::all(self.side).minus(self)
    }

    /// Member cells in ascending linear-index order.
    pub fn iter(&self) -> impl Iterator<Item = CellLoc> + '_ {
        let side = self.side;
        self.bits.iter().map(move |i| CellLoc::from_index(i, side))
    }

    pub fn locations(&self) -> Vec<CellLoc> {
        self.iter().collect()
    }

    /// A uniformly random member, used by guess selectors.
    pub fn random_member<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<CellLoc> {
        if self.is_empty() {
            return None;
        }
        let n = rng.random_range(0..self.len());
        self.iter().nth(n)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cell_loc_index_round_trip() {
        for side in [4usize, 9, 16] {
            for row in 0..side {
                for col in 0..side {
                    let l = CellLoc::new(row, col);
                    assert_eq!(CellLoc::from_index(l.index(side), side), l);
                }
            }
        }
    }

    #[test]
    fn test_cell_set_basics() {
        let mut s = CellSet::empty(9);
        assert!(s.is_empty());
        s.insert(CellLoc::new(0, 0));
        s.insert(CellLoc::new(8, 8));
        assert_eq!(s.len(), 2);
        assert!(s.contains(CellLoc::new(8, 8)));
        assert!(!s.contains(CellLoc::new(4, 4)));
        s.remove(CellLoc::new(0, 0));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_cell_set_algebra() {
        let a = CellSet::of(9, &[CellLoc::new(0, 0), CellLoc::new(0, 1)]);
        let b = CellSet::of(9, &[CellLoc::new(0, 1), CellLoc::new(0, 2)]);
        assert_eq!(a.and(&b).locations(), vec![CellLoc::new(0, 1)]);
        assert_eq!(a.or(&b).len(), 3);
        assert_eq!(a.minus(&b).locations(), vec![CellLoc::new(0, 0)]);
        let c = a.complement();
        assert_eq!(c.len(), 79);
        assert!(!c.contains(CellLoc::new(0, 0)));
        assert_eq!(CellSet::all(9).len(), 81);
    }

    #[test]
    fn test_cell_set_iteration_order() {
        let s = CellSet::of(4, &[CellLoc::new(3, 2), CellLoc::new(0, 1), CellLoc::new(2, 0)]);
        assert_eq!(
            s.locations(),
            vec![CellLoc::new(0, 1), CellLoc::new(2, 0), CellLoc::new(3, 2)]
        );
    }

    #[test]
    fn test_cell_set_sixteen_by_sixteen() {
        // 256 cells spans multiple backing words; the algebra must not care.
        let all = CellSet::all(16);
        assert_eq!(all.len(), 256);
        let corner = CellLoc::new(15, 15);
        let s = CellSet::of(16, &[corner]);
        assert_eq!(all.minus(&s).len(), 255);
        assert!(s.complement().contains(CellLoc::new(0, 0)));
    }

    #[test]
    fn test_random_member() {
        let mut rng = rand::rng();
        assert_eq!(CellSet::empty(9).random_member(&mut rng), None);
        let s = CellSet::of(9, &[CellLoc::new(5, 5)]);
        assert_eq!(s.random_member(&mut rng), Some(CellLoc::new(5, 5)));
        let s = CellSet::all(9);
        for _ in 0..10 {
            assert!(s.contains(s.random_member(&mut rng).unwrap()));
        }
    }
}
