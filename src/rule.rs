use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use crate::area::{CellLoc, CellSet};
use crate::board::{Board, BoardConfig};
use crate::core::{DigitSet, SolveError};

/// A global consistency check, never a mutator. Consulted after every
/// propagation stall and at exclusion-chain leaves.
pub trait Restriction: Debug {
    fn name(&self) -> &str;
    fn validate(&self, board: &Board) -> Result<(), SolveError>;
}

/// Fired when a cell collapses to a single candidate. May recursively
/// mutate the board; a returned error aborts the mutation chain that
/// triggered it.
pub trait SolveProcessor: Debug {
    fn name(&self) -> &str;
    fn process_solve(&self, board: &mut Board, cell: CellLoc, value: u8) -> Result<(), SolveError>;
}

/// Fired on every candidate-set narrowing with the cell's new mask.
pub trait ChangeProcessor: Debug {
    fn name(&self) -> &str;
    fn process_change(&self, board: &mut Board, cell: CellLoc, mask: DigitSet) -> Result<(), SolveError>;
}

/// Build-time configurator: populates exclusion peers and registers
/// restrictions, hooks, facts, and seed digits on a board under
/// construction. Applied once per rule, in caller order; the builder makes
/// the outcome order-independent (see `BoardBuilder::build`).
pub trait Rule {
    fn apply(&self, builder: &mut BoardBuilder) -> Result<(), SolveError>;
}

/// Typed registry of what the rules declared about the puzzle, one
/// homogeneous list per fact type. Strategy factories look up the kinds
/// they consume (`facts.all::<SumAreaFact>()`) instead of downcasting
/// their way through a heterogeneous restriction list.
#[derive(Default)]
pub struct FactIndex {
    lists: HashMap<TypeId, Box<dyn Any>>,
}

impl FactIndex {
    pub fn publish<T: 'static>(&mut self, fact: T) {
        self.lists
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(Vec::<T>::new()))
            .downcast_mut::<Vec<T>>()
            .unwrap()
            .push(fact);
    }

    pub fn all<T: 'static>(&self) -> &[T] {
        self.lists
            .get(&TypeId::of::<T>())
            .and_then(|list| list.downcast_ref::<Vec<T>>())
            .map_or(&[], Vec::as_slice)
    }
}

/// The built-in solve processor that keeps the exclusion graph satisfied:
/// when a cell is forced, its value disappears from every peer. Registered
/// first on every board, ahead of any rule-supplied processors.
#[derive(Debug)]
struct PeerExclusion;

impl SolveProcessor for PeerExclusion {
    fn name(&self) -> &str {
        "peer-exclusion"
    }

    fn process_solve(&self, board: &mut Board, cell: CellLoc, value: u8) -> Result<(), SolveError> {
        for peer in board.exclusion_area(cell).iter() {
            board.remove_option(peer, value)?;
        }
        Ok(())
    }
}

enum Seed {
    Force(CellLoc, u8),
    Mask(CellLoc, DigitSet),
}

/// Assembles a board: geometry first, then rules, then `build()`. Rules
/// may pre-seed cells and exclusion peers directly during this phase; seeds
/// are recorded and replayed against the finished exclusion graph, so rules
/// converge to the same initial propagation state in any order.
pub struct BoardBuilder {
    size: usize,
    box_shape: (usize, usize),
    seeds: Vec<Seed>,
    exclusion: Vec<CellSet>,
    restrictions: Vec<Arc<dyn Restriction>>,
    solve_processors: Vec<Arc<dyn SolveProcessor>>,
    change_processors: Vec<Arc<dyn ChangeProcessor>>,
    facts: FactIndex,
}

impl BoardBuilder {
    pub fn new(size: usize, box_shape: (usize, usize)) -> Self {
        assert!((4..=16).contains(&size), "board size must be 4..=16");
        assert!(
            box_shape.0 * box_shape.1 == size,
            "box shape {:?} does not tile a side of {}",
            box_shape,
            size
        );
        BoardBuilder {
            size,
            box_shape,
            seeds: Vec::new(),
            exclusion: vec![CellSet::empty(size); size * size],
            restrictions: Vec::new(),
            solve_processors: vec![Arc::new(PeerExclusion)],
            change_processors: Vec::new(),
            facts: FactIndex::default(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn box_shape(&self) -> (usize, usize) {
        self.box_shape
    }

    pub fn all_cells(&self) -> CellSet {
        CellSet::all(self.size)
    }

    pub fn row(&self, row: usize) -> CellSet {
        let mut a = CellSet::empty(self.size);
        for col in 0..self.size {
            a.insert(CellLoc::new(row, col));
        }
        a
    }

    pub fn column(&self, col: usize) -> CellSet {
        let mut a = CellSet::empty(self.size);
        for row in 0..self.size {
            a.insert(CellLoc::new(row, col));
        }
        a
    }

    pub fn box_area(&self, b: usize) -> CellSet {
        let (box_rows, box_cols) = self.box_shape;
        let boxes_per_row = self.size / box_cols;
        let row_offset = (b / boxes_per_row) * box_rows;
        let col_offset = (b % boxes_per_row) * box_cols;
        let mut a = CellSet::empty(self.size);
        for row in 0..box_rows {
            for col in 0..box_cols {
                a.insert(CellLoc::new(row_offset + row, col_offset + col));
            }
        }
        a
    }

    /// Records a given digit, replayed through normal propagation at build.
    pub fn set_cell(&mut self, l: CellLoc, v: u8) -> Result<(), SolveError> {
        if v == 0 || v as usize > self.size {
            return Err(SolveError::ValueOutOfRange(v));
        }
        self.seeds.push(Seed::Force(l, v));
        Ok(())
    }

    /// Records a candidate restriction for a cell, replayed at build.
    pub fn mask_cell(&mut self, l: CellLoc, mask: DigitSet) {
        self.seeds.push(Seed::Mask(l, mask));
    }

    pub fn add_restriction(&mut self, r: impl Restriction + 'static) {
        self.restrictions.push(Arc::new(r));
    }

    pub fn add_solve_processor(&mut self, sp: impl SolveProcessor + 'static) {
        self.solve_processors.push(Arc::new(sp));
    }

    pub fn add_change_processor(&mut self, cp: impl ChangeProcessor + 'static) {
        self.change_processors.push(Arc::new(cp));
    }

    /// Marks every cell of `area` (minus the cell itself) as a peer that
    /// may never share `l`'s value.
    pub fn add_exclusion_area(&mut self, l: CellLoc, area: CellSet) {
        let area = area.without(l);
        let slot = &mut self.exclusion[l.index(self.size)];
        *slot = slot.or(&area);
    }

    pub fn publish_fact<T: 'static>(&mut self, fact: T) {
        self.facts.publish(fact);
    }

    pub fn apply(&mut self, rule: &dyn Rule) -> Result<(), SolveError> {
        rule.apply(self)
    }

    pub fn apply_all(&mut self, rules: Vec<Box<dyn Rule>>) -> Result<(), SolveError> {
        for rule in rules {
            rule.apply(self)?;
        }
        Ok(())
    }

    /// Finalizes the configuration and replays the recorded seeds through
    /// the ordinary mutation path, so every pre-seeded cell gets a full
    /// propagation pass against the complete exclusion graph. Propagation
    /// cascades until nothing is left to do, which is what makes rule
    /// application order-independent.
    pub fn build(self) -> Result<Board, SolveError> {
        let size = self.size;
        let cfg = BoardConfig {
            size,
            box_shape: self.box_shape,
            exclusion: self.exclusion,
            restrictions: self.restrictions,
            solve_processors: self.solve_processors,
            change_processors: self.change_processors,
            facts: self.facts,
            hook_limit: size * size * size + 8,
        };
        let mut board = Board::new(Arc::new(cfg));
        for seed in self.seeds {
            match seed {
                Seed::Force(l, v) => board.set(l, v)?,
                Seed::Mask(l, mask) => board.mask(l, mask)?,
            }
        }
        Ok(board)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::board::test_util::drain_changes;
    use crate::unique::{ClassicRules, GivenDigits, UniqueAreaFact};

    #[test]
    fn test_fact_index() {
        #[derive(Debug, PartialEq)]
        struct Flavor(&'static str);
        #[derive(Debug, PartialEq)]
        struct Weight(u32);

        let mut facts = FactIndex::default();
        facts.publish(Flavor("sour"));
        facts.publish(Weight(12));
        facts.publish(Flavor("sweet"));

        assert_eq!(facts.all::<Flavor>(), &[Flavor("sour"), Flavor("sweet")]);
        assert_eq!(facts.all::<Weight>(), &[Weight(12)]);
        assert!(facts.all::<u64>().is_empty());
    }

    #[test]
    fn test_exclusion_propagation() {
        let mut builder = BoardBuilder::new(9, (3, 3));
        let row = builder.row(0);
        for cell in row.iter() {
            builder.add_exclusion_area(cell, row.clone());
        }
        let mut board = builder.build().unwrap();
        drain_changes(&mut board);

        board.set(CellLoc::new(0, 0), 7).unwrap();
        for col in 1..9 {
            assert!(!board.get(CellLoc::new(0, col)).can_contain(7));
        }
        // Cells outside the registered area are untouched.
        assert!(board.get(CellLoc::new(1, 0)).can_contain(7));
    }

    #[test]
    fn test_exclusion_cascade_solves_last_cell() {
        let mut builder = BoardBuilder::new(4, (2, 2));
        let row = builder.row(0);
        for cell in row.iter() {
            builder.add_exclusion_area(cell, row.clone());
        }
        let mut board = builder.build().unwrap();
        board.set(CellLoc::new(0, 0), 1).unwrap();
        board.set(CellLoc::new(0, 1), 2).unwrap();
        board.set(CellLoc::new(0, 2), 3).unwrap();
        // The fourth cell collapses on its own and is marked solved.
        assert_eq!(board.get(CellLoc::new(0, 3)), DigitSet::just(4));
        assert!(board.solved_area().contains(CellLoc::new(0, 3)));
    }

    #[test]
    fn test_seed_with_contradiction_fails_at_build() {
        let mut builder = BoardBuilder::new(4, (2, 2));
        let row = builder.row(0);
        for cell in row.iter() {
            builder.add_exclusion_area(cell, row.clone());
        }
        builder.set_cell(CellLoc::new(0, 0), 1).unwrap();
        builder.set_cell(CellLoc::new(0, 1), 1).unwrap();
        assert_eq!(
            builder.build().unwrap_err(),
            SolveError::InvalidAssignment(CellLoc::new(0, 1), 1)
        );
    }

    #[test]
    fn test_rule_order_independence() {
        let givens = || -> Box<dyn Rule> {
            Box::new(GivenDigits::from_rows(&[
                "1...",
                "..3.",
                "....",
                "...4",
            ]))
        };
        let forward = {
            let mut b = BoardBuilder::new(4, (2, 2));
            b.apply_all(vec![Box::new(ClassicRules), givens()]).unwrap();
            b.build().unwrap()
        };
        let backward = {
            let mut b = BoardBuilder::new(4, (2, 2));
            b.apply_all(vec![givens(), Box::new(ClassicRules)]).unwrap();
            b.build().unwrap()
        };
        for idx in 0..16 {
            let l = CellLoc::from_index(idx, 4);
            assert_eq!(forward.get(l), backward.get(l), "cell {} diverged", l);
        }
        assert_eq!(forward.solved_area(), backward.solved_area());
    }

    /// Forwards one cell's narrowings onto another cell, the way two
    /// overlapping boards would share a region.
    #[derive(Debug)]
    struct Mirror {
        from: CellLoc,
        to: CellLoc,
    }

    impl ChangeProcessor for Mirror {
        fn name(&self) -> &str {
            "mirror"
        }
        fn process_change(&self, board: &mut Board, cell: CellLoc, mask: DigitSet) -> Result<(), SolveError> {
            if cell == self.from {
                board.mask(self.to, mask)
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_change_processor_fires_on_every_narrowing() {
        let mut builder = BoardBuilder::new(9, (3, 3));
        builder.add_change_processor(Mirror {
            from: CellLoc::new(0, 0),
            to: CellLoc::new(3, 3),
        });
        let mut board = builder.build().unwrap();
        drain_changes(&mut board);

        board.remove_option(CellLoc::new(0, 0), 5).unwrap();
        assert!(!board.get(CellLoc::new(3, 3)).can_contain(5));

        // A collapse carries through the mirror, solving the target too.
        board.set(CellLoc::new(0, 0), 7).unwrap();
        assert_eq!(board.get(CellLoc::new(3, 3)), DigitSet::just(7));
        assert!(board.solved_area().contains(CellLoc::new(3, 3)));
    }

    #[test]
    fn test_builder_geometry() {
        let b = BoardBuilder::new(6, (2, 3));
        assert_eq!(b.row(1).len(), 6);
        assert_eq!(b.column(5).len(), 6);
        let box1 = b.box_area(1);
        assert_eq!(box1.len(), 6);
        assert!(box1.contains(CellLoc::new(0, 3)));
        assert!(box1.contains(CellLoc::new(1, 5)));
        let box2 = b.box_area(2);
        assert!(box2.contains(CellLoc::new(2, 0)));
    }

    #[test]
    fn test_classic_rules_publish_facts() {
        let mut b = BoardBuilder::new(9, (3, 3));
        b.apply(&ClassicRules).unwrap();
        let board = b.build().unwrap();
        assert_eq!(board.facts().all::<UniqueAreaFact>().len(), 27);
        // Every cell sees its row, column and box: 8 + 8 + 4 others.
        assert_eq!(board.exclusion_area(CellLoc::new(0, 0)).len(), 20);
        assert!(board.is_unique_area(&board.facts().all::<UniqueAreaFact>()[0].area));
    }
}
