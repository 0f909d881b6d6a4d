use std::rc::Rc;
use crate::area::{CellLoc, CellSet};
use crate::board::Board;
use crate::core::{DigitSet, SolveError};
use crate::rule::{BoardBuilder, Restriction, Rule};
use crate::sets::find_sets;
use crate::strategy::{Difficulty, Strategy};

/// Published for every area that must hold each digit at most once; the
/// uniqueness strategies are built from these.
#[derive(Debug, Clone)]
pub struct UniqueAreaFact {
    pub label: String,
    pub area: CellSet,
}

/// "This area must be able to hold a full complement of distinct digits":
/// the union of candidates over the area may not be smaller than the area.
#[derive(Debug, Clone)]
pub struct UniqueRestriction {
    label: String,
    area: CellSet,
}

impl UniqueRestriction {
    pub fn new(label: impl Into<String>, area: CellSet) -> Self {
        UniqueRestriction { label: label.into(), area }
    }
}

impl Restriction for UniqueRestriction {
    fn name(&self) -> &str {
        &self.label
    }

    fn validate(&self, board: &Board) -> Result<(), SolveError> {
        let mut mask = DigitSet::empty();
        for cell in self.area.iter() {
            mask = mask.or(board.get(cell));
        }
        if (mask.count() as usize) < self.area.len() {
            return Err(SolveError::violation(format!(
                "too few available digits in unique area {}",
                self.label
            )));
        }
        Ok(())
    }
}

/// Registers everything a unique area needs: the fact (for strategy
/// factories), the restriction (for validation), and the exclusion peers
/// (for propagation).
pub fn unique_area(builder: &mut BoardBuilder, label: impl Into<String>, area: CellSet) {
    let label = label.into();
    for cell in area.iter() {
        builder.add_exclusion_area(cell, area.clone());
    }
    builder.add_restriction(UniqueRestriction::new(label.clone(), area.clone()));
    builder.publish_fact(UniqueAreaFact { label, area });
}

/// Row, column and box uniqueness for the board's geometry.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassicRules;

impl Rule for ClassicRules {
    fn apply(&self, builder: &mut BoardBuilder) -> Result<(), SolveError> {
        for row in 0..builder.size() {
            let area = builder.row(row);
            unique_area(builder, format!("row {}", row + 1), area);
        }
        for col in 0..builder.size() {
            let area = builder.column(col);
            unique_area(builder, format!("col {}", col + 1), area);
        }
        for b in 0..builder.size() {
            let area = builder.box_area(b);
            unique_area(builder, format!("box {}", b + 1), area);
        }
        Ok(())
    }
}

/// Both main diagonals hold each digit at most once.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiagonalRule;

impl Rule for DiagonalRule {
    fn apply(&self, builder: &mut BoardBuilder) -> Result<(), SolveError> {
        let size = builder.size();
        let mut falling = CellSet::empty(size);
        let mut rising = CellSet::empty(size);
        for n in 0..size {
            falling.insert(CellLoc::new(n, n));
            rising.insert(CellLoc::new(size - 1 - n, n));
        }
        unique_area(builder, "falling diagonal", falling);
        unique_area(builder, "rising diagonal", rising);
        Ok(())
    }
}

/// Seeds the starting digits from string rows ('1'..'9'; anything else is
/// an undecided cell).
#[derive(Debug, Clone, Default)]
pub struct GivenDigits {
    givens: Vec<(CellLoc, u8)>,
}

impl GivenDigits {
    pub fn from_rows(rows: &[&str]) -> Self {
        let mut givens = Vec::new();
        for (row, content) in rows.iter().enumerate() {
            for (col, ch) in content.chars().enumerate() {
                if let Some(d) = ch.to_digit(10) {
                    if d >= 1 {
                        givens.push((CellLoc::new(row, col), d as u8));
                    }
                }
            }
        }
        GivenDigits { givens }
    }

    pub fn from_pairs(givens: Vec<(CellLoc, u8)>) -> Self {
        GivenDigits { givens }
    }
}

impl Rule for GivenDigits {
    fn apply(&self, builder: &mut BoardBuilder) -> Result<(), SolveError> {
        for &(l, v) in &self.givens {
            builder.set_cell(l, v)?;
        }
        Ok(())
    }
}

/// Naked/hidden set elimination over one unique area. Found groups spawn
/// narrowed replacements so later rounds only rescan the partitions that
/// can still shrink.
#[derive(Debug, Clone)]
pub struct UniqueSetStrategy {
    cells: Vec<CellLoc>,
    area: CellSet,
}

impl UniqueSetStrategy {
    pub fn new(area: CellSet) -> Self {
        UniqueSetStrategy { cells: area.locations(), area }
    }
}

impl Strategy for UniqueSetStrategy {
    fn name(&self) -> &str {
        "unique-set"
    }

    fn difficulty(&self) -> Difficulty {
        Difficulty::Easy
    }

    fn area_filter(&self) -> CellSet {
        self.area.clone()
    }

    fn solve(&self, board: &mut Board) -> Result<Vec<Rc<dyn Strategy>>, SolveError> {
        let mut digits: Vec<DigitSet> = self.cells.iter().map(|&c| board.get(c)).collect();
        let groups = find_sets(&mut digits)?;
        let mut continuations: Vec<Rc<dyn Strategy>> = Vec::with_capacity(groups.len());
        for group in groups {
            let cells: Vec<CellLoc> = group.indices.iter().map(|&i| self.cells[i]).collect();
            for &cell in &cells {
                board.mask(cell, group.mask)?;
            }
            if cells.len() > 1 {
                let area = CellSet::of(board.size(), &cells);
                continuations.push(Rc::new(UniqueSetStrategy { cells, area }));
            }
        }
        Ok(continuations)
    }
}

pub fn unique_set_strategies(board: &Board) -> Vec<Rc<dyn Strategy>> {
    board
        .facts()
        .all::<UniqueAreaFact>()
        .iter()
        .map(|f| Rc::new(UniqueSetStrategy::new(f.area.clone())) as Rc<dyn Strategy>)
        .collect()
}

/// For a value placeable in exactly two cells of a full unique area, place
/// each speculatively and keep only what every surviving placement agrees
/// on (pointing pairs and box-line reduction fall out of this).
#[derive(Debug, Clone)]
pub struct UniqueIntersectionStrategy {
    area: CellSet,
}

impl UniqueIntersectionStrategy {
    pub fn new(area: CellSet) -> Self {
        UniqueIntersectionStrategy { area }
    }

    fn check_value(&self, board: &mut Board, v: u8) -> Result<(), SolveError> {
        let size = board.size();
        let mut masks: Vec<DigitSet> = vec![DigitSet::empty(); size * size];
        for cell in self.area.iter() {
            if !board.get(cell).can_contain(v) {
                continue;
            }
            match board.try_apply(|b| {
                b.set(cell, v)?;
                b.validate()
            }) {
                Ok(clone) => {
                    for (idx, mask) in masks.iter_mut().enumerate() {
                        *mask = mask.or(clone.get(CellLoc::from_index(idx, size)));
                    }
                }
                Err(_) => {
                    board.remove_option(cell, v)?;
                }
            }
        }
        for (idx, mask) in masks.iter().enumerate() {
            board.mask(CellLoc::from_index(idx, size), *mask)?;
        }
        Ok(())
    }
}

impl Strategy for UniqueIntersectionStrategy {
    fn name(&self) -> &str {
        "unique-intersection"
    }

    fn difficulty(&self) -> Difficulty {
        Difficulty::Normal
    }

    fn area_filter(&self) -> CellSet {
        self.area.clone()
    }

    fn solve(&self, board: &mut Board) -> Result<Vec<Rc<dyn Strategy>>, SolveError> {
        let mut counts = vec![0usize; board.alphabet() as usize];
        for cell in self.area.and(&board.solved_area().complement()).iter() {
            for v in board.get(cell).values() {
                counts[v as usize - 1] += 1;
            }
        }
        for (i, &count) in counts.iter().enumerate() {
            if count == 2 {
                self.check_value(board, i as u8 + 1)?;
            }
        }
        Ok(vec![Rc::new(self.clone())])
    }
}

pub fn unique_intersection_strategies(board: &Board) -> Vec<Rc<dyn Strategy>> {
    board
        .facts()
        .all::<UniqueAreaFact>()
        .iter()
        .filter(|f| f.area.len() == board.size())
        .map(|f| Rc::new(UniqueIntersectionStrategy::new(f.area.clone())) as Rc<dyn Strategy>)
        .collect()
}

/// Speculative exclusion over a full unique area: force every possible
/// placement of a digit (and every possible digit of a cell), and mask
/// outside cells down to the union of what the surviving clones allow.
/// The by-value and by-cell passes overlap but are both kept; neither is
/// proven to subsume the other.
#[derive(Debug, Clone)]
pub struct UniqueExclusionStrategy {
    area: CellSet,
}

impl UniqueExclusionStrategy {
    pub fn new(area: CellSet) -> Self {
        UniqueExclusionStrategy { area }
    }

    fn mask_changed(
        &self,
        board: &mut Board,
        changed: &CellSet,
        clones: &[Board],
    ) -> Result<(), SolveError> {
        for cell in changed.and(&self.area.complement()).iter() {
            let mut mask = DigitSet::empty();
            for clone in clones {
                mask = mask.or(clone.get(cell));
            }
            board.mask(cell, mask)?;
        }
        Ok(())
    }
}

impl Strategy for UniqueExclusionStrategy {
    fn name(&self) -> &str {
        "unique-exclusion"
    }

    fn difficulty(&self) -> Difficulty {
        Difficulty::Hard
    }

    fn area_filter(&self) -> CellSet {
        self.area.clone()
    }

    fn solve(&self, board: &mut Board) -> Result<Vec<Rc<dyn Strategy>>, SolveError> {
        let open = self.area.and(&board.solved_area().complement());
        if open.is_empty() {
            return Ok(vec![]);
        }

        // By value: all placements of a digit within the area.
        let size = board.size();
        let mut candidates: Vec<CellSet> = vec![CellSet::empty(size); board.alphabet() as usize];
        for cell in open.iter() {
            for v in board.get(cell).values() {
                candidates[v as usize - 1].insert(cell);
            }
        }
        for (i, placements) in candidates.iter().enumerate() {
            if placements.and(&board.changed_area()).is_empty() {
                continue;
            }
            let v = i as u8 + 1;
            let mut changed = CellSet::empty(size);
            let mut clones = Vec::with_capacity(placements.len());
            for cell in placements.iter() {
                if let Ok(clone) = board.try_apply(|b| b.set(cell, v)) {
                    changed = changed.or(&clone.next_changed_area());
                    clones.push(clone);
                }
            }
            self.mask_changed(board, &changed, &clones)?;
        }

        // By cell: all digits of a cell.
        for cell in open.and(&board.changed_area()).iter() {
            let digits = board.get(cell);
            let mut changed = CellSet::empty(size);
            let mut clones = Vec::with_capacity(digits.count() as usize);
            for v in digits.values() {
                if let Ok(clone) = board.try_apply(|b| b.set(cell, v)) {
                    changed = changed.or(&clone.next_changed_area());
                    clones.push(clone);
                }
            }
            self.mask_changed(board, &changed, &clones)?;
        }

        Ok(vec![Rc::new(self.clone())])
    }
}

pub fn unique_exclusion_strategies(board: &Board) -> Vec<Rc<dyn Strategy>> {
    board
        .facts()
        .all::<UniqueAreaFact>()
        .iter()
        .filter(|f| f.area.len() >= board.size())
        .map(|f| Rc::new(UniqueExclusionStrategy::new(f.area.clone())) as Rc<dyn Strategy>)
        .collect()
}

/// For recently changed two-candidate cells, try each candidate to the
/// first contradiction; whichever branch breaks is eliminated for real.
#[derive(Debug, Clone)]
pub struct LogicChainStrategy {
    area: CellSet,
}

impl LogicChainStrategy {
    pub fn new(area: CellSet) -> Self {
        LogicChainStrategy { area }
    }
}

impl Strategy for LogicChainStrategy {
    fn name(&self) -> &str {
        "logic-chain"
    }

    fn difficulty(&self) -> Difficulty {
        Difficulty::Impossible
    }

    fn area_filter(&self) -> CellSet {
        self.area.clone()
    }

    fn solve(&self, board: &mut Board) -> Result<Vec<Rc<dyn Strategy>>, SolveError> {
        for cell in board.changed_area().iter() {
            let digits = board.get(cell);
            if digits.count() != 2 {
                continue;
            }
            for v in digits.values() {
                let branch = board.try_apply(|b| {
                    b.set(cell, v)?;
                    b.validate()
                });
                if branch.is_err() {
                    board.remove_option(cell, v)?;
                }
            }
        }
        Ok(vec![Rc::new(self.clone())])
    }
}

pub fn logic_chain_strategies(board: &Board) -> Vec<Rc<dyn Strategy>> {
    vec![Rc::new(LogicChainStrategy::new(board.all_cells())) as Rc<dyn Strategy>]
}
