use std::rc::Rc;
use crate::area::{CellLoc, CellSet};
use crate::board::Board;
use crate::core::{DigitSet, SolveError};
use crate::rule::{BoardBuilder, Restriction, Rule};
use crate::sets::sum_masks;
use crate::strategy::{Difficulty, Strategy};
use crate::unique::unique_area;

/// Published for every area whose digits must add up to a fixed sum.
#[derive(Debug, Clone)]
pub struct SumAreaFact {
    pub area: CellSet,
    pub sum: u32,
}

/// Feasibility check for a sum area: the sum must lie between the area's
/// minimum and maximum reachable totals.
#[derive(Debug, Clone)]
pub struct AreaSumRestriction {
    area: CellSet,
    sum: u32,
}

impl AreaSumRestriction {
    pub fn new(area: CellSet, sum: u32) -> Self {
        AreaSumRestriction { area, sum }
    }
}

impl Restriction for AreaSumRestriction {
    fn name(&self) -> &str {
        "area-sum"
    }

    fn validate(&self, board: &Board) -> Result<(), SolveError> {
        let mut lo = 0u32;
        let mut hi = 0u32;
        for cell in self.area.iter() {
            let digits = board.get(cell);
            lo += digits.min().ok_or(SolveError::EmptyCell(cell))? as u32;
            hi += digits.max().ok_or(SolveError::EmptyCell(cell))? as u32;
        }
        if lo > self.sum || hi < self.sum {
            return Err(SolveError::violation("area sum is out of reach"));
        }
        Ok(())
    }
}

/// A plain sum constraint with no uniqueness attached (sandwich-style
/// sums build on this).
#[derive(Debug, Clone)]
pub struct AreaSumRule {
    pub cells: Vec<CellLoc>,
    pub sum: u32,
}

impl Rule for AreaSumRule {
    fn apply(&self, builder: &mut BoardBuilder) -> Result<(), SolveError> {
        let area = CellSet::of(builder.size(), &self.cells);
        builder.add_restriction(AreaSumRestriction::new(area.clone(), self.sum));
        builder.publish_fact(SumAreaFact { area, sum: self.sum });
        Ok(())
    }
}

/// A killer cage: distinct digits adding up to the target. Registers the
/// sum fact plus full uniqueness (restriction and exclusion peers).
#[derive(Debug, Clone)]
pub struct SumCageRule {
    pub cells: Vec<CellLoc>,
    pub sum: u32,
}

impl SumCageRule {
    pub fn new(sum: u32, cells: Vec<CellLoc>) -> Self {
        SumCageRule { cells, sum }
    }
}

impl Rule for SumCageRule {
    fn apply(&self, builder: &mut BoardBuilder) -> Result<(), SolveError> {
        let area = CellSet::of(builder.size(), &self.cells);
        builder.add_restriction(AreaSumRestriction::new(area.clone(), self.sum));
        builder.publish_fact(SumAreaFact { area: area.clone(), sum: self.sum });
        unique_area(builder, format!("cage sum {}", self.sum), area);
        Ok(())
    }
}

/// Sum-driven cage deduction. Holds every digit combination of the right
/// cardinality for the cage's sum; each run filters them down to the ones
/// actually placeable against current candidates, then
/// - removes digits forced into every placeable combination from each
///   outside cell that sees all of their possible holders, and
/// - removes per-cell digits that no placeable combination can extend.
#[derive(Debug, Clone)]
pub struct KillerCageStrategy {
    area: CellSet,
    masks: Vec<DigitSet>,
}

impl KillerCageStrategy {
    pub fn new(area: CellSet, masks: Vec<DigitSet>) -> Self {
        KillerCageStrategy { area, masks }
    }

    /// Can the digits of `mask` be distributed injectively over `area`,
    /// respecting every cell's current candidates? Recursive
    /// permutation-feasibility check, one cell per level.
    fn is_mask_placeable(board: &Board, area: &CellSet, mask: DigitSet) -> bool {
        let Some(cell) = area.iter().next() else {
            return false;
        };
        for v in board.get(cell).and(mask).values() {
            let rest = area.clone().without(cell);
            if rest.is_empty() {
                return true;
            }
            if Self::is_mask_placeable(board, &rest, mask.without(v)) {
                return true;
            }
        }
        false
    }

    fn is_value_placeable(&self, board: &Board, cell: CellLoc, v: u8, masks: &[DigitSet]) -> bool {
        let rest = self.area.clone().without(cell);
        for &mask in masks {
            if !mask.can_contain(v) {
                continue;
            }
            if rest.is_empty() {
                return true;
            }
            if Self::is_mask_placeable(board, &rest, mask.without(v)) {
                return true;
            }
        }
        false
    }
}

impl Strategy for KillerCageStrategy {
    fn name(&self) -> &str {
        "killer-cage"
    }

    fn difficulty(&self) -> Difficulty {
        Difficulty::Normal
    }

    fn area_filter(&self) -> CellSet {
        self.area.clone()
    }

    fn solve(&self, board: &mut Board) -> Result<Vec<Rc<dyn Strategy>>, SolveError> {
        let open = self.area.and(&board.solved_area().complement());
        if open.is_empty() {
            return Ok(vec![]);
        }

        let mut placeable = Vec::with_capacity(self.masks.len());
        let mut forced = board.all_digits();
        for &mask in &self.masks {
            if Self::is_mask_placeable(board, &self.area, mask) {
                placeable.push(mask);
                forced = forced.and(mask);
            }
        }
        if placeable.is_empty() {
            return Err(SolveError::violation("no placeable digit combination for cage"));
        }

        // A digit that occurs in every placeable combination must land in
        // the cage, so cells seeing all of its possible homes lose it.
        // Solved cage cells count as homes too.
        for v in forced.values() {
            let mut outside = self.area.complement();
            for cell in self.area.iter() {
                if board.get(cell).can_contain(v) {
                    outside = outside.and(&board.exclusion_area(cell));
                }
            }
            for cell in outside.iter() {
                board.remove_option(cell, v)?;
            }
        }

        for cell in open.iter() {
            let digits = board.get(cell);
            for v in digits.values() {
                if !self.is_value_placeable(board, cell, v, &placeable) {
                    board.remove_option(cell, v)?;
                }
            }
        }

        Ok(vec![Rc::new(self.clone())])
    }
}

/// One strategy per sum area whose cells all see each other; combinations
/// with repeated digits are impossible there, so the cached subset table
/// applies directly.
pub fn killer_cage_strategies(board: &Board) -> Vec<Rc<dyn Strategy>> {
    let table = sum_masks(board.alphabet());
    board
        .facts()
        .all::<SumAreaFact>()
        .iter()
        .filter(|f| board.is_unique_area(&f.area))
        .map(|f| {
            let masks: Vec<DigitSet> = table
                .get(&f.sum)
                .map(|ms| {
                    ms.iter()
                        .copied()
                        .filter(|m| m.count() as usize == f.area.len())
                        .collect()
                })
                .unwrap_or_default();
            Rc::new(KillerCageStrategy::new(f.area.clone(), masks)) as Rc<dyn Strategy>
        })
        .collect()
}
