use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;
use std::sync::Arc;
use crate::area::{CellLoc, CellSet};
use crate::core::{DigitSet, SolveError, Stats};
use crate::logger::Logger;
use crate::rule::{ChangeProcessor, FactIndex, Restriction, SolveProcessor};

/// Immutable configuration produced by the builder and shared by every clone
/// of a board: geometry, the exclusion graph, registered restrictions and
/// hooks, and the typed fact index. Live candidate data never lives here.
pub struct BoardConfig {
    pub(crate) size: usize,
    pub(crate) box_shape: (usize, usize),
    pub(crate) exclusion: Vec<CellSet>,
    pub(crate) restrictions: Vec<Arc<dyn Restriction>>,
    pub(crate) solve_processors: Vec<Arc<dyn SolveProcessor>>,
    pub(crate) change_processors: Vec<Arc<dyn ChangeProcessor>>,
    pub(crate) facts: FactIndex,
    pub(crate) hook_limit: usize,
}

/// The live puzzle state: one candidate set per cell plus the derived
/// solved/changed/next-changed sets. Mutable only through the four
/// propagation primitives; cloning yields a fully independent value (the
/// `Arc` config is the only sharing, and it is immutable).
#[derive(Clone)]
pub struct Board {
    cfg: Arc<BoardConfig>,
    grid: Box<[DigitSet]>,
    solved: CellSet,
    changed: CellSet,
    next_changed: CellSet,
    stats: Stats,
    chain_limit: usize,
    hook_depth: usize,
    logger: Option<Rc<RefCell<dyn Logger>>>,
}

impl Board {
    pub(crate) fn new(cfg: Arc<BoardConfig>) -> Self {
        let size = cfg.size;
        let alphabet = size as u8;
        Board {
            grid: vec![DigitSet::all(alphabet); size * size].into_boxed_slice(),
            solved: CellSet::empty(size),
            changed: CellSet::empty(size),
            // Everything counts as "new information" for the first round.
            next_changed: CellSet::all(size),
            stats: Stats::default(),
            chain_limit: 2,
            hook_depth: 0,
            logger: None,
            cfg,
        }
    }

    pub fn size(&self) -> usize {
        self.cfg.size
    }

    pub fn box_shape(&self) -> (usize, usize) {
        self.cfg.box_shape
    }

    pub fn alphabet(&self) -> u8 {
        self.cfg.size as u8
    }

    pub fn all_cells(&self) -> CellSet {
        CellSet::all(self.cfg.size)
    }

    pub fn all_digits(&self) -> DigitSet {
        DigitSet::all(self.alphabet())
    }

    pub fn get(&self, l: CellLoc) -> DigitSet {
        self.grid[l.index(self.cfg.size)]
    }

    pub fn solved_area(&self) -> CellSet {
        self.solved.clone()
    }

    pub fn changed_area(&self) -> CellSet {
        self.changed.clone()
    }

    pub fn next_changed_area(&self) -> CellSet {
        self.next_changed.clone()
    }

    /// Cells that may never share this cell's value. Fixed once rules have
    /// been applied.
    pub fn exclusion_area(&self, l: CellLoc) -> CellSet {
        self.cfg.exclusion[l.index(self.cfg.size)].clone()
    }

    pub fn facts(&self) -> &FactIndex {
        &self.cfg.facts
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut Stats {
        &mut self.stats
    }

    pub fn chain_limit(&self) -> usize {
        self.chain_limit
    }

    pub fn set_chain_limit(&mut self, limit: usize) {
        self.chain_limit = limit;
    }

    pub fn set_logger(&mut self, logger: Rc<RefCell<dyn Logger>>) {
        self.logger = Some(logger);
    }

    pub(crate) fn detach_logger(&mut self) {
        self.logger = None;
    }

    pub fn is_solved(&self) -> bool {
        self.solved.len() == self.cfg.size * self.cfg.size
    }

    /// True if every pair of cells in `area` is connected in the exclusion
    /// graph, i.e. the area can hold each digit at most once.
    pub fn is_unique_area(&self, area: &CellSet) -> bool {
        area.iter().all(|l| {
            let peers = &self.cfg.exclusion[l.index(self.cfg.size)];
            area.iter().all(|o| o == l || peers.contains(o))
        })
    }

    /// Runs every registered restriction against the current state. Pure
    /// read-only check; the first failure is returned.
    pub fn validate(&self) -> Result<(), SolveError> {
        for r in &self.cfg.restrictions {
            r.validate(self)?;
        }
        Ok(())
    }

    fn check_value(&self, v: u8) -> Result<(), SolveError> {
        if v == 0 || v > self.alphabet() {
            Err(SolveError::ValueOutOfRange(v))
        } else {
            Ok(())
        }
    }

    /// Forces a cell to a single value. No-op if the cell is already forced
    /// to it; `InvalidAssignment` if the value has been ruled out.
    pub fn set(&mut self, l: CellLoc, v: u8) -> Result<(), SolveError> {
        self.check_value(v)?;
        let cell = self.get(l);
        if !cell.can_contain(v) {
            return Err(SolveError::InvalidAssignment(l, v));
        }
        if cell.count() > 1 {
            self.commit(l, cell, DigitSet::just(v))?;
            self.process_solve(l, v)?;
        }
        Ok(())
    }

    /// Intersects a cell's candidates with `allowed`. No-op when nothing
    /// would be removed; `EmptyCell` (with no visible state change) when the
    /// intersection is empty.
    pub fn mask(&mut self, l: CellLoc, allowed: DigitSet) -> Result<(), SolveError> {
        let cell = self.get(l);
        if cell.minus(allowed).is_empty() {
            return Ok(());
        }
        let new = cell.and(allowed);
        if new.is_empty() {
            return Err(SolveError::EmptyCell(l));
        }
        self.commit(l, cell, new)?;
        if let Some(v) = new.single() {
            self.process_solve(l, v)?;
        }
        Ok(())
    }

    /// Subtracts `forbidden` from a cell's candidates; symmetric to `mask`.
    pub fn remove_mask(&mut self, l: CellLoc, forbidden: DigitSet) -> Result<(), SolveError> {
        let cell = self.get(l);
        if cell.and(forbidden).is_empty() {
            return Ok(());
        }
        let new = cell.minus(forbidden);
        if new.is_empty() {
            return Err(SolveError::EmptyCell(l));
        }
        self.commit(l, cell, new)?;
        if let Some(v) = new.single() {
            self.process_solve(l, v)?;
        }
        Ok(())
    }

    pub fn remove_option(&mut self, l: CellLoc, v: u8) -> Result<(), SolveError> {
        self.check_value(v)?;
        self.remove_mask(l, DigitSet::just(v))
    }

    /// Runs `f` against a clone with the logger detached and the
    /// next-changed set zeroed, so nested exploration cannot pollute the
    /// caller's change tracking. Returns the clone for inspection.
    pub fn try_apply<F>(&self, f: F) -> Result<Board, SolveError>
    where
        F: FnOnce(&mut Board) -> Result<(), SolveError>,
    {
        let mut clone = self.clone_quiet();
        f(&mut clone)?;
        Ok(clone)
    }

    pub(crate) fn clone_quiet(&self) -> Board {
        let mut clone = self.clone();
        clone.logger = None;
        clone.next_changed.clear();
        clone
    }

    /// Starts a scheduler round: what accumulated since the last round
    /// becomes the current changed set.
    pub(crate) fn begin_round(&mut self) {
        self.changed = std::mem::replace(&mut self.next_changed, CellSet::empty(self.cfg.size));
    }

    /// The single change-notification path every mutation routes through.
    fn commit(&mut self, l: CellLoc, old: DigitSet, new: DigitSet) -> Result<(), SolveError> {
        self.next_changed.insert(l);
        self.stats.cell_updates += 1;
        self.grid[l.index(self.cfg.size)] = new;
        if let Some(logger) = &self.logger {
            logger.borrow_mut().update_cell(l, old, new);
        }
        self.process_change(l, new)
    }

    fn enter_hook(&mut self) -> Result<(), SolveError> {
        if self.hook_depth >= self.cfg.hook_limit {
            return Err(SolveError::PropagationDepth);
        }
        self.hook_depth += 1;
        Ok(())
    }

    fn process_change(&mut self, l: CellLoc, mask: DigitSet) -> Result<(), SolveError> {
        if self.cfg.change_processors.is_empty() {
            return Ok(());
        }
        self.enter_hook()?;
        let cfg = Arc::clone(&self.cfg);
        let mut result = Ok(());
        for cp in &cfg.change_processors {
            self.log_enter(cp.name());
            result = cp.process_change(self, l, mask);
            self.log_exit();
            if result.is_err() {
                break;
            }
        }
        self.hook_depth -= 1;
        result
    }

    /// Runs exactly once when a cell collapses to a single candidate:
    /// marks it solved and fires every solve processor in registration
    /// order. Processors may recursively mutate the board, re-entering this
    /// pipeline; the depth guard bounds that recursion.
    fn process_solve(&mut self, l: CellLoc, v: u8) -> Result<(), SolveError> {
        self.solved.insert(l);
        self.enter_hook()?;
        let cfg = Arc::clone(&self.cfg);
        let mut result = Ok(());
        for sp in &cfg.solve_processors {
            self.log_enter(sp.name());
            result = sp.process_solve(self, l, v);
            self.log_exit();
            if result.is_err() {
                break;
            }
        }
        self.hook_depth -= 1;
        result
    }

    pub(crate) fn log_enter(&self, context: &str) {
        if let Some(logger) = &self.logger {
            logger.borrow_mut().enter(context);
        }
    }

    pub(crate) fn log_exit(&self) {
        if let Some(logger) = &self.logger {
            logger.borrow_mut().exit();
        }
    }
}

impl Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..self.cfg.size {
            for col in 0..self.cfg.size {
                match self.get(CellLoc::new(row, col)).single() {
                    Some(v) => write!(f, "{:x}", v)?,
                    None => write!(f, ".")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    use super::*;

    /// Rows of forced digits, '.' for undecided cells.
    pub fn digit_rows(board: &Board) -> Vec<String> {
        (0..board.size())
            .map(|row| {
                (0..board.size())
                    .map(|col| match board.get(CellLoc::new(row, col)).single() {
                        Some(v) => char::from_digit(v as u32, 16).unwrap(),
                        None => '.',
                    })
                    .collect()
            })
            .collect()
    }

    /// Swallows the initial "everything changed" marker so tests can observe
    /// exactly the changes their own mutations produce.
    pub fn drain_changes(board: &mut Board) {
        board.begin_round();
        board.begin_round();
    }
}
