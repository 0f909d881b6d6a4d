use std::fmt::Debug;
use std::rc::Rc;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::{Display, EnumCount};
use crate::area::CellSet;
use crate::board::Board;
use crate::core::{Cancellation, SolveError};

/// Cost tier of a deduction technique, ascending. Cheap tiers must exhaust
/// themselves before expensive ones get to run: direct eliminations
/// frequently make pattern searches and speculation unnecessary.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    Display, EnumCount, IntoPrimitive, TryFromPrimitive,
)]
#[repr(u8)]
pub enum Difficulty {
    Easy,
    Normal,
    Hard,
    Impossible,
}

/// One deduction technique together with its residual state (typically the
/// cells it still has to watch). `solve` consumes board state, may mutate
/// it through the propagation primitives, and returns its own
/// continuations: nothing to destroy the strategy, or one or more
/// replacements with narrower areas to split it.
pub trait Strategy: Debug {
    fn name(&self) -> &str;
    fn difficulty(&self) -> Difficulty;
    /// The cells this strategy cares about; it is only re-run when
    /// something in this set changed.
    fn area_filter(&self) -> CellSet;
    fn solve(&self, board: &mut Board) -> Result<Vec<Rc<dyn Strategy>>, SolveError>;
}

/// Creates the initial strategies for a board by scanning the facts its
/// rules published. Plain `fn(&Board) -> Vec<Rc<dyn Strategy>>` functions
/// are factories too.
pub trait StrategyFactory {
    fn strategies_for(&self, board: &Board) -> Vec<Rc<dyn Strategy>>;
}

impl<F> StrategyFactory for F
where
    F: Fn(&Board) -> Vec<Rc<dyn Strategy>>,
{
    fn strategies_for(&self, board: &Board) -> Vec<Rc<dyn Strategy>> {
        self(board)
    }
}

/// The full factory set shipped with the engine, cheapest first.
pub fn standard_factories() -> Vec<Box<dyn StrategyFactory>> {
    vec![
        Box::new(crate::unique::unique_set_strategies as fn(&Board) -> Vec<Rc<dyn Strategy>>),
        Box::new(crate::unique::unique_intersection_strategies as fn(&Board) -> Vec<Rc<dyn Strategy>>),
        Box::new(crate::cages::killer_cage_strategies as fn(&Board) -> Vec<Rc<dyn Strategy>>),
        Box::new(crate::unique::unique_exclusion_strategies as fn(&Board) -> Vec<Rc<dyn Strategy>>),
        Box::new(crate::unique::logic_chain_strategies as fn(&Board) -> Vec<Rc<dyn Strategy>>),
    ]
}

/// Runs strategies to a fixpoint in difficulty order, restricting work to
/// cells that changed since the last round, and falls back to the
/// exclusion chain when propagation stalls.
#[derive(Default)]
pub struct Scheduler {
    factories: Vec<Box<dyn StrategyFactory>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn standard() -> Self {
        Scheduler { factories: standard_factories() }
    }

    pub fn use_factory(&mut self, factory: Box<dyn StrategyFactory>) {
        self.factories.push(factory);
    }

    pub fn use_factories(&mut self, factories: Vec<Box<dyn StrategyFactory>>) {
        self.factories.extend(factories);
    }

    pub(crate) fn create_strategies(&self, board: &Board) -> Vec<Rc<dyn Strategy>> {
        let mut strategies: Vec<Rc<dyn Strategy>> = self
            .factories
            .iter()
            .flat_map(|f| f.strategies_for(board))
            .collect();
        strategies.sort_by_key(|s| s.difficulty());
        strategies
    }

    /// Solves as far as propagation and the chain budget allow, then runs
    /// every restriction once; a failure there is the terminal error.
    pub fn solve(&self, board: &mut Board, cancel: &Cancellation) -> Result<(), SolveError> {
        let strategies = self.create_strategies(board);
        self.solve_to_stall(board, strategies, cancel).map(|_| ())
    }

    pub(crate) fn solve_to_stall(
        &self,
        board: &mut Board,
        mut strategies: Vec<Rc<dyn Strategy>>,
        cancel: &Cancellation,
    ) -> Result<Vec<Rc<dyn Strategy>>, SolveError> {
        while !board.is_solved() {
            cancel.check()?;
            strategies = self.run_round(board, strategies)?;
            if board.next_changed_area().is_empty() && board.chain_limit() > 0 {
                board.stats_mut().chain_runs += 1;
                for levels in 1..=board.chain_limit() {
                    let area = board.solved_area().complement();
                    self.exclusion_chain(board, area, levels, cancel)?;
                    if !board.next_changed_area().is_empty() {
                        break;
                    }
                }
            }
            if board.next_changed_area().is_empty() {
                break;
            }
        }
        board.validate()?;
        Ok(strategies)
    }

    /// One scheduler round. The instant a cheaper strategy has produced new
    /// information, strategies of a higher tier are carried over untouched:
    /// cheap strategies always get first refusal on new information.
    fn run_round(
        &self,
        board: &mut Board,
        strategies: Vec<Rc<dyn Strategy>>,
    ) -> Result<Vec<Rc<dyn Strategy>>, SolveError> {
        board.begin_round();
        let changed = board.changed_area();
        let mut last_difficulty = Difficulty::Easy;
        let mut carried: Vec<Rc<dyn Strategy>> = Vec::with_capacity(strategies.len() * 2);
        for (n, strategy) in strategies.iter().enumerate() {
            if strategy.difficulty() > last_difficulty && !board.next_changed_area().is_empty() {
                carried.extend(strategies[n..].iter().cloned());
                break;
            }
            last_difficulty = strategy.difficulty();

            if strategy.area_filter().and(&changed).is_empty() {
                carried.push(Rc::clone(strategy));
                continue;
            }
            board.stats_mut().strategy_runs += 1;
            let updates_before = board.stats().cell_updates;
            board.log_enter(strategy.name());
            let continuations = strategy.solve(board);
            board.log_exit();
            let continuations = continuations?;
            if board.stats().cell_updates > updates_before {
                board.stats_mut().strategy_hits += 1;
            }
            carried.extend(continuations);
        }
        Ok(carried)
    }

    /// Bounded-depth lookahead: force each candidate of each undetermined
    /// cell on a clone, propagate `levels` deep, and validate. A failing
    /// branch proves the candidate impossible, so it is removed from the
    /// real board. Success proves nothing and changes nothing.
    pub(crate) fn exclusion_chain(
        &self,
        board: &mut Board,
        area: CellSet,
        levels: usize,
        cancel: &Cancellation,
    ) -> Result<(), SolveError> {
        board.log_enter("exclusion-chain");
        let result = self.chain_area(board, area, levels, true, cancel);
        board.log_exit();
        result
    }

    fn chain_area(
        &self,
        board: &mut Board,
        area: CellSet,
        levels: usize,
        top: bool,
        cancel: &Cancellation,
    ) -> Result<(), SolveError> {
        for cell in area.iter() {
            cancel.check()?;
            let digits = board.get(cell);
            for v in digits.values() {
                let mut clone = board.clone_quiet();
                let mut branch = clone.set(cell, v).err();
                if branch.is_none() {
                    branch = clone.validate().err();
                }
                if branch.is_none() && levels > 1 {
                    let sub = clone.next_changed_area().and(&clone.solved_area().complement());
                    branch = self.chain_area(&mut clone, sub, levels - 1, false, cancel).err();
                }
                match branch {
                    None => {}
                    Some(SolveError::Cancelled) => return Err(SolveError::Cancelled),
                    Some(_) => {
                        // Both branches failing means the live board is
                        // already contradictory; that error must surface.
                        board.remove_option(cell, v)?;
                    }
                }
            }
            // Progress found: let the cheaper strategies have the next
            // round before spending more time here.
            if top && !board.next_changed_area().is_empty() {
                return Ok(());
            }
        }
        Ok(())
    }
}
