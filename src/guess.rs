use std::rc::Rc;
use crate::area::CellLoc;
use crate::board::Board;
use crate::core::{Cancellation, SolveError};
use crate::strategy::{Scheduler, Strategy};

/// Picks the cell to branch on and the order in which to try its
/// candidates. Must return an unsolved cell whenever one exists.
pub trait GuessSelector {
    fn select(&self, board: &Board) -> Option<(CellLoc, Vec<u8>)>;
}

/// Most-constrained-variable heuristic: the unsolved cell with the fewest
/// remaining candidates, candidates in ascending order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FewestCandidates;

impl GuessSelector for FewestCandidates {
    fn select(&self, board: &Board) -> Option<(CellLoc, Vec<u8>)> {
        let mut best: Option<(CellLoc, u32)> = None;
        for cell in board.solved_area().complement().iter() {
            let count = board.get(cell).count();
            if count <= 1 {
                continue;
            }
            if best.map_or(true, |(_, b)| count < b) {
                best = Some((cell, count));
            }
        }
        best.map(|(cell, _)| (cell, board.get(cell).values().collect()))
    }
}

/// Branches on a uniformly random undetermined cell. Changes the order of
/// enumeration, never the set of solutions.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCell;

impl GuessSelector for RandomCell {
    fn select(&self, board: &Board) -> Option<(CellLoc, Vec<u8>)> {
        let mut open = board.solved_area().complement();
        for cell in open.clone().iter() {
            if board.get(cell).count() <= 1 {
                open.remove(cell);
            }
        }
        let cell = open.random_member(&mut rand::rng())?;
        Some((cell, board.get(cell).values().collect()))
    }
}

/// Full backtracking search wrapping a scheduler: propagate to a stall,
/// branch via the selector, recurse on clones. Produces a lazy, finite,
/// non-restartable sequence of complete solutions; dropping the iterator
/// early is the cooperative way to stop the search.
pub struct Guesser {
    scheduler: Scheduler,
    selector: Box<dyn GuessSelector>,
}

impl Guesser {
    pub fn new(scheduler: Scheduler) -> Self {
        Guesser { scheduler, selector: Box::new(FewestCandidates) }
    }

    pub fn with_selector(scheduler: Scheduler, selector: Box<dyn GuessSelector>) -> Self {
        Guesser { scheduler, selector }
    }

    pub fn solutions(&self, board: Board, cancel: Cancellation) -> Solutions<'_> {
        Solutions {
            guesser: self,
            cancel,
            root: Some(board),
            pending: None,
            stack: Vec::new(),
            done: false,
        }
    }
}

/// One open branch point: the board at this level plus which candidate of
/// the chosen cell is currently being explored underneath it.
struct Frame {
    board: Board,
    strategies: Vec<Rc<dyn Strategy>>,
    cell: CellLoc,
    values: Vec<u8>,
    next_value: usize,
    /// Solutions yielded anywhere below this frame. A finished child frame
    /// with zero of these proves its candidate wrong, and that candidate is
    /// then removed from this frame's own board: a deduction salvaged from
    /// a failed branch.
    subtree_yields: usize,
}

pub struct Solutions<'a> {
    guesser: &'a Guesser,
    cancel: Cancellation,
    root: Option<Board>,
    pending: Option<Board>,
    stack: Vec<Frame>,
    done: bool,
}

impl Solutions<'_> {
    fn start(&mut self) {
        let mut board = self.root.take().expect("solutions started twice");
        let strategies = self.guesser.scheduler.create_strategies(&board);
        match self.guesser.scheduler.solve_to_stall(&mut board, strategies, &self.cancel) {
            Err(_) => self.done = true,
            Ok(strategies) => {
                if board.is_solved() {
                    self.pending = Some(board);
                } else if !self.push_frame(board, strategies) {
                    self.done = true;
                }
            }
        }
    }

    fn push_frame(&mut self, mut board: Board, strategies: Vec<Rc<dyn Strategy>>) -> bool {
        board.stats_mut().guesser_runs += 1;
        board.detach_logger();
        match self.guesser.selector.select(&board) {
            Some((cell, values)) => {
                self.stack.push(Frame {
                    board,
                    strategies,
                    cell,
                    values,
                    next_value: 0,
                    subtree_yields: 0,
                });
                true
            }
            None => false,
        }
    }

    /// Pops the exhausted top frame, reporting its outcome to the parent.
    fn retire_top(&mut self) {
        let finished = self.stack.pop().expect("no frame to retire");
        if let Some(parent) = self.stack.last_mut() {
            if finished.subtree_yields == 0 {
                parent.board.stats_mut().guess_misses += 1;
                let value = parent.values[parent.next_value];
                let _ = parent.board.remove_option(parent.cell, value);
            }
            parent.subtree_yields += finished.subtree_yields;
            parent.next_value += 1;
        }
    }
}

impl Iterator for Solutions<'_> {
    type Item = Board;

    fn next(&mut self) -> Option<Board> {
        if self.done {
            return None;
        }
        if let Some(board) = self.root.take() {
            self.root = Some(board);
            self.start();
            if self.done {
                return None;
            }
        }
        if let Some(board) = self.pending.take() {
            self.done = true;
            return Some(board);
        }
        loop {
            if self.cancel.is_cancelled() {
                self.done = true;
                return None;
            }
            let frame = match self.stack.last() {
                None => {
                    self.done = true;
                    return None;
                }
                Some(f) => f,
            };
            if frame.next_value >= frame.values.len() {
                self.retire_top();
                continue;
            }
            let cell = frame.cell;
            let value = frame.values[frame.next_value];
            let mut clone = frame.board.clone();
            if clone.set(cell, value).is_err() || clone.validate().is_err() {
                self.stack.last_mut().unwrap().next_value += 1;
                continue;
            }
            let strategies = frame.strategies.clone();
            match self.guesser.scheduler.solve_to_stall(&mut clone, strategies, &self.cancel) {
                Err(SolveError::Cancelled) => {
                    self.done = true;
                    return None;
                }
                Err(_) => {
                    // Contradiction somewhere down the line; the branch is
                    // dead but nothing is learned beyond that.
                    self.stack.last_mut().unwrap().next_value += 1;
                }
                Ok(strategies) => {
                    if clone.is_solved() {
                        let top = self.stack.last_mut().unwrap();
                        top.subtree_yields += 1;
                        top.next_value += 1;
                        return Some(clone);
                    }
                    if !self.push_frame(clone, strategies) {
                        // Unsolved but nothing left to branch on: dead end.
                        self.stack.last_mut().unwrap().next_value += 1;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::board::test_util::digit_rows;
    use crate::rule::BoardBuilder;
    use crate::unique::{ClassicRules, GivenDigits};
    use vec_box::vec_box;

    fn four_board(rows: &[&str]) -> Board {
        let mut builder = BoardBuilder::new(4, (2, 2));
        builder
            .apply_all(vec_box![ClassicRules, GivenDigits::from_rows(rows)])
            .unwrap();
        let mut board = builder.build().unwrap();
        board.set_chain_limit(0);
        board
    }

    #[test]
    fn test_fewest_candidates_selector() {
        let mut builder = BoardBuilder::new(9, (3, 3));
        builder.apply(&ClassicRules).unwrap();
        let mut board = builder.build().unwrap();
        board.mask(CellLoc::new(4, 4), crate::core::DigitSet::of(&[2, 7])).unwrap();
        let (cell, values) = FewestCandidates.select(&board).unwrap();
        assert_eq!(cell, CellLoc::new(4, 4));
        assert_eq!(values, vec![2, 7]);
    }

    #[test]
    fn test_random_cell_selector_returns_unsolved() {
        let board = four_board(&["12..", "", "", ""]);
        for _ in 0..8 {
            let (cell, values) = RandomCell.select(&board).unwrap();
            assert!(board.get(cell).count() > 1);
            assert_eq!(values, board.get(cell).values().collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_selector_empty_on_solved_board() {
        let board = four_board(&["1234", "3412", "2143", "4321"]);
        assert!(board.is_solved());
        assert!(FewestCandidates.select(&board).is_none());
    }

    #[test]
    fn test_already_solved_board_yields_once() {
        let board = four_board(&["1234", "3412", "2143", "4321"]);
        let guesser = Guesser::new(Scheduler::new());
        let mut solutions = guesser.solutions(board, Cancellation::none());
        assert!(solutions.next().unwrap().is_solved());
        assert!(solutions.next().is_none());
    }

    #[test]
    fn test_enumerates_all_solutions_of_open_grid() {
        // An empty 4x4 grid with classic rules has exactly 288 solutions.
        let board = four_board(&[]);
        let guesser = Guesser::new(Scheduler::new());
        let mut count = 0;
        for solution in guesser.solutions(board, Cancellation::none()) {
            assert!(solution.is_solved());
            assert!(solution.validate().is_ok());
            count += 1;
        }
        assert_eq!(count, 288);
    }

    #[test]
    fn test_unique_puzzle_single_yield() {
        let board = four_board(&["...4", "3...", "2...", "...1"]);
        let guesser = Guesser::new(Scheduler::new());
        let solutions: Vec<Board> = guesser.solutions(board, Cancellation::none()).collect();
        assert_eq!(solutions.len(), 1);
        assert_eq!(digit_rows(&solutions[0]), vec!["1234", "3412", "2143", "4321"]);
    }

    #[test]
    fn test_early_stop_is_cooperative() {
        let board = four_board(&[]);
        let guesser = Guesser::new(Scheduler::new());
        let mut solutions = guesser.solutions(board, Cancellation::none());
        let first = solutions.next().unwrap();
        assert!(first.is_solved());
        drop(solutions);
    }

    #[test]
    fn test_cancelled_search_yields_nothing() {
        let cancel = Cancellation::none();
        cancel.cancel();
        let board = four_board(&[]);
        let guesser = Guesser::new(Scheduler::new());
        let mut solutions = guesser.solutions(board, cancel);
        assert!(solutions.next().is_none());
    }

    // A 21-given puzzle with a unique solution that no amount of set or
    // intersection work cracks: branches stay locally consistent for a
    // long while and only global search sorts them out.
    const HARD_21: [&str; 9] = [
        "8........",
        "..36.....",
        ".7..9.2..",
        ".5...7...",
        "....457..",
        "...1...3.",
        "..1....68",
        "..85...1.",
        ".9....4..",
    ];

    const HARD_21_SOLUTION: [&str; 9] = [
        "812753649",
        "943682175",
        "675491283",
        "154237896",
        "369845721",
        "287169534",
        "521974368",
        "438526917",
        "796318452",
    ];

    fn hard_board() -> Board {
        let mut builder = BoardBuilder::new(9, (3, 3));
        builder
            .apply_all(vec_box![ClassicRules, GivenDigits::from_rows(&HARD_21)])
            .unwrap();
        let mut board = builder.build().unwrap();
        board.set_chain_limit(0);
        board
    }

    #[test]
    fn test_backtracking_puzzle_stalls_without_guessing() {
        // No strategies, no chains: propagation runs dry almost at once.
        let mut board = hard_board();
        Scheduler::new().solve(&mut board, &Cancellation::none()).unwrap();
        assert!(!board.is_solved());

        // The full deductive strategy set does not crack it either.
        let mut board = hard_board();
        let mut scheduler = Scheduler::new();
        scheduler.use_factory(Box::new(
            crate::unique::unique_set_strategies as fn(&Board) -> Vec<Rc<dyn Strategy>>,
        ));
        scheduler.use_factory(Box::new(
            crate::unique::unique_intersection_strategies as fn(&Board) -> Vec<Rc<dyn Strategy>>,
        ));
        scheduler.solve(&mut board, &Cancellation::none()).unwrap();
        assert!(!board.is_solved());
    }

    #[test]
    fn test_backtracking_puzzle_solved_by_guesser() {
        let guesser = Guesser::new(Scheduler::new());
        let solutions: Vec<Board> =
            guesser.solutions(hard_board(), Cancellation::none()).collect();
        assert_eq!(solutions.len(), 1);
        assert_eq!(digit_rows(&solutions[0]), HARD_21_SOLUTION.to_vec());
        let stats = solutions[0].stats();
        assert!(stats.guesser_runs > 0);
        assert!(stats.cell_updates > 0);
    }

    #[test]
    fn test_contradictory_board_yields_nothing() {
        // Squeeze a whole row into two digits behind propagation's back;
        // only validation can see that, and it kills the search up front.
        let mut builder = BoardBuilder::new(4, (2, 2));
        builder.apply(&ClassicRules).unwrap();
        let mut board = builder.build().unwrap();
        for col in 0..4 {
            board.mask(CellLoc::new(1, col), crate::core::DigitSet::of(&[3, 4])).unwrap();
        }
        assert!(board.validate().is_err());
        let guesser = Guesser::new(Scheduler::new());
        let count = guesser.solutions(board, Cancellation::none()).count();
        assert_eq!(count, 0);
    }
}
