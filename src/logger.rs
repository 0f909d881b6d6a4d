use crate::area::CellLoc;
use crate::core::DigitSet;

/// Diagnostic side channel. The board reports every candidate-set narrowing
/// through it, and the scheduler brackets strategy/chain work with named
/// contexts. It is observability only: nothing in the solving contract
/// depends on it, and speculative clones always run with it detached.
pub trait Logger {
    fn update_cell(&mut self, cell: CellLoc, old: DigitSet, new: DigitSet);
    fn enter(&mut self, context: &str);
    fn exit(&mut self);
}

/// Routes cell updates to the `log` facade at debug level, with the current
/// context path as a prefix.
#[derive(Debug, Default)]
pub struct DebugLogger {
    context: Vec<String>,
}

impl DebugLogger {
    pub fn new() -> Self {
        Self::default()
    }

    fn path(&self) -> String {
        self.context.join("/")
    }
}

impl Logger for DebugLogger {
    fn update_cell(&mut self, cell: CellLoc, old: DigitSet, new: DigitSet) {
        if old == new {
            return;
        }
        if let Some(v) = new.single() {
            log::debug!("[{}] solved cell {} to {}", self.path(), cell, v);
        } else {
            log::debug!(
                "[{}] removed candidates {} from cell {}",
                self.path(),
                old.minus(new),
                cell
            );
        }
    }

    fn enter(&mut self, context: &str) {
        self.context.push(context.to_string());
    }

    fn exit(&mut self) {
        self.context.pop();
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    use super::*;

    /// Records every update as a line, for assertions on what propagation did.
    #[derive(Debug, Default)]
    pub struct CaptureLogger {
        pub context: Vec<String>,
        pub events: Vec<String>,
    }

    impl CaptureLogger {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Logger for CaptureLogger {
        fn update_cell(&mut self, cell: CellLoc, old: DigitSet, new: DigitSet) {
            self.events.push(format!("{}: {} -> {}", cell, old, new));
        }

        fn enter(&mut self, context: &str) {
            self.context.push(context.to_string());
        }

        fn exit(&mut self) {
            self.context.pop();
        }
    }
}
