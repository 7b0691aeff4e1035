// Step budget and cooperative cancellation for the agent loop.
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::agent_engine::state::{LoopState, TaskOutcome};

pub struct LoopController {
    max_steps: u32,
    state: LoopState,
    cancel: CancellationToken,
}

impl LoopController {
    pub fn new(max_steps: u32, cancel: CancellationToken) -> Self {
        Self {
            max_steps,
            state: LoopState::Running { step: 1 },
            cancel,
        }
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    /// Returns the step to run next, or `None` once the loop is over.
    /// Observes cancellation and the step budget before every step.
    pub fn begin_step(&mut self) -> Option<u32> {
        let LoopState::Running { step } = self.state else {
            return None;
        };
        if self.cancel.is_cancelled() {
            tracing::info!(step, "cancellation observed");
            self.state = LoopState::Done(TaskOutcome::Stopped);
            return None;
        }
        if step > self.max_steps {
            tracing::warn!(max_steps = self.max_steps, "step budget exhausted");
            self.state = LoopState::Done(TaskOutcome::BudgetExhausted {
                max_steps: self.max_steps,
            });
            return None;
        }
        Some(step)
    }

    pub fn advance(&mut self) {
        if let LoopState::Running { step } = &mut self.state {
            *step += 1;
        }
    }

    pub fn finish(&mut self, outcome: TaskOutcome) {
        self.state = LoopState::Done(outcome);
    }

    /// Final outcome. A loop abandoned while still running counts as stopped.
    pub fn into_outcome(self) -> TaskOutcome {
        match self.state {
            LoopState::Done(outcome) => outcome,
            LoopState::Running { .. } => TaskOutcome::Stopped,
        }
    }

    /// Awaits `fut` unless cancellation fires first.
    pub async fn race<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            out = fut => Some(out),
        }
    }

    /// Sleeps for `delay`; false if interrupted by cancellation.
    pub async fn settle(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            return !self.cancel.is_cancelled();
        }
        self.race(tokio::time::sleep(delay)).await.is_some()
    }
}
