//! The running token budget of one assembly call.

use thiserror::Error;
use tracing::warn;

/// A spend that would have taken the budget below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("requested {requested} tokens with only {available} remaining")]
pub struct Overdraw {
    pub requested: usize,
    pub available: usize,
}

/// Tokens still available for the prompt.
///
/// Every deduction is compared against the balance before it is made, so
/// the budget never goes below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    initial: usize,
    remaining: usize,
}

impl TokenBudget {
    /// Budget for a model window minus a fixed reserve for model and image
    /// overhead. A window smaller than the reserve leaves nothing.
    pub fn for_model(token_limit: usize, reserved: usize) -> Self {
        Self::new(token_limit.saturating_sub(reserved))
    }

    pub fn new(total: usize) -> Self {
        Self {
            initial: total,
            remaining: total,
        }
    }

    pub fn initial(&self) -> usize {
        self.initial
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn fits(&self, cost: usize) -> bool {
        cost <= self.remaining
    }

    /// Spend `cost` if it fits. On overdraw the budget is left untouched.
    pub fn try_spend(&mut self, cost: usize) -> Result<(), Overdraw> {
        if !self.fits(cost) {
            return Err(Overdraw {
                requested: cost,
                available: self.remaining,
            });
        }
        self.remaining -= cost;
        Ok(())
    }

    /// Reserve tokens for a section that is emitted regardless of cost.
    ///
    /// If the section does not fit, the budget is exhausted instead and the
    /// shortfall is returned.
    pub fn reserve(&mut self, section: &str, cost: usize) -> usize {
        match self.try_spend(cost) {
            Ok(()) => 0,
            Err(overdraw) => {
                let shortfall = overdraw.requested - overdraw.available;
                warn!(
                    section,
                    requested = overdraw.requested,
                    available = overdraw.available,
                    "Mandatory prompt section exceeds the token budget"
                );
                self.remaining = 0;
                shortfall
            }
        }
    }
}
