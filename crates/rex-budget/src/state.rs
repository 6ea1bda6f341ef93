use serde::{Deserialize, Serialize};

use crate::error::{BudgetError, BudgetResult};

/// Usage against the caps of one budget. `None` caps are unlimited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetState {
    pub children_used: u64,
    pub children_max: Option<u64>,
    pub tokens_used: u64,
    pub tokens_max: Option<u64>,
}

/// Outcome of a child reservation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub granted: u64,
    /// Headroom left after this reservation; `None` when unlimited.
    pub remaining: Option<u64>,
}

impl BudgetState {
    pub fn new(children_max: Option<u64>, tokens_max: Option<u64>) -> Self {
        Self {
            children_max,
            tokens_max,
            ..Self::default()
        }
    }

    pub fn children_remaining(&self) -> Option<u64> {
        self.children_max
            .map(|max| max.saturating_sub(self.children_used))
    }

    pub fn tokens_remaining(&self) -> Option<u64> {
        self.tokens_max.map(|max| max.saturating_sub(self.tokens_used))
    }

    /// Grant as much of `requested` as the cap allows.
    pub(crate) fn reserve_children(&mut self, requested: u64) -> Reservation {
        match self.children_remaining() {
            None => {
                self.children_used = self.children_used.saturating_add(requested);
                Reservation {
                    granted: requested,
                    remaining: None,
                }
            }
            Some(headroom) => {
                let granted = requested.min(headroom);
                self.children_used += granted;
                Reservation {
                    granted,
                    remaining: self.children_remaining(),
                }
            }
        }
    }

    /// Give back up to `count` reserved children.
    pub(crate) fn release_children(&mut self, count: u64) -> u64 {
        let released = count.min(self.children_used);
        self.children_used -= released;
        released
    }

    /// All-or-nothing token commit. A total that would overflow `u64` is
    /// rejected even when tokens are unlimited.
    pub(crate) fn add_tokens(&mut self, amount: u64) -> BudgetResult<u64> {
        let max = self.tokens_max.unwrap_or(u64::MAX);
        match self.tokens_used.checked_add(amount) {
            Some(next) if next <= max => {
                self.tokens_used = next;
                Ok(next)
            }
            _ => Err(BudgetError::BudgetExceeded {
                requested: amount,
                used: self.tokens_used,
                max,
            }),
        }
    }
}
