//! Role-keyed countdown timers
//!
//! The labs run on one cooperative thread, so timers are plain deadlines that
//! the owner polls with [`TimerQueue::pop_due`]. At most one timer per role is
//! live: arming a role cancels whatever was pending for it. Every arm hands out
//! a [`TimerToken`]; a host scheduler that fires callbacks itself can check
//! [`TimerQueue::is_live`] at callback entry so stale callbacks become no-ops.

use crate::types::Millis;
use serde::{Deserialize, Serialize};

/// Handle for one armed timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerToken<R> {
    pub role: R,
    pub generation: u64,
}

#[derive(Debug, Clone)]
struct PendingTimer<R> {
    role: R,
    generation: u64,
    due_at: Millis,
}

/// Pending timers, one per role
#[derive(Debug, Clone)]
pub struct TimerQueue<R> {
    pending: Vec<PendingTimer<R>>,
    next_generation: u64,
}

impl<R> Default for TimerQueue<R> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            next_generation: 0,
        }
    }
}

impl<R: Copy + PartialEq> TimerQueue<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `role` to fire at `due_at`, replacing any pending timer for that role
    pub fn arm(&mut self, role: R, due_at: Millis) -> TimerToken<R> {
        self.cancel(role);
        self.next_generation += 1;
        let generation = self.next_generation;
        self.pending.push(PendingTimer {
            role,
            generation,
            due_at,
        });
        TimerToken { role, generation }
    }

    /// Cancel the pending timer for `role`; returns whether one was pending
    pub fn cancel(&mut self, role: R) -> bool {
        let before = self.pending.len();
        self.pending.retain(|t| t.role != role);
        self.pending.len() != before
    }

    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }

    /// Whether `token` still refers to the pending timer for its role
    pub fn is_live(&self, token: &TimerToken<R>) -> bool {
        self.pending
            .iter()
            .any(|t| t.role == token.role && t.generation == token.generation)
    }

    pub fn is_armed(&self, role: R) -> bool {
        self.pending.iter().any(|t| t.role == role)
    }

    pub fn deadline(&self, role: R) -> Option<Millis> {
        self.pending.iter().find(|t| t.role == role).map(|t| t.due_at)
    }

    /// Remove and return the earliest timer due at or before `now`, with its
    /// deadline. Timers with equal deadlines fire in arming order.
    pub fn pop_due(&mut self, now: Millis) -> Option<(TimerToken<R>, Millis)> {
        let mut earliest: Option<usize> = None;
        for (i, timer) in self.pending.iter().enumerate() {
            if timer.due_at > now {
                continue;
            }
            let replace = match earliest {
                None => true,
                Some(j) => {
                    let current = &self.pending[j];
                    timer.due_at < current.due_at
                        || (timer.due_at == current.due_at && timer.generation < current.generation)
                }
            };
            if replace {
                earliest = Some(i);
            }
        }

        earliest.map(|i| {
            let timer = self.pending.remove(i);
            let token = TimerToken {
                role: timer.role,
                generation: timer.generation,
            };
            (token, timer.due_at)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Role {
        Recording,
        Trial,
    }

    #[test]
    fn test_rearming_cancels_previous() {
        let mut timers = TimerQueue::new();
        let first = timers.arm(Role::Trial, 1000.0);
        let second = timers.arm(Role::Trial, 2000.0);

        assert!(!timers.is_live(&first));
        assert!(timers.is_live(&second));
        assert_eq!(timers.pop_due(1500.0), None);
        assert_eq!(timers.pop_due(2000.0), Some((second, 2000.0)));
        assert!(timers.is_empty());
    }

    #[test]
    fn test_roles_are_independent() {
        let mut timers = TimerQueue::new();
        timers.arm(Role::Recording, 5000.0);
        timers.arm(Role::Trial, 1000.0);

        assert_eq!(timers.pop_due(6000.0).map(|(t, _)| t.role), Some(Role::Trial));
        assert_eq!(timers.pop_due(6000.0).map(|(t, _)| t.role), Some(Role::Recording));
        assert_eq!(timers.pop_due(6000.0), None);
    }

    #[test]
    fn test_cancel_all_silences_late_callbacks() {
        let mut timers = TimerQueue::new();
        let token = timers.arm(Role::Recording, 100.0);
        timers.cancel_all();

        assert!(!timers.is_live(&token));
        assert_eq!(timers.pop_due(f64::MAX), None);
    }

    #[test]
    fn test_cancel_reports_pending() {
        let mut timers = TimerQueue::new();
        timers.arm(Role::Trial, 10.0);

        assert_eq!(timers.deadline(Role::Trial), Some(10.0));
        assert!(timers.cancel(Role::Trial));
        assert!(!timers.cancel(Role::Trial));
        assert!(!timers.is_armed(Role::Trial));
    }
}
