// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::time::{Duration, Instant};

use crate::TimerToken;

pub const CONFIRM_WINDOW: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub enum GateState<T> {
    Idle,
    AwaitingConfirm {
        target: T,
        token: TimerToken,
        deadline: Instant,
    },
}

/// Two-step delete confirmation. At most one target is pending; a new request replaces it.
#[derive(Debug, Clone)]
pub struct DeleteGate<T> {
    state: GateState<T>,
    last_token: TimerToken,
}

impl<T> Default for DeleteGate<T> {
    fn default() -> Self {
        Self {
            state: GateState::Idle,
            last_token: TimerToken::default(),
        }
    }
}

impl<T> DeleteGate<T> {
    pub fn state(&self) -> &GateState<T> {
        &self.state
    }

    pub fn pending(&self) -> Option<&T> {
        match &self.state {
            GateState::Idle => None,
            GateState::AwaitingConfirm { target, .. } => Some(target),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, GateState::Idle)
    }

    /// Arms the gate for `target`, restarting the window. The returned token
    /// identifies the timer that may later call [`DeleteGate::expire`].
    pub fn request(&mut self, target: T, now: Instant) -> TimerToken {
        self.last_token = self.last_token.next();
        self.state = GateState::AwaitingConfirm {
            target,
            token: self.last_token,
            deadline: now + CONFIRM_WINDOW,
        };
        self.last_token
    }

    /// Hands back the target if the window is still open. The gate is idle afterwards.
    pub fn confirm(&mut self, now: Instant) -> Option<T> {
        match std::mem::replace(&mut self.state, GateState::Idle) {
            GateState::AwaitingConfirm {
                target, deadline, ..
            } if now < deadline => Some(target),
            _ => None,
        }
    }

    pub fn cancel(&mut self) -> Option<T> {
        match std::mem::replace(&mut self.state, GateState::Idle) {
            GateState::AwaitingConfirm { target, .. } => Some(target),
            GateState::Idle => None,
        }
    }

    /// Timer callback. Ignored unless `token` belongs to the current request.
    pub fn expire(&mut self, token: TimerToken) -> bool {
        match &self.state {
            GateState::AwaitingConfirm { token: current, .. } if *current == token => {
                self.state = GateState::Idle;
                true
            }
            _ => false,
        }
    }

    pub fn poll(&mut self, now: Instant) -> bool {
        match &self.state {
            GateState::AwaitingConfirm { deadline, .. } if now >= *deadline => {
                self.state = GateState::Idle;
                true
            }
            _ => false,
        }
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        match &self.state {
            GateState::Idle => None,
            GateState::AwaitingConfirm { deadline, .. } => {
                Some(deadline.saturating_duration_since(now))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CONFIRM_WINDOW, DeleteGate};
    use std::time::{Duration, Instant};

    #[test]
    fn confirm_inside_window_returns_target() {
        let start = Instant::now();
        let mut gate = DeleteGate::default();
        gate.request("row-1", start);

        assert_eq!(gate.confirm(start + Duration::from_secs(9)), Some("row-1"));
        assert!(gate.is_idle());
    }

    #[test]
    fn confirm_after_deadline_returns_nothing() {
        let start = Instant::now();
        let mut gate = DeleteGate::default();
        gate.request("row-1", start);

        assert_eq!(gate.confirm(start + CONFIRM_WINDOW), None);
        assert!(gate.is_idle());
    }

    #[test]
    fn new_request_replaces_target_and_restarts_window() {
        let start = Instant::now();
        let mut gate = DeleteGate::default();
        let first = gate.request("row-1", start);
        let later = start + Duration::from_secs(8);
        let second = gate.request("row-2", later);

        assert_ne!(first, second);
        assert!(!gate.expire(first), "stale timer must not cancel the new target");
        assert_eq!(gate.pending(), Some(&"row-2"));
        assert_eq!(
            gate.remaining(later + Duration::from_secs(3)),
            Some(Duration::from_secs(7))
        );
        assert_eq!(gate.confirm(later + Duration::from_secs(3)), Some("row-2"));
    }

    #[test]
    fn expire_and_poll_return_to_idle() {
        let start = Instant::now();
        let mut gate = DeleteGate::default();
        let token = gate.request(1, start);
        assert!(gate.expire(token));
        assert!(gate.is_idle());

        gate.request(2, start);
        assert!(!gate.poll(start + Duration::from_secs(1)));
        assert!(gate.poll(start + CONFIRM_WINDOW));
        assert_eq!(gate.pending(), None);
    }

    #[test]
    fn cancel_clears_pending_target() {
        let mut gate = DeleteGate::default();
        gate.request('a', Instant::now());
        assert_eq!(gate.cancel(), Some('a'));
        assert_eq!(gate.cancel(), None);
    }
}
