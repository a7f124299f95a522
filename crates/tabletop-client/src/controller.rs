//! Reconnection state machine, free of I/O.
//!
//! The driver feeds transport events in and carries out the returned
//! [`Action`]s. Every transport attempt gets a generation number; events from
//! an older generation are ignored, so only one logical session is ever live.

use std::time::Duration;

use tabletop_types::events::ErrorCode;

use crate::backoff::Backoff;

/// Room code plus session token: everything needed to (re)open the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub code: String,
    pub token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    Open,
    /// Waiting out a backoff delay before the next attempt
    Backoff,
}

/// Notifications for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Connected,
    /// Fired once per disconnection episode
    ConnectionLost,
    Reconnecting { attempt: u32, delay: Duration },
    /// Retries are exhausted; fired once
    GaveUp,
    /// The server refused the credentials; no retry follows
    Rejected(ErrorCode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Open { generation: u64, target: Target },
    /// Tear down whatever transport is current
    Close,
    Schedule(Duration),
    CancelTimer,
    Notify(Status),
}

#[derive(Debug)]
pub struct Controller {
    backoff: Backoff,
    phase: Phase,
    target: Option<Target>,
    generation: u64,
    attempt: u32,
    lost_notified: bool,
}

impl Controller {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            backoff,
            phase: Phase::Idle,
            target: None,
            generation: 0,
            attempt: 0,
            lost_notified: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Whether outbound frames can go out right now. Frames sent otherwise
    /// are dropped by the caller.
    pub fn can_send(&self) -> bool {
        self.phase == Phase::Open
    }

    /// Start a new session, replacing any previous one.
    pub fn connect(&mut self, target: Target) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.phase != Phase::Idle {
            actions.push(Action::CancelTimer);
            actions.push(Action::Close);
        }
        self.target = Some(target.clone());
        self.attempt = 0;
        self.lost_notified = false;
        actions.push(self.open(target));
        actions
    }

    /// The user is leaving. Suppresses every retry.
    pub fn disconnect(&mut self) -> Vec<Action> {
        self.target = None;
        self.generation += 1;
        let was_idle = self.phase == Phase::Idle;
        self.phase = Phase::Idle;
        if was_idle {
            return Vec::new();
        }
        vec![Action::CancelTimer, Action::Close]
    }

    /// The server accepted the join.
    pub fn on_open(&mut self, generation: u64) -> Vec<Action> {
        if generation != self.generation || self.phase != Phase::Connecting {
            return Vec::new();
        }
        self.phase = Phase::Open;
        self.attempt = 0;
        self.lost_notified = false;
        vec![Action::Notify(Status::Connected)]
    }

    /// The transport closed or failed to open. `jitter` is added to the
    /// backoff delay if a retry is scheduled.
    pub fn on_close(&mut self, generation: u64, jitter: Duration) -> Vec<Action> {
        if generation != self.generation
            || !matches!(self.phase, Phase::Connecting | Phase::Open)
        {
            return Vec::new();
        }

        let mut actions = Vec::new();
        if !self.lost_notified {
            self.lost_notified = true;
            actions.push(Action::Notify(Status::ConnectionLost));
        }

        if self.attempt < self.backoff.max_attempts {
            let delay = self.backoff.delay(self.attempt, jitter);
            self.attempt += 1;
            self.phase = Phase::Backoff;
            actions.push(Action::Notify(Status::Reconnecting {
                attempt: self.attempt,
                delay,
            }));
            actions.push(Action::Schedule(delay));
        } else {
            self.phase = Phase::Idle;
            self.target = None;
            actions.push(Action::Notify(Status::GaveUp));
        }
        actions
    }

    /// The server answered with an authentication error. The same
    /// credentials will never succeed, so the session ends here.
    pub fn on_rejected(&mut self, generation: u64, code: ErrorCode) -> Vec<Action> {
        if generation != self.generation
            || !matches!(self.phase, Phase::Connecting | Phase::Open)
        {
            return Vec::new();
        }
        self.phase = Phase::Idle;
        self.target = None;
        self.generation += 1;
        vec![Action::Close, Action::Notify(Status::Rejected(code))]
    }

    /// The backoff timer fired.
    pub fn on_timer(&mut self) -> Vec<Action> {
        if self.phase != Phase::Backoff {
            return Vec::new();
        }
        match self.target.clone() {
            Some(target) => vec![self.open(target)],
            None => Vec::new(),
        }
    }

    fn open(&mut self, target: Target) -> Action {
        self.generation += 1;
        self.phase = Phase::Connecting;
        Action::Open {
            generation: self.generation,
            target,
        }
    }
}
