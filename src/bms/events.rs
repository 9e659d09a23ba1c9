//! Bounded diagnostic log of BMS events.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::threshold::BmsState;
use super::{FaultKind, Trigger};

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BmsEventKind {
    StateChanged { from: BmsState, to: BmsState },
    /// A trigger escalated to `level` (warning or protective).
    TriggerRaised { trigger: Trigger, level: BmsState },
    /// A trigger latch released down to `level`.
    TriggerCleared { trigger: Trigger, level: BmsState },
    FaultDetected { fault: FaultKind },
    BalancingStarted { spread: f64 },
    BalancingFinished { spread: f64, converged: bool },
    ResetAccepted,
    ResetRefused { violations: Vec<Trigger> },
    ReplacementRecommended { state_of_health: f64 },
}

/// One logged event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BmsEvent {
    /// Pack tick the event was raised on.
    pub tick: u64,
    #[serde(flatten)]
    pub kind: BmsEventKind,
}

/// Ring buffer that drops the oldest event when full.
#[derive(Debug, Clone)]
pub struct EventLog {
    events: VecDeque<BmsEvent>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Records `kind` and mirrors it to `tracing`.
    pub fn push(&mut self, tick: u64, kind: BmsEventKind) {
        trace_event(tick, &kind);
        if self.capacity == 0 {
            return;
        }
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(BmsEvent { tick, kind });
    }

    pub fn iter(&self) -> impl Iterator<Item = &BmsEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

fn trace_event(tick: u64, kind: &BmsEventKind) {
    match kind {
        BmsEventKind::StateChanged { from, to } => {
            if *to == BmsState::Fault {
                error!(tick, %from, %to, "bms state changed");
            } else {
                info!(tick, %from, %to, "bms state changed");
            }
        }
        BmsEventKind::TriggerRaised { trigger, level } => {
            warn!(tick, ?trigger, %level, "bms trigger raised");
        }
        BmsEventKind::TriggerCleared { trigger, level } => {
            debug!(tick, ?trigger, %level, "bms trigger cleared");
        }
        BmsEventKind::FaultDetected { fault } => error!(tick, ?fault, "bms fault detected"),
        BmsEventKind::BalancingStarted { spread } => {
            info!(tick, spread, "balancing started");
        }
        BmsEventKind::BalancingFinished { spread, converged } => {
            info!(tick, spread, converged, "balancing finished");
        }
        BmsEventKind::ResetAccepted => info!(tick, "bms reset accepted"),
        BmsEventKind::ResetRefused { violations } => {
            warn!(tick, ?violations, "bms reset refused");
        }
        BmsEventKind::ReplacementRecommended { state_of_health } => {
            warn!(tick, state_of_health, "battery replacement recommended");
        }
    }
}
