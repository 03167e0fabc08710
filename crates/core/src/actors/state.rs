use std::collections::VecDeque;

use serde::Serialize;

use crate::types::{ActorId, ActorStatus, DialogueItem, Request};

/// A dialogue item waiting in an actor's output queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedLine {
    pub item: DialogueItem,
    pub queued_tick: u64,
}

/// Per-actor scheduling state, owned by the core.
#[derive(Debug)]
pub struct ActorState {
    pub id: ActorId,
    pub display_name: String,
    /// Copied from the host on every refresh; the scheduler only reads it.
    pub initiation_weight: f32,
    /// Earliest tick at which this actor may be selected again.
    pub cooldown_deadline: u64,
    pub output_queue: VecDeque<QueuedLine>,
    /// Bound request waiting to be served.
    pub pending_request: Option<Request>,
    pub last_status_signature: Option<String>,
    pub reject_count: u32,
    /// Request whose provider call is unresolved. `Some` means generating.
    in_flight: Option<Request>,
    awake: bool,
    resting: bool,
    incapacitated: bool,
    endangered: bool,
}

impl ActorState {
    pub fn new(status: &ActorStatus) -> Self {
        let mut state = Self {
            id: status.id,
            display_name: String::new(),
            initiation_weight: 0.0,
            cooldown_deadline: 0,
            output_queue: VecDeque::new(),
            pending_request: None,
            last_status_signature: None,
            reject_count: 0,
            in_flight: None,
            awake: false,
            resting: false,
            incapacitated: false,
            endangered: false,
        };
        state.sync(status);
        state
    }

    /// Pull name, weight and condition flags from a fresh host snapshot.
    pub fn sync(&mut self, status: &ActorStatus) {
        self.display_name.clone_from(&status.display_name);
        self.initiation_weight = status.initiation_weight;
        self.awake = status.awake;
        self.resting = status.resting;
        self.incapacitated = status.incapacitated;
        self.endangered = status.endangered;
    }

    pub fn is_generating(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight(&self) -> Option<&Request> {
        self.in_flight.as_ref()
    }

    pub fn is_endangered(&self) -> bool {
        self.endangered
    }

    /// Awake, not resting, not incapacitated (as of the last refresh).
    pub fn is_able(&self) -> bool {
        self.awake && !self.resting && !self.incapacitated
    }

    /// Idle → Eligible: able, not generating, positive weight, empty queue,
    /// cooldown elapsed.
    pub fn can_generate(&self, tick: u64) -> bool {
        self.is_able()
            && !self.is_generating()
            && self.initiation_weight > 0.0
            && self.output_queue.is_empty()
            && tick >= self.cooldown_deadline
    }

    /// Eligible → Generating. Returns false if already generating.
    pub fn begin_generation(&mut self, request: Request) -> bool {
        if self.is_generating() {
            return false;
        }
        self.in_flight = Some(request);
        true
    }

    /// Generating → Idle/Parsed. Returns the request that was in flight.
    pub fn finish_generation(&mut self) -> Option<Request> {
        self.in_flight.take()
    }

    /// Dedup guard. Returns true when generation should be skipped because
    /// `signature` is unchanged and fewer than `threshold` consecutive
    /// unchanged sightings have been seen.
    pub fn should_skip_unchanged(&mut self, signature: &str, threshold: u32) -> bool {
        if self.last_status_signature.as_deref() == Some(signature) {
            self.reject_count += 1;
            if self.reject_count < threshold {
                return true;
            }
        }
        self.reject_count = 0;
        self.last_status_signature = Some(signature.to_owned());
        false
    }

    /// Displaying → Idle.
    pub fn start_cooldown(&mut self, tick: u64, cooldown_ticks: u64) {
        self.cooldown_deadline = tick.saturating_add(cooldown_ticks);
    }

    pub fn enqueue(&mut self, item: DialogueItem, tick: u64) {
        self.output_queue.push_back(QueuedLine { item, queued_tick: tick });
    }

    pub fn snapshot(&self, tick: u64) -> ActorSnapshot {
        ActorSnapshot {
            id: self.id,
            display_name: self.display_name.clone(),
            initiation_weight: self.initiation_weight,
            cooldown_remaining: self.cooldown_deadline.saturating_sub(tick),
            generating: self.is_generating(),
            queued_lines: self.output_queue.len(),
            has_pending_request: self.pending_request.is_some(),
            reject_count: self.reject_count,
        }
    }
}

/// Read-only view of an actor's state for the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActorSnapshot {
    pub id: ActorId,
    pub display_name: String,
    pub initiation_weight: f32,
    pub cooldown_remaining: u64,
    pub generating: bool,
    pub queued_lines: usize,
    pub has_pending_request: bool,
    pub reject_count: u32,
}
