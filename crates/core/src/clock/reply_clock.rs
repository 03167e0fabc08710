use std::collections::HashMap;
use uuid::Uuid;

use crate::types::ROOT_ITEM;

/// Age of a reply parent as seen by the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyAge {
    /// Parent is the root sentinel: no delay required.
    Root,
    /// Parent has not been recorded yet: the reply must wait.
    Unrecorded,
    Elapsed(u64),
}

impl ReplyAge {
    /// True when a reply may be shown after `min_delay` ticks.
    pub fn allows(self, min_delay: u64) -> bool {
        match self {
            Self::Root => true,
            Self::Unrecorded => false,
            Self::Elapsed(ticks) => ticks >= min_delay,
        }
    }
}

/// Ledger of the tick at which each dialogue item was shown.
#[derive(Debug)]
pub struct ReplyClock {
    ledger: HashMap<Uuid, u64>,
}

impl ReplyClock {
    pub fn new() -> Self {
        let mut ledger = HashMap::new();
        ledger.insert(ROOT_ITEM, 0);
        Self { ledger }
    }

    pub fn record(&mut self, item_id: Uuid, tick: u64) {
        if item_id == ROOT_ITEM {
            return;
        }
        self.ledger.insert(item_id, tick);
    }

    pub fn ticks_since(&self, item_id: Uuid, now: u64) -> ReplyAge {
        if item_id == ROOT_ITEM {
            return ReplyAge::Root;
        }
        match self.ledger.get(&item_id) {
            Some(&recorded) => ReplyAge::Elapsed(now.saturating_sub(recorded)),
            None => ReplyAge::Unrecorded,
        }
    }

    /// Clear everything except the root sentinel.
    pub fn reset(&mut self) {
        self.ledger.retain(|id, _| *id == ROOT_ITEM);
    }

    /// Entries including the root sentinel.
    pub fn len(&self) -> usize {
        self.ledger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.len() <= 1
    }
}

impl Default for ReplyClock {
    fn default() -> Self {
        Self::new()
    }
}
