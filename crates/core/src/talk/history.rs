use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::types::{ActorId, Request, RequestKind};

/// Outcome of one generation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Completed { provider: String, token_count: u32, lines: usize },
    Failed { reason: String },
    /// Generation was skipped by the dedup guard, `times` passes in a row.
    Skipped { times: u32 },
    /// Result arrived after a session reset, or the actor left.
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestRecord {
    pub request_id: Uuid,
    pub actor: ActorId,
    pub actor_name: String,
    pub prompt_seed: String,
    pub kind: RequestKind,
    pub created_tick: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RequestStatus,
}

impl RequestRecord {
    pub fn new(request: &Request, actor: ActorId, actor_name: &str, status: RequestStatus) -> Self {
        let now = Utc::now();
        let finished_at = (status != RequestStatus::Pending).then_some(now);
        Self {
            request_id: request.id,
            actor,
            actor_name: actor_name.to_owned(),
            prompt_seed: request.prompt_seed.clone(),
            kind: request.kind,
            created_tick: request.created_tick,
            started_at: now,
            finished_at,
            status,
        }
    }
}

/// Bounded request history, newest last. Oldest records fall off the front.
#[derive(Debug)]
pub struct RequestLog {
    records: VecDeque<RequestRecord>,
    cap: usize,
}

impl RequestLog {
    pub fn new(cap: usize) -> Self {
        Self { records: VecDeque::with_capacity(cap.min(1024)), cap }
    }

    pub fn push(&mut self, record: RequestRecord) {
        if self.cap == 0 {
            return;
        }
        while self.records.len() >= self.cap {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Record a dedup skip. Consecutive skips by the same actor fold into
    /// that actor's latest record instead of taking new slots.
    pub fn note_skip(&mut self, record: RequestRecord) {
        let latest = self.records.iter_mut().rev().find(|r| r.actor == record.actor);
        if let Some(RequestRecord { status: RequestStatus::Skipped { times }, finished_at, .. }) = latest {
            *times += 1;
            *finished_at = Some(Utc::now());
            return;
        }
        self.push(record);
    }

    /// Settle a pending record. Returns false if it already fell off.
    pub fn finish(&mut self, request_id: Uuid, status: RequestStatus) -> bool {
        let Some(record) = self.records.iter_mut().rev().find(|r| r.request_id == request_id) else {
            return false;
        };
        record.status = status;
        record.finished_at = Some(Utc::now());
        true
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &RequestRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
