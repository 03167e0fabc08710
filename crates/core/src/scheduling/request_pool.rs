use uuid::Uuid;

use crate::types::{ActorId, Request, RequestKind};

/// Ambient requests ordered by creation tick. Any eligible actor may take an
/// unbound request; a request with an initiator waits for that actor.
/// Expired entries are dropped lazily on access.
#[derive(Debug)]
pub struct RequestPool {
    entries: Vec<Request>,
    expiry_ticks: u64,
}

impl RequestPool {
    pub fn new(expiry_ticks: u64) -> Self {
        Self { entries: Vec::new(), expiry_ticks }
    }

    /// Add a request created at `created_tick`, which may lie in the past for
    /// events the host reports late. Stays ordered by creation tick; equal
    /// ticks keep arrival order. Returns its id.
    pub fn add(
        &mut self,
        prompt_seed: impl Into<String>,
        initiator: Option<ActorId>,
        recipient: Option<ActorId>,
        created_tick: u64,
    ) -> Uuid {
        let request = Request::new(RequestKind::Pooled, prompt_seed, initiator, recipient, created_tick);
        let id = request.id;
        let at = self.entries.partition_point(|r| r.created_tick <= created_tick);
        self.entries.insert(at, request);
        id
    }

    /// Earliest live request, without removing it.
    pub fn peek(&mut self, tick: u64) -> Option<&Request> {
        self.purge_expired(tick);
        self.entries.first()
    }

    /// Remove and return the earliest request `actor` may serve, binding it
    /// as initiator. Endangered actors take nothing.
    pub fn take_for(&mut self, actor: ActorId, endangered: bool, tick: u64) -> Option<Request> {
        self.purge_expired(tick);
        if endangered {
            return None;
        }
        let at = self
            .entries
            .iter()
            .position(|r| r.initiator.is_none_or(|i| i == actor))?;
        let mut request = self.entries.remove(at);
        request.initiator = Some(actor);
        if request.recipient == Some(actor) {
            request.recipient = None;
        }
        Some(request)
    }

    /// Point a request at a different initiator, or unbind it.
    pub fn rebind(&mut self, request_id: Uuid, initiator: Option<ActorId>) -> bool {
        match self.entries.iter_mut().find(|r| r.id == request_id) {
            Some(request) => {
                request.initiator = initiator;
                true
            }
            None => false,
        }
    }

    /// Requests still bound to a specific initiator.
    pub fn bound(&self) -> impl Iterator<Item = &Request> {
        self.entries.iter().filter(|r| r.initiator.is_some())
    }

    /// Drop requests older than the expiry horizon. Returns how many.
    pub fn purge_expired(&mut self, tick: u64) -> usize {
        let before = self.entries.len();
        let horizon = self.expiry_ticks;
        self.entries.retain(|r| !r.is_expired(tick, horizon));
        let dropped = before - self.entries.len();
        if dropped > 0 {
            tracing::debug!(dropped, "expired pooled requests dropped");
        }
        dropped
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
