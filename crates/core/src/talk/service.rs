//! Talk orchestration.
//!
//! Per actor: Idle → Eligible → Generating → Parsed (queued) → Displaying →
//! Idle. `advance` is the only entry point the host drives. Each call drains
//! resolved provider calls, then runs the refresh, display and scheduling
//! passes that are due at the current tick. The provider call itself runs in
//! a spawned task holding the gateway's flight permit; its outcome comes back
//! over a channel tagged with the session generation.

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use murmur_llm::gateway::{AiGateway, Completion, GatewayError, WarningKind};
use murmur_llm::provider::{ChatMessage, CompletionRequest};

use super::history::{RequestLog, RequestRecord, RequestStatus};
use super::parse::parse_reply;
use super::{EventReceiver, EventSender};
use crate::actors::{ActorRegistry, ActorSnapshot};
use crate::clock::{ReplyClock, TickRate};
use crate::config::TalkCfg;
use crate::host::{Host, PromptSource};
use crate::scheduling::{RequestPool, Selector, nearby_eligible};
use crate::types::{
    ActorId, ActorStatus, DialogueItem, DialogueLine, Notice, ROOT_ITEM, Request, RequestKind, TalkEvent,
};

/// A resolved provider call on its way back to the service.
#[derive(Debug)]
struct Outcome {
    session: u64,
    actor: ActorId,
    request_id: Uuid,
    participants: Vec<ActorId>,
    result: Result<Completion, GatewayError>,
}

pub struct TalkService {
    cfg: TalkCfg,
    gateway: AiGateway,
    runtime: Handle,
    registry: ActorRegistry,
    pool: RequestPool,
    clock: ReplyClock,
    selector: Selector,
    history: RequestLog,
    /// Bumped by `reset`; outcomes tagged with an older value are dropped.
    session: u64,
    cancel: CancellationToken,
    in_flight: Option<JoinHandle<()>>,
    results_tx: mpsc::UnboundedSender<Outcome>,
    results_rx: mpsc::UnboundedReceiver<Outcome>,
    events: EventSender,
    refreshed: bool,
}

impl TalkService {
    /// Build the service and the channel the host reads lines and notices
    /// from. Provider calls are spawned onto `runtime`.
    pub fn new(cfg: TalkCfg, gateway: AiGateway, runtime: Handle) -> (Self, EventReceiver) {
        let (events, rx) = super::channel(cfg.output_buffer.max(1));
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let service = Self {
            pool: RequestPool::new(cfg.request_expiry_ticks),
            history: RequestLog::new(cfg.history_cap),
            cfg,
            gateway,
            runtime,
            registry: ActorRegistry::new(),
            clock: ReplyClock::new(),
            selector: Selector::new(),
            session: 0,
            cancel: CancellationToken::new(),
            in_flight: None,
            results_tx,
            results_rx,
            events,
            refreshed: false,
        };
        (service, rx)
    }

    /// Replace the selector, e.g. with a seeded one for reproducible runs.
    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    /// Step the service once for the host's current tick.
    pub fn advance(&mut self, host: &dyn Host, prompts: &dyn PromptSource) {
        let tick = host.current_tick();
        let rate = host.tick_rate();
        let _span = tracing::trace_span!("advance", tick).entered();

        self.drain_results(tick);

        if !self.refreshed || rate.is_due(tick, self.cfg.refresh_interval_secs) {
            self.refresh(host);
            self.refreshed = true;
        }
        if rate.is_due(tick, self.cfg.display_interval_secs) {
            self.display_pass(host, tick, rate);
        }
        if rate.is_due(tick, self.cfg.generation_interval_secs) {
            self.schedule_pass(host, prompts, tick);
        }
    }

    /// Queue an ambient request. With an initiator, only that actor may
    /// serve it.
    pub fn submit_ambient(
        &mut self,
        prompt_seed: impl Into<String>,
        initiator: Option<ActorId>,
        recipient: Option<ActorId>,
        created_tick: u64,
    ) -> Uuid {
        self.pool.add(prompt_seed, initiator, recipient, created_tick)
    }

    /// Give `actor` a bound request, replacing any it already had. Returns
    /// false for an unknown actor.
    pub fn submit_for(
        &mut self,
        actor: ActorId,
        prompt_seed: impl Into<String>,
        recipient: Option<ActorId>,
        created_tick: u64,
    ) -> bool {
        let Some(state) = self.registry.get_mut(actor) else {
            return false;
        };
        let request = Request::new(RequestKind::Bound, prompt_seed, Some(actor), recipient, created_tick);
        if let Some(old) = state.pending_request.replace(request) {
            tracing::debug!(actor = %actor, request = %old.id, "pending request replaced");
        }
        true
    }

    pub fn actor_snapshots(&self, tick: u64) -> Vec<ActorSnapshot> {
        self.registry.iter().map(|s| s.snapshot(tick)).collect()
    }

    /// Request history, oldest first.
    pub fn history(&self) -> impl DoubleEndedIterator<Item = &RequestRecord> {
        self.history.iter()
    }

    pub fn registry(&self) -> &ActorRegistry {
        &self.registry
    }

    pub fn pool(&self) -> &RequestPool {
        &self.pool
    }

    pub fn clock(&self) -> &ReplyClock {
        &self.clock
    }

    pub fn gateway(&self) -> &AiGateway {
        &self.gateway
    }

    /// True while a provider call is outstanding.
    pub fn is_generating(&self) -> bool {
        self.in_flight.as_ref().is_some_and(|h| !h.is_finished())
            || self.registry.iter().any(|s| s.is_generating())
    }

    /// Wait for the outstanding provider task, if any, to finish. Its outcome
    /// is applied on the next `advance`.
    pub async fn join_in_flight(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    tracing::warn!(error = %e, "provider task failed");
                }
            }
        }
    }

    /// Session boundary. Drops all actors, requests, lines and history,
    /// cancels the in-flight call and re-arms the gateway.
    pub fn reset(&mut self) {
        self.session = self.session.wrapping_add(1);
        let session = self.session;
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
        while self.results_rx.try_recv().is_ok() {}

        self.registry.clear();
        self.pool.clear();
        self.clock.reset();
        self.history.clear();
        self.gateway.reset();
        self.gateway.reset_warnings();
        self.refreshed = false;
        tracing::info!(session, "talk session reset");
    }

    /// Re-arm the one-time provider notices.
    pub fn reset_notices(&self) {
        self.gateway.reset_warnings();
    }

    fn refresh(&mut self, host: &dyn Host) {
        for state in self.registry.refresh(host) {
            // Dropped lines still count as shown so their replies can follow.
            for line in &state.output_queue {
                self.clock.record(line.item.id, host.current_tick());
            }
            if let Some(request) = state.pending_request {
                tracing::debug!(actor = %state.id, request = %request.id, "pending request dropped with actor");
            }
        }
        self.redirect_stranded(host);
    }

    /// Pooled requests bound to an actor that can no longer talk go to the
    /// nearest bystander, or back to anyone.
    fn redirect_stranded(&mut self, host: &dyn Host) {
        let stranded: Vec<(Uuid, ActorId, Option<ActorId>)> = self
            .pool
            .bound()
            .filter_map(|r| {
                let initiator = r.initiator?;
                let able = self.registry.contains(initiator)
                    && host.status(initiator).is_some_and(|s| s.can_talk() && !s.endangered);
                (!able).then_some((r.id, initiator, r.recipient))
            })
            .collect();

        for (request_id, initiator, recipient) in stranded {
            let sense = host.status(initiator).map_or(0.0, |s| s.sense);
            let target = nearby_eligible(host, &self.registry, initiator, recipient, self.cfg.talk_range, sense)
                .first()
                .copied();
            tracing::debug!(
                request = %request_id,
                from = %initiator,
                to = ?target,
                "stranded request redirected"
            );
            self.pool.rebind(request_id, target);
        }
    }

    fn display_pass(&mut self, host: &dyn Host, tick: u64, rate: TickRate) {
        let min_delay = rate.seconds_to_ticks(self.cfg.min_reply_delay_secs);
        let expiry = rate.seconds_to_ticks(self.cfg.line_expiry_secs);

        let requires_awake = self.cfg.display_requires_awake;
        let mut dropped = Vec::new();
        let mut ready: Option<(u64, ActorId)> = None;
        for state in self.registry.iter_mut() {
            let Some(head) = state.output_queue.front() else {
                continue;
            };
            let displayable = host
                .status(state.id)
                .is_some_and(|s| can_display(&s, requires_awake));
            let expired = expiry > 0 && tick.saturating_sub(head.queued_tick) > expiry;
            if !displayable || expired {
                if let Some(line) = state.output_queue.pop_front() {
                    tracing::debug!(actor = %state.id, item = %line.item.id, expired, "queued line dropped");
                    dropped.push(line.item.id);
                }
                continue;
            }
            if !self.clock.ticks_since(head.item.reply_to, tick).allows(min_delay) {
                continue;
            }
            if ready.is_none_or(|(queued, _)| head.queued_tick < queued) {
                ready = Some((head.queued_tick, state.id));
            }
        }
        for id in dropped {
            self.clock.record(id, tick);
        }

        let Some((_, actor)) = ready else { return };
        let Some(state) = self.registry.get_mut(actor) else { return };
        let Some(line) = state.output_queue.pop_front() else { return };
        self.clock.record(line.item.id, tick);
        state.start_cooldown(tick, rate.seconds_to_ticks(self.cfg.talk_interval_secs));
        tracing::info!(actor = %actor, item = %line.item.id, text = %line.item.text, "line displayed");
        self.emit(TalkEvent::Line(DialogueLine { item: line.item, tick }));
    }

    fn schedule_pass(&mut self, host: &dyn Host, prompts: &dyn PromptSource, tick: u64) {
        if !self.gateway.has_valid_provider() {
            self.notify(WarningKind::NotConfigured, Notice::NotConfigured);
            return;
        }
        let Some(permit) = self.gateway.try_begin() else {
            tracing::trace!("provider call in flight, scheduling deferred");
            return;
        };

        let Some(actor) = self.selector.select_weighted(&self.registry, host, tick, true) else {
            return;
        };
        let Some(status) = host.status(actor) else {
            return;
        };
        let signature = prompts.context(&status);

        let request = match self.next_request(actor, &status, &signature, tick) {
            Some(request) => request,
            None => return,
        };

        let participants = self.participants(host, actor, &status, request.recipient);
        let statuses: Vec<ActorStatus> = participants.iter().filter_map(|id| host.status(*id)).collect();
        let mut messages: Vec<ChatMessage> = statuses.iter().map(|s| ChatMessage::user(prompts.context(s))).collect();
        messages.push(ChatMessage::user(request.prompt_seed.clone()));
        let mut completion = CompletionRequest::new(prompts.instruction(&statuses), messages);
        completion.max_tokens = self.cfg.max_tokens;
        completion.temperature = self.cfg.temperature;

        let Some(state) = self.registry.get_mut(actor) else {
            return;
        };
        self.history
            .push(RequestRecord::new(&request, actor, &state.display_name, RequestStatus::Pending));
        let request_id = request.id;
        let kind = request.kind;
        state.begin_generation(request);
        tracing::debug!(actor = %actor, request = %request_id, ?kind, participants = participants.len(), "generation started");

        let gateway = self.gateway.clone();
        let tx = self.results_tx.clone();
        let cancel = self.cancel.clone();
        let session = self.session;
        self.in_flight = Some(self.runtime.spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = gateway.complete(&permit, completion) => result,
            };
            drop(permit);
            let _ = tx.send(Outcome { session, actor, request_id, participants, result });
        }));
    }

    /// Pool first, then the actor's own bound request, then the ambient
    /// prompt behind the dedup guard.
    fn next_request(&mut self, actor: ActorId, status: &ActorStatus, signature: &str, tick: u64) -> Option<Request> {
        let horizon = self.cfg.request_expiry_ticks;
        let threshold = self.cfg.dedup_reject_threshold;
        let taken = self.pool.take_for(actor, status.endangered, tick);
        let state = self.registry.get_mut(actor)?;

        let request = match taken {
            Some(request) => request,
            None => match state.pending_request.take() {
                Some(request) if !request.is_expired(tick, horizon) => request,
                expired => {
                    if let Some(old) = expired {
                        tracing::debug!(actor = %actor, request = %old.id, "pending request expired");
                    }
                    if state.should_skip_unchanged(signature, threshold) {
                        tracing::debug!(actor = %actor, rejects = state.reject_count, "status unchanged, skipping");
                        let skipped = Request::new(RequestKind::Ambient, self.cfg.ambient_prompt.as_str(), Some(actor), None, tick);
                        let status = RequestStatus::Skipped { times: 1 };
                        self.history.note_skip(RequestRecord::new(&skipped, actor, &state.display_name, status));
                        return None;
                    }
                    return Some(Request::new(
                        RequestKind::Ambient,
                        self.cfg.ambient_prompt.as_str(),
                        Some(actor),
                        None,
                        tick,
                    ));
                }
            },
        };
        state.reject_count = 0;
        state.last_status_signature = Some(signature.to_owned());
        Some(request)
    }

    /// Initiator first, then the request's recipient or the nearest bystander.
    fn participants(&self, host: &dyn Host, actor: ActorId, status: &ActorStatus, recipient: Option<ActorId>) -> Vec<ActorId> {
        let other = recipient
            .filter(|r| *r != actor && self.registry.contains(*r))
            .or_else(|| {
                nearby_eligible(host, &self.registry, actor, None, self.cfg.talk_range, status.sense)
                    .first()
                    .copied()
            });
        std::iter::once(actor).chain(other).collect()
    }

    fn drain_results(&mut self, tick: u64) {
        while let Ok(outcome) = self.results_rx.try_recv() {
            let Outcome { session, actor, request_id, participants, result } = outcome;
            if session != self.session {
                tracing::debug!(request = %request_id, "stale result discarded");
                continue;
            }
            self.in_flight = None;

            let Some(state) = self.registry.get_mut(actor) else {
                tracing::debug!(actor = %actor, "result for departed actor discarded");
                self.history.finish(request_id, RequestStatus::Discarded);
                continue;
            };
            state.finish_generation();

            match result {
                Ok(completion) => self.accept_reply(actor, request_id, &participants, completion, tick),
                Err(e @ GatewayError::NoEligibleProvider) => {
                    self.history.finish(request_id, RequestStatus::Failed { reason: e.to_string() });
                    self.notify(WarningKind::NotConfigured, Notice::NotConfigured);
                }
                Err(e @ GatewayError::Exhausted { .. }) => {
                    let reason = e.to_string();
                    self.history.finish(request_id, RequestStatus::Failed { reason: reason.clone() });
                    self.notify(WarningKind::ProviderFailing, Notice::ProviderFailing { reason });
                }
                Err(e) => {
                    tracing::warn!(actor = %actor, error = %e, "generation failed");
                    self.history.finish(request_id, RequestStatus::Failed { reason: e.to_string() });
                }
            }
        }
    }

    fn accept_reply(
        &mut self,
        initiator: ActorId,
        request_id: Uuid,
        participants: &[ActorId],
        completion: Completion,
        tick: u64,
    ) {
        let lines = match parse_reply(&completion.content) {
            Ok(lines) => lines,
            Err(e) => {
                tracing::warn!(actor = %initiator, provider = %completion.provider, error = %e, "unusable reply");
                self.history.finish(request_id, RequestStatus::Failed { reason: e.to_string() });
                return;
            }
        };

        let mut previous = ROOT_ITEM;
        let mut queued = 0;
        for line in lines {
            let speaker = line
                .speaker
                .as_deref()
                .and_then(|name| self.registry.resolve_speaker(name, participants))
                .unwrap_or(initiator);
            let Some(state) = self.registry.get_mut(speaker) else {
                continue;
            };
            let item = DialogueItem::new(speaker, state.display_name.as_str(), line.text, previous);
            previous = item.id;
            state.enqueue(item, tick);
            queued += 1;
        }
        tracing::debug!(
            actor = %initiator,
            provider = %completion.provider,
            tokens = completion.token_count,
            lines = queued,
            "reply queued"
        );
        self.history.finish(
            request_id,
            RequestStatus::Completed {
                provider: completion.provider,
                token_count: completion.token_count,
                lines: queued,
            },
        );
    }

    fn notify(&self, kind: WarningKind, notice: Notice) {
        if self.gateway.latch_warning(kind) {
            tracing::warn!(?notice, "talk notice");
            self.emit(TalkEvent::Notice(notice));
        }
    }

    fn emit(&self, event: TalkEvent) {
        if let Err(e) = self.events.try_send(event) {
            tracing::warn!(error = %e, "talk event dropped");
        }
    }
}

/// Display filter: dead, incapacitated or (optionally) sleeping actors do
/// not speak.
fn can_display(status: &ActorStatus, requires_awake: bool) -> bool {
    status.alive && !status.incapacitated && (status.awake || !requires_awake)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestHost, TestPrompts};
    use murmur_llm::config::ProviderConfig;
    use murmur_llm::provider::{LlmProvider, MockProvider};
    use std::sync::Arc;

    fn gateway(reply: &str) -> AiGateway {
        let provider = Arc::new(MockProvider::new(reply)) as Arc<dyn LlmProvider>;
        AiGateway::with_providers(vec![(ProviderConfig::new("mock-model", "key"), provider)], None)
    }

    fn cfg() -> TalkCfg {
        TalkCfg {
            generation_interval_secs: 1.0 / 60.0,
            display_interval_secs: 1.0 / 60.0,
            refresh_interval_secs: 1.0 / 60.0,
            min_reply_delay_secs: 0.0,
            ..TalkCfg::default()
        }
    }

    #[tokio::test]
    async fn stale_outcome_is_discarded() {
        let (mut svc, _rx) = TalkService::new(cfg(), gateway("A: hi"), Handle::current());
        let host = TestHost::new(&[(1, "A")]);
        svc.advance(&host, &TestPrompts::default());

        let old = svc.session;
        svc.session += 1;
        svc.results_tx
            .send(Outcome {
                session: old,
                actor: ActorId(1),
                request_id: Uuid::new_v4(),
                participants: vec![ActorId(1)],
                result: Ok(Completion {
                    content: "A: late".into(),
                    token_count: 1,
                    provider: "mock".into(),
                    provider_index: 0,
                }),
            })
            .unwrap();
        svc.drain_results(1);
        assert!(svc.registry.iter().all(|s| s.output_queue.is_empty()));
    }

    #[tokio::test]
    async fn not_configured_notice_fires_once() {
        let gw = AiGateway::with_providers(Vec::new(), None);
        let (mut svc, mut rx) = TalkService::new(cfg(), gw, Handle::current());
        let mut host = TestHost::new(&[(1, "A")]);
        for tick in 0..5 {
            host.tick = tick;
            svc.advance(&host, &TestPrompts::default());
        }
        assert_eq!(rx.try_recv().unwrap(), TalkEvent::Notice(Notice::NotConfigured));
        assert!(rx.try_recv().is_err());

        svc.reset_notices();
        host.tick = 5;
        svc.advance(&host, &TestPrompts::default());
        assert_eq!(rx.try_recv().unwrap(), TalkEvent::Notice(Notice::NotConfigured));
    }

    #[tokio::test]
    async fn unparsable_reply_queues_nothing() {
        let (mut svc, mut rx) = TalkService::new(cfg(), gateway("   "), Handle::current());
        let mut host = TestHost::new(&[(1, "A")]);
        svc.advance(&host, &TestPrompts::default());
        svc.join_in_flight().await;
        host.tick = 1;
        svc.advance(&host, &TestPrompts::default());

        assert!(svc.registry.iter().all(|s| s.output_queue.is_empty() && !s.is_generating()));
        assert!(rx.try_recv().is_err());
        let record = svc.history().next().unwrap();
        assert!(matches!(record.status, RequestStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn bound_request_seeds_prompt() {
        let (mut svc, _rx) = TalkService::new(cfg(), gateway("A: on it"), Handle::current());
        let mut host = TestHost::new(&[(1, "A")]);
        host.rate = TickRate::Paused;
        svc.advance(&host, &TestPrompts::default());
        assert!(svc.submit_for(ActorId(1), "the storm", None, 0));
        assert!(!svc.submit_for(ActorId(9), "nobody", None, 0));

        host.rate = TickRate::Normal;
        svc.advance(&host, &TestPrompts::default());
        let record = svc.history().next().unwrap();
        assert_eq!(record.prompt_seed, "the storm");
        assert_eq!(record.kind, RequestKind::Bound);
        svc.join_in_flight().await;
    }

    #[test]
    fn display_filter() {
        let mut s = crate::testing::status(1, "A");
        assert!(can_display(&s, true));
        s.awake = false;
        assert!(!can_display(&s, true));
        assert!(can_display(&s, false));
        s.incapacitated = true;
        assert!(!can_display(&s, false));
    }
}
