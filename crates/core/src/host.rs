//! Boundary traits for the host simulation and the templating collaborator.

use crate::clock::TickRate;
use crate::types::{ActorId, ActorStatus};

/// What the core needs from the host simulation.
pub trait Host {
    /// Monotonic simulation tick.
    fn current_tick(&self) -> u64;

    fn tick_rate(&self) -> TickRate;

    /// Actors currently present, in host order.
    fn roster(&self) -> Vec<ActorId>;

    /// Live status for one actor, `None` once it no longer exists.
    fn status(&self, id: ActorId) -> Option<ActorStatus>;
}

/// Prompt text supplied by the templating collaborator. Both strings are
/// opaque to the core.
pub trait PromptSource {
    /// Instruction for a conversation between `participants` (initiator first).
    fn instruction(&self, participants: &[ActorStatus]) -> String;

    /// Per-actor context. Also serves as the actor's status signature for
    /// the dedup guard.
    fn context(&self, actor: &ActorStatus) -> String;
}
