use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Host-issued actor identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorId(pub u64);

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}

/// Host-issued room identity, used for same-room proximity tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(pub u32);

/// Snapshot of one actor as the host sees it right now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorStatus {
    pub id: ActorId,
    pub display_name: String,
    pub alive: bool,
    /// On the primary simulated area (the map the player is watching).
    pub on_primary_area: bool,
    /// Passes the ownership/faction rule set.
    pub faction_eligible: bool,
    pub awake: bool,
    pub resting: bool,
    pub incapacitated: bool,
    /// In combat or otherwise in danger; such actors do not pick up pooled requests.
    pub endangered: bool,
    pub initiation_weight: f32,
    pub room: Option<RoomId>,
    pub position: (f32, f32),
    /// Hearing/sight multiplier applied to proximity radii.
    pub sense: f32,
}

impl ActorStatus {
    /// Registry eligibility: alive, on the primary area, matching faction rules.
    pub fn is_eligible(&self) -> bool {
        self.alive && self.on_primary_area && self.faction_eligible
    }

    /// Able to start talking right now.
    pub fn can_talk(&self) -> bool {
        self.is_eligible() && self.awake && !self.resting && !self.incapacitated
    }

    pub fn distance_to(&self, other: &ActorStatus) -> f32 {
        let dx = self.position.0 - other.position.0;
        let dy = self.position.1 - other.position.1;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Root of every reply chain: "replies to nothing".
pub const ROOT_ITEM: Uuid = Uuid::nil();

/// One immutable line of produced dialogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueItem {
    pub id: Uuid,
    pub speaker: ActorId,
    pub speaker_name: String,
    pub text: String,
    /// Item this one responds to; [`ROOT_ITEM`] for the first line of a batch.
    pub reply_to: Uuid,
}

impl DialogueItem {
    pub fn new(speaker: ActorId, speaker_name: impl Into<String>, text: impl Into<String>, reply_to: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            speaker,
            speaker_name: speaker_name.into(),
            text: text.into(),
            reply_to,
        }
    }

    pub fn is_root_reply(&self) -> bool {
        self.reply_to == ROOT_ITEM
    }
}

/// Where a request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestKind {
    /// From the ambient pool; first eligible actor wins.
    Pooled,
    /// Bound to a specific actor's pending slot.
    Bound,
    /// Synthesized "continue or pick a new topic" prompt.
    Ambient,
}

/// A generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub prompt_seed: String,
    pub initiator: Option<ActorId>,
    pub recipient: Option<ActorId>,
    pub created_tick: u64,
    pub kind: RequestKind,
}

impl Request {
    pub fn new(
        kind: RequestKind,
        prompt_seed: impl Into<String>,
        initiator: Option<ActorId>,
        recipient: Option<ActorId>,
        created_tick: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt_seed: prompt_seed.into(),
            initiator,
            recipient,
            created_tick,
            kind,
        }
    }

    /// Older than `horizon` ticks at `now`.
    pub fn is_expired(&self, now: u64, horizon: u64) -> bool {
        now.saturating_sub(self.created_tick) > horizon
    }
}

/// User-visible notices. Each fires once until notices are reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Both the provider and its fallback failed.
    ProviderFailing { reason: String },
    /// No valid provider is configured.
    NotConfigured,
}

/// A displayed line, as delivered to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueLine {
    pub item: DialogueItem,
    pub tick: u64,
}

/// Everything the talk service emits to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TalkEvent {
    Line(DialogueLine),
    Notice(Notice),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(id: u64) -> ActorStatus {
        ActorStatus {
            id: ActorId(id),
            display_name: format!("A{id}"),
            alive: true,
            on_primary_area: true,
            faction_eligible: true,
            awake: true,
            resting: false,
            incapacitated: false,
            endangered: false,
            initiation_weight: 1.0,
            room: None,
            position: (0.0, 0.0),
            sense: 1.0,
        }
    }

    #[test]
    fn eligibility_and_talk() {
        let mut s = status(1);
        assert!(s.is_eligible());
        assert!(s.can_talk());

        s.awake = false;
        assert!(s.is_eligible());
        assert!(!s.can_talk());

        s.alive = false;
        assert!(!s.is_eligible());
    }

    #[test]
    fn distance() {
        let a = status(1);
        let mut b = status(2);
        b.position = (3.0, 4.0);
        assert!((a.distance_to(&b) - 5.0).abs() < f32::EPSILON);
    }

    #[test]
    fn request_expiry() {
        let r = Request::new(RequestKind::Pooled, "raid", None, None, 100);
        assert!(!r.is_expired(100, 50));
        assert!(!r.is_expired(150, 50));
        assert!(r.is_expired(151, 50));
        // Clock going backwards never expires.
        assert!(!r.is_expired(10, 50));
    }
}
