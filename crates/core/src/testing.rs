//! In-crate test doubles for the host and templating boundaries.

use std::collections::BTreeMap;

use crate::clock::TickRate;
use crate::host::{Host, PromptSource};
use crate::types::{ActorId, ActorStatus, RoomId};

pub fn status(id: u64, name: &str) -> ActorStatus {
    ActorStatus {
        id: ActorId(id),
        display_name: name.to_owned(),
        alive: true,
        on_primary_area: true,
        faction_eligible: true,
        awake: true,
        resting: false,
        incapacitated: false,
        endangered: false,
        initiation_weight: 1.0,
        room: Some(RoomId(1)),
        position: (0.0, 0.0),
        sense: 1.0,
    }
}

/// Roster in ascending id order, everyone awake in room 1 at the origin.
pub struct TestHost {
    pub tick: u64,
    pub rate: TickRate,
    pub actors: BTreeMap<ActorId, ActorStatus>,
}

impl TestHost {
    pub fn new(names: &[(u64, &str)]) -> Self {
        let actors = names
            .iter()
            .map(|&(id, name)| (ActorId(id), status(id, name)))
            .collect();
        Self { tick: 0, rate: TickRate::Normal, actors }
    }

    pub fn actor_mut(&mut self, id: u64) -> &mut ActorStatus {
        self.actors
            .get_mut(&ActorId(id))
            .expect("test actor exists")
    }
}

impl Host for TestHost {
    fn current_tick(&self) -> u64 {
        self.tick
    }

    fn tick_rate(&self) -> TickRate {
        self.rate
    }

    fn roster(&self) -> Vec<ActorId> {
        self.actors.keys().copied().collect()
    }

    fn status(&self, id: ActorId) -> Option<ActorStatus> {
        self.actors.get(&id).cloned()
    }
}

/// Context is a fixed string per actor unless overridden.
#[derive(Default)]
pub struct TestPrompts {
    pub contexts: BTreeMap<ActorId, String>,
}

impl PromptSource for TestPrompts {
    fn instruction(&self, participants: &[ActorStatus]) -> String {
        let names: Vec<&str> = participants.iter().map(|p| p.display_name.as_str()).collect();
        format!("Write dialogue for {}", names.join(", "))
    }

    fn context(&self, actor: &ActorStatus) -> String {
        self.contexts
            .get(&actor.id)
            .cloned()
            .unwrap_or_else(|| format!("{} is idle", actor.display_name))
    }
}
