//! A small simulated village to drive the talk service headlessly.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use rand::Rng;
use rand::seq::IndexedRandom;

use murmur_core::clock::TickRate;
use murmur_core::host::{Host, PromptSource};
use murmur_core::types::{ActorId, ActorStatus, RoomId};
use murmur_llm::provider::{CompletionRequest, CompletionResponse, LlmError, LlmProvider};

const VILLAGERS: &[(&str, u32, f32)] = &[
    ("Mara", 1, 1.5),
    ("Jon", 1, 1.0),
    ("Edda", 1, 0.8),
    ("Piet", 2, 1.2),
    ("Lisbet", 2, 0.5),
];

const MOODS: &[&str] = &["cheerful", "tired", "hungry", "curious", "grumpy"];

/// Ticks between mood changes at normal speed (one in-game minute).
const MOOD_PERIOD: u64 = 3600;

pub struct Village {
    tick: u64,
    rate: TickRate,
    actors: BTreeMap<ActorId, ActorStatus>,
    moods: BTreeMap<ActorId, &'static str>,
}

impl Village {
    pub fn new(rate: TickRate) -> Self {
        let mut rng = rand::rng();
        let mut actors = BTreeMap::new();
        let mut moods = BTreeMap::new();
        for (i, &(name, room, weight)) in VILLAGERS.iter().enumerate() {
            let id = ActorId(i as u64 + 1);
            actors.insert(
                id,
                ActorStatus {
                    id,
                    display_name: name.to_owned(),
                    alive: true,
                    on_primary_area: true,
                    faction_eligible: true,
                    awake: true,
                    resting: false,
                    incapacitated: false,
                    endangered: false,
                    initiation_weight: weight,
                    room: Some(RoomId(room)),
                    position: (rng.random_range(0.0..8.0), rng.random_range(0.0..8.0)),
                    sense: 1.0,
                },
            );
            moods.insert(id, MOODS.choose(&mut rng).copied().unwrap_or("calm"));
        }
        Self { tick: 0, rate, actors, moods }
    }

    pub fn rate(&self) -> TickRate {
        self.rate
    }

    /// One simulation tick: people wander, moods drift, one of them naps now
    /// and then.
    pub fn step(&mut self) {
        self.tick += 1;
        let mut rng = rand::rng();
        for status in self.actors.values_mut() {
            let (x, y) = status.position;
            status.position = (
                (x + rng.random_range(-0.05..0.05)).clamp(0.0, 8.0),
                (y + rng.random_range(-0.05..0.05)).clamp(0.0, 8.0),
            );
        }
        if self.tick % MOOD_PERIOD == 0 {
            for mood in self.moods.values_mut() {
                *mood = MOODS.choose(&mut rng).copied().unwrap_or("calm");
            }
            let napper = ActorId(rng.random_range(1..=VILLAGERS.len() as u64));
            for status in self.actors.values_mut() {
                status.resting = status.id == napper;
            }
            tracing::debug!(tick = self.tick, napper = %napper, "village moods changed");
        }
    }
}

impl Host for Village {
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

impl PromptSource for Village {
    fn instruction(&self, participants: &[ActorStatus]) -> String {
        let names: Vec<&str> = participants.iter().map(|p| p.display_name.as_str()).collect();
        format!(
            "You write one or two lines of small talk between villagers {}. \
             Reply as `Name: line` segments separated by `||`.",
            names.join(" and ")
        )
    }

    fn context(&self, actor: &ActorStatus) -> String {
        let mood = self.moods.get(&actor.id).copied().unwrap_or("calm");
        format!("{} is {}.", actor.display_name, mood)
    }
}

const SMALL_TALK: &[&str] = &[
    "Fine weather for the harvest.",
    "Did you hear the wolves last night?",
    "The well water tastes odd again.",
    "I could eat a whole loaf right now.",
    "Someone left the mill door open.",
];

/// Offline stand-in for a real provider. Reads the speaker names back out of
/// the contexts and answers with canned small talk.
pub struct CannedProvider;

impl LlmProvider for CannedProvider {
    fn name(&self) -> &str {
        "canned"
    }

    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + '_>> {
        let speakers: Vec<String> = request
            .messages
            .iter()
            .filter_map(|m| m.content.split_once(" is ").map(|(name, _)| name.to_owned()))
            .collect();
        let mut rng = rand::rng();
        let opener = SMALL_TALK.choose(&mut rng).copied().unwrap_or("Hm.");
        let answer = SMALL_TALK.choose(&mut rng).copied().unwrap_or("Hm.");
        Box::pin(async move {
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
            let content = match speakers.as_slice() {
                [] => return Err(LlmError::Unknown("no speakers in prompt".into())),
                [only] => format!("{only}: {opener}"),
                [first, second, ..] => format!("{first}: {opener}||{second}: {answer}"),
            };
            Ok(CompletionResponse { content, input_tokens: 40, output_tokens: 20 })
        })
    }
}
