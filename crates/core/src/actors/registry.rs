use std::collections::{BTreeMap, HashSet};

use super::state::ActorState;
use crate::host::Host;
use crate::types::ActorId;

/// Live set of actors the scheduler may consider.
#[derive(Debug, Default)]
pub struct ActorRegistry {
    actors: BTreeMap<ActorId, ActorState>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-sync against the host roster. Adds newly eligible actors, updates
    /// the rest, and returns the evicted states (with their undisplayed lines).
    pub fn refresh(&mut self, host: &dyn Host) -> Vec<ActorState> {
        let mut seen = HashSet::new();
        for id in host.roster() {
            let Some(status) = host.status(id) else { continue };
            if !status.is_eligible() {
                continue;
            }
            seen.insert(id);
            self.actors
                .entry(id)
                .and_modify(|state| state.sync(&status))
                .or_insert_with(|| {
                    tracing::debug!(actor = %id, name = %status.display_name, "actor registered");
                    ActorState::new(&status)
                });
        }

        let gone: Vec<ActorId> = self
            .actors
            .keys()
            .filter(|id| !seen.contains(id))
            .copied()
            .collect();
        gone.into_iter()
            .filter_map(|id| {
                let state = self.actors.remove(&id)?;
                tracing::debug!(
                    actor = %id,
                    dropped_lines = state.output_queue.len(),
                    "actor evicted"
                );
                Some(state)
            })
            .collect()
    }

    pub fn get(&self, id: ActorId) -> Option<&ActorState> {
        self.actors.get(&id)
    }

    pub fn get_mut(&mut self, id: ActorId) -> Option<&mut ActorState> {
        self.actors.get_mut(&id)
    }

    pub fn contains(&self, id: ActorId) -> bool {
        self.actors.contains_key(&id)
    }

    /// States in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &ActorState> {
        self.actors.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ActorState> {
        self.actors.values_mut()
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    pub fn clear(&mut self) {
        self.actors.clear();
    }

    /// Best-effort name lookup across the whole registry.
    pub fn get_by_display_name(&self, fragment: &str) -> Option<&ActorState> {
        let id = best_match(fragment, self.actors.values())?;
        self.actors.get(&id)
    }

    /// Resolve a speaker name from a reply against the conversation's
    /// participants only. Unmatched names resolve to `None`.
    pub fn resolve_speaker(&self, name: &str, participants: &[ActorId]) -> Option<ActorId> {
        let mut scoped: Vec<&ActorState> = participants
            .iter()
            .filter_map(|id| self.actors.get(id))
            .collect();
        scoped.sort_by_key(|s| s.id);
        best_match(name, scoped.into_iter())
    }
}

/// Exact (case-insensitive) beats prefix beats substring. Ties go to the
/// first candidate in iteration order.
fn best_match<'a>(fragment: &str, candidates: impl Iterator<Item = &'a ActorState>) -> Option<ActorId> {
    let needle = fragment.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    let mut best: Option<(u8, ActorId)> = None;
    for state in candidates {
        let name = state.display_name.to_lowercase();
        if name.is_empty() {
            continue;
        }
        let rank = if name == needle {
            0
        } else if name.starts_with(&needle) || needle.starts_with(&name) {
            1
        } else if name.contains(&needle) || needle.contains(&name) {
            2
        } else {
            continue;
        };
        if best.is_none_or(|(r, _)| rank < r) {
            best = Some((rank, state.id));
        }
        if rank == 0 {
            break;
        }
    }
    best.map(|(_, id)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestHost;
    use crate::types::{DialogueItem, ROOT_ITEM};

    #[test]
    fn refresh_adds_and_evicts() {
        let mut host = TestHost::new(&[(1, "Ana"), (2, "Bo"), (3, "Cy")]);
        let mut reg = ActorRegistry::new();
        assert!(reg.refresh(&host).is_empty());
        assert_eq!(reg.len(), 3);

        reg.get_mut(ActorId(2))
            .unwrap()
            .enqueue(DialogueItem::new(ActorId(2), "Bo", "hey", ROOT_ITEM), 0);
        host.actor_mut(2).alive = false;
        host.actor_mut(3).faction_eligible = false;

        let evicted = reg.refresh(&host);
        assert_eq!(evicted.len(), 2);
        assert_eq!(evicted[0].id, ActorId(2));
        assert_eq!(evicted[0].output_queue.len(), 1);
        assert_eq!(reg.len(), 1);
        assert!(reg.contains(ActorId(1)));
    }

    #[test]
    fn refresh_is_idempotent_and_syncs_weight() {
        let mut host = TestHost::new(&[(1, "Ana")]);
        let mut reg = ActorRegistry::new();
        reg.refresh(&host);
        reg.get_mut(ActorId(1)).unwrap().start_cooldown(0, 500);

        host.actor_mut(1).initiation_weight = 2.5;
        reg.refresh(&host);
        reg.refresh(&host);
        let state = reg.get(ActorId(1)).unwrap();
        assert_eq!(state.initiation_weight, 2.5);
        // State survives refresh.
        assert_eq!(state.cooldown_deadline, 500);
    }

    #[test]
    fn departed_actor_is_evicted() {
        let mut host = TestHost::new(&[(1, "Ana"), (2, "Bo")]);
        let mut reg = ActorRegistry::new();
        reg.refresh(&host);
        host.actors.remove(&ActorId(1));
        let evicted = reg.refresh(&host);
        assert_eq!(evicted.len(), 1);
        assert!(!reg.contains(ActorId(1)));
    }

    #[test]
    fn display_name_ranking() {
        let host = TestHost::new(&[(1, "Annabel"), (2, "Ann"), (3, "Joanna")]);
        let mut reg = ActorRegistry::new();
        reg.refresh(&host);

        assert_eq!(reg.get_by_display_name("ann").unwrap().id, ActorId(2));
        assert_eq!(reg.get_by_display_name("Anna").unwrap().id, ActorId(1));
        assert_eq!(reg.get_by_display_name("joan").unwrap().id, ActorId(3));
        assert_eq!(reg.get_by_display_name("bel").unwrap().id, ActorId(1));
        assert!(reg.get_by_display_name("zed").is_none());
        assert!(reg.get_by_display_name("  ").is_none());
    }

    #[test]
    fn collisions_resolve_to_lowest_id() {
        let host = TestHost::new(&[(9, "Sam"), (4, "Sam")]);
        let mut reg = ActorRegistry::new();
        reg.refresh(&host);
        assert_eq!(reg.get_by_display_name("sam").unwrap().id, ActorId(4));
    }

    #[test]
    fn speaker_resolves_within_participants() {
        let host = TestHost::new(&[(1, "Sam"), (2, "Sam"), (3, "Lee")]);
        let mut reg = ActorRegistry::new();
        reg.refresh(&host);
        assert_eq!(reg.resolve_speaker("Sam", &[ActorId(3), ActorId(2)]), Some(ActorId(2)));
        assert_eq!(reg.resolve_speaker("Lee Park", &[ActorId(1), ActorId(3)]), Some(ActorId(3)));
        // Registered but outside the conversation.
        assert_eq!(reg.resolve_speaker("Sam", &[ActorId(3)]), None);
        assert_eq!(reg.resolve_speaker("Lee", &[ActorId(1)]), None);
        assert_eq!(reg.resolve_speaker("Nobody", &[ActorId(1)]), None);
    }
}
