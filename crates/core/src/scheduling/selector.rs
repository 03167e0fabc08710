//! Weighted actor selection and proximity queries.
//!
//! Selection builds a cumulative-weight array over actors that report
//! `can_generate`, draws uniformly in `[0, total)`, and binary-searches for
//! the landing slot. The snapshot can be stale by the time the draw lands, so
//! the landing candidate is re-checked; on failure the selector probes
//! forward (wrapping) through the remaining candidates. Expected cost is
//! O(log n) per draw with an O(n) fallback.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::actors::ActorRegistry;
use crate::host::Host;
use crate::types::ActorId;

/// Draws before giving up.
pub const MAX_DRAWS: usize = 10;
/// Upper bound on `nearby_eligible` results.
pub const NEARBY_CAP: usize = 10;

pub struct Selector<R = StdRng> {
    rng: R,
}

impl Selector<StdRng> {
    pub fn new() -> Self {
        Self { rng: StdRng::from_rng(&mut rand::rng()) }
    }

    pub fn seeded(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }
}

impl Default for Selector<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> Selector<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Pick one actor to act this pass, weighted by initiation weight.
    ///
    /// With `exclude_unavailable`, the landing candidate is also re-checked
    /// against the host's live status, not just the cached state.
    pub fn select_weighted(
        &mut self,
        registry: &ActorRegistry,
        host: &dyn Host,
        tick: u64,
        exclude_unavailable: bool,
    ) -> Option<ActorId> {
        let mut ids = Vec::new();
        let mut cumulative = Vec::new();
        let mut total = 0.0_f64;
        for state in registry.iter() {
            let weight = state.initiation_weight;
            if !weight.is_finite() || !state.can_generate(tick) {
                continue;
            }
            total += f64::from(weight);
            ids.push(state.id);
            cumulative.push(total);
        }
        if ids.is_empty() || total <= 0.0 {
            return None;
        }

        let available = |id: ActorId| {
            registry.get(id).is_some_and(|s| s.can_generate(tick))
                && (!exclude_unavailable || host.status(id).is_some_and(|st| st.can_talk()))
        };

        let n = ids.len();
        for draw in 0..MAX_DRAWS {
            let roll = self.rng.random_range(0.0..total);
            let landing = cumulative.partition_point(|&c| c <= roll).min(n - 1);
            if let Some(id) = (0..n).map(|step| ids[(landing + step) % n]).find(|&id| available(id)) {
                if draw > 0 {
                    tracing::debug!(actor = %id, draws = draw + 1, "selected after redraw");
                }
                return Some(id);
            }
        }
        tracing::debug!(candidates = n, "no available actor after max draws");
        None
    }
}

/// Actors near `actor` that could join a conversation: awake and able, in
/// the same room, within `range * sense`, excluding `actor` and `other`.
/// Ordered by ascending distance, at most [`NEARBY_CAP`].
pub fn nearby_eligible(
    host: &dyn Host,
    registry: &ActorRegistry,
    actor: ActorId,
    other: Option<ActorId>,
    range: f32,
    sense: f32,
) -> Vec<ActorId> {
    let Some(origin) = host.status(actor) else {
        return Vec::new();
    };
    let radius = range * sense;
    if radius <= 0.0 {
        return Vec::new();
    }

    let mut found: Vec<(f32, ActorId)> = registry
        .iter()
        .filter(|s| s.id != actor && Some(s.id) != other)
        .filter_map(|s| host.status(s.id))
        .filter(|st| st.can_talk() && st.room == origin.room)
        .map(|st| (origin.distance_to(&st), st.id))
        .filter(|(d, _)| *d <= radius)
        .collect();
    found.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    found.truncate(NEARBY_CAP);
    found.into_iter().map(|(_, id)| id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestHost;
    use crate::types::RoomId;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashMap;

    fn setup(weights: &[(u64, f32)]) -> (TestHost, ActorRegistry) {
        let names: Vec<(u64, String)> = weights.iter().map(|&(id, _)| (id, format!("A{id}"))).collect();
        let refs: Vec<(u64, &str)> = names.iter().map(|(id, n)| (*id, n.as_str())).collect();
        let mut host = TestHost::new(&refs);
        for &(id, w) in weights {
            host.actor_mut(id).initiation_weight = w;
        }
        let mut reg = ActorRegistry::new();
        reg.refresh(&host);
        (host, reg)
    }

    fn tally(selector: &mut Selector<ChaCha8Rng>, host: &TestHost, reg: &ActorRegistry, draws: usize) -> HashMap<ActorId, usize> {
        let mut counts = HashMap::new();
        for _ in 0..draws {
            let id = selector.select_weighted(reg, host, 0, true).unwrap();
            *counts.entry(id).or_default() += 1;
        }
        counts
    }

    #[test]
    fn weighted_fairness_two_actors() {
        let (host, reg) = setup(&[(1, 1.5), (2, 0.5)]);
        let mut selector = Selector::with_rng(ChaCha8Rng::seed_from_u64(42));
        let counts = tally(&mut selector, &host, &reg, 1000);
        let a = counts[&ActorId(1)];
        let b = counts.get(&ActorId(2)).copied().unwrap_or(0);
        assert_eq!(a + b, 1000);
        assert!((690..=810).contains(&a), "A selected {a} times");
    }

    #[test]
    fn weighted_fairness_many_actors() {
        let weights = [(1, 1.0), (2, 2.0), (3, 3.0), (4, 4.0)];
        let (host, reg) = setup(&weights);
        let mut selector = Selector::with_rng(ChaCha8Rng::seed_from_u64(7));
        let draws = 20_000;
        let counts = tally(&mut selector, &host, &reg, draws);
        for (id, w) in weights {
            let expected = w / 10.0;
            let observed = counts[&ActorId(id)] as f32 / draws as f32;
            assert!((observed - expected).abs() < 0.02, "actor {id}: {observed} vs {expected}");
        }
    }

    #[test]
    fn zero_weight_never_selected() {
        let (host, reg) = setup(&[(1, 0.0), (2, 1.0)]);
        let mut selector = Selector::with_rng(ChaCha8Rng::seed_from_u64(1));
        for _ in 0..200 {
            assert_eq!(selector.select_weighted(&reg, &host, 0, true), Some(ActorId(2)));
        }
    }

    #[test]
    fn stale_candidate_probes_forward() {
        // Registry thinks everyone is available, but the host says 1 and 2
        // just fell asleep.
        let (mut host, reg) = setup(&[(1, 100.0), (2, 100.0), (3, 0.01)]);
        host.actor_mut(1).awake = false;
        host.actor_mut(2).awake = false;
        let mut selector = Selector::with_rng(ChaCha8Rng::seed_from_u64(3));
        for _ in 0..50 {
            assert_eq!(selector.select_weighted(&reg, &host, 0, true), Some(ActorId(3)));
        }
        // Without the live re-check the stale snapshot wins.
        let picked = selector.select_weighted(&reg, &host, 0, false).unwrap();
        assert_ne!(picked, ActorId(3));
    }

    #[test]
    fn none_when_nobody_available() {
        let (mut host, reg) = setup(&[(1, 1.0), (2, 1.0)]);
        host.actor_mut(1).incapacitated = true;
        host.actor_mut(2).resting = true;
        let mut selector = Selector::seeded(9);
        assert_eq!(selector.select_weighted(&reg, &host, 0, true), None);
        assert_eq!(selector.select_weighted(&ActorRegistry::new(), &host, 0, true), None);
    }

    #[test]
    fn cooldown_excludes() {
        let (host, mut reg) = setup(&[(1, 1.0), (2, 1.0)]);
        reg.get_mut(ActorId(1)).unwrap().start_cooldown(0, 100);
        let mut selector = Selector::seeded(5);
        for _ in 0..50 {
            assert_eq!(selector.select_weighted(&reg, &host, 50, true), Some(ActorId(2)));
        }
    }

    #[test]
    fn nearby_sorted_filtered_capped() {
        let mut names = Vec::new();
        for id in 1..=14 {
            names.push((id, format!("P{id}")));
        }
        let refs: Vec<(u64, &str)> = names.iter().map(|(id, n)| (*id, n.as_str())).collect();
        let mut host = TestHost::new(&refs);
        for id in 2..=14 {
            host.actor_mut(id).position = ((15 - id) as f32, 0.0);
        }
        host.actor_mut(13).room = Some(RoomId(2));
        host.actor_mut(12).awake = false;
        let mut reg = ActorRegistry::new();
        reg.refresh(&host);

        let near = nearby_eligible(&host, &reg, ActorId(1), Some(ActorId(14)), 20.0, 1.0);
        assert_eq!(near.len(), NEARBY_CAP);
        // 14 is excluded as `other`, 13 is in another room, 12 is asleep.
        assert_eq!(near[0], ActorId(11));
        assert_eq!(near[1], ActorId(10));
        assert!(!near.contains(&ActorId(1)));
        assert!(!near.contains(&ActorId(13)));
        assert!(!near.contains(&ActorId(12)));
    }

    #[test]
    fn nearby_scales_with_sense() {
        let mut host = TestHost::new(&[(1, "A"), (2, "B")]);
        host.actor_mut(2).position = (8.0, 0.0);
        let mut reg = ActorRegistry::new();
        reg.refresh(&host);
        assert!(nearby_eligible(&host, &reg, ActorId(1), None, 10.0, 0.5).is_empty());
        assert_eq!(nearby_eligible(&host, &reg, ActorId(1), None, 10.0, 1.0), vec![ActorId(2)]);
        assert!(nearby_eligible(&host, &reg, ActorId(1), None, 10.0, 0.0).is_empty());
    }
}
