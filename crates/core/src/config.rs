use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// All talk scheduling parameters. Durations in `_secs` are real seconds and
/// are converted to ticks at the host's current rate when used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TalkCfg {
    // pass cadence (real seconds)
    pub generation_interval_secs: f64,
    pub display_interval_secs: f64,
    pub refresh_interval_secs: f64,

    // pacing
    pub talk_interval_secs: f64,
    pub min_reply_delay_secs: f64,
    pub line_expiry_secs: f64,

    // requests
    pub request_expiry_ticks: u64,
    pub dedup_reject_threshold: u32,
    pub ambient_prompt: String,

    // proximity
    pub talk_range: f32,

    // display filter
    pub display_requires_awake: bool,

    // provider
    pub provider_timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,

    // buffers
    pub history_cap: usize,
    pub output_buffer: usize,
}

impl Default for TalkCfg {
    fn default() -> Self {
        Self {
            generation_interval_secs: 1.0,
            display_interval_secs: 0.25,
            refresh_interval_secs: 2.0,
            talk_interval_secs: 7.0,
            min_reply_delay_secs: 3.0,
            line_expiry_secs: 120.0,
            request_expiry_ticks: 2500,
            dedup_reject_threshold: 2,
            ambient_prompt: "Continue the current conversation, or start a new topic.".to_owned(),
            talk_range: 10.0,
            display_requires_awake: true,
            provider_timeout_secs: 60,
            max_tokens: 512,
            temperature: 0.7,
            history_cap: 64,
            output_buffer: 64,
        }
    }
}

impl TalkCfg {
    /// Read `MURMUR_<KEY>` variables, falling back to defaults per key.
    pub fn from_env() -> Self {
        let keys: Vec<String> = Self::default()
            .to_entries()
            .into_iter()
            .map(|(key, _, _)| key.to_owned())
            .collect();
        let map: HashMap<String, String> = keys
            .into_iter()
            .filter_map(|key| {
                let var = format!("MURMUR_{}", key.to_uppercase());
                std::env::var(var).ok().map(|v| (key, v))
            })
            .collect();
        Self::from_map(&map)
    }

    pub fn from_map(m: &HashMap<String, String>) -> Self {
        let d = Self::default();
        Self {
            generation_interval_secs: get_or(m, "generation_interval_secs", d.generation_interval_secs),
            display_interval_secs: get_or(m, "display_interval_secs", d.display_interval_secs),
            refresh_interval_secs: get_or(m, "refresh_interval_secs", d.refresh_interval_secs),
            talk_interval_secs: get_or(m, "talk_interval_secs", d.talk_interval_secs),
            min_reply_delay_secs: get_or(m, "min_reply_delay_secs", d.min_reply_delay_secs),
            line_expiry_secs: get_or(m, "line_expiry_secs", d.line_expiry_secs),
            request_expiry_ticks: get_or(m, "request_expiry_ticks", d.request_expiry_ticks),
            dedup_reject_threshold: get_or(m, "dedup_reject_threshold", d.dedup_reject_threshold),
            ambient_prompt: get_or(m, "ambient_prompt", d.ambient_prompt),
            talk_range: get_or(m, "talk_range", d.talk_range),
            display_requires_awake: get_or(m, "display_requires_awake", d.display_requires_awake),
            provider_timeout_secs: get_or(m, "provider_timeout_secs", d.provider_timeout_secs),
            max_tokens: get_or(m, "max_tokens", d.max_tokens),
            temperature: get_or(m, "temperature", d.temperature),
            history_cap: get_or(m, "history_cap", d.history_cap),
            output_buffer: get_or(m, "output_buffer", d.output_buffer),
        }
    }

    /// Key, current value and description for the settings UI.
    pub fn to_entries(&self) -> Vec<(&str, String, &str)> {
        vec![
            ("generation_interval_secs", self.generation_interval_secs.to_string(), "Scheduling pass period (s)"),
            ("display_interval_secs", self.display_interval_secs.to_string(), "Display pass period (s)"),
            ("refresh_interval_secs", self.refresh_interval_secs.to_string(), "Roster refresh period (s)"),
            ("talk_interval_secs", self.talk_interval_secs.to_string(), "Per-actor cooldown after a displayed line (s)"),
            ("min_reply_delay_secs", self.min_reply_delay_secs.to_string(), "Minimum delay before a reply is shown (s)"),
            ("line_expiry_secs", self.line_expiry_secs.to_string(), "Queued line is dropped after waiting this long (s)"),
            ("request_expiry_ticks", self.request_expiry_ticks.to_string(), "Unserved requests expire after this many ticks"),
            ("dedup_reject_threshold", self.dedup_reject_threshold.to_string(), "Unchanged-status sightings before generating anyway"),
            ("ambient_prompt", self.ambient_prompt.clone(), "Prompt used when no request is pending"),
            ("talk_range", self.talk_range.to_string(), "Base radius for finding conversation partners"),
            ("display_requires_awake", self.display_requires_awake.to_string(), "Drop lines of actors who fell asleep"),
            ("provider_timeout_secs", self.provider_timeout_secs.to_string(), "Per-attempt provider timeout, 0 disables"),
            ("max_tokens", self.max_tokens.to_string(), "Completion token limit"),
            ("temperature", self.temperature.to_string(), "Sampling temperature"),
            ("history_cap", self.history_cap.to_string(), "Request history entries kept for the UI"),
            ("output_buffer", self.output_buffer.to_string(), "Talk event channel capacity"),
        ]
    }

    pub fn provider_timeout(&self) -> Option<Duration> {
        (self.provider_timeout_secs > 0).then(|| Duration::from_secs(self.provider_timeout_secs))
    }
}

fn get_or<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_map_is_default() {
        assert_eq!(TalkCfg::from_map(&HashMap::new()), TalkCfg::default());
    }

    #[test]
    fn map_overrides_and_ignores_garbage() {
        let mut m = HashMap::new();
        m.insert("talk_interval_secs".to_owned(), "12.5".to_owned());
        m.insert("dedup_reject_threshold".to_owned(), "not a number".to_owned());
        m.insert("display_requires_awake".to_owned(), "false".to_owned());
        let cfg = TalkCfg::from_map(&m);
        assert_eq!(cfg.talk_interval_secs, 12.5);
        assert_eq!(cfg.dedup_reject_threshold, 2);
        assert!(!cfg.display_requires_awake);
    }

    #[test]
    fn entries_cover_every_key() {
        let cfg = TalkCfg::default();
        let entries = cfg.to_entries();
        let map: HashMap<String, String> = entries
            .iter()
            .map(|(k, v, _)| ((*k).to_owned(), v.clone()))
            .collect();
        assert_eq!(map.len(), entries.len());
        assert_eq!(TalkCfg::from_map(&map), cfg);
    }

    #[test]
    fn zero_timeout_disables() {
        let cfg = TalkCfg { provider_timeout_secs: 0, ..TalkCfg::default() };
        assert_eq!(cfg.provider_timeout(), None);
        assert_eq!(TalkCfg::default().provider_timeout(), Some(Duration::from_secs(60)));
    }
}
