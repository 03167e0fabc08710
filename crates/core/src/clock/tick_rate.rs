use serde::{Deserialize, Serialize};

/// Host simulation speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickRate {
    Paused,
    Normal,
    Fast,
    Superfast,
    Ultrafast,
}

impl TickRate {
    pub fn ticks_per_second(self) -> u64 {
        match self {
            Self::Paused => 0,
            Self::Normal => 60,
            Self::Fast => 180,
            Self::Superfast => 360,
            Self::Ultrafast => 900,
        }
    }

    /// Convert a real-time duration to ticks at this rate. Always 0 when paused.
    pub fn seconds_to_ticks(self, seconds: f64) -> u64 {
        if seconds <= 0.0 {
            return 0;
        }
        (seconds * self.ticks_per_second() as f64).round() as u64
    }

    /// True when a pass with a period of `seconds` is due at `tick`.
    /// A period that converts to 0 ticks never fires.
    pub fn is_due(self, tick: u64, seconds: f64) -> bool {
        let interval = self.seconds_to_ticks(seconds);
        interval > 0 && tick % interval == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_scales_with_rate() {
        assert_eq!(TickRate::Normal.seconds_to_ticks(2.0), 120);
        assert_eq!(TickRate::Fast.seconds_to_ticks(2.0), 360);
        assert_eq!(TickRate::Superfast.seconds_to_ticks(0.5), 180);
        assert_eq!(TickRate::Ultrafast.seconds_to_ticks(1.0), 900);
    }

    #[test]
    fn paused_is_zero() {
        assert_eq!(TickRate::Paused.seconds_to_ticks(10.0), 0);
        assert!(!TickRate::Paused.is_due(0, 1.0));
    }

    #[test]
    fn due_on_multiples() {
        assert!(TickRate::Normal.is_due(60, 1.0));
        assert!(!TickRate::Normal.is_due(61, 1.0));
        assert!(!TickRate::Normal.is_due(60, 0.0));
    }
}
