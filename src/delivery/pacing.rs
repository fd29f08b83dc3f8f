//! Typing-speed based delays between turns.

use std::sync::Arc;
use std::time::Duration;

use crate::config::CadenceConfig;
use crate::util::{ClockJitter, Jitter};

/// Computes how long to wait before showing each turn.
#[derive(Clone)]
pub struct PacingPolicy {
    base: Duration,
    max: Duration,
    chars_per_second: f64,
    jitter_ratio: f64,
    jitter: Arc<dyn Jitter>,
}

impl std::fmt::Debug for PacingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacingPolicy")
            .field("base", &self.base)
            .field("max", &self.max)
            .field("chars_per_second", &self.chars_per_second)
            .field("jitter_ratio", &self.jitter_ratio)
            .finish()
    }
}

impl PacingPolicy {
    pub fn from_config(config: &CadenceConfig) -> Self {
        Self {
            base: config.base_delay(),
            max: config.max_delay(),
            chars_per_second: config.typing_chars_per_second,
            jitter_ratio: config.jitter_ratio,
            jitter: Arc::new(ClockJitter),
        }
    }

    pub fn with_jitter(mut self, jitter: Arc<dyn Jitter>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Gap before a turn of this text appears: base delay plus simulated
    /// typing time, jittered, then clamped to `[base, max]`.
    pub fn delay_for(&self, text: &str) -> Duration {
        let chars = text.chars().count() as f64;
        let typing = chars / self.chars_per_second;
        let raw = self.base.as_secs_f64() + typing;
        let jittered = raw * (1.0 + self.jitter_ratio * self.jitter.sample().clamp(-1.0, 1.0));
        let clamped = jittered.clamp(self.base.as_secs_f64(), self.max.as_secs_f64());
        Duration::from_millis((clamped * 1000.0).round() as u64)
    }

    /// Cumulative offsets for a sequence of turns. The first turn is shown
    /// immediately; each later turn waits for its own typing time.
    pub fn schedule<S: AsRef<str>>(&self, turns: &[S]) -> Vec<Duration> {
        let mut offsets = Vec::with_capacity(turns.len());
        let mut elapsed = Duration::ZERO;
        for (index, turn) in turns.iter().enumerate() {
            if index > 0 {
                elapsed += self.delay_for(turn.as_ref());
            }
            offsets.push(elapsed);
        }
        offsets
    }
}
