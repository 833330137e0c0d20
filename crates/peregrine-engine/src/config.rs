//! Engine tuning knobs.

/// Behavioral limits for a session. Fixed at construction.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Maximum retained messages in the conversation log. Must be even so
    /// eviction always removes whole user/assistant exchanges.
    pub max_history: usize,
    /// Character ceiling for a single user message.
    pub max_message_chars: usize,
    /// Hard cap on weather lookups resolved per model response.
    pub max_weather_calls: usize,
    /// How many trailing messages the context analysis sees.
    pub context_window: usize,
    /// Context analysis output shorter than this keeps the existing summary.
    pub min_context_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_history: 24,
            max_message_chars: 4000,
            max_weather_calls: 3,
            context_window: 6,
            min_context_chars: 10,
        }
    }
}

impl EngineConfig {
    /// Clamp `max_history` down to the nearest even value.
    ///
    /// An odd ceiling would force eviction to split an exchange, which
    /// breaks the log/snapshot lockstep.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.max_history &= !1;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_even_history() {
        let config = EngineConfig::default();
        assert_eq!(config.max_history % 2, 0);
        assert_eq!(config.max_history, 24);
        assert_eq!(config.max_message_chars, 4000);
    }

    #[test]
    fn normalized_rounds_odd_history_down() {
        let config = EngineConfig {
            max_history: 25,
            ..EngineConfig::default()
        }
        .normalized();
        assert_eq!(config.max_history, 24);
    }
}
