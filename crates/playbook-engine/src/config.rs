//! Engine configuration.

use serde::Deserialize;

use crate::error::{EngineError, EngineResult};

/// Engine tuning loaded from environment variables.
///
/// Environment variables are prefixed with `BLACKCROSS_ENGINE_`:
/// - `BLACKCROSS_ENGINE_EVENT_BUFFER`: lifecycle event channel capacity (default: 256)
/// - `BLACKCROSS_ENGINE_LOOP_CONCURRENCY`: loop iterations run at once (default: 1)
/// - `BLACKCROSS_ENGINE_MAX_LOOP_ITEMS`: largest collection a loop accepts (default: 10000)
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// 1 runs iterations sequentially. Outputs stay in index order either way.
    #[serde(default = "default_loop_concurrency")]
    pub loop_concurrency: usize,

    #[serde(default = "default_max_loop_items")]
    pub max_loop_items: usize,
}

fn default_event_buffer() -> usize {
    256
}

fn default_loop_concurrency() -> usize {
    1
}

fn default_max_loop_items() -> usize {
    10_000
}

impl EngineConfig {
    /// Load configuration from `BLACKCROSS_ENGINE_*` environment variables.
    pub fn from_env() -> EngineResult<Self> {
        let config = envy::prefixed("BLACKCROSS_ENGINE_").from_env::<EngineConfig>()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.event_buffer == 0 {
            return Err(EngineError::Config("event_buffer must be at least 1".to_string()));
        }
        if self.loop_concurrency == 0 {
            return Err(EngineError::Config(
                "loop_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_buffer: default_event_buffer(),
            loop_concurrency: default_loop_concurrency(),
            max_loop_items: default_max_loop_items(),
        }
    }
}
