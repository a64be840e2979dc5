//! Pipeline configuration.
//!
//! Defaults mirror the production service. `PipelineConfig::from_env` layers a
//! `.env` file and `FAQDESK_*` environment variables on top, then validates.

use crate::brain::casual::CasualLexicon;
use crate::brain::emotion::KeywordRules;
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;
use validator::Validate;

const ENV_PREFIX: &str = "FAQDESK_";

/// All tunables recognised by the dialog pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineConfig {
    /// Inactivity after which a session expires, in seconds.
    #[validate(range(min = 1))]
    pub session_ttl_secs: u64,
    #[validate(range(min = 1))]
    pub max_turns_per_session: usize,
    #[validate(range(min = 0.0, max = 1.0))]
    pub chit_chat_threshold: f32,
    #[validate(range(min = 0.0, max = 1.0))]
    pub faq_similarity_threshold: f32,
    #[validate(range(min = 0.0, max = 1.0))]
    pub pattern_threshold: f32,
    #[validate(range(min = 1))]
    pub search_top_k: usize,
    #[validate(range(min = 1))]
    pub search_timeout_ms: u64,
    #[validate(range(min = 1))]
    pub embedding_cache_size: usize,
    #[validate(range(min = 1))]
    pub analytics_queue_capacity: usize,
    #[validate(range(min = 1, max = 10))]
    pub persistence_max_attempts: u32,
    /// First retry delay; doubles per attempt.
    #[validate(range(max = 60_000))]
    pub persistence_backoff_ms: u64,
    #[validate(range(min = 1))]
    pub session_sweep_interval_secs: u64,
    pub keyword_rules: KeywordRules,
    /// Replaces the built-in chit-chat lexicon when set.
    #[serde(default)]
    pub casual_lexicon: Option<CasualLexicon>,
    /// Overrides the portable data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 30 * 60,
            max_turns_per_session: 10,
            chit_chat_threshold: 0.65,
            faq_similarity_threshold: 0.75,
            pattern_threshold: 0.6,
            search_top_k: 3,
            search_timeout_ms: 2_000,
            embedding_cache_size: 1_000,
            analytics_queue_capacity: 1_024,
            persistence_max_attempts: 3,
            persistence_backoff_ms: 50,
            session_sweep_interval_secs: 5 * 60,
            keyword_rules: KeywordRules::default(),
            casual_lexicon: None,
            data_dir: None,
        }
    }
}

impl PipelineConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    pub fn persistence_backoff(&self) -> Duration {
        Duration::from_millis(self.persistence_backoff_ms)
    }

    pub fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session_sweep_interval_secs)
    }

    /// Loads `.env`, applies `FAQDESK_*` overrides on top of the defaults and validates.
    pub fn from_env() -> Result<Self, AppError> {
        dotenv::dotenv().ok();

        let mut config = Self::default();
        override_from_env(&mut config.session_ttl_secs, "SESSION_TTL_SECS")?;
        override_from_env(&mut config.max_turns_per_session, "MAX_TURNS_PER_SESSION")?;
        override_from_env(&mut config.chit_chat_threshold, "CHIT_CHAT_THRESHOLD")?;
        override_from_env(&mut config.faq_similarity_threshold, "FAQ_SIMILARITY_THRESHOLD")?;
        override_from_env(&mut config.pattern_threshold, "PATTERN_THRESHOLD")?;
        override_from_env(&mut config.search_top_k, "SEARCH_TOP_K")?;
        override_from_env(&mut config.search_timeout_ms, "SEARCH_TIMEOUT_MS")?;
        override_from_env(&mut config.embedding_cache_size, "EMBEDDING_CACHE_SIZE")?;
        override_from_env(&mut config.analytics_queue_capacity, "ANALYTICS_QUEUE_CAPACITY")?;
        override_from_env(&mut config.persistence_max_attempts, "PERSISTENCE_MAX_ATTEMPTS")?;
        override_from_env(&mut config.persistence_backoff_ms, "PERSISTENCE_BACKOFF_MS")?;
        override_from_env(&mut config.session_sweep_interval_secs, "SESSION_SWEEP_INTERVAL_SECS")?;

        if let Some(path) = env_var("KEYWORDS_FILE") {
            info!("Loading emotion/urgency keyword sets from {}", path);
            let raw = std::fs::read_to_string(&path)?;
            config.keyword_rules = serde_json::from_str(&raw)?;
        }

        if let Some(path) = env_var("CASUAL_PATTERNS_FILE") {
            info!("Loading chit-chat lexicon from {}", path);
            let raw = std::fs::read_to_string(&path)?;
            config.casual_lexicon = Some(serde_json::from_str(&raw)?);
        }

        if let Some(dir) = env_var("DATA_DIR") {
            config.data_dir = Some(PathBuf::from(dir));
        }

        config.validate()?;
        Ok(config)
    }
}

fn env_var(suffix: &str) -> Option<String> {
    env::var(format!("{}{}", ENV_PREFIX, suffix))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

fn override_from_env<T>(slot: &mut T, suffix: &str) -> Result<(), AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = env_var(suffix) {
        *slot = raw.trim().parse().map_err(|e| {
            AppError::Config(format!("{}{} = {:?}: {}", ENV_PREFIX, suffix, raw, e))
        })?;
    }
    Ok(())
}
