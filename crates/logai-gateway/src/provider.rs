//! Reasoning provider whose API key is resolved on every call, so a key
//! saved through the settings endpoint takes effect without a restart.

use std::sync::Arc;

use async_trait::async_trait;
use logai_core::config::LlmConfig;
use logai_core::llm::{ChatMessage, Completion, OpenAiProvider, ReasoningProvider};
use logai_core::{Result, SharedDb};

pub const API_KEY_SETTING: &str = "openai_api_key";

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct ConfiguredProvider {
    key_env: String,
    client: OpenAiProvider,
    db: SharedDb,
    env: EnvLookup,
}

impl ConfiguredProvider {
    pub fn new(config: LlmConfig, db: SharedDb) -> Result<Self> {
        Self::with_env(config, db, Arc::new(|key| std::env::var(key).ok()))
    }

    pub fn with_env(config: LlmConfig, db: SharedDb, env: EnvLookup) -> Result<Self> {
        Ok(Self {
            key_env: config.api_key_env.clone(),
            client: OpenAiProvider::new(config, None)?,
            db,
            env,
        })
    }

    /// Env var named by `api_key_env` first, then the settings table.
    pub async fn api_key(&self) -> Result<Option<String>> {
        if let Some(key) = (self.env)(&self.key_env).filter(|k| !k.trim().is_empty()) {
            return Ok(Some(key));
        }
        let db = self.db.lock().await;
        Ok(db.settings().get(API_KEY_SETTING)?)
    }
}

#[async_trait]
impl ReasoningProvider for ConfiguredProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion> {
        let key = self.api_key().await?;
        self.client.complete_with_key(key.as_deref(), messages).await
    }
}
