//! LLM Service
//!
//! One shared entry point for every LLM-assisted step in the pipeline. Each
//! scenario implements `LlmRequest`; responses are parsed strictly into the
//! scenario's typed payload. Failures surface as `LLMError` and callers are
//! expected to degrade to their deterministic path.

use dashmap::DashMap;
use serde::{Serialize, de::DeserializeOwned};
use std::time::{Duration, Instant};

use super::client::LlmClient;
use super::models::{LLMError, LlmScenario, LlmStatus};
use crate::config::LlmConfig;

/// Cached responses live this long; alias learning and relationship parsing
/// are frequently re-run with identical inputs during KG iteration.
const CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Trait for LLM analysis requests, implemented by each scenario.
pub trait LlmRequest: Serialize + Send + Sync {
    /// The scenario type for this request
    fn scenario(&self) -> LlmScenario;

    /// System prompt fixing the output contract for this scenario
    fn system_prompt(&self) -> String;

    /// Cache key for deduplication of identical requests
    fn cache_key(&self) -> String;
}

pub struct LlmService {
    config: LlmConfig,
    client: LlmClient,
    cache: DashMap<String, (String, Instant)>,
}

impl LlmService {
    pub fn new(config: LlmConfig) -> Self {
        Self { config, client: LlmClient::new(), cache: DashMap::new() }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn status(&self) -> LlmStatus {
        LlmStatus {
            enabled: self.config.enabled,
            configured: self.config.api_key.is_some(),
            model: self.config.model.clone(),
            api_base: self.config.api_base.clone(),
        }
    }

    /// Analyze with the LLM, going through the in-memory response cache.
    pub async fn analyze<Req, Resp>(&self, request: &Req) -> Result<Resp, LLMError>
    where
        Req: LlmRequest,
        Resp: DeserializeOwned + Serialize,
    {
        if !self.config.enabled {
            return Err(LLMError::Disabled);
        }

        let cache_key = format!("{}:{}", request.scenario().as_str(), request.cache_key());

        if let Some(entry) = self.cache.get(&cache_key) {
            let (cached_json, stored_at) = entry.value();
            if stored_at.elapsed() < CACHE_TTL {
                tracing::debug!("LLM cache hit for {}", cache_key);
                return Ok(serde_json::from_str(cached_json)?);
            }
        }

        let start = Instant::now();
        let response: Resp = self.client.chat_completion(&self.config, request).await?;
        tracing::info!(
            "LLM {} call completed in {}ms",
            request.scenario().as_str(),
            start.elapsed().as_millis()
        );

        let response_json = serde_json::to_string(&response)?;
        self.cache.insert(cache_key, (response_json, Instant::now()));

        Ok(response)
    }
}
