//! Provider-backed model call for merge resolution.
//!
//! Talks to an OpenAI-compatible chat-completions endpoint over blocking
//! HTTP — the engine's merge pipeline is synchronous, so the model call is
//! too. When no endpoint is configured, or the configured credential is
//! missing, the factory degrades to a disabled resolver that reports
//! failure instead of raising.

use std::time::Duration;

use reweave_core::Settings;
use reweave_engine::{AiResolver, ModelCall, ResolveError};

/// Blocking client for an OpenAI-compatible `/v1/chat/completions` server.
pub struct HttpModelClient {
    endpoint: String,
    model: String,
    max_tokens: u32,
    api_key: Option<String>,
    http_client: reqwest::blocking::Client,
}

impl HttpModelClient {
    pub fn new(
        endpoint: &str,
        model: &str,
        max_tokens: u32,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, ResolveError> {
        let http_client = reqwest::blocking::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ResolveError::Model(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_tokens,
            api_key,
            http_client,
        })
    }
}

impl ModelCall for HttpModelClient {
    fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ResolveError> {
        let request_body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "max_tokens": self.max_tokens,
            "stream": false,
        });

        let mut request = self
            .http_client
            .post(format!("{}/v1/chat/completions", self.endpoint))
            .json(&request_body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .map_err(|e| ResolveError::Model(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(ResolveError::Model(format!(
                "model server returned {status}: {body}"
            )));
        }

        let body: serde_json::Value = response
            .json()
            .map_err(|e| ResolveError::Model(e.to_string()))?;
        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ResolveError::Model("response had no message content".into()))?;

        tracing::info!(chars = content.len(), "model merge response received");
        Ok(content.to_string())
    }
}

/// Build a resolver from settings. Missing endpoint or credential degrades
/// to the disabled resolver rather than failing construction.
pub fn create_model_resolver(settings: &Settings) -> AiResolver {
    let model = &settings.model;
    if model.endpoint.is_empty() {
        tracing::warn!("no model endpoint configured, AI resolution unavailable");
        return AiResolver::disabled();
    }

    let api_key = std::env::var(&model.api_key_env).ok().filter(|k| !k.is_empty());
    if api_key.is_none() {
        tracing::debug!(
            env = %model.api_key_env,
            "no API key in environment, calling endpoint unauthenticated"
        );
    }

    match HttpModelClient::new(
        &model.endpoint,
        &model.model,
        model.max_tokens,
        api_key,
        Duration::from_secs(model.request_timeout_secs),
    ) {
        Ok(client) => AiResolver::new(Box::new(client)),
        Err(e) => {
            tracing::warn!(error = %e, "model client construction failed, AI resolution unavailable");
            AiResolver::disabled()
        }
    }
}
