//! Remote key-value backend
//!
//! Talks to a Redis-over-HTTP store: every command is POSTed as a JSON array
//! (`["SET", key, value]`, `["GET", key]`, `["DEL", key]`) with bearer-token
//! auth, and the store answers `{"result": ...}` or `{"error": "..."}`.

use super::Persistence;
use crate::error::PersistenceError;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

pub struct KvPersistence {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    namespace: Option<String>,
}

impl KvPersistence {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            token: token.into(),
            namespace: None,
        }
    }

    /// Prefix every key with `namespace:`.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    fn key(&self, path: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{}:{}", ns, path),
            None => path.to_string(),
        }
    }

    async fn command(&self, path: &str, command: Value) -> Result<Option<Value>, PersistenceError> {
        debug!(endpoint = %self.endpoint, key = %path, "Remote store command");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&command)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        decode_response(path, status, &body)
    }
}

/// Build the JSON array body for one command.
pub(crate) fn encode_command(name: &str, key: &str, value: Option<&str>) -> Value {
    match value {
        Some(value) => json!([name, key, value]),
        None => json!([name, key]),
    }
}

/// Interpret a store response.
///
/// Non-200 without a body and a `null` result both mean the key is absent;
/// a non-200 with a body or an `error` field is a hard failure.
pub(crate) fn decode_response(
    path: &str,
    status: u16,
    body: &str,
) -> Result<Option<Value>, PersistenceError> {
    if status != 200 {
        if body.trim().is_empty() {
            return Err(PersistenceError::NotFound(path.to_string()));
        }
        return Err(PersistenceError::Remote {
            status,
            body: body.to_string(),
        });
    }

    let parsed: Value =
        serde_json::from_str(body).map_err(|e| PersistenceError::Decode(e.to_string()))?;
    if let Some(error) = parsed.get("error") {
        return Err(PersistenceError::Remote {
            status,
            body: error.as_str().unwrap_or_default().to_string(),
        });
    }
    match parsed.get("result") {
        None | Some(Value::Null) => Ok(None),
        Some(result) => Ok(Some(result.clone())),
    }
}

#[async_trait]
impl Persistence for KvPersistence {
    async fn set(&self, path: &str, content: &str) -> Result<(), PersistenceError> {
        let key = self.key(path);
        self.command(path, encode_command("SET", &key, Some(content)))
            .await?
            .ok_or_else(|| PersistenceError::NotFound(path.to_string()))?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<String, PersistenceError> {
        let key = self.key(path);
        match self.command(path, encode_command("GET", &key, None)).await? {
            Some(Value::String(content)) => Ok(content),
            Some(other) => Err(PersistenceError::Decode(format!(
                "expected string result for {}, got {}",
                path, other
            ))),
            None => Err(PersistenceError::NotFound(path.to_string())),
        }
    }

    async fn delete(&self, path: &str) -> Result<(), PersistenceError> {
        let key = self.key(path);
        self.command(path, encode_command("DEL", &key, None)).await?;
        Ok(())
    }
}
