use botcall_types::BotRecord;
use url::Url;

use crate::client::utils;
use crate::error::{DiscoveryError, ValidationError};
use crate::prefs::SharedPreferences;

/// A trimmed, non-empty bot identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BotId(String);

impl BotId {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyBotId);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves bot identifiers against the lookup service.
#[derive(Clone)]
pub struct DiscoveryClient {
    http: reqwest::Client,
    prefs: SharedPreferences,
}

impl DiscoveryClient {
    pub fn new(http: reqwest::Client, prefs: SharedPreferences) -> Self {
        Self { http, prefs }
    }

    /// Looks the bot up. The endpoint becomes the new default whatever the outcome.
    pub async fn resolve(
        &self,
        bot_id: &BotId,
        endpoint: &Url,
    ) -> Result<BotRecord, DiscoveryError> {
        self.remember(endpoint);

        let url = utils::lookup_url(endpoint, bot_id.as_str());
        tracing::debug!("lookup: {}", url);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| DiscoveryError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("lookup for {} returned {}", bot_id, status);
            return Err(DiscoveryError::NotFound(status.as_u16()));
        }

        let record: BotRecord = response.json().await.map_err(|e| {
            if e.is_decode() {
                DiscoveryError::Malformed(e.to_string())
            } else {
                DiscoveryError::Unreachable(e.to_string())
            }
        })?;

        if !record.is_online() {
            tracing::info!(
                "bot {} is {:?}{}",
                bot_id,
                record.status(),
                record.error().map(|e| format!(" ({})", e)).unwrap_or_default()
            );
            return Err(DiscoveryError::Offline);
        }

        tracing::info!(
            "bot {} online: endpoint={:?}, mode={:?}",
            bot_id,
            record.endpoint(),
            record.mode()
        );
        Ok(record)
    }

    fn remember(&self, endpoint: &Url) {
        // Store what the user typed, minus the trailing slash the parser adds.
        let value = endpoint.as_str().trim_end_matches('/');
        match self.prefs.lock() {
            Ok(mut prefs) => prefs.set_discovery_url(value),
            Err(_) => tracing::error!("failed to persist discovery url"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::PreferenceStore;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_bot_id_is_trimmed() {
        assert_eq!(BotId::parse("  bot42 ").unwrap().as_str(), "bot42");
    }

    #[test]
    fn test_blank_bot_id_is_rejected() {
        for raw in ["", " ", "\t\n", "   "] {
            assert_eq!(BotId::parse(raw), Err(ValidationError::EmptyBotId));
        }
    }

    async fn resolve_with(
        response: ResponseTemplate,
    ) -> (Result<BotRecord, DiscoveryError>, SharedPreferences, String) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/lookup/bot42"))
            .respond_with(response)
            .expect(1)
            .mount(&server)
            .await;

        let prefs = PreferenceStore::in_memory().shared();
        let client = DiscoveryClient::new(reqwest::Client::new(), prefs.clone());
        let endpoint = Url::parse(&server.uri()).unwrap();
        let result = client
            .resolve(&BotId::parse("bot42").unwrap(), &endpoint)
            .await;
        (result, prefs, server.uri())
    }

    #[tokio::test]
    async fn test_resolve_online_bot() {
        let body = serde_json::json!({
            "status": "online",
            "endpoint": "https://bot42.example/call",
            "mode": "direct",
            "attestation_valid": true,
            "last_seen": "2026-01-01T00:00:00Z"
        });
        let (result, _, _) = resolve_with(ResponseTemplate::new(200).set_body_json(body)).await;
        let record = result.unwrap();
        assert_eq!(record.endpoint(), Some("https://bot42.example/call"));
        assert!(record.supports_direct_call());
    }

    #[tokio::test]
    async fn test_resolve_maps_failures() {
        let (result, _, _) = resolve_with(ResponseTemplate::new(404)).await;
        assert!(matches!(result, Err(DiscoveryError::NotFound(404))));

        let (result, _, _) =
            resolve_with(ResponseTemplate::new(200).set_body_string("<html>")).await;
        assert!(matches!(result, Err(DiscoveryError::Malformed(_))));

        let (result, _, _) = resolve_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "offline"})),
        )
        .await;
        assert!(matches!(result, Err(DiscoveryError::Offline)));
    }

    #[tokio::test]
    async fn test_resolve_remembers_endpoint_on_failure() {
        let (result, prefs, uri) = resolve_with(ResponseTemplate::new(500)).await;
        assert!(result.is_err());
        assert_eq!(prefs.lock().unwrap().get().discovery_url, uri);
    }
}
