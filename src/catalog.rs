//! Xtream Codes channel catalog: fetch, cache, filter, EPG counts.

use anyhow::{Context, Result};
use iptv_core::Error;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::config::CatalogConfig;

/// A live channel as listed by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    #[serde(deserialize_with = "lenient_u64")]
    pub stream_id: u64,

    #[serde(default)]
    pub name: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub category_id: Option<String>,

    #[serde(default)]
    pub category_name: Option<String>,

    /// Provider keeps a catch-up archive for this channel
    #[serde(default, deserialize_with = "lenient_flag")]
    pub tv_archive: bool,

    #[serde(default, deserialize_with = "lenient_string")]
    pub epg_channel_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Category {
    #[serde(default, deserialize_with = "lenient_string")]
    category_id: Option<String>,
    #[serde(default)]
    category_name: String,
}

#[derive(Debug, Deserialize)]
struct ShortEpg {
    #[serde(default)]
    epg_listings: Vec<Value>,
}

/// Client for the provider's `player_api.php`.
pub struct XtreamClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    extension: Option<String>,
}

impl XtreamClient {
    pub fn new(server: &str, username: &str, password: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client with timeout: {}", e);
                Client::new()
            });

        Self {
            client,
            base_url: base_url(server),
            username: username.to_string(),
            password: password.to_string(),
            extension: None,
        }
    }

    /// Build a client from the `[catalog]` section; all account fields are required.
    pub fn from_config(config: &CatalogConfig) -> Result<Self> {
        let server = config
            .server
            .as_deref()
            .context("No provider server given (use --server or catalog.server)")?;
        let username = config
            .username
            .as_deref()
            .context("No username given (use --user or catalog.username)")?;
        let password = config
            .password
            .as_deref()
            .context("No password given (use --pw or catalog.password)")?;

        let mut client = Self::new(server, username, password, config.request_timeout());
        client.extension = config.stream_extension.clone();
        Ok(client)
    }

    /// Playable URL of a live channel.
    pub fn stream_url(&self, stream_id: u64) -> String {
        let url = format!(
            "{}/live/{}/{}/{}",
            self.base_url, self.username, self.password, stream_id
        );
        match self.extension.as_deref() {
            Some(ext) if !ext.is_empty() => format!("{url}.{}", ext.trim_start_matches('.')),
            _ => url,
        }
    }

    async fn action<T: DeserializeOwned>(&self, action: &str, extra: &[(&str, String)]) -> Result<T> {
        let mut query: Vec<(&str, String)> = vec![
            ("username", self.username.clone()),
            ("password", self.password.clone()),
            ("action", action.to_string()),
        ];
        query.extend(extra.iter().cloned());

        let response = self
            .client
            .get(format!("{}/player_api.php", self.base_url))
            .query(&query)
            .send()
            .await
            .context(format!("Failed to request {}", action))?;

        if !response.status().is_success() {
            anyhow::bail!("{} returned HTTP {}", action, response.status());
        }

        let body: Value = response
            .json()
            .await
            .context(format!("Invalid JSON from {}", action))?;

        // A rejected login answers with a user_info object instead of the list.
        if body.get("user_info").is_some() {
            return Err(Error::Catalog(format!("{action}: provider rejected the account")).into());
        }

        serde_json::from_value(body)
            .map_err(|e| Error::Catalog(format!("{action}: unexpected response shape: {e}")).into())
    }

    pub async fn live_streams(&self) -> Result<Vec<Channel>> {
        self.action("get_live_streams", &[]).await
    }

    /// `category_id` to name.
    pub async fn live_categories(&self) -> Result<HashMap<String, String>> {
        let categories: Vec<Category> = self.action("get_live_categories", &[]).await?;
        Ok(categories
            .into_iter()
            .filter_map(|c| c.category_id.map(|id| (id, c.category_name)))
            .collect())
    }

    /// Number of upcoming EPG entries for a channel.
    pub async fn epg_count(&self, stream_id: u64, limit: u32) -> Result<usize> {
        let epg: ShortEpg = self
            .action(
                "get_short_epg",
                &[("stream_id", stream_id.to_string()), ("limit", limit.to_string())],
            )
            .await?;
        Ok(epg.epg_listings.len())
    }
}

impl std::fmt::Debug for XtreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XtreamClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

fn base_url(server: &str) -> String {
    let server = server.trim().trim_end_matches('/');
    if server.starts_with("http://") || server.starts_with("https://") {
        server.to_string()
    } else {
        format!("http://{server}")
    }
}

/// Load the channel list, from the cache file when allowed.
///
/// `cache` is `None` when caching is disabled entirely; a fresh fetch is
/// written back to it otherwise. A broken cache falls back to the provider.
pub async fn load_channels(
    client: &XtreamClient,
    cache: Option<&Path>,
    use_cache: bool,
) -> Result<Vec<Channel>> {
    if let (Some(path), true) = (cache, use_cache) {
        if path.exists() {
            match read_cache(path) {
                Ok(channels) => {
                    tracing::info!("Loaded {} channels from cache {:?}", channels.len(), path);
                    return Ok(channels);
                }
                Err(e) => tracing::warn!("Ignoring channel cache: {:#}", e),
            }
        }
    }

    tracing::info!("Fetching channels from provider");
    let mut channels = client.live_streams().await?;

    match client.live_categories().await {
        Ok(names) => {
            for channel in channels.iter_mut().filter(|c| c.category_name.is_none()) {
                channel.category_name = channel
                    .category_id
                    .as_ref()
                    .and_then(|id| names.get(id))
                    .cloned();
            }
        }
        Err(e) => tracing::warn!("Could not fetch categories: {:#}", e),
    }
    tracing::info!("Retrieved {} channels", channels.len());

    if let Some(path) = cache {
        write_cache(path, &channels)?;
        tracing::info!("Saved channels to cache {:?}", path);
    }

    Ok(channels)
}

fn read_cache(path: &Path) -> Result<Vec<Channel>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read cache file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse cache file: {:?}", path))
}

fn write_cache(path: &Path, channels: &[Channel]) -> Result<()> {
    let json = serde_json::to_string_pretty(channels)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write cache file: {:?}", path))
}

/// Channels whose category name matches exactly.
pub fn filter_by_category(channels: Vec<Channel>, category: &str) -> Vec<Channel> {
    channels
        .into_iter()
        .filter(|c| c.category_name.as_deref() == Some(category))
        .collect()
}

/// Channels whose name contains `needle`, ignoring case.
pub fn filter_by_name(channels: Vec<Channel>, needle: &str) -> Vec<Channel> {
    let needle = needle.to_lowercase();
    channels
        .into_iter()
        .filter(|c| c.name.to_lowercase().contains(&needle))
        .collect()
}

// ---------------------------------------------------------------------------
// Panels disagree on whether ids and flags are numbers or strings.
// ---------------------------------------------------------------------------

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom(format!("invalid id {n}"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid id {s:?}"))),
        other => Err(serde::de::Error::custom(format!("invalid id {other}"))),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_i64().is_some_and(|v| v != 0),
        Value::String(s) => matches!(s.trim(), "1" | "true"),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: u64, name: &str, category: &str) -> Channel {
        Channel {
            stream_id: id,
            name: name.to_string(),
            category_id: None,
            category_name: Some(category.to_string()),
            tv_archive: false,
            epg_channel_id: None,
        }
    }

    #[test]
    fn parses_mixed_field_types() {
        let json = r#"[
            {"num": 1, "name": "BBC One", "stream_id": 101, "category_id": "3", "tv_archive": 1, "epg_channel_id": "bbc1.uk"},
            {"num": 2, "name": "CNN", "stream_id": "102", "category_id": 4, "tv_archive": "0", "epg_channel_id": null}
        ]"#;
        let channels: Vec<Channel> = serde_json::from_str(json).unwrap();
        assert_eq!(channels[0].stream_id, 101);
        assert!(channels[0].tv_archive);
        assert_eq!(channels[1].stream_id, 102);
        assert_eq!(channels[1].category_id.as_deref(), Some("4"));
        assert!(!channels[1].tv_archive);
        assert_eq!(channels[1].epg_channel_id, None);
    }

    #[test]
    fn stream_url_formats() {
        let client = XtreamClient::new("line.example.com:8080", "user", "pass", Duration::from_secs(5));
        assert_eq!(client.stream_url(42), "http://line.example.com:8080/live/user/pass/42");

        let mut client = XtreamClient::new("https://tv.example/", "u", "p", Duration::from_secs(5));
        client.extension = Some(".ts".into());
        assert_eq!(client.stream_url(7), "https://tv.example/live/u/p/7.ts");
    }

    #[test]
    fn category_filter_is_exact() {
        let channels = vec![
            channel(1, "A", "News"),
            channel(2, "B", "News HD"),
            channel(3, "C", "news"),
        ];
        let filtered = filter_by_category(channels, "News");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].stream_id, 1);
    }

    #[test]
    fn name_filter_ignores_case() {
        let channels = vec![channel(1, "Sky Sports 1", "Sport"), channel(2, "BBC One", "UK")];
        let filtered = filter_by_name(channels, "SPORTS");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "Sky Sports 1");
    }

    #[test]
    fn cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let channels = vec![channel(1, "A", "News")];
        write_cache(&path, &channels).unwrap();
        assert_eq!(read_cache(&path).unwrap(), channels);
    }

    #[test]
    fn missing_account_fields_are_reported() {
        let err = XtreamClient::from_config(&CatalogConfig::default()).unwrap_err();
        assert!(err.to_string().contains("--server"));
    }
}
