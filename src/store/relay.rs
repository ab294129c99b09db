//! Network relay backend.
//!
//! Forwards the basic operations to a remote key-value service over HTTP and
//! performs no logic of its own. Optional capabilities are left at their
//! `NotSupported` defaults.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;

use super::{KvPair, Store, StoreConfig, WriteOptions};
use crate::error::{Result, StoreError};

/// Listing returned by `GET /kv?prefix=...`
#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<ListItem>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    key: String,
}

/// HTTP relay to a remote key-value service
#[derive(Debug, Clone)]
pub struct RelayStore {
    client: Client,
    base_url: Url,
}

impl RelayStore {
    /// Connect to the first address in `addresses`
    pub fn new(addresses: &[String], config: &StoreConfig) -> Result<Self> {
        let address = addresses
            .iter()
            .map(|a| a.trim())
            .find(|a| !a.is_empty())
            .ok_or_else(|| StoreError::Backend("relay backend requires an address".to_string()))?;

        let mut builder = Client::builder().connect_timeout(config.connection_timeout);
        if !config.persist_connection {
            builder = builder.pool_max_idle_per_host(0);
        } else {
            builder = builder.pool_idle_timeout(Duration::from_secs(90));
        }
        let client = builder.build()?;

        let base_url = Url::parse(&normalize_base_url(address)).map_err(|e| {
            StoreError::Backend(format!("invalid relay address {}: {}", address, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::Backend(format!(
                "invalid relay address {}: not a base URL",
                address
            )));
        }

        Ok(Self { client, base_url })
    }

    /// `{base}/kv/{key}`, each `/`-separated part of the key percent-encoded
    fn key_url(&self, key: &str) -> Url {
        let mut url = self.list_url();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.extend(key.trim_start_matches('/').split('/'));
        }
        url
    }

    fn list_url(&self) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("kv");
        }
        url
    }

    async fn fetch(&self, key: &str) -> Result<Response> {
        let response = self.client.get(self.key_url(key)).send().await?;
        check_status(response).await
    }

    async fn list_keys(&self, directory: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .get(self.list_url())
            .query(&[("prefix", directory)])
            .send()
            .await?;
        let listing: ListResponse = check_status(response).await?.json().await?;
        Ok(listing.items.into_iter().map(|item| item.key).collect())
    }
}

/// Prefix bare `host:port` addresses with a scheme and drop trailing slashes
fn normalize_base_url(address: &str) -> String {
    let url = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };
    url.trim_end_matches('/').to_string()
}

/// Map non-success statuses to store errors
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(StoreError::NotFound);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Backend(format!("relay returned {}: {}", status, body)))
}

#[async_trait]
impl Store for RelayStore {
    async fn get(&self, key: &str) -> Result<KvPair> {
        let value = self.fetch(key).await?.bytes().await?;
        Ok(KvPair {
            key: key.to_string(),
            value,
            last_index: 0,
        })
    }

    async fn put(&self, key: &str, value: &[u8], _options: Option<&WriteOptions>) -> Result<()> {
        let response = self
            .client
            .put(self.key_url(key))
            .body(value.to_vec())
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let response = self.client.delete(self.key_url(key)).send().await?;
        check_status(response).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self.fetch(key).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, directory: &str) -> Result<Vec<KvPair>> {
        let keys = self.list_keys(directory).await?;
        if keys.is_empty() {
            return Err(StoreError::NotFound);
        }
        let mut pairs = Vec::with_capacity(keys.len());
        for key in keys {
            pairs.push(self.get(&key).await?);
        }
        Ok(pairs)
    }

    async fn delete_tree(&self, directory: &str) -> Result<()> {
        for key in self.list_keys(directory).await? {
            if let Err(e) = self.delete(&key).await {
                tracing::debug!(key = %key, error = %e, "Ignoring delete failure in delete_tree");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn relay_for(server: &mockito::ServerGuard) -> RelayStore {
        RelayStore::new(&[server.url()], &StoreConfig::default()).unwrap()
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("127.0.0.1:9000"), "http://127.0.0.1:9000");
        assert_eq!(normalize_base_url("http://kv.local/"), "http://kv.local");
        assert_eq!(normalize_base_url("https://kv.local"), "https://kv.local");
    }

    #[test]
    fn test_requires_address() {
        let err = RelayStore::new(&[String::new()], &StoreConfig::default()).unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[test]
    fn test_rejects_invalid_address() {
        let err = RelayStore::new(&["http://".to_string()], &StoreConfig::default()).unwrap_err();
        assert!(
            matches!(err, StoreError::Backend(ref msg) if msg.contains("invalid relay address"))
        );
    }

    #[test]
    fn test_key_url_encodes_reserved_characters() {
        let relay =
            RelayStore::new(&["kv.local:9000".to_string()], &StoreConfig::default()).unwrap();
        assert_eq!(
            relay.key_url("bench/0").as_str(),
            "http://kv.local:9000/kv/bench/0"
        );
        assert_eq!(
            relay.key_url("a?b#c%d").as_str(),
            "http://kv.local:9000/kv/a%3Fb%23c%25d"
        );
        assert_eq!(relay.list_url().as_str(), "http://kv.local:9000/kv");

        let nested =
            RelayStore::new(&["http://kv.local/api/".to_string()], &StoreConfig::default())
                .unwrap();
        assert_eq!(nested.key_url("k").as_str(), "http://kv.local/api/kv/k");
    }

    #[tokio::test]
    async fn test_get_encodes_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/kv/odd%3Fkey%23frag")
            .with_status(200)
            .with_body("v")
            .create_async()
            .await;

        let pair = relay_for(&server).get("odd?key#frag").await.unwrap();
        assert_eq!(pair.key, "odd?key#frag");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_forwards_value() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/kv/bench/0")
            .with_status(200)
            .with_body("xxx")
            .create_async()
            .await;

        let pair = relay_for(&server).get("bench/0").await.unwrap();
        assert_eq!(pair.key, "bench/0");
        assert_eq!(pair.value.as_ref(), b"xxx");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/kv/bench/9")
            .with_status(404)
            .create_async()
            .await;

        let relay = relay_for(&server);
        assert!(relay.get("bench/9").await.unwrap_err().is_not_found());
        assert!(!relay.exists("bench/9").await.unwrap());
    }

    #[tokio::test]
    async fn test_server_error_is_backend_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/kv/k")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let err = relay_for(&server).get("k").await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(ref msg) if msg.contains("overloaded")));
    }

    #[tokio::test]
    async fn test_put_sends_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/kv/bench/3")
            .match_body("payload")
            .with_status(200)
            .create_async()
            .await;

        relay_for(&server)
            .put("bench/3", b"payload", None)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_fetches_each_key() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/kv")
            .match_query(Matcher::UrlEncoded("prefix".into(), "bench/".into()))
            .with_status(200)
            .with_body(r#"{"items":[{"key":"bench/0"},{"key":"bench/1"}]}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/kv/bench/0")
            .with_body("a")
            .create_async()
            .await;
        server
            .mock("GET", "/kv/bench/1")
            .with_body("b")
            .create_async()
            .await;

        let pairs = relay_for(&server).list("bench/").await.unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].value.as_ref(), b"b");
    }

    #[tokio::test]
    async fn test_delete_tree_ignores_individual_failures() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/kv")
            .match_query(Matcher::Any)
            .with_body(r#"{"items":[{"key":"d/0"},{"key":"d/1"}]}"#)
            .create_async()
            .await;
        server
            .mock("DELETE", "/kv/d/0")
            .with_status(500)
            .create_async()
            .await;
        let second = server
            .mock("DELETE", "/kv/d/1")
            .with_status(200)
            .create_async()
            .await;

        relay_for(&server).delete_tree("d/").await.unwrap();
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_optional_capabilities_not_supported() {
        let server = mockito::Server::new_async().await;
        let relay = relay_for(&server);
        let pair = KvPair {
            key: "k".to_string(),
            value: bytes::Bytes::new(),
            last_index: 0,
        };

        assert!(relay
            .atomic_put("k", b"v", None, None)
            .await
            .unwrap_err()
            .is_not_supported());
        assert!(relay.atomic_delete("k", &pair).await.unwrap_err().is_not_supported());
        assert!(relay.watch("k").await.err().unwrap().is_not_supported());
        assert!(relay.watch_tree("k").await.err().unwrap().is_not_supported());
        assert!(relay.new_lock("k", None).await.err().unwrap().is_not_supported());
    }
}
