/*
 * aurforge - AUR helper with recursive dependency builds.
 * Copyright (C) 2025  aurforge contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! AUR RPC API client.
//!
//! "No results" is never an error here: `info` returns `None` and
//! `search`/`multiinfo` return an empty vector.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, Instrument};

use crate::config::AurConfig;
use crate::error::{AurforgeError, AurforgeResult};

/// Legacy AUR category table, indexed by `CategoryID`
pub const CATEGORIES: [&str; 20] = [
    "ERR0R", "ERR1R", "daemons", "devel", "editors", "emulators", "games", "gnome", "i18n", "kde",
    "kernels", "lib", "modules", "multimedia", "network", "office", "science", "system", "x11",
    "xfce",
];

/// AUR package information from RPC API
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "CategoryID", default)]
    pub category_id: Option<usize>,
    #[serde(default)]
    pub num_votes: u32,
    #[serde(default)]
    pub out_of_date: Option<i64>,
    #[serde(default)]
    pub maintainer: Option<String>,
    #[serde(default)]
    pub first_submitted: i64,
    #[serde(default)]
    pub last_modified: i64,
    #[serde(rename = "URLPath")]
    pub url_path: String,
    #[serde(rename = "URL", default)]
    pub url: Option<String>,
    #[serde(default)]
    pub license: Vec<String>,
}

impl PackageRecord {
    /// Category name, `aur` when the service does not report one
    pub fn category(&self) -> &'static str {
        self.category_id
            .and_then(|id| CATEGORIES.get(id).copied())
            .unwrap_or("aur")
    }

    /// Top-level directory inside the snapshot archive.
    ///
    /// Snapshots are named after the package base, which differs from the
    /// package name for split packages.
    pub fn snapshot_name(&self) -> &str {
        let file = self.url_path.rsplit('/').next().unwrap_or_default();
        let stem = file
            .strip_suffix(".tar.gz")
            .or_else(|| file.strip_suffix(".tgz"))
            .unwrap_or(file);
        if stem.is_empty() {
            &self.name
        } else {
            stem
        }
    }

    pub fn is_out_of_date(&self) -> bool {
        self.out_of_date.is_some_and(|ts| ts > 0)
    }

    pub fn last_modified_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.last_modified, 0)
    }

    pub fn first_submitted_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.first_submitted, 0)
    }
}

/// The remote metadata service as the rest of the crate sees it
#[async_trait(?Send)]
pub trait MetadataService {
    /// Info for one package, `None` when the AUR does not know it
    async fn info(&self, name: &str) -> AurforgeResult<Option<PackageRecord>>;

    /// Keyword search
    async fn search(&self, query: &str) -> AurforgeResult<Vec<PackageRecord>>;

    /// Info for many packages in one round trip
    async fn multiinfo(&self, names: &[String]) -> AurforgeResult<Vec<PackageRecord>>;
}

/// AUR RPC API response wrapper
#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(rename = "type", default)]
    response_type: String,
    #[serde(default)]
    results: RpcResults,
    #[serde(default)]
    error: Option<String>,
}

/// `results` is a list, a single object (old `info`), or a sentinel string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RpcResults {
    Many(Vec<PackageRecord>),
    One(Box<PackageRecord>),
    Sentinel(String),
}

impl Default for RpcResults {
    fn default() -> Self {
        RpcResults::Many(Vec::new())
    }
}

impl RpcResponse {
    fn into_records(self, url: &str) -> AurforgeResult<Vec<PackageRecord>> {
        if let Some(error) = self.error {
            return Err(rpc_error(url, error));
        }

        match self.results {
            RpcResults::Many(records) => Ok(records),
            RpcResults::One(record) => Ok(vec![*record]),
            RpcResults::Sentinel(message) if self.response_type == "error" => {
                Err(rpc_error(url, message))
            }
            RpcResults::Sentinel(message) => {
                debug!("no results: {}", message);
                Ok(Vec::new())
            }
        }
    }
}

fn rpc_error(url: &str, message: String) -> AurforgeError {
    AurforgeError::Network {
        url: url.to_string(),
        message: format!("AUR RPC error: {}", message),
        source: None,
    }
}

/// HTTP client for the AUR RPC interface
pub struct AurClient {
    client: reqwest::Client,
    base_url: String,
}

impl AurClient {
    /// Create a client for the configured endpoint
    pub fn new(config: &AurConfig) -> AurforgeResult<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("aurforge/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(2);
        if config.request_timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.request_timeout_secs));
        }
        let client = builder
            .build()
            .map_err(|e| AurforgeError::Other(format!("cannot create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.rpc_url.clone(),
        })
    }

    fn info_url(&self, name: &str) -> String {
        format!(
            "{}?v=5&type=info&arg={}",
            self.base_url,
            urlencoding::encode(name)
        )
    }

    fn search_url(&self, query: &str) -> String {
        format!(
            "{}?v=5&type=search&arg={}",
            self.base_url,
            urlencoding::encode(query)
        )
    }

    fn multiinfo_url(&self, names: &[String]) -> String {
        let args: Vec<String> = names
            .iter()
            .map(|n| format!("arg[]={}", urlencoding::encode(n)))
            .collect();
        format!("{}?v=5&type=multiinfo&{}", self.base_url, args.join("&"))
    }

    async fn request(&self, url: String) -> AurforgeResult<Vec<PackageRecord>> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AurforgeError::network(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AurforgeError::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| AurforgeError::network(&url, e))?;
        body.into_records(&url)
    }
}

#[async_trait(?Send)]
impl MetadataService for AurClient {
    async fn info(&self, name: &str) -> AurforgeResult<Option<PackageRecord>> {
        let url = self.info_url(name);
        let records = self
            .request(url)
            .instrument(crate::span_request!("info", name))
            .await?;
        // The RPC matches exactly, but guard against a server that does not
        Ok(records.into_iter().find(|r| r.name == name))
    }

    async fn search(&self, query: &str) -> AurforgeResult<Vec<PackageRecord>> {
        let url = self.search_url(query);
        self.request(url)
            .instrument(crate::span_request!("search", query))
            .await
    }

    async fn multiinfo(&self, names: &[String]) -> AurforgeResult<Vec<PackageRecord>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.multiinfo_url(names);
        self.request(url)
            .instrument(crate::span_request!("multiinfo", names.len()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{closed_port_url, OneShotServer};

    const FOO_JSON: &str = r#"{
        "version": 5, "type": "multiinfo", "resultcount": 1,
        "results": [{
            "ID": 1, "Name": "foo", "PackageBase": "foo", "Version": "1.2-1",
            "Description": "A foo", "NumVotes": 12, "Popularity": 0.5,
            "OutOfDate": null, "Maintainer": "alice",
            "FirstSubmitted": 1300000000, "LastModified": 1700000000,
            "URLPath": "/cgit/aur.git/snapshot/foo.tar.gz",
            "URL": "https://foo.example", "License": ["GPL"]
        }]
    }"#;

    fn client_for(base: &str) -> AurClient {
        let config = AurConfig {
            rpc_url: format!("{}/rpc/", base),
            request_timeout_secs: 5,
            ..AurConfig::default()
        };
        AurClient::new(&config).unwrap()
    }

    #[test]
    fn test_parse_list_results() {
        let response: RpcResponse = serde_json::from_str(FOO_JSON).unwrap();
        let records = response.into_records("u").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "foo");
        assert_eq!(records[0].version, "1.2-1");
        assert_eq!(records[0].maintainer.as_deref(), Some("alice"));
        assert_eq!(records[0].category(), "aur");
        assert!(!records[0].is_out_of_date());
    }

    #[test]
    fn test_snapshot_name() {
        let mut record = crate::testutil::record("python-foo", "1-1");
        record.url_path = "/cgit/aur.git/snapshot/foo-base.tar.gz".to_string();
        assert_eq!(record.snapshot_name(), "foo-base");

        record.url_path = "/packages/fo/foo/foo.tgz".to_string();
        assert_eq!(record.snapshot_name(), "foo");

        record.url_path = String::new();
        assert_eq!(record.snapshot_name(), "python-foo");
    }

    #[test]
    fn test_parse_sentinel_is_empty() {
        let response: RpcResponse =
            serde_json::from_str(r#"{"type": "info", "results": "No results found"}"#).unwrap();
        assert!(response.into_records("u").unwrap().is_empty());
    }

    #[test]
    fn test_parse_single_object() {
        let response: RpcResponse = serde_json::from_str(
            r#"{"type": "info", "results": {
                "Name": "bar", "Version": "2", "CategoryID": 3,
                "URLPath": "/packages/ba/bar/bar.tar.gz", "OutOfDate": 1
            }}"#,
        )
        .unwrap();
        let records = response.into_records("u").unwrap();
        assert_eq!(records[0].name, "bar");
        assert_eq!(records[0].category(), "devel");
        assert!(records[0].is_out_of_date());
    }

    #[test]
    fn test_parse_error_field() {
        let response: RpcResponse = serde_json::from_str(
            r#"{"type": "error", "results": [], "error": "Incorrect request type specified."}"#,
        )
        .unwrap();
        let err = response.into_records("u").unwrap_err();
        assert!(matches!(err, AurforgeError::Network { .. }));
        assert!(err.to_string().contains("Incorrect request type"));
    }

    #[test]
    fn test_multiinfo_url_repeats_args() {
        let client = client_for("http://aur.test");
        let url = client.multiinfo_url(&["foo".to_string(), "lib32-gcc++".to_string()]);
        assert_eq!(
            url,
            "http://aur.test/rpc/?v=5&type=multiinfo&arg[]=foo&arg[]=lib32-gcc%2B%2B"
        );
    }

    #[tokio::test]
    async fn test_info_found() {
        let server = OneShotServer::json(200, FOO_JSON);
        let client = client_for(&server.base_url);

        let record = client.info("foo").await.unwrap().unwrap();
        assert_eq!(record.url_path, "/cgit/aur.git/snapshot/foo.tar.gz");
        assert!(server.request_line().contains("type=info&arg=foo"));
    }

    #[tokio::test]
    async fn test_info_absent() {
        let server = OneShotServer::json(200, r#"{"type":"info","resultcount":0,"results":[]}"#);
        let client = client_for(&server.base_url);
        assert!(client.info("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_http_status_is_classified() {
        let server = OneShotServer::json(503, "{}");
        let client = client_for(&server.base_url);

        match client.search("foo").await {
            Err(AurforgeError::HttpStatus { status, .. }) => assert_eq!(status, 503),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_failure_is_classified() {
        let client = client_for(&closed_port_url());
        let err = client.info("foo").await.unwrap_err();
        assert!(matches!(err, AurforgeError::Network { .. }));
    }

    #[tokio::test]
    async fn test_empty_multiinfo_makes_no_request() {
        // Nothing listens here; any request would fail
        let client = client_for(&closed_port_url());
        assert!(client.multiinfo(&[]).await.unwrap().is_empty());
    }
}
