//! Remote policy cache
//!
//! Fetches a remote-controlled policy document from an ordered list of
//! sources with per-source retry and exponential backoff, merges it over
//! built-in defaults, and exposes typed getters. The snapshot is guarded by
//! a single mutex; the write lock is held only while swapping in a new
//! snapshot, never across network I/O, so readers are never blocked by a
//! slow source.

pub mod version;

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::ForcedUpdateError;
use crate::signal::RunSignal;

/// How long a fetched snapshot stays fresh.
pub const CACHE_TTL_SECS: i64 = 300;

/// Per-request timeout for policy sources.
const SOURCE_TIMEOUT: Duration = Duration::from_secs(10);

/// A startup announcement from the policy document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    /// Stable announcement id.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Display message.
    pub message: String,
}

struct PolicyState {
    doc: Value,
    last_fetch: Option<DateTime<Utc>>,
}

/// Cache of remote-controlled settings and access rules.
pub struct RemotePolicyCache {
    sources: Vec<String>,
    attempts_per_source: u32,
    client: reqwest::Client,
    signal: RunSignal,
    state: Mutex<PolicyState>,
}

/// Built-in policy defaults, applied when no source has ever answered and
/// underlying every merge so unspecified keys keep sane values.
fn default_policy() -> Value {
    json!({
        "version_control": {
            "enable_forced_updates": false,
            "forced_update_below_version": "0.0.0",
            "forced_update_reason": "",
            "latest_stable_version": "0.0.0",
        },
        "access_control": {
            "global_disable": false,
            "global_disable_message": "Access to the service is currently disabled.",
            "device_allow_list": [],
            "device_deny_list": [],
            "device_block_message": "Your device ({device_id}) is not permitted to use this service.",
        },
        "announcement": {
            "id": "",
            "title": "",
            "message": "",
            "enabled": false,
        },
        "settings": {
            "policy_refresh_interval_seconds": 900,
        },
    })
}

impl RemotePolicyCache {
    /// Create a cache over an ordered list of source URLs. The snapshot
    /// starts at the built-in defaults; call [`fetch`](Self::fetch) to
    /// populate it.
    #[must_use]
    pub fn new(sources: Vec<String>, signal: RunSignal) -> Self {
        Self::with_attempts(sources, signal, 3)
    }

    /// Like [`new`](Self::new) with a custom per-source attempt count.
    #[must_use]
    pub fn with_attempts(sources: Vec<String>, signal: RunSignal, attempts_per_source: u32) -> Self {
        Self {
            sources,
            attempts_per_source: attempts_per_source.max(1),
            client: reqwest::Client::new(),
            signal,
            state: Mutex::new(PolicyState {
                doc: default_policy(),
                last_fetch: None,
            }),
        }
    }

    /// Try each source in order until one returns parseable JSON.
    ///
    /// Returns `true` iff a source responded before the list was exhausted.
    /// On failure the previous snapshot (or the defaults, on first run) is
    /// left untouched. Backoff waits poll the run signal every second and
    /// abort early on shutdown.
    pub async fn fetch(&self) -> bool {
        if self.sources.is_empty() {
            debug!("no policy sources configured, keeping current snapshot");
            return false;
        }

        for url in &self.sources {
            for attempt in 1..=self.attempts_per_source {
                if !self.signal.is_set() {
                    info!("shutdown requested, abandoning policy fetch");
                    return false;
                }

                if let Some(doc) = self.fetch_source(url, attempt).await {
                    self.apply_fetched(doc);
                    info!(source = %url, "remote policy updated");
                    return true;
                }

                if attempt < self.attempts_per_source {
                    let backoff = 2u64.pow(attempt);
                    if !self.signal.sleep_while_running(backoff).await {
                        info!("shutdown requested during policy fetch backoff");
                        return false;
                    }
                }
            }
        }

        warn!("all policy sources failed, keeping current snapshot");
        false
    }

    async fn fetch_source(&self, url: &str, attempt: u32) -> Option<Value> {
        debug!(source = %url, attempt, "fetching remote policy");
        let response = match self
            .client
            .get(url)
            .timeout(SOURCE_TIMEOUT)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
        {
            Ok(r) => r,
            Err(e) => {
                debug!(source = %url, attempt, error = %e, "policy source request failed");
                return None;
            }
        };
        match response.json::<Value>().await {
            Ok(doc) => Some(doc),
            Err(e) => {
                debug!(source = %url, attempt, error = %e, "policy payload was not JSON");
                None
            }
        }
    }

    /// Merge a fetched document over the defaults and swap it in.
    ///
    /// Top-level keys replace the default wholesale, except that nested
    /// objects merge one level deep so unspecified sub-keys keep their
    /// default values.
    pub fn apply_fetched(&self, fetched: Value) {
        let mut merged = default_policy();
        if let (Some(merged_map), Some(fetched_map)) = (merged.as_object_mut(), fetched.as_object())
        {
            for (key, value) in fetched_map {
                match (merged_map.get_mut(key), value.as_object()) {
                    (Some(Value::Object(existing)), Some(incoming)) => {
                        for (sub_key, sub_value) in incoming {
                            existing.insert(sub_key.clone(), sub_value.clone());
                        }
                    }
                    _ => {
                        merged_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }

        let mut state = self.state.lock().expect("policy lock poisoned");
        state.doc = merged;
        state.last_fetch = Some(Utc::now());
    }

    /// Navigate `path` into the snapshot, returning `default` when any
    /// segment is missing or of the wrong shape.
    #[must_use]
    pub fn get(&self, path: &[&str], default: Value) -> Value {
        let state = self.state.lock().expect("policy lock poisoned");
        let mut current = &state.doc;
        for key in path {
            match current.get(key) {
                Some(next) => current = next,
                None => return default,
            }
        }
        current.clone()
    }

    /// Whether the snapshot was fetched within the TTL.
    #[must_use]
    pub fn is_cache_valid(&self) -> bool {
        let state = self.state.lock().expect("policy lock poisoned");
        state
            .last_fetch
            .is_some_and(|t| (Utc::now() - t).num_seconds() < CACHE_TTL_SECS)
    }

    /// Time of the last successful fetch, if any.
    #[must_use]
    pub fn last_successful_fetch(&self) -> Option<DateTime<Utc>> {
        self.state.lock().expect("policy lock poisoned").last_fetch
    }

    /// Fetch only if the cached snapshot is stale.
    pub async fn refresh_if_needed(&self) {
        if self.is_cache_valid() {
            debug!("remote policy cache still valid");
        } else {
            debug!("remote policy cache stale, refreshing");
            self.fetch().await;
        }
    }

    // --- typed getters ---

    /// Whether the service is disabled for everyone.
    #[must_use]
    pub fn is_globally_disabled(&self) -> bool {
        self.get(&["access_control", "global_disable"], json!(false))
            .as_bool()
            .unwrap_or(false)
    }

    /// Operator-facing message for the global-disable gate.
    #[must_use]
    pub fn global_disable_message(&self) -> String {
        self.string_at(
            &["access_control", "global_disable_message"],
            "Access to the service is currently disabled.",
        )
    }

    /// Resolve device access: a non-empty allow-list requires membership;
    /// otherwise presence on the deny-list rejects; absent both, allowed.
    #[must_use]
    pub fn is_device_allowed(&self, device_id: &str) -> bool {
        let allow = self.get(&["access_control", "device_allow_list"], json!([]));
        if let Some(allow) = allow.as_array() {
            if !allow.is_empty() {
                return allow.iter().any(|v| v.as_str() == Some(device_id));
            }
        }
        let deny = self.get(&["access_control", "device_deny_list"], json!([]));
        if let Some(deny) = deny.as_array() {
            if deny.iter().any(|v| v.as_str() == Some(device_id)) {
                return false;
            }
        }
        true
    }

    /// Block message with the device id substituted in.
    #[must_use]
    pub fn device_block_message(&self, device_id: &str) -> String {
        self.string_at(
            &["access_control", "device_block_message"],
            "Your device ({device_id}) is not permitted to use this service.",
        )
        .replace("{device_id}", device_id)
    }

    /// Minimum version below which a forced update applies.
    #[must_use]
    pub fn forced_update_below_version(&self) -> String {
        self.string_at(&["version_control", "forced_update_below_version"], "0.0.0")
    }

    /// Whether the forced-update gate is enabled at all.
    #[must_use]
    pub fn forced_updates_enabled(&self) -> bool {
        self.get(&["version_control", "enable_forced_updates"], json!(false))
            .as_bool()
            .unwrap_or(false)
    }

    /// Operator-facing reason attached to the forced-update gate, if any.
    #[must_use]
    pub fn forced_update_reason(&self) -> Option<String> {
        let reason = self.string_at(&["version_control", "forced_update_reason"], "");
        (!reason.is_empty()).then_some(reason)
    }

    /// Evaluate the forced-update gate against `current_version`.
    pub fn required_update(&self, current_version: &str) -> Result<(), ForcedUpdateError> {
        if !self.forced_updates_enabled() {
            return Ok(());
        }
        let required = self.forced_update_below_version();
        if required == "0.0.0" {
            return Ok(());
        }
        if version::parse(current_version) < version::parse(&required) {
            return Err(ForcedUpdateError {
                current: current_version.to_string(),
                required,
                reason: self.forced_update_reason(),
            });
        }
        Ok(())
    }

    /// Latest stable version advertised by the policy, if newer releases
    /// should be suggested (non-fatal).
    #[must_use]
    pub fn latest_stable_version(&self) -> String {
        self.string_at(&["version_control", "latest_stable_version"], "0.0.0")
    }

    /// The startup announcement, when enabled with a non-empty message.
    #[must_use]
    pub fn announcement(&self) -> Option<Announcement> {
        let enabled = self
            .get(&["announcement", "enabled"], json!(false))
            .as_bool()
            .unwrap_or(false);
        let message = self.string_at(&["announcement", "message"], "");
        if !enabled || message.is_empty() {
            return None;
        }
        Some(Announcement {
            id: self.string_at(&["announcement", "id"], ""),
            title: self.string_at(&["announcement", "title"], ""),
            message,
        })
    }

    /// Raw setting under `settings.*`.
    #[must_use]
    pub fn setting(&self, name: &str, default: Value) -> Value {
        self.get(&["settings", name], default)
    }

    /// Numeric setting under `settings.*`.
    #[must_use]
    pub fn setting_u64(&self, name: &str, default: u64) -> u64 {
        self.setting(name, json!(default)).as_u64().unwrap_or(default)
    }

    fn string_at(&self, path: &[&str], default: &str) -> String {
        self.get(path, json!(default))
            .as_str()
            .unwrap_or(default)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_cache() -> RemotePolicyCache {
        RemotePolicyCache::with_attempts(Vec::new(), RunSignal::new(), 1)
    }

    #[test]
    fn test_defaults_before_any_fetch() {
        let cache = offline_cache();
        assert!(!cache.is_globally_disabled());
        assert!(cache.is_device_allowed("any-device"));
        assert!(!cache.is_cache_valid());
        assert!(cache.announcement().is_none());
        assert_eq!(cache.setting_u64("policy_refresh_interval_seconds", 0), 900);
    }

    #[test]
    fn test_get_falls_back_to_default() {
        let cache = offline_cache();
        let value = cache.get(&["no", "such", "path"], json!(42));
        assert_eq!(value, json!(42));
    }

    #[test]
    fn test_merge_is_one_level_deep() {
        let cache = offline_cache();
        cache.apply_fetched(json!({
            "access_control": { "global_disable": true },
            "extra_top_level": "kept",
        }));

        assert!(cache.is_globally_disabled());
        // Unspecified sub-keys keep their defaults.
        assert!(cache.is_device_allowed("anything"));
        assert!(cache
            .global_disable_message()
            .contains("currently disabled"));
        assert_eq!(
            cache.get(&["extra_top_level"], json!(null)),
            json!("kept")
        );
        assert!(cache.is_cache_valid());
    }

    #[test]
    fn test_allow_list_requires_membership() {
        let cache = offline_cache();
        cache.apply_fetched(json!({
            "access_control": {
                "device_allow_list": ["good-device"],
                "device_deny_list": ["good-device"],
            }
        }));

        // Allow-list wins over the deny-list when non-empty.
        assert!(cache.is_device_allowed("good-device"));
        assert!(!cache.is_device_allowed("other-device"));
    }

    #[test]
    fn test_deny_list_rejects_without_allow_list() {
        let cache = offline_cache();
        cache.apply_fetched(json!({
            "access_control": { "device_deny_list": ["bad-device"] }
        }));

        assert!(!cache.is_device_allowed("bad-device"));
        assert!(cache.is_device_allowed("other-device"));
    }

    #[test]
    fn test_device_block_message_substitution() {
        let cache = offline_cache();
        let msg = cache.device_block_message("abc123");
        assert!(msg.contains("abc123"));
        assert!(!msg.contains("{device_id}"));
    }

    #[test]
    fn test_forced_update_gate() {
        let cache = offline_cache();
        cache.apply_fetched(json!({
            "version_control": {
                "enable_forced_updates": true,
                "forced_update_below_version": "2.0.0",
                "forced_update_reason": "protocol change",
            }
        }));

        let err = cache.required_update("1.5.0").unwrap_err();
        assert_eq!(err.required, "2.0.0");
        assert_eq!(err.reason.as_deref(), Some("protocol change"));

        assert!(cache.required_update("2.0.0").is_ok());
        assert!(cache.required_update("2.1.0").is_ok());
    }

    #[test]
    fn test_forced_update_disabled_by_default() {
        let cache = offline_cache();
        assert!(cache.required_update("0.0.1").is_ok());
    }

    #[test]
    fn test_forced_update_zero_sentinel_is_inert() {
        let cache = offline_cache();
        cache.apply_fetched(json!({
            "version_control": { "enable_forced_updates": true }
        }));
        assert!(cache.required_update("0.0.1").is_ok());
    }

    #[test]
    fn test_announcement_requires_enabled_and_message() {
        let cache = offline_cache();
        cache.apply_fetched(json!({
            "announcement": { "enabled": true, "message": "", "title": "t" }
        }));
        assert!(cache.announcement().is_none());

        cache.apply_fetched(json!({
            "announcement": {
                "enabled": true,
                "id": "a1",
                "title": "Notice",
                "message": "Service window tonight",
            }
        }));
        let ann = cache.announcement().unwrap();
        assert_eq!(ann.id, "a1");
        assert_eq!(ann.title, "Notice");
        assert_eq!(ann.message, "Service window tonight");
    }

    #[tokio::test]
    async fn test_fetch_with_no_sources_returns_false() {
        let cache = offline_cache();
        assert!(!cache.fetch().await);
        assert!(!cache.is_cache_valid());
    }

    #[tokio::test]
    async fn test_fetch_all_sources_failing_keeps_snapshot() {
        // Unroutable loopback ports fail fast with connection refused.
        let cache = RemotePolicyCache::with_attempts(
            vec![
                "http://127.0.0.1:1/policy.json".to_string(),
                "http://127.0.0.1:2/policy.json".to_string(),
            ],
            RunSignal::new(),
            1,
        );
        cache.apply_fetched(json!({
            "access_control": { "global_disable": true }
        }));

        assert!(!cache.fetch().await);
        // Previous snapshot untouched.
        assert!(cache.is_globally_disabled());
    }

    /// Minimal canned-response HTTP server counting hits.
    async fn serve_policy(
        body: &'static str,
    ) -> (String, std::sync::Arc<std::sync::atomic::AtomicUsize>) {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });
        (format!("http://{addr}/policy.json"), hits)
    }

    #[tokio::test]
    async fn test_first_healthy_source_stops_the_scan() {
        use std::sync::atomic::Ordering;

        let (good_url, good_hits) =
            serve_policy(r#"{"access_control":{"global_disable":true}}"#).await;
        let (later_url, later_hits) = serve_policy("{}").await;

        let cache = RemotePolicyCache::with_attempts(
            vec![
                "http://127.0.0.1:1/policy.json".to_string(),
                good_url,
                later_url,
            ],
            RunSignal::new(),
            1,
        );

        assert!(cache.fetch().await);
        assert!(cache.is_globally_disabled());
        assert!(cache.is_cache_valid());
        assert_eq!(good_hits.load(Ordering::SeqCst), 1);
        assert_eq!(later_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_aborts_when_signal_cleared() {
        let signal = RunSignal::new();
        signal.clear();
        let cache = RemotePolicyCache::with_attempts(
            vec!["http://127.0.0.1:1/policy.json".to_string()],
            signal,
            3,
        );
        assert!(!cache.fetch().await);
    }
}
