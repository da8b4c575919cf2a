//
// config.rs
//
// Configuration for the code-intelligence worker
//

/// Language target used to pick the baseline standard-library file set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LibTarget {
    Es2020,
    #[default]
    Es2022,
    EsNext,
}

impl LibTarget {
    /// Name of the root lib file for this target
    pub fn root_lib(&self) -> &'static str {
        match self {
            LibTarget::Es2020 => "lib.es2020.d.ts",
            LibTarget::Es2022 => "lib.es2022.d.ts",
            LibTarget::EsNext => "lib.esnext.d.ts",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "es2020" => Some(LibTarget::Es2020),
            "es2022" => Some(LibTarget::Es2022),
            "esnext" => Some(LibTarget::EsNext),
            _ => None,
        }
    }
}

/// A third-party declaration package loaded on first use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThirdPartyPackage {
    /// Module name users import (e.g. `luxon`)
    pub name: String,
    /// Pinned version fetched from the CDN
    pub version: String,
    /// Directory under `/node_modules/` the declarations live in (e.g. `@types/luxon`)
    pub type_root: String,
    /// Files relative to the type root. `package.json` is the cache marker.
    pub files: Vec<String>,
}

impl ThirdPartyPackage {
    pub const MARKER_FILE: &'static str = "package.json";

    /// Virtual path prefix holding every file of this package
    pub fn virtual_prefix(&self) -> String {
        format!("/node_modules/{}/", self.type_root)
    }

    /// Virtual path of the cache marker
    pub fn marker_path(&self) -> String {
        format!("{}{}", self.virtual_prefix(), Self::MARKER_FILE)
    }

    /// CDN path (relative to the base url) for one file
    pub fn url_path(&self, file: &str) -> String {
        format!("{}@{}/{}", self.type_root, self.version, file)
    }
}

impl Default for ThirdPartyPackage {
    fn default() -> Self {
        Self {
            name: "luxon".to_string(),
            version: "3.4.2".to_string(),
            type_root: "@types/luxon".to_string(),
            files: vec![
                "index.d.ts".to_string(),
                "src/luxon.d.ts".to_string(),
                "src/datetime.d.ts".to_string(),
                "src/duration.d.ts".to_string(),
                "src/interval.d.ts".to_string(),
                "src/info.d.ts".to_string(),
                "src/settings.d.ts".to_string(),
                "src/zone.d.ts".to_string(),
                "src/misc.d.ts".to_string(),
                ThirdPartyPackage::MARKER_FILE.to_string(),
            ],
        }
    }
}

/// An ambient declaration file fetched while building the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineDeclaration {
    /// Path relative to the CDN base url
    pub url_path: String,
    /// Where the file lands in the virtual file set (and the cache key)
    pub virtual_path: String,
}

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Quiet period for the smallest edits in milliseconds
    pub min_delay_ms: u64,
    /// Quiet period for edits at or above `max_change_len`
    pub max_delay_ms: u64,
    /// Affected length at which the quiet period saturates
    pub max_change_len: usize,
    /// Interval between readiness polls
    pub ready_poll_interval_ms: u64,
    /// Number of readiness polls before a query proceeds anyway
    pub ready_poll_attempts: u32,
    /// Completion entries with a numeric rank below this pass the filter
    pub completion_rank_threshold: i32,
    /// Completion kinds that are always dropped
    pub excluded_completion_kinds: Vec<String>,
    /// Commit characters used when neither the entry nor the engine supply any
    pub default_commit_characters: Vec<String>,
    /// Base url all declaration fetches are resolved against
    pub cdn_base_url: String,
    /// Per-request timeout for declaration fetches
    pub fetch_timeout_ms: u64,
    /// Language target for the baseline lib set
    pub target: LibTarget,
    /// Package fetched lazily by the declaration loader
    pub third_party_package: ThirdPartyPackage,
    /// Ambient declarations fetched while building the environment
    pub baseline_declarations: Vec<BaselineDeclaration>,
    /// Callee name whose string argument references an external node
    pub reference_function: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 50,
            max_delay_ms: 500,
            max_change_len: 1000,
            ready_poll_interval_ms: 10,
            ready_poll_attempts: 50,
            completion_rank_threshold: 16,
            excluded_completion_kinds: vec!["warning".to_string()],
            default_commit_characters: vec![
                ".".to_string(),
                ",".to_string(),
                ";".to_string(),
                "(".to_string(),
            ],
            cdn_base_url: "https://cdn.jsdelivr.net/npm/".to_string(),
            fetch_timeout_ms: 5000,
            target: LibTarget::Es2022,
            third_party_package: ThirdPartyPackage::default(),
            baseline_declarations: vec![BaselineDeclaration {
                url_path: "@types/lodash@4.17.0/index.d.ts".to_string(),
                virtual_path: "/node_modules/@types/lodash/index.d.ts".to_string(),
            }],
            reference_function: "$".to_string(),
        }
    }
}

/// Build a `WorkerConfig` from a JSON settings object.
///
/// Only keys present in `settings` are applied; everything else keeps its
/// default. Recognised keys:
/// - `debounce`: `minDelayMs`, `maxDelayMs`, `maxChangeLength`
/// - `readiness`: `pollIntervalMs`, `maxAttempts`
/// - `completion`: `rankThreshold`, `excludedKinds`
/// - `network`: `cdnBaseUrl`, `fetchTimeoutMs`
/// - `target`: `"es2020" | "es2022" | "esnext"`
/// - `referenceFunction`
///
/// ```
/// use serde_json::json;
/// let cfg = sidekick::config::parse_worker_config(&json!({
///     "debounce": { "minDelayMs": 20, "maxDelayMs": 300 }
/// }));
/// assert_eq!(cfg.min_delay_ms, 20);
/// assert_eq!(cfg.max_delay_ms, 300);
/// ```
pub fn parse_worker_config(settings: &serde_json::Value) -> WorkerConfig {
    let mut config = WorkerConfig::default();
    apply_settings(&mut config, settings);
    config
}

/// Apply the keys present in `settings` over `config`, leaving the rest as
/// they are. Accepts the same keys as [`parse_worker_config`].
pub fn apply_settings(config: &mut WorkerConfig, settings: &serde_json::Value) {
    if let Some(debounce) = settings.get("debounce") {
        if let Some(v) = debounce.get("minDelayMs").and_then(|v| v.as_u64()) {
            config.min_delay_ms = v;
        }
        if let Some(v) = debounce.get("maxDelayMs").and_then(|v| v.as_u64()) {
            config.max_delay_ms = v;
        }
        if let Some(v) = debounce.get("maxChangeLength").and_then(|v| v.as_u64()) {
            // A zero cap would divide by zero in the delay formula
            config.max_change_len = (v as usize).max(1);
        }
    }
    if config.min_delay_ms > config.max_delay_ms {
        log::warn!(
            "debounce.minDelayMs ({}) exceeds maxDelayMs ({}), clamping",
            config.min_delay_ms,
            config.max_delay_ms
        );
        config.min_delay_ms = config.max_delay_ms;
    }

    if let Some(readiness) = settings.get("readiness") {
        if let Some(v) = readiness.get("pollIntervalMs").and_then(|v| v.as_u64()) {
            config.ready_poll_interval_ms = v.max(1);
        }
        if let Some(v) = readiness.get("maxAttempts").and_then(|v| v.as_u64()) {
            config.ready_poll_attempts = v.min(u32::MAX as u64) as u32;
        }
    }

    if let Some(completion) = settings.get("completion") {
        if let Some(v) = completion.get("rankThreshold").and_then(|v| v.as_i64()) {
            config.completion_rank_threshold = v as i32;
        }
        if let Some(kinds) = completion.get("excludedKinds").and_then(|v| v.as_array()) {
            config.excluded_completion_kinds = kinds
                .iter()
                .filter_map(|k| k.as_str())
                .map(str::to_string)
                .collect();
        }
    }

    if let Some(network) = settings.get("network") {
        if let Some(v) = network.get("cdnBaseUrl").and_then(|v| v.as_str()) {
            if !v.is_empty() {
                config.cdn_base_url = if v.ends_with('/') {
                    v.to_string()
                } else {
                    format!("{v}/")
                };
            }
        }
        if let Some(v) = network.get("fetchTimeoutMs").and_then(|v| v.as_u64()) {
            config.fetch_timeout_ms = v;
        }
    }

    if let Some(target) = settings.get("target").and_then(|v| v.as_str()) {
        match LibTarget::parse(target) {
            Some(t) => config.target = t,
            None => log::warn!("Unknown lib target '{}', keeping {:?}", target, config.target),
        }
    }

    if let Some(v) = settings.get("referenceFunction").and_then(|v| v.as_str()) {
        if !v.is_empty() {
            config.reference_function = v.to_string();
        }
    }

    log::trace!("Worker configuration: {:?}", config);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_values() {
        let config = WorkerConfig::default();
        assert_eq!(config.min_delay_ms, 50);
        assert_eq!(config.max_delay_ms, 500);
        assert_eq!(config.max_change_len, 1000);
        assert_eq!(config.ready_poll_interval_ms, 10);
        assert_eq!(config.ready_poll_attempts, 50);
        assert_eq!(config.target, LibTarget::Es2022);
        assert_eq!(config.reference_function, "$");
        assert!(config.cdn_base_url.ends_with('/'));
    }

    #[test]
    fn test_parse_empty_settings_keeps_defaults() {
        let config = parse_worker_config(&json!({}));
        let default = WorkerConfig::default();
        assert_eq!(config.min_delay_ms, default.min_delay_ms);
        assert_eq!(config.max_delay_ms, default.max_delay_ms);
        assert_eq!(config.cdn_base_url, default.cdn_base_url);
    }

    #[test]
    fn test_parse_all_sections() {
        let config = parse_worker_config(&json!({
            "debounce": { "minDelayMs": 10, "maxDelayMs": 100, "maxChangeLength": 200 },
            "readiness": { "pollIntervalMs": 5, "maxAttempts": 3 },
            "completion": { "rankThreshold": 12, "excludedKinds": ["warning", "keyword"] },
            "network": { "cdnBaseUrl": "https://example.test/npm", "fetchTimeoutMs": 100 },
            "target": "esnext",
            "referenceFunction": "node"
        }));
        assert_eq!(config.min_delay_ms, 10);
        assert_eq!(config.max_delay_ms, 100);
        assert_eq!(config.max_change_len, 200);
        assert_eq!(config.ready_poll_interval_ms, 5);
        assert_eq!(config.ready_poll_attempts, 3);
        assert_eq!(config.completion_rank_threshold, 12);
        assert_eq!(config.excluded_completion_kinds, vec!["warning", "keyword"]);
        assert_eq!(config.cdn_base_url, "https://example.test/npm/");
        assert_eq!(config.fetch_timeout_ms, 100);
        assert_eq!(config.target, LibTarget::EsNext);
        assert_eq!(config.reference_function, "node");
    }

    #[test]
    fn test_min_delay_clamped_to_max() {
        let config = parse_worker_config(&json!({
            "debounce": { "minDelayMs": 900, "maxDelayMs": 100 }
        }));
        assert_eq!(config.min_delay_ms, 100);
        assert_eq!(config.max_delay_ms, 100);
    }

    #[test]
    fn test_zero_change_length_is_rejected() {
        let config = parse_worker_config(&json!({ "debounce": { "maxChangeLength": 0 } }));
        assert_eq!(config.max_change_len, 1);
    }

    #[test]
    fn test_unknown_target_keeps_default() {
        let config = parse_worker_config(&json!({ "target": "es3" }));
        assert_eq!(config.target, LibTarget::Es2022);
    }

    #[test]
    fn test_apply_settings_keeps_caller_values() {
        let mut config = WorkerConfig {
            reference_function: "node".to_string(),
            fetch_timeout_ms: 1234,
            ..WorkerConfig::default()
        };
        apply_settings(&mut config, &json!({ "debounce": { "maxDelayMs": 80 } }));

        assert_eq!(config.max_delay_ms, 80);
        assert_eq!(config.min_delay_ms, 50);
        assert_eq!(config.reference_function, "node");
        assert_eq!(config.fetch_timeout_ms, 1234);
    }

    #[test]
    fn test_apply_settings_clamps_against_existing_max() {
        let mut config = WorkerConfig {
            max_delay_ms: 30,
            ..WorkerConfig::default()
        };
        apply_settings(&mut config, &json!({ "debounce": { "minDelayMs": 100 } }));
        assert_eq!(config.min_delay_ms, 30);
    }

    #[test]
    fn test_package_paths() {
        let pkg = ThirdPartyPackage::default();
        assert_eq!(pkg.virtual_prefix(), "/node_modules/@types/luxon/");
        assert_eq!(pkg.marker_path(), "/node_modules/@types/luxon/package.json");
        assert_eq!(pkg.url_path("index.d.ts"), "@types/luxon@3.4.2/index.d.ts");
        assert!(pkg.files.iter().any(|f| f == ThirdPartyPackage::MARKER_FILE));
    }
}
