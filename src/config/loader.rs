//! Configuration loading and environment parsing.

use super::validation::validate_config;
use super::Config;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix for per-field overrides, e.g. `LOBBYNET__NETWORK__TCP_PORT=9000`.
pub const ENV_PREFIX: &str = "LOBBYNET__";
/// Inline JSON document with the highest precedence.
pub const ENV_CONFIG_JSON: &str = "LOBBYNET_CONFIG_JSON";
/// Path to a JSON file.
pub const ENV_CONFIG_PATH: &str = "LOBBYNET_CONFIG_PATH";

/// Load configuration with the following precedence (highest first):
/// 1) `LOBBYNET_CONFIG_JSON` env var containing raw JSON
/// 2) File pointed to by `LOBBYNET_CONFIG_PATH`
/// 3) `config.json` in the current working directory
/// 4) Defaults compiled into the binary
///
/// Individual fields can then be overridden with `LOBBYNET__SECTION__FIELD`.
/// Read and parse errors are printed to stderr and the affected source is
/// skipped. Validation failures are reported but not propagated; callers that
/// need a hard failure run [`validate_config`] themselves.
#[must_use]
pub fn load() -> Config {
    let mut loader = ConfigLoader::new();
    if let Ok(json) = std::env::var(ENV_CONFIG_JSON) {
        loader = loader.with_inline_json(json);
    }
    if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
        loader = loader.with_file(path);
    }
    let config = loader
        .with_file("config.json")
        .with_env_overrides(std::env::vars())
        .build();

    if let Err(e) = validate_config(&config) {
        eprintln!("Configuration validation error: {e}");
    }

    config
}

/// Layers JSON sources over the compiled defaults.
///
/// Sources added first win; env overrides are applied last and win over all
/// of them.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    inline: Vec<String>,
    files: Vec<PathBuf>,
    overrides: Vec<(String, String)>,
}

impl ConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_inline_json(mut self, json: impl Into<String>) -> Self {
        self.inline.push(json.into());
        self
    }

    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    /// Keeps only variables carrying [`ENV_PREFIX`].
    #[must_use]
    pub fn with_env_overrides<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.overrides.extend(
            vars.into_iter()
                .filter(|(key, _)| key.starts_with(ENV_PREFIX)),
        );
        self
    }

    #[must_use]
    pub fn build(self) -> Config {
        let defaults = Config::default();
        let mut merged = serde_json::to_value(&defaults)
            .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        // Lowest precedence first so later merges overwrite.
        for path in self.files.iter().rev() {
            merge_file_source(&mut merged, path);
        }
        for (index, json) in self.inline.iter().enumerate().rev() {
            if let Some(value) = parse_json_document(json, &format!("inline source #{index}")) {
                merge_values(&mut merged, value);
            }
        }
        for (key, raw) in &self.overrides {
            apply_env_override(&mut merged, key, raw);
        }

        match serde_json::from_value::<Config>(merged) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to deserialize config; using defaults: {e}");
                defaults
            }
        }
    }
}

fn parse_json_document(raw: &str, label: &str) -> Option<Value> {
    if raw.trim().is_empty() {
        return None;
    }

    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            eprintln!("Failed to parse config from {label}: {err}");
            None
        }
    }
}

fn merge_file_source(target: &mut Value, path: &Path) {
    if path.as_os_str().is_empty() || !path.exists() {
        return;
    }

    match fs::read_to_string(path) {
        Ok(contents) => {
            if let Some(value) = parse_json_document(&contents, &format!("file {}", path.display()))
            {
                merge_values(target, value);
            }
        }
        Err(err) => {
            eprintln!("Failed to read config from {}: {}", path.display(), err);
        }
    }
}

fn merge_values(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, value) in source_map {
                match target_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (target_slot, source_value) => {
            *target_slot = source_value;
        }
    }
}

fn apply_env_override(root: &mut Value, key: &str, raw: &str) {
    let Some(stripped) = key.strip_prefix(ENV_PREFIX) else {
        return;
    };

    let segments: Vec<String> = stripped
        .split("__")
        .filter(|segment| !segment.is_empty())
        .map(str::to_ascii_lowercase)
        .collect();

    if let Some((last, parents)) = segments.split_last() {
        let mut cursor = root;
        for segment in parents {
            cursor = ensure_object(cursor)
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
        }
        ensure_object(cursor).insert(last.clone(), parse_scalar(raw.trim()));
    }
}

fn parse_scalar(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::String(String::new());
    }

    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn ensure_object(value: &mut Value) -> &mut serde_json::Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(serde_json::Map::new());
    }
    // SAFETY: the branch above guarantees `value` is a `Value::Object`.
    #[allow(clippy::expect_used)]
    value
        .as_object_mut()
        .expect("value should be coerced into an object")
}
