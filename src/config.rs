//! Configuration and stub definitions.
//!
//! Defines the stub data model, server settings, and loading of stub
//! definitions from files at startup.

use crate::error::ValidationError;
use crate::matcher::{normalize_method, RuleKind};
use crate::registry::StubRegistry;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Port the admin surface listens on when nothing else is configured.
pub const DEFAULT_PORT: u16 = 4771;

/// Main configuration for the stub server.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct StubServerConfig {
    /// Listener settings
    #[serde(default)]
    pub server: ListenerSettings,

    /// File or directory of stub definitions loaded at startup
    #[serde(default)]
    pub stub_path: Option<PathBuf>,

    /// Inline stub definitions loaded at startup
    #[serde(default)]
    pub stubs: Vec<Stub>,

    /// Global settings
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl StubServerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the inline stubs without registering them.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (i, stub) in self.stubs.iter().enumerate() {
            stub.clone()
                .validate()
                .map_err(|e| anyhow::anyhow!("Stub {}: {}", i, e))?;
        }
        Ok(())
    }

    /// Register inline stubs and everything under `stub_path`.
    ///
    /// Returns the number of stubs added.
    pub fn preload(&self, registry: &StubRegistry) -> anyhow::Result<usize> {
        let mut loaded = 0;
        for (i, stub) in self.stubs.iter().enumerate() {
            registry
                .add(stub.clone())
                .map_err(|e| anyhow::anyhow!("Inline stub {}: {}", i, e))?;
            loaded += 1;
        }
        if let Some(path) = &self.stub_path {
            loaded += preload_stubs(registry, path)?;
        }
        Ok(loaded)
    }
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenerSettings {
    /// Address to bind
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Port to bind
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ListenerSettings {
    /// `host:port` string suitable for binding.
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSettings {
    /// Log every find that hits a stub
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log every find that hits nothing
    #[serde(default = "default_true")]
    pub log_unmatched: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            log_matches: true,
            log_unmatched: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// A single stub definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stub {
    /// Service the stub answers for
    #[serde(default)]
    pub service: String,

    /// Method the stub answers for (normalized on registration)
    #[serde(default)]
    pub method: String,

    /// Matching rule
    #[serde(default)]
    pub input: Input,

    /// Canned result
    #[serde(default)]
    pub output: Output,
}

impl Stub {
    /// Check required fields and normalize the method name in place.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        if self.service.is_empty() {
            return Err(ValidationError::EmptyService);
        }
        if self.method.is_empty() {
            return Err(ValidationError::EmptyMethod);
        }
        self.method = normalize_method(&self.method);

        if self.input.active_rule().is_none() {
            return Err(ValidationError::EmptyInput);
        }
        if self.output.is_empty() {
            return Err(ValidationError::EmptyOutput);
        }
        Ok(())
    }
}

/// Input rules. Only the first present kind is evaluated, in the order
/// equals, contains, matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Input {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<Map<String, Value>>,
}

impl Input {
    fn rules(&self) -> [(RuleKind, Option<&Map<String, Value>>); 3] {
        [
            (RuleKind::Equals, self.equals.as_ref()),
            (RuleKind::Contains, self.contains.as_ref()),
            (RuleKind::Matches, self.matches.as_ref()),
        ]
    }

    /// The rule kind that takes part in matching, if any is set.
    pub fn active_rule(&self) -> Option<(RuleKind, &Map<String, Value>)> {
        self.rules()
            .into_iter()
            .find_map(|(kind, rule)| rule.map(|r| (kind, r)))
    }

    /// Every rule kind that is set, in precedence order.
    pub fn present_kinds(&self) -> Vec<RuleKind> {
        self.rules()
            .into_iter()
            .filter_map(|(kind, rule)| rule.map(|_| kind))
            .collect()
    }
}

/// Canned result: a data payload, an error message, or both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Output {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl Output {
    /// Neither data nor an error message.
    pub fn is_empty(&self) -> bool {
        self.data.is_none() && self.error.is_empty()
    }
}

/// Candidate request submitted to `find`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindRequest {
    #[serde(default)]
    pub service: String,

    #[serde(default)]
    pub method: String,

    /// `null` and a missing key both decode as empty
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Map<String, Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Contents of a stub file: one stub or a list of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StubFile {
    Many(Vec<Stub>),
    One(Box<Stub>),
}

impl StubFile {
    fn into_stubs(self) -> Vec<Stub> {
        match self {
            StubFile::Many(stubs) => stubs,
            StubFile::One(stub) => vec![*stub],
        }
    }
}

fn is_stub_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("json" | "yaml" | "yml")
    )
}

/// Parse the stubs in a single file. The extension picks the format.
pub fn read_stub_file(path: &Path) -> anyhow::Result<Vec<Stub>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read stub file {}", path.display()))?;
    let parsed: StubFile = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?,
        _ => serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid YAML in {}", path.display()))?,
    };
    Ok(parsed.into_stubs())
}

/// Collect the stub files at `path`: the file itself, or the stub files
/// directly inside a directory sorted by name.
pub fn stub_files(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)
        .with_context(|| format!("Failed to read stub directory {}", path.display()))?
    {
        let entry_path = entry?.path();
        if entry_path.is_file() && is_stub_file(&entry_path) {
            files.push(entry_path);
        }
    }
    files.sort();
    Ok(files)
}

/// Register every stub found at `path`. The first invalid stub aborts.
pub fn preload_stubs(registry: &StubRegistry, path: &Path) -> anyhow::Result<usize> {
    let mut loaded = 0;
    for file in stub_files(path)? {
        let stubs = read_stub_file(&file)?;
        debug!(file = %file.display(), count = stubs.len(), "Loading stub file");
        for (i, stub) in stubs.into_iter().enumerate() {
            registry
                .add(stub)
                .map_err(|e| anyhow::anyhow!("{} stub {}: {}", file.display(), i, e))?;
            loaded += 1;
        }
    }
    info!(path = %path.display(), stubs = loaded, "Preloaded stubs");
    Ok(loaded)
}
