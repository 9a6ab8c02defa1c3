//! Configuration Management
//!
//! Desired-state model, configuration source resolution and loading, and
//! the run settings supplied by the invoking environment

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};
use crate::report::Reporter;

/// GitHub REST API base used when no override is supplied
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// User agent sent when fetching remote configuration documents
const USER_AGENT: &str = concat!("milisman/", env!("CARGO_PKG_VERSION"));

/// JSON Schema applied to every decoded configuration document.
///
/// Keys outside `labels` and `milestones` are allowed and ignored.
const DOCUMENT_SCHEMA: &str = r#"{
    "type": "object",
    "properties": {
        "labels": {
            "type": ["array", "null"],
            "items": {
                "type": "object",
                "required": ["name"],
                "properties": {
                    "name": { "type": "string", "pattern": "\\S" },
                    "color": { "type": ["string", "null"] },
                    "description": { "type": ["string", "null"] }
                }
            }
        },
        "milestones": {
            "type": ["array", "null"],
            "items": {
                "type": "object",
                "required": ["title"],
                "properties": {
                    "title": { "type": "string", "pattern": "\\S" },
                    "description": { "type": ["string", "null"] },
                    "due_on": { "type": ["string", "null"] },
                    "state": { "type": ["string", "null"] }
                }
            }
        }
    }
}"#;

/// Label Specification
///
/// A label that should exist in the target repository
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabelSpec {
    /// Label name (identity key)
    pub name: String,

    /// Label color, with or without a leading #
    #[serde(default)]
    pub color: Option<String>,

    /// Label description
    #[serde(default)]
    pub description: Option<String>,
}

impl LabelSpec {
    /// Create a label specification with only a name
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            color: None,
            description: None,
        }
    }

    /// Color in the form GitHub expects (no #, lowercase)
    pub fn normalized_color(&self) -> Option<String> {
        self.color.as_deref().map(normalize_color)
    }
}

/// Milestone Specification
///
/// A milestone that should exist in the target repository
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MilestoneSpec {
    /// Milestone title (identity key)
    pub title: String,

    /// Milestone description
    #[serde(default)]
    pub description: Option<String>,

    /// Due date
    #[serde(default, deserialize_with = "deserialize_due_on")]
    pub due_on: Option<DateTime<Utc>>,

    /// Milestone state (`open` or `closed`), forwarded as written
    #[serde(default)]
    pub state: Option<String>,
}

impl MilestoneSpec {
    /// Create a milestone specification with only a title
    pub fn new<S: Into<String>>(title: S) -> Self {
        Self {
            title: title.into(),
            description: None,
            due_on: None,
            state: None,
        }
    }
}

/// Desired State
///
/// Labels and milestones that should exist, in processing order
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct DesiredState {
    /// Where the document came from; supplied by the invocation, never by the document
    #[serde(skip)]
    pub config_file: String,

    /// Labels to reconcile
    #[serde(default, deserialize_with = "null_as_empty")]
    pub labels: Vec<LabelSpec>,

    /// Milestones to reconcile
    #[serde(default, deserialize_with = "null_as_empty")]
    pub milestones: Vec<MilestoneSpec>,
}

impl DesiredState {
    /// Create an empty desired state for the given configuration source
    pub fn new<S: Into<String>>(config_file: S) -> Self {
        Self {
            config_file: config_file.into(),
            ..Default::default()
        }
    }

    /// Validate the desired state
    ///
    /// Runs once on the bare invocation parameter before any I/O, and
    /// again on the decoded document.
    ///
    /// # Errors
    /// - If `config_file` is empty
    /// - If `config_file` is neither an absolute URL nor an existing file
    /// - If a label name or milestone title is blank
    pub fn validate(&self) -> Result<()> {
        let config_file = self.config_file.trim();
        if config_file.is_empty() {
            return Err(Error::config_validation("configfile is required"));
        }

        if !is_remote_url(config_file) && !Path::new(config_file).is_file() {
            return Err(Error::config_validation(format!(
                "configfile must be an existing file or an absolute URL: {config_file}"
            )));
        }

        for (index, label) in self.labels.iter().enumerate() {
            if label.name.trim().is_empty() {
                return Err(Error::config_validation(format!(
                    "labels[{index}]: name cannot be empty"
                )));
            }
        }

        for (index, milestone) in self.milestones.iter().enumerate() {
            if milestone.title.trim().is_empty() {
                return Err(Error::config_validation(format!(
                    "milestones[{index}]: title cannot be empty"
                )));
            }
        }

        Ok(())
    }

    /// Whether there is nothing to reconcile
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.milestones.is_empty()
    }
}

/// Configuration Source
///
/// Where the configuration document is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// A file on the local filesystem
    LocalPath(PathBuf),

    /// A document fetched over HTTP(S)
    RemoteUrl(Url),
}

impl ConfigSource {
    /// Resolve a `configfile` value
    ///
    /// Anything that parses as an absolute URL with a host is remote;
    /// everything else is a local path.
    pub fn resolve(config_file: &str) -> Self {
        match Url::parse(config_file) {
            Ok(url) if url.has_host() => ConfigSource::RemoteUrl(url),
            _ => ConfigSource::LocalPath(PathBuf::from(config_file)),
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::LocalPath(path) => write!(f, "{}", path.display()),
            ConfigSource::RemoteUrl(url) => write!(f, "{url}"),
        }
    }
}

/// Configuration Loader
///
/// Turns a `configfile` value into a validated [`DesiredState`]
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    http: reqwest::Client,
}

impl ConfigLoader {
    /// Create a loader without a fetch timeout
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built
    pub fn new() -> Result<Self> {
        Self::build(None)
    }

    /// Create a loader whose remote fetches give up after `timeout`
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Self::build(Some(timeout))
    }

    fn build(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let http = builder
            .build()
            .map_err(|e| Error::config_validation(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { http })
    }

    /// Load, decode and validate the configuration document
    ///
    /// # Arguments
    /// - `config_file`: Local path or absolute URL
    /// - `reporter`: Receives the "Using config file" summary line
    ///
    /// # Errors
    /// - `ConfigValidation` before any read if `config_file` is invalid
    /// - `ReadConfig`, `FetchConfig` or `FetchStatus` if the bytes cannot be obtained
    /// - `Utf8`, `Yaml` or `Json` if the document is malformed
    /// - `ConfigValidation` if the decoded document is invalid
    pub async fn load<R: Reporter + ?Sized>(
        &self,
        config_file: &str,
        reporter: &mut R,
    ) -> Result<DesiredState> {
        let config_file = config_file.trim();
        DesiredState::new(config_file).validate()?;

        let source = ConfigSource::resolve(config_file);
        debug!(%source, "Resolved configuration source");

        let bytes = self.read_source(&source).await?;
        let mut state = decode_document(&bytes)?;
        state.config_file = config_file.to_string();
        state.validate()?;

        info!(
            labels = state.labels.len(),
            milestones = state.milestones.len(),
            "Loaded configuration"
        );
        reporter.summary(&format!("Using config file: {config_file}"));

        Ok(state)
    }

    /// Read the raw document bytes from a resolved source
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, the request fails, or
    /// the server does not answer with a success status
    pub async fn read_source(&self, source: &ConfigSource) -> Result<Vec<u8>> {
        match source {
            ConfigSource::LocalPath(path) => {
                tokio::fs::read(path)
                    .await
                    .map_err(|source| Error::ReadConfig {
                        path: path.clone(),
                        source,
                    })
            }
            ConfigSource::RemoteUrl(url) => {
                let fetch_error = |source| Error::FetchConfig {
                    url: url.to_string(),
                    source,
                };

                let response = self
                    .http
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(fetch_error)?;

                let status = response.status();
                if !status.is_success() {
                    return Err(Error::FetchStatus {
                        url: url.to_string(),
                        status,
                    });
                }

                let body = response.bytes().await.map_err(fetch_error)?;
                Ok(body.to_vec())
            }
        }
    }
}

/// Decode a configuration document (YAML or JSON)
///
/// An empty document decodes to an empty desired state.
///
/// # Errors
/// - `Utf8` if the bytes are not UTF-8
/// - `Yaml` if the bytes are not well-formed
/// - `ConfigValidation` if the document does not match the schema
/// - `Json` if a field cannot be converted (e.g. a bad `due_on`)
pub fn decode_document(bytes: &[u8]) -> Result<DesiredState> {
    let text = std::str::from_utf8(bytes)?;
    if text.trim().is_empty() {
        return Ok(DesiredState::default());
    }

    let mut document: serde_json::Value = serde_yaml::from_str(text)?;
    if document.is_null() {
        return Ok(DesiredState::default());
    }

    stringify_text_fields(&mut document);
    validate_document(&document)?;
    Ok(serde_json::from_value(document)?)
}

const LABEL_TEXT_FIELDS: &[&str] = &["name", "color", "description"];
const MILESTONE_TEXT_FIELDS: &[&str] = &["title", "description", "state"];

/// Turn plain YAML numbers and booleans in text fields into strings
///
/// `title: 1.0` and `color: 123456` are scalars to a YAML parser but text
/// to the API. The YAML form of the number is kept, so `000000` becomes `"0"`.
fn stringify_text_fields(document: &mut serde_json::Value) {
    let sections = [
        ("labels", LABEL_TEXT_FIELDS),
        ("milestones", MILESTONE_TEXT_FIELDS),
    ];

    for (section, fields) in sections {
        let Some(entries) = document
            .get_mut(section)
            .and_then(serde_json::Value::as_array_mut)
        else {
            continue;
        };

        for entry in entries
            .iter_mut()
            .filter_map(serde_json::Value::as_object_mut)
        {
            for field in fields {
                if let Some(value) = entry.get_mut(*field) {
                    let text = match value {
                        serde_json::Value::Number(n) => n.to_string(),
                        serde_json::Value::Bool(b) => b.to_string(),
                        _ => continue,
                    };
                    *value = serde_json::Value::String(text);
                }
            }
        }
    }
}

/// Check a parsed document against [`DOCUMENT_SCHEMA`]
fn validate_document(document: &serde_json::Value) -> Result<()> {
    let schema: serde_json::Value = serde_json::from_str(DOCUMENT_SCHEMA)?;
    let compiled = jsonschema::JSONSchema::compile(&schema)
        .map_err(|e| Error::config_validation(format!("Invalid document schema: {e}")))?;

    if let Err(errors) = compiled.validate(document) {
        let messages: Vec<String> = errors
            .map(|e| {
                let location = e.instance_path.to_string();
                if location.is_empty() {
                    e.to_string()
                } else {
                    format!("{location}: {e}")
                }
            })
            .collect();
        return Err(Error::config_validation(messages.join("; ")));
    }

    Ok(())
}

/// Run Settings
///
/// Everything the invoking environment supplies besides the document itself
#[derive(Debug, Clone, Default)]
pub struct RunSettings {
    /// Local path or absolute URL of the configuration document
    pub config_file: String,

    /// Bearer token for the GitHub API
    pub token: Option<String>,

    /// Target repository (owner/repo format)
    pub repository: Option<String>,

    /// API base URL override (GitHub Enterprise)
    pub api_url: Option<String>,

    /// Per-call timeout for remote requests
    pub timeout: Option<Duration>,
}

impl RunSettings {
    /// Resolve the target repository
    ///
    /// # Errors
    /// - `MissingContext` if no repository is set
    /// - `InvalidRepositoryFormat` if it is not `owner/repo`
    pub fn repo_context(&self) -> Result<RepoContext> {
        let repository = self
            .repository
            .as_deref()
            .map(str::trim)
            .filter(|repo| !repo.is_empty())
            .ok_or_else(|| Error::missing_context("GITHUB_REPOSITORY is not set"))?;

        parse_repository(repository)
    }

    /// Get the bearer token
    ///
    /// # Errors
    /// Returns `MissingToken` if the token is unset or blank
    pub fn token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(Error::MissingToken)
    }

    /// API base URL, falling back to github.com
    pub fn api_url(&self) -> &str {
        self.api_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_API_URL)
    }
}

/// Repository Context
///
/// Owner and name of the repository being reconciled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoContext {
    pub owner: String,
    pub name: String,
}

impl fmt::Display for RepoContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Parse repository string into owner and name
///
/// # Arguments
/// - `repo`: Repository string in "owner/repo" format
///
/// # Errors
/// Returns an error if the format is invalid
pub fn parse_repository(repo: &str) -> Result<RepoContext> {
    let parts: Vec<&str> = repo.split('/').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(Error::InvalidRepositoryFormat(repo.to_string()));
    }
    Ok(RepoContext {
        owner: parts[0].to_string(),
        name: parts[1].to_string(),
    })
}

/// Parse a milestone due date
///
/// Accepts RFC 3339 timestamps and plain `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_due_on(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    let value = value.trim();

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .ok_or_else(|| {
            format!("invalid due_on '{value}': expected an RFC 3339 timestamp or YYYY-MM-DD")
        })
}

/// Normalize color (remove # and convert to lowercase)
pub fn normalize_color(color: &str) -> String {
    color.trim().trim_start_matches('#').to_lowercase()
}

fn is_remote_url(value: &str) -> bool {
    matches!(ConfigSource::resolve(value), ConfigSource::RemoteUrl(_))
}

fn deserialize_due_on<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|raw| parse_due_on(&raw).map_err(de::Error::custom))
        .transpose()
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
