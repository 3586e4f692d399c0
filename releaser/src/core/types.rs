//! Shared types for the release pipeline.
//!
//! These types are the stable contract between the record store, the step
//! actions and the pipeline executor. They carry no behavior beyond small
//! constructors and must serialize deterministically.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A record as read from the store: group, entity or release channel.
pub type Record = Map<String, Value>;

/// Canonical step configuration after normalization.
pub type ConfigMap = Map<String, Value>;

/// Step configuration as it arrives from storage.
///
/// The store does not guarantee that `config` is decoded; it may be a native
/// mapping, JSON text, or a raw byte buffer. Anything else ends up in
/// [`RawConfig::Other`] and is rejected during normalization.
///
/// JSON has no byte type, so deserialization never yields `Bytes`: a JSON
/// array is an array and lands in `Other`. `Bytes` is built by callers that
/// hold an undecoded buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawConfig {
    Map(ConfigMap),
    Text(String),
    Bytes(Vec<u8>),
    Other(Value),
}

impl Default for RawConfig {
    fn default() -> Self {
        RawConfig::Map(ConfigMap::new())
    }
}

impl From<Value> for RawConfig {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => RawConfig::Map(map),
            Value::String(text) => RawConfig::Text(text),
            other => RawConfig::Other(other),
        }
    }
}

impl<'de> Deserialize<'de> for RawConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(RawConfig::from)
    }
}

/// One configured unit of pipeline work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(default)]
    pub order: f64,
    #[serde(default)]
    pub config: RawConfig,
}

impl StepDefinition {
    /// Label used in the trace: the step name, else its id, else its type.
    pub fn display_name(&self) -> &str {
        if !self.name.trim().is_empty() {
            return &self.name;
        }
        match self.id.as_deref() {
            Some(id) if !id.trim().is_empty() => id,
            _ => &self.step_type,
        }
    }
}

/// Step types the executor knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Template,
    Shell,
    Unsupported,
}

impl StepKind {
    pub fn parse(step_type: &str) -> Self {
        match step_type {
            "template" => StepKind::Template,
            "shell" => StepKind::Shell,
            _ => StepKind::Unsupported,
        }
    }
}

/// Structured outcome of one executed unit (a step, or one fan-out iteration).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub status: bool,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl StepResult {
    pub fn success(name: &str, output: impl Into<String>) -> Self {
        Self {
            status: true,
            name: name.to_string(),
            output: Some(output.into()),
            error: None,
            meta: None,
        }
    }

    pub fn failure(name: &str, error: impl Into<String>) -> Self {
        Self {
            status: false,
            name: name.to_string(),
            output: None,
            error: Some(error.into()),
            meta: None,
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Group plus the entities a release targets.
///
/// For a single-entity release `entities` holds exactly that entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReleaseTarget {
    pub group: Record,
    pub entities: Vec<Record>,
}

/// Data a template is evaluated against.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(untagged)]
pub enum RenderContext<'a> {
    /// Normal mode: the whole entity list.
    Entities {
        group: &'a Record,
        entities: &'a [Record],
    },
    /// One fan-out iteration.
    Entity {
        group: &'a Record,
        entity: &'a Record,
    },
}

impl<'a> RenderContext<'a> {
    pub fn all(target: &'a ReleaseTarget) -> Self {
        RenderContext::Entities {
            group: &target.group,
            entities: &target.entities,
        }
    }

    pub fn single(target: &'a ReleaseTarget, entity: &'a Record) -> Self {
        RenderContext::Entity {
            group: &target.group,
            entity,
        }
    }
}

/// A persisted release: who was released through which channel, and the trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub id: String,
    pub name: String,
    pub group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    pub release_channel: String,
    /// Overall success flag of the run.
    pub status: bool,
    /// Full ordered trace of the run.
    pub out: Vec<StepResult>,
    /// RFC 3339 creation time.
    pub created_at: String,
}
