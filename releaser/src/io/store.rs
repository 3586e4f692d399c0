//! Record store seam plus a JSON-directory implementation.
//!
//! Layout of [`JsonDirStore`]:
//!
//! ```text
//! <store_dir>/
//!   groups/<id>.json
//!   entities/<id>.json
//!   release_channels/<id>.json
//!   release_steps/<id>.json
//!   releases/<id>.json
//! ```
//!
//! Every file holds one JSON object. A record without an `id` field takes the
//! file stem as its id.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::{Validator, validator_for};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::types::{Record, ReleaseRecord, StepDefinition};

pub const GROUPS: &str = "groups";
pub const ENTITIES: &str = "entities";
pub const RELEASE_CHANNELS: &str = "release_channels";
pub const RELEASE_STEPS: &str = "release_steps";
pub const RELEASES: &str = "releases";

const STEP_SCHEMA: &str = include_str!("../../schemas/release_step.schema.json");

/// Read/write access to the records a release needs.
pub trait RecordStore {
    fn group(&self, id: &str) -> Result<Record>;
    fn entity(&self, id: &str) -> Result<Record>;
    /// Entities whose `group` field equals `group_id`, sorted by name then id.
    fn group_entities(&self, group_id: &str) -> Result<Vec<Record>>;
    fn release_channel(&self, id: &str) -> Result<Record>;
    /// Steps whose `release_channel` field equals `channel_id`, in execution order.
    fn channel_steps(&self, channel_id: &str) -> Result<Vec<StepDefinition>>;
    fn save_release(&self, release: &ReleaseRecord) -> Result<()>;
    fn release(&self, id: &str) -> Result<ReleaseRecord>;
}

/// Store backed by one JSON file per record.
pub struct JsonDirStore {
    root: PathBuf,
    step_validator: Validator,
}

impl JsonDirStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let schema: Value = serde_json::from_str(STEP_SCHEMA).context("parse step schema")?;
        let step_validator =
            validator_for(&schema).map_err(|err| anyhow!("invalid step schema: {}", err))?;
        Ok(Self {
            root: root.into(),
            step_validator,
        })
    }

    fn record_path(&self, collection: &str, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.root.join(collection).join(format!("{id}.json")))
    }

    fn load(&self, collection: &str, id: &str) -> Result<Record> {
        let path = self.record_path(collection, id)?;
        if !path.exists() {
            bail!("{} record {:?} not found", collection, id);
        }
        read_record(&path)
    }

    /// All records of a collection, in file name order. A missing collection is empty.
    fn list(&self, collection: &str) -> Result<Vec<Record>> {
        let dir = self.root.join(collection);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("read dir {}", dir.display()))? {
            let path = entry
                .with_context(|| format!("read dir entry in {}", dir.display()))?
                .path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();
        paths.iter().map(|path| read_record(path)).collect()
    }

    fn parse_step(&self, record: Record) -> Result<StepDefinition> {
        let value = Value::Object(record);
        if !self.step_validator.is_valid(&value) {
            let messages = self
                .step_validator
                .iter_errors(&value)
                .map(|err| err.to_string())
                .collect::<Vec<_>>();
            bail!(
                "step {} failed schema validation: {}",
                record_label(&value),
                messages.join("; ")
            );
        }
        serde_json::from_value(value).context("deserialize step")
    }
}

impl RecordStore for JsonDirStore {
    fn group(&self, id: &str) -> Result<Record> {
        self.load(GROUPS, id)
    }

    fn entity(&self, id: &str) -> Result<Record> {
        self.load(ENTITIES, id)
    }

    #[instrument(skip(self))]
    fn group_entities(&self, group_id: &str) -> Result<Vec<Record>> {
        let mut entities: Vec<Record> = self
            .list(ENTITIES)?
            .into_iter()
            .filter(|record| field_str(record, "group") == Some(group_id))
            .collect();
        entities.sort_by(|a, b| {
            field_str(a, "name")
                .cmp(&field_str(b, "name"))
                .then_with(|| field_str(a, "id").cmp(&field_str(b, "id")))
        });
        debug!(count = entities.len(), "loaded group entities");
        Ok(entities)
    }

    fn release_channel(&self, id: &str) -> Result<Record> {
        self.load(RELEASE_CHANNELS, id)
    }

    #[instrument(skip(self))]
    fn channel_steps(&self, channel_id: &str) -> Result<Vec<StepDefinition>> {
        let mut steps = self
            .list(RELEASE_STEPS)?
            .into_iter()
            .filter(|record| field_str(record, "release_channel") == Some(channel_id))
            .map(|record| self.parse_step(record))
            .collect::<Result<Vec<_>>>()?;
        steps.sort_by(compare_steps);
        debug!(count = steps.len(), "loaded channel steps");
        Ok(steps)
    }

    fn save_release(&self, release: &ReleaseRecord) -> Result<()> {
        let path = self.record_path(RELEASES, &release.id)?;
        let mut buf = serde_json::to_string_pretty(release).context("serialize release")?;
        buf.push('\n');
        crate::io::fs::write_atomic(&path, &buf)
            .with_context(|| format!("persist release {}", release.id))
    }

    fn release(&self, id: &str) -> Result<ReleaseRecord> {
        let record = self.load(RELEASES, id)?;
        serde_json::from_value(Value::Object(record))
            .with_context(|| format!("deserialize release {id}"))
    }
}

/// Execution order: ascending `order`, ties broken by id.
pub fn compare_steps(a: &StepDefinition, b: &StepDefinition) -> Ordering {
    a.order
        .total_cmp(&b.order)
        .then_with(|| a.id.as_deref().cmp(&b.id.as_deref()))
}

fn read_record(path: &Path) -> Result<Record> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read record {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse record {}", path.display()))?;
    let Value::Object(mut record) = value else {
        bail!("record {} is not a JSON object", path.display());
    };
    if !record.contains_key("id") {
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            record.insert("id".to_string(), Value::String(stem.to_string()));
        }
    }
    Ok(record)
}

fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) {
        bail!("invalid record id {:?}", id);
    }
    Ok(())
}

fn field_str<'a>(record: &'a Record, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str)
}

fn record_label(value: &Value) -> String {
    value
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or("<unknown>")
        .to_string()
}
