//! Orchestration for `releaser release-group` and `releaser release-entity`.
//!
//! Resolves the group, its release channel and the ordered steps from the
//! store, runs the pipeline and persists the release record.

use anyhow::{Context, Result, anyhow};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::core::types::{Record, ReleaseRecord, ReleaseTarget, StepResult};
use crate::io::shell::CommandRunner;
use crate::io::store::RecordStore;
use crate::pipeline::run_pipeline;

/// Payload returned to the caller of a release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseResponse {
    pub ok: bool,
    pub group_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    pub release_id: String,
    pub name: String,
    pub out: Vec<StepResult>,
}

/// Release every entity of a group through the group's channel.
#[instrument(skip_all, fields(group_id = %group_id))]
pub fn release_group<S: RecordStore, R: CommandRunner>(
    store: &S,
    runner: &R,
    group_id: &str,
) -> Result<ReleaseResponse> {
    let group = store
        .group(group_id)
        .with_context(|| format!("load group {group_id}"))?;
    let entities = store
        .group_entities(group_id)
        .with_context(|| format!("load entities of group {group_id}"))?;
    execute(store, runner, group_id, group, entities, None)
}

/// Release one entity through its group's channel.
#[instrument(skip_all, fields(entity_id = %entity_id))]
pub fn release_entity<S: RecordStore, R: CommandRunner>(
    store: &S,
    runner: &R,
    entity_id: &str,
) -> Result<ReleaseResponse> {
    let entity = store
        .entity(entity_id)
        .with_context(|| format!("load entity {entity_id}"))?;
    let group_id = text_field(&entity, "group")
        .ok_or_else(|| anyhow!("entity {entity_id} has no group"))?
        .to_string();
    let group = store
        .group(&group_id)
        .with_context(|| format!("load group {group_id}"))?;
    execute(
        store,
        runner,
        &group_id,
        group,
        vec![entity],
        Some(entity_id.to_string()),
    )
}

fn execute<S: RecordStore, R: CommandRunner>(
    store: &S,
    runner: &R,
    group_id: &str,
    group: Record,
    entities: Vec<Record>,
    entity_id: Option<String>,
) -> Result<ReleaseResponse> {
    let channel_id = text_field(&group, "release_channel")
        .ok_or_else(|| anyhow!("group has no release_channel"))?
        .to_string();
    let channel = store
        .release_channel(&channel_id)
        .with_context(|| format!("load release channel {channel_id}"))?;
    let steps = store
        .channel_steps(&channel_id)
        .with_context(|| format!("load steps of release channel {channel_id}"))?;

    let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let name = release_name(&group, group_id, &channel, &channel_id, &created_at);
    let release_id = Uuid::new_v4().to_string();
    info!(release_id = %release_id, name = %name, steps = steps.len(), "starting release");

    let target = ReleaseTarget { group, entities };
    let trace = run_pipeline(&steps, &target, runner);
    let ok = trace.ok();

    let record = ReleaseRecord {
        id: release_id.clone(),
        name: name.clone(),
        group: group_id.to_string(),
        entity: entity_id.clone(),
        release_channel: channel_id,
        status: ok,
        out: trace.results,
        created_at,
    };
    store.save_release(&record)?;
    info!(release_id = %release_id, ok, "release recorded");

    Ok(ReleaseResponse {
        ok,
        group_id: group_id.to_string(),
        entity_id,
        release_id,
        name,
        out: record.out,
    })
}

/// `<group> / <channel> / <timestamp>`, falling back to ids for unnamed records.
fn release_name(
    group: &Record,
    group_id: &str,
    channel: &Record,
    channel_id: &str,
    created_at: &str,
) -> String {
    let group_name = text_field(group, "name").unwrap_or(group_id);
    let channel_name = text_field(channel, "name").unwrap_or(channel_id);
    format!("{group_name} / {channel_name} / {created_at}")
}

fn text_field<'a>(record: &'a Record, key: &str) -> Option<&'a str> {
    record
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}
