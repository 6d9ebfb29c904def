//! Built-in engine capabilities.
//!
//! | Id                   | Handles                      | Emits                          |
//! |----------------------|------------------------------|--------------------------------|
//! | `engine.stats`       | every command (counts)       | `engine.stats_snapshot`        |
//! | `engine.sim.preview` | `request_engine_sim_preview` | `engine.sim_preview_snapshot`  |

use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::clock::now_millis;
use crate::commands::AppCommand;
use crate::config::RuntimeConfig;
use crate::engine::{Capability, CapabilityCatalog, CapabilityContext, CapabilityDefinition, EmitOptions, ExecuteOutcome};
use crate::error::{CapabilityError, RegistryError};
use crate::state::SceneState;

pub type AppCapabilityContext<'a> = CapabilityContext<'a, AppCommand, Value, SceneState>;
pub type AppCatalog = CapabilityCatalog<AppCommand, Value, SceneState>;

pub const STATS_ID: &str = "engine.stats";
pub const SIM_PREVIEW_ID: &str = "engine.sim.preview";

pub const STATS_SNAPSHOT_EVENT: &str = "engine.stats_snapshot";
pub const SIM_PREVIEW_SNAPSHOT_EVENT: &str = "engine.sim_preview_snapshot";

/// Command counters by kind and by envelope source.
#[derive(Debug, Default)]
pub struct StatsCapability {
    by_kind: BTreeMap<String, u64>,
    by_source: BTreeMap<String, u64>,
    total: u64,
}

impl StatsCapability {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Value {
        json!({
            "byKind": self.by_kind,
            "bySource": self.by_source,
            "generatedAt": now_millis(),
            "totalCommands": self.total,
        })
    }
}

impl Capability<AppCommand, Value, SceneState> for StatsCapability {
    fn id(&self) -> &str {
        STATS_ID
    }

    fn can_handle(&self, _command: &AppCommand) -> bool {
        true
    }

    fn execute(&mut self, ctx: &mut AppCapabilityContext<'_>) -> Result<ExecuteOutcome, CapabilityError> {
        *self.by_kind.entry(ctx.command().kind().to_string()).or_default() += 1;
        *self.by_source.entry(ctx.envelope.source.clone()).or_default() += 1;
        self.total += 1;

        if !matches!(ctx.command(), AppCommand::RequestEngineStats) {
            return Ok(ExecuteOutcome::CONTINUE);
        }
        ctx.emit(
            STATS_SNAPSHOT_EVENT,
            self.snapshot(),
            EmitOptions::from_source("engine.capability.stats"),
        );
        Ok(ExecuteOutcome::STOP)
    }
}

/// Read-only preview of the current scene for local simulation.
#[derive(Debug, Default)]
pub struct SimPreviewCapability;

impl SimPreviewCapability {
    fn snapshot(state: &SceneState) -> Value {
        let mut by_asset: BTreeMap<&str, u64> = BTreeMap::new();
        for placement in &state.placements {
            *by_asset.entry(placement.asset_id.as_str()).or_default() += 1;
        }
        json!({
            "byAsset": by_asset,
            "deferredRemoteCount": state.deferred.len(),
            "generatedAt": now_millis(),
            "sceneEditEnabled": state.edit_enabled,
            "sceneId": state.scene_id,
            "sceneRemoteHoldEnabled": state.hold.enabled,
            "selectedPlacementId": state.selected_placement,
            "totalPlacements": state.placements.len(),
        })
    }
}

impl Capability<AppCommand, Value, SceneState> for SimPreviewCapability {
    fn id(&self) -> &str {
        SIM_PREVIEW_ID
    }

    fn can_handle(&self, command: &AppCommand) -> bool {
        matches!(command, AppCommand::RequestEngineSimPreview)
    }

    fn execute(&mut self, ctx: &mut AppCapabilityContext<'_>) -> Result<ExecuteOutcome, CapabilityError> {
        let payload = Self::snapshot(ctx.state);
        ctx.emit(
            SIM_PREVIEW_SNAPSHOT_EVENT,
            payload,
            EmitOptions::from_source("engine.capability.sim_preview"),
        );
        Ok(ExecuteOutcome::STOP)
    }
}

/// Catalog of the built-in capabilities with defaults resolved from
/// `config`.
pub fn default_catalog(config: &RuntimeConfig) -> Result<AppCatalog, RegistryError> {
    let mut catalog = AppCatalog::new();
    catalog.define(CapabilityDefinition::new(
        STATS_ID,
        "Aggregated command counters by kind/source.",
        config.resolve_capability_default(STATS_ID, true),
        || Box::new(StatsCapability::new()),
    ))?;
    catalog.define(CapabilityDefinition::new(
        SIM_PREVIEW_ID,
        "Snapshot preview of current scene state for local simulation workflows.",
        config.resolve_capability_default(SIM_PREVIEW_ID, false),
        || Box::new(SimPreviewCapability),
    ))?;
    Ok(catalog)
}
