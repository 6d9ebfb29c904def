//! Runtime configuration with `SCENELINK_*` environment overrides.
//!
//! Invalid overrides are never fatal: the offending key is logged at warn
//! and the default is kept.

use std::collections::HashSet;
use std::time::Duration;

use crate::deferred::DeferredApplyMode;
use crate::error::ConfigError;
use crate::sync::HoldReleasePolicy;

pub const ENV_PREFIX: &str = "SCENELINK_";

/// Preset that decides which optional capabilities start enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CapabilityProfile {
    Demo,
    #[default]
    Dev,
    Ops,
}

impl CapabilityProfile {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "demo" => Some(Self::Demo),
            "dev" => Some(Self::Dev),
            "ops" => Some(Self::Ops),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Demo => "demo",
            Self::Dev => "dev",
            Self::Ops => "ops",
        }
    }

    /// Preset default for `id`, or `None` when the profile is silent.
    pub fn preset(&self, id: &str) -> Option<bool> {
        match (self, id) {
            (Self::Demo, "engine.sim.preview") => Some(true),
            (Self::Dev, "engine.stats" | "engine.sim.preview") => Some(true),
            (Self::Ops, "engine.stats") => Some(true),
            (Self::Ops, "engine.sim.preview") => Some(false),
            _ => None,
        }
    }
}

/// Client runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Maximum deferred remote updates kept while hold is on
    pub deferred_queue_limit: usize,
    /// Entries replayed by a deferred apply
    pub deferred_apply_mode: DeferredApplyMode,
    /// Apply the deferred queue when hold is released
    pub auto_apply_on_release: bool,
    /// Wait for an explicit apply after releasing hold
    pub require_confirm_on_release: bool,
    /// Delay before a reconnect attempt
    pub reconnect_delay: Duration,
    /// Undo history depth
    pub undo_limit: usize,
    /// Scene event log capacity
    pub event_log_limit: usize,
    /// Send local scene edits to the bridge as patches
    pub publish_local_edits: bool,
    pub bridge_url: String,
    pub bridge_enabled: bool,
    pub scene_id: String,
    pub scene_edit_enabled: bool,
    pub capability_profile: CapabilityProfile,
    /// Capability ids forced on
    pub capabilities_enabled: Vec<String>,
    /// Capability ids forced off (wins over `capabilities_enabled`)
    pub capabilities_disabled: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            deferred_queue_limit: 120,
            deferred_apply_mode: DeferredApplyMode::LatestOnly,
            auto_apply_on_release: true,
            require_confirm_on_release: false,
            reconnect_delay: Duration::from_millis(1200),
            undo_limit: 80,
            event_log_limit: 300,
            publish_local_edits: false,
            bridge_url: "ws://localhost:8765".to_string(),
            bridge_enabled: true,
            scene_id: "scene-1".to_string(),
            scene_edit_enabled: true,
            capability_profile: CapabilityProfile::Dev,
            capabilities_enabled: Vec::new(),
            capabilities_disabled: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    /// Defaults overlaid with `SCENELINK_*` process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values returned by `lookup` for each
    /// `SCENELINK_*` key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let read = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(|value| (key, value))
        };

        if let Some((key, value)) = read("DEFERRED_QUEUE_LIMIT") {
            overlay(&mut config.deferred_queue_limit, parse_positive(&key, &value));
        }
        if let Some((key, value)) = read("DEFERRED_APPLY_MODE") {
            let mode = DeferredApplyMode::parse(&value).ok_or(ConfigError::UnknownValue { key, value });
            overlay(&mut config.deferred_apply_mode, mode);
        }
        if let Some((key, value)) = read("DEFERRED_AUTO_APPLY_ON_RELEASE") {
            overlay(&mut config.auto_apply_on_release, parse_bool(&key, &value));
        }
        if let Some((key, value)) = read("DEFERRED_REQUIRE_CONFIRM_ON_RELEASE") {
            overlay(&mut config.require_confirm_on_release, parse_bool(&key, &value));
        }
        if let Some((key, value)) = read("RECONNECT_MS") {
            let millis = parse_positive(&key, &value).map(|millis| Duration::from_millis(millis as u64));
            overlay(&mut config.reconnect_delay, millis);
        }
        if let Some((key, value)) = read("UNDO_LIMIT") {
            overlay(&mut config.undo_limit, parse_positive(&key, &value));
        }
        if let Some((key, value)) = read("EVENT_LOG_LIMIT") {
            overlay(&mut config.event_log_limit, parse_positive(&key, &value));
        }
        if let Some((key, value)) = read("PUBLISH_LOCAL_EDITS") {
            overlay(&mut config.publish_local_edits, parse_bool(&key, &value));
        }
        if let Some((_, value)) = read("BRIDGE_URL") {
            config.bridge_url = value;
        }
        if let Some((key, value)) = read("BRIDGE_ENABLED") {
            overlay(&mut config.bridge_enabled, parse_bool(&key, &value));
        }
        if let Some((_, value)) = read("SCENE_ID") {
            config.scene_id = value;
        }
        if let Some((key, value)) = read("CAPABILITY_PROFILE") {
            let profile = CapabilityProfile::parse(&value).ok_or(ConfigError::UnknownValue { key, value });
            overlay(&mut config.capability_profile, profile);
        }
        if let Some((_, value)) = read("CAPABILITIES_ENABLED") {
            config.capabilities_enabled = parse_id_list(&value);
        }
        if let Some((_, value)) = read("CAPABILITIES_DISABLED") {
            config.capabilities_disabled = parse_id_list(&value);
        }
        config
    }

    /// Whether capability `id` starts enabled.
    ///
    /// Disable list, then enable list, then the profile preset, then
    /// `fallback`.
    pub fn resolve_capability_default(&self, id: &str, fallback: bool) -> bool {
        if self.capabilities_disabled.iter().any(|disabled| disabled == id) {
            return false;
        }
        if self.capabilities_enabled.iter().any(|enabled| enabled == id) {
            return true;
        }
        self.capability_profile.preset(id).unwrap_or(fallback)
    }

    pub fn hold_release_policy(&self) -> HoldReleasePolicy {
        HoldReleasePolicy {
            auto_apply_on_release: self.auto_apply_on_release,
            require_confirm_on_release: self.require_confirm_on_release,
        }
    }
}

fn overlay<T>(slot: &mut T, parsed: Result<T, ConfigError>) {
    match parsed {
        Ok(value) => *slot = value,
        Err(err) => log::warn!("ignoring config override: {err}"),
    }
}

/// `1|true|yes|on` or `0|false|no|off`, case-insensitive.
pub fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Strictly positive integer.
pub fn parse_positive(key: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|parsed| *parsed > 0)
        .ok_or_else(|| ConfigError::InvalidInteger {
            key: key.to_string(),
            value: value.to_string(),
        })
}

/// Comma-separated ids, trimmed and deduplicated in first-seen order.
pub fn parse_id_list(value: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty() && seen.insert(*id))
        .map(str::to_string)
        .collect()
}
