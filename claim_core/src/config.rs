use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bevy::prelude::Resource;
use serde::Deserialize;
use thiserror::Error;

use crate::chunk_index::{DEFAULT_CHUNK_SHIFT, MAX_CHUNK_SHIFT};

pub const BUILTIN_CLAIM_CONFIG: &str = include_str!("data/claim_config.json");

/// Environment variable naming a JSON file that replaces the builtin config.
pub const CLAIM_CONFIG_ENV: &str = "CLAIM_CONFIG_PATH";

/// Chunks a widest-allowed claim may span along one axis.
pub const MAX_CHUNK_SPAN: i64 = 4096;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClaimConfig {
    pub world: WorldSettings,
    pub claims: ClaimRules,
    pub siege: SiegeSettings,
    pub cleanup: CleanupSettings,
}

impl ClaimConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_CLAIM_CONFIG).expect("builtin claim config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, ClaimConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ClaimConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ClaimConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let config = ClaimConfig::from_json_str(&contents)?;
        Ok(config)
    }

    /// Reject settings the stores cannot run with.
    pub fn validate(&self) -> Result<(), ClaimConfigError> {
        let world = &self.world;
        let claims = &self.claims;
        if world.min_y > world.max_y {
            return Err(ClaimConfigError::invalid(format!(
                "world.min_y ({}) is above world.max_y ({})",
                world.min_y, world.max_y
            )));
        }
        if world.chunk_shift > MAX_CHUNK_SHIFT {
            return Err(ClaimConfigError::invalid(format!(
                "world.chunk_shift ({}) must be at most {MAX_CHUNK_SHIFT}",
                world.chunk_shift
            )));
        }
        if claims.min_width < 1 || claims.min_area < 0 {
            return Err(ClaimConfigError::invalid(format!(
                "claims.min_width ({}) must be positive and claims.min_area ({}) non-negative",
                claims.min_width, claims.min_area
            )));
        }
        if claims.max_claim_width < claims.min_width {
            return Err(ClaimConfigError::invalid(format!(
                "claims.max_claim_width ({}) is below claims.min_width ({})",
                claims.max_claim_width, claims.min_width
            )));
        }
        let span = ((claims.max_claim_width - 1) >> world.chunk_shift) + 2;
        if span > MAX_CHUNK_SPAN {
            return Err(ClaimConfigError::invalid(format!(
                "claims.max_claim_width ({}) spans {span} chunks, more than {MAX_CHUNK_SPAN}",
                claims.max_claim_width
            )));
        }
        if self.siege.presence_radius < 0 {
            return Err(ClaimConfigError::invalid(format!(
                "siege.presence_radius ({}) is negative",
                self.siege.presence_radius
            )));
        }
        Ok(())
    }

    /// Lowest Y that depth extension may reach.
    pub fn depth_floor(&self) -> i32 {
        self.claims.min_depth.max(self.world.min_y)
    }
}

#[derive(Debug, Error)]
pub enum ClaimConfigError {
    #[error("failed to parse claim config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read claim config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid claim config: {reason}")]
    Invalid { reason: String },
}

impl ClaimConfigError {
    fn invalid(reason: String) -> Self {
        Self::Invalid { reason }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorldSettings {
    pub min_y: i32,
    pub max_y: i32,
    pub chunk_shift: u32,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            min_y: -64,
            max_y: 319,
            chunk_shift: DEFAULT_CHUNK_SHIFT,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClaimRules {
    pub min_depth: i32,
    pub min_width: i64,
    pub min_area: i64,
    /// Widest footprint, in blocks along either axis, of any top-level claim.
    pub max_claim_width: i64,
}

impl Default for ClaimRules {
    fn default() -> Self {
        Self {
            min_depth: -64,
            min_width: 5,
            min_area: 100,
            max_claim_width: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SiegeSettings {
    pub cooldown_secs: u64,
    pub defender_grace_secs: u64,
    pub checkup_interval_secs: u64,
    pub access_open_secs: u64,
    pub presence_radius: i32,
}

impl Default for SiegeSettings {
    fn default() -> Self {
        Self {
            cooldown_secs: 3600,
            defender_grace_secs: 300,
            checkup_interval_secs: 30,
            access_open_secs: 300,
            presence_radius: 25,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CleanupSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    pub expiration_days: u64,
    pub max_claims_per_sweep: usize,
}

impl CleanupSettings {
    pub fn expiration_secs(&self) -> u64 {
        self.expiration_days.saturating_mul(24 * 60 * 60)
    }
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            expiration_days: 60,
            max_claims_per_sweep: 50,
        }
    }
}

#[derive(Resource, Debug, Clone)]
pub struct ClaimConfigHandle(Arc<ClaimConfig>);

impl ClaimConfigHandle {
    pub fn new(config: Arc<ClaimConfig>) -> Self {
        Self(config)
    }

    pub fn get(&self) -> Arc<ClaimConfig> {
        self.0.clone()
    }
}

/// Metadata about where the active claim config came from.
#[derive(Resource, Debug, Clone, Default)]
pub struct ClaimConfigMetadata {
    path: Option<PathBuf>,
}

impl ClaimConfigMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

/// Load the claim config named by `CLAIM_CONFIG_PATH`, falling back to the builtin.
pub fn load_claim_config_from_env() -> (Arc<ClaimConfig>, ClaimConfigMetadata) {
    let Some(path) = env::var(CLAIM_CONFIG_ENV).ok().map(PathBuf::from) else {
        tracing::info!(target: "claims::config", "claim_config.loaded=builtin");
        return (ClaimConfig::builtin(), ClaimConfigMetadata::new(None));
    };

    match ClaimConfig::from_file(&path) {
        Ok(config) => {
            tracing::info!(
                target: "claims::config",
                path = %path.display(),
                "claim_config.loaded=file"
            );
            (Arc::new(config), ClaimConfigMetadata::new(Some(path)))
        }
        Err(err) => {
            tracing::warn!(
                target: "claims::config",
                path = %path.display(),
                error = %err,
                "claim_config.load_failed"
            );
            (ClaimConfig::builtin(), ClaimConfigMetadata::new(None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_config_matches_defaults() {
        let config = ClaimConfig::builtin();
        assert_eq!(*config, ClaimConfig::default());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            ClaimConfig::from_json_str(r#"{ "siege": { "cooldown_secs": 60 } }"#).unwrap();
        assert_eq!(config.siege.cooldown_secs, 60);
        assert_eq!(config.siege.checkup_interval_secs, 30);
        assert_eq!(config.world.chunk_shift, 4);
    }

    #[test]
    fn depth_floor_respects_world_bottom() {
        let mut config = ClaimConfig::default();
        config.claims.min_depth = -500;
        assert_eq!(config.depth_floor(), -64);
        config.claims.min_depth = 0;
        assert_eq!(config.depth_floor(), 0);
    }

    #[test]
    fn inverted_build_range_is_rejected() {
        let err = ClaimConfig::from_json_str(r#"{ "world": { "min_y": 300, "max_y": 0 } }"#)
            .unwrap_err();
        assert!(
            matches!(&err, ClaimConfigError::Invalid { reason } if reason.contains("world.min_y")),
            "{err}"
        );
    }

    #[test]
    fn oversized_chunk_shift_is_rejected() {
        for shift in [32, 40, u32::MAX] {
            let json = format!(r#"{{ "world": {{ "chunk_shift": {shift} }} }}"#);
            let err = ClaimConfig::from_json_str(&json).unwrap_err();
            assert!(matches!(err, ClaimConfigError::Invalid { .. }), "shift {shift}: {err}");
        }
        let widest = ClaimConfig::from_json_str(
            r#"{ "world": { "chunk_shift": 31 }, "claims": { "max_claim_width": 4000000000 } }"#,
        )
        .unwrap();
        assert_eq!(widest.world.chunk_shift, MAX_CHUNK_SHIFT);
    }

    #[test]
    fn claim_width_limit_must_fit_the_index() {
        let err = ClaimConfig::from_json_str(r#"{ "claims": { "max_claim_width": 4 } }"#)
            .unwrap_err();
        assert!(matches!(err, ClaimConfigError::Invalid { .. }));
        let err = ClaimConfig::from_json_str(
            r#"{ "world": { "chunk_shift": 0 }, "claims": { "max_claim_width": 10000 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ClaimConfigError::Invalid { .. }));
        assert!(ClaimConfig::default().validate().is_ok());
    }

    #[test]
    fn invalid_file_is_reported_not_loaded() {
        let path = env::temp_dir().join(format!("claim_config_invalid_{}.json", std::process::id()));
        fs::write(&path, r#"{ "world": { "min_y": 10, "max_y": -10 } }"#).unwrap();
        let result = ClaimConfig::from_file(&path);
        fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ClaimConfigError::Invalid { .. })));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ClaimConfig::from_file(Path::new("/nonexistent/claim_config.json")).unwrap_err();
        assert!(matches!(err, ClaimConfigError::ReadFailed { .. }));
    }

    #[test]
    fn expiration_in_seconds() {
        let cleanup = CleanupSettings {
            expiration_days: 2,
            ..CleanupSettings::default()
        };
        assert_eq!(cleanup.expiration_secs(), 172_800);
    }
}
