//! Land-claim index for a block world.
//!
//! Tracks rectangular and cuboid claims per world, answers "which claim owns
//! this block" through a chunk-bucketed index, and coordinates sieges over
//! claims. [`build_headless_app`] wires the stores and the tick-driven jobs
//! into a Bevy [`App`]; [`run_tick`] advances it by one step.

pub mod chunk_index;
pub mod claim;
pub mod cleanup;
pub mod collaborators;
pub mod config;
pub mod geometry;
pub mod lifecycle;
pub mod overlap;
pub mod query;
pub mod scheduler;
pub mod siege;
pub mod store;
mod systems;

use bevy::prelude::*;

pub use chunk_index::{ChunkIndex, ChunkKey, DEFAULT_CHUNK_SHIFT};
pub use claim::{ClaimId, ClaimKind, ClaimRecord, ClaimState, PlayerId};
pub use cleanup::{sweep_unused_claims, CleanupReport, CleanupTelemetry};
pub use collaborators::{
    ChannelEventSink, ClaimEvent, ClaimEventSink, ClaimPersistence, NullEventSink,
    NullPersistence, OwnerActivity, OwnerActivityTable, OwnerOnlyTrust, PersistenceError,
    PlayerPresence, PlayerPresenceTable, TrustCheck,
};
pub use config::{
    load_claim_config_from_env, ClaimConfig, ClaimConfigError, ClaimConfigHandle,
    ClaimConfigMetadata, CleanupSettings, SiegeSettings,
};
pub use geometry::{BlockPos, ClaimBounds, GeometryError, Location, WorldId};
pub use lifecycle::{ClaimError, NewClaim};
pub use query::ClaimCache;
pub use scheduler::{ClaimJob, TaskHandle, TickScheduler};
pub use siege::{
    ImmunityReason, Siege, SiegeCoordinator, SiegeError, SiegeId, SiegeResolution, SiegeState,
};
pub use store::{ClaimHooks, ClaimIdAllocator, ClaimStore, ClaimWorlds, StoreSettings};
pub use systems::ClaimClock;

/// Construct a Bevy [`App`] holding the claim stores, siege coordinator and
/// job scheduler, configured from `CLAIM_CONFIG_PATH` or the builtin config.
pub fn build_headless_app() -> App {
    let (config, metadata) = load_claim_config_from_env();
    let mut app = build_headless_app_with(config, ClaimHooks::default());
    app.insert_resource(metadata);
    app
}

/// Same as [`build_headless_app`] with an explicit config and collaborators.
pub fn build_headless_app_with(config: std::sync::Arc<ClaimConfig>, hooks: ClaimHooks) -> App {
    let mut app = App::new();

    let worlds = ClaimWorlds::with_hooks(StoreSettings::from_config(&config), hooks);
    let sieges = SiegeCoordinator::new(config.siege.clone());

    app.insert_resource(ClaimConfigHandle::new(config))
        .insert_resource(worlds)
        .insert_resource(sieges)
        .insert_resource(TickScheduler::new())
        .insert_resource(ClaimClock::default())
        .insert_resource(PlayerPresenceTable::default())
        .insert_resource(OwnerActivityTable::default())
        .insert_resource(CleanupTelemetry::default())
        .add_plugins(MinimalPlugins)
        .add_systems(Startup, systems::schedule_cleanup)
        .add_systems(
            Update,
            (
                systems::advance_clock,
                systems::record_owner_activity,
                systems::dispatch_scheduled_jobs,
            )
                .chain(),
        );

    app
}

/// Advance the simulated clock one tick and run every job that came due
/// (clock → owner activity → scheduled jobs).
pub fn run_tick(app: &mut App) {
    app.update();
}
