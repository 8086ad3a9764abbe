use bevy::{ecs::system::SystemParam, prelude::*};

use crate::cleanup::{sweep_unused_claims, CleanupTelemetry};
use crate::collaborators::{OwnerActivityTable, PlayerPresenceTable};
use crate::config::ClaimConfigHandle;
use crate::scheduler::{ClaimJob, TickScheduler};
use crate::siege::SiegeCoordinator;
use crate::store::ClaimWorlds;

/// Simulated wall clock driving siege checkups, access reverts and cleanup.
#[derive(Resource, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimClock {
    pub now_secs: u64,
    pub secs_per_tick: u64,
}

impl Default for ClaimClock {
    fn default() -> Self {
        Self {
            now_secs: 0,
            secs_per_tick: 1,
        }
    }
}

#[derive(SystemParam)]
pub struct JobDispatchParams<'w> {
    pub clock: Res<'w, ClaimClock>,
    pub config: Res<'w, ClaimConfigHandle>,
    pub scheduler: ResMut<'w, TickScheduler>,
    pub worlds: ResMut<'w, ClaimWorlds>,
    pub sieges: ResMut<'w, SiegeCoordinator>,
    pub presence: Res<'w, PlayerPresenceTable>,
    pub activity: Res<'w, OwnerActivityTable>,
    pub telemetry: ResMut<'w, CleanupTelemetry>,
}

pub fn advance_clock(mut clock: ResMut<ClaimClock>) {
    clock.now_secs = clock.now_secs.saturating_add(clock.secs_per_tick);
}

/// Arm the periodic unused-claim sweep.
pub fn schedule_cleanup(
    config: Res<ClaimConfigHandle>,
    clock: Res<ClaimClock>,
    mut scheduler: ResMut<TickScheduler>,
) {
    let config = config.get();
    if !config.cleanup.enabled {
        tracing::info!(target: "claims::cleanup", "cleanup.disabled");
        return;
    }
    scheduler.run_periodically(
        clock.now_secs,
        config.cleanup.interval_secs,
        ClaimJob::CleanupSweep,
    );
}

/// Online players count as active owners.
pub fn record_owner_activity(
    clock: Res<ClaimClock>,
    presence: Res<PlayerPresenceTable>,
    mut activity: ResMut<OwnerActivityTable>,
) {
    for player in presence.online() {
        activity.record(player, clock.now_secs);
    }
}

/// Run every scheduled job that has come due.
pub fn dispatch_scheduled_jobs(mut params: JobDispatchParams) {
    let now = params.clock.now_secs;
    for (handle, job) in params.scheduler.drain_due(now) {
        match job {
            ClaimJob::SiegeCheckup(siege) => {
                params.sieges.checkup(
                    &mut params.worlds,
                    &mut params.scheduler,
                    now,
                    siege,
                    &*params.presence,
                );
            }
            ClaimJob::CloseAccess { world, claim } => {
                let reverted = params
                    .worlds
                    .existing_store_mut(world)
                    .is_some_and(|store| store.set_access_override(claim, false));
                tracing::debug!(
                    target: "claims::siege",
                    claim = %claim,
                    reverted,
                    "siege.access_closed"
                );
            }
            ClaimJob::CleanupSweep => {
                let settings = params.config.get().cleanup.clone();
                let report =
                    sweep_unused_claims(&mut params.worlds, &*params.activity, now, &settings);
                params.telemetry.record(now, &report);
            }
        }
        tracing::trace!(target: "claims::scheduler", handle = handle.0, "job.dispatched");
    }
}
