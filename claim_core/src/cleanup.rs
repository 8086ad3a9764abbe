//! Expiry of claims whose owners stopped playing.

use bevy::prelude::Resource;

use crate::claim::ClaimId;
use crate::collaborators::OwnerActivity;
use crate::config::CleanupSettings;
use crate::geometry::WorldId;
use crate::store::ClaimWorlds;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub examined: usize,
    pub removed: Vec<(WorldId, ClaimId)>,
    pub skipped_unknown_owner: usize,
    pub skipped_sieged: usize,
}

/// Running totals across sweeps.
#[derive(Resource, Debug, Default, Clone)]
pub struct CleanupTelemetry {
    pub sweeps: u64,
    pub claims_removed: u64,
    pub last_sweep_at: Option<u64>,
}

impl CleanupTelemetry {
    pub fn record(&mut self, now: u64, report: &CleanupReport) {
        self.sweeps += 1;
        self.claims_removed += report.removed.len() as u64;
        self.last_sweep_at = Some(now);
    }
}

/// Delete top-level claims whose owner has been away longer than the
/// configured expiration.
///
/// Administrative claims and claims under siege are never touched. Owners
/// with no recorded activity are skipped. At most `max_claims_per_sweep`
/// claims go per call; the rest wait for the next sweep.
pub fn sweep_unused_claims(
    worlds: &mut ClaimWorlds,
    activity: &dyn OwnerActivity,
    now: u64,
    settings: &CleanupSettings,
) -> CleanupReport {
    let mut report = CleanupReport::default();
    if !settings.enabled {
        return report;
    }
    let expiration = settings.expiration_secs();

    let mut expired = Vec::new();
    'worlds: for store in worlds.stores() {
        for claim in store.top_level_claims() {
            let Some(owner) = claim.owner() else {
                continue;
            };
            report.examined += 1;
            if claim.siege().is_some() {
                report.skipped_sieged += 1;
                continue;
            }
            let Some(last_seen) = activity.last_seen_secs(owner) else {
                tracing::warn!(
                    target: "claims::cleanup",
                    claim = %claim.id(),
                    %owner,
                    "cleanup.skipped=unknown_owner"
                );
                report.skipped_unknown_owner += 1;
                continue;
            };
            if now.saturating_sub(last_seen) >= expiration {
                expired.push((store.world(), claim.id()));
                if expired.len() >= settings.max_claims_per_sweep {
                    break 'worlds;
                }
            }
        }
    }

    for (world, id) in expired {
        match worlds.delete(world, id, true) {
            Ok(_) => report.removed.push((world, id)),
            Err(err) => tracing::warn!(
                target: "claims::cleanup",
                claim = %id,
                error = %err,
                "cleanup.delete_failed"
            ),
        }
    }

    tracing::info!(
        target: "claims::cleanup",
        examined = report.examined,
        removed = report.removed.len(),
        skipped_unknown_owner = report.skipped_unknown_owner,
        "cleanup.sweep_completed"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::PlayerId;
    use crate::collaborators::OwnerActivityTable;
    use crate::geometry::Location;
    use crate::lifecycle::NewClaim;
    use crate::siege::SiegeId;

    const WORLD: WorldId = WorldId(0);
    const DAY: u64 = 24 * 60 * 60;

    fn plot(worlds: &mut ClaimWorlds, x: i32, owner: PlayerId) -> ClaimId {
        worlds
            .create(NewClaim::basic(
                Location::new(WORLD, x, 64, 0),
                Location::new(WORLD, x + 20, 64, 20),
                owner,
            ))
            .unwrap()
    }

    #[test]
    fn removes_only_long_absent_owners() {
        let mut worlds = ClaimWorlds::default();
        let stale = plot(&mut worlds, 0, PlayerId(1));
        let fresh = plot(&mut worlds, 100, PlayerId(2));
        let mut activity = OwnerActivityTable::default();
        activity.record(PlayerId(1), 0);
        activity.record(PlayerId(2), 50 * DAY);

        let report =
            sweep_unused_claims(&mut worlds, &activity, 61 * DAY, &CleanupSettings::default());
        assert_eq!(report.removed, vec![(WORLD, stale)]);
        assert!(worlds.claim(WORLD, stale).is_none());
        assert!(worlds.claim(WORLD, fresh).is_some());
    }

    #[test]
    fn skips_admin_sieged_and_unknown_owners() {
        let mut worlds = ClaimWorlds::default();
        worlds
            .create(NewClaim::admin(
                Location::new(WORLD, -100, 64, -100),
                Location::new(WORLD, -50, 64, -50),
            ))
            .unwrap();
        let sieged = plot(&mut worlds, 0, PlayerId(1));
        worlds.store_mut(WORLD).set_siege(sieged, Some(SiegeId(1)));
        plot(&mut worlds, 100, PlayerId(3));
        let mut activity = OwnerActivityTable::default();
        activity.record(PlayerId(1), 0);

        let report =
            sweep_unused_claims(&mut worlds, &activity, 365 * DAY, &CleanupSettings::default());
        assert!(report.removed.is_empty());
        assert_eq!(report.examined, 2);
        assert_eq!(report.skipped_sieged, 1);
        assert_eq!(report.skipped_unknown_owner, 1);
        assert_eq!(worlds.store(WORLD).unwrap().len(), 3);
    }

    #[test]
    fn sweep_is_capped_and_can_be_disabled() {
        let mut worlds = ClaimWorlds::default();
        let mut activity = OwnerActivityTable::default();
        for i in 0..5 {
            plot(&mut worlds, i * 100, PlayerId(1));
        }
        activity.record(PlayerId(1), 0);

        let disabled = CleanupSettings {
            enabled: false,
            ..CleanupSettings::default()
        };
        assert_eq!(
            sweep_unused_claims(&mut worlds, &activity, 100 * DAY, &disabled),
            CleanupReport::default()
        );

        let capped = CleanupSettings {
            max_claims_per_sweep: 2,
            ..CleanupSettings::default()
        };
        let report = sweep_unused_claims(&mut worlds, &activity, 100 * DAY, &capped);
        assert_eq!(report.removed.len(), 2);
        assert_eq!(worlds.store(WORLD).unwrap().len(), 3);

        let mut telemetry = CleanupTelemetry::default();
        telemetry.record(100 * DAY, &report);
        assert_eq!(telemetry.claims_removed, 2);
        assert_eq!(telemetry.last_sweep_at, Some(100 * DAY));
    }
}
