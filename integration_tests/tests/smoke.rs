mod common;

use claim_core::{
    build_headless_app, run_tick, ClaimClock, ClaimConfigHandle, ClaimConfigMetadata, ClaimWorlds,
    CleanupTelemetry, OwnerActivityTable, PlayerId,
};
use common::{plot, OVERWORLD};

#[test]
fn app_initializes_from_fixture_config() {
    common::ensure_test_config();
    let mut app = build_headless_app();
    run_tick(&mut app);

    let metadata = app.world.resource::<ClaimConfigMetadata>();
    assert_eq!(metadata.path(), Some(&common::fixture_config_path()));
    let config = app.world.resource::<ClaimConfigHandle>().get();
    assert_eq!(config.siege.checkup_interval_secs, 10);
    assert_eq!(app.world.resource::<ClaimWorlds>().settings().depth_floor, -32);
    assert_eq!(app.world.resource::<ClaimClock>().now_secs, 1);
}

#[test]
fn cleanup_expires_claims_of_absent_owners() {
    common::ensure_test_config();
    let mut app = build_headless_app();
    app.world.resource_mut::<ClaimClock>().secs_per_tick = 600;

    let (stale, active) = {
        let mut worlds = app.world.resource_mut::<ClaimWorlds>();
        (
            plot(&mut worlds, 0, 0, 30, 30, 1),
            plot(&mut worlds, 100, 0, 130, 30, 2),
        )
    };
    {
        let mut activity = app.world.resource_mut::<OwnerActivityTable>();
        activity.record(PlayerId(1), 0);
        activity.record(PlayerId(2), 0);
    }

    // One simulated day and a bit, refreshing the second owner along the way.
    for tick in 0..150 {
        if tick % 10 == 0 {
            let now = app.world.resource::<ClaimClock>().now_secs;
            app.world
                .resource_mut::<OwnerActivityTable>()
                .record(PlayerId(2), now);
        }
        run_tick(&mut app);
    }

    let worlds = app.world.resource::<ClaimWorlds>();
    assert!(worlds.claim(OVERWORLD, stale).is_none());
    assert!(worlds.claim(OVERWORLD, active).is_some());
    let telemetry = app.world.resource::<CleanupTelemetry>();
    assert_eq!(telemetry.claims_removed, 1);
    assert!(telemetry.sweeps >= 140);
}
