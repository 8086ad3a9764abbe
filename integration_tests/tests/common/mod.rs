use std::path::PathBuf;
use std::sync::Once;

use claim_core::{ClaimId, ClaimWorlds, Location, NewClaim, PlayerId, WorldId};

static INIT: Once = Once::new();

pub const OVERWORLD: WorldId = WorldId(0);

#[allow(dead_code)]
pub fn fixture_config_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("test_claim_config.json")
}

#[allow(dead_code)]
pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = fixture_config_path();

        debug_assert!(
            config_path.exists(),
            "missing test claim config at {}",
            config_path.display()
        );

        std::env::set_var("CLAIM_CONFIG_PATH", &config_path);
    });
}

/// Flat basic claim between two columns at surface height.
#[allow(dead_code)]
pub fn plot(worlds: &mut ClaimWorlds, x1: i32, z1: i32, x2: i32, z2: i32, owner: u64) -> ClaimId {
    worlds
        .create(NewClaim::basic(
            Location::new(OVERWORLD, x1, 64, z1),
            Location::new(OVERWORLD, x2, 64, z2),
            PlayerId(owner),
        ))
        .expect("plot should not conflict")
}
