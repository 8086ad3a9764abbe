use claim_core::{BlockPos, ClaimStore, Location, NewClaim, PlayerId, StoreSettings, WorldId};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::SmallRng, Rng, SeedableRng};

const WORLD: WorldId = WorldId(0);

/// Lay claims out on a grid with gaps so every create succeeds.
fn populated_store(claims: i32) -> ClaimStore {
    let mut store = ClaimStore::new(WORLD, StoreSettings::default());
    let side = (claims as f64).sqrt().ceil() as i32;
    for i in 0..claims {
        let x = (i % side) * 40;
        let z = (i / side) * 40;
        let _ = store.create(NewClaim::basic(
            Location::new(WORLD, x, 64, z),
            Location::new(WORLD, x + 30, 64, z + 30),
            PlayerId(i as u64),
        ));
    }
    store
}

fn random_points(count: usize, extent: i32) -> Vec<BlockPos> {
    let mut rng = SmallRng::seed_from_u64(0x5eed);
    (0..count)
        .map(|_| BlockPos::new(rng.gen_range(0..extent), 64, rng.gen_range(0..extent)))
        .collect()
}

fn bench_find_claim_at(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_claim_at");

    for claims in [100, 1_000, 10_000] {
        let store = populated_store(claims);
        let extent = ((claims as f64).sqrt().ceil() as i32) * 40;
        let points = random_points(1_024, extent);

        group.bench_with_input(BenchmarkId::new("single", claims), &points, |b, points| {
            b.iter(|| {
                points
                    .iter()
                    .filter(|point| !store.find_claim_at(**point, true, None).is_wilderness())
                    .count()
            })
        });
        group.bench_with_input(BenchmarkId::new("batch", claims), &points, |b, points| {
            b.iter(|| store.find_claims_at_many(points, true))
        });
    }

    group.finish();
}

fn bench_create(c: &mut Criterion) {
    c.bench_function("create_1000_claims", |b| b.iter(|| populated_store(1_000)));
}

criterion_group!(query_benches, bench_find_claim_at, bench_create);
criterion_main!(query_benches);
