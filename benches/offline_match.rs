use std::sync::Arc;

use criterion::criterion_main;

use tether::{
    MapMatcherFactory, MatcherConfig, Measurement, RoadNetworkBuilder, TravelMode,
};

// ~100m of longitude at the equator.
const DEG_100M: f64 = 100.0 / 111_319.49;

fn grid_network() -> Arc<tether::RoadNetwork> {
    let mut builder = RoadNetworkBuilder::new();

    // A 10x10 grid of two-way streets, 100m apart.
    let node = |x: u64, y: u64| x * 100 + y;
    for x in 0..10u64 {
        for y in 0..10u64 {
            builder = builder.node(node(x, y), x as f64 * DEG_100M, y as f64 * DEG_100M);
        }
    }

    let mut edge = 10_000u64;
    for x in 0..10u64 {
        for y in 0..10u64 {
            if x + 1 < 10 {
                builder = builder.two_way(edge, edge + 1, node(x, y), node(x + 1, y));
                edge += 2;
            }
            if y + 1 < 10 {
                builder = builder.two_way(edge, edge + 1, node(x, y), node(x, y + 1));
                edge += 2;
            }
        }
    }

    Arc::new(builder.build())
}

fn match_benchmark(c: &mut criterion::Criterion) {
    let mut group = c.benchmark_group("match");
    group.significance_level(0.1).sample_size(30);

    let factory = MapMatcherFactory::new(MatcherConfig::default(), grid_network()).unwrap();
    let mut matcher = factory.create(TravelMode::Auto).unwrap();

    // Eastbound along the southern row, with a little noise.
    let trace = (0..40)
        .map(|i| {
            let east = i as f64 * 20.0 / 111_319.49;
            let wobble = if i % 2 == 0 { 0.00002 } else { -0.00002 };
            Measurement::new(east, wobble)
        })
        .collect::<Vec<_>>();

    group.bench_function("offline_40pt_grid", |b| {
        b.iter(|| matcher.offline_match(&trace))
    });

    group.finish();
}

criterion::criterion_group!(match_benches, match_benchmark);
criterion_main!(match_benches);
