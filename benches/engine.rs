//! Criterion benchmarks for the neurascape engine.
//!
//! Run with:
//!   cargo bench
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use neurascape::config::EngineConfig;
use neurascape::engine::{Engine, HostContext};
use neurascape::governor::{DeviceProfile, GpuClass};
use neurascape::prng::Prng;
use neurascape::render::RecordingSurface;
use neurascape::spatial::{SpatialGrid, Vec2};

fn make_engine(width: f32, height: f32, level: u8, seed: u64) -> (Engine, RecordingSurface) {
    let surface = RecordingSurface::new(width, height);
    let host = HostContext {
        device: DeviceProfile {
            cores: 8,
            gpu: GpuClass::Strong,
            mobile: false,
        },
        ..HostContext::default()
    };
    let cfg = EngineConfig {
        seed: Some(seed),
        initial_level: Some(level),
        ..EngineConfig::default()
    };
    let engine = Engine::initialize(cfg, host, Some(&surface)).unwrap();
    (engine, surface)
}

/// Grid rebuild plus one neighbourhood query per point.
fn bench_grid(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid");

    for count in [64usize, 256, 1024].iter() {
        let mut rng = Prng::new(42);
        let points: Vec<(usize, Vec2)> = (0..*count)
            .map(|i| {
                (
                    i,
                    Vec2::new(rng.gen_range_f32(0.0, 1920.0), rng.gen_range_f32(0.0, 1080.0)),
                )
            })
            .collect();
        group.throughput(Throughput::Elements(*count as u64));

        group.bench_with_input(BenchmarkId::new("rebuild_query", count), &points, |b, points| {
            let mut grid = SpatialGrid::new(140.0);
            b.iter(|| {
                grid.rebuild(points.iter().copied());
                let mut hits = 0usize;
                for &(_, p) in points {
                    grid.for_each_near(p, 140.0, |_| hits += 1);
                }
                black_box(hits)
            });
        });
    }

    group.finish();
}

/// Full ticks with steady pointer input, per optimization level.
fn bench_tick_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick_level");

    for level in 0u8..=3 {
        group.bench_with_input(BenchmarkId::new("1920x1080", level), &level, |b, &level| {
            let (mut engine, mut surface) = make_engine(1920.0, 1080.0, level, 42);
            let mut now = 0.0;
            let mut step = 0u32;
            b.iter(|| {
                now += 16.0;
                step = step.wrapping_add(1);
                let x = (step % 192) as f32 * 10.0;
                engine.on_pointer_move(x, 540.0);
                if step % 60 == 0 {
                    engine.on_click(x, 300.0);
                }
                engine.tick(now, &mut surface);
                black_box(engine.diagnostics().avg_activity)
            });
        });
    }

    group.finish();
}

/// Cost of the full rebuild that resizes and level changes trigger.
fn bench_rebuild(c: &mut Criterion) {
    c.bench_function("rebuild_1920x1080", |b| {
        let (mut engine, _surface) = make_engine(1920.0, 1080.0, 0, 42);
        let mut flip = false;
        b.iter(|| {
            flip = !flip;
            let w = if flip { 1920.0 } else { 1919.0 };
            engine.resize(w, 1080.0);
            black_box(engine.graph().edges().len())
        });
    });
}

criterion_group!(benches, bench_grid, bench_tick_levels, bench_rebuild);
criterion_main!(benches);
