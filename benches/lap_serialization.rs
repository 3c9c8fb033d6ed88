use criterion::{Criterion, black_box, criterion_group, criterion_main};
use lap_logger::{
    LapSummary, SampleNormalizer, SessionInfo, build_lap_metadata, format_lap,
    telemetry::{CanonicalSample, RawSample},
};
use serde_json::{Value, json};
use std::time::Duration;

const TRACK_LENGTH: f64 = 5386.8;

fn create_raw_sample(point_no: usize) -> RawSample {
    let lap_distance = point_no as f64 * 4.0;
    let value = json!({
        "lap": 1,
        "lap_distance": lap_distance,
        "lap_time": point_no as f64 * 0.016, // ~60Hz
        "speed": 256.0 + (lap_distance / 1000.0).sin() * 20.0,
        "rpm": 7267.0,
        "gear": 6,
        "throttle": 0.8,
        "brake": 0.0,
        "steering": -0.3,
        "position_x": -269.26 + lap_distance,
        "position_y": 7.30,
        "position_z": -218.97,
        "tyre_temp": {"rl": 70.78, "rr": 68.89, "fl": 75.57, "fr": 66.94},
    });
    match value {
        Value::Object(map) => map,
        _ => RawSample::new(),
    }
}

fn create_lap(points: usize) -> Vec<CanonicalSample> {
    let mut normalizer = SampleNormalizer::default();
    normalizer.set_track_length(Some(TRACK_LENGTH));
    (0..points)
        .map(|i| normalizer.normalize(&create_raw_sample(i)))
        .collect()
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalizer");
    let normalizer = SampleNormalizer::default();
    let raw = create_raw_sample(100);

    group.bench_function("normalize_sample", |b| {
        b.iter(|| black_box(normalizer.normalize(black_box(&raw))));
    });

    group.finish();
}

fn bench_format_lap(c: &mut Criterion) {
    let mut group = c.benchmark_group("lap_serialization");
    group.measurement_time(Duration::from_secs(10));

    let session = SessionInfo {
        player_name: "Dev User".to_string(),
        car_name: "Toyota GR010".to_string(),
        track_name: "Bahrain International Circuit".to_string(),
        track_length: TRACK_LENGTH,
        ..Default::default()
    };

    // one lap of Bahrain at 60Hz is roughly 6000 samples
    for points in [600usize, 6000] {
        let lap = create_lap(points);
        let summary = LapSummary {
            lap: 1,
            lap_time: points as f64 * 0.016,
            sample_count: points,
            lap_distance: points as f64 * 4.0,
        };
        let metadata = build_lap_metadata(&session, &summary, 3);

        group.bench_function(format!("format_lap_{points}"), |b| {
            b.iter(|| black_box(format_lap(black_box(&lap), &metadata)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_normalize, bench_format_lap);
criterion_main!(benches);
