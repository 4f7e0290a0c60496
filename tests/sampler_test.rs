use std::sync::Arc;
use std::time::Duration;

use rtstat::catalog::{BucketedDistribution, Registry};
use rtstat::reducer::{DeltaReducer, ReducerMode, SummaryStats};
use rtstat::sampler::{Sampler, SamplerConfigBuilder};
use rtstat::sink::{MemorySink, Recorded};
use tokio_util::sync::CancellationToken;

fn weights_for(recorded: &[Recorded], name: &str) -> f64 {
    recorded
        .iter()
        .filter_map(|r| match r {
            Recorded::Distribution {
                name: n, weight, ..
            } if n == name => Some(*weight),
            _ => None,
        })
        .sum()
}

#[tokio::test(start_paused = true)]
async fn delta_weights_add_up_across_passes() {
    let registry = Arc::new(Registry::new("app"));
    let latency = registry
        .histogram(
            "/http/latency:seconds",
            "request latency",
            &[0.0, 0.01, 0.05, 0.1, 0.5, 1.0],
        )
        .unwrap();
    let requests = registry.counter("/http/requests:requests", "").unwrap();

    let sink = Arc::new(MemorySink::new("mem"));
    let sampler = Sampler::new(
        SamplerConfigBuilder::new("app")
            .source("app")
            .mode(ReducerMode::Delta)
            .interval(Duration::from_secs(10))
            .build(),
        registry.clone(),
        sink.clone(),
    );

    let cancel = CancellationToken::new();
    let handle = sampler.spawn(cancel.clone());

    // Let the first pass run, then record traffic between passes
    tokio::time::sleep(Duration::from_secs(1)).await;
    for i in 0..50u32 {
        latency.observe(f64::from(i) / 100.0);
        requests.inc();
    }
    tokio::time::sleep(Duration::from_secs(10)).await;
    for _ in 0..7 {
        latency.observe(0.75);
        requests.inc();
    }
    tokio::time::sleep(Duration::from_secs(10)).await;

    cancel.cancel();
    let stats = handle.await.unwrap();
    assert_eq!(stats.passes, 3);
    assert_eq!(stats.sink_errors, 0);

    let recorded = sink.recorded().unwrap();
    assert_eq!(
        weights_for(&recorded, "runtime.app.http.latency.seconds"),
        57.0
    );
    assert_eq!(
        sink.last_gauge("runtime.app.http.requests.requests").unwrap(),
        Some(57.0)
    );
}

#[tokio::test]
async fn samplers_keep_independent_state() {
    let registry = Arc::new(Registry::new("app"));
    let h = registry
        .histogram("/gc/pauses:seconds", "", &[0.0, 1.0, 2.0])
        .unwrap();
    h.observe_n(0.5, 4);

    let first_sink = Arc::new(MemorySink::new("first"));
    let second_sink = Arc::new(MemorySink::new("second"));
    let config = SamplerConfigBuilder::new("a").source("x").build();
    let mut first = Sampler::new(config.clone(), registry.clone(), first_sink.clone());
    let mut second = Sampler::new(config, registry.clone(), second_sink.clone());

    first.sample_once().await.unwrap();
    h.observe(1.5);
    first.sample_once().await.unwrap();
    second.sample_once().await.unwrap();

    let name = "runtime.x.gc.pauses.seconds";
    assert_eq!(weights_for(&first_sink.recorded().unwrap(), name), 5.0);
    // The second sampler never saw the first snapshot, so it reports it all
    assert_eq!(weights_for(&second_sink.recorded().unwrap(), name), 5.0);
    assert_eq!(second_sink.recorded().unwrap().len(), 2);
}

#[test]
fn summary_and_delta_agree_on_a_single_pass() {
    let hist = BucketedDistribution::new(
        vec![1.0, 11.0, 21.0, 31.0, 41.0, 51.0],
        vec![2, 7, 10, 3, 1],
    )
    .unwrap();

    let stats = SummaryStats::from_distribution(&hist);
    let events = DeltaReducer::new().update("x", &hist);

    let total: u64 = events.iter().map(|e| e.weight).sum();
    let mean = events
        .iter()
        .map(|e| e.value * e.weight as f64)
        .sum::<f64>()
        / total as f64;
    assert_eq!(total, 23);
    assert!((mean - stats.avg).abs() < 1e-9);
}
