use std::thread::sleep;
use std::time::Duration;

use statsline::{
    Flavor, Measurement, MeterId, MeterKind, MeterSnapshot, Statistic, StatsdBuilder, Tag,
};

fn main() {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    // stands in for the aggregation layer: one gauge sampled on every step
    let source = || {
        let id = MeterId::new("demo.queue.depth", MeterKind::Gauge)
            .with_tags([Tag::new("region", "local")]);
        vec![MeterSnapshot::new(id, vec![Measurement::new(Statistic::Value, 7.0)])]
    };

    let pipeline = StatsdBuilder::default()
        .with_flavor(Flavor::Datadog)
        .with_remote_address("127.0.0.1:8125")
        .expect("valid remote address")
        .with_step_interval(Duration::from_secs(2))
        .build(source)
        .expect("failed to build pipeline");

    let requests = MeterId::new("demo.requests", MeterKind::Counter)
        .with_tags([Tag::new("region", "local")]);

    for _ in 0..100 {
        pipeline.record(&requests, Measurement::new(Statistic::Count, 1.0));
        sleep(Duration::from_millis(100));
    }

    pipeline.stop();
    println!("delivery stats: {:?}", pipeline.stats());
}
