use std::net::UdpSocket;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use statsline::{
    Flavor, Measurement, MeterId, MeterKind, MeterSnapshot, MeterSource, NamingConvention,
    Statistic, StatsdBuilder, Tag,
};

struct FixedSource {
    snapshots: Vec<(MeterId, Vec<Measurement>)>,
}

impl MeterSource for FixedSource {
    fn snapshot(&self) -> Vec<MeterSnapshot> {
        self.snapshots
            .iter()
            .map(|(id, measurements)| MeterSnapshot::new(id.clone(), measurements.clone()))
            .collect()
    }
}

fn collecting_sink() -> (Arc<Mutex<Vec<String>>>, impl FnMut(String) + Send + 'static) {
    let collected = Arc::new(Mutex::new(Vec::new()));
    let sink_collected = Arc::clone(&collected);
    (collected, move |payload: String| sink_collected.lock().unwrap().push(payload))
}

fn wait_for<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within 5s");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn recorded_measurements_reach_the_sink() {
    let (collected, sink) = collecting_sink();
    let pipeline = StatsdBuilder::default()
        .with_flavor(Flavor::Telegraf)
        .with_buffering(false)
        .with_payload_sink(sink)
        .build(statsline::EmptySource)
        .unwrap();

    let id = MeterId::new("http.requests", MeterKind::Counter)
        .with_tags([Tag::new("region", "emea")]);
    pipeline.record(&id, Measurement::new(Statistic::Count, 2.0));

    // unbuffered payloads are delivered synchronously on the recording thread
    assert_eq!(
        collected.lock().unwrap().as_slice(),
        &["httpRequests,statistic=count,region=emea:2|c".to_owned()]
    );
}

#[test]
fn step_publish_pulls_the_source() {
    let (collected, sink) = collecting_sink();
    let id = MeterId::new("queue.depth", MeterKind::Gauge);
    let source = FixedSource {
        snapshots: vec![(id, vec![Measurement::new(Statistic::Value, 5.0)])],
    };

    let pipeline = StatsdBuilder::default()
        .with_flavor(Flavor::Datadog)
        .with_buffering(false)
        .with_step_interval(Duration::from_millis(50))
        .with_payload_sink(sink)
        .build(source)
        .unwrap();

    wait_for(|| !collected.lock().unwrap().is_empty());
    assert_eq!(collected.lock().unwrap()[0], "queueDepth:5|g|#statistic:value");

    pipeline.stop();
}

#[test]
fn publish_now_is_immediate() {
    let (collected, sink) = collecting_sink();
    let id = MeterId::new("queue.depth", MeterKind::Gauge);
    let source = FixedSource {
        snapshots: vec![(id, vec![Measurement::new(Statistic::Value, 9.0)])],
    };

    let pipeline = StatsdBuilder::default()
        .with_buffering(false)
        .with_step_interval(Duration::from_secs(3600))
        .with_payload_sink(sink)
        .build(source)
        .unwrap();

    pipeline.publish_now();
    assert_eq!(collected.lock().unwrap().as_slice(), &["queueDepth:9|g|#statistic:value".to_owned()]);
}

#[test]
fn buffered_lines_coalesce_into_one_payload() {
    let (collected, sink) = collecting_sink();
    let pipeline = StatsdBuilder::default()
        .with_flavor(Flavor::Telegraf)
        .with_flush_interval(Duration::from_millis(500))
        .with_payload_sink(sink)
        .build(statsline::EmptySource)
        .unwrap();

    let id = MeterId::new("a", MeterKind::Counter);
    pipeline.record(&id, Measurement::new(Statistic::Count, 1.0));
    pipeline.record(&id, Measurement::new(Statistic::Count, 2.0));

    // nothing leaves until the idle flush
    assert!(collected.lock().unwrap().is_empty());
    wait_for(|| !collected.lock().unwrap().is_empty());
    assert_eq!(
        collected.lock().unwrap().as_slice(),
        &["a,statistic=count:1|c\na,statistic=count:2|c".to_owned()]
    );

    pipeline.stop();
}

#[test]
fn stop_flushes_the_remaining_buffer() {
    let (collected, sink) = collecting_sink();
    let pipeline = StatsdBuilder::default()
        .with_flavor(Flavor::Telegraf)
        .with_flush_interval(Duration::from_secs(3600))
        .with_payload_sink(sink)
        .build(statsline::EmptySource)
        .unwrap();

    let id = MeterId::new("a", MeterKind::Counter);
    pipeline.record(&id, Measurement::new(Statistic::Count, 1.0));
    assert!(collected.lock().unwrap().is_empty());

    pipeline.stop();
    assert_eq!(collected.lock().unwrap().as_slice(), &["a,statistic=count:1|c".to_owned()]);

    // idempotent
    pipeline.stop();
    assert_eq!(collected.lock().unwrap().len(), 1);
}

#[test]
fn convention_swap_applies_to_subsequent_lines() {
    let (collected, sink) = collecting_sink();
    let pipeline = StatsdBuilder::default()
        .with_flavor(Flavor::Telegraf)
        .with_buffering(false)
        .with_payload_sink(sink)
        .build(statsline::EmptySource)
        .unwrap();

    let id = MeterId::new("my.counter", MeterKind::Counter);
    pipeline.record(&id, Measurement::new(Statistic::Count, 1.0));
    pipeline.set_naming_convention(NamingConvention::snake_case());
    pipeline.record(&id, Measurement::new(Statistic::Count, 1.0));

    assert_eq!(
        collected.lock().unwrap().as_slice(),
        &[
            "myCounter,statistic=count:1|c".to_owned(),
            "my_counter,statistic=count:1|c".to_owned(),
        ]
    );
}

#[test]
fn disabled_pipeline_does_nothing() {
    let pipeline = StatsdBuilder::default()
        .enabled(false)
        .build(statsline::EmptySource)
        .unwrap();

    assert!(!pipeline.is_enabled());
    let id = MeterId::new("a", MeterKind::Counter);
    pipeline.record(&id, Measurement::new(Statistic::Count, 1.0));
    pipeline.publish_now();
    pipeline.start().unwrap();
    pipeline.stop();
    assert_eq!(pipeline.stats(), statsline::DeliverySnapshot::default());
}

#[test]
fn udp_delivery_end_to_end() {
    let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
    receiver.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let addr = receiver.local_addr().unwrap();

    let pipeline = StatsdBuilder::default()
        .with_flavor(Flavor::Datadog)
        .with_remote_address(addr.to_string())
        .unwrap()
        .with_flush_interval(Duration::from_millis(50))
        .build(statsline::EmptySource)
        .unwrap();

    let id = MeterId::new("net.test", MeterKind::Counter);
    pipeline.record(&id, Measurement::new(Statistic::Count, 3.0));

    let mut buf = [0u8; 256];
    let (len, _) = receiver.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..len], b"netTest:3|c|#statistic:count");

    pipeline.stop();
    assert_eq!(pipeline.stats().payloads_sent, 1);
}

#[test]
fn restart_resumes_publishing() {
    let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
    receiver.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let addr = receiver.local_addr().unwrap();

    let pipeline = StatsdBuilder::default()
        .with_remote_address(addr.to_string())
        .unwrap()
        .with_flush_interval(Duration::from_millis(50))
        .build(statsline::EmptySource)
        .unwrap();

    pipeline.stop();
    pipeline.start().unwrap();
    // idempotent while running
    pipeline.start().unwrap();

    let id = MeterId::new("net.restart", MeterKind::Counter);
    pipeline.record(&id, Measurement::new(Statistic::Count, 1.0));

    let mut buf = [0u8; 256];
    let (len, _) = receiver.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..len], b"netRestart:1|c|#statistic:count");

    pipeline.stop();
}
