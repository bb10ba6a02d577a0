//! Sink telemetry instruments and recording helpers.

use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram};
use std::sync::OnceLock;

struct SinkInstruments {
    write_requests: Counter<u64>,
    write_points: Counter<u64>,
    write_failures: Counter<u64>,
    publish_duration_seconds: Histogram<f64>,
}

fn instruments() -> &'static SinkInstruments {
    static INSTRUMENTS: OnceLock<SinkInstruments> = OnceLock::new();
    INSTRUMENTS.get_or_init(|| {
        let meter = global::meter("osreport.sink");
        SinkInstruments {
            write_requests: meter
                .u64_counter("osreport.sink.write.requests")
                .with_description("Successful sink write calls")
                .init(),
            write_points: meter
                .u64_counter("osreport.sink.write.points")
                .with_description("Points accepted by the sink")
                .init(),
            write_failures: meter
                .u64_counter("osreport.sink.write.failures")
                .with_description("Sink write calls that failed")
                .init(),
            publish_duration_seconds: meter
                .f64_histogram("osreport.sink.publish.duration")
                .with_description("Duration of a complete publish")
                .with_unit("s")
                .init(),
        }
    })
}

pub fn record_write(points: u64) {
    let i = instruments();
    i.write_requests.add(1, &[]);
    i.write_points.add(points, &[]);
}

pub fn record_write_failure() {
    instruments().write_failures.add(1, &[]);
}

pub fn record_publish(duration_seconds: f64) {
    instruments()
        .publish_duration_seconds
        .record(duration_seconds, &[]);
}
