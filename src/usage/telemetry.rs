//! Usage poller telemetry instruments and recording helpers.

use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::KeyValue;
use std::sync::OnceLock;

struct UsageInstruments {
    probe_attempts: Counter<u64>,
    tenant_outcomes: Counter<u64>,
    cycle_duration_seconds: Histogram<f64>,
    cycle_timeouts: Counter<u64>,
}

fn instruments() -> &'static UsageInstruments {
    static INSTRUMENTS: OnceLock<UsageInstruments> = OnceLock::new();
    INSTRUMENTS.get_or_init(|| {
        let meter = global::meter("osreport.usage");
        UsageInstruments {
            probe_attempts: meter
                .u64_counter("osreport.usage.probe.attempts")
                .with_description("Replica probe attempts by result")
                .init(),
            tenant_outcomes: meter
                .u64_counter("osreport.usage.tenant.outcomes")
                .with_description("Terminal probe outcome per tenant")
                .init(),
            cycle_duration_seconds: meter
                .f64_histogram("osreport.usage.cycle.duration")
                .with_description("Duration of a poll cycle")
                .with_unit("s")
                .init(),
            cycle_timeouts: meter
                .u64_counter("osreport.usage.cycle.timeouts")
                .with_description("Poll cycles cut short by the cycle deadline")
                .init(),
        }
    })
}

pub fn record_probe_attempt(result: &'static str) {
    instruments()
        .probe_attempts
        .add(1, &[KeyValue::new("result", result)]);
}

pub fn record_tenant_outcome(outcome: &'static str) {
    instruments()
        .tenant_outcomes
        .add(1, &[KeyValue::new("outcome", outcome)]);
}

pub fn record_cycle(duration_seconds: f64, timed_out: bool) {
    let i = instruments();
    i.cycle_duration_seconds.record(duration_seconds, &[]);
    if timed_out {
        i.cycle_timeouts.add(1, &[]);
    }
}
