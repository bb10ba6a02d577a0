//! Extractor telemetry instruments and recording helpers.

use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::KeyValue;
use std::sync::OnceLock;

struct ExtractorInstruments {
    rows_fetched: Counter<u64>,
    series_outcomes: Counter<u64>,
    sweep_duration_seconds: Histogram<f64>,
}

fn instruments() -> &'static ExtractorInstruments {
    static INSTRUMENTS: OnceLock<ExtractorInstruments> = OnceLock::new();
    INSTRUMENTS.get_or_init(|| {
        let meter = global::meter("osreport.extractor");
        ExtractorInstruments {
            rows_fetched: meter
                .u64_counter("osreport.extractor.rows.fetched")
                .with_description("Rows returned by series queries")
                .init(),
            series_outcomes: meter
                .u64_counter("osreport.extractor.series.outcomes")
                .with_description("Series extraction outcomes")
                .init(),
            sweep_duration_seconds: meter
                .f64_histogram("osreport.extractor.sweep.duration")
                .with_description("Duration of a full series sweep")
                .with_unit("s")
                .init(),
        }
    })
}

pub fn record_rows_fetched(rows: u64) {
    instruments().rows_fetched.add(rows, &[]);
}

pub fn record_series_outcome(outcome: &'static str) {
    instruments()
        .series_outcomes
        .add(1, &[KeyValue::new("outcome", outcome)]);
}

pub fn record_sweep(duration_seconds: f64) {
    instruments()
        .sweep_duration_seconds
        .record(duration_seconds, &[]);
}
