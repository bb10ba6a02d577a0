//! InfluxDB line protocol encoding
//!
//! `measurement[,tag=value...] field=value[,field=value...] [timestamp_ns]`
//!
//! Null values and empty tag values cannot be represented and are left out.
//! Non-finite floats are rejected by InfluxDB and are left out as well.

use crate::schema::{DataPoint, ScalarValue};
use std::fmt::Write;
use tracing::warn;

/// Encode one point. Returns `None` when no field survives encoding, since
/// InfluxDB rejects points without fields.
pub fn encode_point(point: &DataPoint) -> Option<String> {
    let mut fields = String::new();
    for (key, value) in &point.fields {
        let Some(encoded) = encode_field_value(value) else {
            continue;
        };
        if !fields.is_empty() {
            fields.push(',');
        }
        escape_key(&mut fields, key);
        fields.push('=');
        fields.push_str(&encoded);
    }
    if fields.is_empty() {
        return None;
    }

    let mut line = String::new();
    escape_measurement(&mut line, &point.measurement);
    for (key, value) in &point.tags {
        let rendered = match value {
            ScalarValue::Null => continue,
            other => other.to_string(),
        };
        if rendered.is_empty() {
            continue;
        }
        line.push(',');
        escape_key(&mut line, key);
        line.push('=');
        escape_key(&mut line, &rendered);
    }
    line.push(' ');
    line.push_str(&fields);

    if let Some(time) = point.time {
        if let Some(nanos) = time.timestamp_nanos_opt() {
            let _ = write!(line, " {}", nanos);
        }
    }
    Some(line)
}

/// Encode a batch as newline-separated lines, dropping unencodable points.
///
/// Returns the body and the number of points it carries.
pub fn encode_points(points: &[DataPoint]) -> (String, usize) {
    let mut body = String::new();
    let mut encoded = 0;
    for point in points {
        match encode_point(point) {
            Some(line) => {
                body.push_str(&line);
                body.push('\n');
                encoded += 1;
            }
            None => warn!(
                measurement = %point.measurement,
                "Dropping point with no encodable fields"
            ),
        }
    }
    (body, encoded)
}

fn encode_field_value(value: &ScalarValue) -> Option<String> {
    match value {
        ScalarValue::Null => None,
        ScalarValue::Bool(v) => Some(v.to_string()),
        ScalarValue::Int(v) => Some(format!("{}i", v)),
        ScalarValue::Float(v) if v.is_finite() => Some(format!("{:?}", v)),
        ScalarValue::Float(_) => None,
        ScalarValue::Str(v) => Some(quote(v)),
        ScalarValue::Timestamp(v) => Some(quote(&v.to_rfc3339())),
    }
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn escape_measurement(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            ',' | ' ' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
}

fn escape_key(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            ',' | ' ' | '=' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
}
