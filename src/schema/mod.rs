//! Data model shared by both pipelines
//!
//! A [`Row`] is what a relational query hands back; a [`DataPoint`] is what
//! the time-series sink accepts. Both are built fresh every cycle and never
//! mutated after construction.

mod point;
mod value;

pub use point::DataPoint;
pub use value::{Row, ScalarValue};
