//! Tests for row -> data point assembly
//!
//! Covers the algebraic properties of the assembler:
//! - fields are exactly the row
//! - tags are exactly the mapped columns present in the row, renamed
//! - output does not depend on row key order
//! - mappings naming missing columns soft-fail to no tag

use osreport::schema::{Row, ScalarValue};
use osreport::series::{
    assemble_data_point, assemble_data_points, DataPointAssembler, SeriesDefinition,
    SeriesRegistry,
};

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn scalar() -> impl Strategy<Value = ScalarValue> {
    prop_oneof![
        Just(ScalarValue::Null),
        any::<bool>().prop_map(ScalarValue::Bool),
        any::<i64>().prop_map(ScalarValue::Int),
        (-1.0e9..1.0e9f64).prop_map(ScalarValue::Float),
        "[a-z0-9 ._-]{0,12}".prop_map(ScalarValue::Str),
    ]
}

fn row() -> impl Strategy<Value = Row> {
    prop::collection::btree_map("[a-f]{1,3}", scalar(), 0..8)
}

/// Logical tag name -> column; columns drawn from the same alphabet as rows
/// so some mappings hit and some miss, plus the occasional empty column.
fn tag_fields() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map("tag_[a-c]", prop_oneof!["[a-f]{1,3}", Just(String::new())], 0..4)
}

proptest! {
    #[test]
    fn fields_are_exactly_the_row(row in row(), tags in tag_fields()) {
        let point = assemble_data_point("m", &row, &tags, None);
        prop_assert_eq!(point.fields, row);
    }

    #[test]
    fn tags_are_the_mapped_columns_present(row in row(), tags in tag_fields()) {
        let point = assemble_data_point("m", &row, &tags, None);

        let expected: BTreeMap<String, ScalarValue> = tags
            .iter()
            .filter(|(_, column)| !column.is_empty())
            .filter_map(|(tag, column)| row.get(column).map(|v| (tag.clone(), v.clone())))
            .collect();
        prop_assert_eq!(point.tags, expected);
    }

    #[test]
    fn output_ignores_row_key_order(
        pairs in prop::collection::vec(("[a-f]{1,3}", scalar()), 0..8)
            .prop_map(|pairs| pairs.into_iter().collect::<BTreeMap<_, _>>().into_iter().collect::<Vec<_>>())
            .prop_flat_map(|pairs| (Just(pairs.clone()), Just(pairs).prop_shuffle())),
        tags in tag_fields(),
    ) {
        let (original, shuffled) = pairs;
        let a: Row = original.into_iter().collect();
        let b: Row = shuffled.into_iter().collect();
        prop_assert_eq!(
            assemble_data_point("m", &a, &tags, None),
            assemble_data_point("m", &b, &tags, None)
        );
    }
}

fn hypervisor_row() -> Row {
    [
        ("hypervisor_id", ScalarValue::Int(1)),
        ("hostname", ScalarValue::from("h1")),
        ("ip_address", ScalarValue::from("10.0.0.1")),
        ("cpus", ScalarValue::Int(8)),
        ("memory", ScalarValue::Int(32768)),
        ("local_storage", ScalarValue::Int(500)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

#[test]
fn test_hypervisors_scenario_produces_untagged_point() {
    let registry = SeriesRegistry::openstack_defaults();
    let definition = registry.lookup("hypervisors").expect("hypervisors is registered");
    assert_eq!(definition.tag_fields.get("node").map(String::as_str), Some(""));

    let rows = vec![hypervisor_row()];
    let points = DataPointAssembler::new().assemble_all(definition, &rows);

    assert_eq!(points.len(), 1);
    let point = &points[0];
    assert_eq!(point.measurement, "hypervisors");
    assert!(point.tags.is_empty(), "empty column mapping must not produce a tag");
    assert_eq!(point.fields, hypervisor_row());
    assert_eq!(point.time, None);
}

#[test]
fn test_external_tag_fills_empty_column_mapping() {
    let registry = SeriesRegistry::openstack_defaults();
    let definition = registry.lookup("hypervisors").unwrap();

    let point = DataPointAssembler::new()
        .with_external_tag("node", "NCI")
        .assemble(definition, &hypervisor_row());

    assert_eq!(point.tags.get("node"), Some(&ScalarValue::from("NCI")));
    assert_eq!(point.fields, hypervisor_row(), "external tags never become fields");
}

#[test]
fn test_external_tag_does_not_override_column_mapping() {
    let definition = SeriesDefinition::new("volumes", "cinder", "SELECT 1")
        .with_tag("node", "availability_zone");
    let mut row = Row::new();
    row.insert("availability_zone".to_string(), ScalarValue::from("melbourne-qh2"));

    let point = DataPointAssembler::new()
        .with_external_tag("node", "elsewhere")
        .assemble(&definition, &row);

    assert_eq!(point.tags.get("node"), Some(&ScalarValue::from("melbourne-qh2")));
}

#[test]
fn test_instances_mapping_soft_fails_on_missing_columns() {
    let registry = SeriesRegistry::openstack_defaults();
    let definition = registry.lookup("instances").unwrap();

    let mut row = Row::new();
    row.insert("instance_id".to_string(), ScalarValue::from("abc"));
    row.insert("project_id".to_string(), ScalarValue::from("p1"));
    row.insert("availability_zone".to_string(), ScalarValue::from("tasmania"));

    let point = DataPointAssembler::new().assemble(definition, &row);

    let tag_names: Vec<&str> = point.tags.keys().map(String::as_str).collect();
    assert_eq!(tag_names, vec!["instance_id", "node", "project_id"]);
    assert_eq!(point.fields.len(), 3);
}

#[test]
fn test_batch_preserves_row_order_and_time() {
    let time = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let rows: Vec<Row> = (0..5)
        .map(|i| {
            let mut row = Row::new();
            row.insert("id".to_string(), ScalarValue::Int(i));
            row
        })
        .collect();

    let mut tags = BTreeMap::new();
    tags.insert("id".to_string(), "id".to_string());
    let points = assemble_data_points("things", &rows, &tags, Some(time));

    let ids: Vec<Option<i64>> = points.iter().map(|p| p.fields["id"].as_i64()).collect();
    assert_eq!(ids, vec![Some(0), Some(1), Some(2), Some(3), Some(4)]);
    assert!(points.iter().all(|p| p.time == Some(time)));
}
