use entity_writer::convert::merge_defaults;
use entity_writer::{DefaultValues, Error, Pipeline, Record, RecordStage, Value};
use proptest::prelude::*;

const FIELDS: [&str; 4] = ["a", "b", "c", "d"];

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        Just(Value::from("")),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        "[a-z]{0,6}".prop_map(Value::Text),
    ]
}

fn arb_record() -> impl Strategy<Value = Record> {
    prop::collection::vec((prop::sample::select(FIELDS.to_vec()), arb_value()), 0..6)
        .prop_map(|fields| fields.into_iter().collect())
}

fn arb_defaults() -> impl Strategy<Value = Record> {
    prop::collection::vec(
        (
            prop::sample::select(FIELDS.to_vec()),
            "[a-z]{1,6}".prop_map(Value::Text),
        ),
        0..4,
    )
    .prop_map(|fields| fields.into_iter().collect())
}

proptest! {
    #[test]
    fn prop_merge_is_idempotent(record in arb_record(), defaults in arb_defaults()) {
        let mut once = record;
        merge_defaults(&mut once, &defaults);
        let mut twice = once.clone();
        merge_defaults(&mut twice, &defaults);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_defaulted_fields_are_never_empty(record in arb_record(), defaults in arb_defaults()) {
        let mut merged = record;
        merge_defaults(&mut merged, &defaults);
        for key in defaults.keys() {
            prop_assert!(merged.get(key).is_some_and(|value| !value.is_empty()));
        }
    }
}

#[test]
fn test_stage_fills_only_missing_values() -> anyhow::Result<()> {
    let stage = DefaultValues::new(Record::new().with("status", "pending").with("qty", 1_i64));
    let record = stage.apply(Record::new().with("status", "active").with("qty", Value::Null))?;
    assert_eq!(record.get("status"), Some(&Value::from("active")));
    assert_eq!(record.get("qty"), Some(&Value::Int(1)));
    Ok(())
}

#[test]
fn test_pipeline_json_input_must_be_a_record() {
    let pipeline = Pipeline::new().stage(DefaultValues::new(Record::new().with("status", "new")));
    assert!(matches!(
        pipeline.process_json(serde_json::json!("not a record")),
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        pipeline.process_json(serde_json::json!({ "nested": { "a": 1 } })),
        Err(Error::InvalidInput(_))
    ));

    let record = pipeline
        .process_json(serde_json::json!({ "email": "a@x.com" }))
        .expect("flat object is a record");
    assert_eq!(record.keys().collect::<Vec<_>>(), ["email", "status"]);
}
