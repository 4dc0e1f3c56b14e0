//! Derived bindings for user types, carried through dynamics.

use adl_runtime::ast::{Decl, DeclType, Field, Struct, Union};
use adl_runtime::json::Bytes;
use adl_runtime::{
    AdlType, DeclRegistry, Dynamic, Json, ScopedName, TypeExpr, binding, check_json, from_dynamic,
    to_dynamic,
};
use serde_json::json;

#[derive(AdlType, Debug, Clone, PartialEq)]
#[adl(module = "demo.sensors", name = "Reading")]
struct SensorReading {
    sensor_id: u32,
    #[adl(rename = "temp")]
    temperature: f64,
    #[adl(default)]
    tags: Vec<String>,
    location: Option<String>,
}

#[derive(AdlType, Debug, Clone, PartialEq)]
#[adl(module = "demo.sensors")]
enum Unit {
    Celsius,
    Fahrenheit,
}

#[derive(AdlType, Debug, Clone, PartialEq)]
#[adl(module = "demo.sensors")]
enum Event {
    Heartbeat,
    Reading(SensorReading),
    #[adl(rename = "raw_frame")]
    Raw(Bytes),
    Batch(Vec<Event>),
}

fn reading() -> SensorReading {
    SensorReading {
        sensor_id: 42,
        temperature: 23.5,
        tags: vec!["roof".into()],
        location: None,
    }
}

#[test]
fn struct_descriptor_is_a_reference() {
    assert_eq!(
        SensorReading::type_expr(),
        TypeExpr::reference(ScopedName::new("demo.sensors", "Reading"))
    );
    assert_eq!(Unit::type_expr().to_string(), "demo.sensors.Unit");
}

#[test]
fn struct_uses_serialized_names() {
    let json = reading().to_json().unwrap();
    assert_eq!(
        json,
        json!({"sensorId": 42, "temp": 23.5, "tags": ["roof"], "location": null})
    );
}

#[test]
fn struct_defaults_apply_when_absent() {
    let r = SensorReading::from_json(&json!({"sensorId": 1, "temp": 0.5, "location": "lab"}))
        .unwrap();
    assert!(r.tags.is_empty());
    assert_eq!(r.location.as_deref(), Some("lab"));
}

#[test]
fn struct_missing_field_fails() {
    let err = SensorReading::from_json(&json!({"sensorId": 1, "location": null})).unwrap_err();
    assert_eq!(err.to_string(), "missing struct field temp at $");
}

#[test]
fn nested_errors_carry_path() {
    let err = Event::from_json(&json!({"batch": [
        "heartbeat",
        {"reading": {"sensorId": 1, "temp": "hot", "location": null}}
    ]}))
    .unwrap_err();
    assert_eq!(err.to_string(), "expected a number at $.batch.[1].reading.temp");
}

#[test]
fn enum_is_a_string() {
    assert_eq!(Unit::Fahrenheit.to_json().unwrap(), json!("fahrenheit"));
    assert_eq!(Unit::from_json(&json!("celsius")).unwrap(), Unit::Celsius);
    assert_eq!(
        Unit::from_json(&json!("kelvin")).unwrap_err().message(),
        "invalid string for enum: kelvin"
    );
    assert_eq!(
        Unit::from_json(&json!({"celsius": null})).unwrap_err().message(),
        "expected a string for enum"
    );
}

#[test]
fn union_encodes_void_and_valued_variants() {
    assert_eq!(Event::Heartbeat.to_json().unwrap(), json!("heartbeat"));
    assert_eq!(
        Event::Raw(Bytes(vec![0, 1, 2])).to_json().unwrap(),
        json!({"raw_frame": "AAEC"})
    );

    let event = Event::Batch(vec![Event::Heartbeat, Event::Reading(reading())]);
    let back = Event::from_json(&event.to_json().unwrap()).unwrap();
    assert_eq!(back, event);

    // Void branches may also be written as an object with a null value.
    assert_eq!(Event::from_json(&json!({"heartbeat": null})).unwrap(), Event::Heartbeat);
}

#[test]
fn union_decode_errors() {
    let msg = |json: Json| Event::from_json(&json).unwrap_err().to_string();
    assert_eq!(msg(json!("reading")), "union field reading needs an associated value at $");
    assert_eq!(msg(json!("bogus")), "invalid union field bogus at $");
    assert_eq!(msg(json!({})), "union without a property at $");
    assert_eq!(
        msg(json!({"heartbeat": null, "raw_frame": "AAEC"})),
        "union with multiple properties at $"
    );
    assert_eq!(msg(json!(3)), "expected an object or string at $");
    assert_eq!(msg(json!({"heartbeat": 1})), "expected a null at $.heartbeat");
}

#[test]
fn derived_values_round_trip_through_dynamic() {
    let dynamic = to_dynamic(&binding::<SensorReading>(), &reading()).unwrap();
    assert_eq!(dynamic.type_expr().to_string(), "demo.sensors.Reading");
    assert_eq!(from_dynamic(&binding::<SensorReading>(), &dynamic).unwrap(), Some(reading()));
    assert_eq!(dynamic.to_value::<Event>().unwrap(), None);
}

#[test]
fn dynamic_survives_serialization() {
    let dynamic = Dynamic::from_value(&Event::Reading(reading())).unwrap();
    let text = serde_json::to_string(&dynamic).unwrap();
    let received: Dynamic = serde_json::from_str(&text).unwrap();
    assert_eq!(received.to_value::<Event>().unwrap(), Some(Event::Reading(reading())));
}

/// The declarations a remote peer would publish for the derived types above.
fn sensors_registry() -> DeclRegistry {
    let mut registry = DeclRegistry::new();
    registry
        .add_decl(
            "demo.sensors",
            Decl::new(
                "Reading",
                DeclType::Struct(Struct {
                    type_params: vec![],
                    fields: vec![
                        Field::new("sensorId", TypeExpr::primitive("Word32")),
                        Field::new("temp", TypeExpr::primitive("Double")),
                        Field::new(
                            "tags",
                            TypeExpr::primitive_of("Vector", vec![TypeExpr::primitive("String")]),
                        )
                        .with_default(json!([])),
                        Field::new(
                            "location",
                            TypeExpr::primitive_of(
                                "Nullable",
                                vec![TypeExpr::primitive("String")],
                            ),
                        ),
                    ],
                }),
            ),
        )
        .unwrap();
    registry
        .add_decl(
            "demo.sensors",
            Decl::new(
                "Unit",
                DeclType::Union(Union {
                    type_params: vec![],
                    fields: vec![
                        Field::new("celsius", TypeExpr::primitive("Void")),
                        Field::new("fahrenheit", TypeExpr::primitive("Void")),
                    ],
                }),
            ),
        )
        .unwrap();
    registry
}

#[test]
fn schema_check_agrees_with_derived_binding() {
    let registry = sensors_registry();
    let dynamic = Dynamic::from_value(&reading()).unwrap();
    let checked = dynamic.check(&registry).unwrap();
    assert_eq!(checked.value(), dynamic.value());

    let unit = Dynamic::from_value(&Unit::Celsius).unwrap();
    assert!(unit.check(&registry).is_ok());
}

#[test]
fn schema_check_fills_defaults_the_binding_would_apply() {
    let registry = sensors_registry();
    let sparse = json!({"sensorId": 7, "temp": 1.0, "location": null});
    let normalized = check_json(&registry, &SensorReading::type_expr(), &sparse).unwrap();
    assert_eq!(normalized["tags"], json!([]));
    assert_eq!(
        SensorReading::from_json(&normalized).unwrap(),
        SensorReading::from_json(&sparse).unwrap()
    );
}
