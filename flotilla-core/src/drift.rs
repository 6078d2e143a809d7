//! Drift detection - declared fields versus last observed remote state.

use serde::Serialize;
use serde_json::Value;

use crate::client::ObservedState;
use crate::descriptor::ResourceDescriptor;
use crate::error::Result;
use crate::projector::wire_value;

/// One declared field whose observed value differs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDrift {
    /// Local field name.
    pub field: String,
    pub wire_name: String,
    pub declared: Value,
    /// `None` when the remote does not report the field at all.
    pub observed: Option<Value>,
}

/// Compare declared fields against observed state.
///
/// Fields the descriptor does not declare, or leaves to the remote default,
/// are never reported. The result is empty iff every declared field equals
/// its observed counterpart.
pub fn diff(descriptor: &ResourceDescriptor, observed: &ObservedState) -> Result<Vec<FieldDrift>> {
    let spec = descriptor.validate()?;
    let mut drift = Vec::new();

    for field in spec.fields {
        let Some(declared) = descriptor.field(field.name).and_then(wire_value) else {
            continue;
        };
        let actual = observed.fields.get(field.wire);
        if actual.is_some_and(|a| values_equal(&declared, a)) {
            continue;
        }
        drift.push(FieldDrift {
            field: field.name.to_string(),
            wire_name: field.wire.to_string(),
            declared,
            observed: actual.cloned(),
        });
    }

    Ok(drift)
}

/// Every declared field, reported against a resource that does not exist.
pub fn diff_absent(descriptor: &ResourceDescriptor) -> Result<Vec<FieldDrift>> {
    let spec = descriptor.validate()?;
    Ok(spec
        .fields
        .iter()
        .filter_map(|field| {
            descriptor.field(field.name).and_then(wire_value).map(|declared| FieldDrift {
                field: field.name.to_string(),
                wire_name: field.wire.to_string(),
                declared,
                observed: None,
            })
        })
        .collect())
}

/// Structural equality where numbers compare by value, so `3` equals `3.0`.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            x == y || x.as_f64().zip(y.as_f64()).is_some_and(|(x, y)| x == y)
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => a == b,
    }
}
