//! Field projection - descriptor to wire payload.
//!
//! Only fields declared with a value or reference are emitted. Unset fields
//! and fields left to the remote default never appear, not even as null,
//! since the remote API rejects or misreads nulls for many fields.

use serde_json::Value;

use crate::client::Payload;
use crate::descriptor::{FieldValue, ResourceDescriptor};
use crate::error::Result;
use crate::kinds::FieldSpec;

/// Project every declared field.
pub fn project(descriptor: &ResourceDescriptor) -> Result<Payload> {
    project_where(descriptor, |_| true)
}

/// Project only the named fields (local names). Used for update payloads.
pub fn project_fields(descriptor: &ResourceDescriptor, fields: &[&str]) -> Result<Payload> {
    project_where(descriptor, |f| fields.contains(&f.name))
}

fn project_where(
    descriptor: &ResourceDescriptor,
    keep: impl Fn(&FieldSpec) -> bool,
) -> Result<Payload> {
    let spec = descriptor.validate()?;
    let mut payload = Payload::new();

    for field in spec.fields.iter().filter(|f| keep(*f)) {
        if let Some(value) = descriptor.field(field.name).and_then(wire_value) {
            payload.insert(field.wire.to_string(), value);
        }
    }

    Ok(payload)
}

/// Wire value of a declared field, `None` when it must be omitted.
pub(crate) fn wire_value(value: &FieldValue) -> Option<Value> {
    match value {
        FieldValue::Value(Value::Null) | FieldValue::UseDefault => None,
        FieldValue::Value(v) => Some(v.clone()),
        FieldValue::Ref(r) => Some(Value::String(r.resolve().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ResourceRef;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn web() -> ResourceDescriptor {
        ResourceDescriptor::new("service", "web")
            .with_field("desired_count", 3)
            .with_field("cluster", "prod")
    }

    #[test]
    fn test_project_translates_names() {
        let payload = project(&web()).unwrap();
        assert_eq!(
            serde_json::Value::Object(payload),
            json!({"desiredCount": 3, "cluster": "prod"})
        );

        let d = web()
            .with_field("enable_ecsmanaged_tags", true)
            .with_field("health_check_grace_period_seconds", 30);
        let payload = project(&d).unwrap();
        assert_eq!(payload["enableECSManagedTags"], json!(true));
        assert_eq!(payload["healthCheckGracePeriodSeconds"], json!(30));
    }

    #[test]
    fn test_project_is_deterministic() {
        let d = web()
            .with_field("launch_type", "FARGATE")
            .with_field("tags", json!([{"key": "team", "value": "core"}]));
        let a = serde_json::to_string(&project(&d).unwrap()).unwrap();
        let b = serde_json::to_string(&project(&d).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_absent_null_and_default_fields_are_omitted() {
        let d = web()
            .with_field("role", serde_json::Value::Null)
            .with_default("platform_version");
        let payload = project(&d).unwrap();

        assert!(!payload.contains_key("role"));
        assert!(!payload.contains_key("platformVersion"));
        assert!(!payload.contains_key("launchType"));
        assert!(payload.values().all(|v| !v.is_null()));
        assert_eq!(payload.len(), 2);
    }

    #[test]
    fn test_references_resolve_to_canonical_string() {
        let d = ResourceDescriptor::new("service", "web")
            .with_ref("cluster", ResourceRef::by_name("prod"))
            .with_ref("task_definition", ResourceRef::by_handle("task_definition", "web:7"));
        let payload = project(&d).unwrap();
        assert_eq!(payload["cluster"], json!("prod"));
        assert_eq!(payload["taskDefinition"], json!("web:7"));
    }

    #[test]
    fn test_project_fields_restricts_output() {
        let payload = project_fields(&web(), &["desired_count"]).unwrap();
        assert_eq!(serde_json::Value::Object(payload), json!({"desiredCount": 3}));
    }

    #[test]
    fn test_project_rejects_invalid_descriptor() {
        let err = project(&web().with_field("replicas", 2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FatalConfig);
    }
}
