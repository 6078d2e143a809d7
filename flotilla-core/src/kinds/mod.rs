//! Resource kinds known to the reconciler.
//!
//! Each kind is a static field table: the local field name a descriptor uses,
//! the wire name the remote API expects, and whether the field holds a
//! reference to a parent resource. The projector and drift detector iterate
//! these tables instead of hand-writing per-field conditionals.

pub mod cluster;
pub mod service;
pub mod task_definition;

/// One declarable field of a resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Name used in descriptors.
    pub name: &'static str,
    /// Name the remote API expects.
    pub wire: &'static str,
    /// Kind of the parent resource when the field is a reference.
    pub reference: Option<&'static str>,
}

impl FieldSpec {
    pub const fn plain(name: &'static str, wire: &'static str) -> Self {
        Self {
            name,
            wire,
            reference: None,
        }
    }

    pub const fn reference(name: &'static str, wire: &'static str, kind: &'static str) -> Self {
        Self {
            name,
            wire,
            reference: Some(kind),
        }
    }
}

/// Static description of a resource kind.
#[derive(Debug)]
pub struct KindSpec {
    pub kind: &'static str,
    /// Field whose resolved value scopes the resource name (e.g. the cluster
    /// of a service).
    pub scope_field: Option<&'static str>,
    /// Fields that must be declared for a create to be accepted.
    pub required: &'static [&'static str],
    pub fields: &'static [FieldSpec],
}

impl KindSpec {
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

static KINDS: &[&KindSpec] = &[
    &service::SERVICE,
    &cluster::CLUSTER,
    &task_definition::TASK_DEFINITION,
];

/// Look up a kind by its tag.
pub fn lookup(kind: &str) -> Option<&'static KindSpec> {
    KINDS.iter().copied().find(|k| k.kind == kind)
}

/// Tags of all registered kinds.
pub fn tags() -> impl Iterator<Item = &'static str> {
    KINDS.iter().map(|k| k.kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_lookup_known_and_unknown() {
        assert_eq!(lookup("service").map(|k| k.kind), Some("service"));
        assert!(lookup("load_balancer").is_none());
    }

    #[test]
    fn test_field_tables_have_unique_names() {
        for kind in KINDS {
            let names: HashSet<_> = kind.fields.iter().map(|f| f.name).collect();
            let wires: HashSet<_> = kind.fields.iter().map(|f| f.wire).collect();
            assert_eq!(names.len(), kind.fields.len(), "{} has duplicate names", kind.kind);
            assert_eq!(wires.len(), kind.fields.len(), "{} has duplicate wires", kind.kind);

            for required in kind.required {
                assert!(kind.field(required).is_some(), "{required} not in {}", kind.kind);
            }
            if let Some(scope) = kind.scope_field {
                assert!(kind.field(scope).is_some(), "{scope} not in {}", kind.kind);
            }
        }
    }

    #[test]
    fn test_references_point_at_registered_kinds() {
        for kind in KINDS {
            for field in kind.fields.iter().filter_map(|f| f.reference) {
                assert!(lookup(field).is_some(), "{} references unknown {field}", kind.kind);
            }
        }
    }
}
