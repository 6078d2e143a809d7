//! Resource descriptors - the declared, desired state of one remote resource.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ReconcileError, Result};
use crate::kinds::{self, KindSpec};

/// Document literal that marks a field as "leave it to the remote default".
pub const USE_DEFAULT: &str = "$default";

/// Rich handle to another resource, typically taken from a sibling descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
}

/// Weak reference to a parent resource. Lookup only; the parent's lifecycle
/// is managed on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRef {
    /// Short name or full ARN.
    ByName(String),
    ByHandle(ResourceHandle),
}

impl ResourceRef {
    pub fn by_name(name: impl Into<String>) -> Self {
        ResourceRef::ByName(name.into())
    }

    pub fn by_handle(kind: impl Into<String>, name: impl Into<String>) -> Self {
        ResourceRef::ByHandle(ResourceHandle {
            kind: kind.into(),
            name: name.into(),
            arn: None,
        })
    }

    /// Canonical string identity sent to the remote API.
    pub fn resolve(&self) -> &str {
        match self {
            ResourceRef::ByName(name) => name,
            ResourceRef::ByHandle(handle) => handle.arn.as_deref().unwrap_or(&handle.name),
        }
    }
}

/// Declared value of one field. Fields absent from the descriptor are unset.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Value(Value),
    Ref(ResourceRef),
    /// Declared but left to the remote default. Never sent, never compared.
    UseDefault,
}

impl FieldValue {
    /// Whether the field contributes to payloads and drift.
    pub fn is_present(&self) -> bool {
        match self {
            FieldValue::Value(v) => !v.is_null(),
            FieldValue::Ref(_) => true,
            FieldValue::UseDefault => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Delete even if the remote would otherwise refuse (e.g. running tasks).
    pub force: Option<bool>,
}

/// Canonical identity of a remote resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: String,
    pub name: String,
    pub scope: Option<String>,
}

impl ResourceId {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, scope: Option<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            scope,
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{}:{}/{}", self.kind, scope, self.name),
            None => write!(f, "{}:{}", self.kind, self.name),
        }
    }
}

impl FromStr for ResourceId {
    type Err = ReconcileError;

    /// Parses `kind:name` or `kind:scope/name`. The scope may itself contain
    /// `:` and `/` (ARNs); the name may not contain `/`.
    fn from_str(s: &str) -> Result<Self> {
        let (kind, rest) = s
            .split_once(':')
            .ok_or_else(|| ReconcileError::config(format!("expected kind:[scope/]name, got '{s}'")))?;
        if kinds::lookup(kind).is_none() {
            return Err(ReconcileError::config(format!("unknown kind '{kind}'")));
        }
        let (scope, name) = match rest.rsplit_once('/') {
            Some((scope, name)) => (Some(scope.to_string()), name),
            None => (None, rest),
        };
        if name.is_empty() || scope.as_deref() == Some("") {
            return Err(ReconcileError::config(format!("malformed identity '{s}'")));
        }
        Ok(ResourceId::new(kind, name, scope))
    }
}

/// Desired state of one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDescriptor {
    kind: String,
    name: String,
    remote_name: Option<String>,
    fields: BTreeMap<String, FieldValue>,
    delete_options: DeleteOptions,
}

impl ResourceDescriptor {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            remote_name: None,
            fields: BTreeMap::new(),
            delete_options: DeleteOptions::default(),
        }
    }

    /// Declare a plain field value.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), FieldValue::Value(value.into()));
        self
    }

    /// Declare a reference to a parent resource.
    pub fn with_ref(mut self, name: impl Into<String>, reference: ResourceRef) -> Self {
        self.fields.insert(name.into(), FieldValue::Ref(reference));
        self
    }

    /// Declare a field as left to the remote default.
    pub fn with_default(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), FieldValue::UseDefault);
        self
    }

    pub fn with_field_value(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Use a different name on the remote side than the logical name.
    pub fn with_remote_name(mut self, remote_name: impl Into<String>) -> Self {
        self.remote_name = Some(remote_name.into());
        self
    }

    pub fn with_force_delete(mut self, force: bool) -> Self {
        self.delete_options.force = Some(force);
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Logical name as declared.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name used on the remote side.
    pub fn remote_name(&self) -> &str {
        self.remote_name.as_deref().unwrap_or(&self.name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn delete_options(&self) -> &DeleteOptions {
        &self.delete_options
    }

    /// Structural validation: known kind, non-empty name, known fields and
    /// well-typed references.
    pub fn validate(&self) -> Result<&'static KindSpec> {
        let spec = kinds::lookup(&self.kind)
            .ok_or_else(|| ReconcileError::config(format!("unknown kind '{}'", self.kind)))?;

        if self.remote_name().trim().is_empty() {
            return Err(ReconcileError::config(format!("{} has an empty name", self.kind)));
        }

        for (name, value) in &self.fields {
            let field = spec.field(name).ok_or_else(|| {
                ReconcileError::config(format!("{} '{}': unknown field '{}'", self.kind, self.name, name))
            })?;

            match (value, field.reference) {
                (FieldValue::Ref(_), None) => {
                    return Err(ReconcileError::config(format!(
                        "{} '{}': field '{}' does not take a reference",
                        self.kind, self.name, name
                    )));
                }
                (FieldValue::Ref(ResourceRef::ByHandle(handle)), Some(expected))
                    if handle.kind != expected =>
                {
                    return Err(ReconcileError::config(format!(
                        "{} '{}': field '{}' references a {}, expected {}",
                        self.kind, self.name, name, handle.kind, expected
                    )));
                }
                (FieldValue::Value(v), Some(_)) if !v.is_null() && !v.is_string() => {
                    return Err(ReconcileError::config(format!(
                        "{} '{}': reference field '{}' must be a name or handle",
                        self.kind, self.name, name
                    )));
                }
                _ => {}
            }
        }

        Ok(spec)
    }

    /// Checks that every field a create needs is declared with a value.
    pub fn check_required(&self) -> Result<()> {
        let spec = self.validate()?;
        let missing: Vec<&str> = spec
            .required
            .iter()
            .copied()
            .filter(|f| !self.fields.get(*f).is_some_and(FieldValue::is_present))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ReconcileError::config(format!(
                "{} '{}': missing required field(s): {}",
                self.kind,
                self.name,
                missing.join(", ")
            )))
        }
    }

    /// Canonical identity. The scope is the resolved value of the kind's
    /// scope field, if the kind has one and it is declared.
    pub fn id(&self) -> Result<ResourceId> {
        let spec = self.validate()?;
        Ok(ResourceId::new(&self.kind, self.remote_name(), self.scope(spec)))
    }

    /// Identity for reporting. Resolves the scope best-effort when the
    /// descriptor does not validate.
    pub fn display_id(&self) -> ResourceId {
        self.id().unwrap_or_else(|_| {
            let scope = kinds::lookup(&self.kind).and_then(|spec| self.scope(spec));
            ResourceId::new(&self.kind, self.remote_name(), scope)
        })
    }

    fn scope(&self, spec: &KindSpec) -> Option<String> {
        spec.scope_field
            .and_then(|f| self.fields.get(f))
            .and_then(|value| match value {
                FieldValue::Value(Value::String(s)) => Some(s.clone()),
                FieldValue::Ref(r) => Some(r.resolve().to_string()),
                _ => None,
            })
    }
}
