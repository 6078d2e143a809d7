//! Descriptor documents.
//!
//! A document lists resources under a top-level `resources` key:
//!
//! ```yaml
//! resources:
//!   - kind: service
//!     name: web
//!     remote_name: web-prod
//!     force_delete: true
//!     fields:
//!       cluster: prod
//!       desired_count: 3
//!       task_definition: { ref: { kind: task_definition, name: web } }
//!       platform_version: $default
//! ```
//!
//! A field whose value is a single-key `{ref: ...}` map is a reference,
//! `$default` leaves the field to the remote default and `null` leaves it
//! unset. Every descriptor is validated on load.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::descriptor::{
    DeleteOptions, FieldValue, ResourceDescriptor, ResourceHandle, ResourceId, ResourceRef,
    USE_DEFAULT,
};
use crate::error::{ErrorKind, ReconcileError};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("resource #{index} ({name}): {message}")]
    Invalid {
        index: usize,
        name: String,
        message: String,
    },

    #[error(transparent)]
    Descriptor(#[from] ReconcileError),
}

impl ManifestError {
    /// I/O failures are runtime errors; everything else is a configuration
    /// error in the document itself.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ManifestError::Io { .. } => None,
            _ => Some(ErrorKind::FatalConfig),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
}

impl Format {
    /// `.json` is JSON, anything else is YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
            _ => Format::Yaml,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    #[serde(default)]
    resources: Vec<RawResource>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawResource {
    kind: String,
    name: String,
    #[serde(default)]
    remote_name: Option<String>,
    #[serde(default)]
    force_delete: Option<bool>,
    #[serde(default)]
    fields: Map<String, Value>,
}

/// Validated descriptors, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub resources: Vec<ResourceDescriptor>,
}

impl Manifest {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&source, Format::from_path(path))
    }

    pub fn parse(source: &str, format: Format) -> Result<Self, ManifestError> {
        let raw: RawManifest = match format {
            Format::Json => serde_json::from_str(source)?,
            Format::Yaml => serde_yaml::from_str(source)?,
        };

        let mut seen = HashSet::new();
        let mut resources = Vec::with_capacity(raw.resources.len());
        for (index, entry) in raw.resources.into_iter().enumerate() {
            let descriptor = descriptor(index, entry)?;
            descriptor.validate()?;
            let id = descriptor.id()?;
            if !seen.insert(id.clone()) {
                return Err(ManifestError::Invalid {
                    index,
                    name: descriptor.name().to_string(),
                    message: format!("duplicate identity {id}"),
                });
            }
            resources.push(descriptor);
        }

        Ok(Self { resources })
    }

    /// Checks every resource declares the fields a create needs, so a
    /// reconcile can be refused before the first remote call. Reports all
    /// offending resources at once.
    pub fn check_required(&self) -> Result<(), ReconcileError> {
        let problems: Vec<String> = self
            .resources
            .iter()
            .filter_map(|d| d.check_required().err())
            .map(|e| match e {
                ReconcileError::FatalConfig(message) => message,
                other => other.to_string(),
            })
            .collect();

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ReconcileError::FatalConfig(problems.join("; ")))
        }
    }

    /// Delete targets for every declared resource, last declared first so
    /// dependents go before the resources they reference.
    pub fn destroy_targets(&self) -> Result<Vec<(ResourceId, DeleteOptions)>, ReconcileError> {
        self.resources
            .iter()
            .rev()
            .map(|d| d.id().map(|id| (id, d.delete_options().clone())))
            .collect()
    }
}

fn descriptor(index: usize, raw: RawResource) -> Result<ResourceDescriptor, ManifestError> {
    let mut descriptor = ResourceDescriptor::new(&raw.kind, &raw.name);
    if let Some(remote_name) = raw.remote_name {
        descriptor = descriptor.with_remote_name(remote_name);
    }
    if let Some(force) = raw.force_delete {
        descriptor = descriptor.with_force_delete(force);
    }

    for (field, value) in raw.fields {
        let value = field_value(value).map_err(|message| ManifestError::Invalid {
            index,
            name: raw.name.clone(),
            message: format!("field '{field}': {message}"),
        })?;
        if let Some(value) = value {
            descriptor = descriptor.with_field_value(field, value);
        }
    }

    Ok(descriptor)
}

fn field_value(value: Value) -> Result<Option<FieldValue>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s == USE_DEFAULT => Ok(Some(FieldValue::UseDefault)),
        Value::Object(mut map) if map.len() == 1 && map.contains_key("ref") => {
            let reference = match map.remove("ref") {
                Some(Value::String(name)) => ResourceRef::ByName(name),
                Some(handle @ Value::Object(_)) => {
                    let handle: ResourceHandle = serde_json::from_value(handle)
                        .map_err(|e| format!("invalid reference handle: {e}"))?;
                    ResourceRef::ByHandle(handle)
                }
                _ => return Err("reference must be a name or {kind, name, arn} handle".into()),
            };
            Ok(Some(FieldValue::Ref(reference)))
        }
        other => Ok(Some(FieldValue::Value(other))),
    }
}
