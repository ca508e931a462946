//! Module keys and the payload shape each one declares

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::DataError;
use super::record::Payload;

/// Domain sub-ledger discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKey {
    Materials,
    Progress,
    Payments,
    Approvals,
}

impl ModuleKey {
    pub const ALL: [ModuleKey; 4] = [
        ModuleKey::Materials,
        ModuleKey::Progress,
        ModuleKey::Payments,
        ModuleKey::Approvals,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModuleKey::Materials => "materials",
            ModuleKey::Progress => "progress",
            ModuleKey::Payments => "payments",
            ModuleKey::Approvals => "approvals",
        }
    }

    /// Capability required to mutate records of this module
    pub fn write_capability(self) -> &'static str {
        match self {
            ModuleKey::Materials => "materials.write",
            ModuleKey::Progress => "progress.write",
            ModuleKey::Payments => "payments.write",
            ModuleKey::Approvals => "approvals.write",
        }
    }

    pub fn shape(self) -> &'static [FieldSpec] {
        match self {
            ModuleKey::Materials => MATERIALS_SHAPE,
            ModuleKey::Progress => PROGRESS_SHAPE,
            ModuleKey::Payments => PAYMENTS_SHAPE,
            ModuleKey::Approvals => APPROVALS_SHAPE,
        }
    }

    fn field(self, name: &str) -> Option<&'static FieldSpec> {
        self.shape().iter().find(|f| f.name == name)
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleKey {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModuleKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| DataError::Invalid(format!("unknown module key '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Flag,
}

impl FieldKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            FieldKind::Text => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Flag => value.is_boolean(),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            FieldKind::Text => "a string",
            FieldKind::Number => "a number",
            FieldKind::Flag => "a boolean",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

const fn required(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind, required: true }
}

const fn optional(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind, required: false }
}

const MATERIALS_SHAPE: &[FieldSpec] = &[
    required("title", FieldKind::Text),
    optional("quantity", FieldKind::Number),
    optional("unit", FieldKind::Text),
    optional("supplier", FieldKind::Text),
    optional("status", FieldKind::Text),
];

const PROGRESS_SHAPE: &[FieldSpec] = &[
    required("title", FieldKind::Text),
    optional("percent", FieldKind::Number),
    optional("notes", FieldKind::Text),
    optional("reported_on", FieldKind::Text),
];

const PAYMENTS_SHAPE: &[FieldSpec] = &[
    required("title", FieldKind::Text),
    required("amount", FieldKind::Number),
    optional("currency", FieldKind::Text),
    optional("paid", FieldKind::Flag),
    optional("due_on", FieldKind::Text),
];

const APPROVALS_SHAPE: &[FieldSpec] = &[
    required("title", FieldKind::Text),
    optional("status", FieldKind::Text),
    optional("approver", FieldKind::Text),
    optional("comment", FieldKind::Text),
];

/// Fields the system owns; callers may never supply them
pub const RESERVED_FIELDS: &[&str] = &[
    "id",
    "tenant_id",
    "project_id",
    "module_key",
    "created_by",
    "created_at",
];

/// Validate a full create input against the module's shape
pub fn validate_create(key: ModuleKey, input: Value) -> Result<Payload, DataError> {
    let payload = validate_fields(key, input)?;

    for field in key.shape().iter().filter(|f| f.required) {
        match payload.get(field.name) {
            None | Some(Value::Null) => {
                return Err(DataError::Invalid(format!(
                    "{}: '{}' is required",
                    key, field.name
                )))
            }
            Some(_) => {}
        }
    }

    Ok(payload)
}

/// Validate a partial update; only the supplied fields are checked
pub fn validate_patch(key: ModuleKey, input: Value) -> Result<Payload, DataError> {
    let patch = validate_fields(key, input)?;

    for (name, value) in &patch {
        let required = key.field(name).map(|f| f.required).unwrap_or(false);
        if required && value.is_null() {
            return Err(DataError::Invalid(format!(
                "{}: '{}' cannot be cleared",
                key, name
            )));
        }
    }

    Ok(patch)
}

/// Shallow merge: supplied fields overwrite, omitted fields keep their value
pub fn merge(target: &mut Payload, patch: Payload) {
    for (name, value) in patch {
        target.insert(name, value);
    }
}

fn validate_fields(key: ModuleKey, input: Value) -> Result<Payload, DataError> {
    let Value::Object(payload) = input else {
        return Err(DataError::Invalid(format!("{}: input must be an object", key)));
    };

    for (name, value) in &payload {
        if RESERVED_FIELDS.contains(&name.as_str()) {
            return Err(DataError::Invalid(format!(
                "{}: '{}' is assigned by the system",
                key, name
            )));
        }

        let field = key.field(name).ok_or_else(|| {
            DataError::Invalid(format!("{}: unknown field '{}'", key, name))
        })?;

        if value.is_null() {
            continue;
        }
        if !field.kind.accepts(value) {
            return Err(DataError::Invalid(format!(
                "{}: '{}' must be {}",
                key,
                name,
                field.kind.describe()
            )));
        }
    }

    if let Some(Value::String(title)) = payload.get("title") {
        if title.trim().is_empty() {
            return Err(DataError::Invalid(format!("{}: 'title' is empty", key)));
        }
    }

    Ok(payload)
}
