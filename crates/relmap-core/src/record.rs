//! Row-backed record values with identity, audit, and soft-delete metadata.

use std::collections::BTreeMap;

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::ToSql;

use crate::catalog::ScalarType;

/// The identity column present on every synthesized table.
pub const ID_COLUMN: &str = "id";

/// Audit and soft-delete columns present on every synthesized table.
pub const AUDIT_COLUMNS: [&str; 6] = [
    "created_at",
    "updated_at",
    "created_by",
    "updated_by",
    "deleted_at",
    "deleted_by",
];

/// Check whether a column name is reserved for identity or audit use.
pub fn is_reserved_column(name: &str) -> bool {
    name == ID_COLUMN || AUDIT_COLUMNS.contains(&name)
}

/// Current timestamp in microseconds since the Unix epoch.
pub fn current_timestamp() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

/// Generate a new record ID (UUID v4 format).
pub fn generate_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    // Counter to ensure uniqueness even with same timestamp
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    // Combine timestamp with monotonically increasing counter
    let counter = COUNTER.fetch_add(1, Ordering::SeqCst);

    let mut id = [0u8; 16];
    id[..8].copy_from_slice(&now.to_le_bytes());
    id[8..16].copy_from_slice(&counter.to_le_bytes());

    // Set UUID version 4 bits
    id[6] = (id[6] & 0x0f) | 0x40;
    id[8] = (id[8] & 0x3f) | 0x80;

    format_uuid(&id)
}

fn format_uuid(bytes: &[u8; 16]) -> String {
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..]
    )
}

/// Runtime value for a record field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    Text(String),
    /// Timestamp as microseconds since the Unix epoch.
    Timestamp(i64),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) | Value::Timestamp(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::json!(i),
            Value::Float(f) => serde_json::json!(f),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Timestamp(t) => serde_json::json!(t),
        }
    }

    /// Convert from a JSON value.
    ///
    /// Arrays and objects are not representable as record fields; those
    /// return an error message suitable for a validation violation.
    pub fn from_json(json: &serde_json::Value) -> Result<Value, String> {
        match json {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Value::Float(f))
                } else {
                    Err(format!("number {} is out of range", n))
                }
            }
            serde_json::Value::String(s) => Ok(Value::Text(s.clone())),
            serde_json::Value::Array(_) => Err("arrays are not supported".to_string()),
            serde_json::Value::Object(_) => Err("nested objects are not supported".to_string()),
        }
    }

    /// Decode a raw SQL value, coercing integers through the declared type.
    pub(crate) fn from_sql(raw: ValueRef<'_>, expected: Option<ScalarType>) -> Value {
        match raw {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => match expected {
                Some(ScalarType::Bool) => Value::Bool(i != 0),
                Some(ScalarType::Timestamp) => Value::Timestamp(i),
                _ => Value::Int(i),
            },
            ValueRef::Real(f) => Value::Float(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(_) => Value::Null,
        }
    }

    /// Check whether this value is acceptable for a declared scalar type.
    pub fn matches_type(&self, scalar: ScalarType) -> bool {
        match (self, scalar) {
            (Value::Null, _) => true,
            (Value::Bool(_), ScalarType::Bool) => true,
            (Value::Int(_), ScalarType::Int | ScalarType::Timestamp | ScalarType::Float) => true,
            (Value::Float(_), ScalarType::Float) => true,
            (Value::Text(_), ScalarType::Text | ScalarType::Uuid) => true,
            (Value::Timestamp(_), ScalarType::Timestamp | ScalarType::Int) => true,
            _ => false,
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Bool(b) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*b as i64)),
            Value::Int(i) | Value::Timestamp(i) => {
                ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i))
            }
            Value::Float(f) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl From<&Value> for rusqlite::types::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => rusqlite::types::Value::Null,
            Value::Bool(b) => rusqlite::types::Value::Integer(*b as i64),
            Value::Int(i) | Value::Timestamp(i) => rusqlite::types::Value::Integer(*i),
            Value::Float(f) => rusqlite::types::Value::Real(*f),
            Value::Text(s) => rusqlite::types::Value::Text(s.clone()),
        }
    }
}

/// A persisted record: identity, typed fields, audit and soft-delete metadata.
///
/// Relationship rows are records too; their `entity` is the relationship name
/// and their fields include one identity column per side.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Entity type (or relationship name for join rows).
    pub entity: String,
    /// Record identity. Immutable once set.
    pub id: String,
    /// Declared field values keyed by column name.
    pub fields: BTreeMap<String, Value>,
    /// Creation timestamp (microseconds since the Unix epoch).
    pub created_at: i64,
    /// Last-update timestamp.
    pub updated_at: i64,
    /// Actor that created the record.
    pub created_by: Option<String>,
    /// Actor that last updated the record.
    pub updated_by: Option<String>,
    /// Soft-delete timestamp; non-null marks the record logically absent.
    pub deleted_at: Option<i64>,
    /// Actor that soft-deleted the record.
    pub deleted_by: Option<String>,
}

impl Record {
    /// Check whether this record is soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Get a field value by name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Flatten identity, fields, and audit metadata into one JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert(
            ID_COLUMN.to_string(),
            serde_json::Value::String(self.id.clone()),
        );
        for (name, value) in &self.fields {
            obj.insert(name.clone(), value.to_json());
        }
        obj.insert("created_at".to_string(), serde_json::json!(self.created_at));
        obj.insert("updated_at".to_string(), serde_json::json!(self.updated_at));
        obj.insert("created_by".to_string(), serde_json::json!(self.created_by));
        obj.insert("updated_by".to_string(), serde_json::json!(self.updated_by));
        obj.insert("deleted_at".to_string(), serde_json::json!(self.deleted_at));
        obj.insert("deleted_by".to_string(), serde_json::json!(self.deleted_by));
        serde_json::Value::Object(obj)
    }

    /// Decode a record from a SQL row.
    ///
    /// `columns` must list the row's columns in order; `types` maps declared
    /// field names to their scalar types for integer coercion.
    pub(crate) fn from_row(
        entity: &str,
        columns: &[String],
        row: &rusqlite::Row<'_>,
        types: &BTreeMap<String, ScalarType>,
    ) -> rusqlite::Result<Self> {
        let mut record = Record {
            entity: entity.to_string(),
            id: String::new(),
            fields: BTreeMap::new(),
            created_at: 0,
            updated_at: 0,
            created_by: None,
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
        };

        for (idx, column) in columns.iter().enumerate() {
            let raw = row.get_ref(idx)?;
            match column.as_str() {
                ID_COLUMN => {
                    if let ValueRef::Text(t) = raw {
                        record.id = String::from_utf8_lossy(t).into_owned();
                    }
                }
                "created_at" => {
                    if let ValueRef::Integer(i) = raw {
                        record.created_at = i;
                    }
                }
                "updated_at" => {
                    if let ValueRef::Integer(i) = raw {
                        record.updated_at = i;
                    }
                }
                "created_by" => {
                    if let ValueRef::Text(t) = raw {
                        record.created_by = Some(String::from_utf8_lossy(t).into_owned());
                    }
                }
                "updated_by" => {
                    if let ValueRef::Text(t) = raw {
                        record.updated_by = Some(String::from_utf8_lossy(t).into_owned());
                    }
                }
                "deleted_at" => {
                    if let ValueRef::Integer(i) = raw {
                        record.deleted_at = Some(i);
                    }
                }
                "deleted_by" => {
                    if let ValueRef::Text(t) = raw {
                        record.deleted_by = Some(String::from_utf8_lossy(t).into_owned());
                    }
                }
                _ => {
                    let value = Value::from_sql(raw, types.get(column).copied());
                    record.fields.insert(column.clone(), value);
                }
            }
        }

        Ok(record)
    }
}
