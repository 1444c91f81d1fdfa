//! Plain data containers shared by requests and responses.

use std::fmt;
use std::ops::AddAssign;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use super::Operation;
use super::value::ColumnValue;
use crate::error::ClientError;
use crate::protocol::wire;

/// Ordered column name to value mapping.
///
/// Order is significant for primary keys: the service expects the columns in
/// schema order. Inserting an existing name replaces its value in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnMap(Vec<(String, ColumnValue)>);

pub type PrimaryKey = ColumnMap;
pub type Attributes = ColumnMap;

impl ColumnMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`ColumnMap::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ColumnValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ColumnValue>) -> Option<ColumnValue> {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.0.push((name, value));
                None
            },
        }
    }

    pub fn get(&self, name: &str) -> Option<&ColumnValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnValue)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub(crate) fn to_wire(&self) -> Vec<wire::Column> {
        self.0
            .iter()
            .map(|(name, value)| wire::Column {
                name: name.clone(),
                value: Some(value.to_wire()),
            })
            .collect()
    }

    pub(crate) fn from_wire(operation: Operation, columns: Vec<wire::Column>) -> Result<Self, ClientError> {
        let mut map = ColumnMap::new();
        for column in columns {
            let value = column
                .value
                .ok_or_else(|| ClientError::decode(operation, format!("column {} has no value", column.name)))?;
            map.0.push((column.name, ColumnValue::from_wire(operation, value)?));
        }
        Ok(map)
    }
}

impl<K: Into<String>, V: Into<ColumnValue>> FromIterator<(K, V)> for ColumnMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = ColumnMap::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

impl<K: Into<String>, V: Into<ColumnValue>> From<Vec<(K, V)>> for ColumnMap {
    fn from(pairs: Vec<(K, V)>) -> Self {
        pairs.into_iter().collect()
    }
}

impl IntoIterator for ColumnMap {
    type Item = (String, ColumnValue);
    type IntoIter = std::vec::IntoIter<(String, ColumnValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A JSON object maps onto columns in its key order.
impl TryFrom<JsonValue> for ColumnMap {
    type Error = ClientError;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        let JsonValue::Object(object) = value else {
            return Err(ClientError::UnsupportedValueType(format!(
                "{} where an object of columns is expected",
                json_type_name(&value)
            )));
        };

        let mut map = ColumnMap::new();
        for (name, value) in object {
            map.insert(name, ColumnValue::try_from(value)?);
        }
        Ok(map)
    }
}

impl From<&ColumnMap> for JsonValue {
    fn from(map: &ColumnMap) -> Self {
        JsonValue::Object(map.iter().map(|(name, value)| (name.to_string(), JsonValue::from(value))).collect())
    }
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

impl fmt::Display for ColumnMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        write!(f, "}}")
    }
}

/// Primary key column type in a table schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Integer,
    String,
    Boolean,
    Double,
    Binary,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::String => "STRING",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Double => "DOUBLE",
            ColumnType::Binary => "BINARY",
        }
    }

    fn to_wire(self) -> wire::ColumnType {
        match self {
            ColumnType::Integer => wire::ColumnType::Integer,
            ColumnType::String => wire::ColumnType::String,
            ColumnType::Boolean => wire::ColumnType::Boolean,
            ColumnType::Double => wire::ColumnType::Double,
            ColumnType::Binary => wire::ColumnType::Binary,
        }
    }

    fn from_wire(operation: Operation, raw: i32) -> Result<Self, ClientError> {
        match wire::ColumnType::try_from(raw) {
            Ok(wire::ColumnType::Integer) => Ok(ColumnType::Integer),
            Ok(wire::ColumnType::String) => Ok(ColumnType::String),
            Ok(wire::ColumnType::Boolean) => Ok(ColumnType::Boolean),
            Ok(wire::ColumnType::Double) => Ok(ColumnType::Double),
            Ok(wire::ColumnType::Binary) => Ok(ColumnType::Binary),
            _ => Err(ClientError::decode(operation, format!("invalid primary key type {}", raw))),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INTEGER" => Ok(ColumnType::Integer),
            "STRING" => Ok(ColumnType::String),
            "BOOLEAN" => Ok(ColumnType::Boolean),
            "DOUBLE" => Ok(ColumnType::Double),
            "BINARY" => Ok(ColumnType::Binary),
            other => Err(ClientError::UnknownName {
                field: "column_type",
                expected: "INTEGER, STRING, BOOLEAN, DOUBLE, BINARY",
                value: other.to_string(),
            }),
        }
    }
}

/// Table name plus its ordered primary key schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMeta {
    pub table_name: String,
    pub schema_of_primary_key: Vec<(String, ColumnType)>,
}

impl TableMeta {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            schema_of_primary_key: Vec::new(),
        }
    }

    pub fn with_primary_key(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.schema_of_primary_key.push((name.into(), column_type));
        self
    }

    pub(crate) fn to_wire(&self) -> wire::TableMeta {
        wire::TableMeta {
            table_name: self.table_name.clone(),
            primary_key: self
                .schema_of_primary_key
                .iter()
                .map(|(name, column_type)| wire::ColumnSchema {
                    name: name.clone(),
                    r#type: column_type.to_wire() as i32,
                })
                .collect(),
        }
    }

    pub(crate) fn from_wire(operation: Operation, meta: wire::TableMeta) -> Result<Self, ClientError> {
        let schema_of_primary_key = meta
            .primary_key
            .into_iter()
            .map(|schema| Ok((schema.name, ColumnType::from_wire(operation, schema.r#type)?)))
            .collect::<Result<_, ClientError>>()?;
        Ok(Self {
            table_name: meta.table_name,
            schema_of_primary_key,
        })
    }
}

/// Read/write capacity units. Either side may be absent, e.g. in an
/// UpdateTable request that only changes one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapacityUnit {
    pub read: Option<i32>,
    pub write: Option<i32>,
}

impl CapacityUnit {
    pub fn new(read: i32, write: i32) -> Self {
        Self {
            read: Some(read),
            write: Some(write),
        }
    }

    pub fn read_only(read: i32) -> Self {
        Self {
            read: Some(read),
            write: None,
        }
    }

    pub fn write_only(write: i32) -> Self {
        Self {
            read: None,
            write: Some(write),
        }
    }

    pub(crate) fn to_wire(self) -> wire::CapacityUnit {
        wire::CapacityUnit {
            read: self.read,
            write: self.write,
        }
    }

    pub(crate) fn from_wire(unit: Option<wire::CapacityUnit>) -> Self {
        unit.map(|u| Self {
            read: u.read,
            write: u.write,
        })
        .unwrap_or_default()
    }

    pub(crate) fn from_consumed(consumed: Option<wire::ConsumedCapacity>) -> Self {
        Self::from_wire(consumed.and_then(|c| c.capacity_unit))
    }
}

impl fmt::Display for CapacityUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = |v: Option<i32>| v.map_or_else(|| "-".to_string(), |v| v.to_string());
        write!(f, "read={} write={}", side(self.read), side(self.write))
    }
}

/// Sums each side, treating an absent side as zero unless both are absent.
impl AddAssign for CapacityUnit {
    fn add_assign(&mut self, other: Self) {
        let add = |a: Option<i32>, b: Option<i32>| match (a, b) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or(0).saturating_add(b.unwrap_or(0))),
        };
        self.read = add(self.read, other.read);
        self.write = add(self.write, other.write);
    }
}

/// Current reservation of a table as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedThroughputDetails {
    pub capacity_unit: CapacityUnit,
    pub last_increase_time: DateTime<Utc>,
    pub last_decrease_time: Option<DateTime<Utc>>,
    pub number_of_decreases_today: i32,
}

impl ReservedThroughputDetails {
    pub(crate) fn from_wire(
        operation: Operation,
        details: Option<wire::ReservedThroughputDetails>,
    ) -> Result<Self, ClientError> {
        let details =
            details.ok_or_else(|| ClientError::decode(operation, "reserved_throughput_details is missing"))?;
        let timestamp = |secs: i64| {
            DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| ClientError::decode(operation, format!("invalid timestamp {}", secs)))
        };

        Ok(Self {
            capacity_unit: CapacityUnit::from_wire(details.capacity_unit),
            last_increase_time: timestamp(details.last_increase_time)?,
            last_decrease_time: details.last_decrease_time.map(timestamp).transpose()?,
            number_of_decreases_today: details.number_of_decreases_today,
        })
    }
}

/// Row existence expectation checked by the service before a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RowExistence {
    #[default]
    Ignore,
    ExpectExist,
    ExpectNotExist,
}

impl RowExistence {
    pub(crate) fn to_wire(self) -> wire::Condition {
        let expectation = match self {
            RowExistence::Ignore => wire::RowExistenceExpectation::Ignore,
            RowExistence::ExpectExist => wire::RowExistenceExpectation::ExpectExist,
            RowExistence::ExpectNotExist => wire::RowExistenceExpectation::ExpectNotExist,
        };
        wire::Condition {
            row_existence: expectation as i32,
        }
    }
}

/// Scan direction of a range read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    pub(crate) fn to_wire(self) -> wire::Direction {
        match self {
            Direction::Forward => wire::Direction::Forward,
            Direction::Backward => wire::Direction::Backward,
        }
    }
}

impl FromStr for Direction {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FORWARD" => Ok(Direction::Forward),
            "BACKWARD" => Ok(Direction::Backward),
            other => Err(ClientError::UnknownName {
                field: "direction",
                expected: "FORWARD, BACKWARD",
                value: other.to_string(),
            }),
        }
    }
}

/// Column changes applied by an UpdateRow.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateOfAttribute {
    pub put: ColumnMap,
    pub delete: Vec<String>,
}

impl UpdateOfAttribute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(mut self, name: impl Into<String>, value: impl Into<ColumnValue>) -> Self {
        self.put.insert(name, value);
        self
    }

    pub fn delete(mut self, name: impl Into<String>) -> Self {
        self.delete.push(name.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.put.is_empty() && self.delete.is_empty()
    }

    pub(crate) fn to_wire(&self) -> Vec<wire::ColumnUpdate> {
        let puts = self.put.iter().map(|(name, value)| wire::ColumnUpdate {
            r#type: wire::OperationType::Put as i32,
            name: name.to_string(),
            value: Some(value.to_wire()),
        });
        let deletes = self.delete.iter().map(|name| wire::ColumnUpdate {
            r#type: wire::OperationType::Delete as i32,
            name: name.clone(),
            value: None,
        });
        puts.chain(deletes).collect()
    }
}

/// A row as returned by reads.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub primary_key: PrimaryKey,
    pub attributes: Attributes,
}

impl Row {
    pub fn is_empty(&self) -> bool {
        self.primary_key.is_empty() && self.attributes.is_empty()
    }

    pub(crate) fn from_wire(operation: Operation, row: wire::Row) -> Result<Self, ClientError> {
        Ok(Self {
            primary_key: ColumnMap::from_wire(operation, row.primary_key_columns)?,
            attributes: ColumnMap::from_wire(operation, row.attribute_columns)?,
        })
    }
}

/// Per-row failure inside a batch response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct RowError {
    pub code: String,
    pub message: String,
}

impl RowError {
    pub(crate) fn from_wire(error: Option<wire::Error>) -> Self {
        match error {
            Some(e) => Self {
                code: e.code,
                message: e.message.unwrap_or_default(),
            },
            None => Self {
                code: String::new(),
                message: String::new(),
            },
        }
    }
}
