use std::fmt;

use serde_json::Value as JsonValue;

use super::Operation;
use crate::error::ClientError;
use crate::protocol::wire;

/// A single typed cell value.
///
/// `InfMin` and `InfMax` only make sense as range boundaries in
/// [`GetRangeRequest`](super::row::GetRangeRequest); the service never returns
/// them.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Integer(i64),
    String(String),
    Boolean(bool),
    Double(f64),
    Binary(Vec<u8>),
    InfMin,
    InfMax,
}

impl ColumnValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnValue::Integer(_) => "INTEGER",
            ColumnValue::String(_) => "STRING",
            ColumnValue::Boolean(_) => "BOOLEAN",
            ColumnValue::Double(_) => "DOUBLE",
            ColumnValue::Binary(_) => "BINARY",
            ColumnValue::InfMin => "INF_MIN",
            ColumnValue::InfMax => "INF_MAX",
        }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, ColumnValue::InfMin | ColumnValue::InfMax)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ColumnValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ColumnValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ColumnValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ColumnValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ColumnValue::Binary(v) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn to_wire(&self) -> wire::ColumnValue {
        let (column_type, mut value) = match self {
            ColumnValue::Integer(v) => (wire::ColumnType::Integer, wire::ColumnValue {
                v_int: Some(*v),
                ..Default::default()
            }),
            ColumnValue::String(v) => (wire::ColumnType::String, wire::ColumnValue {
                v_string: Some(v.clone()),
                ..Default::default()
            }),
            ColumnValue::Boolean(v) => (wire::ColumnType::Boolean, wire::ColumnValue {
                v_bool: Some(*v),
                ..Default::default()
            }),
            ColumnValue::Double(v) => (wire::ColumnType::Double, wire::ColumnValue {
                v_double: Some(*v),
                ..Default::default()
            }),
            ColumnValue::Binary(v) => (wire::ColumnType::Binary, wire::ColumnValue {
                v_binary: Some(v.clone()),
                ..Default::default()
            }),
            ColumnValue::InfMin => (wire::ColumnType::InfMin, wire::ColumnValue::default()),
            ColumnValue::InfMax => (wire::ColumnType::InfMax, wire::ColumnValue::default()),
        };
        value.r#type = column_type as i32;
        value
    }

    /// Decodes a value returned by the service: exactly one of the five
    /// concrete types, with its payload present.
    pub(crate) fn from_wire(operation: Operation, value: wire::ColumnValue) -> Result<Self, ClientError> {
        let column_type = wire::ColumnType::try_from(value.r#type)
            .map_err(|_| ClientError::decode(operation, format!("unknown column type {}", value.r#type)))?;
        let missing = || ClientError::decode(operation, format!("{:?} column without a value", column_type));

        match column_type {
            wire::ColumnType::Integer => value.v_int.map(ColumnValue::Integer).ok_or_else(missing),
            wire::ColumnType::String => value.v_string.map(ColumnValue::String).ok_or_else(missing),
            wire::ColumnType::Boolean => value.v_bool.map(ColumnValue::Boolean).ok_or_else(missing),
            wire::ColumnType::Double => value.v_double.map(ColumnValue::Double).ok_or_else(missing),
            wire::ColumnType::Binary => value.v_binary.map(ColumnValue::Binary).ok_or_else(missing),
            wire::ColumnType::InfMin | wire::ColumnType::InfMax => Err(ClientError::decode(
                operation,
                format!("unexpected {:?} column in response", column_type),
            )),
        }
    }
}

impl fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnValue::Integer(v) => write!(f, "{}", v),
            ColumnValue::String(v) => write!(f, "{:?}", v),
            ColumnValue::Boolean(v) => write!(f, "{}", v),
            ColumnValue::Double(v) => write!(f, "{}", v),
            ColumnValue::Binary(v) => {
                write!(f, "0x")?;
                v.iter().try_for_each(|b| write!(f, "{:02x}", b))
            },
            ColumnValue::InfMin => write!(f, "INF_MIN"),
            ColumnValue::InfMax => write!(f, "INF_MAX"),
        }
    }
}

macro_rules! impl_from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ColumnValue {
                fn from(value: $t) -> Self {
                    ColumnValue::Integer(i64::from(value))
                }
            }
        )*
    };
}

impl_from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl TryFrom<u64> for ColumnValue {
    type Error = ClientError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value)
            .map(ColumnValue::Integer)
            .map_err(|_| ClientError::OutOfRange(value.to_string()))
    }
}

impl TryFrom<usize> for ColumnValue {
    type Error = ClientError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        i64::try_from(value)
            .map(ColumnValue::Integer)
            .map_err(|_| ClientError::OutOfRange(value.to_string()))
    }
}

impl From<f32> for ColumnValue {
    fn from(value: f32) -> Self {
        ColumnValue::Double(f64::from(value))
    }
}

impl From<f64> for ColumnValue {
    fn from(value: f64) -> Self {
        ColumnValue::Double(value)
    }
}

impl From<bool> for ColumnValue {
    fn from(value: bool) -> Self {
        ColumnValue::Boolean(value)
    }
}

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        ColumnValue::String(value.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(value: String) -> Self {
        ColumnValue::String(value)
    }
}

impl From<Vec<u8>> for ColumnValue {
    fn from(value: Vec<u8>) -> Self {
        ColumnValue::Binary(value)
    }
}

impl From<&[u8]> for ColumnValue {
    fn from(value: &[u8]) -> Self {
        ColumnValue::Binary(value.to_vec())
    }
}

/// Maps loosely-typed JSON onto a column value.
///
/// Strings, booleans, integers and floats map directly; an array of byte
/// values becomes `Binary` and `{"$inf": "min" | "max"}` an infinity marker.
/// Booleans are matched before numbers so `true` never becomes `1`.
impl TryFrom<JsonValue> for ColumnValue {
    type Error = ClientError;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        match value {
            JsonValue::String(s) => Ok(ColumnValue::String(s)),
            JsonValue::Bool(b) => Ok(ColumnValue::Boolean(b)),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(ColumnValue::Integer(i))
                } else if n.is_u64() {
                    Err(ClientError::OutOfRange(n.to_string()))
                } else {
                    n.as_f64()
                        .map(ColumnValue::Double)
                        .ok_or_else(|| ClientError::UnsupportedValueType(format!("number {}", n)))
                }
            },
            JsonValue::Array(items) => items
                .iter()
                .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()
                .map(ColumnValue::Binary)
                .ok_or_else(|| ClientError::UnsupportedValueType("array of non-byte values".to_string())),
            JsonValue::Object(map) => match (map.len(), map.get("$inf").and_then(JsonValue::as_str)) {
                (1, Some("min")) => Ok(ColumnValue::InfMin),
                (1, Some("max")) => Ok(ColumnValue::InfMax),
                _ => Err(ClientError::UnsupportedValueType("object".to_string())),
            },
            JsonValue::Null => Err(ClientError::UnsupportedValueType("null".to_string())),
        }
    }
}

/// Inverse of the JSON mapping above. Non-finite doubles become `null`.
impl From<&ColumnValue> for JsonValue {
    fn from(value: &ColumnValue) -> Self {
        match value {
            ColumnValue::Integer(v) => JsonValue::from(*v),
            ColumnValue::String(v) => JsonValue::from(v.as_str()),
            ColumnValue::Boolean(v) => JsonValue::from(*v),
            ColumnValue::Double(v) => JsonValue::from(*v),
            ColumnValue::Binary(v) => JsonValue::from(v.clone()),
            ColumnValue::InfMin => serde_json::json!({ "$inf": "min" }),
            ColumnValue::InfMax => serde_json::json!({ "$inf": "max" }),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn round_trip(value: ColumnValue) -> ColumnValue {
        ColumnValue::from_wire(Operation::GetRow, value.to_wire()).unwrap()
    }

    #[test]
    fn concrete_types_survive_the_wire() {
        for value in [
            ColumnValue::Integer(-42),
            ColumnValue::String("hello".into()),
            ColumnValue::Boolean(true),
            ColumnValue::Double(3.5),
            ColumnValue::Binary(vec![0, 1, 255]),
        ] {
            assert_eq!(round_trip(value.clone()), value);
        }
    }

    #[test]
    fn infinity_markers_encode_but_do_not_decode() {
        let wire = ColumnValue::InfMin.to_wire();
        assert_eq!(wire.r#type, wire::ColumnType::InfMin as i32);
        assert!(wire.v_int.is_none());

        let err = ColumnValue::from_wire(Operation::GetRange, ColumnValue::InfMax.to_wire()).unwrap_err();
        assert!(matches!(err, ClientError::Decode { operation: Operation::GetRange, .. }));
    }

    #[test]
    fn json_rendering_mirrors_json_parsing() {
        for value in [json!(7), json!("a"), json!(false), json!(1.5), json!([1, 2]), json!({"$inf": "max"})] {
            let column = ColumnValue::try_from(value.clone()).unwrap();
            assert_eq!(JsonValue::from(&column), value);
        }
        assert_eq!(JsonValue::from(&ColumnValue::Double(f64::NAN)), JsonValue::Null);
    }

    #[test]
    fn missing_payload_is_a_decode_error() {
        let wire = wire::ColumnValue {
            r#type: wire::ColumnType::String as i32,
            ..Default::default()
        };
        assert!(ColumnValue::from_wire(Operation::GetRow, wire).is_err());
    }

    #[test]
    fn native_conversions() {
        assert_eq!(ColumnValue::from(7u8), ColumnValue::Integer(7));
        assert_eq!(ColumnValue::from(u32::MAX), ColumnValue::Integer(u32::MAX as i64));
        assert_eq!(ColumnValue::from(1.5f32), ColumnValue::Double(1.5));
        assert_eq!(ColumnValue::from("a"), ColumnValue::String("a".into()));
        assert_eq!(ColumnValue::from(&b"ab"[..]), ColumnValue::Binary(b"ab".to_vec()));
        assert_eq!(ColumnValue::try_from(5u64), Ok(ColumnValue::Integer(5)));
        assert!(matches!(ColumnValue::try_from(u64::MAX), Err(ClientError::OutOfRange(_))));
    }

    #[test]
    fn json_values_follow_type_order() {
        assert_eq!(ColumnValue::try_from(json!(true)), Ok(ColumnValue::Boolean(true)));
        assert_eq!(ColumnValue::try_from(json!(12)), Ok(ColumnValue::Integer(12)));
        assert_eq!(ColumnValue::try_from(json!(1.25)), Ok(ColumnValue::Double(1.25)));
        assert_eq!(ColumnValue::try_from(json!("x")), Ok(ColumnValue::String("x".into())));
        assert_eq!(ColumnValue::try_from(json!([1, 2])), Ok(ColumnValue::Binary(vec![1, 2])));
        assert_eq!(ColumnValue::try_from(json!({"$inf": "min"})), Ok(ColumnValue::InfMin));
        assert_eq!(ColumnValue::try_from(json!({"$inf": "max"})), Ok(ColumnValue::InfMax));
    }

    #[test]
    fn unsupported_json_shapes_name_the_type() {
        assert_eq!(
            ColumnValue::try_from(json!(null)),
            Err(ClientError::UnsupportedValueType("null".into()))
        );
        assert_eq!(
            ColumnValue::try_from(json!({"a": 1})),
            Err(ClientError::UnsupportedValueType("object".into()))
        );
        assert!(ColumnValue::try_from(json!([1, 256])).is_err());
        assert!(ColumnValue::try_from(json!(["a"])).is_err());
    }

    #[test]
    fn display_is_readable() {
        assert_eq!(ColumnValue::Binary(vec![0xab, 0x01]).to_string(), "0xab01");
        assert_eq!(ColumnValue::String("a".into()).to_string(), "\"a\"");
        assert_eq!(ColumnValue::InfMax.to_string(), "INF_MAX");
    }
}
