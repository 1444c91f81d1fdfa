//! Table management operations.

use prost::Message;

use super::model::{CapacityUnit, ReservedThroughputDetails, TableMeta};
use super::{Operation, OtsRequest, decode_message, require_table_name};
use crate::error::ClientError;
use crate::protocol::wire;

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableRequest {
    pub table_meta: TableMeta,
    /// Both read and write must be set.
    pub reserved_throughput: CapacityUnit,
}

impl CreateTableRequest {
    pub fn new(table_meta: TableMeta, reserved_throughput: CapacityUnit) -> Self {
        Self {
            table_meta,
            reserved_throughput,
        }
    }
}

impl OtsRequest for CreateTableRequest {
    const OPERATION: Operation = Operation::CreateTable;
    type Response = ();

    fn encode(&self) -> Result<Vec<u8>, ClientError> {
        require_table_name(Self::OPERATION, &self.table_meta.table_name)?;
        if self.table_meta.schema_of_primary_key.is_empty() {
            return Err(ClientError::invalid(Self::OPERATION, "schema_of_primary_key must not be empty"));
        }
        if self.reserved_throughput.read.is_none() || self.reserved_throughput.write.is_none() {
            return Err(ClientError::invalid(
                Self::OPERATION,
                "both of read and write of CapacityUnit are required",
            ));
        }

        let request = wire::CreateTableRequest {
            table_meta: Some(self.table_meta.to_wire()),
            reserved_throughput: Some(wire::ReservedThroughput {
                capacity_unit: Some(self.reserved_throughput.to_wire()),
            }),
        };
        Ok(request.encode_to_vec())
    }

    fn decode(body: &[u8]) -> Result<Self::Response, ClientError> {
        decode_message::<wire::CreateTableResponse>(Self::OPERATION, body).map(|_| ())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteTableRequest {
    pub table_name: String,
}

impl DeleteTableRequest {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
        }
    }
}

impl OtsRequest for DeleteTableRequest {
    const OPERATION: Operation = Operation::DeleteTable;
    type Response = ();

    fn encode(&self) -> Result<Vec<u8>, ClientError> {
        require_table_name(Self::OPERATION, &self.table_name)?;
        Ok(wire::DeleteTableRequest {
            table_name: self.table_name.clone(),
        }
        .encode_to_vec())
    }

    fn decode(body: &[u8]) -> Result<Self::Response, ClientError> {
        decode_message::<wire::DeleteTableResponse>(Self::OPERATION, body).map(|_| ())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListTableRequest;

impl OtsRequest for ListTableRequest {
    const OPERATION: Operation = Operation::ListTable;
    /// Table names of the instance.
    type Response = Vec<String>;

    fn encode(&self) -> Result<Vec<u8>, ClientError> {
        Ok(wire::ListTableRequest {}.encode_to_vec())
    }

    fn decode(body: &[u8]) -> Result<Self::Response, ClientError> {
        decode_message::<wire::ListTableResponse>(Self::OPERATION, body).map(|r| r.table_names)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateTableRequest {
    pub table_name: String,
    /// At least one of read or write must be set.
    pub reserved_throughput: CapacityUnit,
}

impl UpdateTableRequest {
    pub fn new(table_name: impl Into<String>, reserved_throughput: CapacityUnit) -> Self {
        Self {
            table_name: table_name.into(),
            reserved_throughput,
        }
    }
}

impl OtsRequest for UpdateTableRequest {
    const OPERATION: Operation = Operation::UpdateTable;
    type Response = ReservedThroughputDetails;

    fn encode(&self) -> Result<Vec<u8>, ClientError> {
        require_table_name(Self::OPERATION, &self.table_name)?;
        if self.reserved_throughput.read.is_none() && self.reserved_throughput.write.is_none() {
            return Err(ClientError::invalid(
                Self::OPERATION,
                "at least one of read or write of CapacityUnit is required",
            ));
        }

        Ok(wire::UpdateTableRequest {
            table_name: self.table_name.clone(),
            reserved_throughput: Some(wire::ReservedThroughput {
                capacity_unit: Some(self.reserved_throughput.to_wire()),
            }),
        }
        .encode_to_vec())
    }

    fn decode(body: &[u8]) -> Result<Self::Response, ClientError> {
        let response = decode_message::<wire::UpdateTableResponse>(Self::OPERATION, body)?;
        ReservedThroughputDetails::from_wire(Self::OPERATION, response.reserved_throughput_details)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeTableRequest {
    pub table_name: String,
}

impl DescribeTableRequest {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeTableResponse {
    pub table_meta: TableMeta,
    pub reserved_throughput_details: ReservedThroughputDetails,
}

impl OtsRequest for DescribeTableRequest {
    const OPERATION: Operation = Operation::DescribeTable;
    type Response = DescribeTableResponse;

    fn encode(&self) -> Result<Vec<u8>, ClientError> {
        require_table_name(Self::OPERATION, &self.table_name)?;
        Ok(wire::DescribeTableRequest {
            table_name: self.table_name.clone(),
        }
        .encode_to_vec())
    }

    fn decode(body: &[u8]) -> Result<Self::Response, ClientError> {
        let response = decode_message::<wire::DescribeTableResponse>(Self::OPERATION, body)?;
        let table_meta = response
            .table_meta
            .ok_or_else(|| ClientError::decode(Self::OPERATION, "table_meta is missing"))?;

        Ok(DescribeTableResponse {
            table_meta: TableMeta::from_wire(Self::OPERATION, table_meta)?,
            reserved_throughput_details: ReservedThroughputDetails::from_wire(
                Self::OPERATION,
                response.reserved_throughput_details,
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::model::ColumnType;

    fn meta() -> TableMeta {
        TableMeta::new("myTable")
            .with_primary_key("gid", ColumnType::Integer)
            .with_primary_key("uid", ColumnType::Integer)
    }

    #[test]
    fn create_table_encodes_meta_and_throughput() {
        let body = CreateTableRequest::new(meta(), CapacityUnit::new(100, 100))
            .encode()
            .unwrap();
        let decoded = wire::CreateTableRequest::decode(body.as_slice()).unwrap();

        let table_meta = decoded.table_meta.unwrap();
        assert_eq!(table_meta.table_name, "myTable");
        assert_eq!(table_meta.primary_key.len(), 2);
        assert_eq!(table_meta.primary_key[0].name, "gid");
        let unit = decoded.reserved_throughput.unwrap().capacity_unit.unwrap();
        assert_eq!((unit.read, unit.write), (Some(100), Some(100)));
    }

    #[test]
    fn create_table_validates_arguments() {
        let err = CreateTableRequest::new(TableMeta::new("t"), CapacityUnit::new(1, 1))
            .encode()
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument { operation: Operation::CreateTable, .. }));

        let err = CreateTableRequest::new(meta(), CapacityUnit::read_only(1))
            .encode()
            .unwrap_err();
        assert!(err.to_string().contains("both of read and write"));

        assert!(CreateTableRequest::new(TableMeta::new(""), CapacityUnit::new(1, 1)).encode().is_err());
    }

    #[test]
    fn update_table_needs_one_side_of_capacity() {
        assert!(UpdateTableRequest::new("t", CapacityUnit::default()).encode().is_err());
        assert!(UpdateTableRequest::new("t", CapacityUnit::write_only(5)).encode().is_ok());
    }

    #[test]
    fn list_table_decodes_names() {
        let body = wire::ListTableResponse {
            table_names: vec!["a".into(), "b".into()],
        }
        .encode_to_vec();
        assert_eq!(ListTableRequest::decode(&body).unwrap(), vec!["a", "b"]);
        assert_eq!(ListTableRequest::decode(&[]).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn describe_table_decodes_meta_and_details() {
        let body = wire::DescribeTableResponse {
            table_meta: Some(meta().to_wire()),
            reserved_throughput_details: Some(wire::ReservedThroughputDetails {
                capacity_unit: Some(wire::CapacityUnit {
                    read: Some(10),
                    write: Some(20),
                }),
                last_increase_time: 1_400_000_000,
                last_decrease_time: Some(1_400_000_100),
                number_of_decreases_today: 1,
            }),
        }
        .encode_to_vec();

        let response = DescribeTableRequest::decode(&body).unwrap();
        assert_eq!(response.table_meta, meta());
        assert_eq!(response.reserved_throughput_details.capacity_unit, CapacityUnit::new(10, 20));
        assert_eq!(response.reserved_throughput_details.number_of_decreases_today, 1);
    }

    #[test]
    fn describe_table_without_meta_is_a_decode_error() {
        let err = DescribeTableRequest::decode(&[]).unwrap_err();
        assert!(matches!(err, ClientError::Decode { operation: Operation::DescribeTable, .. }));
    }
}
