//! Typed requests and responses, and their protobuf encoding.
//!
//! Each operation has a request struct implementing [`OtsRequest`], which
//! binds it to its [`Operation`], its response type, and the conversion to
//! and from the wire messages in [`crate::protocol::wire`].

pub mod batch;
pub mod model;
pub mod registry;
pub mod row;
pub mod table;
pub mod value;

pub use batch::{
    BatchGetRowItem, BatchGetRowRequest, BatchWriteRowRequest, DeleteRowItem, PutRowItem, TableInBatchGetRow,
    TableInBatchGetRowResponse, TableInBatchWriteRow, TableInBatchWriteRowResponse, UpdateRowItem, WriteRowResult,
};
pub use model::{
    Attributes, CapacityUnit, ColumnMap, ColumnType, Direction, PrimaryKey, ReservedThroughputDetails, Row,
    RowError, RowExistence, TableMeta, UpdateOfAttribute,
};
pub use registry::{Operation, Request, Response, ensure_supported};
pub use row::{
    DeleteRowRequest, GetRangeRequest, GetRangeResponse, GetRowRequest, GetRowResponse, PutRowRequest,
    UpdateRowRequest,
};
pub use table::{
    CreateTableRequest, DeleteTableRequest, DescribeTableRequest, DescribeTableResponse, ListTableRequest,
    UpdateTableRequest,
};
pub use value::ColumnValue;

use crate::error::ClientError;

/// A typed request for one operation.
///
/// `encode` validates the arguments and produces the protobuf body; any
/// failure there is raised before a network attempt. `decode` turns a
/// successful response body into the typed response.
pub trait OtsRequest {
    const OPERATION: Operation;
    type Response;

    fn encode(&self) -> Result<Vec<u8>, ClientError>;

    fn decode(body: &[u8]) -> Result<Self::Response, ClientError>;
}

pub(crate) fn decode_message<M>(operation: Operation, body: &[u8]) -> Result<M, ClientError>
where
    M: prost::Message + Default,
{
    M::decode(body).map_err(|e| ClientError::decode(operation, e))
}

pub(crate) fn require_table_name(operation: Operation, table_name: &str) -> Result<(), ClientError> {
    if table_name.is_empty() {
        return Err(ClientError::invalid(operation, "table_name must not be empty"));
    }
    Ok(())
}

pub(crate) fn require_primary_key(operation: Operation, primary_key: &PrimaryKey) -> Result<(), ClientError> {
    if primary_key.is_empty() {
        return Err(ClientError::invalid(operation, "primary_key must not be empty"));
    }
    Ok(())
}
