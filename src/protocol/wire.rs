//! Protocol Buffers messages of the OTS v2 wire protocol (`ots_protocol_2`).
//!
//! The schema is proto2, so required fields are always emitted and optional
//! scalars are modelled as `Option`.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Error {
    #[prost(string, required, tag = "1")]
    pub code: ::prost::alloc::string::String,
    #[prost(string, optional, tag = "2")]
    pub message: ::core::option::Option<::prost::alloc::string::String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ColumnType {
    InfMin = 0,
    InfMax = 1,
    Integer = 2,
    String = 3,
    Boolean = 4,
    Double = 5,
    Binary = 6,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ColumnSchema {
    #[prost(string, required, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(enumeration = "ColumnType", required, tag = "2")]
    pub r#type: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ColumnValue {
    #[prost(enumeration = "ColumnType", required, tag = "1")]
    pub r#type: i32,
    #[prost(int64, optional, tag = "2")]
    pub v_int: ::core::option::Option<i64>,
    #[prost(string, optional, tag = "3")]
    pub v_string: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(bool, optional, tag = "4")]
    pub v_bool: ::core::option::Option<bool>,
    #[prost(double, optional, tag = "5")]
    pub v_double: ::core::option::Option<f64>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub v_binary: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Column {
    #[prost(string, required, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub value: ::core::option::Option<ColumnValue>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Row {
    #[prost(message, repeated, tag = "1")]
    pub primary_key_columns: ::prost::alloc::vec::Vec<Column>,
    #[prost(message, repeated, tag = "2")]
    pub attribute_columns: ::prost::alloc::vec::Vec<Column>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TableMeta {
    #[prost(string, required, tag = "1")]
    pub table_name: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub primary_key: ::prost::alloc::vec::Vec<ColumnSchema>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum RowExistenceExpectation {
    Ignore = 0,
    ExpectExist = 1,
    ExpectNotExist = 2,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Condition {
    #[prost(enumeration = "RowExistenceExpectation", required, tag = "1")]
    pub row_existence: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CapacityUnit {
    #[prost(int32, optional, tag = "1")]
    pub read: ::core::option::Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub write: ::core::option::Option<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReservedThroughputDetails {
    #[prost(message, optional, tag = "1")]
    pub capacity_unit: ::core::option::Option<CapacityUnit>,
    #[prost(int64, required, tag = "2")]
    pub last_increase_time: i64,
    #[prost(int64, optional, tag = "3")]
    pub last_decrease_time: ::core::option::Option<i64>,
    #[prost(int32, required, tag = "4")]
    pub number_of_decreases_today: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReservedThroughput {
    #[prost(message, optional, tag = "1")]
    pub capacity_unit: ::core::option::Option<CapacityUnit>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConsumedCapacity {
    #[prost(message, optional, tag = "1")]
    pub capacity_unit: ::core::option::Option<CapacityUnit>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateTableRequest {
    #[prost(message, optional, tag = "1")]
    pub table_meta: ::core::option::Option<TableMeta>,
    #[prost(message, optional, tag = "2")]
    pub reserved_throughput: ::core::option::Option<ReservedThroughput>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateTableResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateTableRequest {
    #[prost(string, required, tag = "1")]
    pub table_name: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub reserved_throughput: ::core::option::Option<ReservedThroughput>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateTableResponse {
    #[prost(message, optional, tag = "1")]
    pub reserved_throughput_details: ::core::option::Option<ReservedThroughputDetails>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DescribeTableRequest {
    #[prost(string, required, tag = "1")]
    pub table_name: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DescribeTableResponse {
    #[prost(message, optional, tag = "1")]
    pub table_meta: ::core::option::Option<TableMeta>,
    #[prost(message, optional, tag = "2")]
    pub reserved_throughput_details: ::core::option::Option<ReservedThroughputDetails>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListTableRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListTableResponse {
    #[prost(string, repeated, tag = "1")]
    pub table_names: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteTableRequest {
    #[prost(string, required, tag = "1")]
    pub table_name: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteTableResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetRowRequest {
    #[prost(string, required, tag = "1")]
    pub table_name: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub primary_key: ::prost::alloc::vec::Vec<Column>,
    #[prost(string, repeated, tag = "3")]
    pub columns_to_get: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetRowResponse {
    #[prost(message, optional, tag = "1")]
    pub consumed: ::core::option::Option<ConsumedCapacity>,
    #[prost(message, optional, tag = "2")]
    pub row: ::core::option::Option<Row>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum OperationType {
    Put = 1,
    Delete = 2,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ColumnUpdate {
    #[prost(enumeration = "OperationType", required, tag = "1")]
    pub r#type: i32,
    #[prost(string, required, tag = "2")]
    pub name: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "3")]
    pub value: ::core::option::Option<ColumnValue>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateRowRequest {
    #[prost(string, required, tag = "1")]
    pub table_name: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub condition: ::core::option::Option<Condition>,
    #[prost(message, repeated, tag = "3")]
    pub primary_key: ::prost::alloc::vec::Vec<Column>,
    #[prost(message, repeated, tag = "4")]
    pub attribute_columns: ::prost::alloc::vec::Vec<ColumnUpdate>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateRowResponse {
    #[prost(message, optional, tag = "1")]
    pub consumed: ::core::option::Option<ConsumedCapacity>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PutRowRequest {
    #[prost(string, required, tag = "1")]
    pub table_name: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub condition: ::core::option::Option<Condition>,
    #[prost(message, repeated, tag = "3")]
    pub primary_key: ::prost::alloc::vec::Vec<Column>,
    #[prost(message, repeated, tag = "4")]
    pub attribute_columns: ::prost::alloc::vec::Vec<Column>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PutRowResponse {
    #[prost(message, optional, tag = "1")]
    pub consumed: ::core::option::Option<ConsumedCapacity>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteRowRequest {
    #[prost(string, required, tag = "1")]
    pub table_name: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub condition: ::core::option::Option<Condition>,
    #[prost(message, repeated, tag = "3")]
    pub primary_key: ::prost::alloc::vec::Vec<Column>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteRowResponse {
    #[prost(message, optional, tag = "1")]
    pub consumed: ::core::option::Option<ConsumedCapacity>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RowInBatchGetRowRequest {
    #[prost(message, repeated, tag = "1")]
    pub primary_key: ::prost::alloc::vec::Vec<Column>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TableInBatchGetRowRequest {
    #[prost(string, required, tag = "1")]
    pub table_name: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub rows: ::prost::alloc::vec::Vec<RowInBatchGetRowRequest>,
    #[prost(string, repeated, tag = "3")]
    pub columns_to_get: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BatchGetRowRequest {
    #[prost(message, repeated, tag = "1")]
    pub tables: ::prost::alloc::vec::Vec<TableInBatchGetRowRequest>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RowInBatchGetRowResponse {
    #[prost(bool, required, tag = "1", default = "true")]
    pub is_ok: bool,
    #[prost(message, optional, tag = "2")]
    pub error: ::core::option::Option<Error>,
    #[prost(message, optional, tag = "3")]
    pub consumed: ::core::option::Option<ConsumedCapacity>,
    #[prost(message, optional, tag = "4")]
    pub row: ::core::option::Option<Row>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TableInBatchGetRowResponse {
    #[prost(string, required, tag = "1")]
    pub table_name: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub rows: ::prost::alloc::vec::Vec<RowInBatchGetRowResponse>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BatchGetRowResponse {
    #[prost(message, repeated, tag = "1")]
    pub tables: ::prost::alloc::vec::Vec<TableInBatchGetRowResponse>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PutRowInBatchWriteRowRequest {
    #[prost(message, optional, tag = "1")]
    pub condition: ::core::option::Option<Condition>,
    #[prost(message, repeated, tag = "2")]
    pub primary_key: ::prost::alloc::vec::Vec<Column>,
    #[prost(message, repeated, tag = "3")]
    pub attribute_columns: ::prost::alloc::vec::Vec<Column>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateRowInBatchWriteRowRequest {
    #[prost(message, optional, tag = "1")]
    pub condition: ::core::option::Option<Condition>,
    #[prost(message, repeated, tag = "2")]
    pub primary_key: ::prost::alloc::vec::Vec<Column>,
    #[prost(message, repeated, tag = "3")]
    pub attribute_columns: ::prost::alloc::vec::Vec<ColumnUpdate>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteRowInBatchWriteRowRequest {
    #[prost(message, optional, tag = "1")]
    pub condition: ::core::option::Option<Condition>,
    #[prost(message, repeated, tag = "2")]
    pub primary_key: ::prost::alloc::vec::Vec<Column>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TableInBatchWriteRowRequest {
    #[prost(string, required, tag = "1")]
    pub table_name: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub put_rows: ::prost::alloc::vec::Vec<PutRowInBatchWriteRowRequest>,
    #[prost(message, repeated, tag = "3")]
    pub update_rows: ::prost::alloc::vec::Vec<UpdateRowInBatchWriteRowRequest>,
    #[prost(message, repeated, tag = "4")]
    pub delete_rows: ::prost::alloc::vec::Vec<DeleteRowInBatchWriteRowRequest>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BatchWriteRowRequest {
    #[prost(message, repeated, tag = "1")]
    pub tables: ::prost::alloc::vec::Vec<TableInBatchWriteRowRequest>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RowInBatchWriteRowResponse {
    #[prost(bool, required, tag = "1", default = "true")]
    pub is_ok: bool,
    #[prost(message, optional, tag = "2")]
    pub error: ::core::option::Option<Error>,
    #[prost(message, optional, tag = "3")]
    pub consumed: ::core::option::Option<ConsumedCapacity>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TableInBatchWriteRowResponse {
    #[prost(string, required, tag = "1")]
    pub table_name: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub put_rows: ::prost::alloc::vec::Vec<RowInBatchWriteRowResponse>,
    #[prost(message, repeated, tag = "3")]
    pub update_rows: ::prost::alloc::vec::Vec<RowInBatchWriteRowResponse>,
    #[prost(message, repeated, tag = "4")]
    pub delete_rows: ::prost::alloc::vec::Vec<RowInBatchWriteRowResponse>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BatchWriteRowResponse {
    #[prost(message, repeated, tag = "1")]
    pub tables: ::prost::alloc::vec::Vec<TableInBatchWriteRowResponse>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Direction {
    Forward = 0,
    Backward = 1,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetRangeRequest {
    #[prost(string, required, tag = "1")]
    pub table_name: ::prost::alloc::string::String,
    #[prost(enumeration = "Direction", required, tag = "2")]
    pub direction: i32,
    #[prost(string, repeated, tag = "3")]
    pub columns_to_get: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(int32, optional, tag = "4")]
    pub limit: ::core::option::Option<i32>,
    #[prost(message, repeated, tag = "5")]
    pub inclusive_start_primary_key: ::prost::alloc::vec::Vec<Column>,
    #[prost(message, repeated, tag = "6")]
    pub exclusive_end_primary_key: ::prost::alloc::vec::Vec<Column>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetRangeResponse {
    #[prost(message, optional, tag = "1")]
    pub consumed: ::core::option::Option<ConsumedCapacity>,
    #[prost(message, repeated, tag = "2")]
    pub next_start_primary_key: ::prost::alloc::vec::Vec<Column>,
    #[prost(message, repeated, tag = "3")]
    pub rows: ::prost::alloc::vec::Vec<Row>,
}
