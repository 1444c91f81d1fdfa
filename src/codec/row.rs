//! Single-row operations and range reads.

use prost::Message;

use super::model::{Attributes, CapacityUnit, ColumnMap, Direction, PrimaryKey, Row, RowExistence, UpdateOfAttribute};
use super::{Operation, OtsRequest, decode_message, require_primary_key, require_table_name};
use crate::error::ClientError;
use crate::protocol::wire;

#[derive(Debug, Clone, PartialEq)]
pub struct GetRowRequest {
    pub table_name: String,
    pub primary_key: PrimaryKey,
    /// Empty means all columns.
    pub columns_to_get: Vec<String>,
}

impl GetRowRequest {
    pub fn new(table_name: impl Into<String>, primary_key: PrimaryKey) -> Self {
        Self {
            table_name: table_name.into(),
            primary_key,
            columns_to_get: Vec::new(),
        }
    }

    pub fn columns_to_get<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns_to_get = columns.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetRowResponse {
    pub consumed: CapacityUnit,
    /// `None` when the row does not exist.
    pub row: Option<Row>,
}

impl OtsRequest for GetRowRequest {
    const OPERATION: Operation = Operation::GetRow;
    type Response = GetRowResponse;

    fn encode(&self) -> Result<Vec<u8>, ClientError> {
        require_table_name(Self::OPERATION, &self.table_name)?;
        require_primary_key(Self::OPERATION, &self.primary_key)?;
        Ok(wire::GetRowRequest {
            table_name: self.table_name.clone(),
            primary_key: self.primary_key.to_wire(),
            columns_to_get: self.columns_to_get.clone(),
        }
        .encode_to_vec())
    }

    fn decode(body: &[u8]) -> Result<Self::Response, ClientError> {
        let response = decode_message::<wire::GetRowResponse>(Self::OPERATION, body)?;
        let row = response
            .row
            .map(|row| Row::from_wire(Self::OPERATION, row))
            .transpose()?
            .filter(|row| !row.is_empty());

        Ok(GetRowResponse {
            consumed: CapacityUnit::from_consumed(response.consumed),
            row,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PutRowRequest {
    pub table_name: String,
    pub condition: RowExistence,
    pub primary_key: PrimaryKey,
    pub attributes: Attributes,
}

impl PutRowRequest {
    pub fn new(
        table_name: impl Into<String>,
        condition: RowExistence,
        primary_key: PrimaryKey,
        attributes: Attributes,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            condition,
            primary_key,
            attributes,
        }
    }
}

impl OtsRequest for PutRowRequest {
    const OPERATION: Operation = Operation::PutRow;
    /// Capacity consumed by the write.
    type Response = CapacityUnit;

    fn encode(&self) -> Result<Vec<u8>, ClientError> {
        require_table_name(Self::OPERATION, &self.table_name)?;
        require_primary_key(Self::OPERATION, &self.primary_key)?;
        Ok(wire::PutRowRequest {
            table_name: self.table_name.clone(),
            condition: Some(self.condition.to_wire()),
            primary_key: self.primary_key.to_wire(),
            attribute_columns: self.attributes.to_wire(),
        }
        .encode_to_vec())
    }

    fn decode(body: &[u8]) -> Result<Self::Response, ClientError> {
        let response = decode_message::<wire::PutRowResponse>(Self::OPERATION, body)?;
        Ok(CapacityUnit::from_consumed(response.consumed))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRowRequest {
    pub table_name: String,
    pub condition: RowExistence,
    pub primary_key: PrimaryKey,
    pub update: UpdateOfAttribute,
}

impl UpdateRowRequest {
    pub fn new(
        table_name: impl Into<String>,
        condition: RowExistence,
        primary_key: PrimaryKey,
        update: UpdateOfAttribute,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            condition,
            primary_key,
            update,
        }
    }
}

impl OtsRequest for UpdateRowRequest {
    const OPERATION: Operation = Operation::UpdateRow;
    type Response = CapacityUnit;

    fn encode(&self) -> Result<Vec<u8>, ClientError> {
        require_table_name(Self::OPERATION, &self.table_name)?;
        require_primary_key(Self::OPERATION, &self.primary_key)?;
        if self.update.is_empty() {
            return Err(ClientError::invalid(
                Self::OPERATION,
                "update_of_attribute_columns needs at least one put or delete",
            ));
        }
        Ok(wire::UpdateRowRequest {
            table_name: self.table_name.clone(),
            condition: Some(self.condition.to_wire()),
            primary_key: self.primary_key.to_wire(),
            attribute_columns: self.update.to_wire(),
        }
        .encode_to_vec())
    }

    fn decode(body: &[u8]) -> Result<Self::Response, ClientError> {
        let response = decode_message::<wire::UpdateRowResponse>(Self::OPERATION, body)?;
        Ok(CapacityUnit::from_consumed(response.consumed))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRowRequest {
    pub table_name: String,
    pub condition: RowExistence,
    pub primary_key: PrimaryKey,
}

impl DeleteRowRequest {
    pub fn new(table_name: impl Into<String>, condition: RowExistence, primary_key: PrimaryKey) -> Self {
        Self {
            table_name: table_name.into(),
            condition,
            primary_key,
        }
    }
}

impl OtsRequest for DeleteRowRequest {
    const OPERATION: Operation = Operation::DeleteRow;
    type Response = CapacityUnit;

    fn encode(&self) -> Result<Vec<u8>, ClientError> {
        require_table_name(Self::OPERATION, &self.table_name)?;
        require_primary_key(Self::OPERATION, &self.primary_key)?;
        Ok(wire::DeleteRowRequest {
            table_name: self.table_name.clone(),
            condition: Some(self.condition.to_wire()),
            primary_key: self.primary_key.to_wire(),
        }
        .encode_to_vec())
    }

    fn decode(body: &[u8]) -> Result<Self::Response, ClientError> {
        let response = decode_message::<wire::DeleteRowResponse>(Self::OPERATION, body)?;
        Ok(CapacityUnit::from_consumed(response.consumed))
    }
}

/// Reads rows in `[inclusive_start_primary_key, exclusive_end_primary_key)`.
///
/// Boundaries may use [`ColumnValue::InfMin`](super::ColumnValue::InfMin) and
/// [`ColumnValue::InfMax`](super::ColumnValue::InfMax).
#[derive(Debug, Clone, PartialEq)]
pub struct GetRangeRequest {
    pub table_name: String,
    pub direction: Direction,
    pub inclusive_start_primary_key: PrimaryKey,
    pub exclusive_end_primary_key: PrimaryKey,
    pub columns_to_get: Vec<String>,
    /// Maximum rows per response; must be positive when set.
    pub limit: Option<i32>,
}

impl GetRangeRequest {
    pub fn new(
        table_name: impl Into<String>,
        direction: Direction,
        inclusive_start_primary_key: PrimaryKey,
        exclusive_end_primary_key: PrimaryKey,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            direction,
            inclusive_start_primary_key,
            exclusive_end_primary_key,
            columns_to_get: Vec::new(),
            limit: None,
        }
    }

    pub fn columns_to_get<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns_to_get = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn limit(mut self, limit: i32) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetRangeResponse {
    pub consumed: CapacityUnit,
    /// Where the next page starts, `None` once the range is exhausted.
    pub next_start_primary_key: Option<PrimaryKey>,
    pub rows: Vec<Row>,
}

impl OtsRequest for GetRangeRequest {
    const OPERATION: Operation = Operation::GetRange;
    type Response = GetRangeResponse;

    fn encode(&self) -> Result<Vec<u8>, ClientError> {
        require_table_name(Self::OPERATION, &self.table_name)?;
        require_primary_key(Self::OPERATION, &self.inclusive_start_primary_key)?;
        require_primary_key(Self::OPERATION, &self.exclusive_end_primary_key)?;
        if let Some(limit) = self.limit {
            if limit <= 0 {
                return Err(ClientError::invalid(
                    Self::OPERATION,
                    format!("limit must be positive, got {}", limit),
                ));
            }
        }

        Ok(wire::GetRangeRequest {
            table_name: self.table_name.clone(),
            direction: self.direction.to_wire() as i32,
            columns_to_get: self.columns_to_get.clone(),
            limit: self.limit,
            inclusive_start_primary_key: self.inclusive_start_primary_key.to_wire(),
            exclusive_end_primary_key: self.exclusive_end_primary_key.to_wire(),
        }
        .encode_to_vec())
    }

    fn decode(body: &[u8]) -> Result<Self::Response, ClientError> {
        let response = decode_message::<wire::GetRangeResponse>(Self::OPERATION, body)?;
        let next_start = ColumnMap::from_wire(Self::OPERATION, response.next_start_primary_key)?;
        let rows = response
            .rows
            .into_iter()
            .map(|row| Row::from_wire(Self::OPERATION, row))
            .collect::<Result<_, _>>()?;

        Ok(GetRangeResponse {
            consumed: CapacityUnit::from_consumed(response.consumed),
            next_start_primary_key: (!next_start.is_empty()).then_some(next_start),
            rows,
        })
    }
}
