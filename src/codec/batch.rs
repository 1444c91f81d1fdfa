//! Multi-row, multi-table batch operations.
//!
//! A batch call succeeds as a whole even when individual rows fail; each row
//! carries its own `Result`.

use prost::Message;

use super::model::{Attributes, CapacityUnit, PrimaryKey, Row, RowError, RowExistence, UpdateOfAttribute};
use super::{Operation, OtsRequest, decode_message, require_primary_key, require_table_name};
use crate::error::ClientError;
use crate::protocol::wire;

#[derive(Debug, Clone, PartialEq)]
pub struct TableInBatchGetRow {
    pub table_name: String,
    pub rows: Vec<PrimaryKey>,
    pub columns_to_get: Vec<String>,
}

impl TableInBatchGetRow {
    pub fn new(table_name: impl Into<String>, rows: Vec<PrimaryKey>) -> Self {
        Self {
            table_name: table_name.into(),
            rows,
            columns_to_get: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchGetRowRequest {
    pub tables: Vec<TableInBatchGetRow>,
}

impl BatchGetRowRequest {
    pub fn new(tables: Vec<TableInBatchGetRow>) -> Self {
        Self { tables }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchGetRowItem {
    pub consumed: CapacityUnit,
    pub row: Option<Row>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableInBatchGetRowResponse {
    pub table_name: String,
    /// One entry per requested key, in request order.
    pub rows: Vec<Result<BatchGetRowItem, RowError>>,
}

impl OtsRequest for BatchGetRowRequest {
    const OPERATION: Operation = Operation::BatchGetRow;
    type Response = Vec<TableInBatchGetRowResponse>;

    fn encode(&self) -> Result<Vec<u8>, ClientError> {
        if self.tables.is_empty() {
            return Err(ClientError::invalid(Self::OPERATION, "batch_list must not be empty"));
        }

        let mut tables = Vec::with_capacity(self.tables.len());
        for table in &self.tables {
            require_table_name(Self::OPERATION, &table.table_name)?;
            let rows = table
                .rows
                .iter()
                .map(|pk| {
                    require_primary_key(Self::OPERATION, pk)?;
                    Ok(wire::RowInBatchGetRowRequest { primary_key: pk.to_wire() })
                })
                .collect::<Result<_, ClientError>>()?;
            tables.push(wire::TableInBatchGetRowRequest {
                table_name: table.table_name.clone(),
                rows,
                columns_to_get: table.columns_to_get.clone(),
            });
        }
        Ok(wire::BatchGetRowRequest { tables }.encode_to_vec())
    }

    fn decode(body: &[u8]) -> Result<Self::Response, ClientError> {
        let response = decode_message::<wire::BatchGetRowResponse>(Self::OPERATION, body)?;
        response
            .tables
            .into_iter()
            .map(|table| {
                let rows = table
                    .rows
                    .into_iter()
                    .map(|item| {
                        if !item.is_ok {
                            return Ok(Err(RowError::from_wire(item.error)));
                        }
                        let row = item
                            .row
                            .map(|row| Row::from_wire(Self::OPERATION, row))
                            .transpose()?
                            .filter(|row| !row.is_empty());
                        Ok(Ok(BatchGetRowItem {
                            consumed: CapacityUnit::from_consumed(item.consumed),
                            row,
                        }))
                    })
                    .collect::<Result<_, ClientError>>()?;
                Ok(TableInBatchGetRowResponse {
                    table_name: table.table_name,
                    rows,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PutRowItem {
    pub condition: RowExistence,
    pub primary_key: PrimaryKey,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRowItem {
    pub condition: RowExistence,
    pub primary_key: PrimaryKey,
    pub update: UpdateOfAttribute,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRowItem {
    pub condition: RowExistence,
    pub primary_key: PrimaryKey,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableInBatchWriteRow {
    pub table_name: String,
    pub put_rows: Vec<PutRowItem>,
    pub update_rows: Vec<UpdateRowItem>,
    pub delete_rows: Vec<DeleteRowItem>,
}

impl TableInBatchWriteRow {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Default::default()
        }
    }

    pub fn put(mut self, condition: RowExistence, primary_key: PrimaryKey, attributes: Attributes) -> Self {
        self.put_rows.push(PutRowItem {
            condition,
            primary_key,
            attributes,
        });
        self
    }

    pub fn update(mut self, condition: RowExistence, primary_key: PrimaryKey, update: UpdateOfAttribute) -> Self {
        self.update_rows.push(UpdateRowItem {
            condition,
            primary_key,
            update,
        });
        self
    }

    pub fn delete(mut self, condition: RowExistence, primary_key: PrimaryKey) -> Self {
        self.delete_rows.push(DeleteRowItem { condition, primary_key });
        self
    }

    fn to_wire(&self, operation: Operation) -> Result<wire::TableInBatchWriteRowRequest, ClientError> {
        require_table_name(operation, &self.table_name)?;

        let put_rows = self
            .put_rows
            .iter()
            .map(|item| {
                require_primary_key(operation, &item.primary_key)?;
                Ok(wire::PutRowInBatchWriteRowRequest {
                    condition: Some(item.condition.to_wire()),
                    primary_key: item.primary_key.to_wire(),
                    attribute_columns: item.attributes.to_wire(),
                })
            })
            .collect::<Result<_, ClientError>>()?;

        let update_rows = self
            .update_rows
            .iter()
            .map(|item| {
                require_primary_key(operation, &item.primary_key)?;
                if item.update.is_empty() {
                    return Err(ClientError::invalid(
                        operation,
                        "update_of_attribute_columns needs at least one put or delete",
                    ));
                }
                Ok(wire::UpdateRowInBatchWriteRowRequest {
                    condition: Some(item.condition.to_wire()),
                    primary_key: item.primary_key.to_wire(),
                    attribute_columns: item.update.to_wire(),
                })
            })
            .collect::<Result<_, ClientError>>()?;

        let delete_rows = self
            .delete_rows
            .iter()
            .map(|item| {
                require_primary_key(operation, &item.primary_key)?;
                Ok(wire::DeleteRowInBatchWriteRowRequest {
                    condition: Some(item.condition.to_wire()),
                    primary_key: item.primary_key.to_wire(),
                })
            })
            .collect::<Result<_, ClientError>>()?;

        Ok(wire::TableInBatchWriteRowRequest {
            table_name: self.table_name.clone(),
            put_rows,
            update_rows,
            delete_rows,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchWriteRowRequest {
    pub tables: Vec<TableInBatchWriteRow>,
}

impl BatchWriteRowRequest {
    pub fn new(tables: Vec<TableInBatchWriteRow>) -> Self {
        Self { tables }
    }
}

pub type WriteRowResult = Result<CapacityUnit, RowError>;

#[derive(Debug, Clone, PartialEq)]
pub struct TableInBatchWriteRowResponse {
    pub table_name: String,
    pub put_rows: Vec<WriteRowResult>,
    pub update_rows: Vec<WriteRowResult>,
    pub delete_rows: Vec<WriteRowResult>,
}

fn write_results(items: Vec<wire::RowInBatchWriteRowResponse>) -> Vec<WriteRowResult> {
    items
        .into_iter()
        .map(|item| {
            if item.is_ok {
                Ok(CapacityUnit::from_consumed(item.consumed))
            } else {
                Err(RowError::from_wire(item.error))
            }
        })
        .collect()
}

impl OtsRequest for BatchWriteRowRequest {
    const OPERATION: Operation = Operation::BatchWriteRow;
    type Response = Vec<TableInBatchWriteRowResponse>;

    fn encode(&self) -> Result<Vec<u8>, ClientError> {
        if self.tables.is_empty() {
            return Err(ClientError::invalid(Self::OPERATION, "batch_list must not be empty"));
        }
        let tables = self
            .tables
            .iter()
            .map(|table| table.to_wire(Self::OPERATION))
            .collect::<Result<_, _>>()?;
        Ok(wire::BatchWriteRowRequest { tables }.encode_to_vec())
    }

    fn decode(body: &[u8]) -> Result<Self::Response, ClientError> {
        let response = decode_message::<wire::BatchWriteRowResponse>(Self::OPERATION, body)?;
        Ok(response
            .tables
            .into_iter()
            .map(|table| TableInBatchWriteRowResponse {
                table_name: table.table_name,
                put_rows: write_results(table.put_rows),
                update_rows: write_results(table.update_rows),
                delete_rows: write_results(table.delete_rows),
            })
            .collect())
    }
}
