//! The closed set of OTS operations and the dynamic dispatch unions built on it.

use std::fmt;
use std::str::FromStr;

use super::OtsRequest;
use super::batch::{BatchGetRowRequest, BatchWriteRowRequest};
use super::row::{DeleteRowRequest, GetRangeRequest, GetRowRequest, PutRowRequest, UpdateRowRequest};
use super::table::{
    CreateTableRequest, DeleteTableRequest, DescribeTableRequest, ListTableRequest, UpdateTableRequest,
};
use crate::error::ClientError;

/// Every operation the service exposes. Unknown names never reach the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    CreateTable,
    DeleteTable,
    ListTable,
    UpdateTable,
    DescribeTable,
    GetRow,
    PutRow,
    UpdateRow,
    DeleteRow,
    BatchGetRow,
    BatchWriteRow,
    GetRange,
}

impl Operation {
    pub const ALL: [Operation; 12] = [
        Operation::CreateTable,
        Operation::DeleteTable,
        Operation::ListTable,
        Operation::UpdateTable,
        Operation::DescribeTable,
        Operation::GetRow,
        Operation::PutRow,
        Operation::UpdateRow,
        Operation::DeleteRow,
        Operation::BatchGetRow,
        Operation::BatchWriteRow,
        Operation::GetRange,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Operation::CreateTable => "CreateTable",
            Operation::DeleteTable => "DeleteTable",
            Operation::ListTable => "ListTable",
            Operation::UpdateTable => "UpdateTable",
            Operation::DescribeTable => "DescribeTable",
            Operation::GetRow => "GetRow",
            Operation::PutRow => "PutRow",
            Operation::UpdateRow => "UpdateRow",
            Operation::DeleteRow => "DeleteRow",
            Operation::BatchGetRow => "BatchGetRow",
            Operation::BatchWriteRow => "BatchWriteRow",
            Operation::GetRange => "GetRange",
        }
    }

    /// Request path, `/{Name}`.
    pub fn path(self) -> String {
        format!("/{}", self.name())
    }

    /// Registry lookup by exact (case-sensitive) operation name.
    pub fn from_name(name: &str) -> Result<Self, ClientError> {
        Self::ALL
            .into_iter()
            .find(|op| op.name() == name)
            .ok_or_else(|| ClientError::UnsupportedOperation(name.to_string()))
    }

    /// Read-only operations that may be resent after an ambiguous failure.
    pub fn is_idempotent(self) -> bool {
        matches!(
            self,
            Operation::ListTable
                | Operation::DescribeTable
                | Operation::GetRow
                | Operation::BatchGetRow
                | Operation::GetRange
        )
    }

    pub fn is_write(self) -> bool {
        !self.is_idempotent()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

/// Dispatch guard: fails for any name outside the operation set.
pub fn ensure_supported(name: &str) -> Result<Operation, ClientError> {
    Operation::from_name(name)
}

macro_rules! operation_unions {
    ($($op:ident => $req:ty),* $(,)?) => {
        /// Any typed request, for callers that pick the operation at runtime.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Request {
            $($op($req),)*
        }

        /// The decoded response matching a [`Request`] variant.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Response {
            $($op(<$req as OtsRequest>::Response),)*
        }

        impl Request {
            pub fn operation(&self) -> Operation {
                match self {
                    $(Request::$op(_) => Operation::$op,)*
                }
            }

            pub fn encode(&self) -> Result<Vec<u8>, ClientError> {
                match self {
                    $(Request::$op(request) => request.encode(),)*
                }
            }
        }

        impl Response {
            pub fn operation(&self) -> Operation {
                match self {
                    $(Response::$op(_) => Operation::$op,)*
                }
            }

            pub fn decode(operation: Operation, body: &[u8]) -> Result<Self, ClientError> {
                match operation {
                    $(Operation::$op => <$req as OtsRequest>::decode(body).map(Response::$op),)*
                }
            }
        }

        $(
            impl From<$req> for Request {
                fn from(request: $req) -> Self {
                    Request::$op(request)
                }
            }
        )*
    };
}

operation_unions! {
    CreateTable => CreateTableRequest,
    DeleteTable => DeleteTableRequest,
    ListTable => ListTableRequest,
    UpdateTable => UpdateTableRequest,
    DescribeTable => DescribeTableRequest,
    GetRow => GetRowRequest,
    PutRow => PutRowRequest,
    UpdateRow => UpdateRowRequest,
    DeleteRow => DeleteRowRequest,
    BatchGetRow => BatchGetRowRequest,
    BatchWriteRow => BatchWriteRowRequest,
    GetRange => GetRangeRequest,
}
