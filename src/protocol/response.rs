use std::collections::BTreeMap;

use bincode::{Decode, Encode};

use super::{
    handle::{OperationHandle, QueryHandle, SessionHandle},
    request::ProtocolVersion,
};
use crate::{
    decode::Batch,
    error::{Error, Result},
    schema::{ColumnDesc, ColumnType, Schema},
    state::QueryState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum StatusCode {
    Success,
    SuccessWithInfo,
    StillExecuting,
    Error,
    InvalidHandle,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct RpcStatus {
    pub code: StatusCode,
    pub message: Option<String>,
    pub sql_state: Option<String>,
}

impl RpcStatus {
    pub fn success() -> Self {
        Self {
            code: StatusCode::Success,
            message: None,
            sql_state: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::Error,
            message: Some(message.into()),
            sql_state: None,
        }
    }

    pub fn invalid_handle() -> Self {
        Self {
            code: StatusCode::InvalidHandle,
            message: None,
            sql_state: None,
        }
    }

    /// `SUCCESS`, `SUCCESS_WITH_INFO` and `STILL_EXECUTING` pass; `ERROR` becomes
    /// [`Error::ServerError`] and `INVALID_HANDLE` becomes [`Error::BadHandle`].
    pub fn check(&self) -> Result<()> {
        match self.code {
            StatusCode::Success | StatusCode::SuccessWithInfo | StatusCode::StillExecuting => {
                Ok(())
            }
            StatusCode::Error => Err(Error::ServerError(
                self.message.clone().unwrap_or_else(|| "unknown error".into()),
            )),
            StatusCode::InvalidHandle => Err(Error::BadHandle),
        }
    }
}

/// Column as described by the direct generation's metadata call.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub type_name: String,
}

impl From<ColumnSpec> for ColumnDesc {
    fn from(spec: ColumnSpec) -> Self {
        ColumnDesc {
            name: spec.name,
            column_type: spec.column_type,
            database_type_name: spec.type_name,
        }
    }
}

/// Column as described by the polling generation: a name and a textual type.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct FieldSchema {
    pub name: String,
    pub type_name: String,
}

pub fn schema_from_columns(columns: Vec<ColumnSpec>) -> Schema {
    Schema::new(columns.into_iter().map(ColumnDesc::from).collect())
}

pub fn schema_from_fields(fields: Vec<FieldSchema>) -> Schema {
    Schema::new(
        fields
            .into_iter()
            .map(|f| ColumnDesc::from_type_name(f.name, &f.type_name))
            .collect(),
    )
}

/// One page of polling generation results.
#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
pub struct Results {
    /// `false` while the server has nothing to hand out yet.
    pub ready: bool,
    pub columns: Vec<String>,
    pub data: Vec<String>,
    pub start_row: i64,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum Response {
    // Direct generation.
    OpenSession {
        status: RpcStatus,
        session: Option<SessionHandle>,
        protocol: ProtocolVersion,
        configuration: BTreeMap<String, String>,
    },
    CloseSession {
        status: RpcStatus,
    },
    GetInfo {
        status: RpcStatus,
        value: String,
    },
    ExecuteStatement {
        status: RpcStatus,
        operation: Option<OperationHandle>,
    },
    GetResultSetMetadata {
        status: RpcStatus,
        columns: Vec<ColumnSpec>,
    },
    FetchResults {
        status: RpcStatus,
        has_more_rows: bool,
        results: Option<Batch>,
    },
    CloseOperation {
        status: RpcStatus,
    },

    // Polling generation.
    Query(QueryHandle),
    GetState(QueryState),
    Fetch(Results),
    GetResultsMetadata {
        schema: Vec<FieldSchema>,
    },
    Close,
    Cancel {
        status: RpcStatus,
    },

    /// Polling generation failure raised by the server instead of a result.
    Exception {
        message: String,
        sql_state: Option<String>,
    },
}

impl Response {
    pub fn method(&self) -> &'static str {
        match self {
            Response::OpenSession { .. } => "OpenSession",
            Response::CloseSession { .. } => "CloseSession",
            Response::GetInfo { .. } => "GetInfo",
            Response::ExecuteStatement { .. } => "ExecuteStatement",
            Response::GetResultSetMetadata { .. } => "GetResultSetMetadata",
            Response::FetchResults { .. } => "FetchResults",
            Response::CloseOperation { .. } => "CloseOperation",
            Response::Query(_) => "query",
            Response::GetState(_) => "get_state",
            Response::Fetch(_) => "fetch",
            Response::GetResultsMetadata { .. } => "get_results_metadata",
            Response::Close => "close",
            Response::Cancel { .. } => "cancel",
            Response::Exception { .. } => "exception",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_codes_pass() {
        for code in [
            StatusCode::Success,
            StatusCode::SuccessWithInfo,
            StatusCode::StillExecuting,
        ] {
            let status = RpcStatus {
                code,
                message: None,
                sql_state: None,
            };
            assert!(status.check().is_ok(), "{code:?}");
        }
    }

    #[test]
    fn error_status_carries_message() {
        let err = RpcStatus::error("AnalysisException: no such table").check();
        assert!(matches!(err, Err(Error::ServerError(m)) if m == "AnalysisException: no such table"));
    }

    #[test]
    fn invalid_handle_status() {
        assert!(matches!(
            RpcStatus::invalid_handle().check(),
            Err(Error::BadHandle)
        ));
    }

    #[test]
    fn field_schema_parses_type_names() {
        let schema = schema_from_fields(vec![
            FieldSchema {
                name: "id".into(),
                type_name: "bigint".into(),
            },
            FieldSchema {
                name: "price".into(),
                type_name: "decimal(10,2)".into(),
            },
        ]);

        assert_eq!(schema.columns[0].column_type, ColumnType::BigInt);
        assert_eq!(schema.columns[1].column_type, ColumnType::Decimal);
        assert_eq!(schema.columns[1].database_type_name, "DECIMAL");
    }
}
