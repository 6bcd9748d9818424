use std::collections::BTreeMap;

use bincode::{Decode, Encode};

use super::handle::{OperationHandle, QueryHandle, SessionHandle};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode)]
pub enum ProtocolVersion {
    V1,
    V6,
    #[default]
    V7,
}

/// Server attributes retrievable through [`Request::GetInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum InfoType {
    ServerName,
    ServerVersion,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum Request {
    // Direct generation.
    OpenSession {
        protocol: ProtocolVersion,
        configuration: BTreeMap<String, String>,
    },
    CloseSession(SessionHandle),
    GetInfo {
        session: SessionHandle,
        info: InfoType,
    },
    ExecuteStatement {
        session: SessionHandle,
        statement: String,
        configuration: BTreeMap<String, String>,
    },
    GetResultSetMetadata(OperationHandle),
    FetchResults {
        operation: OperationHandle,
        max_rows: i64,
    },
    CloseOperation(OperationHandle),

    // Polling generation.
    Query {
        statement: String,
        configuration: BTreeMap<String, String>,
    },
    GetState(QueryHandle),
    Fetch {
        handle: QueryHandle,
        start_over: bool,
        fetch_size: i32,
    },
    GetResultsMetadata(QueryHandle),
    Close(QueryHandle),
    Cancel(QueryHandle),
}

impl Request {
    /// RPC method name, for logging.
    pub fn method(&self) -> &'static str {
        match self {
            Request::OpenSession { .. } => "OpenSession",
            Request::CloseSession(_) => "CloseSession",
            Request::GetInfo { .. } => "GetInfo",
            Request::ExecuteStatement { .. } => "ExecuteStatement",
            Request::GetResultSetMetadata(_) => "GetResultSetMetadata",
            Request::FetchResults { .. } => "FetchResults",
            Request::CloseOperation(_) => "CloseOperation",
            Request::Query { .. } => "query",
            Request::GetState(_) => "get_state",
            Request::Fetch { .. } => "fetch",
            Request::GetResultsMetadata(_) => "get_results_metadata",
            Request::Close(_) => "close",
            Request::Cancel(_) => "cancel",
        }
    }
}
