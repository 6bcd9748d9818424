//! Direct protocol generation.
//!
//! Statements execute synchronously from the client's point of view: `ExecuteStatement`
//! returns an [`Operation`] right away and results are paged with `FetchResults`, the
//! server tracking the cursor position. Results arrive as columnar batches.
mod client;
mod result_set;

use std::{collections::BTreeMap, sync::Arc};

pub use client::HiveClient;
pub use result_set::ResultSet;

use crate::{
    protocol::{OperationHandle, ProtocolVersion, SessionHandle},
    schema::Schema,
    state::{QueryState, StateTracker},
};

/// Remote execution context opened by [`HiveClient::open_session`].
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub(crate) handle: SessionHandle,
    pub(crate) configuration: BTreeMap<String, String>,
    pub(crate) protocol: ProtocolVersion,
}

impl Session {
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Configuration as negotiated by the server.
    pub fn configuration(&self) -> &BTreeMap<String, String> {
        &self.configuration
    }

    pub fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }
}

/// One executed statement. Consumed by [`HiveClient::close_operation`].
#[derive(Debug)]
pub struct Operation {
    pub(crate) handle: OperationHandle,
    pub(crate) state: StateTracker,
    pub(crate) schema: Option<Arc<Schema>>,
    pub(crate) has_more_rows: bool,
}

impl Operation {
    pub(crate) fn new(handle: OperationHandle) -> Self {
        let mut state = StateTracker::new();
        state.advance(QueryState::Running);
        Self {
            handle,
            state,
            schema: None,
            has_more_rows: true,
        }
    }

    pub fn handle(&self) -> &OperationHandle {
        &self.handle
    }

    pub fn has_result_set(&self) -> bool {
        self.handle.has_result_set
    }

    /// Rows modified by a DML statement, when the server reports it.
    pub fn rows_affected(&self) -> Option<f64> {
        self.handle.modified_row_count
    }

    pub fn state(&self) -> QueryState {
        self.state.state()
    }

    /// Whether the last fetch reported more rows on the server.
    pub fn has_more_rows(&self) -> bool {
        self.has_more_rows
    }
}
