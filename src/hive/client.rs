use std::{collections::BTreeMap, sync::Arc};

use log::{debug, info, trace};

use super::{Operation, Session};
use crate::{
    config::Options,
    decode::Batch,
    error::{Error, Result},
    protocol::{
        Channel, InfoType, ProtocolVersion, Request, Response, response::schema_from_columns,
        rpc::unexpected,
    },
    retry::{Backoff, CancelToken, RetryPolicy},
    schema::Schema,
    state::QueryState,
};

/// Session and operation calls of the direct generation.
pub struct HiveClient<C: Channel> {
    channel: C,
    options: Options,
    policy: RetryPolicy,
}

impl<C: Channel> HiveClient<C> {
    pub fn new(channel: C, options: Options, cancel: CancelToken) -> Self {
        let policy = RetryPolicy::new(options.poll_interval, cancel);
        Self::with_policy(channel, options, policy)
    }

    pub fn with_policy(channel: C, options: Options, policy: RetryPolicy) -> Self {
        Self {
            channel,
            options,
            policy,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn cancel_token(&self) -> &CancelToken {
        self.policy.cancel_token()
    }

    pub fn open_session(&mut self) -> Result<Session> {
        let configuration = self.options.session_configuration();
        debug!("open session with configuration {configuration:?}");

        let response = self.channel.call(Request::OpenSession {
            protocol: ProtocolVersion::V7,
            configuration,
        })?;
        let Response::OpenSession {
            status,
            session,
            protocol,
            configuration,
        } = response
        else {
            return Err(unexpected("OpenSession", &response));
        };
        status.check()?;

        let handle = session.ok_or_else(|| Error::Protocol("missing session handle".into()))?;
        info!("opened session {} ({protocol:?})", handle.id);
        debug!("negotiated configuration {configuration:?}");

        Ok(Session {
            handle,
            configuration,
            protocol,
        })
    }

    pub fn close_session(&mut self, session: Session) -> Result<()> {
        info!("close session {}", session.handle.id);
        let response = self.channel.call(Request::CloseSession(session.handle))?;
        let Response::CloseSession { status } = response else {
            return Err(unexpected("CloseSession", &response));
        };
        status.check()
    }

    /// Round trip through the session, returning the server name.
    pub fn ping(&mut self, session: &Session) -> Result<String> {
        let response = self.channel.call(Request::GetInfo {
            session: session.handle.clone(),
            info: InfoType::ServerName,
        })?;
        let Response::GetInfo { status, value } = response else {
            return Err(unexpected("GetInfo", &response));
        };
        status.check()?;
        debug!("ping: {value}");
        Ok(value)
    }

    pub fn execute_statement(&mut self, session: &Session, statement: &str) -> Result<Operation> {
        debug!("execute: {statement}");
        let response = self.channel.call(Request::ExecuteStatement {
            session: session.handle.clone(),
            statement: statement.to_string(),
            configuration: BTreeMap::new(),
        })?;
        let Response::ExecuteStatement { status, operation } = response else {
            return Err(unexpected("ExecuteStatement", &response));
        };
        status.check()?;

        let handle = operation.ok_or_else(|| Error::Protocol("missing operation handle".into()))?;
        info!(
            "operation {} started, has result set: {}",
            handle.id, handle.has_result_set
        );
        Ok(Operation::new(handle))
    }

    /// Schema of the operation's result set, fetched on first use.
    pub fn get_result_set_metadata(&mut self, operation: &mut Operation) -> Result<Arc<Schema>> {
        if let Some(schema) = &operation.schema {
            return Ok(Arc::clone(schema));
        }

        debug!("fetch metadata for operation {}", operation.handle.id);
        let response = self
            .channel
            .call(Request::GetResultSetMetadata(operation.handle.clone()))?;
        let Response::GetResultSetMetadata { status, columns } = response else {
            return Err(unexpected("GetResultSetMetadata", &response));
        };
        status.check()?;

        let schema = Arc::new(schema_from_columns(columns));
        for column in &schema.columns {
            debug!("schema: {} {}", column.name, column.database_type_name);
        }
        operation.schema = Some(Arc::clone(&schema));
        Ok(schema)
    }

    /// Fetches the next page of up to `batch_size` rows.
    ///
    /// While the server answers with no rows but more to come, the request is repeated
    /// under a bounded exponential backoff that observes the cancel token.
    pub fn fetch_results(&mut self, operation: &mut Operation) -> Result<Batch> {
        let mut backoff = Backoff::new(
            self.options.fetch_backoff_initial,
            self.options.fetch_backoff_max,
            self.options.fetch_retry_limit,
        );

        loop {
            self.policy.cancel_token().check()?;

            trace!("fetch results for operation {}", operation.handle.id);
            let response = self.channel.call(Request::FetchResults {
                operation: operation.handle.clone(),
                max_rows: i64::try_from(self.options.batch_size).unwrap_or(i64::MAX),
            })?;
            let Response::FetchResults {
                status,
                has_more_rows,
                results,
            } = response
            else {
                return Err(unexpected("FetchResults", &response));
            };
            status.check()?;
            operation.has_more_rows = has_more_rows;

            let rows = match &results {
                Some(batch) => batch.row_count()?,
                None => 0,
            };
            if rows > 0 || !has_more_rows {
                if !has_more_rows {
                    operation.state.advance(QueryState::Finished);
                }
                return Ok(results.unwrap_or_default());
            }

            debug!(
                "operation {} has no rows yet, refetch {}",
                operation.handle.id,
                backoff.attempts() + 1
            );
            backoff.wait(&self.policy)?;
        }
    }

    pub fn close_operation(&mut self, operation: Operation) -> Result<()> {
        info!("close operation {}", operation.handle.id);
        let response = self
            .channel
            .call(Request::CloseOperation(operation.handle))?;
        let Response::CloseOperation { status } = response else {
            return Err(unexpected("CloseOperation", &response));
        };
        status.check()
    }

    /// Closes the transport.
    pub fn disconnect(&mut self) -> Result<()> {
        self.channel.close()
    }

    #[cfg(test)]
    pub(crate) fn channel(&self) -> &C {
        &self.channel
    }
}
