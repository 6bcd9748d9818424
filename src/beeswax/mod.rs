//! Polling protocol generation.
//!
//! A query is submitted asynchronously and the client polls its state at a fixed interval
//! until it reaches a terminal state. Results are then fetched forward only, one
//! tab-delimited text line per row.
mod row_set;

pub use row_set::RowSet;

use log::info;

use crate::{
    config::Options,
    error::Result,
    protocol::{Channel, Request, Response, rpc::unexpected},
    retry::{CancelToken, RetryPolicy},
};

pub struct BeeswaxClient<C: Channel> {
    channel: C,
    options: Options,
    policy: RetryPolicy,
}

impl<C: Channel> BeeswaxClient<C> {
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

    /// Submits `statement` and returns the row set tracking it. The client stays borrowed
    /// until the row set is dropped or closed.
    pub fn query(&mut self, statement: &str) -> Result<RowSet<'_, C>> {
        let response = self.channel.call(Request::Query {
            statement: statement.to_string(),
            configuration: self.options.session_configuration(),
        })?;
        let Response::Query(handle) = response else {
            return Err(unexpected("query", &response));
        };
        info!("submitted query {}", handle.id);
        Ok(RowSet::new(self, handle))
    }

    /// Closes the transport.
    pub fn disconnect(&mut self) -> Result<()> {
        self.channel.close()
    }

    pub(crate) fn call(&mut self, request: Request) -> Result<Response> {
        self.channel.call(request)
    }

    pub(crate) fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    #[cfg(test)]
    pub(crate) fn channel(&self) -> &C {
        &self.channel
    }
}
