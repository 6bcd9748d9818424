use std::{collections::BTreeMap, sync::Arc};

use log::{debug, info, warn};

use super::BeeswaxClient;
use crate::{
    decode::decode_text_row,
    error::{Error, Result},
    protocol::{
        Channel, QueryHandle, Request, Response, response::schema_from_fields, rpc::unexpected,
    },
    retry::Backoff,
    schema::Schema,
    state::{QueryState, StateTracker},
    value::Value,
};

/// An asynchronous query and its forward-only results.
///
/// Anything that needs results ([`RowSet::next`], [`RowSet::schema`],
/// [`RowSet::fetch_all`]) first waits for the query to finish; a successful wait is
/// remembered so later calls do not poll again.
pub struct RowSet<'a, C: Channel> {
    client: &'a mut BeeswaxClient<C>,
    handle: QueryHandle,
    state: StateTracker,
    ready: bool,
    schema: Option<Arc<Schema>>,
    batch: Vec<String>,
    offset: usize,
    has_more: bool,
}

impl<'a, C: Channel> RowSet<'a, C> {
    pub(crate) fn new(client: &'a mut BeeswaxClient<C>, handle: QueryHandle) -> Self {
        Self {
            client,
            handle,
            state: StateTracker::new(),
            ready: false,
            schema: None,
            batch: Vec::new(),
            offset: 0,
            has_more: true,
        }
    }

    pub fn handle(&self) -> &QueryHandle {
        &self.handle
    }

    pub fn state(&self) -> QueryState {
        self.state.state()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Asks the server for the query's current state.
    pub fn poll(&mut self) -> Result<QueryState> {
        let response = self.client.call(Request::GetState(self.handle.clone()))?;
        let Response::GetState(reported) = response else {
            return Err(unexpected("get_state", &response));
        };
        let state = self.state.advance(reported);
        debug!("query {} is {state}", self.handle.id);
        Ok(state)
    }

    /// Polls until the query reaches a terminal state.
    pub fn wait(&mut self) -> Result<()> {
        if self.ready {
            return Ok(());
        }

        loop {
            match self.poll()? {
                QueryState::Finished => {
                    info!("query {} finished", self.handle.id);
                    self.ready = true;
                    return Ok(());
                }
                QueryState::Exception => {
                    return Err(Error::ExecutionFailed("exception on server side".into()));
                }
                state if state.is_terminal() => {
                    return Err(Error::ExecutionFailed(state.name().into()));
                }
                _ => self.client.policy().pause()?,
            }
        }
    }

    pub fn schema(&mut self) -> Result<Arc<Schema>> {
        self.wait()?;
        if let Some(schema) = &self.schema {
            return Ok(Arc::clone(schema));
        }

        let response = self
            .client
            .call(Request::GetResultsMetadata(self.handle.clone()))?;
        let Response::GetResultsMetadata { schema } = response else {
            return Err(unexpected("get_results_metadata", &response));
        };
        let schema = Arc::new(schema_from_fields(schema));
        debug!("query {} schema: {:?}", self.handle.id, schema.column_names());
        self.schema = Some(Arc::clone(&schema));
        Ok(schema)
    }

    /// Next decoded row. An empty page ends iteration.
    pub fn next(&mut self) -> Result<Option<Vec<Value>>> {
        let schema = self.schema()?;

        if self.offset >= self.batch.len() {
            if !self.has_more {
                return Ok(None);
            }
            self.fetch_page()?;
            if self.batch.is_empty() {
                return Ok(None);
            }
        }

        let row = decode_text_row(&self.batch[self.offset], &schema)?;
        self.offset += 1;
        Ok(Some(row))
    }

    /// Next row keyed by column name.
    pub fn map_row(&mut self) -> Result<Option<BTreeMap<String, Value>>> {
        let Some(row) = self.next()? else {
            return Ok(None);
        };
        let schema = self.schema()?;
        Ok(Some(
            schema
                .columns
                .iter()
                .map(|c| c.name.clone())
                .zip(row)
                .collect(),
        ))
    }

    /// Every remaining row keyed by column name.
    pub fn fetch_all(&mut self) -> Result<Vec<BTreeMap<String, Value>>> {
        let mut rows = Vec::new();
        while let Some(row) = self.map_row()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Releases the query. A cancel is sent first when the query may still hold work on
    /// the server; its failure is only logged.
    pub fn close(self) -> Result<()> {
        if !self.state.is_terminal() || self.has_more {
            match self.client.call(Request::Cancel(self.handle.clone())) {
                Ok(Response::Cancel { status }) => {
                    if let Err(e) = status.check() {
                        warn!("cancel of query {} failed: {e}", self.handle.id);
                    }
                }
                Ok(other) => warn!(
                    "cancel of query {} failed: {}",
                    self.handle.id,
                    unexpected("cancel", &other)
                ),
                Err(e) => warn!("cancel of query {} failed: {e}", self.handle.id),
            }
        }

        info!("close query {}", self.handle.id);
        let response = self.client.call(Request::Close(self.handle))?;
        match response {
            Response::Close => Ok(()),
            other => Err(unexpected("close", &other)),
        }
    }

    fn fetch_page(&mut self) -> Result<()> {
        let options = self.client.options();
        let mut backoff = Backoff::new(
            options.fetch_backoff_initial,
            options.fetch_backoff_max,
            options.fetch_retry_limit,
        );
        let fetch_size = i32::try_from(options.batch_size).unwrap_or(i32::MAX);

        loop {
            self.client.cancel_token().check()?;

            let response = self.client.call(Request::Fetch {
                handle: self.handle.clone(),
                start_over: false,
                fetch_size,
            })?;
            let Response::Fetch(results) = response else {
                return Err(unexpected("fetch", &response));
            };

            if results.ready {
                self.has_more = results.has_more && !results.data.is_empty();
                self.batch = results.data;
                self.offset = 0;
                return Ok(());
            }

            debug!("query {} results not ready", self.handle.id);
            backoff.wait(self.client.policy())?;
        }
    }
}
