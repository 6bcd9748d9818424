//! Connections and the statement level API.
//!
//! A [`Connector`] turns [`Options`] into a transport stack (socket, optional SASL
//! framing, RPC client) and hands out either a [`Connection`] speaking the direct
//! generation or a [`BeeswaxClient`] speaking the polling generation. There is no global
//! driver registry; construct a connector where it is needed.
//!
//! # Example
//! ```rust,no_run
//! use hiveline::{
//!     Connector,
//!     config::{Auth, Options},
//!     statement::NamedValue,
//! };
//!
//! let options = Options::default()
//!     .with_host("impalad.internal")
//!     .with_auth(Auth::plain("analyst", "secret"));
//! let mut conn = Connector::new(options).connect()?;
//!
//! let args = [NamedValue::new(1, 1_i64)];
//! let mut rows = conn.query("select id, name from users where id > ?", &args)?;
//! while let Some(row) = rows.next_row()? {
//!     println!("{row:?}");
//! }
//! rows.close()?;
//! conn.close()?;
//! # Ok::<(), hiveline::Error>(())
//! ```
use std::sync::Arc;

use log::{info, warn};

use crate::{
    beeswax::BeeswaxClient,
    config::{Auth, Options},
    error::{Error, Result},
    hive::{HiveClient, ResultSet, Session},
    protocol::{
        BufferedTransport, ByteStream, Channel, RpcClient, SaslTransport, Socket, TlsSocket,
        select_mechanism, tls,
    },
    retry::CancelToken,
    schema::Schema,
    statement::{NamedValue, PreparedStatement, bind, template},
    value::Value,
};

/// Transport stack produced by a [`Connector`].
pub type Stream = Box<dyn ByteStream + Send>;

/// Builds connections from [`Options`].
#[derive(Debug, Clone)]
pub struct Connector {
    options: Options,
    cancel: CancelToken,
}

impl Connector {
    pub fn new(options: Options) -> Self {
        Self {
            options,
            cancel: CancelToken::new(),
        }
    }

    /// Shares `cancel` with every client this connector creates.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn connect(&self) -> Result<Connection<RpcClient<Stream>>> {
        let channel = self.channel()?;
        Ok(Connection::new(HiveClient::new(
            channel,
            self.options.clone(),
            self.cancel.clone(),
        )))
    }

    pub fn connect_beeswax(&self) -> Result<BeeswaxClient<RpcClient<Stream>>> {
        let channel = self.channel()?;
        Ok(BeeswaxClient::new(
            channel,
            self.options.clone(),
            self.cancel.clone(),
        ))
    }

    fn channel(&self) -> Result<RpcClient<Stream>> {
        self.options.validate().map_err(Error::Config)?;

        let mut client = RpcClient::new(self.transport()?);
        client.open()?;
        info!("connected to {}", self.options.address());
        Ok(client)
    }

    fn socket(&self) -> Result<Stream> {
        let options = &self.options;
        if !options.use_tls {
            return Ok(Box::new(Socket::new(
                options.address(),
                options.connect_timeout,
            )));
        }

        let ca = options
            .ca_cert_path
            .as_deref()
            .ok_or_else(|| Error::Config("TLS enabled without a CA certificate path".into()))?;
        let socket = TlsSocket::new(
            options.address(),
            &options.host,
            options.connect_timeout,
            tls::client_config(ca)?,
        )?;
        Ok(Box::new(socket))
    }

    fn transport(&self) -> Result<Stream> {
        let socket = self.socket()?;
        let stream: Stream = match &self.options.auth {
            Auth::None => Box::new(BufferedTransport::new(socket, self.options.buffer_size)),
            Auth::Plain { username, password } => {
                let mechanism = select_mechanism(&self.options.mechanisms, username, password)?;
                Box::new(SaslTransport::new(
                    socket,
                    mechanism,
                    self.options.max_frame_size,
                ))
            }
        };
        Ok(stream)
    }
}

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecResult {
    pub rows_affected: Option<f64>,
}

/// A direct generation connection holding at most one session, opened on first use.
///
/// Not for concurrent use; [`Rows`] borrows the connection so only one statement is in
/// flight at a time.
pub struct Connection<C: Channel> {
    client: HiveClient<C>,
    session: Option<Session>,
}

impl<C: Channel> Connection<C> {
    pub fn new(client: HiveClient<C>) -> Self {
        Self {
            client,
            session: None,
        }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        self.client.cancel_token()
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Current session, opened if there is none yet.
    pub fn open_session(&mut self) -> Result<&Session> {
        ensure_session(&mut self.client, &mut self.session)
    }

    /// Closes and forgets the session. No-op without one.
    pub fn reset_session(&mut self) -> Result<()> {
        match self.session.take() {
            Some(session) => self.client.close_session(session),
            None => Ok(()),
        }
    }

    pub fn ping(&mut self) -> Result<String> {
        let session = ensure_session(&mut self.client, &mut self.session)?;
        self.client.ping(session)
    }

    pub fn prepare(&self, query: &str) -> PreparedStatement {
        PreparedStatement::new(query)
    }

    /// Runs a statement that returns rows. `?` placeholders and `@name` markers in
    /// `query` are substituted from `args`.
    pub fn query(&mut self, query: &str, args: &[NamedValue]) -> Result<Rows<'_, C>> {
        self.run_query(bind(&template(query), args))
    }

    pub fn query_prepared(
        &mut self,
        statement: &PreparedStatement,
        args: &[NamedValue],
    ) -> Result<Rows<'_, C>> {
        self.run_query(statement.bind(args))
    }

    /// Runs a statement that returns no rows and releases its operation.
    pub fn exec(&mut self, query: &str, args: &[NamedValue]) -> Result<ExecResult> {
        self.run_exec(bind(&template(query), args))
    }

    pub fn exec_prepared(
        &mut self,
        statement: &PreparedStatement,
        args: &[NamedValue],
    ) -> Result<ExecResult> {
        self.run_exec(statement.bind(args))
    }

    /// Closes the session, if any, then the transport.
    pub fn close(mut self) -> Result<()> {
        info!("close connection");
        let reset = self.reset_session();
        let disconnect = self.client.disconnect();
        reset.and(disconnect)
    }

    fn run_query(&mut self, statement: String) -> Result<Rows<'_, C>> {
        let session = ensure_session(&mut self.client, &mut self.session)?;
        let mut operation = self.client.execute_statement(session, &statement)?;

        let schema = if operation.has_result_set() {
            self.client.get_result_set_metadata(&mut operation)?
        } else {
            Arc::new(Schema::default())
        };

        Ok(Rows {
            client: &mut self.client,
            result_set: ResultSet::new(operation, schema),
        })
    }

    fn run_exec(&mut self, statement: String) -> Result<ExecResult> {
        let session = ensure_session(&mut self.client, &mut self.session)?;
        let operation = self.client.execute_statement(session, &statement)?;
        let result = ExecResult {
            rows_affected: operation.rows_affected(),
        };
        self.client.close_operation(operation)?;
        Ok(result)
    }

    #[cfg(test)]
    fn client(&self) -> &HiveClient<C> {
        &self.client
    }
}

fn ensure_session<'s, C: Channel>(
    client: &mut HiveClient<C>,
    slot: &'s mut Option<Session>,
) -> Result<&'s Session> {
    let session = match slot.take() {
        Some(session) => session,
        None => client
            .open_session()
            .inspect_err(|e| warn!("failed to open session: {e}"))?,
    };
    Ok(slot.insert(session))
}

/// Rows of one executed statement. Close to release the server side operation.
pub struct Rows<'a, C: Channel> {
    client: &'a mut HiveClient<C>,
    result_set: ResultSet,
}

impl<C: Channel> Rows<'_, C> {
    pub fn schema(&self) -> &Schema {
        self.result_set.schema()
    }

    pub fn columns(&self) -> Vec<&str> {
        self.result_set.schema().column_names()
    }

    pub fn rows_affected(&self) -> Option<f64> {
        self.result_set.operation().rows_affected()
    }

    pub fn next_row(&mut self) -> Result<Option<Vec<Value>>> {
        self.result_set.next(self.client)
    }

    pub fn close(self) -> Result<()> {
        self.result_set.close(self.client)
    }
}

impl<C: Channel> Iterator for Rows<'_, C> {
    type Item = Result<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}
