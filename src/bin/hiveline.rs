use std::{
    error::Error,
    io::{self, Write},
    path::PathBuf,
    process,
    time::{Duration, Instant},
};

use clap::Parser;
use hiveline::{
    Auth, CancelToken, Command, Connection, Connector, Options, Value,
    beeswax::BeeswaxClient,
    cli::{PromptError, QueryGuard},
    connection::Stream,
    prompt,
    protocol::RpcClient,
};
use log::LevelFilter;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server host
    #[arg(long, default_value = "localhost")]
    host: String,
    /// Server port
    #[arg(short, long, default_value_t = 21050)]
    port: u16,
    /// Authenticate with SASL PLAIN (LDAP)
    #[arg(short, long)]
    ldap: bool,
    #[arg(long, default_value = "")]
    username: String,
    #[arg(long, default_value = "")]
    password: String,
    /// Rows requested per fetch
    #[arg(long, default_value_t = 1024)]
    batch_size: usize,
    /// Per-query memory limit, e.g. `2g`
    #[arg(long)]
    mem_limit: Option<String>,
    /// Cancel each statement still running after this many milliseconds
    #[arg(long)]
    timeout: Option<u64>,
    /// Connect over TLS
    #[arg(long)]
    tls: bool,
    /// PEM file with the CA certificates trusted for TLS
    #[arg(long)]
    ca_cert: Option<PathBuf>,
    /// Use the polling protocol generation
    #[arg(long)]
    beeswax: bool,
    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
    /// Query to run; reads queries interactively when omitted
    query: Option<String>,
}

type Rpc = RpcClient<Stream>;

enum Client {
    Hive(Connection<Rpc>),
    Beeswax(BeeswaxClient<Rpc>),
}

impl Client {
    fn run<W: Write>(&mut self, query: &str, out: &mut W) -> Result<usize, Box<dyn Error>> {
        let mut count = 0;
        match self {
            Client::Hive(conn) => {
                let mut rows = conn.query(query, &[])?;
                if !rows.schema().is_empty() {
                    writeln!(out, "{}", rows.columns().join("\t"))?;
                }
                while let Some(row) = rows.next_row()? {
                    writeln!(out, "{}", format_row(&row))?;
                    count += 1;
                }
                rows.close()?;
            }
            Client::Beeswax(client) => {
                let mut rows = client.query(query)?;
                writeln!(out, "{}", rows.schema()?.column_names().join("\t"))?;
                while let Some(row) = rows.next()? {
                    writeln!(out, "{}", format_row(&row))?;
                    count += 1;
                }
                rows.close()?;
            }
        }
        Ok(count)
    }

    fn close(self) -> Result<(), Box<dyn Error>> {
        match self {
            Client::Hive(conn) => conn.close()?,
            Client::Beeswax(mut client) => client.disconnect()?,
        }
        Ok(())
    }
}

fn format_row(row: &[Value]) -> String {
    row.iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join("\t")
}

fn options(cli: &Cli) -> Options {
    let mut options = Options::default()
        .with_host(cli.host.clone())
        .with_port(cli.port)
        .with_batch_size(cli.batch_size);
    if cli.ldap {
        options = options.with_auth(Auth::plain(cli.username.clone(), cli.password.clone()));
    }
    if let Some(limit) = &cli.mem_limit {
        options = options.with_mem_limit(limit.clone());
    }
    if cli.tls {
        options.use_tls = true;
        options.ca_cert_path = cli.ca_cert.clone();
    }
    options
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let guard = QueryGuard::new(CancelToken::new());
    let handler = guard.clone();
    ctrlc::set_handler(move || {
        if !handler.interrupt() {
            process::exit(130);
        }
    })?;
    let timeout = cli.timeout.map(Duration::from_millis);

    let connector =
        Connector::new(options(&cli)).with_cancel_token(guard.cancel_token().clone());
    let mut client = if cli.beeswax {
        Client::Beeswax(connector.connect_beeswax()?)
    } else {
        Client::Hive(connector.connect()?)
    };

    let mut stdout = io::stdout().lock();
    if let Some(query) = &cli.query {
        execute(&mut client, &guard, timeout, query, &mut stdout)?;
        return client.close();
    }

    loop {
        let cmd = match prompt(io::stdin().lock(), &mut stdout) {
            Ok(c) => c,
            Err(e @ PromptError::Unrecognized(_)) => {
                eprintln!("{e}");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        match cmd {
            Command::Exit => break,
            Command::Empty => continue,
            Command::Query(query) => {
                if let Err(e) = execute(&mut client, &guard, timeout, &query, &mut stdout) {
                    eprintln!("query error: {e}");
                    if matches!(
                        e.downcast_ref::<hiveline::Error>(),
                        Some(hiveline::Error::Cancelled)
                    ) {
                        // The transport may hold a partial response.
                        break;
                    }
                }
            }
        }
    }

    client.close()
}

fn execute<W: Write>(
    client: &mut Client,
    guard: &QueryGuard,
    timeout: Option<Duration>,
    query: &str,
    out: &mut W,
) -> Result<(), Box<dyn Error>> {
    let start = Instant::now();
    guard.begin(timeout);
    let result = client.run(query, out);
    guard.end();

    let count = result?;
    eprintln!(
        "Fetch {count} row(s) in {:.3}s",
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
