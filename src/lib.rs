pub mod beeswax;
pub mod cli;
pub mod config;
pub mod connection;
pub mod decode;
pub mod error;
pub mod hive;
pub mod protocol;
pub mod retry;
pub mod schema;
pub mod state;
pub mod statement;
pub mod value;

pub use cli::{Command, prompt};
pub use config::{Auth, Options};
pub use connection::{Connection, Connector, ExecResult, Rows};
pub use error::{Error, Result};
pub use retry::CancelToken;
pub use value::Value;
