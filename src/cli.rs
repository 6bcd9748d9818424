//! Interactive prompt for the `hiveline` binary.
use std::{
    io::{self, BufRead, Write},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::Duration,
};

use log::info;
use thiserror::Error;

use crate::retry::CancelToken;

/// Possible commands from a user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `.exit`, or end of input.
    Exit,
    /// Blank line.
    Empty,
    /// Statement sent to the server as is.
    Query(String),
}

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("unrecognized command '{0}'")]
    Unrecognized(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Prompts for one command.
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Command, PromptError>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    write!(&mut writer, "> ")?;
    writer.flush()?;

    if reader.read_line(&mut s)? == 0 {
        return Ok(Command::Exit);
    }

    match s.trim() {
        ".exit" => Ok(Command::Exit),
        "" => Ok(Command::Empty),
        s if s.starts_with('.') => Err(PromptError::Unrecognized(s.to_string())),
        s => Ok(Command::Query(s.trim_end_matches(';').trim_end().to_string())),
    }
}

/// Scopes cancellation to the statement being run.
///
/// The token is re-armed when a statement begins. A timeout armed for one statement can
/// never cancel a later one. Interrupts only reach the token while a statement runs.
#[derive(Debug, Clone, Default)]
pub struct QueryGuard {
    cancel: CancelToken,
    generation: Arc<AtomicU64>,
    in_flight: Arc<AtomicBool>,
}

impl QueryGuard {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            ..Default::default()
        }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Starts a statement, cancelling it after `timeout` if it is still running.
    pub fn begin(&self, timeout: Option<Duration>) {
        self.cancel.reset();
        self.in_flight.store(true, Ordering::SeqCst);

        let Some(timeout) = timeout else {
            return;
        };
        let generation = self.generation.load(Ordering::SeqCst);
        let guard = self.clone();
        thread::spawn(move || {
            thread::sleep(timeout);
            if guard.generation.load(Ordering::SeqCst) == generation {
                info!("timeout of {}ms reached, cancelling", timeout.as_millis());
                guard.cancel.cancel();
            }
        });
    }

    pub fn end(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.in_flight.store(false, Ordering::SeqCst);
    }

    /// Cancels the running statement. Returns `false` when nothing is running.
    pub fn interrupt(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.cancel.cancel();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_prints_correctly() {
        let input = b".exit\n";
        let mut output = Vec::new();

        prompt(&input[..], &mut output).unwrap();

        let output = String::from_utf8(output).expect("not valid UTF-8");
        assert_eq!("> ", output);
    }

    #[test]
    fn prompt_handles_queries() {
        let input = b"select 1;\n";
        let mut output = Vec::new();

        let res = prompt(&input[..], &mut output).unwrap();
        assert_eq!(Command::Query("select 1".into()), res);
    }

    #[test]
    fn prompt_blank_line() {
        let mut output = Vec::new();
        assert_eq!(prompt(&b"  \n"[..], &mut output).unwrap(), Command::Empty);
    }

    #[test]
    fn prompt_end_of_input_exits() {
        let mut output = Vec::new();
        assert_eq!(prompt(&b""[..], &mut output).unwrap(), Command::Exit);
    }

    #[test]
    fn prompt_unrecognized_command() {
        let input = b".something_wrong\n";
        let mut output = Vec::new();

        let err = prompt(&input[..], &mut output).unwrap_err();
        assert_eq!(err.to_string(), "unrecognized command '.something_wrong'");
    }

    #[test]
    fn guard_ignores_idle_interrupts() {
        let guard = QueryGuard::default();
        assert!(!guard.interrupt());
        assert!(!guard.cancel_token().is_cancelled());

        guard.begin(None);
        assert!(guard.interrupt());
        assert!(guard.cancel_token().is_cancelled());
        guard.end();

        guard.begin(None);
        assert!(!guard.cancel_token().is_cancelled());
    }

    #[test]
    fn guard_timeout_cancels_running_statement() {
        let guard = QueryGuard::default();
        guard.begin(Some(Duration::from_millis(10)));

        let token = guard.cancel_token().clone();
        for _ in 0..200 {
            if token.is_cancelled() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(token.is_cancelled());
    }

    #[test]
    fn guard_timeout_does_not_leak_into_next_statement() {
        let guard = QueryGuard::default();
        guard.begin(Some(Duration::from_millis(20)));
        guard.end();

        guard.begin(None);
        thread::sleep(Duration::from_millis(80));
        assert!(!guard.cancel_token().is_cancelled());
        guard.end();
    }
}
