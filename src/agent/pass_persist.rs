//! net-snmp `pass_persist` adapter.
//!
//! snmpd starts the daemon once and talks to it over stdin/stdout:
//!
//! ```text
//! PING                  -> PONG
//! get\n<oid>            -> <oid>\n<type>\n<value>   or NONE
//! getnext\n<oid>        -> <next oid>\n<type>\n<value> or NONE
//! set\n<oid>\n<value>   -> not-writable
//! ```
//!
//! An empty line or EOF on stdin ends the session.

use std::io::{self, BufRead, BufReader, Stdout, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use super::RequestServer;
use crate::mib::{Mib, Value, format_oid, parse_oid};

/// One parsed request from snmpd.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Ping,
    Get(String),
    GetNext(String),
    /// The registry is read-only; only the OID is kept.
    Set(String),
    /// A command this adapter does not understand.
    Unknown(String),
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Integer32(_) => "integer",
        Value::Unsigned32(_) => "gauge",
        Value::Counter32(_) => "counter",
        Value::Counter64(_) => "counter64",
        Value::DisplayString(_) => "string",
    }
}

fn format_varbind(oid: &[u32], value: &Value) -> String {
    // A newline inside a string would desynchronise the line protocol.
    let text = value.to_string().replace(['\r', '\n'], " ");
    format!("{}\n{}\n{}\n", format_oid(oid), type_name(value), text)
}

/// Builds the response text for one request.
pub fn respond(mib: &Mib, request: &Request) -> String {
    match request {
        Request::Ping => "PONG\n".to_string(),
        Request::Get(text) => match parse_oid(text) {
            Ok(oid) => match mib.get(&oid) {
                Some(value) => format_varbind(&oid, value),
                None => "NONE\n".to_string(),
            },
            Err(_) => "NONE\n".to_string(),
        },
        Request::GetNext(text) => match parse_oid(text) {
            Ok(oid) => match mib.get_next(&oid) {
                Some((next, value)) => format_varbind(next, value),
                None => "NONE\n".to_string(),
            },
            Err(_) => "NONE\n".to_string(),
        },
        Request::Set(_) => "not-writable\n".to_string(),
        Request::Unknown(_) => "NONE\n".to_string(),
    }
}

/// Reads requests until EOF or an empty command line.
fn read_requests<R: BufRead>(reader: R, tx: &Sender<Request>) -> io::Result<()> {
    let mut lines = reader.lines();
    let mut next_line = move || lines.next().transpose();

    while let Some(command) = next_line()? {
        let command = command.trim().to_string();
        let request = match command.to_ascii_lowercase().as_str() {
            "" => break,
            "ping" => Request::Ping,
            "get" => match next_line()? {
                Some(oid) => Request::Get(oid.trim().to_string()),
                None => break,
            },
            "getnext" => match next_line()? {
                Some(oid) => Request::GetNext(oid.trim().to_string()),
                None => break,
            },
            "set" => {
                let oid = next_line()?;
                let value = next_line()?;
                match (oid, value) {
                    (Some(oid), Some(_)) => Request::Set(oid.trim().to_string()),
                    _ => break,
                }
            }
            _ => Request::Unknown(command),
        };

        if tx.send(request).is_err() {
            break;
        }
    }
    Ok(())
}

/// Serves the registry over the `pass_persist` protocol.
///
/// A reader thread turns the input into [`Request`]s; responses are
/// written from the caller's thread inside
/// [`RequestServer::process_pending`].
pub struct PassPersistServer<W: Write> {
    rx: Receiver<Request>,
    writer: W,
    closed: bool,
}

impl PassPersistServer<Stdout> {
    /// Serves snmpd over the process's stdin and stdout.
    pub fn stdio() -> io::Result<Self> {
        Self::from_reader(BufReader::new(io::stdin()), io::stdout())
    }
}

impl<W: Write> PassPersistServer<W> {
    /// Serves requests read from `reader`, answering on `writer`.
    pub fn from_reader<R: BufRead + Send + 'static>(reader: R, writer: W) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name("pass-persist".to_string())
            .spawn(move || {
                match read_requests(reader, &tx) {
                    Ok(()) => debug!("pass_persist input closed"),
                    Err(e) => warn!(error = %e, "pass_persist input failed"),
                }
            })?;

        Ok(Self {
            rx,
            writer,
            closed: false,
        })
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    fn answer(&mut self, mib: &Mib, request: &Request) -> io::Result<()> {
        let response = respond(mib, request);
        trace!(?request, response = response.trim_end(), "pass_persist request");
        if let Request::Unknown(command) = request {
            debug!(command, "unknown pass_persist command");
        }
        self.writer.write_all(response.as_bytes())?;
        self.writer.flush()
    }
}

impl<W: Write> RequestServer for PassPersistServer<W> {
    fn process_pending(&mut self, mib: &Mib, timeout: Duration) -> io::Result<usize> {
        if self.closed {
            return Ok(0);
        }

        let deadline = Instant::now() + timeout;
        let mut answered = 0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(request) => {
                    self.answer(mib, &request)?;
                    answered += 1;
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
        Ok(answered)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mib::ValueType;
    use std::io::Cursor;

    fn sample_mib() -> Mib {
        let mut mib = Mib::new();
        let table = mib
            .define_table(
                "t",
                vec![1, 3, 6, 1, 1, 1],
                &[(2, ValueType::DisplayString), (3, ValueType::Counter64)],
            )
            .unwrap();
        mib.add_row(table, vec![Value::DisplayString("tank".into()), Value::Counter64(1 << 40)])
            .unwrap();
        let scalar = mib
            .define_scalar("s", vec![1, 3, 6, 1, 2], ValueType::Unsigned32)
            .unwrap();
        mib.update_scalar(scalar, Value::Unsigned32(42)).unwrap();
        mib
    }

    fn serve(input: &str, mib: &Mib) -> (String, usize, bool) {
        let mut server =
            PassPersistServer::from_reader(Cursor::new(input.to_string()), Vec::new()).unwrap();
        let mut answered = 0;
        let start = Instant::now();
        while !server.is_closed() && start.elapsed() < Duration::from_secs(5) {
            answered += server
                .process_pending(mib, Duration::from_millis(50))
                .unwrap();
        }
        let output = String::from_utf8(server.get_ref().clone()).unwrap();
        (output, answered, server.is_closed())
    }

    #[test]
    fn test_ping() {
        let mib = sample_mib();
        assert_eq!(respond(&mib, &Request::Ping), "PONG\n");
    }

    #[test]
    fn test_get_scalar() {
        let mib = sample_mib();
        assert_eq!(
            respond(&mib, &Request::Get(".1.3.6.1.2.0".into())),
            ".1.3.6.1.2.0\ngauge\n42\n"
        );
    }

    #[test]
    fn test_get_missing_and_invalid() {
        let mib = sample_mib();
        assert_eq!(respond(&mib, &Request::Get(".1.3.6.1.2".into())), "NONE\n");
        assert_eq!(respond(&mib, &Request::Get("garbage".into())), "NONE\n");
        assert_eq!(respond(&mib, &Request::GetNext(".1.3.6.1.3".into())), "NONE\n");
    }

    #[test]
    fn test_getnext_walks_tables_then_scalars() {
        let mib = sample_mib();
        assert_eq!(
            respond(&mib, &Request::GetNext(".1.3.6.1".into())),
            ".1.3.6.1.1.1.2.0\nstring\ntank\n"
        );
        assert_eq!(
            respond(&mib, &Request::GetNext(".1.3.6.1.1.1.2.0".into())),
            ".1.3.6.1.1.1.3.0\ncounter64\n1099511627776\n"
        );
        assert_eq!(
            respond(&mib, &Request::GetNext(".1.3.6.1.1.1.3.0".into())),
            ".1.3.6.1.2.0\ngauge\n42\n"
        );
    }

    #[test]
    fn test_set_is_rejected() {
        let mib = sample_mib();
        assert_eq!(
            respond(&mib, &Request::Set(".1.3.6.1.2.0".into())),
            "not-writable\n"
        );
    }

    #[test]
    fn test_string_newlines_are_flattened() {
        let mut mib = Mib::new();
        let scalar = mib
            .define_scalar("s", vec![1, 9], ValueType::DisplayString)
            .unwrap();
        mib.update_scalar(scalar, Value::DisplayString("a\nb".into()))
            .unwrap();
        assert_eq!(
            respond(&mib, &Request::Get(".1.9.0".into())),
            ".1.9.0\nstring\na b\n"
        );
    }

    #[test]
    fn test_session_over_stream() {
        let mib = sample_mib();
        let input = "PING\nget\n.1.3.6.1.2.0\ngetnext\n.1.3.6.1.1.1.3.0\nset\n.1.3.6.1.2.0\ngauge 1\n";
        let (output, answered, closed) = serve(input, &mib);

        assert_eq!(answered, 4);
        assert!(closed);
        assert_eq!(
            output,
            "PONG\n.1.3.6.1.2.0\ngauge\n42\n.1.3.6.1.2.0\ngauge\n42\nnot-writable\n"
        );
    }

    #[test]
    fn test_empty_line_ends_session() {
        let mib = sample_mib();
        let (output, answered, closed) = serve("PING\n\nPING\n", &mib);
        assert_eq!((answered, closed), (1, true));
        assert_eq!(output, "PONG\n");
    }

    #[test]
    fn test_truncated_request_ends_session() {
        let mib = sample_mib();
        let (output, answered, closed) = serve("get\n", &mib);
        assert_eq!((answered, closed), (0, true));
        assert!(output.is_empty());
    }

    #[test]
    fn test_unknown_command_answers_none() {
        let mib = sample_mib();
        let (output, _, _) = serve("bulkwalk\n", &mib);
        assert_eq!(output, "NONE\n");
    }

    #[test]
    fn test_closed_server_answers_nothing() {
        let mib = sample_mib();
        let mut server = PassPersistServer::from_reader(Cursor::new(String::new()), Vec::new()).unwrap();
        let start = Instant::now();
        while !server.is_closed() && start.elapsed() < Duration::from_secs(5) {
            server.process_pending(&mib, Duration::from_millis(10)).unwrap();
        }
        assert_eq!(server.process_pending(&mib, Duration::from_millis(10)).unwrap(), 0);
    }
}
