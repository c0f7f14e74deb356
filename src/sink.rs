//! Output sinks.
//!
//! A rendered message goes to exactly one destination: dropped, standard
//! output, an append-mode file, or an external message queue. Queue
//! transports are a collaborator behind [`QueueTransport`]; their handles
//! are opened at configuration time so dispatch only selects and writes.

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use tracing::debug;

use crate::error::{ConfigError, EngineError};

/// Destination kinds, as they appear in the `output_type` config member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// Drop the message.
    Disabled,
    /// Write to standard output.
    Stdout,
    /// Write to an external message queue.
    MQueue,
    /// Write to a file.
    File,
}

impl SinkKind {
    /// Parse an `output_type` value. Absent or unrecognized values become
    /// `Disabled` without failing the configuration.
    #[must_use]
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("stdout") => Self::Stdout,
            Some("mqueue") => Self::MQueue,
            Some("file") => Self::File,
            Some("disabled") | None => Self::Disabled,
            Some(other) => {
                debug!(output_type = other, "unrecognized output type, output disabled");
                Self::Disabled
            }
        }
    }

    /// Canonical config-file spelling of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Stdout => "stdout",
            Self::MQueue => "mqueue",
            Self::File => "file",
        }
    }
}

/// Opens writable handles to named message queues.
///
/// Implementations wrap whatever queue transport the deployment uses. The
/// handle is opened once, at configuration time.
pub trait QueueTransport: Send + Sync {
    /// Open a writable handle to the named queue.
    ///
    /// # Errors
    /// Any I/O error establishing the queue connection.
    fn open(&self, name: &str) -> io::Result<Box<dyn Write + Send>>;
}

/// One definition's output destination with its open handle.
pub enum Sink {
    /// Drop every message.
    Disabled,
    /// Standard output.
    Stdout,
    /// Append-mode file.
    File {
        /// Destination path, for diagnostics.
        path: PathBuf,
        /// Handle opened at configuration time.
        writer: BufWriter<std::fs::File>,
    },
    /// External message queue.
    Queue {
        /// Queue name, for diagnostics.
        name: String,
        /// Handle opened at configuration time; None when no transport
        /// was available, in which case dispatch fails loudly.
        writer: Option<Box<dyn Write + Send>>,
    },
}

impl Sink {
    /// Open the sink described by `output_type`/`output`.
    ///
    /// # Errors
    /// `MissingOutput` when a file or queue kind has no destination name,
    /// `Io` when opening the file or queue handle fails.
    pub fn open(
        output_type: Option<&str>,
        output: Option<&str>,
        queues: Option<&dyn QueueTransport>,
    ) -> Result<Self, ConfigError> {
        match SinkKind::parse(output_type) {
            SinkKind::Disabled => Ok(Self::Disabled),
            SinkKind::Stdout => Ok(Self::Stdout),
            SinkKind::File => {
                let path = output.ok_or(ConfigError::MissingOutput { kind: "file" })?;
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                Ok(Self::File {
                    path: PathBuf::from(path),
                    writer: BufWriter::new(file),
                })
            }
            SinkKind::MQueue => {
                let name = output.ok_or(ConfigError::MissingOutput { kind: "mqueue" })?;
                let writer = match queues {
                    Some(transport) => Some(transport.open(name)?),
                    None => None,
                };
                Ok(Self::Queue {
                    name: name.to_string(),
                    writer,
                })
            }
        }
    }

    /// The kind of this sink.
    #[must_use]
    pub const fn kind(&self) -> SinkKind {
        match self {
            Self::Disabled => SinkKind::Disabled,
            Self::Stdout => SinkKind::Stdout,
            Self::File { .. } => SinkKind::File,
            Self::Queue { .. } => SinkKind::MQueue,
        }
    }

    /// Deliver one rendered message verbatim.
    ///
    /// # Errors
    /// `Io` on write failure; `SinkUnavailable` for a queue sink with no
    /// transport attached — never a silent drop.
    pub fn dispatch(&mut self, message: &[u8]) -> Result<(), EngineError> {
        match self {
            Self::Disabled => Ok(()),
            Self::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(message)?;
                out.flush()?;
                Ok(())
            }
            Self::File { writer, .. } => {
                writer.write_all(message)?;
                writer.flush()?;
                Ok(())
            }
            Self::Queue { writer, .. } => match writer {
                Some(w) => {
                    w.write_all(message)?;
                    w.flush()?;
                    Ok(())
                }
                None => Err(EngineError::SinkUnavailable { kind: "mqueue" }),
            },
        }
    }

    /// Best-effort flush, used during shutdown.
    pub fn flush(&mut self) {
        let result = match self {
            Self::Disabled | Self::Stdout => Ok(()),
            Self::File { writer, .. } => writer.flush(),
            Self::Queue { writer, .. } => writer.as_mut().map_or(Ok(()), Write::flush),
        };
        if let Err(err) = result {
            debug!(sink = self.kind().as_str(), error = %err, "sink flush failed");
        }
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("Sink::Disabled"),
            Self::Stdout => f.write_str("Sink::Stdout"),
            Self::File { path, .. } => write!(f, "Sink::File({})", path.display()),
            Self::Queue { name, writer } => write!(
                f,
                "Sink::Queue({name}, {})",
                if writer.is_some() { "attached" } else { "detached" }
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Queue transport that captures written bytes.
    pub(crate) struct CapturingQueue {
        pub messages: Arc<Mutex<Vec<u8>>>,
    }

    struct CapturingWriter {
        messages: Arc<Mutex<Vec<u8>>>,
    }

    impl Write for CapturingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.messages.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl QueueTransport for CapturingQueue {
        fn open(&self, _name: &str) -> io::Result<Box<dyn Write + Send>> {
            Ok(Box::new(CapturingWriter {
                messages: Arc::clone(&self.messages),
            }))
        }
    }

    #[test]
    fn parse_output_type_table() {
        assert_eq!(SinkKind::parse(Some("disabled")), SinkKind::Disabled);
        assert_eq!(SinkKind::parse(Some("stdout")), SinkKind::Stdout);
        assert_eq!(SinkKind::parse(Some("mqueue")), SinkKind::MQueue);
        assert_eq!(SinkKind::parse(Some("file")), SinkKind::File);
        // Unknown and absent values silently disable output.
        assert_eq!(SinkKind::parse(Some("smoke-signals")), SinkKind::Disabled);
        assert_eq!(SinkKind::parse(None), SinkKind::Disabled);
    }

    #[test]
    fn disabled_sink_drops_silently() {
        let mut sink = Sink::open(None, None, None).unwrap();
        assert_eq!(sink.kind(), SinkKind::Disabled);
        sink.dispatch(b"{}\n").unwrap();
    }

    #[test]
    fn file_sink_requires_output() {
        let err = Sink::open(Some("file"), None, None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingOutput { kind: "file" }));
    }

    #[test]
    fn file_sink_appends_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let path_str = path.to_str().unwrap();

        let mut sink = Sink::open(Some("file"), Some(path_str), None).unwrap();
        sink.dispatch(b"{ \"a\":\"1\"}\n").unwrap();
        sink.dispatch(b"{ \"a\":\"2\"}\n").unwrap();
        drop(sink);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "{ \"a\":\"1\"}\n{ \"a\":\"2\"}\n");
    }

    #[test]
    fn queue_sink_without_transport_fails_loudly() {
        let mut sink = Sink::open(Some("mqueue"), Some("/telemetry"), None).unwrap();
        let err = sink.dispatch(b"{}\n").unwrap_err();
        assert!(matches!(
            err,
            EngineError::SinkUnavailable { kind: "mqueue" }
        ));
    }

    #[test]
    fn queue_sink_with_transport_delivers() {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let transport = CapturingQueue {
            messages: Arc::clone(&messages),
        };

        let mut sink = Sink::open(Some("mqueue"), Some("/telemetry"), Some(&transport)).unwrap();
        sink.dispatch(b"{ \"a\":\"1\"}\n").unwrap();

        assert_eq!(&*messages.lock().unwrap(), b"{ \"a\":\"1\"}\n");
    }
}
