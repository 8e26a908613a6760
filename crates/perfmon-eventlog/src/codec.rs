use crate::error::{EventLogError, Result};
use perfmon_common::types::{Event, PATH_SEPARATOR};
use std::path::Path;

/// Marks the beginning of a record.
pub const START: u8 = 0x02;
/// Marks the end of a record's value.
pub const END: u8 = 0x03;

#[cfg(windows)]
pub const LINE_SEPARATOR: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_SEPARATOR: &str = "\n";

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Receives every event the parser completes.
pub trait EventSink {
    fn handle(&mut self, event: Event);
}

impl<F: FnMut(Event)> EventSink for F {
    fn handle(&mut self, event: Event) {
        self(event)
    }
}

/// Encoder for the bucket file wire format:
/// `<START><relative-key><LF><value><END><LF>`.
///
/// Keys are written relative to `<metrics_root>/<epoch>/` when they carry
/// that prefix, so a decoded key never depends on where the files live.
///
/// # Examples
///
/// ```
/// use perfmon_common::types::Event;
/// use perfmon_eventlog::codec::{EventLog, END, START};
///
/// let log = EventLog::with_line_separator("/dev/shm/perfmon", "\n").unwrap();
/// let bytes = log.encode(&Event::new("/dev/shm/perfmon/5000/os/cpu", "n:1", 5000));
/// let mut expected = vec![START];
/// expected.extend_from_slice(b"os/cpu\nn:1");
/// expected.extend_from_slice(&[END, b'\n']);
/// assert_eq!(bytes, expected);
/// ```
#[derive(Debug, Clone)]
pub struct EventLog {
    metrics_root: String,
    line_separator: u8,
}

impl EventLog {
    /// Creates a codec using the platform line terminator.
    ///
    /// # Errors
    ///
    /// Fails with [`EventLogError::MultiByteLineSeparator`] on platforms
    /// whose line terminator is not a single byte.
    pub fn new(metrics_root: impl AsRef<Path>) -> Result<Self> {
        Self::with_line_separator(metrics_root, LINE_SEPARATOR)
    }

    pub fn with_line_separator(metrics_root: impl AsRef<Path>, separator: &str) -> Result<Self> {
        let [line_separator] = separator.as_bytes() else {
            return Err(EventLogError::MultiByteLineSeparator(
                separator.escape_debug().to_string(),
            ));
        };
        let root = metrics_root.as_ref().to_string_lossy();
        Ok(Self {
            metrics_root: root.trim_end_matches(PATH_SEPARATOR).to_string(),
            line_separator: *line_separator,
        })
    }

    pub fn line_separator(&self) -> u8 {
        self.line_separator
    }

    /// Key of `event` with the `<metrics_root>/<epoch>/` prefix removed.
    pub fn relative_key<'a>(&self, event: &'a Event) -> &'a str {
        let prefix = format!("{}{PATH_SEPARATOR}{}{PATH_SEPARATOR}", self.metrics_root, event.epoch);
        event.key.strip_prefix(prefix.as_str()).unwrap_or(&event.key)
    }

    pub fn encode(&self, event: &Event) -> Vec<u8> {
        let key = self.relative_key(event);
        let mut bytes = Vec::with_capacity(key.len() + event.value.len() + 4);
        bytes.push(START);
        bytes.extend_from_slice(key.as_bytes());
        bytes.push(self.line_separator);
        bytes.extend_from_slice(event.value.as_bytes());
        bytes.push(END);
        bytes.push(self.line_separator);
        bytes
    }

    /// A fresh parser speaking the same line separator.
    pub fn parser(&self) -> EventParser {
        EventParser::new(self.line_separator)
    }
}

/// Incremental decoder for the bucket file format.
///
/// Bytes may arrive in chunks of any size; a record split across two calls to
/// [`EventParser::read`] is completed by the second call. Decoded events carry
/// `epoch = 0`, the caller knows which bucket it is reading.
#[derive(Debug)]
pub struct EventParser {
    line_separator: u8,
    buf: Vec<u8>,
    key: Option<String>,
}

impl EventParser {
    pub fn new(line_separator: u8) -> Self {
        Self {
            line_separator,
            buf: Vec::with_capacity(INITIAL_BUFFER_CAPACITY),
            key: None,
        }
    }

    /// Feeds `bytes` through the parser, handing each completed event to
    /// `sink`. Returns the number of events completed by this call.
    pub fn read<S: EventSink + ?Sized>(&mut self, bytes: &[u8], sink: &mut S) -> usize {
        let mut emitted = 0;
        for &b in bytes {
            if b == START {
                self.key = None;
                self.buf.clear();
            } else if b == self.line_separator && self.key.is_none() {
                self.key = Some(String::from_utf8_lossy(&self.buf).into_owned());
                self.buf.clear();
            } else if b == END {
                match &self.key {
                    Some(key) => {
                        let value = String::from_utf8_lossy(&self.buf).into_owned();
                        sink.handle(Event::new(key.clone(), value, 0));
                        emitted += 1;
                    }
                    None => tracing::debug!(
                        buffered = self.buf.len(),
                        "End marker without a key, skipping record"
                    ),
                }
            } else {
                self.push_byte(b);
            }
        }
        emitted
    }

    fn push_byte(&mut self, b: u8) {
        if self.buf.len() == self.buf.capacity() {
            let grow_by = self.buf.capacity().max(INITIAL_BUFFER_CAPACITY);
            self.buf.reserve_exact(grow_by);
        }
        self.buf.push(b);
    }

    /// Number of bytes held for a record that has not been completed yet.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.key = None;
    }
}
