//! Speed log collaborator and the bundled file writers.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LogError;
use crate::integration::SpeedEvent;
use crate::tracker::VehicleClass;

/// One persisted speed measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub class: VehicleClass,
    pub speed_kmh: f64,
    /// Recognized license plate, when a plate reader is attached
    pub plate: Option<String>,
}

impl From<&SpeedEvent> for LogEntry {
    fn from(event: &SpeedEvent) -> Self {
        Self {
            timestamp: event.timestamp,
            class: event.class.clone(),
            speed_kmh: event.speed_kmh,
            plate: None,
        }
    }
}

/// Destination for speed log entries.
pub trait SpeedLog {
    fn append(&mut self, entry: &LogEntry) -> Result<(), LogError>;

    fn flush(&mut self) -> Result<(), LogError> {
        Ok(())
    }
}

impl<L: SpeedLog + ?Sized> SpeedLog for Box<L> {
    fn append(&mut self, entry: &LogEntry) -> Result<(), LogError> {
        (**self).append(entry)
    }

    fn flush(&mut self) -> Result<(), LogError> {
        (**self).flush()
    }
}

/// Comma-separated log with a header row.
pub struct CsvLog<W: Write> {
    writer: W,
}

impl CsvLog<BufWriter<File>> {
    /// Create (truncate) `path` and write the header.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, LogError> {
        Self::new(BufWriter::new(File::create(path)?))
    }
}

impl<W: Write> CsvLog<W> {
    pub const HEADER: &'static str = "Timestamp,Vehicle Class,Speed (km/h),License Plate";

    pub fn new(mut writer: W) -> Result<Self, LogError> {
        writeln!(writer, "{}", Self::HEADER)?;
        Ok(Self { writer })
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl<W: Write> SpeedLog for CsvLog<W> {
    fn append(&mut self, entry: &LogEntry) -> Result<(), LogError> {
        writeln!(
            self.writer,
            "{},{},{:.2},{}",
            entry.timestamp.to_rfc3339(),
            csv_field(entry.class.as_str()),
            entry.speed_kmh,
            csv_field(entry.plate.as_deref().unwrap_or_default()),
        )?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), LogError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// One JSON object per line.
pub struct JsonLinesLog<W: Write> {
    writer: W,
}

impl JsonLinesLog<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, LogError> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> JsonLinesLog<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> SpeedLog for JsonLinesLog<W> {
    fn append(&mut self, entry: &LogEntry) -> Result<(), LogError> {
        serde_json::to_writer(&mut self.writer, entry)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), LogError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Csv,
    Jsonl,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "jsonl" | "json" => Ok(Self::Jsonl),
            other => Err(format!("unknown log format '{other}', expected csv or jsonl")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Csv => f.write_str("csv"),
            Self::Jsonl => f.write_str("jsonl"),
        }
    }
}

/// Open a file log in the given format.
pub fn open_log(
    path: impl AsRef<Path>,
    format: LogFormat,
) -> Result<Box<dyn SpeedLog + Send>, LogError> {
    Ok(match format {
        LogFormat::Csv => Box::new(CsvLog::create(path)?),
        LogFormat::Jsonl => Box::new(JsonLinesLog::create(path)?),
    })
}

/// Buffered output is flushed after this long without new entries.
const IDLE_FLUSH: Duration = Duration::from_secs(1);

enum LogMessage {
    Entry(LogEntry),
    /// Flush, then acknowledge on the enclosed channel
    Flush(Sender<()>),
}

/// Cloneable handle that feeds a [`LogWorker`].
#[derive(Clone)]
pub struct LogSender {
    tx: Sender<LogMessage>,
}

impl LogSender {
    /// Queue `entry`. Returns `false` once the worker is gone.
    pub fn append(&self, entry: LogEntry) -> bool {
        self.tx.send(LogMessage::Entry(entry)).is_ok()
    }

    /// Flush every entry queued so far and wait up to `timeout` for the
    /// writer to confirm. Returns whether it did.
    pub fn flush(&self, timeout: Duration) -> bool {
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        if self.tx.send(LogMessage::Flush(ack_tx)).is_err() {
            return false;
        }
        ack_rx.recv_timeout(timeout).is_ok()
    }
}

fn flush_log(log: &mut dyn SpeedLog) {
    if let Err(err) = log.flush() {
        warn!(%err, "failed to flush speed log");
    }
}

/// Runs a [`SpeedLog`] on its own thread so appends never block the
/// processing loop. Entries are written in the order they were sent and
/// reach the underlying writer on request, after a quiet second, or when the
/// worker shuts down.
pub struct LogWorker {
    sender: Option<LogSender>,
    handle: Option<JoinHandle<()>>,
}

impl LogWorker {
    pub fn spawn(mut log: Box<dyn SpeedLog + Send>) -> std::io::Result<Self> {
        let (tx, receiver) = crossbeam_channel::unbounded();
        let handle = thread::Builder::new()
            .name("speedtrack-log".into())
            .spawn(move || {
                // writers may buffer a header before the first entry
                let mut dirty = true;
                loop {
                    match receiver.recv_timeout(IDLE_FLUSH) {
                        Ok(LogMessage::Entry(entry)) => {
                            if let Err(err) = log.append(&entry) {
                                warn!(%err, "failed to append log entry");
                            }
                            dirty = true;
                        }
                        Ok(LogMessage::Flush(ack)) => {
                            flush_log(log.as_mut());
                            dirty = false;
                            let _ = ack.send(());
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            if dirty {
                                flush_log(log.as_mut());
                                dirty = false;
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                flush_log(log.as_mut());
                debug!("log worker finished");
            })?;
        Ok(Self {
            sender: Some(LogSender { tx }),
            handle: Some(handle),
        })
    }

    pub fn sender(&self) -> Option<LogSender> {
        self.sender.clone()
    }
}

impl Drop for LogWorker {
    fn drop(&mut self) {
        // closing the channel ends the worker loop once it is drained
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("log worker panicked");
            }
        }
    }
}
