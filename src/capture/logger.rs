//! The domain packet Logger (component G): a single worker thread draining
//! an unbounded queue, writing text/binary/console sinks, tracking
//! statistics, and hot-reloading its packet filters from the same
//! [`crate::config::ConfigWatcher`] every proxy instance already owns.
//!
//! Deliberately a `std::thread`, not a `tokio::task`: every sink does
//! blocking file I/O and the worker's own pacing (hot-reload poll, recap
//! emission) is a plain `recv_timeout` loop, which reads closer to the
//! original `Logger.hpp`'s dedicated thread than wrapping synchronous
//! writes in `spawn_blocking` would.

use std::fs::File;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use flate2::write::ZlibEncoder;
use flate2::Compression as Flate2Level;

use crate::capture::stats::Stats;
use crate::config::ConfigWatcher;
use crate::proto::varint::{VarInt, VarLong};
use crate::proto::{ConnectionState, Endpoint, PROTOCOL_VERSION};

/// Inner payloads at or below this size are stored raw; larger ones are
/// zlib-compressed, mirroring the frame codec's own compression threshold
/// behavior.
const BINARY_RECORD_COMPRESS_THRESHOLD: usize = 256;

/// How often the worker checks the config file's mtime.
const CONFIG_RELOAD_INTERVAL: Duration = Duration::from_secs(5);

/// How often the top-10 recap table is emitted to the console.
const RECAP_INTERVAL: Duration = Duration::from_secs(10);

/// One log line enqueued by a proxy's parser task. Carries everything a
/// sink might need so the worker thread never has to reach back into the
/// connection that produced it.
pub struct LogItem {
    /// Stable packet name, already suffixed for custom-payload/query
    /// packets (see [`crate::capture::stats::stats_key`]).
    pub key: String,
    /// Numeric wire id, used by the filter lists.
    pub id: i32,
    pub state: ConnectionState,
    pub origin: Endpoint,
    /// On-wire size of the frame this line describes; zero for
    /// injected/synthesized packets (never counted in statistics).
    pub bandwidth_bytes: u64,
    /// Structured field dump, present only when this packet is configured
    /// for the "detailed" sink variant.
    pub detail: Option<serde_json::Value>,
    /// The raw frame bytes, present only when raw-bytes logging is active
    /// and the caller had them on hand (never reconstructed after the
    /// fact).
    pub raw_frame: Option<Vec<u8>>,
    pub timestamp: SystemTime,
}

enum Command {
    Log(LogItem),
    Stop,
}

/// Cheaply clonable handle proxies use to enqueue log lines without
/// blocking on the worker thread.
#[derive(Clone)]
pub struct LoggerHandle(Sender<Command>);

impl LoggerHandle {
    /// Enqueues one log line. Never blocks; a full queue is unbounded, so
    /// this only fails if the worker thread has already exited.
    pub fn log(&self, item: LogItem) {
        let _ = self.0.send(Command::Log(item));
    }
}

/// Owns the worker thread. Dropping (or calling [`Logger::stop`]) signals
/// the worker to drain its queue, flush every open sink, and exit.
pub struct Logger {
    tx: Sender<Command>,
    worker: Option<JoinHandle<()>>,
}

impl Logger {
    /// Spawns the worker thread. `config_path` is polled for hot-reload;
    /// `txt_path`/`bin_path` are opened lazily by the worker the first time
    /// a sink is enabled, and reopened if the config later enables a sink
    /// that started out disabled.
    pub fn start(config_path: impl Into<PathBuf>, txt_path: PathBuf, bin_path: PathBuf) -> Self {
        let (tx, rx) = mpsc::channel();
        let config_path = config_path.into();

        let worker = std::thread::Builder::new()
            .name("obsidian-relay-logger".into())
            .spawn(move || worker_loop(rx, config_path, txt_path, bin_path))
            .expect("failed to spawn logger thread");

        Logger {
            tx,
            worker: Some(worker),
        }
    }

    /// A cloneable sender-side handle for proxies to log through.
    pub fn handle(&self) -> LoggerHandle {
        LoggerHandle(self.tx.clone())
    }

    /// Signals the worker to drain its queue and exit, then joins it.
    /// Idempotent.
    pub fn stop(&mut self) {
        let _ = self.tx.send(Command::Stop);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Sinks {
    txt_path: PathBuf,
    bin_path: PathBuf,
    txt_file: Option<File>,
    bin_file: Option<File>,
    bin_start: Option<SystemTime>,
}

impl Sinks {
    fn new(txt_path: PathBuf, bin_path: PathBuf) -> Self {
        Sinks {
            txt_path,
            bin_path,
            txt_file: None,
            bin_file: None,
            bin_start: None,
        }
    }

    fn txt(&mut self) -> Option<&mut File> {
        if self.txt_file.is_none() {
            match File::options()
                .create(true)
                .append(true)
                .open(&self.txt_path)
            {
                Ok(f) => self.txt_file = Some(f),
                Err(e) => {
                    tracing::warn!(path = %self.txt_path.display(), error = %e, "failed to open text log");
                    return None;
                }
            }
        }
        self.txt_file.as_mut()
    }

    fn bin(&mut self) -> Option<&mut File> {
        if self.bin_file.is_none() {
            match File::options()
                .create(true)
                .append(true)
                .open(&self.bin_path)
            {
                Ok(mut f) => {
                    let start = SystemTime::now();
                    let is_fresh = f.metadata().map(|m| m.len() == 0).unwrap_or(false);
                    if is_fresh {
                        if let Err(e) = write_binary_header(&mut f, start) {
                            tracing::warn!(path = %self.bin_path.display(), error = %e, "failed to write binary log header");
                        }
                    }
                    self.bin_file = Some(f);
                    self.bin_start = Some(start);
                }
                Err(e) => {
                    tracing::warn!(path = %self.bin_path.display(), error = %e, "failed to open binary log");
                    return None;
                }
            }
        }
        self.bin_file.as_mut()
    }
}

fn worker_loop(rx: mpsc::Receiver<Command>, config_path: PathBuf, txt_path: PathBuf, bin_path: PathBuf) {
    let mut watcher = ConfigWatcher::new(config_path);
    let mut sinks = Sinks::new(txt_path, bin_path);
    let mut stats = Stats::new();
    let mut last_reload = std::time::Instant::now();
    let mut last_recap = std::time::Instant::now();

    loop {
        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(Command::Log(item)) => handle_item(&item, &mut sinks, &mut stats, watcher.current()),
            Ok(Command::Stop) => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if last_reload.elapsed() >= CONFIG_RELOAD_INTERVAL {
            watcher.check_reload();
            last_reload = std::time::Instant::now();
        }

        if last_recap.elapsed() >= RECAP_INTERVAL && watcher.current().network_recap_to_console {
            println!("{}", stats.recap_table());
            last_recap = std::time::Instant::now();
        }
    }

    // Drain anything still queued before exiting so a fast shutdown never
    // silently drops the tail of a session's log.
    while let Ok(cmd) = rx.try_recv() {
        if let Command::Log(item) = cmd {
            handle_item(&item, &mut sinks, &mut stats, watcher.current());
        }
    }

    if let Some(f) = sinks.txt_file.as_mut() {
        let _ = f.flush();
    }
    if let Some(f) = sinks.bin_file.as_mut() {
        let _ = f.flush();
    }
}

fn handle_item(item: &LogItem, sinks: &mut Sinks, stats: &mut Stats, config: &crate::config::Config) {
    let clientbound = item.origin.direction() == crate::proto::Direction::Clientbound;

    stats.record(&item.key, item.origin.direction(), item.bandwidth_bytes);

    if config.is_ignored(item.state, clientbound, item.id, &item.key) {
        return;
    }

    let detailed = config.is_detailed(item.state, clientbound, item.id, &item.key);

    if config.log_to_console || config.log_to_txt_file {
        let line = render_text_line(item, config, detailed);
        if config.log_to_console {
            println!("{line}");
        }
        if config.log_to_txt_file {
            if let Some(f) = sinks.txt() {
                let _ = writeln!(f, "{line}");
            }
        }
    }

    if config.log_to_bin_file {
        if let Some(start) = sinks.bin_start {
            let relative_ms = item
                .timestamp
                .duration_since(start)
                .unwrap_or_default()
                .as_millis() as u64;
            if let Some(f) = sinks.bin() {
                write_binary_record(f, item, relative_ms);
            }
        } else if let Some(f) = sinks.bin() {
            write_binary_record(f, item, 0);
        }
    }
}

fn render_text_line(item: &LogItem, config: &crate::config::Config, detailed: bool) -> String {
    let wall = item
        .timestamp
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs_of_day = wall.as_secs() % 86_400;
    let millis = wall.subsec_millis();
    let timestamp = format!(
        "{:02}:{:02}:{:02}.{:03}",
        secs_of_day / 3600,
        (secs_of_day % 3600) / 60,
        secs_of_day % 60,
        millis
    );

    let arrow = direction_arrow(item.origin);

    let mut line = format!("[{timestamp}] [{}] {arrow} {}", item.state, item.key);

    if detailed {
        if let Some(detail) = &item.detail {
            if let Ok(pretty) = serde_json::to_string_pretty(detail) {
                line.push('\n');
                line.push_str(&pretty);
            }
        }
    }

    if config.log_raw_bytes {
        if let Some(raw) = &item.raw_frame {
            line.push('\n');
            line.push_str(&hex_dump(raw));
        }
    }

    line
}

fn direction_arrow(origin: Endpoint) -> &'static str {
    match origin {
        Endpoint::Client => "C -> S",
        Endpoint::Server => "S -> C",
        Endpoint::ClientToSniffcraft => "C -x",
        Endpoint::ServerToSniffcraft => "S -x",
        Endpoint::SniffcraftToClient => "x-> C",
        Endpoint::SniffcraftToServer => "x-> S",
    }
}

/// Space-separated uppercase byte pairs, wrapped at 16 bytes per line.
fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::new();
    for chunk in bytes.chunks(16) {
        let line: Vec<String> = chunk.iter().map(|b| format!("{b:02X}")).collect();
        out.push_str(&line.join(" "));
        out.push('\n');
    }
    out.trim_end().to_string()
}

/// Writes the binary capture's file header: `VarInt(protocol_version)` then
/// `VarLong(start_time_ms_since_epoch)`. Written exactly once, the first
/// time a session actually needs the sink.
fn write_binary_header(f: &mut File, start: SystemTime) -> crate::error::Result<()> {
    let start_ms = start
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64;
    let mut header = Vec::with_capacity(12);
    VarInt(PROTOCOL_VERSION).write(&mut header)?;
    VarLong(start_ms).write(&mut header)?;
    f.write_all(&header)?;
    Ok(())
}

/// Writes one self-describing binary capture record: `bool(compressed)`,
/// `VarInt(size)`, then `size` bytes which, after optional zlib
/// decompression, hold `VarInt(state)`, `VarInt(origin)`,
/// `VarLong(relative_ms)`, `VarLong(bandwidth_bytes)`, `VarInt(packet_id)`
/// and the packet's field bytes. Records over 256 bytes before compression
/// are zlib-compressed, same threshold as the wire compression envelope.
fn write_binary_record(f: &mut File, item: &LogItem, relative_ms: u64) {
    let Some(fields) = &item.raw_frame else { return };

    let mut inner = Vec::with_capacity(fields.len() + 24);
    if VarInt(item.state as i32).write(&mut inner).is_err() {
        return;
    }
    if VarInt(item.origin.wire_id()).write(&mut inner).is_err() {
        return;
    }
    if VarLong(relative_ms as i64).write(&mut inner).is_err() {
        return;
    }
    if VarLong(item.bandwidth_bytes as i64).write(&mut inner).is_err() {
        return;
    }
    if VarInt(item.id).write(&mut inner).is_err() {
        return;
    }
    inner.extend_from_slice(fields);

    let compressed = inner.len() > BINARY_RECORD_COMPRESS_THRESHOLD;
    let body = if compressed {
        let mut encoder = ZlibEncoder::new(Vec::new(), Flate2Level::default());
        if encoder.write_all(&inner).is_err() {
            return;
        }
        match encoder.finish() {
            Ok(b) => b,
            Err(_) => return,
        }
    } else {
        inner
    };

    let mut record = Vec::with_capacity(body.len() + 8);
    record.push(compressed as u8);
    if VarInt(body.len() as i32).write(&mut record).is_err() {
        return;
    }
    record.extend_from_slice(&body);

    let _ = f.write_all(&record);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_dump_wraps_at_sixteen_bytes() {
        let bytes: Vec<u8> = (0u8..20).collect();
        let dump = hex_dump(&bytes);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].split(' ').count(), 16);
        assert_eq!(lines[1].split(' ').count(), 4);
    }

    #[test]
    fn direction_arrow_distinguishes_injected_from_real() {
        assert_ne!(
            direction_arrow(Endpoint::Client),
            direction_arrow(Endpoint::SniffcraftToServer)
        );
    }
}
