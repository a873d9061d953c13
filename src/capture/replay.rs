//! `.mcpr` replay recorder (component H): captures the stream of bytes a
//! real client would have seen — genuine `Server` frames plus anything the
//! proxy injected as `SniffcraftToClient` — into a file a replay-mod can
//! play back later.
//!
//! Record format matches the `MCPR` convention: each entry is a big-endian
//! `i32` timestamp (milliseconds since the recording started) followed by a
//! big-endian `i32` payload length and the raw frame bytes. The finished
//! `recording.tmcpr` stream and a `metadata.json` sidecar are packed into a
//! single `.mcpr` (actually just a ZIP) archive by [`crate::zip::ZipWriter`].

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::error::Result;
use crate::zip::ZipWriter;

/// Written as `metadata.json` inside the archive. Field names follow the
/// established `MCPR` convention so an external replay viewer can read it
/// without modification.
#[derive(Debug, Serialize)]
pub struct ReplayMetadata {
    #[serde(rename = "singleplayer")]
    pub singleplayer: bool,
    #[serde(rename = "serverName")]
    pub server_name: String,
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    #[serde(rename = "date")]
    pub date_ms: u64,
    #[serde(rename = "mcversion")]
    pub minecraft_version: String,
    #[serde(rename = "fileFormat")]
    pub file_format: String,
    #[serde(rename = "fileFormatVersion")]
    pub file_format_version: u32,
    #[serde(rename = "protocol")]
    pub protocol_version: i32,
    #[serde(rename = "generator")]
    pub generator: String,
}

enum Command {
    Record(Vec<u8>),
    Finish { metadata: ReplayMetadata },
}

/// Handle proxies hold to feed recorded frames in. Cheap to clone.
#[derive(Clone)]
pub struct ReplayHandle(Sender<Command>);

impl ReplayHandle {
    /// Queues one clientbound frame (raw bytes, as they left the frame
    /// codec) for recording.
    pub fn record(&self, payload: Vec<u8>) {
        let _ = self.0.send(Command::Record(payload));
    }
}

/// Owns the recorder's worker thread and the temporary `.tmcpr` stream it
/// writes incrementally, bounding memory use regardless of session length.
pub struct ReplayRecorder {
    tx: Sender<Command>,
    worker: Option<JoinHandle<()>>,
}

impl ReplayRecorder {
    /// Starts recording to a fresh temp file; `output_path` is where the
    /// finished `.mcpr` archive lands once [`ReplayRecorder::finish`] runs.
    pub fn start(output_path: impl Into<PathBuf>) -> Result<Self> {
        let output_path = output_path.into();
        let tmp_path = output_path.with_extension("tmcpr.tmp");
        let tmp_file = File::create(&tmp_path)?;

        let (tx, rx) = mpsc::channel();
        let worker = std::thread::Builder::new()
            .name("obsidian-relay-replay".into())
            .spawn(move || worker_loop(rx, tmp_path, tmp_file, output_path))
            .expect("failed to spawn replay recorder thread");

        Ok(ReplayRecorder {
            tx,
            worker: Some(worker),
        })
    }

    pub fn handle(&self) -> ReplayHandle {
        ReplayHandle(self.tx.clone())
    }

    /// Signals the worker to assemble the final `.mcpr` archive and exit,
    /// then joins it so the archive is guaranteed complete on return.
    pub fn finish(&mut self, metadata: ReplayMetadata) {
        let _ = self.tx.send(Command::Finish { metadata });
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ReplayRecorder {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.finish(ReplayMetadata {
                singleplayer: false,
                server_name: String::new(),
                duration_ms: 0,
                date_ms: now_ms(),
                minecraft_version: String::new(),
                file_format: "MCPR".into(),
                file_format_version: 14,
                protocol_version: crate::proto::PROTOCOL_VERSION,
                generator: "obsidian-relay".into(),
            });
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn worker_loop(rx: mpsc::Receiver<Command>, tmp_path: PathBuf, mut tmp_file: File, output_path: PathBuf) {
    let start = Instant::now();

    for command in rx.iter() {
        match command {
            Command::Record(payload) => {
                let relative_ms = start.elapsed().as_millis() as i32;
                let mut record = Vec::with_capacity(payload.len() + 8);
                record.extend_from_slice(&relative_ms.to_be_bytes());
                record.extend_from_slice(&(payload.len() as i32).to_be_bytes());
                record.extend_from_slice(&payload);
                if tmp_file.write_all(&record).is_err() {
                    tracing::warn!("replay recorder failed writing to temp file");
                }
            }
            Command::Finish { metadata } => {
                let _ = tmp_file.flush();
                drop(tmp_file);
                if let Err(e) = assemble_archive(&tmp_path, &output_path, &metadata) {
                    tracing::warn!(error = %e, "failed to assemble replay archive");
                }
                let _ = std::fs::remove_file(&tmp_path);
                return;
            }
        }
    }
}

fn assemble_archive(tmp_path: &Path, output_path: &Path, metadata: &ReplayMetadata) -> Result<()> {
    let out_file = File::create(output_path)?;
    let mut zip = ZipWriter::new(out_file);

    zip.start_file("recording.tmcpr")?;
    let mut reader = BufReader::new(File::open(tmp_path)?);
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        zip.write_all(&buf[..n])?;
    }
    zip.finish_file()?;

    zip.start_file("metadata.json")?;
    let metadata_json = serde_json::to_vec(metadata)?;
    zip.write_all(&metadata_json)?;
    zip.finish_file()?;

    zip.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_round_trip_through_the_archive() {
        let dir = std::env::temp_dir().join(format!(
            "obsidian-relay-replay-test-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let archive_path = dir.join("session.mcpr");

        let mut recorder = ReplayRecorder::start(&archive_path).unwrap();
        let handle = recorder.handle();
        handle.record(vec![1, 2, 3]);
        handle.record(vec![4, 5]);
        recorder.finish(ReplayMetadata {
            singleplayer: false,
            server_name: "test.example.com".into(),
            duration_ms: 10,
            date_ms: now_ms(),
            minecraft_version: "1.21".into(),
            file_format: "MCPR".into(),
            file_format_version: 14,
            protocol_version: 770,
            generator: "obsidian-relay".into(),
        });

        assert!(archive_path.exists());
        let contents = std::fs::read(&archive_path).unwrap();
        assert!(contents.starts_with(b"PK"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
