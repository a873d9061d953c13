//! Accept loop and per-connection proxy lifecycle (component I). Binds the
//! local port, resolves the upstream server address once at startup,
//! dials a fresh connection to it for every accepted client, and wires up
//! that session's own Logger, optional replay recorder, and authenticator
//! before handing the pair of sockets to a [`crate::proxy::ProxyCore`]
//! running as its own task. A reaper sweep drops finished sessions'
//! `JoinHandle`s on the same cadence the original `server.cpp`'s set scan
//! used.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::auth::{Authenticator, MojangAuthenticator, OfflineAuthenticator};
use crate::capture::logger::Logger;
use crate::capture::replay::{ReplayMetadata, ReplayRecorder};
use crate::config::{Config, ConfigWatcher};
use crate::error::{RelayError, Result};
use crate::net::Connection;
use crate::proto::{Endpoint, PROTOCOL_VERSION};
use crate::proxy::minecraft::TransferTable;
use crate::proxy::{MinecraftProxy, ProxyCore};

/// How often the reaper drops finished sessions' handles and polls the
/// config file for changes relevant to the listener itself.
const REAP_INTERVAL: Duration = Duration::from_secs(1);

/// Accepts real clients on the configured local port and spawns a proxy
/// session for each.
pub struct Listener {
    tcp: TcpListener,
    config_path: PathBuf,
    config_watcher: ConfigWatcher,
    resolved_server_host: String,
    resolved_server_port: u16,
    transfer_table: TransferTable,
    sessions: Vec<JoinHandle<()>>,
}

impl Listener {
    /// Binds the local port and resolves the upstream server address.
    /// `config_path` is read once here for the bind port and server
    /// address, then re-read on the same watcher for every subsequent
    /// accept so config edits (auth mode, replay toggle) take effect
    /// without a restart.
    pub async fn bind(config_path: impl Into<PathBuf>) -> Result<Self> {
        let config_path = config_path.into();
        let config_watcher = ConfigWatcher::new(&config_path);
        let config = config_watcher.current();

        let bind_addr = SocketAddr::from(([0, 0, 0, 0], config.local_port));
        let tcp = TcpListener::bind(bind_addr).await?;
        tracing::info!(addr = %bind_addr, "listening for clients");

        let (resolved_server_host, resolved_server_port) =
            resolve_server_address(&config.server_address, &config.dns_resolver);
        tracing::info!(
            host = %resolved_server_host,
            port = resolved_server_port,
            "resolved upstream server address"
        );

        Ok(Listener {
            tcp,
            config_path,
            config_watcher,
            resolved_server_host,
            resolved_server_port,
            transfer_table: Arc::new(Mutex::new(std::collections::HashMap::new())),
            sessions: Vec::new(),
        })
    }

    /// The address this listener ended up bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.tcp.local_addr()?)
    }

    /// Runs the accept loop until `shutdown` resolves, then stops accepting
    /// new clients and waits for every in-flight session to finish on its
    /// own (each session closes its connections as soon as either side
    /// does).
    pub async fn run(mut self, shutdown: impl std::future::Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut reap = tokio::time::interval(REAP_INTERVAL);

        loop {
            tokio::select! {
                accepted = self.tcp.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.spawn_session(stream, addr),
                        Err(e) => tracing::error!(error = %e, "failed to accept connection"),
                    }
                }
                _ = reap.tick() => {
                    self.config_watcher.check_reload();
                    self.sessions.retain(|handle| !handle.is_finished());
                }
                _ = &mut shutdown => break,
            }
        }

        tracing::info!("shutting down, waiting for in-flight sessions to close");
        for handle in self.sessions.drain(..) {
            let _ = handle.await;
        }
    }

    fn spawn_session(&mut self, client_stream: TcpStream, client_addr: SocketAddr) {
        let config = self.config_watcher.current().clone();
        let client_ip = client_addr.ip();

        let (dial_host, dial_port) = {
            let mut table = self.transfer_table.lock().unwrap();
            table
                .remove(&client_ip)
                .unwrap_or_else(|| (self.resolved_server_host.clone(), self.resolved_server_port))
        };

        let config_path = self.config_path.clone();
        let transfer_table = Arc::clone(&self.transfer_table);

        let handle = tokio::spawn(async move {
            if let Err(e) = run_session(
                client_stream,
                client_ip,
                dial_host,
                dial_port,
                config,
                config_path,
                transfer_table,
            )
            .await
            {
                tracing::warn!(client = %client_ip, error = %e, "session ended with an error");
            }
        });

        self.sessions.push(handle);
    }
}

async fn run_session(
    client_stream: TcpStream,
    client_ip: IpAddr,
    server_host: String,
    server_port: u16,
    config: Config,
    config_path: PathBuf,
    transfer_table: TransferTable,
) -> Result<()> {
    let server_stream = TcpStream::connect((server_host.as_str(), server_port)).await?;
    tracing::info!(client = %client_ip, server = %server_host, port = server_port, "accepted session");

    let session_start = Instant::now();
    let base_filename = timestamped_base_filename();
    let txt_path = PathBuf::from(format!("{base_filename}_sclogs.txt"));
    let bin_path = PathBuf::from(format!("{base_filename}.scbin"));

    let logger = Logger::start(&config_path, txt_path, bin_path);
    let logger_handle = logger.handle();

    let mut replay = if config.log_to_replay {
        let mcpr_path = PathBuf::from(format!("{base_filename}.mcpr"));
        match ReplayRecorder::start(&mcpr_path) {
            Ok(r) => Some(r),
            Err(e) => {
                tracing::warn!(error = %e, "failed to start replay recorder, continuing without it");
                None
            }
        }
    } else {
        None
    };
    let replay_handle = replay.as_ref().map(ReplayRecorder::handle);

    let authenticator: Arc<dyn Authenticator> = if config.online {
        let cache_key = config.microsoft_account_cache_key.as_deref().unwrap_or("default");
        let cache_path = format!("{cache_key}.json");
        match MojangAuthenticator::load_from_file(&cache_path) {
            Ok(auth) => Arc::new(auth),
            Err(e) => {
                tracing::error!(error = %e, "failed to load cached Microsoft profile, closing session");
                return Err(e);
            }
        }
    } else {
        Arc::new(OfflineAuthenticator::new(client_ip.to_string()))
    };

    let (notify_tx, notify_rx) = mpsc::unbounded_channel();
    let client_conn = Connection::spawn_with_idle_timeout(
        client_stream,
        Endpoint::Client,
        notify_tx.clone(),
        Duration::from_secs(config.read_idle_timeout_secs),
    );
    let server_conn = Connection::spawn_with_idle_timeout(
        server_stream,
        Endpoint::Server,
        notify_tx,
        Duration::from_secs(config.read_idle_timeout_secs),
    );

    let proxy = MinecraftProxy::new(
        client_ip,
        server_host.clone(),
        server_port,
        String::new(),
        0,
        authenticator,
        logger_handle,
        replay_handle,
        transfer_table,
    );

    ProxyCore::new(client_conn, server_conn, proxy, notify_rx).run().await;

    if let Some(recorder) = &mut replay {
        let duration_ms = session_start.elapsed().as_millis() as u64;
        recorder.finish(ReplayMetadata {
            singleplayer: false,
            server_name: format!("{server_host}:{server_port}"),
            duration_ms,
            date_ms: unix_ms_now(),
            minecraft_version: String::new(),
            file_format: "MCPR".into(),
            file_format_version: 14,
            protocol_version: PROTOCOL_VERSION,
            generator: "obsidian-relay".into(),
        });
    }

    tracing::info!(client = %client_ip, "session closed");
    Ok(())
}

fn unix_ms_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Builds a `%Y-%m-%d-%H-%M-%S`-style base name for one session's sink
/// files, matching the original `Logger.hpp`'s per-connection naming.
fn timestamped_base_filename() -> String {
    let now = time::OffsetDateTime::now_utc();
    format!(
        "{:04}-{:02}-{:02}-{:02}-{:02}-{:02}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
    )
}

/// Resolves `address` (`host`, or `host:port`) to a concrete `(host, port)`
/// pair. A port-less address triggers a one-shot DNS SRV lookup for
/// `_minecraft._tcp.<host>` against `dns_resolver`; any failure (timeout,
/// malformed response, no answer) falls back to `(host, 25565)`.
fn resolve_server_address(address: &str, dns_resolver: &str) -> (String, u16) {
    if let Some((host, port)) = address.rsplit_once(':') {
        if let Ok(port) = port.parse::<u16>() {
            return (host.to_string(), port);
        }
    }

    match query_srv(address, dns_resolver) {
        Ok(Some((host, port))) => (host, port),
        Ok(None) => {
            tracing::warn!(host = address, "no SRV record found, using default port 25565");
            (address.to_string(), 25565)
        }
        Err(e) => {
            tracing::warn!(host = address, error = %e, "SRV lookup failed, using default port 25565");
            (address.to_string(), 25565)
        }
    }
}

const DNS_TYPE_SRV: u16 = 33;
const DNS_CLASS_IN: u16 = 1;

/// Hand-assembles and sends a single `_minecraft._tcp.<host>` SRV query,
/// blocking synchronously on the UDP round trip. Acceptable per the
/// original design: this runs once at startup, off the accept loop.
fn query_srv(host: &str, dns_resolver: &str) -> Result<Option<(String, u16)>> {
    let query_name = format!("_minecraft._tcp.{host}");
    let mut packet = Vec::with_capacity(64);

    // Header: id, flags (recursion desired), qdcount=1, the rest zero.
    packet.extend_from_slice(&0x1234u16.to_be_bytes());
    packet.extend_from_slice(&0x0100u16.to_be_bytes());
    packet.extend_from_slice(&1u16.to_be_bytes());
    packet.extend_from_slice(&0u16.to_be_bytes());
    packet.extend_from_slice(&0u16.to_be_bytes());
    packet.extend_from_slice(&0u16.to_be_bytes());

    write_dns_name(&mut packet, &query_name);
    packet.extend_from_slice(&DNS_TYPE_SRV.to_be_bytes());
    packet.extend_from_slice(&DNS_CLASS_IN.to_be_bytes());

    let socket = std::net::UdpSocket::bind("0.0.0.0:0")?;
    socket.set_read_timeout(Some(Duration::from_secs(5)))?;
    socket.connect(dns_resolver)?;
    socket.send(&packet)?;

    let mut buf = [0u8; 512];
    let len = socket.recv(&mut buf)?;
    parse_srv_response(&buf[..len])
}

fn write_dns_name(out: &mut Vec<u8>, name: &str) {
    for label in name.split('.') {
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
}

/// Skips a (possibly compressed) domain name starting at `pos`, returning
/// the offset just past it.
fn skip_dns_name(buf: &[u8], mut pos: usize) -> Result<usize> {
    loop {
        let len = *buf
            .get(pos)
            .ok_or_else(|| RelayError::Dns("truncated name".into()))?;
        if len == 0 {
            return Ok(pos + 1);
        }
        if len & 0xC0 == 0xC0 {
            return Ok(pos + 2);
        }
        pos += 1 + len as usize;
    }
}

/// Reads a (possibly compressed) domain name starting at `pos`, returning
/// `(name, offset_past_it)`. Follows at most one compression pointer, which
/// is all a well-formed single-answer SRV response ever needs.
fn read_dns_name(buf: &[u8], pos: usize) -> Result<(String, usize)> {
    let mut labels = Vec::new();
    let mut cursor = pos;
    let mut followed_pointer = false;
    let mut end_pos = pos;

    loop {
        let len = *buf
            .get(cursor)
            .ok_or_else(|| RelayError::Dns("truncated name".into()))?;
        if len == 0 {
            if !followed_pointer {
                end_pos = cursor + 1;
            }
            break;
        }
        if len & 0xC0 == 0xC0 {
            let lo = *buf
                .get(cursor + 1)
                .ok_or_else(|| RelayError::Dns("truncated name pointer".into()))?;
            if !followed_pointer {
                end_pos = cursor + 2;
            }
            cursor = (((len & 0x3F) as usize) << 8) | lo as usize;
            followed_pointer = true;
            continue;
        }
        let start = cursor + 1;
        let stop = start + len as usize;
        let label = buf
            .get(start..stop)
            .ok_or_else(|| RelayError::Dns("truncated label".into()))?;
        labels.push(String::from_utf8_lossy(label).into_owned());
        cursor = stop;
    }

    Ok((labels.join("."), end_pos))
}

/// Parses the answer section of a DNS response for the first SRV record's
/// `(target, port)`. Returns `Ok(None)` if the response has zero answers.
fn parse_srv_response(buf: &[u8]) -> Result<Option<(String, u16)>> {
    if buf.len() < 12 {
        return Err(RelayError::Dns("response shorter than a DNS header".into()));
    }
    let qdcount = u16::from_be_bytes([buf[4], buf[5]]);
    let ancount = u16::from_be_bytes([buf[6], buf[7]]);
    if ancount == 0 {
        return Ok(None);
    }

    let mut pos = 12;
    for _ in 0..qdcount {
        pos = skip_dns_name(buf, pos)?;
        pos += 4; // qtype + qclass
    }

    for _ in 0..ancount {
        pos = skip_dns_name(buf, pos)?;
        let rtype = u16::from_be_bytes(
            buf.get(pos..pos + 2)
                .ok_or_else(|| RelayError::Dns("truncated answer".into()))?
                .try_into()
                .unwrap(),
        );
        // type(2) class(2) ttl(4) rdlength(2)
        let rdlength = u16::from_be_bytes(
            buf.get(pos + 8..pos + 10)
                .ok_or_else(|| RelayError::Dns("truncated answer".into()))?
                .try_into()
                .unwrap(),
        ) as usize;
        let rdata_start = pos + 10;

        if rtype == DNS_TYPE_SRV {
            // priority(2) weight(2) port(2) target(name)
            let port = u16::from_be_bytes(
                buf.get(rdata_start + 4..rdata_start + 6)
                    .ok_or_else(|| RelayError::Dns("truncated SRV record".into()))?
                    .try_into()
                    .unwrap(),
            );
            let (target, _) = read_dns_name(buf, rdata_start + 6)?;
            return Ok(Some((target, port)));
        }

        pos = rdata_start + rdlength;
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_dns_name_encodes_labels_with_length_prefixes() {
        let mut buf = Vec::new();
        write_dns_name(&mut buf, "_minecraft._tcp.example.com");
        assert_eq!(buf[0], 10);
        assert_eq!(&buf[1..11], b"_minecraft");
        assert_eq!(*buf.last().unwrap(), 0);
    }

    #[test]
    fn parse_srv_response_reports_no_answer() {
        let mut header = vec![0u8; 12];
        header[6] = 0;
        header[7] = 0;
        assert_eq!(parse_srv_response(&header).unwrap(), None);
    }

    #[test]
    fn parse_srv_response_rejects_truncated_header() {
        assert!(parse_srv_response(&[0u8; 4]).is_err());
    }

    #[test]
    fn read_dns_name_reads_uncompressed_labels() {
        let mut buf = Vec::new();
        write_dns_name(&mut buf, "mc.example.com");
        let (name, end) = read_dns_name(&buf, 0).unwrap();
        assert_eq!(name, "mc.example.com");
        assert_eq!(end, buf.len());
    }
}
