//! Generic byte-stream proxy core (component D): owns the two
//! [`crate::net::Connection`]s, the accumulation buffers, and the
//! `data_sources` notification bookkeeping the parser loop reconciles
//! against as it consumes bytes. Grounded in the original `BaseProxy.cpp`'s
//! `ReadIncomingData`/`ProcessData` pair; generalized here as the
//! `ProcessData` trait so [`crate::proxy::minecraft::MinecraftProxy`] can
//! plug in protocol-aware parsing without duplicating the pump.
//!
//! The one deliberate departure from `BaseProxy.cpp`: that version's
//! `continue` on "zero bytes consumed and no more sources" is a busy-spin.
//! This version simply loops back to `tokio::select!`, which only wakes on
//! a fresh notification or the periodic closed-connection check, so it
//! never spins.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::net::Connection;
use crate::proto::Endpoint;

/// Cadence at which the parser loop re-checks whether either connection has
/// closed, independent of new data arriving.
const CLOSE_CHECK_INTERVAL: Duration = Duration::from_millis(200);

/// The two live sockets a [`ProcessData`] implementation forwards through.
pub struct ProxyContext<'a> {
    pub client: &'a Connection,
    pub server: &'a Connection,
}

/// Protocol-specific behavior plugged into [`ProxyCore`]. Given everything
/// newly accumulated from one side, returns how many bytes were consumed;
/// anything left unconsumed stays in the buffer for the next call (a
/// partial frame still waiting on more bytes).
pub trait ProcessData: Send {
    fn process_data(&mut self, ctx: &ProxyContext, origin: Endpoint, data: &[u8]) -> usize;
}

/// The default pass-through behavior: forwards everything it's handed to
/// the opposite connection, untouched. Used by any proxy mode that doesn't
/// need protocol awareness.
pub struct PassThrough;

impl ProcessData for PassThrough {
    fn process_data(&mut self, ctx: &ProxyContext, origin: Endpoint, data: &[u8]) -> usize {
        match origin {
            Endpoint::Client => ctx.server.write(data.to_vec(), true),
            Endpoint::Server => ctx.client.write(data.to_vec(), true),
            _ => {}
        }
        data.len()
    }
}

/// Removes up to `consumed` bytes' worth of `origin`-tagged entries from
/// `data_sources`, trimming the first match that isn't fully consumed
/// rather than assuming the deque's front always matches `origin` (the two
/// directions' notifications interleave in arrival order on the shared
/// channel).
pub fn reconcile(data_sources: &mut VecDeque<(Endpoint, usize)>, origin: Endpoint, mut consumed: usize) {
    let mut index = 0;
    while consumed > 0 && index < data_sources.len() {
        if data_sources[index].0 == origin {
            let available = data_sources[index].1;
            if available <= consumed {
                consumed -= available;
                data_sources.remove(index);
                continue;
            } else {
                data_sources[index].1 -= consumed;
                consumed = 0;
            }
        } else {
            index += 1;
        }
    }
}

/// Owns both connections of a proxied session and the single parser task
/// that reads from both. Exactly one `ProxyCore` exists per accepted
/// client connection.
pub struct ProxyCore<P: ProcessData> {
    client: Connection,
    server: Connection,
    processor: P,
    notify_rx: mpsc::UnboundedReceiver<(Endpoint, usize)>,
    data_sources: VecDeque<(Endpoint, usize)>,
    client_buf: Vec<u8>,
    server_buf: Vec<u8>,
}

impl<P: ProcessData> ProxyCore<P> {
    /// Builds a core around already-spawned connections (both must have
    /// been [`Connection::spawn`]ed with the same `notify_tx`/`notify_rx`
    /// pair passed here).
    pub fn new(
        client: Connection,
        server: Connection,
        processor: P,
        notify_rx: mpsc::UnboundedReceiver<(Endpoint, usize)>,
    ) -> Self {
        ProxyCore {
            client,
            server,
            processor,
            notify_rx,
            data_sources: VecDeque::new(),
            client_buf: Vec::new(),
            server_buf: Vec::new(),
        }
    }

    /// Runs the parser loop until both connections have closed. Consumes
    /// `self`; there is nothing left to hand back once a session ends.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                notification = self.notify_rx.recv() => {
                    match notification {
                        Some(entry) => self.data_sources.push_back(entry),
                        None => break,
                    }
                }
                _ = tokio::time::sleep(CLOSE_CHECK_INTERVAL) => {}
            }

            while let Ok(entry) = self.notify_rx.try_recv() {
                self.data_sources.push_back(entry);
            }

            self.client_buf.extend(self.client.retrieve_ready());
            self.server_buf.extend(self.server.retrieve_ready());

            self.pump(Endpoint::Client);
            self.pump(Endpoint::Server);

            if self.client.closed() {
                self.server.close();
            }
            if self.server.closed() {
                self.client.close();
            }
            if self.client.closed() && self.server.closed() {
                break;
            }
        }
    }

    fn pump(&mut self, origin: Endpoint) {
        let ctx = ProxyContext {
            client: &self.client,
            server: &self.server,
        };

        let buf = match origin {
            Endpoint::Client => &mut self.client_buf,
            Endpoint::Server => &mut self.server_buf,
            _ => return,
        };

        if buf.is_empty() {
            return;
        }

        let consumed = self.processor.process_data(&ctx, origin, buf);
        if consumed > 0 {
            buf.drain(..consumed);
            reconcile(&mut self.data_sources, origin, consumed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconcile_pops_fully_consumed_entry() {
        let mut sources = VecDeque::from([(Endpoint::Client, 10)]);
        reconcile(&mut sources, Endpoint::Client, 10);
        assert!(sources.is_empty());
    }

    #[test]
    fn reconcile_trims_partially_consumed_entry() {
        let mut sources = VecDeque::from([(Endpoint::Client, 10)]);
        reconcile(&mut sources, Endpoint::Client, 4);
        assert_eq!(sources.front(), Some(&(Endpoint::Client, 6)));
    }

    #[test]
    fn reconcile_skips_entries_of_the_other_direction() {
        let mut sources = VecDeque::from([
            (Endpoint::Server, 5),
            (Endpoint::Client, 10),
            (Endpoint::Server, 3),
        ]);
        reconcile(&mut sources, Endpoint::Client, 10);
        assert_eq!(
            sources,
            VecDeque::from([(Endpoint::Server, 5), (Endpoint::Server, 3)])
        );
    }

    #[test]
    fn reconcile_spans_multiple_entries_of_the_same_direction() {
        let mut sources = VecDeque::from([
            (Endpoint::Client, 4),
            (Endpoint::Client, 4),
            (Endpoint::Client, 4),
        ]);
        reconcile(&mut sources, Endpoint::Client, 6);
        assert_eq!(sources, VecDeque::from([(Endpoint::Client, 2)]));
    }
}
