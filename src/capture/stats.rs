//! Per-packet-name bandwidth/count statistics (§3's `NetworkRecapItem`) plus
//! the periodic top-10 recap table the Logger worker prints to the console
//! (`ReportTable`/`PrintRecap` in the original `Logger.cpp`).

use std::collections::HashMap;

use crate::proto::Direction;

/// Running totals for one packet-name bucket. Only updated when
/// `bandwidth_bytes > 0`, so injected/synthesized packets never inflate the
/// count (per §4.7's "Statistics" paragraph).
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkRecapItem {
    pub count: u64,
    pub bandwidth_bytes: u64,
}

/// Clientbound/serverbound statistics, keyed per packet name (custom-payload
/// and custom-query packets suffix the key with `|<channel-identifier>`).
#[derive(Debug, Default)]
pub struct Stats {
    clientbound: HashMap<String, NetworkRecapItem>,
    serverbound: HashMap<String, NetworkRecapItem>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one logged frame. A `bandwidth_bytes` of zero (an injected
    /// packet) is a no-op, per the invariant that stats only count bytes
    /// genuinely observed on the wire.
    pub fn record(&mut self, key: &str, direction: Direction, bandwidth_bytes: u64) {
        if bandwidth_bytes == 0 {
            return;
        }
        let map = match direction {
            Direction::Serverbound => &mut self.serverbound,
            Direction::Clientbound => &mut self.clientbound,
        };
        let entry = map.entry(key.to_string()).or_default();
        entry.count += 1;
        entry.bandwidth_bytes += bandwidth_bytes;
    }

    /// Renders the top-10-by-bandwidth recap table for both directions,
    /// matching the shape of the original's periodic console recap.
    pub fn recap_table(&self) -> String {
        let mut out = String::new();
        out.push_str(&render_direction("Clientbound", &self.clientbound));
        out.push('\n');
        out.push_str(&render_direction("Serverbound", &self.serverbound));
        out
    }
}

fn render_direction(label: &str, map: &HashMap<String, NetworkRecapItem>) -> String {
    let total: NetworkRecapItem = map.values().fold(NetworkRecapItem::default(), |acc, i| {
        NetworkRecapItem {
            count: acc.count + i.count,
            bandwidth_bytes: acc.bandwidth_bytes + i.bandwidth_bytes,
        }
    });

    let mut entries: Vec<(&String, &NetworkRecapItem)> = map.iter().collect();
    entries.sort_by(|a, b| b.1.bandwidth_bytes.cmp(&a.1.bandwidth_bytes));
    entries.truncate(10);

    let mut out = String::new();
    out.push_str(&format!(
        "{label} recap — {} packets, {} bytes total\n",
        total.count, total.bandwidth_bytes
    ));
    for (name, item) in entries {
        let pct = if total.bandwidth_bytes > 0 {
            100.0 * item.bandwidth_bytes as f64 / total.bandwidth_bytes as f64
        } else {
            0.0
        };
        out.push_str(&format!(
            "  {name:<40} {:>10} pkts  {:>10} bytes  {pct:>5.2}%\n",
            item.count, item.bandwidth_bytes
        ));
    }
    out
}

/// Builds the statistics bucket key for a decoded packet: the bare name, or
/// `"<name>|<identifier>"` for custom-payload/custom-query packets whose
/// meaning is carried by a namespaced channel identifier.
pub fn stats_key(name: &str, custom_identifier: Option<&str>) -> String {
    match custom_identifier {
        Some(id) => format!("{name}|{id}"),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injected_packets_are_not_counted() {
        let mut stats = Stats::new();
        stats.record("ClientIntention", Direction::Serverbound, 0);
        assert_eq!(stats.clientbound.len(), 0);
        assert_eq!(stats.serverbound.len(), 0);
    }

    #[test]
    fn totals_equal_sum_of_buckets() {
        let mut stats = Stats::new();
        stats.record("A", Direction::Clientbound, 10);
        stats.record("B", Direction::Clientbound, 20);
        stats.record("A", Direction::Clientbound, 5);

        let total_count: u64 = stats.clientbound.values().map(|i| i.count).sum();
        let total_bw: u64 = stats.clientbound.values().map(|i| i.bandwidth_bytes).sum();
        assert_eq!(total_count, 3);
        assert_eq!(total_bw, 35);
    }

    #[test]
    fn custom_payload_key_suffixes_identifier() {
        assert_eq!(
            stats_key("ServerboundCustomPayload", Some("minecraft:brand")),
            "ServerboundCustomPayload|minecraft:brand"
        );
        assert_eq!(stats_key("StatusRequest", None), "StatusRequest");
    }
}
