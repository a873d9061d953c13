//! Packet capture: the domain `Logger` (component G) and its sinks, the
//! `.mcpr` replay recorder (component H), and shared statistics (§3's
//! `NetworkRecapItem`).

pub mod logger;
pub mod replay;
pub mod stats;

pub use logger::{Logger, LoggerHandle};
