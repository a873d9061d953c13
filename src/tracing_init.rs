//! Operational logging setup.
//!
//! This is the process-wide `tracing` subscriber used for connection
//! lifecycle, handshake, and auth events. It is distinct from the packet
//! [`crate::capture::logger::Logger`], which is a domain sink with its own
//! queue, filters and statistics rather than a `tracing` consumer.

use std::fmt;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::registry::LookupSpan;

mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const GRAY: &str = "\x1b[90m";
    pub const RED: &str = "\x1b[31m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const GREEN: &str = "\x1b[32m";
    pub const BLUE: &str = "\x1b[34m";
    pub const MAGENTA: &str = "\x1b[35m";
}

/// Formats the current time as HH:MM:SS.mmm in the local offset, falling
/// back to UTC if the local offset cannot be determined (e.g. in a
/// multi-threaded process on platforms where `time` refuses to read it).
fn format_current_time() -> String {
    let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());

    format!(
        "{:02}:{:02}:{:02}.{:03}",
        now.hour(),
        now.minute(),
        now.second(),
        now.millisecond()
    )
}

struct CustomTimeFormat;

impl FormatTime for CustomTimeFormat {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        write!(w, "{}", format_current_time())
    }
}

struct CustomFormatWithTime;
struct CustomFormat;

fn format_level(level: &tracing::Level) -> String {
    match *level {
        tracing::Level::ERROR => format!("{}[ERROR]{}", colors::RED, colors::RESET),
        tracing::Level::WARN => format!("{}[WARN]{}", colors::YELLOW, colors::RESET),
        tracing::Level::INFO => format!("{}[INFO]{}", colors::GREEN, colors::RESET),
        tracing::Level::DEBUG => format!("{}[DEBUG]{}", colors::BLUE, colors::RESET),
        tracing::Level::TRACE => format!("{}[TRACE]{}", colors::MAGENTA, colors::RESET),
    }
}

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for CustomFormatWithTime
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let timestamp = format_current_time();
        write!(writer, "{}{timestamp}{} ", colors::GRAY, colors::RESET)?;
        write!(writer, "{} ", format_level(event.metadata().level()))?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for CustomFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        write!(writer, "{} ", format_level(event.metadata().level()))?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Initialize the process-wide tracing subscriber.
///
/// Respects `RUST_LOG` for filtering (default `info`) and `RUST_LOG_TIME`
/// (`1`/`true`) to prefix every line with a timestamp.
pub fn init() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let enable_time = std::env::var("RUST_LOG_TIME")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false);

    if enable_time {
        tracing_subscriber::fmt()
            .with_timer(CustomTimeFormat)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_file(false)
            .with_line_number(false)
            .with_level(true)
            .with_ansi(true)
            .with_env_filter(env_filter)
            .fmt_fields(tracing_subscriber::fmt::format::DefaultFields::new())
            .event_format(CustomFormatWithTime)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_timer(CustomTimeFormat)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_file(false)
            .with_line_number(false)
            .with_level(true)
            .with_ansi(true)
            .with_env_filter(env_filter)
            .fmt_fields(tracing_subscriber::fmt::format::DefaultFields::new())
            .event_format(CustomFormat)
            .init();
    }
}
