//! Persistence of drained events.

mod drain;
mod sink;

pub use drain::{DrainReport, LOGS_TABLE, QueueDrainer};
pub use sink::{LogSink, PgLogSink};
