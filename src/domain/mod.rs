mod enriched;
mod error_group;
mod log_entry;

pub use enriched::{EnrichedLogEntry, ProjectId};
pub use error_group::{ErrorGroup, ErrorGroupStatus};
pub use log_entry::{LogEntry, LogLevel, LogType};
