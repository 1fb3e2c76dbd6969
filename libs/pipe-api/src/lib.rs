mod error;
mod record;
mod store;
mod util;

pub use error::{ErrorKind, StoreError};
pub use record::{EventKind, LogRecord, LogStats, PollRecord, RecordSummary, SizeEntry};
pub use store::{LogStore, StoreFuture};
pub use util::{format_iso, parse_iso};
