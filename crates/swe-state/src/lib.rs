mod language;
mod report;
mod state;
mod store;

pub use language::detect_language;
pub use report::{ProgressReport, ReportStatus};
pub use state::*;
pub use store::{StateStore, StoreError};
