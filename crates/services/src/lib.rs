#![forbid(unsafe_code)]

pub mod error;
pub mod flow;
pub mod source;
pub mod sync;

pub use trainer_core::Clock;

pub use error::{FlowError, SyncError};
pub use flow::SessionFlowService;
pub use source::SourceError;
pub use sync::{CatalogSyncService, SuiteFailure, SyncReport, SyncSummary};
