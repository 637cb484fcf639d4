pub mod catalog;
pub mod error;
pub mod invoker;
pub mod jobs;
pub mod servers;

pub use error::Error;
pub use invoker::{BackupFormat, PgTools, ToolInvoker};
pub use jobs::{JobEvent, JobId, JobRequest, JobRunner};
pub use servers::{ServerDescriptor, ServerStore};
