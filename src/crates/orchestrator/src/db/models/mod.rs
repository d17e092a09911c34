//! Database models
//!
//! Rows are mapped with `sqlx::FromRow`; timestamps are RFC3339 strings and
//! JSON columns are stored as TEXT. Status columns stay `String` on the row
//! structs, with typed enums alongside for the services to validate against.

pub mod event;
pub mod page;
pub mod plan;
pub mod product_doc;
pub mod run;
pub mod session;
pub mod snapshot;

pub use event::{EventSource, SessionEvent};
pub use page::{Page, PageVersion};
pub use plan::{Plan, PlanStatus, Task, TaskStatus};
pub use product_doc::{ProductDoc, ProductDocHistory, ProductDocStatus, VersionSource};
pub use run::{Run, RunStatus};
pub use session::{BuildStatus, Session};
pub use snapshot::{ProjectSnapshot, SnapshotDoc, SnapshotPage};

/// Current UTC time as the RFC3339 string stored in every timestamp column
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
