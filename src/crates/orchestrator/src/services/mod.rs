//! Domain services
//!
//! Services own the lifecycle rules: run status machine, graph-state
//! persistence, versioning + retention, plan/task transitions, and the
//! idempotency cache. They sit on top of the repositories and emit events
//! where the contract calls for them.

pub mod idempotency;
pub mod page;
pub mod plan;
pub mod product_doc;
pub mod run;
pub mod session;
pub mod snapshot;
pub mod state_store;
pub mod task;

pub use idempotency::IdempotencyCache;
pub use page::{PageService, PageVersionService};
pub use plan::PlanService;
pub use product_doc::ProductDocService;
pub use run::{CreateRunParams, RunService, RunUpdate};
pub use session::SessionService;
pub use snapshot::SnapshotService;
pub use state_store::StateStoreService;
pub use task::TaskService;
