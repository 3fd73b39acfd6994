//! Relation lifecycle: create a relation shaped like a dataset, load it by
//! bulk copy or batched inserts, and drop it again.
//!
//! [`StagingSession`] owns the request connection and guarantees teardown of
//! every relation it staged, on success, on error, and while unwinding.

mod lifecycle;
mod session;
mod spec;

pub use lifecycle::{
    load, stage, teardown, LoadOptions, StagedRelation, DEFAULT_BATCH_SIZE,
};
pub use session::StagingSession;
pub use spec::{ExistencePolicy, SchemaTarget, StagingSpec};
