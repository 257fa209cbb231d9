//! redb-backed per-project vector index (C3) and root project registry
//! (C10) for the memory server.
//!
//! Each project gets its own `redb` database file under
//! `<data_root>/<project_id>/semantic/vectors.redb`, so one project's
//! vectors can never be iterated into from another project's handle. The
//! root registry lives in a single `redb` database at
//! `<data_root>/registry.redb`, independent of any per-project store, so
//! listing projects never requires opening every project's database.

mod registry;
mod vector_index;

pub use registry::RedbProjectRegistry;
pub use vector_index::{RedbProjectIndexManager, RedbVectorIndex};
