pub mod schema;
pub mod store;

pub use schema::AssignmentSnapshot;
pub use store::{AssignmentKey, SnapshotStore};
