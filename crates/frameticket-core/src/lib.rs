pub mod adapter;
pub mod snapshot;
pub mod types;

pub use adapter::{normalize, normalize_snapshot, RawDocument, RawNode, MAX_TREE_DEPTH};
pub use snapshot::{DocumentSnapshot, Selection, SnapshotId};
pub use types::*;
