//! Local implementations of the persistence and change notification seams.

pub mod data;
pub mod local;

pub use data::{BackendData, DataFile};
pub use local::LocalBackend;
