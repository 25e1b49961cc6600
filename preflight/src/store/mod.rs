//! Resource store implementations.

mod disk;

pub use disk::DiskResourceStore;
