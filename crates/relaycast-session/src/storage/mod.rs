//! Progress store implementations.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "file")]
pub mod file;

#[cfg(feature = "memory")]
pub use memory::MemoryProgressStore;

#[cfg(feature = "file")]
pub use file::FileProgressStore;
