//! Purpose: Define the public Rust API boundary for the volume driver.
//! Exports: The Volume Manager contract, the reference backend, and error types.
//! Role: Everything a host program needs to plug a backend into `Adapter`.
//! Invariants: The adapter only sees backends through `VolumeManager`.

mod dir;
mod manager;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use dir::{DEFAULT_VOLUME_ROOT, DirVolumeManager};
pub use manager::{MountOptions, VolumeDescriptor, VolumeManager, VolumeOpts};
