//! Backend abstraction layer
//!
//! Provides the common trait and types implemented by the wgpu backend and the
//! GPU-free recording backend.

pub mod recording;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use recording::RecordingBackend;
pub use traits::*;
pub use types::*;
