//! Host bridge for driving a synchronous emulation engine one frame at a time.
//!
//! The engine runs in its own execution context (see `emuhost-cothread`) and yields to the host
//! at its boot and frame points. [`Bridge`] owns that context together with the host callbacks,
//! the buffers handed out to the host, and the configuration. [`ffi`] exposes the same surface
//! as a C ABI.
//!
//! ```no_run
//! use emuhost_bridge::Bridge;
//! use emuhost_engine::demo::DemoEngine;
//!
//! let mut bridge = Bridge::new(DemoEngine::new());
//! assert_eq!(bridge.launch(["emuhost", "-cart", "tetris"]), 0);
//! for _ in 0..60 {
//!     bridge.resume();
//! }
//! let frame = bridge.get_script_long("return frame");
//! assert_eq!(frame, 60);
//! ```

mod bridge;
mod error;
mod guest;

pub mod buffers;
pub mod callbacks;
pub mod config;
pub mod ffi;
pub mod marshal;
pub mod media;
pub mod persistence;

pub use crate::bridge::{Bridge, EXIT_ALREADY_LAUNCHED, EXIT_SPAWN_FAILED};
pub use crate::buffers::BufferHandle;
pub use crate::config::BridgeConfig;
pub use crate::error::{BridgeError, Result};
pub use crate::media::VideoSnapshot;
pub use crate::persistence::PersistenceReport;

pub use emuhost_cothread::{EXIT_GUEST_PANICKED, EXIT_RETURNED_ZERO};
