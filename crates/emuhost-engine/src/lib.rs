//! Interfaces between the embedding bridge and an emulation engine.
//!
//! The engine is a synchronous program with its own entry point ([`Engine::run`]). It reaches the
//! host only through the [`Guest`] it is handed: yield points, log output, base time and input /
//! sound notifications. While suspended at a yield point it exposes its running [`Machine`] so the
//! host can read memory, pull media frames, run scripts and persist NVRAM.
//!
//! [`demo`] contains a small deterministic engine used by tests and the command-line runner.

pub mod demo;
pub mod lua;

mod engine;
mod machine;
mod output;
mod script;

pub use crate::engine::{Engine, Guest};
pub use crate::machine::{AddressSpace, BiosSelection, DeviceInfo, Machine, Nvram, VideoFrame};
pub use crate::output::{OutputChannel, OutputSink};
pub use crate::script::{ScriptError, ScriptHost, ScriptResult};
