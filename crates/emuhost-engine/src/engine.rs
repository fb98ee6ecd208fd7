use crate::machine::Machine;
use crate::output::OutputSink;

/// Extension points the engine calls into while it runs.
///
/// Every method is invoked from inside the guest context. None of them may resume the guest;
/// `boot` and `frame` suspend it until the host resumes.
///
/// When hosted by a bridge the guest context is a dedicated OS thread, so these methods (and the
/// host callbacks they forward to) run on that thread rather than the host's. The host is blocked
/// for as long as the guest runs, so the two never execute at the same time.
pub trait Guest {
    /// Yield once after initialization, before any emulated time has passed.
    fn boot(&mut self, machine: &mut (dyn Machine + 'static));

    /// Yield after each unit of emulated progress.
    fn frame(&mut self, machine: &mut (dyn Machine + 'static));

    /// Handle for diagnostic output.
    fn output(&self) -> OutputSink;

    /// Real-world time (seconds since the Unix epoch) used to seed the engine clock.
    fn base_time(&self) -> i64;

    /// The engine sampled controller input.
    fn input_polled(&self);

    /// The engine produced a new batch of audio samples.
    fn sound_ready(&self);
}

/// An emulation engine with its own entry point.
///
/// `run` is expected to never return while driven by a host; returning is treated as abnormal
/// termination and its value is reported as the exit code. Engines are `Send` because `run`
/// executes on the guest thread.
pub trait Engine: Send {
    fn run(self: Box<Self>, args: Vec<String>, guest: &mut dyn Guest) -> i32;
}
