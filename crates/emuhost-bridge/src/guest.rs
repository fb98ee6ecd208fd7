//! The bridge's side of the engine's extension points.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use emuhost_cothread::{YieldPoint, Yielder};
use emuhost_engine::{Guest, Machine, OutputSink};

use crate::callbacks::Callbacks;

/// Per-cycle lag flag: set by the host before each resume, cleared by an input poll.
#[derive(Debug, Default)]
pub struct LagFlag(AtomicBool);

impl LagFlag {
    pub fn arm(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs inside the guest context and is handed to [`emuhost_engine::Engine::run`].
pub(crate) struct GuestLink<'y> {
    pub(crate) yielder: &'y Yielder<dyn Machine>,
    pub(crate) callbacks: Arc<Callbacks>,
    pub(crate) lag: Arc<LagFlag>,
}

impl Guest for GuestLink<'_> {
    fn boot(&mut self, machine: &mut (dyn Machine + 'static)) {
        tracing::debug!("guest reached boot yield");
        self.yielder.suspend(YieldPoint::Boot, machine);
    }

    fn frame(&mut self, machine: &mut (dyn Machine + 'static)) {
        self.yielder.suspend(YieldPoint::Frame, machine);
    }

    fn output(&self) -> OutputSink {
        let callbacks = self.callbacks.clone();
        OutputSink::new(move |channel, payload| callbacks.log(channel, payload))
    }

    fn base_time(&self) -> i64 {
        self.callbacks.base_time()
    }

    fn input_polled(&self) {
        self.lag.clear();
        self.callbacks.input_polled();
    }

    fn sound_ready(&self) {
        self.callbacks.sound_ready();
    }
}
