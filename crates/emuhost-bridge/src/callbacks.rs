//! Host functions invoked by the guest at its extension points.

use std::sync::{Arc, PoisonError, RwLock};

use emuhost_engine::OutputChannel;

use crate::error::BridgeError;

pub type LogSink = dyn Fn(OutputChannel, &[u8]) + Send + Sync;
pub type BaseTimeProvider = dyn Fn() -> i64 + Send + Sync;
pub type Notifier = dyn Fn() + Send + Sync;

/// Registered host callbacks. Unregistered slots fall back to defaults.
///
/// Only the host mutates the registry; the guest reads it while it runs.
#[derive(Default)]
pub struct Callbacks {
    log: Slot<LogSink>,
    base_time: Slot<BaseTimeProvider>,
    input_poll: Slot<Notifier>,
    sound: Slot<Notifier>,
}

struct Slot<F: ?Sized>(RwLock<Option<Arc<F>>>);

impl<F: ?Sized> Default for Slot<F> {
    fn default() -> Self {
        Self(RwLock::new(None))
    }
}

impl<F: ?Sized> Slot<F> {
    fn set(&self, f: Option<Arc<F>>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = f;
    }

    /// Clones the callback out so it runs without the lock held.
    fn get(&self) -> Option<Arc<F>> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Callbacks {
    pub fn set_log_sink(&self, sink: Option<Arc<LogSink>>) {
        self.log.set(sink);
    }

    pub fn set_base_time_provider(&self, provider: Option<Arc<BaseTimeProvider>>) {
        self.base_time.set(provider);
    }

    pub fn set_input_poll_notifier(&self, notifier: Option<Arc<Notifier>>) {
        self.input_poll.set(notifier);
    }

    pub fn set_sound_notifier(&self, notifier: Option<Arc<Notifier>>) {
        self.sound.set(notifier);
    }

    /// Delivers one diagnostic line. Without a sink it goes to the process `tracing` subscriber.
    pub fn log(&self, channel: OutputChannel, payload: &[u8]) {
        match self.log.get() {
            Some(sink) => sink(channel, payload),
            None => default_log(channel, payload),
        }
    }

    pub fn base_time(&self) -> i64 {
        self.base_time.get().map_or(0, |provider| provider())
    }

    pub fn input_polled(&self) {
        if let Some(notifier) = self.input_poll.get() {
            notifier();
        }
    }

    pub fn sound_ready(&self) {
        if let Some(notifier) = self.sound.get() {
            notifier();
        }
    }

    /// Reports a recovered error on the error channel.
    pub fn report(&self, err: &BridgeError) {
        let line = format!("[emuhost] {err}\n");
        self.log(OutputChannel::Error, line.as_bytes());
    }
}

fn default_log(channel: OutputChannel, payload: &[u8]) {
    let text = String::from_utf8_lossy(payload);
    let text = text.trim_end_matches('\n');
    match channel {
        OutputChannel::Error => tracing::error!(target: "emuhost::guest", "{text}"),
        OutputChannel::Warning => tracing::warn!(target: "emuhost::guest", "{text}"),
        OutputChannel::Info => tracing::info!(target: "emuhost::guest", "{text}"),
        OutputChannel::Debug | OutputChannel::Log => {
            tracing::debug!(target: "emuhost::guest", channel = %channel, "{text}")
        }
        OutputChannel::Verbose => tracing::trace!(target: "emuhost::guest", "{text}"),
    }
}
