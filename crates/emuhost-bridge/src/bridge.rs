use std::sync::Arc;

use emuhost_cothread::{Builder, Cothread, Transfer, Yielder};
use emuhost_engine::{Engine, Machine, OutputChannel, ScriptResult};

use crate::buffers::{BufferHandle, BufferRegistry};
use crate::callbacks::Callbacks;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::guest::{GuestLink, LagFlag};
use crate::marshal::FromScript;
use crate::media::{self, VideoSnapshot};
use crate::persistence::{self, PersistenceReport};

/// Returned by [`Bridge::launch`] when the bridge was launched before.
pub const EXIT_ALREADY_LAUNCHED: i32 = -3;
/// Returned by [`Bridge::launch`] when the guest context could not be created.
pub const EXIT_SPAWN_FAILED: i32 = -4;

/// A steppable engine session owned by the host.
///
/// [`launch`](Self::launch) runs the engine up to its boot yield point, and each
/// [`resume`](Self::resume) advances it by one frame. Between those calls the engine is suspended
/// and the accessors below read from (or run scripts inside) its machine. Accessors never fail:
/// errors are reported on the log sink's error channel and a default value is returned.
pub struct Bridge {
    config: BridgeConfig,
    callbacks: Arc<Callbacks>,
    lag: Arc<LagFlag>,
    buffers: BufferRegistry,
    engine: Option<Box<dyn Engine>>,
    guest: Option<Cothread<dyn Machine>>,
}

impl Bridge {
    pub fn new(engine: impl Engine + 'static) -> Self {
        Self::with_config(engine, BridgeConfig::default())
    }

    pub fn with_config(engine: impl Engine + 'static, config: BridgeConfig) -> Self {
        Self {
            config,
            callbacks: Arc::new(Callbacks::default()),
            lag: Arc::new(LagFlag::default()),
            buffers: BufferRegistry::new(),
            engine: Some(Box::new(engine)),
            guest: None,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn callbacks(&self) -> &Callbacks {
        &self.callbacks
    }

    /// Starts the engine with `args` (including `argv[0]`) and runs it to its first yield.
    ///
    /// Returns `0` once the engine reached its boot yield point, or the non-zero exit code of an
    /// engine that terminated first.
    pub fn launch<I, A>(&mut self, args: I) -> i32
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        let engine = match self.engine.take() {
            Some(engine) => engine,
            None => {
                self.report(&BridgeError::AlreadyLaunched);
                return EXIT_ALREADY_LAUNCHED;
            }
        };
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        tracing::info!(?args, stack_size = self.config.guest_stack_size, "launching guest");

        let callbacks = self.callbacks.clone();
        let lag = self.lag.clone();
        let started = Builder::new()
            .name("emuhost-guest")
            .stack_size(self.config.guest_stack_size)
            .start(move |yielder: &Yielder<dyn Machine>| {
                let mut link = GuestLink {
                    yielder,
                    callbacks,
                    lag,
                };
                engine.run(args, &mut link)
            });

        match started {
            Ok((guest, transfer)) => {
                self.guest = Some(guest);
                match transfer {
                    Transfer::Yielded(_) => 0,
                    Transfer::Terminated { exit_code } => {
                        self.report(&BridgeError::AbnormalTermination(exit_code));
                        exit_code
                    }
                }
            }
            Err(err) => {
                self.report(&err.into());
                EXIT_SPAWN_FAILED
            }
        }
    }

    /// Runs the engine for one frame.
    ///
    /// Returns the lag flag: `true` when the engine did not sample input during the frame. Once
    /// the engine has terminated this returns immediately without progress; check
    /// [`exit_code`](Self::exit_code) to tell that apart from a lagged frame. The frame in which
    /// the engine terminates is reported once on the error channel.
    pub fn resume(&mut self) -> bool {
        let guest = match self.guest.as_mut() {
            Some(guest) => guest,
            None => {
                self.callbacks.report(&BridgeError::NotLaunched);
                return true;
            }
        };

        let was_running = !guest.is_terminated();
        self.lag.arm();
        if let Transfer::Terminated { exit_code } = guest.resume() {
            if was_running {
                self.callbacks.report(&BridgeError::AbnormalTermination(exit_code));
            } else {
                tracing::trace!(exit_code, "resumed a terminated guest");
            }
        }
        self.lag.is_set()
    }

    pub fn is_launched(&self) -> bool {
        self.guest.is_some()
    }

    /// Exit code of the engine, once it has terminated.
    pub fn exit_code(&self) -> Option<i32> {
        self.guest.as_ref().and_then(Cothread::exit_code)
    }

    pub fn set_log_sink(&self, sink: impl Fn(OutputChannel, &[u8]) + Send + Sync + 'static) {
        self.callbacks.set_log_sink(Some(Arc::new(sink)));
    }

    pub fn set_base_time_provider(&self, provider: impl Fn() -> i64 + Send + Sync + 'static) {
        self.callbacks.set_base_time_provider(Some(Arc::new(provider)));
    }

    pub fn set_input_poll_notifier(&self, notifier: impl Fn() + Send + Sync + 'static) {
        self.callbacks.set_input_poll_notifier(Some(Arc::new(notifier)));
    }

    pub fn set_sound_notifier(&self, notifier: impl Fn() + Send + Sync + 'static) {
        self.callbacks.set_sound_notifier(Some(Arc::new(notifier)));
    }

    /// Runs `f` against the suspended engine's machine.
    pub fn with_machine<R, F>(&mut self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut (dyn Machine + 'static)) -> R + Send + 'static,
    {
        let guest = self.guest.as_mut().ok_or(BridgeError::NotLaunched)?;
        Ok(guest.with_guest(f)?)
    }

    pub fn try_run_script(&mut self, code: &str) -> Result<ScriptResult> {
        let chunk_name = self.config.chunk_name.clone();
        let code = code.to_owned();
        let result = self.with_machine(move |machine| {
            machine.script_host().execute(&chunk_name, &code)
        })?;
        Ok(result?)
    }

    pub fn run_script(&mut self, code: &str) -> ScriptResult {
        let result = self.try_run_script(code);
        self.recover(result)
    }

    /// Runs `code` and converts its result, falling back to `T::default()`.
    pub fn get_script<T: FromScript>(&mut self, code: &str) -> T {
        let result = self.try_run_script(code).and_then(T::marshal);
        self.recover(result)
    }

    pub fn get_script_int(&mut self, code: &str) -> i32 {
        self.get_script(code)
    }

    pub fn get_script_long(&mut self, code: &str) -> i64 {
        self.get_script(code)
    }

    pub fn get_script_double(&mut self, code: &str) -> f64 {
        self.get_script(code)
    }

    pub fn get_script_bool(&mut self, code: &str) -> bool {
        self.get_script(code)
    }

    /// Runs `code` and publishes its text result. Empty text publishes nothing.
    pub fn get_script_string(&mut self, code: &str) -> Option<BufferHandle> {
        let bytes: Vec<u8> = self.get_script(code);
        self.buffers.publish(&bytes)
    }

    pub fn buffer(&self, handle: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(handle)
    }

    pub fn release_string(&mut self, handle: BufferHandle) -> bool {
        let result = self.buffers.release(handle);
        self.recover(result.map(|()| true))
    }

    /// Releases the buffer whose first byte is at `address`.
    pub fn release_string_at(&mut self, address: *const u8) -> bool {
        let result = self.buffers.release_address(address);
        self.recover(result.map(|()| true))
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.live_count()
    }

    /// Reads one byte from the main CPU's program space.
    pub fn read_byte(&mut self, address: u32) -> u8 {
        let tag = self.config.main_cpu.clone();
        let result = self
            .with_machine(move |machine| {
                machine
                    .address_space(&tag)
                    .map(|space| space.read_byte(address))
                    .ok_or_else(|| BridgeError::UnknownDevice(tag))
            })
            .and_then(|read| read);
        self.recover(result)
    }

    /// Copies the latest interleaved stereo audio into `out`; returns the sample frames written.
    pub fn get_samples(&mut self, out: &mut [i16]) -> usize {
        let result = self.with_machine(|machine| media::snapshot_samples(machine));
        let samples = self.recover(result);
        media::copy_samples(&samples, out)
    }

    pub fn video_frame(&mut self) -> VideoSnapshot {
        let result = self.with_machine(|machine| media::snapshot_video(machine));
        self.recover(result)
    }

    pub fn video_dimensions(&mut self) -> (u32, u32) {
        let result = self.with_machine(|machine| {
            let frame = machine.video_frame();
            (frame.width, frame.height)
        });
        self.recover(result)
    }

    /// Copies the latest ARGB frame into `out`; returns the pixels written.
    pub fn get_pixels(&mut self, out: &mut [u32]) -> usize {
        let frame = self.video_frame();
        media::copy_pixels(&frame.pixels, out)
    }

    /// Saves every NVRAM device under the configured directory.
    pub fn save_persistent_state(&mut self) -> PersistenceReport {
        let dir = self.config.nvram_dir.clone();
        let result = self.with_machine(move |machine| persistence::save_all(machine, &dir));
        self.finish_persistence(result)
    }

    /// Restores every NVRAM device from the configured directory.
    pub fn load_persistent_state(&mut self) -> PersistenceReport {
        let dir = self.config.nvram_dir.clone();
        let result = self.with_machine(move |machine| persistence::load_all(machine, &dir));
        self.finish_persistence(result)
    }

    pub fn enumerate_persistent_filenames(&mut self, mut f: impl FnMut(&str)) {
        let result = self.with_machine(|machine| persistence::filenames(machine));
        for name in self.recover(result) {
            f(&name);
        }
    }

    fn finish_persistence(&self, result: Result<PersistenceReport>) -> PersistenceReport {
        let report = self.recover(result);
        for err in &report.failed {
            self.report(err);
        }
        report
    }

    fn recover<T: Default>(&self, result: Result<T>) -> T {
        result.unwrap_or_else(|err| {
            self.report(&err);
            T::default()
        })
    }

    fn report(&self, err: &BridgeError) {
        self.callbacks.report(err);
    }
}

#[cfg(test)]
mod tests {
    use emuhost_engine::demo::DemoEngine;

    use super::*;

    #[test]
    fn accessors_before_launch_return_defaults() {
        let mut bridge = Bridge::new(DemoEngine::new());
        bridge.set_log_sink(|_, _| {});

        assert!(bridge.resume());
        assert_eq!(bridge.read_byte(0), 0);
        assert_eq!(bridge.get_script_int("return 1"), 0);
        assert_eq!(bridge.video_dimensions(), (0, 0));
        assert_eq!(bridge.exit_code(), None);
        assert!(matches!(
            bridge.with_machine(|_| ()),
            Err(BridgeError::NotLaunched)
        ));
    }

    #[test]
    fn second_launch_is_rejected() {
        let mut bridge = Bridge::new(DemoEngine::new());
        bridge.set_log_sink(|_, _| {});

        assert_eq!(bridge.launch(["emuhost"]), 0);
        assert_eq!(bridge.launch(["emuhost"]), EXIT_ALREADY_LAUNCHED);
        assert!(!bridge.resume());
    }
}
