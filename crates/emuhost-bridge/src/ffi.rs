//! C ABI over [`Bridge`].
//!
//! A host creates an opaque context, launches it, then alternates between `emuhost_resume` and
//! the accessors. Every entry point accepts a null context (doing nothing and returning the
//! default) and catches panics so none cross into the host.
//!
//! Text returned by `emuhost_get_script_string` is *not* NUL-terminated: use the reported length,
//! and hand the pointer back to `emuhost_release_string` exactly once.
//!
//! # Threads
//!
//! The engine runs on its own guest thread, and control alternates strictly: while an entry point
//! is running the calling thread is blocked until the guest hands control back. Callbacks invoked
//! by the engine (log, base time, input poll and sound) therefore run on the guest thread, never
//! concurrently with the host, but thread-local state of the host thread is not visible to them.
//!
//! # Engines
//!
//! `emuhost_demo_create` builds a context around the reference engine shipped in
//! `emuhost_engine::demo` and is only compiled with the `demo` feature (on by default). Crates
//! embedding their own engine build a [`Bridge`] and hand it out with
//! [`EmuhostContext::into_raw`].

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::slice;
use std::sync::Arc;

#[cfg(feature = "demo")]
use emuhost_engine::demo::DemoEngine;
use emuhost_engine::OutputChannel;

use crate::bridge::{Bridge, EXIT_SPAWN_FAILED};
use crate::callbacks::{BaseTimeProvider, LogSink, Notifier};
#[cfg(feature = "demo")]
use crate::config::BridgeConfig;

pub type LogCallback = extern "C" fn(channel: c_int, length: usize, payload: *const c_char);
pub type BaseTimeCallback = extern "C" fn() -> i64;
pub type NotifyCallback = extern "C" fn();
pub type FilenameCallback = extern "C" fn(name: *const c_char);

/// Opaque session handle.
pub struct EmuhostContext {
    bridge: Bridge,
}

impl EmuhostContext {
    pub fn new(bridge: Bridge) -> Self {
        Self { bridge }
    }

    /// Moves the context to the heap for a C host.
    pub fn into_raw(self) -> *mut EmuhostContext {
        Box::into_raw(Box::new(self))
    }
}

fn guard<R>(default: R, f: impl FnOnce() -> R) -> R {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        tracing::error!("panic caught at the C boundary");
        default
    })
}

unsafe fn text<'a>(code: *const c_char) -> Option<std::borrow::Cow<'a, str>> {
    if code.is_null() {
        return None;
    }
    Some(CStr::from_ptr(code).to_string_lossy())
}

/// Creates a context running the reference demo engine, configured from the environment.
///
/// Returns null when the environment holds an invalid configuration.
#[cfg(feature = "demo")]
#[no_mangle]
pub extern "C" fn emuhost_demo_create() -> *mut EmuhostContext {
    guard(ptr::null_mut(), || match BridgeConfig::from_env() {
        Ok(config) => {
            EmuhostContext::new(Bridge::with_config(DemoEngine::new(), config)).into_raw()
        }
        Err(err) => {
            tracing::error!(error = %err, "invalid emuhost configuration");
            ptr::null_mut()
        }
    })
}

/// Destroys a context, tearing down a suspended engine.
#[no_mangle]
pub unsafe extern "C" fn emuhost_destroy(ctx: *mut EmuhostContext) {
    if ctx.is_null() {
        return;
    }
    guard((), || drop(Box::from_raw(ctx)));
}

/// Launches the engine with `argc` arguments (including `argv[0]`).
#[no_mangle]
pub unsafe extern "C" fn emuhost_launch(
    ctx: *mut EmuhostContext,
    argc: c_int,
    argv: *const *const c_char,
) -> c_int {
    if ctx.is_null() {
        return EXIT_SPAWN_FAILED;
    }
    let ctx = &mut *ctx;
    guard(EXIT_SPAWN_FAILED, || {
        let mut args = Vec::new();
        if !argv.is_null() {
            for i in 0..usize::try_from(argc).unwrap_or(0) {
                if let Some(arg) = text(*argv.add(i)) {
                    args.push(arg.into_owned());
                }
            }
        }
        ctx.bridge.launch(args)
    })
}

/// Runs one frame. Returns `true` when no input was sampled.
#[no_mangle]
pub unsafe extern "C" fn emuhost_resume(ctx: *mut EmuhostContext) -> bool {
    if ctx.is_null() {
        return true;
    }
    let ctx = &mut *ctx;
    guard(true, || ctx.bridge.resume())
}

/// Exit code of a terminated engine, or `0` while it is still running (or not yet launched).
///
/// A resume after termination also returns `true`, so hosts check this to tell a dead engine
/// from a lagged frame.
#[no_mangle]
pub unsafe extern "C" fn emuhost_exit_code(ctx: *const EmuhostContext) -> c_int {
    if ctx.is_null() {
        return 0;
    }
    let ctx = &*ctx;
    guard(0, || ctx.bridge.exit_code().unwrap_or(0))
}

#[no_mangle]
pub unsafe extern "C" fn emuhost_set_log_callback(
    ctx: *mut EmuhostContext,
    callback: Option<LogCallback>,
) {
    if ctx.is_null() {
        return;
    }
    let callbacks = (*ctx).bridge.callbacks();
    callbacks.set_log_sink(callback.map(|cb| {
        Arc::new(move |channel: OutputChannel, payload: &[u8]| {
            cb(channel.as_raw(), payload.len(), payload.as_ptr().cast())
        }) as Arc<LogSink>
    }));
}

#[no_mangle]
pub unsafe extern "C" fn emuhost_set_base_time_callback(
    ctx: *mut EmuhostContext,
    callback: Option<BaseTimeCallback>,
) {
    if ctx.is_null() {
        return;
    }
    let callbacks = (*ctx).bridge.callbacks();
    callbacks.set_base_time_provider(
        callback.map(|cb| Arc::new(move || cb()) as Arc<BaseTimeProvider>),
    );
}

#[no_mangle]
pub unsafe extern "C" fn emuhost_set_input_poll_callback(
    ctx: *mut EmuhostContext,
    callback: Option<NotifyCallback>,
) {
    if ctx.is_null() {
        return;
    }
    let callbacks = (*ctx).bridge.callbacks();
    callbacks.set_input_poll_notifier(callback.map(|cb| Arc::new(move || cb()) as Arc<Notifier>));
}

#[no_mangle]
pub unsafe extern "C" fn emuhost_set_sound_callback(
    ctx: *mut EmuhostContext,
    callback: Option<NotifyCallback>,
) {
    if ctx.is_null() {
        return;
    }
    let callbacks = (*ctx).bridge.callbacks();
    callbacks.set_sound_notifier(callback.map(|cb| Arc::new(move || cb()) as Arc<Notifier>));
}

#[no_mangle]
pub unsafe extern "C" fn emuhost_run_script(ctx: *mut EmuhostContext, code: *const c_char) {
    let (Some(ctx), Some(code)) = (ctx.as_mut(), text(code)) else {
        return;
    };
    guard((), || {
        ctx.bridge.run_script(&code);
    })
}

#[no_mangle]
pub unsafe extern "C" fn emuhost_get_script_int(
    ctx: *mut EmuhostContext,
    code: *const c_char,
) -> c_int {
    let (Some(ctx), Some(code)) = (ctx.as_mut(), text(code)) else {
        return 0;
    };
    guard(0, || ctx.bridge.get_script_int(&code))
}

#[no_mangle]
pub unsafe extern "C" fn emuhost_get_script_long(
    ctx: *mut EmuhostContext,
    code: *const c_char,
) -> i64 {
    let (Some(ctx), Some(code)) = (ctx.as_mut(), text(code)) else {
        return 0;
    };
    guard(0, || ctx.bridge.get_script_long(&code))
}

#[no_mangle]
pub unsafe extern "C" fn emuhost_get_script_double(
    ctx: *mut EmuhostContext,
    code: *const c_char,
) -> f64 {
    let (Some(ctx), Some(code)) = (ctx.as_mut(), text(code)) else {
        return 0.0;
    };
    guard(0.0, || ctx.bridge.get_script_double(&code))
}

#[no_mangle]
pub unsafe extern "C" fn emuhost_get_script_bool(
    ctx: *mut EmuhostContext,
    code: *const c_char,
) -> bool {
    let (Some(ctx), Some(code)) = (ctx.as_mut(), text(code)) else {
        return false;
    };
    guard(false, || ctx.bridge.get_script_bool(&code))
}

/// Runs `code` and returns its text result, storing the byte length in `out_length`.
///
/// Returns null (length 0) for empty text or on error.
#[no_mangle]
pub unsafe extern "C" fn emuhost_get_script_string(
    ctx: *mut EmuhostContext,
    code: *const c_char,
    out_length: *mut usize,
) -> *const c_char {
    if !out_length.is_null() {
        *out_length = 0;
    }
    let (Some(ctx), Some(code)) = (ctx.as_mut(), text(code)) else {
        return ptr::null();
    };
    guard(ptr::null(), || {
        let Some(handle) = ctx.bridge.get_script_string(&code) else {
            return ptr::null();
        };
        let Some(bytes) = ctx.bridge.buffer(handle) else {
            return ptr::null();
        };
        if !out_length.is_null() {
            *out_length = bytes.len();
        }
        bytes.as_ptr().cast()
    })
}

/// Releases a string returned by `emuhost_get_script_string`. Returns `false` if `buffer` is not
/// a live string.
#[no_mangle]
pub unsafe extern "C" fn emuhost_release_string(
    ctx: *mut EmuhostContext,
    buffer: *const c_char,
) -> bool {
    if ctx.is_null() {
        return false;
    }
    let ctx = &mut *ctx;
    guard(false, || ctx.bridge.release_string_at(buffer.cast()))
}

#[no_mangle]
pub unsafe extern "C" fn emuhost_read_byte(ctx: *mut EmuhostContext, address: u32) -> u8 {
    if ctx.is_null() {
        return 0;
    }
    let ctx = &mut *ctx;
    guard(0, || ctx.bridge.read_byte(address))
}

/// Copies interleaved stereo samples into `buffer` (room for `capacity` `int16_t` values).
/// Returns the number of sample frames written.
#[no_mangle]
pub unsafe extern "C" fn emuhost_get_samples(
    ctx: *mut EmuhostContext,
    buffer: *mut i16,
    capacity: usize,
) -> usize {
    if ctx.is_null() || buffer.is_null() {
        return 0;
    }
    let ctx = &mut *ctx;
    let out = slice::from_raw_parts_mut(buffer, capacity);
    guard(0, || ctx.bridge.get_samples(out))
}

#[no_mangle]
pub unsafe extern "C" fn emuhost_get_video_dimensions(
    ctx: *mut EmuhostContext,
    width: *mut c_int,
    height: *mut c_int,
) {
    let (w, h) = match ctx.as_mut() {
        Some(ctx) => guard((0, 0), || ctx.bridge.video_dimensions()),
        None => (0, 0),
    };
    if !width.is_null() {
        *width = c_int::try_from(w).unwrap_or(c_int::MAX);
    }
    if !height.is_null() {
        *height = c_int::try_from(h).unwrap_or(c_int::MAX);
    }
}

/// Copies ARGB pixels into `buffer` (room for `capacity` values). Returns the pixels written.
#[no_mangle]
pub unsafe extern "C" fn emuhost_get_pixels(
    ctx: *mut EmuhostContext,
    buffer: *mut u32,
    capacity: usize,
) -> usize {
    if ctx.is_null() || buffer.is_null() {
        return 0;
    }
    let ctx = &mut *ctx;
    let out = slice::from_raw_parts_mut(buffer, capacity);
    guard(0, || ctx.bridge.get_pixels(out))
}

/// Saves all NVRAM. Returns the number of devices that failed.
#[no_mangle]
pub unsafe extern "C" fn emuhost_save_nvram(ctx: *mut EmuhostContext) -> c_int {
    if ctx.is_null() {
        return 0;
    }
    let ctx = &mut *ctx;
    guard(0, || ctx.bridge.save_persistent_state().failed.len() as c_int)
}

/// Loads all NVRAM. Returns the number of devices that failed.
#[no_mangle]
pub unsafe extern "C" fn emuhost_load_nvram(ctx: *mut EmuhostContext) -> c_int {
    if ctx.is_null() {
        return 0;
    }
    let ctx = &mut *ctx;
    guard(0, || ctx.bridge.load_persistent_state().failed.len() as c_int)
}

#[no_mangle]
pub unsafe extern "C" fn emuhost_enumerate_nvram_filenames(
    ctx: *mut EmuhostContext,
    callback: Option<FilenameCallback>,
) {
    let (Some(ctx), Some(callback)) = (ctx.as_mut(), callback) else {
        return;
    };
    guard((), || {
        ctx.bridge.enumerate_persistent_filenames(|name| match CString::new(name) {
            Ok(name) => callback(name.as_ptr()),
            Err(_) => tracing::warn!(name, "skipping nvram filename with an embedded NUL"),
        })
    })
}
