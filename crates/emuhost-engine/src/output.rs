use std::fmt;
use std::sync::Arc;

/// Diagnostic channel of a guest output line.
///
/// The numeric values are part of the C ABI (`emuhost_set_log_callback`).
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputChannel {
    Error = 0,
    Warning = 1,
    Info = 2,
    Debug = 3,
    Verbose = 4,
    Log = 5,
}

impl OutputChannel {
    pub const ALL: [OutputChannel; 6] = [
        OutputChannel::Error,
        OutputChannel::Warning,
        OutputChannel::Info,
        OutputChannel::Debug,
        OutputChannel::Verbose,
        OutputChannel::Log,
    ];

    pub fn as_raw(self) -> i32 {
        self as i32
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|channel| channel.as_raw() == raw)
    }

    pub fn name(self) -> &'static str {
        match self {
            OutputChannel::Error => "error",
            OutputChannel::Warning => "warning",
            OutputChannel::Info => "info",
            OutputChannel::Debug => "debug",
            OutputChannel::Verbose => "verbose",
            OutputChannel::Log => "log",
        }
    }
}

impl fmt::Display for OutputChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

type OutputFn = dyn Fn(OutputChannel, &[u8]) + Send + Sync;

/// Cloneable handle the engine uses to emit diagnostic output.
///
/// Payloads are raw bytes and may contain embedded zero bytes.
#[derive(Clone)]
pub struct OutputSink(Arc<OutputFn>);

impl OutputSink {
    pub fn new(f: impl Fn(OutputChannel, &[u8]) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// A sink that discards everything.
    pub fn discard() -> Self {
        Self::new(|_, _| {})
    }

    pub fn write(&self, channel: OutputChannel, payload: &[u8]) {
        (self.0)(channel, payload)
    }

    pub fn error(&self, message: &str) {
        self.write(OutputChannel::Error, message.as_bytes())
    }

    pub fn info(&self, message: &str) {
        self.write(OutputChannel::Info, message.as_bytes())
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSink").finish_non_exhaustive()
    }
}
