//! Cooperative host/guest execution contexts.
//!
//! A [`Cothread`] runs a guest entry point on its own, generously sized stack and hands control
//! back and forth with the host in strict alternation: exactly one side executes at any instant.
//! The guest gives control back by calling [`Yielder::suspend`] at its yield points; the host
//! gives it back with [`Cothread::resume`].
//!
//! While the guest is suspended the host can run closures against the guest's state with
//! [`Cothread::with_guest`]. The closure executes inside the guest context (the guest state
//! never leaves its stack), but the guest itself makes no progress until the next resume.
//!
//! # Termination
//!
//! The guest entry point is not expected to return. If it does (or panics), the context falls
//! into a *zombie loop*: every later resume yields straight back with the captured exit code and
//! host calls fail with [`CothreadError::Terminated`]. Control never falls off the end of the
//! guest context.

mod error;
mod yielder;

pub use crate::error::{CothreadError, Result};
pub use crate::yielder::Yielder;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use crate::yielder::{Detached, HostCall, ToGuest, ToHost};

/// Default guest stack size.
pub const DEFAULT_STACK_SIZE: usize = 8 * 1024 * 1024;

/// Exit code reported when the guest entry point returned `0`.
///
/// Any return is abnormal while the guest is driven externally, so a zero code is remapped to
/// keep "non-zero means stop resuming" true for the host.
pub const EXIT_RETURNED_ZERO: i32 = -1;

/// Exit code reported when the guest entry point panicked.
pub const EXIT_GUEST_PANICKED: i32 = -2;

/// Where the guest suspended itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum YieldPoint {
    /// Initialization finished; no emulated time has passed yet.
    Boot,
    /// One unit of emulated progress completed.
    Frame,
}

/// Outcome of a control transfer into the guest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transfer {
    Yielded(YieldPoint),
    /// The guest entry point returned; the context is in its zombie loop.
    Terminated { exit_code: i32 },
}

impl Transfer {
    pub fn exit_code(self) -> Option<i32> {
        match self {
            Transfer::Yielded(_) => None,
            Transfer::Terminated { exit_code } => Some(exit_code),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Suspended,
    Zombie { exit_code: i32 },
}

/// Configuration for a guest context, in the style of [`std::thread::Builder`].
#[derive(Clone, Debug)]
pub struct Builder {
    name: String,
    stack_size: usize,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            name: "guest".to_string(),
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    /// Creates the guest context and transfers control into `entry`.
    ///
    /// Returns once the guest first yields or terminates.
    pub fn start<S, F>(self, entry: F) -> Result<(Cothread<S>, Transfer)>
    where
        S: ?Sized + 'static,
        F: FnOnce(&Yielder<S>) -> i32 + Send + 'static,
    {
        let (to_guest, guest_rx) = mpsc::channel::<ToGuest<S>>();
        let (guest_tx, from_guest) = mpsc::channel::<ToHost>();

        let thread = thread::Builder::new()
            .name(self.name)
            .stack_size(self.stack_size)
            .spawn(move || guest_main(entry, Yielder::new(guest_tx, guest_rx)))?;

        let mut cothread = Cothread {
            to_guest,
            from_guest,
            thread: Some(thread),
            state: State::Suspended,
        };
        let transfer = cothread.wait_transfer();
        Ok((cothread, transfer))
    }
}

fn guest_main<S, F>(entry: F, yielder: Yielder<S>)
where
    S: ?Sized,
    F: FnOnce(&Yielder<S>) -> i32,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| entry(&yielder)));
    let exit_code = match outcome {
        Ok(0) => EXIT_RETURNED_ZERO,
        Ok(code) => code,
        Err(payload) if payload.is::<Detached>() => return,
        Err(payload) => {
            tracing::error!(panic = %panic_message(&*payload), "guest entry point panicked");
            EXIT_GUEST_PANICKED
        }
    };

    tracing::warn!(exit_code, "guest entry point returned; entering zombie loop");
    yielder.zombie(exit_code);
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "<non-string panic payload>"
    }
}

/// Host-side handle to a guest context.
pub struct Cothread<S: ?Sized + 'static> {
    to_guest: Sender<ToGuest<S>>,
    from_guest: Receiver<ToHost>,
    thread: Option<JoinHandle<()>>,
    state: State,
}

impl<S: ?Sized + 'static> Cothread<S> {
    /// Starts a guest context with the default [`Builder`] settings.
    pub fn start<F>(entry: F) -> Result<(Self, Transfer)>
    where
        F: FnOnce(&Yielder<S>) -> i32 + Send + 'static,
    {
        Builder::new().start(entry)
    }

    /// Transfers control to the guest until its next yield.
    ///
    /// Once terminated, this is a cheap no-op that reports the captured exit code again.
    pub fn resume(&mut self) -> Transfer {
        if self.to_guest.send(ToGuest::Resume).is_err() {
            return self.lose();
        }
        self.wait_transfer()
    }

    /// Runs `f` against the suspended guest state and returns its result.
    pub fn with_guest<R, F>(&mut self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> R + Send + 'static,
    {
        let (result_tx, result_rx) = mpsc::channel();
        let call: HostCall<S> = Box::new(move |state: Option<&mut S>| {
            if let Some(state) = state {
                let _ = result_tx.send(f(state));
            }
        });

        if self.to_guest.send(ToGuest::Call(call)).is_err() {
            self.lose();
            return Err(CothreadError::Lost);
        }

        match self.from_guest.recv() {
            Ok(ToHost::CallDone) => {}
            Ok(other) => {
                tracing::error!(?other, "guest broke the hand-off protocol during a host call");
                self.lose();
                return Err(CothreadError::Lost);
            }
            Err(_) => {
                self.lose();
                return Err(CothreadError::Lost);
            }
        }

        match (result_rx.try_recv(), self.state) {
            (Ok(value), _) => Ok(value),
            (Err(_), State::Zombie { exit_code }) => Err(CothreadError::Terminated { exit_code }),
            (Err(_), State::Suspended) => Err(CothreadError::CallPanicked),
        }
    }

    /// The captured exit code, once the guest entry point has returned.
    pub fn exit_code(&self) -> Option<i32> {
        match self.state {
            State::Suspended => None,
            State::Zombie { exit_code } => Some(exit_code),
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.exit_code().is_some()
    }

    fn wait_transfer(&mut self) -> Transfer {
        match self.from_guest.recv() {
            Ok(ToHost::Yielded(point)) => Transfer::Yielded(point),
            Ok(ToHost::Terminated(exit_code)) => {
                self.state = State::Zombie { exit_code };
                Transfer::Terminated { exit_code }
            }
            Ok(ToHost::CallDone) => {
                tracing::error!("guest reported a host call while none was pending");
                self.lose()
            }
            Err(_) => self.lose(),
        }
    }

    /// Records a guest that vanished without reporting termination.
    fn lose(&mut self) -> Transfer {
        let exit_code = match self.state {
            State::Zombie { exit_code } => exit_code,
            State::Suspended => EXIT_GUEST_PANICKED,
        };
        self.state = State::Zombie { exit_code };
        Transfer::Terminated { exit_code }
    }
}

impl<S: ?Sized + 'static> Drop for Cothread<S> {
    fn drop(&mut self) {
        // Disconnecting makes a suspended guest unwind out of its yield point and a zombie leave
        // its loop; either way the thread finishes and can be joined.
        let (disconnected, _) = mpsc::channel();
        drop(std::mem::replace(&mut self.to_guest, disconnected));

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("guest context panicked while shutting down");
            }
        }
    }
}
