//! Guest side of the hand-off protocol.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{Receiver, Sender};

use crate::YieldPoint;

/// Work shipped from the host to run against the suspended guest state.
///
/// `None` is passed once the guest entry point has returned and no state is reachable anymore.
pub(crate) type HostCall<S> = Box<dyn FnOnce(Option<&mut S>) + Send>;

pub(crate) enum ToGuest<S: ?Sized> {
    Resume,
    Call(HostCall<S>),
}

#[derive(Debug)]
pub(crate) enum ToHost {
    Yielded(YieldPoint),
    Terminated(i32),
    CallDone,
}

/// Panic payload used to unwind a suspended guest whose host went away.
pub(crate) struct Detached;

fn detach() -> ! {
    // `resume_unwind` skips the panic hook, so tearing down a suspended guest stays quiet.
    panic::resume_unwind(Box::new(Detached))
}

/// Handle given to the guest entry point for suspending back to the host.
pub struct Yielder<S: ?Sized> {
    to_host: Sender<ToHost>,
    from_host: Receiver<ToGuest<S>>,
}

impl<S: ?Sized> Yielder<S> {
    pub(crate) fn new(to_host: Sender<ToHost>, from_host: Receiver<ToGuest<S>>) -> Self {
        Self { to_host, from_host }
    }

    /// Transfers control back to the host and blocks until the host resumes the guest.
    ///
    /// While suspended, host calls are served against `state`; no other guest code runs until
    /// this returns. If the host side is dropped, the guest stack unwinds from here.
    pub fn suspend(&self, point: YieldPoint, state: &mut S) {
        if self.to_host.send(ToHost::Yielded(point)).is_err() {
            detach();
        }

        loop {
            match self.from_host.recv() {
                Ok(ToGuest::Resume) => return,
                Ok(ToGuest::Call(call)) => {
                    // A panicking call drops its result channel; the host sees a failed call.
                    let _ = panic::catch_unwind(AssertUnwindSafe(|| call(Some(&mut *state))));
                    if self.to_host.send(ToHost::CallDone).is_err() {
                        detach();
                    }
                }
                Err(_) => detach(),
            }
        }
    }

    /// Terminal state after the entry point returned: every resume yields straight back with
    /// the captured exit code and host calls see no state. Returns once the host disconnects.
    pub(crate) fn zombie(self, exit_code: i32) {
        if self.to_host.send(ToHost::Terminated(exit_code)).is_err() {
            return;
        }

        while let Ok(msg) = self.from_host.recv() {
            let reply = match msg {
                ToGuest::Resume => ToHost::Terminated(exit_code),
                ToGuest::Call(call) => {
                    let _ = panic::catch_unwind(AssertUnwindSafe(|| call(None)));
                    ToHost::CallDone
                }
            };
            if self.to_host.send(reply).is_err() {
                return;
            }
        }
    }
}
