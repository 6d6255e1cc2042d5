//! Fault values and panic-site capture.
//!
//! Unwinding destroys the frames that caused a panic before `catch_unwind`
//! returns, so the location and (in debug mode) the backtrace are recorded by
//! a process-wide panic hook into thread-local storage while a boundary is
//! armed on the current thread. Panics on unarmed threads fall through to the
//! previously installed hook untouched.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic;
use std::sync::Once;

use thiserror::Error;

/// An uncaught handler fault, recovered at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct Fault {
    pub message: String,
    pub location: Option<String>,
    pub trace: Option<String>,
}

impl Fault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
            trace: None,
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>, site: Option<PanicSite>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };

        let site = site.unwrap_or_default();
        Self {
            message,
            location: site.location,
            trace: site.trace,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct PanicSite {
    location: Option<String>,
    trace: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    Off,
    Location,
    WithTrace,
}

thread_local! {
    static CAPTURE: Cell<Capture> = const { Cell::new(Capture::Off) };
    static LAST_SITE: RefCell<Option<PanicSite>> = const { RefCell::new(None) };
}

static INSTALL: Once = Once::new();

fn install_hook() {
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let mode = CAPTURE.with(Cell::get);
            if mode == Capture::Off {
                previous(info);
                return;
            }
            let site = PanicSite {
                location: info.location().map(|l| l.to_string()),
                trace: (mode == Capture::WithTrace)
                    .then(|| Backtrace::force_capture().to_string()),
            };
            LAST_SITE.with(|slot| *slot.borrow_mut() = Some(site));
        }));
    });
}

/// Arms panic-site capture on this thread until dropped.
pub(crate) struct CaptureGuard {
    previous: Capture,
}

impl CaptureGuard {
    pub(crate) fn arm(with_trace: bool) -> Self {
        install_hook();
        let mode = if with_trace {
            Capture::WithTrace
        } else {
            Capture::Location
        };
        let previous = CAPTURE.with(|c| c.replace(mode));
        LAST_SITE.with(|slot| slot.borrow_mut().take());
        Self { previous }
    }

    pub(crate) fn take_site(&self) -> Option<PanicSite> {
        LAST_SITE.with(|slot| slot.borrow_mut().take())
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        CAPTURE.with(|c| c.set(self.previous));
    }
}

/// Backtrace of the caller, rendered for an error entry.
pub(crate) fn capture_trace() -> String {
    Backtrace::force_capture().to_string()
}
