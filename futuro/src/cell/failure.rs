use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::panic;
use std::sync::Arc;

/// The payload of a panic that escaped a future body.
///
/// Reading a failed future re-raises the panic with a `BodyPanic` payload.
/// Every reader observes a handle to the same original payload, however
/// many times the failure is resurfaced.
#[derive(Clone)]
pub struct BodyPanic {
    payload: Arc<Mutex<Box<dyn Any + Send>>>,
}

impl BodyPanic {
    /// The panic message, when the original payload was a string.
    pub fn message(&self) -> Option<String> {
        let payload = self.payload.lock();
        if let Some(s) = payload.downcast_ref::<&'static str>() {
            Some((*s).to_string())
        } else {
            payload.downcast_ref::<String>().cloned()
        }
    }
}

impl fmt::Debug for BodyPanic {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(msg) => write!(fmt, "BodyPanic({msg:?})"),
            None => write!(fmt, "BodyPanic(..)"),
        }
    }
}

/// A captured failure parked in a cell until somebody reads the result.
pub(super) struct Failure {
    panic: BodyPanic,
}

impl Failure {
    pub(super) fn new(payload: Box<dyn Any + Send>) -> Failure {
        // A body that read a failed upstream future re-raises a BodyPanic;
        // unwrap it so the original payload travels the whole chain.
        let panic = match payload.downcast::<BodyPanic>() {
            Ok(prior) => *prior,
            Err(payload) => BodyPanic {
                payload: Arc::new(Mutex::new(payload)),
            },
        };
        Failure { panic }
    }

    pub(super) fn resurface(&self) -> ! {
        panic::panic_any(self.panic.clone())
    }
}
