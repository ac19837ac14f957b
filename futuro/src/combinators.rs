//! Futures made from other futures.

use crate::cell;
use crate::executor::{ImmediateInvoker, InterceptionInvoker};
use crate::future::Future;
use crate::job::Job;
use crate::policy::Policy;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A future that is already settled with `value`. Nothing is scheduled;
/// `ready` reports true immediately.
pub fn make_ready_future<T: Send + 'static>(value: T) -> Future<T> {
    Future::from_raw(cell::new_ready_cell(value))
}

/// Shared bookkeeping for an in-flight `when_all`: the moved-in inputs, a
/// countdown of not-yet-settled ones, and the captured completion job the
/// last settling input fires.
struct WhenAllState<C> {
    inputs: Mutex<Option<C>>,
    remaining: AtomicUsize,
    completion: Mutex<Option<Job>>,
}

impl<C> WhenAllState<C> {
    fn new(inputs: C, remaining: usize) -> Arc<WhenAllState<C>> {
        Arc::new(WhenAllState {
            inputs: Mutex::new(Some(inputs)),
            remaining: AtomicUsize::new(remaining),
            completion: Mutex::new(None),
        })
    }

    fn take_inputs(&self) -> C {
        self.inputs.lock().take().expect("aggregate body runs once")
    }

    fn countdown(&self) {
        if self.remaining.fetch_sub(1, Ordering::Relaxed) == 1 {
            let job = self.completion.lock().take().expect("completion captured");
            job.run();
        }
    }
}

/// A future that settles once every input has, carrying the inputs
/// themselves as its value.
///
/// Inputs keep their own outcomes: a failed input stays failed, and the
/// aggregate future itself never fails. An empty input set yields an
/// already-ready future with an empty vector.
pub fn when_all<T, I>(futures: I) -> Future<Vec<Future<T>>>
where
    T: Send + 'static,
    I: IntoIterator<Item = Future<T>>,
{
    let inputs: Vec<Future<T>> = futures.into_iter().collect();
    if inputs.is_empty() {
        return make_ready_future(Vec::new());
    }

    let observers: Vec<Future<T>> = inputs.to_vec();
    let state = WhenAllState::new(inputs, observers.len());

    let body = {
        let state = Arc::clone(&state);
        move || {
            let inputs = state.take_inputs();
            for input in &inputs {
                if state.remaining.load(Ordering::Relaxed) == 0 {
                    break;
                }
                input.wait();
            }
            inputs
        }
    };

    // Intercept the scheduling step; the last settling input fires it.
    let interceptor = InterceptionInvoker::new();
    let aggregate = Future::spawn(body, &interceptor, Policy::empty());
    *state.completion.lock() = interceptor.take();

    for observer in observers {
        let state = Arc::clone(&state);
        observer.then(
            move |_settled| state.countdown(),
            &ImmediateInvoker,
            Policy::empty(),
        );
    }

    aggregate
}

/// Like [`when_all`], over a heterogeneous tuple of handles. The value is
/// the tuple of the handles themselves. The empty tuple yields an
/// already-ready future.
pub fn when_all_tuple<C: FutureTuple>(futures: C) -> Future<C> {
    if C::LEN == 0 {
        return make_ready_future(futures);
    }

    let observers = futures.clone_handles();
    let state = WhenAllState::new(futures, C::LEN);

    let body = {
        let state = Arc::clone(&state);
        move || {
            let inputs = state.take_inputs();
            // Every input has settled by the time the completion fires;
            // the waits return immediately and order the reads.
            inputs.wait_all();
            inputs
        }
    };

    let interceptor = InterceptionInvoker::new();
    let aggregate = Future::spawn(body, &interceptor, Policy::empty());
    *state.completion.lock() = interceptor.take();

    observers.attach_countdown(&mut || {
        let state = Arc::clone(&state);
        Box::new(move || state.countdown())
    });

    aggregate
}

mod sealed {
    pub trait Sealed {}
}

/// Tuples of future handles joinable with [`when_all_tuple`].
/// Implemented for arities 0 through 8.
pub trait FutureTuple: sealed::Sealed + Sized + Send + 'static {
    const LEN: usize;

    #[doc(hidden)]
    fn clone_handles(&self) -> Self;

    #[doc(hidden)]
    fn wait_all(&self);

    /// Attaches one settled-input notification, minted by `make`, to each
    /// handle in the tuple.
    #[doc(hidden)]
    fn attach_countdown(self, make: &mut dyn FnMut() -> Box<dyn FnOnce() + Send + 'static>);
}

macro_rules! impl_future_tuple {
    ($len:literal $(, $t:ident . $idx:tt)*) => {
        impl<$($t: Send + 'static),*> sealed::Sealed for ($(Future<$t>,)*) {}

        impl<$($t: Send + 'static),*> FutureTuple for ($(Future<$t>,)*) {
            const LEN: usize = $len;

            fn clone_handles(&self) -> Self {
                ($(self.$idx.clone(),)*)
            }

            fn wait_all(&self) {
                $(self.$idx.wait();)*
            }

            fn attach_countdown(
                self,
                _make: &mut dyn FnMut() -> Box<dyn FnOnce() + Send + 'static>,
            ) {
                $(
                    let settled = _make();
                    self.$idx.then(
                        move |_| settled(),
                        &ImmediateInvoker,
                        Policy::empty(),
                    );
                )*
            }
        }
    };
}

impl_future_tuple!(0);
impl_future_tuple!(1, A.0);
impl_future_tuple!(2, A.0, B.1);
impl_future_tuple!(3, A.0, B.1, C.2);
impl_future_tuple!(4, A.0, B.1, C.2, D.3);
impl_future_tuple!(5, A.0, B.1, C.2, D.3, E.4);
impl_future_tuple!(6, A.0, B.1, C.2, D.3, E.4, F.5);
impl_future_tuple!(7, A.0, B.1, C.2, D.3, E.4, F.5, G.6);
impl_future_tuple!(8, A.0, B.1, C.2, D.3, E.4, F.5, G.6, H.7);
