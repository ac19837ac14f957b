use bitflags::bitflags;

bitflags! {
    /// Launch policy for new futures and continuations.
    ///
    /// The two bits are independent and may both be set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
    pub struct Policy: u8 {
        /// Force queued execution.
        ///
        /// The body is submitted through [`Executor::schedule_forced`], so
        /// the executor must not run it inline on the scheduling thread.
        ///
        /// [`Executor::schedule_forced`]: crate::Executor::schedule_forced
        const ASYNC = 1;

        /// Permit inline stealing.
        ///
        /// A thread that waits on the future while the body has not started
        /// may run the body directly instead of blocking.
        const DEFERRED = 1 << 1;
    }
}

/// Outcome of a timed wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// The future completed within the allotted time.
    Ready,
    /// The wait gave up first. The future is unaffected and remains usable.
    Timeout,
}

impl WaitStatus {
    pub fn is_ready(self) -> bool {
        matches!(self, WaitStatus::Ready)
    }
}
