//! The reference-counted cell behind every future handle.
//!
//! A cell fuses four concerns into one allocation: the NotStarted ->
//! Running -> Ready state machine, a lock-free LIFO chain of continuation
//! nodes, a manually counted lifetime over size-class storage, and the
//! hand-off of its body to executor collaborators.
//!
//! `Header` is the first field of the concrete `FutureCell<F, T>`, so a
//! `NonNull<Header>` is a thin untyped handle to the whole cell; typed
//! operations are reached through the cell vtable.

mod chain;
mod failure;
mod harness;
mod header;
mod layout;
mod raw;
mod status;

pub use self::failure::BodyPanic;

pub(crate) use self::layout::{new_cell, new_ready_cell};
pub(crate) use self::raw::RawFuture;

#[cfg(test)]
mod tests;
