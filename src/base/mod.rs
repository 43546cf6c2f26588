//! Base types and error handling.
//!
//! - [`NetError`]: the crate-wide error taxonomy
//! - [`CallContext`]: cancellation and deadline carrier for a single call
//!
//! [`NetError`]: neterror::NetError
//! [`CallContext`]: callcontext::CallContext

pub mod callcontext;
pub mod neterror;

#[cfg(test)]
mod tests;
