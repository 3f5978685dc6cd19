pub mod api;
pub mod cache;
pub mod error;
pub mod initiator;
pub mod pending;
pub mod reconcile;
pub mod session;

#[cfg(test)]
pub(crate) mod testutil;
