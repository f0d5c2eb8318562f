//! HTTP control API
//!
//! Stands in for the presentation layer: every endpoint maps onto a
//! controller entry point or a sync session operation.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{create_router, run, AppContext};
