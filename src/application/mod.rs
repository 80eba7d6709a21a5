//! Application layer orchestrating the post-payment session pipeline.
//!
//! `CheckoutEngine` is the context object: it wires the provider adapters, the
//! two-tier `SessionStore` and the `RoutingGuard`, and reports lifecycle
//! events to an activity notifier.

pub mod engine;
pub mod guard;
pub mod normalizer;
pub mod session_store;
