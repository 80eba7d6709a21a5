//! Domain model: plans, payment methods and transactions, the canonical
//! session record, activity events, and the ports the application layer
//! talks through.

pub mod catalog;
pub mod event;
pub mod money;
pub mod payment;
pub mod plan;
pub mod ports;
pub mod session;
