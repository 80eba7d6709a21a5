pub mod csv;
pub mod notifier;
