pub mod process_signals;
pub mod reconcile_signals;
