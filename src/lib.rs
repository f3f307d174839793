pub mod commands;
pub mod config;
pub mod context;
pub mod database;
pub mod evaluator;
pub mod ledger;
pub mod matcher;
pub mod models;
pub mod reference;
mod retry;
pub mod state_machine;
pub mod unified;
pub mod universe;
