pub mod config;
pub mod ledger;
pub mod models;
pub mod reconcile;
pub mod records;
pub mod responses;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;

pub use state::AppState;
