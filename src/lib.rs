pub mod changelog;
pub mod config;
pub mod errors;
pub mod ledger;
pub mod notify;
pub mod observability;
pub mod reconcile;
pub mod scheduler;
pub mod server;
pub mod source;
pub mod status;
pub mod store;
