pub mod chain;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod fetch;
pub mod reconcile;
pub mod rpc;
pub mod schema;
pub mod validate;
