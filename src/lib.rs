pub mod api;
pub mod checkout;
pub mod config;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod order;
pub mod reconcile;
pub mod remote;
pub mod signature;
