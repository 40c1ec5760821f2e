pub mod store;
pub mod transaction_id;
pub mod types;
