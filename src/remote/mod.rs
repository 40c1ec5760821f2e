pub mod client;
pub mod merchant;
pub mod transport;
pub mod types;
