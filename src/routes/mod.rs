//! HTTP routes for Keygate

pub mod wallet_routes;

pub use wallet_routes::handle_wallet_request;
