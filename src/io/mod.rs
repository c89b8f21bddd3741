//! External interfaces: order API client, state ingest listener

pub mod order_api;
pub mod state_listener;

pub use order_api::{HttpOrderApi, OrderApi};
pub use state_listener::{start_state_listener, StateListenerConfig};
