//! Gateway: the HTTP endpoint LINE delivers webhooks to.
//!
//! Each callback is verified, dispatched and fully handled before the response is sent;
//! nothing is queued and no state survives the request.

mod server;

pub use server::{router, run_gateway, GatewayState};
