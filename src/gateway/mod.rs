// ============================================================================
// Backend Gateway
// ============================================================================
//
// Outbound side of the gateway: one pooled client that talks to the auth
// service and the video-processing service. Both are plain HTTP services
// reached through configured base URLs.
//
// ============================================================================

pub mod service_client;

pub use service_client::{Backend, Forwarded, RelayedResponse, ServiceClient};
