//! Client for the task marketplace JSON API.
//!
//! The client is configured with several base URLs for the same API. Requests
//! go to the endpoint that answered last; when it is unreachable or failing the
//! client falls back to the others, and [`NetworkMonitor`] keeps an eye on
//! whether any of them is up.

pub mod api;
pub mod config;
pub mod model;
pub mod monitor;
pub mod session;

pub use api::{ApiClient, ClientError, Endpoints};
pub use config::ClientConfig;
pub use monitor::{NetworkMonitor, NetworkStatus};
pub use session::Session;
