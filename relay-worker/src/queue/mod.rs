//! Queue module for the durable relay channel.
//!
//! ## Architecture
//!
//! ```text
//! Web Server → relay queue → Subscriber → table store
//! ```

pub mod publisher;
pub mod relay;
pub mod types;

pub use publisher::{Publisher, RelayChannel};
pub use relay::{IngressRelay, RelayOutcome};
pub use types::{PushEnvelope, PushMessage};
