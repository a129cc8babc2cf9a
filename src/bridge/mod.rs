//! Bridge core
//!
//! This module implements the connection lifecycle of the relay:
//! accept, outbound connect, splice, teardown. Sessions are owned by the
//! [`SessionRegistry`] and addressed everywhere else by [`SessionId`];
//! outbound connect completions are matched back to their session through
//! the [`PendingConnectTable`]. All of it hangs off one [`BridgeContext`]
//! driven by a single dispatcher.

mod context;
mod endpoint;
mod pending;
mod registry;
mod session;

pub use context::{BridgeContext, ProxyStats};
pub use endpoint::Endpoint;
pub use pending::{PendingConnect, PendingConnectTable};
pub use registry::{SessionId, SessionRegistry};
pub use session::{Phase, Session, Side};
