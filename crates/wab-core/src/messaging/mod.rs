//! Messaging abstractions: the send port, the client lifecycle port, and the
//! event/value types that cross them.

pub mod client;
pub mod port;
pub mod throttled;
pub mod types;
