//! Transports carrying the tool protocol.

pub mod http;
pub mod protocol;
pub mod stdio;
