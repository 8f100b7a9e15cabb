#![forbid(unsafe_code)]

#[cfg(feature = "client")]
pub mod client;
pub mod objects;
