#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod context;
pub mod currency;
pub mod entities;
pub mod framework;
pub mod gateway;
pub mod processors;
pub mod service;
pub mod status;
pub mod store;
pub mod utils;
