//! Core SDK implementation
//!
//! Everything here is request-scoped except the compiled [`iam::PatternCache`].

pub mod cipher;
pub mod config;
pub mod error;
pub mod gateway;
pub mod iam;
pub mod identity;
pub mod request;
pub mod session;
pub mod transport;
