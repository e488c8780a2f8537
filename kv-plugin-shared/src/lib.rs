//! Shared primitives for a conforming key-value plugin: certificate
//! generation, the handshake codec, durable KV storage, the gRPC surface,
//! and the server runtime that ties them together.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod compat;
pub mod config;
pub mod crypto;
pub mod error;
pub mod grpc;
pub mod handshake;
pub mod server;
pub mod storage;

pub use error::{Error, Result};
