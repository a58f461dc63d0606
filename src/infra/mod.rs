//! Infrastructure adapters and runtime bootstrap.

pub mod assets;
pub mod cms;
pub mod error;
pub mod http;
pub mod memory;
pub mod oauth;
pub mod session;
pub mod telemetry;
