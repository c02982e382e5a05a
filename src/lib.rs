//! Session lifecycle and payment risk monitoring for the storefront admin.
//!
//! Both services are plain values: build each once at startup and hand
//! clones of the `Arc` to whatever needs them.

pub mod app;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;
