//! Client-facing network setup.
//!
//! Plain listeners are bound by the binary and handed to
//! `HttpServer::run`; TLS listeners go through `axum-server` with the
//! certificate loaded here.

pub mod tls;

pub use tls::load_tls_config;
