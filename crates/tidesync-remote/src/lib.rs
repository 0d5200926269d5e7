//! HTTP implementation of the remote store port
//!
//! Talks to a Tidesync-compatible object store over JSON + raw-bytes HTTP
//! endpoints. The adapter stays deliberately thin: it maps HTTP statuses onto
//! [`tidesync_core::ports::remote_store::RemoteError`] and leaves retry and
//! backoff decisions entirely to the propagation scheduler.

pub mod client;

pub use client::HttpRemoteStore;
