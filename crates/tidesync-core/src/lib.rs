//! Tidesync Core - Domain model and port definitions
//!
//! This crate contains the hexagonal core of the sync engine:
//! - **Domain entities** - `JournalRecord`, `ChangeRecord`, `SyncInstruction`
//! - **Value types** - `SyncPath`, `RemoteId`, `Etag`, `Checksum`, `PinState`
//! - **Error taxonomy** - `ErrorClass` driving retry/skip/abort decisions
//! - **Port definitions** - Traits for adapters: `RemoteStore`, `JournalStore`
//!
//! # Architecture
//!
//! The domain module contains pure data and decision logic with no I/O.
//! Ports define trait interfaces that adapter crates (`tidesync-journal`,
//! `tidesync-remote`) implement. The discovery and propagation crates only
//! ever see the ports, never a concrete adapter.

pub mod config;
pub mod domain;
pub mod ports;
