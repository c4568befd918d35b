//! Deckhand - page/button state engine for Elgato Stream Deck panels.
//!
//! This library keeps three things mutually consistent: an in-memory
//! page/button model, the bitmaps visible on the physical panel, and a
//! persisted JSON configuration document. It has no CLI or HTTP surface of
//! its own; embedders construct a [`controller::DeckController`] over a
//! [`device::DeviceLink`] and drive it.
//!
//! # Modules
//!
//! - `device`: device abstraction layer (real hardware and mock)
//! - `render`: pure bitmap composition for button tiles and the info strip
//! - `config`: page/button model and JSON persistence
//! - `controller`: orchestration, paging, and key-event dispatch
//! - `plugin`: the action-execution collaborator boundary
//! - `error`: error types with user-recoverable hints
#![forbid(unsafe_code)]

pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod logging;
pub mod plugin;
pub mod render;
