//! planebot process wiring.
//!
//! The binary in `main.rs` parses arguments, loads configuration and hands
//! off to [`app::run`] or one of the one-shot runs. The optional webhook
//! receiver lives in [`webhook`].

pub mod app;
pub mod webhook;

pub use app::{Bridge, digest_once, notify_once, run, today};
