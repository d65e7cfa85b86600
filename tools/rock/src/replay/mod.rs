//! Recording and replay of intercepted method calls.
//!
//! # Overview
//!
//! A session intercepts methods on a [`Target`](crate::target::Target) in one
//! of two ways:
//! 1. **Recorder** – calls through to the real method and appends each
//!    settled outcome to the slot's record list.
//! 2. **Player** – never calls the real method; hands out the slot's recorded
//!    outcomes by call index.
//!
//! A fixture file is one JSON object (see [`recording::FixtureDocument`])
//! mapping slot keys such as `fetch-0` to their ordered records.

pub mod player;
pub mod recorder;
pub mod recording;
