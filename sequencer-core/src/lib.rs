#![no_std]

// Shared logic for the relay sequencer.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library; hardware access goes through the traits in `io`.

pub mod config;
pub mod io;
pub mod mux;
pub mod protocol;
pub mod sequencer;
pub mod states;
pub mod status;
pub mod telemetry;
pub mod timing;
