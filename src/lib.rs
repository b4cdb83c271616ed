//! Wolfram Language execution bridge.
//!
//! Translates a fixed set of mathematical tool calls into Wolfram Language
//! programs, runs `wolframscript` (or `WolframKernel`) as a short-lived
//! subprocess per call, and classifies the raw output into a typed result.

pub mod bridge;
pub mod cli;
pub mod codegen;
pub mod config;
pub mod engine;
pub mod error;
pub mod normalize;
pub mod server;
pub mod tools;
