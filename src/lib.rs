//! Gesture-driven particle tree: hand landmarks in, animation parameters out.

pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod geometry;
pub mod gestures;
pub mod landmarks;
pub mod logging;
pub mod scene;
pub mod session;
pub mod sink;
pub mod source;

pub use error::{Error, Result};
