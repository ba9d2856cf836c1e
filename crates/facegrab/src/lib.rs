//! facegrab: webcam arcade game.
//!
//! Glue between the camera, the face detector, the round state machine and
//! the terminal: configuration, the engine thread and the game loop.

pub mod config;
pub mod engine;
pub mod game;
pub mod screen;
pub mod snapshot;
