//! Rail Simulation Library
//!
//! A rail traffic simulation core: signals, automatic and manual train
//! control, and a script event bus for missions.

pub mod simulation;
