// ABOUTME: Root library module for the VacBot application crate
// ABOUTME: Configuration, front-ends and the canned responder; the engine lives in vacbot-core

pub mod config;
pub mod frontend;
pub mod paths;
pub mod responder;
