//! Content variant generation
//!
//! Turns one uploaded video or photo into many visually near-identical but
//! byte-distinct variants, optionally after swapping in a reference face.
//! The API records and queues jobs; the `worker` binary runs them.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod services;
