//! Asynchronous image upscaling service
//!
//! Clients submit an image and receive a task id immediately. A separate
//! worker pool pulls tasks from the queue, upscales them, and records one
//! terminal outcome per task in the task store, where the status and result
//! endpoints read it.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
pub mod telemetry;
