//! Render Queue
//!
//! An HTTP gateway accepts HTML/URL render requests and queues them in Redis.
//! Worker processes claim jobs, render them to PDF, PNG or DOCX with headless
//! Chrome and persist the result to the output directory.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
pub mod shutdown;
pub mod worker;
