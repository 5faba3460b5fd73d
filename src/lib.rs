//! llm-arbiter - Multi-model response arbitration
//!
//! Fans each conversation out to a pool of candidate models, asks a judge
//! model to weigh, pick or merge their answers, and streams the judge's
//! result back to the client.

pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod telemetry;
