//! Upstream model access
//!
//! Provides the `CompletionService` seam and its reqwest implementation for
//! OpenAI-compatible chat completion APIs.

pub mod client;

pub use client::{CompletionService, OpenAiCompatClient, SamplingParams, TokenStream};
