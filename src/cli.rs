//! Command-line interface for the arbiter
//!
//! Provides argument parsing and subcommand handling for the `llm-arbiter` binary.

use clap::{Parser, Subcommand};

/// Multi-model response arbitration server
#[derive(Parser)]
#[command(name = "llm-arbiter")]
#[command(version)]
#[command(about = "Multi-model response arbitration server")]
#[command(
    long_about = "llm-arbiter asks several candidate models the same question, lets a judge \
    model pick or merge their answers, and streams the judge's result back to the client."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# llm-arbiter Configuration
# ==========================
#
# Candidate models answer every request in parallel; the judge model weighs
# their answers, decides to pick one or merge them, and its result is what
# the client receives.

# ─────────────────────────────────────────────────────────────────────────────
# SERVER
# ─────────────────────────────────────────────────────────────────────────────

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "0.0.0.0"
port = 8000

# ─────────────────────────────────────────────────────────────────────────────
# UPSTREAM PROVIDER
# ─────────────────────────────────────────────────────────────────────────────
#
# Any OpenAI-compatible chat completions API. The API key is read once at
# startup from the environment variable named below.

[provider]
base_url = "https://api.groq.com/openai/v1"
api_key_env = "GROQ_API_KEY"

# Optional client-wide timeout for every upstream call (1-600 seconds)
# upstream_timeout_seconds = 120

# ─────────────────────────────────────────────────────────────────────────────
# CANDIDATE POOL
# ─────────────────────────────────────────────────────────────────────────────

[pool]
# Prepended as a system turn to each candidate's copy of the conversation
system_directive = "You are a helpful assistant. Do not reveal which model or vendor you are."
temperature = 1.0
max_tokens = 1024

# Order matters: the first candidate is <response1> in the judge prompt,
# the second is <response2>, and so on. Labels must be unique.
[[candidates]]
name = "llama-3.3-70b-versatile"
label = "llama-70b"

[[candidates]]
name = "llama-3.1-8b-instant"
label = "llama-8b"

[[candidates]]
name = "gemma2-9b-it"
label = "gemma-9b"

# ─────────────────────────────────────────────────────────────────────────────
# JUDGE
# ─────────────────────────────────────────────────────────────────────────────

[judge]
model = "llama-3.3-70b-versatile"
# Deterministic output keeps the tag grammar stable
temperature = 0.0
max_tokens = 2048
# When true, a <decision> other than "pick" or "merge" fails the request
reject_unknown_decision = false

# ─────────────────────────────────────────────────────────────────────────────
# STREAMING
# ─────────────────────────────────────────────────────────────────────────────

[streaming]
# How the judge's result is chunked: "word" or "whole"
granularity = "word"

# Model behind POST /stream/direct (defaults to the first candidate)
# direct_model = "llama-3.1-8b-instant"
direct_temperature = 1.0
direct_max_tokens = 1024

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error"
# RUST_LOG takes precedence when set
log_level = "info"

# Prometheus metrics are always available at /metrics on the server port
"#
}
