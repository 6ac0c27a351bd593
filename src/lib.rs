//! Granted: a grant proposal drafting service.
//!
//! Sources (the RFP, organisation material) are normalised into structured
//! facts, facts are scored into section coverage, and coverage drives a
//! single "fix next" suggestion and an autodraft loop run by background
//! jobs. The same engine is served over REST ([`api`]) and MCP ([`mcp`]).

pub mod api;
pub mod config;
pub mod coverage;
pub mod db;
pub mod discovery;
pub mod drafting;
pub mod engine;
pub mod export;
pub mod facts;
pub mod ingest;
pub mod jobs;
pub mod llm;
pub mod mcp;
pub mod models;
