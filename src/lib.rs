//! Tollgate - Per-identity Rate Limiting Middleware
//!
//! This crate implements a sliding-window rate limiter for HTTP APIs. Each
//! caller is assigned a durable identity, recent admissions are tracked per
//! identity in memory, and a background janitor evicts idle state.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
