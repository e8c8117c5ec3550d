//! # accessmap
//!
//! Population accessibility aggregation engine.
//!
//! Given a set of population points and a set of candidate target facilities
//! (schools, clinics, ...), this crate requests routed travel costs between
//! them, keeps those costs current while the user changes the selection or the
//! travel mode, and aggregates them into population-weighted distributions for
//! an interactive map client.
//!
//! ## Features
//!
//! - **Population loading**: validate and normalize weighted points from JSON
//! - **Targets**: facility set with change notifications
//! - **Routing**: batched, cached, cancellable requests to a routing provider
//! - **Aggregation**: nearest-target costs, histograms and weighted statistics
//! - **HTTP API**: REST endpoints for the map client (feature `http-server`)
//!
//! ## Architecture
//!
//! - [`api`]: identifiers and the public data types
//! - [`models`]: geo primitives, population, targets, routes, distributions
//! - [`services`]: population, targets, routing, distribution and aggregation
//! - [`config`]: `accessmap.toml` and environment overrides
//! - [`error`]: error types shared by all layers
//! - [`http`]: axum router and handlers

// Allow large error types - ValidationError and ConfigError carry rich context
#![allow(clippy::result_large_err)]

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

#[cfg(feature = "http-server")]
pub mod http;
