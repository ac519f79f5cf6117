#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod aggregation;
pub(crate) mod api;
pub mod app;
pub mod config;
pub mod domain;
pub mod enrich;
pub mod ingest;
pub mod observability;
pub mod partition;
pub mod queue;
pub mod scheduler;
pub mod store;
