//! pump - dataflow pipeline executor
//!
//! A workflow declares nodes (self-describing commands) and edges between
//! their numbered file ports. pump queries every command for its
//! self-description, schedules the edges so each node runs after all of its
//! inputs exist, then runs the nodes and moves produced files into place.

pub mod cli;
pub mod config;
pub mod dag;
pub mod description;
pub mod driver;
pub mod error;
pub mod executors;
pub mod graph;
pub mod harness;
pub mod loader;
pub mod logging;
pub mod models;
pub mod parser;
pub mod port;
pub mod routing;
