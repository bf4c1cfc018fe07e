//! Skill path backend: learning-path graph, progress ledger, and the
//! challenge session engine, served over HTTP and WebSocket.

pub mod adaptation;
pub mod catalog;
pub mod collaborators;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod graph;
pub mod openai;
pub mod progress;
pub mod protocol;
pub mod resolver;
pub mod routes;
pub mod seeds;
pub mod session;
pub mod state;
pub mod telemetry;
pub mod tutor;
pub mod util;
