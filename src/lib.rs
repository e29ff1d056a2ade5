pub mod compactor;
pub mod config;
pub mod engine;
pub mod gate;
pub mod limits;
pub mod model;
pub mod observability;
pub mod service;
pub mod wal;
