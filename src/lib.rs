// Library for tests to access modules

pub mod config;
pub mod follower;
pub mod ingest;
pub mod metrics;
pub mod models;
pub mod parser;
pub mod routes;
pub mod version;
pub mod worker;
