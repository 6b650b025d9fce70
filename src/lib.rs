pub mod config;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod repository;
pub mod schedule;
