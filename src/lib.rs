pub mod buffer;
pub mod catalog;
pub mod common;
pub mod concurrency;
pub mod config;
pub mod database;
pub mod error;
pub mod executors;
pub mod storage;
pub mod tuple;
