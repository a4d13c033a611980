pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod impact;
pub mod indexer;
pub mod model;
pub mod resolve;
pub mod tree;
pub mod util;
