pub mod api_types;
pub mod artifact;
pub mod client;
pub mod config;
pub mod db;
pub mod db_types;
pub mod definition;
pub mod error;
pub mod fetch;
pub mod grpc;
pub mod names;
pub mod operation;
pub mod router;
pub mod service;
pub mod source;
pub mod state;
