pub mod manager;
pub mod migration;
pub mod tables;

pub use tables::DB;
