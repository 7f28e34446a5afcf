pub mod apply;
pub mod cleanup;
pub mod cluster;
pub mod config;
pub mod namer;
pub mod objects;
pub mod outcome;
pub mod reports;
pub mod retry;
pub mod scheduler;
pub mod verify;
