pub mod akool;
pub mod callbacks;
pub mod config;
pub mod lifecycle;
pub mod migrations;
pub mod terminal;
