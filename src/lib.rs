pub mod cli;
pub mod config;
pub mod expr;
pub mod generate;
pub mod provision;
pub mod template;
pub mod web_server;
pub mod writer;
