pub mod cli;
pub mod config;
pub mod credentials;
pub mod environment;
pub mod error;
pub mod exec;
pub mod mfa;
pub mod resolver;
pub mod shell;
