pub mod buffer;
pub mod cli;
pub mod config;
pub mod flatten;
pub mod pipeline;
pub mod plugin;
pub mod record;
pub mod row;
pub mod store;
pub mod writer;
