pub mod runner;

pub use runner::{FlushReport, FlushStatus, Pipeline, ShutdownReport};
