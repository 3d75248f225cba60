pub mod runner;
pub mod shutdown;

pub use runner::{run, DbOptions, RunOptions, ShutdownOptions};
