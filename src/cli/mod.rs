pub mod commands;
pub mod output;

pub use commands::CliContext;
pub use output::OutputMode;
