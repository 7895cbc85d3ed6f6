//! CLI subcommand implementations. Each returns a process exit code.

pub mod bootstrap;
pub mod check;
pub mod fetch;
pub mod fix_layout;
pub mod invoke;
pub mod status;
