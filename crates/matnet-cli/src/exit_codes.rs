//! Process exit codes shared by all subcommands.

pub mod codes {
    /// Command completed successfully.
    pub const SUCCESS: u8 = 0;
    /// Command failed; details were printed.
    pub const GENERIC_ERROR: u8 = 1;
    /// Bootstrap has not reached ready; inference was not attempted.
    pub const NOT_READY: u8 = 2;
}
