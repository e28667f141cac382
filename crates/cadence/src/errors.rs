use cadence_core::CadenceError;
use std::io;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] CadenceError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("Release cancelled")]
    Cancelled,
}

impl CliError {
    /// Exit code: 2 when residue was left behind and needs manual attention, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Core(err) if err.is_partial_failure() => 2,
            _ => 1,
        }
    }
}
