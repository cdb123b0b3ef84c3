//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::path::PathBuf;
use std::process;

use tilepress::config::ConfigFileError;
use tilepress::error::PipelineError;
use tilepress::job::SubmitError;
use tilepress::service::ServiceError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Failed to read the source image
    ReadImage { path: PathBuf, error: std::io::Error },
    /// Job creation or start failed
    Service(ServiceError),
    /// Tile generation failed
    Pipeline(PipelineError),
    /// Failed to write output file
    FileWrite { path: PathBuf, error: std::io::Error },
    /// Run was interrupted
    Interrupted,
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Service(ServiceError::Submit(SubmitError::DegenerateCorners)) => {
                eprintln!();
                eprintln!("The three corners must not lie on one line. Pass them as");
                eprintln!("world pixel coordinates at zoom 0, e.g. --top-left 120.5,80.25");
            }
            CliError::Service(ServiceError::Submit(SubmitError::InvalidImage(_))) => {
                eprintln!();
                eprintln!("Supported source formats: PNG, JPEG, GIF");
            }
            _ => {}
        }

        let code = match self {
            CliError::Interrupted => 130,
            _ => 1,
        };
        process::exit(code)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ReadImage { path, error } => {
                write!(f, "Failed to read image '{}': {}", path.display(), error)
            }
            CliError::Service(e) => write!(f, "{}", e),
            CliError::Pipeline(e) => write!(f, "Tile generation failed: {}", e),
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path.display(), error)
            }
            CliError::Interrupted => write!(f, "Interrupted"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ReadImage { error, .. } => Some(error),
            CliError::Service(e) => Some(e),
            CliError::Pipeline(e) => Some(e),
            CliError::FileWrite { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<ServiceError> for CliError {
    fn from(e: ServiceError) -> Self {
        CliError::Service(e)
    }
}

impl From<PipelineError> for CliError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Cancelled => CliError::Interrupted,
            other => CliError::Pipeline(other),
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_pipeline_maps_to_interrupted() {
        let err = CliError::from(PipelineError::Cancelled);
        assert!(matches!(err, CliError::Interrupted));
    }

    #[test]
    fn test_file_write_message_names_path() {
        let err = CliError::FileWrite {
            path: PathBuf::from("/tmp/out.zip"),
            error: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "Failed to write file '/tmp/out.zip': denied");
    }
}
