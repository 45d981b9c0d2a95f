//! CLI error type.

use std::fmt;

use tilepress::ConvertError;

/// Errors surfaced to the user by the command-line layer.
#[derive(Debug)]
pub enum CliError {
    /// Argument combinations clap cannot express (e.g. --color without
    /// --coloring).
    Usage(String),

    /// The input raster could not be decoded.
    Image(image::ImageError),

    /// The conversion itself failed.
    Convert(ConvertError),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Usage(msg) => write!(f, "{}", msg),
            CliError::Image(e) => write!(f, "cannot read input: {}", e),
            CliError::Convert(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Usage(_) => None,
            CliError::Image(e) => Some(e),
            CliError::Convert(e) => Some(e),
        }
    }
}

impl From<image::ImageError> for CliError {
    fn from(e: image::ImageError) -> Self {
        CliError::Image(e)
    }
}

impl From<ConvertError> for CliError {
    fn from(e: ConvertError) -> Self {
        CliError::Convert(e)
    }
}

impl From<tilepress::error::ResourceError> for CliError {
    fn from(e: tilepress::error::ResourceError) -> Self {
        CliError::Convert(ConvertError::Resource(e))
    }
}
