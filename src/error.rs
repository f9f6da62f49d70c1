use std::fmt;

#[derive(Debug)]
pub enum StampaError {
    MissingFirstPage,
    EmptyRecordSet,
    LoopPathConflict { expected: String, found: String },
    InvalidMapping(String),
    InvalidConfiguration(String),
    Pdf(String),
    NoPagesSelected,
    Io(std::io::Error),
}

impl fmt::Display for StampaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StampaError::MissingFirstPage => {
                write!(f, "template document has no first page prototype")
            }
            StampaError::EmptyRecordSet => write!(f, "no records provided to merge"),
            StampaError::LoopPathConflict { expected, found } => write!(
                f,
                "template binds more than one loop array: expected {}, found {}",
                expected, found
            ),
            StampaError::InvalidMapping(message) => write!(f, "invalid field mapping: {}", message),
            StampaError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            StampaError::Pdf(message) => write!(f, "pdf error: {}", message),
            StampaError::NoPagesSelected => {
                write!(f, "none of the requested records map to a generated page")
            }
            StampaError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for StampaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StampaError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StampaError {
    fn from(value: std::io::Error) -> Self {
        StampaError::Io(value)
    }
}

pub(crate) fn lopdf_err(err: lopdf::Error) -> StampaError {
    StampaError::Pdf(err.to_string())
}
