use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum FwiError {
    Config(String),
    MissingParameter(String),
    MissingRequiredInput(String),
    NoSourcesFound { path: PathBuf, wildcard: String },
    WorkerOutOfRange { index: usize, sources: usize },
    MissingPartitionFile(PathBuf),
    MissingPath(PathBuf),
    MissingOutput(String),
    NonUniformPartitions { parameter: String, iproc: usize, expected: usize, found: usize },
    VectorLength { len: usize, nproc: usize, nparams: usize },
    ToolFailed { program: String, status: Option<i32> },
    ToolTimeout { program: String, secs: u64 },
    Io(std::io::Error),
    Json(serde_json::Error),
    Serialization(Box<bincode::error::EncodeError>),
    Deserialization(Box<bincode::error::DecodeError>),
    Pattern(glob::PatternError),
    Other(String),
}

pub type FwiResult<T> = Result<T, FwiError>;

impl fmt::Display for FwiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FwiError::Config(e) => write!(f, "Configuration error: {}", e),
            FwiError::MissingParameter(name) => write!(f, "Missing required parameter: {}", name),
            FwiError::MissingRequiredInput(e) => write!(f, "Missing required input: {}", e),
            FwiError::NoSourcesFound { path, wildcard } => {
                write!(f, "No sources found in {} matching {}", path.display(), wildcard)
            }
            FwiError::WorkerOutOfRange { index, sources } => {
                write!(f, "Worker index {} has no source ({} sources resolved)", index, sources)
            }
            FwiError::MissingPartitionFile(p) => write!(f, "Missing partition file: {}", p.display()),
            FwiError::MissingPath(p) => write!(f, "Path does not exist: {}", p.display()),
            FwiError::MissingOutput(e) => write!(f, "Expected output missing: {}", e),
            FwiError::NonUniformPartitions { parameter, iproc, expected, found } => write!(
                f,
                "Non-uniform partitions: {} on processor {} has {} points, expected {}",
                parameter, iproc, found, expected
            ),
            FwiError::VectorLength { len, nproc, nparams } => write!(
                f,
                "Vector of length {} cannot be split across {} processors x {} parameters",
                len, nproc, nparams
            ),
            FwiError::ToolFailed { program, status } => match status {
                Some(code) => write!(f, "External tool {} exited with status {}", program, code),
                None => write!(f, "External tool {} terminated by signal", program),
            },
            FwiError::ToolTimeout { program, secs } => {
                write!(f, "External tool {} exceeded timeout of {}s", program, secs)
            }
            FwiError::Io(e) => write!(f, "IO error: {}", e),
            FwiError::Json(e) => write!(f, "JSON error: {}", e),
            FwiError::Serialization(e) => write!(f, "Serialization error: {}", e),
            FwiError::Deserialization(e) => write!(f, "Deserialization error: {}", e),
            FwiError::Pattern(e) => write!(f, "Invalid file pattern: {}", e),
            FwiError::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for FwiError {}

impl From<bincode::error::EncodeError> for FwiError {
    fn from(err: bincode::error::EncodeError) -> Self {
        FwiError::Serialization(Box::new(err))
    }
}

impl From<bincode::error::DecodeError> for FwiError {
    fn from(err: bincode::error::DecodeError) -> Self {
        FwiError::Deserialization(Box::new(err))
    }
}

impl From<std::io::Error> for FwiError {
    fn from(err: std::io::Error) -> Self {
        FwiError::Io(err)
    }
}

impl From<serde_json::Error> for FwiError {
    fn from(err: serde_json::Error) -> Self {
        FwiError::Json(err)
    }
}

impl From<glob::PatternError> for FwiError {
    fn from(err: glob::PatternError) -> Self {
        FwiError::Pattern(err)
    }
}

impl From<glob::GlobError> for FwiError {
    fn from(err: glob::GlobError) -> Self {
        FwiError::Io(err.into())
    }
}

impl From<String> for FwiError {
    fn from(err: String) -> Self {
        FwiError::Other(err)
    }
}

impl From<&str> for FwiError {
    fn from(err: &str) -> Self {
        FwiError::Other(err.to_string())
    }
}
