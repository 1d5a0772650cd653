use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Version parsing error: {0}")]
    SemVer(#[from] semver::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Malformed data: {0}")]
    Malformed(String),

    #[error("External service failure: {0}")]
    ExternalFailure(String),

    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("No pack.toml found in {0}\n\n\
             Hint: run this command from the root of your modpack,\n\
             or create a new pack with:\n\n\
               packsmith init --name \"My Pack\" --mc-version 1.20.1")]
    NoPackFile(String),
}

impl Error {
    /// Short machine-friendly name of the error class, used in per-item reports
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Json(_) | Error::TomlDe(_) | Error::TomlSer(_) => "codec",
            Error::Http(_) | Error::ExternalFailure(_) => "external-failure",
            Error::SemVer(_) | Error::Malformed(_) => "malformed",
            Error::NotFound(_) | Error::NoPackFile(_) => "not-found",
            Error::Unsupported(_) => "unsupported",
            Error::IntegrityViolation(_) => "integrity-violation",
            Error::InvalidOperation(_) => "invalid-operation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind() {
        assert_eq!(Error::NotFound("x".into()).kind(), "not-found");
        assert_eq!(
            Error::IntegrityViolation("too deep".into()).kind(),
            "integrity-violation"
        );
        let io = Error::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(io.kind(), "io");
    }

    #[test]
    fn test_no_pack_file_hint() {
        let msg = Error::NoPackFile("/tmp/pack".into()).to_string();
        assert!(msg.contains("/tmp/pack"));
        assert!(msg.contains("packsmith init"));
        assert!(msg.contains("--mc-version 1.20.1"));
    }
}
