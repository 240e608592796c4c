use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid pipeline config: {0}")]
    Invalid(String),

    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
