use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Unknown activity type: {0}")]
    UnknownActivityType(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Invalid config value for {key}: {value}")]
    InvalidConfig { key: String, value: String },
}
