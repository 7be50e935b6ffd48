/// Shared error type used across the stepwise crates.
///
/// Variants map onto the error taxonomy: `Config`/`Auth` are fatal at
/// startup, `Transport`/`ToolNotFound` surface as observation text to the
/// planner, `PlannerParse` drives the session to ERROR, `Timeout` and
/// `Internal` are edge-layer concerns.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("transport {server_id}: {message}")]
    Transport { server_id: String, message: String },

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("planner returned an invalid decision: {0}")]
    PlannerParse(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
