use thiserror::Error;

#[derive(Error, Debug)]
pub enum HotspotError {
    #[error("Failed to read configuration file '{path}': {reason}")]
    ConfigRead { path: String, reason: String },

    #[error("Missing configuration section [{0}]")]
    MissingSection(String),

    #[error("Missing configuration key '{key}' in section [{section}]")]
    MissingKey { section: String, key: String },

    #[error("Invalid value for '{key}' in section [{section}]: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        reason: String,
    },

    #[error("Interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("Interface '{0}' has no active connection")]
    NoActiveConnection(String),

    #[error("Interface '{0}' has no IPv4 address yet")]
    NoAddress(String),

    #[error("Timed out after {0}s waiting for a WAN address")]
    WanTimeout(u64),

    #[error("Cancelled while waiting for a WAN address")]
    Cancelled,

    #[error("Step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    #[error("Failed to render {0}: {1}")]
    Render(String, String),
}
