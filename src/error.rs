use std::io;
use thiserror::Error;

use crate::mesh::protocol::CodecError;

#[derive(Debug, Error)]
pub enum SwarmError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// A peer message that decoded fine but cannot be applied
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Node already running: {0}")]
    NodeExists(String),

    #[error("Invalid command: {0}")]
    Command(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("YAML error: {0}")]
    Yaml(String),

    #[error("Node task failed: {0}")]
    Join(String),
}

pub type Result<T> = std::result::Result<T, SwarmError>;

impl SwarmError {
    pub fn config(msg: impl Into<String>) -> Self {
        SwarmError::Config(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        SwarmError::Transport(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        SwarmError::Protocol(msg.into())
    }

    pub fn command(msg: impl Into<String>) -> Self {
        SwarmError::Command(msg.into())
    }
}

impl From<io::Error> for SwarmError {
    fn from(e: io::Error) -> Self {
        SwarmError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for SwarmError {
    fn from(e: serde_json::Error) -> Self {
        SwarmError::Json(e.to_string())
    }
}

impl From<serde_yaml::Error> for SwarmError {
    fn from(e: serde_yaml::Error) -> Self {
        SwarmError::Yaml(e.to_string())
    }
}

impl From<tokio::task::JoinError> for SwarmError {
    fn from(e: tokio::task::JoinError) -> Self {
        SwarmError::Join(e.to_string())
    }
}
