use thiserror::Error;

/// Reasons a plugin registry can fail to produce a plugin instance.
///
/// Load failures are per-transport events. The publisher logs them and
/// carries on with the remaining transports.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginLoadError {
    /// The lookup name is not known to the registry at all.
    #[error("plugin {0} is not declared")]
    NotDeclared(String),

    /// The plugin is declared, but no factory was linked in for it.
    #[error("plugin {0} is declared but no factory is registered")]
    NotRegistered(String),

    /// The factory ran and refused to build an instance.
    #[error("plugin {lookup_name} failed to construct: {reason}")]
    Construction { lookup_name: String, reason: String },
}

/// Errors that can occur while advertising or publishing.
#[derive(Error, Debug)]
pub enum FanoutError {
    /// The topic name is empty or contains illegal characters.
    #[error("invalid topic name: {0}")]
    InvalidTopic(String),

    /// `advertise` was called on a publisher that already resolved its topic.
    #[error("publisher already advertised on {0}")]
    AlreadyAdvertised(String),

    /// Publishing on a topic that has been shut down.
    #[error("topic {0} has been shut down")]
    TopicShutdown(String),

    /// The messaging substrate rejected the operation.
    #[error("substrate error: {0}")]
    Substrate(String),

    /// JSON serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A transport could not encode the message.
    #[error("{transport} failed to encode message: {reason}")]
    Encoding { transport: String, reason: String },

    /// Builder configuration is missing a required field.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// Builder configuration is contradictory.
    #[error("configuration conflict: {0}")]
    ConfigConflict(String),
}

/// Result type alias for fan-out operations.
pub type Result<T> = std::result::Result<T, FanoutError>;
