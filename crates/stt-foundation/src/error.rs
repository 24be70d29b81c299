use thiserror::Error;

/// Top-level error type for the transcription service.
///
/// Each concern gets its own nested enum; this type composes them so callers
/// can match broadly or drill into the concern that actually failed.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Component failed health check: {component}")]
    HealthCheckFailed { component: String },

    #[error("Shutdown requested")]
    ShutdownRequested,

    #[error("Fatal error, cannot recover: {0}")]
    Fatal(String),

    #[error("Transient error, will retry: {0}")]
    Transient(String),
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Transport(TransportError::Io(err))
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServerError::Transient(format!("Task join failed: {err}"))
    }
}

/// Errors from the ingress/resampler stage.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("Chunk contains non-finite samples, dropped")]
    NonFiniteSamples,

    #[error("Unsupported sample rate: {0}")]
    UnsupportedSampleRate(u32),

    #[error("Empty audio chunk")]
    EmptyChunk,
}

/// Errors from the STT model adapter.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model not available: {reason}")]
    NotAvailable { reason: String },

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("Model initialization failed: {0}")]
    InitializationFailed(String),

    /// Transient errors that may clear on the next cycle (buffer empty, momentary fault).
    #[error("Transient model error: {0}")]
    Transient(String),
}

/// Errors from configuration loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration parsing error: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("Validation failed: {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Errors from the wire transport / session framing.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Connection closed")]
    Closed,

    #[error("Send timed out, result dropped")]
    SendTimeout,
}

/// How a recovery loop should respond to a given error.
#[derive(Debug, Clone)]
pub enum RecoveryStrategy {
    /// Retry within the same session (e.g. skip this cycle, keep the buffer).
    RetrySession,
    /// Terminate only the offending connection; other sessions are unaffected.
    TerminateConnection,
    /// Abort the whole process; there is no fallback.
    Fatal,
}

impl ServerError {
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            ServerError::Model(ModelError::Transient(_)) => RecoveryStrategy::RetrySession,
            ServerError::Transcode(_) => RecoveryStrategy::RetrySession,
            ServerError::Transport(TransportError::MalformedFrame(_))
            | ServerError::Transport(TransportError::Closed) => {
                RecoveryStrategy::TerminateConnection
            }
            ServerError::Model(ModelError::InitializationFailed(_)) => RecoveryStrategy::Fatal,
            ServerError::Fatal(_) | ServerError::ShutdownRequested => RecoveryStrategy::Fatal,
            _ => RecoveryStrategy::RetrySession,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovery_strategy_for_transport_errors() {
        let malformed = ServerError::Transport(TransportError::MalformedFrame("bad frame".to_string()));
        assert!(matches!(malformed.recovery_strategy(), RecoveryStrategy::TerminateConnection));

        let closed = ServerError::Transport(TransportError::Closed);
        assert!(matches!(closed.recovery_strategy(), RecoveryStrategy::TerminateConnection));

        let io = ServerError::Transport(TransportError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "pipe broke",
        )));
        assert!(matches!(io.recovery_strategy(), RecoveryStrategy::RetrySession));
    }

    #[test]
    fn recovery_strategy_for_model_errors() {
        let transient = ServerError::Model(ModelError::Transient("buffer empty".to_string()));
        assert!(matches!(transient.recovery_strategy(), RecoveryStrategy::RetrySession));

        let init_failed = ServerError::Model(ModelError::InitializationFailed("no model file".to_string()));
        assert!(matches!(init_failed.recovery_strategy(), RecoveryStrategy::Fatal));
    }

    #[test]
    fn recovery_strategy_for_fatal_and_shutdown() {
        assert!(matches!(
            ServerError::Fatal("out of memory".to_string()).recovery_strategy(),
            RecoveryStrategy::Fatal
        ));
        assert!(matches!(
            ServerError::ShutdownRequested.recovery_strategy(),
            RecoveryStrategy::Fatal
        ));
    }
}
