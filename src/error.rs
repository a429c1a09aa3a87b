use thiserror::Error;

/// Error taxonomy for a trace, independent of transport.
///
/// `Connection`, `Auth`, `Command` and `Parse` are fatal for the hop that
/// raised them and surface as an `error` trace status, unless they originate
/// from a best-effort enrichment call (interface detail, zone, policy, NAT)
/// where the driver suppresses them and the field stays empty.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    #[error("authentication failed for {host}: {reason}")]
    Auth { host: String, reason: String },

    #[error("command {command:?} failed on {host}: {reason}")]
    Command {
        host: String,
        command: String,
        reason: String,
    },

    #[error("unparseable device output: {0}")]
    Parse(String),

    #[error("{0}")]
    NotImplemented(&'static str),
}

pub type Result<T> = std::result::Result<T, TraceError>;
