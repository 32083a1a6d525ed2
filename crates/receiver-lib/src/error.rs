//! Error types for the receiver
//!
//! Construction-time failures (`Config`, `Secret`) are fatal. Everything that
//! happens inside a scrape cycle is collected per target and reported once per
//! cycle through [`ScrapeErrors`].

use crate::models::ResourceType;
use thiserror::Error;

/// Errors raised by the receiver library
#[derive(Debug, Error)]
pub enum ReceiverError {
    /// Invalid or contradictory settings
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A credential file could not be read or was empty
    #[error("{name}: {reason}")]
    Secret { name: String, reason: String },

    /// Transport-level failure (connect, timeout, body read)
    #[error("request {path}: {source}")]
    Request {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a non-success status
    #[error("unexpected status code {status} for {path}")]
    Status { status: u16, path: String },

    /// The response body was not the JSON shape we expected
    #[error("decode response: {0}")]
    Decode(String),

    /// A snapshot payload carried no numeric fields
    #[error("snapshot conversion failed: {0}")]
    SnapshotConversion(String),

    /// Identifier discovery failed for a resource type
    #[error("discover {}s: {source}", resource_type.display_name())]
    Discovery {
        resource_type: ResourceType,
        #[source]
        source: Box<ReceiverError>,
    },

    /// Fetching or normalizing one target failed
    #[error("{} {uuid}: {source}", resource_type.display_name())]
    Target {
        resource_type: ResourceType,
        uuid: String,
        #[source]
        source: Box<ReceiverError>,
    },

    /// A scrape worker task panicked or was cancelled
    #[error("scrape task failed: {0}")]
    Task(String),

    /// The downstream consumer rejected a batch
    #[error("consume metrics: {0}")]
    Consumer(String),

    /// A lifecycle transition that the current state does not allow
    #[error("cannot {action} receiver in state {state}")]
    InvalidState { action: &'static str, state: String },

    /// The loop task did not exit before the caller's deadline
    #[error("receiver did not stop within {timeout_ms}ms")]
    ShutdownTimeout { timeout_ms: u64 },
}

/// Every error collected during one scrape cycle
#[derive(Debug, Error)]
#[error("{}", join_messages(.0))]
pub struct ScrapeErrors(pub Vec<ReceiverError>);

impl ScrapeErrors {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReceiverError> {
        self.0.iter()
    }
}

fn join_messages(errors: &[ReceiverError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ReceiverError {
    /// Resource type the error belongs to, if any
    pub fn resource_type(&self) -> Option<ResourceType> {
        match self {
            ReceiverError::Discovery { resource_type, .. }
            | ReceiverError::Target { resource_type, .. } => Some(*resource_type),
            _ => None,
        }
    }

    /// True when the remote API could not be reached or refused the request
    pub fn is_api_failure(&self) -> bool {
        match self {
            ReceiverError::Request { .. } | ReceiverError::Status { .. } => true,
            ReceiverError::Discovery { source, .. } | ReceiverError::Target { source, .. } => {
                source.is_api_failure()
            }
            _ => false,
        }
    }

    /// True when the API rejected the credentials (401 or 403)
    pub fn is_auth_rejection(&self) -> bool {
        match self {
            ReceiverError::Status { status, .. } => matches!(status, 401 | 403),
            ReceiverError::Discovery { source, .. } | ReceiverError::Target { source, .. } => {
                source.is_auth_rejection()
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReceiverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_error_names_resource() {
        let err = ReceiverError::Target {
            resource_type: ResourceType::ManagedDatabase,
            uuid: "db-1".to_string(),
            source: Box::new(ReceiverError::Status {
                status: 500,
                path: "/1.3/database/db-1/metrics".to_string(),
            }),
        };

        let msg = err.to_string();
        assert!(msg.starts_with("managed database db-1:"));
        assert!(msg.contains("500"));
        assert!(err.is_api_failure());
        assert_eq!(err.resource_type(), Some(ResourceType::ManagedDatabase));
    }

    #[test]
    fn test_decode_failure_is_not_api_failure() {
        let err = ReceiverError::Discovery {
            resource_type: ResourceType::ManagedLoadBalancer,
            source: Box::new(ReceiverError::Decode("not json".to_string())),
        };
        assert!(!err.is_api_failure());
        assert_eq!(err.to_string(), "discover managed load balancers: decode response: not json");
    }

    #[test]
    fn test_auth_rejection_seen_through_wrappers() {
        let rejected = ReceiverError::Target {
            resource_type: ResourceType::ManagedDatabase,
            uuid: "db-1".to_string(),
            source: Box::new(ReceiverError::Status {
                status: 401,
                path: "/1.3/database/db-1/metrics".to_string(),
            }),
        };
        assert!(rejected.is_auth_rejection());

        let server_error = ReceiverError::Status {
            status: 500,
            path: "/1.3/database".to_string(),
        };
        assert!(!server_error.is_auth_rejection());
        assert!(!ReceiverError::Decode("bad".to_string()).is_auth_rejection());
    }

    #[test]
    fn test_scrape_errors_joined() {
        let errors = ScrapeErrors(vec![
            ReceiverError::Decode("bad".to_string()),
            ReceiverError::Consumer("full".to_string()),
        ]);

        assert_eq!(errors.len(), 2);
        assert_eq!(errors.to_string(), "decode response: bad; consume metrics: full");
    }
}
