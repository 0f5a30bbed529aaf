use thiserror::Error;

pub type Result<T> = std::result::Result<T, SupabaseError>;

#[derive(Debug, Error)]
pub enum SupabaseError {
    #[error("Network error: {message}")]
    Network { message: String, timeout: bool },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Serialize error: {0}")]
    Serialize(String),
}

impl SupabaseError {
    /// Worth retrying: network trouble, timeouts, throttling, server errors.
    pub fn is_transient(&self) -> bool {
        match self {
            SupabaseError::Network { .. } => true,
            SupabaseError::Api { status, .. } => {
                matches!(status, 408 | 429) || (500..=599).contains(status)
            }
            SupabaseError::Serialize(_) => false,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, SupabaseError::Api { status: 401 | 403, .. })
    }

    /// Unique-key violation: the row is already stored.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SupabaseError::Api { status: 409, .. })
    }
}

impl From<reqwest::Error> for SupabaseError {
    fn from(err: reqwest::Error) -> Self {
        SupabaseError::Network {
            timeout: err.is_timeout(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for SupabaseError {
    fn from(err: serde_json::Error) -> Self {
        SupabaseError::Serialize(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> SupabaseError {
        SupabaseError::Api {
            status,
            message: String::new(),
        }
    }

    #[test]
    fn classifies_statuses() {
        assert!(api(503).is_transient());
        assert!(api(429).is_transient());
        assert!(api(408).is_transient());
        assert!(!api(400).is_transient());
        assert!(!api(401).is_transient());
        assert!(api(401).is_auth());
        assert!(api(403).is_auth());
        assert!(api(409).is_conflict());
        assert!(!api(409).is_transient());
    }

    #[test]
    fn network_errors_are_transient() {
        let err = SupabaseError::Network {
            message: "connection reset".into(),
            timeout: false,
        };
        assert!(err.is_transient());
        assert!(!SupabaseError::Serialize("bad".into()).is_transient());
    }
}
