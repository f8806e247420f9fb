use thiserror::Error;

#[derive(Error, Debug)]
pub enum OuroborosError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Provider rate limited: {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Tool execution error: tool={tool_name}, {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("Speech error: {0}")]
    Speech(String),

    #[error("Skill error: {message}")]
    Skill { message: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Command error: {0}")]
    Command(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type OuroborosResult<T> = Result<T, OuroborosError>;

impl OuroborosError {
    /// Map a non-success HTTP status from a remote service into an error.
    pub(crate) fn from_status(service: &str, status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            429 => OuroborosError::RateLimited {
                provider: service.to_string(),
                retry_after_ms: 5000,
            },
            401 | 403 => OuroborosError::Auth(format!("{service} rejected credentials ({status})")),
            _ => OuroborosError::Provider(format!("{service} API error {status}: {body}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats() {
        let err = OuroborosError::Provider("connection refused".into());
        assert_eq!(err.to_string(), "Provider error: connection refused");

        let err = OuroborosError::RateLimited {
            provider: "ollama".into(),
            retry_after_ms: 5000,
        };
        assert!(err.to_string().contains("5000ms"));

        let err = OuroborosError::ToolExecution {
            tool_name: "http_fetch".into(),
            message: "missing url".into(),
        };
        assert!(err.to_string().contains("http_fetch"));

        let err = OuroborosError::Skill {
            message: "no frontmatter".into(),
        };
        assert_eq!(err.to_string(), "Skill error: no frontmatter");
    }

    #[test]
    fn status_mapping() {
        let err = OuroborosError::from_status("openai", reqwest::StatusCode::TOO_MANY_REQUESTS, "");
        assert!(matches!(err, OuroborosError::RateLimited { .. }));

        let err = OuroborosError::from_status("openai", reqwest::StatusCode::UNAUTHORIZED, "");
        assert!(matches!(err, OuroborosError::Auth(_)));

        let err = OuroborosError::from_status("ollama", reqwest::StatusCode::NOT_FOUND, "model not found");
        match err {
            OuroborosError::Provider(msg) => assert!(msg.contains("model not found")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<OuroborosError>();
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: OuroborosError = io_err.into();
        assert!(matches!(err, OuroborosError::Io(_)));
    }

    #[test]
    fn json_error_converts() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: OuroborosError = json_err.into();
        assert!(matches!(err, OuroborosError::Serialization(_)));
    }
}
