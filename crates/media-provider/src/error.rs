use media_types::TaskError;

/// Provider client error. Local to one task invocation.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Missing credential, unknown model, or settings that do not fit the model.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Submit rejected, non-success status, or a body we cannot interpret.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Poll attempt budget exhausted.
    #[error("timed out: {0}")]
    Timeout(String),
    /// The provider reported a terminal failure; message is upstream's, verbatim.
    #[error("{0}")]
    Generation(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<ProviderError> for TaskError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Configuration(msg) => TaskError::configuration(msg),
            ProviderError::Protocol(msg) => TaskError::protocol(msg),
            ProviderError::Timeout(msg) => TaskError::timeout(msg),
            ProviderError::Generation(msg) => TaskError::generation(msg),
            ProviderError::Http(e) => TaskError::protocol(format!("HTTP error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_types::TaskErrorKind;

    #[test]
    fn generation_message_is_kept_verbatim() {
        let t: TaskError = ProviderError::Generation("NSFW content detected".into()).into();
        assert_eq!(t.kind, TaskErrorKind::Generation);
        assert_eq!(t.message, "NSFW content detected");

        let t: TaskError = ProviderError::Timeout("60 attempts".into()).into();
        assert_eq!(t.kind, TaskErrorKind::Timeout);
    }
}
