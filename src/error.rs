use thiserror::Error;

/// Invocation-local failure taxonomy. Each variant maps to its own HTTP
/// status so a caller can tell a bad request from a vendor-side failure
/// without reading logs. Nothing here is retried or persisted.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or invalid configuration, caught before any network call.
    #[error("configuration error: {0}")]
    Config(String),

    /// The secret store could not produce a usable login/password pair.
    #[error("secret store error: {0}")]
    Secrets(String),

    /// Network failure or non-success HTTP status from the vendor API.
    #[error("vendor transport error: {message}")]
    Transport {
        message: String,
        response_text: Option<String>,
    },

    /// The vendor processed the request but the response carried no
    /// `output` element. Distinct from a transport failure.
    #[error("vendor returned no usable data")]
    NoData { response_text: String },

    /// The export payload did not have the shape it claims to have.
    #[error("export parse error: {0}")]
    Parse(String),

    /// The warehouse rejected or failed the load job.
    #[error("warehouse load error: {0}")]
    Load(String),
}

impl PipelineError {
    /// HTTP status for the trigger response.
    pub fn status(&self) -> u16 {
        match self {
            PipelineError::Config(_) => 400,
            PipelineError::Transport { .. } => 502,
            PipelineError::Secrets(_)
            | PipelineError::NoData { .. }
            | PipelineError::Parse(_)
            | PipelineError::Load(_) => 500,
        }
    }

    /// Raw vendor response text, when the failure carries one for diagnosis.
    pub fn response_text(&self) -> Option<&str> {
        match self {
            PipelineError::NoData { response_text } => Some(response_text),
            PipelineError::Transport {
                response_text: Some(text),
                ..
            } => Some(text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_client_errors() {
        assert_eq!(PipelineError::Config("missing ACCOUNT".into()).status(), 400);
    }

    #[test]
    fn no_data_is_a_server_error_with_diagnostics() {
        let err = PipelineError::NoData {
            response_text: "<error>bad filter</error>".into(),
        };
        assert_eq!(err.status(), 500);
        assert_eq!(err.response_text(), Some("<error>bad filter</error>"));
    }

    #[test]
    fn transport_errors_surface_body_when_present() {
        let err = PipelineError::Transport {
            message: "vendor returned HTTP 503".into(),
            response_text: Some("overloaded".into()),
        };
        assert_eq!(err.status(), 502);
        assert_eq!(err.response_text(), Some("overloaded"));

        let err = PipelineError::Transport {
            message: "connection refused".into(),
            response_text: None,
        };
        assert_eq!(err.response_text(), None);
    }
}
