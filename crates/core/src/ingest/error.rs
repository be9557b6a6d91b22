use std::fmt;

/// Carries which provider failed and at which stage, so callers can report it without parsing
/// error strings.
#[derive(Debug, Clone)]
pub struct ProviderDiagnosticsError {
    pub provider: &'static str,
    pub stage: &'static str,
    pub detail: String,
    /// HTTP status when the provider answered with a non-success code.
    pub status: Option<u16>,
}

impl ProviderDiagnosticsError {
    pub fn new(provider: &'static str, stage: &'static str, detail: impl Into<String>) -> Self {
        Self {
            provider,
            stage,
            detail: detail.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl fmt::Display for ProviderDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "provider error (provider={}, stage={}): {}",
            self.provider, self.stage, self.detail
        )
    }
}

impl std::error::Error for ProviderDiagnosticsError {}
