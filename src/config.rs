use crate::error::PipelineError;
use crate::vendor::request::ExportOptions;
use crate::warehouse::WriteDisposition;
use std::collections::HashMap;
use std::env;
use url::Url;

/// Default vendor endpoint, overridable via `WAP_ENDPOINT`.
pub const DEFAULT_ENDPOINT: &str = "https://api.adaptiveinsights.com/api/v36";

/// Process-wide service settings, resolved once at startup. Read-only for
/// the lifetime of the process; per-invocation parameters live in
/// [`QueryConfig`].
#[derive(Debug, Clone)]
pub struct Settings {
    /// Vendor API endpoint (versioned).
    pub endpoint: Url,
    /// GCP project that owns both the secret and the target dataset.
    pub gcp_project: String,
    /// Secret Manager secret id holding the vendor login/password JSON.
    pub secret_id: String,
    pub dataset_id: String,
    pub table_id: String,
    /// Load mode for the target table.
    pub disposition: WriteDisposition,
    /// Vendor-side toggles carried on every export call.
    pub export_options: ExportOptions,
}

impl Settings {
    pub fn from_env() -> Result<Self, PipelineError> {
        let endpoint_str =
            env::var("WAP_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        let endpoint = Url::parse(&endpoint_str).map_err(|e| {
            PipelineError::Config(format!("WAP_ENDPOINT `{endpoint_str}` is not a URL: {e}"))
        })?;

        let disposition = match env::var("WRITE_DISPOSITION") {
            Ok(raw) => WriteDisposition::parse(&raw)
                .ok_or_else(|| PipelineError::Config(format!(
                    "WRITE_DISPOSITION `{raw}` is not one of `truncate`, `append`"
                )))?,
            Err(_) => WriteDisposition::Truncate,
        };

        let mut export_options = ExportOptions::default();
        if let Ok(name) = env::var("CALLER_NAME") {
            export_options.caller_name = name;
        }

        Ok(Settings {
            endpoint,
            gcp_project: require_env("GCP_PROJECT")?,
            secret_id: env::var("SECRET_ID").unwrap_or_else(|_| "adaptive_login".to_string()),
            dataset_id: require_env("DATASET_ID")?,
            table_id: require_env("TABLE_ID")?,
            disposition,
            export_options,
        })
    }
}

fn require_env(key: &str) -> Result<String, PipelineError> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(PipelineError::Config(format!("{key} env var missing"))),
    }
}

/// Requested time bucket(s). `start == end` selects the single-period
/// variant of the pipeline; a wider span keeps one value column per period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSpan {
    pub start: String,
    pub end: String,
}

/// Per-invocation vendor query parameters, resolved from the trigger's
/// query string with environment fallbacks. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    /// Ordered account codes to filter on.
    pub accounts: Vec<String>,
    pub level_name: String,
    pub dim_name: String,
    /// Value of the requested dimension.
    pub dim: String,
    pub version_name: String,
    pub span: TimeSpan,
}

impl QueryConfig {
    /// Resolve parameters: trigger query string first, environment default
    /// second. Missing required parameters fail fast before any network
    /// call is made.
    pub fn resolve(query: &HashMap<String, String>) -> Result<Self, PipelineError> {
        Self::resolve_with(query, |key| env::var(key).ok())
    }

    /// Same as [`resolve`](Self::resolve) with an explicit fallback lookup.
    pub fn resolve_with(
        query: &HashMap<String, String>,
        fallback: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, PipelineError> {
        let get = |key: &str| -> Result<String, PipelineError> {
            query
                .get(key)
                .cloned()
                .or_else(|| fallback(key))
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| PipelineError::Config(format!("missing required parameter {key}")))
        };

        let start = get("START_DATE")?;
        let end = query
            .get("END_DATE")
            .cloned()
            .or_else(|| fallback("END_DATE"))
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| start.clone());

        let accounts: Vec<String> = get("ACCOUNT")?
            .split(',')
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        if accounts.is_empty() {
            return Err(PipelineError::Config(
                "ACCOUNT resolved to an empty account list".into(),
            ));
        }

        Ok(QueryConfig {
            accounts,
            level_name: get("LEVEL_NAME")?,
            dim_name: get("DIM_NAME")?,
            dim: get("DIM")?,
            version_name: get("VERSION_NAME")?,
            span: TimeSpan { start, end },
        })
    }

    /// Period token: the start date with `/` removed, e.g. `01/2024` →
    /// `012024`. This is both the derived `Period` column value and, in the
    /// single-period variant, the vendor's value-column header.
    pub fn period(&self) -> String {
        self.span.start.replace('/', "")
    }

    /// The dimension name as it appears in the cleaned export header.
    pub fn dim_label(&self) -> String {
        self.dim_name.replace('/', "")
    }

    pub fn is_single_period(&self) -> bool {
        self.span.start == self.span.end
    }
}
