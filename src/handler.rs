use crate::config::{QueryConfig, Settings};
use crate::error::PipelineError;
use crate::secrets::SecretStore;
use crate::transform;
use crate::vendor::{self, VendorClient};
use crate::warehouse::{LoadReport, LoadSpec, TableRef, Warehouse};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Marker strings for the trigger response body.
pub const SUCCESS_MARKER: &str = "planning export loaded";
pub const ERROR_MARKER: &str = "planning export error";

/// Process-wide collaborators behind the trigger route. Settings are
/// read-only; the clients are shared and stateless across invocations.
pub struct AppState {
    pub settings: Settings,
    pub secrets: Arc<dyn SecretStore>,
    pub vendor: Arc<dyn VendorClient>,
    pub warehouse: Arc<dyn Warehouse>,
}

/// What a completed invocation hands back to the HTTP layer.
pub struct PipelineOutcome {
    pub report: LoadReport,
    /// Rows in this batch (the final table may hold more in append mode).
    pub rows_loaded: usize,
    /// Raw vendor response, echoed in the trigger response.
    pub response_text: String,
}

/// One invocation: configuring → fetching → transforming → loading. Each
/// stage either completes or fails the whole invocation; nothing is
/// retried and nothing outlives the request.
pub async fn run_pipeline(
    state: &AppState,
    query: &HashMap<String, String>,
) -> Result<PipelineOutcome, PipelineError> {
    let cfg = QueryConfig::resolve(query)?;
    info!(
        period = %cfg.period(),
        dim = %cfg.dim,
        accounts = cfg.accounts.len(),
        single_period = cfg.is_single_period(),
        "invocation configured"
    );

    let creds = state.secrets.credentials().await?;
    let request_body =
        vendor::request::build_export_request(&cfg, &creds, &state.settings.export_options)?;

    info!("fetching export");
    let response_text = state.vendor.export(request_body).await?;
    let _spool = spool_raw_response(&response_text);

    let export = vendor::parser::parse_export(&response_text)?;

    info!(rows = export.rows.len(), "transforming export");
    let table = transform::normalize(&export, &cfg)?;
    let rows_loaded = table.num_rows();

    let spec = LoadSpec::for_table(
        TableRef {
            project: state.settings.gcp_project.clone(),
            dataset: state.settings.dataset_id.clone(),
            table: state.settings.table_id.clone(),
        },
        &table,
        state.settings.disposition,
    );
    let report = state.warehouse.load(&spec, &table).await?;

    Ok(PipelineOutcome {
        report,
        rows_loaded,
        response_text,
    })
}

/// Run the pipeline and translate the outcome into an HTTP status and JSON
/// body. Every failure class gets a distinguishable response; the raw
/// vendor text rides along whenever the failure carries one.
pub async fn handle_trigger(state: &AppState, query: &HashMap<String, String>) -> (u16, Value) {
    match run_pipeline(state, query).await {
        Ok(outcome) => {
            let body = json!({
                "success": SUCCESS_MARKER,
                "response_text": outcome.response_text,
                "rows_loaded": outcome.rows_loaded,
                "table_rows": outcome.report.table_rows,
                "columns": outcome.report.columns,
            });
            (200, body)
        }
        Err(err) => {
            warn!(status = err.status(), error = %err, "invocation failed");
            let mut body = json!({
                "error": ERROR_MARKER,
                "detail": err.to_string(),
            });
            if let Some(text) = err.response_text() {
                body["response_text"] = json!(text);
            }
            (err.status(), body)
        }
    }
}

/// Spool the raw vendor response to a per-invocation temp file, purely as
/// a debugging convenience. The unique path means concurrent invocations
/// cannot race, and the file disappears when the handle drops at the end
/// of the invocation.
fn spool_raw_response(text: &str) -> Option<tempfile::NamedTempFile> {
    let mut file = match tempfile::NamedTempFile::new() {
        Ok(file) => file,
        Err(e) => {
            warn!("failed to create spool file: {e}");
            return None;
        }
    };
    if let Err(e) = file.write_all(text.as_bytes()) {
        warn!("failed to spool raw response: {e}");
        return None;
    }
    debug!(path = %file.path().display(), "raw response spooled");
    Some(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::Credentials;
    use crate::transform::Table;
    use crate::vendor::request::ExportOptions;
    use crate::warehouse::WriteDisposition;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use url::Url;

    const SAMPLE_RESPONSE: &str = "<response><output><![CDATA[\"Account Name\",\"Account Code\",\"Level Name\",\"FI\",\"202401\"\n\"\"\"Revenue\"\"\",\"\"\"REV001\"\"\",\"\"\"H500A\"\"\",\"\"\"EU\"\"\",\"1000.50\"]]></output></response>";
    const NO_DATA_RESPONSE: &str =
        "<response success='false'><messages><message>bad filter</message></messages></response>";

    struct StaticSecrets;

    #[async_trait]
    impl SecretStore for StaticSecrets {
        async fn credentials(&self) -> Result<Credentials, PipelineError> {
            Ok(Credentials {
                login: "svc@example.com".into(),
                password: "hunter2".into(),
            })
        }
    }

    struct CannedVendor {
        body: String,
        calls: AtomicUsize,
    }

    impl CannedVendor {
        fn new(body: &str) -> Self {
            CannedVendor {
                body: body.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl VendorClient for CannedVendor {
        async fn export(&self, _request_body: String) -> Result<String, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.clone())
        }
    }

    #[derive(Default)]
    struct RecordingWarehouse {
        loads: Mutex<Vec<(LoadSpec, usize)>>,
    }

    #[async_trait]
    impl Warehouse for RecordingWarehouse {
        async fn load(&self, spec: &LoadSpec, table: &Table) -> Result<LoadReport, PipelineError> {
            self.loads
                .lock()
                .unwrap()
                .push((spec.clone(), table.num_rows()));
            Ok(LoadReport {
                table_rows: table.num_rows() as u64,
                columns: spec.schema.len(),
            })
        }
    }

    fn test_settings() -> Settings {
        Settings {
            endpoint: Url::parse("https://vendor.example/api/v1").unwrap(),
            gcp_project: "proj".into(),
            secret_id: "secret".into(),
            dataset_id: "ds".into(),
            table_id: "wap".into(),
            disposition: WriteDisposition::Truncate,
            export_options: ExportOptions::default(),
        }
    }

    fn full_query() -> HashMap<String, String> {
        [
            ("START_DATE", "2024/01"),
            ("ACCOUNT", "REV001"),
            ("LEVEL_NAME", "H500A"),
            ("DIM_NAME", "FI"),
            ("DIM", "FI"),
            ("VERSION_NAME", "Working Budget"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn state_with(
        vendor: Arc<CannedVendor>,
        warehouse: Arc<RecordingWarehouse>,
    ) -> AppState {
        AppState {
            settings: test_settings(),
            secrets: Arc::new(StaticSecrets),
            vendor,
            warehouse,
        }
    }

    #[tokio::test]
    async fn successful_invocation_loads_and_reports() {
        let vendor = Arc::new(CannedVendor::new(SAMPLE_RESPONSE));
        let warehouse = Arc::new(RecordingWarehouse::default());
        let state = state_with(vendor.clone(), warehouse.clone());

        let (status, body) = handle_trigger(&state, &full_query()).await;

        assert_eq!(status, 200);
        assert_eq!(body["success"], SUCCESS_MARKER);
        assert_eq!(body["response_text"], SAMPLE_RESPONSE);
        assert_eq!(body["rows_loaded"], 1);

        let loads = warehouse.loads.lock().unwrap();
        assert_eq!(loads.len(), 1);
        let (spec, rows) = &loads[0];
        assert_eq!(*rows, 1);
        assert_eq!(spec.table.to_string(), "proj.ds.wap");
        assert_eq!(spec.disposition, WriteDisposition::Truncate);
        assert_eq!(spec.schema.len(), 8);
    }

    #[tokio::test]
    async fn missing_output_element_is_a_500_error() {
        let vendor = Arc::new(CannedVendor::new(NO_DATA_RESPONSE));
        let warehouse = Arc::new(RecordingWarehouse::default());
        let state = state_with(vendor, warehouse.clone());

        let (status, body) = handle_trigger(&state, &full_query()).await;

        assert_eq!(status, 500);
        assert_eq!(body["error"], ERROR_MARKER);
        assert_eq!(body["response_text"], NO_DATA_RESPONSE);
        assert!(body.get("success").is_none());
        assert!(warehouse.loads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_parameter_fails_fast_with_400() {
        let vendor = Arc::new(CannedVendor::new(SAMPLE_RESPONSE));
        let warehouse = Arc::new(RecordingWarehouse::default());
        let state = state_with(vendor.clone(), warehouse.clone());

        let mut query = full_query();
        query.remove("DIM_NAME");
        // no env fallback for DIM_NAME in the test environment
        std::env::remove_var("DIM_NAME");

        let (status, body) = handle_trigger(&state, &query).await;

        assert_eq!(status, 400);
        assert_eq!(body["error"], ERROR_MARKER);
        assert_eq!(vendor.calls.load(Ordering::SeqCst), 0);
        assert!(warehouse.loads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn arity_mismatch_aborts_before_any_load() {
        let vendor = Arc::new(CannedVendor::new(
            "<response><output>A,B,C\n1,2</output></response>",
        ));
        let warehouse = Arc::new(RecordingWarehouse::default());
        let state = state_with(vendor, warehouse.clone());

        let (status, body) = handle_trigger(&state, &full_query()).await;

        assert_eq!(status, 500);
        assert!(body["detail"].as_str().unwrap().contains("parse error"));
        assert!(warehouse.loads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_data_rows_still_succeeds() {
        let vendor = Arc::new(CannedVendor::new(
            "<response><output>\"Account Name\",\"Account Code\",\"Level Name\",\"FI\",\"202401\"</output></response>",
        ));
        let warehouse = Arc::new(RecordingWarehouse::default());
        let state = state_with(vendor, warehouse.clone());

        let (status, body) = handle_trigger(&state, &full_query()).await;

        assert_eq!(status, 200);
        assert_eq!(body["rows_loaded"], 0);
        // the (empty) batch still goes to the warehouse so truncate mode
        // can clear the table
        assert_eq!(warehouse.loads.lock().unwrap().len(), 1);
    }
}
