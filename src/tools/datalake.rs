//! Datalake HTTP fetchers.
//!
//! Three read-only fetches against the datalake exports:
//!
//! - commercial-close summary (raw JSON body, one record per closing date)
//! - regulatory-close summary (raw JSON body, BANDEJA4/BANDEJA8 milestones)
//! - per-task detail, filtered to one closing date and reduced to the 10
//!   longest tasks
//!
//! Endpoint URLs and the access token are read from the process environment
//! at call time. A missing variable fails that fetch with the key named in
//! the error; it never crashes the agent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client as HttpClient;

use super::errors::ToolError;
use super::registry::{fecha_parameters, no_parameters, required_fecha, Tool, ToolRegistry};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Commercial-close summary endpoint.
pub const RESUMEN_URL_VAR: &str = "CIERRE_RESUMEN_URL";

/// Regulatory-close summary endpoint.
pub const NORMATIVO_URL_VAR: &str = "CIERRE_NORMATIVO_URL";

/// Per-task detail endpoint.
pub const DETALLE_URL_VAR: &str = "CIERRE_DETALLE_URL";

/// Query-string access token appended to every endpoint URL.
pub const TOKEN_VAR: &str = "DATALAKE_TOKEN";

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request timeout per fetch.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How many task-detail records the detail fetch returns.
const TOP_TASK_LIMIT: usize = 10;

// ─── DatalakeClient ─────────────────────────────────────────────────────────

/// HTTP client over the datalake export endpoints.
pub struct DatalakeClient {
    http: HttpClient,
}

impl DatalakeClient {
    pub fn new() -> Result<Self, ToolError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ToolError::Http {
                url: "<datalake>".to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { http })
    }

    /// Commercial-close summary: the raw JSON body the export serves.
    pub async fn resumen_cierre_comercial(&self) -> Result<String, ToolError> {
        self.fetch_body(RESUMEN_URL_VAR).await
    }

    /// Regulatory-close summary: the raw JSON body the export serves.
    pub async fn resumen_cierre_normativo(&self) -> Result<String, ToolError> {
        self.fetch_body(NORMATIVO_URL_VAR).await
    }

    /// Per-task detail for one closing date: the export's records filtered
    /// to `fecha`, sorted by `DURACION_SEGUNDOS` descending, top 10. A date
    /// with no matching records yields an empty JSON array.
    pub async fn detalle_tareas(&self, fecha: NaiveDate) -> Result<String, ToolError> {
        let body = self.fetch_body(DETALLE_URL_VAR).await?;

        let records: Vec<serde_json::Value> =
            serde_json::from_str(&body).map_err(|e| ToolError::DataShape {
                reason: format!("detail body is not a JSON record array: {e}"),
            })?;

        let top = top_tasks_by_duration(records, fecha);
        serde_json::to_string(&top).map_err(|e| ToolError::DataShape {
            reason: format!("failed to encode records: {e}"),
        })
    }

    /// GET `{url}?{token}` for the endpoint configured under `url_var`.
    async fn fetch_body(&self, url_var: &str) -> Result<String, ToolError> {
        let endpoint = env_var(url_var)?;
        let token = env_var(TOKEN_VAR)?;
        let url = format!("{endpoint}?{token}");

        tracing::info!(endpoint = %endpoint, "fetching datalake export");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ToolError::Http {
                url: endpoint.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Http {
                url: endpoint,
                reason: format!("HTTP {status}"),
            });
        }

        response.text().await.map_err(|e| ToolError::Http {
            url: endpoint,
            reason: format!("failed to read body: {e}"),
        })
    }
}

/// Read a required environment variable, with the missing key surfaced in
/// the error.
fn env_var(key: &str) -> Result<String, ToolError> {
    std::env::var(key).map_err(|_| ToolError::MissingConfig {
        key: key.to_string(),
    })
}

/// Filter records to one closing date, sort by `DURACION_SEGUNDOS`
/// descending, keep the top 10.
///
/// The export timestamps its `FECHA_CIERRE` values, so a record matches
/// when the first 10 characters equal the ISO date.
fn top_tasks_by_duration(records: Vec<serde_json::Value>, fecha: NaiveDate) -> Vec<serde_json::Value> {
    let fecha_str = fecha.format("%Y-%m-%d").to_string();

    let mut matching: Vec<serde_json::Value> = records
        .into_iter()
        .filter(|rec| {
            rec.get("FECHA_CIERRE")
                .and_then(|v| v.as_str())
                .map(|s| s.get(..10) == Some(fecha_str.as_str()))
                .unwrap_or(false)
        })
        .collect();

    matching.sort_by(|a, b| {
        let da = duration_seconds(a);
        let db = duration_seconds(b);
        db.partial_cmp(&da).unwrap_or(std::cmp::Ordering::Equal)
    });

    matching.truncate(TOP_TASK_LIMIT);
    matching
}

fn duration_seconds(record: &serde_json::Value) -> f64 {
    record
        .get("DURACION_SEGUNDOS")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0)
}

// ─── Tools ──────────────────────────────────────────────────────────────────

/// Commercial-close summary over all available dates.
pub struct ResumenComercialTool {
    client: Arc<DatalakeClient>,
}

#[async_trait]
impl Tool for ResumenComercialTool {
    fn name(&self) -> &'static str {
        "obtener_datos_cierre_comercial"
    }

    fn description(&self) -> &'static str {
        "Retorna los datos del proceso de cierre comercial para todas las fechas \
         disponibles en formato json con los siguientes campos: \
         FECHA_CIERRE: fecha del cierre. \
         DURACION_TOTAL: duración de todo el proceso de cierre de cada fecha. \
         DURACION_SIN_PAUSAS: duración de las tareas de cierre sin contar las pausas. \
         INICIO_CIERRE: fecha y hora de inicio del cierre. \
         FIN_CIERRE: fecha y hora de fin de todo el cierre. \
         HORA_HABILITAR_MENU: fecha y hora en que finalizó la tarea de habilitar \
         menú, lo que permite abrir oficinas. Cuando dé este dato, puntualice si \
         se logró antes de las 8:00 am o no."
    }

    fn parameters(&self) -> serde_json::Value {
        no_parameters()
    }

    async fn invoke(&self, _args: &serde_json::Value) -> Result<String, ToolError> {
        self.client.resumen_cierre_comercial().await
    }
}

/// Top-10 longest tasks of the commercial close for one closing date.
pub struct DetalleTareasTool {
    client: Arc<DatalakeClient>,
}

#[async_trait]
impl Tool for DetalleTareasTool {
    fn name(&self) -> &'static str {
        "obtener_datos_tareas_mayor_duracion_por_fecha"
    }

    fn description(&self) -> &'static str {
        "Retorna los detalles de las tareas con mayor duración del cierre \
         comercial para una fecha. No tiene información del cierre completo, \
         solamente de las 10 tareas de mayor duración. Los campos en formato \
         json son: \
         FECHA_CIERRE: fecha del cierre. \
         DURACION_SEGUNDOS: duración de la tarea en segundos. \
         INICIO: fecha y hora de inicio de la tarea. \
         FIN: fecha y hora de fin de la tarea. \
         CODIGO_TAREA: identificador de la tarea. \
         DESCRIPCION_TAREA: descripción que complementa el código de la tarea. \
         Si el resultado es una lista vacía, no hay datos para esa fecha."
    }

    fn parameters(&self) -> serde_json::Value {
        fecha_parameters()
    }

    async fn invoke(&self, args: &serde_json::Value) -> Result<String, ToolError> {
        let fecha = required_fecha(self.name(), args)?;
        self.client.detalle_tareas(fecha).await
    }
}

/// Regulatory-close summary over all available dates.
pub struct ResumenNormativoTool {
    client: Arc<DatalakeClient>,
}

#[async_trait]
impl Tool for ResumenNormativoTool {
    fn name(&self) -> &'static str {
        "obtener_datos_cierre_normativo"
    }

    fn description(&self) -> &'static str {
        "Retorna los datos del cierre normativo para todas las fechas disponibles \
         en formato json con los siguientes campos: \
         FECHA_CIERRE: fecha del cierre. \
         INICIO_BANDEJA4: fecha y hora en la que inició el proceso para la Super \
         Financiera; no es relevante a menos que lo pregunten. \
         INICIO_BANDEJA8: fecha y hora en la que inició el proceso más demorado \
         del cierre; no es relevante a menos que lo pregunten. \
         FIN_BANDEJA4: fecha y hora en la que la información estuvo disponible \
         para entregar a la Super Financiera. \
         FIN_BANDEJA8: fecha y hora en la que finalizó todo el proceso de cierre."
    }

    fn parameters(&self) -> serde_json::Value {
        no_parameters()
    }

    async fn invoke(&self, _args: &serde_json::Value) -> Result<String, ToolError> {
        self.client.resumen_cierre_normativo().await
    }
}

/// Registry for the datalake backend, in the order the model sees them:
/// commercial summary, per-date task detail, regulatory summary.
pub fn datalake_registry(client: Arc<DatalakeClient>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(ResumenComercialTool {
        client: Arc::clone(&client),
    });
    registry.register(DetalleTareasTool {
        client: Arc::clone(&client),
    });
    registry.register(ResumenNormativoTool { client });
    registry
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn task(fecha: &str, codigo: &str, segundos: f64) -> serde_json::Value {
        serde_json::json!({
            "FECHA_CIERRE": fecha,
            "CODIGO_TAREA": codigo,
            "DESCRIPCION_TAREA": "tarea",
            "DURACION_SEGUNDOS": segundos,
            "INICIO": "2024-05-10 22:00:00",
            "FIN": "2024-05-10 23:00:00",
        })
    }

    fn fecha(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn top_tasks_filters_by_closing_date() {
        let records = vec![
            task("2024-05-10", "A", 100.0),
            task("2024-05-09", "B", 900.0),
            task("2024-05-10", "C", 50.0),
        ];
        let top = top_tasks_by_duration(records, fecha(2024, 5, 10));
        let codes: Vec<&str> = top
            .iter()
            .map(|r| r["CODIGO_TAREA"].as_str().unwrap())
            .collect();
        assert_eq!(codes, vec!["A", "C"]);
    }

    #[test]
    fn top_tasks_matches_timestamped_dates() {
        let records = vec![task("2024-05-10T00:00:00.000", "A", 100.0)];
        let top = top_tasks_by_duration(records, fecha(2024, 5, 10));
        assert_eq!(top.len(), 1);
    }

    #[test]
    fn top_tasks_sorts_descending_and_caps_at_ten() {
        let records: Vec<serde_json::Value> = (1..=12)
            .map(|i| task("2024-05-10", &format!("T{i:02}"), f64::from(i) * 60.0))
            .collect();

        let top = top_tasks_by_duration(records, fecha(2024, 5, 10));
        assert_eq!(top.len(), 10);
        assert_eq!(top[0]["CODIGO_TAREA"], "T12");
        assert_eq!(top[9]["CODIGO_TAREA"], "T03");
    }

    #[test]
    fn top_tasks_with_no_match_is_empty() {
        let records = vec![task("2024-05-09", "A", 100.0)];
        let top = top_tasks_by_duration(records, fecha(2024, 5, 10));
        assert!(top.is_empty());
    }

    #[tokio::test]
    async fn missing_endpoint_variable_is_a_config_error() {
        std::env::remove_var("CIERRE_TEST_MISSING_URL");
        let err = env_var("CIERRE_TEST_MISSING_URL").unwrap_err();
        assert!(matches!(
            err,
            ToolError::MissingConfig { ref key } if key == "CIERRE_TEST_MISSING_URL"
        ));
    }

    #[tokio::test]
    async fn registry_lists_datalake_tools_in_order() {
        let registry = datalake_registry(Arc::new(DatalakeClient::new().unwrap()));
        assert_eq!(
            registry.names(),
            vec![
                "obtener_datos_cierre_comercial",
                "obtener_datos_tareas_mayor_duracion_por_fecha",
                "obtener_datos_cierre_normativo",
            ]
        );
    }
}
