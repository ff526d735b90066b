//! Closing-events SQL fetchers.
//!
//! Wraps the `Cierre` table (one row per executed closing task: closing
//! date, task code, task description, duration in seconds, start and end
//! timestamps). Two read-only queries are exposed as tools:
//!
//! - per-date aggregate summary of the whole closing run
//! - the 10 longest-running tasks for one closing date
//!
//! Uses `rusqlite` in synchronous mode behind a mutex; the queries are
//! small aggregations and the agent loop runs them one at a time.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::Connection;

use super::errors::ToolError;
use super::registry::{fecha_parameters, no_parameters, required_fecha, Tool, ToolRegistry};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Task code marking non-working idle intervals, excluded from the
/// pause-free duration.
pub const PAUSE_TASK_CODE: &str = "PAUSA";

/// Task description marking the "menu enabled" milestone that gates office
/// opening the next business day.
pub const MENU_TASK_DESCRIPTION: &str = "Habilita accesos al menu";

/// How many task-detail rows the top-N query returns.
const TOP_TASK_LIMIT: u32 = 10;

// ─── ClosingDb ──────────────────────────────────────────────────────────────

/// Handle over the closing-events SQLite database.
///
/// The table is loaded by an external batch; this handle only reads it.
/// Pass `":memory:"` for an in-memory database (tests).
pub struct ClosingDb {
    conn: Mutex<Connection>,
}

impl ClosingDb {
    pub fn open(path: &str) -> Result<Self, ToolError> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run arbitrary setup SQL. Test fixture hook only.
    #[cfg(test)]
    pub(crate) fn execute_batch_for_tests(&self, sql: &str) {
        self.conn.lock().unwrap().execute_batch(sql).unwrap();
    }

    /// Aggregate summary of every closing date: total duration, duration
    /// without pauses, first start, last end, and the completion time of
    /// the menu-enable milestone. One JSON record per closing date.
    pub fn resumen_cierre(&self) -> Result<String, ToolError> {
        let conn = self.conn.lock().map_err(|e| ToolError::Database {
            reason: format!("connection lock poisoned: {e}"),
        })?;

        let mut stmt = conn.prepare(
            "SELECT FECHA_CIERRE,
                    TIME(SUM(DURACION), 'unixepoch') AS DURACION_TOTAL,
                    TIME(SUM(IIF(CODIGO_TAREA = ?1, 0, DURACION)), 'unixepoch')
                        AS DURACION_SIN_PAUSAS,
                    DATETIME(MIN(INICIO)) AS INICIO_CIERRE,
                    DATETIME(MAX(FIN)) AS FIN_CIERRE,
                    DATETIME(MAX(IIF(DESCRIPCION_TAREA = ?2, FIN, 0)))
                        AS HORA_HABILITAR_MENU
             FROM Cierre
             WHERE FECHA_CIERRE IS NOT NULL
             GROUP BY FECHA_CIERRE",
        )?;

        let rows = stmt.query_map(
            rusqlite::params![PAUSE_TASK_CODE, MENU_TASK_DESCRIPTION],
            |row| {
                Ok(serde_json::json!({
                    "FECHA_CIERRE": row.get::<_, Option<String>>(0)?,
                    "DURACION_TOTAL": row.get::<_, Option<String>>(1)?,
                    "DURACION_SIN_PAUSAS": row.get::<_, Option<String>>(2)?,
                    "INICIO_CIERRE": row.get::<_, Option<String>>(3)?,
                    "FIN_CIERRE": row.get::<_, Option<String>>(4)?,
                    "HORA_HABILITAR_MENU": row.get::<_, Option<String>>(5)?,
                }))
            },
        )?;

        let records = rows.collect::<Result<Vec<_>, _>>()?;
        encode_records(records)
    }

    /// The top 10 longest tasks for one closing date, duration descending.
    /// A date with no rows yields an empty JSON array, not an error.
    pub fn tareas_mayor_duracion(&self, fecha: chrono::NaiveDate) -> Result<String, ToolError> {
        let conn = self.conn.lock().map_err(|e| ToolError::Database {
            reason: format!("connection lock poisoned: {e}"),
        })?;

        let mut stmt = conn.prepare(
            "SELECT FECHA_CIERRE,
                    TIME(DURACION, 'unixepoch') AS DURACION,
                    CODIGO_TAREA,
                    DESCRIPCION_TAREA,
                    DATETIME(INICIO) AS INICIO,
                    DATETIME(FIN) AS FIN
             FROM Cierre
             WHERE FECHA_CIERRE = ?1
             ORDER BY DURACION DESC
             LIMIT ?2",
        )?;

        let fecha_str = fecha.format("%Y-%m-%d").to_string();
        let rows = stmt.query_map(rusqlite::params![fecha_str, TOP_TASK_LIMIT], |row| {
            Ok(serde_json::json!({
                "FECHA_CIERRE": row.get::<_, Option<String>>(0)?,
                "DURACION": row.get::<_, Option<String>>(1)?,
                "CODIGO_TAREA": row.get::<_, Option<String>>(2)?,
                "DESCRIPCION_TAREA": row.get::<_, Option<String>>(3)?,
                "INICIO": row.get::<_, Option<String>>(4)?,
                "FIN": row.get::<_, Option<String>>(5)?,
            }))
        })?;

        let records = rows.collect::<Result<Vec<_>, _>>()?;
        encode_records(records)
    }
}

fn encode_records(records: Vec<serde_json::Value>) -> Result<String, ToolError> {
    serde_json::to_string(&records).map_err(|e| ToolError::DataShape {
        reason: format!("failed to encode records: {e}"),
    })
}

// ─── Tools ──────────────────────────────────────────────────────────────────

/// Aggregate closing summary over all available dates.
pub struct ResumenCierreTool {
    db: Arc<ClosingDb>,
}

#[async_trait]
impl Tool for ResumenCierreTool {
    fn name(&self) -> &'static str {
        "obtener_datos_por_proceso_de_cierre"
    }

    fn description(&self) -> &'static str {
        "Retorna los datos del proceso de cierre para todas las fechas disponibles \
         en formato json con los siguientes campos: \
         FECHA_CIERRE: fecha del cierre. \
         DURACION_TOTAL: duración de todo el proceso de cierre de cada fecha. \
         DURACION_SIN_PAUSAS: duración de las tareas de cierre sin contar las pausas. \
         INICIO_CIERRE: fecha y hora de inicio del cierre. \
         FIN_CIERRE: fecha y hora de fin de todo el cierre. \
         HORA_HABILITAR_MENU: fecha y hora en que finalizó la tarea de habilitar \
         menú, lo que permite abrir oficinas."
    }

    fn parameters(&self) -> serde_json::Value {
        no_parameters()
    }

    async fn invoke(&self, _args: &serde_json::Value) -> Result<String, ToolError> {
        self.db.resumen_cierre()
    }
}

/// Top-10 longest tasks for one closing date.
pub struct TareasMayorDuracionTool {
    db: Arc<ClosingDb>,
}

#[async_trait]
impl Tool for TareasMayorDuracionTool {
    fn name(&self) -> &'static str {
        "obtener_datos_tareas_mayor_duracion_por_fecha"
    }

    fn description(&self) -> &'static str {
        "Retorna los detalles de las tareas con mayor duración de una fecha de \
         cierre. No tiene información del cierre completo, solamente de las 10 \
         tareas de mayor duración. Los campos en formato json son: \
         FECHA_CIERRE: fecha del cierre. \
         DURACION: duración de la tarea en ejecución. \
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
        self.db.tareas_mayor_duracion(fecha)
    }
}

/// Registry for the SQLite backend: aggregate summary + per-date top-N.
pub fn sqlite_registry(db: Arc<ClosingDb>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(ResumenCierreTool { db: Arc::clone(&db) });
    registry.register(TareasMayorDuracionTool { db });
    registry
}

// ─── Tests ──────────────────────────────────────────────────────────────────
