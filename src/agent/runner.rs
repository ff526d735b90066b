//! Routing agent — the per-turn tool-call state machine.
//!
//! One user turn runs: append the user message → invoke the model with the
//! full session history and the tool registry → if the model requests
//! tools, execute them, fold the results back into the history, and invoke
//! the model again → return the model's final text. A configurable round
//! bound guarantees termination against a model that never stops calling
//! tools.
//!
//! The runner is generic over [`ChatModel`] so tests drive the loop with a
//! deterministic scripted model.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::config::AgentSettings;
use crate::inference::client::ChatModel;
use crate::inference::types::ChatMessage;
use crate::tools::errors::ToolError;
use crate::tools::registry::ToolRegistry;

use super::errors::AgentError;
use super::session::{SessionStore, StoredMessage};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Maximum characters allowed in a single tool result before truncation.
///
/// Prevents one verbose export from flooding the replayed context on every
/// subsequent round of the conversation.
const MAX_TOOL_RESULT_CHARS: usize = 6_000;

/// Payload fed to the model in place of a failed fetch. The system
/// instruction tells the model to report missing data, and an empty
/// collection is exactly what "no data" looks like to it.
const DEGRADED_EMPTY_RESULT: &str = "[]";

// ─── Turn reporting ─────────────────────────────────────────────────────────

/// One executed tool invocation within a turn, for step-by-step display.
#[derive(Debug, Clone)]
pub struct ToolStep {
    pub tool: String,
    pub arguments: serde_json::Value,
    pub ok: bool,
}

/// The outcome of one user turn.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub answer: String,
    pub steps: Vec<ToolStep>,
}

// ─── AgentRunner ────────────────────────────────────────────────────────────

/// The routing agent: session-scoped memory plus the model/tool loop.
pub struct AgentRunner<M: ChatModel> {
    model: M,
    registry: ToolRegistry,
    store: Arc<SessionStore>,
    settings: AgentSettings,
    /// Per-thread turn locks: two turns for the same `thread_id` are
    /// serialized to preserve the append-order invariant; distinct threads
    /// proceed concurrently.
    turn_locks: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<M: ChatModel> AgentRunner<M> {
    pub fn new(
        model: M,
        registry: ToolRegistry,
        store: Arc<SessionStore>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            model,
            registry,
            store,
            settings,
            turn_locks: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Answer one user message within the session `thread_id`.
    pub async fn get_response(
        &self,
        thread_id: &str,
        user_text: &str,
    ) -> Result<String, AgentError> {
        self.run_turn(thread_id, user_text)
            .await
            .map(|report| report.answer)
    }

    /// Answer one user message, also reporting the tool steps taken.
    pub async fn run_turn(
        &self,
        thread_id: &str,
        user_text: &str,
    ) -> Result<TurnReport, AgentError> {
        let turn_lock = self.turn_lock(thread_id).await;
        let _guard = turn_lock.lock().await;

        self.store.append(thread_id, StoredMessage::user(user_text));

        let mut steps: Vec<ToolStep> = Vec::new();
        let max_rounds = self.settings.max_tool_rounds;

        for round in 0..max_rounds {
            let messages = self.build_request_messages(thread_id);

            tracing::info!(
                session_id = %thread_id,
                round = round,
                message_count = messages.len(),
                "invoking model"
            );

            let turn = self
                .model
                .complete(messages, self.registry.definitions())
                .await?;

            if turn.is_final_answer() {
                let answer = turn.text.unwrap_or_default();
                self.store
                    .append(thread_id, StoredMessage::assistant(answer.clone()));
                tracing::info!(
                    session_id = %thread_id,
                    round = round,
                    answer_len = answer.len(),
                    tool_steps = steps.len(),
                    "turn complete"
                );
                return Ok(TurnReport { answer, steps });
            }

            // Tool round: persist the assistant's request, execute each
            // call, feed the results back.
            self.store.append(
                thread_id,
                StoredMessage::assistant_tool_calls(turn.tool_calls.clone()),
            );

            for tc in &turn.tool_calls {
                let (payload, ok) = self.execute_tool(thread_id, &tc.name, &tc.arguments).await;
                steps.push(ToolStep {
                    tool: tc.name.clone(),
                    arguments: tc.arguments.clone(),
                    ok,
                });
                self.store
                    .append(thread_id, StoredMessage::tool_result(tc.id.clone(), payload));
            }
        }

        tracing::warn!(
            session_id = %thread_id,
            rounds = max_rounds,
            "tool-call loop exceeded the round bound"
        );
        Err(AgentError::ToolLoopExceeded { rounds: max_rounds })
    }

    /// Execute one tool call, degrading failures into model-readable text.
    ///
    /// Returns `(payload, ok)`. A failed fetch becomes an empty collection
    /// and an unknown tool becomes a recovery notice; the turn itself never
    /// aborts on a tool failure.
    async fn execute_tool(
        &self,
        thread_id: &str,
        name: &str,
        arguments: &serde_json::Value,
    ) -> (String, bool) {
        match self.registry.invoke(name, arguments).await {
            Ok(payload) => {
                tracing::info!(
                    session_id = %thread_id,
                    tool = %name,
                    result_len = payload.len(),
                    "tool execution complete"
                );
                (truncate_tool_result(&payload, name), true)
            }
            Err(ToolError::UnknownTool { name }) => {
                tracing::warn!(session_id = %thread_id, tool = %name, "model requested unknown tool");
                (
                    format!(
                        "Herramienta desconocida: '{name}'. Use únicamente las \
                         herramientas disponibles."
                    ),
                    false,
                )
            }
            Err(e) => {
                tracing::error!(
                    session_id = %thread_id,
                    tool = %name,
                    error = %e,
                    "tool execution failed, feeding degraded empty result"
                );
                (DEGRADED_EMPTY_RESULT.to_string(), false)
            }
        }
    }

    /// Fixed system instruction + the full ordered session history.
    fn build_request_messages(&self, thread_id: &str) -> Vec<ChatMessage> {
        let today = chrono::Local::now().date_naive();
        let mut messages = vec![ChatMessage::system(system_instruction(today))];
        messages.extend(
            self.store
                .history(thread_id)
                .iter()
                .map(StoredMessage::to_chat_message),
        );
        messages
    }

    async fn turn_lock(&self, thread_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.turn_locks.lock().await;
        Arc::clone(locks.entry(thread_id.to_string()).or_default())
    }
}

// ─── System instruction ─────────────────────────────────────────────────────

/// The fixed policy the model answers under: Spanish, executive tone,
/// closing-process domain only, commercial close by default. Augmented with
/// the current calendar date so relative date references resolve, plus one
/// worked example of the desired phrasing.
pub fn system_instruction(today: NaiveDate) -> String {
    format!(
        "Eres un asistente experto en el proceso de cierre diario y tienes acceso \
         a la información del cierre comercial y del cierre normativo.\n\
         Responde siempre en español, con respuestas gerenciales y concisas: \
         entrega solamente la respuesta a la pregunta de manera concreta.\n\
         Identifica primero si la pregunta es sobre todo el cierre o sobre las \
         tareas de mayor duración para elegir la herramienta más adecuada.\n\
         Para responder sobre las tareas de mayor duración de una fecha \
         específica, primero valide si hay datos para esa fecha de cierre; si \
         la herramienta retorna una lista vacía, informe que no hay datos para \
         esa fecha.\n\
         Cuando no especifiquen si preguntan sobre cierre comercial o \
         normativo, asume que es cierre comercial.\n\
         Cuando informe la hora de habilitar menú, puntualice si se logró antes \
         de las 8:00 am o no.\n\
         Si la pregunta no está relacionada con los procesos de cierre, indica \
         amablemente que solo puedes responder sobre el proceso de cierre y no \
         utilices ninguna herramienta.\n\
         La fecha de hoy es {today}.\n\n\
         Ejemplo del estilo de respuesta deseado:\n\
         Pregunta: ¿a qué hora se habilitó el menú el 2024-05-10?\n\
         Respuesta: El menú se habilitó a las 06:10, antes de las 8:00 am, por \
         lo que las oficinas pudieron abrir a tiempo."
    )
}

// ─── Tool result truncation ─────────────────────────────────────────────────

/// Truncate a tool result if it exceeds [`MAX_TOOL_RESULT_CHARS`].
///
/// Preserves the beginning of the payload and appends a truncation notice.
fn truncate_tool_result(result: &str, tool_name: &str) -> String {
    if result.len() <= MAX_TOOL_RESULT_CHARS {
        return result.to_string();
    }

    tracing::warn!(
        tool = %tool_name,
        original_len = result.len(),
        truncated_to = MAX_TOOL_RESULT_CHARS,
        "tool result truncated"
    );
    format!(
        "{}\n\n[... truncado: se muestran los primeros {MAX_TOOL_RESULT_CHARS} de {} caracteres]",
        truncate_utf8(result, MAX_TOOL_RESULT_CHARS),
        result.len()
    )
}

/// Truncate a string to at most `max_bytes` bytes on a valid UTF-8 char
/// boundary.
fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::inference::types::{ModelTurn, Role, ToolCall, ToolDefinition};
    use crate::inference::InferenceError;
    use crate::tools::registry::{no_parameters, Tool};
    use crate::tools::sqlite::{sqlite_registry, ClosingDb, MENU_TASK_DESCRIPTION};

    // ── Scripted model ──────────────────────────────────────────────────

    /// Plays back a fixed sequence of turns and records every tool call it
    /// emitted, for sequence assertions.
    struct ScriptedModel {
        turns: Mutex<Vec<ModelTurn>>,
        emitted_calls: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(turns: Vec<ModelTurn>) -> Self {
            Self {
                turns: Mutex::new(turns),
                emitted_calls: Mutex::new(Vec::new()),
            }
        }

        fn emitted(&self) -> Vec<String> {
            self.emitted_calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            _tools: Vec<ToolDefinition>,
        ) -> Result<ModelTurn, InferenceError> {
            let turn = {
                let mut turns = self.turns.lock().unwrap();
                if turns.is_empty() {
                    ModelTurn {
                        text: Some("respuesta final".to_string()),
                        tool_calls: Vec::new(),
                    }
                } else {
                    turns.remove(0)
                }
            };
            let mut emitted = self.emitted_calls.lock().unwrap();
            for tc in &turn.tool_calls {
                emitted.push(tc.name.clone());
            }
            Ok(turn)
        }
    }

    /// Routes on the request contents alone: calls the first tool until a
    /// tool result is visible in context, then answers. A pure function of
    /// its input, so identical histories produce identical call sequences.
    struct HistoryDrivenModel;

    #[async_trait]
    impl ChatModel for HistoryDrivenModel {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            tools: Vec<ToolDefinition>,
        ) -> Result<ModelTurn, InferenceError> {
            let has_tool_result = messages.iter().any(|m| m.role == Role::Tool);
            if has_tool_result {
                Ok(ModelTurn {
                    text: Some("listo".to_string()),
                    tool_calls: Vec::new(),
                })
            } else {
                Ok(ModelTurn {
                    text: None,
                    tool_calls: vec![ToolCall {
                        id: "call_1".to_string(),
                        name: tools[0].function.name.clone(),
                        arguments: serde_json::json!({}),
                    }],
                })
            }
        }
    }

    // ── Fixture tools ───────────────────────────────────────────────────

    struct StaticTool;

    #[async_trait]
    impl Tool for StaticTool {
        fn name(&self) -> &'static str {
            "obtener_datos_por_proceso_de_cierre"
        }
        fn description(&self) -> &'static str {
            "resumen de cierre"
        }
        fn parameters(&self) -> serde_json::Value {
            no_parameters()
        }
        async fn invoke(&self, _args: &serde_json::Value) -> Result<String, ToolError> {
            Ok(r#"[{"FECHA_CIERRE":"2024-05-10"}]"#.to_string())
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &'static str {
            "obtener_datos_cierre_comercial"
        }
        fn description(&self) -> &'static str {
            "resumen comercial"
        }
        fn parameters(&self) -> serde_json::Value {
            no_parameters()
        }
        async fn invoke(&self, _args: &serde_json::Value) -> Result<String, ToolError> {
            Err(ToolError::MissingConfig {
                key: "CIERRE_RESUMEN_URL".to_string(),
            })
        }
    }

    fn registry_with_tool<T: Tool + 'static>(tool: T) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(tool);
        registry
    }

    fn runner_with<M: ChatModel>(model: M, registry: ToolRegistry) -> AgentRunner<M> {
        AgentRunner::new(
            model,
            registry,
            Arc::new(SessionStore::new()),
            AgentSettings::default(),
        )
    }

    fn tool_call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: format!("call_{name}"),
            name: name.to_string(),
            arguments: args,
        }
    }

    // ── Loop behavior ───────────────────────────────────────────────────

    #[tokio::test]
    async fn text_only_turn_returns_immediately() {
        let model = ScriptedModel::new(vec![ModelTurn {
            text: Some("Solo puedo responder sobre el proceso de cierre.".to_string()),
            tool_calls: Vec::new(),
        }]);
        let runner = runner_with(model, registry_with_tool(StaticTool));

        let report = runner.run_turn("t1", "¿qué clima hace hoy?").await.unwrap();

        assert_eq!(report.answer, "Solo puedo responder sobre el proceso de cierre.");
        assert!(report.steps.is_empty());

        // History: user + assistant, no tool messages.
        let history = runner.store().history("t1");
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|m| m.role != Role::Tool));
    }

    #[tokio::test]
    async fn tool_round_folds_result_into_history() {
        let model = ScriptedModel::new(vec![
            ModelTurn {
                text: None,
                tool_calls: vec![tool_call(
                    "obtener_datos_por_proceso_de_cierre",
                    serde_json::json!({}),
                )],
            },
            ModelTurn {
                text: Some("El cierre del 2024-05-10 terminó a tiempo.".to_string()),
                tool_calls: Vec::new(),
            },
        ]);
        let runner = runner_with(model, registry_with_tool(StaticTool));

        let report = runner.run_turn("t1", "¿cómo salió el cierre?").await.unwrap();

        assert_eq!(report.steps.len(), 1);
        assert!(report.steps[0].ok);

        // user, assistant(tool_calls), tool, assistant
        let history = runner.store().history("t1");
        assert_eq!(history.len(), 4);
        assert_eq!(history[1].role, Role::Assistant);
        assert!(history[1].tool_calls.is_some());
        assert_eq!(history[2].role, Role::Tool);
        assert!(history[2].content.as_deref().unwrap().contains("FECHA_CIERRE"));
        assert_eq!(history[3].content.as_deref().unwrap(), report.answer);
    }

    #[tokio::test]
    async fn loop_bound_fails_turn_with_tool_loop_exceeded() {
        // A model that requests a tool on every round never terminates on
        // its own; the bound has to cut it off.
        let endless: Vec<ModelTurn> = (0..20)
            .map(|i| ModelTurn {
                text: None,
                tool_calls: vec![ToolCall {
                    id: format!("call_{i}"),
                    name: "obtener_datos_por_proceso_de_cierre".to_string(),
                    arguments: serde_json::json!({}),
                }],
            })
            .collect();
        let model = ScriptedModel::new(endless);
        let runner = runner_with(model, registry_with_tool(StaticTool));

        let err = runner.run_turn("t1", "hola").await.unwrap_err();
        assert!(matches!(err, AgentError::ToolLoopExceeded { rounds: 10 }));
    }

    #[tokio::test]
    async fn failed_fetch_degrades_to_empty_result() {
        let model = ScriptedModel::new(vec![
            ModelTurn {
                text: None,
                tool_calls: vec![tool_call(
                    "obtener_datos_cierre_comercial",
                    serde_json::json!({}),
                )],
            },
            ModelTurn {
                text: Some("No hay información del cierre disponible en este momento.".to_string()),
                tool_calls: Vec::new(),
            },
        ]);
        let runner = runner_with(model, registry_with_tool(FailingTool));

        let report = runner.run_turn("t1", "¿cómo va el cierre?").await.unwrap();

        assert!(!report.steps[0].ok);
        assert!(report.answer.contains("No hay información"));

        let history = runner.store().history("t1");
        assert_eq!(history[2].role, Role::Tool);
        assert_eq!(history[2].content.as_deref(), Some(DEGRADED_EMPTY_RESULT));
    }

    #[tokio::test]
    async fn unknown_tool_feeds_recovery_notice() {
        let model = ScriptedModel::new(vec![
            ModelTurn {
                text: None,
                tool_calls: vec![tool_call("obtener_clima", serde_json::json!({}))],
            },
            ModelTurn {
                text: Some("Solo puedo consultar el proceso de cierre.".to_string()),
                tool_calls: Vec::new(),
            },
        ]);
        let runner = runner_with(model, registry_with_tool(StaticTool));

        let report = runner.run_turn("t1", "dame el clima").await.unwrap();

        assert!(!report.steps[0].ok);
        let history = runner.store().history("t1");
        assert!(history[2]
            .content
            .as_deref()
            .unwrap()
            .contains("Herramienta desconocida"));
    }

    #[tokio::test]
    async fn identical_inputs_yield_identical_tool_sequences() {
        // Idempotent context construction: the same user input over the
        // same (empty) history drives a history-dependent model through
        // the same tool-call sequence on two independent sessions.
        let runner_a = runner_with(HistoryDrivenModel, registry_with_tool(StaticTool));
        let runner_b = runner_with(HistoryDrivenModel, registry_with_tool(StaticTool));

        let report_a = runner_a.run_turn("t1", "¿cómo salió el cierre?").await.unwrap();
        let report_b = runner_b.run_turn("t1", "¿cómo salió el cierre?").await.unwrap();

        let seq_a: Vec<&str> = report_a.steps.iter().map(|s| s.tool.as_str()).collect();
        let seq_b: Vec<&str> = report_b.steps.iter().map(|s| s.tool.as_str()).collect();
        assert_eq!(seq_a, seq_b);
        assert_eq!(seq_a, vec!["obtener_datos_por_proceso_de_cierre"]);
    }

    // ── End-to-end scenarios over the SQLite backend ────────────────────

    fn seeded_closing_db() -> Arc<ClosingDb> {
        let db = ClosingDb::open(":memory:").unwrap();
        db.execute_batch_for_tests(
            "CREATE TABLE Cierre (
                FECHA_CIERRE TEXT,
                CODIGO_TAREA TEXT,
                DESCRIPCION_TAREA TEXT,
                DURACION INTEGER,
                INICIO TEXT,
                FIN TEXT
            );
            INSERT INTO Cierre VALUES
                ('2024-05-10', 'T001', 'Consolida saldos', 3600,
                 '2024-05-10 22:00:00', '2024-05-10 23:00:00'),
                ('2024-05-10', 'T002', 'Habilita accesos al menu', 600,
                 '2024-05-11 06:00:00', '2024-05-11 06:10:00');",
        );
        Arc::new(db)
    }

    #[tokio::test]
    async fn scenario_menu_time_question_routes_through_summary_tool() {
        let _ = MENU_TASK_DESCRIPTION; // seeded above with the same literal
        let model = ScriptedModel::new(vec![
            ModelTurn {
                text: None,
                tool_calls: vec![tool_call(
                    "obtener_datos_por_proceso_de_cierre",
                    serde_json::json!({}),
                )],
            },
            ModelTurn {
                text: Some(
                    "El menú se habilitó a las 06:10, antes de las 8:00 am.".to_string(),
                ),
                tool_calls: Vec::new(),
            },
        ]);
        let runner = runner_with(model, sqlite_registry(seeded_closing_db()));

        let report = runner
            .run_turn("t1", "¿a qué hora se habilitó el menú el 2024-05-10?")
            .await
            .unwrap();

        let history = runner.store().history("t1");
        let tool_payload = history[2].content.as_deref().unwrap();
        assert!(tool_payload.contains("HORA_HABILITAR_MENU"));
        assert!(tool_payload.contains("2024-05-11 06:10:00"));
        assert!(report.answer.contains("8:00"));
    }

    #[tokio::test]
    async fn scenario_top_tasks_with_date_argument() {
        let model = ScriptedModel::new(vec![
            ModelTurn {
                text: None,
                tool_calls: vec![tool_call(
                    "obtener_datos_tareas_mayor_duracion_por_fecha",
                    serde_json::json!({"fecha_cierre": "2024-05-10"}),
                )],
            },
            ModelTurn {
                text: Some("La tarea más larga fue 'Consolida saldos'.".to_string()),
                tool_calls: Vec::new(),
            },
        ]);
        let runner = runner_with(model, sqlite_registry(seeded_closing_db()));

        let report = runner
            .run_turn("t1", "¿cuáles fueron las tareas más demoradas el 2024-05-10?")
            .await
            .unwrap();

        assert!(report.steps[0].ok);
        let history = runner.store().history("t1");
        let tool_payload = history[2].content.as_deref().unwrap();
        assert!(tool_payload.contains("Consolida saldos"));
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    #[test]
    fn system_instruction_embeds_the_date_and_policy() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 12).unwrap();
        let prompt = system_instruction(today);
        assert!(prompt.contains("2024-05-12"));
        assert!(prompt.contains("cierre comercial"));
        assert!(prompt.contains("español"));
        assert!(prompt.contains("8:00"));
    }

    #[test]
    fn truncation_is_utf8_safe_and_noted() {
        let long = "ñ".repeat(MAX_TOOL_RESULT_CHARS);
        let truncated = truncate_tool_result(&long, "t");
        assert!(truncated.contains("truncado"));
        // Must not split the two-byte 'ñ' in half.
        assert!(truncated.is_char_boundary(0));
        let _ = truncated.chars().count();
    }

    #[test]
    fn short_results_pass_through_untouched() {
        assert_eq!(truncate_tool_result("[]", "t"), "[]");
    }
}
