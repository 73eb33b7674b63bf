//! The default handler runtime, backed by the Rhai interpreter.
//!
//! Handler sources are compiled to ASTs once and cached by source
//! hash. Each run evaluates the AST against a fresh scope holding the
//! handler bindings; `edges` and `scheduler` are registered host types
//! whose methods record [`DeferredOp`]s for the vector executor to
//! drain. `print`/`debug` output is routed to the log collector and to
//! `tracing`. Handler `import` statements resolve through a file
//! module resolver, the host's module facility.

use super::{DeferredOp, HandlerEnv, HandlerOutcome, HandlerRuntime};
use parking_lot::{Mutex, RwLock};
use rhai::module_resolvers::FileModuleResolver;
use rhai::serde::{from_dynamic, to_dynamic};
use rhai::{Dynamic, Engine, ImmutableString, Scope, AST};
use serde_json::Value as JsonValue;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use weft_core::error::{Result, WeftError};
use weft_core::logging::{LogCategory, LogCollector, LogEvent};

/// The write-only edge surface exposed to handlers.
///
/// `edges.out = v` (property syntax falls back to the indexer) and
/// `edges.write("out", v)` both record a write; reads return the last
/// written value. Writes to names that are not output edges of the
/// effective vector are inert.
#[derive(Clone)]
struct Edges {
    fields: Arc<Vec<String>>,
    written: Arc<Mutex<HashMap<String, Dynamic>>>,
    ops: Arc<Mutex<Vec<DeferredOp>>>,
}

impl Edges {
    fn new(fields: Arc<Vec<String>>, ops: Arc<Mutex<Vec<DeferredOp>>>) -> Self {
        Self {
            fields,
            written: Arc::new(Mutex::new(HashMap::new())),
            ops,
        }
    }

    fn record(&mut self, field: &str, value: Dynamic) {
        if !self.fields.iter().any(|f| f == field) {
            return;
        }
        let json = from_dynamic::<JsonValue>(&value).unwrap_or(JsonValue::Null);
        self.ops.lock().push(DeferredOp::Write {
            field: field.to_string(),
            value: json,
        });
        self.written.lock().insert(field.to_string(), value);
    }

    fn last_written(&mut self, field: &str) -> Dynamic {
        self.written
            .lock()
            .get(field)
            .cloned()
            .unwrap_or(Dynamic::UNIT)
    }
}

/// The scheduler surface exposed to handlers.
///
/// `scheduler.url(pattern, value)` and
/// `scheduler.url(pattern, value, field)` record re-entrant
/// invocations, drained after the handler settles.
#[derive(Clone)]
struct SchedulerLink {
    ops: Arc<Mutex<Vec<DeferredOp>>>,
}

impl SchedulerLink {
    fn invoke(&mut self, pattern: &str, value: Dynamic, field: &str) {
        let json = from_dynamic::<JsonValue>(&value).unwrap_or(JsonValue::Null);
        self.ops.lock().push(DeferredOp::Invoke {
            pattern: pattern.to_string(),
            value: json,
            field: field.to_string(),
        });
    }
}

/// Handler runtime backed by a shared Rhai engine and an AST cache.
pub struct RhaiRuntime {
    engine: Engine,
    asts: RwLock<HashMap<u64, Arc<AST>>>,
    collector: Arc<dyn LogCollector>,
}

impl RhaiRuntime {
    /// Create a runtime routing handler output to `collector`.
    pub fn new(collector: Arc<dyn LogCollector>) -> Self {
        let mut engine = Engine::new();
        engine.set_module_resolver(FileModuleResolver::new());

        {
            let collector = Arc::clone(&collector);
            engine.on_print(move |text| {
                tracing::info!(target: "weft::handler", "{}", text);
                collector.collect(LogEvent::info(LogCategory::Handler, text));
            });
        }
        {
            let collector = Arc::clone(&collector);
            engine.on_debug(move |text, _source, _pos| {
                tracing::debug!(target: "weft::handler", "{}", text);
                collector.collect(LogEvent::debug(LogCategory::Handler, text));
            });
        }

        engine
            .register_type_with_name::<Edges>("Edges")
            .register_indexer_set(|edges: &mut Edges, field: ImmutableString, value: Dynamic| {
                edges.record(&field, value);
            })
            .register_indexer_get(|edges: &mut Edges, field: ImmutableString| {
                edges.last_written(&field)
            })
            .register_fn(
                "write",
                |edges: &mut Edges, field: ImmutableString, value: Dynamic| {
                    edges.record(&field, value);
                },
            );

        engine
            .register_type_with_name::<SchedulerLink>("Scheduler")
            .register_fn(
                "url",
                |link: &mut SchedulerLink, pattern: ImmutableString, value: Dynamic| {
                    link.invoke(&pattern, value, "");
                },
            )
            .register_fn(
                "url",
                |link: &mut SchedulerLink,
                 pattern: ImmutableString,
                 value: Dynamic,
                 field: ImmutableString| {
                    link.invoke(&pattern, value, &field);
                },
            );

        Self {
            engine,
            asts: RwLock::new(HashMap::new()),
            collector,
        }
    }

    /// The collector handler output is routed to.
    pub fn collector(&self) -> &Arc<dyn LogCollector> {
        &self.collector
    }

    fn compiled(&self, vector_id: &str, source: &str) -> Result<Arc<AST>> {
        let mut hasher = DefaultHasher::new();
        source.hash(&mut hasher);
        let key = hasher.finish();

        if let Some(ast) = self.asts.read().get(&key) {
            return Ok(Arc::clone(ast));
        }
        let ast = self
            .engine
            .compile(source)
            .map_err(|e| WeftError::HandlerCompile {
                vector_id: vector_id.to_string(),
                cause: e.to_string(),
            })?;
        let ast = Arc::new(ast);
        self.asts.write().insert(key, Arc::clone(&ast));
        Ok(ast)
    }

    fn to_dyn(&self, vector_id: &str, value: &JsonValue) -> Result<Dynamic> {
        to_dynamic(value).map_err(|e| WeftError::HandlerFailed {
            vector_id: vector_id.to_string(),
            cause: format!("environment conversion failed: {}", e),
        })
    }

    fn scope_json(scope: &Scope<'_>, name: &str, fallback: JsonValue) -> JsonValue {
        scope
            .get_value::<Dynamic>(name)
            .and_then(|d| from_dynamic::<JsonValue>(&d).ok())
            .unwrap_or(fallback)
    }
}

impl HandlerRuntime for RhaiRuntime {
    fn prepare(&self, vector_id: &str, source: &str) -> Result<()> {
        self.compiled(vector_id, source).map(|_| ())
    }

    fn run(&self, vector_id: &str, source: &str, env: HandlerEnv) -> Result<HandlerOutcome> {
        let ast = self.compiled(vector_id, source)?;

        let ops: Arc<Mutex<Vec<DeferredOp>>> = Arc::new(Mutex::new(Vec::new()));
        let edges = Edges::new(Arc::new(env.edge_fields.clone()), Arc::clone(&ops));
        let link = SchedulerLink {
            ops: Arc::clone(&ops),
        };

        let mut scope = Scope::new();
        scope.push_dynamic("scheduler", Dynamic::from(link));
        scope.push_dynamic("graph", self.to_dyn(vector_id, &env.graph)?);
        scope.push_dynamic("cache", self.to_dyn(vector_id, &env.cache)?);
        scope.push_dynamic("vector", self.to_dyn(vector_id, &env.vector)?);
        scope.push("field", env.field.clone());
        scope.push_dynamic("state", self.to_dyn(vector_id, &env.state)?);
        scope.push_dynamic("value", self.to_dyn(vector_id, &env.value)?);
        scope.push_dynamic("edges", Dynamic::from(edges));
        scope.push_dynamic("data", self.to_dyn(vector_id, &env.data)?);
        scope.push_dynamic("properties", self.to_dyn(vector_id, &env.properties)?);
        scope.push_dynamic("context", self.to_dyn(vector_id, &env.context)?);

        let (returned, err) = match self.engine.eval_ast_with_scope::<Dynamic>(&mut scope, &ast) {
            Ok(result) => (
                from_dynamic::<JsonValue>(&result).unwrap_or(JsonValue::Null),
                None,
            ),
            Err(e) => (JsonValue::Null, Some(e.to_string())),
        };

        // Bindings mutated before a throw are still persisted, as are
        // the writes recorded so far.
        let cache = Self::scope_json(&scope, "cache", env.cache);
        let state = Self::scope_json(&scope, "state", env.state);
        let context = Self::scope_json(&scope, "context", env.context);
        let ops = ops.lock().clone();

        Ok(HandlerOutcome {
            returned,
            err,
            ops,
            cache,
            state,
            context,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weft_core::logging::BufferedCollector;

    fn runtime() -> (RhaiRuntime, Arc<BufferedCollector>) {
        let collector = Arc::new(BufferedCollector::with_default_capacity());
        let runtime = RhaiRuntime::new(collector.clone() as Arc<dyn LogCollector>);
        (runtime, collector)
    }

    fn env(value: JsonValue, edge_fields: Vec<&str>) -> HandlerEnv {
        HandlerEnv {
            graph: json!({ "id": "g1" }),
            vector: json!({ "id": "n1" }),
            field: "in".to_string(),
            value,
            cache: json!({}),
            state: json!({}),
            context: json!({}),
            data: JsonValue::Null,
            properties: JsonValue::Null,
            edge_fields: edge_fields.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn print_routes_to_collector() {
        let (runtime, collector) = runtime();
        let outcome = runtime
            .run("n1", "print(value);", env(json!("hello"), vec![]))
            .unwrap();
        assert!(outcome.err.is_none());

        let messages: Vec<String> = collector.all().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["hello"]);
    }

    #[test]
    fn property_write_records_op_in_order() {
        let (runtime, _) = runtime();
        let outcome = runtime
            .run(
                "n1",
                "edges.out = value; edges.other = 2; edges.out = 3;",
                env(json!(1), vec!["out", "other"]),
            )
            .unwrap();

        let ops: Vec<(String, JsonValue)> = outcome
            .ops
            .iter()
            .map(|op| match op {
                DeferredOp::Write { field, value } => (field.clone(), value.clone()),
                DeferredOp::Invoke { .. } => panic!("unexpected invoke"),
            })
            .collect();
        assert_eq!(
            ops,
            vec![
                ("out".to_string(), json!(1)),
                ("other".to_string(), json!(2)),
                ("out".to_string(), json!(3)),
            ]
        );
    }

    #[test]
    fn unknown_edge_writes_are_inert() {
        let (runtime, _) = runtime();
        let outcome = runtime
            .run("n1", "edges.nope = 1;", env(json!(null), vec!["out"]))
            .unwrap();
        assert!(outcome.ops.is_empty());
    }

    #[test]
    fn write_method_matches_property_syntax() {
        let (runtime, _) = runtime();
        let outcome = runtime
            .run("n1", r#"edges.write("out", 7);"#, env(json!(null), vec!["out"]))
            .unwrap();
        assert_eq!(outcome.ops.len(), 1);
    }

    #[test]
    fn edge_reads_back_last_written_value() {
        let (runtime, _) = runtime();
        let outcome = runtime
            .run(
                "n1",
                "edges.out = cos(value); edges.out",
                env(json!(10.0), vec!["out"]),
            )
            .unwrap();
        let returned = outcome.returned.as_f64().unwrap();
        assert!((returned - (-0.839_071_529_076_452_4)).abs() < 1e-12);
    }

    #[test]
    fn undefined_variable_reports_err_not_panic() {
        let (runtime, _) = runtime();
        let outcome = runtime.run("n1", "x;", env(json!(null), vec![])).unwrap();
        let err = outcome.err.expect("handler should fail");
        assert!(err.contains("Variable not found"));
        assert_eq!(outcome.returned, JsonValue::Null);
    }

    #[test]
    fn writes_before_throw_survive() {
        let (runtime, _) = runtime();
        let outcome = runtime
            .run("n1", "edges.out = 1; x;", env(json!(null), vec!["out"]))
            .unwrap();
        assert!(outcome.err.is_some());
        assert_eq!(outcome.ops.len(), 1);
    }

    #[test]
    fn state_and_cache_mutations_are_read_back() {
        let (runtime, _) = runtime();
        let mut environment = env(json!(null), vec![]);
        environment.state = json!({ "count": 1 });
        let outcome = runtime
            .run(
                "n1",
                r#"state.count += 1; cache.seen = true; context.name = "weft";"#,
                environment,
            )
            .unwrap();
        assert_eq!(outcome.state, json!({ "count": 2 }));
        assert_eq!(outcome.cache, json!({ "seen": true }));
        assert_eq!(outcome.context, json!({ "name": "weft" }));
    }

    #[test]
    fn scheduler_url_records_invoke() {
        let (runtime, _) = runtime();
        let outcome = runtime
            .run(
                "n1",
                r#"scheduler.url("second", 42, "in");"#,
                env(json!(null), vec![]),
            )
            .unwrap();
        assert!(matches!(
            &outcome.ops[0],
            DeferredOp::Invoke { pattern, value, field }
                if pattern == "second" && *value == json!(42) && field == "in"
        ));
    }

    #[test]
    fn compile_errors_are_distinct() {
        let (runtime, _) = runtime();
        let result = runtime.run("n1", "fn (", env(json!(null), vec![]));
        assert!(matches!(result, Err(WeftError::HandlerCompile { .. })));
    }

    #[test]
    fn compilation_is_cached_per_source() {
        let (runtime, _) = runtime();
        runtime.prepare("n1", "1 + 1").unwrap();
        runtime.prepare("n2", "1 + 1").unwrap();
        assert_eq!(runtime.asts.read().len(), 1);
    }
}
