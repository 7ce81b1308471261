//! End-to-end build pipeline tests with a scripted backend.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use farcast_build::{
    BackendError, BuildSession, CancellationToken, GenerateRequest, GeneratedSource,
    GeneratorBackend, TokenUsage,
};
use farcast_core::BuildConfig;
use farcast_graph::GraphError;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Scripted backend: emits source defining the expected names, with
/// optional per-unit transient failures, permanent failures, and gates.
#[derive(Default)]
struct FakeBackend {
    permanent: HashSet<String>,
    gates: HashMap<String, Arc<Semaphore>>,
    remaining_failures: Mutex<HashMap<String, u32>>,
    calls: Mutex<Vec<String>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl FakeBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with_transient_failures(unit: &str, count: u32) -> Arc<Self> {
        let backend = Self::default();
        backend
            .remaining_failures
            .lock()
            .unwrap()
            .insert(unit.to_string(), count);
        Arc::new(backend)
    }

    fn with_permanent_failure(unit: &str) -> Arc<Self> {
        let mut backend = Self::default();
        backend.permanent.insert(unit.to_string());
        Arc::new(backend)
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn requests_for(&self, unit: &str) -> Vec<GenerateRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.unit == unit)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl GeneratorBackend for FakeBackend {
    fn provider_name(&self) -> &str {
        "fake"
    }

    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate_unit(
        &self,
        request: &GenerateRequest,
    ) -> Result<GeneratedSource, BackendError> {
        self.calls.lock().unwrap().push(request.unit.clone());
        self.requests.lock().unwrap().push(request.clone());

        if let Some(gate) = self.gates.get(&request.unit) {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if self.permanent.contains(&request.unit) {
            return Err(BackendError::Rejected("scripted permanent failure".into()));
        }
        {
            let mut remaining = self.remaining_failures.lock().unwrap();
            if let Some(count) = remaining.get_mut(&request.unit) {
                if *count > 0 {
                    *count -= 1;
                    return Err(BackendError::Transport("scripted transient failure".into()));
                }
            }
        }

        let source = request
            .expected_names
            .iter()
            .map(|name| format!("def {name}(*args, **kwargs):\n    return {name:?}\n"))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(GeneratedSource {
            source,
            usage: Some(TokenUsage {
                prompt_tokens: 50,
                completion_tokens: 10,
            }),
        })
    }
}

fn write(path: &Path, text: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

/// Three units in a linear dependency chain: a <- b <- c (via imports,
/// picked up by inference).
fn scaffold_chain(root: &Path) {
    write(
        &root.join("src/a.py"),
        "@farcast.spec()\ndef base(x):\n    \"\"\"Base.\"\"\"\n    ...\n",
    );
    write(
        &root.join("src/b.py"),
        "from a import base\n\n@farcast.spec()\ndef mid(x):\n    \"\"\"Mid.\"\"\"\n    return base(x)\n",
    );
    write(
        &root.join("src/c.py"),
        "from b import mid\n\n@farcast.spec()\ndef top(x):\n    \"\"\"Top.\"\"\"\n    return mid(x)\n",
    );
}

fn config(root: &Path) -> BuildConfig {
    BuildConfig {
        source_roots: vec![root.join("src")],
        test_roots: vec![],
        state_dir: root.join(".farcast"),
        retry_base_delay: Duration::from_millis(1),
        response_cache: false,
        ..BuildConfig::default()
    }
}

async fn run(config: BuildConfig, backend: Arc<FakeBackend>) -> farcast_core::BuildReport {
    BuildSession::new(config, backend)
        .run(None)
        .await
        .expect("build should not hit a fatal error")
}

#[tokio::test]
async fn linear_chain_generates_in_dependency_order() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    scaffold_chain(dir.path());
    let backend = FakeBackend::new();

    let mut cfg = config(dir.path());
    cfg.max_concurrency = 1;
    let report = run(cfg, backend.clone()).await;

    assert!(report.is_success());
    assert_eq!(report.counts(), (3, 0, 0));
    assert_eq!(backend.calls(), vec!["a", "b", "c"]);

    // Artifacts landed with headers.
    let artifact = dir.path().join("src/__generated__/b.py");
    let content = fs::read_to_string(artifact).unwrap();
    assert!(content.starts_with("# Generated by farcast"));
    assert!(content.contains("def mid"));

    // b saw a's freshly generated source as dependency context.
    let b_request = &backend.requests_for("b")[0];
    assert!(b_request.dependency_sources["a"].contains("def base"));
    assert!(b_request.dependency_apis.keys().any(|k| k == "a:base"));
}

#[tokio::test]
async fn dependency_order_holds_under_max_concurrency() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    scaffold_chain(dir.path());
    let backend = FakeBackend::new();

    let mut cfg = config(dir.path());
    cfg.max_concurrency = 8;
    let report = run(cfg, backend.clone()).await;

    assert_eq!(report.counts(), (3, 0, 0));
    // Even with spare workers the chain serializes: a before b before c.
    assert_eq!(backend.calls(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn second_run_skips_everything_and_writes_nothing() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    scaffold_chain(dir.path());

    let backend = FakeBackend::new();
    let report = run(config(dir.path()), backend.clone()).await;
    assert_eq!(report.counts(), (3, 0, 0));

    let store_path = dir.path().join(".farcast/fingerprints.json");
    let store_before = fs::read_to_string(&store_path).unwrap();

    let backend2 = FakeBackend::new();
    let report = run(config(dir.path()), backend2.clone()).await;
    assert_eq!(report.counts(), (0, 3, 0));
    assert!(backend2.calls().is_empty());
    // Zero writes to the fingerprint store on an all-skipped run.
    assert_eq!(fs::read_to_string(&store_path).unwrap(), store_before);
}

#[tokio::test]
async fn upstream_edit_rebuilds_the_downstream_chain() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    scaffold_chain(dir.path());
    write(
        &dir.path().join("src/solo.py"),
        "@farcast.spec()\ndef lone(x):\n    \"\"\"Lone.\"\"\"\n    ...\n",
    );

    run(config(dir.path()), FakeBackend::new()).await;

    // Edit the chain's leaf only.
    write(
        &dir.path().join("src/a.py"),
        "@farcast.spec()\ndef base(x):\n    \"\"\"Base, stricter now.\"\"\"\n    ...\n",
    );
    let backend = FakeBackend::new();
    let report = run(config(dir.path()), backend.clone()).await;

    assert_eq!(report.counts(), (3, 1, 0));
    assert!(report.skipped.contains("solo"));
    assert_eq!(backend.calls(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn dependency_cycle_is_fatal_before_any_generation() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir.path().join("src/d.py"),
        "@farcast.spec(deps=[\"e:run_e\"])\ndef run_d(x):\n    \"\"\"D.\"\"\"\n    ...\n",
    );
    write(
        &dir.path().join("src/e.py"),
        "@farcast.spec(deps=[\"d:run_d\"])\ndef run_e(x):\n    \"\"\"E.\"\"\"\n    ...\n",
    );

    let backend = FakeBackend::new();
    let err = BuildSession::new(config(dir.path()), backend.clone())
        .run(None)
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("d -> e -> d"), "got: {message}");
    assert!(matches!(
        err,
        farcast_build::BuildError::Graph(GraphError::Cycles { .. })
    ));
    // Zero units generated, zero backend calls, no artifacts, no store.
    assert!(backend.calls().is_empty());
    assert!(!dir.path().join("src/__generated__").exists());
    assert!(!dir.path().join(".farcast/fingerprints.json").exists());
}

#[tokio::test]
async fn transient_failures_succeed_within_retry_budget() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir.path().join("src/g.py"),
        "@farcast.spec()\ndef wobbly(x):\n    \"\"\"G.\"\"\"\n    ...\n",
    );

    // Fails twice, succeeds on the third attempt; budget is three.
    let backend = FakeBackend::with_transient_failures("g", 2);
    let mut cfg = config(dir.path());
    cfg.retry_attempts = 3;
    let report = run(cfg, backend.clone()).await;

    assert_eq!(report.counts(), (1, 0, 0));
    assert_eq!(backend.calls().len(), 3);
}

#[tokio::test]
async fn exhausted_retries_fail_only_that_unit() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir.path().join("src/h.py"),
        "@farcast.spec()\ndef doomed(x):\n    \"\"\"H.\"\"\"\n    ...\n",
    );
    write(
        &dir.path().join("src/ok.py"),
        "@farcast.spec()\ndef fine(x):\n    \"\"\"OK.\"\"\"\n    ...\n",
    );

    let backend = FakeBackend::with_permanent_failure("h");
    let report = run(config(dir.path()), backend.clone()).await;

    assert_eq!(report.counts(), (1, 0, 1));
    assert!(report.generated.contains("ok"));
    assert!(report.failed["h"].contains("scripted permanent failure"));
}

#[tokio::test]
async fn failed_dependency_does_not_fail_dependents() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir.path().join("src/h.py"),
        "@farcast.spec()\ndef doomed(x):\n    \"\"\"H.\"\"\"\n    ...\n",
    );
    write(
        &dir.path().join("src/j.py"),
        "from h import doomed\n\n@farcast.spec()\ndef brave(x):\n    \"\"\"J.\"\"\"\n    return doomed(x)\n",
    );

    let backend = FakeBackend::with_permanent_failure("h");
    let report = run(config(dir.path()), backend.clone()).await;

    // The dependent still attempts generation and succeeds on its own.
    assert_eq!(report.counts(), (1, 0, 1));
    assert!(report.generated.contains("j"));

    // Its request carried the upstream failure as context, and fell back
    // to intent-only dependency context (no generated source for h).
    let j_request = &backend.requests_for("j")[0];
    assert!(j_request
        .error_context
        .iter()
        .any(|e| e.contains("dependency unit h failed")));
    assert!(!j_request.dependency_sources.contains_key("h"));
    assert!(j_request.dependency_apis.keys().any(|k| k == "h:doomed"));
}

#[tokio::test]
async fn cancellation_halts_dispatch_but_keeps_finished_work() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    scaffold_chain(dir.path());

    // Gate unit `a`: it stays in flight until we let it finish.
    let gate = Arc::new(Semaphore::new(0));
    let mut backend = FakeBackend::default();
    backend.gates.insert("a".to_string(), gate.clone());
    let backend = Arc::new(backend);

    let (token, watcher) = CancellationToken::new();
    let mut cfg = config(dir.path());
    cfg.max_concurrency = 1;
    let session = BuildSession::new(cfg, backend.clone());
    let handle = tokio::spawn(async move { session.run(Some(watcher)).await });

    // Wait for `a` to be dispatched, cancel, then release the gate.
    while backend.calls().is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    token.cancel();
    gate.add_permits(1);

    let report = handle.await.unwrap().unwrap();
    // The in-flight unit kept its result; b and c were never dispatched.
    assert!(report.generated.contains("a"));
    assert!(report.failed["b"].contains("cancelled"));
    assert!(report.failed["c"].contains("cancelled"));
    assert_eq!(backend.calls(), vec!["a"]);
}

#[tokio::test]
async fn response_cache_serves_identical_requests_across_runs() -> anyhow::Result<()> {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir.path().join("src/m.py"),
        "@farcast.spec()\ndef f(x):\n    \"\"\"M.\"\"\"\n    ...\n",
    );

    let mut cfg = config(dir.path());
    cfg.response_cache = true;
    let backend = FakeBackend::new();
    let report = run(cfg.clone(), backend.clone()).await;
    assert_eq!(report.counts(), (1, 0, 0));
    assert_eq!(backend.calls().len(), 1);

    // Force a rebuild: staleness says regenerate, but the identical
    // request is served from the response cache without a backend call.
    let mut forced = cfg.clone();
    forced.force = true;
    let backend2 = FakeBackend::new();
    let report = run(forced, backend2.clone()).await;
    assert_eq!(report.counts(), (1, 0, 0));
    assert!(backend2.calls().is_empty());

    // Clearing state empties the cache; the next forced run calls out.
    farcast_build::clear_state(&cfg)?;
    let mut forced = cfg.clone();
    forced.force = true;
    let backend3 = FakeBackend::new();
    let report = run(forced, backend3.clone()).await;
    assert_eq!(report.counts(), (1, 0, 0));
    assert_eq!(backend3.calls().len(), 1);
    Ok(())
}
