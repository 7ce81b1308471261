//! The end-to-end build pipeline.
//!
//! Indexer -> resolver/graph builder -> cycle check -> digest/staleness ->
//! scheduler. Fatal-class errors abort before any side effect; everything
//! else lands in the report. Cache objects are constructed here and torn
//! down with the invocation, so concurrent builds never share hidden
//! state.

use std::sync::Arc;

use farcast_core::paths::generated_relpath;
use farcast_core::{BuildConfig, BuildReport, TranslationUnit};
use farcast_digest::{detect_stale_units, DigestEngine, FingerprintStore};
use farcast_graph::{
    discovery_ranks, ensure_acyclic, external_import_packages, DistCache, DistResolver,
    NullDistResolver, SpecGraph,
};
use farcast_index::Indexer;
use farcast_parse::ParseCache;

use crate::backend::GeneratorBackend;
use crate::cancel::CancellationWatcher;
use crate::error::BuildResult;
use crate::response_cache::ResponseCache;
use crate::scheduler::Scheduler;

/// The version stamped into digests, headers, and the fingerprint store.
pub fn tool_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// One build invocation. Construct, optionally swap in a distribution
/// resolver, then `run` exactly once.
pub struct BuildSession {
    config: BuildConfig,
    backend: Arc<dyn GeneratorBackend>,
    dist_resolver: Box<dyn DistResolver + Send + Sync>,
}

impl BuildSession {
    pub fn new(config: BuildConfig, backend: Arc<dyn GeneratorBackend>) -> Self {
        Self {
            config,
            backend,
            dist_resolver: Box::new(NullDistResolver),
        }
    }

    /// Replace the external-distribution lookup collaborator.
    pub fn with_dist_resolver(mut self, resolver: Box<dyn DistResolver + Send + Sync>) -> Self {
        self.dist_resolver = resolver;
        self
    }

    /// Run the build. Exactly one report per run; fatal errors
    /// short-circuit with no artifact writes and no fingerprint updates.
    pub async fn run(self, cancel: Option<CancellationWatcher>) -> BuildResult<BuildReport> {
        let config = &self.config;

        let mut parse_cache = ParseCache::new(config.state_dir.join("parse"));
        let index = Indexer::new(config, &mut parse_cache).index()?;
        let graph = SpecGraph::build(&index, config.infer_deps)?;
        ensure_acyclic(&graph)?;

        // Resolve external references once per distinct import.
        let mut dist_cache = DistCache::new(self.dist_resolver);
        for package in external_import_packages(&index) {
            if let Some(dist) = dist_cache.resolve(&package) {
                tracing::debug!(
                    package = %package,
                    dist = %dist.name,
                    version = %dist.version,
                    "external reference resolved"
                );
            }
        }

        let specs = index.spec_map();
        let mut engine = DigestEngine::new(&specs, &graph, tool_version());
        let mut store = FingerprintStore::load(config.state_dir.join("fingerprints.json"));
        let unit_dag = graph.unit_dag();
        let ranks = discovery_ranks(&index);

        let artifact_path = |unit: &TranslationUnit| {
            let root = index
                .get(&unit.name)
                .map(|iu| iu.root.clone())
                .unwrap_or_default();
            root.join(generated_relpath(&unit.name, &config.generated_dir))
        };
        let stale = detect_stale_units(
            index.spec_units().map(|iu| &iu.unit),
            &mut engine,
            &store,
            artifact_path,
            config.force,
        );
        tracing::info!(
            stale = stale.len(),
            total = unit_dag.len(),
            "staleness classified"
        );

        let mut response_cache = config
            .response_cache
            .then(|| ResponseCache::new(config.state_dir.join("cache")));

        let scheduler = Scheduler {
            config,
            index: &index,
            unit_dag: &unit_dag,
            ranks: &ranks,
            backend: Arc::clone(&self.backend),
            engine: &mut engine,
            store: &mut store,
            response_cache: response_cache.as_mut(),
            tool_version: tool_version(),
        };
        scheduler.run(&stale, cancel).await
    }
}

/// Clear all persisted farcast state: fingerprints, the parse cache, and
/// the backend-response cache.
pub fn clear_state(config: &BuildConfig) -> BuildResult<()> {
    FingerprintStore::load(config.state_dir.join("fingerprints.json")).clear()?;
    ParseCache::new(config.state_dir.join("parse")).clear_all();
    ResponseCache::new(config.state_dir.join("cache")).clear_all();
    Ok(())
}
