//! The bounded-concurrency build scheduler.
//!
//! Walks the stale subgraph with a worker pool: a unit becomes ready only
//! once every stale dependency reached a terminal state, so a dependent
//! never generates before its dependencies' artifacts exist. Units with no
//! dependency relationship generate in any order or concurrently. A failed
//! dependency does not fail its dependents; they attempt generation with
//! the upstream error as context and succeed or fail on their own.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;

use farcast_core::paths::unit_to_generated_unit;
use farcast_core::{BuildConfig, BuildReport, SpecKind};
use farcast_digest::{expand_stale, DigestEngine, FingerprintStore};
use farcast_graph::{critical_path_lengths, topo_order};
use farcast_index::SourceIndex;

use crate::backend::{generate_with_retry, GenerateRequest, GeneratorBackend};
use crate::cancel::CancellationWatcher;
use crate::error::BuildResult;
use crate::header::format_header;
use crate::response_cache::{cache_key, CacheEntry, ResponseCache};
use crate::validate::validate_generated_source;
use crate::writer::{read_generated_unit, write_generated_unit};

/// Ready-queue entry: longest critical path first, then discovery order.
///
/// `BinaryHeap` pops the greatest element, so `Ord` ranks higher priority
/// and lower discovery rank as greater.
#[derive(Debug, Eq, PartialEq)]
struct ReadyUnit {
    priority: usize,
    rank: usize,
    name: String,
}

impl Ord for ReadyUnit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.rank.cmp(&self.rank))
            .then_with(|| other.name.cmp(&self.name))
    }
}

impl PartialOrd for ReadyUnit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One build invocation's scheduler. All mutable collaborators are
/// injected; nothing here outlives the run.
pub struct Scheduler<'a, 'g> {
    pub config: &'a BuildConfig,
    pub index: &'a SourceIndex,
    pub unit_dag: &'a BTreeMap<String, BTreeSet<String>>,
    pub ranks: &'a HashMap<String, usize>,
    pub backend: Arc<dyn GeneratorBackend>,
    pub engine: &'a mut DigestEngine<'g>,
    pub store: &'a mut FingerprintStore,
    pub response_cache: Option<&'a mut ResponseCache>,
    pub tool_version: &'a str,
}

impl Scheduler<'_, '_> {
    /// Drive generation over the stale set to completion, or as far as
    /// cancellation allows. Returns one outcome per spec unit.
    pub async fn run(
        mut self,
        stale: &BTreeSet<String>,
        cancel: Option<CancellationWatcher>,
    ) -> BuildResult<BuildReport> {
        let spec_units: BTreeSet<String> = self
            .index
            .spec_units()
            .map(|iu| iu.unit.name.clone())
            .collect();
        let expanded = expand_stale(self.unit_dag, stale);
        let stale: BTreeSet<String> = expanded.intersection(&spec_units).cloned().collect();

        let mut report = BuildReport::default();
        for unit in spec_units.difference(&stale) {
            report.record_skipped(unit.clone());
        }
        if stale.is_empty() {
            return Ok(report);
        }

        // Induce the subgraph over stale units.
        let mut deps_in_stale: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut dependents: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut indegree: BTreeMap<String, usize> = BTreeMap::new();
        for unit in &stale {
            let deps: BTreeSet<String> = self
                .unit_dag
                .get(unit)
                .map(|deps| deps.iter().filter(|d| stale.contains(*d)).cloned().collect())
                .unwrap_or_default();
            indegree.insert(unit.clone(), deps.len());
            for dep in &deps {
                dependents.entry(dep.clone()).or_default().insert(unit.clone());
            }
            deps_in_stale.insert(unit.clone(), deps);
        }

        // The sort carries its own cycle check, independent of the SCC
        // pass that ran before scheduling.
        let order = topo_order(&deps_in_stale, self.ranks)?;
        let priorities = critical_path_lengths(&order, &deps_in_stale);

        let mut ready: BinaryHeap<ReadyUnit> = BinaryHeap::new();
        for (unit, &degree) in &indegree {
            if degree == 0 {
                ready.push(Self::ready_unit(unit, &priorities, self.ranks));
            }
        }

        let jobs = self.config.max_concurrency.max(1);
        let mut generated_sources: HashMap<String, String> = HashMap::new();
        let mut completed: BTreeSet<String> = BTreeSet::new();
        let mut tasks: JoinSet<crate::backend::GenerationOutcome> = JoinSet::new();
        let mut task_units: HashMap<tokio::task::Id, String> = HashMap::new();
        let mut cache_keys: HashMap<String, String> = HashMap::new();

        loop {
            let cancelled = cancel.as_ref().map(|c| c.is_cancelled()).unwrap_or(false);

            while !cancelled && tasks.len() < jobs {
                let Some(next) = ready.pop() else { break };
                if completed.contains(&next.name) {
                    continue;
                }
                let unit = next.name;
                let Some(request) = self.assemble_request(&unit, &generated_sources, &report)
                else {
                    report.record_failed(unit.clone(), "unit disappeared from the index");
                    completed.insert(unit.clone());
                    Self::unlock_dependents(
                        &unit, &dependents, &completed, &mut indegree, &priorities, self.ranks,
                        &mut ready,
                    );
                    continue;
                };

                if self.response_cache.is_some() {
                    let key = cache_key(
                        &request,
                        self.backend.provider_name(),
                        self.backend.model_name(),
                    );
                    if let Some(source) = self.cached_response(&key, &request) {
                        tracing::debug!(unit = %unit, "response cache hit");
                        self.finalize(&unit, source, &mut generated_sources, &mut report);
                        completed.insert(unit.clone());
                        Self::unlock_dependents(
                            &unit, &dependents, &completed, &mut indegree, &priorities,
                            self.ranks, &mut ready,
                        );
                        continue;
                    }
                    cache_keys.insert(unit.clone(), key);
                }

                let backend = Arc::clone(&self.backend);
                let attempts = self.config.retry_attempts.max(1);
                let delay = self.config.retry_base_delay;
                let handle = tasks.spawn(async move {
                    generate_with_retry(backend.as_ref(), &request, attempts, delay).await
                });
                task_units.insert(handle.id(), unit);
            }

            if tasks.is_empty() {
                break;
            }

            let Some(joined) = tasks.join_next_with_id().await else {
                break;
            };
            let unit;
            match joined {
                Ok((id, outcome)) => {
                    let Some(name) = task_units.remove(&id) else {
                        continue;
                    };
                    unit = name;
                    match outcome.source {
                        Some(source) => {
                            if let (Some(cache), Some(key)) =
                                (self.response_cache.as_deref_mut(), cache_keys.get(&unit))
                            {
                                cache.put(
                                    key,
                                    CacheEntry {
                                        source: source.clone(),
                                        prompt_tokens: outcome.usage.prompt_tokens,
                                        completion_tokens: outcome.usage.completion_tokens,
                                        model: self.backend.model_name().to_string(),
                                        provider: self.backend.provider_name().to_string(),
                                        cached_at: Utc::now(),
                                    },
                                );
                            }
                            self.finalize(&unit, source, &mut generated_sources, &mut report);
                        }
                        None => {
                            tracing::warn!(
                                unit = %unit,
                                attempts = outcome.attempts,
                                "generation failed"
                            );
                            report.record_failed(unit.clone(), outcome.errors.join("; "));
                        }
                    }
                }
                Err(join_err) => {
                    let Some(name) = task_units.remove(&join_err.id()) else {
                        continue;
                    };
                    unit = name;
                    report.record_failed(unit.clone(), format!("unhandled worker error: {join_err}"));
                }
            }
            completed.insert(unit.clone());
            Self::unlock_dependents(
                &unit, &dependents, &completed, &mut indegree, &priorities, self.ranks,
                &mut ready,
            );
        }

        // Anything still pending was never dispatched.
        let cancelled = cancel.as_ref().map(|c| c.is_cancelled()).unwrap_or(false);
        for unit in &stale {
            if !completed.contains(unit) && report.outcome_for(unit).is_none() {
                let detail = if cancelled {
                    "build cancelled before this unit was dispatched"
                } else {
                    "scheduler could not make this unit ready"
                };
                report.record_failed(unit.clone(), detail);
            }
        }
        Ok(report)
    }

    fn ready_unit(
        unit: &str,
        priorities: &HashMap<String, usize>,
        ranks: &HashMap<String, usize>,
    ) -> ReadyUnit {
        ReadyUnit {
            priority: priorities.get(unit).copied().unwrap_or(0),
            rank: ranks.get(unit).copied().unwrap_or(usize::MAX),
            name: unit.to_string(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn unlock_dependents(
        unit: &str,
        dependents: &BTreeMap<String, BTreeSet<String>>,
        completed: &BTreeSet<String>,
        indegree: &mut BTreeMap<String, usize>,
        priorities: &HashMap<String, usize>,
        ranks: &HashMap<String, usize>,
        ready: &mut BinaryHeap<ReadyUnit>,
    ) {
        for dependent in dependents.get(unit).into_iter().flatten() {
            if completed.contains(dependent) {
                continue;
            }
            if let Some(degree) = indegree.get_mut(dependent) {
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    ready.push(Self::ready_unit(dependent, priorities, ranks));
                }
            }
        }
    }

    /// Assemble the backend request for one unit: its own spec blocks plus
    /// the dependency context available right now (API spans always;
    /// generated source from this run or from disk where it exists) and
    /// upstream failure notes.
    fn assemble_request(
        &self,
        unit: &str,
        generated_sources: &HashMap<String, String>,
        report: &BuildReport,
    ) -> Option<GenerateRequest> {
        let iu = self.index.get(unit)?;
        let kind = if !iu.unit.specs.is_empty()
            && iu.unit.specs.iter().all(|s| s.kind == SpecKind::Test)
        {
            SpecKind::Test
        } else {
            SpecKind::Implementation
        };

        let mut spec_sources = BTreeMap::new();
        let mut extra_directives = BTreeMap::new();
        for spec in &iu.unit.specs {
            spec_sources.insert(spec.spec_ref.to_string(), spec.source_span.clone());
            if let Some(directive) = &spec.extra_directive {
                extra_directives.insert(spec.spec_ref.to_string(), directive.clone());
            }
        }

        let mut dependency_apis = BTreeMap::new();
        let mut dependency_sources = BTreeMap::new();
        let mut error_context = Vec::new();
        for dep in self.unit_dag.get(unit).into_iter().flatten() {
            if let Some(dep_iu) = self.index.get(dep) {
                for spec in &dep_iu.unit.specs {
                    dependency_apis.insert(spec.spec_ref.to_string(), spec.source_span.clone());
                }
                let source = generated_sources.get(dep).cloned().or_else(|| {
                    read_generated_unit(&dep_iu.root, &self.config.generated_dir, dep)
                });
                if let Some(source) = source {
                    dependency_sources.insert(dep.clone(), source);
                }
            }
            if let Some(detail) = report.failed.get(dep) {
                error_context.push(format!("dependency unit {dep} failed to generate: {detail}"));
            }
        }

        Some(GenerateRequest {
            kind,
            unit: unit.to_string(),
            generated_unit: unit_to_generated_unit(unit, &self.config.generated_dir),
            expected_names: iu.unit.expected_names(),
            spec_sources,
            extra_directives,
            dependency_apis,
            dependency_sources,
            error_context,
        })
    }

    /// A cached response is only served after re-validation with the
    /// current validators, so stale-bad entries never short-circuit.
    fn cached_response(&mut self, key: &str, request: &GenerateRequest) -> Option<String> {
        let cache = self.response_cache.as_deref_mut()?;
        let entry = cache.get(key)?;
        let problems = validate_generated_source(
            &entry.source,
            &request.expected_names,
            &request.unit,
            &request.generated_unit,
        );
        problems.is_empty().then_some(entry.source)
    }

    /// Accept generated source: write the artifact atomically, then (and
    /// only then) record the fingerprint, so a crash between the two reads
    /// as stale on the next run.
    fn finalize(
        &mut self,
        unit: &str,
        source: String,
        generated_sources: &mut HashMap<String, String>,
        report: &mut BuildReport,
    ) {
        let Some(iu) = self.index.get(unit) else {
            report.record_failed(unit.to_string(), "unit disappeared from the index");
            return;
        };
        let digest = self.engine.unit_digest(&iu.unit);
        let spec_refs: Vec<String> = iu.unit.spec_refs().map(|r| r.to_string()).collect();
        let header = format_header(self.tool_version, unit, &digest, &spec_refs);

        match write_generated_unit(&iu.root, &self.config.generated_dir, unit, &header, &source) {
            Ok(path) => {
                if let Err(err) = self.store.upsert(unit, &digest, self.tool_version) {
                    report.record_failed(
                        unit.to_string(),
                        format!("generated, but failed to record fingerprint: {err}"),
                    );
                    return;
                }
                tracing::info!(unit = %unit, path = %path.display(), "generated");
                generated_sources.insert(unit.to_string(), source);
                report.record_generated(unit.to_string());
            }
            Err(err) => {
                report.record_failed(unit.to_string(), format!("failed to write artifact: {err}"));
            }
        }
    }
}
