//! Pipeline orchestration: collect, prompt, cached-or-live generation, format.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::{FutureExt, TryStreamExt};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendRegistry, Generation, backend_registry};
use crate::cache::{ResponseCache, canonical_diff_content};
use crate::collectors::{CollectorArgs, CollectorHandle, CollectorRegistry, collector_registry};
use crate::config::Config;
use crate::context::{Context, Fragment};
use crate::error::{CollectionError, CollectorError, PipelineError, RegistryError};
use crate::formatter::{Formatter, formatter_for};
use crate::git::{GitProvider, SystemGit};
use crate::prompt::build_prompt;

/// Result of one collector task: its configured index and what it produced.
type TaskOutcome = (usize, Result<Result<Fragment, CollectorError>, String>);

/// One configured run of the commit message pipeline.
///
/// Collaborators default to the built-in registries, a [`SystemGit`] rooted at
/// the working directory, the cache described by the config and the configured
/// formatter. Each can be replaced with the `with_*` methods.
pub struct Pipeline {
    config: Config,
    workdir: PathBuf,
    collectors: CollectorRegistry,
    backends: BackendRegistry,
    git: Arc<dyn GitProvider>,
    cache: ResponseCache,
    formatter: Box<dyn Formatter>,
}

impl Pipeline {
    pub fn new(config: Config, workdir: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let workdir = workdir.into();
        let formatter = formatter_for(&config.formatter, &config.output)?;
        let cache = ResponseCache::new(
            &config.cache.directory,
            config.cache.ttl_sec,
            config.cache.enabled,
        );

        Ok(Self {
            collectors: collector_registry()?,
            backends: backend_registry()?,
            git: Arc::new(SystemGit::new(workdir.clone())),
            cache,
            formatter,
            workdir,
            config,
        })
    }

    pub fn with_git(mut self, git: Arc<dyn GitProvider>) -> Self {
        self.git = git;
        self
    }

    pub fn with_collector_registry(mut self, registry: CollectorRegistry) -> Self {
        self.collectors = registry;
        self
    }

    pub fn with_backend_registry(mut self, registry: BackendRegistry) -> Self {
        self.backends = registry;
        self
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_formatter(mut self, formatter: Box<dyn Formatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Collect, generate and format in one call.
    ///
    /// Uses the configured streaming mode; a stream is drained and its
    /// joined text formatted.
    pub async fn generate(&self) -> Result<String, PipelineError> {
        let context = self.collect_context().await?;
        match self.generate_from(&context, self.config.backend.stream).await? {
            Generation::Complete(message) => Ok(message),
            Generation::Stream(stream) => {
                let chunks: Vec<String> = stream.try_collect().await?;
                Ok(self.format(&context, &chunks.concat())?)
            }
        }
    }

    /// Collect context, then generate.
    ///
    /// A streamed result is returned unformatted.
    pub async fn run(&self, stream: bool) -> Result<Generation, PipelineError> {
        let context = self.collect_context().await?;
        self.generate_from(&context, stream).await
    }

    /// Generate for an already collected context.
    ///
    /// Streaming never touches the cache. Otherwise the cache is consulted
    /// first and a backend is only constructed on a miss.
    pub async fn generate_from(
        &self,
        context: &Context,
        stream: bool,
    ) -> Result<Generation, PipelineError> {
        let prompt = build_prompt(context, &self.config.output.language);
        debug!(chars = prompt.len(), "Built prompt");

        if stream {
            let backend = self.create_backend()?;
            info!(backend = backend.name(), "Streaming response");
            return Ok(Generation::Stream(backend.stream(&prompt).await?));
        }

        let cache_content = (self.cache.enabled() && !context.files.is_empty())
            .then(|| canonical_diff_content(&context.diffs()));

        if let Some(content) = cache_content.as_deref() {
            if let Some(cached) = self.cache.get(content) {
                info!(key = %ResponseCache::key_for(content), "Using cached response");
                return Ok(Generation::Complete(self.format(context, &cached)?));
            }
        }

        let backend = self.create_backend()?;
        info!(
            backend = backend.name(),
            model = %self.config.backend.model,
            "Requesting commit message"
        );
        let raw = backend.complete(&prompt).await?;

        if let Some(content) = cache_content.as_deref() {
            self.cache.set(content, &raw);
            debug!(key = %ResponseCache::key_for(content), "Stored response in cache");
        }

        Ok(Generation::Complete(self.format(context, &raw)?))
    }

    /// Apply the configured formatter to raw model output.
    pub fn format(&self, context: &Context, raw: &str) -> Result<String, PipelineError> {
        Ok(self.formatter.format(context, raw)?)
    }

    /// Run every configured collector concurrently and fold the results in
    /// configured order.
    ///
    /// The first failure aborts the remaining collectors.
    pub async fn collect_context(&self) -> Result<Context, CollectionError> {
        let kinds: Vec<&str> = self
            .config
            .collectors
            .iter()
            .map(|c| c.kind.as_str())
            .collect();
        let handles = self.create_collectors()?;
        info!("Collecting context from {} collector(s)", handles.len());

        let mut tasks: JoinSet<TaskOutcome> = JoinSet::new();
        for (index, handle) in handles.into_iter().enumerate() {
            match handle {
                CollectorHandle::Blocking(collector) => {
                    tasks.spawn_blocking(move || {
                        let outcome =
                            std::panic::catch_unwind(AssertUnwindSafe(|| collector.collect()))
                                .map_err(|panic| panic_message(&panic));
                        (index, outcome)
                    });
                }
                CollectorHandle::Async(collector) => {
                    tasks.spawn(async move {
                        let outcome = AssertUnwindSafe(collector.collect())
                            .catch_unwind()
                            .await
                            .map_err(|panic| panic_message(&panic));
                        (index, outcome)
                    });
                }
            }
        }

        let mut fragments: Vec<Option<Fragment>> = vec![None; kinds.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    tasks.abort_all();
                    return Err(CollectionError::Aborted {
                        kind: pending_kind(&kinds, &fragments),
                        reason: e.to_string(),
                    });
                }
            };
            let kind = kinds[index];
            match outcome {
                Ok(Ok(fragment)) => {
                    debug!(collector = %kind, keys = fragment.len(), "Collector finished");
                    fragments[index] = Some(fragment);
                }
                Ok(Err(source)) => {
                    warn!(collector = %kind, "Collector failed: {}", source);
                    tasks.abort_all();
                    return Err(CollectionError::Failed {
                        kind: kind.to_string(),
                        source,
                    });
                }
                Err(reason) => {
                    warn!(collector = %kind, "Collector panicked: {}", reason);
                    tasks.abort_all();
                    return Err(CollectionError::Aborted {
                        kind: kind.to_string(),
                        reason,
                    });
                }
            }
        }

        Context::from_fragments(fragments.into_iter().flatten())
    }

    fn create_collectors(&self) -> Result<Vec<CollectorHandle>, CollectionError> {
        self.config
            .collectors
            .iter()
            .map(|settings| {
                let args = CollectorArgs {
                    options: settings.options.clone(),
                    git: self.git.clone(),
                    workdir: self.workdir.clone(),
                };
                self.collectors
                    .create(&settings.kind, &args)
                    .map_err(|e| match e {
                        RegistryError::Configuration(source) => CollectionError::Unavailable {
                            kind: settings.kind.clone(),
                            source,
                        },
                        RegistryError::Instantiation { source, .. } => {
                            CollectionError::Instantiation {
                                kind: settings.kind.clone(),
                                source,
                            }
                        }
                    })
            })
            .collect()
    }

    fn create_backend(&self) -> Result<Box<dyn Backend>, PipelineError> {
        let config = self.config.backend.to_backend_config();
        self.backends
            .create(&config.backend_id, &config)
            .map_err(|e| match e {
                RegistryError::Configuration(source) => PipelineError::Configuration(source),
                RegistryError::Instantiation { source, .. } => PipelineError::Backend(source),
            })
    }
}

/// Kind of the first collector that has not reported yet.
fn pending_kind(kinds: &[&str], fragments: &[Option<Fragment>]) -> String {
    kinds
        .iter()
        .zip(fragments)
        .find(|(_, f)| f.is_none())
        .map(|(k, _)| k.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "collector panicked".to_string()
    }
}
