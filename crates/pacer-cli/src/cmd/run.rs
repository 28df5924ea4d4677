use anyhow::{anyhow, Context};
use pacer_core::config::{Config, WarnLevel};
use pacer_core::paths;
use pacer_core::scheduler::Scheduler;
use pacer_core::store::{KeyValueStore, MemoryStore, RedbStore};
use pacer_core::words::{self, default_words, PayloadSet, RemoteWordList, WordSource};
use pacer_server::AppState;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct RunOptions {
    pub port: Option<u16>,
    pub ephemeral: bool,
    pub no_refresh: bool,
    pub seed: Option<u64>,
}

pub fn run(root: &Path, opts: RunOptions) -> anyhow::Result<()> {
    let config = Config::load_or_default(root).context("failed to load config")?;
    let warnings = config.validate();
    for w in &warnings {
        match w.level {
            WarnLevel::Warning => warn!("config: {}", w.message),
            WarnLevel::Error => error!("config: {}", w.message),
        }
    }
    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors; run `pacer config validate`");
    }

    let store: Arc<dyn KeyValueStore> = if opts.ephemeral {
        info!("ephemeral run; state will not be persisted");
        Arc::new(MemoryStore::new())
    } else {
        let path = paths::state_db_path(root);
        let store = RedbStore::open(&path)
            .with_context(|| format!("failed to open state store {}", path.display()))?;
        Arc::new(store)
    };

    let defaults = config
        .words
        .defaults
        .clone()
        .and_then(PayloadSet::from_words)
        .unwrap_or_else(default_words);

    let port = opts.port.unwrap_or(config.server.port);
    let words_url = config.words.url.clone().filter(|_| !opts.no_refresh);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let executor = pacer_exec::build_executor(&config.executor, root)
            .map_err(|e| anyhow!("{e}"))?;

        let mut scheduler = Scheduler::new(store, executor)
            .with_options(config.scheduler_options())
            .with_default_payloads(defaults);
        if let Some(seed) = opts.seed {
            scheduler = scheduler.with_seed(seed);
        }
        let handle = scheduler.start().context("failed to start scheduler")?;

        let refresher = match &words_url {
            Some(url) => {
                let remote = RemoteWordList::new(url.clone(), config.words.timeout());
                let source = WordSource::new(handle.payloads().await?, Some(remote));
                Some(words::spawn_refresher(
                    source,
                    config.words.refresh_interval(),
                    handle.clone(),
                ))
            }
            None => None,
        };

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("failed to bind 127.0.0.1:{port}"))?;
        let actual_port = listener.local_addr()?.port();
        println!(
            "pacer running → http://127.0.0.1:{actual_port}  ({})",
            handle.status().headline()
        );

        let state = AppState::new(handle.clone()).with_words_url(words_url);
        let shutdown = async {
            if tokio::signal::ctrl_c().await.is_err() {
                warn!("could not install ctrl-c handler");
                std::future::pending::<()>().await;
            }
            info!("shutting down");
        };
        let result = pacer_server::serve_on(state, listener, shutdown).await;

        if let Some(task) = refresher {
            task.abort();
        }
        handle.shutdown().await;
        result
    })
}
