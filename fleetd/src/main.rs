//! CLI entry point: bootstraps the process in the dependency order
//! Config → Providers → ConnectionPools → Index → Memory → Ledger → Fleet →
//! Router → Orchestrator → Interfaces (§9 design notes).

use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};

use contextstore::{ProjectMemory, SearchIndex};
use ledgerstore::Ledger;

use fleetd::cli::{Cli, Command, LedgerCommand, MemoryCommand};
use fleetd::config::Config;
use fleetd::domain::{Provider, Task, WorkerSlot};
use fleetd::errors::FleetError;
use fleetd::fleet::Fleet;
use fleetd::llm::{ConnectionPool, LlmClient, OpenAiCompatibleClient};
use fleetd::orchestrator::Orchestrator;
use fleetd::router::{Candidate, Router, Strategy};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("failed to load configuration")?;

    fleetd::logging::init(&config.log_level)?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let exit_code = runtime.block_on(run(cli, config));

    match exit_code {
        Ok(()) => Ok(()),
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            std::process::exit(err.exit_code());
        }
    }
}

async fn run(cli: Cli, config: Config) -> Result<(), FleetError> {
    if config.providers.is_empty() {
        return Err(FleetError::Fatal("no providers configured".to_string()));
    }

    let mut clients: HashMap<String, Arc<dyn LlmClient>> = HashMap::new();
    let mut providers = Vec::new();
    let mut concurrency_caps = HashMap::new();
    for provider_config in &config.providers {
        let credential = provider_config.resolve_credential().map_err(FleetError::from)?;
        let client = OpenAiCompatibleClient::new(provider_config.base_url.clone(), credential.clone()).map_err(FleetError::from)?;
        clients.insert(provider_config.name.clone(), Arc::new(client));
        concurrency_caps.insert(provider_config.name.clone(), provider_config.concurrency_cap);
        providers.push(Provider {
            name: provider_config.name.clone(),
            base_url: provider_config.base_url.clone(),
            credential,
            models: provider_config.models.clone(),
            concurrency_cap: provider_config.concurrency_cap,
            token_budget_per_minute: provider_config.token_budget_per_minute,
        });
    }

    let cache_ttl = config.cache.enabled.then(|| std::time::Duration::from_secs(config.cache.ttl_seconds));
    let pool = ConnectionPool::new(&providers, clients, cache_ttl);

    let index = Arc::new(SearchIndex::open(&config.index.data_dir).map_err(FleetError::from)?);
    let ledger = Arc::new(Ledger::open(&config.ledger.data_dir, config.ledger.genesis_id.clone()).map_err(FleetError::from)?);

    let total_workers = config.worker_count.total.min(512);
    let slots = distribute_slots(total_workers, &providers);
    let fleet = Arc::new(Fleet::new(slots, pool, concurrency_caps));

    let router = Arc::new(Router::new(build_candidates(&config, &providers)));

    let orchestrator = Arc::new(Orchestrator::new(router, fleet, ledger.clone(), index.clone(), config.memory.data_dir.clone()));

    match cli.command {
        Command::Serve => serve(orchestrator, index, ledger, config).await,
        Command::Submit { project, description, deadline_ms } => {
            let task = Task::new(project, description);
            let deadline = std::time::Duration::from_millis(deadline_ms.unwrap_or(60_000));
            let handle = orchestrator.submit(task).await?;
            let outcome = orchestrator.await_result(handle, deadline).await.map_err(|err| match err {
                fleetd::orchestrator::AwaitError::DeadlineExceeded => FleetError::DeadlineExceeded,
                fleetd::orchestrator::AwaitError::Cancelled => FleetError::Cancelled,
                fleetd::orchestrator::AwaitError::Fatal => FleetError::Fatal("orchestrator channel closed".to_string()),
            })?;
            println!("{} {}", "task:".green().bold(), outcome.task_id);
            println!("{:?}", outcome.status);
            println!("{}", outcome.content);
            Ok(())
        }
        Command::Status { task_id } => {
            let resolved = resolve_task_id(&orchestrator, task_id).await?;
            match orchestrator.status(&resolved).await {
                Some(outcome) => {
                    println!("{:?}", outcome.status);
                    Ok(())
                }
                None => Err(FleetError::NotFound(resolved)),
            }
        }
        Command::Cancel { task_id } => {
            let resolved = resolve_task_id(&orchestrator, task_id).await?;
            if orchestrator.cancel(&resolved).await {
                println!("cancelled {resolved}");
                Ok(())
            } else {
                Err(FleetError::NotFound(resolved))
            }
        }
        Command::Search { query, limit } => {
            let sources = [contextstore::SourceKind::Files, contextstore::SourceKind::Memory, contextstore::SourceKind::Changes]
                .into_iter()
                .collect();
            for hit in index.search(&query, &sources, &contextstore::Filters::default(), limit) {
                println!("{:.3}  {}  {:?}", hit.score, hit.id, hit.kind);
            }
            Ok(())
        }
        Command::Memory(MemoryCommand::Init { project }) => {
            let memory = ProjectMemory::new(&config.memory.data_dir, &index);
            memory.initialize_project(&project).map_err(FleetError::from)
        }
        Command::Memory(MemoryCommand::Append { project, entry }) => {
            let memory = ProjectMemory::new(&config.memory.data_dir, &index);
            memory.append_change(&project, &entry).map_err(FleetError::from)
        }
        Command::Memory(MemoryCommand::Context { project, query, budget }) => {
            let memory = ProjectMemory::new(&config.memory.data_dir, &index);
            println!("{}", memory.relevant_context(&project, &query, budget));
            Ok(())
        }
        Command::Ledger(LedgerCommand::Verify { from, to }) => {
            let valid = ledger.verify(&from, &to).map_err(FleetError::from)?;
            println!("{}", if valid { "valid".green() } else { "INVALID".red() });
            if valid {
                Ok(())
            } else {
                Err(FleetError::LedgerIntegrity(format!("chain broken between {from} and {to}")))
            }
        }
    }
}

async fn serve(orchestrator: Arc<Orchestrator>, index: Arc<SearchIndex>, ledger: Arc<Ledger>, config: Config) -> Result<(), FleetError> {
    let Some(listen_addr) = config.http.listen_addr else {
        tracing::info!("http.listen_addr not set; running without the HTTP API");
        tokio::signal::ctrl_c().await.ok();
        return Ok(());
    };

    let state = fleetd::http::AppState { orchestrator, index, ledger, memory_data_dir: config.memory.data_dir };
    let app = fleetd::http::router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await.map_err(|err| FleetError::Fatal(err.to_string()))?;
    tracing::info!(%listen_addr, "http api listening");
    axum::serve(listener, app).await.map_err(|err| FleetError::Fatal(err.to_string()))
}

/// Resolve a `Status`/`Cancel` CLI argument, which may be a full task id or
/// a partial hex prefix/slug reference, to the one full id it matches.
async fn resolve_task_id(orchestrator: &Orchestrator, reference: String) -> Result<String, FleetError> {
    match orchestrator.resolve_task_id(&reference).await {
        Ok(Some(full_id)) => Ok(full_id),
        Ok(None) => Ok(reference),
        Err(candidates) => Err(FleetError::InvalidInput(format!("ambiguous task id {reference}: matches {}", candidates.join(", ")))),
    }
}

fn distribute_slots(total: u32, providers: &[Provider]) -> Vec<WorkerSlot> {
    let mut slots = Vec::with_capacity(total as usize);
    for i in 0..total {
        let provider = &providers[(i as usize) % providers.len()];
        let model = provider.models.first().cloned().unwrap_or_else(|| "default".to_string());
        slots.push(WorkerSlot::new(i, provider.name.clone(), model));
    }
    slots
}

fn build_candidates(config: &Config, providers: &[Provider]) -> HashMap<Strategy, Vec<Candidate>> {
    let mut candidates = HashMap::new();
    for (strategy, preferred_model) in [
        (Strategy::Fast, &config.routing.fast_model),
        (Strategy::Standard, &config.routing.standard_model),
        (Strategy::Deep, &config.routing.deep_model),
        (Strategy::Aggregate, &config.routing.standard_model),
    ] {
        let list = providers
            .iter()
            .map(|p| Candidate { provider: p.name.clone(), model: preferred_model.clone() })
            .collect();
        candidates.insert(strategy, list);
    }
    candidates
}
