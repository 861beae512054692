use crate::{
    cli::args::{ConfigArgs, ServeArgs},
    core::{
        config::DraftmillConfig,
        error::AppError,
        workflow::{
            gates::{ArticleGenerationGate, SeedApprovalGate, TopicApprovalGate},
            pipeline::{CompletedSection, CompletionMonitor, Document, Section, SectionPipeline},
            retry::RetryPolicy,
            state::Phase,
            steps::{PhaseWorker, StepRuntime},
            store::MemoryStore,
            EventBus, MemoryLedger, Researcher, TransitionExecutor, Writer,
        },
        ConfigLoader,
    },
    server, Result,
};
use anyhow::Error;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Phase collaborator that succeeds immediately with a structured marker
/// payload. Stands in until an external worker is wired; useful for smoke
/// tests and dry runs of the orchestration surface.
struct PassthroughWorker;

#[async_trait]
impl PhaseWorker for PassthroughWorker {
    async fn run(&self, workflow_id: Uuid, phase: Phase) -> std::result::Result<Value, AppError> {
        Ok(json!({
            "workflow_id": workflow_id.to_string(),
            "phase": phase.as_str(),
            "passthrough": true,
        }))
    }
}

struct PassthroughResearcher;

#[async_trait]
impl Researcher for PassthroughResearcher {
    async fn research(
        &self,
        _document: &Document,
        section: &Section,
        _prior: &[CompletedSection],
    ) -> std::result::Result<Value, AppError> {
        Ok(json!({ "header": section.header, "passthrough": true }))
    }
}

struct PassthroughWriter;

#[async_trait]
impl Writer for PassthroughWriter {
    async fn write(
        &self,
        _document: &Document,
        section: &Section,
        _research: &Value,
        _prior: &[CompletedSection],
    ) -> std::result::Result<String, AppError> {
        Ok(format!("## {}\n", section.header))
    }
}

fn resolve_workspace(path: &Option<PathBuf>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path.clone()),
        None => env::current_dir().map_err(Error::from),
    }
}

pub async fn serve(args: ServeArgs) -> Result<()> {
    let workspace = resolve_workspace(&args.path)?;
    let mut config = ConfigLoader::load_from_workspace(&workspace)?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    let auth_token = server::load_auth_token(&config.server)?;

    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(MemoryLedger::new());
    let (bus, mut event_rx) = EventBus::channel();
    let executor = TransitionExecutor::new(store.clone(), bus);

    // Automation consumers attach out of process; the in-process dispatcher
    // just drains and logs the committed events.
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            info!(
                workflow_id = %event.workflow_id,
                event = %event.name,
                "automation event"
            );
        }
    });

    let retry_policy = RetryPolicy::from_config(&config.retry);
    let work_timeout = Duration::from_millis(config.execution.work_timeout_ms);
    let pipeline = Arc::new(SectionPipeline::new(
        store.clone(),
        Arc::new(PassthroughResearcher),
        Arc::new(PassthroughWriter),
        retry_policy.clone(),
        work_timeout,
    ));
    let monitor = Arc::new(CompletionMonitor::new(
        store.clone(),
        store.clone(),
        executor.clone(),
        ledger.clone(),
    ));
    let runtime = Arc::new(StepRuntime::new(
        store.clone(),
        store.clone(),
        store.clone(),
        ledger,
        executor,
        Arc::new(SeedApprovalGate::new(
            store.clone(),
            store.clone(),
            config.gates.seed_approval_fail_open,
        )),
        Arc::new(TopicApprovalGate::new(
            store.clone(),
            store.clone(),
            config.gates.topic_approval_fail_open,
        )),
        Arc::new(ArticleGenerationGate::new(
            store.clone(),
            config.gates.article_generation_fail_open,
        )),
        Arc::new(PassthroughWorker),
        pipeline,
        monitor,
        retry_policy,
        work_timeout,
    ));

    let state = server::ServerState::new(
        runtime,
        store.clone(),
        store,
        Arc::new(server::NoopRateLimiter),
        auth_token,
    );
    server::serve(&config.server, state).await?;
    Ok(())
}

pub async fn config(args: ConfigArgs) -> Result<()> {
    let workspace = resolve_workspace(&args.path)?;
    let config: DraftmillConfig = ConfigLoader::load_from_workspace(&workspace)?;
    println!("{}", toml::to_string_pretty(&config).map_err(Error::from)?);
    if args.env_vars {
        println!("Environment variable overrides:");
        for line in ConfigLoader::env_var_documentation() {
            println!("  {}", line);
        }
    }
    Ok(())
}
