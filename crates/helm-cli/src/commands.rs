//! Subcommand implementations: thin glue between `clap`'s parsed
//! arguments and the `helm-core`/`helm-planner`/`helm-providers` crates
//! that do the actual work.

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use helm_config::{Config, Workspace};
use helm_core::tools::{browser::BrowserToolState, ToolContext};
use helm_core::{
    context_limit_for_model, resolve_iteration_cap, Agent, AgentConfig, ProgressBus,
};
use helm_providers::router::{build_provider, ProviderKind as RouterProviderKind, ProviderSpec};
use helm_providers::LLMProvider;

use crate::cli_args::{Cli, Command, CronAction, SessionAction};
use crate::ui_writer_impl::ConsoleUiWriter;

fn to_router_kind(kind: helm_config::ProviderKind) -> RouterProviderKind {
    match kind {
        helm_config::ProviderKind::OpenAiCompatible => RouterProviderKind::OpenAiCompatible,
        helm_config::ProviderKind::AnthropicNative => RouterProviderKind::AnthropicNative,
        helm_config::ProviderKind::AnthropicOAuth => RouterProviderKind::AnthropicOAuth,
        helm_config::ProviderKind::AwsBedrock => RouterProviderKind::AwsBedrock,
        helm_config::ProviderKind::Azure => RouterProviderKind::Azure,
        helm_config::ProviderKind::GoogleVertex => RouterProviderKind::GoogleVertex,
        helm_config::ProviderKind::OpenRouter => RouterProviderKind::OpenRouter,
    }
}

fn resolve_provider(config: &Config, cli: &Cli) -> Result<Arc<dyn LLMProvider>> {
    let provider_name = cli.provider.clone().unwrap_or_else(|| config.agent.provider.clone());
    let entry = config.agent.providers.get(&provider_name);
    let model = cli.model.clone().unwrap_or_else(|| config.agent.model.clone());

    let spec = ProviderSpec {
        name: provider_name.clone(),
        kind: entry.map(|e| to_router_kind(e.kind)),
        api_key: entry.and_then(|e| e.api_key.clone()),
        base_url: entry.and_then(|e| e.base_url.clone()),
        region: entry.and_then(|e| e.region.clone()),
        deployment: entry.and_then(|e| e.deployment.clone()),
        model: Some(model),
        max_tokens: Some(config.agent.main_max_tokens),
        temperature: None,
    };

    let provider = build_provider(&spec)
        .with_context(|| format!("building provider '{provider_name}'"))?;
    Ok(Arc::from(provider))
}

fn resolve_workspace(config: &Config, cli: &Cli) -> Result<Arc<Workspace>> {
    let root = cli
        .workspace
        .clone()
        .unwrap_or_else(|| std::path::PathBuf::from(shellexpand::tilde(&config.agent.workspace).to_string()));
    Ok(Arc::new(Workspace::new(root)?))
}

fn resolve_tool_ctx(config: &Config, cli: &Cli, workspace: Arc<Workspace>, progress: ProgressBus) -> Result<ToolContext> {
    let profile_name = cli.profile.clone().unwrap_or_else(|| {
        config.default.clone().unwrap_or_else(|| "default".to_string())
    });
    let port = config.resolve_profile_port(&profile_name).unwrap_or(9222);
    let profile_dir = Config::profiles_dir()?.join(&profile_name);
    let cdp_url_override = std::env::var("CDP_URL").ok().or_else(|| config.agent.cdp_url.clone());

    Ok(ToolContext {
        workspace: workspace.clone(),
        browser: Arc::new(tokio::sync::Mutex::new(BrowserToolState::new(port, profile_dir, cdp_url_override))),
        shell_enabled: config.agent.shell_enabled,
        jobs_path: Config::jobs_path()?,
        job_store: Arc::new(tokio::sync::Mutex::new(helm_core::cron::JobStore::load(&Config::jobs_path()?)?)),
        cron_registry: helm_core::cron::CronRunRegistry::new(),
        progress,
    })
}

struct Session {
    provider: Arc<dyn LLMProvider>,
    tool_ctx: ToolContext,
    model: String,
    context_limit: u32,
    iteration_cap: u32,
    workspace_path: std::path::PathBuf,
    decompose_enabled: bool,
}

fn build_session(cli: &Cli, config: &Config) -> Result<Session> {
    let provider = resolve_provider(config, cli)?;
    let workspace = resolve_workspace(config, cli)?;
    let workspace_path = workspace.root().to_path_buf();
    let progress = ProgressBus::new();
    let tool_ctx = resolve_tool_ctx(config, cli, workspace, progress)?;
    let model = cli.model.clone().unwrap_or_else(|| config.agent.model.clone());
    let context_limit = provider.context_window_size().unwrap_or_else(|| context_limit_for_model(&model));
    let iteration_cap = resolve_iteration_cap(config.agent.iteration_cap);

    Ok(Session {
        provider,
        tool_ctx,
        model,
        context_limit,
        iteration_cap,
        workspace_path,
        decompose_enabled: config.agent.decompose_enabled,
    })
}

fn new_agent(session: &Session, session_id: &str) -> Agent<ConsoleUiWriter> {
    let config = AgentConfig {
        workspace: session.workspace_path.clone(),
        model: session.model.clone(),
        context_limit: session.context_limit,
        iteration_cap: session.iteration_cap,
        session_id: session_id.to_string(),
        system_prompt_override: None,
    };
    Agent::new(
        config,
        session.provider.clone(),
        session.tool_ctx.clone(),
        session.tool_ctx.progress.clone(),
        ConsoleUiWriter,
    )
}

async fn run_one_shot(session: &Session, task: &str, force_decompose: bool) -> Result<String> {
    if session.decompose_enabled || force_decompose {
        let abort = helm_core::AbortFlag::new();
        let decomposed = helm_planner::decompose_and_run(
            task,
            session.provider.clone(),
            session.tool_ctx.clone(),
            session.tool_ctx.progress.clone(),
            session.model.clone(),
            session.context_limit,
            session.iteration_cap,
            &abort,
        )
        .await?;
        if let Some(result) = decomposed {
            return Ok(result.final_output);
        }
    }

    let mut agent = new_agent(session, &uuid::Uuid::new_v4().to_string());
    agent.run(task).await
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match &cli.command {
        Some(Command::Run { task, decompose }) => {
            let session = build_session(&cli, &config)?;
            let reply = run_one_shot(&session, task, *decompose).await?;
            println!("{reply}");
        }
        Some(Command::Repl) | None if cli.task.is_none() && matches!(cli.command, None) => {
            repl(&cli, &config).await?;
        }
        None => {
            if let Some(task) = &cli.task {
                let session = build_session(&cli, &config)?;
                let reply = run_one_shot(&session, task, false).await?;
                println!("{reply}");
            } else {
                repl(&cli, &config).await?;
            }
        }
        Some(Command::Research { query, topics }) => {
            let session = build_session(&cli, &config)?;
            let abort = helm_core::AbortFlag::new();
            let plan = helm_planner::decompose_research(query, *topics, session.provider.as_ref()).await?;
            let runner = helm_planner::SubtaskRunner::new(
                session.provider.clone(),
                session.tool_ctx.clone(),
                session.tool_ctx.progress.clone(),
                session.model.clone(),
                session.context_limit,
                session.iteration_cap,
            );
            let result = runner.run(query, plan, &abort).await?;
            println!("{}", result.final_output);
        }
        Some(Command::Session { action }) => session_command(&cli, action)?,
        Some(Command::Cron { action }) => cron_command(action)?,
        Some(Command::Config) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

async fn repl(cli: &Cli, config: &Config) -> Result<()> {
    let session = build_session(cli, config)?;
    let session_id = uuid::Uuid::new_v4().to_string();
    let mut agent = new_agent(&session, &session_id);
    let mut record = helm_core::session::Session::new(
        session_id.clone(),
        session.model.clone(),
        cli.provider.clone().unwrap_or_else(|| config.agent.provider.clone()),
        session.context_limit,
    );

    println!("helm — type a task, or 'exit' to quit.");
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        let reply = agent.run(line).await?;
        println!("\n{reply}\n");

        record.messages = agent.history.clone();
        record.usage = agent.usage;
        if let Ok(sessions_dir) = Config::sessions_dir() {
            let _ = record.save(&sessions_dir);
        }
    }
    Ok(())
}

fn session_command(_cli: &Cli, action: &SessionAction) -> Result<()> {
    let sessions_dir = Config::sessions_dir()?;
    match action {
        SessionAction::List => {
            for meta in helm_core::list_sessions(&sessions_dir, None)? {
                println!(
                    "{}  {:>4} msgs  {}  {}",
                    meta.id, meta.message_count, meta.updated_at, meta.title
                );
            }
        }
        SessionAction::Show { id } => {
            let session = helm_core::session::Session::load(&sessions_dir, id)?;
            println!("{}", session.to_markdown());
        }
    }
    Ok(())
}

fn cron_command(action: &CronAction) -> Result<()> {
    let jobs_path = Config::jobs_path()?;
    let mut store = helm_core::cron::JobStore::load(&jobs_path)?;

    match action {
        CronAction::Create { name, task, interval_minutes, cron } => {
            let schedule = if let Some(expr) = cron {
                helm_core::cron::ScheduleSpec::Cron { expression: expr.clone(), timezone: None }
            } else {
                helm_core::cron::ScheduleSpec::Interval { minutes: interval_minutes.unwrap_or(60) }
            };
            let job = helm_core::cron::CronJob {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.clone(),
                task_text: task.clone(),
                schedule,
                paused: false,
                created: chrono::Utc::now(),
                last_fired: None,
            };
            println!("created job {}", job.id);
            store.jobs.insert(job.id.clone(), job);
            store.save(&jobs_path)?;
        }
        CronAction::List => {
            for job in store.jobs.values() {
                println!("{}  {}  {}  paused={}", job.id, job.name, job.task_text, job.paused);
            }
        }
        CronAction::Pause { id } => {
            if let Some(job) = store.jobs.get_mut(id) {
                job.paused = true;
                store.save(&jobs_path)?;
            }
        }
        CronAction::Resume { id } => {
            if let Some(job) = store.jobs.get_mut(id) {
                job.paused = false;
                store.save(&jobs_path)?;
            }
        }
        CronAction::Delete { id } => {
            store.jobs.remove(id);
            store.save(&jobs_path)?;
        }
    }
    Ok(())
}
