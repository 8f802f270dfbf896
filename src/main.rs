//! `gatehouse` CLI -- validate policy files and run one-shot guarded calls.
//!
//! Reads a canonical request from a JSON file, resolves an adapter for its
//! provider tag from credentials in the environment, runs the full guard
//! pipeline, and prints the canonical response plus violations as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use gatehouse::adapters::anthropic::AnthropicAdapter;
use gatehouse::adapters::ollama::{OllamaAdapter, DEFAULT_BASE_URL};
use gatehouse::adapters::openai::OpenAiAdapter;
use gatehouse::adapters::registry::AdapterRegistry;
use gatehouse::audit::AuditLogger;
use gatehouse::config::PolicyConfig;
use gatehouse::ledger::CostLedger;
use gatehouse::logging::LogFormat;
use gatehouse::pipeline::{Pipeline, PipelineOptions};
use gatehouse::skills::StaticSkillRegistry;
use gatehouse::types::{ProviderKind, ProxyRequest, ProxyResponse, Violation};

#[derive(Parser)]
#[command(name = "gatehouse", about = "Policy-enforcing proxy for LLM back-ends")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a policy configuration file and exit.
    Validate {
        /// Path to the policy JSON file.
        #[arg(long)]
        config: PathBuf,
    },
    /// Run one request through the guard pipeline.
    Run {
        /// Path to the policy JSON file.
        #[arg(long)]
        config: PathBuf,
        /// Path to the canonical request JSON file.
        #[arg(long)]
        request: PathBuf,
        /// Append an audit entry to this JSONL file.
        #[arg(long)]
        audit_log: Option<PathBuf>,
        /// Skill names the request's tools may ground against. May repeat.
        #[arg(long = "skill")]
        skills: Vec<String>,
        /// Emit diagnostics as JSON lines instead of human-readable text.
        #[arg(long)]
        log_json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Validate { config } => {
            gatehouse::logging::init(LogFormat::Text);
            let policy = PolicyConfig::load(&config)?;
            println!(
                "policy '{}' is valid: tier {:?}, providers {:?}",
                policy.project_name,
                policy.security_tier,
                policy
                    .agnostic_settings
                    .allowed_providers
                    .iter()
                    .map(|p| p.as_str())
                    .collect::<Vec<_>>()
            );
            Ok(())
        }
        Command::Run {
            config,
            request,
            audit_log,
            skills,
            log_json,
        } => {
            gatehouse::logging::init(if log_json {
                LogFormat::Json
            } else {
                LogFormat::Text
            });
            run_once(config, request, audit_log, skills).await
        }
    }
}

async fn run_once(
    config: PathBuf,
    request_path: PathBuf,
    audit_log: Option<PathBuf>,
    skills: Vec<String>,
) -> Result<()> {
    let policy = Arc::new(PolicyConfig::load(&config)?);

    let contents = std::fs::read_to_string(&request_path)
        .with_context(|| format!("failed to read request file {}", request_path.display()))?;
    let mut request: ProxyRequest =
        serde_json::from_str(&contents).context("request file is not a canonical request")?;
    if request.id.is_empty() {
        request.id = uuid::Uuid::new_v4().to_string();
    }

    let registry = build_registry(&policy);
    let mut pipeline = Pipeline::new(Arc::clone(&policy)).with_ledger(Arc::new(CostLedger::new()));
    if let Some(path) = audit_log {
        pipeline = pipeline.with_audit(Arc::new(
            AuditLogger::new(&path).context("failed to open audit log")?,
        ));
    }

    let skill_registry = (!skills.is_empty()).then(|| StaticSkillRegistry::from_names(skills));
    let options = PipelineOptions {
        skills: skill_registry
            .as_ref()
            .map(|r| r as &dyn gatehouse::skills::SkillRegistry),
    };

    let (response, violations) = match registry.resolve(request.provider) {
        Ok(adapter) => pipeline.run(&request, adapter.as_ref(), options).await,
        // Resolution failures keep the violations-as-data shape the
        // pipeline guarantees.
        Err(error) => (
            ProxyResponse::filtered(&request.id),
            vec![error.into_violation()],
        ),
    };

    print_outcome(&response, &violations)?;
    Ok(())
}

fn build_registry(policy: &PolicyConfig) -> AdapterRegistry {
    let mut registry = AdapterRegistry::new(policy.agnostic_settings.allowed_providers.clone());

    if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
        let model = std::env::var("GATEHOUSE_ANTHROPIC_MODEL")
            .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_owned());
        registry.register(
            ProviderKind::Anthropic,
            Arc::new(AnthropicAdapter::new(model, key)),
        );
    }
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        let model =
            std::env::var("GATEHOUSE_OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_owned());
        registry.register(ProviderKind::OpenAi, Arc::new(OpenAiAdapter::new(model, key)));
    }
    let ollama_url =
        std::env::var("GATEHOUSE_OLLAMA_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned());
    let ollama_model =
        std::env::var("GATEHOUSE_OLLAMA_MODEL").unwrap_or_else(|_| "llama3.1".to_owned());
    registry.register(
        ProviderKind::LocalOllama,
        Arc::new(OllamaAdapter::new(ollama_model, ollama_url)),
    );

    info!(providers = ?registry.registered().iter().map(|p| p.as_str()).collect::<Vec<_>>(), "adapters registered");
    registry
}

fn print_outcome(response: &ProxyResponse, violations: &[Violation]) -> Result<()> {
    let output = serde_json::json!({
        "response": response,
        "violations": violations,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
