//! `agent-factory` - command-line console for hierarchical agents.

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use agent_factory::agents::{
    level_from_tags, supervisor_from_tags, AgentDirectory, AgentSpec, Reconciler,
    SpecOverrides, JOB_DIRECTIVES_LABEL, PERSONA_LABEL,
};
use agent_factory::catalog::{Catalog, Provider, CONTEXT_WINDOWS};
use agent_factory::chat::{collect_chunks, StreamChunk};
use agent_factory::client::{AgentService, LettaClient};
use agent_factory::logging;
use agent_factory::session::SessionContext;
use agent_factory::Config;

#[derive(Parser, Debug)]
#[command(name = "agent-factory")]
#[command(about = "Create, edit, list and chat with hierarchical Letta agents", long_about = None)]
#[command(version)]
struct Cli {
    /// Agent server URL
    #[arg(long, env = "LETTA_BASE_URL", global = true)]
    base_url: Option<String>,

    /// Bearer token for the agent server
    #[arg(long, env = "LETTA_API_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List agents
    List,

    /// Show an agent's configuration
    Show { agent_id: String },

    /// Create a new agent
    Create(SpecArgs),

    /// Update an existing agent; unspecified fields keep their current value.
    ///
    /// Fails if the agent cannot be read, unless name, persona, directives,
    /// level and supervisor are all given.
    Update {
        agent_id: String,

        #[command(flatten)]
        spec: SpecArgs,
    },

    /// Delete an agent
    Delete { agent_id: String },

    /// Chat with an agent
    Chat {
        agent_id: String,

        /// Send a single message and exit instead of reading stdin
        #[arg(short, long)]
        message: Option<String>,

        /// Wait for the whole reply instead of streaming it
        #[arg(long, requires = "message")]
        no_stream: bool,
    },

    /// Show the provider, model and context window catalog
    Models,
}

#[derive(Args, Debug, Default)]
struct SpecArgs {
    /// Agent name
    #[arg(long)]
    name: Option<String>,

    /// Persona memory (max 3000 characters)
    #[arg(long)]
    persona: Option<String>,

    /// Job directives memory (max 2000 characters)
    #[arg(long)]
    directives: Option<String>,

    /// Hierarchy level: 1 = worker, 2-3 = supervisor
    #[arg(long)]
    level: Option<u8>,

    /// Supervisor grouping this agent reports to
    #[arg(long)]
    supervisor: Option<String>,

    /// LLM provider (openai, anthropic, groq, mistral, cohere)
    #[arg(long)]
    provider: Option<Provider>,

    /// Model id from the provider's catalog
    #[arg(long)]
    model: Option<String>,

    /// Context window size
    #[arg(long)]
    context_window: Option<u32>,

    /// Sampling temperature between 0.0 and 1.0
    #[arg(long)]
    temperature: Option<f64>,
}

impl From<SpecArgs> for SpecOverrides {
    fn from(args: SpecArgs) -> Self {
        SpecOverrides {
            name: args.name,
            persona: args.persona,
            job_directives: args.directives,
            level: args.level,
            supervisor_name: args.supervisor,
            provider: args.provider,
            model: args.model,
            context_window: args.context_window,
            temperature: args.temperature,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    logging::init(logging::DEFAULT_FILTER);

    let cli = Cli::parse();

    let catalog = Catalog::builtin();
    catalog.validate().context("provider catalog is incomplete")?;

    let mut config = Config::from_env()?;
    if let Some(url) = &cli.base_url {
        config = config.with_base_url(url)?;
    }
    config = config.with_api_token(cli.token.clone());
    tracing::debug!(?config, "Loaded configuration");

    let service: Arc<dyn AgentService> = Arc::new(LettaClient::new(&config)?);
    let directory = AgentDirectory::new(Arc::clone(&service));
    let reconciler = Reconciler::new(Arc::clone(&service), &config);
    let mut session = SessionContext::new();

    match cli.command {
        Command::List => {
            let agents = session.agents(&directory).await;
            if agents.is_empty() {
                println!("No agents found");
            }
            for agent in agents {
                println!("{}  {}  [{}]", agent.id, agent.name, agent.tags.join(", "));
            }
        }

        Command::Show { agent_id } => {
            let record = directory.retrieve(&agent_id).await?;
            let spec = AgentSpec::from_record(&record);
            println!("ID: {}", record.id);
            println!("Name: {}", record.name);
            match &record.llm_config {
                Some(llm) if !llm.model.is_empty() => {
                    println!("Model: {} ({})", llm.model, llm.model_endpoint_type);
                    println!("Context window: {}", llm.context_window);
                    println!("Temperature: {}", llm.temperature);
                }
                _ => eprintln!("Agent is not properly configured with an LLM backend"),
            }
            if let Some(embedding) = &record.embedding_config {
                println!(
                    "Embedding: {} ({}, dim {})",
                    embedding.embedding_model,
                    embedding.embedding_endpoint_type,
                    embedding.embedding_dim
                );
            }
            println!(
                "Level: {}",
                level_from_tags(&record.tags)
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| "unknown".to_string())
            );
            println!(
                "Supervisor: {}",
                supervisor_from_tags(&record.tags).unwrap_or_default()
            );
            println!("Tags: {}", record.tags.join(", "));
            if let Some(block) = record.block(PERSONA_LABEL) {
                println!("Persona: {}", block.value);
            }
            if let Some(block) = record.block(JOB_DIRECTIVES_LABEL) {
                println!("Job directives: {}", block.value);
            }
            if spec.tags() != record.tags {
                eprintln!("Note: tags differ from the level/supervisor convention");
            }
        }

        Command::Create(args) => {
            let mut spec = AgentSpec::create_defaults(catalog);
            SpecOverrides::from(args).apply(&mut spec, catalog);
            let record = reconciler.create(&spec).await?;
            session.invalidate_agents();
            println!("Created agent with ID: {}", record.id);
        }

        Command::Update { agent_id, spec: args } => {
            let spec = SpecOverrides::from(args)
                .resolve_update(&directory, &agent_id, catalog)
                .await
                .context("could not read the current agent configuration")?;
            reconciler.modify(&agent_id, &spec).await?;
            session.invalidate_agents();
            println!("Updated agent {}", agent_id);
        }

        Command::Delete { agent_id } => {
            if !directory.delete(&agent_id).await {
                bail!("could not delete agent {}", agent_id);
            }
            session.invalidate_agents();
            println!("Deleted agent {}", agent_id);
        }

        Command::Chat {
            agent_id,
            message,
            no_stream,
        } => {
            let record = directory.retrieve(&agent_id).await?;
            session.select_agent(&record.id);
            println!("Chatting with {} ({})", record.name, record.id);

            match message {
                Some(text) if no_stream => {
                    let chunks = service.send_message(&record.id, &text).await?;
                    let outcome = collect_chunks(&chunks);
                    for thought in &outcome.reasoning {
                        println!("(thinking) {}", thought);
                    }
                    println!("{}", outcome.content);
                }
                Some(text) => chat_once(&mut session, service.as_ref(), &text).await?,
                None => chat_loop(&mut session, service.as_ref()).await?,
            }
        }

        Command::Models => {
            for (provider, entry) in catalog.providers() {
                let embedding = catalog.embedding_profile(provider);
                println!("{} ({})", provider, entry.endpoint);
                println!("  models: {}", entry.models.join(", "));
                println!("  embedding: {} (dim {})", embedding.model, embedding.dim);
            }
            let windows: Vec<String> = CONTEXT_WINDOWS.iter().map(|w| w.to_string()).collect();
            println!("context windows: {}", windows.join(", "));
        }
    }

    Ok(())
}

/// Stream one reply to stdout as it arrives.
async fn chat_once(
    session: &mut SessionContext,
    service: &dyn AgentService,
    prompt: &str,
) -> anyhow::Result<()> {
    let outcome = session
        .chat_turn(service, prompt, |chunk| match chunk {
            StreamChunk::Reasoning { text } => println!("(thinking) {}", text),
            StreamChunk::Assistant { text } => {
                print!("{}", text);
                let _ = std::io::stdout().flush();
            }
            StreamChunk::Usage(_) => {}
            StreamChunk::Unknown { message_type, .. } => {
                tracing::debug!(?message_type, "Unexpected chunk format");
            }
        })
        .await?;
    println!();

    if let Some(reason) = outcome.interrupted {
        eprintln!("Reply interrupted: {}", reason);
    }
    Ok(())
}

/// Read prompts from stdin until EOF or `/quit`.
async fn chat_loop(session: &mut SessionContext, service: &dyn AgentService) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        if prompt == "/quit" {
            break;
        }
        // A failed turn is reported and the loop continues; nothing is retried.
        if let Err(e) = chat_once(session, service, prompt).await {
            eprintln!("Error: {:#}", e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_stream_requires_message() {
        assert!(Cli::try_parse_from(["agent-factory", "chat", "agent-1", "--no-stream"]).is_err());

        let cli = Cli::try_parse_from([
            "agent-factory",
            "chat",
            "agent-1",
            "--no-stream",
            "-m",
            "hello",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Chat { no_stream: true, message: Some(ref m), .. } if m == "hello"
        ));
    }

    #[test]
    fn test_update_flags_map_to_overrides() {
        let cli = Cli::try_parse_from([
            "agent-factory",
            "update",
            "agent-1",
            "--temperature",
            "0.5",
            "--provider",
            "groq",
        ])
        .unwrap();
        let Command::Update { agent_id, spec } = cli.command else {
            panic!("expected update");
        };
        assert_eq!(agent_id, "agent-1");
        let overrides = SpecOverrides::from(spec);
        assert_eq!(overrides.temperature, Some(0.5));
        assert_eq!(overrides.provider, Some(Provider::Groq));
        assert!(!overrides.covers_identity());
    }
}
