//! `aide` - a personal AI assistant for the terminal
//!
//! Answers questions with an OpenAI-compatible model, built-in tools and a
//! small learned knowledge base, and remembers what users tell it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, ConfigCommand, KnowledgeCommand, Who};
use crate::output::OutputFormatter;
use aide_core::agent::{ReActAgent, ReactContext, ToolRegistry};
use aide_core::config::{Config, Strategy};
use aide_core::llm::{ChatBackend, ChatMessage, LlmClient, LlmConfig};
use aide_core::{AideError, PersonalAssistant};

mod cli;
mod output;

const DEFAULT_LOG_FILTER: &str = "aide=warn,aide_core=warn";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", describe(&e));
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// User-facing text for an error, preferring the assistant's own wording
fn describe(err: &anyhow::Error) -> String {
    match err.downcast_ref::<AideError>() {
        Some(e) => e.user_message(),
        None => format!("{:#}", err),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new();
    let mut config = Config::load_or_default();

    match cli.command {
        Some(Commands::Ask {
            question,
            who,
            routed,
            stats,
        }) => {
            if routed {
                config.assistant.strategy = Strategy::Routed;
            }
            ask(config, &formatter, &question.join(" "), &who, stats).await?;
        }

        None if !cli.query.is_empty() => {
            let who = Who {
                user: cli::DEFAULT_USER.to_string(),
                session: cli::DEFAULT_SESSION.to_string(),
            };
            ask(config, &formatter, &cli.query.join(" "), &who, false).await?;
        }

        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
        }

        Some(Commands::React { question }) => {
            let backend = llm_backend(&config)?;
            let tools = Arc::new(ToolRegistry::with_builtin_tools(&config.web_search));
            let agent = ReActAgent::new(backend, tools, config.assistant.max_react_steps);
            let outcome = agent
                .think(&question.join(" "), &ReactContext::default(), None)
                .await?;
            formatter.print_react(&outcome);
        }

        Some(Commands::Tools) => {
            formatter.print_tools(&ToolRegistry::with_builtin_tools(&config.web_search));
        }

        Some(Commands::Memories { user }) => {
            let assistant = offline_assistant(config)?;
            formatter.print_memories(&user, &assistant.get_user_memories(&user)?);
        }

        Some(Commands::History { who }) => {
            let assistant = offline_assistant(config)?;
            formatter.print_history(&assistant.get_conversation_history(&who.user, &who.session)?);
        }

        Some(Commands::Forget { user }) => {
            let assistant = offline_assistant(config)?;
            let removed = assistant.forget_user(&user)?;
            formatter.print_done(&format!("Removed {} records for {}", removed, user));
        }

        Some(Commands::Knowledge { cmd }) => {
            let assistant = offline_assistant(config)?;
            match cmd {
                KnowledgeCommand::Add { text, source } => {
                    assistant.add_knowledge(&text.join(" "), &source)?;
                    formatter.print_done("Document added");
                }
                KnowledgeCommand::Search { query, k } => {
                    formatter.print_search(&assistant.knowledge_search(&query.join(" "), Some(k)));
                }
                KnowledgeCommand::Stats => {
                    formatter.print_knowledge_stats(&assistant.knowledge_statistics());
                }
            }
        }

        Some(Commands::Feedback { correction, who }) => {
            let assistant = offline_assistant(config)?;
            assistant.record_feedback(&who.user, &who.session, &correction.join(" "))?;
            formatter.print_done("Thanks, the correction will be used from now on");
        }

        Some(Commands::Graph { png }) => {
            let cwd = std::env::current_dir().context("Failed to read the working directory")?;
            for path in cli::graph::export(&cwd, png).await? {
                formatter.print_done(&format!("Wrote {}", path.display()));
            }
        }

        Some(Commands::Config { cmd }) => handle_config(cmd, &config, &formatter)?,
    }

    Ok(())
}

async fn ask(
    config: Config,
    formatter: &OutputFormatter,
    question: &str,
    who: &Who,
    stats: bool,
) -> Result<()> {
    let backend = llm_backend(&config)?;
    let assistant = PersonalAssistant::new(config, backend).context("Failed to open assistant stores")?;

    formatter.print_question(question);
    let result = assistant
        .process_query(&who.user, question, Some(&who.session))
        .await?;
    formatter.print_answer(&result);

    if stats {
        formatter.print_metrics(&assistant.get_performance_metrics());
    }
    Ok(())
}

fn llm_backend(config: &Config) -> Result<Arc<dyn ChatBackend>> {
    config.validate()?;
    let client = LlmClient::new(LlmConfig::from_settings(&config.llm))?;
    Ok(Arc::new(client))
}

/// Assistant for commands that only touch memory and knowledge.
///
/// These work without an API key, so the model is replaced by a backend
/// that refuses every call.
fn offline_assistant(config: Config) -> Result<PersonalAssistant> {
    PersonalAssistant::new(config, Arc::new(NoModel)).context("Failed to open assistant stores")
}

struct NoModel;

#[async_trait]
impl ChatBackend for NoModel {
    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _max_tokens: Option<u32>,
    ) -> aide_core::Result<String> {
        Err(AideError::MissingConfig {
            key: "OPENAI_API_KEY".to_string(),
        })
    }
}

fn handle_config(cmd: ConfigCommand, config: &Config, formatter: &OutputFormatter) -> Result<()> {
    let path = Config::default_path().context("Could not determine the config directory")?;
    match cmd {
        ConfigCommand::Path => println!("{}", path.display()),
        ConfigCommand::Show => {
            let mut shown = config.clone();
            shown.llm.api_key = mask(&shown.llm.api_key);
            shown.web_search.api_key = mask(&shown.web_search.api_key);
            print!("{}", toml::to_string_pretty(&shown)?);
        }
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            Config::default().save(&path)?;
            formatter.print_done(&format!("Wrote {}", path.display()));
        }
    }
    Ok(())
}

fn mask(key: &str) -> String {
    if key.is_empty() {
        return String::new();
    }
    let tail: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("****{}", tail)
}
