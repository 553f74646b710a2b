//! CLI argument parsing using clap 4.x derive macros

pub mod graph;

use clap::{Parser, Subcommand};

pub const DEFAULT_USER: &str = "default_user";
pub const DEFAULT_SESSION: &str = "test_session";

/// A personal AI assistant with memory, tools and retrieval
///
/// Talks to any OpenAI-compatible endpoint. Facts you mention and answers it
/// is confident about are remembered between runs.
#[derive(Parser, Debug)]
#[command(name = "aide")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Direct question (alternative to the 'ask' subcommand)
    #[arg(num_args = 1..)]
    pub query: Vec<String>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask the assistant a question
    Ask {
        /// The question
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,

        #[command(flatten)]
        who: Who,

        /// Answer through the routed stage pipeline
        #[arg(long)]
        routed: bool,

        /// Print performance metrics after the answer
        #[arg(long)]
        stats: bool,
    },

    /// Run the ReAct agent directly and print its reasoning
    React {
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },

    /// List the available tools
    Tools,

    /// Show what the assistant remembers about a user
    Memories {
        #[arg(short, long, default_value = DEFAULT_USER)]
        user: String,
    },

    /// Show a session's conversation history
    History {
        #[command(flatten)]
        who: Who,
    },

    /// Delete a user's memories and conversations
    Forget {
        #[arg(short, long, default_value = DEFAULT_USER)]
        user: String,
    },

    /// Manage the knowledge base
    Knowledge {
        #[command(subcommand)]
        cmd: KnowledgeCommand,
    },

    /// Correct the assistant's last answer
    Feedback {
        /// What the right answer is
        #[arg(required = true, num_args = 1..)]
        correction: Vec<String>,

        #[command(flatten)]
        who: Who,
    },

    /// Export the routed pipeline as a Mermaid graph
    Graph {
        /// Also render a PNG through mermaid.ink
        #[arg(long)]
        png: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommand,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct Who {
    /// User the conversation belongs to
    #[arg(short, long, default_value = DEFAULT_USER)]
    pub user: String,

    /// Conversation session
    #[arg(short, long, default_value = DEFAULT_SESSION)]
    pub session: String,
}

#[derive(Subcommand, Debug)]
pub enum KnowledgeCommand {
    /// Add a document
    Add {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
        /// Where the document came from
        #[arg(long, default_value = "user_input")]
        source: String,
    },
    /// Search the knowledge base
    Search {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
        /// Number of results to return
        #[arg(short, default_value_t = 3)]
        k: usize,
    },
    /// Show knowledge base statistics
    Stats,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration (API keys masked)
    Show,
    /// Print the configuration file location
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
