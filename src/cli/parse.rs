//! CLI parse: clap types for kiln. No behavior; definitions only.

use crate::provider::ModelFamily;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Kiln CLI - streaming orchestration of model-generated projects
#[derive(Parser)]
#[command(name = "kiln")]
#[command(version)]
#[command(about = "Streaming orchestration of model-generated project artifacts")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, global = true, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, global = true, default_value = "false")]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, global = true, default_value = "false", conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, both)
    #[arg(long, global = true)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

/// Wire format of event frames on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FrameFormat {
    /// `data: <json>` followed by a blank line
    Sse,
    /// One JSON object per line
    Jsonl,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one streaming request and print its event frames
    Stream {
        /// Full request as JSON, from a file or `-` for stdin
        #[arg(long, conflicts_with_all = ["input", "page_type", "instruction"])]
        request: Option<PathBuf>,
        /// Free-text user input
        #[arg(long)]
        input: Option<String>,
        /// Session id to continue
        #[arg(long)]
        session: Option<String>,
        /// Model family (gemini, gpt, claude)
        #[arg(long)]
        family: Option<ModelFamily>,
        /// Page type key; implies generation
        #[arg(long)]
        page_type: Option<String>,
        /// Modification instruction; implies modification
        #[arg(long)]
        instruction: Option<String>,
        /// Base artifact for a modification (manifest or directory)
        #[arg(long)]
        base: Option<String>,
        #[arg(long)]
        project_id: Option<String>,
        /// Force the chat flow for the input
        #[arg(long)]
        chat: bool,
        #[arg(long, value_enum, default_value = "sse")]
        format: FrameFormat,
    },
    /// Answer pending questions and resume the conversation
    Answer {
        /// Answer request as JSON, from a file or `-` for stdin
        #[arg(long)]
        request: PathBuf,
        #[arg(long, value_enum, default_value = "sse")]
        format: FrameFormat,
    },
    /// Serve JSON-lines requests from stdin until EOF
    Serve {
        #[arg(long, value_enum, default_value = "jsonl")]
        format: FrameFormat,
    },
    /// Classify the intent of a message
    Classify {
        text: String,
        #[arg(long)]
        family: Option<ModelFamily>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Generate a project without streaming
    Generate {
        #[arg(long)]
        page_type: Option<String>,
        /// Questionnaire answers as a JSON object file
        #[arg(long)]
        answers: Option<PathBuf>,
        #[arg(long)]
        hero_text: Option<String>,
        #[arg(long)]
        subtext: Option<String>,
        #[arg(long)]
        cta: Option<String>,
        #[arg(long)]
        theme: Option<String>,
        #[arg(long)]
        session: Option<String>,
        #[arg(long)]
        family: Option<ModelFamily>,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Modify the latest (or given) project without streaming
    Modify {
        instruction: String,
        #[arg(long)]
        base: Option<String>,
        #[arg(long)]
        session: Option<String>,
        #[arg(long)]
        family: Option<ModelFamily>,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show the latest persisted project
    Latest {
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Report engine health and configured providers
    Health {
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List content categories
    Categories {
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show the questionnaire of a page type
    Questionnaire {
        key: String,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show events recorded in the workspace event log
    Events {
        /// Event name (`chat.question`) or family (`progress`)
        #[arg(long = "type")]
        event_type: Option<String>,
        /// Only events of this session
        #[arg(long)]
        session: Option<String>,
        /// Keep the newest N matches
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Interactive conversation with prompts for questions
    Chat {
        #[arg(long)]
        family: Option<ModelFamily>,
        #[arg(long)]
        project_id: Option<String>,
    },
    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
}
