//! CLI command-name contract for logging and routing.

use crate::cli::parse::{Commands, ConfigCommands};

/// Command name recorded in logs (e.g. "stream", "config.show").
pub fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Stream { .. } => "stream",
        Commands::Answer { .. } => "answer",
        Commands::Serve { .. } => "serve",
        Commands::Classify { .. } => "classify",
        Commands::Generate { .. } => "generate",
        Commands::Modify { .. } => "modify",
        Commands::Latest { .. } => "latest",
        Commands::Health { .. } => "health",
        Commands::Categories { .. } => "categories",
        Commands::Questionnaire { .. } => "questionnaire",
        Commands::Events { .. } => "events",
        Commands::Chat { .. } => "chat",
        Commands::Config { command } => match command {
            ConfigCommands::Show => "config.show",
        },
    }
}

/// Commands whose stdout carries protocol frames and nothing else.
pub fn writes_frames(command: &Commands) -> bool {
    matches!(
        command,
        Commands::Stream { .. } | Commands::Answer { .. } | Commands::Serve { .. }
    )
}
