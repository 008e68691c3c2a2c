//! CLI domain: parse, route, help, output, and presentation.
//! Single route table dispatches to the engine; streaming commands write frames to stdout.

mod help;
mod interactive;
mod output;
mod parse;
mod presentation;
mod route;
mod serve;

pub use help::{command_name, writes_frames};
pub use output::{exit_code, map_error};
pub use parse::{Cli, Commands, ConfigCommands, FrameFormat};
pub use presentation::{render_event, write_frame};
pub use route::RunContext;
pub use serve::{dispatch, serve, ServeOp};
