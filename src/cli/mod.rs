//! Command-line front end: a text console for the voice desk.

use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;

use crate::provider::ProviderKind;
use crate::room::RoomId;

/// Join a trading-desk room and talk to the AI squad.
#[derive(Parser, Debug)]
#[command(name = "deskvoice", version, about = "Realtime voice console for the trading desk")]
pub struct Cli {
    /// Realtime provider (gemini, openai)
    #[arg(short, long, default_value = "gemini")]
    pub provider: ProviderKind,

    /// Room to join on startup (desk, autopilot, journal)
    #[arg(short, long, default_value = "desk")]
    pub room: RoomId,

    /// TOML config file; defaults to the platform config directory
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Desk backend base URL, overriding config
    #[arg(long)]
    pub backend_url: Option<String>,

    /// Turn the microphone on after joining
    #[arg(long)]
    pub mic: bool,
}

/// One line typed at the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Say(String),
    Room(RoomId),
    Provider(ProviderKind),
    Mic,
    Leave,
    Help,
    Quit,
}

pub const HELP: &str = "\
/room <desk|autopilot|journal>  switch rooms
/provider <gemini|openai>       provider for the next join
/mic                            toggle the microphone
/leave                          leave the current room
/quit                           exit
anything else                   send as a text turn";

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let Some(command) = line.strip_prefix('/') else {
            if line.is_empty() {
                return Err("nothing to send".into());
            }
            return Ok(ConsoleCommand::Say(line.to_string()));
        };

        let mut parts = command.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let argument = parts.next();
        match (name, argument) {
            ("room", Some(room)) => RoomId::from_str(room)
                .map(ConsoleCommand::Room)
                .map_err(|_| format!("unknown room '{room}'")),
            ("room", None) => Err("usage: /room <desk|autopilot|journal>".into()),
            ("provider", Some(provider)) => ProviderKind::from_str(provider)
                .map(ConsoleCommand::Provider)
                .map_err(|_| format!("unknown provider '{provider}'")),
            ("provider", None) => Err("usage: /provider <gemini|openai>".into()),
            ("mic", _) => Ok(ConsoleCommand::Mic),
            ("leave", _) => Ok(ConsoleCommand::Leave),
            ("help", _) => Ok(ConsoleCommand::Help),
            ("quit" | "exit", _) => Ok(ConsoleCommand::Quit),
            (other, _) => Err(format!("unknown command '/{other}'")),
        }
    }
}
