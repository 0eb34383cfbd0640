//! Terminal input parsing

use std::path::PathBuf;

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send text to the companion
    Say(String),
    /// Silence current speech
    Stop,
    /// Turn voice output on or off
    Voice(bool),
    /// Transcribe an audio file and send the result
    Transcribe(PathBuf),
    Help,
    Quit,
    /// Blank line
    Empty,
    /// Unknown or malformed slash command
    Invalid(String),
}

pub const HELP: &str = "\
Commands:
  /stop               silence the current reply
  /voice on|off       toggle spoken replies
  /transcribe <file>  send a recorded audio file as your message
  /help               show this help
  /quit               exit
Anything else is sent as a message.";

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }

        let Some(rest) = line.strip_prefix('/') else {
            return Command::Say(line.to_string());
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        match (name.to_ascii_lowercase().as_str(), arg) {
            ("stop", "") => Command::Stop,
            ("voice", "on") => Command::Voice(true),
            ("voice", "off") => Command::Voice(false),
            ("transcribe", path) if !path.is_empty() => Command::Transcribe(PathBuf::from(path)),
            ("help", _) => Command::Help,
            ("quit", _) | ("exit", _) => Command::Quit,
            _ => Command::Invalid(line.to_string()),
        }
    }
}
