//! Line commands read from stdin.

use zeroize::Zeroizing;

/// A parsed control command.
#[derive(Debug, PartialEq)]
pub enum Command {
    /// Install and persist a connection string.
    Set(Zeroizing<String>),
    /// Erase the stored connection string and disconnect.
    Clear,
    Connect,
    Disconnect,
    Hub,
    Device,
    Status,
    Help,
    Quit,
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command {0:?} (try `help`)")]
    Unknown(String),

    #[error("usage: set <connection string>")]
    MissingConnectionString,

    #[error("`{0}` takes no arguments")]
    UnexpectedArgument(&'static str),
}

pub const HELP: &str = "\
commands:
  set <connection string>  install and persist credentials, then connect
  clear                    erase credentials and disconnect
  connect                  reconnect with the current credentials
  disconnect               disconnect from the hub
  hub | device | status    show the current identity or status
  quit                     stop the service";

/// Parses one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let bare = |name: &'static str, command: Command| {
        if rest.is_empty() {
            Ok(Some(command))
        } else {
            Err(CommandError::UnexpectedArgument(name))
        }
    };

    match verb.to_ascii_lowercase().as_str() {
        "set" if rest.is_empty() => Err(CommandError::MissingConnectionString),
        "set" => Ok(Some(Command::Set(Zeroizing::new(rest.to_string())))),
        "clear" => bare("clear", Command::Clear),
        "connect" => bare("connect", Command::Connect),
        "disconnect" => bare("disconnect", Command::Disconnect),
        "hub" => bare("hub", Command::Hub),
        "device" => bare("device", Command::Device),
        "status" => bare("status", Command::Status),
        "help" | "?" => bare("help", Command::Help),
        "quit" | "exit" => bare("quit", Command::Quit),
        _ => Err(CommandError::Unknown(verb.to_string())),
    }
}
