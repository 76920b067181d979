//! Transport commands typed on stdin

use std::fmt;

/// One line of user input
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play(Option<f64>),
    Pause,
    Resume,
    Stop,
    Seek(f64),
    Mute(String),
    Unmute(String),
    Gain(f32),
    Status,
    Help,
    Quit,
}

/// Input that could not be turned into a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseError {}

fn seconds(arg: Option<&str>, command: &str) -> Result<f64, ParseError> {
    let arg = arg.ok_or_else(|| ParseError(format!("'{}' needs a time in seconds", command)))?;
    arg.parse::<f64>()
        .ok()
        .filter(|t| t.is_finite())
        .ok_or_else(|| ParseError(format!("'{}' is not a time in seconds", arg)))
}

fn stem(arg: Option<&str>, command: &str) -> Result<String, ParseError> {
    arg.map(str::to_string)
        .ok_or_else(|| ParseError(format!("'{}' needs a stem name", command)))
}

impl Command {
    /// Parse a line; `Ok(None)` for blank input
    pub fn parse(line: &str) -> Result<Option<Self>, ParseError> {
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            return Ok(None);
        };
        let arg = words.next();

        let command = match word.to_ascii_lowercase().as_str() {
            "play" | "p" => match arg {
                Some(_) => Command::Play(Some(seconds(arg, word)?)),
                None => Command::Play(None),
            },
            "pause" => Command::Pause,
            "resume" | "r" => Command::Resume,
            "stop" | "s" => Command::Stop,
            "seek" => Command::Seek(seconds(arg, word)?),
            "mute" | "m" => Command::Mute(stem(arg, word)?),
            "unmute" | "u" => Command::Unmute(stem(arg, word)?),
            "gain" => {
                let level = seconds(arg, word)? as f32;
                Command::Gain(level)
            }
            "status" | "." => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "q" | "exit" => Command::Quit,
            other => return Err(ParseError(format!("Unknown command '{}' (try 'help')", other))),
        };

        Ok(Some(command))
    }
}

pub const HELP: &str = "\
Commands:
  play [t]      start playing (from t seconds)
  pause         pause at the current position
  resume        continue after pause
  stop          stop and rewind
  seek t        jump to t seconds
  mute NAME     silence one stem
  unmute NAME   bring a stem back
  gain x        master level (0.0 - 2.0)
  status        print position
  quit          exit";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transport() {
        assert_eq!(Command::parse("play").unwrap(), Some(Command::Play(None)));
        assert_eq!(Command::parse("  PLAY 12.5 ").unwrap(), Some(Command::Play(Some(12.5))));
        assert_eq!(Command::parse("seek 3").unwrap(), Some(Command::Seek(3.0)));
        assert_eq!(Command::parse("q").unwrap(), Some(Command::Quit));
        assert_eq!(Command::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_stems_and_gain() {
        assert_eq!(Command::parse("mute vocal").unwrap(), Some(Command::Mute("vocal".into())));
        assert_eq!(Command::parse("u drums").unwrap(), Some(Command::Unmute("drums".into())));
        assert_eq!(Command::parse("gain 0.5").unwrap(), Some(Command::Gain(0.5)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Command::parse("seek").is_err());
        assert!(Command::parse("seek soon").is_err());
        assert!(Command::parse("seek NaN").is_err());
        assert!(Command::parse("mute").is_err());
        assert!(Command::parse("rewind").is_err());
    }
}
