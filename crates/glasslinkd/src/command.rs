//! Line commands accepted on stdin.

use std::str::FromStr;

use glasslink_core::payload::{self, PayloadError};
use glasslink_core::{Arm, UnknownArm};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// One batch on one arm, one packet per hex word.
    Send { arm: Arm, packets: Vec<Vec<u8>> },
    /// The same packets on both arms.
    Both { packets: Vec<Vec<u8>> },
    Bind { arm: Arm },
    Unbind { arm: Arm, reason: String },
    Fail { arm: Arm, reason: String },
    Inject { arm: Arm, fault: Fault },
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Refuse the next write synchronously.
    Refuse,
    /// Fail the next acknowledgment.
    Fail,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("{0} needs {1}")]
    MissingArgument(&'static str, &'static str),
    #[error(transparent)]
    Arm(#[from] UnknownArm),
    #[error("packet {index}: {source}")]
    Payload { index: usize, source: PayloadError },
    #[error("unknown fault {0:?} (expected refuse or fail)")]
    Fault(String),
}

impl FromStr for Fault {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "refuse" => Ok(Fault::Refuse),
            "fail" => Ok(Fault::Fail),
            other => Err(CommandError::Fault(other.to_string())),
        }
    }
}

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let words: Vec<&str> = line.split_whitespace().collect();

    let command = match words.as_slice() {
        ["send", arm, packets @ ..] if !packets.is_empty() => Command::Send {
            arm: arm.parse()?,
            packets: parse_packets(packets)?,
        },
        ["send", ..] => return Err(CommandError::MissingArgument("send", "an arm and packets")),
        ["both", packets @ ..] if !packets.is_empty() => Command::Both {
            packets: parse_packets(packets)?,
        },
        ["both"] => return Err(CommandError::MissingArgument("both", "packets")),
        ["bind", arm] => Command::Bind { arm: arm.parse()? },
        ["unbind", arm, reason @ ..] => Command::Unbind {
            arm: arm.parse()?,
            reason: reason_or(reason, "unbound by operator"),
        },
        ["fail", arm, reason @ ..] => Command::Fail {
            arm: arm.parse()?,
            reason: reason_or(reason, "failed by operator"),
        },
        ["inject", arm, fault] => Command::Inject {
            arm: arm.parse()?,
            fault: fault.parse()?,
        },
        ["bind" | "unbind" | "fail", ..] => {
            return Err(CommandError::MissingArgument("this command", "an arm"))
        }
        ["inject", ..] => return Err(CommandError::MissingArgument("inject", "an arm and a fault")),
        ["status"] => Command::Status,
        ["help"] | ["?"] => Command::Help,
        ["quit"] | ["exit"] => Command::Quit,
        _ => return Err(CommandError::Unknown(line.to_string())),
    };
    Ok(Some(command))
}

fn parse_packets(words: &[&str]) -> Result<Vec<Vec<u8>>, CommandError> {
    words
        .iter()
        .enumerate()
        .map(|(index, word)| {
            payload::from_hex(word).map_err(|source| CommandError::Payload { index, source })
        })
        .collect()
}

fn reason_or(words: &[&str], default: &str) -> String {
    if words.is_empty() {
        default.to_string()
    } else {
        words.join(" ")
    }
}

pub const USAGE: &str = "\
Commands:
  send <left|right> <hex> [<hex>...]   Write one batch, one packet per hex word
  both <hex> [<hex>...]                Write the same batch to both arms
  bind <arm>                           Bind a fresh loopback link
  unbind <arm> [reason...]             Drop the arm's link, failing queued work
  fail <arm> [reason...]               Fail all queued work, keep the link
  inject <arm> refuse|fail             Refuse the next write / fail the next ack
  status                               Print both queues as JSON
  help | ?                             Show this list
  quit | exit                          Exit";
