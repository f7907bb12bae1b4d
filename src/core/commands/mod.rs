// src/core/commands/mod.rs

//! Defines the supported command set and the central `Command` enum that
//! encapsulates a command's parsed state.
//!
//! Parsing is the only place arity is enforced: a `Command` value that exists
//! is always well-formed, so the router never re-checks argument counts.

use crate::core::RespGateError;
use crate::core::protocol::RespFrame;
use bytes::Bytes;
use std::str::FromStr;
use strum_macros::{EnumString, IntoStaticStr};

pub mod helpers;

use helpers::{expect_at_least, expect_exact, frame_to_args};

/// The names this gateway recognizes. Lookup is ASCII-case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CommandName {
    Ping,
    Quit,
    Set,
    Get,
    Del,
    Publish,
    Subscribe,
    Psubscribe,
    Unsubscribe,
    Punsubscribe,
}

/// How many elements (including the name) a command accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, len: usize) -> bool {
        match self {
            Arity::Exact(n) => len == n,
            Arity::AtLeast(n) => len >= n,
        }
    }
}

impl CommandName {
    pub fn arity(self) -> Arity {
        match self {
            CommandName::Ping | CommandName::Quit => Arity::Exact(1),
            CommandName::Get | CommandName::Del => Arity::Exact(2),
            CommandName::Set | CommandName::Publish => Arity::Exact(3),
            CommandName::Subscribe | CommandName::Psubscribe => Arity::AtLeast(2),
            CommandName::Unsubscribe | CommandName::Punsubscribe => Arity::AtLeast(1),
        }
    }

    /// Commands a connection may still issue while it holds subscriptions.
    pub fn allowed_in_subscriber_mode(self) -> bool {
        matches!(
            self,
            CommandName::Subscribe
                | CommandName::Psubscribe
                | CommandName::Unsubscribe
                | CommandName::Punsubscribe
                | CommandName::Ping
                | CommandName::Quit
        )
    }
}

/// A fully parsed client command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping,
    Quit,
    Set { key: Bytes, value: Bytes },
    Get { key: Bytes },
    Del { key: Bytes },
    Publish { channel: Bytes, message: Bytes },
    Subscribe { channels: Vec<Bytes> },
    PSubscribe { patterns: Vec<Bytes> },
    Unsubscribe { channels: Vec<Bytes> },
    PUnsubscribe { patterns: Vec<Bytes> },
}

impl Command {
    /// Parses an ordered argument list whose first element is the command name.
    pub fn from_args(mut args: Vec<Bytes>) -> Result<Self, RespGateError> {
        if args.is_empty() {
            return Err(RespGateError::EmptyCommand);
        }

        let raw_name = String::from_utf8_lossy(&args[0]).into_owned();
        let name = CommandName::from_str(&raw_name)
            .map_err(|_| RespGateError::UnknownCommand(raw_name.clone()))?;

        if !name.arity().accepts(args.len()) {
            return Err(RespGateError::WrongArgumentCount(raw_name));
        }

        let rest = args.split_off(1);
        let command = match name {
            CommandName::Ping => Command::Ping,
            CommandName::Quit => Command::Quit,
            CommandName::Set => {
                let [key, value] = expect_exact::<2>(rest, &raw_name)?;
                Command::Set { key, value }
            }
            CommandName::Get => {
                let [key] = expect_exact::<1>(rest, &raw_name)?;
                Command::Get { key }
            }
            CommandName::Del => {
                let [key] = expect_exact::<1>(rest, &raw_name)?;
                Command::Del { key }
            }
            CommandName::Publish => {
                let [channel, message] = expect_exact::<2>(rest, &raw_name)?;
                Command::Publish { channel, message }
            }
            CommandName::Subscribe => Command::Subscribe {
                channels: expect_at_least(rest, 1, &raw_name)?,
            },
            CommandName::Psubscribe => Command::PSubscribe {
                patterns: expect_at_least(rest, 1, &raw_name)?,
            },
            CommandName::Unsubscribe => Command::Unsubscribe { channels: rest },
            CommandName::Punsubscribe => Command::PUnsubscribe { patterns: rest },
        };
        Ok(command)
    }

    pub fn command_name(&self) -> CommandName {
        match self {
            Command::Ping => CommandName::Ping,
            Command::Quit => CommandName::Quit,
            Command::Set { .. } => CommandName::Set,
            Command::Get { .. } => CommandName::Get,
            Command::Del { .. } => CommandName::Del,
            Command::Publish { .. } => CommandName::Publish,
            Command::Subscribe { .. } => CommandName::Subscribe,
            Command::PSubscribe { .. } => CommandName::Psubscribe,
            Command::Unsubscribe { .. } => CommandName::Unsubscribe,
            Command::PUnsubscribe { .. } => CommandName::Punsubscribe,
        }
    }

    /// The canonical lowercase name, used for logging and metrics labels.
    pub fn name(&self) -> &'static str {
        self.command_name().into()
    }
}

impl TryFrom<RespFrame> for Command {
    type Error = RespGateError;

    fn try_from(frame: RespFrame) -> Result<Self, Self::Error> {
        Command::from_args(frame_to_args(frame)?)
    }
}
