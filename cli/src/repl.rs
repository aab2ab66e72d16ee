//! Line parsing for the interactive `chat` command.

#[cfg(test)]
#[path = "repl_test.rs"]
mod repl_test;

use frames::FeedbackRating;

#[derive(Debug, PartialEq, Eq)]
pub enum ReplCommand<'a> {
    Prompt(&'a str),
    Rate { rating: FeedbackRating, reason: Option<&'a str> },
    Role(&'a str),
    History,
    Quit,
    Help,
    Empty,
    Unknown(&'a str),
}

pub const HELP: &str = "\
commands:
  /up               rate the last answer helpful
  /down [reason]    rate the last answer unhelpful
  /role NAME        switch assistant role
  /history          print the conversation
  /quit             exit";

#[must_use]
pub fn parse_line(line: &str) -> ReplCommand<'_> {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ReplCommand::Prompt(line);
    };

    let (name, rest) = command.split_once(char::is_whitespace).unwrap_or((command, ""));
    let rest = rest.trim();
    let arg = (!rest.is_empty()).then_some(rest);

    match name {
        "up" => ReplCommand::Rate { rating: FeedbackRating::ThumbsUp, reason: arg },
        "down" => ReplCommand::Rate { rating: FeedbackRating::ThumbsDown, reason: arg },
        "role" => arg.map_or(ReplCommand::Unknown(line), ReplCommand::Role),
        "history" => ReplCommand::History,
        "quit" | "exit" => ReplCommand::Quit,
        "help" => ReplCommand::Help,
        _ => ReplCommand::Unknown(line),
    }
}
