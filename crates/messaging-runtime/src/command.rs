//! Command normalization (spec §4.5 step 7).
//!
//! Tries `(prefix, name, args)` parsing on the raw body, then again on the
//! body with a leading mention stripped; the first `ok` wins. Parsing is
//! bounded by `command_max_text_bytes` — bodies over that length skip
//! parsing entirely and report `none`.
//!
//! A body that opens with a command prefix (`/` or `!`) but fails to parse
//! a valid command name (no prefix at all) reports `error` rather than
//! `none`, distinguishing "tried to issue a command and got it wrong" from
//! "this is not a command".

const COMMAND_PREFIXES: [char; 2] = ['/', '!'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Ok,
    Error,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandSource {
    Body,
    MentionStripped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub prefix: char,
    pub name: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub status: CommandStatus,
    pub source: Option<CommandSource>,
    pub command: Option<ParsedCommand>,
}

impl CommandResult {
    fn none() -> Self {
        Self {
            status: CommandStatus::None,
            source: None,
            command: None,
        }
    }

    fn error(source: CommandSource) -> Self {
        Self {
            status: CommandStatus::Error,
            source: Some(source),
            command: None,
        }
    }
}

/// Pattern behind the regex a host compiles once at startup and threads
/// into every `IngestPipeline` (mirrors the teacher's
/// `denied_command_set`/`approval_command_set`, compiled once in
/// `bootstrap.rs` and carried on `AppState`).
pub const COMMAND_PATTERN: &str = r"^([/!])([a-zA-Z][\w-]*)\s*(.*)$";

pub fn compile_command_regex() -> regex::Regex {
    regex::Regex::new(COMMAND_PATTERN).expect("static command regex")
}

fn has_command_prefix(text: &str) -> bool {
    text.trim().starts_with(|c: char| COMMAND_PREFIXES.contains(&c))
}

fn try_parse_one(text: &str, command_re: &regex::Regex) -> Option<ParsedCommand> {
    let caps = command_re.captures(text.trim())?;
    let prefix = caps.get(1)?.as_str().chars().next()?;
    let name = caps.get(2)?.as_str().to_string();
    let args_str = caps.get(3).map(|m| m.as_str()).unwrap_or("");
    let args = if args_str.trim().is_empty() {
        Vec::new()
    } else {
        args_str.split_whitespace().map(str::to_string).collect()
    };
    Some(ParsedCommand { prefix, name, args })
}

/// Strip a single leading `@mention` token (and following whitespace) used
/// as the "mention_stripped" parse source.
fn strip_leading_mention(text: &str) -> Option<String> {
    let trimmed = text.trim_start();
    if !trimmed.starts_with('@') {
        return None;
    }
    let rest = trimmed.trim_start_matches(|c: char| c != ' ' && c != '\n');
    Some(rest.trim_start().to_string())
}

/// Parse a command out of `body`, bounded by `max_bytes` (spec §8
/// boundary behavior: exactly `max_bytes` attempts parsing, `max_bytes+1`
/// skips with `none`). `command_re` is compiled once by the host
/// (`IngestPipeline::command_regex`) rather than on every call.
pub fn parse_command(body: &str, max_bytes: usize, command_re: &regex::Regex) -> CommandResult {
    if body.len() > max_bytes {
        return CommandResult::none();
    }

    if let Some(command) = try_parse_one(body, command_re) {
        return CommandResult {
            status: CommandStatus::Ok,
            source: Some(CommandSource::Body),
            command: Some(command),
        };
    }
    let body_has_prefix = has_command_prefix(body);

    if let Some(stripped) = strip_leading_mention(body) {
        if let Some(command) = try_parse_one(&stripped, command_re) {
            return CommandResult {
                status: CommandStatus::Ok,
                source: Some(CommandSource::MentionStripped),
                command: Some(command),
            };
        }
        if body_has_prefix {
            return CommandResult::error(CommandSource::Body);
        }
        if has_command_prefix(&stripped) {
            return CommandResult::error(CommandSource::MentionStripped);
        }
        return CommandResult::none();
    }

    if body_has_prefix {
        return CommandResult::error(CommandSource::Body);
    }

    CommandResult::none()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn re() -> regex::Regex {
        compile_command_regex()
    }

    #[test]
    fn parses_simple_command() {
        let result = parse_command("/echo hello world", 2048, &re());
        assert_eq!(result.status, CommandStatus::Ok);
        assert_eq!(result.source, Some(CommandSource::Body));
        let cmd = result.command.unwrap();
        assert_eq!(cmd.name, "echo");
        assert_eq!(cmd.args, vec!["hello", "world"]);
    }

    #[test]
    fn parses_after_stripping_mention() {
        let result = parse_command("@bot /echo hi", 2048, &re());
        assert_eq!(result.status, CommandStatus::Ok);
        assert_eq!(result.source, Some(CommandSource::MentionStripped));
    }

    #[test]
    fn plain_text_has_no_command() {
        let result = parse_command("just chatting", 2048, &re());
        assert_eq!(result.status, CommandStatus::None);
    }

    #[test]
    fn prefix_with_no_valid_name_is_error_not_none() {
        let result = parse_command("/ hello", 2048, &re());
        assert_eq!(result.status, CommandStatus::Error);
        assert_eq!(result.source, Some(CommandSource::Body));
        assert!(result.command.is_none());
    }

    #[test]
    fn bare_prefix_is_error() {
        let result = parse_command("!", 2048, &re());
        assert_eq!(result.status, CommandStatus::Error);
    }

    #[test]
    fn malformed_command_after_mention_strip_is_error() {
        let result = parse_command("@bot !!broken", 2048, &re());
        assert_eq!(result.status, CommandStatus::Error);
        assert_eq!(result.source, Some(CommandSource::MentionStripped));
    }

    #[test]
    fn body_over_max_bytes_skips_parsing() {
        let body = "/echo ".to_string() + &"x".repeat(2048);
        assert!(body.len() > 2048);
        let result = parse_command(&body, 2048, &re());
        assert_eq!(result.status, CommandStatus::None);
    }

    #[test]
    fn body_at_exactly_max_bytes_is_attempted() {
        let mut body = "/e ".to_string();
        while body.len() < 2048 {
            body.push('x');
        }
        assert_eq!(body.len(), 2048);
        let result = parse_command(&body, 2048, &re());
        assert_eq!(result.status, CommandStatus::Ok);
    }
}
