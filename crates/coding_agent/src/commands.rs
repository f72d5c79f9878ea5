#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    New,
    Quit,
    Unknown(String),
}

pub const HELP_TEXT: &str = "Commands: /new (start a fresh conversation), /help, /quit. \
Prefix a prompt with `$ ` to have the mock provider run it as a shell command.";

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let command = trimmed
        .split_whitespace()
        .next()
        .unwrap_or(trimmed)
        .to_string();

    let parsed = match command.as_str() {
        "/help" => SlashCommand::Help,
        "/new" => SlashCommand::New,
        "/quit" | "/exit" => SlashCommand::Quit,
        _ => SlashCommand::Unknown(command),
    };

    Some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_prompts_are_not_commands() {
        assert_eq!(parse_slash_command("list files"), None);
    }

    #[test]
    fn known_commands_parse_with_trailing_arguments() {
        assert_eq!(parse_slash_command("  /new please"), Some(SlashCommand::New));
        assert_eq!(parse_slash_command("/exit"), Some(SlashCommand::Quit));
        assert_eq!(
            parse_slash_command("/model gpt-5"),
            Some(SlashCommand::Unknown("/model".to_string()))
        );
    }
}
