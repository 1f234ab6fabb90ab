use thiserror::Error;

use crate::timer::CaptureInput;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Start or resume.
    Start,
    Pause,
    Reset,
    Save(CaptureInput),
    Skip,
    Sos(String),
    Status,
    History,
    Report,
    WhoAmI,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command `{0}`, type `help` for the list")]
    Unknown(String),
}

pub const HELP: &str = "\
commands:
  start | resume              start or resume the plan
  pause                       pause the countdown
  reset                       back to the first phase (new session on next start)
  save <hr> [sys/dia] [note]  save vital signs for the finished phase
  skip                        continue without saving vital signs
  sos <text>                  report a symptom
  status                      show the current phase
  history                     your recent sessions
  report                      weekly report (administrators)
  whoami                      signed-in user and this week's completed days
  quit                        leave";

/// Blank lines parse to `None`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, ParseError> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    let command = match head.to_lowercase().as_str() {
        "" => return Ok(None),
        "start" | "resume" | "s" => ConsoleCommand::Start,
        "pause" | "p" => ConsoleCommand::Pause,
        "reset" => ConsoleCommand::Reset,
        "save" => ConsoleCommand::Save(parse_capture(rest)),
        "skip" => ConsoleCommand::Skip,
        // Empty text is still handed to the controller, which rejects it.
        "sos" => ConsoleCommand::Sos(rest.to_string()),
        "status" | "st" => ConsoleCommand::Status,
        "history" => ConsoleCommand::History,
        "report" => ConsoleCommand::Report,
        "whoami" => ConsoleCommand::WhoAmI,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" | "q" => ConsoleCommand::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

/// `<hr> [sys/dia] [comment...]`. Values are kept as typed; the capture
/// validation decides what is acceptable.
fn parse_capture(args: &str) -> CaptureInput {
    let mut words = args.split_whitespace().peekable();
    let mut input = CaptureInput::heart_rate(words.next().unwrap_or_default());

    if let Some((systolic, diastolic)) = words
        .next_if(|word| word.contains('/'))
        .and_then(|pressure| pressure.split_once('/'))
    {
        input = input.with_pressure(systolic, diastolic);
    }

    let comment: Vec<&str> = words.collect();
    if !comment.is_empty() {
        input = input.with_comment(comment.join(" "));
    }
    input
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> ConsoleCommand {
        parse_command(line).unwrap().unwrap()
    }

    #[test]
    fn simple_commands_and_aliases() {
        assert_eq!(parse("start"), ConsoleCommand::Start);
        assert_eq!(parse("  Resume "), ConsoleCommand::Start);
        assert_eq!(parse("p"), ConsoleCommand::Pause);
        assert_eq!(parse("quit"), ConsoleCommand::Quit);
        assert_eq!(parse_command("   ").unwrap(), None);
        assert_eq!(
            parse_command("jump").unwrap_err(),
            ParseError::Unknown("jump".into())
        );
    }

    #[test]
    fn save_with_pressure_and_comment() {
        assert_eq!(
            parse("save 92 130/85 me noto bien"),
            ConsoleCommand::Save(
                CaptureInput::heart_rate("92")
                    .with_pressure("130", "85")
                    .with_comment("me noto bien")
            )
        );
    }

    #[test]
    fn save_heart_rate_only() {
        assert_eq!(parse("save 88"), ConsoleCommand::Save(CaptureInput::heart_rate("88")));
        assert_eq!(
            parse("save 88 cansado"),
            ConsoleCommand::Save(CaptureInput::heart_rate("88").with_comment("cansado"))
        );
    }

    #[test]
    fn save_without_values_is_left_to_validation() {
        assert_eq!(parse("save"), ConsoleCommand::Save(CaptureInput::heart_rate("")));
    }

    #[test]
    fn partial_pressure_is_passed_through() {
        assert_eq!(
            parse("save 88 130/"),
            ConsoleCommand::Save(CaptureInput::heart_rate("88").with_pressure("130", ""))
        );
    }

    #[test]
    fn sos_keeps_the_whole_text() {
        assert_eq!(
            parse("sos dolor en el pecho"),
            ConsoleCommand::Sos("dolor en el pecho".into())
        );
        assert_eq!(parse("sos"), ConsoleCommand::Sos(String::new()));
    }
}
