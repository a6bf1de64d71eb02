//! Parses the TCP line protocol into a [`Command`] and renders a
//! [`CommandOutcome`] back into the wire format.
//!
//! Grounded on `original_source/cmd/kv-tcp/main.go`'s `parseCommandLine`
//! (first two spaces split command/param1/param2, the rest of the line is
//! the verbatim value) and on the literal end-to-end scenarios that pin
//! down the exact `\r\n` vs bare `\n` asymmetry between a GET hit and
//! everything else.

use kv_rs::error::{CResult, Error};
use kv_rs::txn::command::CommandOutcome;
use kv_rs::txn::Command;

/// One parsed line. `Get`/`Set`/`Delete`/`Begin`/`Commit`/`Rollback`/`Quit`
/// carry a [`Command`]; `Quit` additionally ends the session.
pub fn parse(line: &str) -> CResult<Command> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (head, rest) = match line.split_once(' ') {
        Some((h, r)) => (h, Some(r)),
        None => (line, None),
    };

    match head.to_ascii_uppercase().as_str() {
        "SET" => {
            let rest = rest.ok_or_else(|| Error::Parse("SET requires a key and a value".into()))?;
            let (key, value) = rest
                .split_once(' ')
                .ok_or_else(|| Error::Parse("SET requires a key and a value".into()))?;
            if key.is_empty() {
                return Err(Error::Parse("SET requires a key and a value".into()));
            }
            Ok(Command::set(key, value))
        }
        "GET" => {
            let rest = rest.ok_or_else(|| Error::Parse("GET requires a key".into()))?;
            let key = rest.split_once(' ').map_or(rest, |(k, _)| k);
            if key.is_empty() {
                return Err(Error::Parse("GET requires a key".into()));
            }
            Ok(Command::get(key))
        }
        "DEL" => {
            let rest = rest.ok_or_else(|| Error::Parse("DEL requires a key".into()))?;
            let key = rest.split_once(' ').map_or(rest, |(k, _)| k);
            if key.is_empty() {
                return Err(Error::Parse("DEL requires a key".into()));
            }
            Ok(Command::delete(key))
        }
        "BEGIN" => Ok(Command::Begin),
        "COMMIT" => Ok(Command::Commit),
        "ROLLBACK" => Ok(Command::Rollback),
        "QUIT" => Ok(Command::Quit),
        other => Err(Error::Parse(format!("unknown command {:?}", other))),
    }
}

/// Renders a successful [`CommandOutcome`] in the wire format.
pub fn render_outcome(outcome: &CommandOutcome) -> String {
    match outcome {
        CommandOutcome::Ok | CommandOutcome::Began(_) | CommandOutcome::Closed => "OK\r\n".to_string(),
        CommandOutcome::Value(value) => format!("{}\n", value),
        CommandOutcome::Miss => "\r\n".to_string(),
    }
}

/// Renders an [`Error`] as the error line the client sees. The connection
/// stays open; only `Internal` terminates it (decided by the caller).
pub fn render_error(err: &Error) -> String {
    format!("{}\r\n", err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_set_with_a_multi_word_value() {
        let cmd = parse("SET x hello world\n").unwrap();
        assert!(matches!(cmd, Command::Set { key, value, .. } if key == "x" && value == "hello world"));
    }

    #[test]
    fn command_is_case_insensitive() {
        let cmd = parse("get a\r\n").unwrap();
        assert!(matches!(cmd, Command::Get { key } if key == "a"));
    }

    #[test]
    fn get_and_del_stop_at_the_second_space() {
        let cmd = parse("GET a b\n").unwrap();
        assert!(matches!(cmd, Command::Get { key } if key == "a"));

        let cmd = parse("DEL a b\n").unwrap();
        assert!(matches!(cmd, Command::Delete { key, .. } if key == "a"));
    }

    #[test]
    fn get_with_a_trailing_space_takes_only_the_key() {
        let cmd = parse("GET a \n").unwrap();
        assert!(matches!(cmd, Command::Get { key } if key == "a"));
    }

    #[test]
    fn unknown_command_is_a_parse_error() {
        let err = parse("FROB a\n").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn set_without_a_value_is_a_parse_error() {
        assert!(parse("SET a\n").is_err());
    }

    #[test]
    fn get_without_a_key_is_a_parse_error() {
        assert!(parse("GET\n").is_err());
    }

    #[test]
    fn control_verbs_take_no_arguments_line() {
        assert!(matches!(parse("BEGIN\n").unwrap(), Command::Begin));
        assert!(matches!(parse("COMMIT\n").unwrap(), Command::Commit));
        assert!(matches!(parse("ROLLBACK\n").unwrap(), Command::Rollback));
        assert!(matches!(parse("QUIT\n").unwrap(), Command::Quit));
    }

    #[test]
    fn renders_a_get_hit_with_a_bare_newline() {
        assert_eq!(render_outcome(&CommandOutcome::Value("1".to_string())), "1\n");
    }

    #[test]
    fn renders_a_get_miss_as_an_empty_crlf_line() {
        assert_eq!(render_outcome(&CommandOutcome::Miss), "\r\n");
    }

    #[test]
    fn renders_ok_outcomes_with_crlf() {
        assert_eq!(render_outcome(&CommandOutcome::Ok), "OK\r\n");
        assert_eq!(render_outcome(&CommandOutcome::Began(1)), "OK\r\n");
    }
}
