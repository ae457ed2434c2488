//! Line-based keyboard input on stdin.

use crossbeam_channel::{Receiver, Sender};
use std::io::BufRead;
use std::thread;
use tiles_core::Key;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Press(Key),
    Restart,
    Quit,
}

/// Parses one input line. Several keys may be pressed on one line
/// (`1 3 G4`); unknown words are reported back.
pub fn parse_line(line: &str) -> Result<Vec<Command>, String> {
    let mut commands = Vec::new();
    for word in line.split_whitespace() {
        let command = match word.to_ascii_lowercase().as_str() {
            "q" | "quit" | "exit" => Command::Quit,
            "r" | "restart" => Command::Restart,
            _ => word
                .parse::<u8>()
                .ok()
                .and_then(Key::new)
                .or_else(|| Key::from_name(&capitalize(word)))
                .map(Command::Press)
                .ok_or_else(|| format!("unknown key or command '{}'", word))?,
        };
        commands.push(command);
    }
    Ok(commands)
}

/// Note names are typed lowercase as often as not (`g4`, `bb4`).
fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Reads stdin on a background thread. The channel closes at end of input.
pub fn spawn_stdin_reader() -> Receiver<Command> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::spawn(move || read_commands(std::io::stdin().lock(), tx));
    rx
}

fn read_commands(reader: impl BufRead, tx: Sender<Command>) {
    for line in reader.lines() {
        let Ok(line) = line else { break };
        match parse_line(&line) {
            Ok(commands) => {
                for command in commands {
                    if tx.send(command).is_err() {
                        return;
                    }
                }
            }
            Err(msg) => log::warn!("{}", msg),
        }
    }
    log::debug!("stdin closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numbers_names_and_commands() {
        let commands = parse_line("1 g4 Bb4 r q").unwrap();
        assert_eq!(
            commands,
            vec![
                Command::Press(Key::new(1).unwrap()),
                Command::Press(Key::from_name("G4").unwrap()),
                Command::Press(Key::from_name("A#4").unwrap()),
                Command::Restart,
                Command::Quit,
            ]
        );
    }

    #[test]
    fn rejects_unknown_words() {
        assert!(parse_line("16").is_err());
        assert!(parse_line("hello").is_err());
        assert!(parse_line("   ").unwrap().is_empty());
    }

    #[test]
    fn reader_forwards_until_eof() {
        let (tx, rx) = crossbeam_channel::unbounded();
        read_commands("3\nnope\nquit\n".as_bytes(), tx);
        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(received, vec![Command::Press(Key::new(3).unwrap()), Command::Quit]);
    }
}
