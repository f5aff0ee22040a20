//! Prompter seam.
//!
//! Phases never read stdin directly; they go through this trait. The binary
//! installs [`StdinPrompter`]; tests drive phases with [`ScriptedPrompter`].
//! Every method returns `None` when the user cancels (EOF / empty choice),
//! and phases translate that into an aborted result without side effects.

use std::collections::VecDeque;
use std::io::{self, Write};

/// Interactive prompt seam.
pub trait Prompter {
    /// Yes/no question. `None` means the user cancelled.
    fn confirm(&mut self, message: &str) -> Option<bool>;

    /// Pick one of `options`; returns the index. `None` means cancelled.
    fn select(&mut self, title: &str, options: &[String]) -> Option<usize>;

    /// Free-form input. `None` means cancelled.
    fn input(&mut self, prompt: &str) -> Option<String>;
}

/// Prompter reading from stdin, used by the CLI binary.
#[derive(Debug, Default)]
pub struct StdinPrompter;

impl StdinPrompter {
    fn read_line(&self) -> Option<String> {
        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) => None, // EOF
            Ok(_) => Some(line.trim().to_string()),
            Err(_) => None,
        }
    }
}

impl Prompter for StdinPrompter {
    fn confirm(&mut self, message: &str) -> Option<bool> {
        print!("{message} [y/N] ");
        io::stdout().flush().ok()?;
        let answer = self.read_line()?;
        Some(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
    }

    fn select(&mut self, title: &str, options: &[String]) -> Option<usize> {
        println!("{title}");
        for (i, option) in options.iter().enumerate() {
            println!("  {}. {option}", i + 1);
        }
        loop {
            print!("> ");
            io::stdout().flush().ok()?;
            let answer = self.read_line()?;
            if answer.is_empty() {
                return None;
            }
            match answer.parse::<usize>() {
                Ok(n) if (1..=options.len()).contains(&n) => return Some(n - 1),
                _ => println!("1〜{} の番号を入力してください", options.len()),
            }
        }
    }

    fn input(&mut self, prompt: &str) -> Option<String> {
        print!("{prompt}: ");
        io::stdout().flush().ok()?;
        self.read_line()
    }
}

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum ScriptedAnswer {
    Confirm(bool),
    Select(usize),
    Input(String),
    /// Simulate a cancellation at this point.
    Cancel,
}

/// Prompter fed from a fixed script, for tests.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<ScriptedAnswer>,
    /// Prompts seen, for assertions.
    pub transcript: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new(answers: impl IntoIterator<Item = ScriptedAnswer>) -> Self {
        Self { answers: answers.into_iter().collect(), transcript: Vec::new() }
    }

    fn next(&mut self, prompt: &str) -> Option<ScriptedAnswer> {
        self.transcript.push(prompt.to_string());
        self.answers.pop_front()
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&mut self, message: &str) -> Option<bool> {
        match self.next(message)? {
            ScriptedAnswer::Confirm(v) => Some(v),
            ScriptedAnswer::Cancel => None,
            other => panic!("expected Confirm for {message:?}, scripted {other:?}"),
        }
    }

    fn select(&mut self, title: &str, options: &[String]) -> Option<usize> {
        match self.next(title)? {
            ScriptedAnswer::Select(i) => {
                assert!(i < options.len(), "scripted index {i} out of {} options", options.len());
                Some(i)
            }
            ScriptedAnswer::Cancel => None,
            other => panic!("expected Select for {title:?}, scripted {other:?}"),
        }
    }

    fn input(&mut self, prompt: &str) -> Option<String> {
        match self.next(prompt)? {
            ScriptedAnswer::Input(v) => Some(v),
            ScriptedAnswer::Cancel => None,
            other => panic!("expected Input for {prompt:?}, scripted {other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_prompter_replays_answers() {
        let mut prompter = ScriptedPrompter::new([
            ScriptedAnswer::Confirm(true),
            ScriptedAnswer::Select(1),
            ScriptedAnswer::Input("hello".to_string()),
        ]);

        assert_eq!(prompter.confirm("continue?"), Some(true));
        let options = vec!["a".to_string(), "b".to_string()];
        assert_eq!(prompter.select("pick", &options), Some(1));
        assert_eq!(prompter.input("say"), Some("hello".to_string()));
        assert_eq!(prompter.transcript, vec!["continue?", "pick", "say"]);
    }

    #[test]
    fn test_scripted_cancel_and_exhaustion() {
        let mut prompter = ScriptedPrompter::new([ScriptedAnswer::Cancel]);
        assert_eq!(prompter.confirm("sure?"), None);
        // Script exhausted behaves as cancellation.
        assert_eq!(prompter.input("more"), None);
    }
}
