//! Operator confirmation.
//!
//! Every prompt that can change tracked state goes through a [`Confirmer`],
//! so runs can be driven without a terminal in tests.

use std::io::{self, BufRead, Write};

/// Asks the operator before acting.
pub trait Confirmer: Send + Sync {
    /// Asks a yes/no question. Only `y` or `yes` counts as approval.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt cannot be written or read.
    fn confirm(&self, prompt: &str) -> io::Result<bool>;

    /// Asks the operator to type `expected` exactly.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt cannot be written or read.
    fn confirm_typed(&self, prompt: &str, expected: &str) -> io::Result<bool>;
}

/// Prompts on stderr and reads answers from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirmer;

impl TerminalConfirmer {
    /// Creates a terminal confirmer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn ask(prompt: &str) -> io::Result<String> {
        let mut stderr = io::stderr();
        write!(stderr, "{prompt}")?;
        stderr.flush()?;

        let mut input = String::new();
        io::stdin().lock().read_line(&mut input)?;
        Ok(input)
    }
}

impl Confirmer for TerminalConfirmer {
    fn confirm(&self, prompt: &str) -> io::Result<bool> {
        let answer = Self::ask(&format!("{prompt} [y/N]: "))?;
        Ok(is_yes(&answer))
    }

    fn confirm_typed(&self, prompt: &str, expected: &str) -> io::Result<bool> {
        let answer = Self::ask(&format!("{prompt}\nType '{expected}' to confirm: "))?;
        Ok(answer.trim() == expected)
    }
}

fn is_yes(answer: &str) -> bool {
    let answer = answer.trim();
    answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Confirmer;
    use std::io;
    use std::sync::Mutex;

    /// Answers prompts from a fixed script and records what was asked.
    #[derive(Debug, Default)]
    pub struct ScriptedConfirmer {
        answers: Mutex<Vec<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedConfirmer {
        pub fn with_answers(answers: &[&str]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().rev().map(|a| (*a).to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }

        fn next(&self, prompt: &str) -> String {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.answers.lock().unwrap().pop().unwrap_or_default()
        }
    }

    impl Confirmer for ScriptedConfirmer {
        fn confirm(&self, prompt: &str) -> io::Result<bool> {
            Ok(super::is_yes(&self.next(prompt)))
        }

        fn confirm_typed(&self, prompt: &str, expected: &str) -> io::Result<bool> {
            Ok(self.next(prompt).trim() == expected)
        }
    }
}
