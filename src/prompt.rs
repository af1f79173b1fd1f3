use console::Term;

/// Yes/no questions asked of the user.
pub trait Confirm: Send + Sync {
    fn confirm(&self, question: &str) -> bool;
}

/// Asks on the terminal; answers "no" when stderr is not a terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl Confirm for TerminalPrompt {
    fn confirm(&self, question: &str) -> bool {
        let term = Term::stderr();
        if !term.is_term() {
            tracing::info!("{} (no terminal, assuming no)", question);
            return false;
        }
        if term.write_str(&format!("{} [y/N] ", question)).is_err() {
            return false;
        }
        match term.read_line() {
            Ok(answer) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }
}

/// Gives the same answer to every question, for `--yes` and tests.
#[derive(Debug, Clone, Copy)]
pub struct AssumeAnswer(pub bool);

impl Confirm for AssumeAnswer {
    fn confirm(&self, question: &str) -> bool {
        tracing::debug!("{} -> {}", question, self.0);
        self.0
    }
}
