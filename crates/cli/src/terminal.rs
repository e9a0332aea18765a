//! Interactive operator on a terminal.

use std::io::{self, BufRead, Write};

use freightdesk_reconcile::Operator;

/// Prompts on `output` and reads answers line by line from `input`.
///
/// End of input or a read error counts as "no" / no answer.
pub struct TerminalOperator<R, W> {
    input: R,
    output: W,
}

impl TerminalOperator<io::StdinLock<'static>, io::Stderr> {
    /// Prompt on stderr, read from stdin.
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> TerminalOperator<R, W> {
    pub const fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_answer(&mut self) -> Option<String> {
        let _ = self.output.flush();
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_owned()),
        }
    }
}

impl<R: BufRead, W: Write> Operator for TerminalOperator<R, W> {
    fn confirm(&mut self, question: &str) -> bool {
        let _ = write!(self.output, "{question} [y/N] ");
        self.read_answer()
            .is_some_and(|a| a.eq_ignore_ascii_case("y") || a.eq_ignore_ascii_case("yes"))
    }

    fn ask(&mut self, question: &str) -> String {
        let _ = write!(self.output, "{question}\n> ");
        self.read_answer().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_confirm_accepts_only_yes() {
        let input = Cursor::new("y\nYES\nno\n\n");
        let mut operator = TerminalOperator::new(input, Vec::new());

        assert!(operator.confirm("a?"));
        assert!(operator.confirm("b?"));
        assert!(!operator.confirm("c?"));
        assert!(!operator.confirm("d?"));
        assert!(!operator.confirm("end of input?"));
    }

    #[test]
    fn test_ask_trims_and_prompts() {
        let mut output = Vec::new();
        let mut operator = TerminalOperator::new(Cursor::new(" 2 \n"), &mut output);

        assert_eq!(operator.ask("Pick one"), "2");
        assert_eq!(operator.ask("Again"), "");
        drop(operator);

        let shown = String::from_utf8_lossy(&output);
        assert!(shown.starts_with("Pick one\n> "));
    }
}
