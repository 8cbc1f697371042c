//! Interactive escalation: ask the operator for a rate.

use reconcile_core::{Result, RoundIndex, TeamId};
use reconcile_engine::Escalation;
use rust_decimal::Decimal;
use std::io::{self, BufRead, Stderr, StdinLock, Write};

/// Prompts on `output` and reads answers line by line from `input`.
///
/// An empty line or end of input declines. Answers that do not parse or fall
/// outside the bounds are asked again.
pub struct PromptEscalation<R, W> {
    input: R,
    output: W,
}

impl PromptEscalation<StdinLock<'static>, Stderr> {
    pub fn stdin() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> PromptEscalation<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> Escalation for PromptEscalation<R, W> {
    fn resolve(
        &mut self,
        team: &TeamId,
        round: RoundIndex,
        min: Decimal,
        max: Decimal,
    ) -> Result<Option<Decimal>> {
        loop {
            write!(
                self.output,
                "Round {round}, team '{team}' is tied. Rate [{min}..{max}], empty to reject: "
            )?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            let answer = line.trim().replace(',', ".");
            if answer.is_empty() {
                return Ok(None);
            }

            match answer.parse::<Decimal>() {
                Ok(rate) if rate >= min && rate <= max => return Ok(Some(rate)),
                Ok(rate) => writeln!(self.output, "{rate} is outside [{min}..{max}]")?,
                Err(_) => writeln!(self.output, "'{answer}' is not a number")?,
            }
        }
    }
}
