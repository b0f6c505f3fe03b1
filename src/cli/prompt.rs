use anyhow::{Context, Result};
use std::io::{BufRead, Write};

use crate::core::{
    clock::Sleeper,
    commands::{Command, CommandContext, PromptOutcome},
    config::Settings,
    reader::{CardConnection, CardReader},
    session::{await_card, CardSession},
    utils::describe_status_word,
};

/// Line prompt driving card sessions over a terminal-like input and output
pub struct Prompt<R, W> {
    input: R,
    output: W,
    sleeper: Box<dyn Sleeper>,
    settings: Settings,
}

impl<R: BufRead, W: Write> Prompt<R, W> {
    pub fn new(input: R, output: W, sleeper: Box<dyn Sleeper>, settings: Settings) -> Self {
        Self {
            input,
            output,
            sleeper,
            settings,
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Wait for a card, run the prompt on it, and start over after each
    /// `disconnect` until `exit`.
    pub fn run_sessions<C: CardReader>(&mut self, reader: &mut C) -> Result<()> {
        loop {
            let mut session = await_card(reader, self.settings.poll_timeout(), &mut self.output)?;

            if self.settings.select_card_type {
                let response = session
                    .select_card_type()
                    .context("Failed to select the card type")?;
                if !response.is_success() {
                    log::warn!(
                        "SELECT CARD TYPE answered {:02X} {:02X} ({})",
                        response.sw1,
                        response.sw2,
                        describe_status_word(response.sw1, response.sw2)
                    );
                }
            }

            match self.run(&mut session)? {
                PromptOutcome::Disconnected => log::info!("Card released, polling again"),
                PromptOutcome::Exiting => return Ok(()),
            }
        }
    }

    /// Read and execute commands until `disconnect` or `exit`.
    ///
    /// Bad `read` arguments are reported and the prompt goes on. End of
    /// input counts as `exit`.
    pub fn run<C: CardConnection>(&mut self, session: &mut CardSession<C>) -> Result<PromptOutcome> {
        loop {
            write!(self.output, "{} >>> ", session.reader_name())?;
            self.output.flush()?;

            // Raw bytes: a line that is not valid UTF-8 is just an unknown command
            let mut line = Vec::new();
            let read = self
                .input
                .read_until(b'\n', &mut line)
                .context("Failed to read input")?;

            let command = if read == 0 {
                writeln!(self.output)?;
                log::info!("End of input, exiting");
                Command::Exit
            } else {
                match Command::parse(&String::from_utf8_lossy(&line)) {
                    Ok(command) => command,
                    Err(e) => {
                        writeln!(self.output, "Error: {e}")?;
                        continue;
                    }
                }
            };

            let mut ctx = CommandContext {
                out: &mut self.output,
                sleeper: self.sleeper.as_ref(),
                grace_period: self.settings.grace_period(),
            };
            if let Some(outcome) = command.execute(session, &mut ctx)? {
                return Ok(outcome);
            }
        }
    }
}
