//! The interactive conversation loop.
//!
//! A session moves between three states: waiting for a line, processing a
//! prompt, and exiting. Only one prompt is ever in flight. Every turn runs
//! under its own child of the shutdown token, so finishing a turn never
//! leaves a cancelled token behind for the next one.

use crate::console::{clear_line, FAREWELL};
use crate::indicator::ThinkingIndicator;
use crate::inference::InferenceClient;
use crate::retry::{Cancelled, Reply, RetryPolicy};
use anyhow::{Context, Result};
use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

const PROMPT: &str = "You: ";

/// What a line of user input asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    Prompt(String),
}

/// Classify one line of input.
///
/// Blank lines and `exit`/`quit` in any case end the session.
pub fn parse_input(line: &str) -> Command {
    let trimmed = line.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("exit")
        || trimmed.eq_ignore_ascii_case("quit")
    {
        Command::Exit
    } else {
        Command::Prompt(trimmed.to_string())
    }
}

/// One prompt and what came back for it.
#[derive(Debug)]
pub struct Turn {
    pub input: String,
    pub reply: Reply,
}

#[derive(Debug)]
enum State {
    AwaitingInput,
    Processing(String),
    Exiting,
}

/// A chat session bound to one inference client.
pub struct ChatSession<C: ?Sized, W> {
    client: Arc<C>,
    policy: RetryPolicy,
    label: String,
    shutdown: CancellationToken,
    out: W,
    animate: bool,
}

impl<C, W> ChatSession<C, W>
where
    C: InferenceClient + ?Sized,
    W: Write + Clone + Send + 'static,
{
    /// Create a session; cancelling `shutdown` ends it from any state.
    pub fn new(
        client: Arc<C>,
        policy: RetryPolicy,
        label: impl Into<String>,
        shutdown: CancellationToken,
        out: W,
    ) -> Self {
        Self {
            client,
            policy,
            label: label.into(),
            shutdown,
            out,
            animate: true,
        }
    }

    /// Enable or disable the thinking animation.
    pub fn with_animation(mut self, animate: bool) -> Self {
        self.animate = animate;
        self
    }

    /// Run until the user quits, input ends or shutdown is requested.
    pub async fn run<R>(&mut self, input: &mut R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut state = State::AwaitingInput;
        loop {
            state = match state {
                State::AwaitingInput => match self.await_input(input).await {
                    Ok(next) => next,
                    Err(e) if is_recoverable(&e) => {
                        self.report(&e)?;
                        State::AwaitingInput
                    }
                    Err(e) => return Err(e).context("Failed to read from the console"),
                },
                State::Processing(prompt) => match self.process(prompt).await {
                    Ok(next) => next,
                    Err(e) => {
                        self.report(&e)?;
                        State::AwaitingInput
                    }
                },
                State::Exiting => {
                    writeln!(self.out, "{}", FAREWELL)?;
                    self.out.flush()?;
                    return Ok(());
                }
            };
        }
    }

    /// Answer a single prompt, as used by one-shot mode.
    ///
    /// Returns `None` when the turn was cancelled.
    pub async fn ask(&self, prompt: &str) -> Option<Turn> {
        let turn = self.shutdown.child_token();
        let indicator = self.start_indicator(&turn);
        let outcome = self.policy.invoke(&*self.client, prompt, &turn).await;
        indicator.stop().await;

        match outcome {
            Ok(reply) => {
                let turn = Turn {
                    input: prompt.to_string(),
                    reply,
                };
                debug!(
                    attempts = turn.reply.attempts,
                    max_retries = self.policy.max_retries(),
                    succeeded = turn.reply.succeeded,
                    chars = turn.input.len(),
                    "Turn finished"
                );
                Some(turn)
            }
            Err(Cancelled) => None,
        }
    }

    async fn await_input<R>(&mut self, input: &mut R) -> io::Result<State>
    where
        R: AsyncBufRead + Unpin,
    {
        write!(self.out, "{}", PROMPT)?;
        self.out.flush()?;

        let shutdown = self.shutdown.clone();
        let mut line = String::new();
        let read = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            read = input.read_line(&mut line) => Some(read?),
        };

        match read {
            None | Some(0) => {
                writeln!(self.out)?;
                Ok(State::Exiting)
            }
            Some(_) => Ok(match parse_input(&line) {
                Command::Exit => State::Exiting,
                Command::Prompt(prompt) => State::Processing(prompt),
            }),
        }
    }

    async fn process(&mut self, prompt: String) -> Result<State> {
        match self.ask(&prompt).await {
            Some(turn) => {
                if self.animate {
                    clear_line(&mut self.out)?;
                } else {
                    // The typed line is not echoed when output is redirected.
                    writeln!(self.out)?;
                }
                writeln!(self.out, "🤖 {}: {}\n", self.label, turn.reply.text)?;
                self.out.flush()?;
                Ok(State::AwaitingInput)
            }
            None => {
                writeln!(self.out)?;
                Ok(State::Exiting)
            }
        }
    }

    fn start_indicator(&self, turn: &CancellationToken) -> ThinkingIndicator {
        if self.animate {
            ThinkingIndicator::start(&self.label, turn.clone(), self.out.clone())
        } else {
            ThinkingIndicator::disabled(turn.clone())
        }
    }

    fn report(&mut self, e: &dyn std::fmt::Display) -> Result<()> {
        error!("Error in chat loop: {}", e);
        writeln!(self.out, "\n❌ An error occurred: {}", e)?;
        writeln!(self.out, "Please try again or type 'exit' to quit.\n")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Undecodable input only spoils the current line.
fn is_recoverable(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::InvalidData
}
