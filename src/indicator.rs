//! "Thinking" animation shown while a request is outstanding.
//!
//! The animation runs as its own task and owns the console until
//! [`ThinkingIndicator::stop`] returns; only then may the reply be printed.

use std::io::Write;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Time between animation frames.
pub const TICK: Duration = Duration::from_millis(500);

const MAX_DOTS: usize = 3;

/// Handle to a running animation.
pub struct ThinkingIndicator {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ThinkingIndicator {
    /// Start animating `label` on `out` until `cancel` fires or `stop` is called.
    pub fn start<W>(label: &str, cancel: CancellationToken, out: W) -> Self
    where
        W: Write + Send + 'static,
    {
        let label = label.to_string();
        let token = cancel.clone();
        let task = tokio::spawn(animate(label, token, out));
        Self {
            cancel,
            task: Some(task),
        }
    }

    /// An indicator that draws nothing, for non-interactive output.
    pub fn disabled(cancel: CancellationToken) -> Self {
        Self { cancel, task: None }
    }

    /// Cancel the animation and wait for its task to finish.
    ///
    /// Nothing is written by the indicator after this returns.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Thinking indicator ended abnormally: {}", e);
            }
        }
    }
}

async fn animate<W: Write>(label: String, cancel: CancellationToken, mut out: W) {
    let mut dots = 0;
    draw(&mut out, &label, dots);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(TICK) => {}
        }
        dots = if dots >= MAX_DOTS { 0 } else { dots + 1 };
        draw(&mut out, &label, dots);
    }
}

fn draw<W: Write>(out: &mut W, label: &str, dots: usize) {
    let frame = format!(
        "\r🤖 {} is thinking{:<width$}",
        label,
        ".".repeat(dots),
        width = MAX_DOTS + 3
    );
    if let Err(e) = out.write_all(frame.as_bytes()).and_then(|_| out.flush()) {
        debug!("Failed to draw thinking indicator: {}", e);
    }
}
