//! JSON-lines turn driver.
//!
//! Each input line is one `TurnInput`; each output line is the `TurnResult`
//! for it, or an error object. Lines are processed concurrently up to a
//! limit, so output order follows completion, not input. Turns for one
//! conversation never overlap, but two lines for the same conversation that
//! are in flight together may be applied in either order.

use crate::error::TurndError;
use futures::StreamExt;
use rootcause::prelude::Report;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use viki_core::{ConversationId, TurnId, TurnInput};
use viki_orchestrator::{TurnOrchestrator, TurnResult};

/// Counts from one driver run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    /// Turns that produced a result.
    pub processed: usize,
    /// Lines that produced an error.
    pub failed: usize,
}

#[derive(Serialize)]
#[serde(untagged)]
enum OutputLine<'a> {
    Result(&'a TurnResult),
    Error {
        line: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        conversation_id: Option<&'a ConversationId>,
        error: String,
    },
}

/// Reads turns from `reader` until end of input or `cancel`, writing one
/// output line per turn to `writer`.
///
/// # Errors
///
/// Returns an error if output cannot be flushed at the end of the run.
pub async fn run<R, W>(
    orchestrator: &TurnOrchestrator,
    reader: R,
    writer: W,
    max_concurrent_turns: usize,
    cancel: CancellationToken,
) -> Result<DriverStats, Report<TurndError>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let writer = Mutex::new(writer);
    let processed = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    let lines = futures::stream::unfold(Some(reader.lines()), |state| async move {
        let mut lines = state?;
        match lines.next_line().await {
            Ok(Some(line)) => Some((Ok(line), Some(lines))),
            Ok(None) => None,
            Err(e) => Some((Err(e), None)),
        }
    });

    lines
        .enumerate()
        .take_until(cancel.cancelled())
        .for_each_concurrent(max_concurrent_turns.max(1), |(index, line)| {
            let writer = &writer;
            let processed = &processed;
            let failed = &failed;
            let cancel = cancel.child_token();
            async move {
                let number = index + 1;
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(line = number, error = %e, "failed to read input");
                        failed.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                };
                if line.trim().is_empty() {
                    return;
                }

                let output = match handle_line(orchestrator, number, &line, cancel).await {
                    Ok(result) => {
                        processed.fetch_add(1, Ordering::Relaxed);
                        serde_json::to_string(&OutputLine::Result(&result))
                    }
                    Err((conversation_id, message)) => {
                        failed.fetch_add(1, Ordering::Relaxed);
                        serde_json::to_string(&OutputLine::Error {
                            line: number,
                            conversation_id: conversation_id.as_ref(),
                            error: message,
                        })
                    }
                };

                match output {
                    Ok(mut json) => {
                        json.push('\n');
                        if let Err(e) = writer.lock().await.write_all(json.as_bytes()).await {
                            warn!(line = number, error = %e, "failed to write output");
                        }
                    }
                    Err(e) => warn!(line = number, error = %e, "failed to serialize output"),
                }
            }
        })
        .await;

    let mut writer = writer.into_inner();
    writer.flush().await.map_err(|e| TurndError::Io {
        message: e.to_string(),
    })?;

    Ok(DriverStats {
        processed: processed.into_inner(),
        failed: failed.into_inner(),
    })
}

async fn handle_line(
    orchestrator: &TurnOrchestrator,
    number: usize,
    line: &str,
    cancel: CancellationToken,
) -> Result<TurnResult, (Option<ConversationId>, String)> {
    let mut input: TurnInput = serde_json::from_str(line).map_err(|e| {
        let err = TurndError::InvalidTurn {
            line: number,
            message: e.to_string(),
        };
        warn!(error = %err, "skipping input line");
        (None, err.to_string())
    })?;

    if input.turn_id.is_blank() {
        input.turn_id = TurnId::generate();
    }
    let conversation_id = input.conversation_id.clone();
    debug!(line = number, conversation_id = %conversation_id, "turn received");

    orchestrator
        .process_turn_cancellable(input, cancel)
        .await
        .map_err(|report| {
            warn!(line = number, error = %report, "turn failed");
            (Some(conversation_id), report.current_context().to_string())
        })
}
