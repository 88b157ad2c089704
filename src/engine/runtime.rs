// src/engine/runtime.rs

//! Async shell around [`Loop`].
//!
//! Consumes [`Trigger`]s from the shared queue and steps the loop once per
//! trigger. Systems still run synchronously on the consumer task.

use std::future::{self, Future};

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::engine::core::Loop;
use crate::engine::trigger::Trigger;
use crate::errors::{Result, TickdagError};

/// Totals gathered while driving the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub failures: u64,
}

/// Step `engine` for every trigger until the queue closes.
pub async fn drive<C: 'static>(
    engine: &mut Loop<C>,
    ctx: &mut C,
    triggers: &mut mpsc::UnboundedReceiver<Trigger>,
) -> Result<RunSummary> {
    drive_until(engine, ctx, triggers, future::pending()).await
}

/// Like [`drive`], but also returns once `shutdown` resolves.
///
/// Re-raised failures (throw policy) are logged at error level and do not
/// stop the loop.
pub async fn drive_until<C, F>(
    engine: &mut Loop<C>,
    ctx: &mut C,
    triggers: &mut mpsc::UnboundedReceiver<Trigger>,
    shutdown: F,
) -> Result<RunSummary>
where
    C: 'static,
    F: Future<Output = ()>,
{
    info!("loop started");
    let mut summary = RunSummary::default();
    tokio::pin!(shutdown);

    loop {
        let trigger = tokio::select! {
            maybe = triggers.recv() => match maybe {
                Some(trigger) => trigger,
                None => {
                    info!("all trigger sources closed; exiting");
                    break;
                }
            },
            _ = &mut shutdown => {
                info!("shutdown requested; exiting");
                break;
            }
        };

        debug!(channel = %trigger.channel, elapsed = ?trigger.elapsed, "trigger received");

        match engine.step(&trigger.channel, ctx, trigger.elapsed) {
            Ok(report) => {
                if report.tick > 0 {
                    summary.ticks += 1;
                }
                summary.failures += report.failures.len() as u64;
            }
            Err(TickdagError::SystemsFailed { channel, failures }) => {
                summary.ticks += 1;
                summary.failures += failures.len() as u64;
                for failure in &failures {
                    error!(
                        channel = %channel,
                        system = %failure.system,
                        panicked = failure.panicked,
                        error = %failure.message,
                        "system failed"
                    );
                }
            }
            Err(other) => return Err(other),
        }
    }

    info!(ticks = summary.ticks, failures = summary.failures, "loop stopped");
    Ok(summary)
}
