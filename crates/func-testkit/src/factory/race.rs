//! Startup readiness race.
//!
//! Three signals compete once the host is spawned: the process exiting
//! (failure), the startup deadline (accept), and an optional health loop
//! (accept on success, fail on exhaustion). The deadline and the health loop
//! share a [`CancellationToken`] so the loser stops. A process exit observed
//! when the race is settled always wins.

use crate::cancel::CancellationToken;
use crate::error::{FuncTestError, Result};
use crate::process::ProcessExit;
use futures::FutureExt;
use std::future::Future;
use std::time::Duration;

pub(crate) async fn race_startup<E, H>(
    exit: E,
    startup_delay: Duration,
    health: Option<H>,
    cancel: &CancellationToken,
) -> Result<()>
where
    E: Future<Output = ProcessExit>,
    H: Future<Output = Result<()>>,
{
    let mut exit = std::pin::pin!(exit);

    let deadline = async {
        if cancel.sleep(startup_delay).await {
            cancel.cancel();
        }
        Ok(())
    };

    let readiness = async {
        match health {
            None => deadline.await,
            Some(health) => {
                tokio::select! {
                    accepted = deadline => accepted,
                    checked = health => {
                        cancel.cancel();
                        checked
                    }
                }
            }
        }
    };

    let outcome = tokio::select! {
        exit = exit.as_mut() => return Err(startup_failed(exit)),
        outcome = readiness => outcome,
    };

    if let Some(exit) = exit.as_mut().now_or_never() {
        return Err(startup_failed(exit));
    }
    outcome
}

fn startup_failed(exit: ProcessExit) -> FuncTestError {
    FuncTestError::StartupFailed {
        exit_code: exit.code(),
    }
}
