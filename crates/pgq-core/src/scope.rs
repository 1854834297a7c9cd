//! Transaction scope
//!
//! Opens exactly one engine transaction per scope, hands a [`BoundClient`] to
//! the caller and closes the transaction according to the outcome: commit on
//! success, rollback on any failure. The failure itself is returned unchanged.

use std::sync::Arc;

use futures::future::BoxFuture;
use pgq_engine::Engine;
use pgq_types::{Error, Result};
use tracing::{debug, warn};

use crate::bound::BoundClient;
use crate::config::ClientConfig;

/// Open a scope
pub async fn begin(engine: &dyn Engine, config: Arc<ClientConfig>) -> Result<BoundClient> {
    let tx = engine.begin().await?;
    debug!("Transaction scope opened");
    Ok(BoundClient::new(tx, config))
}

/// Close a scope according to `outcome`.
///
/// A commit failure replaces a successful outcome. A rollback failure is
/// logged and the original failure is returned.
pub async fn settle<T, E>(
    client: BoundClient,
    outcome: std::result::Result<T, E>,
) -> std::result::Result<T, E>
where
    E: From<Error>,
{
    match outcome {
        Ok(value) => {
            client.commit().await?;
            debug!("Transaction scope committed");
            Ok(value)
        }
        Err(err) => {
            match client.rollback().await {
                Ok(()) => warn!("Transaction scope rolled back"),
                Err(rollback_err) => {
                    warn!(error = %rollback_err, "Transaction scope rollback failed")
                }
            }
            Err(err)
        }
    }
}

/// Run `f` in a fresh scope.
///
/// If `f` panics the transaction is dropped without commit, which discards it.
pub async fn run<T, E, F>(
    engine: &dyn Engine,
    config: Arc<ClientConfig>,
    f: F,
) -> std::result::Result<T, E>
where
    F: for<'c> FnOnce(&'c mut BoundClient) -> BoxFuture<'c, std::result::Result<T, E>>,
    E: From<Error>,
{
    let mut client = begin(engine, config).await?;
    let outcome = f(&mut client).await;
    settle(client, outcome).await
}
