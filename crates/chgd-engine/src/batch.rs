use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use chgd_store::{Database, TicketRepo};

use crate::error::EngineError;
use crate::validate::Validator;

pub const DEFAULT_CONCURRENCY: usize = 8;

/// Re-run the rule catalog over every stored ticket on a bounded worker
/// pool. Tasks share nothing but the store lock; each result is written back
/// independently. Returns the number of tickets revalidated.
pub async fn revalidate_all(
    db: Database,
    validator: Arc<Validator>,
    concurrency: usize,
) -> Result<usize, EngineError> {
    let repo = TicketRepo::new(db.clone());
    let ids: Vec<String> = repo
        .list_all()
        .map_err(EngineError::from_store)?
        .into_iter()
        .map(|t| t.id)
        .collect();

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = Vec::with_capacity(ids.len());

    for id in ids {
        let semaphore = semaphore.clone();
        let validator = validator.clone();
        let db = db.clone();
        tasks.push(tokio::spawn(async move {
            // Closed only if the semaphore is dropped, which it is not
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| EngineError::Store(chgd_store::StoreError::Io(e.to_string())))?;
            let repo = TicketRepo::new(db);
            validator.revalidate(&repo, &id).map(|_| ())
        }));
    }

    let mut revalidated = 0;
    for outcome in join_all(tasks).await {
        match outcome {
            Ok(Ok(())) => revalidated += 1,
            Ok(Err(e)) => warn!(error = %e, "ticket revalidation failed"),
            Err(e) => warn!(error = %e, "revalidation task panicked"),
        }
    }

    info!(revalidated, "batch revalidation complete");
    Ok(revalidated)
}
