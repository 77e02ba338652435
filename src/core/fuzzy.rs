use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Runs every operation concurrently and waits for them with a soft deadline.
///
/// Returns the successful values in input order once all operations have
/// settled or `timeout` elapses, whichever comes first. Operations still
/// pending at the deadline keep running on their own task but their results
/// are dropped. If nothing succeeded by the time the race settles, the
/// failures collected so far are returned instead, also in input order.
pub async fn fuzzy_timeout<F, T, E>(operations: Vec<F>, timeout: Duration) -> Result<Vec<T>, Vec<E>>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let total = operations.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    for (index, operation) in operations.into_iter().enumerate() {
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = operation.await;
            // Receiver is gone once the race has settled
            let _ = tx.send((index, result));
        });
    }
    drop(tx);

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    let mut successes = Vec::new();
    let mut failures = Vec::new();
    let mut settled = 0;
    while settled < total {
        tokio::select! {
            received = rx.recv() => match received {
                Some((index, Ok(value))) => {
                    successes.push((index, value));
                    settled += 1;
                }
                Some((index, Err(e))) => {
                    failures.push((index, e));
                    settled += 1;
                }
                // Every sender dropped, a task panicked before reporting
                None => break,
            },
            _ = &mut deadline => {
                debug!(
                    "Fuzzy timeout after {:?}: {}/{} operations settled",
                    timeout, settled, total
                );
                break;
            }
        }
    }

    if successes.is_empty() {
        failures.sort_by_key(|(index, _)| *index);
        return Err(failures.into_iter().map(|(_, e)| e).collect());
    }

    successes.sort_by_key(|(index, _)| *index);
    Ok(successes.into_iter().map(|(_, value)| value).collect())
}
