use std::time::Duration;

use async_trait::async_trait;
use bot_api::Dispatcher;
use telegram::{TelegramClient, Update};
use tracing::{debug, info, warn};

const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Where long-poll batches come from.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn fetch(&self, offset: Option<i64>, wait: Duration) -> anyhow::Result<Vec<Update>>;
}

#[async_trait]
impl UpdateSource for TelegramClient {
    async fn fetch(&self, offset: Option<i64>, wait: Duration) -> anyhow::Result<Vec<Update>> {
        Ok(self.get_updates(offset, wait).await?)
    }
}

/// Fetches one batch and handles each update in order. Returns the offset for
/// the next call; every received update advances it, mappable or not.
pub async fn poll_once<S>(
    source: &S,
    dispatcher: &Dispatcher,
    offset: Option<i64>,
    wait: Duration,
) -> anyhow::Result<Option<i64>>
where
    S: UpdateSource + ?Sized,
{
    let updates = source.fetch(offset, wait).await?;
    let mut next = offset;
    for update in updates {
        next = Some(next.map_or(update.update_id + 1, |n| n.max(update.update_id + 1)));
        let update_id = update.update_id;
        match update.into_inbound() {
            Some(event) => dispatcher.handle(event).await,
            None => debug!(update_id, "skipping unsupported update"),
        }
    }
    Ok(next)
}

/// Long-polls forever, backing off exponentially while the source keeps failing.
pub async fn run<S>(source: S, dispatcher: Dispatcher, wait: Duration)
where
    S: UpdateSource,
{
    info!(wait_secs = wait.as_secs(), "polling for updates");
    let mut offset = None;
    let mut backoff = MIN_BACKOFF;
    loop {
        match poll_once(&source, &dispatcher, offset, wait).await {
            Ok(next) => {
                offset = next;
                backoff = MIN_BACKOFF;
            }
            Err(error) => {
                warn!(retry_in_secs = backoff.as_secs(), "failed to fetch updates: {error:#}");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/poller_tests.rs"]
mod tests;
