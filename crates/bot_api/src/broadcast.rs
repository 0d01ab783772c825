use std::time::Duration;

use futures::{stream, StreamExt};
use shared::{
    domain::{AccountId, ChatId},
    error::BotError,
    protocol::Reply,
};
use storage::RecordStore;
use tracing::{info, warn};

use crate::messenger::Messenger;

#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    /// Upper bound on simultaneous delivery attempts.
    pub concurrency: usize,
    /// Per-recipient bound; a slow recipient never holds up the others past this.
    pub delivery_timeout: Duration,
    /// When non-empty, only these accounts may broadcast.
    pub allowlist: Vec<AccountId>,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            delivery_timeout: Duration::from_secs(10),
            allowlist: Vec::new(),
        }
    }
}

impl BroadcastSettings {
    pub fn may_broadcast(&self, account_id: AccountId) -> bool {
        self.allowlist.is_empty() || self.allowlist.contains(&account_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: Vec<AccountId>,
}

/// Sends `text` to every registered user, one independent attempt per recipient.
///
/// Only the initial user lookup can fail; delivery failures are logged and
/// reported in [`BroadcastReport::failed`].
pub async fn fan_out(
    store: &dyn RecordStore,
    messenger: &dyn Messenger,
    settings: &BroadcastSettings,
    text: &str,
) -> anyhow::Result<BroadcastReport> {
    let recipients = store.list_users().await?;
    let reply = Reply::text(text);
    let reply = &reply;

    let outcomes: Vec<(AccountId, Result<(), BotError>)> = stream::iter(recipients)
        .map(|user| async move {
            let account_id = user.account_id;
            (account_id, deliver(messenger, settings, account_id, reply).await)
        })
        .buffer_unordered(settings.concurrency.max(1))
        .collect()
        .await;

    let mut report = BroadcastReport {
        attempted: outcomes.len(),
        ..BroadcastReport::default()
    };
    for (account_id, outcome) in outcomes {
        match outcome {
            Ok(()) => report.delivered += 1,
            Err(error) => {
                warn!(recipient = %account_id, error = %error.message, "broadcast delivery failed");
                report.failed.push(account_id);
            }
        }
    }
    report.failed.sort();

    info!(
        attempted = report.attempted,
        delivered = report.delivered,
        failed = report.failed.len(),
        "broadcast finished"
    );
    Ok(report)
}

/// One bounded attempt to reach `account_id`; failures come back as `ErrorCode::Delivery`.
pub async fn deliver(
    messenger: &dyn Messenger,
    settings: &BroadcastSettings,
    account_id: AccountId,
    reply: &Reply,
) -> Result<(), BotError> {
    match tokio::time::timeout(
        settings.delivery_timeout,
        messenger.send(ChatId::from(account_id), reply),
    )
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(BotError::delivery(format!("{error:#}"))),
        Err(_) => Err(BotError::delivery(format!(
            "timed out after {}ms",
            settings.delivery_timeout.as_millis()
        ))),
    }
}
