use shared::{
    domain::{AccountId, EventId, FileId, ResourceKind, TaskId, User},
    error::BotError,
    protocol::{Attachment, AttachmentKind, Reply, Sender},
};
use storage::NewFile;
use tracing::{debug, error};

use crate::{
    broadcast::fan_out,
    dispatch::BotContext,
    format,
    parse::{parse_event, parse_record_id, parse_task},
    session::SessionState,
};

pub async fn start(ctx: &BotContext, sender: &Sender) -> Result<Reply, BotError> {
    let (user, created) = ctx
        .store
        .get_or_create_user(sender.account_id, &sender.display_name())
        .await
        .map_err(internal)?;
    if created {
        debug!(account = %sender.account_id, user = %user.user_id, "registered new user");
    }
    Ok(format::greeting(&user, created))
}

pub async fn add_task(ctx: &BotContext, account_id: AccountId, args: &str) -> Result<Reply, BotError> {
    let user = require_user(ctx, account_id).await?;
    let task = parse_task(args)?;
    ctx.store
        .insert_task(user.user_id, &task)
        .await
        .map_err(internal)?;
    Ok(Reply::text("Task added successfully!"))
}

pub async fn list_tasks(ctx: &BotContext, account_id: AccountId) -> Result<Reply, BotError> {
    let user = require_user(ctx, account_id).await?;
    let tasks = ctx
        .store
        .list_tasks_for_user(user.user_id)
        .await
        .map_err(internal)?;
    Ok(format::tasks(&tasks))
}

pub async fn add_event(ctx: &BotContext, account_id: AccountId, args: &str) -> Result<Reply, BotError> {
    let user = require_user(ctx, account_id).await?;
    let event = parse_event(args)?;
    ctx.store
        .insert_event(user.user_id, &event)
        .await
        .map_err(internal)?;
    Ok(Reply::text(format!(
        "Event added:\nTitle: {}\nDate: {}",
        event.title,
        event.date.format("%Y-%m-%d")
    )))
}

pub async fn list_events(ctx: &BotContext, account_id: AccountId) -> Result<Reply, BotError> {
    let user = require_user(ctx, account_id).await?;
    let events = ctx
        .store
        .list_events_for_user(user.user_id)
        .await
        .map_err(internal)?;
    Ok(format::events(&events))
}

/// Stores an attachment. Photos and videos get a generic name since the platform sends none.
pub async fn upload_file(
    ctx: &BotContext,
    account_id: AccountId,
    attachment: Option<&Attachment>,
) -> Result<Reply, BotError> {
    let user = require_user(ctx, account_id).await?;
    let Some(attachment) = attachment.filter(|a| !a.file_ref.is_empty()) else {
        return Err(BotError::validation(format::UPLOAD_MISSING_DOCUMENT));
    };

    let file_name = match (attachment.kind, attachment.file_name.trim()) {
        (AttachmentKind::Photo, "") => "photo".to_string(),
        (AttachmentKind::Video, "") => "video".to_string(),
        (AttachmentKind::Document, "") => "document".to_string(),
        (_, name) => name.to_string(),
    };
    ctx.store
        .insert_file(
            user.user_id,
            &NewFile {
                file_ref: attachment.file_ref.clone(),
                file_name: file_name.clone(),
            },
        )
        .await
        .map_err(internal)?;
    Ok(Reply::text(format!("File '{file_name}' uploaded successfully.")))
}

pub async fn list_files(ctx: &BotContext, account_id: AccountId) -> Result<Reply, BotError> {
    let user = require_user(ctx, account_id).await?;
    let files = ctx
        .store
        .list_files_for_user(user.user_id)
        .await
        .map_err(internal)?;
    Ok(format::files(&files))
}

pub async fn delete_record(
    ctx: &BotContext,
    account_id: AccountId,
    kind: ResourceKind,
    args: &str,
) -> Result<Reply, BotError> {
    let user = require_user(ctx, account_id).await?;
    let id = parse_record_id(args, kind)?;
    let deleted = match kind {
        ResourceKind::Task => ctx.store.delete_task(user.user_id, TaskId(id)).await,
        ResourceKind::Event => ctx.store.delete_event(user.user_id, EventId(id)).await,
        ResourceKind::File => ctx.store.delete_file(user.user_id, FileId(id)).await,
    }
    .map_err(internal)?;

    if !deleted {
        return Err(BotError::not_found(format!(
            "{} with ID {id} not found.",
            kind.title()
        )));
    }
    Ok(Reply::text(format!("{} deleted successfully!", kind.title())))
}

pub async fn prompt_broadcast(ctx: &BotContext, account_id: AccountId) -> Result<Reply, BotError> {
    ensure_may_broadcast(ctx, account_id)?;
    ctx.sessions
        .set(account_id, SessionState::AwaitingMessage)
        .await;
    Ok(Reply::text(format::BROADCAST_PROMPT))
}

/// Fans out the message captured after the prompt. The session is back to
/// `Idle` before any delivery starts, so no failure can leave it waiting.
pub async fn complete_broadcast(
    ctx: &BotContext,
    account_id: AccountId,
    text: &str,
) -> Result<Reply, BotError> {
    ctx.sessions.take(account_id).await;
    broadcast_now(ctx, account_id, text).await
}

/// `/send_message_to_all <text>`: fans out immediately without touching the session.
pub async fn broadcast_inline(
    ctx: &BotContext,
    account_id: AccountId,
    args: &str,
) -> Result<Reply, BotError> {
    if args.trim().is_empty() {
        return Err(BotError::validation(format::BROADCAST_MISSING_TEXT));
    }
    broadcast_now(ctx, account_id, args).await
}

pub async fn cancel(ctx: &BotContext, account_id: AccountId) -> Reply {
    ctx.sessions.take(account_id).await;
    Reply::text(format::CANCELLED)
}

async fn broadcast_now(ctx: &BotContext, account_id: AccountId, text: &str) -> Result<Reply, BotError> {
    ensure_may_broadcast(ctx, account_id)?;
    let report = fan_out(
        ctx.store.as_ref(),
        ctx.messenger.as_ref(),
        &ctx.broadcast,
        text.trim(),
    )
    .await
    .map_err(internal)?;
    Ok(format::broadcast_report(&report))
}

fn ensure_may_broadcast(ctx: &BotContext, account_id: AccountId) -> Result<(), BotError> {
    if ctx.broadcast.may_broadcast(account_id) {
        Ok(())
    } else {
        Err(BotError::forbidden(format::BROADCAST_FORBIDDEN))
    }
}

/// Resolves the caller without creating anything; unregistered callers never reach child tables.
async fn require_user(ctx: &BotContext, account_id: AccountId) -> Result<User, BotError> {
    ctx.store
        .find_user_by_account(account_id)
        .await
        .map_err(internal)?
        .ok_or_else(BotError::unregistered)
}

fn internal(err: anyhow::Error) -> BotError {
    error!("record store operation failed: {err:#}");
    BotError::internal()
}
