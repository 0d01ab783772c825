use std::sync::Arc;

use shared::{
    domain::{AccountId, ResourceKind},
    error::{BotError, ErrorCode},
    protocol::{Attachment, ButtonAction, InboundEvent, InboundKind, Reply},
};
use storage::RecordStore;
use tracing::{debug, warn};

use crate::{
    broadcast::BroadcastSettings,
    commands::{split_command, Command},
    format, handlers,
    messenger::Messenger,
    session::{SessionState, SessionStore},
};

#[derive(Clone)]
pub struct BotContext {
    pub store: Arc<dyn RecordStore>,
    pub messenger: Arc<dyn Messenger>,
    pub sessions: SessionStore,
    pub broadcast: BroadcastSettings,
}

impl BotContext {
    pub fn new(store: Arc<dyn RecordStore>, messenger: Arc<dyn Messenger>) -> Self {
        Self {
            store,
            messenger,
            sessions: SessionStore::new(),
            broadcast: BroadcastSettings::default(),
        }
    }

    pub fn with_broadcast(mut self, broadcast: BroadcastSettings) -> Self {
        self.broadcast = broadcast;
        self
    }
}

/// Routes each inbound event to exactly one handler and sends its reply.
#[derive(Clone)]
pub struct Dispatcher {
    ctx: BotContext,
}

impl Dispatcher {
    pub fn new(ctx: BotContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &BotContext {
        &self.ctx
    }

    /// Handles one event to completion. Never fails: user errors become replies,
    /// store errors are logged and answered generically.
    pub async fn handle(&self, event: InboundEvent) {
        let account_id = event.sender.account_id;
        let reply = match self.route(&event).await {
            Ok(reply) => reply,
            Err(err) => {
                if err.code != ErrorCode::Internal {
                    debug!(account = %account_id, code = ?err.code, "request rejected");
                }
                Reply::text(err.message)
            }
        };

        if let Err(error) = self.ctx.messenger.send(event.chat_id, &reply).await {
            warn!(account = %account_id, chat = %event.chat_id, "failed to send reply: {error:#}");
        }
    }

    async fn route(&self, event: &InboundEvent) -> Result<Reply, BotError> {
        match &event.kind {
            InboundKind::ButtonPress { callback_id, data } => {
                // Acknowledge first, whatever the payload turns out to be.
                if let Err(error) = self.ctx.messenger.acknowledge(callback_id).await {
                    warn!(account = %event.sender.account_id, "failed to acknowledge button press: {error:#}");
                }
                match data.as_deref().and_then(ButtonAction::from_token) {
                    Some(action) => self.on_button(action, event.sender.account_id).await,
                    None => {
                        debug!(account = %event.sender.account_id, data = ?data, "unknown button token");
                        Ok(Reply::text(format::UNKNOWN_REQUEST))
                    }
                }
            }
            InboundKind::Message { text, attachment } => {
                let text = text.as_deref().unwrap_or_default();
                if let Some(line) = split_command(text) {
                    return match Command::from_name(line.name) {
                        Some(command) => {
                            self.on_command(command, line.args, event, attachment.as_ref())
                                .await
                        }
                        None => Ok(Reply::text(format::UNKNOWN_COMMAND)),
                    };
                }
                self.on_message(event.sender.account_id, text, attachment.as_ref())
                    .await
            }
        }
    }

    async fn on_command(
        &self,
        command: Command,
        args: &str,
        event: &InboundEvent,
        attachment: Option<&Attachment>,
    ) -> Result<Reply, BotError> {
        let ctx = &self.ctx;
        let account_id = event.sender.account_id;
        debug!(account = %account_id, command = command.name(), "dispatching command");

        match command {
            Command::Start => handlers::start(ctx, &event.sender).await,
            Command::Help => Ok(format::help()),
            Command::Menu => Ok(format::menu()),
            Command::ListTasks => handlers::list_tasks(ctx, account_id).await,
            Command::AddTask => handlers::add_task(ctx, account_id, args).await,
            Command::DeleteTask => {
                handlers::delete_record(ctx, account_id, ResourceKind::Task, args).await
            }
            Command::ListEvents => handlers::list_events(ctx, account_id).await,
            Command::AddEvent => handlers::add_event(ctx, account_id, args).await,
            Command::DeleteEvent => {
                handlers::delete_record(ctx, account_id, ResourceKind::Event, args).await
            }
            Command::ListFiles => handlers::list_files(ctx, account_id).await,
            Command::UploadFile => handlers::upload_file(ctx, account_id, attachment).await,
            Command::DeleteFile => {
                handlers::delete_record(ctx, account_id, ResourceKind::File, args).await
            }
            Command::SendMessageToAll => handlers::broadcast_inline(ctx, account_id, args).await,
            Command::Cancel => Ok(handlers::cancel(ctx, account_id).await),
        }
    }

    async fn on_button(&self, action: ButtonAction, account_id: AccountId) -> Result<Reply, BotError> {
        let ctx = &self.ctx;
        debug!(account = %account_id, action = action.token(), "dispatching button");

        match action {
            ButtonAction::ListTasks => handlers::list_tasks(ctx, account_id).await,
            ButtonAction::AddTask => Ok(Reply::text(format::ADD_TASK_HINT)),
            ButtonAction::ListEvents => handlers::list_events(ctx, account_id).await,
            ButtonAction::AddEvent => Ok(Reply::text(format::ADD_EVENT_HINT)),
            ButtonAction::ListFiles => handlers::list_files(ctx, account_id).await,
            ButtonAction::UploadFile => Ok(Reply::text(format::UPLOAD_HINT)),
            ButtonAction::SendMessageToAllPrompt => {
                handlers::prompt_broadcast(ctx, account_id).await
            }
        }
    }

    /// Plain messages: attachments are stored, text completes a pending broadcast.
    async fn on_message(
        &self,
        account_id: AccountId,
        text: &str,
        attachment: Option<&Attachment>,
    ) -> Result<Reply, BotError> {
        if attachment.is_some() {
            return handlers::upload_file(&self.ctx, account_id, attachment).await;
        }

        let awaiting = self.ctx.sessions.get(account_id).await == SessionState::AwaitingMessage;
        if awaiting && !text.trim().is_empty() {
            return handlers::complete_broadcast(&self.ctx, account_id, text).await;
        }
        Ok(Reply::text(format::UNKNOWN_COMMAND))
    }
}

#[cfg(test)]
#[path = "tests/dispatch_tests.rs"]
mod tests;
