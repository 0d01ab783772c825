//! Reply text and button layouts. Everything here is a pure function of its
//! inputs, so identical data always renders to identical bytes.

use std::fmt::Write as _;

use shared::{
    domain::{Event, StoredFile, Task, User},
    protocol::{Button, ButtonAction, Keyboard, Reply},
};

use crate::{broadcast::BroadcastReport, commands::COMMAND_TABLE};

pub const MENU_PROMPT: &str = "Choose an action:";
pub const UNKNOWN_COMMAND: &str = "Unknown command. Type /help for the list of commands.";
pub const UNKNOWN_REQUEST: &str = "Unknown request.";
pub const NO_TASKS: &str = "You have no tasks.";
pub const NO_EVENTS: &str = "You have no scheduled events.";
pub const NO_FILES: &str = "Your file list is empty.";
pub const BROADCAST_PROMPT: &str = "Enter the message you want to send to all users:";
pub const BROADCAST_MISSING_TEXT: &str = "Please provide a message to send.";
pub const BROADCAST_FORBIDDEN: &str = "You are not allowed to send broadcasts.";
pub const CANCELLED: &str = "Action cancelled.";
pub const UPLOAD_MISSING_DOCUMENT: &str = "Please send a document together with /upload_file.";
pub const ADD_TASK_HINT: &str =
    "To add a task, send:\n/add_task Title, Description, YYYY.MM.DD";
pub const ADD_EVENT_HINT: &str = "To add an event, send:\n/add_event Title YYYY-MM-DD";
pub const UPLOAD_HINT: &str = "Send a document with the caption /upload_file to store it.";

pub fn button_label(action: ButtonAction) -> &'static str {
    match action {
        ButtonAction::ListTasks => "Task list",
        ButtonAction::AddTask => "Add task",
        ButtonAction::ListEvents => "Event list",
        ButtonAction::AddEvent => "Add event",
        ButtonAction::ListFiles => "File list",
        ButtonAction::UploadFile => "Upload file",
        ButtonAction::SendMessageToAllPrompt => "Send message to all",
    }
}

/// The seven primary actions, laid out two per row with broadcast alone at the bottom.
pub fn main_menu() -> Keyboard {
    let button = |action| Button {
        label: button_label(action).to_string(),
        action,
    };
    Keyboard {
        rows: vec![
            vec![button(ButtonAction::ListTasks), button(ButtonAction::AddTask)],
            vec![
                button(ButtonAction::ListEvents),
                button(ButtonAction::AddEvent),
            ],
            vec![
                button(ButtonAction::ListFiles),
                button(ButtonAction::UploadFile),
            ],
            vec![button(ButtonAction::SendMessageToAllPrompt)],
        ],
    }
}

pub fn menu() -> Reply {
    Reply::with_keyboard(MENU_PROMPT, main_menu())
}

pub fn greeting(user: &User, created: bool) -> Reply {
    let line = if created {
        format!(
            "Welcome, {}! Your account has been registered.",
            user.display_name
        )
    } else {
        format!("Welcome back, {}!", user.display_name)
    };
    Reply::with_keyboard(format!("{line}\n\n{MENU_PROMPT}"), main_menu())
}

pub fn help() -> Reply {
    let mut text = String::from("Available commands:\n");
    for (name, _, description) in COMMAND_TABLE {
        let _ = writeln!(text, "/{name} - {description}");
    }
    Reply::text(text.trim_end())
}

pub fn tasks(tasks: &[Task]) -> Reply {
    if tasks.is_empty() {
        return Reply::text(NO_TASKS);
    }
    let mut text = String::from("Your tasks:\n");
    for task in tasks {
        let _ = write!(text, "\n{}: {}", task.task_id, task.title);
        if !task.description.is_empty() {
            let _ = write!(text, " - {}", task.description);
        }
        if let Some(deadline) = task.deadline {
            let _ = write!(text, " - due {}", deadline.format("%Y.%m.%d"));
        }
    }
    Reply::text(text)
}

pub fn events(events: &[Event]) -> Reply {
    if events.is_empty() {
        return Reply::text(NO_EVENTS);
    }
    let mut text = String::from("Your events:\n");
    for event in events {
        let _ = write!(text, "\n{}: {}", event.event_id, event.title);
        if let Some(description) = &event.description {
            let _ = write!(text, " ({description})");
        }
        let _ = write!(text, " - {}", event.date.format("%d.%m.%Y"));
    }
    Reply::text(text)
}

pub fn files(files: &[StoredFile]) -> Reply {
    if files.is_empty() {
        return Reply::text(NO_FILES);
    }
    let mut text = String::from("Your files:\n");
    for file in files {
        let _ = write!(
            text,
            "\n{}: {} (file_id: {})",
            file.file_id, file.file_name, file.file_ref
        );
    }
    Reply::text(text)
}

pub fn broadcast_report(report: &BroadcastReport) -> Reply {
    Reply::text(format!(
        "Message delivered to {} of {} users.",
        report.delivered, report.attempted
    ))
}
