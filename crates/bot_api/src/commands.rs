/// Every slash command the bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Start,
    Help,
    Menu,
    ListTasks,
    AddTask,
    DeleteTask,
    ListEvents,
    AddEvent,
    DeleteEvent,
    ListFiles,
    UploadFile,
    DeleteFile,
    SendMessageToAll,
    Cancel,
}

/// Name, command, and the one-line description shown by `/help`, in help order.
pub const COMMAND_TABLE: &[(&str, Command, &str)] = &[
    ("start", Command::Start, "start working with the bot"),
    ("help", Command::Help, "list available commands"),
    ("menu", Command::Menu, "show the action buttons"),
    ("list_tasks", Command::ListTasks, "show your tasks"),
    ("add_task", Command::AddTask, "add a task"),
    ("delete_task", Command::DeleteTask, "delete a task"),
    ("list_events", Command::ListEvents, "show your events"),
    ("add_event", Command::AddEvent, "add an event"),
    ("delete_event", Command::DeleteEvent, "delete an event"),
    ("list_files", Command::ListFiles, "show your files"),
    ("upload_file", Command::UploadFile, "upload a file"),
    ("delete_file", Command::DeleteFile, "delete a file"),
    (
        "send_message_to_all",
        Command::SendMessageToAll,
        "send a message to all users",
    ),
    ("cancel", Command::Cancel, "cancel the current action"),
];

impl Command {
    pub fn from_name(name: &str) -> Option<Self> {
        COMMAND_TABLE
            .iter()
            .find(|(candidate, _, _)| *candidate == name)
            .map(|(_, command, _)| *command)
    }

    pub fn name(self) -> &'static str {
        COMMAND_TABLE
            .iter()
            .find(|(_, command, _)| *command == self)
            .map(|(name, _, _)| *name)
            .unwrap_or("unknown")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandLine<'a> {
    pub name: &'a str,
    /// Everything after the command word, trimmed.
    pub args: &'a str,
}

/// Splits `/name[@bot] args` into its parts. Returns `None` for plain text.
pub fn split_command(text: &str) -> Option<CommandLine<'_>> {
    let rest = text.trim_start().strip_prefix('/')?;
    let (head, args) = match rest.find(char::is_whitespace) {
        Some(idx) => (&rest[..idx], rest[idx..].trim()),
        None => (rest, ""),
    };
    let name = head.split_once('@').map_or(head, |(name, _)| name);
    Some(CommandLine { name, args })
}
