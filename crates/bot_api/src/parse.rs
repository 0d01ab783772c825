use std::num::IntErrorKind;

use chrono::NaiveDate;
use shared::{domain::ResourceKind, error::BotError};
use storage::{NewEvent, NewTask};

pub const TASK_DATE_FORMAT: &str = "%Y.%m.%d";
pub const EVENT_DATE_FORMAT: &str = "%Y-%m-%d";

pub const ADD_TASK_USAGE: &str =
    "Invalid message format. Use the following format:\n/add_task Title, Description, YYYY.MM.DD";
pub const ADD_EVENT_USAGE: &str =
    "Please provide the event title and date. Example: /add_event Team meeting 2024-04-20";

/// Parses `title, description, YYYY.MM.DD`.
pub fn parse_task(args: &str) -> Result<NewTask, BotError> {
    let fields: Vec<&str> = args.split(',').map(str::trim).collect();
    let [title, description, deadline] = fields.as_slice() else {
        return Err(BotError::validation(ADD_TASK_USAGE));
    };
    if title.is_empty() {
        return Err(BotError::validation("Task title must not be empty."));
    }
    let deadline = parse_date(deadline, TASK_DATE_FORMAT, "YYYY.MM.DD")?;
    Ok(NewTask {
        title: title.to_string(),
        description: description.to_string(),
        deadline: Some(deadline),
    })
}

/// Parses `title words... [| description] YYYY-MM-DD`; the last token is always the date.
pub fn parse_event(args: &str) -> Result<NewEvent, BotError> {
    let tokens: Vec<&str> = args.split_whitespace().collect();
    let Some((date, head)) = tokens.split_last() else {
        return Err(BotError::validation(ADD_EVENT_USAGE));
    };
    if head.is_empty() {
        return Err(BotError::validation(ADD_EVENT_USAGE));
    }

    let joined = head.join(" ");
    let (title, description) = match joined.split_once('|') {
        Some((title, description)) => (title.trim(), Some(description.trim())),
        None => (joined.trim(), None),
    };
    if title.is_empty() {
        return Err(BotError::validation(ADD_EVENT_USAGE));
    }
    let date = parse_date(date, EVENT_DATE_FORMAT, "YYYY-MM-DD")?;

    Ok(NewEvent {
        title: title.to_string(),
        description: description
            .filter(|d| !d.is_empty())
            .map(str::to_string),
        date,
    })
}

pub fn parse_record_id(args: &str, kind: ResourceKind) -> Result<i64, BotError> {
    let raw = args.trim();
    raw.parse::<i64>().map_err(|err| match err.kind() {
        // Too large to be any stored id.
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
            BotError::not_found(format!("{} with ID {raw} not found.", kind.title()))
        }
        _ => BotError::validation(format!(
            "Invalid {} ID. The ID must be a number.",
            kind.noun()
        )),
    })
}

fn parse_date(raw: &str, format: &str, pattern: &str) -> Result<NaiveDate, BotError> {
    NaiveDate::parse_from_str(raw.trim(), format)
        .map_err(|_| BotError::validation(format!("Invalid date format. Use {pattern}.")))
}
