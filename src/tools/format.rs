// Markdown rendering helpers shared by the tool handlers

use crate::graph::models::{DateTimeTimeZone, EmailAddress, Recipient};

/// First `max` characters of `text` (not bytes)
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// `Name <address>`, with `fallback_name` when the name is missing
pub(crate) fn email_address(address: Option<&EmailAddress>, fallback_name: &str) -> String {
    let name = address
        .and_then(|a| a.name.as_deref())
        .unwrap_or(fallback_name);
    let addr = address.and_then(|a| a.address.as_deref()).unwrap_or("");
    format!("{} <{}>", name, addr)
}

pub(crate) fn recipient(recipient: Option<&Recipient>, fallback_name: &str) -> String {
    email_address(
        recipient.and_then(|r| r.email_address.as_ref()),
        fallback_name,
    )
}

/// Comma separated `Name <address>` list
pub(crate) fn recipient_list(recipients: Option<&[Recipient]>) -> String {
    recipients
        .unwrap_or_default()
        .iter()
        .map(|r| recipient(Some(r), ""))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn date_time(value: Option<&DateTimeTimeZone>) -> &str {
    value.and_then(|v| v.date_time.as_deref()).unwrap_or("")
}

pub(crate) fn yes_no(flag: Option<bool>) -> &'static str {
    if flag.unwrap_or(false) {
        "Yes"
    } else {
        "No"
    }
}
