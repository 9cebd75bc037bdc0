// Calendar tools

use rmcp::model::Tool;
use serde::Deserialize;
use serde_json::json;

use super::format::{date_time, email_address, recipient, yes_no};
use super::{count_in, require, tool, Access};
use crate::error::{ApiError, Result};
use crate::graph::GraphClient;

const AVAILABILITY_LEGEND: &str = "Legend: 0=Free, 1=Tentative, 2=Busy, 3=OOF, 4=Working Elsewhere";

fn default_event_top() -> i64 {
    25
}

fn default_timezone() -> String {
    "America/Costa_Rica".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ListEventsArgs {
    pub start_datetime: String,
    pub end_datetime: String,
    #[serde(default = "default_event_top")]
    pub top: i64,
    #[serde(default)]
    pub calendar_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GetEventArgs {
    pub event_id: String,
}

#[derive(Debug, Deserialize)]
pub struct FindFreeTimeArgs {
    pub emails: Vec<String>,
    pub start_datetime: String,
    pub end_datetime: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

pub(crate) fn definitions() -> Vec<Tool> {
    vec![
        tool(
            "ms365_list_events",
            "List calendar events within a date/time range.",
            json!({
                "type": "object",
                "properties": {
                    "start_datetime": {"type": "string", "description": "Start of time range in ISO 8601 format (e.g. '2026-02-16T00:00:00Z')."},
                    "end_datetime": {"type": "string", "description": "End of time range in ISO 8601 format (e.g. '2026-02-17T23:59:59Z')."},
                    "top": {"type": "integer", "default": 25, "minimum": 1, "maximum": 50, "description": "Max events to return (1-50)."},
                    "calendar_id": {"type": "string", "description": "Specific calendar ID. Omit for default calendar."}
                },
                "required": ["start_datetime", "end_datetime"]
            }),
            Access::ReadOnly,
        ),
        tool(
            "ms365_get_event",
            "Get full details of a calendar event.",
            json!({
                "type": "object",
                "properties": {
                    "event_id": {"type": "string", "description": "Calendar event ID."}
                },
                "required": ["event_id"]
            }),
            Access::ReadOnly,
        ),
        tool(
            "ms365_list_calendars",
            "List all available calendars.",
            json!({"type": "object", "properties": {}}),
            Access::ReadOnly,
        ),
        tool(
            "ms365_find_free_time",
            "Check free/busy availability for one or more people.",
            json!({
                "type": "object",
                "properties": {
                    "emails": {"type": "array", "items": {"type": "string"}, "description": "List of email addresses to check availability for."},
                    "start_datetime": {"type": "string", "description": "Start of range in ISO 8601 (e.g. '2026-02-17T08:00:00')."},
                    "end_datetime": {"type": "string", "description": "End of range in ISO 8601 (e.g. '2026-02-17T18:00:00')."},
                    "timezone": {"type": "string", "default": "America/Costa_Rica", "description": "IANA timezone (e.g. 'America/Costa_Rica', 'UTC')."}
                },
                "required": ["emails", "start_datetime", "end_datetime"]
            }),
            Access::ReadOnly,
        ),
    ]
}

pub async fn list_events(graph: &GraphClient, args: ListEventsArgs) -> Result<String> {
    let start = require(&args.start_datetime, "start_datetime is required.")?;
    let end = require(&args.end_datetime, "end_datetime is required.")?;
    let top = count_in(args.top, 1..=50, "'top' must be between 1 and 50.")?;

    let calendar_id = args.calendar_id.as_deref().filter(|id| !id.trim().is_empty());
    let page = graph
        .list_events(start, end, top, calendar_id)
        .await?;
    if page.value.is_empty() {
        return Ok(format!("No events found between {} and {}.", start, end));
    }

    let mut lines = vec![format!("**{} event(s) found:**\n", page.value.len())];
    for ev in &page.value {
        let all_day = if ev.is_all_day.unwrap_or(false) { " (All day)" } else { "" };
        let location = ev
            .location
            .as_ref()
            .and_then(|l| l.display_name.as_deref())
            .filter(|l| !l.is_empty())
            .map(|l| format!("\n  Location: {}", l))
            .unwrap_or_default();
        let join = ev
            .online_meeting
            .as_ref()
            .and_then(|m| m.join_url.as_deref())
            .filter(|u| !u.is_empty())
            .map(|u| format!("\n  Join: {}", u))
            .unwrap_or_default();
        let attendees = ev.attendees.as_ref().map_or(0, Vec::len);

        lines.push(format!(
            "- **{}**{}\n  {} → {}{}\n  Organizer: {}\n  Attendees: {}{}\n  ID: `{}`\n",
            ev.subject.as_deref().unwrap_or(""),
            all_day,
            date_time(ev.start.as_ref()),
            date_time(ev.end.as_ref()),
            location,
            recipient(ev.organizer.as_ref(), ""),
            attendees,
            join,
            ev.id
        ));
    }
    Ok(lines.join("\n"))
}

pub async fn get_event(graph: &GraphClient, args: GetEventArgs) -> Result<String> {
    let event_id = require(&args.event_id, "event_id is required.")?;
    let ev = graph.get_event(event_id).await?;

    let location = ev
        .location
        .as_ref()
        .and_then(|l| l.display_name.as_deref())
        .unwrap_or("No location");
    let body = ev
        .body
        .as_ref()
        .and_then(|b| b.content.as_deref())
        .unwrap_or("No body");

    let mut lines = vec![
        format!("# {}\n", ev.subject.as_deref().unwrap_or("")),
        format!(
            "**When:** {} → {}",
            date_time(ev.start.as_ref()),
            date_time(ev.end.as_ref())
        ),
        format!("**Location:** {}", location),
        format!("**Organizer:** {}", recipient(ev.organizer.as_ref(), "")),
        format!("**All Day:** {}", yes_no(ev.is_all_day)),
    ];

    let attendees = ev.attendees.as_deref().unwrap_or_default();
    if !attendees.is_empty() {
        lines.push("\n**Attendees:**".to_string());
        for attendee in attendees {
            let status = attendee
                .status
                .as_ref()
                .and_then(|s| s.response.as_deref())
                .unwrap_or("none");
            lines.push(format!(
                "  - {} ({})",
                email_address(attendee.email_address.as_ref(), ""),
                status
            ));
        }
    }

    if let Some(url) = ev
        .online_meeting
        .as_ref()
        .and_then(|m| m.join_url.as_deref())
        .filter(|u| !u.is_empty())
    {
        lines.push(format!("\n**Join Link:** {}", url));
    }

    lines.push(format!("\n---\n\n{}", body));
    Ok(lines.join("\n"))
}

pub async fn list_calendars(graph: &GraphClient) -> Result<String> {
    let page = graph.list_calendars().await?;
    if page.value.is_empty() {
        return Ok("No calendars found.".to_string());
    }

    let mut lines = vec!["**Your Calendars:**\n".to_string()];
    for cal in &page.value {
        let default = if cal.is_default_calendar.unwrap_or(false) {
            " ⭐ (default)"
        } else {
            ""
        };
        let owner = cal
            .owner
            .as_ref()
            .and_then(|o| o.address.as_deref())
            .unwrap_or("");
        lines.push(format!(
            "- **{}**{} | Owner: {} | ID: `{}`",
            cal.name.as_deref().unwrap_or(""),
            default,
            owner,
            cal.id
        ));
    }
    Ok(lines.join("\n"))
}

pub async fn find_free_time(graph: &GraphClient, args: FindFreeTimeArgs) -> Result<String> {
    if args.emails.is_empty() {
        return Err(ApiError::validation(
            "At least one email address is required.",
        ));
    }
    let start = require(&args.start_datetime, "start_datetime is required.")?;
    let end = require(&args.end_datetime, "end_datetime is required.")?;

    let page = graph
        .get_schedule(args.emails.clone(), start, end, &args.timezone)
        .await?;
    if page.value.is_empty() {
        return Ok("No availability data returned.".to_string());
    }

    let mut lines = vec![
        format!(
            "**Availability ({} → {}, {}):**\n",
            start, end, args.timezone
        ),
        AVAILABILITY_LEGEND.to_string(),
        String::new(),
    ];
    for schedule in &page.value {
        lines.push(format!(
            "**{}:** `{}`",
            schedule.schedule_id.as_deref().unwrap_or("Unknown"),
            schedule.availability_view.as_deref().unwrap_or("")
        ));
        for item in schedule.schedule_items.as_deref().unwrap_or_default() {
            lines.push(format!(
                "  - [{}] {}: {} → {}",
                item.status.as_deref().unwrap_or(""),
                item.subject.as_deref().unwrap_or(""),
                date_time(item.start.as_ref()),
                date_time(item.end.as_ref())
            ));
        }
        lines.push(String::new());
    }
    Ok(lines.join("\n"))
}
