// Calendar endpoints

use super::client::{decode, GraphClient};
use super::models::{Calendar, Collection, DateTimeTimeZone, Event, ScheduleInformation, ScheduleRequest};
use crate::error::Result;

const EVENT_SUMMARY_FIELDS: &str =
    "id,subject,organizer,start,end,location,attendees,isAllDay,bodyPreview,onlineMeeting,recurrence";
const EVENT_DETAIL_FIELDS: &str =
    "id,subject,organizer,start,end,location,attendees,isAllDay,body,onlineMeeting,recurrence";

/// Free/busy slot length in minutes
const AVAILABILITY_INTERVAL: u32 = 30;

impl GraphClient {
    /// Occurrences between `start` and `end` (ISO 8601), expanded from recurrences.
    /// `calendar_id` of `None` means the default calendar.
    pub async fn list_events(
        &self,
        start: &str,
        end: &str,
        top: u32,
        calendar_id: Option<&str>,
    ) -> Result<Collection<Event>> {
        let segments: Vec<&str> = match calendar_id {
            Some(id) => vec!["me", "calendars", id, "calendarView"],
            None => vec!["me", "calendarView"],
        };
        self.get(
            &segments,
            &[
                ("startDateTime", start.to_string()),
                ("endDateTime", end.to_string()),
                ("$top", top.to_string()),
                ("$orderby", "start/dateTime".to_string()),
                ("$select", EVENT_SUMMARY_FIELDS.to_string()),
            ],
        )
        .await
    }

    pub async fn get_event(&self, event_id: &str) -> Result<Event> {
        self.get(
            &["me", "events", event_id],
            &[("$select", EVENT_DETAIL_FIELDS.to_string())],
        )
        .await
    }

    pub async fn list_calendars(&self) -> Result<Collection<Calendar>> {
        self.get(
            &["me", "calendars"],
            &[("$select", "id,name,color,isDefaultCalendar,owner".to_string())],
        )
        .await
    }

    /// Free/busy view for each address in `schedules`
    pub async fn get_schedule(
        &self,
        schedules: Vec<String>,
        start: &str,
        end: &str,
        time_zone: &str,
    ) -> Result<Collection<ScheduleInformation>> {
        let request = ScheduleRequest {
            schedules,
            start_time: DateTimeTimeZone {
                date_time: Some(start.to_string()),
                time_zone: Some(time_zone.to_string()),
            },
            end_time: DateTimeTimeZone {
                date_time: Some(end.to_string()),
                time_zone: Some(time_zone.to_string()),
            },
            availability_view_interval: AVAILABILITY_INTERVAL,
        };
        let value = self.post(&["me", "calendar", "getSchedule"], &request).await?;
        decode(value)
    }
}
