use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::tools::Tool;

const NAIVE_FORMATS: [&str; 4] =
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"];
const DATE_ONLY_HOUR: u32 = 9;
const SLOT_STEP_MINUTES: i64 = 30;
const MAX_LIST_DAYS: i64 = 366;
const MAX_SLOT_MINUTES: i64 = 24 * 60;

/// Parses the time formats the assistant accepts. RFC 3339 keeps its own
/// offset; naive values are read in `offset`; a bare date means 09:00.
pub fn parse_event_time(value: &str, offset: FixedOffset) -> Result<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed);
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(DATE_ONLY_HOUR, 0, 0))
        })
        .ok_or_else(|| anyhow!("unrecognised date-time `{value}`, use YYYY-MM-DDTHH:MM:SS"))?;

    naive
        .and_local_timezone(offset)
        .single()
        .ok_or_else(|| anyhow!("date-time `{value}` is ambiguous at offset {offset}"))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewEvent {
    pub title: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub attendees: Vec<String>,
    pub location: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub attendees: Vec<String>,
    pub location: Option<String>,
    pub description: Option<String>,
}

/// Calendar backend. Google Calendar in production, [`InMemoryCalendar`]
/// for dry runs.
#[async_trait]
pub trait CalendarService: Send + Sync {
    async fn insert(&self, event: NewEvent) -> Result<CalendarEvent>;

    async fn get(&self, event_id: &str) -> Result<Option<CalendarEvent>>;

    /// Replaces the stored event carrying the same id.
    async fn update(&self, event: CalendarEvent) -> Result<CalendarEvent>;

    /// Removes an event, returning it when it existed.
    async fn delete(&self, event_id: &str) -> Result<Option<CalendarEvent>>;

    /// Events overlapping `[from, to)`, ordered by start time.
    async fn list(
        &self,
        from: DateTime<FixedOffset>,
        to: DateTime<FixedOffset>,
        max_results: usize,
    ) -> Result<Vec<CalendarEvent>>;
}

#[derive(Debug, Default)]
struct CalendarState {
    events: Vec<CalendarEvent>,
    next_id: u64,
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryCalendar {
    state: Arc<Mutex<CalendarState>>,
}

impl InMemoryCalendar {
    pub fn events(&self) -> Vec<CalendarEvent> {
        self.lock().events.clone()
    }

    fn lock(&self) -> MutexGuard<'_, CalendarState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl CalendarService for InMemoryCalendar {
    async fn insert(&self, event: NewEvent) -> Result<CalendarEvent> {
        let mut state = self.lock();
        state.next_id += 1;
        let created = CalendarEvent {
            id: format!("evt_{}", state.next_id),
            title: event.title,
            start: event.start,
            end: event.end,
            attendees: event.attendees,
            location: event.location,
            description: event.description,
        };
        state.events.push(created.clone());
        Ok(created)
    }

    async fn get(&self, event_id: &str) -> Result<Option<CalendarEvent>> {
        Ok(self.lock().events.iter().find(|event| event.id == event_id).cloned())
    }

    async fn update(&self, event: CalendarEvent) -> Result<CalendarEvent> {
        let mut state = self.lock();
        let Some(stored) = state.events.iter_mut().find(|stored| stored.id == event.id) else {
            bail!("event `{}` not found", event.id);
        };
        *stored = event.clone();
        Ok(event)
    }

    async fn delete(&self, event_id: &str) -> Result<Option<CalendarEvent>> {
        let mut state = self.lock();
        let position = state.events.iter().position(|event| event.id == event_id);
        Ok(position.map(|index| state.events.remove(index)))
    }

    async fn list(
        &self,
        from: DateTime<FixedOffset>,
        to: DateTime<FixedOffset>,
        max_results: usize,
    ) -> Result<Vec<CalendarEvent>> {
        let mut events = self
            .lock()
            .events
            .iter()
            .filter(|event| event.end > from && event.start < to)
            .cloned()
            .collect::<Vec<_>>();
        events.sort_by_key(|event| event.start);
        events.truncate(max_results);
        Ok(events)
    }
}

#[derive(Debug, Deserialize)]
struct CreateEventInput {
    title: String,
    start_time: String,
    end_time: String,
    #[serde(default)]
    attendees: Vec<String>,
    #[serde(default)]
    location: String,
    #[serde(default)]
    description: String,
}

pub struct CreateCalendarEventTool {
    calendar: Arc<dyn CalendarService>,
    offset: FixedOffset,
}

impl CreateCalendarEventTool {
    pub fn new(calendar: Arc<dyn CalendarService>, offset: FixedOffset) -> Self {
        Self { calendar, offset }
    }
}

#[async_trait]
impl Tool for CreateCalendarEventTool {
    fn name(&self) -> &'static str {
        "create_calendar_event"
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let input: CreateEventInput = serde_json::from_value(input)
            .context("create_calendar_event expects title, start_time and end_time")?;
        if input.title.trim().is_empty() {
            bail!("event title must not be empty");
        }

        let start = parse_event_time(&input.start_time, self.offset)?;
        let end = parse_event_time(&input.end_time, self.offset)?;
        if end < start {
            bail!("event end `{}` is before its start `{}`", input.end_time, input.start_time);
        }

        let attendees = input
            .attendees
            .iter()
            .map(|attendee| attendee.trim().to_string())
            .filter(|attendee| !attendee.is_empty())
            .collect::<Vec<_>>();
        let event = NewEvent {
            title: input.title,
            start,
            end,
            attendees,
            location: non_empty(input.location),
            description: non_empty(input.description),
        };

        let created = self.calendar.insert(event).await.context("failed to create event")?;
        info!(
            event_name = "tool.calendar.event_created",
            event_id = %created.id,
            attendees = created.attendees.len(),
            "calendar event created"
        );

        Ok(json!({
            "status": "created",
            "event": created,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct ListEventsInput {
    #[serde(default = "default_days")]
    days: i64,
    #[serde(default = "default_max_results")]
    max_results: usize,
}

fn default_days() -> i64 {
    7
}

fn default_max_results() -> usize {
    10
}

pub struct ListUpcomingEventsTool {
    calendar: Arc<dyn CalendarService>,
    offset: FixedOffset,
}

impl ListUpcomingEventsTool {
    pub fn new(calendar: Arc<dyn CalendarService>, offset: FixedOffset) -> Self {
        Self { calendar, offset }
    }
}

#[async_trait]
impl Tool for ListUpcomingEventsTool {
    fn name(&self) -> &'static str {
        "list_upcoming_events"
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let input: ListEventsInput = if input.is_null() {
            ListEventsInput { days: default_days(), max_results: default_max_results() }
        } else {
            serde_json::from_value(input)
                .context("list_upcoming_events takes days and max_results")?
        };
        if !(1..=MAX_LIST_DAYS).contains(&input.days) {
            bail!("days must be between 1 and {MAX_LIST_DAYS}");
        }

        let now = Utc::now().with_timezone(&self.offset);
        let until = Duration::try_days(input.days)
            .and_then(|window| now.checked_add_signed(window))
            .ok_or_else(|| anyhow!("{} days from now is out of range", input.days))?;
        let events = self
            .calendar
            .list(now, until, input.max_results)
            .await
            .context("failed to list events")?;

        Ok(json!({
            "days": input.days,
            "count": events.len(),
            "events": events,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct AvailabilityInput {
    date: String,
    #[serde(default = "default_duration")]
    duration_minutes: i64,
    #[serde(default = "default_day_start")]
    working_hours_start: u32,
    #[serde(default = "default_day_end")]
    working_hours_end: u32,
}

fn default_duration() -> i64 {
    60
}

fn default_day_start() -> u32 {
    9
}

fn default_day_end() -> u32 {
    18
}

/// Free slots of the requested length within working hours, stepping
/// every 30 minutes.
pub struct GetAvailableTimeSlotsTool {
    calendar: Arc<dyn CalendarService>,
    offset: FixedOffset,
}

impl GetAvailableTimeSlotsTool {
    pub fn new(calendar: Arc<dyn CalendarService>, offset: FixedOffset) -> Self {
        Self { calendar, offset }
    }
}

#[async_trait]
impl Tool for GetAvailableTimeSlotsTool {
    fn name(&self) -> &'static str {
        "get_available_time_slots"
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let input: AvailabilityInput =
            serde_json::from_value(input).context("get_available_time_slots expects a date")?;
        let date = NaiveDate::parse_from_str(input.date.trim(), "%Y-%m-%d")
            .context("invalid date format, use YYYY-MM-DD")?;
        if !(1..=MAX_SLOT_MINUTES).contains(&input.duration_minutes) {
            bail!("duration_minutes must be between 1 and {MAX_SLOT_MINUTES}");
        }

        let day_start = local_time(date, input.working_hours_start, self.offset)?;
        let day_end = local_time(date, input.working_hours_end, self.offset)?;
        if day_end <= day_start {
            bail!("working hours must end after they start");
        }

        let busy = self.calendar.list(day_start, day_end, usize::MAX).await?;
        let duration = Duration::try_minutes(input.duration_minutes)
            .ok_or_else(|| anyhow!("duration_minutes is out of range"))?;
        let mut slots = Vec::new();
        let mut cursor = day_start;
        while cursor + duration <= day_end {
            let slot_end = cursor + duration;
            let free = busy.iter().all(|event| slot_end <= event.start || cursor >= event.end);
            if free {
                slots.push(cursor.format("%H:%M").to_string());
            }
            cursor = cursor + Duration::minutes(SLOT_STEP_MINUTES);
        }

        Ok(json!({
            "date": input.date,
            "duration_minutes": input.duration_minutes,
            "slots": slots,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct UpdateEventInput {
    event_id: String,
    title: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    location: Option<String>,
    description: Option<String>,
}

impl UpdateEventInput {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
            && self.location.is_none()
            && self.description.is_none()
    }
}

/// Applies a partial update; fields left out keep their current value.
pub struct UpdateCalendarEventTool {
    calendar: Arc<dyn CalendarService>,
    offset: FixedOffset,
}

impl UpdateCalendarEventTool {
    pub fn new(calendar: Arc<dyn CalendarService>, offset: FixedOffset) -> Self {
        Self { calendar, offset }
    }
}

#[async_trait]
impl Tool for UpdateCalendarEventTool {
    fn name(&self) -> &'static str {
        "update_calendar_event"
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let input: UpdateEventInput = serde_json::from_value(input)
            .context("update_calendar_event expects an event_id and the fields to change")?;
        if input.is_empty() {
            bail!("nothing to update for event `{}`", input.event_id);
        }

        let Some(mut event) = self.calendar.get(&input.event_id).await? else {
            bail!("event `{}` not found", input.event_id);
        };
        if let Some(title) = input.title {
            if title.trim().is_empty() {
                bail!("event title must not be empty");
            }
            event.title = title;
        }
        if let Some(start_time) = &input.start_time {
            event.start = parse_event_time(start_time, self.offset)?;
        }
        if let Some(end_time) = &input.end_time {
            event.end = parse_event_time(end_time, self.offset)?;
        }
        if event.end < event.start {
            bail!("event end `{}` is before its start `{}`", event.end, event.start);
        }
        if let Some(location) = input.location {
            event.location = non_empty(location);
        }
        if let Some(description) = input.description {
            event.description = non_empty(description);
        }

        let updated = self.calendar.update(event).await.context("failed to update event")?;
        info!(
            event_name = "tool.calendar.event_updated",
            event_id = %updated.id,
            "calendar event updated"
        );

        Ok(json!({
            "status": "updated",
            "event": updated,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct DeleteEventInput {
    event_id: String,
}

pub struct DeleteCalendarEventTool {
    calendar: Arc<dyn CalendarService>,
}

impl DeleteCalendarEventTool {
    pub fn new(calendar: Arc<dyn CalendarService>) -> Self {
        Self { calendar }
    }
}

#[async_trait]
impl Tool for DeleteCalendarEventTool {
    fn name(&self) -> &'static str {
        "delete_calendar_event"
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let input: DeleteEventInput =
            serde_json::from_value(input).context("delete_calendar_event expects an event_id")?;

        let Some(deleted) =
            self.calendar.delete(&input.event_id).await.context("failed to delete event")?
        else {
            bail!("event `{}` not found", input.event_id);
        };
        info!(
            event_name = "tool.calendar.event_deleted",
            event_id = %deleted.id,
            "calendar event deleted"
        );

        Ok(json!({
            "status": "deleted",
            "event_id": deleted.id,
            "title": deleted.title,
        }))
    }
}

/// `hour` 24 is midnight at the end of `date`.
fn local_time(date: NaiveDate, hour: u32, offset: FixedOffset) -> Result<DateTime<FixedOffset>> {
    let (day, hour) = match hour {
        24 => (date.succ_opt().ok_or_else(|| anyhow!("{date} has no following day"))?, 0),
        hour => (date, hour),
    };
    let time = NaiveTime::from_hms_opt(hour, 0, 0)
        .ok_or_else(|| anyhow!("working hour `{hour}` is out of range"))?;
    day.and_time(time)
        .and_local_timezone(offset)
        .single()
        .ok_or_else(|| anyhow!("local time {date} {hour}:00 is ambiguous"))
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
