//! Schedule fetch and candidate filtering.
//!
//! The vendor groups classes as `results[day] → dayParts[] → startTimes[] →
//! activities[]`. Each activity that passes the [`ScheduleFilter`] becomes one
//! [`Event`], timed by its start-time group's epoch-millisecond timestamp.

use async_trait::async_trait;
use autoreg_core::config::ScheduleConfig;
use autoreg_core::error::{AutoRegError, Result};
use autoreg_core::traits::ScheduleSource;
use autoreg_core::types::{Event, SessionTokens};
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, Utc};
use serde_json::Value;

use crate::client::{LifetimeClient, body_value, id_string};

const SCHEDULE_PATH: &str = "/ux/web-schedules/v2/schedules/classes";
const FACETS: &str = "tags:interest,tags:departmentDescription,tags:timeOfDay,tags:age,tags:skillLevel,tags:intensity,leader.name.displayname,location.name";

/// Name, day and price rules for candidate classes.
#[derive(Debug, Clone)]
pub struct ScheduleFilter {
    include: Vec<String>,
    exclude: Vec<String>,
    weekend_days: Vec<String>,
    weekday_day_parts: Vec<String>,
    exclude_paid: bool,
}

impl ScheduleFilter {
    pub fn from_config(config: &ScheduleConfig) -> Self {
        let lower = |v: &[String]| v.iter().map(|s| s.to_lowercase()).collect::<Vec<_>>();
        Self {
            include: lower(&config.include_terms),
            exclude: lower(&config.exclude_terms),
            weekend_days: lower(&config.weekend_days),
            weekday_day_parts: config.allowed_weekday_day_parts.clone(),
            exclude_paid: config.exclude_paid,
        }
    }

    /// Include terms match any (an empty list matches everything), exclude
    /// terms reject on any match. Weekend days allow every day part; other days
    /// only the listed ones. Paid classes are dropped when configured.
    pub fn accepts(&self, class_name: &str, day_of_week: &str, day_part: &str, is_paid: bool) -> bool {
        let name = class_name.to_lowercase();
        if !self.include.is_empty() && !self.include.iter().any(|t| name.contains(t.as_str())) {
            return false;
        }
        if self.exclude.iter().any(|t| name.contains(t.as_str())) {
            return false;
        }
        let weekend = self.weekend_days.contains(&day_of_week.to_lowercase());
        if !weekend && !self.weekday_day_parts.iter().any(|p| p == day_part) {
            return false;
        }
        !(self.exclude_paid && is_paid)
    }
}

/// Flatten and filter a schedule response body.
pub fn parse_schedule(body: &Value, filter: &ScheduleFilter) -> Vec<Event> {
    let Some(days) = body.get("results").and_then(|r| r.as_array()) else {
        tracing::warn!("⚠️ Schedule response has no results");
        return Vec::new();
    };

    let mut events = Vec::new();
    for day in days {
        let date = day.get("day").and_then(|d| d.as_str()).unwrap_or_default();
        let day_of_week = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map(|d| d.format("%A").to_string())
            .unwrap_or_else(|_| "N/A".into());

        for part in array(day, "dayParts") {
            let day_part = part.get("name").and_then(|n| n.as_str()).unwrap_or_default();
            for slot in array(part, "startTimes") {
                let label = slot.get("time").and_then(|t| t.as_str()).unwrap_or_default();
                let start = slot
                    .get("timestamp")
                    .and_then(|t| t.as_i64().or_else(|| t.as_str()?.trim().parse().ok()))
                    .and_then(DateTime::<Utc>::from_timestamp_millis);

                for activity in array(slot, "activities") {
                    let name = activity.get("name").and_then(|n| n.as_str()).unwrap_or_default();
                    let paid = activity
                        .get("isPaidClass")
                        .and_then(|p| p.as_bool())
                        .unwrap_or(false);
                    if !filter.accepts(name, &day_of_week, day_part, paid) {
                        continue;
                    }

                    let (Some(id), Some(start_time)) =
                        (activity.get("id").and_then(id_string), start)
                    else {
                        tracing::warn!("⚠️ Skipping '{name}' on {date}: missing id or start timestamp");
                        continue;
                    };

                    events.push(Event {
                        id,
                        class_name: name.to_string(),
                        start_time,
                        location: location_name(activity),
                        date: date.to_string(),
                        start_label: label.to_string(),
                        day_of_week: day_of_week.clone(),
                        day_part: day_part.to_string(),
                    });
                }
            }
        }
    }
    events
}

fn array<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// `location` is either a plain string or an object with a `name`.
fn location_name(activity: &Value) -> String {
    match activity.get("location") {
        Some(Value::String(s)) => s.clone(),
        Some(obj) => obj
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or_default()
            .to_string(),
        None => String::new(),
    }
}

/// `M/DD/YYYY`, the vendor's query date format.
pub fn query_date(date: NaiveDate) -> String {
    format!("{}/{:02}/{}", date.month(), date.day(), date.year())
}

/// Query parameters for a fetch starting on `today`.
pub fn query_params(config: &ScheduleConfig, today: NaiveDate) -> Vec<(&'static str, String)> {
    let start = today + Duration::days(config.days_from_now);
    let end = start + Duration::days((config.fetch_days - 1).max(0));

    let mut params = vec![("start", query_date(start)), ("end", query_date(end))];
    params.extend(config.tags.iter().map(|t| ("tags", t.clone())));
    params.push(("locations", config.location.clone()));
    params.push(("isFree", "false".into()));
    params.push(("facet", FACETS.into()));
    params.push(("page", "1".into()));
    params.push(("pageSize", config.page_size.to_string()));
    params
}

pub struct LifetimeSchedule {
    client: LifetimeClient,
    config: ScheduleConfig,
    filter: ScheduleFilter,
}

impl LifetimeSchedule {
    pub fn new(client: LifetimeClient, config: &ScheduleConfig) -> Self {
        Self {
            client,
            config: config.clone(),
            filter: ScheduleFilter::from_config(config),
        }
    }
}

#[async_trait]
impl ScheduleSource for LifetimeSchedule {
    async fn fetch(&self, tokens: &SessionTokens) -> Result<Vec<Event>> {
        let params = query_params(&self.config, Local::now().date_naive());
        tracing::info!(
            "📡 Fetching schedule {}..{} at {}",
            params[0].1,
            params[1].1,
            self.config.location
        );

        let req = self.client.get(SCHEDULE_PATH).query(&params);
        let resp = self
            .client
            .authed(req, tokens)
            .send()
            .await
            .map_err(|e| AutoRegError::Fetch(format!("schedule request failed: {e}")))?;

        let status = resp.status();
        let body = body_value(resp).await;
        if !status.is_success() {
            return Err(AutoRegError::Fetch(format!(
                "HTTP {status}: {}",
                body.map(|b| b.to_string()).unwrap_or_default()
            )));
        }
        let body = match body {
            Some(v @ Value::Object(_)) => v,
            _ => return Err(AutoRegError::Fetch("schedule response was not a JSON object".into())),
        };

        let events = parse_schedule(&body, &self.filter);
        tracing::info!("🔎 {} classes matched the filters", events.len());
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filter() -> ScheduleFilter {
        ScheduleFilter::from_config(&ScheduleConfig::default())
    }

    fn sample() -> Value {
        json!({
            "results": [
                {
                    "day": "2025-05-06",
                    "dayParts": [
                        {"name": "Morning", "startTimes": [{
                            "time": "9:00 AM", "timestamp": 1746543600000i64,
                            "activities": [{"id": "tue-am", "name": "Intermediate Open Play", "location": "Denver West"}]
                        }]},
                        {"name": "Evening", "startTimes": [{
                            "time": "6:30 PM", "timestamp": 1746577800000i64,
                            "activities": [
                                {"id": "tue-pm", "name": "Intermediate Open Play", "location": "Denver West", "isPaidClass": false},
                                {"id": "tue-adv", "name": "Advanced Intermediate Drills", "location": "Denver West"},
                                {"id": "tue-paid", "name": "Intermediate Clinic", "location": "Denver West", "isPaidClass": true}
                            ]
                        }]}
                    ]
                },
                {
                    "day": "2025-05-10",
                    "dayParts": [{"name": "Morning", "startTimes": [{
                        "time": "8:00 AM", "timestamp": "1746885600000",
                        "activities": [
                            {"id": 98765, "name": "INTERMEDIATE Open Play", "location": {"name": "Denver West"}},
                            {"name": "Intermediate Open Play"}
                        ]
                    }]}]
                }
            ]
        })
    }

    #[test]
    fn test_accepts_rules() {
        let f = filter();
        assert!(f.accepts("Intermediate Open Play", "Tuesday", "Evening", false));
        assert!(!f.accepts("Intermediate Open Play", "Tuesday", "Morning", false));
        assert!(f.accepts("Intermediate Open Play", "Saturday", "Morning", false));
        assert!(!f.accepts("Advanced Intermediate", "Saturday", "Morning", false));
        assert!(!f.accepts("Beginner Open Play", "Saturday", "Morning", false));
        assert!(!f.accepts("Intermediate Singles", "Sunday", "Evening", false));
        assert!(!f.accepts("Intermediate Open Play", "Sunday", "Evening", true));
    }

    #[test]
    fn test_empty_include_matches_everything() {
        let config = ScheduleConfig {
            include_terms: vec![],
            exclude_paid: false,
            ..ScheduleConfig::default()
        };
        let f = ScheduleFilter::from_config(&config);
        assert!(f.accepts("Beginner Open Play", "Saturday", "Morning", true));
    }

    #[test]
    fn test_unparseable_day_is_weekday() {
        let f = filter();
        assert!(!f.accepts("Intermediate Open Play", "N/A", "Morning", false));
        assert!(f.accepts("Intermediate Open Play", "N/A", "Evening", false));
    }

    #[test]
    fn test_parse_schedule_filters_and_flattens() {
        let events = parse_schedule(&sample(), &filter());
        let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["tue-pm", "98765"]);

        let tue = &events[0];
        assert_eq!(tue.day_of_week, "Tuesday");
        assert_eq!(tue.day_part, "Evening");
        assert_eq!(tue.start_label, "6:30 PM");
        assert_eq!(tue.start_time.timestamp_millis(), 1746577800000);
        assert_eq!(tue.when(), "2025-05-06 6:30 PM");

        let sat = &events[1];
        assert_eq!(sat.day_of_week, "Saturday");
        assert_eq!(sat.start_time.timestamp_millis(), 1746885600000);
        assert_eq!(sat.location, "Denver West");
    }

    #[test]
    fn test_parse_schedule_without_results() {
        assert!(parse_schedule(&json!({"message": "nope"}), &filter()).is_empty());
    }

    #[test]
    fn test_query_params() {
        let today = NaiveDate::from_ymd_opt(2025, 4, 28).unwrap();
        let params = query_params(&ScheduleConfig::default(), today);
        assert_eq!(params[0], ("start", "5/05/2025".to_string()));
        assert_eq!(params[1], ("end", "5/14/2025".to_string()));
        assert_eq!(params.iter().filter(|(k, _)| *k == "tags").count(), 2);
        assert!(params.contains(&("locations", "Denver West".to_string())));
        assert!(params.contains(&("pageSize", "750".to_string())));
    }
}
