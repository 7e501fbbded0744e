//! Pivot per-metric daily series into one row per calendar day.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::debug;

use crate::adapters::MetricSeries;
use crate::domain::MetricDay;

/// Metrics requested from the performance API
pub const DAILY_METRICS: [&str; 9] = [
    "BUSINESS_IMPRESSIONS_DESKTOP_MAPS",
    "BUSINESS_IMPRESSIONS_DESKTOP_SEARCH",
    "BUSINESS_IMPRESSIONS_MOBILE_MAPS",
    "BUSINESS_IMPRESSIONS_MOBILE_SEARCH",
    "CALL_CLICKS",
    "WEBSITE_CLICKS",
    "BUSINESS_DIRECTION_REQUESTS",
    "BUSINESS_CONVERSATIONS",
    "BUSINESS_BOOKINGS",
];

/// Counter a metric contributes to; device variants share one counter
fn counter<'a>(day: &'a mut MetricDay, metric: &str) -> Option<&'a mut i64> {
    match metric {
        "BUSINESS_IMPRESSIONS_DESKTOP_MAPS" | "BUSINESS_IMPRESSIONS_MOBILE_MAPS" => {
            Some(&mut day.maps_impressions)
        }
        "BUSINESS_IMPRESSIONS_DESKTOP_SEARCH" | "BUSINESS_IMPRESSIONS_MOBILE_SEARCH" => {
            Some(&mut day.search_impressions)
        }
        "CALL_CLICKS" => Some(&mut day.call_clicks),
        "WEBSITE_CLICKS" => Some(&mut day.website_clicks),
        "BUSINESS_DIRECTION_REQUESTS" => Some(&mut day.direction_requests),
        "BUSINESS_CONVERSATIONS" => Some(&mut day.conversations),
        "BUSINESS_BOOKINGS" => Some(&mut day.bookings),
        _ => None,
    }
}

/// One `MetricDay` per date present in any series, ordered by date
pub fn pivot(location_id: &str, series: &[MetricSeries]) -> Vec<MetricDay> {
    let mut days: BTreeMap<NaiveDate, MetricDay> = BTreeMap::new();

    for s in series {
        for &(date, value) in &s.points {
            let day = days
                .entry(date)
                .or_insert_with(|| MetricDay::empty(location_id, date));
            match counter(day, &s.metric) {
                Some(slot) => *slot += value,
                None => debug!(metric = %s.metric, "Ignoring unmapped metric"),
            }
        }
    }

    days.into_values().collect()
}
