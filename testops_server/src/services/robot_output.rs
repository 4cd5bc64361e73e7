//! Robot Framework `output.xml` summary extraction.
//!
//! Only two things are read: the `<statistics><total><stat>` counters and
//! the top-level suite timing. Anything unreadable yields zero counts and no
//! timing; a broken artifact never fails report recording.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use regex::Regex;

static TOTAL_STATS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<statistics>.*?<total>(.*?)</total>").unwrap());
static STAT_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<stat\b[^>]*>").unwrap());
static SUITE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<suite\b[^>]*>").unwrap());
static STATUS_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<status\b[^>]*>").unwrap());
static ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([\w:-]+)="([^"]*)""#).unwrap());

/// Robot Framework 6 and older.
const LEGACY_TIME_FORMAT: &str = "%Y%m%d %H:%M:%S%.f";
/// Robot Framework 7.
const ISO_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotSummary {
    pub passed: i32,
    pub failed: i32,
    pub skipped: i32,
    /// Agent-local suite start, stored as UTC.
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl RobotSummary {
    pub fn total(&self) -> i32 {
        self.passed
            .saturating_add(self.failed)
            .saturating_add(self.skipped)
    }

    /// Suite wall time; an end before the start counts as zero.
    pub fn duration_seconds(&self) -> Option<i64> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some((end - start).num_seconds().max(0)),
            _ => None,
        }
    }
}

pub fn parse_output_xml(xml: &str) -> RobotSummary {
    let (passed, failed, skipped) = total_counts(xml).unwrap_or_default();
    let (start, end) = suite_timing(xml).unwrap_or_default();
    let summary = RobotSummary {
        passed,
        failed,
        skipped,
        start,
        end,
    };
    if summary.total() == 0 && !xml.contains("<statistics>") {
        tracing::warn!("output.xml has no statistics section, recording zero tests");
    }
    summary
}

fn total_counts(xml: &str) -> Option<(i32, i32, i32)> {
    let total = TOTAL_STATS.captures(xml)?.get(1)?.as_str();
    let stat = attributes(STAT_TAG.find(total)?.as_str());
    let count = |name: &str| -> Option<i32> {
        match stat.get(name) {
            Some(value) => value.trim().parse::<i32>().ok().filter(|n| *n >= 0),
            None => Some(0),
        }
    };
    let (passed, failed, skipped) = (count("pass")?, count("fail")?, count("skip")?);
    passed
        .checked_add(failed)?
        .checked_add(skipped)
        .map(|_| (passed, failed, skipped))
}

fn suite_timing(xml: &str) -> Option<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
    if let Some(suite) = SUITE_TAG.find(xml) {
        let attrs = attributes(suite.as_str());
        if let (Some(start), Some(end)) = (attrs.get("starttime"), attrs.get("endtime")) {
            if let (Some(start), Some(end)) = (parse_legacy(start), parse_legacy(end)) {
                return Some((Some(start), Some(end)));
            }
        }
    }

    // The top suite's own <status> is the last one before its closing tag.
    let suite_end = xml.rfind("</suite>")?;
    let status = STATUS_TAG.find_iter(&xml[..suite_end]).last()?;
    let attrs = attributes(status.as_str());
    if let (Some(start), Some(end)) = (attrs.get("starttime"), attrs.get("endtime")) {
        return Some((parse_legacy(start), parse_legacy(end)));
    }
    let start = attrs
        .get("start")
        .and_then(|s| NaiveDateTime::parse_from_str(s, ISO_TIME_FORMAT).ok())
        .map(|naive| naive.and_utc())?;
    let end = attrs
        .get("elapsed")
        .and_then(|e| e.parse::<f64>().ok())
        .filter(|e| e.is_finite() && *e >= 0.0)
        .and_then(|e| Duration::try_milliseconds((e * 1000.0).round() as i64))
        .and_then(|elapsed| start.checked_add_signed(elapsed));
    Some((Some(start), end))
}

fn parse_legacy(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, LEGACY_TIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn attributes(tag: &str) -> HashMap<&str, &str> {
    ATTRIBUTE
        .captures_iter(tag)
        .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
        .collect()
}
