use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{Application, ApplicationStatus, LocationType, Platform};

// Everything here is a pure function of the current list. Nothing is cached,
// so the numbers can never drift from the records they describe.

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationStats {
    pub total: usize,
    pub by_status: BTreeMap<ApplicationStatus, usize>,
    pub this_month: usize,
    pub last_month: usize,
    /// Percentage of applications that got any answer; 0 with no applications.
    pub response_rate: f64,
}

impl ApplicationStats {
    pub fn count(&self, status: ApplicationStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformStats {
    pub platform: Platform,
    pub count: usize,
    pub interviews: usize,
    pub effectiveness: f64,
}

pub fn compute_stats(applications: &[Application], today: NaiveDate) -> ApplicationStats {
    let mut by_status: BTreeMap<ApplicationStatus, usize> =
        ApplicationStatus::ALL.iter().map(|s| (*s, 0)).collect();
    for app in applications {
        *by_status.entry(app.status).or_insert(0) += 1;
    }

    let current = (today.year(), today.month());
    let previous = previous_month(today);
    let in_month = |(year, month): (i32, u32)| {
        applications
            .iter()
            .filter(|a| a.application_date.year() == year && a.application_date.month() == month)
            .count()
    };

    let total = applications.len();
    let responded = applications.iter().filter(|a| a.status.is_response()).count();

    ApplicationStats {
        total,
        by_status,
        this_month: in_month(current),
        last_month: in_month(previous),
        response_rate: percentage(responded, total),
    }
}

fn previous_month(today: NaiveDate) -> (i32, u32) {
    if today.month() == 1 {
        (today.year() - 1, 12)
    } else {
        (today.year(), today.month() - 1)
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Distinct company names, case-sensitive, sorted.
pub fn company_names(applications: &[Application]) -> Vec<String> {
    applications
        .iter()
        .map(|a| a.company_name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn by_status(applications: &[Application], status: ApplicationStatus) -> Vec<&Application> {
    applications.iter().filter(|a| a.status == status).collect()
}

/// Per observed platform, busiest first. Platforms with equal counts keep the
/// order in which they first appear in the list.
pub fn platform_stats(applications: &[Application]) -> Vec<PlatformStats> {
    let mut stats: Vec<PlatformStats> = Vec::new();
    for app in applications {
        let found = stats.iter().position(|s| s.platform == app.platform);
        let idx = match found {
            Some(idx) => idx,
            None => {
                stats.push(PlatformStats {
                    platform: app.platform,
                    count: 0,
                    interviews: 0,
                    effectiveness: 0.0,
                });
                stats.len() - 1
            }
        };
        let entry = &mut stats[idx];
        entry.count += 1;
        if app.status.is_interview() {
            entry.interviews += 1;
        }
    }

    for entry in &mut stats {
        entry.effectiveness = percentage(entry.interviews, entry.count);
    }
    stats.sort_by(|a, b| b.count.cmp(&a.count));
    stats
}

/// Conjunctive list filter. Unset criteria match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationFilter {
    /// Case-insensitive substring of company name or position title
    pub search: Option<String>,
    pub status: Option<ApplicationStatus>,
    pub platform: Option<Platform>,
    pub location_type: Option<LocationType>,
}

impl ApplicationFilter {
    pub fn is_active(&self) -> bool {
        *self != Self::default()
    }

    pub fn matches(&self, app: &Application) -> bool {
        let matches_search = match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(query) => {
                let query = query.to_lowercase();
                app.company_name.to_lowercase().contains(&query)
                    || app.position_title.to_lowercase().contains(&query)
            }
        };

        matches_search
            && self.status.is_none_or(|s| app.status == s)
            && self.platform.is_none_or(|p| app.platform == p)
            && self.location_type.is_none_or(|l| app.location_type == Some(l))
    }

    pub fn apply<'a>(&self, applications: &'a [Application]) -> Vec<&'a Application> {
        applications.iter().filter(|a| self.matches(a)).collect()
    }
}
