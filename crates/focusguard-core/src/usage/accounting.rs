use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Local};

use super::tracker::UsageEvent;
use crate::error::AccountingError;
use crate::settings::DistractingApps;

/// Platform usage accounting, queried synchronously once per tick.
pub trait UsageAccountingSource: Send {
    /// Foreground time per application id within `[start, end)`.
    fn query_aggregate_foreground_time(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> Result<HashMap<String, Duration>, AccountingError>;

    /// Foreground/background transitions within `[start, end)`, oldest first.
    fn query_foreground_events(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> Result<Vec<UsageEvent>, AccountingError>;
}

/// Total time attributed to distracting apps.
pub fn distracting_total(
    totals: &HashMap<String, Duration>,
    apps: &DistractingApps,
) -> Duration {
    totals
        .iter()
        .filter(|(app, _)| apps.contains(app))
        .map(|(_, time)| *time)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_only_distracting_apps_ignoring_case() {
        let totals = HashMap::from([
            ("Com.Instagram.Android".to_string(), Duration::from_secs(600)),
            ("app.x".to_string(), Duration::from_secs(120)),
            ("app.notes".to_string(), Duration::from_secs(9_000)),
        ]);
        let apps = DistractingApps::new(["com.instagram.android", "APP.X"]);
        assert_eq!(distracting_total(&totals, &apps), Duration::from_secs(720));
    }

    #[test]
    fn empty_set_sums_to_zero() {
        let totals = HashMap::from([("app.x".to_string(), Duration::from_secs(60))]);
        assert_eq!(
            distracting_total(&totals, &DistractingApps::default()),
            Duration::ZERO
        );
    }
}
