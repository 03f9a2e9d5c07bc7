//! End-to-end usage monitor scenarios with simulated collaborators.
//!
//! | Scenario | Setup                                  | Expectation                          |
//! |----------|----------------------------------------|--------------------------------------|
//! | A        | limit 30 min, app.x in front           | blocks at exactly 30:00, not 29:59   |
//! | B        | same, tasks complete                   | never blocks                         |
//! | E        | reset mid-day                          | zero persisted and reported at once  |

use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use focusguard_core::events::EventRecorder;
use focusguard_core::settings::{DisciplineSettings, DistractingApps, Permissions};
use focusguard_core::sim::{SimAccounting, SimHost, SimSurface, SimWakeLock, SurfaceCall};
use focusguard_core::storage::{CounterStore, MonitorConfig, SqliteCounterStore};
use focusguard_core::usage::{MonitorParts, UsageEvent, UsageMonitor};
use focusguard_core::Event;
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

struct Harness {
    acct: SimAccounting,
    surface: SimSurface,
    wake: SimWakeLock,
    events: EventRecorder,
}

fn t0() -> DateTime<Local> {
    Local.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

fn secs(n: i64) -> chrono::Duration {
    chrono::Duration::seconds(n)
}

fn settings(tasks_complete: bool) -> DisciplineSettings {
    DisciplineSettings {
        active: true,
        block_on_limit: true,
        daily_limit: Duration::from_secs(30 * 60),
        distracting_apps: DistractingApps::new(["app.x"]),
        tasks_complete,
    }
}

fn monitor_with(store: Box<dyn CounterStore>, now: DateTime<Local>) -> (UsageMonitor, Harness) {
    let h = Harness {
        acct: SimAccounting::new(),
        surface: SimSurface::new(),
        wake: SimWakeLock::new(),
        events: EventRecorder::new(),
    };
    let monitor = UsageMonitor::new(
        MonitorConfig::default(),
        "Daily app limit reached!",
        settings(false),
        MonitorParts {
            source: Box::new(h.acct.clone()),
            store,
            wake_lock: Box::new(h.wake.clone()),
            host: Box::new(SimHost::new()),
            surface: Box::new(h.surface.clone()),
            sink: Box::new(h.events.clone()),
        },
        now,
    );
    (monitor, h)
}

fn is_blocking(event: Option<Event>) -> bool {
    match event {
        Some(Event::StatusSnapshot { is_blocking, .. }) => is_blocking,
        other => panic!("expected a status snapshot, got {other:?}"),
    }
}

fn cumulative_millis(event: Option<Event>) -> u64 {
    match event {
        Some(Event::StatusSnapshot { cumulative_millis, .. }) => cumulative_millis,
        other => panic!("expected a status snapshot, got {other:?}"),
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn scenario_a_blocks_exactly_at_the_limit() {
    let store = SqliteCounterStore::open_memory().unwrap();
    let (mut m, h) = monitor_with(Box::new(store), t0());
    h.acct.set_total("app.x", Duration::from_secs(29 * 60 + 59));
    h.acct.push_event(UsageEvent::foreground(t0() - secs(3), "app.x"));

    m.start(settings(false), Permissions::all(), t0());
    assert!(!is_blocking(h.events.last_status()));
    assert_eq!(h.surface.blocking_prompts(), 0);

    h.acct.set_total("app.x", Duration::from_secs(30 * 60));
    m.poll(t0() + secs(15));
    assert!(is_blocking(h.events.last_status()));
    assert_eq!(
        h.surface.calls(),
        vec![SurfaceCall::BlockingPrompt {
            message: "Daily app limit reached!".into()
        }]
    );
}

#[test]
fn scenario_a_non_distracting_foreground_is_not_blocked() {
    let store = SqliteCounterStore::open_memory().unwrap();
    let (mut m, h) = monitor_with(Box::new(store), t0());
    h.acct.set_total("app.x", Duration::from_secs(45 * 60));
    h.acct.push_event(UsageEvent::foreground(t0() - secs(3), "app.notes"));

    m.start(settings(false), Permissions::all(), t0());
    assert!(is_blocking(h.events.last_status()));
    assert_eq!(h.surface.blocking_prompts(), 0);
}

#[test]
fn scenario_b_tasks_complete_suppresses_blocking() {
    let store = SqliteCounterStore::open_memory().unwrap();
    let (mut m, h) = monitor_with(Box::new(store), t0());
    h.acct.set_total("app.x", Duration::from_secs(31 * 60));
    h.acct.push_event(UsageEvent::foreground(t0() - secs(3), "app.x"));

    m.start(settings(true), Permissions::all(), t0());
    m.poll(t0() + secs(15));
    assert!(!is_blocking(h.events.last_status()));
    assert_eq!(h.surface.blocking_prompts(), 0);
}

#[test]
fn scenario_e_reset_reports_zero_before_next_tick() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("focusguard.db");
    let store = SqliteCounterStore::open_at(&path).unwrap();
    let (mut m, h) = monitor_with(Box::new(store), t0());
    h.acct.set_total("app.x", Duration::from_secs(12 * 60));

    m.start(settings(false), Permissions::all(), t0());
    assert_eq!(cumulative_millis(h.events.last_status()), 12 * 60 * 1000);
    let next_due = m.next_due();

    m.reset_usage(t0() + secs(7));
    assert_eq!(cumulative_millis(h.events.last_status()), 0);
    assert_eq!(m.next_due(), next_due);
    assert!(h
        .events
        .events()
        .iter()
        .any(|e| matches!(e, Event::UsageReset { .. })));

    let reopened = SqliteCounterStore::open_at(&path).unwrap();
    let record = reopened.load_counter().unwrap().unwrap();
    assert_eq!(record.cumulative, Duration::ZERO);
    assert_eq!(record.date, t0().date_naive());
}

#[test]
fn counter_survives_restart_on_the_same_day() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("focusguard.db");
    {
        let store = SqliteCounterStore::open_at(&path).unwrap();
        let (mut m, h) = monitor_with(Box::new(store), t0());
        h.acct.set_total("app.x", Duration::from_secs(600));
        m.start(settings(false), Permissions::all(), t0());
        m.stop(t0() + secs(1));
    }
    let store = SqliteCounterStore::open_at(&path).unwrap();
    let (m, _h) = monitor_with(Box::new(store), t0() + secs(60));
    assert_eq!(m.state().cumulative, Duration::from_secs(600));
}

#[test]
fn empty_window_keeps_the_last_foreground_app() {
    let store = SqliteCounterStore::open_memory().unwrap();
    let (mut m, h) = monitor_with(Box::new(store), t0());
    h.acct.set_total("app.x", Duration::from_secs(30 * 60));
    h.acct.push_event(UsageEvent::foreground(t0() - secs(3), "app.x"));
    m.start(settings(false), Permissions::all(), t0());

    // No events in the next windows: app.x is still assumed in front.
    m.poll(t0() + secs(60));
    assert_eq!(
        m.state().current_foreground_app.as_ref().map(|a| a.as_str()),
        Some("app.x")
    );
    assert_eq!(h.surface.blocking_prompts(), 2);
}

#[test]
fn wake_lock_is_released_when_monitoring_stops() {
    let store = SqliteCounterStore::open_memory().unwrap();
    let (mut m, h) = monitor_with(Box::new(store), t0());
    m.start(settings(false), Permissions::all(), t0());
    assert!(h.wake.held());
    m.stop(t0() + secs(2));
    assert!(!h.wake.held());
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn counter_is_the_running_maximum(totals in prop::collection::vec(0u64..10_000, 1..20)) {
        let store = SqliteCounterStore::open_memory().unwrap();
        let (mut m, h) = monitor_with(Box::new(store), t0());
        h.acct.set_total("app.x", Duration::from_secs(totals[0]));
        m.start(settings(false), Permissions::all(), t0());

        let mut max = totals[0];
        for (i, total) in totals.iter().enumerate().skip(1) {
            h.acct.set_total("app.x", Duration::from_secs(*total));
            m.poll(t0() + secs(15 * i as i64));
            max = max.max(*total);
            prop_assert_eq!(m.state().cumulative, Duration::from_secs(max));
        }
    }
}
