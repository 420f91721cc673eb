//! Tick sources for the engine loop
//!
//! The engine never sleeps on its own: it asks a `Ticker` for the next tick.
//! `IntervalTicker` follows wall-clock time, `ManualTicker` is driven by
//! hand so tests can inject synthetic ticks. `TradingWindow` decides which
//! ticks fall inside exchange hours.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// One scheduling event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub seq: u64,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait Ticker: Send {
    /// Next tick, or `None` when the source is exhausted.
    async fn next_tick(&mut self) -> Option<Tick>;
}

/// Fixed-interval ticks. Missed ticks are skipped, never bunched.
pub struct IntervalTicker {
    interval: Interval,
    seq: u64,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval, seq: 0 }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn next_tick(&mut self) -> Option<Tick> {
        self.interval.tick().await;
        self.seq += 1;
        Some(Tick {
            seq: self.seq,
            at: Utc::now(),
        })
    }
}

/// Ticks pushed through a channel
pub struct ManualTicker {
    rx: mpsc::UnboundedReceiver<DateTime<Utc>>,
    seq: u64,
}

/// Handle used to fire synthetic ticks
#[derive(Clone)]
pub struct TickHandle {
    tx: mpsc::UnboundedSender<DateTime<Utc>>,
}

impl TickHandle {
    /// Fire a tick stamped now. Returns false once the ticker is gone.
    pub fn tick(&self) -> bool {
        self.tx.send(Utc::now()).is_ok()
    }

    /// Fire a tick with an explicit timestamp (e.g., to step past a dedup window).
    pub fn tick_at(&self, at: DateTime<Utc>) -> bool {
        self.tx.send(at).is_ok()
    }
}

impl ManualTicker {
    pub fn new() -> (Self, TickHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx, seq: 0 }, TickHandle { tx })
    }
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn next_tick(&mut self) -> Option<Tick> {
        let at = self.rx.recv().await?;
        self.seq += 1;
        Some(Tick { seq: self.seq, at })
    }
}

/// Exchange session in local exchange time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingWindow {
    /// Session open, e.g. "09:15:00"
    pub open: NaiveTime,
    /// Session close, e.g. "15:30:00"
    pub close: NaiveTime,
    /// IANA zone the times are expressed in
    pub timezone: Tz,
    #[serde(default = "default_weekdays_only")]
    pub weekdays_only: bool,
    /// Exchange holidays, "YYYY-MM-DD"
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
}

fn default_weekdays_only() -> bool {
    true
}

/// Why a tick is or is not tradable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Open,
    PreOpen,
    Closed,
    Weekend,
    Holiday,
}

impl SessionStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, SessionStatus::Open)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Open => "open",
            SessionStatus::PreOpen => "pre-open",
            SessionStatus::Closed => "closed",
            SessionStatus::Weekend => "weekend",
            SessionStatus::Holiday => "holiday",
        };
        write!(f, "{}", s)
    }
}

impl TradingWindow {
    /// NSE cash session: 09:15 to 15:30 IST, Monday to Friday.
    pub fn nse() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(9, 15, 0).unwrap_or_default(),
            close: NaiveTime::from_hms_opt(15, 30, 0).unwrap_or_default(),
            timezone: chrono_tz::Asia::Kolkata,
            weekdays_only: true,
            holidays: Vec::new(),
        }
    }

    /// Session state at `at`. Open and close are both inclusive.
    pub fn status(&self, at: DateTime<Utc>) -> SessionStatus {
        let local = at.with_timezone(&self.timezone);
        if self.holidays.contains(&local.date_naive()) {
            return SessionStatus::Holiday;
        }
        if self.weekdays_only && matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return SessionStatus::Weekend;
        }
        let time = local.time();
        if time < self.open {
            SessionStatus::PreOpen
        } else if time > self.close {
            SessionStatus::Closed
        } else {
            SessionStatus::Open
        }
    }

    pub fn is_open(&self, at: DateTime<Utc>) -> bool {
        self.status(at).is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn nse_session_in_ist() {
        let window = TradingWindow::nse();
        // Monday 2025-06-02; IST is UTC+05:30
        assert_eq!(window.status(utc(2025, 6, 2, 3, 30)), SessionStatus::PreOpen);
        assert_eq!(window.status(utc(2025, 6, 2, 3, 45)), SessionStatus::Open);
        assert_eq!(window.status(utc(2025, 6, 2, 10, 0)), SessionStatus::Open);
        assert_eq!(window.status(utc(2025, 6, 2, 10, 1)), SessionStatus::Closed);
        // Saturday
        assert_eq!(window.status(utc(2025, 6, 7, 5, 0)), SessionStatus::Weekend);
    }

    #[test]
    fn holidays_close_the_session() {
        let mut window = TradingWindow::nse();
        window.holidays.push(NaiveDate::from_ymd_opt(2025, 8, 15).unwrap());
        assert_eq!(window.status(utc(2025, 8, 15, 5, 0)), SessionStatus::Holiday);
        assert!(window.is_open(utc(2025, 8, 14, 5, 0)));
    }

    #[test]
    fn window_parses_from_toml_strings() {
        let window: TradingWindow = serde_json::from_str(
            r#"{"open":"09:15:00","close":"15:30:00","timezone":"Asia/Kolkata","holidays":["2025-10-02"]}"#,
        )
        .unwrap();
        assert!(window.weekdays_only);
        assert_eq!(window.timezone, chrono_tz::Asia::Kolkata);
        assert_eq!(window.holidays.len(), 1);
    }

    #[tokio::test]
    async fn manual_ticker_ends_when_handles_drop() {
        let (mut ticker, handle) = ManualTicker::new();
        assert!(handle.tick());
        assert!(handle.tick());
        drop(handle);

        assert_eq!(ticker.next_tick().await.map(|t| t.seq), Some(1));
        assert_eq!(ticker.next_tick().await.map(|t| t.seq), Some(2));
        assert!(ticker.next_tick().await.is_none());
    }

    #[tokio::test]
    async fn interval_ticker_counts() {
        let mut ticker = IntervalTicker::new(Duration::from_millis(5));
        let first = ticker.next_tick().await.unwrap();
        let second = ticker.next_tick().await.unwrap();
        assert_eq!((first.seq, second.seq), (1, 2));
    }
}
