use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WindowError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid signal times JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid timestamp '{0}', expected YYYY-MM-DD HH:MM")]
    Timestamp(String),
    #[error("Window ends before it starts: {start} > {end}")]
    Reversed {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    #[error(
        "Extreme window {extreme_start}..{extreme_end} is not inside severe window {severe_start}..{severe_end}"
    )]
    NotNested {
        severe_start: NaiveDateTime,
        severe_end: NaiveDateTime,
        extreme_start: NaiveDateTime,
        extreme_end: NaiveDateTime,
    },
    #[error("Extreme window given without a severe window")]
    ExtremeWithoutSevere,
    #[error("Window needs both start and end, got only {0}")]
    HalfOpen(&'static str),
}

/// Closed interval of snapshot timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Window {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, WindowError> {
        if start > end {
            return Err(WindowError::Reversed { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.start <= ts && ts <= self.end
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// Officially issued severe (e.g. T8) and extreme (e.g. T10) periods of one event.
///
/// Construction enforces nesting, so every value of this type is valid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SignalWindows {
    severe: Option<Window>,
    extreme: Option<Window>,
}

impl SignalWindows {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(severe: Option<Window>, extreme: Option<Window>) -> Result<Self, WindowError> {
        match (severe, extreme) {
            (None, Some(_)) => Err(WindowError::ExtremeWithoutSevere),
            (Some(s), Some(e)) if e.start < s.start || e.end > s.end => {
                Err(WindowError::NotNested {
                    severe_start: s.start,
                    severe_end: s.end,
                    extreme_start: e.start,
                    extreme_end: e.end,
                })
            }
            _ => Ok(Self { severe, extreme }),
        }
    }

    pub fn severe(&self) -> Option<&Window> {
        self.severe.as_ref()
    }

    pub fn extreme(&self) -> Option<&Window> {
        self.extreme.as_ref()
    }

    /// (in severe window, in extreme window) for one timestamp.
    pub fn tag(&self, ts: NaiveDateTime) -> (bool, bool) {
        (
            self.severe.is_some_and(|w| w.contains(ts)),
            self.extreme.is_some_and(|w| w.contains(ts)),
        )
    }
}

/// On-disk form of the signal times, as written by hand per event.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SignalTimes {
    pub signal8_start: Option<String>,
    pub signal8_end: Option<String>,
    pub signal10_start: Option<String>,
    pub signal10_end: Option<String>,
}

impl SignalTimes {
    pub fn from_file(path: &Path) -> Result<Self, WindowError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn into_windows(self) -> Result<SignalWindows, WindowError> {
        let severe = pair("signal8", self.signal8_start, self.signal8_end)?;
        let extreme = pair("signal10", self.signal10_start, self.signal10_end)?;
        SignalWindows::new(severe, extreme)
    }
}

fn pair(
    name: &'static str,
    start: Option<String>,
    end: Option<String>,
) -> Result<Option<Window>, WindowError> {
    match (start, end) {
        (None, None) => Ok(None),
        (Some(s), Some(e)) => {
            let window = Window::new(parse_signal_time(&s)?, parse_signal_time(&e)?)?;
            Ok(Some(window))
        }
        _ => Err(WindowError::HalfOpen(name)),
    }
}

/// Accepts `YYYY-MM-DD HH:MM` with optional seconds.
pub fn parse_signal_time(text: &str) -> Result<NaiveDateTime, WindowError> {
    let trimmed = text.trim();
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M"))
        .map_err(|_| WindowError::Timestamp(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        parse_signal_time(s).unwrap()
    }

    #[test]
    fn test_inclusive_membership() {
        let w = Window::new(ts("2025-07-20 00:20"), ts("2025-07-20 19:40")).unwrap();
        assert!(w.contains(ts("2025-07-20 00:20")));
        assert!(w.contains(ts("2025-07-20 19:40")));
        assert!(!w.contains(ts("2025-07-20 19:50")));
        assert_eq!(w.duration_minutes(), 1160);
    }

    #[test]
    fn test_nested_extreme_accepted() {
        let severe = Window::new(ts("2025-07-20 00:20"), ts("2025-07-20 19:40")).unwrap();
        let extreme = Window::new(ts("2025-07-20 09:20"), ts("2025-07-20 16:10")).unwrap();
        let windows = SignalWindows::new(Some(severe), Some(extreme)).unwrap();
        assert_eq!(windows.tag(ts("2025-07-20 10:00")), (true, true));
        assert_eq!(windows.tag(ts("2025-07-20 08:00")), (true, false));
        assert_eq!(windows.tag(ts("2025-07-19 08:00")), (false, false));
    }

    #[test]
    fn test_non_nested_rejected() {
        let severe = Window::new(ts("2025-07-20 00:20"), ts("2025-07-20 19:40")).unwrap();
        let extreme = Window::new(ts("2025-07-20 09:20"), ts("2025-07-20 20:10")).unwrap();
        assert!(matches!(
            SignalWindows::new(Some(severe), Some(extreme)),
            Err(WindowError::NotNested { .. })
        ));
        assert!(matches!(
            SignalWindows::new(None, Some(extreme)),
            Err(WindowError::ExtremeWithoutSevere)
        ));
    }

    #[test]
    fn test_reversed_window_rejected() {
        assert!(matches!(
            Window::new(ts("2025-07-20 10:00"), ts("2025-07-20 09:00")),
            Err(WindowError::Reversed { .. })
        ));
    }

    #[test]
    fn test_signal_times_json() {
        let json = r#"{"signal8_start": "2025-09-23 14:20", "signal8_end": "2025-09-24 20:20",
                       "signal10_start": "2025-09-24 02:40", "signal10_end": "2025-09-24 13:20"}"#;
        let times: SignalTimes = serde_json::from_str(json).unwrap();
        let windows = times.into_windows().unwrap();
        assert_eq!(windows.severe().unwrap().start, ts("2025-09-23 14:20"));
        assert_eq!(windows.extreme().unwrap().end, ts("2025-09-24 13:20"));

        let half: SignalTimes =
            serde_json::from_str(r#"{"signal8_start": "2025-09-23 14:20"}"#).unwrap();
        assert!(matches!(half.into_windows(), Err(WindowError::HalfOpen("signal8"))));
    }

    #[test]
    fn test_parse_with_seconds() {
        assert_eq!(ts("2023-07-17 07:10:00"), ts("2023-07-17 07:10"));
        assert!(parse_signal_time("17/07/2023").is_err());
    }
}
