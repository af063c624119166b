use chrono::{NaiveDate, NaiveDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Timestamp,
    Station,
    Direction,
    MeanSpeed,
    Gust,
}

/// Map one header cell to a known column.
///
/// Exact names from the 10-minute wind feed are tried first, then loose
/// prefixes and substrings for files whose headers drifted.
pub fn classify_header(name: &str) -> Option<Column> {
    let name = name.trim_start_matches('\u{feff}').trim();
    match name {
        "Date time" => return Some(Column::Timestamp),
        "Automatic Weather Station" => return Some(Column::Station),
        "10-Minute Mean Wind Direction(Compass points)" => return Some(Column::Direction),
        "10-Minute Mean Speed(km/hour)" => return Some(Column::MeanSpeed),
        "10-Minute Maximum Gust(km/hour)" => return Some(Column::Gust),
        _ => {}
    }

    let lower = name.to_lowercase();
    if lower.starts_with("date") {
        Some(Column::Timestamp)
    } else if lower.starts_with("automatic") {
        Some(Column::Station)
    } else if lower.contains("mean wind direction") {
        Some(Column::Direction)
    } else if lower.contains("mean speed") {
        Some(Column::MeanSpeed)
    } else if lower.contains("maximum gust") {
        Some(Column::Gust)
    } else {
        None
    }
}

/// Field index of each known column; the first matching header wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnMap {
    pub timestamp: Option<usize>,
    pub station: Option<usize>,
    pub direction: Option<usize>,
    pub mean_speed: Option<usize>,
    pub gust: Option<usize>,
}

impl ColumnMap {
    pub fn from_headers<'a>(headers: impl IntoIterator<Item = &'a str>) -> Self {
        let mut map = ColumnMap::default();
        for (idx, name) in headers.into_iter().enumerate() {
            let slot = match classify_header(name) {
                Some(Column::Timestamp) => &mut map.timestamp,
                Some(Column::Station) => &mut map.station,
                Some(Column::Direction) => &mut map.direction,
                Some(Column::MeanSpeed) => &mut map.mean_speed,
                Some(Column::Gust) => &mut map.gust,
                None => continue,
            };
            slot.get_or_insert(idx);
        }
        map
    }
}

/// `YYYYMMDDHHMM`, e.g. `202507201340`.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.len() != 12 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let field = |range: std::ops::Range<usize>| raw[range].parse::<u32>().ok();
    let year = raw[0..4].parse::<i32>().ok()?;
    NaiveDate::from_ymd_opt(year, field(4..6)?, field(6..8)?)?.and_hms_opt(
        field(8..10)?,
        field(10..12)?,
        0,
    )
}

/// Numeric speed in km/h; anything unparseable is absent.
pub fn parse_speed(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_and_loose_headers() {
        let map = ColumnMap::from_headers([
            "\u{feff}Date time",
            "Automatic Weather Station",
            "10-Minute Mean Wind Direction(Compass points)",
            "10-Minute Mean Speed(km/hour)",
            "10-Minute Maximum Gust(km/hour)",
        ]);
        assert_eq!(map.timestamp, Some(0));
        assert_eq!(map.gust, Some(4));

        let map = ColumnMap::from_headers([
            "Gust note",
            "automatic station",
            "DATE",
            "Mean speed (km/h)",
        ]);
        assert_eq!(map.timestamp, Some(2));
        assert_eq!(map.station, Some(1));
        assert_eq!(map.mean_speed, Some(3));
        assert_eq!(map.gust, None);
        assert_eq!(map.direction, None);
    }

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp("202507201340").unwrap();
        assert_eq!(ts.format("%Y-%m-%d %H:%M").to_string(), "2025-07-20 13:40");
        assert!(parse_timestamp("2025-07-20 13:40").is_none());
        assert!(parse_timestamp("202513201340").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_parse_speed() {
        assert_eq!(parse_speed(" 63 "), Some(63.0));
        assert_eq!(parse_speed("N/A"), None);
        assert_eq!(parse_speed(""), None);
    }
}
