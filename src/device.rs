//! Device records and parsing of vendor-shaped raw entries.
//!
//! The console exposes devices as a `deviceList` array plus a `points`
//! array of coordinates. The two are correlated positionally: the Nth
//! entry's coordinates are the Nth point, not matched by any id. That
//! coupling is preserved here; entries are never filtered before pairing.

use serde::Deserialize;
use tracing::warn;

use crate::geo;

/// One tracked device, produced fresh on every successful fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub device_model: String,
    pub location_name: String,
    /// Vendor-supplied relative-time label, e.g. "5分钟前".
    pub last_seen: Option<String>,
    pub is_online: bool,
    /// 0..=100; absent data defaults to 0.
    pub battery_level: u8,
    /// WGS-84. Both present or both absent, never one without the other.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// A raw device entry as the console's application state shapes it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawDeviceEntry {
    pub device_name: Option<String>,
    /// Point-of-interest label, "place · relative-time".
    pub poi: Option<String>,
    /// Older state revisions carry the label under this name.
    pub simple_poi: Option<String>,
    pub poi_time: Option<String>,
    pub online_status: Option<i64>,
    pub location_status: Option<String>,
    /// Raw "lat,lng" string, present on some revisions.
    pub coordinate: Option<String>,
    /// Trailing-`%` string, e.g. "85%".
    pub battery: Option<String>,
}

/// A GCJ-02 point, positionally aligned with its device entry.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RawPoint {
    pub lat: f64,
    pub lng: f64,
}

/// The device list and its parallel points array, read in one atomic
/// evaluation from the page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSnapshot {
    pub device_list: Vec<RawDeviceEntry>,
    pub points: Vec<RawPoint>,
}

/// Middle-dot separators the console uses in poi labels.
const POI_SEPARATORS: &[char] = &['·', '・'];

/// Split a poi label into location name and relative-time label.
///
/// `"人民广场 · 5分钟前"` splits on the middle dot; a label with no
/// separator is entirely the location name.
pub fn split_poi(text: &str) -> (String, Option<String>) {
    let trimmed = text.trim();
    if let Some(idx) = trimmed.find(POI_SEPARATORS) {
        let (place, rest) = trimmed.split_at(idx);
        let time = rest
            .trim_start_matches(POI_SEPARATORS)
            .trim();
        let place = place.trim();
        if !time.is_empty() {
            return (place.to_string(), Some(time.to_string()));
        }
        return (place.to_string(), None);
    }
    (trimmed.to_string(), None)
}

/// Parse a trailing-`%` battery string, clamped to 0..=100.
pub fn parse_battery(raw: &str) -> Option<u8> {
    let digits = raw.trim().trim_end_matches('%').trim();
    digits.parse::<u32>().ok().map(|v| v.min(100) as u8)
}

/// Parse a raw `"lat,lng"` string into a GCJ-02 pair.
pub fn parse_coordinate_pair(raw: &str) -> Option<(f64, f64)> {
    let (lat, lng) = raw.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lng: f64 = lng.trim().parse().ok()?;
    if lat.is_finite() && lng.is_finite() {
        Some((lat, lng))
    } else {
        None
    }
}

impl RawDeviceEntry {
    /// Whether any of the available online signals report the device as
    /// online. Signals are OR'd, never cross-validated.
    pub fn is_online(&self) -> bool {
        self.online_status == Some(1) || self.location_status.as_deref() == Some("online")
    }

    /// Build the final record, pairing with the positionally-aligned point.
    pub fn to_record(&self, point: Option<&RawPoint>) -> DeviceRecord {
        let device_model = self
            .device_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or("Unknown Device")
            .to_string();

        let poi = self.poi.as_deref().or(self.simple_poi.as_deref());
        let (location_name, poi_time) = match poi {
            Some(text) => split_poi(text),
            None => (String::new(), None),
        };
        let last_seen = poi_time.or_else(|| {
            self.poi_time
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        });

        let is_online = self.is_online();

        let battery_level = match self.battery.as_deref().and_then(parse_battery) {
            Some(level) => level,
            None => {
                // Offline devices legitimately stop reporting battery;
                // a silent 0 on an online device is worth flagging.
                if is_online {
                    warn!(device = %device_model, "online device reports no battery info, defaulting to 0");
                }
                0
            }
        };

        let gcj = point
            .map(|p| (p.lat, p.lng))
            .filter(|(lat, lng)| lat.is_finite() && lng.is_finite())
            .or_else(|| self.coordinate.as_deref().and_then(parse_coordinate_pair));

        let (latitude, longitude) = match gcj {
            Some((lat, lng)) => {
                let (wgs_lat, wgs_lng) = geo::gcj_to_wgs(lat, lng);
                (Some(wgs_lat), Some(wgs_lng))
            }
            None => {
                warn!(device = %device_model, "no usable coordinates on entry");
                (None, None)
            }
        };

        DeviceRecord {
            device_model,
            location_name,
            last_seen,
            is_online,
            battery_level,
            latitude,
            longitude,
        }
    }
}

/// Parse a whole snapshot into device records, preserving the positional
/// entry-to-point pairing.
pub fn parse_snapshot(snapshot: &RawSnapshot) -> Vec<DeviceRecord> {
    snapshot
        .device_list
        .iter()
        .enumerate()
        .map(|(idx, entry)| entry.to_record(snapshot.points.get(idx)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poi_splits_on_middle_dot() {
        assert_eq!(
            split_poi("人民广场 · 5分钟前"),
            ("人民广场".to_string(), Some("5分钟前".to_string()))
        );
    }

    #[test]
    fn poi_without_separator_is_all_location() {
        assert_eq!(split_poi("家"), ("家".to_string(), None));
    }

    #[test]
    fn poi_tolerates_fullwidth_dot_and_tight_spacing() {
        assert_eq!(
            split_poi("公司・刚刚"),
            ("公司".to_string(), Some("刚刚".to_string()))
        );
        assert_eq!(
            split_poi("Home · now"),
            ("Home".to_string(), Some("now".to_string()))
        );
    }

    #[test]
    fn battery_parses_percent_suffix() {
        assert_eq!(parse_battery("85%"), Some(85));
        assert_eq!(parse_battery(" 100% "), Some(100));
        assert_eq!(parse_battery("140%"), Some(100));
        assert_eq!(parse_battery("n/a"), None);
    }

    #[test]
    fn aligned_entry_produces_full_record() {
        let snapshot: RawSnapshot = serde_json::from_str(
            r#"{
                "deviceList": [{"deviceName": "A", "onlineStatus": 1, "poi": "Home · now"}],
                "points": [{"lat": 31.2, "lng": 121.4}]
            }"#,
        )
        .unwrap();

        let records = parse_snapshot(&snapshot);
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.device_model, "A");
        assert!(rec.is_online);
        assert_eq!(rec.location_name, "Home");
        assert_eq!(rec.last_seen.as_deref(), Some("now"));
        assert!(rec.latitude.is_some() && rec.longitude.is_some());
        // GCJ-02 input must have been corrected, not passed through.
        assert!((rec.latitude.unwrap() - 31.2).abs() > 1e-4);
    }

    #[test]
    fn missing_battery_defaults_to_zero() {
        let entry = RawDeviceEntry {
            device_name: Some("A".into()),
            online_status: Some(1),
            ..Default::default()
        };
        assert_eq!(entry.to_record(None).battery_level, 0);
    }

    #[test]
    fn online_status_signals_are_ored() {
        let numeric = RawDeviceEntry {
            online_status: Some(1),
            ..Default::default()
        };
        let textual = RawDeviceEntry {
            location_status: Some("online".into()),
            ..Default::default()
        };
        let neither = RawDeviceEntry {
            online_status: Some(0),
            location_status: Some("offline".into()),
            ..Default::default()
        };
        assert!(numeric.is_online());
        assert!(textual.is_online());
        assert!(!neither.is_online());
    }

    #[test]
    fn missing_point_falls_back_to_coordinate_string() {
        let entry = RawDeviceEntry {
            device_name: Some("B".into()),
            coordinate: Some("39.9042, 116.4074".into()),
            ..Default::default()
        };
        let rec = entry.to_record(None);
        assert!(rec.latitude.is_some() && rec.longitude.is_some());

        let garbled = RawDeviceEntry {
            coordinate: Some("not-a-pair".into()),
            ..Default::default()
        };
        let rec = garbled.to_record(None);
        assert!(rec.latitude.is_none() && rec.longitude.is_none());
    }

    #[test]
    fn unnamed_entry_gets_placeholder_model() {
        let entry = RawDeviceEntry::default();
        assert_eq!(entry.to_record(None).device_model, "Unknown Device");
    }

    #[test]
    fn pairing_is_positional_even_with_short_points_array() {
        let snapshot: RawSnapshot = serde_json::from_str(
            r#"{
                "deviceList": [
                    {"deviceName": "first"},
                    {"deviceName": "second"}
                ],
                "points": [{"lat": 31.2, "lng": 121.4}]
            }"#,
        )
        .unwrap();
        let records = parse_snapshot(&snapshot);
        assert!(records[0].latitude.is_some());
        assert!(records[1].latitude.is_none());
    }

    #[test]
    fn poi_time_field_backfills_last_seen() {
        let entry = RawDeviceEntry {
            device_name: Some("C".into()),
            simple_poi: Some("家".into()),
            poi_time: Some("1小时前".into()),
            ..Default::default()
        };
        let rec = entry.to_record(None);
        assert_eq!(rec.location_name, "家");
        assert_eq!(rec.last_seen.as_deref(), Some("1小时前"));
    }
}
