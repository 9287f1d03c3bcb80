use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Color shown for filaments without a color.
pub const FALLBACK_DISPLAY_COLOR: &str = "#cccccc";

/// A filament manufacturer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct Vendor {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered: Option<String>,
    /// Required by Spoolman for display, but tolerated missing here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// A filament profile. A spool embeds its filament by value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct Filament {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<Vendor>,
    /// Free text material label, e.g. "PLA" or "PETG".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Density in g/cm³.
    #[serde(default)]
    pub density: f64,
    /// Diameter in mm.
    #[serde(default)]
    pub diameter: f64,
    /// Net weight of a full spool, in grams.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spool_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Extruder temperature in °C. Spoolman stores a single value, not a range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_extruder_temp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_bed_temp: Option<f64>,
    /// Hex color, with or without a leading `#`. Not validated by Spoolman.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_hex: Option<String>,
}

impl Filament {
    pub fn vendor_name(&self) -> Option<&str> {
        self.vendor.as_ref().and_then(|v| v.name.as_deref())
    }

    /// A CSS color for this filament.
    pub fn display_color(&self) -> String {
        match self.color_hex.as_deref() {
            Some(hex) if !hex.is_empty() => format!("#{}", hex.trim_start_matches('#')),
            _ => FALLBACK_DISPLAY_COLOR.to_string(),
        }
    }
}

/// One physical reel of filament.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct Spool {
    /// The Spoolman identifier. This is the key written on tags.
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<String>,
    pub filament: Filament,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spool_weight: Option<f64>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Spool {
    /// The most recent activity on this spool: last use, else registration.
    /// `None` (missing or unparsable) orders before any timestamp.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_used
            .as_deref()
            .or(self.registered.as_deref())
            .and_then(parse_timestamp)
    }

    /// Case-insensitive search over filament name, vendor name and material.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        let filament = &self.filament;

        [
            filament.name.as_deref(),
            filament.vendor_name(),
            filament.material.as_deref(),
        ]
        .into_iter()
        .any(|field| field.unwrap_or("").to_lowercase().contains(&query))
    }

    /// Remaining weight as a rounded percentage of the initial weight.
    pub fn remaining_percentage(&self) -> Option<i64> {
        match (self.remaining_weight, self.initial_weight) {
            (Some(remaining), Some(initial)) if initial != 0.0 => {
                Some((remaining / initial * 100.0).round() as i64)
            }
            _ => None,
        }
    }
}

/// Keep non-archived spools, most recently active first.
pub fn active_by_recency(spools: Vec<Spool>) -> Vec<Spool> {
    let mut active: Vec<Spool> = spools.into_iter().filter(|s| !s.archived).collect();
    active.sort_by_key(|s| std::cmp::Reverse(s.last_activity()));
    active
}

/// Spoolman emits RFC 3339, but older versions drop the offset. Those are UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn spool(id: i64, last_used: Option<&str>, registered: Option<&str>) -> Spool {
        Spool {
            id,
            registered: registered.map(String::from),
            last_used: last_used.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn deserializes_spoolman_payload() {
        let spool: Spool = serde_json::from_value(serde_json::json!({
            "id": 7,
            "registered": "2023-01-01T00:00:00Z",
            "filament": {
                "id": 3,
                "registered": "2023-01-01T00:00:00Z",
                "name": "Matte Black",
                "vendor": { "id": 1, "registered": "2023-01-01T00:00:00Z", "name": "Prusament" },
                "material": "PETG",
                "density": 1.27,
                "diameter": 1.75,
                "settings_extruder_temp": 240,
                "color_hex": "000000",
                "extra": { "ignored": true }
            },
            "remaining_weight": 512.5,
            "initial_weight": 1000,
            "archived": false,
            "location": "shelf"
        }))
        .unwrap();

        assert_eq!(spool.id, 7);
        assert_eq!(spool.filament.vendor_name(), Some("Prusament"));
        assert_eq!(spool.filament.settings_extruder_temp, Some(240.0));
        assert_eq!(spool.remaining_percentage(), Some(51));
    }

    #[test]
    fn accepts_ids_beyond_32_bits() {
        let spool: Spool = serde_json::from_value(serde_json::json!({
            "id": 3_000_000_000_i64,
            "filament": { "id": 4_000_000_000_i64 }
        }))
        .unwrap();

        assert_eq!(spool.id, 3_000_000_000);
        assert_eq!(spool.filament.id, 4_000_000_000);
        assert_eq!(crate::mapper::map_spool(&spool).spool_id, Some(3_000_000_000));
    }

    #[test]
    fn archived_defaults_to_false() {
        let spool: Spool =
            serde_json::from_value(serde_json::json!({ "id": 1, "filament": { "id": 1 } })).unwrap();
        assert!(!spool.archived);
    }

    #[test]
    fn active_by_recency_drops_archived_and_sorts() {
        let mut archived = spool(1, Some("2024-06-01T00:00:00Z"), None);
        archived.archived = true;

        let spools = vec![
            spool(2, None, Some("2023-01-01T00:00:00Z")),
            archived,
            spool(3, Some("2024-03-01T10:00:00Z"), Some("2022-01-01T00:00:00Z")),
            spool(4, None, None),
            spool(5, None, Some("2023-05-01T00:00:00")),
        ];

        let ids: Vec<i64> = active_by_recency(spools).iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![3, 5, 2, 4]);
    }

    #[rstest]
    #[case("", true)]
    #[case("bambu", true)]
    #[case("GALAXY", true)]
    #[case("petg", true)]
    #[case("prusa", false)]
    fn search_matches_name_vendor_and_material(#[case] query: &str, #[case] expected: bool) {
        let spool = Spool {
            id: 1,
            filament: Filament {
                id: 1,
                name: Some("Galaxy Black".to_string()),
                vendor: Some(Vendor {
                    id: 1,
                    registered: None,
                    name: Some("Bambu Lab".to_string()),
                    comment: None,
                }),
                material: Some("PETG".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        assert_eq!(spool.matches(query), expected);
    }

    #[rstest]
    #[case(Some(250.0), Some(1000.0), Some(25))]
    #[case(Some(0.0), Some(1000.0), Some(0))]
    #[case(Some(250.0), Some(0.0), None)]
    #[case(None, Some(1000.0), None)]
    #[case(Some(250.0), None, None)]
    fn remaining_percentage(
        #[case] remaining: Option<f64>,
        #[case] initial: Option<f64>,
        #[case] expected: Option<i64>,
    ) {
        let spool = Spool {
            remaining_weight: remaining,
            initial_weight: initial,
            ..Default::default()
        };
        assert_eq!(spool.remaining_percentage(), expected);
    }

    #[test]
    fn display_color_falls_back() {
        let mut filament = Filament::default();
        assert_eq!(filament.display_color(), FALLBACK_DISPLAY_COLOR);

        filament.color_hex = Some("#1a2B3c".to_string());
        assert_eq!(filament.display_color(), "#1a2B3c");
    }
}
