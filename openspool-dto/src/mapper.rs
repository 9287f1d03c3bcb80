use crate::descriptor::{
    ColorHex, Protocol, TagDescriptor, Version, DEFAULT_BRAND, DEFAULT_MATERIAL, DEFAULT_TEMP,
};
use crate::spoolman::Spool;

/// Builds the descriptor for a spool. Never fails: missing or malformed
/// fields fall back to defaults.
///
/// Spoolman keeps a single extruder temperature, so `min_temp` and `max_temp`
/// always carry the same value.
pub fn map_spool(spool: &Spool) -> TagDescriptor {
    let filament = &spool.filament;
    let temp = format_temp(filament.settings_extruder_temp);

    TagDescriptor {
        protocol: Protocol::OpenSpool,
        version: Version::V1_0,
        brand: non_empty_or(filament.vendor_name(), DEFAULT_BRAND),
        material: non_empty_or(filament.material.as_deref(), DEFAULT_MATERIAL),
        color_hex: ColorHex::normalize(filament.color_hex.as_deref()),
        min_temp: temp.clone(),
        max_temp: temp,
        spool_id: Some(spool.id),
        subtype: None,
    }
}

impl From<&Spool> for TagDescriptor {
    fn from(spool: &Spool) -> Self {
        map_spool(spool)
    }
}

fn non_empty_or(value: Option<&str>, default: &str) -> String {
    match value {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}

/// Rounds half away from zero. Zero, negative, non-finite and out of range
/// values count as unset since they cannot be written as a bare digit string.
fn format_temp(temp: Option<f64>) -> String {
    match temp.map(f64::round) {
        Some(t) if t.is_finite() && t > 0.0 && t < u64::MAX as f64 => format!("{}", t as u64),
        _ => DEFAULT_TEMP.to_string(),
    }
}
