use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString};

pub const DEFAULT_BRAND: &str = "Generic";
pub const DEFAULT_MATERIAL: &str = "PLA";
pub const DEFAULT_COLOR_HEX: &str = "000000";
pub const DEFAULT_TEMP: &str = "200";

/// The protocol marker of a descriptor. There is only one.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(EnumString, Display)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub enum Protocol {
    #[default]
    #[serde(rename = "openspool")]
    #[strum(serialize = "openspool")]
    OpenSpool,
}

/// The descriptor format version.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(EnumString, Display)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub enum Version {
    #[default]
    #[serde(rename = "1.0")]
    #[strum(serialize = "1.0")]
    V1_0,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid color {0:?}: expected 6 hex digits without '#'")]
pub struct InvalidColorHex(pub String);

/// Exactly six hex digits, no leading `#`. Case is kept as given.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ColorHex(String);

impl ColorHex {
    /// Accepts only a bare 6 digit hex string.
    pub fn parse(value: &str) -> Result<Self, InvalidColorHex> {
        if is_hex_color(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(InvalidColorHex(value.to_string()))
        }
    }

    /// Black, used wherever a color is missing or malformed.
    pub fn black() -> Self {
        Self(DEFAULT_COLOR_HEX.to_string())
    }

    /// Strips one leading `#`, then falls back to black unless exactly 6 hex
    /// digits remain. Never pads or truncates.
    pub fn normalize(value: Option<&str>) -> Self {
        value
            .map(|v| v.strip_prefix('#').unwrap_or(v))
            .and_then(|v| Self::parse(v).ok())
            .unwrap_or_else(Self::black)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub(crate) fn is_hex_color(value: &str) -> bool {
    value.len() == 6 && hex::decode(value).is_ok()
}

impl fmt::Display for ColorHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ColorHex {
    type Error = InvalidColorHex;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if is_hex_color(&value) {
            Ok(Self(value))
        } else {
            Err(InvalidColorHex(value))
        }
    }
}

impl From<ColorHex> for String {
    fn from(value: ColorHex) -> Self {
        value.0
    }
}

#[cfg(feature = "schema")]
impl schemars::JsonSchema for ColorHex {
    fn schema_name() -> String {
        "ColorHex".to_owned()
    }

    fn json_schema(_gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        use schemars::schema::{InstanceType, SchemaObject, StringValidation};

        SchemaObject {
            instance_type: Some(InstanceType::String.into()),
            string: Some(Box::new(StringValidation {
                max_length: Some(6),
                min_length: Some(6),
                pattern: Some("^[0-9A-Fa-f]{6}$".to_owned()),
            })),
            ..Default::default()
        }
        .into()
    }
}

/// The OpenSpool record stored on a tag.
///
/// Built fresh from a spool snapshot when writing, or from validated tag data
/// when reading. Temperatures are decimal digit strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct TagDescriptor {
    pub protocol: Protocol,
    pub version: Version,
    pub brand: String,
    /// The material, e.g. "PLA".
    #[serde(rename = "type")]
    pub material: String,
    pub color_hex: ColorHex,
    pub min_temp: String,
    pub max_temp: String,
    /// The Spoolman spool this tag was written from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spool_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
}

impl TagDescriptor {
    /// Temperatures formatted for display, e.g. `220°C - 230°C`.
    pub fn temperature_range(&self) -> String {
        format!("{}°C - {}°C", self.min_temp, self.max_temp)
    }
}
