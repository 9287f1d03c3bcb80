use crate::descriptor::TagDescriptor;
use crate::encodings::base64::Base64Bytes;
use crate::validate::{ValidationError, Validator};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

pub const MIME_RECORD: &str = "mime";
pub const TEXT_RECORD: &str = "text";
pub const JSON_MEDIA_TYPE: &str = "application/json";

pub const FOUND_MESSAGE: &str = "OpenSpool data found.";
pub const NOT_FOUND_MESSAGE: &str = "Tag read, but valid OpenSpool data was not found.";
pub const MALFORMED_MESSAGE: &str = "Tag read, but its OpenSpool data is malformed.";

/// One typed record on a tag. The descriptor travels as a `mime` record of
/// type `application/json`; framing for the physical tag is up to the device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct TagRecord {
    pub record_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default)]
    pub data: Base64Bytes,
}

impl TagRecord {
    /// A JSON record holding `value`.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            record_type: MIME_RECORD.to_string(),
            media_type: Some(JSON_MEDIA_TYPE.to_string()),
            encoding: None,
            data: serde_json::to_vec(value)?.into(),
        })
    }

    pub fn text(text: &str) -> Self {
        Self {
            record_type: TEXT_RECORD.to_string(),
            media_type: None,
            encoding: Some("utf-8".to_string()),
            data: text.as_bytes().into(),
        }
    }

    /// Decodes the payload as text. Only UTF-8 is supported; anything else
    /// is decoded lossily.
    pub fn decode_text(&self) -> String {
        match self.encoding.as_deref() {
            None => {}
            Some(enc) if enc.eq_ignore_ascii_case("utf-8") || enc.eq_ignore_ascii_case("utf8") => {}
            Some(enc) => warn!(encoding = enc, "unsupported text encoding, decoding as UTF-8"),
        }
        String::from_utf8_lossy(&self.data).into_owned()
    }

    /// Parses the payload as JSON, or `None` if it is not JSON.
    pub fn decode_json(&self) -> Option<Value> {
        match serde_json::from_slice(&self.data) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(%error, record_type = %self.record_type, "error parsing JSON record");
                None
            }
        }
    }
}

/// What a scan found on a tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    Found(TagDescriptor),
    /// No record held a valid descriptor. `last_error` is the first failure
    /// from a damaged descriptor if there was one, else the last failure, or
    /// `None` if no record held JSON at all.
    NotFound {
        last_error: Option<ValidationError>,
    },
}

impl ScanOutcome {
    pub fn descriptor(&self) -> Option<&TagDescriptor> {
        match self {
            ScanOutcome::Found(descriptor) => Some(descriptor),
            ScanOutcome::NotFound { .. } => None,
        }
    }

    /// A message suitable for the user, separating unrelated tags from
    /// damaged OpenSpool data.
    pub fn user_message(&self) -> &'static str {
        match self {
            ScanOutcome::Found(_) => FOUND_MESSAGE,
            ScanOutcome::NotFound {
                last_error: Some(e),
            } if !e.is_unrecognized() => MALFORMED_MESSAGE,
            ScanOutcome::NotFound { .. } => NOT_FOUND_MESSAGE,
        }
    }
}

/// Returns the first record holding a valid descriptor.
pub fn find_descriptor(records: &[TagRecord]) -> ScanOutcome {
    find_descriptor_with(records, &Validator::permissive())
}

pub fn find_descriptor_with(records: &[TagRecord], validator: &Validator) -> ScanOutcome {
    let mut last_error: Option<ValidationError> = None;

    for (index, record) in records.iter().enumerate() {
        let Some(json) = record.decode_json() else {
            continue;
        };

        match validator.validate(&json) {
            Ok(descriptor) => return ScanOutcome::Found(descriptor),
            Err(error) => {
                debug!(index, %error, "record is not a valid descriptor");
                // A damaged descriptor outranks any foreign JSON after it.
                let damaged = matches!(&last_error, Some(kept) if !kept.is_unrecognized());
                if !damaged {
                    last_error = Some(error);
                }
            }
        }
    }

    ScanOutcome::NotFound { last_error }
}
