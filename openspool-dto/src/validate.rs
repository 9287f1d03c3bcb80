use crate::descriptor::{ColorHex, Protocol, TagDescriptor, Version};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

/// Field name used for issues about the candidate as a whole.
pub const ROOT_FIELD: &str = "(root)";

const KNOWN_FIELDS: &[&str] = &[
    "protocol",
    "version",
    "brand",
    "type",
    "color_hex",
    "min_temp",
    "max_temp",
    "spool_id",
    "subtype",
];

/// The rule a field broke.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(EnumString, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    NotAnObject,
    Required,
    InvalidType,
    InvalidLiteral,
    TooShort,
    InvalidLength,
    InvalidFormat,
    OutOfRange,
    UnrecognizedKey,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub constraint: Constraint,
    pub message: String,
}

/// All the reasons a candidate was rejected. Never empty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("invalid tag descriptor: {}", summarize(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

fn summarize(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("{} ({}): {}", i.field, i.constraint, i.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    /// True when the data does not look like a descriptor at all, as opposed
    /// to a descriptor with bad fields.
    pub fn is_unrecognized(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.constraint == Constraint::NotAnObject || i.field == "protocol")
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.issues.iter().map(|i| i.field.as_str())
    }

    fn root(message: impl Into<String>) -> Self {
        Self {
            issues: vec![ValidationIssue {
                field: ROOT_FIELD.to_string(),
                constraint: Constraint::NotAnObject,
                message: message.into(),
            }],
        }
    }
}

/// Acceptance checks for descriptor data read back from a tag. Every field is
/// checked and every failure reported; the result is a complete
/// [`TagDescriptor`] or nothing. Unknown keys are ignored unless strict.
#[derive(Copy, Clone, Debug, Default)]
pub struct Validator {
    strict: bool,
}

impl Validator {
    pub fn permissive() -> Self {
        Self { strict: false }
    }

    pub fn strict() -> Self {
        Self { strict: true }
    }

    pub fn validate(&self, candidate: &Value) -> Result<TagDescriptor, ValidationError> {
        let Some(object) = candidate.as_object() else {
            return Err(ValidationError::root("Expected a JSON object"));
        };

        let mut checks = Checks {
            object,
            issues: Vec::new(),
        };

        checks.literal("protocol", &Protocol::OpenSpool.to_string());
        checks.literal("version", &Version::V1_0.to_string());
        let brand = checks.non_empty("brand", "Brand is required");
        let material = checks.non_empty("type", "Material type is required");
        let color_hex = checks.color("color_hex");
        let min_temp = checks.digits("min_temp", "Min temp must be a number string");
        let max_temp = checks.digits("max_temp", "Max temp must be a number string");
        let spool_id = checks.optional_id("spool_id");
        let subtype = checks.optional_string("subtype");

        if self.strict {
            checks.no_unknown_keys();
        }

        match (brand, material, color_hex, min_temp, max_temp) {
            (Some(brand), Some(material), Some(color_hex), Some(min_temp), Some(max_temp))
                if checks.issues.is_empty() =>
            {
                Ok(TagDescriptor {
                    protocol: Protocol::OpenSpool,
                    version: Version::V1_0,
                    brand,
                    material,
                    color_hex,
                    min_temp,
                    max_temp,
                    spool_id,
                    subtype,
                })
            }
            _ => Err(ValidationError {
                issues: checks.issues,
            }),
        }
    }

    /// Parses `text` as JSON, then validates it.
    pub fn validate_str(&self, text: &str) -> Result<TagDescriptor, ValidationError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ValidationError::root(format!("Not valid JSON: {e}")))?;
        self.validate(&value)
    }
}

/// Validates with the default, permissive, rules.
pub fn validate(candidate: &Value) -> Result<TagDescriptor, ValidationError> {
    Validator::permissive().validate(candidate)
}

pub fn validate_str(text: &str) -> Result<TagDescriptor, ValidationError> {
    Validator::permissive().validate_str(text)
}

struct Checks<'a> {
    object: &'a Map<String, Value>,
    issues: Vec<ValidationIssue>,
}

impl<'a> Checks<'a> {
    fn fail(&mut self, field: &str, constraint: Constraint, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            field: field.to_string(),
            constraint,
            message: message.into(),
        });
    }

    fn string(&mut self, field: &str) -> Option<&'a str> {
        let object = self.object;
        match object.get(field) {
            None => {
                self.fail(field, Constraint::Required, "Required");
                None
            }
            Some(Value::String(s)) => Some(s.as_str()),
            Some(other) => {
                self.fail(
                    field,
                    Constraint::InvalidType,
                    format!("Expected a string, received {}", type_name(other)),
                );
                None
            }
        }
    }

    fn literal(&mut self, field: &str, expected: &str) {
        if let Some(value) = self.string(field) {
            if value != expected {
                self.fail(
                    field,
                    Constraint::InvalidLiteral,
                    format!("Expected {expected:?}, received {value:?}"),
                );
            }
        }
    }

    fn non_empty(&mut self, field: &str, message: &str) -> Option<String> {
        let value = self.string(field)?;
        if value.is_empty() {
            self.fail(field, Constraint::TooShort, message);
            return None;
        }
        Some(value.to_string())
    }

    fn color(&mut self, field: &str) -> Option<ColorHex> {
        let value = self.string(field)?;
        if value.chars().count() != 6 {
            self.fail(
                field,
                Constraint::InvalidLength,
                "Color must be a 6-character hex code (without #)",
            );
            return None;
        }
        match ColorHex::parse(value) {
            Ok(color) => Some(color),
            Err(_) => {
                self.fail(field, Constraint::InvalidFormat, "Color must be a valid hex code");
                None
            }
        }
    }

    fn digits(&mut self, field: &str, message: &str) -> Option<String> {
        let value = self.string(field)?;
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            self.fail(field, Constraint::InvalidFormat, message);
            return None;
        }
        Some(value.to_string())
    }

    fn optional_id(&mut self, field: &str) -> Option<i64> {
        let object = self.object;
        let value = object.get(field)?;
        match value.as_i64() {
            Some(id) => Some(id),
            None if value.is_u64() => {
                self.fail(
                    field,
                    Constraint::OutOfRange,
                    format!("Spool id {value} does not fit in a signed 64-bit integer"),
                );
                None
            }
            None => {
                self.fail(
                    field,
                    Constraint::InvalidType,
                    format!("Expected an integer id, received {}", type_name(value)),
                );
                None
            }
        }
    }

    fn optional_string(&mut self, field: &str) -> Option<String> {
        let object = self.object;
        match object.get(field)? {
            Value::String(s) => Some(s.clone()),
            other => {
                self.fail(
                    field,
                    Constraint::InvalidType,
                    format!("Expected a string, received {}", type_name(other)),
                );
                None
            }
        }
    }

    fn no_unknown_keys(&mut self) {
        let unknown: Vec<String> = self
            .object
            .keys()
            .filter(|k| !KNOWN_FIELDS.contains(&k.as_str()))
            .cloned()
            .collect();

        for key in unknown {
            self.fail(&key, Constraint::UnrecognizedKey, "Unrecognized key");
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};
    use serde_json::json;

    #[fixture]
    fn payload() -> Value {
        json!({
            "protocol": "openspool",
            "version": "1.0",
            "brand": "Bambu Lab",
            "type": "PLA",
            "color_hex": "00FF00",
            "min_temp": "220",
            "max_temp": "230",
            "spool_id": 1,
        })
    }

    fn constraints(err: &ValidationError) -> Vec<(&str, Constraint)> {
        err.issues
            .iter()
            .map(|i| (i.field.as_str(), i.constraint))
            .collect()
    }

    #[rstest]
    fn accepts_well_formed_payload(payload: Value) {
        let descriptor = validate(&payload).unwrap();

        assert_eq!(descriptor.brand, "Bambu Lab");
        assert_eq!(descriptor.material, "PLA");
        assert_eq!(descriptor.color_hex.as_str(), "00FF00");
        assert_eq!(descriptor.min_temp, "220");
        assert_eq!(descriptor.max_temp, "230");
        assert_eq!(descriptor.spool_id, Some(1));
        assert_eq!(serde_json::to_value(&descriptor).unwrap(), payload);
    }

    #[rstest]
    fn accepts_missing_spool_id(mut payload: Value) {
        payload.as_object_mut().unwrap().remove("spool_id");
        assert_eq!(validate(&payload).unwrap().spool_id, None);
    }

    #[rstest]
    #[case(json!(0), 0)]
    #[case(json!(3_000_000_000_i64), 3_000_000_000)]
    #[case(json!(i64::MAX), i64::MAX)]
    fn accepts_any_signed_integer_spool_id(
        mut payload: Value,
        #[case] id: Value,
        #[case] expected: i64,
    ) {
        payload["spool_id"] = id;
        assert_eq!(validate(&payload).unwrap().spool_id, Some(expected));
    }

    #[rstest]
    fn oversized_spool_id_is_out_of_range(mut payload: Value) {
        payload["spool_id"] = json!(u64::MAX);
        let err = validate(&payload).unwrap_err();

        assert_eq!(constraints(&err), vec![("spool_id", Constraint::OutOfRange)]);
        assert!(!err.to_string().contains("received integer"));
    }

    #[rstest]
    fn rejects_missing_protocol(mut payload: Value) {
        payload.as_object_mut().unwrap().remove("protocol");
        let err = validate(&payload).unwrap_err();

        assert_eq!(constraints(&err), vec![("protocol", Constraint::Required)]);
        assert!(err.is_unrecognized());
    }

    #[rstest]
    #[case("protocol", json!("other"), Constraint::InvalidLiteral)]
    #[case("version", json!("2.0"), Constraint::InvalidLiteral)]
    #[case("version", json!(1.0), Constraint::InvalidType)]
    #[case("brand", json!(""), Constraint::TooShort)]
    #[case("type", json!(""), Constraint::TooShort)]
    #[case("type", json!(null), Constraint::InvalidType)]
    #[case("color_hex", json!("00FF0"), Constraint::InvalidLength)]
    #[case("color_hex", json!("#00FF00"), Constraint::InvalidLength)]
    #[case("color_hex", json!("00FFGG"), Constraint::InvalidFormat)]
    #[case("min_temp", json!("20a"), Constraint::InvalidFormat)]
    #[case("min_temp", json!("-20"), Constraint::InvalidFormat)]
    #[case("max_temp", json!(""), Constraint::InvalidFormat)]
    #[case("max_temp", json!(220), Constraint::InvalidType)]
    #[case("spool_id", json!("1"), Constraint::InvalidType)]
    #[case("spool_id", json!(1.5), Constraint::InvalidType)]
    #[case("spool_id", json!(null), Constraint::InvalidType)]
    #[case("spool_id", json!(u64::MAX), Constraint::OutOfRange)]
    #[case("subtype", json!(3), Constraint::InvalidType)]
    fn rejects_bad_field(
        mut payload: Value,
        #[case] field: &str,
        #[case] value: Value,
        #[case] constraint: Constraint,
    ) {
        payload[field] = value;
        let err = validate(&payload).unwrap_err();

        assert_eq!(constraints(&err), vec![(field, constraint)]);
    }

    #[test]
    fn reports_every_failing_field() {
        let err = validate(&json!({
            "protocol": "openspool",
            "version": "1.0",
            "brand": "",
            "color_hex": "red",
            "min_temp": "hot",
            "max_temp": "200",
        }))
        .unwrap_err();

        assert_eq!(
            constraints(&err),
            vec![
                ("brand", Constraint::TooShort),
                ("type", Constraint::Required),
                ("color_hex", Constraint::InvalidLength),
                ("min_temp", Constraint::InvalidFormat),
            ]
        );
        assert!(!err.is_unrecognized());
    }

    #[rstest]
    #[case(json!(null))]
    #[case(json!("openspool"))]
    #[case(json!([1, 2, 3]))]
    fn rejects_non_objects(#[case] candidate: Value) {
        let err = validate(&candidate).unwrap_err();

        assert_eq!(constraints(&err), vec![(ROOT_FIELD, Constraint::NotAnObject)]);
        assert!(err.is_unrecognized());
    }

    #[rstest]
    fn unknown_keys_depend_on_mode(mut payload: Value) {
        payload["color_name"] = json!("green");

        assert!(Validator::permissive().validate(&payload).is_ok());

        let err = Validator::strict().validate(&payload).unwrap_err();
        assert_eq!(constraints(&err), vec![("color_name", Constraint::UnrecognizedKey)]);
    }

    #[rstest]
    fn strict_accepts_subtype(mut payload: Value) {
        payload["subtype"] = json!("Silk");
        let descriptor = Validator::strict().validate(&payload).unwrap();
        assert_eq!(descriptor.subtype.as_deref(), Some("Silk"));
    }

    #[test]
    fn validate_str_reports_bad_json() {
        let err = validate_str("{\"protocol\": ").unwrap_err();

        assert_eq!(err.fields().collect::<Vec<_>>(), vec![ROOT_FIELD]);
        assert!(err.to_string().starts_with("invalid tag descriptor: (root) (not_an_object)"));
    }

    #[test]
    fn constraint_names_are_snake_case() {
        assert_eq!(Constraint::InvalidLiteral.to_string(), "invalid_literal");
        assert_eq!(
            serde_json::to_value(Constraint::UnrecognizedKey).unwrap(),
            json!("unrecognized_key")
        );
    }
}
