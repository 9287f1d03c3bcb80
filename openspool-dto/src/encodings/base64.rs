use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::ops::Deref;

/// Raw record payload, carried in JSON as unpadded standard base64.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Base64Bytes(Vec<u8>);

#[cfg(feature = "schema")]
impl schemars::JsonSchema for Base64Bytes {
    fn schema_name() -> String {
        // Exclude the module path to make the name in generated schemas clearer.
        "Base64Bytes".to_owned()
    }

    fn json_schema(_gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        schemars::schema::Schema::Object(schemars::schema_for_value!("eyJ9").schema)
    }
}

impl Base64Bytes {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Base64Bytes {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for Base64Bytes {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl Serialize for Base64Bytes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&general_purpose::STANDARD_NO_PAD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Base64Bytes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        // Accept padded input from other writers.
        general_purpose::STANDARD_NO_PAD
            .decode(encoded.trim_end_matches('='))
            .map(Base64Bytes)
            .map_err(serde::de::Error::custom)
    }
}

impl Deref for Base64Bytes {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
