//! Models: read-only views of device, hub and rule capability attributes.
//!
//! A [`Model`] is addressed (`DRIV:dev:<uuid>`, `SERV:rule:<id>`, …) and holds
//! namespaced attributes (`smoke:smoke`, `base:caps`, …). A [`ModelSnapshot`]
//! is every model of one place at a point in time; the alarm core only reads it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::PlaceId;

/// Attribute holding the model's own address.
pub const ATTR_ADDRESS: &str = "base:address";
/// Attribute listing the capability namespaces a model supports.
pub const ATTR_CAPS: &str = "base:caps";

/// Address of a model.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A single typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<AttributeValue>),
    Json(serde_json::Value),
}

impl AttributeValue {
    /// Numeric view used by ordering comparisons.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::String(value) => value.trim().parse().ok(),
            _ => None,
        }
    }

    /// Textual view used by string comparisons; `None` for lists and objects.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Bool(value) => Some(value.to_string()),
            Self::Int(value) => Some(value.to_string()),
            Self::Float(value) => Some(value.to_string()),
            Self::String(value) => Some(value.clone()),
            Self::List(_) | Self::Json(_) => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Capability attributes of one addressable thing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ModelRecord", into = "ModelRecord")]
pub struct Model {
    address: Address,
    attributes: BTreeMap<String, AttributeValue>,
}

impl Model {
    /// Create an empty model; `base:address` is always populated.
    #[must_use]
    pub fn new(address: impl Into<Address>) -> Self {
        let address = address.into();
        let mut attributes = BTreeMap::new();
        attributes.insert(
            ATTR_ADDRESS.to_string(),
            AttributeValue::String(address.to_string()),
        );
        Self {
            address,
            attributes,
        }
    }

    /// Set `base:caps` to the given capability namespaces.
    #[must_use]
    pub fn with_capabilities<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let caps = caps
            .into_iter()
            .map(|cap| AttributeValue::String(cap.into()))
            .collect();
        self.attributes
            .insert(ATTR_CAPS.to_string(), AttributeValue::List(caps));
        self
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        let name = name.into();
        if name == ATTR_ADDRESS {
            return;
        }
        self.attributes.insert(name, value.into());
    }

    #[must_use]
    pub fn address(&self) -> &Address {
        &self.address
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    #[must_use]
    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    /// Capability namespaces listed in `base:caps`.
    pub fn capabilities(&self) -> impl Iterator<Item = &str> {
        let caps: &[AttributeValue] = match self.attributes.get(ATTR_CAPS) {
            Some(AttributeValue::List(items)) => items.as_slice(),
            _ => &[],
        };
        caps.iter().filter_map(|cap| match cap {
            AttributeValue::String(name) => Some(name.as_str()),
            _ => None,
        })
    }

    #[must_use]
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities().any(|cap| cap == capability)
    }
}

#[derive(Serialize, Deserialize)]
struct ModelRecord {
    address: Address,
    #[serde(default)]
    attributes: BTreeMap<String, AttributeValue>,
}

impl TryFrom<ModelRecord> for Model {
    type Error = ValidationError;

    fn try_from(record: ModelRecord) -> Result<Self, Self::Error> {
        if record.address.as_str().trim().is_empty() {
            return Err(ValidationError::EmptyAddress);
        }
        let mut model = Self::new(record.address);
        for (name, value) in record.attributes {
            model.set(name, value);
        }
        Ok(model)
    }
}

impl From<Model> for ModelRecord {
    fn from(model: Model) -> Self {
        let mut attributes = model.attributes;
        attributes.remove(ATTR_ADDRESS);
        Self {
            address: model.address,
            attributes,
        }
    }
}

/// Every model of one place, keyed by address. Never mutated by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SnapshotRecord", into = "SnapshotRecord")]
pub struct ModelSnapshot {
    place_id: PlaceId,
    models: BTreeMap<Address, Model>,
}

impl ModelSnapshot {
    #[must_use]
    pub fn new(place_id: PlaceId, models: impl IntoIterator<Item = Model>) -> Self {
        let models = models
            .into_iter()
            .map(|model| (model.address().clone(), model))
            .collect();
        Self { place_id, models }
    }

    #[must_use]
    pub fn place_id(&self) -> PlaceId {
        self.place_id
    }

    #[must_use]
    pub fn get(&self, address: &Address) -> Option<&Model> {
        self.models.get(address)
    }

    pub fn models(&self) -> impl Iterator<Item = &Model> {
        self.models.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[derive(Serialize, Deserialize)]
struct SnapshotRecord {
    place_id: PlaceId,
    #[serde(default)]
    models: Vec<Model>,
}

impl From<SnapshotRecord> for ModelSnapshot {
    fn from(record: SnapshotRecord) -> Self {
        Self::new(record.place_id, record.models)
    }
}

impl From<ModelSnapshot> for SnapshotRecord {
    fn from(snapshot: ModelSnapshot) -> Self {
        Self {
            place_id: snapshot.place_id,
            models: snapshot.models.into_values().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_populate_base_address_when_created() {
        let model = Model::new("DRIV:dev:1");
        assert_eq!(
            model.get(ATTR_ADDRESS),
            Some(&AttributeValue::String("DRIV:dev:1".to_string()))
        );
    }

    #[test]
    fn should_ignore_attempts_to_overwrite_address() {
        let model = Model::new("DRIV:dev:1").with(ATTR_ADDRESS, "DRIV:dev:2");
        assert_eq!(model.address().as_str(), "DRIV:dev:1");
        assert_eq!(
            model.get(ATTR_ADDRESS),
            Some(&AttributeValue::String("DRIV:dev:1".to_string()))
        );
    }

    #[test]
    fn should_list_capabilities_from_base_caps() {
        let model = Model::new("DRIV:dev:1").with_capabilities(["base", "smoke"]);
        assert!(model.has_capability("smoke"));
        assert!(!model.has_capability("co"));
        assert_eq!(model.capabilities().count(), 2);
    }

    #[test]
    fn should_report_no_capabilities_when_caps_missing() {
        let model = Model::new("DRIV:dev:1");
        assert_eq!(model.capabilities().count(), 0);
    }

    #[test]
    fn should_deserialize_model_from_json() {
        let json = r#"{
            "address": "DRIV:dev:1",
            "attributes": {"base:caps": ["smoke"], "smoke:smoke": "DETECTED", "devpow:battery": 87}
        }"#;
        let model: Model = serde_json::from_str(json).unwrap();
        assert!(model.has_capability("smoke"));
        assert_eq!(model.get("devpow:battery"), Some(&AttributeValue::Int(87)));
        assert!(model.get(ATTR_ADDRESS).is_some());
    }

    #[test]
    fn should_reject_model_with_empty_address() {
        let json = r#"{"address": " ", "attributes": {}}"#;
        let result: Result<Model, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn should_index_snapshot_by_address() {
        let place = PlaceId::new();
        let snapshot = ModelSnapshot::new(
            place,
            [Model::new("DRIV:dev:1"), Model::new("DRIV:dev:2")],
        );
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.place_id(), place);
        assert!(snapshot.get(&Address::from("DRIV:dev:2")).is_some());
        assert!(snapshot.get(&Address::from("DRIV:dev:3")).is_none());
    }

    #[test]
    fn should_roundtrip_snapshot_through_json() {
        let snapshot = ModelSnapshot::new(
            PlaceId::new(),
            [Model::new("DRIV:dev:1").with("co:co", "SAFE")],
        );
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: ModelSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn should_view_numeric_strings_as_numbers() {
        assert_eq!(AttributeValue::from("21.5").as_f64(), Some(21.5));
        assert_eq!(AttributeValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(AttributeValue::Bool(true).as_f64(), None);
    }
}
