use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The field name bulk actions conventionally mutate.
pub const CIRCLE_FIELD: &str = "circle";

/// Relationship-closeness bucket assigned to a contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Circle {
    Inner,
    Close,
    Active,
    Casual,
}

impl Circle {
    /// The wire name used in field values and API payloads
    pub fn as_str(self) -> &'static str {
        match self {
            Circle::Inner => "inner",
            Circle::Close => "close",
            Circle::Active => "active",
            Circle::Casual => "casual",
        }
    }

    /// Parse a wire name into a circle
    pub fn parse(s: &str) -> Option<Circle> {
        match s {
            "inner" => Some(Circle::Inner),
            "close" => Some(Circle::Close),
            "active" => Some(Circle::Active),
            "casual" => Some(Circle::Casual),
            _ => None,
        }
    }
}

/// A contact as the UI layer sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub name: String,
    /// Circle assignment, the conventional bulk-action target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circle: Option<Circle>,
    /// Any other fields the UI tracks (cadence, notes, tags)
    #[serde(default, flatten)]
    pub fields: IndexMap<String, Value>,
}

impl Contact {
    /// Create a contact with no circle assignment and no extra fields
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Contact {
            id: id.into(),
            name: name.into(),
            circle: None,
            fields: IndexMap::new(),
        }
    }

    /// Create a contact already assigned to a circle
    pub fn with_circle(id: impl Into<String>, name: impl Into<String>, circle: Circle) -> Self {
        let mut contact = Contact::new(id, name);
        contact.circle = Some(circle);
        contact
    }

    /// Read a field by name. `"circle"` resolves to the typed field,
    /// anything else to the open map. Absent fields are `None`.
    pub fn field(&self, name: &str) -> Option<Value> {
        if name == CIRCLE_FIELD {
            self.circle.map(|c| Value::String(c.as_str().to_string()))
        } else {
            self.fields.get(name).cloned()
        }
    }

    /// Write a field by name. An unrecognized circle name or JSON null
    /// clears the circle; null removes an open-map field.
    pub fn set_field(&mut self, name: &str, value: Value) {
        if name == CIRCLE_FIELD {
            self.circle = value.as_str().and_then(Circle::parse);
        } else if value.is_null() {
            self.fields.shift_remove(name);
        } else {
            self.fields.insert(name.to_string(), value);
        }
    }
}
