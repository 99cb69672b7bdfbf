//! Attribute catalog. The registry of worker attributes a rule may reference,
//! their value domains, and the operators each type admits.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::predicates::Operator;

/// Enumerated choice for attributes with a closed value domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Number,
    Date,
    Enum,
    Boolean,
    Array,
}

impl AttributeType {
    /// Whether `operator` is meaningful for values of this type.
    pub fn supports(&self, operator: &Operator) -> bool {
        use Operator::*;
        match operator {
            IsEmpty | IsNotEmpty => true,
            Equals | NotEquals => !matches!(self, AttributeType::Array),
            GreaterThan | GreaterThanOrEqual | LessThan | LessThanOrEqual | Between => {
                matches!(self, AttributeType::Number | AttributeType::Date)
            }
            In | NotIn => matches!(
                self,
                AttributeType::String | AttributeType::Enum | AttributeType::Array
            ),
            Contains | NotContains => {
                matches!(self, AttributeType::String | AttributeType::Array)
            }
            StartsWith | EndsWith => matches!(self, AttributeType::String),
            Unset | Unknown(_) => false,
        }
    }

    /// Valid operators for this type, in display order.
    pub fn operators(&self) -> Vec<Operator> {
        Operator::known()
            .into_iter()
            .filter(|op| self.supports(op))
            .collect()
    }

    pub fn default_operator(&self) -> Operator {
        match self {
            AttributeType::Array => Operator::Contains,
            _ => Operator::Equals,
        }
    }

    /// Starting value for a freshly selected operator, shaped the way the
    /// operator expects it.
    pub fn default_value(&self, operator: &Operator) -> serde_json::Value {
        use serde_json::Value;
        match operator {
            Operator::Between => Value::Array(vec![Value::Null, Value::Null]),
            Operator::In | Operator::NotIn => Value::Array(Vec::new()),
            Operator::Equals | Operator::NotEquals if *self == AttributeType::Boolean => {
                Value::Bool(true)
            }
            _ => Value::Null,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDefinition {
    pub key: String,
    pub label: String,
    pub category: String,
    pub attribute_type: AttributeType,
    #[serde(default)]
    pub options: Vec<AttributeOption>,
}

impl AttributeDefinition {
    pub fn new(
        key: impl Into<String>,
        label: impl Into<String>,
        category: impl Into<String>,
        attribute_type: AttributeType,
    ) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            category: category.into(),
            attribute_type,
            options: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: &[(&str, &str)]) -> Self {
        self.options = options
            .iter()
            .map(|(value, label)| AttributeOption {
                value: value.to_string(),
                label: label.to_string(),
            })
            .collect();
        self
    }
}

pub struct AttributeCatalog {
    definitions: Vec<AttributeDefinition>,
    index: HashMap<String, usize>,
}

static SHARED: OnceLock<AttributeCatalog> = OnceLock::new();

impl AttributeCatalog {
    pub fn from_definitions(definitions: Vec<AttributeDefinition>) -> Self {
        let index = definitions
            .iter()
            .enumerate()
            .map(|(i, def)| (def.key.clone(), i))
            .collect();
        Self { definitions, index }
    }

    /// Process-wide copy of [`AttributeCatalog::standard`], built on first use.
    pub fn shared() -> &'static AttributeCatalog {
        SHARED.get_or_init(AttributeCatalog::standard)
    }

    /// Built-in worker attribute catalog.
    pub fn standard() -> Self {
        use AttributeType::*;
        Self::from_definitions(vec![
            // Personal
            AttributeDefinition::new("personal.gender", "Gender", "personal", Enum).with_options(&[
                ("male", "Male"),
                ("female", "Female"),
                ("non_binary", "Non-binary"),
                ("prefer_not_to_say", "Prefer not to say"),
            ]),
            AttributeDefinition::new("personal.dateOfBirth", "Date of birth", "personal", Date),
            AttributeDefinition::new("personal.firstName", "First name", "personal", String),
            AttributeDefinition::new("personal.lastName", "Last name", "personal", String),
            // Employment
            AttributeDefinition::new(
                "employment.employmentStatus",
                "Employment status",
                "employment",
                Enum,
            )
            .with_options(&[
                ("active", "Active"),
                ("inactive", "Inactive"),
                ("on_leave", "On leave"),
                ("terminated", "Terminated"),
            ]),
            AttributeDefinition::new(
                "employment.employmentType",
                "Employment type",
                "employment",
                Enum,
            )
            .with_options(&[
                ("full_time", "Full-time"),
                ("part_time", "Part-time"),
                ("contractor", "Contractor"),
                ("temporary", "Temporary"),
            ]),
            AttributeDefinition::new("employment.department", "Department", "employment", String),
            AttributeDefinition::new("employment.jobTitle", "Job title", "employment", String),
            AttributeDefinition::new("employment.hireDate", "Hire date", "employment", Date),
            AttributeDefinition::new("employment.isManager", "Is manager", "employment", Boolean),
            // Location
            AttributeDefinition::new("location.country", "Country", "location", String),
            AttributeDefinition::new("location.region", "Region", "location", String),
            AttributeDefinition::new("location.city", "City", "location", String),
            AttributeDefinition::new("location.site", "Site", "location", String),
            // Contact
            AttributeDefinition::new(
                "contact.whatsappOptInStatus",
                "WhatsApp opt-in",
                "contact",
                Enum,
            )
            .with_options(&[
                ("opted_in", "Opted in"),
                ("opted_out", "Opted out"),
                ("pending", "Pending"),
            ]),
            AttributeDefinition::new(
                "contact.preferredChannel",
                "Preferred channel",
                "contact",
                Enum,
            )
            .with_options(&[
                ("whatsapp", "WhatsApp"),
                ("sms", "SMS"),
                ("email", "Email"),
            ]),
            AttributeDefinition::new(
                "contact.preferredLanguage",
                "Preferred language",
                "contact",
                String,
            ),
            AttributeDefinition::new("contact.phoneNumber", "Phone number", "contact", String),
            // Engagement
            AttributeDefinition::new(
                "engagement.engagementRate",
                "Engagement rate",
                "engagement",
                Number,
            ),
            AttributeDefinition::new(
                "engagement.responseRate",
                "Response rate",
                "engagement",
                Number,
            ),
            AttributeDefinition::new(
                "engagement.messagesReceived",
                "Messages received",
                "engagement",
                Number,
            ),
            AttributeDefinition::new(
                "engagement.lastActiveAt",
                "Last active",
                "engagement",
                Date,
            ),
            AttributeDefinition::new(
                "engagement.completedModules",
                "Completed modules",
                "engagement",
                Number,
            ),
            // Profile
            AttributeDefinition::new("profile.tags", "Tags", "profile", Array),
            AttributeDefinition::new("profile.skills", "Skills", "profile", Array),
        ])
    }

    pub fn get(&self, attribute: &str) -> Option<&AttributeDefinition> {
        self.index.get(attribute).map(|&i| &self.definitions[i])
    }

    pub fn definitions(&self) -> &[AttributeDefinition] {
        &self.definitions
    }

    pub fn attribute_type(&self, attribute: &str) -> Option<AttributeType> {
        self.get(attribute).map(|def| def.attribute_type)
    }

    /// Options for a closed-domain attribute; empty for open or unknown ones.
    pub fn options_for_attribute(&self, attribute: &str) -> &[AttributeOption] {
        self.get(attribute)
            .map(|def| def.options.as_slice())
            .unwrap_or(&[])
    }

    pub fn operators_for(&self, attribute: &str) -> Vec<Operator> {
        self.attribute_type(attribute)
            .map(|ty| ty.operators())
            .unwrap_or_default()
    }
}

impl Default for AttributeCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

/// Display label for `value`, or the raw value when no option matches.
pub fn label_for_value(options: &[AttributeOption], value: &str) -> String {
    options
        .iter()
        .find(|opt| opt.value == value)
        .map(|opt| opt.label.clone())
        .unwrap_or_else(|| value.to_string())
}
