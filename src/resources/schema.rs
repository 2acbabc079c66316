//! Attribute declarations for resource types.

use serde::Serialize;
use serde_json::Value;

use super::PlanAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    String,
    Int,
    Bool,
    StringList,
    StringMap,
    /// Ordered list of `[key, value]` pairs.
    PairList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Required,
    Optional,
    /// Set by the server only.
    Computed,
    /// Set by the operator or, when left unset, by the server.
    OptionalComputed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub name: &'static str,
    pub kind: AttributeType,
    pub presence: Presence,
    pub description: &'static str,
    pub sensitive: bool,
    pub requires_replace: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl Attribute {
    fn new(name: &'static str, kind: AttributeType, presence: Presence) -> Self {
        Self {
            name,
            kind,
            presence,
            description: "",
            sensitive: false,
            requires_replace: false,
            default: None,
        }
    }

    pub fn required(name: &'static str, kind: AttributeType) -> Self {
        Self::new(name, kind, Presence::Required)
    }

    pub fn optional(name: &'static str, kind: AttributeType) -> Self {
        Self::new(name, kind, Presence::Optional)
    }

    pub fn computed(name: &'static str, kind: AttributeType) -> Self {
        Self::new(name, kind, Presence::Computed)
    }

    pub fn optional_computed(name: &'static str, kind: AttributeType) -> Self {
        Self::new(name, kind, Presence::OptionalComputed)
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn requires_replace(mut self) -> Self {
        self.requires_replace = true;
        self
    }

    /// Optional attribute with a default; the server may also report it.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        if self.presence == Presence::Optional {
            self.presence = Presence::OptionalComputed;
        }
        self
    }

    pub fn is_configurable(&self) -> bool {
        self.presence != Presence::Computed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    pub description: &'static str,
    pub attributes: Vec<Attribute>,
}

impl Schema {
    pub fn new(description: &'static str, attributes: Vec<Attribute>) -> Self {
        Self {
            description,
            attributes,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn sensitive_attributes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.attributes
            .iter()
            .filter(|a| a.sensitive)
            .map(|a| a.name)
    }

    /// Classifies a set of changed attributes.
    pub fn classify<'a>(&self, changed: impl IntoIterator<Item = &'a str>) -> PlanAction {
        let mut action = PlanAction::NoOp;
        for name in changed {
            match self.attribute(name) {
                Some(attr) if attr.requires_replace => return PlanAction::Replace,
                _ => action = PlanAction::Update,
            }
        }
        action
    }
}
