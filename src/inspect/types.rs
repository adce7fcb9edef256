use serde::Serialize;
use std::fmt;

/// Where an inspected member came from
///
/// The declaration order is the report's sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Own,
    ArrayElement,
    Inherited,
    Circular,
    Diagnostic,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Own => "own",
            Origin::ArrayElement => "element",
            Origin::Inherited => "inherited",
            Origin::Circular => "circular",
            Origin::Diagnostic => "diagnostic",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyEntry {
    /// Dotted path from the subject, e.g. `b.length` or `b[0]`
    pub name: String,
    pub declared_type: String,
    pub rendered_value: String,
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodEntry {
    pub name: String,
    /// Parameter names read from the declaration text
    pub params: Vec<String>,
    pub is_async: bool,
    pub origin: Origin,
}

/// Structural report for one inspected value; built fresh per call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectionReport {
    pub subject_label: String,
    pub type_name: String,
    /// Set only for scalars and callables
    pub scalar_value: Option<String>,
    pub properties: Vec<PropertyEntry>,
    pub methods: Vec<MethodEntry>,
    pub property_count: usize,
    pub method_count: usize,
    /// Some depth, member or element bound cut the walk short
    pub truncated: bool,
}

impl InspectionReport {
    pub fn new(subject_label: &str, type_name: impl Into<String>) -> Self {
        Self {
            subject_label: subject_label.to_string(),
            type_name: type_name.into(),
            scalar_value: None,
            properties: Vec::new(),
            methods: Vec::new(),
            property_count: 0,
            method_count: 0,
            truncated: false,
        }
    }

    pub fn property(&self, name: &str) -> Option<&PropertyEntry> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn count_origin(&self, origin: Origin) -> usize {
        self.properties.iter().filter(|p| p.origin == origin).count()
    }
}
