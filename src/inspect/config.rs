// Inspector bounds

use crate::settings::ToolsConfiguration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectOptions {
    /// Deepest member level reported; root members are level 1
    pub max_depth: usize,
    /// Own members scanned per node
    pub max_members: usize,
    /// Elements reported per sequence
    pub max_array_elements: usize,
    pub include_inherited: bool,
}

impl Default for InspectOptions {
    fn default() -> Self {
        Self::from(&ToolsConfiguration::default())
    }
}

impl From<&ToolsConfiguration> for InspectOptions {
    fn from(config: &ToolsConfiguration) -> Self {
        Self {
            max_depth: config.max_inspect_depth,
            max_members: config.max_inspect_members,
            max_array_elements: config.max_array_elements,
            include_inherited: config.include_inherited,
        }
    }
}
