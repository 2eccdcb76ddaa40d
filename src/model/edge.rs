use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct EdgeModel {
    pub source: String,
    #[serde(default)]
    pub source_port: u32,
    pub target: String,
}

impl EdgeModel {
    pub fn new(
        source: &str,
        source_port: u32,
        target: &str,
    ) -> Self {
        Self {
            source: source.to_string(),
            source_port,
            target: target.to_string(),
        }
    }
}
