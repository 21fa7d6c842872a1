use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Artifact category produced by one extractor capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Host,
    Network,
    Timeline,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Host, Category::Network, Category::Timeline];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Host => "host",
            Category::Network => "network",
            Category::Timeline => "timeline",
        }
    }

    /// Prefix used for server-assigned record ids
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Category::Host => "H",
            Category::Network => "N",
            Category::Timeline => "T",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
