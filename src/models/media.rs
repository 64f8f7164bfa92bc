//! Records persisted on documents for assets held in object storage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Object-storage resource class. Deletion and URL generation need it
/// alongside the public id.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    #[default]
    Image,
    Raw,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Image => "image",
            ResourceType::Raw => "raw",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "image" => Some(ResourceType::Image),
            "raw" => Some(ResourceType::Raw),
            _ => None,
        }
    }

    /// Images go to the image pipeline, everything else is stored raw.
    pub fn for_mime(mime: &str) -> Self {
        if mime.starts_with("image/") {
            ResourceType::Image
        } else {
            ResourceType::Raw
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generic file attachment, e.g. on a contact message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub filename: String,
    pub url: String,
    pub public_id: String,
    pub size: u64,
    pub mime_type: String,
    #[serde(default)]
    pub resource_type: ResourceType,
}
