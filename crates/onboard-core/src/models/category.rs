use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::AppError;

/// Kind of document a payload represents.
///
/// Routing (bucket group, branding eligibility) is a total function of the variant, so there is no
/// runtime prefix matching and no "unknown category" path once a value exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentCategory {
    #[serde(rename = "CARD_FRONT")]
    CardFront,
    #[serde(rename = "CARD_BACK")]
    CardBack,
    #[serde(rename = "SIGNATURE")]
    Signature,
    #[serde(rename = "ID_PAGE_1")]
    IdPage1,
    #[serde(rename = "ID_PAGE_2")]
    IdPage2,
    #[serde(rename = "ID_PAGE_3")]
    IdPage3,
    #[serde(rename = "ID_PAGE_4")]
    IdPage4,
    #[serde(rename = "PHOTO")]
    Photo,
    #[serde(rename = "VIDEO")]
    Video,
}

/// Logical bucket a category is stored in. Physical names come from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketGroup {
    Cards,
    IdDocuments,
    Biometrics,
    Signatures,
}

impl DocumentCategory {
    pub const ALL: [DocumentCategory; 9] = [
        DocumentCategory::CardFront,
        DocumentCategory::CardBack,
        DocumentCategory::Signature,
        DocumentCategory::IdPage1,
        DocumentCategory::IdPage2,
        DocumentCategory::IdPage3,
        DocumentCategory::IdPage4,
        DocumentCategory::Photo,
        DocumentCategory::Video,
    ];

    /// Canonical tag, as persisted and accepted on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentCategory::CardFront => "CARD_FRONT",
            DocumentCategory::CardBack => "CARD_BACK",
            DocumentCategory::Signature => "SIGNATURE",
            DocumentCategory::IdPage1 => "ID_PAGE_1",
            DocumentCategory::IdPage2 => "ID_PAGE_2",
            DocumentCategory::IdPage3 => "ID_PAGE_3",
            DocumentCategory::IdPage4 => "ID_PAGE_4",
            DocumentCategory::Photo => "PHOTO",
            DocumentCategory::Video => "VIDEO",
        }
    }

    /// Path segment used in object keys.
    pub fn slug(&self) -> String {
        self.as_str().to_lowercase()
    }

    pub fn bucket_group(&self) -> BucketGroup {
        match self {
            DocumentCategory::CardFront | DocumentCategory::CardBack => BucketGroup::Cards,
            DocumentCategory::IdPage1
            | DocumentCategory::IdPage2
            | DocumentCategory::IdPage3
            | DocumentCategory::IdPage4 => BucketGroup::IdDocuments,
            DocumentCategory::Photo | DocumentCategory::Video => BucketGroup::Biometrics,
            DocumentCategory::Signature => BucketGroup::Signatures,
        }
    }

    /// Still images get the provenance card; video never does.
    pub fn is_brandable(&self) -> bool {
        !matches!(self, DocumentCategory::Video)
    }

    /// Page number for ID pages.
    pub fn id_page(&self) -> Option<u8> {
        match self {
            DocumentCategory::IdPage1 => Some(1),
            DocumentCategory::IdPage2 => Some(2),
            DocumentCategory::IdPage3 => Some(3),
            DocumentCategory::IdPage4 => Some(4),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentCategory {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace('-', "_");
        DocumentCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| AppError::InvalidInput(format!("Unknown document category: {:?}", s)))
    }
}
