use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The closed trade/division classification set, supplied by the deployment.
///
/// Extraction results are checked against this set but not constrained to it;
/// an out-of-set label is flagged, not rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySet {
    labels: Vec<String>,
}

impl CategorySet {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// The standard CSI division labels used by default.
    pub fn csi_divisions() -> Self {
        Self::new([
            "Division 01 - General Requirements",
            "Division 02 - Existing Conditions",
            "Division 03 - Concrete",
            "Division 04 - Masonry",
            "Division 05 - Metals",
            "Division 06 - Wood, Plastics, and Composites",
            "Division 07 - Thermal and Moisture Protection",
            "Division 08 - Openings",
            "Division 09 - Finishes",
            "Division 10 - Specialties",
            "Division 11 - Equipment",
            "Division 12 - Furnishings",
            "Division 21 - Fire Suppression",
            "Division 22 - Plumbing",
            "Division 23 - HVAC",
            "Division 26 - Electrical",
            "Division 27 - Communications",
            "Division 28 - Electronic Safety and Security",
        ])
    }

    /// A flat trade list for deployments that do not use CSI divisions.
    pub fn simple_trades() -> Self {
        Self::new([
            "General",
            "Electrical",
            "Plumbing",
            "HVAC",
            "Carpentry",
            "Painting",
            "Finishing",
        ])
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// The label drafts start from before the user or extractor picks one.
    pub fn default_label(&self) -> &str {
        self.labels.first().map(String::as_str).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl Default for CategorySet {
    fn default() -> Self {
        Self::csi_divisions()
    }
}

/// Reference to an item's photo: inline encoded data or a remote-storage URL,
/// never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PhotoRef {
    /// Base64-encoded image data held directly in the record
    Inline(String),
    /// Durable URL into the object store
    Remote(String),
}

impl PhotoRef {
    /// Whether the reference can be dereferenced to image bytes.
    pub fn is_resolvable(&self) -> bool {
        match self {
            PhotoRef::Inline(data) => !data.is_empty(),
            PhotoRef::Remote(url) => !url.is_empty(),
        }
    }

    /// The remote URL, if this reference lives in the object store.
    pub fn url(&self) -> Option<&str> {
        match self {
            PhotoRef::Remote(url) => Some(url),
            PhotoRef::Inline(_) => None,
        }
    }
}

/// A locally held image that has not been uploaded yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoBlob {
    pub data: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
}

impl PhotoBlob {
    pub fn new(data: Vec<u8>, file_name: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            data,
            file_name: file_name.into(),
            content_type: content_type.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The three structured fields produced by extraction or manual entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFields {
    pub room: String,
    pub description: String,
    pub category: String,
}

/// A recorded construction defect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PunchlistItem {
    /// Unique identifier, stable once created
    pub id: Uuid,
    /// Free-text location label
    pub room: String,
    /// Free-text description of the defect
    pub description: String,
    /// Trade/division label, normally drawn from the configured set
    pub category: String,
    /// Photo reference, inline or remote
    pub photo: PhotoRef,
    /// Creation timestamp, immutable
    pub created_at: DateTime<Utc>,
}

impl PunchlistItem {
    /// Create a new item with a fresh id and the current timestamp.
    pub fn new(fields: ItemFields, photo: PhotoRef) -> Self {
        Self {
            id: Uuid::new_v4(),
            room: fields.room,
            description: fields.description,
            category: fields.category,
            photo,
            created_at: Utc::now(),
        }
    }

    /// Whether the item satisfies the completeness invariant: non-empty room
    /// and description, and a resolvable photo.
    pub fn is_complete(&self) -> bool {
        !self.room.trim().is_empty()
            && !self.description.trim().is_empty()
            && self.photo.is_resolvable()
    }
}

/// A named collection of punchlist items belonging to one owning user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    /// User-chosen name, non-empty
    pub name: String,
    /// Owner, immutable
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    /// Items, newest first by insertion
    pub items: Vec<PunchlistItem>,
}

impl Job {
    /// Create a new job with no items.
    pub fn new(name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            user_id: user_id.into(),
            created_at: Utc::now(),
            items: Vec::new(),
        }
    }
}
