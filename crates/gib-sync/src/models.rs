//! Domain types shared by the extractor, the stores and the synchronizer

use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Registry role a user list is queried for.
///
/// `PK` is the mailbox ("posta kutusu") list, `GB` the sender ("gönderici
/// birim") list. One run always works on exactly one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Role {
    #[default]
    Pk,
    Gb,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Pk => "PK",
            Role::Gb => "GB",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PK" => Ok(Role::Pk),
            "GB" => Ok(Role::Gb),
            other => Err(format!("unknown role '{}', expected PK or GB", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document family an alias is registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocumentType {
    Invoice,
    DespatchAdvice,
}

impl DocumentType {
    /// Classify a `Document/@type` attribute value.
    ///
    /// Only the exact value `DespatchAdvice` selects despatch advices; any other
    /// value, including a missing attribute, is an invoice registration.
    pub fn from_type_attribute(value: Option<&str>) -> Self {
        match value {
            Some("DespatchAdvice") => DocumentType::DespatchAdvice,
            _ => DocumentType::Invoice,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "Invoice",
            DocumentType::DespatchAdvice => "DespatchAdvice",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Natural key of a registry row
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub identifier: String,
    pub alias: String,
    pub document_type: DocumentType,
}

/// One alias of one taxpayer, ready to be upserted
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryRecord {
    /// VKN (tax number) or TCKN (citizen number)
    pub identifier: String,
    /// Mailbox / endpoint label, e.g. `urn:mail:defaultpk@example.com`
    pub alias: String,
    pub title: Option<String>,
    pub role: Role,
    pub document_type: DocumentType,
    /// When the alias was first registered at GIB
    pub first_creation_time: NaiveDateTime,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_synced_at: DateTime<Utc>,
}

impl RegistryRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey {
            identifier: self.identifier.clone(),
            alias: self.alias.clone(),
            document_type: self.document_type,
        }
    }
}

/// Raw bytes of one partition as delivered by the provider
#[derive(Clone, PartialEq, Eq, Default)]
pub struct PartitionBlob(Vec<u8>);

impl PartitionBlob {
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for PartitionBlob {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}

// Partitions can be tens of megabytes; never dump them into logs.
impl fmt::Debug for PartitionBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionBlob").field("len", &self.0.len()).finish()
    }
}
