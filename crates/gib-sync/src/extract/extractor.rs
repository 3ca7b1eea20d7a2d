//! Record extraction rules
//!
//! Walks a [`UserListDocument`] and turns every usable alias into a
//! [`RegistryRecord`]. Nothing in here fails: a user or alias that cannot be
//! used becomes an [`Extraction::Skipped`] carrying the reason, and its
//! siblings are still processed.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{trace, warn};

use crate::extract::document::{AliasNode, UserListDocument, UserNode};
use crate::models::{DocumentType, RegistryRecord, Role};

/// Format of `Alias/CreationTime`, e.g. `2019-04-23T14:02:11`
pub const CREATION_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    MissingIdentifier,
    DeletedAlias,
    MissingAliasName,
    MissingCreationTime,
    InvalidCreationTime,
}

/// Why something was left out, with whatever context was available
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skip {
    pub reason: SkipReason,
    pub identifier: Option<String>,
    pub alias: Option<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Record(RegistryRecord),
    Skipped(Skip),
}

impl Extraction {
    pub fn record(self) -> Option<RegistryRecord> {
        match self {
            Extraction::Record(record) => Some(record),
            Extraction::Skipped(_) => None,
        }
    }

    fn skipped(reason: SkipReason, identifier: Option<&str>, alias: Option<&str>) -> Self {
        Extraction::Skipped(Skip {
            reason,
            identifier: identifier.map(str::to_owned),
            alias: alias.map(str::to_owned),
            detail: None,
        })
    }
}

/// Per-partition tally of extraction outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub records: usize,
    pub missing_identifier: usize,
    pub deleted_aliases: usize,
    pub missing_alias_name: usize,
    pub missing_creation_time: usize,
    pub invalid_creation_time: usize,
}

impl ExtractionStats {
    pub fn observe(&mut self, extraction: &Extraction) {
        match extraction {
            Extraction::Record(_) => self.records += 1,
            Extraction::Skipped(skip) => match skip.reason {
                SkipReason::MissingIdentifier => self.missing_identifier += 1,
                SkipReason::DeletedAlias => self.deleted_aliases += 1,
                SkipReason::MissingAliasName => self.missing_alias_name += 1,
                SkipReason::MissingCreationTime => self.missing_creation_time += 1,
                SkipReason::InvalidCreationTime => self.invalid_creation_time += 1,
            },
        }
    }

    pub fn skipped(&self) -> usize {
        self.missing_identifier
            + self.deleted_aliases
            + self.missing_alias_name
            + self.missing_creation_time
            + self.invalid_creation_time
    }
}

/// Turns user list documents into registry records for one role
#[derive(Debug, Clone, Copy)]
pub struct RecordExtractor {
    role: Role,
}

impl RecordExtractor {
    pub fn new(role: Role) -> Self {
        Self { role }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Lazily extract every user/alias of `document`.
    ///
    /// All records produced by one call share the same `created_at` /
    /// `last_synced_at` stamp, taken when the call is made.
    pub fn extract<'a>(
        &'a self,
        document: &'a UserListDocument,
    ) -> impl Iterator<Item = Extraction> + 'a {
        let now = Utc::now();
        document
            .users()
            .flat_map(move |user| self.extract_user(user, now))
    }

    fn extract_user<'a>(
        &'a self,
        user: UserNode<'a>,
        now: DateTime<Utc>,
    ) -> impl Iterator<Item = Extraction> + 'a {
        let identifier = user.identifier();
        let title = user.title();

        let missing = identifier.is_none().then(|| {
            trace!("User without identifier, skipping");
            Extraction::skipped(SkipReason::MissingIdentifier, None, None)
        });

        let aliases = identifier.into_iter().flat_map(move |identifier| {
            user.documents().flat_map(move |document| {
                let document_type = document.document_type();
                document.aliases().map(move |alias| {
                    self.extract_alias(identifier, title, document_type, alias, now)
                })
            })
        });

        missing.into_iter().chain(aliases)
    }

    fn extract_alias(
        &self,
        identifier: &str,
        title: Option<&str>,
        document_type: DocumentType,
        alias: AliasNode<'_>,
        now: DateTime<Utc>,
    ) -> Extraction {
        if alias.is_deleted() {
            return Extraction::skipped(SkipReason::DeletedAlias, Some(identifier), alias.name());
        }

        let Some(name) = alias.name() else {
            return Extraction::skipped(SkipReason::MissingAliasName, Some(identifier), None);
        };

        let Some(raw) = alias.creation_time() else {
            return Extraction::skipped(SkipReason::MissingCreationTime, Some(identifier), Some(name));
        };

        match NaiveDateTime::parse_from_str(raw, CREATION_TIME_FORMAT) {
            Ok(first_creation_time) => Extraction::Record(RegistryRecord {
                identifier: identifier.to_owned(),
                alias: name.to_owned(),
                title: title.map(str::to_owned),
                role: self.role,
                document_type,
                first_creation_time,
                is_active: true,
                created_at: now,
                last_synced_at: now,
            }),
            Err(e) => {
                warn!(
                    identifier = %identifier,
                    alias = %name,
                    value = %raw,
                    error = %e,
                    "Unparseable alias creation time, skipping alias"
                );
                Extraction::Skipped(Skip {
                    reason: SkipReason::InvalidCreationTime,
                    identifier: Some(identifier.to_owned()),
                    alias: Some(name.to_owned()),
                    detail: Some(raw.to_owned()),
                })
            },
        }
    }
}
