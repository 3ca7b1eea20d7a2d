//! Typed view over a GIB user list document
//!
//! ```text
//! UserList
//! └── User                      (anywhere in the tree)
//!     ├── Identifier            VKN / TCKN
//!     ├── Title
//!     └── … Document[@type]     (anywhere below the user)
//!         └── Alias             (direct children only)
//!             ├── Name
//!             ├── CreationTime  YYYY-MM-DDTHH:MM:SS
//!             └── DeletionTime  present => alias was withdrawn
//! ```

use std::io::{BufReader, Read};

use crate::error::ExtractError;
use crate::extract::tree::XmlElement;
use crate::models::DocumentType;

const USER: &str = "User";
const IDENTIFIER: &str = "Identifier";
const TITLE: &str = "Title";
const DOCUMENT: &str = "Document";
const DOCUMENT_TYPE_ATTR: &str = "type";
const ALIAS: &str = "Alias";
const ALIAS_NAME: &str = "Name";
const CREATION_TIME: &str = "CreationTime";
const DELETION_TIME: &str = "DeletionTime";

/// A parsed user list partition
#[derive(Debug, Clone)]
pub struct UserListDocument {
    root: XmlElement,
}

impl UserListDocument {
    pub fn parse<R: Read>(source: R) -> Result<Self, ExtractError> {
        XmlElement::parse(BufReader::new(source)).map(Self::from_root)
    }

    pub fn from_root(root: XmlElement) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    pub fn users(&self) -> impl Iterator<Item = UserNode<'_>> {
        self.root.descendants(USER).map(UserNode)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UserNode<'a>(&'a XmlElement);

impl<'a> UserNode<'a> {
    /// Taxpayer number, `None` when the element is missing or blank
    pub fn identifier(&self) -> Option<&'a str> {
        self.0.child_text(IDENTIFIER).filter(|id| !id.is_empty())
    }

    /// Registered title; an empty `<Title/>` is kept as an empty string
    pub fn title(&self) -> Option<&'a str> {
        self.0.child_text(TITLE)
    }

    pub fn documents(&self) -> impl Iterator<Item = DocumentNode<'a>> {
        self.0.descendants(DOCUMENT).map(DocumentNode)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DocumentNode<'a>(&'a XmlElement);

impl<'a> DocumentNode<'a> {
    pub fn type_attribute(&self) -> Option<&'a str> {
        self.0.attribute(DOCUMENT_TYPE_ATTR)
    }

    pub fn document_type(&self) -> DocumentType {
        DocumentType::from_type_attribute(self.type_attribute())
    }

    pub fn aliases(&self) -> impl Iterator<Item = AliasNode<'a>> {
        self.0.children_named(ALIAS).map(AliasNode)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AliasNode<'a>(&'a XmlElement);

impl<'a> AliasNode<'a> {
    /// A `DeletionTime` child marks a withdrawn alias, whatever its value
    pub fn is_deleted(&self) -> bool {
        self.0.child(DELETION_TIME).is_some()
    }

    pub fn name(&self) -> Option<&'a str> {
        self.0.child_text(ALIAS_NAME).filter(|name| !name.is_empty())
    }

    pub fn creation_time(&self) -> Option<&'a str> {
        self.0.child_text(CREATION_TIME)
    }
}
