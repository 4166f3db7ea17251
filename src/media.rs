//! Media objects and their metadata.
//!
//! A media object is one unit of media: its metadata and a way to get at
//! the actual data. Media objects are immutable and shared by reference
//! between nodes; every call to [`MediaObject::stream`] returns an
//! independent stream with its own position.

use crate::error::Result;
use crate::stream::{FileStream, MediaStream, MemoryStream};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A typed metadata value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Text(String),
    Int(i64),
    Float(f64),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            MetaValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Text(v.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::Text(v)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int(v)
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Float(v)
    }
}

/// Metadata is a dictionary of keyed values.
pub type Metadata = BTreeMap<String, MetaValue>;

/// A single unit of media: metadata plus the data itself.
pub trait MediaObject: Send + Sync {
    /// Short human-readable identity, used in logs and packet debugging.
    fn describe(&self) -> String;

    /// The media's associated metadata.
    fn metadata(&self) -> Metadata;

    /// An independent stream over the media's data. Each call returns a
    /// fresh stream with its own position.
    fn stream(&self) -> Result<Box<dyn MediaStream>>;
}

/// Shared reference to a media object, as carried by packets.
pub type MediaRef = Arc<dyn MediaObject>;

/// A media object for a file on the local filesystem.
///
/// Carries no metadata of its own; tag lookup against external services
/// is a collaborator concern, not handled here.
pub struct FileMedia {
    path: PathBuf,
}

impl FileMedia {
    pub fn new(path: impl AsRef<Path>) -> MediaRef {
        Arc::new(Self {
            path: path.as_ref().to_path_buf(),
        })
    }
}

impl MediaObject for FileMedia {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn metadata(&self) -> Metadata {
        Metadata::new()
    }

    fn stream(&self) -> Result<Box<dyn MediaStream>> {
        Ok(Box::new(FileStream::read_from(&self.path)))
    }
}

/// A fully in-memory media object.
pub struct MemoryMedia {
    name: String,
    metadata: Metadata,
    data: Arc<Vec<u8>>,
}

impl MemoryMedia {
    pub fn new(name: impl Into<String>, metadata: Metadata, data: Vec<u8>) -> MediaRef {
        Arc::new(Self {
            name: name.into(),
            metadata,
            data: Arc::new(data),
        })
    }
}

impl MediaObject for MemoryMedia {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn metadata(&self) -> Metadata {
        self.metadata.clone()
    }

    fn stream(&self) -> Result<Box<dyn MediaStream>> {
        Ok(Box::new(MemoryStream::new(self.data.as_ref().clone())))
    }
}
