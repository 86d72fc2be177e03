// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("group path must start with '/'")]
    MissingLeadingSlash,

    #[error("group path contains an empty segment")]
    EmptySegment,

    #[error("group path has a trailing slash")]
    TrailingSlash,
}

/// Canonical path of a group in the hierarchical namespace.
///
/// The root group is `/`. All other paths are `/`-joined non-empty segments
/// without a trailing slash, for example `/staff/admins`. Paths order
/// lexicographically, which places every group before its subgroups.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupPath(String);

impl GroupPath {
    /// Path of the root group.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Parse and validate a path string.
    pub fn parse(value: &str) -> Result<Self, PathError> {
        if value == "/" {
            return Ok(Self::root());
        }

        if !value.starts_with('/') {
            return Err(PathError::MissingLeadingSlash);
        }

        if value.ends_with('/') {
            return Err(PathError::TrailingSlash);
        }

        if value[1..].split('/').any(|segment| segment.is_empty()) {
            return Err(PathError::EmptySegment);
        }

        Ok(Self(value.to_string()))
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Path segments below the root, in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|segment| !segment.is_empty())
    }

    /// Number of segments below the root; the root itself has depth 0.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Parent group path, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }

        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(index) => Some(Self(self.0[..index].to_string())),
            None => None,
        }
    }

    /// Chain of groups from the root down to (and including) this group.
    pub fn ancestors(&self) -> Vec<Self> {
        let mut chain = vec![Self::root()];
        let mut current = String::new();
        for segment in self.segments() {
            current.push('/');
            current.push_str(segment);
            chain.push(Self(current.clone()));
        }
        chain
    }

    /// True when this group is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        if self == other {
            return false;
        }

        if self.is_root() {
            return true;
        }

        other.0.starts_with(&self.0) && other.0.as_bytes().get(self.0.len()) == Some(&b'/')
    }

    /// True when this group is a strict descendant of `other`.
    pub fn is_descendant_of(&self, other: &Self) -> bool {
        other.is_ancestor_of(self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for GroupPath {
    type Err = PathError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for GroupPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<GroupPath> for String {
    fn from(value: GroupPath) -> Self {
        value.0
    }
}

impl fmt::Display for GroupPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for GroupPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupPath({})", self.0)
    }
}
