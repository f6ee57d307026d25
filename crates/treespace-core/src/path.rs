//! Absolute data paths into a treespace
//!
//! A `DataPath` names exactly one node: every list step carries the key of
//! the entry it selects, e.g. `/interfaces/interface[name='eth0']/mtu`.

use std::fmt;

/// Key predicate selecting one entry of a keyed list
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListKey {
    /// Name of the key leaf inside the entry
    pub leaf: String,
    /// Key value, in its canonical string form
    pub value: String,
}

/// One step of a data path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathSegment {
    pub name: String,
    pub key: Option<ListKey>,
}

impl PathSegment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: None,
        }
    }

    pub fn keyed(name: impl Into<String>, leaf: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: Some(ListKey {
                leaf: leaf.into(),
                value: value.into(),
            }),
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(key) = &self.key {
            if key.value.contains('\'') {
                write!(f, "[{}=\"{}\"]", key.leaf, key.value)?;
            } else {
                write!(f, "[{}='{}']", key.leaf, key.value)?;
            }
        }
        Ok(())
    }
}

/// Absolute path to a single data node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DataPath {
    segments: Vec<PathSegment>,
}

impl DataPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    /// Path of a plain (container, leaf, leaf-list or whole list) child
    pub fn child(&self, name: impl Into<String>) -> Self {
        self.pushed(PathSegment::new(name))
    }

    /// Path of a keyed list entry below this node
    pub fn entry(&self, list: impl Into<String>, leaf: impl Into<String>, value: impl Into<String>) -> Self {
        self.pushed(PathSegment::keyed(list, leaf, value))
    }

    pub fn pushed(&self, segment: PathSegment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// True when `self` equals `other` or is one of its ancestors
    ///
    /// A whole-list segment (`interface`) is a prefix of any of its
    /// entries (`interface[name='eth0']`).
    pub fn is_prefix_of(&self, other: &DataPath) -> bool {
        if self.segments.len() > other.segments.len() {
            return false;
        }
        let last = self.segments.len().saturating_sub(1);
        self.segments
            .iter()
            .zip(other.segments.iter())
            .enumerate()
            .all(|(i, (mine, theirs))| {
                if mine.name != theirs.name {
                    return false;
                }
                match (&mine.key, &theirs.key) {
                    (None, None) => true,
                    (Some(a), Some(b)) => a == b,
                    (None, Some(_)) => i == last,
                    (Some(_), None) => false,
                }
            })
    }

    /// Two mutations overlap when either path contains the other
    pub fn overlaps(&self, other: &DataPath) -> bool {
        self.is_prefix_of(other) || other.is_prefix_of(self)
    }

    /// Path with list keys dropped, as used for schema lookups
    pub fn schema_path(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            out.push_str(&segment.name);
        }
        out
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}
