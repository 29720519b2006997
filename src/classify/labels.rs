//! Class label tables.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EnganarError, Result};

/// Ordered class names, indexed by class id.
///
/// Label files are JSON, either an array of names or an object keyed by the
/// decimal class index (the Keras `imagenet_class_index` layout):
///
/// ```
/// use enganar::classify::ClassLabels;
///
/// let a = ClassLabels::from_json_str(r#"["tench", "goldfish"]"#).unwrap();
/// let b = ClassLabels::from_json_str(r#"{"1": "goldfish", "0": "tench"}"#).unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.name(1), "goldfish");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LabelFile", into = "Vec<String>")]
pub struct ClassLabels {
    names: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LabelFile {
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

impl TryFrom<LabelFile> for ClassLabels {
    type Error = EnganarError;

    fn try_from(file: LabelFile) -> Result<Self> {
        match file {
            LabelFile::List(names) => Ok(Self::new(names)),
            LabelFile::Map(entries) => {
                let mut indexed = BTreeMap::new();
                for (key, name) in entries {
                    let index: usize = key.trim().parse().map_err(|_| {
                        EnganarError::invalid_argument("label key", &key, "a class index")
                    })?;
                    indexed.insert(index, name);
                }
                // BTreeMap iterates in index order; require exactly 0..n
                for (expected, &index) in indexed.keys().enumerate() {
                    if index != expected {
                        return Err(EnganarError::invalid_argument(
                            "label index",
                            index,
                            &format!("{expected} (indices must be contiguous from 0)"),
                        ));
                    }
                }
                Ok(Self::new(indexed.into_values().collect()))
            }
        }
    }
}

impl From<ClassLabels> for Vec<String> {
    fn from(labels: ClassLabels) -> Self {
        labels.names
    }
}

impl ClassLabels {
    /// Build a table from names in class order.
    #[must_use]
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Placeholder names `class_0 .. class_{n-1}`.
    #[must_use]
    pub fn numbered(num_classes: usize) -> Self {
        Self::new((0..num_classes).map(|i| format!("class_{i}")).collect())
    }

    /// Parse a JSON label table.
    ///
    /// # Errors
    ///
    /// Returns `Config` for malformed JSON, `InvalidArgument` for object keys
    /// that are not contiguous class indices.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: LabelFile = serde_json::from_str(json)?;
        Self::try_from(file)
    }

    /// Read a JSON label table from disk.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read, otherwise as
    /// [`ClassLabels::from_json_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Number of classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name of `index`, if present.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Name of `index`, falling back to `class_<index>`.
    #[must_use]
    pub fn name(&self, index: usize) -> String {
        self.get(index)
            .map_or_else(|| format!("class_{index}"), str::to_string)
    }

    /// Iterate over names in class order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}
