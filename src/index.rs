use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::domain::AnnotationEntry;
use crate::error::XmapError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexPolicy {
    /// Later entries overwrite earlier ones; overwrites are recorded as collisions.
    #[default]
    LastWins,
    RejectCollisions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelCollision {
    pub label: String,
    pub kept: String,
    pub displaced: String,
}

/// Label to accession lookup built from taxonomy annotations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelIndex {
    entries: BTreeMap<String, String>,
    normalized: bool,
    collisions: Vec<LabelCollision>,
}

impl LabelIndex {
    /// Indexes every entry verbatim, or only `labelset` entries under their
    /// normalized label when a filter is given.
    pub fn build(entries: &[AnnotationEntry], labelset: Option<&str>) -> Self {
        let mut index = Self {
            normalized: labelset.is_some(),
            ..Self::default()
        };
        for entry in entries {
            if let Some(filter) = labelset {
                if entry.labelset != filter {
                    continue;
                }
            }
            let key = index.key_for(&entry.cell_label);
            if let Some(previous) = index
                .entries
                .insert(key.clone(), entry.cell_set_accession.clone())
            {
                if previous != entry.cell_set_accession {
                    index.collisions.push(LabelCollision {
                        label: key,
                        kept: entry.cell_set_accession.clone(),
                        displaced: previous,
                    });
                }
            }
        }
        for collision in &index.collisions {
            warn!(
                label = %collision.label,
                kept = %collision.kept,
                displaced = %collision.displaced,
                "label maps to more than one accession"
            );
        }
        index
    }

    pub fn build_with_policy(
        entries: &[AnnotationEntry],
        labelset: Option<&str>,
        policy: IndexPolicy,
    ) -> Result<Self, XmapError> {
        let index = Self::build(entries, labelset);
        if policy == IndexPolicy::RejectCollisions {
            if let Some(collision) = index.collisions.first() {
                return Err(XmapError::LabelCollision {
                    label: collision.label.clone(),
                    kept: collision.kept.clone(),
                    displaced: collision.displaced.clone(),
                });
            }
        }
        Ok(index)
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.entries.get(&self.key_for(label)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn collisions(&self) -> &[LabelCollision] {
        &self.collisions
    }

    fn key_for(&self, label: &str) -> String {
        if self.normalized {
            normalize_label(label)
        } else {
            label.to_string()
        }
    }
}

/// Strips a leading ordinal such as `"12 "` from a taxonomy label.
pub fn normalize_label(label: &str) -> String {
    static ORDINAL: OnceLock<Regex> = OnceLock::new();
    let re = ORDINAL.get_or_init(|| Regex::new(r"^[\d\s]+").unwrap());
    re.replace(label, "").into_owned()
}
