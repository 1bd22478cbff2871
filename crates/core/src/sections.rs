//! Date and session grouping of query results
//!
//! Sections are derived data: they are recomputed from the metadata table
//! and the query order whenever either changes, and never stored on their
//! own. Only the collapsed flag survives a recompute, keyed by section.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::NaiveDate;
use gallery_model::{ArtifactId, ArtifactMetadata};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// How grouping treats artifacts whose metadata is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupingMode {
    /// Leave them out of every section
    #[default]
    Lenient,
    /// Refuse to group until all metadata is present
    Strict,
}

/// Grouping key of a section.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SectionKey {
    pub date: NaiveDate,
    /// Empty when the artifacts carry no session
    pub session: String,
}

impl SectionKey {
    /// Display order: newest date first, then session name.
    fn display_key(&self) -> (Reverse<NaiveDate>, String, String) {
        let (folded, exact) = text_key(&self.session);
        (Reverse(self.date), folded, exact.to_owned())
    }

    fn header(&self) -> String {
        let date = self.date.format("%B %-d, %Y");
        if self.session.is_empty() {
            date.to_string()
        } else {
            format!("{date} - {}", self.session)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub key: SectionKey,
    pub header: String,
    pub artifact_ids: Vec<ArtifactId>,
    pub collapsed: bool,
}

impl Section {
    pub fn len(&self) -> usize {
        self.artifact_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifact_ids.is_empty()
    }
}

/// Grouping was attempted before metadata for every artifact arrived.
///
/// Recoverable: retry after the next metadata load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataIncomplete {
    pub missing: Vec<ArtifactId>,
}

impl fmt::Display for MetadataIncomplete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "metadata missing for {} artifacts", self.missing.len())
    }
}

impl std::error::Error for MetadataIncomplete {}

/// Sort key comparing case-folded first, falling back to the exact text for ties.
fn text_key(text: &str) -> (String, &str) {
    (text.to_lowercase(), text)
}

/// Group `ordered_ids` into sections keyed by capture date and session.
///
/// Each id appears in at most one section; duplicates in `ordered_ids` are
/// ignored. An artifact lacks the required metadata when it has no entry in
/// `metadata` or no capture time.
pub fn group_and_sort(
    metadata: &HashMap<ArtifactId, ArtifactMetadata>,
    ordered_ids: &[ArtifactId],
    mode: GroupingMode,
) -> Result<Vec<Section>, MetadataIncomplete> {
    let mut seen = HashSet::new();
    let mut groups: HashMap<SectionKey, Vec<(ArtifactId, &ArtifactMetadata)>> = HashMap::new();
    let mut missing = Vec::new();

    for &id in ordered_ids {
        if !seen.insert(id) {
            continue;
        }
        let Some((entry, date)) =
            metadata.get(&id).and_then(|entry| Some((entry, entry.capture_date()?)))
        else {
            missing.push(id);
            continue;
        };

        let key = SectionKey { date, session: entry.session.clone().unwrap_or_default() };
        groups.entry(key).or_default().push((id, entry));
    }

    if mode == GroupingMode::Strict && !missing.is_empty() {
        return Err(MetadataIncomplete { missing });
    }
    if !missing.is_empty() {
        trace!(skipped = missing.len(), "grouping without incomplete artifacts");
    }

    let mut sections: Vec<Section> = groups
        .into_iter()
        .map(|(key, mut members)| {
            members.sort_by_cached_key(|&(id, entry)| (text_key(&entry.name), id));
            Section {
                header: key.header(),
                artifact_ids: members.into_iter().map(|(id, _)| id).collect(),
                key,
                collapsed: false,
            }
        })
        .collect();

    sections.sort_by_cached_key(|section| section.key.display_key());
    Ok(sections)
}

/// Current grouping plus per-section collapse state.
#[derive(Debug, Default)]
pub struct SectionIndex {
    mode: GroupingMode,
    sections: Vec<Section>,
    collapsed: HashSet<SectionKey>,
}

impl SectionIndex {
    pub fn new(mode: GroupingMode) -> Self {
        Self { mode, ..Default::default() }
    }

    pub fn mode(&self) -> GroupingMode {
        self.mode
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Regroup from scratch.
    ///
    /// On [`MetadataIncomplete`] the previous grouping is kept and the
    /// signal is returned so the caller can retry after the next load.
    pub fn recompute(
        &mut self,
        metadata: &HashMap<ArtifactId, ArtifactMetadata>,
        ordered_ids: &[ArtifactId],
    ) -> Result<(), MetadataIncomplete> {
        let mut sections = group_and_sort(metadata, ordered_ids, self.mode).inspect_err(|err| {
            debug!(missing = err.missing.len(), "keeping previous sections");
        })?;

        for section in &mut sections {
            section.collapsed = self.collapsed.contains(&section.key);
        }
        debug!(sections = sections.len(), "sections recomputed");
        self.sections = sections;
        Ok(())
    }

    /// Returns `false` when no section has `key`.
    pub fn set_collapsed(&mut self, key: &SectionKey, collapsed: bool) -> bool {
        let Some(section) = self.sections.iter_mut().find(|section| &section.key == key) else {
            return false;
        };
        section.collapsed = collapsed;
        if collapsed {
            self.collapsed.insert(key.clone());
        } else {
            self.collapsed.remove(key);
        }
        true
    }

    /// Flip the collapsed flag, returning the new value.
    pub fn toggle_collapsed(&mut self, key: &SectionKey) -> Option<bool> {
        let collapsed = !self.sections.iter().find(|section| &section.key == key)?.collapsed;
        self.set_collapsed(key, collapsed);
        Some(collapsed)
    }

    /// Ids of expanded sections in display order.
    pub fn visible_ids(&self) -> Vec<ArtifactId> {
        self.sections
            .iter()
            .filter(|section| !section.collapsed)
            .flat_map(|section| section.artifact_ids.iter().copied())
            .collect()
    }

    pub fn section_of(&self, id: ArtifactId) -> Option<&Section> {
        self.sections.iter().find(|section| section.artifact_ids.contains(&id))
    }

    pub fn clear(&mut self) {
        self.sections.clear();
        self.collapsed.clear();
    }
}
