use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Accession, BG_NAMESPACE, Cardinality, MatchTier, join_accessions};
use crate::index::LabelIndex;

pub const NAMED_INDIVIDUAL: &str = "owl:NamedIndividual";

/// One row of the curated BG to WMB mapping sheet.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceRow {
    #[serde(rename = "Group", default)]
    pub group: String,
    #[serde(default)]
    pub accession_group: String,
    #[serde(rename = "curated_ABC_WMB_supertype", default)]
    pub supertype: String,
    #[serde(rename = "curated_ABC_WMB_subclass", default)]
    pub subclass: String,
}

impl SourceRow {
    pub fn is_blank(&self) -> bool {
        [
            &self.group,
            &self.accession_group,
            &self.supertype,
            &self.subclass,
        ]
        .iter()
        .all(|value| value.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedRow {
    #[serde(rename = "Group")]
    pub group: String,
    #[serde(rename = "Type")]
    pub row_type: String,
    pub accession_group: String,
    pub exact_match: String,
    pub related_match: String,
    pub broad_match: String,
}

impl ClassifiedRow {
    pub fn field(&self, tier: MatchTier) -> &str {
        match tier {
            MatchTier::Exact => &self.exact_match,
            MatchTier::Related => &self.related_match,
            MatchTier::Broad => &self.broad_match,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTier {
    Supertype,
    Subclass,
}

/// Which source tier fills each match column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub exact: Option<SourceTier>,
    pub related: Vec<SourceTier>,
    pub broad: Option<SourceTier>,
}

/// The classification table, keyed by (supertype, subclass) cardinality.
pub fn decide(supertype: Cardinality, subclass: Cardinality) -> Assignment {
    use Cardinality::{Many, None, One};
    use SourceTier::{Subclass, Supertype};

    let (exact, related, broad) = match (supertype, subclass) {
        (None, None) => (Option::None, vec![], Option::None),
        (None, One) => (Option::None, vec![], Some(Subclass)),
        (None, Many) => (Option::None, vec![Subclass], Option::None),
        (One, None) => (Some(Supertype), vec![], Option::None),
        (One, One) => (Some(Supertype), vec![], Some(Subclass)),
        (One, Many) => (Some(Supertype), vec![Subclass], Option::None),
        (Many, None) => (Option::None, vec![Supertype], Option::None),
        (Many, One) => (Some(Subclass), vec![Supertype], Option::None),
        (Many, Many) => (Option::None, vec![Supertype, Subclass], Option::None),
    };
    Assignment {
        exact,
        related,
        broad,
    }
}

/// Splits `label_string` on `|` and maps each label to a namespaced accession.
/// Labels missing from the index are dropped.
pub fn resolve(label_string: &str, index: &LabelIndex, namespace: &str) -> Vec<Accession> {
    label_string
        .split('|')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .filter_map(|label| match index.get(label) {
            Some(accession) => Some(Accession::namespaced(namespace, accession)),
            None => {
                debug!(label, "no accession for label");
                None
            }
        })
        .collect()
}

pub struct Classifier<'a> {
    supertypes: &'a LabelIndex,
    subclasses: &'a LabelIndex,
    namespace: &'a str,
}

impl<'a> Classifier<'a> {
    pub fn new(supertypes: &'a LabelIndex, subclasses: &'a LabelIndex, namespace: &'a str) -> Self {
        Self {
            supertypes,
            subclasses,
            namespace,
        }
    }

    pub fn classify(&self, row: &SourceRow) -> ClassifiedRow {
        let supertype = resolve(&row.supertype, self.supertypes, self.namespace);
        let subclass = resolve(&row.subclass, self.subclasses, self.namespace);
        let assignment = decide(Cardinality::of(&supertype), Cardinality::of(&subclass));

        let pick = |tier: SourceTier| tier_accessions(tier, &supertype, &subclass);

        let exact_match = assignment
            .exact
            .map(|tier| join_accessions(pick(tier)))
            .unwrap_or_default();
        let related = assignment
            .related
            .iter()
            .flat_map(|tier| pick(*tier).iter().cloned())
            .collect::<Vec<_>>();
        let broad_match = assignment
            .broad
            .map(|tier| join_accessions(pick(tier)))
            .unwrap_or_default();

        debug!(
            group = %row.group,
            supertypes = supertype.len(),
            subclasses = subclass.len(),
            "classified row"
        );

        ClassifiedRow {
            group: row.group.clone(),
            row_type: NAMED_INDIVIDUAL.to_string(),
            accession_group: Accession::namespaced(BG_NAMESPACE, &row.accession_group).to_string(),
            exact_match,
            related_match: join_accessions(&related),
            broad_match,
        }
    }
}

fn tier_accessions<'r>(
    tier: SourceTier,
    supertype: &'r [Accession],
    subclass: &'r [Accession],
) -> &'r [Accession] {
    match tier {
        SourceTier::Supertype => supertype,
        SourceTier::Subclass => subclass,
    }
}
