//! Per-gene assembly of transcripts and sub-features.
//!
//! Both modes first remove the gene's transcripts, and each transcript's
//! sub-features, from the shared [`HierarchyState`]. Once removed they are
//! owned by the gene being assembled, so genes can be assembled in parallel.

use std::collections::BTreeMap;

use crate::{
    gene::Gene,
    linkage::Linkage,
    record::{Attributes, FeatureKind},
    state::HierarchyState,
};

const MERGED_FEATURE: &str = "CDS";

/// Collapses every transcript of `gene` into one canonical transcript whose
/// children are the gene's sub-features with overlapping spans merged.
///
/// Children that merged with another child are typed `CDS`, so the exon
/// statistics of the gene and of the canonical transcript count only the
/// exons that overlapped no other child. A gene whose exons all overlap
/// reports zero exons.
///
/// When `detailed` is false the transcripts are still removed from the
/// state but nothing is attached.
pub fn collapse_gene(
    mut gene: Gene,
    state: &HierarchyState,
    linkage: Linkage,
    detailed: bool,
) -> Gene {
    let transcripts = drain_gene(&gene, state, linkage);
    if !detailed || transcripts.is_empty() {
        return gene;
    }

    let mut canonical = Gene::canonical_transcript(&gene);
    let mut merged = MergedIntervals::default();
    for (idx, (transcript, sub_features)) in transcripts.into_iter().enumerate() {
        if idx == 0 {
            canonical.start = transcript.start;
            canonical.end = transcript.end;
        }
        canonical.cover(&transcript);
        for feature in sub_features {
            merged.insert(feature);
        }
    }

    let children = merged.into_vec();
    if gene.exons_count.is_none() {
        gene.compute_exon_stats(&children);
    }
    canonical.compute_exon_stats(&children);
    canonical.items = Some(children);
    gene.items = Some(vec![canonical]);
    gene
}

/// Attaches every transcript of `gene`, each with its own sub-features.
pub fn expand_gene(
    mut gene: Gene,
    state: &HierarchyState,
    linkage: Linkage,
    detailed: bool,
) -> Gene {
    let transcripts = drain_gene(&gene, state, linkage);
    if !detailed || transcripts.is_empty() {
        return gene;
    }

    let items = transcripts
        .into_iter()
        .map(|(mut transcript, sub_features)| {
            transcript.fill_exon_stats(&sub_features);
            transcript.items = Some(sub_features);
            transcript
        })
        .collect();
    gene.items = Some(items);
    gene
}

/// Removes the transcripts of `gene` and their sub-features from `state`.
///
/// Transcripts come back ordered by span, each with its sub-features
/// ordered by span.
fn drain_gene(gene: &Gene, state: &HierarchyState, linkage: Linkage) -> Vec<(Gene, Vec<Gene>)> {
    let Some(key) = linkage.gene_key(gene) else {
        return Vec::new();
    };

    let mut transcripts: Vec<_> = state
        .take_transcripts(key)
        .into_iter()
        .map(|(id, transcript)| {
            let (slot_gene, slot_transcript) = linkage.sub_feature_slot(key, &id);
            let mut sub_features = state.take_sub_features(&slot_gene, &slot_transcript);
            sort_by_span(&mut sub_features);
            (id, transcript, sub_features)
        })
        .collect();

    transcripts.sort_by(|a, b| (a.1.start, a.1.end, &a.0).cmp(&(b.1.start, b.1.end, &b.0)));
    transcripts
        .into_iter()
        .map(|(_, transcript, sub_features)| (transcript, sub_features))
        .collect()
}

/// Sorts by span, breaking ties by type and id so that the order does not
/// depend on which worker filed a feature first.
pub(crate) fn sort_by_span(features: &mut [Gene]) {
    features.sort_by(|a, b| {
        (a.start, a.end, &a.feature, &a.feature_id).cmp(&(b.start, b.end, &b.feature, &b.feature_id))
    });
}

/// Non-overlapping features keyed by start.
#[derive(Debug, Default)]
struct MergedIntervals {
    entries: BTreeMap<u64, Gene>,
}

impl MergedIntervals {
    /// Inserts `feature`, merging it with every entry it overlaps.
    ///
    /// A merged entry spans the union of its parts, is typed `CDS` and
    /// loses its attributes.
    fn insert(&mut self, feature: Gene) {
        let mut current = feature;
        let mut merged = false;

        // entries are disjoint, so the overlapping ones are found one at a
        // time from the right
        loop {
            let hit = self
                .entries
                .range(..current.end)
                .next_back()
                .filter(|(_, entry)| entry.end > current.start)
                .map(|(key, _)| *key);
            let Some(key) = hit else {
                break;
            };
            if let Some(entry) = self.entries.remove(&key) {
                current.cover(&entry);
                merged = true;
            }
        }

        if merged {
            current.feature = MERGED_FEATURE.to_string();
            current.kind = FeatureKind::Cds;
            current.attributes = Attributes::new();
            current.group_id = None;
        }
        self.entries.insert(current.start, current);
    }

    fn into_vec(self) -> Vec<Gene> {
        self.entries.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FeatureRecord;

    fn gene(line: &str) -> Gene {
        Gene::from_record(FeatureRecord::parse(line, 1, Linkage::ById).unwrap())
    }

    fn exon(start: u64, end: u64, parent: &str) -> Gene {
        gene(&format!(
            "c\ts\texon\t{}\t{}\t.\t+\t.\tParent={}",
            start + 1,
            end,
            parent
        ))
    }

    fn populated_state() -> HierarchyState {
        let state = HierarchyState::new();
        state.insert_transcript(
            "g1",
            "t1",
            gene("c\ts\tmRNA\t101\t180\t.\t+\t.\tID=t1;Parent=g1"),
        );
        state.insert_transcript(
            "g1",
            "t2",
            gene("c\ts\tmRNA\t121\t260\t.\t+\t.\tID=t2;Parent=g1"),
        );
        state.push_sub_feature("t1", "t1", exon(100, 150, "t1"));
        state.push_sub_feature("t1", "t1", exon(160, 180, "t1"));
        state.push_sub_feature("t2", "t2", exon(140, 200, "t2"));
        state.push_sub_feature("t2", "t2", exon(240, 260, "t2"));
        state
    }

    #[test]
    fn merge_overlapping_features() {
        let mut merged = MergedIntervals::default();
        merged.insert(exon(100, 150, "a"));
        merged.insert(exon(300, 400, "a"));
        merged.insert(exon(140, 200, "b"));
        let children = merged.into_vec();

        assert_eq!(children.len(), 2);
        assert_eq!((children[0].start, children[0].end), (100, 200));
        assert_eq!(children[0].feature, "CDS");
        assert!(children[0].attributes.is_empty());
        assert_eq!(children[1].feature, "exon");
    }

    #[test]
    fn merge_bridging_feature() {
        let mut merged = MergedIntervals::default();
        merged.insert(exon(0, 10, "a"));
        merged.insert(exon(20, 30, "a"));
        merged.insert(exon(40, 50, "a"));
        merged.insert(exon(5, 45, "b"));
        let children = merged.into_vec();
        assert_eq!(children.len(), 1);
        assert_eq!((children[0].start, children[0].end), (0, 50));
    }

    #[test]
    fn collapse_builds_one_canonical_transcript() {
        let state = populated_state();
        let g = gene("c\ts\tgene\t101\t260\t.\t+\t.\tID=g1;Name=G");
        let g = collapse_gene(g, &state, Linkage::ById, true);

        let items = g.items();
        assert_eq!(items.len(), 1);
        let canonical = &items[0];
        assert!(canonical.canonical);
        assert_eq!((canonical.start, canonical.end), (100, 260));

        let spans: Vec<_> = canonical.items().iter().map(|f| (f.start, f.end)).collect();
        assert_eq!(spans, vec![(100, 200), (240, 260)]);
        assert_eq!(g.exons_count, Some(1));
        assert_eq!(g.aminoacid_length, Some(6));
        assert!(state.is_drained());
    }

    #[test]
    fn expand_keeps_transcripts_apart() {
        let state = populated_state();
        let g = gene("c\ts\tgene\t101\t260\t.\t+\t.\tID=g1");
        let g = expand_gene(g, &state, Linkage::ById, true);

        let items = g.items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].feature_id.as_deref(), Some("t1"));
        assert_eq!(items[0].items().len(), 2);
        assert_eq!(items[0].exons_count, Some(2));
        assert_eq!(items[0].aminoacid_length, Some(23));
        assert_eq!(items[1].feature_id.as_deref(), Some("t2"));
        assert!(state.is_drained());
    }

    #[test]
    fn coarse_assembly_drains_without_attaching() {
        let state = populated_state();
        let g = gene("c\ts\tgene\t101\t260\t.\t+\t.\tID=g1");
        let g = collapse_gene(g, &state, Linkage::ById, false);
        assert!(g.items.is_none());
        assert!(state.is_drained());
    }
}
