use crate::{
    record::{
        Attributes, FeatureKind, FeatureRecord, Identity, EXON_ID_KEY, GENE_ID_KEY, NAME_KEYS,
        TRANSCRIPT_ID_KEY, TRANSCRIPT_NAME_KEY,
    },
    strand::Strand,
};

const CODON_LENGTH: u64 = 3;
const TRANSCRIPT_FEATURE: &str = "transcript";
/// Feature type of synthetic statistic blocks.
pub const STATISTIC_FEATURE: &str = "statistic";

/// Assembled feature returned to callers.
///
/// A `Gene` is a gene, a transcript, a sub-feature, an unmapped record or a
/// synthetic statistic block, depending on where it sits in the output tree.
/// Coordinates are 0-based half-open.
#[derive(Debug, Clone, PartialEq)]
pub struct Gene {
    /// Chromosome or scaffold name.
    pub chrom: String,
    /// Source column of the originating record.
    pub source: String,
    /// Feature type (`gene`, `mRNA`, `exon`, `statistic`, ...).
    pub feature: String,
    /// Classified feature type.
    pub kind: FeatureKind,
    /// 0-based start position.
    pub start: u64,
    /// Exclusive end position.
    pub end: u64,
    /// Score column, if any.
    pub score: Option<f32>,
    /// Strand; `None` on statistic blocks.
    pub strand: Option<Strand>,
    /// CDS phase (0, 1 or 2).
    pub frame: Option<u8>,
    /// Parsed attribute column.
    pub attributes: Attributes,
    /// GFF3 `ID`, or the GTF id matching the feature level.
    pub feature_id: Option<String>,
    /// First GFF3 `Parent`, or the GTF `gene_id`.
    pub parent_id: Option<String>,
    /// GTF `gene_id`; the `"N Features"` label on statistic blocks.
    pub group_id: Option<String>,
    /// Value of the first name attribute present.
    pub feature_name: Option<String>,
    /// Number of exon children, once known.
    pub exons_count: Option<u64>,
    /// Summed exon length over the codon length, once known.
    pub aminoacid_length: Option<u64>,
    /// True for the synthetic transcript produced in collapse mode.
    pub canonical: bool,
    /// False for records that could not be attached to a gene.
    pub mapped: bool,
    /// Number of real features represented (1 unless a statistic block).
    pub feature_count: u32,
    /// Ordered children: transcripts of a gene or sub-features of a transcript.
    pub items: Option<Vec<Gene>>,
}

impl Gene {
    /// Builds a `Gene` from a parsed record.
    pub fn from_record(record: FeatureRecord) -> Self {
        let feature_name = NAME_KEYS
            .iter()
            .find_map(|key| record.attributes.get(*key))
            .cloned();

        let (feature_id, parent_id, group_id) = match record.identity {
            Identity::ById { id, parent_id } => {
                let group_id = record.attributes.get(GENE_ID_KEY).cloned();
                (id, parent_id, group_id)
            }
            Identity::ByGroup {
                group_id,
                transcript_id,
            } => {
                let feature_id = match record.kind {
                    FeatureKind::Gene => group_id.clone(),
                    FeatureKind::Transcript => transcript_id,
                    _ => record.attributes.get(EXON_ID_KEY).cloned(),
                };
                (feature_id, group_id.clone(), group_id)
            }
        };

        Self {
            chrom: record.chrom,
            source: record.source,
            feature: record.feature,
            kind: record.kind,
            start: record.start,
            end: record.end,
            score: record.score,
            strand: Some(record.strand),
            frame: record.frame,
            attributes: record.attributes,
            feature_id,
            parent_id,
            group_id,
            feature_name,
            exons_count: None,
            aminoacid_length: None,
            canonical: false,
            mapped: true,
            feature_count: 1,
            items: None,
        }
    }

    /// Synthesizes the canonical transcript standing in for all of `gene`'s
    /// transcripts in collapse mode.
    ///
    /// The span starts as the gene's span; the assembler replaces it with
    /// the union of the real transcripts.
    pub fn canonical_transcript(gene: &Gene) -> Self {
        let mut attributes = Attributes::new();
        if let Some(name) = &gene.feature_name {
            attributes.insert(TRANSCRIPT_NAME_KEY.to_string(), name.clone());
        }
        if let Some(id) = &gene.feature_id {
            attributes.insert(GENE_ID_KEY.to_string(), id.clone());
        }

        Self {
            chrom: gene.chrom.clone(),
            source: gene.source.clone(),
            feature: TRANSCRIPT_FEATURE.to_string(),
            kind: FeatureKind::Transcript,
            start: gene.start,
            end: gene.end,
            score: None,
            strand: gene.strand,
            frame: None,
            attributes,
            feature_id: gene.feature_id.clone(),
            parent_id: gene.parent_id.clone(),
            group_id: gene.group_id.clone(),
            feature_name: gene.feature_name.clone(),
            exons_count: None,
            aminoacid_length: None,
            canonical: true,
            mapped: true,
            feature_count: 1,
            items: None,
        }
    }

    /// Returns the length of the feature (end - start).
    #[inline]
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Returns true if the feature has zero length.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Returns true if the feature spans at least one pixel at `scale_factor`
    /// pixels per base pair.
    #[inline]
    pub fn passes_scale(&self, scale_factor: f64) -> bool {
        self.len() as f64 * scale_factor >= 1.0
    }

    /// Returns true for synthetic statistic blocks.
    #[inline]
    pub fn is_statistic(&self) -> bool {
        self.feature == STATISTIC_FEATURE
    }

    /// Returns the children of this feature, or an empty slice.
    #[inline]
    pub fn items(&self) -> &[Gene] {
        self.items.as_deref().unwrap_or(&[])
    }

    /// Grows this feature's span so that it covers `other`.
    pub fn cover(&mut self, other: &Gene) {
        self.start = self.start.min(other.start);
        self.end = self.end.max(other.end);
    }

    /// Folds `other` into this feature, turning it into a statistic block.
    ///
    /// Per-feature fields are cleared since the block no longer describes a
    /// single feature; the start is unchanged, the end only grows.
    pub fn absorb_statistic(&mut self, other: &Gene) {
        self.feature_count += other.feature_count;
        let label = format!("{} Features", self.feature_count);
        self.attributes = Attributes::from([("name".to_string(), label.clone())]);
        self.group_id = Some(label);
        self.feature = STATISTIC_FEATURE.to_string();
        self.kind = FeatureKind::Other;
        self.score = None;
        self.frame = None;
        self.exons_count = None;
        self.aminoacid_length = None;
        self.parent_id = None;
        self.strand = None;
        self.items = None;
        self.canonical = false;

        if self.end < other.end {
            self.end = other.end;
        }
    }

    /// Counts exon children and derives the amino-acid length from their
    /// total base length.
    ///
    /// Partial codons are truncated by integer division.
    pub fn compute_exon_stats(&mut self, children: &[Gene]) {
        let (count, bases) = exon_stats(children.iter().map(|child| (child.kind, child.len())));
        self.exons_count = Some(count);
        self.aminoacid_length = Some(bases / CODON_LENGTH);
    }

    /// Same as [`Gene::compute_exon_stats`], but keeps values that are
    /// already known.
    pub fn fill_exon_stats(&mut self, children: &[Gene]) {
        if self.exons_count.is_none() {
            self.compute_exon_stats(children);
        }
    }

    /// Overwrites the exon statistics with externally counted values.
    pub fn set_exon_stats(&mut self, count: u64, bases: u64) {
        self.exons_count = Some(count);
        self.aminoacid_length = Some(bases / CODON_LENGTH);
    }

    /// Returns the `transcript_id` attribute, if present.
    pub fn transcript_id(&self) -> Option<&str> {
        self.attributes.get(TRANSCRIPT_ID_KEY).map(String::as_str)
    }
}

/// Returns `(exon count, total exon bases)` for a sequence of
/// `(kind, length)` pairs.
pub(crate) fn exon_stats<I>(features: I) -> (u64, u64)
where
    I: IntoIterator<Item = (FeatureKind, u64)>,
{
    features
        .into_iter()
        .filter(|(kind, _)| *kind == FeatureKind::Exon)
        .fold((0, 0), |(count, bases), (_, len)| (count + 1, bases + len))
}
