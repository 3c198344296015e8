use std::path::Path;

use crate::{
    gene::Gene,
    record::{Attributes, FeatureKind, FeatureRecord, Identity, GENE_ID_KEY, ID_KEY, PARENT_KEY, TRANSCRIPT_ID_KEY},
};

/// How flat GXF records declare their parents.
///
/// Selected once per data source from its file type. Both variants share
/// the same hierarchy builder; only the pure functions below differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Linkage {
    /// GFF3: `ID` / `Parent` attributes.
    ById,
    /// GTF: every line of a gene shares a `gene_id` group key and names its
    /// transcript with `transcript_id`.
    ByGroup,
}

/// Where a record goes in the hierarchy being built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Top-level gene record.
    Gene,
    /// Transcript of `gene`, stored under `transcript`.
    Transcript { gene: String, transcript: String },
    /// Sub-feature stored under the `(gene, transcript)` slot.
    SubFeature { gene: String, transcript: String },
    /// No resolvable parent or group.
    Unmapped,
}

impl Linkage {
    /// Separator used between keys and values within the attribute column.
    pub const fn attr_separator(self) -> u8 {
        match self {
            Linkage::ById => b'=',
            Linkage::ByGroup => b' ',
        }
    }

    /// Human readable format name (for error messages).
    pub const fn type_name(self) -> &'static str {
        match self {
            Linkage::ById => "GFF",
            Linkage::ByGroup => "GTF",
        }
    }

    /// Picks the linkage scheme from a file name.
    ///
    /// Compression suffixes are ignored, so `genes.gtf.gz` is a GTF file.
    /// Anything that is not GTF is read as GFF3.
    ///
    /// # Example
    ///
    /// ```
    /// use genetrack::linkage::Linkage;
    ///
    /// assert_eq!(Linkage::from_path("a/genes.gtf.gz"), Linkage::ByGroup);
    /// assert_eq!(Linkage::from_path("a/genes.gff3"), Linkage::ById);
    /// ```
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let mut ext = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
        if matches!(ext, "gz" | "bgz" | "zst" | "zstd" | "bz2" | "bzip2") {
            ext = path
                .file_stem()
                .map(Path::new)
                .and_then(|stem| stem.extension())
                .and_then(|ext| ext.to_str())
                .unwrap_or("");
        }
        Self::from_extension(ext)
    }

    /// Picks the linkage scheme from a bare extension (`gtf`, `gff3`, ...).
    pub fn from_extension(ext: &str) -> Self {
        if ext.eq_ignore_ascii_case("gtf") {
            Linkage::ByGroup
        } else {
            Linkage::ById
        }
    }

    /// Extracts the linkage identity from a parsed attribute column.
    pub(crate) fn identity(self, attributes: &Attributes) -> Identity {
        match self {
            Linkage::ById => Identity::ById {
                id: attributes.get(ID_KEY).cloned(),
                // a feature with several parents is attached to the first one
                parent_id: attributes
                    .get(PARENT_KEY)
                    .and_then(|parents| parents.split(',').next())
                    .filter(|parent| !parent.is_empty())
                    .map(str::to_string),
            },
            Linkage::ByGroup => Identity::ByGroup {
                group_id: attributes.get(GENE_ID_KEY).cloned(),
                transcript_id: attributes.get(TRANSCRIPT_ID_KEY).cloned(),
            },
        }
    }

    /// Classifies a record into its place in the gene hierarchy.
    ///
    /// # Example
    ///
    /// ```
    /// use genetrack::{linkage::{Linkage, Placement}, record::FeatureRecord};
    ///
    /// let line = "chr1\ts\texon\t1\t10\t.\t+\t.\tgene_id \"G\"; transcript_id \"T\";";
    /// let record = FeatureRecord::parse(line, 1, Linkage::ByGroup).unwrap();
    /// assert_eq!(
    ///     Linkage::ByGroup.place(&record),
    ///     Placement::SubFeature { gene: "G".into(), transcript: "T".into() }
    /// );
    /// ```
    pub fn place(self, record: &FeatureRecord) -> Placement {
        if record.kind == FeatureKind::Gene {
            return Placement::Gene;
        }

        match (&record.identity, self) {
            (Identity::ById { id, parent_id }, Linkage::ById) => {
                let Some(parent) = parent_id else {
                    return Placement::Unmapped;
                };
                if record.kind == FeatureKind::Transcript {
                    match id {
                        Some(id) => Placement::Transcript {
                            gene: parent.clone(),
                            transcript: id.clone(),
                        },
                        None => Placement::Unmapped,
                    }
                } else {
                    let (gene, transcript) = self.sub_feature_slot("", parent);
                    Placement::SubFeature { gene, transcript }
                }
            }
            (
                Identity::ByGroup {
                    group_id,
                    transcript_id,
                },
                Linkage::ByGroup,
            ) => match (group_id, transcript_id) {
                (Some(gene), Some(transcript)) if record.kind == FeatureKind::Transcript => {
                    Placement::Transcript {
                        gene: gene.clone(),
                        transcript: transcript.clone(),
                    }
                }
                (Some(gene), Some(transcript)) => {
                    let (gene, transcript) = self.sub_feature_slot(gene, transcript);
                    Placement::SubFeature { gene, transcript }
                }
                _ => Placement::Unmapped,
            },
            // record parsed under the other scheme: nothing links it
            _ => Placement::Unmapped,
        }
    }

    /// Key under which a gene's transcripts are stored.
    pub fn gene_key(self, gene: &Gene) -> Option<&str> {
        match self {
            Linkage::ById => gene.feature_id.as_deref(),
            Linkage::ByGroup => gene.group_id.as_deref(),
        }
    }

    /// Slot of the sub-features of `transcript` belonging to `gene`.
    ///
    /// GFF3 sub-features only name their transcript, so both levels of the
    /// slot are the transcript id there.
    pub fn sub_feature_slot(self, gene: &str, transcript: &str) -> (String, String) {
        match self {
            Linkage::ById => (transcript.to_string(), transcript.to_string()),
            Linkage::ByGroup => (gene.to_string(), transcript.to_string()),
        }
    }

    /// Returns the transcript a record is attached to, if any.
    pub fn transcript_of(self, record: &FeatureRecord) -> Option<&str> {
        match &record.identity {
            Identity::ById { parent_id, .. } => parent_id.as_deref(),
            Identity::ByGroup { transcript_id, .. } => transcript_id.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gff(line: &str) -> FeatureRecord {
        FeatureRecord::parse(line, 1, Linkage::ById).unwrap()
    }

    fn gtf(line: &str) -> FeatureRecord {
        FeatureRecord::parse(line, 1, Linkage::ByGroup).unwrap()
    }

    #[test]
    fn detect_from_path() {
        assert_eq!(Linkage::from_path("x.gtf"), Linkage::ByGroup);
        assert_eq!(Linkage::from_path("x.GTF.bgz"), Linkage::ByGroup);
        assert_eq!(Linkage::from_path("x.gff.gz"), Linkage::ById);
        assert_eq!(Linkage::from_path("x"), Linkage::ById);
    }

    #[test]
    fn place_gff_records() {
        let linkage = Linkage::ById;
        assert_eq!(
            linkage.place(&gff("c\ts\tgene\t1\t90\t.\t+\t.\tID=g1")),
            Placement::Gene
        );
        assert_eq!(
            linkage.place(&gff("c\ts\tmRNA\t1\t90\t.\t+\t.\tID=t1;Parent=g1")),
            Placement::Transcript {
                gene: "g1".into(),
                transcript: "t1".into()
            }
        );
        assert_eq!(
            linkage.place(&gff("c\ts\texon\t1\t30\t.\t+\t.\tParent=t1,t2")),
            Placement::SubFeature {
                gene: "t1".into(),
                transcript: "t1".into()
            }
        );
        assert_eq!(
            linkage.place(&gff("c\ts\tregion\t1\t30\t.\t+\t.\tID=r1")),
            Placement::Unmapped
        );
        assert_eq!(
            linkage.place(&gff("c\ts\tmRNA\t1\t30\t.\t+\t.\tParent=g1")),
            Placement::Unmapped
        );
    }

    #[test]
    fn place_gtf_records() {
        let linkage = Linkage::ByGroup;
        assert_eq!(
            linkage.place(&gtf("c\ts\ttranscript\t1\t90\t.\t+\t.\tgene_id \"G\"; transcript_id \"T\";")),
            Placement::Transcript {
                gene: "G".into(),
                transcript: "T".into()
            }
        );
        assert_eq!(
            linkage.place(&gtf("c\ts\texon\t1\t90\t.\t+\t.\tgene_id \"G\";")),
            Placement::Unmapped
        );
        assert_eq!(
            linkage.place(&gtf("c\ts\tgene\t1\t90\t.\t+\t.\tgene_id \"G\";")),
            Placement::Gene
        );
    }

    #[test]
    fn mismatched_scheme_is_unmapped() {
        let record = gtf("c\ts\texon\t1\t9\t.\t+\t.\tgene_id \"G\"; transcript_id \"T\";");
        assert_eq!(Linkage::ById.place(&record), Placement::Unmapped);
    }
}
