use log::{trace, warn};

use crate::{
    gene::{exon_stats, Gene},
    linkage::Placement,
    partition::Interval,
    reader::{ReaderResult, RegionSource, SourceKind},
    record::FeatureRecord,
    state::HierarchyState,
};

/// A transcript that reaches past the sub-interval of the worker that
/// stored it. Its exon statistics are recounted over its full span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlappedTranscript {
    /// Chromosome of the transcript.
    pub chrom: String,
    /// Key of the gene the transcript is filed under.
    pub gene: String,
    /// Transcript id.
    pub transcript: String,
    /// Full span of the transcript.
    pub span: Interval,
}

/// Scans one sub-interval of `chrom` and files every new record into
/// `state`.
///
/// Records are processed in file order. The reader is opened here and
/// dropped on every return path. The first malformed record or I/O failure
/// ends the task and is returned as its result.
pub fn scan_interval(
    source: &dyn RegionSource,
    kind: SourceKind,
    chrom: &str,
    interval: Interval,
    state: &HierarchyState,
) -> ReaderResult<Vec<OverlappedTranscript>> {
    let linkage = source.linkage();
    let records = source.query(kind, chrom, interval)?;

    let mut overlapped = Vec::new();
    let mut filed = 0usize;
    for record in records {
        let record = record?;
        if !state.mark_seen(record.key()) {
            continue;
        }
        filed += 1;

        match linkage.place(&record) {
            Placement::Gene => state.push_gene(Gene::from_record(record)),
            Placement::Transcript { gene, transcript } => {
                if interval.spills(record.start, record.end) {
                    overlapped.push(OverlappedTranscript {
                        chrom: record.chrom.clone(),
                        gene: gene.clone(),
                        transcript: transcript.clone(),
                        span: Interval::new(record.start, record.end),
                    });
                }
                state.insert_transcript(&gene, &transcript, Gene::from_record(record));
            }
            Placement::SubFeature { gene, transcript } => {
                state.push_sub_feature(&gene, &transcript, Gene::from_record(record))
            }
            Placement::Unmapped => {
                let mut feature = Gene::from_record(record);
                feature.mapped = false;
                state.push_unmapped(feature);
            }
        }
    }

    trace!(
        "{}:{} filed {} records, {} transcripts cross the boundary",
        chrom,
        interval,
        filed,
        overlapped.len()
    );
    Ok(overlapped)
}

/// Recounts exons of boundary-crossing transcripts over their own span and
/// overwrites the stored exon statistics.
///
/// Runs sequentially after every scan task has finished.
pub fn correct_overlaps(
    source: &dyn RegionSource,
    kind: SourceKind,
    overlapped: &[OverlappedTranscript],
    state: &HierarchyState,
) -> ReaderResult<()> {
    let linkage = source.linkage();

    for entry in overlapped {
        let (slot_gene, slot_transcript) =
            linkage.sub_feature_slot(&entry.gene, &entry.transcript);
        let mut exons = Vec::new();
        for record in source.query(kind, &entry.chrom, entry.span)? {
            let record: FeatureRecord = record?;
            let belongs = matches!(
                linkage.place(&record),
                Placement::SubFeature { gene, transcript }
                    if gene == slot_gene && transcript == slot_transcript
            );
            if belongs {
                exons.push((record.kind, record.len()));
            }
        }

        let (count, bases) = exon_stats(exons);
        let found = state.update_transcript(&entry.gene, &entry.transcript, |transcript| {
            transcript.set_exon_stats(count, bases)
        });
        if !found {
            warn!(
                "transcript {} of {} left the hierarchy before its exons were recounted",
                entry.transcript, entry.gene
            );
        }
    }

    Ok(())
}
