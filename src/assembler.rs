use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, trace};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::{
    assemble::{collapse_gene, expand_gene, sort_by_span},
    gene::Gene,
    linkage::Linkage,
    partition::{partition, Interval, Region, MAX_BLOCK_SIZE},
    reader::{GxfSource, ReaderError, RegionSource, SourceKind},
    scan::{correct_overlaps, scan_interval, OverlappedTranscript},
    state::HierarchyState,
    statistic::StatisticAggregator,
};

/// Scale factor below which the coarse large-scale source is read and gene
/// detail is left out.
pub const LARGE_SCALE_FACTOR_LIMIT: f64 = 0.001;

/// Environment variable overriding the default worker pool size.
pub const THREADS_ENV: &str = "GENETRACK_NUM_THREADS";

/// Result alias for assembly operations.
pub type AssemblyResult<T> = Result<T, AssemblyError>;

/// An error that fails a whole assembly call.
#[derive(Debug)]
pub enum AssemblyError {
    /// The requested region is empty of meaning (start after end, or past
    /// the end of the chromosome).
    InvalidRegion {
        /// Requested start.
        start: u64,
        /// Requested end.
        end: u64,
    },
    /// An argument outside its domain.
    InvalidInput(String),
    /// The worker pool could not be built.
    ThreadPool(String),
    /// The data source could not be opened.
    Source(ReaderError),
    /// At least one scan task failed.
    Scan {
        /// Name of the data source.
        source: String,
        /// Requested region, unsplit.
        region: Region,
        /// Every task error, in sub-interval order.
        errors: Vec<ReaderError>,
    },
    /// Re-reading a boundary-crossing transcript failed.
    Correction {
        /// Name of the data source.
        source: String,
        /// Requested region, unsplit.
        region: Region,
        /// The underlying error.
        error: ReaderError,
    },
}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyError::InvalidRegion { start, end } => {
                write!(f, "invalid region bounds {start}-{end}")
            }
            AssemblyError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            AssemblyError::ThreadPool(msg) => write!(f, "worker pool error: {msg}"),
            AssemblyError::Source(err) => write!(f, "could not open source: {err}"),
            AssemblyError::Scan {
                source,
                region,
                errors,
            } => {
                write!(
                    f,
                    "failed to read genes from {source} at {region} ({} failed task(s))",
                    errors.len()
                )?;
                if let Some(first) = errors.first() {
                    write!(f, ": {first}")?;
                }
                Ok(())
            }
            AssemblyError::Correction {
                source,
                region,
                error,
            } => write!(
                f,
                "failed to recount exons from {source} at {region}: {error}"
            ),
        }
    }
}

impl std::error::Error for AssemblyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AssemblyError::Scan { errors, .. } => errors
                .first()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            AssemblyError::Correction { error, .. } | AssemblyError::Source(error) => Some(error),
            _ => None,
        }
    }
}

impl From<ReaderError> for AssemblyError {
    fn from(err: ReaderError) -> Self {
        AssemblyError::Source(err)
    }
}

/// Tuning knobs of a [`GeneAssembler`].
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblerOptions {
    max_block_size: u64,
    large_scale_limit: f64,
    threads: Option<usize>,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            max_block_size: MAX_BLOCK_SIZE,
            large_scale_limit: LARGE_SCALE_FACTOR_LIMIT,
            threads: None,
        }
    }
}

impl AssemblerOptions {
    /// Creates a new options builder with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the widest sub-interval one scan task reads.
    pub fn max_block_size(mut self, size: u64) -> Self {
        self.max_block_size = size;
        self
    }

    /// Sets the scale factor below which the large-scale source is used.
    pub fn large_scale_limit(mut self, limit: f64) -> Self {
        self.large_scale_limit = limit;
        self
    }

    /// Sets the worker pool size.
    ///
    /// Defaults to `GENETRACK_NUM_THREADS` when set, else the number of
    /// available cores.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    fn resolved_threads(&self) -> usize {
        self.threads
            .or_else(|| {
                std::env::var(THREADS_ENV)
                    .ok()
                    .and_then(|raw| raw.parse::<usize>().ok())
            })
            .filter(|threads| *threads > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(usize::from)
                    .unwrap_or(1)
            })
    }
}

/// A builder for creating a [`GeneAssembler`].
pub struct AssemblerBuilder<S> {
    source: S,
    options: AssemblerOptions,
}

impl<S: RegionSource> AssemblerBuilder<S> {
    /// Starts a builder over `source`.
    pub fn new(source: S) -> Self {
        Self {
            source,
            options: AssemblerOptions::default(),
        }
    }

    /// Replaces all options at once.
    pub fn options(mut self, options: AssemblerOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the widest sub-interval one scan task reads.
    pub fn max_block_size(mut self, size: u64) -> Self {
        self.options = self.options.max_block_size(size);
        self
    }

    /// Sets the scale factor below which the large-scale source is used.
    pub fn large_scale_limit(mut self, limit: f64) -> Self {
        self.options = self.options.large_scale_limit(limit);
        self
    }

    /// Sets the worker pool size.
    pub fn threads(mut self, threads: usize) -> Self {
        self.options = self.options.threads(threads);
        self
    }

    /// Builds the assembler and its worker pool.
    pub fn build(self) -> AssemblyResult<GeneAssembler<S>> {
        if self.options.max_block_size == 0 {
            return Err(AssemblyError::InvalidInput(
                "ERROR: block size must be greater than 0".into(),
            ));
        }
        if !(self.options.large_scale_limit.is_finite() && self.options.large_scale_limit >= 0.0) {
            return Err(AssemblyError::InvalidInput(format!(
                "ERROR: large-scale limit must be a finite non-negative number, got {}",
                self.options.large_scale_limit
            )));
        }

        let threads = self.options.resolved_threads();
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("genetrack-scan-{idx}"))
            .build()
            .map_err(|err| AssemblyError::ThreadPool(err.to_string()))?;
        debug!("built scan pool with {} threads", threads);

        Ok(GeneAssembler {
            source: self.source,
            options: self.options,
            pool: Arc::new(pool),
        })
    }
}

/// Rebuilds gene hierarchies from a region-queryable annotation source.
///
/// # Example
///
/// ```
/// use genetrack::{linkage::Linkage, partition::Region, reader::GxfSource, GeneAssembler};
///
/// let text = "\
/// chr1\tsrc\tgene\t101\t400\t.\t+\t.\tID=g1;Name=ABC
/// chr1\tsrc\tmRNA\t101\t400\t.\t+\t.\tID=t1;Parent=g1
/// chr1\tsrc\texon\t101\t200\t.\t+\t.\tParent=t1
/// chr1\tsrc\texon\t301\t400\t.\t+\t.\tParent=t1
/// ";
/// let source = GxfSource::from_text(Linkage::ById, text).unwrap();
/// let assembler = GeneAssembler::builder(source).threads(2).build().unwrap();
///
/// let genes = assembler
///     .assemble_features(&Region::new("chr1", 0, 1_000), 1_000, 1.0, false, 4)
///     .unwrap();
/// assert_eq!(genes.len(), 1);
/// assert_eq!(genes[0].items()[0].exons_count, Some(2));
/// ```
pub struct GeneAssembler<S> {
    source: S,
    options: AssemblerOptions,
    pool: Arc<ThreadPool>,
}

impl GeneAssembler<GxfSource> {
    /// Creates an assembler over a GFF3/GTF file with default options.
    pub fn from_gxf<P: AsRef<Path>>(path: P) -> AssemblyResult<Self> {
        let source = GxfSource::from_path(path)?;
        AssemblerBuilder::new(source).build()
    }
}

impl<S: RegionSource> GeneAssembler<S> {
    /// Creates a new `AssemblerBuilder`.
    pub fn builder(source: S) -> AssemblerBuilder<S> {
        AssemblerBuilder::new(source)
    }

    /// Returns the underlying source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Returns the options in effect.
    pub fn options(&self) -> &AssemblerOptions {
        &self.options
    }

    /// Number of threads in the scan pool.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Assembles the features of `region` for display at `scale_factor`
    /// pixels per base pair.
    ///
    /// The region is split into sub-intervals of at most `max_block_size`
    /// bp, at most `max_workers` of them, scanned in parallel. Genes are
    /// returned with one canonical transcript when `collapse` is set and
    /// with all their transcripts otherwise. Features narrower than a pixel
    /// are folded into statistic blocks. The output is ordered by start.
    ///
    /// Regions are half-open, so an empty region yields no features. When
    /// collapsing, overlapping sub-features merge into `CDS` children and
    /// only the exons that merged with nothing are counted in
    /// `exons_count`.
    ///
    /// # Errors
    ///
    /// Fails before scanning on invalid bounds or arguments. Fails after
    /// every scan task has finished if any of them failed; no partial
    /// result is returned.
    pub fn assemble_features(
        &self,
        region: &Region,
        chromosome_length: u64,
        scale_factor: f64,
        collapse: bool,
        max_workers: usize,
    ) -> AssemblyResult<Vec<Gene>> {
        if !(scale_factor.is_finite() && scale_factor > 0.0) {
            return Err(AssemblyError::InvalidInput(format!(
                "ERROR: scale factor must be a positive number, got {scale_factor}"
            )));
        }
        if region.start > region.end || region.start > chromosome_length {
            return Err(AssemblyError::InvalidRegion {
                start: region.start,
                end: region.end,
            });
        }

        let interval = Interval::new(region.start, region.end.min(chromosome_length));
        let parts = partition(interval, max_workers, self.options.max_block_size)?;
        let kind = SourceKind::for_scale(scale_factor, self.options.large_scale_limit);
        let detailed = scale_factor > self.options.large_scale_limit;
        debug!(
            "assembling {} with {} sub-intervals from the {:?} source",
            region,
            parts.len(),
            kind
        );

        let state = HierarchyState::new();
        let overlapped = self.scan(region, kind, &parts, &state)?;

        let source = &self.source;
        correct_overlaps(source, kind, &overlapped, &state).map_err(|error| {
            AssemblyError::Correction {
                source: source.name().to_string(),
                region: region.clone(),
                error,
            }
        })?;

        let started = Instant::now();
        let genes = self.assemble(&state, scale_factor, collapse, detailed);
        debug!(
            "assembly of {} features took {} ms",
            genes.len(),
            started.elapsed().as_millis()
        );
        Ok(genes)
    }

    /// Runs every scan task to completion and joins their results.
    fn scan(
        &self,
        region: &Region,
        kind: SourceKind,
        parts: &[Interval],
        state: &HierarchyState,
    ) -> AssemblyResult<Vec<OverlappedTranscript>> {
        let started = Instant::now();
        let source = &self.source;
        let chrom = region.chrom.as_str();

        let results: Vec<_> = self.pool.install(|| {
            parts
                .par_iter()
                .map(|part| {
                    trace!("scanning {}:{}", chrom, part);
                    scan_interval(source, kind, chrom, *part, state)
                })
                .collect()
        });
        debug!(
            "reading {} distinct records in {} threads took {} ms",
            state.seen_len(),
            parts.len(),
            started.elapsed().as_millis()
        );

        let mut overlapped = Vec::new();
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(found) => overlapped.extend(found),
                Err(err) => errors.push(err),
            }
        }

        if errors.is_empty() {
            Ok(overlapped)
        } else {
            Err(AssemblyError::Scan {
                source: source.name().to_string(),
                region: region.clone(),
                errors,
            })
        }
    }

    /// Drains `state` into the ordered output list.
    fn assemble(
        &self,
        state: &HierarchyState,
        scale_factor: f64,
        collapse: bool,
        detailed: bool,
    ) -> Vec<Gene> {
        let linkage = self.source.linkage();
        let genes = state.take_genes();

        let mut candidates: Vec<Gene> = self.pool.install(|| {
            genes
                .into_par_iter()
                .map(|gene| {
                    if collapse {
                        collapse_gene(gene, state, linkage, detailed)
                    } else {
                        expand_gene(gene, state, linkage, detailed)
                    }
                })
                .collect()
        });

        candidates.extend(leftover_transcripts(state, linkage));
        candidates.extend(state.drain_sub_features().into_iter().map(unmap));
        candidates.extend(state.take_unmapped());
        sort_by_span(&mut candidates);

        debug_assert!(state.is_drained());

        let mut aggregator = StatisticAggregator::new(scale_factor);
        for candidate in candidates {
            aggregator.offer(candidate);
        }
        aggregator.into_sorted()
    }
}

/// Transcripts whose gene was never seen, each with the sub-features filed
/// under it.
fn leftover_transcripts(state: &HierarchyState, linkage: Linkage) -> Vec<Gene> {
    state
        .drain_transcripts()
        .into_iter()
        .map(|(gene, id, mut transcript)| {
            let (slot_gene, slot_transcript) = linkage.sub_feature_slot(&gene, &id);
            let mut sub_features = state.take_sub_features(&slot_gene, &slot_transcript);
            if !sub_features.is_empty() {
                sort_by_span(&mut sub_features);
                transcript.fill_exon_stats(&sub_features);
                transcript.items = Some(sub_features);
            }
            unmap(transcript)
        })
        .collect()
}

fn unmap(mut feature: Gene) -> Gene {
    feature.mapped = false;
    feature
}
