use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(feature = "bz2")]
use bzip2::read::BzDecoder;
#[cfg(feature = "gzip")]
use flate2::read::MultiGzDecoder;
#[cfg(feature = "zstd")]
use zstd::stream::read::Decoder as ZstdDecoder;

use crate::{
    linkage::Linkage,
    partition::Interval,
    record::{self, FeatureKind, FeatureRecord},
};

/// Result alias for reader operations.
pub type ReaderResult<T> = Result<T, ReaderError>;

/// An error that can occur when reading annotation records.
#[derive(Debug)]
pub enum ReaderError {
    /// An I/O error.
    Io(io::Error),
    /// An error that occurred when decoding a line.
    InvalidEncoding {
        /// The line number where the error occurred.
        line: usize,
        /// The error message.
        message: String,
    },
    /// An error that occurred when parsing a field.
    InvalidField {
        /// The line number where the error occurred.
        line: usize,
        /// The name of the field that could not be parsed.
        field: &'static str,
        /// The error message.
        message: String,
    },
    /// An error that occurred when building a source.
    Builder(String),
}

impl fmt::Display for ReaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderError::Io(err) => write!(f, "I/O error: {err}"),
            ReaderError::InvalidEncoding { line, message } => {
                write!(f, "invalid UTF-8 at line {line}: {message}")
            }
            ReaderError::InvalidField {
                line,
                field,
                message,
            } => write!(f, "invalid {field} at line {line}: {message}"),
            ReaderError::Builder(msg) => write!(f, "builder error: {msg}"),
        }
    }
}

impl std::error::Error for ReaderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReaderError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ReaderError {
    fn from(err: io::Error) -> Self {
        ReaderError::Io(err)
    }
}

impl ReaderError {
    /// Creates a new `ReaderError` for an invalid field.
    pub(crate) fn invalid_field(line: usize, field: &'static str, message: String) -> ReaderError {
        ReaderError::InvalidField {
            line,
            field,
            message,
        }
    }

    fn invalid_encoding(line: usize, message: impl Into<String>) -> ReaderError {
        ReaderError::InvalidEncoding {
            line,
            message: message.into(),
        }
    }
}

/// Which physical variant of a data source to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Full-detail annotation.
    Original,
    /// Coarse, gene-level annotation used when zoomed far out.
    LargeScale,
}

impl SourceKind {
    /// Picks the physical variant for a scale factor.
    ///
    /// # Example
    ///
    /// ```
    /// use genetrack::reader::SourceKind;
    ///
    /// assert_eq!(SourceKind::for_scale(0.0005, 0.001), SourceKind::LargeScale);
    /// assert_eq!(SourceKind::for_scale(0.001, 0.001), SourceKind::Original);
    /// ```
    pub fn for_scale(scale_factor: f64, large_scale_limit: f64) -> Self {
        if scale_factor < large_scale_limit {
            SourceKind::LargeScale
        } else {
            SourceKind::Original
        }
    }
}

/// Lazy, finite sequence of records overlapping a region.
///
/// The iterator owns its underlying reader and releases it when dropped.
pub type RegionRecords = Box<dyn Iterator<Item = ReaderResult<FeatureRecord>> + Send>;

/// A data source that can be queried by genomic region.
///
/// Implementations must be shareable across scan workers; every call to
/// [`RegionSource::query`] opens an independent reader.
pub trait RegionSource: Send + Sync {
    /// Name used in error messages.
    fn name(&self) -> &str;

    /// Linkage scheme of the records this source produces.
    fn linkage(&self) -> Linkage;

    /// Opens a reader over every record of `chrom` overlapping
    /// `[interval.start, interval.end)`, in file order.
    fn query(&self, kind: SourceKind, chrom: &str, interval: Interval)
        -> ReaderResult<RegionRecords>;
}

/// The compression format of the input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Automatically detect the compression format from the file extension.
    ///
    /// This is the default.
    #[default]
    Auto,
    /// No compression.
    None,
    /// Gzip compression.
    Gzip,
    /// Zstandard compression.
    Zstd,
    /// Bzip2 compression.
    Bzip2,
}

/// Detect compression from file extension
fn detect_compression_from_extension(path: &Path) -> Compression {
    let ext = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    match ext {
        "gz" | "bgz" => Compression::Gzip,
        "zst" | "zstd" => Compression::Zstd,
        "bz2" | "bzip2" => Compression::Bzip2,
        _ => Compression::None,
    }
}

/// Where the lines of a [`GxfSource`] come from.
#[derive(Debug, Clone)]
enum Backing {
    Path(PathBuf),
    Bytes(Arc<[u8]>),
}

/// A builder for creating a [`GxfSource`].
///
/// # Example
///
/// ```rust,no_run
/// use genetrack::reader::GxfSource;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let source = GxfSource::builder()
///         .from_path("data/genes.gtf.gz")
///         .large_scale_path("data/genes.large.gtf.gz")
///         .buffer_capacity(128 * 1024)
///         .build()?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct GxfSourceBuilder {
    name: Option<String>,
    original: Option<Backing>,
    large_scale: Option<Backing>,
    linkage: Option<Linkage>,
    buffer_capacity: usize,
    compression: Compression,
}

impl Default for GxfSourceBuilder {
    fn default() -> Self {
        Self {
            name: None,
            original: None,
            large_scale: None,
            linkage: None,
            buffer_capacity: 64 * 1024,
            compression: Compression::default(),
        }
    }
}

impl GxfSourceBuilder {
    /// Reads the full-detail annotation from a file.
    pub fn from_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.original = Some(Backing::Path(path.as_ref().into()));
        self
    }

    /// Reads the full-detail annotation from in-memory text.
    pub fn from_text<T: AsRef<str>>(mut self, text: T) -> Self {
        self.original = Some(Backing::Bytes(Arc::from(text.as_ref().as_bytes())));
        self
    }

    /// Reads the large-scale annotation from a file.
    pub fn large_scale_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.large_scale = Some(Backing::Path(path.as_ref().into()));
        self
    }

    /// Reads the large-scale annotation from in-memory text.
    pub fn large_scale_text<T: AsRef<str>>(mut self, text: T) -> Self {
        self.large_scale = Some(Backing::Bytes(Arc::from(text.as_ref().as_bytes())));
        self
    }

    /// Sets the linkage scheme. Defaults to detection from the file name.
    pub fn linkage(mut self, linkage: Linkage) -> Self {
        self.linkage = Some(linkage);
        self
    }

    /// Sets the name reported in errors. Defaults to the file path.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the buffer capacity for each reader.
    ///
    /// The default is 64 KB.
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity.max(8 * 1024);
        self
    }

    /// Sets the compression format of file inputs.
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Builds the `GxfSource`.
    pub fn build(self) -> ReaderResult<GxfSource> {
        let original = self
            .original
            .ok_or_else(|| ReaderError::Builder("ERROR: no input source configured".into()))?;

        let (linkage, name) = match &original {
            Backing::Path(path) => (
                self.linkage.unwrap_or_else(|| Linkage::from_path(path)),
                self.name.unwrap_or_else(|| path.display().to_string()),
            ),
            Backing::Bytes(_) => (
                self.linkage.ok_or_else(|| {
                    ReaderError::Builder(
                        "ERROR: in-memory sources need an explicit linkage scheme".into(),
                    )
                })?,
                self.name.unwrap_or_else(|| "<memory>".to_string()),
            ),
        };

        for backing in [Some(&original), self.large_scale.as_ref()].into_iter().flatten() {
            if let Backing::Path(path) = backing {
                check_compression(path, self.compression)?;
            }
        }

        Ok(GxfSource {
            name,
            linkage,
            original,
            large_scale: self.large_scale,
            buffer_capacity: self.buffer_capacity,
            compression: self.compression,
        })
    }
}

/// A GFF3/GTF annotation served by region.
///
/// Each query streams the backing text from the beginning and yields the
/// records of one chromosome overlapping the requested interval. Without a
/// dedicated large-scale backing, large-scale queries read the original
/// annotation and keep gene-level records only.
#[derive(Debug, Clone)]
pub struct GxfSource {
    name: String,
    linkage: Linkage,
    original: Backing,
    large_scale: Option<Backing>,
    buffer_capacity: usize,
    compression: Compression,
}

impl GxfSource {
    /// Creates a new `GxfSourceBuilder`.
    pub fn builder() -> GxfSourceBuilder {
        GxfSourceBuilder::default()
    }

    /// Creates a source over a file, detecting the linkage from its name.
    pub fn from_path<P: AsRef<Path>>(path: P) -> ReaderResult<Self> {
        Self::builder().from_path(path).build()
    }

    /// Creates a source over in-memory annotation text.
    ///
    /// # Example
    ///
    /// ```
    /// use genetrack::{linkage::Linkage, partition::Interval, reader::{GxfSource, RegionSource, SourceKind}};
    ///
    /// let text = "chr1\ts\tgene\t1\t100\t.\t+\t.\tID=g1\nchr2\ts\tgene\t1\t100\t.\t+\t.\tID=g2\n";
    /// let source = GxfSource::from_text(Linkage::ById, text).unwrap();
    /// let records: Vec<_> = source
    ///     .query(SourceKind::Original, "chr2", Interval::new(0, 50))
    ///     .unwrap()
    ///     .collect::<Result<_, _>>()
    ///     .unwrap();
    /// assert_eq!(records.len(), 1);
    /// ```
    pub fn from_text<T: AsRef<str>>(linkage: Linkage, text: T) -> ReaderResult<Self> {
        Self::builder().from_text(text).linkage(linkage).build()
    }

    fn open(&self, backing: &Backing) -> ReaderResult<Box<dyn BufRead + Send>> {
        match backing {
            Backing::Bytes(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            Backing::Path(path) => {
                let stream = open_path_stream(path, self.compression)?;
                Ok(Box::new(BufReader::with_capacity(
                    self.buffer_capacity,
                    stream,
                )))
            }
        }
    }
}

impl RegionSource for GxfSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn linkage(&self) -> Linkage {
        self.linkage
    }

    fn query(
        &self,
        kind: SourceKind,
        chrom: &str,
        interval: Interval,
    ) -> ReaderResult<RegionRecords> {
        let (backing, genes_only) = match (kind, &self.large_scale) {
            (SourceKind::LargeScale, Some(large)) => (large, false),
            (SourceKind::LargeScale, None) => (&self.original, true),
            (SourceKind::Original, _) => (&self.original, false),
        };

        let reader = self.open(backing)?;
        Ok(Box::new(RegionScan {
            reader,
            buf: Vec::with_capacity(1024),
            line_number: 0,
            chrom: chrom.to_string(),
            interval,
            linkage: self.linkage,
            genes_only,
            done: false,
        }))
    }
}

/// Streaming region filter over a GXF text stream.
struct RegionScan {
    reader: Box<dyn BufRead + Send>,
    buf: Vec<u8>,
    line_number: usize,
    chrom: String,
    interval: Interval,
    linkage: Linkage,
    genes_only: bool,
    done: bool,
}

impl RegionScan {
    fn next_record(&mut self) -> Option<ReaderResult<FeatureRecord>> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(err) => return Some(Err(ReaderError::Io(err))),
            }
            self.line_number += 1;

            let line = match std::str::from_utf8(&self.buf) {
                Ok(line) => line.trim_end_matches(['\n', '\r']),
                Err(err) => {
                    return Some(Err(ReaderError::invalid_encoding(
                        self.line_number,
                        err.to_string(),
                    )))
                }
            };
            if record::starts_fasta(line) {
                self.done = true;
                return None;
            }
            if record::should_skip(line) {
                continue;
            }

            let (start, end) = match record::locate(line, &self.chrom, self.line_number) {
                Ok(Some(located)) => located,
                Ok(None) => continue,
                Err(err) => return Some(Err(err)),
            };
            if !overlaps(self.interval, start, end) {
                continue;
            }

            let parsed = FeatureRecord::parse(line, self.line_number, self.linkage);
            match parsed {
                Ok(record) if self.genes_only && record.kind != FeatureKind::Gene => continue,
                other => return Some(other),
            }
        }
    }
}

impl Iterator for RegionScan {
    type Item = ReaderResult<FeatureRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let next = self.next_record();
        // an I/O failure leaves the stream position undefined
        if matches!(next, None | Some(Err(ReaderError::Io(_)))) {
            self.done = true;
        }
        next
    }
}

/// Returns true if `[start, end)` overlaps the half-open query interval.
/// An empty query overlaps nothing.
fn overlaps(query: Interval, start: u64, end: u64) -> bool {
    start < query.end && end > query.start
}

fn check_compression(path: &Path, compression: Compression) -> ReaderResult<()> {
    let compression = match compression {
        Compression::Auto => detect_compression_from_extension(path),
        other => other,
    };
    let enabled = match compression {
        Compression::Auto | Compression::None => true,
        Compression::Gzip => cfg!(feature = "gzip"),
        Compression::Zstd => cfg!(feature = "zstd"),
        Compression::Bzip2 => cfg!(feature = "bz2"),
    };
    if enabled {
        Ok(())
    } else {
        Err(ReaderError::Builder(format!(
            "ERROR: {:?} compression requested for {} but the matching feature is disabled",
            compression,
            path.display()
        )))
    }
}

/// Opens a path as a (possibly decompressing) stream.
fn open_path_stream(path: &Path, compression: Compression) -> ReaderResult<Box<dyn Read + Send>> {
    let file = File::open(path)?;
    let compression = match compression {
        Compression::Auto => detect_compression_from_extension(path),
        other => other,
    };

    match compression {
        Compression::None | Compression::Auto => Ok(Box::new(file)),
        Compression::Gzip => {
            #[cfg(feature = "gzip")]
            {
                Ok(Box::new(MultiGzDecoder::new(file)))
            }
            #[cfg(not(feature = "gzip"))]
            {
                Err(ReaderError::Builder(
                    "gzip compression requested but the `gzip` feature is disabled".into(),
                ))
            }
        }
        Compression::Zstd => {
            #[cfg(feature = "zstd")]
            {
                Ok(Box::new(ZstdDecoder::new(file)?))
            }
            #[cfg(not(feature = "zstd"))]
            {
                Err(ReaderError::Builder(
                    "zstd compression requested but the `zstd` feature is disabled".into(),
                ))
            }
        }
        Compression::Bzip2 => {
            #[cfg(feature = "bz2")]
            {
                Ok(Box::new(BzDecoder::new(file)))
            }
            #[cfg(not(feature = "bz2"))]
            {
                Err(ReaderError::Builder(
                    "bzip2 compression requested but the `bz2` feature is disabled".into(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GFF: &str = "##gff-version 3\n\
chr1\ts\tgene\t101\t200\t.\t+\t.\tID=g1\n\
chr1\ts\tmRNA\t101\t200\t.\t+\t.\tID=t1;Parent=g1\n\
chr1\ts\texon\t101\t120\t.\t+\t.\tParent=t1\n\
chr2\ts\tgene\t101\t200\t.\t+\t.\tID=g2\n\
\n\
chr1\ts\tgene\t501\t600\t.\t-\t.\tID=g3\n";

    fn collect(source: &GxfSource, kind: SourceKind, chrom: &str, start: u64, end: u64) -> Vec<FeatureRecord> {
        source
            .query(kind, chrom, Interval::new(start, end))
            .unwrap()
            .collect::<ReaderResult<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn query_filters_by_chrom_and_overlap() {
        let source = GxfSource::from_text(Linkage::ById, GFF).unwrap();
        let records = collect(&source, SourceKind::Original, "chr1", 110, 150);
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.chrom == "chr1"));

        let records = collect(&source, SourceKind::Original, "chr1", 200, 500);
        assert!(records.is_empty());

        let records = collect(&source, SourceKind::Original, "chr1", 599, 600);
        assert_eq!(records.len(), 1);

        let records = collect(&source, SourceKind::Original, "chr1", 599, 599);
        assert!(records.is_empty());
    }

    #[test]
    fn fasta_trailer_ends_the_scan() {
        let text = "chr1\ts\tgene\t101\t200\t.\t+\t.\tID=g1\n\
##FASTA\n\
>chr1\n\
ACGTACGTAC\n";
        let source = GxfSource::from_text(Linkage::ById, text).unwrap();
        let records = collect(&source, SourceKind::Original, "chr1", 0, 1_000);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].attribute("ID"), Some("g1"));
    }

    #[test]
    fn malformed_line_elsewhere_is_skipped() {
        let text = "chr1\ts\tgene\t101\t200\t.\t+\t.\tID=g1\n\
chr9\ts\tgene\tabc\t50\t.\t+\t.\tID=g9\n\
chr1\ts\tgene\t5001\t6000\t.\tx\t.\tID=g2\n";
        let source = GxfSource::from_text(Linkage::ById, text).unwrap();
        let records = collect(&source, SourceKind::Original, "chr1", 0, 1_000);
        assert_eq!(records.len(), 1);

        let results: Vec<_> = source
            .query(SourceKind::Original, "chr9", Interval::new(0, 1_000))
            .unwrap()
            .collect();
        assert!(matches!(
            results.as_slice(),
            [Err(ReaderError::InvalidField { line: 2, field: "start", .. })]
        ));
    }

    #[test]
    fn large_scale_without_backing_keeps_genes() {
        let source = GxfSource::from_text(Linkage::ById, GFF).unwrap();
        let records = collect(&source, SourceKind::LargeScale, "chr1", 0, 1_000);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.kind == FeatureKind::Gene));
    }

    #[test]
    fn large_scale_backing_is_used() {
        let source = GxfSource::builder()
            .from_text(GFF)
            .large_scale_text("chr1\ts\tgene\t1\t1000\t.\t+\t.\tID=big\n")
            .linkage(Linkage::ById)
            .build()
            .unwrap();
        let records = collect(&source, SourceKind::LargeScale, "chr1", 0, 1_000);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].attribute("ID"), Some("big"));
    }

    #[test]
    fn malformed_line_is_reported_with_line_number() {
        let text = "chr1\ts\tgene\t1\t100\t.\t+\t.\tID=g1\nchr1\ts\texon\t1\t10\t.\tx\t.\tParent=t\n";
        let source = GxfSource::from_text(Linkage::ById, text).unwrap();
        let results: Vec<_> = source
            .query(SourceKind::Original, "chr1", Interval::new(0, 100))
            .unwrap()
            .collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        match &results[1] {
            Err(ReaderError::InvalidField { line, field, .. }) => {
                assert_eq!(*line, 2);
                assert_eq!(*field, "strand");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn memory_source_needs_linkage() {
        assert!(matches!(
            GxfSource::builder().from_text(GFF).build(),
            Err(ReaderError::Builder(_))
        ));
        assert!(matches!(
            GxfSource::builder().build(),
            Err(ReaderError::Builder(_))
        ));
    }

    #[test]
    fn overlap_semantics() {
        assert!(overlaps(Interval::new(10, 20), 19, 30));
        assert!(!overlaps(Interval::new(10, 20), 20, 30));
        assert!(!overlaps(Interval::new(10, 20), 0, 10));
        assert!(!overlaps(Interval::new(10, 10), 10, 11));
        assert!(!overlaps(Interval::new(10, 10), 0, 100));
    }
}
