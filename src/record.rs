use std::{
    collections::{btree_map::Entry, BTreeMap},
    fmt,
};

use memchr::memchr;

use crate::{
    linkage::Linkage,
    reader::{ReaderError, ReaderResult},
    strand::Strand,
};

/// Attribute column of a GXF line, keyed by attribute name.
///
/// A `BTreeMap` keeps attribute order stable, which makes records hashable
/// and comparable structurally.
pub type Attributes = BTreeMap<String, String>;

pub(crate) const ID_KEY: &str = "ID";
pub(crate) const PARENT_KEY: &str = "Parent";
pub(crate) const GENE_ID_KEY: &str = "gene_id";
pub(crate) const TRANSCRIPT_ID_KEY: &str = "transcript_id";
pub(crate) const TRANSCRIPT_NAME_KEY: &str = "transcript_name";
pub(crate) const EXON_ID_KEY: &str = "exon_id";
pub(crate) const NAME_KEYS: [&str; 4] = ["Name", "gene_name", "gene_symbol", "transcript_name"];

/// Coarse classification of the feature type column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    /// `gene`
    Gene,
    /// `transcript` or `mRNA`
    Transcript,
    /// `exon`
    Exon,
    /// `CDS`
    Cds,
    /// Any UTR spelling (`UTR`, `five_prime_UTR`, `3UTR`, ...)
    Utr,
    /// Everything else.
    Other,
}

impl FeatureKind {
    /// Classifies a raw feature type, ignoring ASCII case.
    ///
    /// # Example
    ///
    /// ```
    /// use genetrack::record::FeatureKind;
    ///
    /// assert_eq!(FeatureKind::classify("mRNA"), FeatureKind::Transcript);
    /// assert_eq!(FeatureKind::classify("cds"), FeatureKind::Cds);
    /// assert_eq!(FeatureKind::classify("five_prime_UTR"), FeatureKind::Utr);
    /// ```
    pub fn classify(feature: &str) -> Self {
        let eq = |name: &str| feature.eq_ignore_ascii_case(name);
        if eq("gene") {
            FeatureKind::Gene
        } else if eq("transcript") || eq("mrna") {
            FeatureKind::Transcript
        } else if eq("exon") {
            FeatureKind::Exon
        } else if eq("cds") {
            FeatureKind::Cds
        } else if [
            "utr",
            "five_prime_utr",
            "three_prime_utr",
            "5utr",
            "3utr",
            "utr5",
            "utr3",
        ]
        .iter()
        .any(|name| eq(name))
        {
            FeatureKind::Utr
        } else {
            FeatureKind::Other
        }
    }

    /// Canonical type name for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKind::Gene => "gene",
            FeatureKind::Transcript => "transcript",
            FeatureKind::Exon => "exon",
            FeatureKind::Cds => "CDS",
            FeatureKind::Utr => "UTR",
            FeatureKind::Other => "other",
        }
    }
}

/// Linkage identity carried by a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// GFF3: the record's own `ID` and the first `Parent` value.
    ById {
        id: Option<String>,
        parent_id: Option<String>,
    },
    /// GTF: the `gene_id` shared by every line of a gene plus the
    /// `transcript_id` of the line.
    ByGroup {
        group_id: Option<String>,
        transcript_id: Option<String>,
    },
}

/// A single parsed annotation line.
///
/// Coordinates are 0-based half-open; the 1-based inclusive file start is
/// shifted by one on parse.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    /// Chromosome or scaffold name.
    pub chrom: String,
    /// Source column.
    pub source: String,
    /// Raw feature type column.
    pub feature: String,
    /// Classified feature type.
    pub kind: FeatureKind,
    /// 0-based start position.
    pub start: u64,
    /// Exclusive end position.
    pub end: u64,
    /// Score column, if any.
    pub score: Option<f32>,
    /// Strand column.
    pub strand: Strand,
    /// CDS phase (0, 1 or 2).
    pub frame: Option<u8>,
    /// Parsed attribute column.
    pub attributes: Attributes,
    /// Id and parent extracted under the file's linkage.
    pub identity: Identity,
}

/// Structural identity of a record, used to drop records that several
/// workers observed at a shared boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    start: u64,
    end: u64,
    feature: String,
    strand: Strand,
    identity: Identity,
}

impl FeatureRecord {
    /// Parses a single GXF line.
    ///
    /// # Arguments
    ///
    /// * `line` - The raw line, with or without its trailing newline.
    /// * `line_number` - The 1-based line number for error reporting.
    /// * `linkage` - Linkage scheme; decides the attribute separator and
    ///   which attributes form the record's [`Identity`].
    ///
    /// # Example
    ///
    /// ```
    /// use genetrack::{linkage::Linkage, record::{FeatureKind, FeatureRecord}};
    ///
    /// let line = "chr1\tsrc\texon\t101\t150\t.\t+\t.\tID=e1;Parent=t1";
    /// let record = FeatureRecord::parse(line, 1, Linkage::ById).unwrap();
    /// assert_eq!(record.kind, FeatureKind::Exon);
    /// assert_eq!((record.start, record.end), (100, 150));
    /// ```
    pub fn parse(line: &str, line_number: usize, linkage: Linkage) -> ReaderResult<Self> {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        let mut fields = trimmed.split('\t');

        let chrom = fields
            .next()
            .ok_or_else(|| missing("chromosome", line_number))?;
        let source = fields.next().ok_or_else(|| missing("source", line_number))?;
        let feature = fields
            .next()
            .ok_or_else(|| missing("feature", line_number))?;
        let start_raw = fields.next().ok_or_else(|| missing("start", line_number))?;
        let end_raw = fields.next().ok_or_else(|| missing("end", line_number))?;
        let score_raw = fields.next().ok_or_else(|| missing("score", line_number))?;
        let strand_raw = fields
            .next()
            .ok_or_else(|| missing("strand", line_number))?;
        let frame_raw = fields.next().ok_or_else(|| missing("phase", line_number))?;
        let attributes_raw = fields
            .next()
            .ok_or_else(|| missing("attributes", line_number))?;

        let (start, end) = parse_coords(start_raw, end_raw, line_number)?;

        let score = match score_raw {
            "." | "" => None,
            raw => Some(raw.parse::<f32>().map_err(|_| {
                ReaderError::invalid_field(
                    line_number,
                    "score",
                    format!("ERROR: could not parse '{raw}' as float"),
                )
            })?),
        };
        let frame = match frame_raw {
            "." | "" => None,
            raw => match raw.parse::<u8>() {
                Ok(frame) if frame < 3 => Some(frame),
                _ => {
                    return Err(ReaderError::invalid_field(
                        line_number,
                        "phase",
                        format!("ERROR: expected 0, 1, 2 or '.', got '{raw}'"),
                    ))
                }
            },
        };

        let strand = Strand::parse(strand_raw, line_number)?;
        let attributes = match attributes_raw.trim() {
            "." | "" => Attributes::new(),
            raw => parse_attributes(raw.as_bytes(), linkage.attr_separator()).map_err(|err| {
                ReaderError::invalid_field(line_number, "attributes", err.to_string())
            })?,
        };
        let identity = linkage.identity(&attributes);

        Ok(Self {
            chrom: chrom.to_string(),
            source: source.to_string(),
            feature: feature.to_string(),
            kind: FeatureKind::classify(feature),
            start,
            end,
            score,
            strand,
            frame,
            attributes,
            identity,
        })
    }

    /// Returns the structural dedupe key of this record.
    pub fn key(&self) -> RecordKey {
        RecordKey {
            start: self.start,
            end: self.end,
            feature: self.feature.clone(),
            strand: self.strand,
            identity: self.identity.clone(),
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

    /// Returns the value of an attribute, if present.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Reads the coordinates of a line if it lies on `chrom`.
///
/// Sources use this to skip lines outside the queried region without paying
/// for attribute parsing. Lines on other chromosomes are skipped before
/// their coordinates are read, so they never fail a query.
pub(crate) fn locate(
    line: &str,
    chrom: &str,
    line_number: usize,
) -> ReaderResult<Option<(u64, u64)>> {
    let mut fields = line.split('\t');
    match fields.next() {
        Some(found) if found == chrom => {}
        _ => return Ok(None),
    }
    let start_raw = fields
        .nth(2)
        .ok_or_else(|| missing("start", line_number))?;
    let end_raw = fields.next().ok_or_else(|| missing("end", line_number))?;
    parse_coords(start_raw, end_raw, line_number).map(Some)
}

fn parse_coords(start_raw: &str, end_raw: &str, line_number: usize) -> ReaderResult<(u64, u64)> {
    let start = start_raw.parse::<u64>().map_err(|_| {
        ReaderError::invalid_field(
            line_number,
            "start",
            format!("ERROR: could not parse '{}' as integer", start_raw),
        )
    })?;
    let end = end_raw.parse::<u64>().map_err(|_| {
        ReaderError::invalid_field(
            line_number,
            "end",
            format!("ERROR: could not parse '{}' as integer", end_raw),
        )
    })?;
    if start == 0 || end < start {
        return Err(ReaderError::invalid_field(
            line_number,
            "coordinates",
            format!("ERROR: expected 1 <= start <= end, got {start}..{end}"),
        ));
    }
    Ok((start - 1, end))
}

fn missing(field: &'static str, line: usize) -> ReaderError {
    ReaderError::invalid_field(
        line,
        field,
        format!("ERROR: missing {field} column in input line"),
    )
}

/// Fast attribute parser that extracts key/value pairs into an
/// [`Attributes`] map.
///
/// Handles both GTF (`key "value";`, separator `b' '`) and GFF3
/// (`key=value;`, separator `b'='`) layouts. GFF3 values are
/// percent-decoded. Repeated keys are joined with `,`.
///
/// # Examples
///
/// ```
/// use genetrack::record::parse_attributes;
///
/// let gtf = parse_attributes(b"gene_id \"G1\"; transcript_id \"T1\";", b' ').unwrap();
/// assert_eq!(gtf["gene_id"], "G1");
///
/// let gff = parse_attributes(b"ID=t1;Name=A%3BB", b'=').unwrap();
/// assert_eq!(gff["Name"], "A;B");
/// ```
pub fn parse_attributes(line: &[u8], sep: u8) -> Result<Attributes, ParseError> {
    let mut attributes = Attributes::new();
    let mut pos = 0usize;

    let mut trimmed_len = line.len();
    while trimmed_len > 0 && matches!(line[trimmed_len - 1], b' ' | b'\t' | b'\n' | b'\r') {
        trimmed_len -= 1;
    }
    if trimmed_len == 0 {
        return Err(ParseError::Empty);
    }

    let decode = sep == b'=';
    while pos < trimmed_len {
        while pos < trimmed_len && line[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos >= trimmed_len {
            break;
        }
        let key_start = pos;
        let semi = memchr(b';', &line[pos..trimmed_len])
            .map(|idx| pos + idx)
            .unwrap_or(trimmed_len);
        let key_end = match memchr(sep, &line[pos..semi]) {
            Some(sep_pos) => pos + sep_pos,
            None => {
                // flag attribute without a value
                let key = text(line[key_start..semi].trim_ascii_end(), false);
                if !key.is_empty() {
                    push_attribute_value(&mut attributes, key, String::new());
                }
                pos = semi + 1;
                continue;
            }
        };
        let mut key = key_end;
        while key > key_start && line[key - 1] == b' ' {
            key -= 1;
        }
        let key_text = text(&line[key_start..key], false);
        pos = key_end + 1;
        while pos < trimmed_len && line[pos] == b' ' {
            pos += 1;
        }

        let value;
        if pos < trimmed_len && line[pos] == b'"' {
            pos += 1;
            match memchr(b'"', &line[pos..trimmed_len]) {
                Some(close) => {
                    value = text(&line[pos..pos + close], decode);
                    pos += close + 1;
                }
                None => {
                    value = text(&line[pos..trimmed_len], decode);
                    pos = trimmed_len;
                }
            }
        } else {
            let mut value_end = semi.max(pos);
            while value_end > pos && line[value_end - 1] == b' ' {
                value_end -= 1;
            }
            value = text(&line[pos.min(value_end)..value_end], decode);
            pos = semi;
        }
        push_attribute_value(&mut attributes, key_text, value);

        match memchr(b';', &line[pos.min(trimmed_len)..trimmed_len]) {
            Some(idx) => pos += idx + 1,
            None => break,
        }
    }

    Ok(attributes)
}

fn push_attribute_value(attributes: &mut Attributes, key: String, value: String) {
    match attributes.entry(key) {
        Entry::Vacant(slot) => {
            slot.insert(value);
        }
        Entry::Occupied(mut slot) => {
            let entry = slot.get_mut();
            entry.push(',');
            entry.push_str(&value);
        }
    }
}

/// Converts attribute bytes to text, optionally resolving `%XX` escapes.
fn text(bytes: &[u8], decode: bool) -> String {
    if !decode || memchr(b'%', bytes).is_none() {
        return String::from_utf8_lossy(bytes).into_owned();
    }

    let mut out = Vec::with_capacity(bytes.len());
    let mut idx = 0usize;
    while idx < bytes.len() {
        if bytes[idx] == b'%' && idx + 2 < bytes.len() {
            let hex = (hex_value(bytes[idx + 1]), hex_value(bytes[idx + 2]));
            if let (Some(hi), Some(lo)) = hex {
                out.push(hi << 4 | lo);
                idx += 3;
                continue;
            }
        }
        out.push(bytes[idx]);
        idx += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Attribute parser error kinds.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    /// Indicates that the attribute string was empty.
    Empty,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => write!(f, "ERROR: empty attribute field"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Returns true if `line` opens the sequence section that may trail a GFF3
/// file. No feature lines follow it.
pub(crate) fn starts_fasta(line: &str) -> bool {
    line.starts_with("##FASTA") || line.starts_with('>')
}

/// Determines if a line should be skipped during parsing.
///
/// Lines are skipped if they are empty or start with a '#' character.
pub(crate) fn should_skip(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}
