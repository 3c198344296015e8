use std::fs;
use std::path::{Path, PathBuf};

use genetrack::{
    Compression, FeatureKind, GeneAssembler, GxfSource, Interval, Linkage, ReaderError,
    Region, RegionSource, SourceKind,
};
use tempfile::tempdir;

const GFF: &str = "##gff-version 3
chr1\tsrc\tgene\t1001\t2000\t.\t+\t.\tID=g1;Name=ONE
chr1\tsrc\tmRNA\t1001\t2000\t.\t+\t.\tID=t1;Parent=g1
chr1\tsrc\texon\t1001\t1200\t.\t+\t.\tParent=t1
chr1\tsrc\texon\t1801\t2000\t.\t+\t.\tParent=t1
chr2\tsrc\tgene\t1001\t2000\t.\t-\t.\tID=g2
# trailing comment
chr1\tsrc\tgene\t5001\t6000\t.\t-\t.\tID=g3
";

const GTF: &str = "chr1\tsrc\tgene\t1001\t2000\t.\t+\t.\tgene_id \"G1\"; gene_name \"ONE\";
chr1\tsrc\ttranscript\t1001\t2000\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
chr1\tsrc\texon\t1001\t1200\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
";

fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

fn query(source: &GxfSource, kind: SourceKind, chrom: &str, start: u64, end: u64) -> Vec<genetrack::FeatureRecord> {
    source
        .query(kind, chrom, Interval::new(start, end))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn test_file_source_filters_region() {
    let dir = tempdir().unwrap();
    let path = write(dir.path(), "genes.gff3", GFF);
    let source = GxfSource::from_path(&path).unwrap();

    assert_eq!(source.linkage(), Linkage::ById);
    assert_eq!(source.name(), path.display().to_string());

    let records = query(&source, SourceKind::Original, "chr1", 1_100, 1_900);
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.chrom == "chr1"));

    let records = query(&source, SourceKind::Original, "chr1", 2_000, 5_000);
    assert!(records.is_empty());

    let records = query(&source, SourceKind::Original, "chr2", 0, 10_000);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].attribute("ID"), Some("g2"));
}

#[test]
fn test_gtf_detected_from_extension() {
    let dir = tempdir().unwrap();
    let path = write(dir.path(), "genes.gtf", GTF);
    let source = GxfSource::from_path(&path).unwrap();
    assert_eq!(source.linkage(), Linkage::ByGroup);

    let records = query(&source, SourceKind::Original, "chr1", 0, 3_000);
    assert_eq!(records.len(), 3);
    assert_eq!(records[2].kind, FeatureKind::Exon);
    assert_eq!(records[2].attribute("transcript_id"), Some("T1"));
}

#[test]
fn test_explicit_linkage_overrides_extension() {
    let dir = tempdir().unwrap();
    let path = write(dir.path(), "genes.txt", GTF);
    let source = GxfSource::builder()
        .from_path(&path)
        .linkage(Linkage::ByGroup)
        .name("annotation")
        .build()
        .unwrap();
    assert_eq!(source.linkage(), Linkage::ByGroup);
    assert_eq!(source.name(), "annotation");
}

#[test]
fn test_large_scale_file_is_selected_by_scale() {
    let dir = tempdir().unwrap();
    let original = write(dir.path(), "genes.gff3", GFF);
    let coarse = write(
        dir.path(),
        "genes.large.gff3",
        "chr1\tsrc\tgene\t1\t100000\t.\t+\t.\tID=cluster1\n",
    );
    let source = GxfSource::builder()
        .from_path(&original)
        .large_scale_path(&coarse)
        .build()
        .unwrap();

    let kind = SourceKind::for_scale(0.0001, genetrack::LARGE_SCALE_FACTOR_LIMIT);
    assert_eq!(kind, SourceKind::LargeScale);
    let records = query(&source, kind, "chr1", 0, 10_000);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].attribute("ID"), Some("cluster1"));

    let kind = SourceKind::for_scale(0.5, genetrack::LARGE_SCALE_FACTOR_LIMIT);
    assert_eq!(kind, SourceKind::Original);
    assert_eq!(query(&source, kind, "chr1", 0, 10_000).len(), 5);
}

#[test]
fn test_large_scale_falls_back_to_genes() {
    let source = GxfSource::from_text(Linkage::ById, GFF).unwrap();
    let records = query(&source, SourceKind::LargeScale, "chr1", 0, 10_000);
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.kind == FeatureKind::Gene));
}

#[test]
fn test_missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let source = GxfSource::from_path(dir.path().join("absent.gff3")).unwrap();
    match source.query(SourceKind::Original, "chr1", Interval::new(0, 10)) {
        Err(ReaderError::Io(_)) => {}
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("query on a missing file succeeded"),
    }
}

#[test]
fn test_invalid_utf8_is_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.gff3");
    let mut bytes = b"chr1\tsrc\tgene\t1\t10\t.\t+\t.\tID=g1\n".to_vec();
    bytes.extend_from_slice(b"chr1\tsrc\tgene\t1\t10\t.\t+\t.\tName=\xff\xfe\n");
    fs::write(&path, bytes).unwrap();

    let source = GxfSource::from_path(&path).unwrap();
    let results: Vec<_> = source
        .query(SourceKind::Original, "chr1", Interval::new(0, 10))
        .unwrap()
        .collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(
        results[1],
        Err(ReaderError::InvalidEncoding { line: 2, .. })
    ));
}

#[test]
fn test_assembler_from_file() {
    let dir = tempdir().unwrap();
    let path = write(dir.path(), "genes.gff3", GFF);
    let assembler = GeneAssembler::from_gxf(&path).unwrap();

    let genes = assembler
        .assemble_features(&Region::new("chr1", 0, 10_000), 10_000, 0.1, true, 4)
        .unwrap();
    assert_eq!(genes.len(), 2);
    assert_eq!(genes[0].feature_name.as_deref(), Some("ONE"));
    assert_eq!(genes[0].exons_count, Some(2));
    assert_eq!(genes[1].feature_id.as_deref(), Some("g3"));
}

#[test]
fn test_gff3_with_fasta_section() {
    let dir = tempdir().unwrap();
    let text = format!("{GFF}##FASTA\n>chr1 assembled\nACGTNNNNACGT\n>chr2\nTTTT\n");
    let path = write(dir.path(), "prokka.gff", &text);
    let source = GxfSource::from_path(&path).unwrap();

    assert_eq!(query(&source, SourceKind::Original, "chr1", 0, 10_000).len(), 5);
    assert_eq!(query(&source, SourceKind::Original, "chr2", 0, 10_000).len(), 1);
}

#[test]
fn test_bad_line_on_other_chromosome_is_skipped() {
    let dir = tempdir().unwrap();
    let text = format!("{GFF}chrUn\tsrc\tgene\tabc\t50\t.\t+\t.\tID=gx\n");
    let path = write(dir.path(), "genes.gff3", &text);
    let source = GxfSource::from_path(&path).unwrap();

    assert_eq!(query(&source, SourceKind::Original, "chr1", 0, 10_000).len(), 5);
    let results: Vec<_> = source
        .query(SourceKind::Original, "chrUn", Interval::new(0, 10_000))
        .unwrap()
        .collect();
    assert!(matches!(
        results.as_slice(),
        [Err(ReaderError::InvalidField { line: 9, field: "start", .. })]
    ));
}

#[test]
fn test_disabled_compression_is_rejected() {
    let dir = tempdir().unwrap();
    let path = write(dir.path(), "genes.gff3", GFF);
    let result = GxfSource::builder()
        .from_path(&path)
        .compression(Compression::Bzip2)
        .build();
    if cfg!(feature = "bz2") {
        assert!(result.is_ok());
    } else {
        assert!(matches!(result, Err(ReaderError::Builder(_))));
    }
}

#[cfg(feature = "gzip")]
#[test]
fn test_gzip_source() {
    use flate2::{write::GzEncoder, Compression as Level};
    use std::io::Write;

    let dir = tempdir().unwrap();
    let path = dir.path().join("genes.gtf.gz");
    let mut encoder = GzEncoder::new(fs::File::create(&path).unwrap(), Level::default());
    encoder.write_all(GTF.as_bytes()).unwrap();
    encoder.finish().unwrap();

    let source = GxfSource::from_path(&path).unwrap();
    assert_eq!(source.linkage(), Linkage::ByGroup);
    assert_eq!(query(&source, SourceKind::Original, "chr1", 0, 3_000).len(), 3);
}
