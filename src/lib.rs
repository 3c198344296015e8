//! # genetrack
//!
//! Region-scoped gene hierarchy assembly from GFF3 and GTF annotation files,
//! for genome browsers and other level-of-detail consumers.
//!
//! ## Overview
//!
//! Annotation files are flat: every line is one feature, and the gene →
//! transcript → exon/CDS/UTR tree is only implied through attributes
//! (`ID`/`Parent` in GFF3, a shared `gene_id` plus `transcript_id` in GTF).
//! This library reads the records of one chromosome region in parallel,
//! rebuilds that tree and returns a position-ordered list of genes sized
//! for a given zoom level.
//!
//! ## Features
//!
//! - **Parallel Range Scanning:** The region is split into bounded
//!   sub-intervals, each scanned by its own reader on a Rayon pool; records
//!   seen by two workers at a shared boundary are filed once
//! - **Two Linkage Schemes, One Assembler:** GFF3 and GTF differ only in how
//!   a record names its parent ([`Linkage`])
//! - **Collapse or Expand:** Genes carry either one canonical transcript with
//!   merged sub-features, or all their transcripts
//! - **Level of Detail:** Features narrower than a pixel at the requested
//!   scale are folded into `"N Features"` statistic blocks
//! - **Compression Support:** gzip, zstd and bzip2 inputs behind cargo
//!   features, detected from the file extension
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! genetrack = { version = "0.1", features = ["compression"] }
//! ```
//!
//! ```rust,no_run
//! use genetrack::{GeneAssembler, Region};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let assembler = GeneAssembler::from_gxf("data/genes.gff3.gz")?;
//!     let region = Region::new("chr1", 1_000_000, 1_500_000);
//!
//!     // 0.002 pixels per bp, one canonical transcript per gene, 8 workers
//!     let genes = assembler.assemble_features(&region, 248_956_422, 0.002, true, 8)?;
//!     for gene in &genes {
//!         println!(
//!             "{}\t{}\t{}\t{}",
//!             gene.feature,
//!             gene.start,
//!             gene.end,
//!             gene.feature_name.as_deref().unwrap_or(".")
//!         );
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Sources
//!
//! Anything that can answer "records of chromosome C overlapping
//! `[start, end)`" can back an assembler by implementing [`RegionSource`].
//! [`GxfSource`] streams a plain or compressed file, or in-memory text, and
//! can be given a second, coarser file that is read instead when the scale
//! factor drops below the large-scale limit:
//!
//! ```rust,no_run
//! use genetrack::{GeneAssembler, GxfSource};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = GxfSource::builder()
//!         .from_path("data/genes.gtf.gz")
//!         .large_scale_path("data/genes.large.gtf.gz")
//!         .build()?;
//!     let assembler = GeneAssembler::builder(source)
//!         .threads(4)
//!         .max_block_size(50_000)
//!         .build()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Coordinates
//!
//! All coordinates are 0-based half-open. File starts are shifted by one on
//! parse; ends are unchanged.
//!
//! ## Feature Flags
//!
//! - `gzip` / `compression`: gzip input (adds `flate2`)
//! - `zstd`: zstd input (adds `zstd`)
//! - `bz2`: bzip2 input (adds `bzip2`)
//! - `cli`: the `genetrack` binary (adds `clap`, `simple_logger`)
//!
//! ## Thread Safety
//!
//! A [`GeneAssembler`] is `Sync`; concurrent calls share its worker pool.
//! The pool size defaults to the `GENETRACK_NUM_THREADS` environment
//! variable, then to the number of available cores.

#![cfg_attr(doc, warn(missing_docs))]

mod assemble;
pub mod assembler;
pub mod gene;
pub mod linkage;
pub mod partition;
pub mod reader;
pub mod record;
mod scan;
mod state;
pub mod statistic;
pub mod strand;

pub use assembler::{
    AssemblerBuilder, AssemblerOptions, AssemblyError, AssemblyResult, GeneAssembler,
    LARGE_SCALE_FACTOR_LIMIT,
};
pub use gene::Gene;
pub use linkage::Linkage;
pub use partition::{Interval, Region};
pub use reader::{
    Compression, GxfSource, GxfSourceBuilder, ReaderError, ReaderResult, RegionSource,
    SourceKind,
};
pub use record::{FeatureKind, FeatureRecord};
pub use strand::Strand;
