use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, Level};

use genetrack::{Gene, GeneAssembler, GxfSource, Region};

#[derive(Parser)]
#[command(name = "genetrack")]
#[command(about = "Assemble the gene hierarchy of a GFF3/GTF region.", long_about = None)]
struct Args {
    /// GFF3 or GTF annotation, optionally compressed.
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Chromosome to read.
    #[arg(short = 'c', long = "chrom", value_name = "NAME")]
    chrom: String,

    /// 0-based region start.
    #[arg(short = 's', long = "start", value_name = "N")]
    start: u64,

    /// Exclusive region end.
    #[arg(short = 'e', long = "end", value_name = "N")]
    end: u64,

    /// Chromosome length; defaults to the region end.
    #[arg(short = 'l', long = "chrom-length", value_name = "N")]
    chrom_length: Option<u64>,

    /// Pixels per base pair.
    #[arg(short = 'x', long = "scale", value_name = "F", default_value_t = 1.0)]
    scale: f64,

    /// Keep every transcript instead of one canonical transcript per gene.
    #[arg(long = "expand")]
    expand: bool,

    /// Maximum number of sub-intervals scanned in parallel.
    #[arg(short = 'w', long = "workers", value_name = "N", default_value_t = 8)]
    workers: usize,

    /// Worker pool size.
    #[arg(short = 't', long = "threads", value_name = "N")]
    threads: Option<usize>,

    /// Coarse annotation read when zoomed far out.
    #[arg(long = "large-scale", value_name = "FILE")]
    large_scale: Option<PathBuf>,

    /// Print debug logs to stderr.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = if args.verbose {
        Level::Debug
    } else {
        Level::Info
    };
    if let Err(err) = simple_logger::init_with_level(level) {
        eprintln!("ERROR: could not initialise logging: {err}");
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = GxfSource::builder().from_path(&args.file);
    if let Some(path) = &args.large_scale {
        builder = builder.large_scale_path(path);
    }
    let source = builder.build()?;

    let mut assembler = GeneAssembler::builder(source);
    if let Some(threads) = args.threads {
        assembler = assembler.threads(threads);
    }
    let assembler = assembler.build()?;

    let region = Region::new(args.chrom, args.start, args.end);
    let genes = assembler.assemble_features(
        &region,
        args.chrom_length.unwrap_or(args.end),
        args.scale,
        !args.expand,
        args.workers,
    )?;
    info!("assembled {} top-level features in {}", genes.len(), region);

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for gene in &genes {
        write_tree(&mut out, gene, 0)?;
    }
    out.flush()?;
    Ok(())
}

/// Writes `gene` and its children as TSV, indenting each level by two
/// spaces in the first column.
fn write_tree<W: Write>(out: &mut W, gene: &Gene, depth: usize) -> io::Result<()> {
    let strand = gene
        .strand
        .map(|strand| strand.to_string())
        .unwrap_or_else(|| ".".to_string());
    let optional = |value: Option<u64>| value.map_or_else(|| ".".to_string(), |v| v.to_string());

    writeln!(
        out,
        "{:indent$}{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        "",
        gene.feature,
        gene.chrom,
        gene.start,
        gene.end,
        strand,
        gene.feature_id.as_deref().unwrap_or("."),
        gene.feature_name
            .as_deref()
            .or(gene.group_id.as_deref())
            .unwrap_or("."),
        optional(gene.exons_count),
        optional(gene.aminoacid_length),
        indent = depth * 2
    )?;

    for child in gene.items() {
        write_tree(out, child, depth + 1)?;
    }
    Ok(())
}
