use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use jobmatch::corpus_builder::{build_corpus, BuildOptions};
use jobmatch::matrix_file::{write_binary, write_jsonl};
use jobmatch::telemetry::{init_tracing, LogArgs};
use jobmatch::EncoderArgs;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "jobmatch-embed",
    about = "Embed scraped job postings into an aligned records file and embedding matrix"
)]
struct EmbedCli {
    /// JSON Lines of postings produced by the scraping pipeline
    #[arg(long, env = "JOBMATCH_EMBED_INPUT", default_value = "jobs_raw.jsonl")]
    input: PathBuf,

    /// Output JSON Lines of de-duplicated postings, one per corpus row
    #[arg(long, env = "JOBMATCH_RECORDS", default_value = "data/jobs.jsonl")]
    records: PathBuf,

    /// Output embedding matrix
    #[arg(
        long,
        env = "JOBMATCH_EMBEDDINGS",
        default_value = "data/job_embeddings.bin"
    )]
    embeddings: PathBuf,

    /// Embedding file format
    #[arg(long, value_enum, default_value = "binary")]
    format: MatrixFormat,

    /// Number of concurrent embedding workers
    #[arg(long, env = "JOBMATCH_EMBED_THREADS", default_value_t = 1)]
    workers: usize,

    #[command(flatten)]
    encoder: EncoderArgs,

    #[command(flatten)]
    log: LogArgs,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum MatrixFormat {
    /// Little-endian f32 with a checksummed header.
    Binary,
    /// One JSON array per line.
    Jsonl,
}

fn main() -> Result<()> {
    let cli = EmbedCli::parse();
    init_tracing(&cli.log);

    let encoder = cli.encoder.build()?;
    let input =
        File::open(&cli.input).with_context(|| format!("failed to open {:?}", cli.input))?;
    let records = File::create(&cli.records)
        .with_context(|| format!("failed to create {:?}", cli.records))?;
    let mut records = BufWriter::new(records);

    let summary = build_corpus(
        BufReader::new(input),
        &mut records,
        encoder,
        BuildOptions {
            batch_size: cli.encoder.batch_size,
            workers: cli.workers,
        },
    )?;

    let output = File::create(&cli.embeddings)
        .with_context(|| format!("failed to create {:?}", cli.embeddings))?;
    let writer = BufWriter::new(output);
    match cli.format {
        MatrixFormat::Binary => write_binary(&summary.embeddings, writer),
        MatrixFormat::Jsonl => write_jsonl(&summary.embeddings, writer),
    }
    .with_context(|| format!("failed to write {:?}", cli.embeddings))?;

    info!(
        rows = summary.embeddings.rows(),
        dims = summary.embeddings.dims(),
        duplicates = summary.duplicates,
        records = %cli.records.display(),
        embeddings = %cli.embeddings.display(),
        "corpus written"
    );
    Ok(())
}
