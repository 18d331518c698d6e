//! Offline corpus build: de-duplicate postings, embed them across worker
//! threads and write the aligned records file and embedding matrix.

use std::collections::{BTreeMap, HashSet};
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, info, warn};

use crate::embedder::Encoder;
use crate::matrix::EmbeddingMatrix;
use crate::records::JobPosting;

/// Tuning for [`build_corpus`].
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    /// Postings per encoder call.
    pub batch_size: usize,
    /// Encoder worker threads.
    pub workers: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            batch_size: 32,
            workers: 1,
        }
    }
}

/// Outcome of a corpus build.
#[derive(Debug)]
pub struct BuildSummary {
    /// Embeddings aligned with the records written, in the same order.
    pub embeddings: EmbeddingMatrix,
    /// Postings read from the input.
    pub read: usize,
    /// Postings dropped because their `job_url` was already seen.
    pub duplicates: usize,
}

/// Streams postings from `reader`, writes the kept ones to `records` as JSON
/// Lines and returns their embeddings in the same order.
///
/// The first posting for a given `job_url` wins; later ones are dropped.
pub fn build_corpus<R: BufRead, W: Write>(
    reader: R,
    records: &mut W,
    encoder: Arc<dyn Encoder>,
    options: BuildOptions,
) -> Result<BuildSummary> {
    let batch_size = options.batch_size.max(1);
    let workers = options.workers.max(1);
    let dims = encoder.dimensions();
    info!(
        batch_size,
        workers,
        model = encoder.model_name(),
        "launching corpus embedding"
    );

    let (task_tx, task_rx) = bounded::<EmbeddingTask>(workers * 2);
    let (result_tx, result_rx) = bounded::<EmbeddingResult>(workers * 2);
    for worker_id in 0..workers {
        let worker_encoder = Arc::clone(&encoder);
        let worker_rx = task_rx.clone();
        let worker_tx = result_tx.clone();
        thread::spawn(move || worker_loop(worker_id, worker_rx, worker_tx, worker_encoder));
    }
    drop(task_rx);
    drop(result_tx);

    let mut sink = OrderedSink {
        records,
        pending: BTreeMap::new(),
        next_id: 0,
        data: Vec::new(),
        rows: 0,
        dims,
    };
    let mut seen = HashSet::new();
    let mut pending: Vec<JobPosting> = Vec::with_capacity(batch_size);
    let mut next_batch_id = 0usize;
    let mut inflight = 0usize;
    let mut read = 0usize;
    let mut duplicates = 0usize;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", line_no + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let posting: JobPosting = serde_json::from_str(&line)
            .with_context(|| format!("invalid job posting at line {}", line_no + 1))?;
        read += 1;
        if !seen.insert(posting.job_url.clone()) {
            duplicates += 1;
            debug!(job_url = %posting.job_url, "skipping duplicate posting");
            continue;
        }
        pending.push(posting);
        if pending.len() >= batch_size {
            dispatch_batch(&mut pending, &mut next_batch_id, &mut inflight, &task_tx)?;
            drain_ready(&result_rx, &mut sink, &mut inflight)?;
        }
    }
    dispatch_batch(&mut pending, &mut next_batch_id, &mut inflight, &task_tx)?;
    drop(task_tx);

    while inflight > 0 {
        let result = match result_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                info!(
                    inflight,
                    oldest = sink.next_id,
                    "still waiting on embedding batches"
                );
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                anyhow::bail!("embedding worker channel closed unexpectedly")
            }
        };
        inflight -= 1;
        sink.accept(result?)?;
    }
    sink.records.flush()?;

    if duplicates > 0 {
        warn!(duplicates, "dropped postings with an already-seen job_url");
    }
    info!(
        written = sink.rows,
        read, duplicates, "corpus embedding complete"
    );
    let embeddings = EmbeddingMatrix::from_flat(sink.rows, dims, sink.data)?;
    Ok(BuildSummary {
        embeddings,
        read,
        duplicates,
    })
}

struct EmbeddingTask {
    id: usize,
    postings: Vec<JobPosting>,
}

struct EmbeddedBatch {
    id: usize,
    postings: Vec<JobPosting>,
    vectors: Vec<Vec<f32>>,
}

type EmbeddingResult = Result<EmbeddedBatch>;

/// Writes batches strictly in dispatch order so rows stay aligned.
struct OrderedSink<'a, W: Write> {
    records: &'a mut W,
    pending: BTreeMap<usize, EmbeddedBatch>,
    next_id: usize,
    data: Vec<f32>,
    rows: usize,
    dims: usize,
}

impl<W: Write> OrderedSink<'_, W> {
    fn accept(&mut self, batch: EmbeddedBatch) -> Result<()> {
        self.pending.insert(batch.id, batch);
        while let Some(batch) = self.pending.remove(&self.next_id) {
            for (posting, vector) in batch.postings.iter().zip(batch.vectors) {
                anyhow::ensure!(
                    vector.len() == self.dims,
                    "encoder returned {} values for {}, expected {}",
                    vector.len(),
                    posting.job_url,
                    self.dims
                );
                serde_json::to_writer(&mut *self.records, posting)?;
                self.records.write_all(b"\n")?;
                self.data.extend_from_slice(&vector);
                self.rows += 1;
            }
            debug!(batch = self.next_id, rows = self.rows, "wrote embedded batch");
            self.next_id += 1;
        }
        Ok(())
    }
}

fn dispatch_batch(
    pending: &mut Vec<JobPosting>,
    next_batch_id: &mut usize,
    inflight: &mut usize,
    sender: &Sender<EmbeddingTask>,
) -> Result<()> {
    if pending.is_empty() {
        return Ok(());
    }
    let postings = std::mem::take(pending);
    let task = EmbeddingTask {
        id: *next_batch_id,
        postings,
    };
    *next_batch_id += 1;
    *inflight += 1;
    sender
        .send(task)
        .map_err(|_| anyhow!("embedding worker channel closed"))
}

fn drain_ready<W: Write>(
    result_rx: &Receiver<EmbeddingResult>,
    sink: &mut OrderedSink<'_, W>,
    inflight: &mut usize,
) -> Result<()> {
    loop {
        let result = match result_rx.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => {
                anyhow::bail!("embedding worker channel closed unexpectedly")
            }
        };
        *inflight = inflight.saturating_sub(1);
        sink.accept(result?)?;
    }
    Ok(())
}

fn worker_loop(
    worker_id: usize,
    receiver: Receiver<EmbeddingTask>,
    sender: Sender<EmbeddingResult>,
    encoder: Arc<dyn Encoder>,
) {
    for task in receiver.iter() {
        let EmbeddingTask { id, postings } = task;
        let texts: Vec<String> = postings.iter().map(JobPosting::embedding_text).collect();
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        debug!(worker_id, batch = id, postings = postings.len(), "embedding batch");
        let result = encoder
            .encode_batch(&inputs)
            .map_err(|err| anyhow!("worker {worker_id} failed batch {id}: {err}"))
            .and_then(|vectors| {
                anyhow::ensure!(
                    vectors.len() == postings.len(),
                    "encoder returned {} vectors for {} postings",
                    vectors.len(),
                    postings.len()
                );
                Ok(EmbeddedBatch {
                    id,
                    postings,
                    vectors,
                })
            });
        if sender.send(result).is_err() {
            break;
        }
    }
}
