#![allow(dead_code)]

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use jobmatch::matrix_file::write_binary;
use jobmatch::{EmbeddingMatrix, EncodingError, Encoder, JobPosting};

/// Encoder that returns canned vectors and refuses unknown text.
pub struct FixedEncoder {
    dims: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl FixedEncoder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            vectors: HashMap::new(),
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }
}

impl Encoder for FixedEncoder {
    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "fixed"
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EncodingError> {
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| EncodingError::new("fixed", format!("cannot tokenize {text:?}")))
    }
}

pub fn posting(title: &str) -> JobPosting {
    JobPosting {
        title: Some(title.to_string()),
        company: Some(format!("{title} SARL")),
        sector: Some("Informatique".to_string()),
        job_url: format!("https://jobs.test/{}", title.to_lowercase()),
        ..JobPosting::default()
    }
}

pub fn write_postings(path: &Path, postings: &[JobPosting]) {
    let mut writer = BufWriter::new(File::create(path).expect("create records"));
    for posting in postings {
        serde_json::to_writer(&mut writer, posting).expect("write posting");
        writer.write_all(b"\n").expect("newline");
    }
    writer.flush().expect("flush records");
}

pub fn write_matrix(path: &Path, rows: Vec<Vec<f32>>) {
    let matrix = EmbeddingMatrix::from_rows(rows).expect("matrix");
    let file = File::create(path).expect("create embeddings");
    write_binary(&matrix, BufWriter::new(file)).expect("write embeddings");
}
