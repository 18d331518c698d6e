//! Job record shapes shared by the corpus builder and the query service.

use serde::{Deserialize, Deserializer, Serialize};

/// Normalized posting emitted by the scraping pipeline, one JSON object per line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    /// Posting headline.
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: Option<String>,
    /// Hiring company.
    #[serde(default, deserialize_with = "lenient_text")]
    pub company: Option<String>,
    /// Free-form location string.
    #[serde(default, deserialize_with = "lenient_text")]
    pub location: Option<String>,
    /// Industry sector.
    #[serde(default, deserialize_with = "lenient_text")]
    pub sector: Option<String>,
    /// Full posting body.
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: Option<String>,
    /// Contract kind (CDI, CDD, internship...).
    #[serde(default, deserialize_with = "lenient_text")]
    pub contract_type: Option<String>,
    /// Advertised salary, kept as text.
    #[serde(default, deserialize_with = "lenient_text")]
    pub salary: Option<String>,
    /// Publication date as printed by the listing site.
    #[serde(default, deserialize_with = "lenient_text")]
    pub posted_date: Option<String>,
    /// Listing site the posting came from.
    #[serde(default, deserialize_with = "lenient_text")]
    pub source_website: Option<String>,
    /// Canonical posting URL; the upstream de-duplication key.
    pub job_url: String,
}

impl JobPosting {
    /// Text submitted to the encoder when building the corpus.
    ///
    /// Empty fields are skipped so a posting with only a title still embeds
    /// something meaningful.
    pub fn embedding_text(&self) -> String {
        [
            &self.title,
            &self.sector,
            &self.contract_type,
            &self.location,
            &self.description,
        ]
        .into_iter()
        .filter_map(|field| field.as_deref())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .collect::<Vec<_>>()
        .join(". ")
    }
}

/// One corpus entry as held by the corpus store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    /// Position of the record in the corpus; matches its embedding row.
    pub row: usize,
    /// Posting headline.
    pub title: Option<String>,
    /// Hiring company.
    pub company: Option<String>,
    /// Industry sector.
    pub sector: Option<String>,
    /// Advertised salary.
    pub salary: Option<String>,
}

impl JobRecord {
    /// Projects an ingested posting onto the fields the retrieval core serves.
    pub fn from_posting(row: usize, posting: JobPosting) -> Self {
        Self {
            row,
            title: posting.title,
            company: posting.company,
            sector: posting.sector,
            salary: posting.salary,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawField {
    Text(String),
    Number(serde_json::Number),
    Flag(bool),
}

/// Accepts strings, numbers and booleans; spreadsheet exports routinely turn
/// salaries into numbers.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawField>::deserialize(deserializer)?;
    Ok(raw.map(|field| match field {
        RawField::Text(text) => text,
        RawField::Number(number) => number.to_string(),
        RawField::Flag(flag) => flag.to_string(),
    }))
}
