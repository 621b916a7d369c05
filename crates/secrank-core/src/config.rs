//! Input records and tunables.
//!
//! [`InputConfig`] is the per-run request (documents, persona, job).
//! [`Settings`] holds the tunables, loaded from TOML.

use crate::assembler::MergeTolerance;
use crate::embedder::EmbedderOptions;
use crate::error::{Error, Result};
use crate::filters::BodyFilter;
use crate::ranking::RankOptions;
use crate::segmenter::DEFAULT_MIN_SECTION_CHARS;
use crate::tiering::{TierStrategyKind, DEFAULT_CLUSTERS};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};

/// One document named in the input record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub filename: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// The input record of a ranking run.
///
/// `persona` and `job_to_be_done` are kept as raw JSON so they can be echoed
/// back in the output metadata unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    pub documents: Vec<DocumentRef>,
    #[serde(default)]
    pub persona: Value,
    #[serde(default)]
    pub job_to_be_done: Value,
}

impl InputConfig {
    /// Read and validate an input record.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Malformed input record: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.documents.is_empty() {
            return Err(Error::Config("Input record lists no documents".to_string()));
        }
        if let Some(doc) = self.documents.iter().find(|d| d.filename.trim().is_empty()) {
            return Err(Error::Config(format!(
                "Document entry has an empty filename: {doc:?}"
            )));
        }
        if self.persona.is_null() && self.job_to_be_done.is_null() {
            return Err(Error::Config(
                "Input record has neither persona nor job_to_be_done".to_string(),
            ));
        }
        Ok(())
    }

    /// File names of the input documents, in order.
    pub fn filenames(&self) -> Vec<String> {
        self.documents.iter().map(|d| d.filename.clone()).collect()
    }

    /// The ranking query for this record.
    pub fn query(&self) -> Result<Query> {
        Query::resolve(&self.persona, &self.job_to_be_done)
    }
}

/// The text sections are ranked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub text: String,
}

impl Query {
    /// Build the query from a persona and a job, each either a string or a
    /// structured record.
    pub fn resolve(persona: &Value, job: &Value) -> Result<Self> {
        let persona_text = describe(persona, &["text", "description"])?;
        let job_text = describe(job, &["task", "description"])?;
        let text = format!("{} {}", persona_text.trim(), job_text.trim())
            .trim()
            .to_string();
        if text.is_empty() {
            return Err(Error::Config("Persona and job are both empty".to_string()));
        }
        Ok(Self { text })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Text of a persona or job value. Records use the first non-empty string
/// among `keys`, or their JSON dump.
fn describe(value: &Value, keys: &[&str]) -> Result<String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        Value::Object(map) => {
            let preferred = keys
                .iter()
                .filter_map(|k| map.get(*k).and_then(Value::as_str))
                .find(|s| !s.is_empty());
            match preferred {
                Some(s) => Ok(s.to_string()),
                None => python_json(value),
            }
        }
        Value::Bool(_) | Value::Number(_) => Ok(value.to_string()),
        Value::Array(_) => Err(Error::Config(format!(
            "Expected a string or a record, got {value}"
        ))),
    }
}

/// JSON text laid out like Python's `json.dumps` defaults: `", "` and
/// `": "` separators, non-ASCII escaped as `\uXXXX`, keys in input order.
fn python_json(value: &Value) -> Result<String> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, PythonFormatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(out).map_err(|e| Error::Config(format!("Invalid JSON dump: {e}")))
}

struct PythonFormatter;

impl serde_json::ser::Formatter for PythonFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        for c in fragment.chars() {
            if c.is_ascii() && c != '\x7f' {
                writer.write_all(&[c as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

/// Size tiering settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierSettings {
    pub strategy: TierStrategyKind,
    /// Tier count; values above 4 route the extra tiers to the fallback
    /// classifier
    pub clusters: usize,
    pub seed: u64,
}

impl Default for TierSettings {
    fn default() -> Self {
        Self {
            strategy: TierStrategyKind::default(),
            clusters: DEFAULT_CLUSTERS,
            seed: 0,
        }
    }
}

/// Section segmentation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentSettings {
    /// Minimum trimmed section length, in characters
    pub min_chars: usize,
}

impl Default for SegmentSettings {
    fn default() -> Self {
        Self {
            min_chars: DEFAULT_MIN_SECTION_CHARS,
        }
    }
}

/// Tunables, one optional TOML table per stage.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Settings {
    pub tiers: Option<TierSettings>,
    pub filters: Option<BodyFilter>,
    pub assembly: Option<MergeTolerance>,
    pub segments: Option<SegmentSettings>,
    pub ranking: Option<RankOptions>,
    pub embedder: Option<EmbedderOptions>,
}

impl Settings {
    pub fn tiers(&self) -> TierSettings {
        self.tiers.unwrap_or_default()
    }

    pub fn body_filter(&self) -> BodyFilter {
        self.filters.unwrap_or_default()
    }

    pub fn merge_tolerance(&self) -> MergeTolerance {
        self.assembly.unwrap_or_default()
    }

    pub fn min_section_chars(&self) -> usize {
        self.segments.unwrap_or_default().min_chars
    }

    pub fn ranking(&self) -> RankOptions {
        self.ranking.unwrap_or_default()
    }

    pub fn embedder(&self) -> EmbedderOptions {
        self.embedder.clone().unwrap_or_default()
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let settings: Self = toml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.tiers().clusters == 0 {
            return Err(Error::Config("tiers.clusters must be at least 1".to_string()));
        }
        let ranking = self.ranking();
        if ranking.top_k == 0 || ranking.per_document_cap == 0 {
            return Err(Error::Config(
                "ranking.top_k and ranking.per_document_cap must be at least 1".to_string(),
            ));
        }
        if self.embedder().batch_size == 0 {
            return Err(Error::Config("embedder.batch_size must be at least 1".to_string()));
        }
        Ok(())
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "secrank")
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
    Ok(dirs.config_dir().join("config.toml"))
}

/// Load settings from `path`. A missing file yields the defaults.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(path)?;
    Settings::from_toml(&contents)
}
