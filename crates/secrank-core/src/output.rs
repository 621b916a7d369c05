//! Ranking output record.

use crate::config::InputConfig;
use crate::ranking::ScoredSection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub input_documents: Vec<String>,
    pub persona: Value,
    pub job_to_be_done: Value,
    /// UTC, ISO 8601 with microseconds and no offset
    pub processing_timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedSection {
    pub document: String,
    pub section_title: String,
    /// 1 for the most relevant section
    pub importance_rank: usize,
    pub page_number: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsectionAnalysis {
    pub document: String,
    pub refined_text: String,
    pub page_number: u32,
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// The document written at the end of a ranking run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeOutput {
    pub metadata: Metadata,
    pub extracted_sections: Vec<ExtractedSection>,
    pub subsection_analysis: Vec<SubsectionAnalysis>,
}

impl ChallengeOutput {
    /// Build the output for `ranked` sections, which must already be in
    /// final score order.
    pub fn build(input: &InputConfig, ranked: &[ScoredSection], timestamp: DateTime<Utc>) -> Self {
        let extracted_sections = ranked
            .iter()
            .enumerate()
            .map(|(i, s)| ExtractedSection {
                document: s.section.document_id.clone(),
                section_title: s.section.title.clone(),
                importance_rank: i + 1,
                page_number: s.section.start_page,
            })
            .collect();

        let subsection_analysis = ranked
            .iter()
            .map(|s| SubsectionAnalysis {
                document: s.section.document_id.clone(),
                refined_text: s.section.content.clone(),
                page_number: s.section.start_page,
            })
            .collect();

        Self {
            metadata: Metadata {
                input_documents: input.filenames(),
                persona: input.persona.clone(),
                job_to_be_done: input.job_to_be_done.clone(),
                processing_timestamp: timestamp.format(TIMESTAMP_FORMAT).to_string(),
            },
            extracted_sections,
            subsection_analysis,
        }
    }

    /// Output stamped with the current time.
    pub fn now(input: &InputConfig, ranked: &[ScoredSection]) -> Self {
        Self::build(input, ranked, Utc::now())
    }
}
