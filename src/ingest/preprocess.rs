//! Catalog record cleaning and canonical document construction.
//!
//! Document text is a pure function of the cleaned fields: the same
//! drug row always produces the same text, so a rebuild reproduces the
//! same embeddings up to model non-determinism.

use regex::Regex;

use crate::external::catalog::CatalogDrug;
use crate::models::{Disease, Drug};

/// Strip markup, decode common entities, collapse whitespace.
pub fn clean_text(text: &str) -> String {
    // Tag stripping first so entity decoding cannot re-introduce
    // angle brackets that look like markup.
    let tag_re = Regex::new(r"<[^>]+>").expect("static regex");
    let without_tags = tag_re.replace_all(text, "");

    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">");

    let space_re = Regex::new(r"\s+").expect("static regex");
    space_re.replace_all(&decoded, " ").trim().to_string()
}

fn clean_opt(text: &Option<String>) -> Option<String> {
    text.as_deref()
        .map(clean_text)
        .filter(|s| !s.is_empty())
}

/// Canonical retrieval document for a drug row.
pub fn drug_document(drug: &Drug) -> String {
    let mut sections = vec![
        format!("【의약품명】 {}", drug.item_name),
        format!(
            "【제조사】 {}",
            drug.entp_name.as_deref().unwrap_or("알 수 없음")
        ),
    ];

    let fields = [
        ("【효능효과】", &drug.efficacy),
        ("【용법용량】", &drug.use_method),
        ("【경고】", &drug.warning_info),
        ("【주의사항】", &drug.caution_info),
        ("【상호작용】", &drug.interaction),
        ("【부작용】", &drug.side_effects),
        ("【보관법】", &drug.storage_method),
    ];
    for (header, value) in fields {
        if let Some(text) = value.as_deref().filter(|t| !t.is_empty()) {
            sections.push(format!("{header} {text}"));
        }
    }

    sections.join("\n\n")
}

/// Per-chunk retrieval documents for a disease row.
///
/// The symptoms chunk targets symptom-phrased queries; the full chunk
/// carries everything. Retrieval keeps the best chunk per disease.
pub fn disease_documents(disease: &Disease) -> Vec<(String, &'static str)> {
    let mut documents = Vec::new();

    if let Some(symptoms) = disease.symptoms.as_deref().filter(|s| !s.is_empty()) {
        documents.push((
            format!("질병: {}. 증상: {symptoms}", disease.name),
            "symptoms",
        ));
    }

    let mut full = vec![format!("질병: {}", disease.name)];
    let fields = [
        ("설명", &disease.description),
        ("원인", &disease.causes),
        ("증상", &disease.symptoms),
        ("진단", &disease.diagnosis),
        ("치료", &disease.treatment),
        ("예방", &disease.prevention),
    ];
    for (label, value) in fields {
        if let Some(text) = value.as_deref().filter(|t| !t.is_empty()) {
            full.push(format!("{label}: {text}"));
        }
    }
    documents.push((full.join(". "), "full"));

    documents
}

/// Clean a raw catalog record into a drug row plus its document text.
pub fn preprocess(raw: &CatalogDrug) -> (Drug, String) {
    let drug = Drug {
        id: raw.item_seq.clone(),
        item_name: clean_text(&raw.item_name),
        entp_name: clean_opt(&raw.entp_name),
        efficacy: clean_opt(&raw.efficacy),
        use_method: clean_opt(&raw.use_method),
        warning_info: clean_opt(&raw.warning),
        caution_info: clean_opt(&raw.caution),
        interaction: clean_opt(&raw.interaction),
        side_effects: clean_opt(&raw.side_effects),
        storage_method: clean_opt(&raw.storage),
        data_source: "data.go.kr".to_string(),
    };
    let document = drug_document(&drug);
    (drug, document)
}
