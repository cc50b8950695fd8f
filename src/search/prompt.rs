//! Prompt contract for the answer model.
//!
//! The system prompt pins the model to the supplied context: name the
//! condition(s), then the drugs, include efficacy/dosage/warnings,
//! recommend professional consultation for severe symptoms, never
//! diagnose or prescribe, and close with the fixed disclaimer.

use crate::search::orchestrator::{DiseaseResult, SearchResult};

pub const DISCLAIMER: &str = "※ 이 정보는 참고용입니다. 실제 복약은 의사/약사와 상담하세요.";

pub const NO_RESULTS_MESSAGE: &str =
    "죄송합니다. 관련 정보를 찾을 수 없습니다. 다른 증상으로 검색해 보시거나, 약사/의사와 상담하세요.";

pub const ANSWER_FALLBACK_MESSAGE: &str =
    "AI 응답을 생성할 수 없습니다. 아래 검색 결과를 참고해 주세요.";

pub fn integrated_system_prompt() -> &'static str {
    "당신은 건강 정보와 의약품 전문 상담 AI입니다.
주어진 질병 정보와 의약품 정보를 바탕으로 사용자의 증상에 대해 상세히 설명해주세요.

중요 지침:
1. 먼저 사용자의 증상과 관련된 질병에 대해 설명하세요 (원인, 증상, 치료법).
2. 관련 질병 정보를 바탕으로 적합한 의약품을 추천하세요.
3. 반드시 주어진 컨텍스트 내의 의약품만 추천하세요.
4. 각 의약품의 효능, 사용법, 주의사항을 명확히 설명하세요.
5. 예방법과 생활습관 개선 방법도 함께 안내하세요.
6. 심각한 증상인 경우 반드시 전문의 상담을 권유하세요.
7. 절대로 진단이나 처방을 하지 마세요. 정보 제공만 하세요.

응답 형식:
## 관련 질병 정보
- 질병에 대한 설명

## 추천 의약품
- 각 의약품별 설명

## 치료 및 예방
- 치료 방법과 예방법

## 주의사항
- 중요한 주의사항

⚠️ 면책 조항: 이 정보는 참고용이며, 정확한 진단과 처방을 위해 반드시 의사/약사와 상담하세요."
}

pub fn integrated_user_prompt(query: &str, context: &str) -> String {
    format!(
        "사용자 질문: {query}\n\n참고 정보:\n{context}\n\n위 정보를 바탕으로 다음을 포함하여 상세히 답변해주세요:\n1. 관련 질병에 대한 설명 (원인, 증상)\n2. 적합한 의약품 추천과 설명\n3. 치료 및 예방 방법\n4. 주의사항"
    )
}

fn score_text(relevance: Option<f32>, similarity: f32) -> String {
    match relevance {
        Some(score) => format!("관련성: {:.2}%", score * 100.0),
        None => format!("유사도: {:.2}%", similarity * 100.0),
    }
}

/// Assemble the model context: disease section, drug section, and an
/// optional graph-relation block appended verbatim.
pub fn format_integrated_context(
    drugs: &[SearchResult],
    diseases: &[DiseaseResult],
    graph_block: Option<&str>,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !diseases.is_empty() {
        parts.push("=== 관련 질병 정보 ===".to_string());
        for (i, disease) in diseases.iter().enumerate() {
            parts.push(format!(
                "[질병 {}] {}\n- 분류: {}\n- 설명: {}\n- 원인: {}\n- 증상: {}\n- 치료: {}\n- 예방: {}\n- 관련 의약품: {}\n- {}",
                i + 1,
                disease.name,
                disease.category.as_deref().unwrap_or("정보 없음"),
                disease.description.as_deref().unwrap_or("정보 없음"),
                disease.causes.as_deref().unwrap_or("정보 없음"),
                disease.symptoms.as_deref().unwrap_or("정보 없음"),
                disease.treatment.as_deref().unwrap_or("정보 없음"),
                disease.prevention.as_deref().unwrap_or("정보 없음"),
                disease.related_drugs.as_deref().unwrap_or("정보 없음"),
                score_text(disease.relevance_score, disease.similarity),
            ));
        }
    }

    if !drugs.is_empty() {
        parts.push("=== 추천 의약품 정보 ===".to_string());
        for (i, drug) in drugs.iter().enumerate() {
            parts.push(format!(
                "[의약품 {}] {}\n- 제조사: {}\n- 효능효과: {}\n- 용법용량: {}\n- 주의사항: {}\n- 부작용: {}\n- {}",
                i + 1,
                drug.item_name,
                drug.entp_name.as_deref().unwrap_or("알 수 없음"),
                drug.efficacy.as_deref().unwrap_or("정보 없음"),
                drug.use_method.as_deref().unwrap_or("정보 없음"),
                drug.caution_info.as_deref().unwrap_or("정보 없음"),
                drug.side_effects.as_deref().unwrap_or("정보 없음"),
                score_text(drug.relevance_score, drug.similarity),
            ));
        }
    }

    if let Some(block) = graph_block {
        parts.push(block.to_string());
    }

    parts.join("\n\n")
}
