//! Character-based Korean tokenizer.
//!
//! No morphological analyzer is available for the corpus language, so
//! sub-word matching is approximated with character n-grams over pure
//! Hangul tokens. Symptom keywords are emitted multiple times; the
//! lexical ranker reads repetition as term frequency, which acts as a
//! term weight without touching the scoring function itself.
//!
//! Synonym expansion is query-side only. Documents are indexed without
//! it so the index stays compact while lay phrasings ("배가 아파요")
//! still reach clinical vocabulary ("복통") at query time.

use std::collections::HashSet;

const STOPWORDS: &[&str] = &[
    "이", "가", "을", "를", "의", "에", "에서", "으로", "로", "와", "과",
    "는", "은", "도", "만", "까지", "부터", "에게", "한테", "께",
    "하다", "있다", "되다", "없다", "않다", "이다", "아니다",
    "그", "저", "이것", "그것", "저것", "여기", "거기", "저기",
    "및", "등", "것", "수", "때", "중", "내", "위", "후", "전",
    "좀", "너무", "매우", "정말", "아주", "많이", "조금", "약간",
    "해요", "합니다", "해주세요", "주세요", "싶어요", "같아요",
];

const SYMPTOM_KEYWORDS: &[&str] = &[
    "두통", "열", "발열", "기침", "콧물", "재채기", "인후통", "목아픔",
    "복통", "설사", "변비", "구토", "소화불량", "속쓰림", "위통",
    "근육통", "관절통", "요통", "허리", "어깨", "무릎",
    "피로", "무기력", "권태", "졸음", "불면", "두드러기",
    "가려움", "발진", "염증", "통증", "붓기", "부종",
    "어지러움", "현기증", "메스꺼움", "구역질",
    "감기", "독감", "알레르기", "비염", "천식",
];

/// Lay phrasing → clinical terms, applied at query time.
const SYNONYMS: &[(&str, &[&str])] = &[
    ("머리", &["두통"]),
    ("배", &["복통", "소화불량"]),
    ("속", &["소화불량", "속쓰림"]),
    ("목", &["인후통"]),
    ("코", &["콧물", "비염"]),
    ("열", &["발열"]),
    ("허리", &["요통"]),
    ("어지럽", &["어지러움", "현기증"]),
    ("가렵", &["가려움", "두드러기"]),
    ("메스", &["메스꺼움", "구역질"]),
    ("아파", &["통증"]),
    ("아프", &["통증"]),
    ("피곤", &["피로"]),
];

#[derive(Debug, Clone)]
pub struct KoreanTokenizer {
    stopwords: HashSet<&'static str>,
    symptom_keywords: HashSet<&'static str>,
}

impl Default for KoreanTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl KoreanTokenizer {
    pub fn new() -> Self {
        Self {
            stopwords: STOPWORDS.iter().copied().collect(),
            symptom_keywords: SYMPTOM_KEYWORDS.iter().copied().collect(),
        }
    }

    pub fn is_symptom_keyword(&self, token: &str) -> bool {
        self.symptom_keywords.contains(token)
    }

    /// Symptom keywords present in the text, in first-seen order.
    pub fn extract_symptoms(&self, text: &str, limit: usize) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for token in self.tokenize(text, true) {
            if self.symptom_keywords.contains(token.as_str()) && seen.insert(token.clone()) {
                found.push(token);
                if found.len() == limit {
                    break;
                }
            }
        }
        found
    }

    /// Tokenize into a multiset of lexical tokens.
    ///
    /// Deterministic for the same input and synonym table.
    pub fn tokenize(&self, text: &str, expand_synonyms: bool) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }

        let lowered = text.to_lowercase();
        let cleaned: String = lowered
            .chars()
            .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
            .collect();

        let base: Vec<&str> = cleaned
            .split_whitespace()
            .filter(|t| !self.stopwords.contains(*t) && t.chars().count() >= 2)
            .collect();

        let mut out: Vec<String> = Vec::new();
        let mut two_grams: Vec<String> = Vec::new();

        for token in &base {
            out.push((*token).to_string());

            let chars: Vec<char> = token.chars().collect();
            if chars.len() >= 2 && chars.iter().all(|&c| is_hangul_syllable(c)) {
                for window in chars.windows(2) {
                    let gram: String = window.iter().collect();
                    two_grams.push(gram.clone());
                    out.push(gram);
                }
                if chars.len() >= 3 {
                    for window in chars.windows(3) {
                        out.push(window.iter().collect());
                    }
                }
            }

            // Repetition doubles as a term weight for the lexical ranker.
            if self.symptom_keywords.contains(*token) {
                out.push((*token).to_string());
                out.push((*token).to_string());
            }
        }

        if expand_synonyms {
            self.expand(&base, &two_grams, &mut out);
        }

        out
    }

    fn expand(&self, tokens: &[&str], two_grams: &[String], out: &mut Vec<String>) {
        // Exact key matches over tokens and their 2-grams.
        for unit in tokens.iter().copied().chain(two_grams.iter().map(String::as_str)) {
            if let Some(terms) = synonym_terms(unit) {
                for term in terms {
                    out.push((*term).to_string());
                    if self.symptom_keywords.contains(term) {
                        out.push((*term).to_string());
                    }
                }
            }
        }

        // Partial matches: a token containing a key (or contained by one)
        // still pulls in that key's clinical terms.
        for token in tokens {
            for (key, terms) in SYNONYMS {
                if *key != *token && (token.contains(key) || key.contains(token)) {
                    for term in *terms {
                        out.push((*term).to_string());
                    }
                }
            }
        }
    }
}

fn synonym_terms(unit: &str) -> Option<&'static [&'static str]> {
    SYNONYMS
        .iter()
        .find(|(key, _)| *key == unit)
        .map(|(_, terms)| *terms)
}

fn is_hangul_syllable(c: char) -> bool {
    ('가'..='힣').contains(&c)
}
