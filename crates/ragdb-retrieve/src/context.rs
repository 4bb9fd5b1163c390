//! Turns ranked results into the citation-annotated context block and prompt
//! handed to the answering model.

use ragdb_core::types::RetrievalResult;

/// Answer text when retrieval found no evidence.
pub const NOT_AVAILABLE: &str = "The information is not available in the provided documents.";

/// One block per result, in rank order, separated by a blank line.
pub fn build_context(results: &[RetrievalResult]) -> String {
    results
        .iter()
        .map(|r| {
            format!(
                "SOURCE ID: {}\nSOURCE DOCUMENT: {}\nDOCUMENT ID: {}\nCONTENT:\n{}",
                r.source_label(),
                r.source_doc(),
                r.doc_id(),
                r.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptTemplate {
    /// Plain question over context.
    Baseline,
    /// Context-only answering with an explicit not-available fallback.
    Grounded,
    /// Cited bullet points as JSON with a confidence score.
    #[default]
    CitedJson,
}

impl std::str::FromStr for PromptTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "baseline" | "v0" => Ok(Self::Baseline),
            "grounded" | "v1" => Ok(Self::Grounded),
            "cited-json" | "cited_json" | "json" | "v2" => Ok(Self::CitedJson),
            other => Err(format!("unknown prompt template '{other}'")),
        }
    }
}

const BASELINE: &str = "Answer the question using the provided context.
Context:
{context}

Question:
{question}
";

const GROUNDED: &str = "You are a policy QA assistant.

Rules:
- Answer ONLY using the provided context.
- If the answer is not present, say: \"{not_available}\"
- Do NOT use external knowledge.
- Be concise and factual.

Context:
{context}

Question:
{question}

Answer (bullet points if applicable):
";

const CITED_JSON: &str = r#"You are a policy QA assistant.

STRICT RULES:
- Answer ONLY using the provided context.
- Do NOT use external knowledge.
- Each bullet point MUST cite its source(s) by SOURCE ID.
- If the answer is not present, return an empty answer array.
- Provide a confidence score between 0.0 and 1.0 based on evidence strength.
- Output MUST be valid JSON matching the schema below.
- Do NOT include explanations outside JSON.

JSON Schema:
{
  "answer": [
    {
      "point": "string",
      "sources": ["Source 1"]
    }
  ],
  "confidence": 0.0
}

Context:
{context}

Question:
{question}

JSON Answer:
"#;

pub fn render_prompt(template: PromptTemplate, context: &str, question: &str) -> String {
    let raw = match template {
        PromptTemplate::Baseline => BASELINE,
        PromptTemplate::Grounded => GROUNDED,
        PromptTemplate::CitedJson => CITED_JSON,
    };
    // context last: retrieved text may itself contain "{question}"
    raw.replace("{not_available}", NOT_AVAILABLE)
        .replace("{question}", question)
        .replacen("{context}", context, 1)
}
