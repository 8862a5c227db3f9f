//! Prompt templates for each model-backed stage

use crate::models::EvidenceRecord;

pub fn decompose_prompt(document: &str) -> String {
    format!(
        r#"Your task is to decompose the text into atomic claims.
The answer should be a JSON object with a single key "claims", with the value of a list of strings, where each string is a context-independent claim representing one fact.
Note that:
1. Each claim should be concise (less than 15 words) and self-contained.
2. Avoid vague references like "he", "she", "it", "this", "the company"; use the complete name instead.
3. Generate at least one claim for each single sentence in the text.
4. Keep the language of the text.

For example,
Text: Mary is a five-year-old girl, she likes playing piano and she doesn't like cookies.
Output:
{{"claims": ["Mary is a five-year-old girl.", "Mary likes playing piano.", "Mary doesn't like cookies."]}}

Text: {document}
Output:"#
    )
}

pub fn query_prompt(claim: &str) -> String {
    format!(
        r#"Given a claim, generate up to three search engine queries that would find evidence to verify or refute it.
Keep the queries short, specific and in the language of the claim.
The answer should be a JSON object with a single key "queries", with the value of a list of strings.

For example,
Claim: The Eiffel Tower was completed in 1889.
Output:
{{"queries": ["Eiffel Tower completion year", "when was the Eiffel Tower built"]}}

Claim: {claim}
Output:"#
    )
}

pub fn verify_prompt(claim: &str, evidence: &EvidenceRecord) -> String {
    format!(
        r#"Your task is to decide whether the evidence supports, refutes, or is irrelevant to the claim.
Reason step by step about the claim and the evidence first, then decide.
The answer should be a JSON object with two keys: "reasoning" (a short explanation) and "relationship" (one of "SUPPORTS", "REFUTES", "IRRELEVANT").

Claim: {claim}
Evidence: {text}
Source: {url}
Output:"#,
        text = evidence.text,
        url = evidence.url,
    )
}
