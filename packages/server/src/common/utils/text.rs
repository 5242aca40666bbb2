//! Tokenizing helpers used by scoring and keyword extraction.

use std::collections::BTreeSet;

/// Lowercase tokens. `+` and `#` are kept so that "C++" and "C#" survive;
/// everything else non-alphanumeric splits.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '+' || c == '#'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// True when every token of `phrase` appears contiguously in `haystack`.
pub fn contains_phrase(haystack: &[String], phrase: &str) -> bool {
    let needle = tokenize(phrase);
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack
        .windows(needle.len())
        .any(|window| window == needle.as_slice())
}

/// Vocabulary terms found in `text`, lowercased and deduplicated.
pub fn extract_keywords<'a>(text: &str, vocabulary: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let tokens = tokenize(text);
    vocabulary
        .into_iter()
        .filter(|term| contains_phrase(&tokens, term))
        .map(|term| term.trim().to_lowercase())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Technology terms recognised in resumes even when the profile lists none.
pub const COMMON_SKILLS: &[&str] = &[
    "rust", "go", "python", "java", "kotlin", "scala", "c++", "c#", "typescript",
    "javascript", "ruby", "elixir", "swift", "sql", "postgres", "postgresql", "mysql",
    "redis", "kafka", "docker", "kubernetes", "terraform", "aws", "gcp", "azure", "react",
    "node js", "graphql", "grpc", "linux", "machine learning", "data engineering",
    "distributed systems",
];
