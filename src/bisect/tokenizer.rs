//! Verdict command tokenizer (C13): parses one line of interactive input
//! already past the fixed command table into new verdict clauses.
//!
//! `good abc123 bad`: the second keyword with no following ref applies to
//! the current commit implicitly.

use crate::bisect::engine::Verdict;

const KEYWORDS: [(&str, Verdict); 4] =
    [("good", Verdict::Good), ("bad", Verdict::Bad), ("skip", Verdict::Skip), ("unmark", Verdict::Unmark)];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenizedVerdict {
    pub refs: Vec<(String, Verdict)>,
    /// Set when the same ref appears twice with a different verdict; the
    /// later clause wins and this records what was overridden.
    pub conflicts: Vec<(String, Verdict, Verdict)>,
}

/// Matches `token` against the keyword table by unique prefix. Returns
/// `None` if it matches zero or more than one keyword.
fn match_keyword(token: &str) -> Option<Verdict> {
    let token = token.to_ascii_lowercase();
    let mut matched = None;
    for (keyword, verdict) in KEYWORDS {
        if keyword.starts_with(token.as_str()) {
            if matched.is_some() {
                return None;
            }
            matched = Some(verdict);
        }
    }
    matched
}

/// Tokenizes one line into clauses, resolving refs positionally (ref
/// resolution itself — turning a ref string into a commit ID — is left to
/// the caller, which has access to the VCS adapter).
pub fn tokenize(line: &str, current_commit: &str) -> TokenizedVerdict {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let mut clauses: Vec<(Verdict, Vec<String>)> = Vec::new();

    let mut i = 0;
    while i < tokens.len() {
        if let Some(verdict) = match_keyword(tokens[i]) {
            let mut refs = Vec::new();
            let mut j = i + 1;
            while j < tokens.len() && match_keyword(tokens[j]).is_none() {
                refs.push(tokens[j].to_string());
                j += 1;
            }
            if refs.is_empty() {
                refs.push(current_commit.to_string());
            }
            clauses.push((verdict, refs));
            i = j;
        } else {
            i += 1;
        }
    }

    let mut order: Vec<(String, Verdict)> = Vec::new();
    let mut last_verdict: std::collections::HashMap<String, Verdict> = std::collections::HashMap::new();
    let mut conflicts = Vec::new();

    for (verdict, refs) in clauses {
        for r in refs {
            if let Some(&previous) = last_verdict.get(&r) {
                if previous != verdict {
                    conflicts.push((r.clone(), previous, verdict));
                }
            }
            last_verdict.insert(r.clone(), verdict);
            order.push((r, verdict));
        }
    }

    // Only the last verdict per ref should win; dedup keeping the last entry.
    let mut seen = std::collections::HashSet::new();
    let refs: Vec<(String, Verdict)> = order
        .into_iter()
        .rev()
        .filter(|(r, _)| seen.insert(r.clone()))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    TokenizedVerdict { refs, conflicts }
}
