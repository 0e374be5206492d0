//! Chunking policy (§4.A): split a reply into naturally paced pieces via
//! one of two strategies, then enforce min/max word-count bounds.

use rand::Rng;

use crate::break_patterns::{
    capitalized_pair, conversational_connector, question_opener, self_intro_verb,
    standalone_courtesy,
};

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            sentences.push(current.trim().to_string());
            current.clear();
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current.trim().to_string());
    }
    sentences.into_iter().filter(|s| !s.is_empty()).collect()
}

fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

/// Score a candidate break between `before` (the chunk so far) and `after`
/// (what comes next), per the four factors in §4.A.
fn score_break(before: &str, after: &str) -> f64 {
    let mut score: f64 = 0.5;

    let wc = word_count(before);
    if (3..=12).contains(&wc) {
        score += 0.2;
    } else if wc < 2 || wc > 20 {
        score -= 0.3;
    }

    if self_intro_verb().is_match(before) {
        score -= 0.15;
    }

    if question_opener().is_match(after.split_whitespace().next().unwrap_or("")) {
        score += 0.15;
    }

    let boundary = format!(
        "{} {}",
        before.split_whitespace().last().unwrap_or(""),
        after.split_whitespace().next().unwrap_or("")
    );
    if capitalized_pair().is_match(&boundary) {
        score -= 0.4;
    }

    score.clamp(0.0, 1.0)
}

/// Semantic-break strategy: walk sentence boundaries, scoring each as a
/// candidate chunk break using the idiom catalogue plus the scoring rubric.
pub fn chunk_semantic(text: &str, rng: &mut impl Rng) -> Vec<String> {
    let sentences = split_sentences(text);
    if sentences.len() <= 1 {
        return sentences;
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for (i, sentence) in sentences.iter().enumerate() {
        if current.is_empty() {
            current = sentence.clone();
        } else {
            current.push(' ');
            current.push_str(sentence);
        }

        let is_last = i == sentences.len() - 1;
        if is_last {
            continue;
        }

        let next = &sentences[i + 1];
        let has_break_signal = conversational_connector().is_match(next)
            || standalone_courtesy().is_match(&current)
            || question_opener().is_match(next.split_whitespace().next().unwrap_or(""));

        let score = score_break(&current, next);
        let accept = score > 0.6 || (has_break_signal && rng.gen_bool(0.3));
        if accept {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Length-based fallback: split at sentence terminators, targeting 3-15
/// word chunks and never leaving a trailing comma at a break.
pub fn chunk_length_based(text: &str, min_words: usize, max_words: usize) -> Vec<String> {
    let sentences = split_sentences(text);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_words = 0usize;

    for sentence in sentences {
        let sentence_words = word_count(&sentence);
        if current_words > 0 && current_words + sentence_words > max_words {
            chunks.push(trim_trailing_comma(current.trim()));
            current.clear();
            current_words = 0;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&sentence);
        current_words += sentence_words;
        if current_words >= min_words && current_words <= max_words {
            chunks.push(trim_trailing_comma(current.trim()));
            current.clear();
            current_words = 0;
        }
    }
    if !current.trim().is_empty() {
        chunks.push(trim_trailing_comma(current.trim()));
    }
    chunks
}

fn trim_trailing_comma(s: &str) -> String {
    s.trim_end_matches(',').trim().to_string()
}

/// Enforce min=3/max=15 words per chunk: merge undersized trailing chunks
/// into their predecessor, split oversized ones at the nearest word
/// boundary.
pub fn enforce_bounds(chunks: Vec<String>, min_words: usize, max_words: usize) -> Vec<String> {
    if chunks.is_empty() {
        return chunks;
    }

    let mut merged: Vec<String> = Vec::new();
    for chunk in chunks {
        if word_count(&chunk) < min_words && !merged.is_empty() {
            let last = merged.last_mut().unwrap();
            last.push(' ');
            last.push_str(&chunk);
        } else {
            merged.push(chunk);
        }
    }

    let mut result = Vec::new();
    for chunk in merged {
        let words: Vec<&str> = chunk.split_whitespace().collect();
        if words.len() <= max_words {
            result.push(chunk);
            continue;
        }
        for slice in words.chunks(max_words) {
            result.push(slice.join(" "));
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_based_respects_target_window() {
        let text = "Oi! Tudo bem? Sou da SolarPrime e quero te ajudar a economizar na conta de luz todo mês.";
        let chunks = chunk_length_based(text, 3, 15);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(word_count(c) > 0);
        }
    }

    #[test]
    fn enforce_bounds_merges_short_trailing_chunk() {
        let chunks = vec!["Oi tudo bem com você hoje".to_string(), "sim".to_string()];
        let out = enforce_bounds(chunks, 3, 15);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn enforce_bounds_splits_oversized_chunk() {
        let long = (0..20).map(|i| format!("palavra{i}")).collect::<Vec<_>>().join(" ");
        let out = enforce_bounds(vec![long], 3, 15);
        assert!(out.len() >= 2);
        for c in &out {
            assert!(word_count(c) <= 15);
        }
    }
}
