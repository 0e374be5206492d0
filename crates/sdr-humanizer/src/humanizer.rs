//! The Humanizer (§4.A): turns one agent reply into an ordered plan of
//! paced, typing-indicated outbound operations, and drives their delivery.

use async_trait::async_trait;
use rand::Rng;
use regex::Regex;
use sdr_core::config::HumanizerConfig;
use sdr_core::types::{EmotionalState, Phone};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{instrument, warn};

use crate::chunk::{chunk_length_based, chunk_semantic, enforce_bounds};
use crate::error::Result;

/// The Humanizer's only external collaborator: whatever can actually put
/// text and typing-indicator signals on the wire. Implemented by
/// `sdr-channels::whatsapp::WhatsAppChannel` in the running system.
#[async_trait]
pub trait OutboundGateway: Send + Sync {
    async fn send_text(&self, phone: &Phone, text: &str) -> Result<()>;
    async fn send_typing(&self, phone: &Phone, on: bool) -> Result<()>;
}

/// The media-sending half of the outbound gateway, kept separate from
/// [`OutboundGateway`] so pure-text callers (the follow-up scheduler) don't
/// need to depend on `sdr_core::types::MediaType`. Implemented by
/// `sdr-channels::whatsapp::WhatsAppChannel` alongside `OutboundGateway`.
#[async_trait]
pub trait MediaGateway: Send + Sync {
    async fn send_media(
        &self,
        phone: &Phone,
        media_type: sdr_core::types::MediaType,
        media_ref: &str,
        caption: Option<&str>,
    ) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ChunkOp {
    pub pre_pause: f64,
    pub typing_duration: f64,
    pub text: String,
    pub post_pause: f64,
}

pub type ChunkPlan = Vec<ChunkOp>;

pub struct Humanizer {
    config: HumanizerConfig,
}

fn speed_modifier(mood: &str) -> f64 {
    match mood {
        "enthusiastic" => 1.2,
        "empathetic" => 0.9,
        "determined" => 1.05,
        _ => 1.0,
    }
}

fn pause_modifier(mood: &str) -> f64 {
    match mood {
        "enthusiastic" => 1.2,
        "empathetic" => 0.9,
        "determined" => 1.05,
        _ => 1.0,
    }
}

fn error_modifier(mood: &str) -> f64 {
    // A mildly excited or rushed sender is more typo-prone than a neutral one.
    match mood {
        "enthusiastic" => 1.5,
        "determined" => 1.2,
        _ => 1.0,
    }
}

impl Humanizer {
    pub fn new(config: HumanizerConfig) -> Self {
        Self { config }
    }

    /// Build the ordered chunk plan for `text`. Does not perform any I/O.
    #[instrument(skip(self, text))]
    pub fn plan(&self, text: &str, emotional_state: &EmotionalState, is_first_message: bool) -> ChunkPlan {
        let normalized = normalize_markdown(text);
        let mut rng = rand::thread_rng();

        let chunks = if rng.gen_bool(0.6) {
            let semantic = chunk_semantic(&normalized, &mut rng);
            if semantic.len() > 1 {
                semantic
            } else {
                chunk_length_based(&normalized, self.config.chunk_word_min, self.config.chunk_word_max)
            }
        } else {
            chunk_length_based(&normalized, self.config.chunk_word_min, self.config.chunk_word_max)
        };

        let chunks = enforce_bounds(chunks, self.config.chunk_word_min, self.config.chunk_word_max);
        let chunks = apply_typos(chunks, emotional_state, &mut rng);

        let mood = emotional_state.mood();
        let speed_mod = speed_modifier(mood);
        let pause_mod = pause_modifier(mood);

        let mut plan = Vec::with_capacity(chunks.len());
        for (i, text) in chunks.into_iter().enumerate() {
            let wpm = rng.gen_range(self.config.typing_wpm_min..=self.config.typing_wpm_max) as f64;
            let word_count = text.split_whitespace().count().max(1) as f64;
            let jitter = rng.gen_range(0.85..=1.15);
            let typing_duration = ((word_count / wpm) * 60.0 * jitter * speed_mod).clamp(2.0, 15.0);

            let pre_pause = if i == 0 {
                if is_first_message {
                    rng.gen_range(1.5..=3.0) * pause_mod
                } else {
                    rng.gen_range(0.8..=1.5) * pause_mod
                }
            } else {
                rng.gen_range(0.3..=0.8) * pause_mod
            };

            let post_pause = if text.trim_end().ends_with('?') {
                rng.gen_range(0.8..=1.2) * pause_mod
            } else {
                rng.gen_range(0.3..=0.7) * pause_mod
            };

            plan.push(ChunkOp {
                pre_pause,
                typing_duration,
                text,
                post_pause,
            });
        }
        plan
    }

    /// Sequentially execute a plan: pre-pause, typing indicator, send, post-pause.
    /// Each send is idempotent from the humanizer's own view; a gateway error
    /// is returned to the caller, which decides whether to retry.
    #[instrument(skip(self, plan, gateway))]
    pub async fn execute(
        &self,
        plan: &ChunkPlan,
        phone: &Phone,
        gateway: &dyn OutboundGateway,
    ) -> Result<()> {
        for op in plan {
            tokio::time::sleep(Duration::from_secs_f64(op.pre_pause)).await;

            if let Err(e) = gateway.send_typing(phone, true).await {
                warn!(phone = %phone, error = %e, "typing indicator send failed, continuing");
            }
            tokio::time::sleep(Duration::from_secs_f64(op.typing_duration)).await;

            gateway.send_text(phone, &op.text).await?;
            tokio::time::sleep(Duration::from_secs_f64(op.post_pause)).await;
        }
        Ok(())
    }
}

/// Inject at most one typo per chunk with probability 0.03 × error_modifier.
/// 70% of the time the typo chunk is followed by a corrected chunk marked
/// with a trailing `*`; otherwise only the typo is emitted.
fn apply_typos(chunks: Vec<String>, emotional_state: &EmotionalState, rng: &mut impl Rng) -> Vec<String> {
    let modifier = error_modifier(emotional_state.mood());
    let mut out = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let p = 0.03 * modifier;
        if rng.gen_bool(p.min(1.0)) {
            if let Some((typo, original)) = inject_typo(&chunk, rng) {
                out.push(typo);
                if rng.gen_bool(0.7) {
                    out.push(format!("{original}*"));
                }
                continue;
            }
        }
        out.push(chunk);
    }
    out
}

/// Pick a word longer than 2 chars, and mutate a non-edge character via one
/// of three typo kinds. Returns `(typo_text, original_text)`.
fn inject_typo(chunk: &str, rng: &mut impl Rng) -> Option<(String, String)> {
    let words: Vec<&str> = chunk.split_whitespace().collect();
    let candidates: Vec<usize> = words
        .iter()
        .enumerate()
        .filter(|(_, w)| w.len() > 2)
        .map(|(i, _)| i)
        .collect();
    if candidates.is_empty() {
        return None;
    }
    let word_idx = candidates[rng.gen_range(0..candidates.len())];
    let word: Vec<char> = words[word_idx].chars().collect();
    if word.len() <= 2 {
        return None;
    }
    let pos = rng.gen_range(1..word.len() - 1);

    let mutated: String = match rng.gen_range(0..3) {
        0 => adjacent_key_typo(&word, pos),
        1 => transpose_typo(&word, pos),
        _ => drop_char_typo(&word, pos),
    };

    let mut typo_words = words.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    typo_words[word_idx] = mutated;
    Some((typo_words.join(" "), chunk.to_string()))
}

fn adjacent_key_typo(word: &[char], pos: usize) -> String {
    const QWERTY_NEIGHBORS: &[(char, char)] = &[
        ('a', 's'), ('s', 'd'), ('d', 'f'), ('q', 'w'), ('w', 'e'), ('e', 'r'),
        ('o', 'p'), ('i', 'o'), ('l', 'k'), ('n', 'm'),
    ];
    let c = word[pos].to_ascii_lowercase();
    let replacement = QWERTY_NEIGHBORS
        .iter()
        .find_map(|(a, b)| if *a == c { Some(*b) } else if *b == c { Some(*a) } else { None })
        .unwrap_or(c);
    let mut out: String = word.iter().collect();
    out.replace_range(pos..pos + 1, &replacement.to_string());
    out
}

fn transpose_typo(word: &[char], pos: usize) -> String {
    let mut chars = word.to_vec();
    if pos + 1 < chars.len() {
        chars.swap(pos, pos + 1);
    }
    chars.into_iter().collect()
}

fn drop_char_typo(word: &[char], pos: usize) -> String {
    let mut chars = word.to_vec();
    chars.remove(pos);
    chars.into_iter().collect()
}

fn bold_currency_and_percent() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(R\$\s?[\d.,]+|\d+%)").unwrap())
}

/// Normalize markdown to the gateway's lightweight style: `**x**`/`__x__`
/// become `*x*`, headers are stripped, currency/percent tokens get bolded,
/// and leading `-` markers become bullets.
pub fn normalize_markdown(text: &str) -> String {
    let mut result = String::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        let stripped = trimmed.trim_start_matches('#').trim_start();
        let line = if trimmed.starts_with('#') { stripped } else { line };

        let line = if line.trim_start().starts_with("- ") {
            line.replacen("- ", "• ", 1)
        } else {
            line.to_string()
        };
        result.push_str(&line);
        result.push('\n');
    }

    let mut out = result
        .replace("**", "*")
        .replace("__", "*");

    out = bold_currency_and_percent()
        .replace_all(&out, |caps: &regex::Captures| {
            let token = &caps[0];
            if token.starts_with('*') {
                token.to_string()
            } else {
                format!("*{token}*")
            }
        })
        .to_string();

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_respects_typing_delay_bounds() {
        let h = Humanizer::new(HumanizerConfig::default());
        let emo = EmotionalState::default();
        let plan = h.plan("Oi! Tudo bem? Quero te contar sobre energia solar e como você pode economizar até 95% na conta de luz todo mês.", &emo, true);
        for op in &plan {
            assert!(op.typing_duration >= 2.0 && op.typing_duration <= 15.0);
        }
    }

    #[test]
    fn normalize_markdown_converts_bold_and_headers() {
        let out = normalize_markdown("# Título\n**negrito** e __outro__\n- item");
        assert!(!out.contains('#'));
        assert!(out.contains("*negrito*"));
        assert!(out.contains('•'));
    }

    #[test]
    fn normalize_markdown_bolds_currency() {
        let out = normalize_markdown("sua conta é R$ 450,00");
        assert!(out.contains("*R$ 450,00*"));
    }
}
