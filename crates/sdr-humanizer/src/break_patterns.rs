//! Brazilian-Portuguese idiom catalogue used to score candidate break
//! positions for the semantic chunking strategy (§4.A). Locale-specific;
//! text that matches none of these still chunks fine via the length-based
//! fallback.

use regex::Regex;
use std::sync::OnceLock;

pub fn greeting_then_identification() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(oi|ol[áa]|e a[íi]|bom dia|boa tarde|boa noite)[!,.]?\s+(eu sou|meu nome [ée]|me chamo)").unwrap()
    })
}

pub fn identification_then_question() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(meu nome [ée]|me chamo|eu sou)\s+\w+[!,.]?\s+(como|qual|voc[êe]|posso)").unwrap()
    })
}

pub fn standalone_courtesy() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(por favor|com certeza|sem d[úu]vida|tudo bem\??|claro[!,.]?|perfeito[!,.]?)\b").unwrap()
    })
}

pub fn conversational_connector() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(al[ée]m disso|por outro lado|assim sendo|dessa forma|ent[ãa]o|mas|por[ée]m)\b").unwrap()
    })
}

pub fn question_opener() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(voc[êe]|qual|quando|onde|como|por que|posso)\b").unwrap()
    })
}

pub fn self_intro_verb() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(eu sou|meu nome [ée]|me chamo)\b\s*$").unwrap())
}

/// Two consecutive capitalized tokens — a likely proper name. Breaking
/// between them should be avoided.
pub fn capitalized_pair() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-ZÀ-Ý][a-zà-ÿ]+\s+[A-ZÀ-Ý][a-zà-ÿ]+").unwrap())
}
