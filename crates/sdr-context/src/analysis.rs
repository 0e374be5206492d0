//! Pure derivation functions over a Lead's metadata and recent message
//! history: stage inference, qualification scoring, emotional read, entity
//! extraction, and the reasoning-activation rule. None of these touch the
//! store or the session map — `manager::ContextManager` wires them together.

use chrono::{DateTime, Utc};
use regex::Regex;
use sdr_core::config::SessionConfig;
use sdr_core::types::{
    Direction, EmotionalState, ExtractedEntities, Lead, Message, QualificationProgress,
    Sentiment, Stage, Urgency,
};
use std::sync::OnceLock;

/// Ordered rule set, first match wins (§4.C).
pub fn infer_stage(lead: &Lead) -> Stage {
    let m = &lead.metadata;
    if m.get("meeting_scheduled").and_then(|v| v.as_bool()) == Some(true) {
        return Stage::FollowUp;
    }
    let has_objections = m.get("has_objections").and_then(|v| v.as_bool()).unwrap_or(false);
    let objections_handled = m.get("objections_handled").and_then(|v| v.as_bool()).unwrap_or(false);
    if has_objections && !objections_handled {
        return Stage::ObjectionHandling;
    }
    if m.get("disponibilidade_reuniao").is_some() {
        return Stage::Scheduling;
    }
    if m.get("solucao_interesse").is_some() {
        return Stage::Presentation;
    }
    if m.get("e_decisor").is_some() {
        return Stage::Discovery;
    }
    if m.get("valor_conta").is_some() {
        return Stage::Qualification;
    }
    if lead.name.is_some() {
        return Stage::Identification;
    }
    Stage::InitialContact
}

/// The five qualification criteria (§4.C). `demonstrates_interest` consumes
/// the recent message window separately since it needs message-count and
/// lexicon signals the Lead's metadata doesn't carry alone.
pub fn qualification_progress(
    lead: &Lead,
    recent: &[Message],
    config: &SessionConfig,
) -> QualificationProgress {
    let bill = lead.metadata_f64("valor_conta");
    let high_value_bill = bill
        .map(|b| b >= config.qualification_min_bill_residential)
        .unwrap_or(false);

    let decision_maker = lead.metadata_bool("e_decisor").unwrap_or(false);
    let no_existing_system = lead.metadata_bool("tem_usina_propria") != Some(true);
    let no_active_contract = lead.metadata_bool("tem_contrato_vigente") != Some(true);

    let inbound_count = recent.iter().filter(|m| m.direction == Direction::Inbound).count();
    let asked_questions = recent
        .iter()
        .filter(|m| m.direction == Direction::Inbound)
        .any(|m| m.content.contains('?'));
    let provided_documents = recent
        .iter()
        .any(|m| m.media_type != sdr_core::types::MediaType::None);
    let showed_excitement = excitement_regex()
        .is_match(&recent.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join(" "));
    let availability_given = lead.metadata_str("disponibilidade_reuniao").is_some();

    let interest_signals = [
        inbound_count > 5,
        asked_questions,
        provided_documents,
        showed_excitement,
        availability_given,
    ]
    .iter()
    .filter(|b| **b)
    .count();
    let demonstrates_interest = interest_signals >= 2;

    let criteria = [
        high_value_bill,
        decision_maker,
        no_existing_system,
        no_active_contract,
        demonstrates_interest,
    ];
    let met = criteria.iter().filter(|c| **c).count();
    let completion_pct = ((met as f64 / criteria.len() as f64) * 100.0).round() as u8;

    let next_question = if !high_value_bill {
        Some("Qual o valor médio da sua conta de luz?".to_string())
    } else if bill.is_none() {
        Some("Qual o valor médio da sua conta de luz?".to_string())
    } else if lead.metadata_bool("e_decisor").is_none() {
        Some("Você é o responsável pela decisão sobre a conta de energia?".to_string())
    } else if lead.metadata_bool("tem_usina_propria").is_none() {
        Some("Você já possui algum sistema de energia solar instalado?".to_string())
    } else if lead.metadata_bool("tem_contrato_vigente").is_none() {
        Some("Você tem algum contrato de fornecimento vigente no momento?".to_string())
    } else if !demonstrates_interest {
        Some("O que mais gostaria de saber sobre a solução?".to_string())
    } else {
        None
    };

    QualificationProgress {
        high_value_bill,
        decision_maker,
        no_existing_system,
        no_active_contract,
        demonstrates_interest,
        completion_pct,
        next_question,
    }
}

/// Hard disqualification: bill below the residential floor, or an explicit
/// non-decision-maker with no promise to bring one.
pub fn is_disqualified(lead: &Lead, config: &SessionConfig) -> bool {
    if let Some(bill) = lead.metadata_f64("valor_conta") {
        if bill < config.qualification_min_bill_residential {
            return true;
        }
    }
    if lead.metadata_bool("e_decisor") == Some(false)
        && lead.metadata_bool("trara_decisor").unwrap_or(false) == false
        && lead.metadata_bool("e_decisor").is_some()
    {
        return true;
    }
    false
}

fn positive_lexicon() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(ótimo|otimo|excelente|adorei|perfeito|maravilhoso|interessante|gostei|show|top|legal)\b").unwrap()
    })
}

fn negative_lexicon() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(caro|ruim|p[ée]ssimo|n[ãa]o gostei|desist|cancelar|chato|golpe|desconfi)\w*\b").unwrap()
    })
}

fn urgency_lexicon() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(urgente|agora|hoje|o quanto antes|preciso j[áa]|rápido|rapido)\b").unwrap()
    })
}

fn excitement_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(quero muito|ansioso|animad[oa]|demais|incrível|incrivel)\b|!{2,}").unwrap()
    })
}

/// Over the last 10 inbound messages: sentiment from positive/negative
/// lexicon ratio, interest from that ratio plus average response latency,
/// urgency from a third lexicon (§4.C).
pub fn emotional_analysis(recent: &[Message]) -> EmotionalState {
    let inbound: Vec<&Message> = recent
        .iter()
        .filter(|m| m.direction == Direction::Inbound)
        .rev()
        .take(10)
        .collect();

    if inbound.is_empty() {
        return EmotionalState::default();
    }

    let mut pos_hits = 0usize;
    let mut neg_hits = 0usize;
    let mut urgency_hits = 0usize;
    for m in &inbound {
        pos_hits += positive_lexicon().find_iter(&m.content).count();
        neg_hits += negative_lexicon().find_iter(&m.content).count();
        urgency_hits += urgency_lexicon().find_iter(&m.content).count();
    }

    let total = pos_hits + neg_hits;
    let ratio = if total == 0 { 0.5 } else { pos_hits as f64 / total as f64 };

    let sentiment = if ratio > 0.7 {
        Sentiment::Pos
    } else if ratio < 0.3 {
        Sentiment::Neg
    } else {
        Sentiment::Neu
    };

    let mut interest = 5.0 + if ratio >= 0.5 { 3.0 * ratio } else { -2.0 * (1.0 - ratio) };

    let avg_latency = average_response_latency(recent);
    if let Some(latency) = avg_latency {
        if latency < chrono::Duration::minutes(5) {
            interest += 1.0;
        } else if latency > chrono::Duration::hours(1) {
            interest -= 1.0;
        }
    }
    let interest_level = interest.round().clamp(1.0, 10.0) as u8;

    let urgency = if urgency_hits >= 2 {
        Urgency::High
    } else if urgency_hits == 1 {
        Urgency::Med
    } else {
        Urgency::Low
    };

    EmotionalState {
        interest_level,
        urgency,
        sentiment,
    }
}

/// Average gap between a user message and the agent's prior reply, across
/// the tail of the conversation.
fn average_response_latency(recent: &[Message]) -> Option<chrono::Duration> {
    let mut gaps = Vec::new();
    for window in recent.windows(2) {
        if window[0].direction == Direction::Outbound && window[1].direction == Direction::Inbound {
            gaps.push(window[1].timestamp - window[0].timestamp);
        }
    }
    if gaps.is_empty() {
        return None;
    }
    let total: i64 = gaps.iter().map(|d| d.num_seconds()).sum();
    Some(chrono::Duration::seconds(total / gaps.len() as i64))
}

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:meu nome [ée]|me chamo|eu sou o|eu sou a|sou o|sou a)\s+([A-ZÀ-Ý][a-zà-ÿ]+(?:\s+[A-ZÀ-Ý][a-zà-ÿ]+)?)")
            .unwrap()
    })
}

fn money_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:r\$\s*|\breais\b\s*)?(\d{1,3}(?:[.,]\d{3})*(?:[.,]\d{2})?)\s*(?:reais)?")
            .unwrap()
    })
}

fn property_type_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(casa|apartamento|galp[ãa]o|com[ée]rcio|fazenda|s[íi]tio|ind[úu]stria)\b").unwrap())
}

fn objection_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(muito caro|caro demais|n[ãa]o confio|golpe|j[áa] tenho|n[ãa]o tenho tempo|vou pensar|preciso pensar)\b").unwrap()
    })
}

fn phone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:\+?55\s?)?\(?\d{2}\)?\s?9?\d{4}[-\s]?\d{4}").unwrap())
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\w.+-]+@[\w-]+\.[\w.-]+").unwrap())
}

/// Regex pass over inbound history (§4.C). Monetary values are sanity-ranged
/// to 50–50000 to reject phone-number-shaped or otherwise spurious matches.
pub fn extract_entities(recent: &[Message]) -> ExtractedEntities {
    let mut entities = ExtractedEntities::default();
    let inbound_text: Vec<&str> = recent
        .iter()
        .filter(|m| m.direction == Direction::Inbound)
        .map(|m| m.content.as_str())
        .collect();
    let joined = inbound_text.join("\n");

    if let Some(caps) = name_regex().captures(&joined) {
        entities.name = caps.get(1).map(|m| m.as_str().to_string());
    }

    for caps in money_regex().captures_iter(&joined) {
        if let Some(raw) = caps.get(1) {
            let normalized = raw.as_str().replace('.', "").replace(',', ".");
            if let Ok(value) = normalized.parse::<f64>() {
                if (50.0..=50000.0).contains(&value) {
                    entities.bill_value = Some(value);
                    break;
                }
            }
        }
    }

    if let Some(m) = property_type_regex().find(&joined) {
        entities.property_type = Some(m.as_str().to_lowercase());
    }

    for m in objection_regex().find_iter(&joined) {
        entities.objections.push(m.as_str().to_lowercase());
    }
    entities.objections.sort();
    entities.objections.dedup();

    for m in phone_regex().find_iter(&joined) {
        entities.phones.push(m.as_str().to_string());
    }
    for m in email_regex().find_iter(&joined) {
        entities.emails.push(m.as_str().to_string());
    }

    entities
}

/// ≥2 of the listed signals activates deep-reasoning mode for this turn
/// (§4.C).
pub fn should_use_reasoning(
    stage: Stage,
    emotional_state: &EmotionalState,
    recent: &[Message],
) -> bool {
    let inbound_tail: Vec<&Message> = recent
        .iter()
        .filter(|m| m.direction == Direction::Inbound)
        .rev()
        .take(10)
        .collect();

    let question_marks: usize = inbound_tail
        .iter()
        .map(|m| m.content.matches('?').count())
        .sum();
    let many_questions = question_marks >= 3;

    let technical_objection = inbound_tail
        .iter()
        .any(|m| objection_regex().is_match(&m.content));

    let comparison_regex = Regex::new(r"(?i)\b(vs\.?|melhor|diferen[çc]a)\b").unwrap();
    let comparison = inbound_tail.iter().any(|m| comparison_regex.is_match(&m.content));

    let low_interest_engaged = emotional_state.interest_level <= 3 && !inbound_tail.is_empty();
    let objection_or_discovery = matches!(stage, Stage::ObjectionHandling | Stage::Discovery);

    let signals = [
        many_questions,
        technical_objection,
        comparison,
        low_interest_engaged,
        objection_or_discovery,
    ];
    signals.iter().filter(|s| **s).count() >= 2
}

/// 30 minutes since `last_activity` by default (configurable).
pub fn is_session_expired(last_activity: DateTime<Utc>, now: DateTime<Utc>, config: &SessionConfig) -> bool {
    now - last_activity >= chrono::Duration::minutes(config.session_timeout_min)
}

pub fn is_session_over_duration(created_at: DateTime<Utc>, now: DateTime<Utc>, config: &SessionConfig) -> bool {
    now - created_at >= chrono::Duration::hours(config.max_session_duration_h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdr_core::types::{ConversationId, Direction as Dir, MediaType, Phone};

    fn lead_with(metadata: serde_json::Value) -> Lead {
        let mut lead = Lead::new(Phone::parse("11988887777"));
        lead.metadata = metadata;
        lead
    }

    #[test]
    fn stage_inference_follows_first_match_order() {
        let lead = lead_with(serde_json::json!({ "meeting_scheduled": true, "valor_conta": 4500 }));
        assert_eq!(infer_stage(&lead), Stage::FollowUp);

        let lead = lead_with(serde_json::json!({ "valor_conta": 4500 }));
        assert_eq!(infer_stage(&lead), Stage::Qualification);

        let lead = lead_with(serde_json::json!({}));
        assert_eq!(infer_stage(&lead), Stage::InitialContact);
    }

    #[test]
    fn qualification_commercial_vs_residential_tier_boundary() {
        let config = SessionConfig::default();
        let residential = lead_with(serde_json::json!({ "valor_conta": 400.0 }));
        let below_floor = lead_with(serde_json::json!({ "valor_conta": 399.0 }));

        let q1 = qualification_progress(&residential, &[], &config);
        let q2 = qualification_progress(&below_floor, &[], &config);
        assert!(q1.high_value_bill);
        assert!(!q2.high_value_bill);
    }

    #[test]
    fn extracts_bill_value_in_sane_range() {
        let phone = Phone::parse("11988887777");
        let msg = Message {
            message_id: "1".into(),
            conversation_id: ConversationId::new(),
            phone: phone.clone(),
            direction: Dir::Inbound,
            content: "minha conta é R$ 4.500,00 por mês".to_string(),
            media_type: MediaType::None,
            media_ref: None,
            timestamp: Utc::now(),
        };
        let entities = extract_entities(&[msg]);
        assert_eq!(entities.bill_value, Some(4500.0));
    }

    #[test]
    fn reasoning_activates_on_two_or_more_signals() {
        let phone = Phone::parse("11988887777");
        let msg = |text: &str| Message {
            message_id: uuid::Uuid::now_v7().to_string(),
            conversation_id: ConversationId::new(),
            phone: phone.clone(),
            direction: Dir::Inbound,
            content: text.to_string(),
            media_type: MediaType::None,
            media_ref: None,
            timestamp: Utc::now(),
        };
        let recent = vec![msg("qual a diferença? e o preço? e a garantia???")];
        let emo = EmotionalState {
            interest_level: 5,
            urgency: Urgency::Low,
            sentiment: Sentiment::Neu,
        };
        assert!(should_use_reasoning(Stage::Discovery, &emo, &recent));
    }
}
