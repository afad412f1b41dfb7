// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The rule engine: cached compiled rule set, priority-ordered matching,
//! cooldown enforcement, and sequential action dispatch with
//! partial-failure accounting.
//!
//! The compiled set is replaced wholesale on save/reload; readers clone
//! the Arc and never observe a partially updated set.

use std::sync::{Arc, RwLock};

use regex::{Regex, RegexBuilder};
use tracing::{info, warn};
use wagate_core::{
    ActionOutcome, EvaluatedRule, NormalizedEvent, WagateError, normalize_event_type,
    truncate_chars,
};
use wagate_evolution::EvolutionClient;
use wagate_hass::HassClient;
use wagate_storage::models::NewRuleFire;
use wagate_storage::{Database, queries};

use crate::model::{Action, ChatKindFilter, Rule, RuleSet, TextMode};
use crate::validate::parse_ruleset;

/// Triggering text is truncated to this many characters in fire records.
const MATCHED_TEXT_MAX: usize = 500;

/// A rule with its regex patterns compiled and event kinds normalised.
pub struct CompiledRule {
    pub rule: Rule,
    events: Vec<String>,
    regexes: Vec<Regex>,
}

/// The engine's read-only view of the current rule set: enabled rules,
/// stably sorted by ascending priority.
#[derive(Default)]
pub struct CompiledRuleSet {
    pub rules: Vec<CompiledRule>,
}

/// Compile a parsed rule set for matching.
///
/// Fails only on regex patterns that do not compile; validation catches
/// those before save, so this is a backstop for hand-edited store rows.
pub fn compile(set: &RuleSet) -> Result<CompiledRuleSet, WagateError> {
    let mut rules = Vec::new();
    for rule in set.rules.iter().filter(|r| r.enabled) {
        let events = rule
            .match_clause
            .events
            .iter()
            .map(|e| normalize_event_type(e))
            .collect();
        let mut regexes = Vec::new();
        if let Some(ref text) = rule.match_clause.text
            && text.mode == TextMode::Regex
        {
            for pattern in &text.patterns {
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        WagateError::Validation(format!(
                            "rule `{}`: invalid regex `{pattern}`: {e}",
                            rule.id
                        ))
                    })?;
                regexes.push(regex);
            }
        }
        rules.push(CompiledRule {
            rule: rule.clone(),
            events,
            regexes,
        });
    }
    // Stable: rules with equal priority keep document order.
    rules.sort_by_key(|r| r.rule.priority);
    Ok(CompiledRuleSet { rules })
}

/// Whether a compiled rule matches a normalised event.
fn rule_matches(rule: &CompiledRule, event: &NormalizedEvent) -> bool {
    let clause = &rule.rule.match_clause;

    // 1. Subscribed event kinds.
    if !rule.events.is_empty() && !rule.events.iter().any(|e| e == &event.event_type) {
        return false;
    }

    // 2. + 3. Chat kind and ids.
    if let Some(ref chat) = clause.chat {
        let kind_ok = match chat.kind {
            ChatKindFilter::Any => true,
            ChatKindFilter::Group => event.chat_kind == wagate_core::ChatKind::Group,
            ChatKindFilter::Direct => event.chat_kind == wagate_core::ChatKind::Direct,
        };
        if !kind_ok {
            return false;
        }
        if !chat.ids.is_empty() && !chat.ids.iter().any(|id| id == &event.chat_id) {
            return false;
        }
    }

    // 4. Sender ids AND numbers (both must hold when both are set).
    if let Some(ref sender) = clause.sender {
        if !sender.ids.is_empty() && !sender.ids.iter().any(|id| id == &event.sender_id) {
            return false;
        }
        if !sender.numbers.is_empty() {
            let number = event.sender_number();
            if !sender.numbers.iter().any(|n| n == number) {
                return false;
            }
        }
    }

    // 5. Text patterns.
    if let Some(ref text) = clause.text {
        let trimmed = event.text.trim();
        if trimmed.is_empty() {
            return false;
        }
        let matched = match text.mode {
            TextMode::Contains => {
                let haystack = trimmed.to_ascii_lowercase();
                text.patterns
                    .iter()
                    .any(|p| haystack.contains(&p.trim().to_ascii_lowercase()))
            }
            TextMode::StartsWith => {
                let haystack = trimmed.to_ascii_lowercase();
                text.patterns
                    .iter()
                    .any(|p| haystack.starts_with(&p.trim().to_ascii_lowercase()))
            }
            TextMode::Regex => rule.regexes.iter().any(|r| r.is_match(&event.text)),
        };
        if !matched {
            return false;
        }
    }

    true
}

/// The rule engine. Cheap to share behind an Arc; all mutation is the
/// atomic cache swap.
pub struct RuleEngine {
    db: Database,
    evolution: EvolutionClient,
    hass: HassClient,
    instance: String,
    allowed_services: Vec<String>,
    cache: RwLock<Arc<CompiledRuleSet>>,
}

impl RuleEngine {
    pub fn new(
        db: Database,
        evolution: EvolutionClient,
        hass: HassClient,
        instance: String,
        allowed_services: Vec<String>,
    ) -> Self {
        Self {
            db,
            evolution,
            hass,
            instance,
            allowed_services,
            cache: RwLock::new(Arc::new(CompiledRuleSet::default())),
        }
    }

    /// Current compiled set. Readers hold no lock after this returns.
    pub fn snapshot(&self) -> Arc<CompiledRuleSet> {
        self.cache
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Compile `yaml` and swap it in as the active set. Returns the
    /// number of enabled rules.
    pub fn install_yaml(&self, yaml: &str) -> Result<usize, WagateError> {
        let set = parse_ruleset(yaml)?;
        let compiled = compile(&set)?;
        let count = compiled.rules.len();
        let mut cache = self
            .cache
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *cache = Arc::new(compiled);
        Ok(count)
    }

    /// Reload the active set from the store. An absent rule-set row
    /// installs the empty set.
    pub async fn load_from_store(&self) -> Result<usize, WagateError> {
        let yaml = queries::ruleset::get_ruleset(&self.db)
            .await?
            .map(|row| row.yaml)
            .unwrap_or_default();
        let count = self.install_yaml(&yaml)?;
        info!(rules = count, "rule set loaded");
        Ok(count)
    }

    /// Evaluate one normalised event against the active set.
    ///
    /// For each enabled rule in priority order: cooldown check first (a
    /// cooldown-skipped rule never stops the chain), then matching, then
    /// sequential action dispatch with one persisted fire record per
    /// fired rule. Returns the number of fires.
    pub async fn handle_event(
        &self,
        event: &NormalizedEvent,
        message_id: Option<&str>,
    ) -> Result<usize, WagateError> {
        let snapshot = self.snapshot();
        let mut fired = 0usize;

        for compiled in &snapshot.rules {
            let rule = &compiled.rule;

            if queries::cooldowns::is_on_cooldown(&self.db, &rule.id, &event.chat_id).await? {
                info!(rule_id = rule.id.as_str(), chat_id = event.chat_id.as_str(),
                      reason = "cooldown active", "rule skipped");
                continue;
            }

            if !rule_matches(compiled, event) {
                continue;
            }

            info!(
                rule_id = rule.id.as_str(),
                chat_id = event.chat_id.as_str(),
                event_type = event.event_type.as_str(),
                "rule matched"
            );

            let outcomes = self.run_actions(rule, event).await;
            let success = outcomes.iter().all(|o| o.success);
            let error_message = join_errors(&outcomes);
            if let Some(ref errors) = error_message {
                warn!(rule_id = rule.id.as_str(), errors = errors.as_str(), "rule actions failed");
            }

            queries::rule_fires::insert_rule_fire(
                &self.db,
                NewRuleFire {
                    rule_id: rule.id.clone(),
                    rule_name: rule.name.clone(),
                    message_id: message_id.map(str::to_string),
                    chat_id: event.chat_id.clone(),
                    sender_id: event.sender_id.clone(),
                    matched_text: truncate_chars(&event.text, MATCHED_TEXT_MAX),
                    actions_json: serde_json::to_string(&outcomes)
                        .unwrap_or_else(|_| "[]".to_string()),
                    success,
                    error_message,
                },
            )
            .await?;
            fired += 1;

            if rule.cooldown_seconds > 0 {
                queries::cooldowns::set_cooldown(
                    &self.db,
                    &rule.id,
                    &event.chat_id,
                    rule.cooldown_seconds,
                )
                .await?;
            }

            if rule.stop_on_match {
                break;
            }
        }

        Ok(fired)
    }

    async fn run_actions(&self, rule: &Rule, event: &NormalizedEvent) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::with_capacity(rule.actions.len());
        for action in &rule.actions {
            let result = match action {
                Action::HaService {
                    service,
                    target,
                    data,
                } => self
                    .hass
                    .call_service(service, target, data, &self.allowed_services)
                    .await
                    .map(|_| ()),
                Action::ReplyWhatsapp { text } => self
                    .evolution
                    .send_text(&self.instance, &event.chat_id, text)
                    .await
                    .map(|_| ()),
            };
            outcomes.push(ActionOutcome {
                action: action.kind().to_string(),
                detail: action.describe(),
                success: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
            });
        }
        outcomes
    }

    /// Test-only evaluation: matching without action execution, cooldown
    /// reads/writes, or any store mutation.
    ///
    /// Returns the per-rule evaluation and human-readable previews of the
    /// actions that would run, honouring `stop_on_match`.
    pub fn test_message(&self, event: &NormalizedEvent) -> (Vec<EvaluatedRule>, Vec<String>) {
        let snapshot = self.snapshot();
        let mut evaluated = Vec::with_capacity(snapshot.rules.len());
        let mut previews = Vec::new();
        let mut stopped_by: Option<String> = None;

        for compiled in &snapshot.rules {
            let rule = &compiled.rule;
            if let Some(ref by) = stopped_by {
                evaluated.push(EvaluatedRule {
                    rule_id: rule.id.clone(),
                    rule_name: rule.name.clone(),
                    matched: false,
                    skipped_reason: Some(format!("chain stopped by `{by}`")),
                });
                continue;
            }

            let matched = rule_matches(compiled, event);
            if matched {
                for action in &rule.actions {
                    previews.push(format!("{}: {}", rule.id, action.describe()));
                }
                if rule.stop_on_match {
                    stopped_by = Some(rule.id.clone());
                }
            }
            evaluated.push(EvaluatedRule {
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                matched,
                skipped_reason: None,
            });
        }

        (evaluated, previews)
    }
}

fn join_errors(outcomes: &[ActionOutcome]) -> Option<String> {
    let errors: Vec<String> = outcomes
        .iter()
        .filter_map(|o| {
            o.error
                .as_ref()
                .map(|e| format!("{}: {e}", o.action))
        })
        .collect();
    if errors.is_empty() {
        None
    } else {
        Some(errors.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wagate_config::model::{EvolutionConfig, HassConfig};
    use wagate_core::ChatKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn event(kind: &str, chat_id: &str, sender: &str, text: &str) -> NormalizedEvent {
        NormalizedEvent {
            event_type: kind.to_string(),
            chat_id: chat_id.to_string(),
            chat_kind: ChatKind::from_chat_id(chat_id),
            sender_id: sender.to_string(),
            sender_name: None,
            text: text.to_string(),
            provider_message_id: None,
        }
    }

    fn message(chat_id: &str, text: &str) -> NormalizedEvent {
        event(
            "MESSAGES_UPSERT",
            chat_id,
            "491701234567@s.whatsapp.net",
            text,
        )
    }

    fn compile_yaml(yaml: &str) -> CompiledRuleSet {
        compile(&parse_ruleset(yaml).unwrap()).unwrap()
    }

    // --- pure matching ---

    #[test]
    fn empty_match_clause_matches_any_event() {
        let set = compile_yaml(
            r#"
rules:
  - id: all
    name: Everything
    actions: [{type: reply_whatsapp, text: hi}]
"#,
        );
        assert!(rule_matches(&set.rules[0], &message("c@g.us", "anything")));
        assert!(rule_matches(
            &set.rules[0],
            &event("CONNECTION_UPDATE", "c@g.us", "s@s.whatsapp.net", "")
        ));
    }

    #[test]
    fn event_kind_filter_is_normalised() {
        let set = compile_yaml(
            r#"
rules:
  - id: msgs
    name: Messages only
    match:
      events: ["messages.upsert"]
    actions: [{type: reply_whatsapp, text: hi}]
"#,
        );
        assert!(rule_matches(&set.rules[0], &message("c@g.us", "x")));
        assert!(!rule_matches(
            &set.rules[0],
            &event("CONNECTION_UPDATE", "c@g.us", "s@s.whatsapp.net", "")
        ));
    }

    #[test]
    fn chat_kind_and_id_filters() {
        let set = compile_yaml(
            r#"
rules:
  - id: grouponly
    name: Groups
    match:
      chat: {kind: group}
    actions: [{type: reply_whatsapp, text: hi}]
  - id: onechat
    name: One chat
    match:
      chat: {ids: ["family@g.us"]}
    actions: [{type: reply_whatsapp, text: hi}]
"#,
        );
        let group_rule = &set.rules[0];
        assert!(rule_matches(group_rule, &message("a@g.us", "x")));
        assert!(!rule_matches(group_rule, &message("a@s.whatsapp.net", "x")));

        let chat_rule = &set.rules[1];
        assert!(rule_matches(chat_rule, &message("family@g.us", "x")));
        assert!(!rule_matches(chat_rule, &message("work@g.us", "x")));
    }

    #[test]
    fn sender_ids_and_numbers_are_conjunctive() {
        let set = compile_yaml(
            r#"
rules:
  - id: s
    name: Sender
    match:
      sender:
        ids: ["491701234567@s.whatsapp.net"]
        numbers: ["491701234567"]
    actions: [{type: reply_whatsapp, text: hi}]
"#,
        );
        let rule = &set.rules[0];
        // Both hold.
        assert!(rule_matches(
            rule,
            &event("MESSAGES_UPSERT", "c@g.us", "491701234567@s.whatsapp.net", "x")
        ));
        // Number matches but the id does not: AND fails.
        assert!(!rule_matches(
            rule,
            &event("MESSAGES_UPSERT", "c@g.us", "491701234567@c.us", "x")
        ));
        // Neither holds.
        assert!(!rule_matches(
            rule,
            &event("MESSAGES_UPSERT", "c@g.us", "490000@s.whatsapp.net", "x")
        ));
    }

    #[test]
    fn contains_is_case_insensitive_and_trims() {
        let set = compile_yaml(
            r#"
rules:
  - id: t
    name: Text
    match:
      text: {mode: contains, patterns: ["goodnight"]}
    actions: [{type: reply_whatsapp, text: hi}]
"#,
        );
        let rule = &set.rules[0];
        assert!(rule_matches(rule, &message("c@g.us", "  GOODNIGHT everyone!  ")));
        assert!(rule_matches(rule, &message("c@g.us", "Goodnight!")));
        assert!(!rule_matches(rule, &message("c@g.us", "good morning")));
        // A text condition never matches empty text.
        assert!(!rule_matches(rule, &message("c@g.us", "   ")));
    }

    #[test]
    fn starts_with_checks_the_prefix_only() {
        let set = compile_yaml(
            r#"
rules:
  - id: t
    name: Text
    match:
      text: {mode: starts_with, patterns: ["!lights"]}
    actions: [{type: reply_whatsapp, text: hi}]
"#,
        );
        let rule = &set.rules[0];
        assert!(rule_matches(rule, &message("c@g.us", "!Lights off please")));
        assert!(!rule_matches(rule, &message("c@g.us", "turn the !lights off")));
    }

    #[test]
    fn regex_mode_compiles_case_insensitively() {
        let set = compile_yaml(
            r#"
rules:
  - id: t
    name: Text
    match:
      text: {mode: regex, patterns: ["^good(night|morning)\\b"]}
    actions: [{type: reply_whatsapp, text: hi}]
"#,
        );
        let rule = &set.rules[0];
        assert!(rule_matches(rule, &message("c@g.us", "GoodNight all")));
        assert!(rule_matches(rule, &message("c@g.us", "goodmorning")));
        assert!(!rule_matches(rule, &message("c@g.us", "say goodnight")));
    }

    #[test]
    fn any_pattern_matching_suffices() {
        let set = compile_yaml(
            r#"
rules:
  - id: t
    name: Text
    match:
      text: {mode: contains, patterns: ["alpha", "beta"]}
    actions: [{type: reply_whatsapp, text: hi}]
"#,
        );
        let rule = &set.rules[0];
        assert!(rule_matches(rule, &message("c@g.us", "only beta here")));
    }

    #[test]
    fn disabled_rules_are_dropped_at_compile_time() {
        let set = compile_yaml(
            r#"
rules:
  - id: off
    name: Disabled
    enabled: false
    actions: [{type: reply_whatsapp, text: hi}]
  - id: on
    name: Enabled
    actions: [{type: reply_whatsapp, text: hi}]
"#,
        );
        assert_eq!(set.rules.len(), 1);
        assert_eq!(set.rules[0].rule.id, "on");
    }

    #[test]
    fn rules_sort_stably_by_priority() {
        let set = compile_yaml(
            r#"
rules:
  - id: late
    name: Late
    priority: 50
    actions: [{type: reply_whatsapp, text: hi}]
  - id: early
    name: Early
    priority: 10
    actions: [{type: reply_whatsapp, text: hi}]
  - id: tie
    name: Tie
    priority: 10
    actions: [{type: reply_whatsapp, text: hi}]
"#,
        );
        let order: Vec<&str> = set.rules.iter().map(|r| r.rule.id.as_str()).collect();
        assert_eq!(order, vec!["early", "tie", "late"]);
    }

    // --- engine with store + mock upstreams ---

    async fn test_engine(yaml: &str) -> (RuleEngine, MockServer, MockServer) {
        let hass_server = MockServer::start().await;
        let evo_server = MockServer::start().await;

        let db = Database::open_in_memory().await.unwrap();
        let evolution = EvolutionClient::new(&EvolutionConfig {
            base_url: evo_server.uri(),
            api_key: None,
            instance: "wagate".to_string(),
            timeout_secs: 5,
        })
        .unwrap();
        let hass = HassClient::new(&HassConfig {
            base_url: hass_server.uri(),
            token: None,
            allowed_services: vec![],
        })
        .unwrap();

        let engine = RuleEngine::new(
            db,
            evolution,
            hass,
            "wagate".to_string(),
            vec!["script.turn_on".to_string(), "automation.trigger".to_string()],
        );
        engine.install_yaml(yaml).unwrap();
        (engine, hass_server, evo_server)
    }

    async fn fire_count(engine: &RuleEngine) -> i64 {
        queries::rule_fires::list_rule_fires(&engine.db, 1, 100, None)
            .await
            .unwrap()
            .total
    }

    #[tokio::test]
    async fn matched_rule_calls_service_and_records_fire() {
        let (engine, hass_server, _evo) = test_engine(
            r#"
rules:
  - id: g
    name: Goodnight
    match:
      events: [MESSAGES_UPSERT]
      text: {mode: contains, patterns: ["goodnight"]}
    actions:
      - type: ha_service
        service: script.turn_on
        target: {entity_id: script.goodnight}
"#,
        )
        .await;

        Mock::given(method("POST"))
            .and(path("/api/services/script/turn_on"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&hass_server)
            .await;

        let fired = engine
            .handle_event(&message("A@s.whatsapp.net", "Goodnight!"), Some("m1"))
            .await
            .unwrap();
        assert_eq!(fired, 1);

        let fires = queries::rule_fires::list_rule_fires(&engine.db, 1, 10, None)
            .await
            .unwrap();
        assert_eq!(fires.total, 1);
        let fire = &fires.items[0];
        assert_eq!(fire.rule_id, "g");
        assert!(fire.success);
        assert_eq!(fire.message_id.as_deref(), Some("m1"));
        assert_eq!(fire.matched_text, "Goodnight!");
    }

    #[tokio::test]
    async fn stop_on_match_terminates_the_chain() {
        let (engine, _hass, evo_server) = test_engine(
            r#"
rules:
  - id: first
    name: First
    priority: 10
    match:
      text: {mode: contains, patterns: ["ping"]}
    actions: [{type: reply_whatsapp, text: pong}]
  - id: second
    name: Second
    priority: 20
    match:
      text: {mode: contains, patterns: ["ping"]}
    actions: [{type: reply_whatsapp, text: also pong}]
"#,
        )
        .await;

        Mock::given(method("POST"))
            .and(path("/message/sendText/wagate"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "key": {"id": "WAMID1"}
            })))
            .expect(1)
            .mount(&evo_server)
            .await;

        let fired = engine
            .handle_event(&message("c@g.us", "ping"), None)
            .await
            .unwrap();
        assert_eq!(fired, 1, "only the priority-10 rule fires");

        let fires = queries::rule_fires::list_rule_fires(&engine.db, 1, 10, None)
            .await
            .unwrap();
        assert_eq!(fires.items[0].rule_id, "first");
    }

    #[tokio::test]
    async fn chain_continues_when_stop_on_match_is_off() {
        let (engine, _hass, evo_server) = test_engine(
            r#"
rules:
  - id: first
    name: First
    priority: 10
    stop_on_match: false
    match:
      text: {mode: contains, patterns: ["ping"]}
    actions: [{type: reply_whatsapp, text: pong}]
  - id: second
    name: Second
    priority: 20
    match:
      text: {mode: contains, patterns: ["ping"]}
    actions: [{type: reply_whatsapp, text: also pong}]
"#,
        )
        .await;

        Mock::given(method("POST"))
            .and(path("/message/sendText/wagate"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "key": {"id": "WAMID1"}
            })))
            .expect(2)
            .mount(&evo_server)
            .await;

        let fired = engine
            .handle_event(&message("c@g.us", "ping"), None)
            .await
            .unwrap();
        assert_eq!(fired, 2);
    }

    #[tokio::test]
    async fn cooldown_suppresses_the_second_fire() {
        let (engine, _hass, evo_server) = test_engine(
            r#"
rules:
  - id: ping
    name: Ping
    cooldown_seconds: 60
    match:
      text: {mode: contains, patterns: ["ping"]}
    actions: [{type: reply_whatsapp, text: pong}]
"#,
        )
        .await;

        Mock::given(method("POST"))
            .and(path("/message/sendText/wagate"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "key": {"id": "WAMID1"}
            })))
            .expect(1)
            .mount(&evo_server)
            .await;

        let first = engine
            .handle_event(&message("c@g.us", "ping"), None)
            .await
            .unwrap();
        let second = engine
            .handle_event(&message("c@g.us", "ping"), None)
            .await
            .unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0, "second event inside the window must not fire");
        assert_eq!(fire_count(&engine).await, 1);
    }

    #[tokio::test]
    async fn cooldown_scope_is_per_chat() {
        let (engine, _hass, evo_server) = test_engine(
            r#"
rules:
  - id: ping
    name: Ping
    cooldown_seconds: 60
    match:
      text: {mode: contains, patterns: ["ping"]}
    actions: [{type: reply_whatsapp, text: pong}]
"#,
        )
        .await;

        Mock::given(method("POST"))
            .and(path("/message/sendText/wagate"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "key": {"id": "WAMID1"}
            })))
            .expect(2)
            .mount(&evo_server)
            .await;

        engine.handle_event(&message("a@g.us", "ping"), None).await.unwrap();
        let other_chat = engine
            .handle_event(&message("b@g.us", "ping"), None)
            .await
            .unwrap();
        assert_eq!(other_chat, 1, "cooldown is keyed by (rule, chat)");
    }

    #[tokio::test]
    async fn cooldown_skip_does_not_stop_lower_priority_rules() {
        let (engine, _hass, evo_server) = test_engine(
            r#"
rules:
  - id: first
    name: First
    priority: 10
    cooldown_seconds: 600
    match:
      text: {mode: contains, patterns: ["ping"]}
    actions: [{type: reply_whatsapp, text: pong}]
  - id: second
    name: Second
    priority: 20
    match:
      text: {mode: contains, patterns: ["ping"]}
    actions: [{type: reply_whatsapp, text: backup pong}]
"#,
        )
        .await;

        Mock::given(method("POST"))
            .and(path("/message/sendText/wagate"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "key": {"id": "WAMID1"}
            })))
            .mount(&evo_server)
            .await;

        // First event: rule `first` fires, arms its cooldown, stops the chain.
        engine.handle_event(&message("c@g.us", "ping"), None).await.unwrap();
        // Second event: `first` is cooldown-skipped, so `second` gets its turn.
        engine.handle_event(&message("c@g.us", "ping"), None).await.unwrap();

        let fires = queries::rule_fires::list_rule_fires(&engine.db, 1, 10, None)
            .await
            .unwrap();
        let mut rule_ids: Vec<&str> = fires.items.iter().map(|f| f.rule_id.as_str()).collect();
        rule_ids.sort();
        assert_eq!(rule_ids, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn refused_service_never_reaches_hass_but_is_recorded() {
        let (engine, hass_server, _evo) = test_engine(
            r#"
rules:
  - id: shell
    name: Shell
    match:
      text: {mode: contains, patterns: ["run"]}
    actions:
      - type: ha_service
        service: shell_command.run
"#,
        )
        .await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&hass_server)
            .await;

        let fired = engine
            .handle_event(&message("c@g.us", "run it"), None)
            .await
            .unwrap();
        assert_eq!(fired, 1);

        let fires = queries::rule_fires::list_rule_fires(&engine.db, 1, 10, None)
            .await
            .unwrap();
        let fire = &fires.items[0];
        assert!(!fire.success);
        assert!(
            fire.error_message.as_deref().unwrap_or("").contains("allowed"),
            "error should mention the policy refusal: {:?}",
            fire.error_message
        );
    }

    #[tokio::test]
    async fn action_failure_does_not_abort_siblings() {
        let (engine, hass_server, evo_server) = test_engine(
            r#"
rules:
  - id: combo
    name: Combo
    match:
      text: {mode: contains, patterns: ["go"]}
    actions:
      - type: ha_service
        service: script.turn_on
        target: {entity_id: script.broken}
      - type: reply_whatsapp
        text: done anyway
"#,
        )
        .await;

        Mock::given(method("POST"))
            .and(path("/api/services/script/turn_on"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&hass_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/message/sendText/wagate"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "key": {"id": "WAMID1"}
            })))
            .expect(1)
            .mount(&evo_server)
            .await;

        engine.handle_event(&message("c@g.us", "go"), None).await.unwrap();

        let fires = queries::rule_fires::list_rule_fires(&engine.db, 1, 10, None)
            .await
            .unwrap();
        let fire = &fires.items[0];
        assert!(!fire.success, "overall success is the conjunction");
        let outcomes: Vec<ActionOutcome> = serde_json::from_str(&fire.actions_json).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].success);
        assert!(outcomes[1].success);
    }

    #[tokio::test]
    async fn test_message_never_mutates_the_store() {
        let (engine, _hass, _evo) = test_engine(
            r#"
rules:
  - id: ping
    name: Ping
    cooldown_seconds: 60
    match:
      text: {mode: contains, patterns: ["ping"]}
    actions: [{type: reply_whatsapp, text: pong}]
"#,
        )
        .await;

        let (evaluated, previews) = engine.test_message(&message("c@g.us", "ping"));
        assert_eq!(evaluated.len(), 1);
        assert!(evaluated[0].matched);
        assert_eq!(previews, vec![r#"ping: reply "pong""#]);

        // No fire rows, no cooldown rows: a real event afterwards fires.
        assert_eq!(fire_count(&engine).await, 0);
        assert!(
            !queries::cooldowns::is_on_cooldown(&engine.db, "ping", "c@g.us")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_message_reports_chain_stops() {
        let (engine, _hass, _evo) = test_engine(
            r#"
rules:
  - id: first
    name: First
    priority: 10
    match:
      text: {mode: contains, patterns: ["ping"]}
    actions: [{type: reply_whatsapp, text: pong}]
  - id: second
    name: Second
    priority: 20
    match:
      text: {mode: contains, patterns: ["ping"]}
    actions: [{type: reply_whatsapp, text: late pong}]
"#,
        )
        .await;

        let (evaluated, previews) = engine.test_message(&message("c@g.us", "ping"));
        assert!(evaluated[0].matched);
        assert!(!evaluated[1].matched);
        assert!(
            evaluated[1]
                .skipped_reason
                .as_deref()
                .unwrap()
                .contains("first")
        );
        assert_eq!(previews.len(), 1);
    }

    #[tokio::test]
    async fn load_from_store_installs_the_saved_set() {
        let (engine, _hass, _evo) = test_engine("").await;
        assert_eq!(engine.snapshot().rules.len(), 0);

        queries::ruleset::put_ruleset(
            &engine.db,
            "rules:\n  - id: a\n    name: A\n    actions: [{type: reply_whatsapp, text: hi}]\n",
        )
        .await
        .unwrap();

        let count = engine.load_from_store().await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(engine.snapshot().rules[0].rule.id, "a");
    }
}
