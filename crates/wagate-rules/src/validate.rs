// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rule-set validation with structured path + message errors.
//!
//! Syntax errors yield a single error carrying the YAML line; schema
//! errors carry a `rules[i].field` path. A valid document also yields its
//! canonical round-tripped form.

use std::collections::HashSet;

use regex::RegexBuilder;
use serde::Serialize;
use wagate_core::WagateError;

use crate::model::{Action, Rule, RuleSet, TextMode};

/// One validation failure.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationError {
    /// Location within the document, e.g. `rules[2].actions[0].service`.
    /// Empty for syntax errors.
    pub path: String,
    pub message: String,
    /// 1-based line for syntax errors, when the parser reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

/// Result of validating a YAML rule document.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub rule_count: usize,
    /// Canonical round-tripped YAML; present only when valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_yaml: Option<String>,
}

/// Parse a YAML rule document, treating blank input as the empty set.
pub fn parse_ruleset(yaml: &str) -> Result<RuleSet, WagateError> {
    if yaml.trim().is_empty() {
        return Ok(RuleSet::default());
    }
    serde_yaml::from_str(yaml).map_err(|e| WagateError::Validation(e.to_string()))
}

/// Validate a YAML rule document: strict parse, then schema checks.
pub fn validate_yaml(yaml: &str) -> ValidationReport {
    let set = if yaml.trim().is_empty() {
        RuleSet::default()
    } else {
        match serde_yaml::from_str::<RuleSet>(yaml) {
            Ok(set) => set,
            Err(e) => {
                return ValidationReport {
                    valid: false,
                    errors: vec![ValidationError {
                        path: String::new(),
                        message: e.to_string(),
                        line: e.location().map(|l| l.line()),
                    }],
                    rule_count: 0,
                    normalized_yaml: None,
                };
            }
        }
    };

    let errors = schema_errors(&set);
    let valid = errors.is_empty();
    let rule_count = set.rules.len();
    let normalized_yaml = if valid {
        serde_yaml::to_string(&set).ok()
    } else {
        None
    };

    ValidationReport {
        valid,
        errors,
        rule_count,
        normalized_yaml,
    }
}

fn schema_errors(set: &RuleSet) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen_ids = HashSet::new();

    for (i, rule) in set.rules.iter().enumerate() {
        let base = format!("rules[{i}]");

        if rule.id.trim().is_empty() {
            errors.push(schema_error(format!("{base}.id"), "rule id must not be empty"));
        } else if !seen_ids.insert(rule.id.as_str()) {
            errors.push(schema_error(
                format!("{base}.id"),
                format!("duplicate rule id `{}`", rule.id),
            ));
        }

        if rule.name.trim().is_empty() {
            errors.push(schema_error(
                format!("{base}.name"),
                "rule name must not be empty",
            ));
        }

        if rule.cooldown_seconds < 0 {
            errors.push(schema_error(
                format!("{base}.cooldown_seconds"),
                "cooldown_seconds must not be negative",
            ));
        }

        if rule.actions.is_empty() {
            errors.push(schema_error(
                format!("{base}.actions"),
                "rule must have at least one action",
            ));
        }
        for (j, action) in rule.actions.iter().enumerate() {
            validate_action(&format!("{base}.actions[{j}]"), action, &mut errors);
        }

        if let Some(ref text) = rule.match_clause.text {
            let text_base = format!("{base}.match.text");
            if text.patterns.is_empty() {
                errors.push(schema_error(
                    format!("{text_base}.patterns"),
                    "text match needs at least one pattern",
                ));
            }
            if text.mode == TextMode::Regex {
                for (k, pattern) in text.patterns.iter().enumerate() {
                    if let Err(e) = RegexBuilder::new(pattern).case_insensitive(true).build() {
                        errors.push(schema_error(
                            format!("{text_base}.patterns[{k}]"),
                            format!("invalid regex: {e}"),
                        ));
                    }
                }
            }
        }
    }

    errors
}

fn validate_action(path: &str, action: &Action, errors: &mut Vec<ValidationError>) {
    match action {
        Action::HaService { service, .. } => {
            if service.trim().is_empty() {
                errors.push(schema_error(
                    format!("{path}.service"),
                    "ha_service action requires a service",
                ));
            } else {
                let mut parts = service.splitn(2, '.');
                let domain = parts.next().unwrap_or("");
                let name = parts.next().unwrap_or("");
                if domain.is_empty() || name.is_empty() {
                    errors.push(schema_error(
                        format!("{path}.service"),
                        format!("`{service}` is not a domain.service name"),
                    ));
                }
            }
        }
        Action::ReplyWhatsapp { text } => {
            if text.trim().is_empty() {
                errors.push(schema_error(
                    format!("{path}.text"),
                    "reply_whatsapp action requires a text",
                ));
            }
        }
    }
}

fn schema_error(path: String, message: impl Into<String>) -> ValidationError {
    ValidationError {
        path,
        message: message.into(),
        line: None,
    }
}
