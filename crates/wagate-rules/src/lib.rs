// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! YAML rule set model, validation, and the matching engine for the
//! wagate gateway.

pub mod engine;
pub mod model;
pub mod validate;

pub use engine::{CompiledRuleSet, RuleEngine, compile};
pub use model::{Action, MatchClause, Rule, RuleSet, TextMode};
pub use validate::{ValidationError, ValidationReport, parse_ruleset, validate_yaml};
