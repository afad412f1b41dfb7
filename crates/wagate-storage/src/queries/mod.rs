// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per entity.

pub mod chats;
pub mod cooldowns;
pub mod events;
pub mod messages;
pub mod rule_fires;
pub mod ruleset;
