// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Safe predicate construction for the storage engine.
//!
//! Every filter handed to the engine goes through three layers:
//! validate (whitelist grammar per value kind), escape (quotes doubled,
//! literals always single-quoted), compose (OR-joined groups in
//! parentheses, AND-joined dimensions). Scopes and categories arrive
//! already whitelist-validated by their types; escaping is still applied
//! unconditionally so a future widening of the grammar cannot silently
//! create an injection path.

use memoir_core::{MemoirError, MemoryCategory, MemoryScope};

/// Validates an id against the canonical UUID grammar
/// (8-4-4-4-12 hex, case-insensitive).
pub fn validate_id(id: &str) -> Result<(), MemoirError> {
    let bytes = id.as_bytes();
    if bytes.len() != 36 {
        return Err(MemoirError::InvalidArgument(format!(
            "invalid id `{id}`: expected canonical 36-char UUID"
        )));
    }
    for (i, &b) in bytes.iter().enumerate() {
        let ok = match i {
            8 | 13 | 18 | 23 => b == b'-',
            _ => b.is_ascii_hexdigit(),
        };
        if !ok {
            return Err(MemoirError::InvalidArgument(format!(
                "invalid id `{id}`: expected canonical 36-char UUID"
            )));
        }
    }
    Ok(())
}

/// Doubles every single quote inside a literal.
fn escape_literal(s: &str) -> String {
    s.replace('\'', "''")
}

/// Renders a quoted, escaped equality clause.
fn eq_clause(column: &str, value: &str) -> String {
    format!("{column} = '{}'", escape_literal(value))
}

/// Composes AND-joined filter dimensions, each dimension an OR-joined
/// group of validated, escaped literals.
#[derive(Debug, Default)]
pub struct PredicateBuilder {
    clauses: Vec<String>,
}

impl PredicateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an `id = '...'` clause. The id is validated first.
    pub fn id(mut self, id: &str) -> Result<Self, MemoirError> {
        validate_id(id)?;
        self.clauses.push(eq_clause("id", id));
        Ok(self)
    }

    /// Adds an OR-joined group over several ids. Every id is validated;
    /// an empty slice adds no clause.
    pub fn ids(mut self, ids: &[String]) -> Result<Self, MemoirError> {
        if ids.is_empty() {
            return Ok(self);
        }
        for id in ids {
            validate_id(id)?;
        }
        let group: Vec<String> = ids.iter().map(|id| eq_clause("id", id)).collect();
        self.clauses.push(format!("({})", group.join(" OR ")));
        Ok(self)
    }

    /// Adds a `scope = '...'` clause. The scope type is already validated
    /// by its grammar; the literal is escaped regardless.
    pub fn scope(mut self, scope: &MemoryScope) -> Self {
        self.clauses.push(eq_clause("scope", &scope.to_string()));
        self
    }

    /// Adds an OR-joined group over categories. The closed enum is the
    /// whitelist; an empty slice adds no clause.
    pub fn categories(mut self, categories: &[MemoryCategory]) -> Self {
        if categories.is_empty() {
            return self;
        }
        let group: Vec<String> = categories
            .iter()
            .map(|c| eq_clause("category", &c.to_string()))
            .collect();
        self.clauses.push(format!("({})", group.join(" OR ")));
        self
    }

    /// Renders the composed predicate, or `None` when no clause was added.
    pub fn build(self) -> Option<String> {
        if self.clauses.is_empty() {
            None
        } else {
            Some(self.clauses.join(" AND "))
        }
    }
}
