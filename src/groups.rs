//! Named zone groups and WHERE-clause set algebra.
//!
//! A WHERE clause decides which zones a Happen applies to:
//!
//! ```text
//! first + SU_A41 SU_A42 - SU_A22
//! ```
//!
//! Resolution is a left-to-right accumulation with no precedence: start from
//! the empty set, then fold in each term. `+`/`-` set the sign for every
//! identifier that follows until the sign changes (the sign starts positive,
//! so a leading group name seeds the accumulator). An identifier that names a
//! defined group resolves to that group's set; anything else resolves to the
//! singleton set of itself as a zone id.
//!
//! Group resolution is memoized per [`GroupResolver`] lifetime (one Happen
//! Set); any redefinition invalidates the memo, since groups may reference
//! other groups.

use crate::ZoneId;
use crate::engine::ParseError;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Add,
    Subtract,
}

/// One signed term of a WHERE clause or group definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupTerm {
    pub sign: Sign,
    pub ident: String,
}

/// Parses WHERE-clause text into signed terms.
///
/// `+` and `-` may stand alone or prefix an identifier; either way the sign
/// is sticky until the next sign token. A clause ending on a bare sign is a
/// [`ParseError::DanglingSign`].
pub fn parse_where(src: &str) -> Result<Vec<GroupTerm>, ParseError> {
    let mut terms = Vec::new();
    let mut sign = Sign::Add;
    let mut dangling: Option<(char, usize)> = None;
    let mut pos = 0;
    for token in src.split_whitespace() {
        // split_whitespace loses offsets; recover the token's position.
        pos += src[pos..].find(token).unwrap_or(0);
        let mut ident = token;
        match token {
            "+" => {
                sign = Sign::Add;
                dangling = Some(('+', pos));
                pos += token.len();
                continue;
            }
            "-" => {
                sign = Sign::Subtract;
                dangling = Some(('-', pos));
                pos += token.len();
                continue;
            }
            _ => {}
        }
        if let Some(rest) = token.strip_prefix('+') {
            sign = Sign::Add;
            ident = rest;
        } else if let Some(rest) = token.strip_prefix('-') {
            sign = Sign::Subtract;
            ident = rest;
        }
        terms.push(GroupTerm { sign, ident: ident.to_string() });
        dangling = None;
        pos += token.len();
    }
    if let Some((sign, pos)) = dangling {
        return Err(ParseError::DanglingSign { sign, pos });
    }
    if terms.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(terms)
}

/// Named zone groups with memoized set-algebra resolution.
#[derive(Debug, Default)]
pub struct GroupResolver {
    defs: HashMap<String, Vec<GroupTerm>>,
    memo: HashMap<String, HashSet<ZoneId>>,
}

impl GroupResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines (or redefines) a named group. Redefinition invalidates the
    /// whole memo: other groups may have resolved through this one.
    pub fn define(&mut self, name: impl Into<String>, terms: Vec<GroupTerm>) {
        self.defs.insert(name.into(), terms);
        self.memo.clear();
    }

    /// Parses `src` as a WHERE clause and defines it under `name`.
    pub fn define_expr(&mut self, name: impl Into<String>, src: &str) -> Result<(), ParseError> {
        let terms = parse_where(src)?;
        self.define(name, terms);
        Ok(())
    }

    pub fn is_group(&self, ident: &str) -> bool {
        self.defs.contains_key(ident)
    }

    /// Defined group names, sorted for stable output.
    pub fn group_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.defs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolves a named group to its zone set. Unknown names resolve to the
    /// empty set.
    pub fn resolve(&mut self, name: &str) -> HashSet<ZoneId> {
        let mut in_progress = Vec::new();
        self.resolve_inner(name, &mut in_progress)
    }

    /// Resolves an ad-hoc term sequence (a Happen's WHERE clause).
    pub fn resolve_terms(&mut self, terms: &[GroupTerm]) -> HashSet<ZoneId> {
        let mut in_progress = Vec::new();
        self.resolve_terms_inner(terms, &mut in_progress)
    }

    fn resolve_inner(&mut self, name: &str, in_progress: &mut Vec<String>) -> HashSet<ZoneId> {
        if let Some(cached) = self.memo.get(name) {
            return cached.clone();
        }
        if in_progress.iter().any(|n| n == name) {
            tracing::warn!(group = name, "group definition cycle; resolving as empty");
            return HashSet::new();
        }
        let Some(terms) = self.defs.get(name).cloned() else {
            return HashSet::new();
        };
        in_progress.push(name.to_string());
        let resolved = self.resolve_terms_inner(&terms, in_progress);
        in_progress.pop();
        self.memo.insert(name.to_string(), resolved.clone());
        resolved
    }

    fn resolve_terms_inner(
        &mut self,
        terms: &[GroupTerm],
        in_progress: &mut Vec<String>,
    ) -> HashSet<ZoneId> {
        let mut out: HashSet<ZoneId> = HashSet::new();
        for term in terms {
            if self.defs.contains_key(&term.ident) {
                let members = self.resolve_inner(&term.ident, in_progress);
                match term.sign {
                    Sign::Add => out.extend(members),
                    Sign::Subtract => {
                        for member in &members {
                            out.remove(member);
                        }
                    }
                }
            } else {
                let zone = ZoneId::new(term.ident.clone());
                match term.sign {
                    Sign::Add => {
                        out.insert(zone);
                    }
                    Sign::Subtract => {
                        out.remove(&zone);
                    }
                }
            }
        }
        out
    }
}
