//! Argument token layer.
//!
//! Both trigger parameter lists (from WHEN clauses) and action parameter lists
//! (from the host's configuration records) arrive as flat sequences of raw
//! string tokens. This module turns them into [`ArgSet`]s: ordered, indexable
//! sequences of [`Arg`]s with an auxiliary name index.
//!
//! Design points:
//!
//! - The raw string is authoritative. Typed views (`as_i32`, `as_f32`, ...)
//!   are computed on access and are *total*: malformed input coerces to a
//!   type-appropriate default (0, 0.0, false, empty) rather than erroring.
//!   Extension code reading config should never be able to crash the engine
//!   through a bad token.
//! - Construction applies a fixed escape substitution (`\q` -> `'`, `\t` ->
//!   tab, `\n` -> newline). The substitution is a literal text replacement;
//!   backslashes not part of an escape code pass through untouched.
//! - A token of the form `name=value` (split on the first `=`) yields a named
//!   arg. Named lookup takes a priority list of synonyms and is
//!   first-match-wins, so call sites can accept `["cd", "cooldown"]`.
//! - A raw value starting with `$` is a *link*: it names another value to be
//!   resolved at evaluation time through a [`VarSource`].

use std::collections::HashMap;
use std::str::FromStr;

/// Strings that coerce to `true` via [`Arg::as_bool`].
const TRUE_STRINGS: &[&str] = &["true", "1", "yes"];
/// Strings that coerce to `false` via [`Arg::as_bool`].
const FALSE_STRINGS: &[&str] = &["false", "0", "no"];

/// Source of dynamic named values for linked args (`$name`).
///
/// The host decides what variables exist; the engine only performs the lookup.
pub trait VarSource {
    fn get(&self, name: &str) -> Option<&str>;
}

impl VarSource for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<&str> {
        HashMap::get(self, name).map(String::as_str)
    }
}

// --- Arg ---------------------------------------------------------------------

/// A single parsed token: an authoritative raw string, an optional name, and
/// lazily-coerced typed views.
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    raw: String,
    name: Option<String>,
}

impl Arg {
    /// Parses a raw token, applying escape substitution and (optionally)
    /// `name=value` splitting.
    pub fn parse(token: &str, split_names: bool) -> Self {
        let token = apply_escapes(token);
        if split_names {
            if let Some((name, value)) = token.split_once('=') {
                if !name.is_empty() {
                    return Arg { raw: value.to_string(), name: Some(name.to_string()) };
                }
            }
        }
        Arg { raw: token, name: None }
    }

    /// The authoritative raw value (after escape substitution, without any
    /// `name=` prefix).
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Integer view; 0 when the raw value does not parse.
    pub fn as_i32(&self) -> i32 {
        self.raw.trim().parse().unwrap_or(0)
    }

    /// Float view; 0.0 when the raw value does not parse.
    pub fn as_f32(&self) -> f32 {
        self.raw.trim().parse().unwrap_or(0.0)
    }

    /// Boolean view. Recognizes `true/1/yes` and `false/0/no`
    /// (case-insensitive); anything else is false.
    pub fn as_bool(&self) -> bool {
        let lower = self.raw.trim().to_ascii_lowercase();
        if TRUE_STRINGS.contains(&lower.as_str()) {
            return true;
        }
        if FALSE_STRINGS.contains(&lower.as_str()) {
            return false;
        }
        false
    }

    /// String view (the raw value itself).
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// 4-vector view: up to four `;`-separated components. Missing or
    /// malformed components read as 0.0.
    pub fn as_vec4(&self) -> [f32; 4] {
        let mut out = [0.0f32; 4];
        for (slot, part) in out.iter_mut().zip(self.raw.split(';')) {
            *slot = part.trim().parse().unwrap_or(0.0);
        }
        out
    }

    /// Enum view through `FromStr`. `None` when the raw value does not parse;
    /// callers supply their own default.
    pub fn as_enum<T: FromStr>(&self) -> Option<T> {
        self.raw.trim().parse().ok()
    }

    /// If the raw value is a link (`$name`), the linked variable name.
    pub fn link_target(&self) -> Option<&str> {
        self.raw.strip_prefix('$').filter(|t| !t.is_empty())
    }

    /// The effective raw value after following a link, falling back to the
    /// raw string when the arg is not a link or the target is absent.
    pub fn resolved_raw<'a>(&'a self, vars: &'a dyn VarSource) -> &'a str {
        match self.link_target() {
            Some(target) => vars.get(target).unwrap_or(&self.raw),
            None => &self.raw,
        }
    }
}

impl From<&str> for Arg {
    fn from(token: &str) -> Self {
        Arg::parse(token, true)
    }
}

impl std::fmt::Display for Arg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}={}", self.raw),
            None => f.write_str(&self.raw),
        }
    }
}

/// Applies the literal escape substitution to a raw token.
///
/// `\q` -> `'`, `\t` -> tab, `\n` -> newline. The replacement is textual:
/// every occurrence of an escape code is substituted, even directly after a
/// literal backslash; a backslash followed by anything else passes through
/// as-is.
fn apply_escapes(token: &str) -> String {
    token.replace(r"\q", "'").replace(r"\t", "\t").replace(r"\n", "\n")
}

// --- ArgSet ------------------------------------------------------------------

/// An ordered, name-indexable sequence of [`Arg`]s.
///
/// The name index is first-match-wins: when two args share a name, lookups
/// return the earlier one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgSet {
    args: Vec<Arg>,
    named: HashMap<String, usize>,
}

impl ArgSet {
    /// Builds a set from raw tokens with name parsing enabled.
    pub fn new<S: AsRef<str>>(raw: &[S]) -> Self {
        Self::with_names(raw, true)
    }

    /// Builds a set from raw tokens, controlling whether `name=value` tokens
    /// are split. Escape substitution always applies.
    pub fn with_names<S: AsRef<str>>(raw: &[S], split_names: bool) -> Self {
        let mut set = ArgSet::default();
        for token in raw {
            set.push(Arg::parse(token.as_ref(), split_names));
        }
        set
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arg> {
        self.args.iter()
    }

    /// Positional access; `None` out of range.
    pub fn get(&self, index: usize) -> Option<&Arg> {
        self.args.get(index)
    }

    /// Positional access with an explicit fallback, the non-failing
    /// counterpart of indexing.
    pub fn at_or<'a>(&'a self, index: usize, default: &'a Arg) -> &'a Arg {
        self.args.get(index).unwrap_or(default)
    }

    /// Checks the candidate names in priority order and returns the first arg
    /// whose name matches any of them.
    pub fn by_name(&self, names: &[&str]) -> Option<&Arg> {
        for name in names {
            if let Some(&ix) = self.named.get(*name) {
                return Some(&self.args[ix]);
            }
        }
        None
    }

    pub fn push(&mut self, arg: Arg) {
        if let Some(name) = arg.name() {
            // First match wins; a later duplicate never shadows.
            if !self.named.contains_key(name) {
                self.named.insert(name.to_string(), self.args.len());
            }
        }
        self.args.push(arg);
    }

    pub fn insert(&mut self, index: usize, arg: Arg) {
        self.args.insert(index, arg);
        self.reindex();
    }

    pub fn remove(&mut self, index: usize) -> Arg {
        let removed = self.args.remove(index);
        self.reindex();
        removed
    }

    fn reindex(&mut self) {
        self.named.clear();
        for (ix, arg) in self.args.iter().enumerate() {
            if let Some(name) = arg.name() {
                if !self.named.contains_key(name) {
                    self.named.insert(name.to_string(), ix);
                }
            }
        }
    }
}

impl<'a> IntoIterator for &'a ArgSet {
    type Item = &'a Arg;
    type IntoIter = std::slice::Iter<'a, Arg>;

    fn into_iter(self) -> Self::IntoIter {
        self.args.iter()
    }
}

impl std::fmt::Display for ArgSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for arg in &self.args {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{arg}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_round_trip() {
        let set = argset!["cd=80", "power=0.3"];
        assert_eq!(set.by_name(&["cd"]).unwrap().as_i32(), 80);
        let power = set.by_name(&["power"]).unwrap().as_f32();
        assert!((power - 0.3).abs() < 1e-6);
    }

    #[test]
    fn synonym_lookup_is_first_match_wins() {
        let set = argset!["cd=80", "power=0.3"];
        // "missing" has no match, so the lookup falls through to "cd".
        let arg = set.by_name(&["missing", "cd"]).unwrap();
        assert_eq!(arg.as_i32(), 80);
        assert!(set.by_name(&["missing"]).is_none());
    }

    #[test]
    fn duplicate_names_keep_the_first() {
        let set = argset!["cd=80", "cd=99"];
        assert_eq!(set.by_name(&["cd"]).unwrap().as_i32(), 80);
    }

    #[test]
    fn escape_substitution() {
        let cases: &[(&str, &str)] = &[
            (r"say\qhi\q", "say'hi'"),
            (r"a\tb", "a\tb"),
            (r"line\nbreak", "line\nbreak"),
            // The substitution is literal: a preceding backslash does not
            // shield the escape code.
            (r"still\\quotes", "still\\'uotes"),
            // Backslashes outside an escape code pass through.
            (r"back\slash", r"back\slash"),
            (r"trailing\", r"trailing\"),
        ];
        for (raw, expected) in cases {
            assert_eq!(Arg::parse(raw, false).raw(), *expected, "input {raw:?}");
        }
    }

    #[test]
    fn typed_views_are_total() {
        let junk = Arg::parse("not-a-number", false);
        assert_eq!(junk.as_i32(), 0);
        assert_eq!(junk.as_f32(), 0.0);
        assert!(!junk.as_bool());

        let empty = Arg::parse("", false);
        assert_eq!(empty.as_str(), "");
        assert_eq!(empty.as_vec4(), [0.0; 4]);
    }

    #[test]
    fn bool_strings() {
        for raw in ["true", "1", "yes", "YES"] {
            assert!(Arg::parse(raw, false).as_bool(), "{raw}");
        }
        for raw in ["false", "0", "no", "maybe", ""] {
            assert!(!Arg::parse(raw, false).as_bool(), "{raw}");
        }
    }

    #[test]
    fn enum_view_parses_through_from_str() {
        #[derive(Debug, PartialEq)]
        enum Weather {
            Clear,
            Storm,
        }

        impl FromStr for Weather {
            type Err = ();
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    "clear" => Ok(Weather::Clear),
                    "storm" => Ok(Weather::Storm),
                    _ => Err(()),
                }
            }
        }

        let cases: &[(&str, Option<Weather>)] = &[
            ("storm", Some(Weather::Storm)),
            ("  clear ", Some(Weather::Clear)),
            ("drizzle", None),
            ("", None),
        ];
        for (raw, expected) in cases {
            assert_eq!(&Arg::parse(raw, false).as_enum::<Weather>(), expected, "input {raw:?}");
        }
    }

    #[test]
    fn vec4_parsing() {
        let v = Arg::parse("1;2.5;;4", false).as_vec4();
        assert_eq!(v, [1.0, 2.5, 0.0, 4.0]);
        // Extra components are ignored.
        let v = Arg::parse("1;2;3;4;5", false).as_vec4();
        assert_eq!(v, [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn linked_args_resolve_through_var_source() {
        let mut vars = HashMap::new();
        vars.insert("karma".to_string(), "7".to_string());

        let linked = Arg::parse("$karma", false);
        assert_eq!(linked.link_target(), Some("karma"));
        assert_eq!(linked.resolved_raw(&vars), "7");

        // Absent target falls back to the raw string.
        let dangling = Arg::parse("$nope", false);
        assert_eq!(dangling.resolved_raw(&vars), "$nope");

        let plain = Arg::parse("42", false);
        assert_eq!(plain.link_target(), None);
        assert_eq!(plain.resolved_raw(&vars), "42");
    }

    #[test]
    fn positional_access_with_default() {
        let set = argset!["a", "b"];
        let def = Arg::from("z");
        assert_eq!(set.at_or(0, &def).as_str(), "a");
        assert_eq!(set.at_or(5, &def).as_str(), "z");
        assert!(set.get(5).is_none());
    }

    #[test]
    fn insert_and_remove_rebuild_the_name_index() {
        let mut set = argset!["b=2"];
        set.insert(0, Arg::from("a=1"));
        assert_eq!(set.by_name(&["a"]).unwrap().as_i32(), 1);
        assert_eq!(set.by_name(&["b"]).unwrap().as_i32(), 2);

        let removed = set.remove(0);
        assert_eq!(removed.name(), Some("a"));
        assert!(set.by_name(&["a"]).is_none());
        assert_eq!(set.by_name(&["b"]).unwrap().as_i32(), 2);
    }
}
