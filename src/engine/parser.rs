//! WHEN-clause tokenizer, parser, and predicate tree.
//!
//! A WHEN clause is a boolean combination of named, argumented trigger atoms:
//!
//! ```text
//! karma 1 2 10 & !(visited SU_C04 | fortune chance=0.5) | always
//! ```
//!
//! Grammar (conventional precedence: NOT binds tighter than AND binds tighter
//! than OR; parentheses group explicitly):
//!
//! ```text
//! expr    := or
//! or      := and ('|' and)*
//! and     := not ('&' not)*
//! not     := '!' not | primary
//! primary := '(' expr ')' | atom
//! atom    := WORD arg*        arg: bare word or 'quoted string'
//! ```
//!
//! Parsing is deterministic: the same input always produces a structurally
//! identical tree. Malformed input fails with a [`ParseError`] carrying the
//! byte position and offending fragment; no partially built tree escapes.
//!
//! After parsing, the tree owner calls [`PredicateTree::populate`] exactly
//! once to bind every atom (in left-to-right leaf order) to a boolean
//! predicate function, then [`PredicateTree::eval`] every tick. `eval` is a
//! pure reduction over current truth values; it never advances trigger state.

use crate::ArgSet;
use anyhow::bail;

/// A trigger reference found in a WHEN clause: type name plus parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerDescriptor {
    pub type_name: String,
    pub args: ArgSet,
    /// Byte offset of the type name in the source clause.
    pub pos: usize,
}

/// The truth query an atom is bound to after population.
pub type PredicateFn = Box<dyn Fn() -> bool>;

bitflags::bitflags! {
    /// Token classes the parser was prepared to accept at the point of error.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Expect: u8 {
        const ATOM     = 1 << 0;
        const NOT      = 1 << 1;
        const OPEN     = 1 << 2;
        const CLOSE    = 1 << 3;
        const OPERATOR = 1 << 4;
        const END      = 1 << 5;
    }
}

impl std::fmt::Display for Expect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts: Vec<&str> = Vec::new();
        if self.contains(Expect::ATOM) {
            parts.push("an atom");
        }
        if self.contains(Expect::NOT) {
            parts.push("`!`");
        }
        if self.contains(Expect::OPEN) {
            parts.push("`(`");
        }
        if self.contains(Expect::CLOSE) {
            parts.push("`)`");
        }
        if self.contains(Expect::OPERATOR) {
            parts.push("`&` or `|`");
        }
        if self.contains(Expect::END) {
            parts.push("end of input");
        }
        f.write_str(&parts.join(" or "))
    }
}

/// Errors from WHEN/WHERE clause parsing. Each aborts construction of the one
/// Happen whose clause failed, never the whole set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty expression")]
    Empty,
    #[error("unexpected `{found}` at byte {pos}: expected {expected}")]
    Unexpected { pos: usize, found: String, expected: Expect },
    #[error("unbalanced `)` at byte {pos}")]
    UnbalancedClose { pos: usize },
    #[error("missing `)` for group opened at byte {pos}")]
    UnclosedParen { pos: usize },
    #[error("unterminated quote starting at byte {pos}")]
    UnterminatedQuote { pos: usize },
    /// A WHERE clause ended on a `+`/`-` with no identifier following.
    #[error("dangling `{sign}` at byte {pos}: expected an identifier to follow")]
    DanglingSign { sign: char, pos: usize },
}

impl ParseError {
    /// Byte offset of the offending fragment, where one exists.
    pub fn position(&self) -> Option<usize> {
        match self {
            ParseError::Empty => None,
            ParseError::Unexpected { pos, .. }
            | ParseError::UnbalancedClose { pos }
            | ParseError::UnclosedParen { pos }
            | ParseError::UnterminatedQuote { pos }
            | ParseError::DanglingSign { pos, .. } => Some(*pos),
        }
    }
}

// --- Tokenizer ---------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum TokKind {
    And,
    Or,
    Not,
    Open,
    Close,
    Word(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokKind,
    pos: usize,
}

impl Token {
    fn display(&self) -> String {
        match &self.kind {
            TokKind::And => "&".to_string(),
            TokKind::Or => "|".to_string(),
            TokKind::Not => "!".to_string(),
            TokKind::Open => "(".to_string(),
            TokKind::Close => ")".to_string(),
            TokKind::Word(w) => w.clone(),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<Token>, ParseError> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < src.len() {
        let rest = &src[pos..];
        let c = rest.chars().next().unwrap_or('\0');
        if c.is_whitespace() {
            pos += c.len_utf8();
            continue;
        }
        let kind = match c {
            '&' => Some(TokKind::And),
            '|' => Some(TokKind::Or),
            '!' => Some(TokKind::Not),
            '(' => Some(TokKind::Open),
            ')' => Some(TokKind::Close),
            _ => None,
        };
        if let Some(kind) = kind {
            out.push(Token { kind, pos });
            pos += 1;
            continue;
        }
        if c == '\'' {
            // Quoted word: args containing spaces or operator characters.
            match rest[1..].find('\'') {
                Some(end) => {
                    out.push(Token { kind: TokKind::Word(rest[1..1 + end].to_string()), pos });
                    pos += end + 2;
                }
                None => return Err(ParseError::UnterminatedQuote { pos }),
            }
            continue;
        }
        let m = regex!(r"^[^\s&|!()']+")
            .find(rest)
            .expect("scanner: non-operator, non-space head must match a word");
        out.push(Token { kind: TokKind::Word(m.as_str().to_string()), pos });
        pos += m.end();
    }
    Ok(out)
}

// --- Tree --------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Atom(usize),
    Not(Box<Node>),
    And(Vec<Node>),
    Or(Vec<Node>),
}

/// A compiled WHEN clause: a tree of boolean combinators over trigger atoms.
pub struct PredicateTree {
    root: Node,
    atoms: Vec<TriggerDescriptor>,
    preds: Vec<PredicateFn>,
}

impl PredicateTree {
    /// Parses a WHEN clause. The returned tree is unpopulated: its atoms carry
    /// descriptors but no predicate functions yet.
    pub fn parse(src: &str) -> Result<Self, ParseError> {
        let tokens = tokenize(src)?;
        if tokens.is_empty() {
            return Err(ParseError::Empty);
        }
        let mut parser = TreeParser { end: src.len(), tokens, ix: 0, atoms: Vec::new() };
        let root = parser.parse_or()?;
        if let Some(tok) = parser.peek() {
            if tok.kind == TokKind::Close {
                return Err(ParseError::UnbalancedClose { pos: tok.pos });
            }
            return Err(parser.unexpected(Expect::OPERATOR | Expect::END));
        }
        Ok(PredicateTree { root, atoms: parser.atoms, preds: Vec::new() })
    }

    /// Atom descriptors in left-to-right leaf order (the order `populate`
    /// visits them, and the order the owning Happen's trigger array follows).
    pub fn atoms(&self) -> &[TriggerDescriptor] {
        &self.atoms
    }

    pub fn is_populated(&self) -> bool {
        !self.atoms.is_empty() && self.preds.len() == self.atoms.len()
    }

    /// Binds every atom to a predicate function, exactly once, in leaf order.
    ///
    /// An error from `bind` leaves the tree unpopulated (no partially bound
    /// state) and aborts construction of the owning Happen.
    pub fn populate<F>(&mut self, mut bind: F) -> anyhow::Result<()>
    where
        F: FnMut(&str, &ArgSet) -> anyhow::Result<PredicateFn>,
    {
        if !self.preds.is_empty() {
            bail!("predicate tree populated twice");
        }
        let mut preds = Vec::with_capacity(self.atoms.len());
        for atom in &self.atoms {
            preds.push(bind(&atom.type_name, &atom.args)?);
        }
        self.preds = preds;
        Ok(())
    }

    /// Recursive boolean reduction over the current truth values of the bound
    /// atoms. Does not step triggers.
    pub fn eval(&self) -> bool {
        debug_assert!(self.is_populated(), "eval on unpopulated tree");
        self.eval_node(&self.root)
    }

    fn eval_node(&self, node: &Node) -> bool {
        match node {
            Node::Atom(ix) => self.preds.get(*ix).map(|p| p()).unwrap_or(false),
            Node::Not(child) => !self.eval_node(child),
            Node::And(children) => children.iter().all(|c| self.eval_node(c)),
            Node::Or(children) => children.iter().any(|c| self.eval_node(c)),
        }
    }

    /// Multi-line rendering of the tree structure, for diagnostics.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_node(&self.root, 0, &mut out);
        out
    }

    fn render_node(&self, node: &Node, depth: usize, out: &mut String) {
        let pad = "  ".repeat(depth);
        match node {
            Node::Atom(ix) => {
                let atom = &self.atoms[*ix];
                out.push_str(&pad);
                out.push_str(&atom.type_name);
                if !atom.args.is_empty() {
                    out.push(' ');
                    out.push_str(&atom.args.to_string());
                }
                out.push('\n');
            }
            Node::Not(child) => {
                out.push_str(&pad);
                out.push_str("not\n");
                self.render_node(child, depth + 1, out);
            }
            Node::And(children) => {
                out.push_str(&pad);
                out.push_str("and\n");
                for c in children {
                    self.render_node(c, depth + 1, out);
                }
            }
            Node::Or(children) => {
                out.push_str(&pad);
                out.push_str("or\n");
                for c in children {
                    self.render_node(c, depth + 1, out);
                }
            }
        }
    }
}

impl std::fmt::Debug for PredicateTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateTree")
            .field("root", &self.root)
            .field("atoms", &self.atoms)
            .field("populated", &self.is_populated())
            .finish()
    }
}

// --- Parser ------------------------------------------------------------------

struct TreeParser {
    /// Byte length of the source, used as the position of end-of-input errors.
    end: usize,
    tokens: Vec<Token>,
    ix: usize,
    atoms: Vec<TriggerDescriptor>,
}

impl TreeParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.ix)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.ix).cloned();
        if tok.is_some() {
            self.ix += 1;
        }
        tok
    }

    fn unexpected(&self, expected: Expect) -> ParseError {
        match self.peek() {
            Some(tok) => {
                ParseError::Unexpected { pos: tok.pos, found: tok.display(), expected }
            }
            None => ParseError::Unexpected {
                pos: self.end,
                found: "end of input".to_string(),
                expected,
            },
        }
    }

    fn parse_or(&mut self) -> Result<Node, ParseError> {
        let mut children = vec![self.parse_and()?];
        while matches!(self.peek(), Some(t) if t.kind == TokKind::Or) {
            self.advance();
            children.push(self.parse_and()?);
        }
        Ok(if children.len() == 1 { children.pop().unwrap() } else { Node::Or(children) })
    }

    fn parse_and(&mut self) -> Result<Node, ParseError> {
        let mut children = vec![self.parse_not()?];
        while matches!(self.peek(), Some(t) if t.kind == TokKind::And) {
            self.advance();
            children.push(self.parse_not()?);
        }
        Ok(if children.len() == 1 { children.pop().unwrap() } else { Node::And(children) })
    }

    fn parse_not(&mut self) -> Result<Node, ParseError> {
        if matches!(self.peek(), Some(t) if t.kind == TokKind::Not) {
            self.advance();
            return Ok(Node::Not(Box::new(self.parse_not()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Node, ParseError> {
        let Some(tok) = self.peek() else {
            return Err(self.unexpected(Expect::ATOM | Expect::NOT | Expect::OPEN));
        };
        match &tok.kind {
            TokKind::Open => {
                let open_pos = tok.pos;
                self.advance();
                let inner = self.parse_or()?;
                match self.peek() {
                    Some(t) if t.kind == TokKind::Close => {
                        self.advance();
                        Ok(inner)
                    }
                    Some(_) => Err(self.unexpected(Expect::OPERATOR | Expect::CLOSE)),
                    None => Err(ParseError::UnclosedParen { pos: open_pos }),
                }
            }
            TokKind::Word(_) => self.parse_atom(),
            _ => Err(self.unexpected(Expect::ATOM | Expect::NOT | Expect::OPEN)),
        }
    }

    fn parse_atom(&mut self) -> Result<Node, ParseError> {
        let Some(Token { kind: TokKind::Word(type_name), pos }) = self.advance() else {
            unreachable!("parse_atom called without a word at hand");
        };
        // Trailing words up to the next operator or paren are the atom's args.
        let mut raw_args: Vec<String> = Vec::new();
        while let Some(Token { kind: TokKind::Word(w), .. }) = self.peek() {
            raw_args.push(w.clone());
            self.advance();
        }
        let ix = self.atoms.len();
        self.atoms.push(TriggerDescriptor {
            type_name,
            args: ArgSet::new(&raw_args),
            pos,
        });
        Ok(Node::Atom(ix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Parses `src` and evaluates it against fixed atom truth values, assigned
    /// in leaf order.
    fn eval_with(src: &str, vals: &[bool]) -> bool {
        let mut tree = PredicateTree::parse(src).unwrap();
        assert_eq!(tree.atoms().len(), vals.len(), "atom count for {src:?}");
        let mut next = 0usize;
        tree.populate(|_, _| {
            let v = vals[next];
            next += 1;
            Ok(Box::new(move || v))
        })
        .unwrap();
        tree.eval()
    }

    #[test]
    fn truth_tables() {
        // (expression, atom count, reference function over the assignment)
        let cases: Vec<(&str, usize, fn(&[bool]) -> bool)> = vec![
            ("a", 1, |v| v[0]),
            ("!a", 1, |v| !v[0]),
            ("!!a", 1, |v| v[0]),
            ("((a))", 1, |v| v[0]),
            ("a & b", 2, |v| v[0] && v[1]),
            ("a | b", 2, |v| v[0] || v[1]),
            ("a & b | c", 3, |v| (v[0] && v[1]) || v[2]),
            ("a | b & c", 3, |v| v[0] || (v[1] && v[2])),
            ("(a | b) & c", 3, |v| (v[0] || v[1]) && v[2]),
            ("!(a | b) & c", 3, |v| !(v[0] || v[1]) && v[2]),
            ("a & (b | !c)", 3, |v| v[0] && (v[1] || !v[2])),
            ("a & !(b | (c & d))", 4, |v| v[0] && !(v[1] || (v[2] && v[3]))),
            ("!a | !b & !c | d", 4, |v| !v[0] || (!v[1] && !v[2]) || v[3]),
        ];
        for (src, n, reference) in cases {
            for mask in 0..(1u32 << n) {
                let vals: Vec<bool> = (0..n).map(|i| mask & (1 << i) != 0).collect();
                assert_eq!(
                    eval_with(src, &vals),
                    reference(&vals),
                    "{src:?} with {vals:?}"
                );
            }
        }
    }

    #[test]
    fn parsing_is_deterministic() {
        let src = "karma 1 2 10 & !(visited SU_C04 | fortune chance=0.5)";
        let first = PredicateTree::parse(src).unwrap();
        let second = PredicateTree::parse(src).unwrap();
        assert_eq!(first.root, second.root);
        assert_eq!(first.atoms(), second.atoms());
        for mask in 0..(1u32 << 3) {
            let vals: Vec<bool> = (0..3).map(|i| mask & (1 << i) != 0).collect();
            assert_eq!(eval_with(src, &vals), eval_with(src, &vals));
        }
    }

    #[test]
    fn malformed_expressions_fail() {
        let cases = [
            "",
            "   ",
            "a & (",
            "| b",
            "a &",
            "a & & b",
            "()",
            "(",
            "a)",
            "a ! b",
            "!",
            "'unterminated",
        ];
        for src in cases {
            assert!(PredicateTree::parse(src).is_err(), "{src:?} should not parse");
        }
    }

    #[test]
    fn error_positions_point_at_the_offense() {
        match PredicateTree::parse("a & & b") {
            Err(ParseError::Unexpected { pos, found, .. }) => {
                assert_eq!(pos, 4);
                assert_eq!(found, "&");
            }
            other => panic!("expected Unexpected, got {other:?}"),
        }
        assert_eq!(
            PredicateTree::parse("a & (b").unwrap_err(),
            ParseError::UnclosedParen { pos: 4 }
        );
        assert_eq!(
            PredicateTree::parse("a)").unwrap_err(),
            ParseError::UnbalancedClose { pos: 1 }
        );
        assert_eq!(
            PredicateTree::parse("x & 'oops").unwrap_err(),
            ParseError::UnterminatedQuote { pos: 4 }
        );
    }

    #[test]
    fn atoms_collect_trailing_args() {
        let tree = PredicateTree::parse("karma 1 2 10 & delay cd=80 'two words'").unwrap();
        let atoms = tree.atoms();
        assert_eq!(atoms.len(), 2);

        assert_eq!(atoms[0].type_name, "karma");
        assert_eq!(atoms[0].args.len(), 3);
        assert_eq!(atoms[0].args.get(2).unwrap().as_i32(), 10);

        assert_eq!(atoms[1].type_name, "delay");
        assert_eq!(atoms[1].args.by_name(&["cd"]).unwrap().as_i32(), 80);
        assert_eq!(atoms[1].args.get(1).unwrap().as_str(), "two words");
    }

    #[test]
    fn populate_runs_once_in_leaf_order() {
        let mut tree = PredicateTree::parse("a & (b | c)").unwrap();
        let mut seen = Vec::new();
        tree.populate(|name, _| {
            seen.push(name.to_string());
            Ok(Box::new(|| true))
        })
        .unwrap();
        assert_eq!(seen, ["a", "b", "c"]);

        let err = tree.populate(|_, _| Ok(Box::new(|| true)));
        assert!(err.is_err(), "second populate must be rejected");
    }

    #[test]
    fn failed_populate_leaves_tree_unpopulated() {
        let mut tree = PredicateTree::parse("a & b").unwrap();
        let res = tree.populate(|name, _| {
            if name == "b" {
                anyhow::bail!("no such trigger");
            }
            Ok(Box::new(|| true))
        });
        assert!(res.is_err());
        assert!(!tree.is_populated());
    }
}
