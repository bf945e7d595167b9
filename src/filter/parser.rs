//! Filter grammar: clauses joined by `and`/`or`, parenthesized groups, and
//! `field,opcode,operand...` comparisons.

use crate::error::FilterError;
use crate::filter::lexer::{Atom, Token};
use regex::Regex;
use std::sync::LazyLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Joiner {
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    Eq,
    Neq,
    Lt,
    Le,
    Ge,
    Gt,
    Nlt,
    Nle,
    Nge,
    Ngt,
    Bt,
    Nbt,
    In,
    Nin,
    Is,
    Nis,
    Cs,
    Ncs,
    Sw,
    Nsw,
    Ew,
    New,
}

/// How many operands an opcode takes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arity {
    /// `is`, `nis`: none, or the literal `null`.
    Nullary,
    Unary,
    Binary,
    /// `in`, `nin`: one or more.
    Variadic,
}

impl Opcode {
    pub fn parse(word: &str) -> Option<Self> {
        Some(match word.to_ascii_lowercase().as_str() {
            "eq" => Opcode::Eq,
            "neq" => Opcode::Neq,
            "lt" => Opcode::Lt,
            "le" => Opcode::Le,
            "ge" => Opcode::Ge,
            "gt" => Opcode::Gt,
            "nlt" => Opcode::Nlt,
            "nle" => Opcode::Nle,
            "nge" => Opcode::Nge,
            "ngt" => Opcode::Ngt,
            "bt" => Opcode::Bt,
            "nbt" => Opcode::Nbt,
            "in" => Opcode::In,
            "nin" => Opcode::Nin,
            "is" => Opcode::Is,
            "nis" => Opcode::Nis,
            "cs" => Opcode::Cs,
            "ncs" => Opcode::Ncs,
            "sw" => Opcode::Sw,
            "nsw" => Opcode::Nsw,
            "ew" => Opcode::Ew,
            "new" => Opcode::New,
            _ => return None,
        })
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Eq => "eq",
            Opcode::Neq => "neq",
            Opcode::Lt => "lt",
            Opcode::Le => "le",
            Opcode::Ge => "ge",
            Opcode::Gt => "gt",
            Opcode::Nlt => "nlt",
            Opcode::Nle => "nle",
            Opcode::Nge => "nge",
            Opcode::Ngt => "ngt",
            Opcode::Bt => "bt",
            Opcode::Nbt => "nbt",
            Opcode::In => "in",
            Opcode::Nin => "nin",
            Opcode::Is => "is",
            Opcode::Nis => "nis",
            Opcode::Cs => "cs",
            Opcode::Ncs => "ncs",
            Opcode::Sw => "sw",
            Opcode::Nsw => "nsw",
            Opcode::Ew => "ew",
            Opcode::New => "new",
        }
    }

    pub fn arity(self) -> Arity {
        match self {
            Opcode::Is | Opcode::Nis => Arity::Nullary,
            Opcode::Bt | Opcode::Nbt => Arity::Binary,
            Opcode::In | Opcode::Nin => Arity::Variadic,
            _ => Arity::Unary,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    /// Unquoted numeric literal.
    Number(String),
    /// `table.column` reference, rendered bare.
    Column(String),
    /// Bare word: a string value, or an identifier in join conditions.
    Word(String),
    /// Explicitly quoted string literal.
    Text(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Comparison {
    pub field: String,
    pub op: Opcode,
    pub operands: Vec<Operand>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterExpr {
    Compare(Comparison),
    Group(Vec<Clause>),
    /// Text with no recognized opcode; emitted as-is, space separated.
    Raw(Vec<Operand>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Clause {
    pub joiner: Option<Joiner>,
    pub expr: FilterExpr,
}

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("should compile"));

static COLUMN_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_#][A-Za-z0-9_#-]*\.[A-Za-z_#*][A-Za-z0-9_#-]*$").expect("should compile")
});

/// Classify a bare word: number, `table.column` reference, or plain word.
pub fn classify(word: &str) -> Operand {
    if NUMBER.is_match(word) {
        Operand::Number(word.to_string())
    } else if COLUMN_REF.is_match(word) {
        Operand::Column(word.to_string())
    } else {
        Operand::Word(word.to_string())
    }
}

/// List members are values only, never column references.
fn list_member(atom: &Atom) -> Operand {
    match atom {
        Atom::Quoted(s) => Operand::Text(s.clone()),
        Atom::Bare(w) if NUMBER.is_match(w) => Operand::Number(w.clone()),
        Atom::Bare(w) => Operand::Word(w.clone()),
    }
}

/// One item of a clause before interpretation.
#[derive(Clone, Debug)]
enum Item {
    Word(String),
    Quoted(String),
    List(Vec<Atom>),
    /// `name(args)` with args already rendered.
    Call(String),
}

fn joiner(token: &Token) -> Option<Joiner> {
    match token {
        Token::Atom(Atom::Bare(w)) if w.eq_ignore_ascii_case("and") => Some(Joiner::And),
        Token::Atom(Atom::Bare(w)) if w.eq_ignore_ascii_case("or") => Some(Joiner::Or),
        _ => None,
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn clauses(&mut self, nested: bool) -> Result<Vec<Clause>, FilterError> {
        let mut out = Vec::new();
        loop {
            let mut pending = None;
            if let Some(j) = self.peek().and_then(joiner) {
                pending = Some(j);
                self.pos += 1;
            }
            match self.peek() {
                None => {
                    if nested {
                        return Err(FilterError::UnbalancedParens);
                    }
                    if pending.is_some() {
                        out.push(Clause { joiner: pending, expr: FilterExpr::Raw(Vec::new()) });
                    }
                    return Ok(out);
                }
                Some(Token::Close) => {
                    if !nested {
                        return Err(FilterError::UnbalancedParens);
                    }
                    self.pos += 1;
                    if pending.is_some() {
                        out.push(Clause { joiner: pending, expr: FilterExpr::Raw(Vec::new()) });
                    }
                    return Ok(out);
                }
                Some(Token::Open) => {
                    self.pos += 1;
                    let inner = self.clauses(true)?;
                    out.push(Clause { joiner: pending, expr: FilterExpr::Group(inner) });
                }
                Some(_) => {
                    let items = self.items()?;
                    out.push(Clause { joiner: pending, expr: interpret(items)? });
                }
            }
        }
    }

    /// Collect items up to the next joiner, group boundary or end.
    fn items(&mut self) -> Result<Vec<Item>, FilterError> {
        let mut items = Vec::new();
        while let Some(token) = self.peek() {
            if joiner(token).is_some() {
                break;
            }
            match token.clone() {
                Token::Close => break,
                Token::Open => {
                    // `(` right after a word makes a function call; otherwise it starts a group
                    // and ends this clause.
                    match items.pop() {
                        Some(Item::Word(name)) => {
                            self.pos += 1;
                            let args = self.call_args()?;
                            items.push(Item::Call(format!("{}({})", name, args)));
                        }
                        other => {
                            if let Some(item) = other {
                                items.push(item);
                            }
                            break;
                        }
                    }
                    continue;
                }
                Token::Atom(Atom::Bare(w)) => items.push(Item::Word(w)),
                Token::Atom(Atom::Quoted(s)) => items.push(Item::Quoted(s)),
                Token::List(l) => items.push(Item::List(l)),
            }
            self.pos += 1;
        }
        Ok(items)
    }

    fn call_args(&mut self) -> Result<String, FilterError> {
        let mut args = Vec::new();
        loop {
            let Some(token) = self.peek().cloned() else {
                return Err(FilterError::UnbalancedParens);
            };
            self.pos += 1;
            match token {
                Token::Close => return Ok(args.join(", ")),
                Token::Open => {
                    let inner = self.call_args()?;
                    match args.pop() {
                        Some(name) => args.push(format!("{}({})", name, inner)),
                        None => args.push(format!("({})", inner)),
                    }
                }
                Token::Atom(Atom::Bare(w)) => args.push(w),
                Token::Atom(Atom::Quoted(s)) => args.push(format!("'{}'", s.replace('\\', ""))),
                Token::List(_) => {}
            }
        }
    }
}

fn field_text(item: &Item) -> Option<String> {
    match item {
        Item::Word(w) | Item::Call(w) => Some(w.clone()),
        _ => None,
    }
}

fn operands(items: &[Item]) -> Vec<Operand> {
    let mut out = Vec::new();
    for item in items {
        match item {
            Item::Word(w) => out.push(classify(w)),
            Item::Call(c) => out.push(Operand::Column(c.clone())),
            Item::Quoted(s) => out.push(Operand::Text(s.clone())),
            Item::List(l) => out.extend(l.iter().map(list_member)),
        }
    }
    out
}

fn interpret(items: Vec<Item>) -> Result<FilterExpr, FilterError> {
    let op = match items.get(1) {
        Some(Item::Word(w)) => Opcode::parse(w),
        _ => None,
    };
    let (Some(op), Some(field)) = (op, items.first().and_then(field_text)) else {
        return Ok(FilterExpr::Raw(operands(&items)));
    };
    let mut args = operands(&items[2..]);
    let found = args.len();
    let arity_error = |expected| FilterError::Arity { opcode: op.mnemonic(), expected, found };
    match op.arity() {
        Arity::Nullary => {
            let is_null = |o: &Operand| matches!(o, Operand::Word(w) if w.eq_ignore_ascii_case("null"));
            match args.as_slice() {
                [] => {}
                [only] if is_null(only) => args.clear(),
                _ => return Err(arity_error(0)),
            }
        }
        Arity::Unary if found != 1 => return Err(arity_error(1)),
        Arity::Binary if found != 2 => return Err(arity_error(2)),
        Arity::Variadic if found == 0 => return Err(arity_error(1)),
        _ => {}
    }
    Ok(FilterExpr::Compare(Comparison { field, op, operands: args }))
}

/// Parse a token stream into top-level clauses.
pub fn parse(tokens: Vec<Token>) -> Result<Vec<Clause>, FilterError> {
    Parser { tokens, pos: 0 }.clauses(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::lexer::tokenize;

    fn parse_str(s: &str) -> Result<Vec<Clause>, FilterError> {
        parse(tokenize(s))
    }

    #[test]
    fn comparison_with_joiner() {
        let clauses = parse_str("age,gt,18,and,name,eq,bob").unwrap();
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[1].joiner, Some(Joiner::And));
        match &clauses[0].expr {
            FilterExpr::Compare(c) => {
                assert_eq!(c.field, "age");
                assert_eq!(c.op, Opcode::Gt);
                assert_eq!(c.operands, vec![Operand::Number("18".into())]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn groups_nest() {
        let clauses = parse_str("(a,eq,1,or,b,eq,2),and,c,is").unwrap();
        assert!(matches!(&clauses[0].expr, FilterExpr::Group(inner) if inner.len() == 2));
        assert!(matches!(&clauses[1].expr, FilterExpr::Compare(c) if c.op == Opcode::Is));
    }

    #[test]
    fn function_fields_are_absorbed() {
        let clauses = parse_str("count(id),gt,5").unwrap();
        assert!(matches!(&clauses[0].expr, FilterExpr::Compare(c) if c.field == "count(id)"));
    }

    #[test]
    fn between_accepts_list_or_pair() {
        for raw in ["x,bt,1,5", "x,bt,[1,5]"] {
            let clauses = parse_str(raw).unwrap();
            assert!(matches!(&clauses[0].expr, FilterExpr::Compare(c) if c.operands.len() == 2));
        }
    }

    #[test]
    fn wrong_arity_is_rejected() {
        assert_eq!(
            parse_str("x,bt,1").unwrap_err(),
            FilterError::Arity { opcode: "bt", expected: 2, found: 1 }
        );
        assert!(parse_str("x,eq").is_err());
        assert!(parse_str("x,is,5").is_err());
        assert!(parse_str("x,is,null").is_ok());
    }

    #[test]
    fn unknown_opcode_passes_through() {
        let clauses = parse_str("x,like,y").unwrap();
        assert!(matches!(&clauses[0].expr, FilterExpr::Raw(items) if items.len() == 3));
    }

    #[test]
    fn unbalanced_parens_are_rejected() {
        assert_eq!(parse_str("(a,eq,1").unwrap_err(), FilterError::UnbalancedParens);
        assert_eq!(parse_str("a,eq,1)").unwrap_err(), FilterError::UnbalancedParens);
    }

    #[test]
    fn classifies_operands() {
        assert_eq!(classify("-3.5"), Operand::Number("-3.5".into()));
        assert_eq!(classify("users.id"), Operand::Column("users.id".into()));
        assert_eq!(classify("1.2.3"), Operand::Word("1.2.3".into()));
        assert_eq!(classify("bob"), Operand::Word("bob".into()));
    }
}
