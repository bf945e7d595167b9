//! Render parsed filter clauses into SQL boolean text.

use crate::filter::parser::{Clause, Comparison, FilterExpr, Joiner, Opcode, Operand};
use crate::schema::Dialect;

/// Bare words are quoted string values, or identifiers (join conditions).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Values,
    Identifiers,
}

pub struct Renderer {
    dialect: Dialect,
    mode: Mode,
}

fn strip_quotes(s: &str, quote: char) -> String {
    s.chars().filter(|c| *c != quote && *c != '\'' && *c != '\\').collect()
}

fn like_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\'' | '\\' => {}
            '%' | '_' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

fn operand_text(o: &Operand) -> &str {
    match o {
        Operand::Number(s) | Operand::Column(s) | Operand::Word(s) | Operand::Text(s) => s,
    }
}

impl Renderer {
    pub fn new(dialect: Dialect, mode: Mode) -> Self {
        Self { dialect, mode }
    }

    pub fn render(&self, clauses: &[Clause]) -> String {
        let mut parts: Vec<String> = Vec::new();
        for clause in clauses {
            match clause.joiner {
                Some(Joiner::And) => parts.push("AND".into()),
                Some(Joiner::Or) => parts.push("OR".into()),
                None => {}
            }
            let expr = self.expr(&clause.expr);
            if !expr.is_empty() {
                parts.push(expr);
            }
        }
        parts.join(" ")
    }

    fn expr(&self, expr: &FilterExpr) -> String {
        match expr {
            FilterExpr::Compare(c) => self.comparison(c),
            FilterExpr::Group(inner) => format!("({})", self.render(inner)),
            FilterExpr::Raw(items) => items
                .iter()
                .map(|o| match o {
                    Operand::Text(_) => self.value(o),
                    other => operand_text(other).to_string(),
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    fn value(&self, o: &Operand) -> String {
        let q = self.dialect.value_quote();
        match o {
            Operand::Number(s) | Operand::Column(s) => s.clone(),
            Operand::Word(s) if self.mode == Mode::Identifiers => s.clone(),
            Operand::Word(s) | Operand::Text(s) => format!("{q}{}{q}", strip_quotes(s, q)),
        }
    }

    fn like(&self, field: &str, negated: bool, o: &Operand, prefix: &str, suffix: &str) -> String {
        let q = self.dialect.value_quote();
        format!(
            "{} {}LIKE {q}{}{}{}{q}{}",
            field,
            if negated { "NOT " } else { "" },
            prefix,
            like_escape(operand_text(o)),
            suffix,
            self.dialect.like_escape()
        )
    }

    fn comparison(&self, c: &Comparison) -> String {
        let f = c.field.as_str();
        let first = c.operands.first();
        let binary = |sym: &str| match first {
            Some(o) => format!("{} {} {}", f, sym, self.value(o)),
            None => String::new(),
        };
        let between = |negated: bool| match c.operands.as_slice() {
            [lo, hi] => format!(
                "{} {}BETWEEN {} AND {}",
                f,
                if negated { "NOT " } else { "" },
                self.value(lo),
                self.value(hi)
            ),
            _ => String::new(),
        };
        let list = |negated: bool| {
            let members: Vec<String> = c.operands.iter().map(|o| self.value(o)).collect();
            format!("{} {}IN ({})", f, if negated { "NOT " } else { "" }, members.join(","))
        };
        let pattern = |negated: bool, prefix: &str, suffix: &str| match first {
            Some(o) => self.like(f, negated, o, prefix, suffix),
            None => String::new(),
        };
        match c.op {
            Opcode::Eq => binary("="),
            Opcode::Neq => binary("<>"),
            Opcode::Lt | Opcode::Nge => binary("<"),
            Opcode::Le | Opcode::Ngt => binary("<="),
            Opcode::Ge | Opcode::Nlt => binary(">="),
            Opcode::Gt | Opcode::Nle => binary(">"),
            Opcode::Bt => between(false),
            Opcode::Nbt => between(true),
            Opcode::In => list(false),
            Opcode::Nin => list(true),
            Opcode::Is => format!("{} IS NULL", f),
            Opcode::Nis => format!("{} IS NOT NULL", f),
            Opcode::Cs => pattern(false, "%", "%"),
            Opcode::Ncs => pattern(true, "%", "%"),
            Opcode::Sw => pattern(false, "", "%"),
            Opcode::Nsw => pattern(true, "", "%"),
            Opcode::Ew => pattern(false, "%", ""),
            Opcode::New => pattern(true, "%", ""),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_escapes_wildcards_and_drops_quotes() {
        assert_eq!(like_escape("50%_o'k"), "50\\%\\_ok");
    }

    #[test]
    fn words_are_bare_in_identifier_mode() {
        let r = Renderer::new(Dialect::Postgres, Mode::Identifiers);
        assert_eq!(r.value(&Operand::Word("status".into())), "status");
        assert_eq!(r.value(&Operand::Text("active".into())), "'active'");
    }
}
