//! Filter mini-language compiler.
//!
//! `field,opcode,value[,value2]` comparisons joined by `and`/`or`, with
//! `[a,b]` lists, `'quoted, literals'` and parenthesized groups. Compilation
//! is tokenize → parse → render; no state survives between calls.

pub mod lexer;
pub mod parser;
pub mod render;

use crate::error::FilterError;
use crate::schema::Dialect;
use parser::Comparison;
use render::{Mode, Renderer};

pub use parser::{Clause, FilterExpr, Joiner, Opcode, Operand};

#[derive(Clone, Copy, Debug)]
pub struct FilterCompiler {
    dialect: Dialect,
}

impl FilterCompiler {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn ensure_supported(&self) -> Result<(), FilterError> {
        if self.dialect.supports_filters() {
            Ok(())
        } else {
            Err(FilterError::Unsupported(self.dialect.name()))
        }
    }

    /// Parse into the predicate AST without rendering.
    pub fn parse(&self, raw: &str) -> Result<Vec<Clause>, FilterError> {
        self.ensure_supported()?;
        parser::parse(lexer::tokenize(raw))
    }

    /// Compile a WHERE/HAVING fragment; bare words become quoted string values.
    pub fn compile(&self, raw: &str) -> Result<String, FilterError> {
        let clauses = self.parse(raw)?;
        Ok(Renderer::new(self.dialect, Mode::Values).render(&clauses))
    }

    /// Compile a join condition; bare words stay identifiers.
    pub fn compile_condition(&self, raw: &str) -> Result<String, FilterError> {
        let clauses = self.parse(raw)?;
        Ok(Renderer::new(self.dialect, Mode::Identifiers).render(&clauses))
    }

    /// `table.column = v` for one value, `table.column IN (...)` for several. Both names are quoted
    /// so the key stays unambiguous next to joined tables.
    pub fn equality(&self, table: &str, column: &str, values: &[String]) -> Result<String, FilterError> {
        self.ensure_supported()?;
        let operands: Vec<Operand> = values
            .iter()
            .map(|v| match parser::classify(v) {
                Operand::Number(n) => Operand::Number(n),
                _ => Operand::Text(v.clone()),
            })
            .collect();
        let op = match operands.len() {
            0 => return Err(FilterError::Arity { opcode: "eq", expected: 1, found: 0 }),
            1 => Opcode::Eq,
            _ => Opcode::In,
        };
        let clause = Clause {
            joiner: None,
            expr: FilterExpr::Compare(Comparison {
                field: format!("{}.{}", self.dialect.quote_ident(table), self.dialect.quote_ident(column)),
                op,
                operands,
            }),
        };
        Ok(Renderer::new(self.dialect, Mode::Values).render(&[clause]))
    }
}
