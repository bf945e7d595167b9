//! SQL dialects: quoting, placeholders, pagination and the introspection query table.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[serde(alias = "pg", alias = "postgresql")]
    Postgres,
    #[serde(alias = "mariadb")]
    MySql,
    MsSql,
    #[serde(alias = "sqlite3")]
    Sqlite,
    #[serde(alias = "oracledb")]
    Oracle,
}

/// How an INSERT hands back generated primary keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReturningStyle {
    /// `INSERT ... RETURNING col`
    Returning,
    /// `INSERT ... OUTPUT INSERTED.col VALUES ...`
    Output,
    /// Driver reports only the affected-row count.
    None,
}

/// Which request value fills an introspection placeholder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bind {
    Database,
    Table,
}

#[derive(Debug)]
pub struct IntrospectionQuery {
    pub sql: &'static str,
    pub binds: &'static [Bind],
}

/// Per-dialect introspection text. Result columns are read case-insensitively:
/// table_name, table_comment, column_name, column_default, is_nullable,
/// data_type, character_maximum_length, extra.
#[derive(Debug)]
pub struct DialectQueries {
    pub list_tables: IntrospectionQuery,
    pub reflect_pk: IntrospectionQuery,
    pub reflect_columns: IntrospectionQuery,
}

const POSTGRES_QUERIES: DialectQueries = DialectQueries {
    list_tables: IntrospectionQuery {
        sql: "SELECT table_name::text AS table_name, ''::text AS table_comment \
              FROM information_schema.tables WHERE table_schema = $1 ORDER BY table_name",
        binds: &[Bind::Database],
    },
    reflect_pk: IntrospectionQuery {
        sql: "SELECT ku.column_name::text AS column_name \
              FROM information_schema.table_constraints tc \
              JOIN information_schema.key_column_usage ku \
                ON tc.constraint_name = ku.constraint_name AND tc.table_schema = ku.table_schema \
              WHERE tc.constraint_type = 'PRIMARY KEY' AND ku.table_name = $1 AND ku.table_schema = $2 \
              ORDER BY ku.ordinal_position",
        binds: &[Bind::Table, Bind::Database],
    },
    reflect_columns: IntrospectionQuery {
        sql: "SELECT column_name::text AS column_name, column_default::text AS column_default, \
              is_nullable::text AS is_nullable, data_type::text AS data_type, \
              character_maximum_length::int8 AS character_maximum_length, ''::text AS extra \
              FROM information_schema.columns WHERE table_name = $1 AND table_schema = $2 \
              ORDER BY ordinal_position",
        binds: &[Bind::Table, Bind::Database],
    },
};

const MYSQL_QUERIES: DialectQueries = DialectQueries {
    list_tables: IntrospectionQuery {
        sql: "SELECT `TABLE_NAME`, `TABLE_COMMENT` FROM `INFORMATION_SCHEMA`.`TABLES` \
              WHERE `TABLE_SCHEMA` = ?",
        binds: &[Bind::Database],
    },
    reflect_pk: IntrospectionQuery {
        sql: "SELECT `COLUMN_NAME` FROM `INFORMATION_SCHEMA`.`COLUMNS` \
              WHERE `COLUMN_KEY` = 'PRI' AND `TABLE_NAME` = ? AND `TABLE_SCHEMA` = ?",
        binds: &[Bind::Table, Bind::Database],
    },
    reflect_columns: IntrospectionQuery {
        sql: "SELECT `COLUMN_NAME`, `COLUMN_DEFAULT`, `IS_NULLABLE`, `DATA_TYPE`, \
              `CHARACTER_MAXIMUM_LENGTH`, `EXTRA` FROM `INFORMATION_SCHEMA`.`COLUMNS` \
              WHERE `TABLE_NAME` = ? AND `TABLE_SCHEMA` = ? ORDER BY `ORDINAL_POSITION`",
        binds: &[Bind::Table, Bind::Database],
    },
};

const MSSQL_QUERIES: DialectQueries = DialectQueries {
    list_tables: IntrospectionQuery {
        sql: "SELECT [TABLE_NAME], '' AS [TABLE_COMMENT] FROM [INFORMATION_SCHEMA].[TABLES] \
              WHERE [TABLE_CATALOG] = @P1",
        binds: &[Bind::Database],
    },
    reflect_pk: IntrospectionQuery {
        sql: "SELECT ku.[COLUMN_NAME] FROM [INFORMATION_SCHEMA].[TABLE_CONSTRAINTS] tc, \
              [INFORMATION_SCHEMA].[KEY_COLUMN_USAGE] ku \
              WHERE tc.[CONSTRAINT_TYPE] = 'PRIMARY KEY' AND tc.[CONSTRAINT_NAME] = ku.[CONSTRAINT_NAME] \
              AND ku.[TABLE_NAME] = @P1 AND ku.[TABLE_CATALOG] = @P2",
        binds: &[Bind::Table, Bind::Database],
    },
    reflect_columns: IntrospectionQuery {
        sql: "SELECT [COLUMN_NAME], [COLUMN_DEFAULT], [IS_NULLABLE], [DATA_TYPE], [CHARACTER_MAXIMUM_LENGTH], \
              CASE COLUMNPROPERTY(object_id([TABLE_NAME]), [COLUMN_NAME], 'IsIdentity') \
              WHEN 1 THEN 'IsIdentity' ELSE '' END AS [EXTRA] \
              FROM [INFORMATION_SCHEMA].[COLUMNS] WHERE [TABLE_NAME] = @P1 AND [TABLE_CATALOG] = @P2 \
              ORDER BY [ORDINAL_POSITION]",
        binds: &[Bind::Table, Bind::Database],
    },
};

const SQLITE_QUERIES: DialectQueries = DialectQueries {
    list_tables: IntrospectionQuery {
        sql: "SELECT name AS table_name, '' AS table_comment FROM sqlite_master \
              WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name",
        binds: &[],
    },
    reflect_pk: IntrospectionQuery {
        sql: "SELECT name AS column_name FROM pragma_table_info(?) WHERE pk > 0 ORDER BY pk",
        binds: &[Bind::Table],
    },
    reflect_columns: IntrospectionQuery {
        sql: "SELECT name AS column_name, dflt_value AS column_default, \
              CASE WHEN \"notnull\" = 0 THEN 'YES' ELSE 'NO' END AS is_nullable, \
              type AS data_type, NULL AS character_maximum_length, \
              CASE WHEN pk > 0 AND lower(type) = 'integer' THEN 'auto_increment' ELSE '' END AS extra \
              FROM pragma_table_info(?) ORDER BY cid",
        binds: &[Bind::Table],
    },
};

const ORACLE_QUERIES: DialectQueries = DialectQueries {
    list_tables: IntrospectionQuery {
        sql: "SELECT TABLE_NAME, '' AS TABLE_COMMENT FROM ALL_TABLES WHERE OWNER = :1",
        binds: &[Bind::Database],
    },
    reflect_pk: IntrospectionQuery {
        sql: "SELECT cols.COLUMN_NAME FROM ALL_CONSTRAINTS cons, ALL_CONS_COLUMNS cols \
              WHERE cons.CONSTRAINT_TYPE = 'P' AND cons.CONSTRAINT_NAME = cols.CONSTRAINT_NAME \
              AND cons.OWNER = cols.OWNER AND cols.TABLE_NAME = :1 AND cols.OWNER = :2 \
              ORDER BY cols.POSITION",
        binds: &[Bind::Table, Bind::Database],
    },
    reflect_columns: IntrospectionQuery {
        sql: "SELECT COLUMN_NAME, DATA_DEFAULT AS COLUMN_DEFAULT, \
              CASE NULLABLE WHEN 'Y' THEN 'YES' ELSE 'NO' END AS IS_NULLABLE, DATA_TYPE, \
              CHAR_LENGTH AS CHARACTER_MAXIMUM_LENGTH, '' AS EXTRA \
              FROM ALL_TAB_COLUMNS WHERE TABLE_NAME = :1 AND OWNER = :2 ORDER BY COLUMN_ID",
        binds: &[Bind::Table, Bind::Database],
    },
};

impl Dialect {
    pub fn name(self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
            Dialect::MsSql => "mssql",
            Dialect::Sqlite => "sqlite",
            Dialect::Oracle => "oracle",
        }
    }

    pub fn queries(self) -> &'static DialectQueries {
        match self {
            Dialect::Postgres => &POSTGRES_QUERIES,
            Dialect::MySql => &MYSQL_QUERIES,
            Dialect::MsSql => &MSSQL_QUERIES,
            Dialect::Sqlite => &SQLITE_QUERIES,
            Dialect::Oracle => &ORACLE_QUERIES,
        }
    }

    /// Oracle has no filter support; every other dialect shares the same grammar.
    pub fn supports_filters(self) -> bool {
        !matches!(self, Dialect::Oracle)
    }

    /// Quote character wrapped around string operands in compiled filters.
    pub fn value_quote(self) -> char {
        '\''
    }

    /// Suffix appended after LIKE patterns that carry backslash escapes.
    pub fn like_escape(self) -> &'static str {
        match self {
            Dialect::Postgres | Dialect::MySql => "",
            Dialect::MsSql | Dialect::Sqlite | Dialect::Oracle => " ESCAPE '\\'",
        }
    }

    /// Quote an identifier, doubling any embedded closing quote.
    pub fn quote_ident(self, ident: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
            Dialect::MsSql => format!("[{}]", ident.replace(']', "]]")),
            Dialect::Postgres | Dialect::Sqlite | Dialect::Oracle => {
                format!("\"{}\"", ident.replace('"', "\"\""))
            }
        }
    }

    pub fn qualified_table(self, database: &str, table: &str) -> String {
        if database.is_empty() {
            self.quote_ident(table)
        } else {
            format!("{}.{}", self.quote_ident(database), self.quote_ident(table))
        }
    }

    /// Positional placeholder for the 1-based parameter `n`.
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", n),
            Dialect::MySql | Dialect::Sqlite => "?".to_string(),
            Dialect::MsSql => format!("@P{}", n),
            Dialect::Oracle => format!(":{}", n),
        }
    }

    /// PostgreSQL binds are typed, so write placeholders are cast to the column's catalog type.
    pub fn placeholder_cast(self, data_type: &str) -> Option<String> {
        if self != Dialect::Postgres {
            return None;
        }
        let ty = data_type.trim().to_lowercase();
        if ty.is_empty() || ty == "user-defined" || ty == "array" {
            None
        } else {
            Some(format!("::{}", ty))
        }
    }

    /// PostgreSQL numeric and user-defined (enum) columns have no plain decode, so they are
    /// selected as text.
    pub fn projection_cast(self, data_type: &str) -> Option<&'static str> {
        if self != Dialect::Postgres {
            return None;
        }
        match data_type.trim().to_lowercase().as_str() {
            "numeric" | "decimal" | "money" | "user-defined" => Some("::text"),
            _ => None,
        }
    }

    pub fn returning(self) -> ReturningStyle {
        match self {
            Dialect::Postgres | Dialect::Sqlite => ReturningStyle::Returning,
            Dialect::MsSql => ReturningStyle::Output,
            Dialect::MySql | Dialect::Oracle => ReturningStyle::None,
        }
    }

    /// Whether `DEFAULT` may stand in for a column omitted from one row of a multi-row insert.
    pub fn supports_default_keyword(self) -> bool {
        self != Dialect::Sqlite
    }

    /// Keyword used for a column omitted from one row of a multi-row insert.
    pub fn missing_value(self) -> &'static str {
        if self.supports_default_keyword() {
            "DEFAULT"
        } else {
            "NULL"
        }
    }

    /// Pagination suffix; `has_order` tells whether the statement already carries ORDER BY.
    pub fn paginate(self, offset: Option<u64>, limit: Option<u64>, has_order: bool) -> String {
        if offset.is_none() && limit.is_none() {
            return String::new();
        }
        match self {
            Dialect::Postgres => {
                let mut out = String::new();
                if let Some(o) = offset {
                    out.push_str(&format!(" OFFSET {}", o));
                }
                if let Some(l) = limit {
                    out.push_str(&format!(" LIMIT {}", l));
                }
                out
            }
            Dialect::MySql | Dialect::Sqlite => {
                let unbounded = if self == Dialect::MySql { "18446744073709551615" } else { "-1" };
                let limit = limit.map(|l| l.to_string()).unwrap_or_else(|| unbounded.to_string());
                match offset {
                    Some(o) => format!(" LIMIT {} OFFSET {}", limit, o),
                    None => format!(" LIMIT {}", limit),
                }
            }
            Dialect::MsSql | Dialect::Oracle => {
                let mut out = String::new();
                if !has_order {
                    out.push_str(" ORDER BY (SELECT NULL)");
                }
                out.push_str(&format!(" OFFSET {} ROWS", offset.unwrap_or(0)));
                if let Some(l) = limit {
                    out.push_str(&format!(" FETCH NEXT {} ROWS ONLY", l));
                }
                out
            }
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "mysql" | "mariadb" | "mariasql" => Ok(Dialect::MySql),
            "mssql" => Ok(Dialect::MsSql),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "oracle" | "oracledb" => Ok(Dialect::Oracle),
            other => Err(ConfigError::UnknownDialect(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        assert_eq!("pg".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("SQLite3".parse::<Dialect>().unwrap(), Dialect::Sqlite);
        assert_eq!("oracledb".parse::<Dialect>().unwrap(), Dialect::Oracle);
        assert!("db2".parse::<Dialect>().is_err());
    }

    #[test]
    fn quotes_identifiers_per_dialect() {
        assert_eq!(Dialect::Postgres.quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(Dialect::MySql.quote_ident("users"), "`users`");
        assert_eq!(Dialect::MsSql.quote_ident("users"), "[users]");
        assert_eq!(Dialect::Sqlite.qualified_table("main", "users"), "\"main\".\"users\"");
    }

    #[test]
    fn paginates_per_dialect() {
        assert_eq!(Dialect::Postgres.paginate(Some(0), Some(10), true), " OFFSET 0 LIMIT 10");
        assert_eq!(Dialect::Sqlite.paginate(Some(20), None, false), " LIMIT -1 OFFSET 20");
        assert_eq!(Dialect::MySql.paginate(None, Some(5), false), " LIMIT 5");
        assert_eq!(
            Dialect::MsSql.paginate(Some(10), Some(5), false),
            " ORDER BY (SELECT NULL) OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY"
        );
        assert_eq!(Dialect::Postgres.paginate(None, None, false), "");
    }

    #[test]
    fn casts_only_on_postgres() {
        assert_eq!(
            Dialect::Postgres.placeholder_cast("timestamp with time zone").as_deref(),
            Some("::timestamp with time zone")
        );
        assert_eq!(Dialect::Postgres.placeholder_cast("USER-DEFINED"), None);
        assert_eq!(Dialect::Sqlite.placeholder_cast("integer"), None);
    }

    #[test]
    fn numeric_and_enum_columns_select_as_text_on_postgres() {
        assert_eq!(Dialect::Postgres.projection_cast("numeric"), Some("::text"));
        assert_eq!(Dialect::Postgres.projection_cast("USER-DEFINED"), Some("::text"));
        assert_eq!(Dialect::Postgres.projection_cast("integer"), None);
        assert_eq!(Dialect::MySql.projection_cast("decimal"), None);
    }
}
