//! Statement templating: parameterized CRUD SQL per schema and dialect, plus
//! a list-query builder whose column names come only from the schema.

use serde::Serialize;

use super::dialect::{Dialect, SqlDialect};
use super::validate::ValueKind;
use super::writer::{js_string, js_string_array, CodeWriter};
use super::EmitError;
use crate::dsl::ast::{SchemaDecl, PRIMARY_KEY};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementSet {
    pub table: String,
    pub insert: String,
    /// `None` when the schema has no writable columns.
    pub update: Option<String>,
    pub delete: String,
    pub find_by_key: String,
    pub create_table: String,
    #[serde(skip)]
    pub list: ListTemplate,
}

/// Builds `SELECT * FROM "T" [WHERE ...] [ORDER BY ...]` from filter keys
/// and a sort field, both checked against the schema's columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListTemplate {
    pub table: String,
    pub columns: Vec<String>,
    pub dialect: Dialect,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn keyword(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    /// `title`, `title:asc` or `title:desc`.
    pub fn parse(text: &str) -> Self {
        match text.rsplit_once(':') {
            Some((field, dir)) if dir.eq_ignore_ascii_case("desc") => Self {
                field: field.to_string(),
                direction: SortDirection::Desc,
            },
            Some((field, dir)) if dir.eq_ignore_ascii_case("asc") => Self {
                field: field.to_string(),
                direction: SortDirection::Asc,
            },
            _ => Self {
                field: text.to_string(),
                direction: SortDirection::Asc,
            },
        }
    }
}

pub fn statements_name(schema: &str) -> String {
    format!("{schema}Statements")
}

pub fn columns_name(schema: &str) -> String {
    format!("{schema}Columns")
}

pub fn list_query_name(schema: &str) -> String {
    format!("list{schema}Query")
}

pub fn lower_statements(schema: &SchemaDecl, dialect: Dialect) -> StatementSet {
    let sql = dialect.sql();
    let table = sql.quote_ident(&schema.name);
    let columns: Vec<String> = schema.data_columns().map(|f| sql.quote_ident(&f.name)).collect();

    let insert = if columns.is_empty() {
        format!("INSERT INTO {table} DEFAULT VALUES")
    } else {
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| sql.placeholder(i)).collect();
        format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.join(","),
            placeholders.join(",")
        )
    };
    let insert = if sql.requires_returning() {
        format!("{insert} RETURNING {PRIMARY_KEY}")
    } else {
        insert
    };

    let update = (!columns.is_empty()).then(|| {
        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{c}={}", sql.placeholder(i + 1)))
            .collect();
        format!(
            "UPDATE {table} SET {} WHERE {PRIMARY_KEY}={}",
            assignments.join(","),
            sql.placeholder(columns.len() + 1)
        )
    });

    let key = sql.placeholder(1);
    StatementSet {
        table: schema.name.clone(),
        insert,
        update,
        delete: format!("DELETE FROM {table} WHERE {PRIMARY_KEY}={key}"),
        find_by_key: format!("SELECT * FROM {table} WHERE {PRIMARY_KEY}={key}"),
        create_table: create_table(schema, sql),
        list: ListTemplate {
            table: schema.name.clone(),
            columns: schema.known_columns(),
            dialect,
        },
    }
}

pub(crate) fn create_table(schema: &SchemaDecl, sql: &dyn SqlDialect) -> String {
    let mut defs = vec![sql.primary_key_column().to_string()];
    for field in schema.data_columns() {
        let not_null = if field.optional { "" } else { " NOT NULL" };
        defs.push(format!(
            "{} {}{not_null}",
            sql.quote_ident(&field.name),
            sql.column_type(ValueKind::of(field))
        ));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        sql.quote_ident(&schema.name),
        defs.join(", ")
    )
}

impl ListTemplate {
    fn check_column(&self, column: &str) -> Result<(), EmitError> {
        if self.columns.iter().any(|c| c == column) {
            Ok(())
        } else {
            Err(EmitError::UnknownColumn {
                table: self.table.clone(),
                column: column.to_string(),
            })
        }
    }

    /// SQL for the given filter columns (in order) and optional sort.
    pub fn render(&self, filters: &[&str], sort: Option<&SortSpec>) -> Result<String, EmitError> {
        let sql = self.dialect.sql();
        let mut text = format!("SELECT * FROM {}", sql.quote_ident(&self.table));

        if !filters.is_empty() {
            let mut clauses = Vec::with_capacity(filters.len());
            for (i, column) in filters.iter().enumerate() {
                self.check_column(column)?;
                clauses.push(format!("{}={}", sql.quote_ident(column), sql.placeholder(i + 1)));
            }
            text.push_str(" WHERE ");
            text.push_str(&clauses.join(" AND "));
        }

        if let Some(sort) = sort {
            self.check_column(&sort.field)?;
            text.push_str(&format!(
                " ORDER BY {} {}",
                sql.quote_ident(&sort.field),
                sort.direction.keyword()
            ));
        }

        Ok(text)
    }

    /// The same builder as a JS function over the frozen column allowlist.
    pub fn render_js(&self, w: &mut CodeWriter) {
        let columns = columns_name(&self.table);
        let placeholder = match self.dialect {
            Dialect::Sqlite => "?",
            Dialect::Postgres => "$${values.length}",
        };
        let select = format!("SELECT * FROM {}", self.dialect.sql().quote_ident(&self.table));

        w.open(format!(
            "export function {}(filters = {{}}, sort = null) {{",
            list_query_name(&self.table)
        ));
        w.line("const clauses = [];");
        w.line("const values = [];");
        w.open("for (const [column, value] of Object.entries(filters)) {");
        w.open(format!("if (!{columns}.includes(column)) {{"))
            .line("throw new ValidationFailure(column, `Unknown filter column: ${column}`);")
            .close("}");
        w.line("values.push(value);");
        w.line(format!("clauses.push(`\"${{column}}\"={placeholder}`);"));
        w.close("}");
        w.line(format!("let sql = {};", js_string(&select)));
        w.line("if (clauses.length > 0) sql += \" WHERE \" + clauses.join(\" AND \");");
        w.open("if (sort) {");
        w.open(format!("if (!{columns}.includes(sort.field)) {{"))
            .line("throw new ValidationFailure(sort.field, `Unknown sort column: ${sort.field}`);")
            .close("}");
        w.line("sql += ` ORDER BY \"${sort.field}\" ${sort.direction === \"desc\" ? \"DESC\" : \"ASC\"}`;");
        w.close("}");
        w.line("return { sql, values };");
        w.close("}");
    }
}

impl StatementSet {
    /// `<Name>Columns` and `<Name>Statements` as frozen exports, then the
    /// list builder.
    pub fn render(&self, w: &mut CodeWriter) {
        w.line(format!(
            "export const {} = Object.freeze({});",
            columns_name(&self.table),
            js_string_array(self.list.columns.iter().map(String::as_str))
        ));
        w.blank();

        w.open(format!("export const {} = Object.freeze({{", statements_name(&self.table)));
        w.line(format!("insert: {},", js_string(&self.insert)));
        match &self.update {
            Some(update) => w.line(format!("update: {},", js_string(update))),
            None => w.line("update: null,"),
        };
        w.line(format!("delete: {},", js_string(&self.delete)));
        w.line(format!("findByKey: {},", js_string(&self.find_by_key)));
        w.line(format!("createTable: {},", js_string(&self.create_table)));
        w.close("});");
        w.blank();

        self.list.render_js(w);
    }
}
