//! Syntax tree for `.bs` sources: `data`, `do`, `route`, `migration` and `import` blocks.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;
use ts_rs::TS;

/// Everything declared in one file, or the merge of several files after
/// module resolution (in which case `imports` is empty).
#[derive(Debug, Clone, Default, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct SyntaxTree {
    pub schemas: Vec<SchemaDecl>,
    pub actions: Vec<ActionDecl>,
    pub routes: Vec<RouteDecl>,
    pub migrations: Vec<MigrationDecl>,
    pub imports: Vec<ImportDecl>,
}

impl SyntaxTree {
    pub fn schema(&self, name: &str) -> Option<&SchemaDecl> {
        self.schemas.iter().find(|s| s.name == name)
    }

    pub fn action(&self, name: &str) -> Option<&ActionDecl> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
            && self.actions.is_empty()
            && self.routes.is_empty()
            && self.migrations.is_empty()
            && self.imports.is_empty()
    }
}

/// `data User { username: String(min: 3), bio: Text? }`
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
pub struct SchemaDecl {
    pub name: String,
    pub fields: Vec<FieldDecl>,
    pub line: usize,
}

impl SchemaDecl {
    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Columns written by insert/update. A declared `id` field is the
    /// primary key and is never written from request data.
    pub fn data_columns(&self) -> impl Iterator<Item = &FieldDecl> {
        self.fields.iter().filter(|f| f.name != PRIMARY_KEY)
    }

    /// Every column a query may filter or sort on: the key plus all fields.
    pub fn known_columns(&self) -> Vec<String> {
        let mut columns = vec![PRIMARY_KEY.to_string()];
        columns.extend(self.data_columns().map(|f| f.name.clone()));
        columns
    }
}

/// Name of the implicit primary-key column of every schema table.
pub const PRIMARY_KEY: &str = "id";

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
pub struct FieldDecl {
    pub name: String,
    pub type_name: String,
    pub optional: bool,
    /// `min`, `max`, `pattern`, `format` and/or `enum`, in source order.
    pub args: IndexMap<String, ArgValue>,
}

impl FieldDecl {
    pub fn number_arg(&self, key: &str) -> Option<f64> {
        match self.args.get(key)? {
            ArgValue::Number(n) => Some(*n),
            ArgValue::Text(_) | ArgValue::List(_) => None,
        }
    }

    pub fn text_arg(&self, key: &str) -> Option<String> {
        match self.args.get(key)? {
            ArgValue::Number(n) => Some(n.to_string()),
            ArgValue::Text(s) => Some(s.clone()),
            ArgValue::List(_) => None,
        }
    }

    pub fn enum_values(&self) -> Option<&[String]> {
        match self.args.get(ENUM_ARG)? {
            ArgValue::List(values) => Some(values),
            ArgValue::Number(_) | ArgValue::Text(_) => None,
        }
    }
}

/// Key under which bare identifiers inside a field's parentheses are collected.
pub const ENUM_ARG: &str = "enum";

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(untagged)]
pub enum ArgValue {
    Number(f64),
    Text(String),
    List(Vec<String>),
}

/// `do createUser(data, ctx) { ... }`. The body is the verbatim source text
/// between the braces and is never tokenized or interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
pub struct ActionDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
pub struct RouteDecl {
    pub verb: HttpVerb,
    pub path: String,
    pub pipeline: Vec<PipelineStep>,
    pub line: usize,
}

impl RouteDecl {
    pub fn key(&self) -> (HttpVerb, &str) {
        (self.verb, self.path.as_str())
    }

    pub fn action_steps(&self) -> impl Iterator<Item = &str> {
        self.pipeline.iter().filter_map(|step| match step {
            PipelineStep::Action { name } => Some(name.as_str()),
            PipelineStep::Auth | PipelineStep::Validate { .. } => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PipelineStep {
    Auth,
    Validate { schema: String },
    Action { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, TS)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpVerb {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpVerb::Get => "GET",
            HttpVerb::Post => "POST",
            HttpVerb::Put => "PUT",
            HttpVerb::Delete => "DELETE",
            HttpVerb::Patch => "PATCH",
        }
    }

    pub fn from_word(word: &str) -> Option<Self> {
        match word {
            "GET" => Some(HttpVerb::Get),
            "POST" => Some(HttpVerb::Post),
            "PUT" => Some(HttpVerb::Put),
            "DELETE" => Some(HttpVerb::Delete),
            "PATCH" => Some(HttpVerb::Patch),
            _ => None,
        }
    }
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `migration "2024_02_add_bio" { addColumn "User" bio Text }`
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
pub struct MigrationDecl {
    pub version: String,
    pub operations: Vec<MigrationOp>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum MigrationOp {
    AddColumn { table: String, column: String, type_name: String },
    DropColumn { table: String, column: String },
    CreateTable { table: String },
    DropTable { table: String },
}

impl MigrationOp {
    pub fn table(&self) -> &str {
        match self {
            MigrationOp::AddColumn { table, .. }
            | MigrationOp::DropColumn { table, .. }
            | MigrationOp::CreateTable { table }
            | MigrationOp::DropTable { table } => table,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
pub struct ImportDecl {
    pub path: String,
    pub line: usize,
}
