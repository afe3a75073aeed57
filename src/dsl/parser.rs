use indexmap::IndexMap;

use super::ast::{
    ActionDecl, ArgValue, FieldDecl, ImportDecl, MigrationDecl, MigrationOp, PipelineStep, RouteDecl,
    SchemaDecl, SyntaxTree, ENUM_ARG,
};
use super::error::{Found, ParseError, SyntaxError};
use super::lexer::{tokenize, tokenize_from, Keyword, Token, TokenKind};
use super::raw_body::{extract_balanced_block, locate_open_delimiter, BalancedBlock};

/// Parse one source file into a syntax tree. Imports are recorded, not followed.
pub fn parse(source: &str) -> Result<SyntaxTree, SyntaxError> {
    let tokens = tokenize(source);
    let mut parser = Parser::new(source, tokens);
    parser.parse_file()
}

struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'src> Parser<'src> {
    fn new(source: &'src str, tokens: Vec<Token>) -> Self {
        Self { source, tokens, pos: 0 }
    }

    fn parse_file(&mut self) -> Result<SyntaxTree, SyntaxError> {
        let mut tree = SyntaxTree::default();

        while !self.at_eof() {
            match self.peek() {
                TokenKind::Keyword(Keyword::Data) => tree.schemas.push(self.parse_data()?),
                TokenKind::Keyword(Keyword::Do) => tree.actions.push(self.parse_do()?),
                TokenKind::Keyword(Keyword::Route) => tree.routes.extend(self.parse_route()?),
                TokenKind::Keyword(Keyword::Migration) => tree.migrations.push(self.parse_migration()?),
                TokenKind::Keyword(Keyword::Import) => tree.imports.push(self.parse_import()?),
                TokenKind::Unterminated => return Err(self.error("closing '\"'").into()),
                // Stray tokens between blocks are tolerated.
                _ => self.advance(),
            }
        }

        Ok(tree)
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek(&self) -> TokenKind {
        self.current().map_or(TokenKind::Eof, |t| t.kind)
    }

    fn line(&self) -> usize {
        self.current().map_or(0, |t| t.line)
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn error(&self, expected: &str) -> ParseError {
        match self.current() {
            Some(tok) => {
                let found = Found {
                    kind: tok.kind.describe(),
                    text: &tok.text,
                };
                ParseError::new(expected, found.to_string(), tok.line, tok.column)
            }
            None => ParseError::new(expected, TokenKind::Eof.describe(), 0, 0),
        }
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ParseError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error(kind.describe()))
        }
    }

    /// Any identifier-like word, including keywords and verbs, so that names
    /// such as `data` can still be used for fields and parameters.
    fn expect_name(&mut self, what: &str) -> Result<String, ParseError> {
        match self.current() {
            Some(tok) if tok.kind.is_word() => {
                let name = tok.text.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(what)),
        }
    }

    fn expect_string(&mut self, what: &str) -> Result<String, ParseError> {
        match self.current() {
            Some(tok) if tok.kind == TokenKind::Str => {
                let value = tok.text.clone();
                self.advance();
                Ok(value)
            }
            _ => Err(self.error(what)),
        }
    }

    /// A string literal or a bare word.
    fn expect_name_or_string(&mut self, what: &str) -> Result<String, ParseError> {
        if self.peek() == TokenKind::Str {
            self.expect_string(what)
        } else {
            self.expect_name(what)
        }
    }

    fn expect_keyword(&mut self, kw: Keyword) -> Result<usize, ParseError> {
        let line = self.line();
        self.expect(TokenKind::Keyword(kw))?;
        Ok(line)
    }

    // ── data ───────────────────────────────────────────────────────

    fn parse_data(&mut self) -> Result<SchemaDecl, ParseError> {
        let line = self.expect_keyword(Keyword::Data)?;
        let name = self.expect_name("schema name")?;
        self.expect(TokenKind::LBrace)?;

        let mut fields = Vec::new();
        loop {
            while self.eat(TokenKind::Comma) {}
            if self.eat(TokenKind::RBrace) {
                break;
            }
            fields.push(self.parse_field()?);
        }

        Ok(SchemaDecl { name, fields, line })
    }

    fn parse_field(&mut self) -> Result<FieldDecl, ParseError> {
        let name = self.expect_name("field name or '}'")?;
        self.expect(TokenKind::Colon)?;
        let type_name = self.expect_name("type name")?;
        let args = if self.eat(TokenKind::LParen) {
            self.parse_field_args()?
        } else {
            IndexMap::new()
        };
        let optional = self.eat(TokenKind::Question);
        Ok(FieldDecl {
            name,
            type_name,
            optional,
            args,
        })
    }

    /// `(min: 3, max: 50)`, `(admin | editor | viewer)` or a mix. Bare words
    /// are collected into the `enum` list.
    fn parse_field_args(&mut self) -> Result<IndexMap<String, ArgValue>, ParseError> {
        let mut args = IndexMap::new();
        let mut variants = Vec::new();

        loop {
            match self.peek() {
                TokenKind::RParen => {
                    self.advance();
                    break;
                }
                TokenKind::Comma | TokenKind::Pipe => self.advance(),
                TokenKind::Str => variants.push(self.expect_string("enum value")?),
                TokenKind::Number => {
                    // Numeric literals are allowed as enum members: `Enum(1 | 2 | 3)`.
                    variants.push(self.take_text());
                }
                kind if kind.is_word() => {
                    let word = self.take_text();
                    if self.eat(TokenKind::Colon) {
                        let value = self.parse_arg_value()?;
                        args.insert(word, value);
                    } else {
                        variants.push(word);
                    }
                }
                _ => return Err(self.error("field argument or ')'")),
            }
        }

        if !variants.is_empty() {
            args.insert(ENUM_ARG.to_string(), ArgValue::List(variants));
        }
        Ok(args)
    }

    fn parse_arg_value(&mut self) -> Result<ArgValue, ParseError> {
        match self.peek() {
            TokenKind::Number | TokenKind::Str => Ok(coerce_arg(self.take_text())),
            kind if kind.is_word() => Ok(coerce_arg(self.take_text())),
            _ => Err(self.error("argument value")),
        }
    }

    fn take_text(&mut self) -> String {
        let text = self.current().map(|t| t.text.clone()).unwrap_or_default();
        self.advance();
        text
    }

    // ── do ─────────────────────────────────────────────────────────

    fn parse_do(&mut self) -> Result<ActionDecl, SyntaxError> {
        let line = self.expect_keyword(Keyword::Do)?;
        let name = self.expect_name("action name")?;
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        loop {
            if self.eat(TokenKind::RParen) {
                break;
            }
            params.push(self.expect_name("parameter name or ')'")?);
            if !self.eat(TokenKind::Comma) {
                self.expect(TokenKind::RParen)?;
                break;
            }
        }

        let (brace_line, brace_offset) = match self.current() {
            Some(tok) if tok.kind == TokenKind::LBrace => (tok.line, tok.offset),
            _ => return Err(self.error("'{' to open the action body").into()),
        };

        // Anchored on the brace token's line. When two blocks share a line
        // (`do f() { a } do g() { b }`) the first `{` there is the earlier
        // block's, and the token's own offset is used instead.
        let first_on_line = locate_open_delimiter(self.source, brace_line)?;
        let open = if first_on_line == brace_offset {
            first_on_line
        } else {
            tracing::debug!(line = brace_line, "several blocks open on one line; using the body token's brace");
            brace_offset
        };
        let block = extract_balanced_block(self.source, open)?;
        let body = block.text.to_string();

        self.skip_body_tokens(&block);

        Ok(ActionDecl { name, params, body, line })
    }

    /// Move the cursor past the body. Tokens inside the body may be wrong,
    /// since the tokenizer knows nothing of single quotes or template strings
    /// and a `/*` or `"` inside one can swallow the closing brace and more.
    /// When no `}` token sits exactly at the raw scan's closing offset, the
    /// rest of the file is tokenized again from the end of the body.
    fn skip_body_tokens(&mut self, block: &BalancedBlock<'_>) {
        let closing = self
            .tokens
            .iter()
            .enumerate()
            .skip(self.pos)
            .find(|(_, t)| t.offset >= block.close_offset)
            .filter(|(_, t)| t.offset == block.close_offset && t.kind == TokenKind::RBrace)
            .map(|(i, _)| i);

        if let Some(i) = closing {
            self.pos = i + 1;
            return;
        }

        let before = self.source.get(..block.end_offset).unwrap_or_default();
        let line = before.matches('\n').count() + 1;
        let column = before.len() - before.rfind('\n').map_or(0, |i| i + 1) + 1;
        tracing::debug!(
            close_offset = block.close_offset,
            line,
            "tokens inside action body disagree with raw scan; re-tokenizing the rest of the file"
        );
        self.tokens.truncate(self.pos);
        self.tokens.extend(tokenize_from(self.source, block.end_offset, line, column));
    }

    // ── route ──────────────────────────────────────────────────────

    fn parse_route(&mut self) -> Result<Vec<RouteDecl>, ParseError> {
        self.expect_keyword(Keyword::Route)?;
        // Optional block label: `route users { ... }`.
        if self.peek().is_word() || self.peek() == TokenKind::Str {
            self.advance();
        }
        self.expect(TokenKind::LBrace)?;

        let mut routes = Vec::new();
        loop {
            while self.eat(TokenKind::Comma) {}
            if self.eat(TokenKind::RBrace) {
                break;
            }
            routes.push(self.parse_route_entry()?);
        }
        Ok(routes)
    }

    fn parse_route_entry(&mut self) -> Result<RouteDecl, ParseError> {
        let line = self.line();
        let verb = match self.peek() {
            TokenKind::Verb(verb) => {
                self.advance();
                verb
            }
            _ => return Err(self.error("HTTP verb or '}'")),
        };
        let path = self.expect_string("route path string")?;
        self.expect(TokenKind::FatArrow)?;

        let bracketed = self.eat(TokenKind::LBracket);
        let mut pipeline = vec![self.parse_step()?];
        while self.peek() == TokenKind::Comma {
            if !bracketed && !self.next_is_step() {
                break;
            }
            self.advance();
            if bracketed && self.peek() == TokenKind::RBracket {
                break;
            }
            pipeline.push(self.parse_step()?);
        }
        if bracketed {
            self.expect(TokenKind::RBracket)?;
        }

        Ok(RouteDecl {
            verb,
            path,
            pipeline,
            line,
        })
    }

    /// After a comma in an unbracketed pipeline: another step follows unless
    /// the next entry (a verb) or the block's end does.
    fn next_is_step(&self) -> bool {
        self.tokens
            .get(self.pos + 1)
            .is_some_and(|t| matches!(t.kind, TokenKind::Ident | TokenKind::Keyword(_)))
    }

    fn parse_step(&mut self) -> Result<PipelineStep, ParseError> {
        let word = self.expect_name("pipeline step")?;
        match word.as_str() {
            "auth" => Ok(PipelineStep::Auth),
            "validate" if self.peek() == TokenKind::LParen => {
                self.advance();
                let schema = self.expect_name("schema name")?;
                self.expect(TokenKind::RParen)?;
                Ok(PipelineStep::Validate { schema })
            }
            _ => Ok(PipelineStep::Action { name: word }),
        }
    }

    // ── migration ──────────────────────────────────────────────────

    fn parse_migration(&mut self) -> Result<MigrationDecl, ParseError> {
        let line = self.expect_keyword(Keyword::Migration)?;
        let version = self.expect_name_or_string("migration version")?;
        self.expect(TokenKind::LBrace)?;

        let mut operations = Vec::new();
        loop {
            while self.eat(TokenKind::Comma) {}
            if self.eat(TokenKind::RBrace) {
                break;
            }
            operations.push(self.parse_migration_op()?);
        }

        Ok(MigrationDecl {
            version,
            operations,
            line,
        })
    }

    fn parse_migration_op(&mut self) -> Result<MigrationOp, ParseError> {
        const EXPECTED: &str = "addColumn, dropColumn, createTable or dropTable";
        if !self.peek().is_word() {
            return Err(self.error(EXPECTED));
        }
        let op = self.take_text();
        match op.as_str() {
            "addColumn" => {
                let table = self.expect_string("table name string")?;
                let column = self.expect_name_or_string("column name")?;
                let type_name = self.expect_name("column type")?;
                Ok(MigrationOp::AddColumn {
                    table,
                    column,
                    type_name,
                })
            }
            "dropColumn" => {
                let table = self.expect_string("table name string")?;
                let column = self.expect_name_or_string("column name")?;
                Ok(MigrationOp::DropColumn { table, column })
            }
            "createTable" => Ok(MigrationOp::CreateTable {
                table: self.expect_string("table name string")?,
            }),
            "dropTable" => Ok(MigrationOp::DropTable {
                table: self.expect_string("table name string")?,
            }),
            _ => {
                self.pos -= 1;
                Err(self.error(EXPECTED))
            }
        }
    }

    // ── import ─────────────────────────────────────────────────────

    fn parse_import(&mut self) -> Result<ImportDecl, ParseError> {
        let line = self.expect_keyword(Keyword::Import)?;
        let path = self.expect_string("import path string")?;
        Ok(ImportDecl { path, line })
    }
}

/// Numeric-looking argument text becomes a number, anything else stays text.
fn coerce_arg(text: String) -> ArgValue {
    match text.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => ArgValue::Number(n),
        _ => ArgValue::Text(text),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;
    use crate::dsl::ast::HttpVerb;
    use crate::dsl::error::ExtractError;
    use pretty_assertions::assert_eq;

    fn parse_ok(s: &str) -> SyntaxTree {
        parse(s).unwrap()
    }

    fn parse_err(s: &str) -> ParseError {
        match parse(s).unwrap_err() {
            SyntaxError::Parse(e) => e,
            SyntaxError::Extract(e) => panic!("expected parse error, got {e}"),
        }
    }

    #[test]
    fn data_block_with_args() {
        let tree = parse_ok(
            "data User {\n  username: String(min: 3, max: 50)\n  role: Enum(admin|editor|viewer)\n  bio: Text?\n}",
        );
        assert_eq!(tree.schemas.len(), 1);
        let user = &tree.schemas[0];
        assert_eq!(user.name, "User");
        assert_eq!(user.line, 1);
        assert_eq!(user.fields.len(), 3);

        let username = &user.fields[0];
        assert_eq!(username.type_name, "String");
        assert_eq!(username.number_arg("min"), Some(3.0));
        assert_eq!(username.number_arg("max"), Some(50.0));
        assert!(!username.optional);

        let role = &user.fields[1];
        assert_eq!(
            role.enum_values().unwrap(),
            &["admin".to_string(), "editor".to_string(), "viewer".to_string()]
        );

        assert!(user.fields[2].optional);
        assert!(user.fields[2].args.is_empty());
    }

    #[test]
    fn arg_values_are_coerced() {
        let tree = parse_ok(r#"data A { code: String(pattern: "^[a-z]+$", format: email, min: "2", max: -1.5) }"#);
        let f = &tree.schemas[0].fields[0];
        assert_eq!(f.args["pattern"], ArgValue::Text("^[a-z]+$".into()));
        assert_eq!(f.args["format"], ArgValue::Text("email".into()));
        assert_eq!(f.args["min"], ArgValue::Number(2.0));
        assert_eq!(f.args["max"], ArgValue::Number(-1.5));
    }

    #[test]
    fn do_block_keeps_raw_body() {
        let src = "do createUser(data, ctx) {\n  const s = \"}\";\n  return { ...data, s };\n}\ndata After { x: Int }";
        let tree = parse_ok(src);
        assert_eq!(tree.actions.len(), 1);
        let action = &tree.actions[0];
        assert_eq!(action.name, "createUser");
        assert_eq!(action.params, vec!["data", "ctx"]);
        assert_eq!(action.body, "const s = \"}\";\n  return { ...data, s };");
        assert_eq!(tree.schemas.len(), 1, "parsing resumes after the body");
        assert_eq!(tree.schemas[0].name, "After");
    }

    #[test]
    fn do_block_resyncs_when_tokens_miscount() {
        // The tokenizer treats `'}'` as a bare brace; the raw scan does not.
        let src = "do f() {\n  if (x) { return '}'; }\n  return 1;\n}\ndata After { x: Int }";
        let tree = parse_ok(src);
        assert_eq!(tree.actions[0].body, "if (x) { return '}'; }\n  return 1;");
        assert_eq!(tree.schemas[0].name, "After");
    }

    #[test]
    fn comment_opener_in_template_string_does_not_hide_later_blocks() {
        let src = "do f(input, ctx) {\n  const glob = `assets/*.png`;\n  return glob;\n}\ndata Task { title: String }\nroute { GET \"/t\" => f }";
        let tree = parse_ok(src);
        assert_eq!(tree.actions[0].body, "const glob = `assets/*.png`;\n  return glob;");
        assert_eq!(tree.schemas.len(), 1);
        assert_eq!(tree.schemas[0].name, "Task");
        assert_eq!(tree.schemas[0].line, 5);
        assert_eq!(tree.routes.len(), 1);
        assert_eq!(tree.routes[0].line, 6);
    }

    #[test]
    fn double_quote_in_single_quoted_string_does_not_hide_later_blocks() {
        let tree = parse_ok("do f() { return '\"'; } data Task { title: String }");
        assert_eq!(tree.actions[0].body, "return '\"';");
        assert_eq!(tree.schemas.len(), 1);
        assert_eq!(tree.schemas[0].fields[0].name, "title");
    }

    #[test]
    fn errors_after_a_retokenized_body_keep_their_position() {
        let err = parse("do f() { return '\"'; }\ndata Task {\n  title String\n}").unwrap_err();
        assert_eq!(err.line(), 3);
    }

    #[test]
    fn two_actions_on_one_line() {
        let tree = parse_ok("do f() { return 1; } do g() { return 2; }");
        assert_eq!(tree.actions.len(), 2);
        assert_eq!(tree.actions[1].body, "return 2;");
    }

    #[test]
    fn do_block_with_keywords_in_body() {
        let src = "do f() {\n  const route = data.do;\n  import(\"x\");\n}\nroute { GET \"/f\" => f }";
        let tree = parse_ok(src);
        assert_eq!(tree.actions.len(), 1);
        assert_eq!(tree.routes.len(), 1);
        assert!(tree.imports.is_empty());
    }

    #[test]
    fn unbalanced_body_is_fatal() {
        let err = parse("do f() {\n  if (x) {\n").unwrap_err();
        assert!(matches!(err, SyntaxError::Extract(ExtractError::UnbalancedDelimiters { line: 1, .. })));
    }

    #[test]
    fn route_block_pipelines() {
        let src = r#"route {
  POST "/users" => auth, validate(User), createUser
  GET "/users/:id" => [getUser, present]
  DELETE "/users/:id" => auth, deleteUser,
}"#;
        let tree = parse_ok(src);
        assert_eq!(tree.routes.len(), 3);
        assert_eq!(tree.routes[0].verb, HttpVerb::Post);
        assert_eq!(tree.routes[0].path, "/users");
        assert_eq!(
            tree.routes[0].pipeline,
            vec![
                PipelineStep::Auth,
                PipelineStep::Validate { schema: "User".into() },
                PipelineStep::Action { name: "createUser".into() },
            ]
        );
        assert_eq!(
            tree.routes[1].pipeline,
            vec![
                PipelineStep::Action { name: "getUser".into() },
                PipelineStep::Action { name: "present".into() },
            ]
        );
        assert_eq!(tree.routes[2].verb, HttpVerb::Delete);
        assert_eq!(tree.routes[2].line, 4);
    }

    #[test]
    fn migration_block() {
        let src = r#"migration "002_bio" {
  addColumn "User" bio Text
  dropColumn "User" legacy
  createTable "Task"
  dropTable "Old"
}"#;
        let tree = parse_ok(src);
        let m = &tree.migrations[0];
        assert_eq!(m.version, "002_bio");
        assert_eq!(
            m.operations,
            vec![
                MigrationOp::AddColumn {
                    table: "User".into(),
                    column: "bio".into(),
                    type_name: "Text".into()
                },
                MigrationOp::DropColumn {
                    table: "User".into(),
                    column: "legacy".into()
                },
                MigrationOp::CreateTable { table: "Task".into() },
                MigrationOp::DropTable { table: "Old".into() },
            ]
        );
    }

    #[test]
    fn imports_are_recorded() {
        let tree = parse_ok("import \"./models.bs\"\nimport \"/shared/auth.bs\"");
        let paths: Vec<_> = tree.imports.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["./models.bs", "/shared/auth.bs"]);
        assert_eq!(tree.imports[1].line, 2);
    }

    #[test]
    fn stray_tokens_between_blocks_are_skipped() {
        let tree = parse_ok("; hello 42 , data A { x: Int } ]] data B { y: Int }");
        assert_eq!(tree.schemas.len(), 2);
    }

    #[test]
    fn malformed_field_reports_position() {
        let err = parse_err("data User {\n  name String\n}");
        assert_eq!(err.expected, "':'");
        assert_eq!(err.found, "identifier `String`");
        assert_eq!((err.line, err.column), (2, 8));
    }

    #[test]
    fn unknown_migration_op() {
        let err = parse_err("migration \"1\" { renameTable \"A\" }");
        assert!(err.expected.contains("addColumn"));
        assert_eq!(err.found, "identifier `renameTable`");
    }

    #[test]
    fn unterminated_string_outside_body() {
        let err = parse_err("import \"./a.bs\n");
        assert_eq!(err.expected, "import path string");
        assert!(err.found.starts_with("unterminated string"));
    }

    #[test]
    fn route_requires_arrow() {
        let err = parse_err("route { GET \"/x\" handler }");
        assert_eq!(err.expected, "'=>'");
    }

    #[test]
    fn parsing_is_repeatable() {
        let src = "import \"./a.bs\"\ndata A { x: Int(min: 1) }\ndo f(a) { return a; }\nroute { GET \"/a\" => f }\nmigration \"1\" { createTable \"A\" }";
        assert_eq!(parse_ok(src), parse_ok(src));
    }
}
