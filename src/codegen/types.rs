//! Type-declaration artifact: one interface per schema for external tooling.

use super::validate::ValueKind;
use super::writer::{js_string, CodeWriter};
use super::GENERATED_HEADER;
use crate::dsl::ast::{FieldDecl, SchemaDecl, SyntaxTree, PRIMARY_KEY};

pub fn emit_type_declarations(tree: &SyntaxTree) -> String {
    let mut w = CodeWriter::new();
    w.line(GENERATED_HEADER);

    for schema in &tree.schemas {
        w.blank();
        render_interface(schema, tree, &mut w);
    }

    if !tree.schemas.is_empty() {
        w.blank();
        let names: Vec<String> = tree.schemas.iter().map(|s| js_string(&s.name)).collect();
        w.line(format!("export type SchemaName = {};", names.join(" | ")));
    }

    w.finish()
}

fn render_interface(schema: &SchemaDecl, tree: &SyntaxTree, w: &mut CodeWriter) {
    w.open(format!("export interface {} {{", schema.name));
    w.line(format!("{PRIMARY_KEY}: number;"));
    for field in schema.data_columns() {
        let ty = ts_type(field, tree);
        if field.optional {
            w.line(format!("{}?: {ty} | null;", property_name(&field.name)));
        } else {
            w.line(format!("{}: {ty};", property_name(&field.name)));
        }
    }
    w.close("}");
}

fn ts_type(field: &FieldDecl, tree: &SyntaxTree) -> String {
    if let Some(values) = field.enum_values() {
        let literals: Vec<String> = values.iter().map(|v| js_string(v)).collect();
        return literals.join(" | ");
    }
    match ValueKind::of(field) {
        ValueKind::Text => "string".to_string(),
        ValueKind::Integer | ValueKind::Number => "number".to_string(),
        ValueKind::Boolean => "boolean".to_string(),
        ValueKind::Passthrough if tree.schema(&field.type_name).is_some() => field.type_name.clone(),
        ValueKind::Passthrough => "unknown".to_string(),
    }
}

fn property_name(name: &str) -> String {
    let plain = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if plain {
        name.to_string()
    } else {
        js_string(name)
    }
}
