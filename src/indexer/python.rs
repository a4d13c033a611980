use crate::error::N3moError;
use crate::indexer::extract::{extract_tree, ExtractedFile, Grammar, ImportInput, NodeRole};
use crate::model::SymbolKind;
use crate::tree::{SyntaxNode, TsNode};
use anyhow::Result;
use tree_sitter::Parser;

pub struct PythonExtractor {
    parser: Parser,
}

impl PythonExtractor {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let language = tree_sitter_python::LANGUAGE;
        parser.set_language(&language.into())?;
        Ok(Self { parser })
    }

    pub fn extract(&mut self, source: &str, file_path: &str) -> Result<ExtractedFile> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| N3moError::Parse(file_path.to_string()))?;
        let root = TsNode::new(tree.root_node(), source);
        Ok(extract_tree(root, file_path, &PythonGrammar))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PythonGrammar;

impl Grammar for PythonGrammar {
    fn role(&self, kind: &str) -> NodeRole {
        match kind {
            "function_definition" => NodeRole::Definition(SymbolKind::Function),
            "class_definition" => NodeRole::Definition(SymbolKind::Class),
            "call" => NodeRole::Call,
            "import_statement" | "import_from_statement" => NodeRole::Import,
            _ => NodeRole::Other,
        }
    }

    fn callee<'a, N: SyntaxNode<'a>>(&self, call: N) -> Option<&'a str> {
        call.child_by_field("function")
            .and_then(|function| function.text())
            .map(str::trim)
    }

    fn imports<'a, N: SyntaxNode<'a>>(&self, statement: N) -> Vec<ImportInput> {
        let line = statement.start_line();
        match statement.kind() {
            "import_statement" => statement
                .children_by_field("name")
                .into_iter()
                .filter_map(|item| {
                    let (module, alias) = name_and_alias(item)?;
                    Some(ImportInput {
                        module,
                        name: None,
                        alias,
                        line,
                    })
                })
                .collect(),
            "import_from_statement" => {
                let Some(module) = statement
                    .child_by_field("module_name")
                    .and_then(|node| node.text())
                    .map(squash_whitespace)
                    .filter(|module| !module.is_empty())
                else {
                    return Vec::new();
                };
                if statement
                    .children()
                    .iter()
                    .any(|child| child.kind() == "wildcard_import")
                {
                    return vec![ImportInput {
                        module,
                        name: Some("*".to_string()),
                        alias: None,
                        line,
                    }];
                }
                statement
                    .children_by_field("name")
                    .into_iter()
                    .filter_map(|item| {
                        let (name, alias) = name_and_alias(item)?;
                        Some(ImportInput {
                            module: module.clone(),
                            name: Some(name),
                            alias,
                            line,
                        })
                    })
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    fn signature<'a, N: SyntaxNode<'a>>(&self, definition: N, kind: SymbolKind, name: &str) -> String {
        match kind {
            SymbolKind::Function => {
                let is_async = definition
                    .text()
                    .is_some_and(|text| text.trim_start().starts_with("async"));
                let mut signature = if is_async {
                    format!("async def {name}")
                } else {
                    format!("def {name}")
                };
                if let Some(params) = definition.child_by_field("parameters").and_then(|p| p.text()) {
                    signature.push_str(&squash_whitespace(params));
                }
                if let Some(ret) = definition.child_by_field("return_type").and_then(|r| r.text()) {
                    signature.push_str(" -> ");
                    signature.push_str(&squash_whitespace(ret));
                }
                signature
            }
            SymbolKind::Class => {
                let bases = definition
                    .child_by_field("superclasses")
                    .and_then(|bases| bases.text())
                    .map(squash_whitespace)
                    .unwrap_or_default();
                format!("class {name}{bases}")
            }
        }
    }
}

/// `dotted_name` or `aliased_import` → (name, alias).
fn name_and_alias<'a, N: SyntaxNode<'a>>(item: N) -> Option<(String, Option<String>)> {
    if item.kind() == "aliased_import" {
        let name = item.child_by_field("name")?.text()?;
        let alias = item
            .child_by_field("alias")
            .and_then(|alias| alias.text())
            .map(str::to_string);
        return Some((squash_whitespace(name), alias));
    }
    let name = squash_whitespace(item.text()?);
    if name.is_empty() {
        return None;
    }
    Some((name, None))
}

fn squash_whitespace(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for ch in raw.trim().chars() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            if !matches!(ch, ')' | ']' | '.') && !out.ends_with(['(', '[', '.']) {
                out.push(' ');
            }
            pending_space = false;
        }
        out.push(ch);
    }
    out
}
