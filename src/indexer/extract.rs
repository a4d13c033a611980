use crate::model::SymbolKind;
use crate::tree::SyntaxNode;

/// Name recorded for definitions whose name field is missing or unreadable.
pub const ANONYMOUS: &str = "<anonymous>";

/// File-local symbol identifier, valid only until the file is persisted.
///
/// Ids are handed out densely in emission order, so they double as indexes
/// into [`ExtractedFile::symbols`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TempId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolInput {
    pub temp_id: TempId,
    pub parent: Option<TempId>,
    pub kind: SymbolKind,
    pub name: String,
    pub start_line: i64,
    pub end_line: i64,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportInput {
    pub module: String,
    pub name: Option<String>,
    pub alias: Option<String>,
    pub line: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallInput {
    pub source: TempId,
    pub callee: String,
    pub line: i64,
}

#[derive(Debug, Default, Clone)]
pub struct ExtractedFile {
    pub file_path: String,
    pub symbols: Vec<SymbolInput>,
    pub imports: Vec<ImportInput>,
    pub calls: Vec<CallInput>,
}

impl ExtractedFile {
    pub fn new(file_path: &str) -> Self {
        Self {
            file_path: file_path.to_string(),
            ..Default::default()
        }
    }

    pub fn symbol(&self, id: TempId) -> Option<&SymbolInput> {
        self.symbols.get(id.0)
    }
}

/// What the walker should do with a node of a given kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Definition(SymbolKind),
    Call,
    Import,
    Other,
}

/// Grammar-specific knowledge the generic walker delegates to.
pub trait Grammar {
    fn role(&self, kind: &str) -> NodeRole;

    /// Raw callee text of a call node, unmodified.
    fn callee<'a, N: SyntaxNode<'a>>(&self, call: N) -> Option<&'a str>;

    /// One binding per imported name.
    fn imports<'a, N: SyntaxNode<'a>>(&self, statement: N) -> Vec<ImportInput>;

    fn signature<'a, N: SyntaxNode<'a>>(&self, definition: N, kind: SymbolKind, name: &str) -> String;
}

/// Walk one file's tree and collect its definitions, imports and calls.
///
/// The descent is pre-order over an explicit stack of `(node, scope)` pairs,
/// so parents are always emitted before their children and arbitrarily deep
/// nesting cannot overflow the call stack.
pub fn extract_tree<'a, N, G>(root: N, file_path: &str, grammar: &G) -> ExtractedFile
where
    N: SyntaxNode<'a>,
    G: Grammar,
{
    let mut output = ExtractedFile::new(file_path);
    let mut stack: Vec<(N, Option<TempId>)> = vec![(root, None)];

    while let Some((node, scope)) = stack.pop() {
        let mut child_scope = scope;
        match grammar.role(node.kind()) {
            NodeRole::Definition(kind) => {
                let name = node
                    .child_by_field("name")
                    .and_then(|name| name.text())
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .unwrap_or(ANONYMOUS);
                let temp_id = TempId(output.symbols.len());
                output.symbols.push(SymbolInput {
                    temp_id,
                    parent: scope,
                    kind,
                    name: name.to_string(),
                    start_line: node.start_line(),
                    end_line: node.end_line(),
                    signature: grammar.signature(node, kind, name),
                });
                child_scope = Some(temp_id);
            }
            NodeRole::Call => {
                // module-level calls have nobody to attribute impact to
                if let Some(source) = scope {
                    if let Some(callee) = grammar.callee(node).filter(|c| !c.is_empty()) {
                        output.calls.push(CallInput {
                            source,
                            callee: callee.to_string(),
                            line: node.start_line(),
                        });
                    }
                }
            }
            NodeRole::Import => output.imports.extend(grammar.imports(node)),
            NodeRole::Other => {}
        }

        let children = node.children();
        for child in children.into_iter().rev() {
            stack.push((child, child_scope));
        }
    }

    output
}
