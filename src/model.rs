use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Class,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "function" => Some(SymbolKind::Function),
            "class" => Some(SymbolKind::Class),
            _ => None,
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub locator: String,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub id: i64,
    pub project_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    pub kind: SymbolKind,
    pub file_path: String,
    pub name: String,
    pub start_line: i64,
    pub end_line: i64,
    pub signature: String,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Import {
    pub id: i64,
    pub project_id: i64,
    pub file_path: String,
    pub module: String,
    pub name: Option<String>,
    pub alias: Option<String>,
    pub line: i64,
    pub resolved_symbol_id: Option<i64>,
}

impl Import {
    /// Identifier this import introduces into its file.
    pub fn bound_name(&self) -> &str {
        self.alias
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.module)
    }

    /// Name a definition must carry to satisfy this import.
    pub fn target_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) => name,
            None => self.module.rsplit('.').next().unwrap_or(&self.module),
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Call {
    pub id: i64,
    pub project_id: i64,
    pub source_symbol_id: i64,
    pub callee: String,
    pub line: i64,
    pub resolved_symbol_id: Option<i64>,
}

/// Unresolved call joined with the file of its calling symbol.
#[derive(Debug, Clone)]
pub struct PendingCall {
    pub id: i64,
    pub callee: String,
    pub caller_file: String,
}

/// One resolved call site, seen from the callee side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEdge {
    pub caller_id: i64,
    pub caller_name: String,
    pub caller_file: String,
    pub line: i64,
    pub callee_id: i64,
}

#[derive(Debug, Serialize, Default, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub project_id: i64,
    pub scanned: usize,
    pub indexed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub symbols: usize,
    pub imports: usize,
    pub calls: usize,
    pub resolve: Option<ResolveStats>,
    pub duration_ms: u64,
}

#[derive(Debug, Serialize, Default, Clone, PartialEq, Eq)]
pub struct ResolveStats {
    pub imports: usize,
    pub calls_exact: usize,
    pub calls_qualified: usize,
    pub calls_via_imports: usize,
    pub calls_local: usize,
}

impl ResolveStats {
    pub fn calls_total(&self) -> usize {
        self.calls_exact + self.calls_qualified + self.calls_via_imports + self.calls_local
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ProjectOverview {
    pub project: Project,
    pub files: i64,
    pub symbols: i64,
    pub imports: i64,
    pub imports_resolved: i64,
    pub calls: i64,
    pub calls_resolved: i64,
}
