use n3mo::indexer::extract::{ANONYMOUS, TempId};
use n3mo::indexer::python::PythonExtractor;
use n3mo::model::SymbolKind;

#[test]
fn extract_scopes_imports_and_calls() {
    let source = r#"
"""module doc"""
import os, sys as system
from pkg import mod, util as u
from . import sibling

class Base:
    pass

class Foo(Base):
    def method(self, x):
        return u.transform(x)

def func(a, b):
    def local():
        return os.path.join(a, b)
    return local()

func(1, 2)
"#;
    let mut extractor = PythonExtractor::new().unwrap();
    let extracted = extractor.extract(source, "pkg/mod.py").unwrap();
    assert_eq!(extracted.file_path, "pkg/mod.py");

    let names: Vec<_> = extracted
        .symbols
        .iter()
        .map(|s| (s.kind, s.name.as_str(), s.parent))
        .collect();
    assert_eq!(
        names,
        vec![
            (SymbolKind::Class, "Base", None),
            (SymbolKind::Class, "Foo", None),
            (SymbolKind::Function, "method", Some(TempId(1))),
            (SymbolKind::Function, "func", None),
            (SymbolKind::Function, "local", Some(TempId(3))),
        ]
    );
    assert_eq!(extracted.symbols[1].signature, "class Foo(Base)");
    assert_eq!(extracted.symbols[3].signature, "def func(a, b)");

    let imports: Vec<_> = extracted
        .imports
        .iter()
        .map(|i| (i.module.as_str(), i.name.as_deref(), i.alias.as_deref(), i.line))
        .collect();
    assert_eq!(
        imports,
        vec![
            ("os", None, None, 3),
            ("sys", None, Some("system"), 3),
            ("pkg", Some("mod"), None, 4),
            ("pkg", Some("util"), Some("u"), 4),
            (".", Some("sibling"), None, 5),
        ]
    );

    let calls: Vec<_> = extracted
        .calls
        .iter()
        .map(|c| (c.callee.as_str(), extracted.symbol(c.source).unwrap().name.as_str(), c.line))
        .collect();
    assert_eq!(
        calls,
        vec![
            ("u.transform", "method", 12),
            ("os.path.join", "local", 16),
            ("local", "func", 17),
        ]
    );
}

#[test]
fn parent_spans_enclose_children() {
    let source = r#"
class Outer:
    class Inner:
        def deep(self):
            pass

    def after(self):
        pass
"#;
    let mut extractor = PythonExtractor::new().unwrap();
    let extracted = extractor.extract(source, "a.py").unwrap();
    assert_eq!(extracted.symbols.len(), 4);
    for symbol in &extracted.symbols {
        if let Some(parent) = symbol.parent {
            let parent = extracted.symbol(parent).unwrap();
            assert!(parent.start_line <= symbol.start_line);
            assert!(parent.end_line >= symbol.end_line);
        }
    }
    let after = &extracted.symbols[3];
    assert_eq!(after.name, "after");
    assert_eq!(after.parent, Some(TempId(0)));
}

#[test]
fn broken_source_still_yields_definitions() {
    let source = "def ok():\n    work()\n\ndef broken(:\n";
    let mut extractor = PythonExtractor::new().unwrap();
    let extracted = extractor.extract(source, "broken.py").unwrap();
    assert!(extracted.symbols.iter().any(|s| s.name == "ok"));
    assert!(extracted.symbols.iter().all(|s| !s.name.is_empty()));
    assert!(
        extracted
            .symbols
            .iter()
            .all(|s| s.name == "ok" || s.name == "broken" || s.name == ANONYMOUS)
    );
}

#[test]
fn extractor_is_reusable_across_files() {
    let mut extractor = PythonExtractor::new().unwrap();
    let first = extractor.extract("def a():\n    b()\n", "a.py").unwrap();
    let second = extractor.extract("def c():\n    pass\n", "c.py").unwrap();
    assert_eq!(first.calls.len(), 1);
    assert_eq!(second.symbols[0].name, "c");
    assert_eq!(second.symbols[0].temp_id, TempId(0));
    assert!(second.calls.is_empty());
}
