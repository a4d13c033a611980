//! Read-only view over a parsed syntax tree.
//!
//! The extractor only needs kind tags, field lookup, line spans and text
//! slices, so it is written against [`SyntaxNode`] rather than a concrete
//! parser. [`TsNode`] adapts tree-sitter to that shape.

use tree_sitter::Node;

pub trait SyntaxNode<'a>: Copy {
    /// Grammar-specific node type, e.g. `function_definition`.
    fn kind(&self) -> &'a str;

    fn child_by_field(&self, field: &str) -> Option<Self>;

    /// All children stored under `field`, in source order.
    fn children_by_field(&self, field: &str) -> Vec<Self>;

    /// Named children in source order.
    fn children(&self) -> Vec<Self>;

    /// 1-based line of the first character.
    fn start_line(&self) -> i64;

    /// 1-based line of the last character.
    fn end_line(&self) -> i64;

    /// Source text covered by the node, `None` when the slice is not valid UTF-8.
    fn text(&self) -> Option<&'a str>;
}

#[derive(Debug, Clone, Copy)]
pub struct TsNode<'a> {
    node: Node<'a>,
    source: &'a str,
}

impl<'a> TsNode<'a> {
    pub fn new(node: Node<'a>, source: &'a str) -> Self {
        Self { node, source }
    }

    fn wrap(&self, node: Node<'a>) -> Self {
        Self {
            node,
            source: self.source,
        }
    }
}

impl<'a> SyntaxNode<'a> for TsNode<'a> {
    fn kind(&self) -> &'a str {
        self.node.kind()
    }

    fn child_by_field(&self, field: &str) -> Option<Self> {
        self.node
            .child_by_field_name(field)
            .map(|child| self.wrap(child))
    }

    fn children_by_field(&self, field: &str) -> Vec<Self> {
        let mut cursor = self.node.walk();
        self.node
            .children_by_field_name(field, &mut cursor)
            .map(|child| self.wrap(child))
            .collect()
    }

    fn children(&self) -> Vec<Self> {
        let mut cursor = self.node.walk();
        self.node
            .named_children(&mut cursor)
            .map(|child| self.wrap(child))
            .collect()
    }

    fn start_line(&self) -> i64 {
        self.node.start_position().row as i64 + 1
    }

    fn end_line(&self) -> i64 {
        self.node.end_position().row as i64 + 1
    }

    fn text(&self) -> Option<&'a str> {
        self.node.utf8_text(self.source.as_bytes()).ok()
    }
}
