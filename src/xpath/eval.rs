//! Expression evaluator over a [`Document`].

use crate::core::error::{XPathError, XPathResult};
use crate::core::tree::{Document, NodeId, NodeKind, QName};
use crate::core::types::{Parameters, Value};
use crate::xpath::functions;
use crate::xpath::parser::{ArithOp, Axis, CompareOp, Expr, NodeTest, PathExpr, PathStart, Step};
use crate::xpath::{XPath, MAX_DEPTH};
use std::iter;

/// A node reference. Attributes are addressed through their owner element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    /// A tree node
    Node(NodeId),
    /// The attribute at `index` on the element
    Attribute(NodeId, usize),
}

impl NodeRef {
    /// The tree node itself, or the owner element of an attribute.
    pub fn owner(self) -> NodeId {
        match self {
            NodeRef::Node(id) | NodeRef::Attribute(id, _) => id,
        }
    }
}

/// Result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum XValue {
    /// Nodes in document order without duplicates
    NodeSet(Vec<NodeRef>),
    /// Boolean
    Boolean(bool),
    /// IEEE double
    Number(f64),
    /// String
    String(String),
}

impl XValue {
    /// Type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            XValue::NodeSet(_) => "node-set",
            XValue::Boolean(_) => "boolean",
            XValue::Number(_) => "number",
            XValue::String(_) => "string",
        }
    }
}

impl From<&Value> for XValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Boolean(b) => XValue::Boolean(*b),
            Value::Integer(i) => XValue::Number(*i as f64),
            Value::Float(f) => XValue::Number(*f),
            Value::String(s) => XValue::String(s.clone()),
        }
    }
}

/// Variable bindings. Later bindings shadow earlier ones with the same name.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    bindings: Vec<(String, XValue)>,
}

impl Variables {
    /// Create an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every parameter as a variable.
    pub fn from_parameters(parameters: &Parameters) -> Self {
        Self {
            bindings: parameters
                .iter()
                .map(|(name, value)| (name.to_string(), XValue::from(value)))
                .collect(),
        }
    }

    /// Bind `name`, shadowing earlier bindings.
    pub fn push(&mut self, name: impl Into<String>, value: XValue) {
        self.bindings.push((name.into(), value));
    }

    /// Look up the innermost binding of `name`.
    pub fn get(&self, name: &str) -> Option<&XValue> {
        self.bindings.iter().rev().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Number of bindings, used as a scope mark.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check if there are no bindings.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Drop bindings made after `mark`.
    pub fn truncate(&mut self, mark: usize) {
        self.bindings.truncate(mark);
    }
}

/// Context position and size alongside the context node.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Focus {
    pub node: NodeRef,
    pub position: usize,
    pub size: usize,
}

/// Evaluates expressions against one document.
///
/// Construction indexes the document once so that document order, the
/// `following` axis and the `preceding` axis are cheap.
pub struct Evaluator<'d> {
    doc: &'d Document,
    order: Vec<NodeId>,
    ranks: Vec<usize>,
    ends: Vec<usize>,
}

impl<'d> Evaluator<'d> {
    /// Index `doc` for evaluation.
    pub fn new(doc: &'d Document) -> Self {
        let root = doc.root();
        let order: Vec<NodeId> = iter::once(root).chain(doc.descendants(root)).collect();
        let mut ranks = vec![0; doc.len()];
        for (rank, &node) in order.iter().enumerate() {
            ranks[node.index()] = rank;
        }
        // Rank of the last node in each subtree.
        let mut ends = ranks.clone();
        for &node in order.iter().rev() {
            if let Some(&last) = doc.children(node).last() {
                ends[node.index()] = ends[last.index()];
            }
        }
        Self {
            doc,
            order,
            ranks,
            ends,
        }
    }

    /// The document being evaluated.
    pub fn document(&self) -> &'d Document {
        self.doc
    }

    /// Evaluate `xpath` with `node` as the context node.
    pub fn evaluate(&self, xpath: &XPath, node: NodeRef, variables: &Variables) -> XPathResult<XValue> {
        let focus = Focus {
            node,
            position: 1,
            size: 1,
        };
        self.eval(xpath.expr(), &focus, variables, 0)
    }

    /// Evaluate `xpath` and require a node-set.
    pub fn select(&self, xpath: &XPath, node: NodeRef, variables: &Variables) -> XPathResult<Vec<NodeRef>> {
        match self.evaluate(xpath, node, variables)? {
            XValue::NodeSet(nodes) => Ok(nodes),
            other => Err(XPathError::NotANodeSet(other.type_name().to_string())),
        }
    }

    /// Evaluate `xpath` and convert the result with `boolean()`.
    pub fn test(&self, xpath: &XPath, node: NodeRef, variables: &Variables) -> XPathResult<bool> {
        Ok(self.boolean(&self.evaluate(xpath, node, variables)?))
    }

    // ========================================================================
    // Conversions
    // ========================================================================

    /// XPath `string()` conversion.
    pub fn string(&self, value: &XValue) -> String {
        match value {
            XValue::NodeSet(nodes) => nodes.first().map(|&n| self.node_string(n)).unwrap_or_default(),
            XValue::Boolean(b) => b.to_string(),
            XValue::Number(n) => number_to_string(*n),
            XValue::String(s) => s.clone(),
        }
    }

    /// XPath `number()` conversion.
    pub fn number(&self, value: &XValue) -> f64 {
        match value {
            XValue::Number(n) => *n,
            XValue::Boolean(b) => f64::from(u8::from(*b)),
            XValue::String(s) => string_to_number(s),
            XValue::NodeSet(_) => string_to_number(&self.string(value)),
        }
    }

    /// XPath `boolean()` conversion.
    pub fn boolean(&self, value: &XValue) -> bool {
        match value {
            XValue::NodeSet(nodes) => !nodes.is_empty(),
            XValue::Boolean(b) => *b,
            XValue::Number(n) => *n != 0.0 && !n.is_nan(),
            XValue::String(s) => !s.is_empty(),
        }
    }

    /// String-value of a node.
    pub fn node_string(&self, node: NodeRef) -> String {
        match node {
            NodeRef::Node(id) => self.doc.string_value(id),
            NodeRef::Attribute(id, index) => self.doc.attributes(id)[index].value.clone(),
        }
    }

    /// Expanded name of an element, attribute or processing instruction target.
    pub fn node_name(&self, node: NodeRef) -> Option<QName> {
        match node {
            NodeRef::Attribute(id, index) => Some(self.doc.attributes(id)[index].name.clone()),
            NodeRef::Node(id) => match self.doc.kind(id) {
                NodeKind::Element(e) => Some(e.name.clone()),
                NodeKind::ProcessingInstruction { target, .. } => Some(QName::local(target.as_str())),
                _ => None,
            },
        }
    }

    /// Sort nodes into document order and drop duplicates.
    pub fn sort_unique(&self, nodes: &mut Vec<NodeRef>) {
        nodes.sort_by_key(|&n| self.order_key(n));
        nodes.dedup();
    }

    /// Compare two nodes by document order.
    pub fn compare_order(&self, a: NodeRef, b: NodeRef) -> std::cmp::Ordering {
        self.order_key(a).cmp(&self.order_key(b))
    }

    fn order_key(&self, node: NodeRef) -> (usize, usize) {
        match node {
            NodeRef::Node(id) => (self.ranks[id.index()], 0),
            NodeRef::Attribute(id, index) => (self.ranks[id.index()], index + 1),
        }
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    pub(crate) fn eval(&self, expr: &Expr, focus: &Focus, vars: &Variables, depth: usize) -> XPathResult<XValue> {
        if depth > MAX_DEPTH {
            return Err(XPathError::DepthExceeded(MAX_DEPTH));
        }
        let depth = depth + 1;

        match expr {
            Expr::Or(left, right) => {
                let value = self.boolean(&self.eval(left, focus, vars, depth)?)
                    || self.boolean(&self.eval(right, focus, vars, depth)?);
                Ok(XValue::Boolean(value))
            }
            Expr::And(left, right) => {
                let value = self.boolean(&self.eval(left, focus, vars, depth)?)
                    && self.boolean(&self.eval(right, focus, vars, depth)?);
                Ok(XValue::Boolean(value))
            }
            Expr::Compare(op, left, right) => {
                let left = self.eval(left, focus, vars, depth)?;
                let right = self.eval(right, focus, vars, depth)?;
                Ok(XValue::Boolean(self.compare(*op, &left, &right)))
            }
            Expr::Arith(op, left, right) => {
                let a = self.number(&self.eval(left, focus, vars, depth)?);
                let b = self.number(&self.eval(right, focus, vars, depth)?);
                Ok(XValue::Number(match op {
                    ArithOp::Add => a + b,
                    ArithOp::Sub => a - b,
                    ArithOp::Mul => a * b,
                    ArithOp::Div => a / b,
                    ArithOp::Mod => a % b,
                }))
            }
            Expr::Negate(operand) => Ok(XValue::Number(-self.number(&self.eval(operand, focus, vars, depth)?))),
            Expr::Union(left, right) => {
                let mut nodes = self.node_set(self.eval(left, focus, vars, depth)?)?;
                nodes.extend(self.node_set(self.eval(right, focus, vars, depth)?)?);
                self.sort_unique(&mut nodes);
                Ok(XValue::NodeSet(nodes))
            }
            Expr::Path(path) => self.eval_path(path, focus, vars, depth),
            Expr::Filter(primary, predicates) => {
                let nodes = self.node_set(self.eval(primary, focus, vars, depth)?)?;
                Ok(XValue::NodeSet(self.filter(nodes, predicates, vars, depth)?))
            }
            Expr::Literal(s) => Ok(XValue::String(s.clone())),
            Expr::Number(n) => Ok(XValue::Number(*n)),
            Expr::Variable(name) => vars
                .get(name)
                .cloned()
                .ok_or_else(|| XPathError::UnboundVariable(name.clone())),
            Expr::Function(name, args) => {
                let args = args
                    .iter()
                    .map(|a| self.eval(a, focus, vars, depth))
                    .collect::<XPathResult<Vec<_>>>()?;
                functions::call(self, focus, name, args)
            }
        }
    }

    fn node_set(&self, value: XValue) -> XPathResult<Vec<NodeRef>> {
        match value {
            XValue::NodeSet(nodes) => Ok(nodes),
            other => Err(XPathError::NotANodeSet(other.type_name().to_string())),
        }
    }

    fn eval_path(&self, path: &PathExpr, focus: &Focus, vars: &Variables, depth: usize) -> XPathResult<XValue> {
        let mut current = match &path.start {
            PathStart::Root => vec![NodeRef::Node(self.doc.root())],
            PathStart::Context => vec![focus.node],
            PathStart::Expr(expr) => self.node_set(self.eval(expr, focus, vars, depth)?)?,
        };

        for step in &path.steps {
            let mut next = Vec::new();
            for &node in &current {
                next.extend(self.eval_step(step, node, vars, depth)?);
            }
            self.sort_unique(&mut next);
            current = next;
        }
        Ok(XValue::NodeSet(current))
    }

    fn eval_step(&self, step: &Step, node: NodeRef, vars: &Variables, depth: usize) -> XPathResult<Vec<NodeRef>> {
        let candidates: Vec<NodeRef> = self
            .axis(node, step.axis)
            .into_iter()
            .filter(|&n| self.matches_test(n, step.axis, &step.test))
            .collect();
        self.filter(candidates, &step.predicates, vars, depth)
    }

    /// Apply predicates in turn. Positions follow the order of `nodes`.
    fn filter(&self, mut nodes: Vec<NodeRef>, predicates: &[Expr], vars: &Variables, depth: usize) -> XPathResult<Vec<NodeRef>> {
        for predicate in predicates {
            let size = nodes.len();
            let mut kept = Vec::with_capacity(size);
            for (index, &node) in nodes.iter().enumerate() {
                let focus = Focus {
                    node,
                    position: index + 1,
                    size,
                };
                let keep = match self.eval(predicate, &focus, vars, depth)? {
                    XValue::Number(n) => n == focus.position as f64,
                    other => self.boolean(&other),
                };
                if keep {
                    kept.push(node);
                }
            }
            nodes = kept;
        }
        Ok(nodes)
    }

    /// Nodes along `axis` in axis order: reverse document order for reverse axes.
    fn axis(&self, node: NodeRef, axis: Axis) -> Vec<NodeRef> {
        let doc = self.doc;
        let nodes = |ids: &mut dyn Iterator<Item = NodeId>| ids.map(NodeRef::Node).collect::<Vec<_>>();

        match (axis, node) {
            (Axis::SelfAxis, _) => vec![node],
            (Axis::Attribute, NodeRef::Node(id)) => (0..doc.attributes(id).len())
                .map(|index| NodeRef::Attribute(id, index))
                .collect(),
            (Axis::Namespace, _) | (Axis::Attribute, NodeRef::Attribute(..)) => Vec::new(),
            (Axis::Child, NodeRef::Node(id)) => nodes(&mut doc.children(id).iter().copied()),
            (Axis::Descendant, NodeRef::Node(id)) => nodes(&mut doc.descendants(id)),
            (Axis::DescendantOrSelf, NodeRef::Node(id)) => nodes(&mut iter::once(id).chain(doc.descendants(id))),
            (Axis::Child | Axis::Descendant, NodeRef::Attribute(..)) => Vec::new(),
            (Axis::DescendantOrSelf, NodeRef::Attribute(..)) => vec![node],
            (Axis::Parent, _) => self.parent(node).map(NodeRef::Node).into_iter().collect(),
            (Axis::Ancestor, _) => nodes(&mut self.ancestors(node)),
            (Axis::AncestorOrSelf, _) => iter::once(node).chain(self.ancestors(node).map(NodeRef::Node)).collect(),
            (Axis::FollowingSibling, NodeRef::Node(id)) => match doc.parent(id) {
                Some(parent) => nodes(&mut doc.children(parent).iter().copied().skip_while(|&c| c != id).skip(1)),
                None => Vec::new(),
            },
            (Axis::PrecedingSibling, NodeRef::Node(id)) => match doc.parent(id) {
                Some(parent) => nodes(&mut doc.children(parent).iter().copied().take_while(|&c| c != id).collect::<Vec<_>>().into_iter().rev()),
                None => Vec::new(),
            },
            (Axis::FollowingSibling | Axis::PrecedingSibling, NodeRef::Attribute(..)) => Vec::new(),
            (Axis::Following, _) => {
                let from = match node {
                    NodeRef::Node(id) => self.ends[id.index()] + 1,
                    NodeRef::Attribute(id, _) => self.ranks[id.index()] + 1,
                };
                nodes(&mut self.order.iter().copied().skip(from))
            }
            (Axis::Preceding, _) => {
                let owner = node.owner();
                let rank = self.ranks[owner.index()];
                // Ancestors are the earlier nodes whose subtree reaches `owner`.
                nodes(
                    &mut self.order[..rank]
                        .iter()
                        .rev()
                        .copied()
                        .filter(|n| self.ends[n.index()] < rank),
                )
            }
        }
    }

    fn parent(&self, node: NodeRef) -> Option<NodeId> {
        match node {
            NodeRef::Node(id) => self.doc.parent(id),
            NodeRef::Attribute(id, _) => Some(id),
        }
    }

    fn ancestors(&self, node: NodeRef) -> impl Iterator<Item = NodeId> + '_ {
        iter::successors(self.parent(node), move |&id| self.doc.parent(id))
    }

    fn matches_test(&self, node: NodeRef, axis: Axis, test: &NodeTest) -> bool {
        let principal = |node: NodeRef| -> Option<QName> {
            match (axis, node) {
                (Axis::Attribute, NodeRef::Attribute(..)) => self.node_name(node),
                (Axis::Attribute, _) | (_, NodeRef::Attribute(..)) => None,
                (_, NodeRef::Node(id)) => self.doc.name(id).cloned(),
            }
        };

        match test {
            NodeTest::Node => true,
            NodeTest::Text => matches!(node, NodeRef::Node(id) if matches!(self.doc.kind(id), NodeKind::Text(_))),
            NodeTest::Comment => matches!(node, NodeRef::Node(id) if matches!(self.doc.kind(id), NodeKind::Comment(_))),
            NodeTest::ProcessingInstruction(wanted) => match node {
                NodeRef::Node(id) => match self.doc.kind(id) {
                    NodeKind::ProcessingInstruction { target, .. } => wanted.as_ref().map_or(true, |w| w == target),
                    _ => false,
                },
                NodeRef::Attribute(..) => false,
            },
            NodeTest::Wildcard => principal(node).is_some(),
            NodeTest::NamespaceWildcard(namespace) => {
                principal(node).map_or(false, |name| name.namespace.as_deref() == Some(namespace.as_str()))
            }
            NodeTest::Name { namespace, local } => {
                principal(node).map_or(false, |name| name.local == *local && name.namespace == *namespace)
            }
        }
    }

    fn compare(&self, op: CompareOp, left: &XValue, right: &XValue) -> bool {
        match (left, right) {
            (XValue::NodeSet(_), XValue::Boolean(_)) | (XValue::Boolean(_), XValue::NodeSet(_)) => self.compare_atoms(
                op,
                &XValue::Boolean(self.boolean(left)),
                &XValue::Boolean(self.boolean(right)),
            ),
            (XValue::NodeSet(a), XValue::NodeSet(b)) => {
                let right: Vec<XValue> = b.iter().map(|&n| XValue::String(self.node_string(n))).collect();
                a.iter().any(|&n| {
                    let left = XValue::String(self.node_string(n));
                    right.iter().any(|r| self.compare_atoms(op, &left, r))
                })
            }
            (XValue::NodeSet(a), other) => a
                .iter()
                .any(|&n| self.compare_atoms(op, &XValue::String(self.node_string(n)), other)),
            (other, XValue::NodeSet(b)) => b
                .iter()
                .any(|&n| self.compare_atoms(op, other, &XValue::String(self.node_string(n)))),
            _ => self.compare_atoms(op, left, right),
        }
    }

    fn compare_atoms(&self, op: CompareOp, left: &XValue, right: &XValue) -> bool {
        let either = |f: fn(&XValue) -> bool| f(left) || f(right);
        match op {
            CompareOp::Eq | CompareOp::Ne => {
                let equal = if either(|v| matches!(v, XValue::Boolean(_))) {
                    self.boolean(left) == self.boolean(right)
                } else if either(|v| matches!(v, XValue::Number(_))) {
                    self.number(left) == self.number(right)
                } else {
                    self.string(left) == self.string(right)
                };
                (op == CompareOp::Eq) == equal
            }
            _ => {
                let (a, b) = (self.number(left), self.number(right));
                match op {
                    CompareOp::Lt => a < b,
                    CompareOp::Le => a <= b,
                    CompareOp::Gt => a > b,
                    _ => a >= b,
                }
            }
        }
    }
}

/// XPath number-to-string conversion.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// XPath string-to-number conversion: optional minus, digits, one optional dot.
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim_matches(|c| matches!(c, ' ' | '\t' | '\r' | '\n'));
    let body = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let well_formed = body.chars().any(|c| c.is_ascii_digit())
        && body.chars().all(|c| c.is_ascii_digit() || c == '.')
        && body.matches('.').count() <= 1;
    if well_formed {
        trimmed.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Dialect;
    use crate::xpath::StaticContext;

    const DOC: &str = r#"<library xmlns:x="urn:x">
  <book id="b1" year="1999"><title>Alpha</title><price>10</price></book>
  <book id="b2" year="2005"><title>Beta</title><price>25.5</price><!--note--></book>
  <x:book id="b3"><title>Gamma</title></x:book>
</library>"#;

    fn eval_on(doc: &Document, expr: &str) -> XValue {
        let mut context = StaticContext::new(Dialect::Legacy);
        context.declare("x", "urn:x");
        let xpath = XPath::compile(expr, &context).unwrap();
        let evaluator = Evaluator::new(doc);
        evaluator
            .evaluate(&xpath, NodeRef::Node(doc.root()), &Variables::new())
            .unwrap()
    }

    fn doc() -> Document {
        Document::parse(DOC, None).unwrap()
    }

    fn strings(doc: &Document, expr: &str) -> Vec<String> {
        let evaluator = Evaluator::new(doc);
        match eval_on(doc, expr) {
            XValue::NodeSet(nodes) => nodes.into_iter().map(|n| evaluator.node_string(n)).collect(),
            other => panic!("expected node-set, got {:?}", other),
        }
    }

    #[test]
    fn test_location_paths() {
        let doc = doc();
        assert_eq!(strings(&doc, "//book/title"), vec!["Alpha", "Beta"]);
        assert_eq!(strings(&doc, "//x:book/title"), vec!["Gamma"]);
        assert_eq!(strings(&doc, "/library/*/@id"), vec!["b1", "b2", "b3"]);
        assert_eq!(strings(&doc, "//book[2]/title"), vec!["Beta"]);
        assert_eq!(strings(&doc, "//title[. = 'Beta']/../@id"), vec!["b2"]);
        assert_eq!(strings(&doc, "//book[last()]/@year"), vec!["2005"]);
    }

    #[test]
    fn test_reverse_axes_and_document_order() {
        let doc = doc();
        assert_eq!(strings(&doc, "//price/preceding-sibling::*[1]"), vec!["Alpha", "Beta"]);
        assert_eq!(strings(&doc, "(//title)[3]/ancestor::*[1]/@id"), vec!["b3"]);
        assert_eq!(strings(&doc, "//book[1]/following::title"), vec!["Beta", "Gamma"]);
        assert_eq!(strings(&doc, "//x:book/preceding::title"), vec!["Alpha", "Beta"]);
        assert_eq!(strings(&doc, "//book[1]/@id/following::title[1]"), vec!["Alpha"]);
    }

    #[test]
    fn test_comparisons() {
        let doc = doc();
        assert_eq!(eval_on(&doc, "//price > 20"), XValue::Boolean(true));
        assert_eq!(eval_on(&doc, "//price > 30"), XValue::Boolean(false));
        assert_eq!(eval_on(&doc, "//title = 'Gamma'"), XValue::Boolean(true));
        assert_eq!(eval_on(&doc, "//title != 'Gamma'"), XValue::Boolean(true));
        assert_eq!(eval_on(&doc, "//missing = //missing"), XValue::Boolean(false));
        assert_eq!(eval_on(&doc, "//missing = false()"), XValue::Boolean(true));
        assert_eq!(eval_on(&doc, "'1.0' = 1"), XValue::Boolean(true));
        assert_eq!(eval_on(&doc, "true() = 'x'"), XValue::Boolean(true));
    }

    #[test]
    fn test_arithmetic() {
        let doc = doc();
        assert_eq!(eval_on(&doc, "7 mod 3 + 10 div 4"), XValue::Number(3.5));
        assert_eq!(eval_on(&doc, "-(2 * 3)"), XValue::Number(-6.0));
        assert_eq!(eval_on(&doc, "sum(//price)"), XValue::Number(35.5));
        assert!(matches!(eval_on(&doc, "'abc' + 1"), XValue::Number(n) if n.is_nan()));
    }

    #[test]
    fn test_unbound_variable() {
        let doc = doc();
        let xpath = XPath::compile("$missing", &StaticContext::new(Dialect::Legacy)).unwrap();
        let err = Evaluator::new(&doc)
            .evaluate(&xpath, NodeRef::Node(doc.root()), &Variables::new())
            .unwrap_err();
        assert_eq!(err, XPathError::UnboundVariable("missing".to_string()));
    }

    #[test]
    fn test_variable_shadowing() {
        let mut vars = Variables::from_parameters(&Parameters::new().with("limit", 3i64));
        let mark = vars.len();
        vars.push("limit", XValue::Number(5.0));
        assert_eq!(vars.get("limit"), Some(&XValue::Number(5.0)));
        vars.truncate(mark);
        assert_eq!(vars.get("limit"), Some(&XValue::Number(3.0)));
    }

    #[test]
    fn test_number_conversions() {
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(2.5), "2.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(string_to_number(" 12 "), 12.0);
        assert_eq!(string_to_number("-.5"), -0.5);
        assert!(string_to_number("1e3").is_nan());
        assert!(string_to_number("").is_nan());
        assert!(string_to_number(".").is_nan());
    }
}
