//! Expression evaluation against a data snapshot
//!
//! Selection is lazy: each step expands the children of one context node
//! at a time, so abandoning a selection early skips the rest of the walk.

use std::sync::Arc;

use crate::data::{DataNode, ScalarValue};
use crate::path::DataPath;
use crate::query::ast::{CompareOp, Expression, Function, LocationPath, NodeTest, Step};
use crate::schema::Schema;

/// One selected node and the path that reaches it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryMatch {
    pub path: DataPath,
    pub node: Arc<DataNode>,
}

/// Narrows what a selection can see
///
/// `admit_entry` is asked for every list entry a step expands, predicate
/// paths included, so a refused entry is invisible to the whole
/// expression. `admit_match` is asked once per result.
pub trait SelectionFilter: Send + Sync {
    fn admit_entry(&self, path: &DataPath, entry: &Arc<DataNode>) -> bool;

    fn admit_match(&self, _path: &DataPath, _node: &Arc<DataNode>) -> bool {
        true
    }
}

impl Expression {
    /// Lazily select the nodes this expression addresses
    ///
    /// Non-path expressions select nothing. Relative paths start at the root.
    pub fn select(&self, schema: Arc<Schema>, root: Arc<DataNode>) -> NodeSelection {
        let (path, stack) = match self.as_path() {
            Some(path) => (
                path.clone(),
                vec![Frame {
                    depth: 0,
                    path: DataPath::root(),
                    node: Arc::clone(&root),
                }],
            ),
            None => (
                LocationPath {
                    absolute: true,
                    steps: Vec::new(),
                },
                Vec::new(),
            ),
        };
        NodeSelection {
            schema,
            root,
            path,
            stack,
            filter: None,
        }
    }
}

struct Frame {
    depth: usize,
    path: DataPath,
    node: Arc<DataNode>,
}

/// Depth-first iterator over the matches of a location path
pub struct NodeSelection {
    schema: Arc<Schema>,
    root: Arc<DataNode>,
    path: LocationPath,
    stack: Vec<Frame>,
    filter: Option<Arc<dyn SelectionFilter>>,
}

impl NodeSelection {
    /// Selection that yields nothing
    pub fn empty(schema: Arc<Schema>, root: Arc<DataNode>) -> Self {
        Self {
            schema,
            root,
            path: LocationPath {
                absolute: true,
                steps: Vec::new(),
            },
            stack: Vec::new(),
            filter: None,
        }
    }

    /// Hide entries and matches refused by `filter`
    pub fn with_filter(mut self, filter: Arc<dyn SelectionFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Snapshot this selection reads from
    pub fn root(&self) -> &Arc<DataNode> {
        &self.root
    }

    fn evaluator(&self) -> Evaluator<'_> {
        Evaluator {
            schema: &self.schema,
            root: &self.root,
            filter: self.filter.as_deref(),
        }
    }

    fn admits(&self, path: &DataPath, node: &Arc<DataNode>) -> bool {
        self.filter.as_ref().map_or(true, |f| f.admit_match(path, node))
    }
}

impl Iterator for NodeSelection {
    type Item = QueryMatch;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(frame) = self.stack.pop() {
            if frame.depth == self.path.steps.len() {
                if !self.admits(&frame.path, &frame.node) {
                    continue;
                }
                return Some(QueryMatch {
                    path: frame.path,
                    node: frame.node,
                });
            }
            let step = &self.path.steps[frame.depth];
            let selected = self.evaluator().step(&frame.path, &frame.node, step);
            for (path, node) in selected.into_iter().rev() {
                self.stack.push(Frame {
                    depth: frame.depth + 1,
                    path,
                    node,
                });
            }
        }
        None
    }
}

/// Where an expanded node sits relative to its context node
enum Origin {
    Same,
    Child(String),
    /// Entry of list `.0` with key value `.1`
    Entry(String, String),
}

fn expand(node: &Arc<DataNode>, test: &NodeTest) -> Vec<(Origin, Arc<DataNode>)> {
    match test {
        NodeTest::SelfNode => vec![(Origin::Same, Arc::clone(node))],
        NodeTest::Name(name) => match node.child(name) {
            Some(child) => expand_child(name, child),
            None => Vec::new(),
        },
        NodeTest::Wildcard => match node.as_ref() {
            DataNode::Container(children) => children
                .iter()
                .flat_map(|(name, child)| expand_child(name, child))
                .collect(),
            _ => Vec::new(),
        },
    }
}

/// Lists expand to their entries; everything else to itself
fn expand_child(name: &str, child: &Arc<DataNode>) -> Vec<(Origin, Arc<DataNode>)> {
    match child.as_ref() {
        DataNode::List(entries) => entries
            .iter()
            .map(|(key, entry)| (Origin::Entry(name.to_string(), key.clone()), Arc::clone(entry)))
            .collect(),
        _ => vec![(Origin::Child(name.to_string()), Arc::clone(child))],
    }
}

enum Value {
    Nodes(Vec<Arc<DataNode>>),
    Scalar(ScalarValue),
    Bool(bool),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Nodes(nodes) => !nodes.is_empty(),
            Value::Scalar(v) => v.truthy(),
            Value::Bool(b) => *b,
        }
    }

    fn strings(&self) -> Vec<String> {
        match self {
            Value::Nodes(nodes) => nodes
                .iter()
                .flat_map(|n| match n.as_ref() {
                    DataNode::Scalar(v) => vec![v.canonical()],
                    DataNode::LeafList(values) => values.iter().map(ScalarValue::canonical).collect(),
                    _ => Vec::new(),
                })
                .collect(),
            Value::Scalar(v) => vec![v.canonical()],
            Value::Bool(b) => vec![b.to_string()],
        }
    }

    fn first_string(&self) -> String {
        self.strings().into_iter().next().unwrap_or_default()
    }
}

/// A node together with the path that reaches it
type Located = (DataPath, Arc<DataNode>);

struct Evaluator<'a> {
    schema: &'a Schema,
    root: &'a Arc<DataNode>,
    filter: Option<&'a dyn SelectionFilter>,
}

impl Evaluator<'_> {
    /// Nodes one step reaches from a context node, predicates applied
    fn step(&self, path: &DataPath, node: &Arc<DataNode>, step: &Step) -> Vec<Located> {
        let candidates: Vec<Located> = expand(node, &step.test)
            .into_iter()
            .filter_map(|(origin, child)| {
                let child_path = match origin {
                    Origin::Same => path.clone(),
                    Origin::Child(name) => path.child(name),
                    Origin::Entry(list, key) => {
                        let entry_path = path.entry(&list, self.key_leaf(path, &list), key);
                        if !self.filter.map_or(true, |f| f.admit_entry(&entry_path, &child)) {
                            return None;
                        }
                        entry_path
                    }
                };
                Some((child_path, child))
            })
            .collect();
        self.apply_predicates(candidates, &step.predicates)
    }

    fn key_leaf(&self, parent: &DataPath, list: &str) -> String {
        self.schema
            .lookup(&parent.child(list))
            .ok()
            .and_then(|node| node.key.clone())
            .unwrap_or_else(|| "key".to_string())
    }

    /// Apply predicates in order; positions count within the survivors of
    /// the previous predicate
    fn apply_predicates(&self, mut candidates: Vec<Located>, predicates: &[Expression]) -> Vec<Located> {
        for predicate in predicates {
            candidates = candidates
                .into_iter()
                .enumerate()
                .filter(|(i, (path, node))| self.matches(predicate, path, node, i + 1))
                .map(|(_, c)| c)
                .collect();
        }
        candidates
    }

    fn matches(&self, predicate: &Expression, path: &DataPath, node: &Arc<DataNode>, position: usize) -> bool {
        match self.eval(predicate, path, node) {
            Value::Scalar(ScalarValue::Int(n)) => usize::try_from(n).is_ok_and(|n| n == position),
            Value::Scalar(ScalarValue::Uint(n)) => usize::try_from(n).is_ok_and(|n| n == position),
            other => other.truthy(),
        }
    }

    fn eval(&self, expr: &Expression, path: &DataPath, context: &Arc<DataNode>) -> Value {
        match expr {
            Expression::Path(location) => Value::Nodes(self.select_nodes(location, path, context)),
            Expression::Literal(v) => Value::Scalar(v.clone()),
            Expression::Variable { value, .. } => self.eval(value, path, context),
            Expression::FunctionCall { function, args } => self.call(*function, args, path, context),
            Expression::Compare { op, lhs, rhs } => {
                let lhs = self.eval(lhs, path, context);
                let rhs = self.eval(rhs, path, context);
                Value::Bool(compare(*op, &lhs, &rhs))
            }
        }
    }

    fn call(&self, function: Function, args: &[Expression], path: &DataPath, context: &Arc<DataNode>) -> Value {
        let values: Vec<Value> = args.iter().map(|a| self.eval(a, path, context)).collect();
        let arg = |i: usize| values.get(i);
        let string = |i: usize| arg(i).map(Value::first_string).unwrap_or_default();
        match function {
            Function::StartsWith => Value::Bool(string(0).starts_with(&string(1))),
            Function::Contains => Value::Bool(string(0).contains(&string(1))),
            Function::Not => Value::Bool(!arg(0).is_some_and(Value::truthy)),
            Function::Count => {
                let count = match arg(0) {
                    Some(Value::Nodes(nodes)) => nodes
                        .iter()
                        .map(|n| match n.as_ref() {
                            DataNode::LeafList(values) => values.len(),
                            _ => 1,
                        })
                        .sum(),
                    Some(_) => 1,
                    None => 0,
                };
                Value::Scalar(ScalarValue::Uint(count as u64))
            }
            Function::String => Value::Scalar(ScalarValue::String(string(0))),
        }
    }

    fn select_nodes(&self, location: &LocationPath, path: &DataPath, context: &Arc<DataNode>) -> Vec<Arc<DataNode>> {
        let mut frontier: Vec<Located> = if location.absolute {
            vec![(DataPath::root(), Arc::clone(self.root))]
        } else {
            vec![(path.clone(), Arc::clone(context))]
        };
        for step in &location.steps {
            frontier = frontier
                .iter()
                .flat_map(|(path, node)| self.step(path, node, step))
                .collect();
        }
        frontier.into_iter().map(|(_, node)| node).collect()
    }
}

fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> bool {
    let equal_any = || {
        let rights = rhs.strings();
        lhs.strings().iter().any(|l| rights.iter().any(|r| l == r))
    };
    let differ_any = || {
        let rights = rhs.strings();
        lhs.strings().iter().any(|l| rights.iter().any(|r| l != r))
    };
    match (lhs, rhs) {
        (Value::Bool(b), other) | (other, Value::Bool(b)) => match op {
            CompareOp::Eq => *b == other.truthy(),
            CompareOp::NotEq => *b != other.truthy(),
        },
        _ => match op {
            CompareOp::Eq => equal_any(),
            CompareOp::NotEq => differ_any(),
        },
    }
}
