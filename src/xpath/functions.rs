//! Function library.
//!
//! The XPath 1.0 core library is available to both dialects. A handful of
//! XPath 2.0 functions are only available to modern programs.

use crate::core::error::{XPathError, XPathResult};
use crate::core::tree::XML_NS;
use crate::pipeline::Dialect;
use crate::xpath::eval::{string_to_number, Evaluator, Focus, NodeRef, XValue};

/// Signature shared by every builtin.
type BuiltinFunction = fn(&Evaluator<'_>, &Focus, Vec<XValue>) -> XPathResult<XValue>;

struct Builtin {
    name: &'static str,
    min: usize,
    max: Option<usize>,
    modern_only: bool,
    func: BuiltinFunction,
}

const fn xpath1(name: &'static str, min: usize, max: Option<usize>, func: BuiltinFunction) -> Builtin {
    Builtin {
        name,
        min,
        max,
        modern_only: false,
        func,
    }
}

const fn xpath2(name: &'static str, min: usize, max: Option<usize>, func: BuiltinFunction) -> Builtin {
    Builtin {
        name,
        min,
        max,
        modern_only: true,
        func,
    }
}

static BUILTINS: &[Builtin] = &[
    // node-set
    xpath1("last", 0, Some(0), last),
    xpath1("position", 0, Some(0), position),
    xpath1("count", 1, Some(1), count),
    xpath1("id", 1, Some(1), id),
    xpath1("local-name", 0, Some(1), local_name),
    xpath1("namespace-uri", 0, Some(1), namespace_uri),
    xpath1("name", 0, Some(1), name),
    // string
    xpath1("string", 0, Some(1), string),
    xpath1("concat", 2, None, concat),
    xpath1("starts-with", 2, Some(2), starts_with),
    xpath1("contains", 2, Some(2), contains),
    xpath1("substring-before", 2, Some(2), substring_before),
    xpath1("substring-after", 2, Some(2), substring_after),
    xpath1("substring", 2, Some(3), substring),
    xpath1("string-length", 0, Some(1), string_length),
    xpath1("normalize-space", 0, Some(1), normalize_space),
    xpath1("translate", 3, Some(3), translate),
    // boolean
    xpath1("boolean", 1, Some(1), boolean),
    xpath1("not", 1, Some(1), not),
    xpath1("true", 0, Some(0), true_fn),
    xpath1("false", 0, Some(0), false_fn),
    xpath1("lang", 1, Some(1), lang),
    // number
    xpath1("number", 0, Some(1), number),
    xpath1("sum", 1, Some(1), sum),
    xpath1("floor", 1, Some(1), floor),
    xpath1("ceiling", 1, Some(1), ceiling),
    xpath1("round", 1, Some(1), round),
    // modern dialect
    xpath2("exists", 1, Some(1), exists),
    xpath2("empty", 1, Some(1), empty),
    xpath2("ends-with", 2, Some(2), ends_with),
    xpath2("upper-case", 1, Some(1), upper_case),
    xpath2("lower-case", 1, Some(1), lower_case),
    xpath2("string-join", 1, Some(2), string_join),
];

fn lookup(name: &str, dialect: Dialect) -> Option<&'static Builtin> {
    BUILTINS
        .iter()
        .find(|b| b.name == name && (!b.modern_only || dialect == Dialect::Modern))
}

/// Whether `name` can be called from programs of `dialect`.
pub fn is_available(name: &str, dialect: Dialect) -> bool {
    lookup(name, dialect).is_some()
}

/// Names available to `dialect`, in library order.
pub fn function_names(dialect: Dialect) -> impl Iterator<Item = &'static str> {
    BUILTINS
        .iter()
        .filter(move |b| !b.modern_only || dialect == Dialect::Modern)
        .map(|b| b.name)
}

/// Check that `name` exists for `dialect` and accepts `argc` arguments.
pub fn check_call(name: &str, argc: usize, dialect: Dialect) -> XPathResult<()> {
    let builtin = lookup(name, dialect).ok_or_else(|| XPathError::UnknownFunction(name.to_string()))?;
    let fits = argc >= builtin.min && builtin.max.map_or(true, |max| argc <= max);
    if fits {
        return Ok(());
    }
    let expected = match builtin.max {
        Some(max) if max == builtin.min => max.to_string(),
        Some(max) => format!("{} to {}", builtin.min, max),
        None => format!("at least {}", builtin.min),
    };
    Err(XPathError::Arity {
        name: name.to_string(),
        expected,
        got: argc,
    })
}

/// Call a builtin. Names and arities were checked when the expression was parsed.
pub(crate) fn call(evaluator: &Evaluator<'_>, focus: &Focus, name: &str, args: Vec<XValue>) -> XPathResult<XValue> {
    let builtin = BUILTINS
        .iter()
        .find(|b| b.name == name)
        .ok_or_else(|| XPathError::UnknownFunction(name.to_string()))?;
    (builtin.func)(evaluator, focus, args)
}

// ============================================================================
// Helpers
// ============================================================================

fn nodes(value: &XValue) -> XPathResult<&[NodeRef]> {
    match value {
        XValue::NodeSet(nodes) => Ok(nodes),
        other => Err(XPathError::NotANodeSet(other.type_name().to_string())),
    }
}

/// The string argument at `index`, or the context node's string-value.
fn string_arg(evaluator: &Evaluator<'_>, focus: &Focus, args: &[XValue], index: usize) -> String {
    match args.get(index) {
        Some(value) => evaluator.string(value),
        None => evaluator.node_string(focus.node),
    }
}

/// The first node of the optional node-set argument, or the context node.
fn node_arg(focus: &Focus, args: &[XValue]) -> XPathResult<Option<NodeRef>> {
    match args.first() {
        Some(value) => Ok(nodes(value)?.first().copied()),
        None => Ok(Some(focus.node)),
    }
}

// ============================================================================
// Node-set functions
// ============================================================================

fn last(_: &Evaluator<'_>, focus: &Focus, _: Vec<XValue>) -> XPathResult<XValue> {
    Ok(XValue::Number(focus.size as f64))
}

fn position(_: &Evaluator<'_>, focus: &Focus, _: Vec<XValue>) -> XPathResult<XValue> {
    Ok(XValue::Number(focus.position as f64))
}

fn count(_: &Evaluator<'_>, _: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    Ok(XValue::Number(nodes(&args[0])?.len() as f64))
}

fn id(evaluator: &Evaluator<'_>, _: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    let text = match &args[0] {
        XValue::NodeSet(nodes) => nodes
            .iter()
            .map(|&n| evaluator.node_string(n))
            .collect::<Vec<_>>()
            .join(" "),
        other => evaluator.string(other),
    };
    let doc = evaluator.document();
    let mut found: Vec<NodeRef> = text
        .split_whitespace()
        .filter_map(|token| doc.element_by_id(token))
        .map(NodeRef::Node)
        .collect();
    evaluator.sort_unique(&mut found);
    Ok(XValue::NodeSet(found))
}

fn local_name(evaluator: &Evaluator<'_>, focus: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    let name = node_arg(focus, &args)?.and_then(|n| evaluator.node_name(n));
    Ok(XValue::String(name.map(|q| q.local).unwrap_or_default()))
}

fn namespace_uri(evaluator: &Evaluator<'_>, focus: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    let name = node_arg(focus, &args)?.and_then(|n| evaluator.node_name(n));
    Ok(XValue::String(name.and_then(|q| q.namespace).unwrap_or_default()))
}

fn name(evaluator: &Evaluator<'_>, focus: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    let name = node_arg(focus, &args)?.and_then(|n| evaluator.node_name(n));
    Ok(XValue::String(name.map(|q| q.qualified()).unwrap_or_default()))
}

// ============================================================================
// String functions
// ============================================================================

fn string(evaluator: &Evaluator<'_>, focus: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    Ok(XValue::String(string_arg(evaluator, focus, &args, 0)))
}

fn concat(evaluator: &Evaluator<'_>, _: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    Ok(XValue::String(args.iter().map(|a| evaluator.string(a)).collect()))
}

fn starts_with(evaluator: &Evaluator<'_>, _: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    let (s, prefix) = (evaluator.string(&args[0]), evaluator.string(&args[1]));
    Ok(XValue::Boolean(s.starts_with(&prefix)))
}

fn contains(evaluator: &Evaluator<'_>, _: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    let (s, needle) = (evaluator.string(&args[0]), evaluator.string(&args[1]));
    Ok(XValue::Boolean(s.contains(&needle)))
}

fn substring_before(evaluator: &Evaluator<'_>, _: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    let (s, needle) = (evaluator.string(&args[0]), evaluator.string(&args[1]));
    let before = s.find(&needle).map(|i| s[..i].to_string()).unwrap_or_default();
    Ok(XValue::String(before))
}

fn substring_after(evaluator: &Evaluator<'_>, _: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    let (s, needle) = (evaluator.string(&args[0]), evaluator.string(&args[1]));
    let after = s
        .find(&needle)
        .map(|i| s[i + needle.len()..].to_string())
        .unwrap_or_default();
    Ok(XValue::String(after))
}

/// Characters at 1-based positions `p` with `round(start) <= p < round(start) + round(length)`.
fn substring(evaluator: &Evaluator<'_>, _: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    let s = evaluator.string(&args[0]);
    let start = round_half_up(evaluator.number(&args[1]));
    let end = match args.get(2) {
        Some(length) => start + round_half_up(evaluator.number(length)),
        None => f64::INFINITY,
    };
    let result = s
        .chars()
        .enumerate()
        .filter(|&(i, _)| {
            let p = (i + 1) as f64;
            p >= start && p < end
        })
        .map(|(_, c)| c)
        .collect();
    Ok(XValue::String(result))
}

fn string_length(evaluator: &Evaluator<'_>, focus: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    Ok(XValue::Number(string_arg(evaluator, focus, &args, 0).chars().count() as f64))
}

fn normalize_space(evaluator: &Evaluator<'_>, focus: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    let s = string_arg(evaluator, focus, &args, 0);
    Ok(XValue::String(s.split_whitespace().collect::<Vec<_>>().join(" ")))
}

fn translate(evaluator: &Evaluator<'_>, _: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    let s = evaluator.string(&args[0]);
    let from: Vec<char> = evaluator.string(&args[1]).chars().collect();
    let to: Vec<char> = evaluator.string(&args[2]).chars().collect();
    let result = s
        .chars()
        .filter_map(|c| match from.iter().position(|&f| f == c) {
            Some(i) => to.get(i).copied(),
            None => Some(c),
        })
        .collect();
    Ok(XValue::String(result))
}

// ============================================================================
// Boolean functions
// ============================================================================

fn boolean(evaluator: &Evaluator<'_>, _: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    Ok(XValue::Boolean(evaluator.boolean(&args[0])))
}

fn not(evaluator: &Evaluator<'_>, _: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    Ok(XValue::Boolean(!evaluator.boolean(&args[0])))
}

fn true_fn(_: &Evaluator<'_>, _: &Focus, _: Vec<XValue>) -> XPathResult<XValue> {
    Ok(XValue::Boolean(true))
}

fn false_fn(_: &Evaluator<'_>, _: &Focus, _: Vec<XValue>) -> XPathResult<XValue> {
    Ok(XValue::Boolean(false))
}

/// True if the nearest `xml:lang` in scope equals the argument or is a sub-language of it.
fn lang(evaluator: &Evaluator<'_>, focus: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    let wanted = evaluator.string(&args[0]).to_lowercase();
    let doc = evaluator.document();
    let declared = std::iter::successors(Some(focus.node.owner()), |&n| doc.parent(n)).find_map(|n| {
        doc.attributes(n)
            .iter()
            .find(|a| a.name.local == "lang" && a.name.namespace.as_deref() == Some(XML_NS))
            .map(|a| a.value.to_lowercase())
    });
    let matches = declared.map_or(false, |lang| {
        lang == wanted || (lang.starts_with(&wanted) && lang[wanted.len()..].starts_with('-'))
    });
    Ok(XValue::Boolean(matches))
}

// ============================================================================
// Number functions
// ============================================================================

fn number(evaluator: &Evaluator<'_>, focus: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    let value = match args.first() {
        Some(value) => evaluator.number(value),
        None => string_to_number(&evaluator.node_string(focus.node)),
    };
    Ok(XValue::Number(value))
}

fn sum(evaluator: &Evaluator<'_>, _: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    let total = nodes(&args[0])?
        .iter()
        .map(|&n| string_to_number(&evaluator.node_string(n)))
        .sum();
    Ok(XValue::Number(total))
}

fn floor(evaluator: &Evaluator<'_>, _: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    Ok(XValue::Number(evaluator.number(&args[0]).floor()))
}

fn ceiling(evaluator: &Evaluator<'_>, _: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    Ok(XValue::Number(evaluator.number(&args[0]).ceil()))
}

fn round(evaluator: &Evaluator<'_>, _: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    Ok(XValue::Number(round_half_up(evaluator.number(&args[0]))))
}

fn round_half_up(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        n
    } else {
        (n + 0.5).floor()
    }
}

// ============================================================================
// Modern dialect
// ============================================================================

/// Atomic values count as a one-item sequence.
fn is_present(value: &XValue) -> bool {
    match value {
        XValue::NodeSet(nodes) => !nodes.is_empty(),
        _ => true,
    }
}

fn exists(_: &Evaluator<'_>, _: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    Ok(XValue::Boolean(is_present(&args[0])))
}

fn empty(_: &Evaluator<'_>, _: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    Ok(XValue::Boolean(!is_present(&args[0])))
}

fn ends_with(evaluator: &Evaluator<'_>, _: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    let (s, suffix) = (evaluator.string(&args[0]), evaluator.string(&args[1]));
    Ok(XValue::Boolean(s.ends_with(&suffix)))
}

fn upper_case(evaluator: &Evaluator<'_>, _: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    Ok(XValue::String(evaluator.string(&args[0]).to_uppercase()))
}

fn lower_case(evaluator: &Evaluator<'_>, _: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    Ok(XValue::String(evaluator.string(&args[0]).to_lowercase()))
}

fn string_join(evaluator: &Evaluator<'_>, _: &Focus, args: Vec<XValue>) -> XPathResult<XValue> {
    let separator = args.get(1).map(|s| evaluator.string(s)).unwrap_or_default();
    let parts: Vec<String> = match &args[0] {
        XValue::NodeSet(nodes) => nodes.iter().map(|&n| evaluator.node_string(n)).collect(),
        other => vec![evaluator.string(other)],
    };
    Ok(XValue::String(parts.join(&separator)))
}
