// Object inspector - bounded structural reports over any object model

pub mod config;
pub mod model;
pub mod types;

pub use config::InspectOptions;
pub use model::{MemberSlot, ObjectModel, Shape, ValueModel};
pub use types::{InspectionReport, MethodEntry, Origin, PropertyEntry};

use std::cmp::Ordering;
use std::collections::HashSet;
use std::iter::Peekable;
use std::str::Chars;
use tracing::debug;

/// Prototype hops followed before giving up on a chain
const MAX_PROTO_HOPS: usize = 64;

/// Walks values of an [`ObjectModel`] into [`InspectionReport`]s
pub struct Inspector<'m, M: ObjectModel> {
    model: &'m M,
    options: InspectOptions,
}

impl<'m, M: ObjectModel> Inspector<'m, M> {
    pub fn new(model: &'m M, options: InspectOptions) -> Self {
        Self { model, options }
    }

    /// Build the report for `value`. Never fails; member errors become
    /// diagnostic entries.
    pub fn inspect(&self, value: &M::Value, label: &str) -> InspectionReport {
        let mut report = InspectionReport::new(label, self.model.type_name(value));
        match self.model.shape(value) {
            Shape::Null => {}
            Shape::Scalar | Shape::Callable => {
                report.scalar_value = Some(self.model.render(value));
            }
            Shape::Sequence | Shape::Structured => {
                let mut path = Vec::new();
                self.walk(value, "", 1, &mut path, &mut report);
            }
        }

        report
            .properties
            .sort_by(|a, b| a.origin.cmp(&b.origin).then_with(|| natural_cmp(&a.name, &b.name)));
        report
            .methods
            .sort_by(|a, b| a.origin.cmp(&b.origin).then_with(|| natural_cmp(&a.name, &b.name)));
        report.property_count = report.properties.len();
        report.method_count = report.methods.len();

        debug!(
            subject = label,
            properties = report.property_count,
            methods = report.method_count,
            truncated = report.truncated,
            "inspection finished"
        );
        report
    }

    /// Report the members of `node` at `depth`, then descend into them
    fn walk(
        &self,
        node: &M::Value,
        prefix: &str,
        depth: usize,
        path: &mut Vec<usize>,
        report: &mut InspectionReport,
    ) {
        if depth > self.options.max_depth {
            report.properties.push(diagnostic(
                if prefix.is_empty() { "(root)".to_string() } else { prefix.to_string() },
                format!("max depth {} reached", self.options.max_depth),
            ));
            report.truncated = true;
            return;
        }

        let identity = self.model.identity(node);
        if let Some(id) = identity {
            path.push(id);
        }
        let mut children = Vec::new();

        if self.model.shape(node) == Shape::Sequence {
            let len = self.model.len(node);
            let shown = len.min(self.options.max_array_elements);
            for index in 0..shown {
                if let Some(element) = self.model.element(node, index) {
                    let name = format!("{}[{}]", prefix, index);
                    self.record(name, element, Origin::ArrayElement, path, report, &mut children);
                }
            }
            if len > shown {
                report.properties.push(diagnostic(
                    format!("{}[...]", prefix),
                    format!("{} more omitted", len - shown),
                ));
                report.truncated = true;
            }
            report.properties.push(PropertyEntry {
                name: join(prefix, "length"),
                declared_type: "number".to_string(),
                rendered_value: len.to_string(),
                origin: Origin::Own,
            });
        }

        let mut reported: HashSet<String> = HashSet::new();
        let own: Vec<_> = self
            .model
            .members(node, node)
            .into_iter()
            .filter(|slot| !slot.name.starts_with("__"))
            .collect();
        let total = own.len();
        for slot in own.into_iter().take(self.options.max_members) {
            reported.insert(slot.name.clone());
            self.record_slot(prefix, slot, Origin::Own, path, report, &mut children);
        }
        if total > self.options.max_members {
            report.properties.push(diagnostic(
                join(prefix, "..."),
                format!("{} more members omitted", total - self.options.max_members),
            ));
            report.truncated = true;
        }

        if self.options.include_inherited {
            let mut proto = self.model.prototype(node);
            let mut hops = 0;
            while let Some(holder) = proto {
                if hops >= MAX_PROTO_HOPS {
                    break;
                }
                for slot in self.model.members(&holder, node) {
                    if slot.name.starts_with("__") || !reported.insert(slot.name.clone()) {
                        continue;
                    }
                    // Inherited members are listed, not descended into
                    let mut ignored = Vec::new();
                    self.record_slot(prefix, slot, Origin::Inherited, path, report, &mut ignored);
                }
                proto = self.model.prototype(&holder);
                hops += 1;
            }
        }

        for (name, child) in children {
            self.walk(&child, &name, depth + 1, path, report);
        }
        if identity.is_some() {
            path.pop();
        }
    }

    fn record_slot(
        &self,
        prefix: &str,
        slot: MemberSlot<M::Value>,
        origin: Origin,
        path: &[usize],
        report: &mut InspectionReport,
        children: &mut Vec<(String, M::Value)>,
    ) {
        let name = join(prefix, &slot.name);
        match slot.value {
            Ok(value) => self.record(name, value, origin, path, report, children),
            Err(message) => report.properties.push(PropertyEntry {
                name,
                declared_type: "error".to_string(),
                rendered_value: format!("[getter threw: {}]", message),
                origin: Origin::Diagnostic,
            }),
        }
    }

    fn record(
        &self,
        name: String,
        value: M::Value,
        origin: Origin,
        path: &[usize],
        report: &mut InspectionReport,
        children: &mut Vec<(String, M::Value)>,
    ) {
        let shape = self.model.shape(&value);
        if shape == Shape::Callable {
            let params = self
                .model
                .callable_source(&value)
                .map(|source| extract_params(&source))
                .unwrap_or_default();
            report.methods.push(MethodEntry {
                name,
                params,
                is_async: self.model.is_async(&value),
                origin: if origin == Origin::Inherited { Origin::Inherited } else { Origin::Own },
            });
            return;
        }

        let type_name = self.model.type_name(&value);
        if matches!(self.model.identity(&value), Some(id) if path.contains(&id)) {
            report.properties.push(PropertyEntry {
                name,
                declared_type: type_name,
                rendered_value: "[Circular]".to_string(),
                origin: Origin::Circular,
            });
            return;
        }

        report.properties.push(PropertyEntry {
            name: name.clone(),
            declared_type: type_name,
            rendered_value: self.model.render(&value),
            origin,
        });
        if matches!(shape, Shape::Sequence | Shape::Structured) {
            children.push((name, value));
        }
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn diagnostic(name: String, message: String) -> PropertyEntry {
    PropertyEntry {
        name,
        declared_type: "info".to_string(),
        rendered_value: message,
        origin: Origin::Diagnostic,
    }
}

/// Parameter names read from a callable's declaration text
///
/// Handles `function f(a, b)`, `(a, b) => ..`, `x => ..` and method
/// shorthand. Defaults are dropped; rest parameters keep their `...`.
pub fn extract_params(source: &str) -> Vec<String> {
    let text = source.trim_start();
    let text = match text.strip_prefix("async") {
        Some(rest) if rest.starts_with(|c: char| c.is_whitespace() || c == '(') => rest.trim_start(),
        _ => text,
    };

    let list = match (text.find('('), text.find("=>")) {
        (Some(open), arrow) if arrow.is_none_or(|a| open < a) => {
            let mut depth = 0usize;
            let mut close = None;
            for (i, c) in text[open..].char_indices() {
                match c {
                    '(' | '[' | '{' => depth += 1,
                    ')' | ']' | '}' => {
                        depth = depth.saturating_sub(1);
                        if depth == 0 {
                            close = Some(open + i);
                            break;
                        }
                    }
                    _ => {}
                }
            }
            match close {
                Some(close) => &text[open + 1..close],
                None => return Vec::new(),
            }
        }
        (_, Some(arrow)) => &text[..arrow],
        _ => return Vec::new(),
    };

    let mut params = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in list.chars() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                params.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    params.push(current);

    params
        .into_iter()
        .filter_map(|param| {
            let name = match param.find('=') {
                Some(eq) if !param.trim_start().starts_with(['{', '[']) => &param[..eq],
                _ => param.as_str(),
            };
            let name = name.trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

/// Order names with digit runs compared by value, so `b[2]` < `b[10]`
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();
    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let da = take_digits(&mut left);
                let db = take_digits(&mut right);
                let ta = da.trim_start_matches('0');
                let tb = db.trim_start_matches('0');
                let ord = ta.len().cmp(&tb.len()).then_with(|| ta.cmp(tb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.next_if(|c| c.is_ascii_digit()) {
        digits.push(c);
    }
    digits
}

/// Operator text for a report
pub fn render_report(report: &InspectionReport) -> String {
    let mut out = format!("{}: {}\n", report.subject_label, report.type_name);
    if let Some(value) = &report.scalar_value {
        out.push_str(&format!("value: {}\n", value));
    }

    if !report.properties.is_empty() {
        out.push_str(&format!("\nProperties ({}):\n", report.property_count));
        for prop in &report.properties {
            let tag = match prop.origin {
                Origin::Own => String::new(),
                origin => format!("  [{}]", origin),
            };
            if prop.origin == Origin::Diagnostic && prop.declared_type == "info" {
                out.push_str(&format!("  {}: {}{}\n", prop.name, prop.rendered_value, tag));
            } else {
                out.push_str(&format!(
                    "  {}: {} = {}{}\n",
                    prop.name, prop.declared_type, prop.rendered_value, tag
                ));
            }
        }
    }

    if !report.methods.is_empty() {
        out.push_str(&format!("\nMethods ({}):\n", report.method_count));
        for method in &report.methods {
            let tag = match method.origin {
                Origin::Own => String::new(),
                origin => format!("  [{}]", origin),
            };
            out.push_str(&format!(
                "  {}{}({}){}\n",
                if method.is_async { "async " } else { "" },
                method.name,
                method.params.join(", "),
                tag
            ));
        }
    }

    if report.truncated {
        out.push_str("\n(report truncated)\n");
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{CodeEvaluator, EvalOutcome, Interpreter, Value};

    async fn eval(interp: &Interpreter, snippet: &str) -> Value {
        match CodeEvaluator::default().run(interp, snippet, Vec::new()).await {
            EvalOutcome::Success { value, .. } => value,
            other => panic!("evaluation failed: {:?}", other),
        }
    }

    async fn inspect_with(snippet: &str, options: InspectOptions) -> InspectionReport {
        let interp = CodeEvaluator::default().interpreter();
        let value = eval(&interp, snippet).await;
        let model = ValueModel::new(&interp);
        Inspector::new(&model, options).inspect(&value, "result")
    }

    async fn inspect(snippet: &str) -> InspectionReport {
        inspect_with(snippet, InspectOptions::default()).await
    }

    fn names(report: &InspectionReport) -> Vec<&str> {
        report.properties.iter().map(|p| p.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_object_with_array_member() {
        let report = inspect("{a:1,b:[1,2,3]}").await;

        assert_eq!(report.type_name, "Object");
        assert_eq!(names(&report), ["a", "b", "b.length", "b[0]", "b[1]", "b[2]"]);
        assert_eq!(report.count_origin(Origin::ArrayElement), 3);
        assert_eq!(report.property("b.length").map(|p| p.rendered_value.as_str()), Some("3"));
        assert_eq!(report.property("a").map(|p| p.declared_type.as_str()), Some("number"));
        assert_eq!(report.property("b").map(|p| p.rendered_value.as_str()), Some("Array(3)"));
        assert_eq!(report.property_count, 6);
        assert_eq!(report.method_count, 0);
        assert!(!report.truncated);
    }

    #[tokio::test]
    async fn test_scalars_and_null_short_circuit() {
        let report = inspect("'hi'").await;
        assert_eq!(report.scalar_value.as_deref(), Some("'hi'"));
        assert_eq!(report.type_name, "string");
        assert!(report.properties.is_empty());

        let report = inspect("null").await;
        assert_eq!(report.scalar_value, None);
        assert!(report.properties.is_empty() && report.methods.is_empty());
    }

    #[tokio::test]
    async fn test_self_reference_is_one_circular_entry() {
        let report = inspect("const a = {name: 'x'}\na.self = a\nreturn a").await;
        assert_eq!(report.count_origin(Origin::Circular), 1);
        let entry = report.property("self").unwrap();
        assert_eq!(entry.rendered_value, "[Circular]");
        assert_eq!(names(&report), ["name", "self"]);
    }

    #[tokio::test]
    async fn test_depth_boundary() {
        let report = inspect("{a:{b:{c:{d:1}}}}").await;
        assert_eq!(report.property("a.b.c.d").map(|p| p.rendered_value.as_str()), Some("1"));
        assert_eq!(report.count_origin(Origin::Diagnostic), 0);
        assert!(!report.truncated);

        let report = inspect("{a:{b:{c:{d:{e:1}}}}}").await;
        assert!(report.property("a.b.c.d").is_some());
        assert!(report.property("a.b.c.d.e").is_none());
        let marker = report
            .properties
            .iter()
            .find(|p| p.origin == Origin::Diagnostic)
            .unwrap();
        assert_eq!(marker.name, "a.b.c.d");
        assert_eq!(marker.rendered_value, "max depth 4 reached");
        assert!(report.truncated);
    }

    #[tokio::test]
    async fn test_getter_failure_is_diagnostic() {
        let report = inspect("{ok: 1, get bad() { throw new Error('nope') }, get fine() { return this.ok + 1 }}").await;
        let bad = report.property("bad").unwrap();
        assert_eq!(bad.origin, Origin::Diagnostic);
        assert!(bad.rendered_value.contains("nope"));
        assert_eq!(report.property("fine").map(|p| p.rendered_value.as_str()), Some("2"));
    }

    #[tokio::test]
    async fn test_inherited_members_and_methods() {
        let snippet = "const base = {kind: 'base', greet(name) { return 'hi ' + name }}\n\
                       const o = Object.create(base)\n\
                       o.own = 1\n\
                       o.kind = 'mine'\n\
                       o.run = async (a, b = 2, ...rest) => a\n\
                       return o";
        let report = inspect(snippet).await;

        assert_eq!(names(&report), ["kind", "own"]);
        assert_eq!(report.methods.len(), 2);
        assert_eq!(report.methods[0].name, "run");
        assert_eq!(report.methods[0].params, ["a", "b", "...rest"]);
        assert!(report.methods[0].is_async);
        assert_eq!(report.methods[1].name, "greet");
        assert_eq!(report.methods[1].origin, Origin::Inherited);
        assert_eq!(report.methods[1].params, ["name"]);

        let options = InspectOptions {
            include_inherited: false,
            ..InspectOptions::default()
        };
        let report = inspect_with(snippet, options).await;
        assert_eq!(report.methods.len(), 1);
    }

    #[tokio::test]
    async fn test_member_and_element_bounds() {
        let options = InspectOptions {
            max_members: 2,
            ..InspectOptions::default()
        };
        let report = inspect_with("{a: 1, b: 2, c: 3, d: 4, e: 5}", options).await;
        assert_eq!(report.count_origin(Origin::Own), 2);
        let omitted = report.property("...").unwrap();
        assert_eq!(omitted.rendered_value, "3 more members omitted");
        assert!(report.truncated);

        let report = inspect("const xs = []\nfor (let i = 0; i < 40; i++) { xs.push(i) }\nreturn xs").await;
        assert_eq!(report.type_name, "array");
        assert_eq!(report.count_origin(Origin::ArrayElement), 30);
        assert_eq!(report.property("length").map(|p| p.rendered_value.as_str()), Some("40"));
        assert_eq!(report.property("[...]").map(|p| p.rendered_value.as_str()), Some("10 more omitted"));
        // Natural order keeps [2] ahead of [10]
        let elements: Vec<&str> = report
            .properties
            .iter()
            .filter(|p| p.origin == Origin::ArrayElement)
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(&elements[..3], ["[0]", "[1]", "[2]"]);
        assert_eq!(elements[10], "[10]");
    }

    #[tokio::test]
    async fn test_internal_names_are_skipped() {
        let report = inspect("{__secret: 1, shown: 2}").await;
        assert_eq!(names(&report), ["shown"]);
    }

    #[test]
    fn test_extract_params() {
        assert_eq!(extract_params("function add(a, b) { return a + b }"), ["a", "b"]);
        assert_eq!(extract_params("x => x * 2"), ["x"]);
        assert_eq!(extract_params("async x => x"), ["x"]);
        assert_eq!(extract_params("async ({ a, b }, c = [1, 2]) => a"), ["{ a, b }", "c"]);
        assert_eq!(extract_params("() => 1"), Vec::<String>::new());
        assert_eq!(extract_params("function max() { [native code] }"), Vec::<String>::new());
    }

    #[test]
    fn test_natural_cmp() {
        assert_eq!(natural_cmp("b[2]", "b[10]"), Ordering::Less);
        assert_eq!(natural_cmp("a", "b"), Ordering::Less);
        assert_eq!(natural_cmp("item10", "item9"), Ordering::Greater);
        assert_eq!(natural_cmp("x", "x"), Ordering::Equal);
    }

    #[tokio::test]
    async fn test_render_report() {
        let report = inspect("{a:1,b:[1,2,3]}").await;
        let text = render_report(&report);
        assert!(text.starts_with("result: Object"));
        assert!(text.contains("Properties (6):"));
        assert!(text.contains("  b.length: number = 3"));
        assert!(text.contains("  b[0]: number = 1  [element]"));
        assert!(!text.contains("Methods"));
    }
}
