use once_cell::sync::Lazy;
use pretty_assertions::assert_eq;
use std::fmt;
use velvet::{
    render, Capabilities, Config, Context, EvaluationErrorKind, HostObject, Param, Template,
    TemplateError, Value,
};

fn eval_error(template: &str, ctx: Context) -> velvet::EvaluationError {
    Template::parse(template)
        .unwrap()
        .evaluate(ctx)
        .expect_err("evaluation should fail")
}

// ── Strictness ──

#[test]
fn undefined_reference_is_an_error() {
    let err = eval_error("Hi $name!", Context::new().with("nme", "x").with("age", 3));
    assert_eq!(
        err.kind,
        EvaluationErrorKind::Undefined {
            name: "name".into(),
            available: vec!["age".into(), "nme".into()],
        }
    );
    assert_eq!((err.line, err.column), (1, 4));
    assert_eq!(err.help.as_deref(), Some("defined variables: age, nme"));
}

#[test]
fn undefined_inside_condition_is_still_an_error() {
    let err = eval_error("#set ($x = !$missing)", Context::new());
    assert!(matches!(err.kind, EvaluationErrorKind::Undefined { .. }));
}

#[test]
fn null_is_never_printed() {
    let err = eval_error("a\n  $n", Context::new().with("n", Value::Null));
    assert_eq!(err.kind, EvaluationErrorKind::NullValue { reference: "$n".into() });
    assert_eq!(err.to_string(), "`$n` is null at line 2, column 3");
}

#[test]
fn null_may_be_assigned_and_tested() {
    let ctx = Context::new().with("n", Value::Null);
    let out = render("#set ($m = $n)#set ($b = !$m)$b", ctx).unwrap();
    assert_eq!(out, "true");
}

#[test]
fn no_output_survives_an_error() {
    let result = render("lots of text $x then $y", Context::new().with("x", 1));
    assert!(matches!(result, Err(TemplateError::Evaluation(_))));
}

// ── Literal text ──

#[test]
fn literal_text_is_identity_and_idempotent() {
    let text = "No references here.\n  Only \t whitespace, commas, and 100% text.\r\n";
    let once = render(text, Context::new()).unwrap();
    assert_eq!(once, text);
    assert_eq!(render(&once, Context::new()).unwrap(), once);
}

#[test]
fn braced_and_plain_references_agree() {
    let ctx = Context::new().with("x", "1729");
    assert_eq!(render("a${x}\nb", ctx.clone()).unwrap(), "a1729\nb");
    assert_eq!(render("a$x\nb", ctx).unwrap(), "a1729\nb");
}

#[test]
fn braces_separate_a_name_from_following_letters() {
    let ctx = Context::new().with("x", "ab");
    assert_eq!(render("${x}cd $x.toUpperCase()!", ctx).unwrap(), "abcd AB!");
}

#[test]
fn dollar_and_hash_without_meaning_are_text() {
    let ctx = Context::new();
    assert_eq!(render("$ $5 ${ } # #5 #if #end", ctx.clone()).unwrap(), "$ $5 ${ } # #5 #if #end");
    assert_eq!(render("price: $9.99", ctx).unwrap(), "price: $9.99");
}

#[test]
fn block_comment_is_dropped() {
    let out = render("a#* several\nlines *#b", Context::new()).unwrap();
    assert_eq!(out, "ab");
}

#[test]
fn braced_set_directive() {
    let out = render("#{set}($x = 5)\n$x", Context::new()).unwrap();
    assert_eq!(out, "5");
}

#[test]
fn windows_newline_after_set() {
    let out = render("#set ($x = 5)\r\n$x", Context::new()).unwrap();
    assert_eq!(out, "5");
}

// ── Host objects ──

/// A queue that has been drained, and so reads as false.
#[derive(Debug)]
struct Drained;

impl fmt::Display for Drained {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Drained")
    }
}

static DRAINED: Lazy<Capabilities> = Lazy::new(|| Capabilities::builder("Drained").build());

impl HostObject for Drained {
    fn type_name(&self) -> &str {
        "Drained"
    }

    fn capabilities(&self) -> &Capabilities {
        &DRAINED
    }

    fn is_truthy(&self) -> bool {
        false
    }
}

/// Two overloads where neither is narrower than the other for `(int, int)`.
#[derive(Debug)]
struct Registry;

impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Registry")
    }
}

static REGISTRY: Lazy<Capabilities> = Lazy::new(|| {
    Capabilities::builder("Registry")
        .method("pick", &[Param::Int, Param::Any], |_: &Registry, _| Ok(1.into()))
        .method("pick", &[Param::Any, Param::Int], |_: &Registry, _| Ok(2.into()))
        .build()
});

impl HostObject for Registry {
    fn type_name(&self) -> &str {
        "Registry"
    }

    fn capabilities(&self) -> &Capabilities {
        &REGISTRY
    }
}

#[test]
fn host_objects_choose_their_own_truth() {
    let ctx = || Context::new().with("obj", Value::object(Drained));
    assert_eq!(render("#set ($x = $obj && true) $x", ctx()).unwrap(), " false");
    assert_eq!(render("#set ($x = !$obj) $x", ctx()).unwrap(), " true");
    assert_eq!(render("#set ($x = $obj || 1 == 1) $x", ctx()).unwrap(), " true");

    let ctx = Context::new().with("obj", Value::object(Registry));
    assert_eq!(render("#set ($x = $obj && true) $x", ctx).unwrap(), " true");
}

// ── Dispatch failures ──

#[test]
fn ambiguous_overloads_are_reported() {
    let err = eval_error("$r.pick(1, 2)", Context::new().with("r", Value::object(Registry)));
    assert_eq!(
        err.kind,
        EvaluationErrorKind::AmbiguousMethod {
            type_name: "Registry".into(),
            name: "pick".into(),
            candidates: vec!["pick(int, any)".into(), "pick(any, int)".into()],
        }
    );
    assert_eq!((err.line, err.column), (1, 3));
    assert_eq!(err.help.as_deref(), Some("candidates: pick(int, any); pick(any, int)"));
    assert_eq!(
        err.to_string(),
        "call to `pick` on `Registry` is ambiguous at line 1, column 3"
    );

    let ctx = Context::new().with("r", Value::object(Registry));
    assert_eq!(render("$r.pick(1, 'x')", ctx).unwrap(), "1");
}

#[test]
fn unknown_method_names_argument_types() {
    let err = eval_error("$s.frobnicate(1, 'a')", Context::new().with("s", "x"));
    assert_eq!(
        err.to_string(),
        "`string` has no method `frobnicate` accepting (int, string) at line 1, column 3"
    );
}

#[test]
fn unknown_property() {
    let err = eval_error("$n.digits", Context::new().with("n", 5));
    assert_eq!(
        err.kind,
        EvaluationErrorKind::NoSuchProperty {
            type_name: "int".into(),
            name: "digits".into()
        }
    );
}

#[test]
fn indexing_a_boolean() {
    let err = eval_error("$b[0]", Context::new().with("b", true));
    assert_eq!(err.kind, EvaluationErrorKind::NotIndexable { type_name: "boolean".into() });
}

#[test]
fn host_method_failure() {
    let err = eval_error("$l.get(3)", Context::new().with("l", vec![1]));
    assert_eq!(
        err.kind,
        EvaluationErrorKind::Invocation {
            method: "list.get".into(),
            message: "index 3 out of bounds for length 1".into()
        }
    );
}

#[test]
fn arguments_are_expressions() {
    let ctx = Context::new().with("s", "abcdef").with("n", 2);
    assert_eq!(render("$s.substring($n, $n * 2)", ctx).unwrap(), "cd");
}

// ── Syntax errors ──

#[test]
fn syntax_errors_carry_positions() {
    let cases = [
        ("#set ($x = )", "unexpected `)`", (1, 12)),
        ("#set ($x = 'open)", "unterminated string literal", (1, 12)),
        ("#set ($x.y = 1)", "assignment target must be a plain variable", (1, 7)),
        ("x\n${a", "unterminated `${` reference", (2, 1)),
        ("#set ($x = 3000000000)", "integer literal 3000000000 out of range", (1, 12)),
        ("#set ($x = 1 ? 2)", "unexpected character `?`", (1, 14)),
    ];
    for (template, message, position) in cases {
        let err = Template::parse(template).expect_err(template);
        assert_eq!(err.message, message, "template: {template:?}");
        assert_eq!((err.line, err.column), position, "template: {template:?}");
    }
}

#[test]
fn long_operator_chains_fail_cleanly() {
    let chain = vec!["1"; 100_000].join(" + ");
    let err = Template::parse(&format!("#set ($x = {chain})")).unwrap_err();
    assert_eq!(err.message, "expression nested too deeply");

    let config = Config::default().max_depth(4);
    assert!(Template::parse_with("#set ($x = 1 + 1 + 1 + 1 + 1)", &config).is_err());
    let template = Template::parse_with("#set ($x = 1 + 1 + 1)$x", &config).unwrap();
    assert_eq!(template.evaluate(Context::new()).unwrap(), "3");
}

#[test]
fn diagnostics_render_through_miette() {
    let err = Template::parse("#set ($x = 1 +)").unwrap_err();
    let report = miette::Report::new(err);
    let text = format!("{report:?}");
    assert!(text.contains("unexpected `)`"), "{text}");
}
