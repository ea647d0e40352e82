//! Semantic-analysis coverage: the parser keeps going after problems and
//! reports each one exactly once, with positions a host editor can use.

use bazic_common::{Diagnostic, Severity};
use bazic_parser::{parse, parse_with_markup, StaticMarkup};

fn errors(diags: &[Diagnostic]) -> Vec<&Diagnostic> {
    diags.iter().filter(|d| d.severity == Severity::Error).collect()
}

fn warnings(diags: &[Diagnostic]) -> Vec<&Diagnostic> {
    diags.iter().filter(|d| d.severity == Severity::Warning).collect()
}

#[test]
fn valid_program_parses_clean() {
    let out = parse(
        r#"
VARIABLE limit = 10

EXTERN FUNCTION Main(args[])
    VARIABLE n = 0
    DO WHILE n < limit
        n = n + 1
    LOOP
    RETURN n
END FUNCTION
"#,
    );
    assert!(out.diagnostics.is_empty(), "unexpected: {:?}", out.diagnostics);
    assert!(out.program.is_some());
}

#[test]
fn empty_source_yields_no_program() {
    let out = parse("\n\n# just a comment\n");
    assert!(out.program.is_none());
    assert!(out.diagnostics.is_empty());
}

#[test]
fn redeclaration_cites_the_original_line() {
    let out = parse(
        r#"
EXTERN FUNCTION Main(args[])
    VARIABLE n = 1
    VARIABLE n = 2
    RETURN n
END FUNCTION
"#,
    );
    let errs = errors(&out.diagnostics);
    assert_eq!(errs.len(), 1, "got: {:?}", out.diagnostics);
    assert!(errs[0].message.contains("'n' is already declared at line 3"), "got: {}", errs[0].message);
    assert_eq!(errs[0].line, 4);
}

#[test]
fn unreferenced_local_warns_exactly_once() {
    let out = parse(
        r#"
EXTERN FUNCTION Main(args[])
    VARIABLE unused = 1
    RETURN 0
END FUNCTION
"#,
    );
    let warns = warnings(&out.diagnostics);
    assert_eq!(warns.len(), 1, "got: {:?}", out.diagnostics);
    assert!(warns[0].message.contains("'unused' is declared but never used"));
    assert!(errors(&out.diagnostics).is_empty());
}

#[test]
fn unreferenced_global_does_not_warn() {
    let out = parse("VARIABLE quiet = 1 + 2");
    assert!(out.diagnostics.is_empty(), "unexpected: {:?}", out.diagnostics);
}

#[test]
fn array_scalar_shape_mismatch_at_declaration() {
    let out = parse(
        r#"
EXTERN FUNCTION Main(args[])
    VARIABLE a[] = 1
    VARIABLE s = NEW [1, 2]
    RETURN a[0] + s
END FUNCTION
"#,
    );
    let errs = errors(&out.diagnostics);
    assert_eq!(errs.len(), 2, "got: {:?}", out.diagnostics);
    assert!(errs[0].message.contains("cannot assign a scalar value to array variable 'a'"));
    assert!(errs[1].message.contains("cannot assign an array value to scalar variable 's'"));
}

#[test]
fn array_scalar_shape_mismatch_at_assignment() {
    let out = parse(
        r#"
EXTERN FUNCTION Main(args[])
    VARIABLE s = 0
    s = NEW [1]
    RETURN s
END FUNCTION
"#,
    );
    let errs = errors(&out.diagnostics);
    assert_eq!(errs.len(), 1, "got: {:?}", out.diagnostics);
    assert!(errs[0].message.contains("cannot assign an array value to scalar variable 's'"));
}

#[test]
fn forward_reference_with_matching_arity_is_legal() {
    let out = parse(
        r#"
EXTERN FUNCTION Main(args[])
    RETURN Later(1, 2)
END FUNCTION

FUNCTION Later(a, b)
    RETURN a + b
END FUNCTION
"#,
    );
    assert!(out.diagnostics.is_empty(), "unexpected: {:?}", out.diagnostics);
}

#[test]
fn arity_mismatch_is_an_error() {
    let out = parse(
        r#"
EXTERN FUNCTION Main(args[])
    RETURN Later(1)
END FUNCTION

FUNCTION Later(a, b)
    RETURN a + b
END FUNCTION
"#,
    );
    let errs = errors(&out.diagnostics);
    assert_eq!(errs.len(), 1, "got: {:?}", out.diagnostics);
    assert!(errs[0].message.contains("expects 2 argument(s), got 1"));
}

#[test]
fn await_on_non_async_method_is_an_error() {
    let out = parse(
        r#"
EXTERN FUNCTION Main(args[])
    RETURN AWAIT Plain()
END FUNCTION

FUNCTION Plain()
    RETURN 1
END FUNCTION
"#,
    );
    let errs = errors(&out.diagnostics);
    assert_eq!(errs.len(), 1, "got: {:?}", out.diagnostics);
    assert!(errs[0].message.contains("'Plain' is not ASYNC"));
}

#[test]
fn arity_and_await_problems_on_one_call_are_both_reported() {
    let out = parse(
        r#"
EXTERN FUNCTION Main(args[])
    RETURN AWAIT Later(1)
END FUNCTION

FUNCTION Later(a, b)
    RETURN a + b
END FUNCTION
"#,
    );
    let errs = errors(&out.diagnostics);
    assert_eq!(errs.len(), 2, "got: {:?}", out.diagnostics);
    assert!(errs.iter().any(|d| d.message.contains("expects 2 argument(s), got 1")));
    assert!(errs.iter().any(|d| d.message.contains("'Later' is not ASYNC")));
}

#[test]
fn unknown_method_is_reported_after_the_full_stream() {
    let out = parse(
        r#"
EXTERN FUNCTION Main(args[])
    RETURN Nowhere()
END FUNCTION
"#,
    );
    let errs = errors(&out.diagnostics);
    assert_eq!(errs.len(), 1, "got: {:?}", out.diagnostics);
    assert!(errs[0].message.contains("unknown method 'Nowhere'"));
}

#[test]
fn entry_point_shape_is_validated() {
    let wrong_name = parse("EXTERN FUNCTION Start(args[])\nEND FUNCTION");
    assert!(errors(&wrong_name.diagnostics)
        .iter()
        .any(|d| d.message.contains("entry point method must be named 'Main'")));

    let wrong_params = parse("EXTERN FUNCTION Main(a, b)\nEND FUNCTION");
    assert!(errors(&wrong_params.diagnostics)
        .iter()
        .any(|d| d.message.contains("exactly one array parameter")));

    let async_entry = parse("EXTERN ASYNC FUNCTION Main(args[])\nEND FUNCTION");
    assert!(errors(&async_entry.diagnostics)
        .iter()
        .any(|d| d.message.contains("cannot be asynchronous")));
}

#[test]
fn break_outside_a_loop_is_an_error() {
    let out = parse(
        r#"
EXTERN FUNCTION Main(args[])
    BREAK
END FUNCTION
"#,
    );
    let errs = errors(&out.diagnostics);
    assert_eq!(errs.len(), 1, "got: {:?}", out.diagnostics);
    assert!(errs[0].message.contains("BREAK is only allowed inside a loop"));
}

#[test]
fn exception_outside_a_catch_is_an_error() {
    let out = parse(
        r#"
EXTERN FUNCTION Main(args[])
    RETURN EXCEPTION
END FUNCTION
"#,
    );
    let errs = errors(&out.diagnostics);
    assert_eq!(errs.len(), 1, "got: {:?}", out.diagnostics);
    assert!(errs[0].message.contains("EXCEPTION is only valid inside a CATCH block"));
}

#[test]
fn try_without_catch_is_an_error() {
    let out = parse(
        r#"
EXTERN FUNCTION Main(args[])
    TRY
        RETURN 1
    END TRY
END FUNCTION
"#,
    );
    assert!(errors(&out.diagnostics)
        .iter()
        .any(|d| d.message.contains("TRY requires a CATCH block")));
}

#[test]
fn parsing_continues_past_a_bad_statement() {
    // The bad initializer on line 3 must not hide the arity problem on line 4.
    let out = parse(
        r#"
EXTERN FUNCTION Main(args[])
    VARIABLE x = @@@
    RETURN Missing()
END FUNCTION
"#,
    );
    let errs = errors(&out.diagnostics);
    assert!(errs.iter().any(|d| d.message.contains("unrecognized character sequence")));
    assert!(errs.iter().any(|d| d.message.contains("unknown method 'Missing'")));
}

#[test]
fn missing_closer_cites_the_opening_delimiter() {
    let out = parse(
        r#"
EXTERN FUNCTION Main(args[])
    RETURN (1 + 2
END FUNCTION
"#,
    );
    let errs = errors(&out.diagnostics);
    assert!(
        errs.iter()
            .any(|d| d.message.contains("')' to close the delimiter opened at line 3")),
        "got: {:?}",
        out.diagnostics
    );
}

#[test]
fn same_problem_at_distinct_positions_is_reported_per_site() {
    let out = parse(
        r#"
EXTERN FUNCTION Main(args[])
    RETURN missing + missing
END FUNCTION
"#,
    );
    // Identical message, two columns. Dedup only collapses repeats at the
    // exact same position.
    let errs = errors(&out.diagnostics);
    assert_eq!(errs.len(), 2, "got: {:?}", out.diagnostics);
    for d in &errs {
        assert!(d.message.contains("undeclared variable 'missing'"));
    }
}

#[test]
fn control_accessors_are_read_only() {
    let provider = StaticMarkup::new().element("Label1", &["Text"], &[]);
    let out = parse_with_markup(
        r#"
EXTERN FUNCTION Main(args[])
    Label1 = 5
    RETURN 0
END FUNCTION
"#,
        Some("<markup/>"),
        Some(&provider),
    );
    let errs = errors(&out.diagnostics);
    assert_eq!(errs.len(), 1, "got: {:?}", out.diagnostics);
    assert!(errs[0].message.contains("control accessor 'Label1' is read-only"));
}

#[test]
fn bind_against_unknown_property_is_an_error() {
    let provider = StaticMarkup::new().element("Button1", &["Content"], &["Click"]);
    let out = parse_with_markup(
        "BIND Button1.Missing = 1",
        Some("<markup/>"),
        Some(&provider),
    );
    assert!(errors(&out.diagnostics)
        .iter()
        .any(|d| d.message.contains("element 'Button1' has no property 'Missing'")));
}

#[test]
fn event_method_against_unknown_event_is_an_error() {
    let provider = StaticMarkup::new().element("Button1", &["Content"], &["Click"]);
    let out = parse_with_markup(
        "EVENT FUNCTION Button1_Hover()\nEND FUNCTION",
        Some("<markup/>"),
        Some(&provider),
    );
    assert!(errors(&out.diagnostics)
        .iter()
        .any(|d| d.message.contains("element 'Button1' has no event 'Hover'")));
}

#[test]
fn event_methods_require_markup() {
    let out = parse("EVENT FUNCTION Button1_Click()\nEND FUNCTION");
    assert!(errors(&out.diagnostics)
        .iter()
        .any(|d| d.message.contains("EVENT methods require markup")));
}

#[test]
fn unparsable_markup_aborts_with_one_diagnostic() {
    struct Refusing;
    impl bazic_parser::MarkupProvider for Refusing {
        fn load(&self, _markup: &str) -> Result<(), String> {
            Err("bad token at 1:1".into())
        }
        fn element_names(&self) -> Vec<String> {
            Vec::new()
        }
        fn has_element(&self, _name: &str) -> bool {
            false
        }
        fn has_property(&self, _element: &str, _property: &str) -> bool {
            false
        }
        fn has_event(&self, _element: &str, _event: &str) -> bool {
            false
        }
    }
    let out = parse_with_markup("VARIABLE v = 1", Some("<broken"), Some(&Refusing));
    assert!(out.program.is_none());
    assert_eq!(out.diagnostics.len(), 1);
    assert!(out.diagnostics[0].message.contains("markup could not be parsed"));
}

#[test]
fn capabilities_record_host_type_paths_once() {
    let out = parse(
        r#"
EXTERN FUNCTION Main(args[])
    Sys.Console.Write("a")
    Sys.Console.Write("b")
    RETURN 0
END FUNCTION
"#,
    );
    assert!(out.diagnostics.is_empty(), "unexpected: {:?}", out.diagnostics);
    let program = out.program.expect("program");
    assert_eq!(program.required_capabilities, vec!["Sys.Console".to_string()]);
}
