//! End-to-end execution coverage: control flow, arrays, methods, exceptions
//! and the optimize-then-run equivalence property.

use std::sync::Arc;

use bazic_common::Severity;
use bazic_interpreter::{
    values_equal, ErrorKind, HostError, HostInvoker, Interpreter, Value,
};

fn parse(src: &str) -> bazic_ast::Program {
    let out = bazic_parser::parse(src);
    let errors: Vec<_> =
        out.diagnostics.iter().filter(|d| d.severity == Severity::Error).collect();
    assert!(errors.is_empty(), "unexpected parse errors: {errors:?}");
    out.program.expect("program")
}

fn run_src(src: &str) -> Value {
    let mut interp = Interpreter::new(parse(src));
    interp.run().expect("run failed")
}

#[test]
fn while_loop_counts_to_ten() {
    let v = run_src(
        r#"
EXTERN FUNCTION Main(args[])
    VARIABLE v = 0
    DO WHILE v < 10
        v = v + 1
    LOOP
    RETURN v
END FUNCTION
"#,
    );
    assert!(matches!(v, Value::Integer(10)));
}

#[test]
fn optimized_program_returns_identical_value() {
    let src = r#"
EXTERN FUNCTION Main(args[])
    VARIABLE v = 0
    DO WHILE v < 10
        v = v + 1
        IF v = 5 THEN
            v = v + 1
        END IF
    LOOP
    RETURN v
END FUNCTION
"#;
    let program = parse(src);
    let lowered = bazic_optimizer::optimize(&program).expect("optimize");
    let plain = Interpreter::new(program).run().expect("plain run");
    let optimized = Interpreter::new(lowered).run().expect("optimized run");
    assert!(values_equal(&plain, &optimized), "plain {plain} != optimized {optimized}");
}

#[test]
fn post_test_loop_body_runs_at_least_once() {
    let v = run_src(
        r#"
EXTERN FUNCTION Main(args[])
    VARIABLE n = 0
    DO
        n = n + 1
    LOOP WHILE n < 0
    RETURN n
END FUNCTION
"#,
    );
    assert!(matches!(v, Value::Integer(1)));
}

#[test]
fn break_leaves_only_the_innermost_loop() {
    let v = run_src(
        r#"
EXTERN FUNCTION Main(args[])
    VARIABLE total = 0
    VARIABLE i = 0
    DO WHILE i < 3
        DO WHILE 1 = 1
            total = total + 10
            BREAK
        LOOP
        total = total + 1
        i = i + 1
    LOOP
    RETURN total
END FUNCTION
"#,
    );
    assert!(matches!(v, Value::Integer(33)));
}

#[test]
fn array_element_assignment_is_observable() {
    let v = run_src(
        r#"
EXTERN FUNCTION Main(args[])
    VARIABLE x[] = NEW [1, 2, 3]
    x[0] = 1024
    RETURN x[0]
END FUNCTION
"#,
    );
    assert!(matches!(v, Value::Integer(1024)));
}

#[test]
fn assigning_one_past_the_end_appends() {
    let v = run_src(
        r#"
EXTERN FUNCTION Main(args[])
    VARIABLE a[] = NEW [1, 2]
    a[2] = 3
    RETURN a[0] + a[1] + a[2]
END FUNCTION
"#,
    );
    assert!(matches!(v, Value::Integer(6)));
}

#[test]
fn inner_catch_handles_its_own_throw() {
    let v = run_src(
        r#"
EXTERN FUNCTION Main(args[])
    TRY
        TRY
            THROW "boom"
        CATCH
            RETURN EXCEPTION
        END TRY
    CATCH
        RETURN "outer"
    END TRY
    RETURN "unreached"
END FUNCTION
"#,
    );
    match v {
        Value::Str(s) => assert_eq!(s, "boom"),
        other => panic!("unexpected {other}"),
    }
}

#[test]
fn uncaught_throw_is_classified_as_unhandled() {
    let mut interp = Interpreter::new(parse(
        r#"
EXTERN FUNCTION Main(args[])
    THROW "nobody catches this"
END FUNCTION
"#,
    ));
    let err = interp.run().expect_err("should fail");
    assert_eq!(err.kind, ErrorKind::UnhandledException);
    assert!(err.message.contains("nobody catches this"));
}

#[test]
fn division_by_zero_is_catchable() {
    let v = run_src(
        r#"
EXTERN FUNCTION Main(args[])
    TRY
        VARIABLE x = 1 / 0
        RETURN x
    CATCH
        RETURN "caught"
    END TRY
END FUNCTION
"#,
    );
    match v {
        Value::Str(s) => assert_eq!(s, "caught"),
        other => panic!("unexpected {other}"),
    }
}

#[test]
fn forward_reference_and_recursion() {
    let v = run_src(
        r#"
EXTERN FUNCTION Main(args[])
    RETURN Fact(5)
END FUNCTION

FUNCTION Fact(n)
    IF n <= 1 THEN
        RETURN 1
    END IF
    RETURN n * Fact(n - 1)
END FUNCTION
"#,
    );
    assert!(matches!(v, Value::Integer(120)));
}

#[test]
fn globals_are_shared_across_methods() {
    let v = run_src(
        r#"
VARIABLE counter = 0

EXTERN FUNCTION Main(args[])
    counter = counter + 1
    Bump()
    RETURN counter
END FUNCTION

FUNCTION Bump()
    counter = counter + 1
END FUNCTION
"#,
    );
    assert!(matches!(v, Value::Integer(2)));
}

#[test]
fn awaited_async_method_yields_its_value() {
    let v = run_src(
        r#"
EXTERN FUNCTION Main(args[])
    RETURN AWAIT Twice(21)
END FUNCTION

ASYNC FUNCTION Twice(n)
    RETURN n * 2
END FUNCTION
"#,
    );
    assert!(matches!(v, Value::Integer(42)));
}

#[test]
fn unawaited_async_call_completes_before_idle() {
    let src = r#"
VARIABLE done = 0

EXTERN FUNCTION Main(args[])
    Finish()
    RETURN 0
END FUNCTION

ASYNC FUNCTION Finish()
    done = 1
END FUNCTION
"#;
    // The worker is joined before the run goes Idle, so by the time run()
    // returns its write to the shared global has happened.
    let mut interp = Interpreter::new(parse(src));
    let v = interp.run().expect("run failed");
    assert!(matches!(v, Value::Integer(0)));
}

struct ArithmeticHost;

impl HostInvoker for ArithmeticHost {
    fn instantiate(&self, class_path: &str, _args: &[Value]) -> Result<Value, HostError> {
        Err(HostError::MemberNotFound { type_name: class_path.into(), member: "new".into() })
    }

    fn invoke(&self, _target: &Value, method: &str, args: &[Value]) -> Result<Value, HostError> {
        match method {
            "Add" => match (&args[0], &args[1]) {
                (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a + b)),
                _ => Err(HostError::ArgumentTypeMismatch {
                    member: "Add".into(),
                    detail: "expected two integers".into(),
                }),
            },
            "Fail" => Err(HostError::InvocationThrew("kaput".into())),
            other => Err(HostError::MemberNotFound {
                type_name: "Math".into(),
                member: other.into(),
            }),
        }
    }

    fn get_property(&self, _target: &Value, name: &str) -> Result<Value, HostError> {
        Err(HostError::MemberNotFound { type_name: "Math".into(), member: name.into() })
    }

    fn set_property(&self, _target: &Value, name: &str, _value: Value) -> Result<(), HostError> {
        Err(HostError::NoAccessibleSetter { type_name: "Math".into(), member: name.into() })
    }
}

#[test]
fn static_host_call_goes_through_the_invoker() {
    let mut interp = Interpreter::new(parse(
        r#"
EXTERN FUNCTION Main(args[])
    RETURN Sys.Math.Add(40, 2)
END FUNCTION
"#,
    ));
    interp.set_host(Arc::new(ArithmeticHost));
    let v = interp.run().expect("run failed");
    assert!(matches!(v, Value::Integer(42)));
}

#[test]
fn host_exception_is_catchable_and_exposed() {
    let mut interp = Interpreter::new(parse(
        r#"
EXTERN FUNCTION Main(args[])
    TRY
        Sys.Math.Fail()
    CATCH
        RETURN EXCEPTION
    END TRY
    RETURN "unreached"
END FUNCTION
"#,
    ));
    interp.set_host(Arc::new(ArithmeticHost));
    match interp.run().expect("run failed") {
        Value::Str(s) => assert_eq!(s, "kaput"),
        other => panic!("unexpected {other}"),
    }
}

#[test]
fn missing_host_member_is_an_invocation_error() {
    let mut interp = Interpreter::new(parse(
        r#"
EXTERN FUNCTION Main(args[])
    RETURN Sys.Missing.Call()
END FUNCTION
"#,
    ));
    let err = interp.run().expect_err("null invoker should fail");
    assert_eq!(err.kind, ErrorKind::Invocation);
}

#[test]
fn string_concatenation_and_comparison() {
    let v = run_src(
        r#"
EXTERN FUNCTION Main(args[])
    VARIABLE greeting = "count: " + 3
    IF "abc" < "abd" THEN
        RETURN greeting
    END IF
    RETURN "wrong order"
END FUNCTION
"#,
    );
    match v {
        Value::Str(s) => assert_eq!(s, "count: 3"),
        other => panic!("unexpected {other}"),
    }
}
