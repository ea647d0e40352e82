//! Debugger protocol coverage: state transition order, breakpoint
//! suspension, pause/resume and cooperative stop.

use std::time::Duration;

use bazic_common::Severity;
use bazic_interpreter::{EngineEvent, Interpreter, State, Value};
use crossbeam_channel::Receiver;

fn parse(src: &str) -> bazic_ast::Program {
    let out = bazic_parser::parse(src);
    let errors: Vec<_> =
        out.diagnostics.iter().filter(|d| d.severity == Severity::Error).collect();
    assert!(errors.is_empty(), "unexpected parse errors: {errors:?}");
    out.program.expect("program")
}

fn wait_for(
    events: &Receiver<EngineEvent>,
    mut pred: impl FnMut(&EngineEvent) -> bool,
) -> EngineEvent {
    loop {
        let ev = events
            .recv_timeout(Duration::from_secs(10))
            .expect("timed out waiting for engine event");
        if pred(&ev) {
            return ev;
        }
    }
}

#[test]
fn plain_run_walks_preparing_running_idle() {
    let mut interp = Interpreter::new(parse(
        r#"
EXTERN FUNCTION Main(args[])
    RETURN 7
END FUNCTION
"#,
    ));
    let events = interp.events();
    interp.start_debug(false).expect("start");
    let result = interp.join().expect("result");
    assert!(matches!(result, Ok(Value::Integer(7))));
    assert_eq!(interp.state(), State::Idle);

    let mut states = Vec::new();
    while let Ok(ev) = events.try_recv() {
        if let EngineEvent::StateChanged(s) = ev {
            states.push(s);
        }
    }
    assert_eq!(states, vec![State::Preparing, State::Running, State::Idle]);
}

#[test]
fn breakpoint_suspends_until_resume() {
    let mut interp = Interpreter::new(parse(
        r#"
EXTERN FUNCTION Main(args[])
    BREAKPOINT
    RETURN 7
END FUNCTION
"#,
    ));
    let events = interp.events();
    interp.start_debug(false).expect("start");

    let hit = wait_for(&events, |ev| matches!(ev, EngineEvent::BreakpointHit { .. }));
    match hit {
        EngineEvent::BreakpointHit { line } => assert_eq!(line, 3),
        _ => unreachable!(),
    }
    wait_for(&events, |ev| matches!(ev, EngineEvent::StateChanged(State::Pause)));
    assert_eq!(interp.state(), State::Pause);
    let snap = interp.snapshot();
    assert_eq!(snap.state, State::Pause);
    assert_eq!(snap.line, Some(3));

    interp.resume();
    let result = interp.join().expect("result");
    assert!(matches!(result, Ok(Value::Integer(7))));
    assert_eq!(interp.state(), State::Idle);
}

#[test]
fn break_on_entry_pauses_before_the_first_statement() {
    let mut interp = Interpreter::new(parse(
        r#"
EXTERN FUNCTION Main(args[])
    RETURN 1
END FUNCTION
"#,
    ));
    let events = interp.events();
    interp.start_debug(true).expect("start");

    wait_for(&events, |ev| matches!(ev, EngineEvent::StateChanged(State::Pause)));
    assert_eq!(interp.state(), State::Pause);
    assert!(interp.result().is_none());

    interp.resume();
    let result = interp.join().expect("result");
    assert!(matches!(result, Ok(Value::Integer(1))));
}

#[test]
fn pause_is_observed_at_a_statement_boundary() {
    let mut interp = Interpreter::new(parse(
        r#"
EXTERN FUNCTION Main(args[])
    VARIABLE n = 0
    DO WHILE 1 = 1
        n = n + 1
    LOOP
    RETURN n
END FUNCTION
"#,
    ));
    let events = interp.events();
    interp.start_debug(false).expect("start");
    wait_for(&events, |ev| matches!(ev, EngineEvent::StateChanged(State::Running)));

    interp.pause();
    wait_for(&events, |ev| matches!(ev, EngineEvent::StateChanged(State::Pause)));
    assert_eq!(interp.state(), State::Pause);

    interp.stop();
    assert!(interp.join().is_none());
    assert_eq!(interp.state(), State::Stopped);
}

#[test]
fn stop_while_paused_yields_stopped_and_no_result() {
    let mut interp = Interpreter::new(parse(
        r#"
EXTERN FUNCTION Main(args[])
    BREAKPOINT
    RETURN "never"
END FUNCTION
"#,
    ));
    let events = interp.events();
    interp.start_debug(false).expect("start");
    wait_for(&events, |ev| matches!(ev, EngineEvent::StateChanged(State::Pause)));

    interp.stop();
    assert!(interp.join().is_none());
    assert_eq!(interp.state(), State::Stopped);
}

#[test]
fn runtime_error_lands_in_stopped_with_error() {
    let mut interp = Interpreter::new(parse(
        r#"
EXTERN FUNCTION Main(args[])
    THROW "fatal"
END FUNCTION
"#,
    ));
    let events = interp.events();
    interp.start_debug(false).expect("start");
    let result = interp.join().expect("result");
    assert!(result.is_err());
    assert_eq!(interp.state(), State::StoppedWithError);

    let saw_error = {
        let mut found = false;
        while let Ok(ev) = events.try_recv() {
            if matches!(ev, EngineEvent::Error(_)) {
                found = true;
            }
        }
        found
    };
    assert!(saw_error, "expected a classified error event");
}

#[test]
fn second_start_is_rejected() {
    let mut interp = Interpreter::new(parse(
        r#"
EXTERN FUNCTION Main(args[])
    RETURN 0
END FUNCTION
"#,
    ));
    interp.start_debug(false).expect("first start");
    assert!(interp.start_debug(false).is_err());
    interp.join();
}
