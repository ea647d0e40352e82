/*

 ▄▄▄▄    ██▓    ▄▄▄       ▄████▄   ██ ▄█▀ ██▀███   █    ██   ██████  ██░ ██
▓█████▄ ▓██▒   ▒████▄    ▒██▀ ▀█   ██▄█▒ ▓██ ▒ ██▒ ██  ▓██▒▒██    ▒ ▓██░ ██▒
▒██▒ ▄██▒██░   ▒██  ▀█▄  ▒▓█    ▄ ▓███▄░ ▓██ ░▄█ ▒▓██  ▒██░░ ▓██▄   ▒██▀▀██░
▒██░█▀  ▒██░   ░██▄▄▄▄██ ▒▓▓▄ ▄██▒▓██ █▄ ▒██▀▀█▄  ▓▓█  ░██░  ▒   ██▒░▓█ ░██
░▓█  ▀█▓░██████▒▓█   ▓██▒▒ ▓███▀ ░▒██▒ █▄░██▓ ▒██▒▒▒█████▓ ▒██████▒▒░▓█▒░██▓
░▒▓███▀▒░ ▒░▓  ░▒▒   ▓▒█░░ ░▒ ▒  ░▒ ▒▒ ▓▒░ ▒▓ ░▒▓░░▒▓▒ ▒ ▒ ▒ ▒▓▒ ▒ ░ ▒ ░░▒░▒
▒░▒   ░ ░ ░ ▒  ░ ▒   ▒▒ ░  ░  ▒   ░ ░▒ ▒░  ░▒ ░ ▒░░░▒░ ░ ░ ░ ░▒  ░ ░ ▒ ░▒░ ░
 ░    ░   ░ ░    ░   ▒   ░        ░ ░░ ░   ░░   ░  ░░░ ░ ░ ░  ░  ░   ░  ░░ ░
 ░          ░  ░     ░  ░░ ░      ░  ░      ░        ░           ░   ░  ░  ░
      ░                  ░
Copyright (C) 2026, Blackrush LLC, All Rights Reserved
Created by Erik Olson, Tarpon Springs, Florida
For more information, visit BlackrushDrive.com

MIT License

Copyright (c) 2026 Erik Lee Olson for Blackrush, LLC

Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.

THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.

*/
//! Tree-walking interpreter for BaZic with a cooperative debugger.
//!
//! The engine runs on its own thread. A controller drives it through
//! [`Interpreter`]: pause/resume/stop requests travel over a channel the
//! engine polls at statement boundaries, and every state transition is
//! mirrored onto an ordered event stream. One executor serves both the
//! structured AST and the optimizer's lowered label/jump form.

mod debug;
mod host;
mod value;

pub use debug::{DebugSnapshot, EngineEvent, ErrorKind, ExecError, State};
pub use host::{ClassHandle, HostError, HostInvoker, HostObject, NullInvoker};
pub use value::{values_equal, Value, ValueError};

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bazic_ast::{BinOp, Expr, ExprKind, Method, NodeId, Program, Stmt, StmtKind};
use bazic_common::BazicError;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::debug::Request;
use crate::value::{self as ops, Relation};

pub type RunResult = Result<Value, ExecError>;

/// Why execution is leaving the current path. Exceptions unwind until a
/// TRY/CATCH catches them; the other two unwind all the way out.
enum Unwind {
    Exception(Value),
    Fatal(ExecError),
    Stopped,
}

type Exec<T> = Result<T, Unwind>;

/// Signal a statement list hands back to its caller. `Goto` targets a label
/// that was not in the list it escaped from; some enclosing list owns it.
enum Flow {
    Normal,
    Return(Value),
    Break,
    Goto(String),
}

type Globals = Arc<Mutex<HashMap<NodeId, Value>>>;

struct Frame {
    locals: HashMap<NodeId, Value>,
}

/// Controller handle. Owns the engine thread and the channels into it.
pub struct Interpreter {
    program: Arc<Program>,
    host: Arc<dyn HostInvoker>,
    state: Arc<Mutex<State>>,
    line: Arc<Mutex<Option<u32>>>,
    requests: Sender<Request>,
    // Taken by the engine on start; a second start finds it empty.
    requests_rx: Option<Receiver<Request>>,
    events_tx: Sender<EngineEvent>,
    events_rx: Receiver<EngineEvent>,
    result: Arc<Mutex<Option<RunResult>>>,
    engine: Option<JoinHandle<()>>,
}

impl Interpreter {
    pub fn new(program: Program) -> Self {
        let (requests, requests_rx) = unbounded();
        let (events_tx, events_rx) = unbounded();
        Self {
            program: Arc::new(program),
            host: Arc::new(NullInvoker),
            state: Arc::new(Mutex::new(State::Ready)),
            line: Arc::new(Mutex::new(None)),
            requests,
            requests_rx: Some(requests_rx),
            events_tx,
            events_rx,
            result: Arc::new(Mutex::new(None)),
            engine: None,
        }
    }

    /// Replace the default null invoker. Must happen before starting.
    pub fn set_host(&mut self, host: Arc<dyn HostInvoker>) {
        self.host = host;
    }

    pub fn state(&self) -> State {
        *self.state.lock()
    }

    pub fn snapshot(&self) -> DebugSnapshot {
        DebugSnapshot { state: self.state(), line: *self.line.lock() }
    }

    /// Ordered stream of state transitions, trace lines and errors. Clones
    /// share one queue, so a single consumer should drain it.
    pub fn events(&self) -> Receiver<EngineEvent> {
        self.events_rx.clone()
    }

    /// The run's outcome, once a terminal state is reached. `None` while
    /// running and after an externally requested stop.
    pub fn result(&self) -> Option<RunResult> {
        self.result.lock().clone()
    }

    pub fn start_debug(&mut self, break_on_entry: bool) -> bazic_common::Result<()> {
        self.start_with_args(break_on_entry, Vec::new())
    }

    /// Start the engine thread. `args` becomes the entry point's array
    /// parameter.
    pub fn start_with_args(
        &mut self,
        break_on_entry: bool,
        args: Vec<Value>,
    ) -> bazic_common::Result<()> {
        let requests_rx = self
            .requests_rx
            .take()
            .ok_or_else(|| BazicError("interpreter already started".into()))?;
        let mut engine = Engine {
            program: Arc::clone(&self.program),
            host: Arc::clone(&self.host),
            globals: Arc::new(Mutex::new(HashMap::new())),
            events: self.events_tx.clone(),
            state: Arc::clone(&self.state),
            line: Arc::clone(&self.line),
            requests: Some(requests_rx),
            frames: Vec::new(),
            current_exception: None,
            workers: Vec::new(),
        };
        let result = Arc::clone(&self.result);
        self.engine = Some(thread::spawn(move || {
            if let Some(r) = engine.run(args, break_on_entry) {
                *result.lock() = Some(r);
            }
        }));
        Ok(())
    }

    pub fn pause(&self) {
        let _ = self.requests.send(Request::Pause);
    }

    pub fn resume(&self) {
        let _ = self.requests.send(Request::Resume);
    }

    pub fn stop(&self) {
        let _ = self.requests.send(Request::Stop);
    }

    /// Block until the engine thread exits, then return the run's outcome.
    pub fn join(&mut self) -> Option<RunResult> {
        if let Some(handle) = self.engine.take() {
            let _ = handle.join();
        }
        self.result()
    }

    /// Run to completion with no debugging.
    pub fn run(&mut self) -> RunResult {
        if let Err(e) = self.start_debug(false) {
            return Err(ExecError::new(ErrorKind::Invocation, e.to_string()));
        }
        match self.join() {
            Some(r) => r,
            None => Err(ExecError::new(ErrorKind::Invocation, "run was stopped before completion")),
        }
    }
}

struct Engine {
    program: Arc<Program>,
    host: Arc<dyn HostInvoker>,
    globals: Globals,
    events: Sender<EngineEvent>,
    state: Arc<Mutex<State>>,
    line: Arc<Mutex<Option<u32>>>,
    /// `None` on worker threads: workers never observe debug requests and
    /// never transition the shared state machine.
    requests: Option<Receiver<Request>>,
    frames: Vec<Frame>,
    current_exception: Option<Value>,
    workers: Vec<JoinHandle<()>>,
}

impl Engine {
    fn run(&mut self, args: Vec<Value>, break_on_entry: bool) -> Option<RunResult> {
        self.set_state(State::Preparing);
        let program = Arc::clone(&self.program);
        if let Err(u) = self.prepare(&program) {
            return self.finish_err(u);
        }
        let entry = match program.entry_point() {
            Some(m) => m.clone(),
            None => {
                let u = self.fatal(ErrorKind::Invocation, "program declares no entry point");
                return self.finish_err(u);
            }
        };
        self.set_state(State::Running);
        if break_on_entry {
            if let Err(u) = self.suspend("break on entry") {
                return self.finish_err(u);
            }
        }
        match self.run_method(&entry, vec![Value::array(args)]) {
            Ok(v) => {
                self.join_workers();
                if self.stop_requested() {
                    self.set_state(State::Stopped);
                    None
                } else {
                    let _ = self.events.send(EngineEvent::Returned(v.clone()));
                    self.set_state(State::Idle);
                    Some(Ok(v))
                }
            }
            Err(u) => self.finish_err(u),
        }
    }

    fn finish_err(&mut self, u: Unwind) -> Option<RunResult> {
        self.join_workers();
        match u {
            Unwind::Stopped => {
                self.set_state(State::Stopped);
                None
            }
            Unwind::Exception(v) => {
                let e = ExecError::new(ErrorKind::UnhandledException, v.to_string());
                let _ = self.events.send(EngineEvent::Error(e.clone()));
                self.set_state(State::StoppedWithError);
                Some(Err(e))
            }
            Unwind::Fatal(e) => {
                let _ = self.events.send(EngineEvent::Error(e.clone()));
                self.set_state(State::StoppedWithError);
                Some(Err(e))
            }
        }
    }

    /// Resolve capabilities against the host, then initialize the global
    /// scope: declared globals (constant defaults), control accessors and
    /// binding targets for UI programs.
    fn prepare(&mut self, program: &Program) -> Exec<()> {
        for ns in &program.required_capabilities {
            let _ = self.events.send(EngineEvent::Log(format!("resolving capability '{ns}'")));
            if let Err(e) = self.host.resolve_capability(ns) {
                return Err(self.fatal(
                    ErrorKind::Invocation,
                    format!("capability '{ns}' could not be resolved: {e}"),
                ));
            }
        }
        for g in &program.globals {
            if let StmtKind::VariableDecl { is_array, default, .. } = &g.kind {
                let v = self.initial_value(default.as_ref(), *is_array)?;
                self.globals.lock().insert(g.info.id, v);
            }
        }
        if let Some(ui) = &program.ui {
            for acc in &ui.control_accessors {
                self.globals.lock().insert(acc.info.id, Value::Null);
            }
            for b in &ui.bindings {
                let v = self.initial_value(b.default.as_ref(), b.is_array)?;
                self.globals.lock().insert(b.info.id, v);
            }
        }
        Ok(())
    }

    fn initial_value(&mut self, default: Option<&Expr>, is_array: bool) -> Exec<Value> {
        match default {
            Some(e) => self.eval(e),
            None if is_array => Ok(Value::array(Vec::new())),
            None => Ok(Value::Null),
        }
    }

    fn run_method(&mut self, method: &Method, args: Vec<Value>) -> Exec<Value> {
        let _ = self.events.send(EngineEvent::Log(format!("entering method '{}'", method.name)));
        let mut locals = HashMap::new();
        let mut args = args.into_iter();
        for param in &method.params {
            locals.insert(param.info.id, args.next().unwrap_or(Value::Null));
        }
        self.frames.push(Frame { locals });
        let flow = self.exec_block(&method.body);
        self.frames.pop();
        match flow? {
            Flow::Return(v) => Ok(v),
            _ => Ok(Value::Null),
        }
    }

    /// Execute a statement list. Lowered lists are walked with an explicit
    /// instruction pointer over a label→index map; a `Goto` whose label is
    /// not in this list unwinds to the list that owns it.
    fn exec_block(&mut self, stmts: &[Stmt]) -> Exec<Flow> {
        let mut labels: HashMap<&str, usize> = HashMap::new();
        for (n, s) in stmts.iter().enumerate() {
            if let StmtKind::Label(name) = &s.kind {
                labels.insert(name.as_str(), n);
            }
        }
        let mut ip = 0usize;
        while ip < stmts.len() {
            let stmt = &stmts[ip];
            if self.requests.is_some() {
                *self.line.lock() = Some(stmt.info.line);
            }
            self.boundary()?;
            match &stmt.kind {
                StmtKind::VariableDecl { is_array, default, .. } => {
                    let v = self.initial_value(default.as_ref(), *is_array)?;
                    if let Some(frame) = self.frames.last_mut() {
                        frame.locals.insert(stmt.info.id, v);
                    }
                }
                StmtKind::Assign { target, value } => {
                    let v = self.eval(value)?;
                    self.assign(target, v)?;
                }
                StmtKind::ExprStmt(e) => {
                    self.eval(e)?;
                }
                StmtKind::Return(e) => {
                    let v = match e {
                        Some(e) => self.eval(e)?,
                        None => Value::Null,
                    };
                    return Ok(Flow::Return(v));
                }
                StmtKind::Throw(e) => {
                    let v = self.eval(e)?;
                    return Err(Unwind::Exception(v));
                }
                StmtKind::Break => return Ok(Flow::Break),
                StmtKind::Breakpoint => {
                    if self.requests.is_some() {
                        let _ =
                            self.events.send(EngineEvent::BreakpointHit { line: stmt.info.line });
                        self.suspend("breakpoint")?;
                    }
                }
                StmtKind::Condition { test, then_body, else_body } => {
                    let flow = if self.eval(test)?.is_truthy() {
                        self.exec_block(then_body)?
                    } else {
                        self.exec_block(else_body)?
                    };
                    match flow {
                        Flow::Normal => {}
                        Flow::Goto(lbl) => match labels.get(lbl.as_str()) {
                            Some(&n) => {
                                ip = n + 1;
                                continue;
                            }
                            None => return Ok(Flow::Goto(lbl)),
                        },
                        other => return Ok(other),
                    }
                }
                StmtKind::Iteration { test, post_test, body } => {
                    let mut escape = None;
                    loop {
                        if !*post_test && !self.eval(test)?.is_truthy() {
                            break;
                        }
                        match self.exec_block(body)? {
                            Flow::Normal => {}
                            Flow::Break => break,
                            other => {
                                escape = Some(other);
                                break;
                            }
                        }
                        if *post_test && !self.eval(test)?.is_truthy() {
                            break;
                        }
                    }
                    match escape {
                        None => {}
                        Some(Flow::Goto(lbl)) => match labels.get(lbl.as_str()) {
                            Some(&n) => {
                                ip = n + 1;
                                continue;
                            }
                            None => return Ok(Flow::Goto(lbl)),
                        },
                        Some(other) => return Ok(other),
                    }
                }
                StmtKind::TryCatch { try_body, catch_body } => {
                    let flow = match self.exec_block(try_body) {
                        Err(Unwind::Exception(v)) => {
                            let saved = self.current_exception.take();
                            self.current_exception = Some(v);
                            let caught = self.exec_block(catch_body);
                            self.current_exception = saved;
                            caught?
                        }
                        other => other?,
                    };
                    match flow {
                        Flow::Normal => {}
                        Flow::Goto(lbl) => match labels.get(lbl.as_str()) {
                            Some(&n) => {
                                ip = n + 1;
                                continue;
                            }
                            None => return Ok(Flow::Goto(lbl)),
                        },
                        other => return Ok(other),
                    }
                }
                StmtKind::Label(_) => {}
                StmtKind::LabelCondition { test, target } => {
                    if self.eval(test)?.is_truthy() {
                        match labels.get(target.as_str()) {
                            Some(&n) => {
                                ip = n + 1;
                                continue;
                            }
                            None => return Ok(Flow::Goto(target.clone())),
                        }
                    }
                }
                StmtKind::Goto(target) => match labels.get(target.as_str()) {
                    Some(&n) => {
                        ip = n + 1;
                        continue;
                    }
                    None => return Ok(Flow::Goto(target.clone())),
                },
            }
            ip += 1;
        }
        Ok(Flow::Normal)
    }

    fn eval(&mut self, e: &Expr) -> Exec<Value> {
        match &e.kind {
            ExprKind::Primitive(p) => Ok(Value::from_primitive(p)),
            ExprKind::VariableRef { name, declaration } => self.load_var(*declaration, name),
            ExprKind::PropertyRef { target, name } => {
                let tv = self.eval(target)?;
                let r = self.host.get_property(&tv, name);
                self.host_result(r)
            }
            ExprKind::Indexer { target, indexes } => {
                let mut cur = self.eval(target)?;
                for idx in indexes {
                    let n = self.index_of(idx)?;
                    let next = {
                        let items = self.as_array(&cur)?;
                        let items = items.read();
                        match items.get(n) {
                            Some(v) => v.clone(),
                            None => return Err(Self::out_of_range(n)),
                        }
                    };
                    cur = next;
                }
                Ok(cur)
            }
            ExprKind::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs),
            ExprKind::Not(inner) => {
                let v = self.eval(inner)?;
                Ok(Value::Bool(!v.is_truthy()))
            }
            ExprKind::Instantiate { class, args } => {
                let path = match &class.kind {
                    ExprKind::ClassRef { namespace, name } => Self::class_path(namespace, name),
                    _ => return Err(self.fatal(ErrorKind::Invocation, "NEW requires a type name")),
                };
                let argv = self.eval_list(args)?;
                let r = self.host.instantiate(&path, &argv);
                self.host_result(r)
            }
            ExprKind::ArrayCreation(items) => {
                let items = self.eval_list(items)?;
                Ok(Value::array(items))
            }
            ExprKind::InvokeMethod { name, args, awaited } => {
                let argv = self.eval_list(args)?;
                self.call_method(name, argv, *awaited)
            }
            ExprKind::InvokeHostMethod { target, method, args, .. } => {
                let tv = self.eval(target)?;
                let argv = self.eval_list(args)?;
                let r = self.host.invoke(&tv, method, &argv);
                self.host_result(r)
            }
            ExprKind::ClassRef { namespace, name } => {
                let path = Self::class_path(namespace, name);
                Ok(Value::Object(Arc::new(ClassHandle { path })))
            }
            ExprKind::ExceptionRef => Ok(self.current_exception.clone().unwrap_or(Value::Null)),
        }
    }

    fn eval_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Exec<Value> {
        match op {
            // AND/OR short-circuit on booleans; integer operands fall
            // through to the bitwise forms, which need both sides.
            BinOp::LogicalAnd | BinOp::BitwiseAnd => {
                let a = self.eval(lhs)?;
                if matches!(a, Value::Bool(false)) {
                    return Ok(Value::Bool(false));
                }
                let b = self.eval(rhs)?;
                self.lift(ops::and(&a, &b))
            }
            BinOp::LogicalOr | BinOp::BitwiseOr => {
                let a = self.eval(lhs)?;
                if matches!(a, Value::Bool(true)) {
                    return Ok(Value::Bool(true));
                }
                let b = self.eval(rhs)?;
                self.lift(ops::or(&a, &b))
            }
            BinOp::Equality => {
                let (a, b) = self.eval_pair(lhs, rhs)?;
                Ok(Value::Bool(values_equal(&a, &b)))
            }
            BinOp::LessThan => {
                let (a, b) = self.eval_pair(lhs, rhs)?;
                self.lift(ops::compare(Relation::Less, &a, &b))
            }
            BinOp::LessThanOrEqual => {
                let (a, b) = self.eval_pair(lhs, rhs)?;
                self.lift(ops::compare(Relation::LessEq, &a, &b))
            }
            BinOp::GreaterThan => {
                let (a, b) = self.eval_pair(lhs, rhs)?;
                self.lift(ops::compare(Relation::Greater, &a, &b))
            }
            BinOp::GreaterThanOrEqual => {
                let (a, b) = self.eval_pair(lhs, rhs)?;
                self.lift(ops::compare(Relation::GreaterEq, &a, &b))
            }
            BinOp::Addition => {
                let (a, b) = self.eval_pair(lhs, rhs)?;
                self.lift(ops::add(&a, &b))
            }
            BinOp::Subtraction => {
                let (a, b) = self.eval_pair(lhs, rhs)?;
                self.lift(ops::subtract(&a, &b))
            }
            BinOp::Multiply => {
                let (a, b) = self.eval_pair(lhs, rhs)?;
                self.lift(ops::multiply(&a, &b))
            }
            BinOp::Division => {
                let (a, b) = self.eval_pair(lhs, rhs)?;
                self.lift(ops::divide(&a, &b))
            }
            BinOp::Modulus => {
                let (a, b) = self.eval_pair(lhs, rhs)?;
                self.lift(ops::modulus(&a, &b))
            }
        }
    }

    fn assign(&mut self, target: &Expr, value: Value) -> Exec<()> {
        match &target.kind {
            ExprKind::VariableRef { name, declaration } => {
                self.store_var(*declaration, name, value)
            }
            ExprKind::Indexer { target, indexes } => self.assign_index(target, indexes, value),
            ExprKind::PropertyRef { target, name } => {
                let tv = self.eval(target)?;
                let r = self.host.set_property(&tv, name, value);
                self.host_unit(r)
            }
            _ => Err(self.fatal(ErrorKind::Invocation, "assignment target is not a reference")),
        }
    }

    /// Writing one slot past the end appends; anything further is out of
    /// range.
    fn assign_index(&mut self, target: &Expr, indexes: &[Expr], value: Value) -> Exec<()> {
        let Some((last, inner)) = indexes.split_last() else {
            return Err(self.fatal(ErrorKind::Invocation, "indexer has no index"));
        };
        let mut cur = self.eval(target)?;
        for idx in inner {
            let n = self.index_of(idx)?;
            let next = {
                let items = self.as_array(&cur)?;
                let items = items.read();
                match items.get(n) {
                    Some(v) => v.clone(),
                    None => return Err(Self::out_of_range(n)),
                }
            };
            cur = next;
        }
        let n = self.index_of(last)?;
        let items = self.as_array(&cur)?;
        let mut items = items.write();
        if n < items.len() {
            items[n] = value;
        } else if n == items.len() {
            items.push(value);
        } else {
            return Err(Self::out_of_range(n));
        }
        Ok(())
    }

    fn call_method(&mut self, name: &str, args: Vec<Value>, awaited: bool) -> Exec<Value> {
        let method = match self.program.method(name) {
            Some(m) => m.clone(),
            None => {
                return Err(self.fatal(ErrorKind::Invocation, format!("method '{name}' was not found")))
            }
        };
        if method.is_async && !awaited {
            self.spawn_worker(method, args);
            return Ok(Value::Null);
        }
        // Awaited (or synchronous) calls run inline on this thread, so
        // pause/stop requests keep being serviced inside the callee.
        self.run_method(&method, args)
    }

    fn spawn_worker(&mut self, method: Method, args: Vec<Value>) {
        let _ = self
            .events
            .send(EngineEvent::Log(format!("async method '{}' started", method.name)));
        let mut worker = Engine {
            program: Arc::clone(&self.program),
            host: Arc::clone(&self.host),
            globals: Arc::clone(&self.globals),
            events: self.events.clone(),
            state: Arc::clone(&self.state),
            line: Arc::clone(&self.line),
            requests: None,
            frames: Vec::new(),
            current_exception: None,
            workers: Vec::new(),
        };
        let events = self.events.clone();
        self.workers.push(thread::spawn(move || {
            let outcome = worker.run_method(&method, args);
            worker.join_workers();
            match outcome {
                Ok(_) => {
                    let _ = events
                        .send(EngineEvent::Log(format!("async method '{}' completed", method.name)));
                }
                Err(Unwind::Exception(v)) => {
                    let _ = events.send(EngineEvent::Error(ExecError::new(
                        ErrorKind::UnhandledException,
                        v.to_string(),
                    )));
                }
                Err(Unwind::Fatal(e)) => {
                    let _ = events.send(EngineEvent::Error(e));
                }
                Err(Unwind::Stopped) => {}
            }
        }));
    }

    fn join_workers(&mut self) {
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }

    /// Poll the request channel without blocking. Called at every statement
    /// boundary; workers (no channel) return immediately.
    fn boundary(&mut self) -> Exec<()> {
        let Some(rx) = self.requests.as_ref() else {
            return Ok(());
        };
        let mut pause = false;
        while let Ok(req) = rx.try_recv() {
            match req {
                Request::Pause => pause = true,
                Request::Resume => pause = false,
                Request::Stop => return Err(Unwind::Stopped),
            }
        }
        if pause {
            return self.suspend("pause requested");
        }
        Ok(())
    }

    /// Block until the controller resumes or stops.
    fn suspend(&self, why: &str) -> Exec<()> {
        let Some(rx) = self.requests.as_ref() else {
            return Ok(());
        };
        let _ = self.events.send(EngineEvent::Log(format!("suspended: {why}")));
        self.set_state(State::Pause);
        loop {
            match rx.recv() {
                Ok(Request::Resume) => {
                    self.set_state(State::Running);
                    return Ok(());
                }
                Ok(Request::Stop) => return Err(Unwind::Stopped),
                Ok(Request::Pause) => {}
                // Controller gone, nothing can ever resume us.
                Err(_) => return Err(Unwind::Stopped),
            }
        }
    }

    fn stop_requested(&self) -> bool {
        let Some(rx) = self.requests.as_ref() else {
            return false;
        };
        let mut stop = false;
        while let Ok(req) = rx.try_recv() {
            if req == Request::Stop {
                stop = true;
            }
        }
        stop
    }

    fn set_state(&self, s: State) {
        *self.state.lock() = s;
        let _ = self.events.send(EngineEvent::StateChanged(s));
    }

    fn load_var(&self, id: NodeId, name: &str) -> Exec<Value> {
        if let Some(frame) = self.frames.last() {
            if let Some(v) = frame.locals.get(&id) {
                return Ok(v.clone());
            }
        }
        if let Some(v) = self.globals.lock().get(&id) {
            return Ok(v.clone());
        }
        Err(self.fatal(ErrorKind::Invocation, format!("variable '{name}' is not initialized")))
    }

    fn store_var(&mut self, id: NodeId, name: &str, value: Value) -> Exec<()> {
        if let Some(frame) = self.frames.last_mut() {
            if frame.locals.contains_key(&id) {
                frame.locals.insert(id, value);
                return Ok(());
            }
        }
        {
            let mut globals = self.globals.lock();
            if globals.contains_key(&id) {
                globals.insert(id, value);
                return Ok(());
            }
        }
        Err(self.fatal(ErrorKind::Invocation, format!("variable '{name}' is not initialized")))
    }

    fn eval_list(&mut self, exprs: &[Expr]) -> Exec<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    fn eval_pair(&mut self, lhs: &Expr, rhs: &Expr) -> Exec<(Value, Value)> {
        let a = self.eval(lhs)?;
        let b = self.eval(rhs)?;
        Ok((a, b))
    }

    fn index_of(&mut self, e: &Expr) -> Exec<usize> {
        match self.eval(e)? {
            Value::Integer(i) if i >= 0 => Ok(i as usize),
            Value::Integer(i) => {
                Err(Unwind::Exception(Value::Str(format!("index {i} is out of range"))))
            }
            other => Err(self.fatal(
                ErrorKind::Cast,
                format!("array index must be an integer, got {}", other.type_name()),
            )),
        }
    }

    fn as_array<'v>(&self, v: &'v Value) -> Exec<&'v Arc<parking_lot::RwLock<Vec<Value>>>> {
        match v {
            Value::Array(items) => Ok(items),
            other => Err(self.fatal(ErrorKind::Cast, format!("cannot index a {}", other.type_name()))),
        }
    }

    fn out_of_range(n: usize) -> Unwind {
        Unwind::Exception(Value::Str(format!("index {n} is out of range")))
    }

    fn class_path(namespace: &str, name: &str) -> String {
        if namespace.is_empty() {
            name.to_string()
        } else {
            format!("{namespace}.{name}")
        }
    }

    fn fatal(&self, kind: ErrorKind, message: impl Into<String>) -> Unwind {
        Unwind::Fatal(ExecError::new(kind, message))
    }

    fn lift(&self, r: Result<Value, ValueError>) -> Exec<Value> {
        r.map_err(|e| match e {
            ValueError::Cast(m) => Unwind::Fatal(ExecError::new(ErrorKind::Cast, m)),
            ValueError::Raise(m) => Unwind::Exception(Value::Str(m)),
        })
    }

    fn host_result(&self, r: Result<Value, HostError>) -> Exec<Value> {
        r.map_err(Self::host_unwind)
    }

    fn host_unit(&self, r: Result<(), HostError>) -> Exec<()> {
        r.map_err(Self::host_unwind)
    }

    /// Exceptions thrown by host code are catchable; every other boundary
    /// failure is an invocation error that ends the run.
    fn host_unwind(e: HostError) -> Unwind {
        match e {
            HostError::InvocationThrew(msg) => Unwind::Exception(Value::Str(msg)),
            other => Unwind::Fatal(ExecError::new(ErrorKind::Invocation, other.to_string())),
        }
    }
}
