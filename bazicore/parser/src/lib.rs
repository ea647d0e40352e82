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

//! Recursive-descent parser with semantic analysis for BaZic.
//!
//! Error-tolerant: problems accumulate as `Diagnostic`s and parsing presses
//! on, so one call surfaces as many real issues as possible. A `None` program
//! comes back only for an empty token stream or unparsable markup. All parse
//! state lives in a per-call `Session`; nothing is shared between calls.

mod expr;
pub mod markup;

pub use markup::{MarkupProvider, StaticMarkup};

use std::collections::HashMap;

use bazic_ast::{
    BindingDecl, ControlAccessorDecl, EventBinding, Expr, ExprKind, Method, NodeId, NodeInfo,
    Param, Primitive, Program, Stmt, StmtKind, UiModel, ENTRY_POINT_NAME,
};
use bazic_common::Diagnostic;
use bazic_lexer::{tokenize, Token, TokenKind};

#[derive(Debug)]
pub struct ParseResult {
    pub program: Option<Program>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse a plain (non-UI) BaZic program.
pub fn parse(source: &str) -> ParseResult {
    parse_with_markup(source, None, None)
}

/// Parse a program, optionally validating UI bindings against `markup`
/// through the injected provider.
pub fn parse_with_markup(
    source: &str,
    markup: Option<&str>,
    provider: Option<&dyn MarkupProvider>,
) -> ParseResult {
    let tokens = tokenize(source);
    if tokens.iter().all(|t| t.is_separator() || t.kind == TokenKind::Eof) {
        return ParseResult { program: None, diagnostics: Vec::new() };
    }

    let mut s = Session::new(tokens, provider);

    if let (Some(text), Some(p)) = (markup, provider) {
        if let Err(msg) = p.load(text) {
            return ParseResult {
                program: None,
                diagnostics: vec![Diagnostic::error(1, 1, 0, 0, format!("markup could not be parsed: {msg}"))],
            };
        }
        s.begin_ui(text);
    }

    let program = s.parse_program();
    ParseResult { program: Some(program), diagnostics: s.diags }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Shape { Scalar, Array, Unknown }

#[derive(Debug, Clone)]
struct VarRec {
    name: String,
    id: NodeId,
    is_array: bool,
    /// Auto-declared (control accessors, bindings): exempt from unused warnings.
    synthetic: bool,
    line: u32,
    refs: u32,
    info: NodeInfo,
}

#[derive(Debug, Default)]
struct Scope {
    vars: Vec<VarRec>,
}

/// Per-declaration facts consulted at use sites, keyed by declaration id.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DeclMeta {
    pub is_array: bool,
    pub read_only: bool,
}

#[derive(Debug)]
struct MethodSig {
    arity: usize,
    is_async: bool,
}

#[derive(Debug)]
struct DeferredInvocation {
    name: String,
    argc: usize,
    awaited: bool,
    info: NodeInfo,
}

pub(crate) struct Snapshot {
    i: usize,
    diags: usize,
    deferred: usize,
}

pub(crate) struct Session<'a> {
    tokens: Vec<Token>,
    i: usize,
    pub(crate) diags: Vec<Diagnostic>,
    next_id: NodeId,
    scopes: Vec<Scope>,
    params: Vec<VarRec>,
    methods: HashMap<String, MethodSig>,
    deferred: Vec<DeferredInvocation>,
    /// Expected closers for currently open delimiters, innermost last.
    pub(crate) brackets: Vec<(TokenKind, u32, u32)>,
    pub(crate) catch_depth: u32,
    pub(crate) loop_depth: u32,
    pub(crate) decl_index: HashMap<NodeId, DeclMeta>,
    pub(crate) capabilities: Vec<String>,
    markup: Option<&'a dyn MarkupProvider>,
    ui: Option<UiModel>,
}

impl<'a> Session<'a> {
    fn new(tokens: Vec<Token>, markup: Option<&'a dyn MarkupProvider>) -> Self {
        Self {
            tokens,
            i: 0,
            diags: Vec::new(),
            next_id: 0,
            scopes: vec![Scope::default()], // global scope
            params: Vec::new(),
            methods: HashMap::new(),
            deferred: Vec::new(),
            brackets: Vec::new(),
            catch_depth: 0,
            loop_depth: 0,
            decl_index: HashMap::new(),
            capabilities: Vec::new(),
            markup,
            ui: None,
        }
    }

    // Auto-declare a read-only accessor variable per named markup element.
    fn begin_ui(&mut self, markup_text: &str) {
        let mut ui = UiModel { markup: markup_text.to_string(), ..Default::default() };
        let names = self.markup.map(|m| m.element_names()).unwrap_or_default();
        for control in names {
            let info = NodeInfo { id: self.fresh_id(), ..Default::default() };
            self.decl_index.insert(info.id, DeclMeta { is_array: false, read_only: true });
            self.scopes[0].vars.push(VarRec {
                name: control.clone(),
                id: info.id,
                is_array: false,
                synthetic: true,
                line: 0,
                refs: 0,
                info,
            });
            ui.control_accessors.push(ControlAccessorDecl {
                info,
                control: control.clone(),
                variable: control,
            });
        }
        self.ui = Some(ui);
    }

    // ---- program root ----

    fn parse_program(&mut self) -> Program {
        let mut globals = Vec::new();
        let mut methods = Vec::new();

        loop {
            self.skip_separators();
            if self.check(TokenKind::Eof) { break; }
            match self.peek_kind() {
                TokenKind::Variable => {
                    if let Some(st) = self.parse_variable_decl(true) { globals.push(st); }
                }
                TokenKind::Bind => self.parse_binding_decl(),
                TokenKind::Extern | TokenKind::Async | TokenKind::Event | TokenKind::Function => {
                    if let Some(m) = self.parse_method() { methods.push(m); }
                }
                _ => {
                    let t = self.cur().clone();
                    self.error_at(&t, format!(
                        "unexpected '{}': only VARIABLE, BIND and FUNCTION declarations are allowed at program root",
                        t.lexeme
                    ));
                    self.recover_to_separator();
                }
            }
        }

        self.validate_deferred();

        Program {
            globals,
            methods,
            required_capabilities: std::mem::take(&mut self.capabilities),
            is_optimized: false,
            ui: self.ui.take(),
        }
    }

    fn parse_variable_decl(&mut self, is_global: bool) -> Option<Stmt> {
        self.advance(); // VARIABLE
        let name_tok = self.expect_ident("variable name")?;
        let name = name_tok.lexeme.clone();
        let info = self.node_info(&name_tok);

        let is_array = if self.check(TokenKind::LBracket) {
            let open = self.advance();
            self.push_bracket(TokenKind::RBracket, &open);
            self.expect_closer();
            true
        } else {
            false
        };

        let default = if self.match_k(TokenKind::Equal) { Some(self.parse_expr()) } else { None };
        self.terminate_stmt();

        if let Some(prev) = self.lookup_var(&name) {
            let line = prev.line;
            self.error_at(&name_tok, format!("variable '{}' is already declared at line {}", name, line));
            return None;
        }

        if let Some(d) = &default {
            match self.shape_of(d) {
                Shape::Array if !is_array => {
                    self.error_info(&info, format!("cannot assign an array value to scalar variable '{}'", name));
                }
                Shape::Scalar if is_array => {
                    self.error_info(&info, format!("cannot assign a scalar value to array variable '{}'", name));
                }
                _ => {}
            }
            if is_global && !d.is_constant() {
                self.error_info(&info, format!(
                    "initializer of global variable '{}' must be a constant expression",
                    name
                ));
            }
        }

        self.declare_var(name.clone(), info, is_array, false, false);
        Some(Stmt { info, kind: StmtKind::VariableDecl { name, is_array, default } })
    }

    // BIND Ctrl.Property = expr — declares the bound variable `Ctrl_Prop`.
    fn parse_binding_decl(&mut self) {
        let bind_tok = self.cur().clone();
        self.advance(); // BIND
        let ctrl_tok = match self.expect_ident("control name") { Some(t) => t, None => { self.recover_to_separator(); return; } };
        if !self.match_k(TokenKind::Dot) {
            self.error_here("expected '.' after control name in BIND declaration");
            self.recover_to_separator();
            return;
        }
        let prop_tok = match self.expect_ident("property name") { Some(t) => t, None => { self.recover_to_separator(); return; } };
        let is_array = if self.check(TokenKind::LBracket) {
            let open = self.advance();
            self.push_bracket(TokenKind::RBracket, &open);
            self.expect_closer();
            true
        } else {
            false
        };
        let default = if self.match_k(TokenKind::Equal) { Some(self.parse_expr()) } else { None };
        self.terminate_stmt();

        let control = ctrl_tok.lexeme.clone();
        let property = prop_tok.lexeme.clone();
        let info = self.node_info(&ctrl_tok);

        match self.markup {
            None => {
                self.error_at(&bind_tok, "BIND declarations require markup".to_string());
                return;
            }
            Some(m) => {
                if !m.has_element(&control) {
                    self.error_at(&ctrl_tok, format!("markup defines no element named '{}'", control));
                } else if !m.has_property(&control, &property) {
                    self.error_at(&prop_tok, format!("element '{}' has no property '{}'", control, property));
                }
            }
        }

        if let Some(d) = &default {
            if !d.is_constant() {
                self.error_info(&info, format!(
                    "initializer of binding '{}.{}' must be a constant expression",
                    control, property
                ));
            }
        }

        let var_name = format!("{}_{}", control, property);
        if let Some(prev) = self.lookup_var(&var_name) {
            let line = prev.line;
            self.error_at(&ctrl_tok, format!("variable '{}' is already declared at line {}", var_name, line));
            return;
        }
        self.declare_var(var_name, info, is_array, false, true);

        if let Some(ui) = self.ui.as_mut() {
            ui.bindings.push(BindingDecl { info, control, property, is_array, default });
        }
    }

    // ---- methods ----

    fn parse_method(&mut self) -> Option<Method> {
        let is_entry_point = self.match_k(TokenKind::Extern);
        let is_event = if is_entry_point { false } else { self.match_k(TokenKind::Event) };
        let is_async = self.match_k(TokenKind::Async);
        if !self.match_k(TokenKind::Function) {
            self.error_here("expected FUNCTION");
            self.recover_to_separator();
            return None;
        }
        let name_tok = self.expect_ident("method name")?;
        let name = name_tok.lexeme.clone();
        let info = self.node_info(&name_tok);

        // Parameters; visible-parameter table starts fresh per method.
        self.params.clear();
        let mut params = Vec::new();
        let open = self.cur().clone();
        if self.match_k(TokenKind::LParen) {
            self.push_bracket(TokenKind::RParen, &open);
            self.skip_separators();
            if !self.check(TokenKind::RParen) {
                loop {
                    if let Some(p) = self.parse_param() { params.push(p); }
                    self.skip_separators();
                    if !self.match_k(TokenKind::Comma) { break; }
                    self.skip_separators();
                }
            }
            self.expect_closer();
        } else {
            self.error_here("expected '(' after method name");
        }
        self.terminate_stmt();

        if self.methods.contains_key(&name) {
            self.error_at(&name_tok, format!("method '{}' already declared", name));
        } else {
            self.methods.insert(name.clone(), MethodSig { arity: params.len(), is_async });
        }

        self.push_scope();
        let body = self.parse_block(&[BlockStop::EndFunction]);
        self.pop_scope_with_warnings();
        self.expect_end_pair(TokenKind::Function, "END FUNCTION");

        if is_entry_point {
            if name != ENTRY_POINT_NAME {
                self.error_at(&name_tok, format!("entry point method must be named '{}'", ENTRY_POINT_NAME));
            }
            if params.len() != 1 || !params[0].is_array {
                self.error_at(&name_tok, format!(
                    "entry point method '{}' must take exactly one array parameter",
                    ENTRY_POINT_NAME
                ));
            }
            if is_async {
                self.error_at(&name_tok, format!("entry point method '{}' cannot be asynchronous", ENTRY_POINT_NAME));
            }
        }

        if is_event {
            self.bind_event_method(&name_tok, &name, &params, info.id);
        }

        Some(Method { info, name, params, body, is_async, is_entry_point, is_event })
    }

    fn parse_param(&mut self) -> Option<Param> {
        let tok = self.expect_ident("parameter name")?;
        let name = tok.lexeme.clone();
        let info = self.node_info(&tok);
        let is_array = if self.check(TokenKind::LBracket) {
            let open = self.advance();
            self.push_bracket(TokenKind::RBracket, &open);
            self.expect_closer();
            true
        } else {
            false
        };
        if self.params.iter().any(|p| p.name == name) || self.lookup_var(&name).is_some() {
            self.error_at(&tok, format!("variable '{}' is already declared", name));
        } else {
            self.decl_index.insert(info.id, DeclMeta { is_array, read_only: false });
            self.params.push(VarRec {
                name: name.clone(),
                id: info.id,
                is_array,
                synthetic: true,
                line: tok.line,
                refs: 0,
                info,
            });
        }
        Some(Param { info, name, is_array })
    }

    // EVENT FUNCTION Ctrl_Event() — the name encodes the binding.
    fn bind_event_method(&mut self, name_tok: &Token, name: &str, params: &[Param], method_id: NodeId) {
        if !params.is_empty() {
            self.error_at(name_tok, format!("event method '{}' cannot take parameters", name));
        }
        let Some(m) = self.markup else {
            self.error_at(name_tok, "EVENT methods require markup".to_string());
            return;
        };
        let Some((control, event)) = name.rsplit_once('_') else {
            self.error_at(name_tok, format!(
                "event method name '{}' must follow the ControlName_EventName convention",
                name
            ));
            return;
        };
        if !m.has_element(control) {
            self.error_at(name_tok, format!("markup defines no element named '{}'", control));
            return;
        }
        if !m.has_event(control, event) {
            self.error_at(name_tok, format!("element '{}' has no event '{}'", control, event));
            return;
        }
        let info = self.node_info(name_tok);
        if let Some(ui) = self.ui.as_mut() {
            ui.event_bindings.push(EventBinding {
                info,
                control: control.to_string(),
                event: event.to_string(),
                method_id,
            });
        }
    }

    // ---- statements ----

    fn parse_block(&mut self, stops: &[BlockStop]) -> Vec<Stmt> {
        let mut out = Vec::new();
        loop {
            self.skip_separators();
            if self.at_block_stop(stops) { break; }
            if self.check(TokenKind::Eof) {
                self.error_here("unexpected end of file: unterminated block");
                break;
            }
            if let Some(st) = self.parse_stmt() { out.push(st); }
        }
        out
    }

    fn parse_stmt(&mut self) -> Option<Stmt> {
        match self.peek_kind() {
            TokenKind::Variable => self.parse_variable_decl(false),
            TokenKind::Return => self.parse_return(),
            TokenKind::Throw => {
                let tok = self.cur().clone();
                self.advance();
                let e = self.parse_expr();
                self.terminate_stmt();
                let info = self.node_info(&tok);
                Some(Stmt { info, kind: StmtKind::Throw(e) })
            }
            TokenKind::Break => {
                let tok = self.cur().clone();
                self.advance();
                if self.loop_depth == 0 {
                    self.error_at(&tok, "BREAK is only allowed inside a loop".to_string());
                }
                self.terminate_stmt();
                let info = self.node_info(&tok);
                Some(Stmt { info, kind: StmtKind::Break })
            }
            TokenKind::Breakpoint => {
                let tok = self.cur().clone();
                self.advance();
                self.terminate_stmt();
                let info = self.node_info(&tok);
                Some(Stmt { info, kind: StmtKind::Breakpoint })
            }
            TokenKind::If => self.parse_condition(),
            TokenKind::Do => self.parse_iteration(),
            TokenKind::Try => self.parse_try(),
            TokenKind::Function | TokenKind::Async | TokenKind::Extern | TokenKind::Event => {
                let t = self.cur().clone();
                self.error_at(&t, "method declarations are only allowed at program root".to_string());
                self.recover_to_separator();
                None
            }
            _ => self.parse_assign_or_expr(),
        }
    }

    fn parse_return(&mut self) -> Option<Stmt> {
        let tok = self.cur().clone();
        self.advance(); // RETURN
        let value = if self.cur().is_separator()
            || self.check(TokenKind::Eof)
            || self.at_any_stop()
        {
            None
        } else {
            Some(self.parse_expr())
        };
        self.terminate_stmt();
        let info = self.node_info(&tok);
        Some(Stmt { info, kind: StmtKind::Return(value) })
    }

    fn parse_condition(&mut self) -> Option<Stmt> {
        let tok = self.cur().clone();
        self.advance(); // IF
        let test = self.parse_expr();
        if !self.match_k(TokenKind::Then) {
            self.error_here("expected THEN after IF condition");
        }
        self.push_scope();
        let then_body = self.parse_block(&[BlockStop::Else, BlockStop::EndIf]);
        self.pop_scope_with_warnings();
        let else_body = if self.match_k(TokenKind::Else) {
            self.push_scope();
            let b = self.parse_block(&[BlockStop::EndIf]);
            self.pop_scope_with_warnings();
            b
        } else {
            Vec::new()
        };
        self.expect_end_pair(TokenKind::If, "END IF");
        let info = self.node_info(&tok);
        Some(Stmt { info, kind: StmtKind::Condition { test, then_body, else_body } })
    }

    // DO WHILE c ... LOOP  (pre-test)  |  DO ... LOOP WHILE c  (post-test)
    fn parse_iteration(&mut self) -> Option<Stmt> {
        let tok = self.cur().clone();
        self.advance(); // DO
        let mut test = None;
        if self.match_k(TokenKind::While) {
            test = Some(self.parse_expr());
        }
        self.loop_depth += 1;
        self.push_scope();
        let body = self.parse_block(&[BlockStop::Loop]);
        self.pop_scope_with_warnings();
        self.loop_depth -= 1;
        if !self.match_k(TokenKind::Loop) {
            self.error_here("expected LOOP to close DO");
        }
        let post_test = test.is_none();
        if post_test {
            if self.match_k(TokenKind::While) {
                test = Some(self.parse_expr());
            } else {
                self.error_at(&tok, "DO loop requires a WHILE condition".to_string());
            }
        } else if self.check(TokenKind::While) {
            self.error_here("DO WHILE loop already has a condition");
            self.advance();
            let _ = self.parse_expr();
        }
        self.terminate_stmt();
        let info = self.node_info(&tok);
        let test = test.unwrap_or(Expr {
            info: NodeInfo { id: self.fresh_id(), ..Default::default() },
            kind: ExprKind::Primitive(Primitive::Bool(false)),
        });
        Some(Stmt { info, kind: StmtKind::Iteration { test, post_test, body } })
    }

    fn parse_try(&mut self) -> Option<Stmt> {
        let tok = self.cur().clone();
        self.advance(); // TRY
        self.push_scope();
        let try_body = self.parse_block(&[BlockStop::Catch, BlockStop::EndTry]);
        self.pop_scope_with_warnings();
        let catch_body = if self.match_k(TokenKind::Catch) {
            self.catch_depth += 1;
            self.push_scope();
            let b = self.parse_block(&[BlockStop::EndTry]);
            self.pop_scope_with_warnings();
            self.catch_depth -= 1;
            b
        } else {
            self.error_at(&tok, "TRY requires a CATCH block".to_string());
            Vec::new()
        };
        self.expect_end_pair(TokenKind::Try, "END TRY");
        let info = self.node_info(&tok);
        Some(Stmt { info, kind: StmtKind::TryCatch { try_body, catch_body } })
    }

    // `ref = expr` assignment, or a bare expression statement.
    fn parse_assign_or_expr(&mut self) -> Option<Stmt> {
        let tok = self.cur().clone();
        let save = self.snapshot();
        let lhs = self.parse_unary();
        if self.check(TokenKind::Equal) && lhs.is_reference() {
            self.advance(); // '='
            let value = self.parse_expr();
            self.terminate_stmt();
            self.check_assignment(&lhs, &value, &tok);
            let info = self.node_info(&tok);
            return Some(Stmt { info, kind: StmtKind::Assign { target: lhs, value } });
        }
        // Not an assignment: reparse as a full expression statement.
        self.restore(save);
        let e = self.parse_expr();
        self.terminate_stmt();
        let info = self.node_info(&tok);
        Some(Stmt { info, kind: StmtKind::ExprStmt(e) })
    }

    fn check_assignment(&mut self, target: &Expr, value: &Expr, at: &Token) {
        if let ExprKind::VariableRef { name, declaration } = &target.kind {
            let Some(meta) = self.decl_index.get(declaration).copied() else { return };
            if meta.read_only {
                self.error_at(at, format!("control accessor '{}' is read-only", name));
                return;
            }
            match self.shape_of(value) {
                Shape::Array if !meta.is_array => {
                    self.error_at(at, format!("cannot assign an array value to scalar variable '{}'", name));
                }
                Shape::Scalar if meta.is_array => {
                    self.error_at(at, format!("cannot assign a scalar value to array variable '{}'", name));
                }
                _ => {}
            }
        }
    }

    // ---- deferred pass: invocations are checked once the whole stream is read,
    // which is what makes calls to later-declared methods legal. ----

    fn validate_deferred(&mut self) {
        let deferred = std::mem::take(&mut self.deferred);
        for d in deferred {
            // Copy the signature out so emitting diagnostics does not fight
            // the borrow on the method table.
            match self.methods.get(&d.name).map(|s| (s.arity, s.is_async)) {
                None => {
                    self.error_info(&d.info, format!("unknown method '{}'", d.name));
                }
                Some((arity, is_async)) => {
                    if arity != d.argc {
                        self.error_info(&d.info, format!(
                            "method '{}' expects {} argument(s), got {}",
                            d.name, arity, d.argc
                        ));
                    }
                    if d.awaited && !is_async {
                        self.error_info(&d.info, format!(
                            "AWAIT is only valid on asynchronous methods; '{}' is not ASYNC",
                            d.name
                        ));
                    }
                }
            }
        }
    }

    pub(crate) fn defer_invocation(&mut self, name: &str, argc: usize, awaited: bool, info: NodeInfo) {
        self.deferred.push(DeferredInvocation { name: name.to_string(), argc, awaited, info });
    }

    // ---- scopes and declarations ----

    fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    // Scope exit flags every never-referenced, non-synthetic variable once.
    fn pop_scope_with_warnings(&mut self) {
        let Some(scope) = self.scopes.pop() else { return };
        for v in scope.vars {
            if v.refs == 0 && !v.synthetic {
                self.warning_info(&v.info, format!("variable '{}' is declared but never used", v.name));
            }
        }
    }

    fn declare_var(&mut self, name: String, info: NodeInfo, is_array: bool, read_only: bool, synthetic: bool) {
        self.decl_index.insert(info.id, DeclMeta { is_array, read_only });
        let rec = VarRec { name, id: info.id, is_array, synthetic, line: info.line, refs: 0, info };
        if let Some(scope) = self.scopes.last_mut() {
            scope.vars.push(rec);
        }
    }

    fn lookup_var(&self, name: &str) -> Option<&VarRec> {
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.vars.iter().find(|v| v.name == name) {
                return Some(v);
            }
        }
        self.params.iter().find(|p| p.name == name)
    }

    pub(crate) fn reference_var(&mut self, name: &str) -> Option<(NodeId, bool)> {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(v) = scope.vars.iter_mut().find(|v| v.name == name) {
                v.refs += 1;
                return Some((v.id, v.is_array));
            }
        }
        if let Some(p) = self.params.iter_mut().find(|p| p.name == name) {
            p.refs += 1;
            return Some((p.id, p.is_array));
        }
        None
    }

    pub(crate) fn shape_of(&self, e: &Expr) -> Shape {
        match &e.kind {
            ExprKind::Primitive(Primitive::Array(_)) => Shape::Array,
            ExprKind::Primitive(_) => Shape::Scalar,
            ExprKind::ArrayCreation(_) => Shape::Array,
            ExprKind::Not(_) | ExprKind::Binary { .. } => Shape::Scalar,
            ExprKind::VariableRef { declaration, .. } => match self.decl_index.get(declaration) {
                Some(m) if m.is_array => Shape::Array,
                Some(_) => Shape::Scalar,
                None => Shape::Unknown,
            },
            ExprKind::Indexer { .. } => Shape::Unknown,
            _ => Shape::Unknown,
        }
    }

    // ---- token window helpers ----

    // `i` never passes the trailing Eof token, see `advance`.
    pub(crate) fn cur(&self) -> &Token {
        &self.tokens[self.i]
    }
    pub(crate) fn peek_kind(&self) -> TokenKind { self.cur().kind }
    pub(crate) fn peek_next_kind(&self) -> TokenKind {
        self.tokens.get(self.i + 1).map(|t| t.kind).unwrap_or(TokenKind::Eof)
    }
    pub(crate) fn check(&self, k: TokenKind) -> bool { self.peek_kind() == k }
    pub(crate) fn advance(&mut self) -> Token {
        let t = self.cur().clone();
        if self.i + 1 < self.tokens.len() { self.i += 1; }
        t
    }
    pub(crate) fn match_k(&mut self, k: TokenKind) -> bool {
        if self.check(k) { self.advance(); true } else { false }
    }

    pub(crate) fn skip_separators(&mut self) {
        while self.cur().is_separator() { self.advance(); }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot { i: self.i, diags: self.diags.len(), deferred: self.deferred.len() }
    }
    fn restore(&mut self, s: Snapshot) {
        self.i = s.i;
        self.diags.truncate(s.diags);
        self.deferred.truncate(s.deferred);
    }

    pub(crate) fn expect_ident(&mut self, what: &str) -> Option<Token> {
        if self.check(TokenKind::Identifier) {
            Some(self.advance())
        } else {
            self.error_here(&format!("expected {}", what));
            None
        }
    }

    // END <kw> closers, e.g. END IF / END TRY / END FUNCTION.
    fn expect_end_pair(&mut self, kw: TokenKind, label: &str) {
        if self.match_k(TokenKind::End) {
            if !self.match_k(kw) {
                self.error_here(&format!("expected {}", label));
            }
            self.terminate_stmt();
        } else {
            self.error_here(&format!("expected {}", label));
        }
    }

    pub(crate) fn push_bracket(&mut self, closer: TokenKind, open: &Token) {
        self.brackets.push((closer, open.line, open.column));
    }
    // Consumes the innermost expected closer; when it is missing, the
    // recorded open position localizes the diagnostic.
    pub(crate) fn expect_closer(&mut self) {
        let Some((kind, line, column)) = self.brackets.pop() else { return };
        if self.match_k(kind) { return; }
        let closer = match kind {
            TokenKind::RParen => ")",
            TokenKind::RBracket => "]",
            _ => "closing delimiter",
        };
        self.error_here(&format!(
            "expected '{}' to close the delimiter opened at line {}, column {}",
            closer, line, column
        ));
    }

    fn terminate_stmt(&mut self) {
        if self.cur().is_separator() {
            self.advance();
            return;
        }
        if self.check(TokenKind::Eof) || self.at_any_stop() { return; }
        let t = self.cur().clone();
        self.error_at(&t, format!("expected end of statement, found '{}'", t.lexeme));
        self.recover_to_separator();
    }

    fn recover_to_separator(&mut self) {
        loop {
            if self.check(TokenKind::Eof) || self.cur().is_separator() || self.at_any_stop() { break; }
            self.advance();
        }
    }

    fn at_any_stop(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::End | TokenKind::Else | TokenKind::Loop | TokenKind::Catch
        )
    }

    fn at_block_stop(&self, stops: &[BlockStop]) -> bool {
        match self.peek_kind() {
            TokenKind::Else => stops.contains(&BlockStop::Else),
            TokenKind::Loop => stops.contains(&BlockStop::Loop),
            TokenKind::Catch => stops.contains(&BlockStop::Catch),
            TokenKind::End => stops.iter().any(|s| {
                matches!(s, BlockStop::EndIf | BlockStop::EndTry | BlockStop::EndFunction)
            }),
            _ => false,
        }
    }

    // ---- node ids and diagnostics ----

    pub(crate) fn fresh_id(&mut self) -> NodeId {
        self.next_id += 1;
        self.next_id
    }

    pub(crate) fn node_info(&mut self, tok: &Token) -> NodeInfo {
        NodeInfo {
            id: self.fresh_id(),
            line: tok.line,
            column: tok.column,
            offset: tok.offset(),
            length: tok.len(),
        }
    }

    pub(crate) fn error_at(&mut self, tok: &Token, message: String) {
        self.push_diag(Diagnostic::error(tok.line, tok.column, tok.offset(), tok.len(), message));
    }
    pub(crate) fn error_here(&mut self, message: &str) {
        let t = self.cur().clone();
        self.error_at(&t, message.to_string());
    }
    pub(crate) fn error_info(&mut self, info: &NodeInfo, message: String) {
        self.push_diag(Diagnostic::error(info.line, info.column, info.offset, info.length, message));
    }
    fn warning_info(&mut self, info: &NodeInfo, message: String) {
        self.push_diag(Diagnostic::warning(info.line, info.column, info.offset, info.length, message));
    }

    // Identical (line, column, message) triples collapse to one entry.
    fn push_diag(&mut self, d: Diagnostic) {
        let dup = self.diags.iter().any(|x| {
            x.line == d.line && x.column == d.column && x.message == d.message
        });
        if !dup { self.diags.push(d); }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockStop { EndIf, Else, EndFunction, Loop, Catch, EndTry }
