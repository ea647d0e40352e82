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

//! Control-flow optimizer: lowers structured IF / DO...LOOP / TRY-CATCH into
//! labels and conditional jumps so the interpreter gets an explicit
//! instruction-pointer model for stepping and breakpoints.
//!
//! IF and DO...LOOP are fully replaced by Label / LabelCondition / Goto
//! nodes; BREAK inside a lowered loop becomes a Goto to the loop's end label.
//! A TryCatch node survives as the handler-extent carrier — its two bodies
//! are flattened and the region is bracketed with labels — because a pure
//! conditional-jump encoding cannot say which statements are protected.
//! Values produced are identical either way.

use bazic_ast::{Expr, ExprKind, NodeId, NodeInfo, Program, Stmt, StmtKind};
use bazic_common::{BazicError, Result};

/// Lower `program` into its flat label/jump form. Optimizing an
/// already-optimized program is a precondition violation.
pub fn optimize(program: &Program) -> Result<Program> {
    if program.is_optimized {
        return Err(BazicError("program is already optimized".into()));
    }
    let mut out = program.clone();
    let mut next_id = max_node_id(program) + 1;
    for method in &mut out.methods {
        let mut lw = Lowerer { label_seq: 0, next_id, loop_ends: Vec::new() };
        let body = std::mem::take(&mut method.body);
        let mut flat = Vec::new();
        lw.lower_block(body, &mut flat);
        method.body = flat;
        next_id = lw.next_id;
    }
    out.is_optimized = true;
    Ok(out)
}

struct Lowerer {
    /// Per-method sequence so label names are reproducible.
    label_seq: u32,
    next_id: NodeId,
    loop_ends: Vec<String>,
}

impl Lowerer {
    fn lower_block(&mut self, stmts: Vec<Stmt>, out: &mut Vec<Stmt>) {
        for s in stmts {
            self.lower_stmt(s, out);
        }
    }

    fn lower_stmt(&mut self, s: Stmt, out: &mut Vec<Stmt>) {
        match s.kind {
            StmtKind::Condition { test, then_body, else_body } => {
                let start = self.fresh_label();
                let end = self.fresh_label();
                let has_else = !else_body.is_empty();
                let else_label = if has_else { self.fresh_label() } else { end.clone() };

                out.push(self.label(&s.info, start));
                let skip_to = else_label.clone();
                out.push(Stmt {
                    info: self.derived_info(&s.info),
                    kind: StmtKind::LabelCondition { test: self.negate(test), target: skip_to },
                });
                self.lower_block(then_body, out);
                if has_else {
                    out.push(self.goto(&s.info, end.clone()));
                    out.push(self.label(&s.info, else_label));
                    self.lower_block(else_body, out);
                }
                out.push(self.label(&s.info, end));
            }

            StmtKind::Iteration { test, post_test, body } => {
                let start = self.fresh_label();
                let end = self.fresh_label();
                out.push(self.label(&s.info, start.clone()));
                if !post_test {
                    out.push(Stmt {
                        info: self.derived_info(&s.info),
                        kind: StmtKind::LabelCondition { test: self.negate(test.clone()), target: end.clone() },
                    });
                }
                self.loop_ends.push(end.clone());
                self.lower_block(body, out);
                self.loop_ends.pop();
                if post_test {
                    out.push(Stmt {
                        info: self.derived_info(&s.info),
                        kind: StmtKind::LabelCondition { test: self.negate(test), target: end.clone() },
                    });
                }
                out.push(self.goto(&s.info, start));
                out.push(self.label(&s.info, end));
            }

            StmtKind::TryCatch { try_body, catch_body } => {
                let start = self.fresh_label();
                let end = self.fresh_label();
                out.push(self.label(&s.info, start));
                let mut flat_try = Vec::new();
                self.lower_block(try_body, &mut flat_try);
                let mut flat_catch = Vec::new();
                self.lower_block(catch_body, &mut flat_catch);
                out.push(Stmt {
                    info: s.info,
                    kind: StmtKind::TryCatch { try_body: flat_try, catch_body: flat_catch },
                });
                out.push(self.label(&s.info, end));
            }

            // In the flat form BREAK has nothing to unwind through; it is a
            // jump to the innermost loop's end label.
            StmtKind::Break => match self.loop_ends.last().cloned() {
                Some(target) => out.push(self.goto(&s.info, target)),
                None => out.push(s),
            },

            _ => out.push(s),
        }
    }

    fn fresh_label(&mut self) -> String {
        self.label_seq += 1;
        format!("_{}", self.label_seq)
    }

    fn fresh_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn derived_info(&mut self, from: &NodeInfo) -> NodeInfo {
        NodeInfo { id: self.fresh_id(), ..*from }
    }

    fn label(&mut self, from: &NodeInfo, name: String) -> Stmt {
        Stmt { info: self.derived_info(from), kind: StmtKind::Label(name) }
    }

    fn goto(&mut self, from: &NodeInfo, target: String) -> Stmt {
        Stmt { info: self.derived_info(from), kind: StmtKind::Goto(target) }
    }

    // The lowered guard is the negation of the structured one: jump past the
    // block when the original condition does NOT hold. Double negation is
    // collapsed so `DO WHILE NOT x` does not pile up NOT nodes.
    fn negate(&mut self, test: Expr) -> Expr {
        if let ExprKind::Not(inner) = test.kind {
            return *inner;
        }
        let info = NodeInfo { id: self.fresh_id(), ..test.info };
        Expr { info, kind: ExprKind::Not(Box::new(test)) }
    }
}

// Node ids must stay unique across the whole program, so new nodes number
// from one past the parser's maximum.
fn max_node_id(program: &Program) -> NodeId {
    let mut max = 0;
    for g in &program.globals {
        max_stmt(g, &mut max);
    }
    for m in &program.methods {
        bump(&m.info, &mut max);
        for p in &m.params {
            bump(&p.info, &mut max);
        }
        for s in &m.body {
            max_stmt(s, &mut max);
        }
    }
    // UI programs carry nodes outside globals and methods too.
    if let Some(ui) = &program.ui {
        for a in &ui.control_accessors {
            bump(&a.info, &mut max);
        }
        for b in &ui.bindings {
            bump(&b.info, &mut max);
            if let Some(e) = &b.default {
                max_expr(e, &mut max);
            }
        }
        for ev in &ui.event_bindings {
            bump(&ev.info, &mut max);
        }
    }
    max
}

fn bump(info: &NodeInfo, max: &mut NodeId) {
    if info.id > *max { *max = info.id; }
}

fn max_stmt(s: &Stmt, max: &mut NodeId) {
    bump(&s.info, max);
    match &s.kind {
        StmtKind::VariableDecl { default, .. } => {
            if let Some(e) = default { max_expr(e, max); }
        }
        StmtKind::Assign { target, value } => {
            max_expr(target, max);
            max_expr(value, max);
        }
        StmtKind::ExprStmt(e) | StmtKind::Throw(e) => max_expr(e, max),
        StmtKind::Return(e) => {
            if let Some(e) = e { max_expr(e, max); }
        }
        StmtKind::Condition { test, then_body, else_body } => {
            max_expr(test, max);
            for s in then_body.iter().chain(else_body) { max_stmt(s, max); }
        }
        StmtKind::Iteration { test, body, .. } => {
            max_expr(test, max);
            for s in body { max_stmt(s, max); }
        }
        StmtKind::TryCatch { try_body, catch_body } => {
            for s in try_body.iter().chain(catch_body) { max_stmt(s, max); }
        }
        StmtKind::LabelCondition { test, .. } => max_expr(test, max),
        StmtKind::Break | StmtKind::Breakpoint | StmtKind::Label(_) | StmtKind::Goto(_) => {}
    }
}

fn max_expr(e: &Expr, max: &mut NodeId) {
    bump(&e.info, max);
    match &e.kind {
        ExprKind::Primitive(_)
        | ExprKind::VariableRef { .. }
        | ExprKind::ClassRef { .. }
        | ExprKind::ExceptionRef => {}
        ExprKind::PropertyRef { target, .. } => max_expr(target, max),
        ExprKind::Indexer { target, indexes } => {
            max_expr(target, max);
            for i in indexes { max_expr(i, max); }
        }
        ExprKind::Binary { lhs, rhs, .. } => {
            max_expr(lhs, max);
            max_expr(rhs, max);
        }
        ExprKind::Not(inner) => max_expr(inner, max),
        ExprKind::Instantiate { class, args } => {
            max_expr(class, max);
            for a in args { max_expr(a, max); }
        }
        ExprKind::ArrayCreation(items) => {
            for i in items { max_expr(i, max); }
        }
        ExprKind::InvokeMethod { args, .. } => {
            for a in args { max_expr(a, max); }
        }
        ExprKind::InvokeHostMethod { target, args, .. } => {
            max_expr(target, max);
            for a in args { max_expr(a, max); }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazic_parser::parse;

    fn program(src: &str) -> Program {
        let r = parse(src);
        assert!(r.diagnostics.is_empty(), "unexpected diagnostics: {:?}", r.diagnostics);
        r.program.expect("program")
    }

    fn kinds(stmts: &[Stmt]) -> Vec<&'static str> {
        stmts
            .iter()
            .map(|s| match &s.kind {
                StmtKind::Label(_) => "label",
                StmtKind::LabelCondition { .. } => "labelcond",
                StmtKind::Goto(_) => "goto",
                StmtKind::Condition { .. } => "if",
                StmtKind::Iteration { .. } => "loop",
                StmtKind::TryCatch { .. } => "try",
                StmtKind::Assign { .. } => "assign",
                StmtKind::VariableDecl { .. } => "var",
                StmtKind::Return(_) => "return",
                _ => "other",
            })
            .collect()
    }

    #[test]
    fn while_loop_lowers_to_labels_and_jumps() {
        let p = program(
            "EXTERN FUNCTION Main(args[])\n\
             VARIABLE v = 0\n\
             DO WHILE v < 10\n\
             v = v + 1\n\
             LOOP\n\
             RETURN v\n\
             END FUNCTION\n",
        );
        let o = optimize(&p).expect("optimize");
        assert!(o.is_optimized);
        let body = &o.method("Main").unwrap().body;
        assert_eq!(
            kinds(body),
            vec!["var", "label", "labelcond", "assign", "goto", "label", "return"]
        );
        // No structured loop survives.
        assert!(!body.iter().any(|s| matches!(s.kind, StmtKind::Iteration { .. })));
    }

    #[test]
    fn if_else_lowers_with_skip_edges() {
        let p = program(
            "EXTERN FUNCTION Main(args[])\n\
             VARIABLE v = 0\n\
             IF v < 1 THEN\n\
             v = 1\n\
             ELSE\n\
             v = 2\n\
             END IF\n\
             RETURN v\n\
             END FUNCTION\n",
        );
        let o = optimize(&p).expect("optimize");
        let body = &o.method("Main").unwrap().body;
        assert_eq!(
            kinds(body),
            vec!["var", "label", "labelcond", "assign", "goto", "label", "assign", "label", "return"]
        );
    }

    #[test]
    fn label_names_are_deterministic_per_method() {
        let src = "EXTERN FUNCTION Main(args[])\n\
                   VARIABLE v = 0\n\
                   DO WHILE v < 2\n\
                   v = v + 1\n\
                   LOOP\n\
                   RETURN v\n\
                   END FUNCTION\n";
        let a = optimize(&program(src)).unwrap();
        let b = optimize(&program(src)).unwrap();
        let labels = |p: &Program| -> Vec<String> {
            p.method("Main")
                .unwrap()
                .body
                .iter()
                .filter_map(|s| match &s.kind {
                    StmtKind::Label(n) => Some(n.clone()),
                    _ => None,
                })
                .collect()
        };
        assert_eq!(labels(&a), labels(&b));
        assert_eq!(labels(&a), vec!["_1".to_string(), "_2".to_string()]);
    }

    #[test]
    fn break_becomes_goto_to_loop_end() {
        let p = program(
            "EXTERN FUNCTION Main(args[])\n\
             VARIABLE v = 0\n\
             DO WHILE TRUE\n\
             BREAK\n\
             LOOP\n\
             RETURN v\n\
             END FUNCTION\n",
        );
        let o = optimize(&p).unwrap();
        let body = &o.method("Main").unwrap().body;
        assert!(!body.iter().any(|s| matches!(s.kind, StmtKind::Break)));
        let gotos: Vec<_> = body
            .iter()
            .filter_map(|s| match &s.kind {
                StmtKind::Goto(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        // One loop-back edge and one BREAK exit edge.
        assert_eq!(gotos, vec!["_2", "_1"]);
    }

    #[test]
    fn try_catch_bodies_are_flattened() {
        let p = program(
            "EXTERN FUNCTION Main(args[])\n\
             VARIABLE v = 0\n\
             TRY\n\
             IF v = 0 THEN\n\
             v = 1\n\
             END IF\n\
             CATCH\n\
             v = 2\n\
             END TRY\n\
             RETURN v\n\
             END FUNCTION\n",
        );
        let o = optimize(&p).unwrap();
        let body = &o.method("Main").unwrap().body;
        let tc = body
            .iter()
            .find_map(|s| match &s.kind {
                StmtKind::TryCatch { try_body, catch_body } => Some((try_body, catch_body)),
                _ => None,
            })
            .expect("lowered try/catch");
        // The nested IF inside TRY is gone, replaced by labels/jumps.
        assert!(!tc.0.iter().any(|s| matches!(s.kind, StmtKind::Condition { .. })));
        assert!(tc.0.iter().any(|s| matches!(s.kind, StmtKind::LabelCondition { .. })));
    }

    #[test]
    fn double_optimization_is_rejected() {
        let p = program("VARIABLE v = 1\n");
        let o = optimize(&p).unwrap();
        assert!(optimize(&o).is_err());
    }

    #[test]
    fn ui_program_node_ids_stay_unique_after_lowering() {
        use bazic_parser::{parse_with_markup, StaticMarkup};
        let provider = StaticMarkup::new().element("Button1", &["Content"], &["Click"]);
        // The binding is the last thing parsed, so its nodes carry the
        // highest ids; lowering must number past them.
        let src = "EXTERN FUNCTION Main(args[])\n\
                   VARIABLE v = 0\n\
                   DO WHILE v < 2\n\
                   v = v + 1\n\
                   LOOP\n\
                   RETURN v\n\
                   END FUNCTION\n\
                   BIND Button1.Content = 1\n";
        let r = parse_with_markup(src, Some("<markup/>"), Some(&provider));
        assert!(r.diagnostics.is_empty(), "unexpected diagnostics: {:?}", r.diagnostics);
        let o = optimize(&r.program.expect("program")).expect("optimize");

        let ui = o.ui.as_ref().expect("ui model");
        let mut ui_max = 0;
        for a in &ui.control_accessors {
            ui_max = ui_max.max(a.info.id);
        }
        for b in &ui.bindings {
            ui_max = ui_max.max(b.info.id);
            if let Some(e) = &b.default {
                ui_max = ui_max.max(e.info.id);
            }
        }
        for s in &o.method("Main").unwrap().body {
            if matches!(
                s.kind,
                StmtKind::Label(_) | StmtKind::LabelCondition { .. } | StmtKind::Goto(_)
            ) {
                assert!(s.info.id > ui_max, "lowered node reuses id {}", s.info.id);
            }
        }
    }
}
