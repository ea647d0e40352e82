//! Expression parsing: precedence ladder, postfix chains, NEW / AWAIT /
//! EXCEPTION, and identifier resolution against the session's scope tables.
//!
//! Ladder, loosest first: OR → AND → NOT → equality → relational → additive →
//! multiplicative → unary (AWAIT) → primary with postfix `[...]` / `.member` /
//! `.member(...)` chains, all left-associative.

use bazic_ast::{BinOp, Expr, ExprKind, Primitive};
use bazic_lexer::{Token, TokenKind};

use crate::Session;

impl<'a> Session<'a> {
    pub(crate) fn parse_expr(&mut self) -> Expr {
        self.parse_logical_or()
    }

    fn parse_logical_or(&mut self) -> Expr {
        let mut lhs = self.parse_logical_and();
        while self.check(TokenKind::Or) {
            let tok = self.advance();
            let rhs = self.parse_logical_and();
            lhs = self.binary(BinOp::LogicalOr, lhs, rhs, &tok);
        }
        lhs
    }

    fn parse_logical_and(&mut self) -> Expr {
        let mut lhs = self.parse_unary_not();
        while self.check(TokenKind::And) {
            let tok = self.advance();
            let rhs = self.parse_unary_not();
            lhs = self.binary(BinOp::LogicalAnd, lhs, rhs, &tok);
        }
        lhs
    }

    // NOT binds looser than comparisons: `NOT a = b` negates the comparison.
    fn parse_unary_not(&mut self) -> Expr {
        if self.check(TokenKind::Not) {
            let tok = self.advance();
            let inner = self.parse_unary_not();
            let info = self.node_info(&tok);
            return Expr { info, kind: ExprKind::Not(Box::new(inner)) };
        }
        self.parse_equality()
    }

    fn parse_equality(&mut self) -> Expr {
        let mut lhs = self.parse_relational();
        while self.check(TokenKind::Equal) {
            let tok = self.advance();
            let rhs = self.parse_relational();
            lhs = self.binary(BinOp::Equality, lhs, rhs, &tok);
        }
        lhs
    }

    fn parse_relational(&mut self) -> Expr {
        let mut lhs = self.parse_additive();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Lt => BinOp::LessThan,
                TokenKind::LtEq => BinOp::LessThanOrEqual,
                TokenKind::Gt => BinOp::GreaterThan,
                TokenKind::GtEq => BinOp::GreaterThanOrEqual,
                _ => break,
            };
            let tok = self.advance();
            let rhs = self.parse_additive();
            lhs = self.binary(op, lhs, rhs, &tok);
        }
        lhs
    }

    fn parse_additive(&mut self) -> Expr {
        let mut lhs = self.parse_multiplicative();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Addition,
                TokenKind::Minus => BinOp::Subtraction,
                _ => break,
            };
            let tok = self.advance();
            let rhs = self.parse_multiplicative();
            lhs = self.binary(op, lhs, rhs, &tok);
        }
        lhs
    }

    fn parse_multiplicative(&mut self) -> Expr {
        let mut lhs = self.parse_unary();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Multiply,
                TokenKind::Slash => BinOp::Division,
                TokenKind::Percent => BinOp::Modulus,
                _ => break,
            };
            let tok = self.advance();
            let rhs = self.parse_unary();
            lhs = self.binary(op, lhs, rhs, &tok);
        }
        lhs
    }

    pub(crate) fn parse_unary(&mut self) -> Expr {
        if self.check(TokenKind::Await) {
            let tok = self.advance();
            let inner = self.parse_unary();
            return match inner.kind {
                ExprKind::InvokeMethod { name, args, .. } => {
                    // Re-register so the deferred pass sees the await flag.
                    self.defer_invocation(&name, args.len(), true, inner.info);
                    Expr { info: inner.info, kind: ExprKind::InvokeMethod { name, args, awaited: true } }
                }
                ExprKind::InvokeHostMethod { target, method, args, .. } => Expr {
                    info: inner.info,
                    kind: ExprKind::InvokeHostMethod { target, method, args, awaited: true },
                },
                _ => {
                    self.error_at(&tok, "AWAIT requires a method invocation".to_string());
                    inner
                }
            };
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Expr {
        let mut lhs = self.parse_primary();
        loop {
            match self.peek_kind() {
                TokenKind::LBracket => {
                    let open = self.advance();
                    self.push_bracket(TokenKind::RBracket, &open);
                    let indexes = self.parse_comma_list(TokenKind::RBracket);
                    self.expect_closer();
                    lhs = self.make_indexer(lhs, indexes, &open);
                }
                TokenKind::Dot => {
                    self.advance();
                    let Some(member) = self.expect_ident("member name after '.'") else { break };
                    if self.check(TokenKind::LParen) {
                        let args = self.parse_call_args();
                        let info = self.node_info(&member);
                        lhs = Expr {
                            info,
                            kind: ExprKind::InvokeHostMethod {
                                target: Box::new(lhs),
                                method: member.lexeme.clone(),
                                args,
                                awaited: false,
                            },
                        };
                    } else {
                        let info = self.node_info(&member);
                        lhs = Expr {
                            info,
                            kind: ExprKind::PropertyRef { target: Box::new(lhs), name: member.lexeme.clone() },
                        };
                    }
                }
                _ => break,
            }
        }
        lhs
    }

    fn parse_primary(&mut self) -> Expr {
        match self.peek_kind() {
            TokenKind::Integer => {
                let tok = self.advance();
                self.integer_literal(&tok, false)
            }
            TokenKind::Double => {
                let tok = self.advance();
                self.double_literal(&tok, false)
            }
            TokenKind::Minus if self.peek_next_kind() == TokenKind::Integer => {
                self.advance();
                let tok = self.advance();
                self.integer_literal(&tok, true)
            }
            TokenKind::Minus if self.peek_next_kind() == TokenKind::Double => {
                self.advance();
                let tok = self.advance();
                self.double_literal(&tok, true)
            }
            TokenKind::String => {
                let tok = self.advance();
                let info = self.node_info(&tok);
                let s = tok.value.clone().unwrap_or_default();
                Expr { info, kind: ExprKind::Primitive(Primitive::Str(s)) }
            }
            TokenKind::True | TokenKind::False => {
                let tok = self.advance();
                let info = self.node_info(&tok);
                Expr { info, kind: ExprKind::Primitive(Primitive::Bool(tok.kind == TokenKind::True)) }
            }
            TokenKind::Null => {
                let tok = self.advance();
                let info = self.node_info(&tok);
                Expr { info, kind: ExprKind::Primitive(Primitive::Null) }
            }
            TokenKind::LParen => {
                let open = self.advance();
                self.push_bracket(TokenKind::RParen, &open);
                self.skip_separators();
                let e = self.parse_expr();
                self.skip_separators();
                self.expect_closer();
                e
            }
            TokenKind::New => self.parse_new(),
            TokenKind::Exception => {
                let tok = self.advance();
                if self.catch_depth == 0 {
                    self.error_at(&tok, "EXCEPTION is only valid inside a CATCH block".to_string());
                }
                let info = self.node_info(&tok);
                Expr { info, kind: ExprKind::ExceptionRef }
            }
            TokenKind::Identifier => self.parse_identifier_expr(),
            TokenKind::Undefined => {
                let tok = self.advance();
                let info = self.node_info(&tok);
                self.error_at(&tok, format!("unrecognized character sequence '{}'", tok.lexeme));
                Expr { info, kind: ExprKind::Primitive(Primitive::Null) }
            }
            _ => {
                let tok = self.cur().clone();
                let info = self.node_info(&tok);
                self.error_at(&tok, format!("unexpected '{}' in expression", tok.lexeme));
                Expr { info, kind: ExprKind::Primitive(Primitive::Null) }
            }
        }
    }

    // NEW [e, ...] creates an array; NEW Ns.Type(args) instantiates a host type.
    fn parse_new(&mut self) -> Expr {
        let new_tok = self.advance();
        if self.check(TokenKind::LBracket) {
            let open = self.advance();
            self.push_bracket(TokenKind::RBracket, &open);
            let items = self.parse_comma_list(TokenKind::RBracket);
            self.expect_closer();
            let info = self.node_info(&new_tok);
            return Expr { info, kind: ExprKind::ArrayCreation(items) };
        }
        let Some(first) = self.expect_ident("type name after NEW") else {
            let info = self.node_info(&new_tok);
            return Expr { info, kind: ExprKind::Primitive(Primitive::Null) };
        };
        let mut segments = vec![first.lexeme.clone()];
        while self.check(TokenKind::Dot) && self.peek_next_kind() == TokenKind::Identifier {
            self.advance();
            segments.push(self.advance().lexeme);
        }
        let class = self.make_class_ref(segments, &first);
        let args = if self.check(TokenKind::LParen) {
            self.parse_call_args()
        } else {
            self.error_here("expected '(' after type name");
            Vec::new()
        };
        let info = self.node_info(&new_tok);
        Expr { info, kind: ExprKind::Instantiate { class: Box::new(class), args } }
    }

    // Identifier heads three things: a user-method call, a declared variable,
    // or an undeclared dotted chain that names a host class.
    fn parse_identifier_expr(&mut self) -> Expr {
        let tok = self.advance();
        let name = tok.lexeme.clone();

        if self.check(TokenKind::LParen) {
            let args = self.parse_call_args();
            let info = self.node_info(&tok);
            self.defer_invocation(&name, args.len(), false, info);
            return Expr { info, kind: ExprKind::InvokeMethod { name, args, awaited: false } };
        }

        if let Some((declaration, _)) = self.reference_var(&name) {
            let info = self.node_info(&tok);
            return Expr { info, kind: ExprKind::VariableRef { name, declaration } };
        }

        if self.check(TokenKind::Dot) && self.peek_next_kind() == TokenKind::Identifier {
            let mut segments = vec![name];
            while self.check(TokenKind::Dot) && self.peek_next_kind() == TokenKind::Identifier {
                self.advance();
                segments.push(self.advance().lexeme);
            }
            if self.check(TokenKind::LParen) {
                // Last segment is the method, the rest the class path.
                let method = segments.pop().expect("at least two segments");
                let class = self.make_class_ref(segments, &tok);
                let args = self.parse_call_args();
                let info = self.node_info(&tok);
                return Expr {
                    info,
                    kind: ExprKind::InvokeHostMethod { target: Box::new(class), method, args, awaited: false },
                };
            }
            // Property read off a class: Ns.Class.Member
            let member = segments.pop().expect("at least two segments");
            let class = self.make_class_ref(segments, &tok);
            let info = self.node_info(&tok);
            return Expr { info, kind: ExprKind::PropertyRef { target: Box::new(class), name: member } };
        }

        let info = self.node_info(&tok);
        self.error_at(&tok, format!("undeclared variable '{}'", name));
        Expr { info, kind: ExprKind::VariableRef { name, declaration: 0 } }
    }

    fn make_class_ref(&mut self, segments: Vec<String>, at: &Token) -> Expr {
        let full = segments.join(".");
        if !self.capabilities.iter().any(|c| c == &full) {
            self.capabilities.push(full);
        }
        let name = segments.last().cloned().unwrap_or_default();
        let namespace = segments[..segments.len().saturating_sub(1)].join(".");
        let info = self.node_info(at);
        Expr { info, kind: ExprKind::ClassRef { namespace, name } }
    }

    fn make_indexer(&mut self, target: Expr, indexes: Vec<Expr>, at: &Token) -> Expr {
        if !target.is_reference() {
            self.error_at(at, "only variables, properties and array elements can be indexed".to_string());
        } else if let ExprKind::VariableRef { name, declaration } = &target.kind {
            if let Some(meta) = self.decl_index.get(declaration) {
                if !meta.is_array {
                    let n = name.clone();
                    self.error_at(at, format!("variable '{}' is not an array", n));
                }
            }
        }
        let info = self.node_info(at);
        Expr { info, kind: ExprKind::Indexer { target: Box::new(target), indexes } }
    }

    fn parse_call_args(&mut self) -> Vec<Expr> {
        let open = self.advance(); // '('
        self.push_bracket(TokenKind::RParen, &open);
        let args = self.parse_comma_list(TokenKind::RParen);
        self.expect_closer();
        args
    }

    // Comma-separated expressions up to (not consuming) `closer`. Newlines
    // inside delimiters do not end the statement.
    fn parse_comma_list(&mut self, closer: TokenKind) -> Vec<Expr> {
        let mut out = Vec::new();
        self.skip_separators();
        if self.check(closer) { return out; }
        loop {
            out.push(self.parse_expr());
            self.skip_separators();
            if !self.match_k(TokenKind::Comma) { break; }
            self.skip_separators();
        }
        self.skip_separators();
        out
    }

    fn binary(&mut self, op: BinOp, lhs: Expr, rhs: Expr, tok: &Token) -> Expr {
        let info = self.node_info(tok);
        Expr { info, kind: ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) } }
    }

    fn integer_literal(&mut self, tok: &Token, negative: bool) -> Expr {
        let info = self.node_info(tok);
        let kind = match tok.lexeme.parse::<i64>() {
            Ok(n) => ExprKind::Primitive(Primitive::Integer(if negative { -n } else { n })),
            Err(_) => {
                self.error_at(tok, format!("integer literal '{}' is out of range", tok.lexeme));
                ExprKind::Primitive(Primitive::Null)
            }
        };
        Expr { info, kind }
    }

    fn double_literal(&mut self, tok: &Token, negative: bool) -> Expr {
        let info = self.node_info(tok);
        let kind = match tok.lexeme.parse::<f64>() {
            Ok(n) => ExprKind::Primitive(Primitive::Double(if negative { -n } else { n })),
            Err(_) => {
                self.error_at(tok, format!("number literal '{}' is malformed", tok.lexeme));
                ExprKind::Primitive(Primitive::Null)
            }
        };
        Expr { info, kind }
    }
}
