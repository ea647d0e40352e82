//! AST for BaZic
//!
//! Nodes are immutable after construction. Every node carries a `NodeInfo`
//! with a session-unique id and its source position, so diagnostics and the
//! debugger can point back into the file.

/// Reserved name of the method execution starts from.
pub const ENTRY_POINT_NAME: &str = "Main";

pub type NodeId = u64;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NodeInfo {
    pub id: NodeId,
    pub line: u32,
    pub column: u32,
    pub offset: u32,
    pub length: u32,
}

/// A literal value as it appears in source. Arrays of primitives only show up
/// through constant folding of `NEW [...]` global initializers.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Null,
    Integer(i64),
    Double(f64),
    Bool(bool),
    Str(String),
    Array(Vec<Primitive>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Equality,
    BitwiseOr,
    BitwiseAnd,
    LogicalOr,
    LogicalAnd,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Addition,
    Subtraction,
    Multiply,
    Division,
    Modulus,
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub info: NodeInfo,
    pub kind: ExprKind,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Primitive(Primitive),
    /// Resolved at parse time to the declaring statement's or parameter's id.
    VariableRef { name: String, declaration: NodeId },
    PropertyRef { target: Box<Expr>, name: String },
    /// Target is always a reference expression (checked by the parser).
    Indexer { target: Box<Expr>, indexes: Vec<Expr> },
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Not(Box<Expr>),
    Instantiate { class: Box<Expr>, args: Vec<Expr> },
    ArrayCreation(Vec<Expr>),
    /// Call of a user-declared method; arity/await checked in the parser's
    /// deferred pass, bound by name at run time (forward refs are legal).
    InvokeMethod { name: String, args: Vec<Expr>, awaited: bool },
    InvokeHostMethod { target: Box<Expr>, method: String, args: Vec<Expr>, awaited: bool },
    ClassRef { namespace: String, name: String },
    /// `EXCEPTION`, legal only inside a CATCH body.
    ExceptionRef,
}

impl Expr {
    /// Only variable references, property references and indexers may be
    /// assigned to.
    pub fn is_reference(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::VariableRef { .. } | ExprKind::PropertyRef { .. } | ExprKind::Indexer { .. }
        )
    }

    /// Whether the expression can be folded to a `Primitive` without running
    /// the program: literals, arrays of such, and NOT/binary compositions.
    /// Calls, instantiations and variable references never qualify.
    pub fn is_constant(&self) -> bool {
        match &self.kind {
            ExprKind::Primitive(_) => true,
            ExprKind::ArrayCreation(items) => items.iter().all(|e| e.is_constant()),
            ExprKind::Not(inner) => inner.is_constant(),
            ExprKind::Binary { lhs, rhs, .. } => lhs.is_constant() && rhs.is_constant(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub info: NodeInfo,
    pub kind: StmtKind,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    VariableDecl { name: String, is_array: bool, default: Option<Expr> },
    Assign { target: Expr, value: Expr },
    ExprStmt(Expr),
    Return(Option<Expr>),
    Throw(Expr),
    Break,
    Breakpoint,
    Condition { test: Expr, then_body: Vec<Stmt>, else_body: Vec<Stmt> },
    /// `post_test` distinguishes `DO ... LOOP WHILE c` from `DO WHILE c ... LOOP`.
    Iteration { test: Expr, post_test: bool, body: Vec<Stmt> },
    TryCatch { try_body: Vec<Stmt>, catch_body: Vec<Stmt> },
    // Optimizer-introduced flow nodes. The parser never emits these.
    Label(String),
    /// Jumps to `target` when `test` (the negated guard) is true.
    LabelCondition { test: Expr, target: String },
    Goto(String),
}

#[derive(Debug, Clone)]
pub struct Param {
    pub info: NodeInfo,
    pub name: String,
    pub is_array: bool,
}

#[derive(Debug, Clone)]
pub struct Method {
    pub info: NodeInfo,
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub is_async: bool,
    /// The `EXTERN FUNCTION Main(args[])` entry point.
    pub is_entry_point: bool,
    /// `EVENT FUNCTION` handlers for UI programs.
    pub is_event: bool,
}

/// A variable auto-declared for a named UI element. Read-only from script.
#[derive(Debug, Clone)]
pub struct ControlAccessorDecl {
    pub info: NodeInfo,
    pub control: String,
    pub variable: String,
}

/// `BIND Ctrl.Property = expr`, validated against the markup collaborator.
#[derive(Debug, Clone)]
pub struct BindingDecl {
    pub info: NodeInfo,
    pub control: String,
    pub property: String,
    pub is_array: bool,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct EventBinding {
    pub info: NodeInfo,
    pub control: String,
    pub event: String,
    pub method_id: NodeId,
}

/// UI-flavored extras: the raw markup text plus everything derived from it.
#[derive(Debug, Clone, Default)]
pub struct UiModel {
    pub markup: String,
    pub control_accessors: Vec<ControlAccessorDecl>,
    pub bindings: Vec<BindingDecl>,
    pub event_bindings: Vec<EventBinding>,
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    /// Ordered, name-unique global `VariableDecl` statements.
    pub globals: Vec<Stmt>,
    /// Ordered, name-unique methods.
    pub methods: Vec<Method>,
    /// Namespaces of host types the program touches, resolved during Preparing.
    pub required_capabilities: Vec<String>,
    pub is_optimized: bool,
    pub ui: Option<UiModel>,
}

impl Program {
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn entry_point(&self) -> Option<&Method> {
        self.methods.iter().find(|m| m.is_entry_point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(p: Primitive) -> Expr {
        Expr { info: NodeInfo::default(), kind: ExprKind::Primitive(p) }
    }

    #[test]
    fn constant_foldability() {
        let one = lit(Primitive::Integer(1));
        let two = lit(Primitive::Integer(2));
        let add = Expr {
            info: NodeInfo::default(),
            kind: ExprKind::Binary { op: BinOp::Addition, lhs: Box::new(one), rhs: Box::new(two) },
        };
        assert!(add.is_constant());

        let var = Expr {
            info: NodeInfo::default(),
            kind: ExprKind::VariableRef { name: "x".into(), declaration: 7 },
        };
        let mixed = Expr {
            info: NodeInfo::default(),
            kind: ExprKind::Binary {
                op: BinOp::Addition,
                lhs: Box::new(lit(Primitive::Integer(1))),
                rhs: Box::new(var),
            },
        };
        assert!(!mixed.is_constant());
    }

    #[test]
    fn reference_subset() {
        let var = Expr {
            info: NodeInfo::default(),
            kind: ExprKind::VariableRef { name: "x".into(), declaration: 1 },
        };
        assert!(var.is_reference());
        assert!(!lit(Primitive::Null).is_reference());
        let idx = Expr {
            info: NodeInfo::default(),
            kind: ExprKind::Indexer { target: Box::new(var), indexes: vec![lit(Primitive::Integer(0))] },
        };
        assert!(idx.is_reference());
    }
}
