// src/core/ast.rs
//! Abstract Syntax Tree for SUSA. Closed sum types; every statement and
//! expression carries its source location. Built by the parser, read-only
//! afterwards.

use std::sync::Arc;

use serde::Serialize;

use crate::core::diagnostics::Location;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassDecl {
    pub name: String,
    /// Recorded, never resolved.
    pub superclass: Option<String>,
    pub body: Block,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StmtKind {
    Let {
        name: String,
        type_hint: Option<String>,
        value: Option<Expr>,
    },
    Function(Arc<FunctionDecl>),
    Class(Arc<ClassDecl>),
    If {
        condition: Expr,
        then_branch: Block,
        else_branch: Option<Block>,
    },
    While {
        condition: Expr,
        body: Block,
    },
    /// `FOR i = a TO b [STEP s]`, inclusive.
    ForRange {
        var: String,
        from: Expr,
        to: Expr,
        step: Option<Expr>,
        body: Block,
    },
    /// `LOOP [i = start FOR] count TIMES`.
    Repeat {
        var: Option<String>,
        start: Option<Expr>,
        count: Expr,
        body: Block,
    },
    Block(Block),
    Return(Option<Expr>),
    Print(Vec<Expr>),
    Break,
    Continue,
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub location: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StringPart {
    Literal(String),
    Placeholder(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExprKind {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Interpolated(Vec<StringPart>),
    Array(Vec<Expr>),
    Identifier(String),
    Assign {
        name: String,
        value: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Member {
        target: Box<Expr>,
        name: String,
    },
}

impl Expr {
    pub fn new(kind: ExprKind, location: Location) -> Self {
        Self { kind, location }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        let location = left.location.to(right.location);
        Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, location)
    }

    pub fn logical(op: LogicalOp, left: Expr, right: Expr) -> Self {
        let location = left.location.to(right.location);
        Expr::new(ExprKind::Logical { op, left: Box::new(left), right: Box::new(right) }, location)
    }

    /// True when evaluating this expression would assign a variable.
    pub fn assigns(&self) -> bool {
        match &self.kind {
            ExprKind::Assign { .. } => true,
            ExprKind::Number(_) | ExprKind::Str(_) | ExprKind::Bool(_) | ExprKind::Null | ExprKind::Identifier(_) => {
                false
            }
            ExprKind::Interpolated(parts) => parts.iter().any(StringPart::assigns),
            ExprKind::Array(items) => items.iter().any(Expr::assigns),
            ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                left.assigns() || right.assigns()
            }
            ExprKind::Unary { operand, .. } => operand.assigns(),
            ExprKind::Call { callee, args } => callee.assigns() || args.iter().any(Expr::assigns),
            ExprKind::Index { target, index } => target.assigns() || index.assigns(),
            ExprKind::Member { target, .. } => target.assigns(),
        }
    }
}

impl StringPart {
    pub fn assigns(&self) -> bool {
        matches!(self, StringPart::Placeholder(expr) if expr.assigns())
    }
}

impl Stmt {
    pub fn new(kind: StmtKind, location: Location) -> Self {
        Self { kind, location }
    }

    pub fn line(&self) -> usize {
        self.location.line
    }

    /// Nested blocks directly owned by this statement, in source order.
    pub fn child_blocks(&self) -> Vec<&Block> {
        match &self.kind {
            StmtKind::Function(f) => vec![&f.body],
            StmtKind::Class(c) => vec![&c.body],
            StmtKind::If { then_branch, else_branch, .. } => {
                let mut out = vec![then_branch];
                out.extend(else_branch.iter());
                out
            }
            StmtKind::While { body, .. }
            | StmtKind::ForRange { body, .. }
            | StmtKind::Repeat { body, .. } => vec![body],
            StmtKind::Block(b) => vec![b],
            _ => Vec::new(),
        }
    }

    /// True when the first nested statement starts on this statement's
    /// line (`LOOP ... : PRINT i`). Line breakpoints bind to that inner
    /// statement instead of the header.
    pub fn has_inline_body(&self) -> bool {
        self.child_blocks()
            .first()
            .and_then(|block| block.statements.first())
            .is_some_and(|inner| inner.line() == self.line())
    }
}

impl Program {
    /// Pre-order visit of every statement, nested bodies included.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Stmt)) {
        fn go<'a>(stmts: &'a [Stmt], visit: &mut dyn FnMut(&'a Stmt)) {
            for stmt in stmts {
                visit(stmt);
                for block in stmt.child_blocks() {
                    go(&block.statements, visit);
                }
            }
        }
        go(&self.statements, visit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64, col: usize) -> Expr {
        Expr::new(ExprKind::Number(n), Location::new(1, col, col - 1, col))
    }

    #[test]
    fn binary_location_spans_both_operands() {
        let e = Expr::binary(BinaryOp::Add, num(1.0, 1), num(2.0, 5));
        assert_eq!(e.location.column, 1);
        assert_eq!(e.location.end, 5);
    }

    #[test]
    fn walk_visits_nested_statements_in_order() {
        let print = Stmt::new(StmtKind::Print(vec![num(1.0, 5)]), Location::at(2, 3));
        let block = Block { statements: vec![print], location: Location::at(1, 1) };
        let program = Program {
            statements: vec![
                Stmt::new(StmtKind::While { condition: num(1.0, 7), body: block }, Location::at(1, 1)),
                Stmt::new(StmtKind::Break, Location::at(3, 1)),
            ],
        };
        let mut lines = Vec::new();
        program.walk(&mut |s| lines.push(s.line()));
        assert_eq!(lines, vec![1, 2, 3]);
    }

    #[test]
    fn inline_body_is_detected_by_line() {
        let body = |line| Block {
            statements: vec![Stmt::new(StmtKind::Print(vec![num(1.0, 5)]), Location::at(line, 20))],
            location: Location::at(1, 1),
        };
        let inline = Stmt::new(StmtKind::While { condition: num(1.0, 7), body: body(1) }, Location::at(1, 1));
        let multiline = Stmt::new(StmtKind::While { condition: num(1.0, 7), body: body(2) }, Location::at(1, 1));
        assert!(inline.has_inline_body());
        assert!(!multiline.has_inline_body());
        assert!(!Stmt::new(StmtKind::Break, Location::at(1, 1)).has_inline_body());
    }
}
