//! Arena-allocated syntax tree consumed by code generation.
//!
//! Nodes borrow from a [`Bump`] arena owned by the caller, so the whole
//! tree is freed in one deallocation once compilation finishes. Every
//! node carries the source range it was parsed from; code generation
//! copies that range onto each instruction it emits.

use bumpalo::Bump;
use bumpalo::collections::Vec as ArenaVec;

use flint_core::SrcLocation;

use crate::opcode::CmpOp;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Logical negation.
    Not,
}

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// A literal value appearing in source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal<'a> {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(&'a str),
}

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr<'a> {
    /// A literal constant.
    Literal {
        value: Literal<'a>,
        location: SrcLocation,
    },
    /// A variable reference.
    Name {
        name: &'a str,
        location: SrcLocation,
    },
    /// A unary operation.
    Unary {
        op: UnaryOp,
        operand: &'a Expr<'a>,
        location: SrcLocation,
    },
    /// A binary arithmetic operation.
    Binary {
        op: BinOp,
        left: &'a Expr<'a>,
        right: &'a Expr<'a>,
        location: SrcLocation,
    },
    /// A comparison.
    Compare {
        op: CmpOp,
        left: &'a Expr<'a>,
        right: &'a Expr<'a>,
        location: SrcLocation,
    },
    /// A call with positional arguments.
    Call {
        func: &'a Expr<'a>,
        args: ArenaVec<'a, Expr<'a>>,
        location: SrcLocation,
    },
    /// A yield, suspending the enclosing unit.
    Yield {
        value: Option<&'a Expr<'a>>,
        location: SrcLocation,
    },
}

impl Expr<'_> {
    /// The source range of this expression.
    pub fn location(&self) -> SrcLocation {
        match self {
            Expr::Literal { location, .. }
            | Expr::Name { location, .. }
            | Expr::Unary { location, .. }
            | Expr::Binary { location, .. }
            | Expr::Compare { location, .. }
            | Expr::Call { location, .. }
            | Expr::Yield { location, .. } => *location,
        }
    }
}

/// A statement node.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt<'a> {
    /// An expression evaluated for effect; its value is discarded.
    Expr { value: Expr<'a> },
    /// Bind a name to a value.
    Assign {
        name: &'a str,
        value: Expr<'a>,
        location: SrcLocation,
    },
    /// A two-armed conditional.
    If {
        test: Expr<'a>,
        body: ArenaVec<'a, Stmt<'a>>,
        orelse: ArenaVec<'a, Stmt<'a>>,
        location: SrcLocation,
    },
    /// A pre-tested loop.
    While {
        test: Expr<'a>,
        body: ArenaVec<'a, Stmt<'a>>,
        location: SrcLocation,
    },
    /// Return from the enclosing function.
    Return {
        value: Option<Expr<'a>>,
        location: SrcLocation,
    },
    /// Raise an exception, or re-raise when bare.
    Raise {
        exc: Option<Expr<'a>>,
        location: SrcLocation,
    },
    /// A protected region with one catch-all handler.
    Try {
        body: ArenaVec<'a, Stmt<'a>>,
        handler: ArenaVec<'a, Stmt<'a>>,
        location: SrcLocation,
    },
    /// A function definition; the body compiles to its own unit.
    FunctionDef {
        name: &'a str,
        params: ArenaVec<'a, &'a str>,
        body: ArenaVec<'a, Stmt<'a>>,
        location: SrcLocation,
    },
    /// No operation.
    Pass { location: SrcLocation },
}

impl Stmt<'_> {
    /// The source range of this statement.
    pub fn location(&self) -> SrcLocation {
        match self {
            Stmt::Expr { value } => value.location(),
            Stmt::Assign { location, .. }
            | Stmt::If { location, .. }
            | Stmt::While { location, .. }
            | Stmt::Return { location, .. }
            | Stmt::Raise { location, .. }
            | Stmt::Try { location, .. }
            | Stmt::FunctionDef { location, .. }
            | Stmt::Pass { location } => *location,
        }
    }
}

/// A whole source file.
#[derive(Debug)]
pub struct Module<'a> {
    /// Top-level statements in order.
    pub body: ArenaVec<'a, Stmt<'a>>,
}

impl<'a> Module<'a> {
    /// An empty module backed by `arena`.
    pub fn new(arena: &'a Bump) -> Self {
        Self {
            body: ArenaVec::new_in(arena),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locations_propagate_from_nodes() {
        let arena = Bump::new();
        let lhs = arena.alloc(Expr::Literal {
            value: Literal::Int(1),
            location: SrcLocation::line(3, 0),
        });
        let rhs = arena.alloc(Expr::Literal {
            value: Literal::Int(2),
            location: SrcLocation::line(3, 4),
        });
        let sum = Expr::Binary {
            op: BinOp::Add,
            left: lhs,
            right: rhs,
            location: SrcLocation::line(3, 0),
        };
        assert_eq!(sum.location(), SrcLocation::line(3, 0));

        let stmt = Stmt::Expr { value: sum };
        assert_eq!(stmt.location(), SrcLocation::line(3, 0));
    }
}
