use crate::error::Span;
use crate::lexer::Token;
use crate::state::State;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expression {
        expr: Expr,
        span: Span,
    },
    Print {
        expr: Expr,
        span: Span,
    },
    Var {
        name: Token,
        initializer: Option<Expr>,
        span: Span,
    },
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        span: Span,
    },
    /// `entry` is the scenario state in force when the block was parsed; the
    /// interpreter re-enters it on execution so both state machines stay in
    /// lockstep. `keyword` is the token that opened the block (`When`,
    /// `Then`, or the INDENT itself) and anchors runtime diagnostics.
    Block {
        statements: Vec<Stmt>,
        entry: State,
        keyword: Token,
        span: Span,
    },
    Scenario {
        label: String,
        keyword: Token,
        span: Span,
    },
    When {
        expr: Expr,
        keyword: Token,
        span: Span,
    },
    Then {
        expr: Expr,
        keyword: Token,
        span: Span,
    },
    And {
        expr: Expr,
        keyword: Token,
        span: Span,
    },
    /// A line containing only a NEWLINE; silently ignored.
    NoOp {
        span: Span,
    },
}

impl Stmt {
    pub fn span(&self) -> &Span {
        match self {
            Stmt::Expression { span, .. } => span,
            Stmt::Print { span, .. } => span,
            Stmt::Var { span, .. } => span,
            Stmt::If { span, .. } => span,
            Stmt::Block { span, .. } => span,
            Stmt::Scenario { span, .. } => span,
            Stmt::When { span, .. } => span,
            Stmt::Then { span, .. } => span,
            Stmt::And { span, .. } => span,
            Stmt::NoOp { span } => span,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal {
        value: Value,
        span: Span,
    },
    Variable {
        name: Token,
        span: Span,
    },
    Assign {
        name: Token,
        value: Box<Expr>,
        span: Span,
    },
    Unary {
        operator: UnaryOp,
        operator_token: Token,
        operand: Box<Expr>,
        span: Span,
    },
    Binary {
        left: Box<Expr>,
        operator: BinaryOp,
        operator_token: Token,
        right: Box<Expr>,
        span: Span,
    },
    Logical {
        left: Box<Expr>,
        operator: LogicalOp,
        right: Box<Expr>,
        span: Span,
    },
    Grouping {
        expr: Box<Expr>,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        paren: Token,
        args: Vec<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> &Span {
        match self {
            Expr::Literal { span, .. } => span,
            Expr::Variable { span, .. } => span,
            Expr::Assign { span, .. } => span,
            Expr::Unary { span, .. } => span,
            Expr::Binary { span, .. } => span,
            Expr::Logical { span, .. } => span,
            Expr::Grouping { span, .. } => span,
            Expr::Call { span, .. } => span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}
