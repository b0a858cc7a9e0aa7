//! The syntax tree the parser produces and both the gas-metered validator
//! and the interpreter walk.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone)]
pub enum Expr {
    NoneLit,
    BoolLit(bool),
    IntLit(i64),
    FloatLit(f64),
    StrLit(String),
    ListLit(Vec<Expr>),
    Name(String),
    Attribute(Box<Expr>, String),
    Call(Box<Expr>, Vec<Expr>),
    UnaryOp(UnaryOp, Box<Expr>),
    BinOp(Box<Expr>, BinOp, Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Let(String, Expr),
    Assign(String, Expr),
    ExprStmt(Expr),
    If(Expr, Vec<Stmt>, Vec<Stmt>),
    For(String, Expr, Vec<Stmt>),
    While(Expr, Vec<Stmt>),
    FunctionDef(String, Vec<String>, Vec<Stmt>),
    Return(Option<Expr>),
}

pub type Program = Vec<Stmt>;
