// Syntax tree for the snippet language

use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    Typeof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Let,
    Const,
    Var,
}

#[derive(Debug, Clone)]
pub enum MemberKey {
    Named(String),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum PropDef {
    Init(String, Expr),
    Getter(String, Rc<FunctionDecl>),
    Spread(Expr),
}

/// Element of an array literal or argument list
#[derive(Debug, Clone)]
pub enum Item {
    Expr(Expr),
    Spread(Expr),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Number(f64),
    Str(Rc<str>),
    Bool(bool),
    Null,
    Undefined,
    This,
    Ident(String, Pos),
    Array(Vec<Item>),
    Object(Vec<PropDef>),
    Function(Rc<FunctionDecl>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    /// `target op= value`; `op` is `None` for plain assignment
    Assign(Option<BinaryOp>, Box<Expr>, Box<Expr>),
    Update {
        increment: bool,
        prefix: bool,
        target: Box<Expr>,
    },
    Member {
        object: Box<Expr>,
        key: MemberKey,
        optional: bool,
        pos: Pos,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Item>,
        optional: bool,
        pos: Pos,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Item>,
        pos: Pos,
    },
    Await(Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum Pattern {
    Ident(String),
    /// `{ key: name = default }`
    Object(Vec<(String, String, Option<Expr>)>),
    /// `[a, , b]`
    Array(Vec<Option<String>>),
}

impl Pattern {
    pub fn names(&self) -> Vec<&str> {
        match self {
            Pattern::Ident(name) => vec![name.as_str()],
            Pattern::Object(fields) => fields.iter().map(|(_, name, _)| name.as_str()).collect(),
            Pattern::Array(items) => items.iter().flatten().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub target: Pattern,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct CatchClause {
    pub param: Option<Pattern>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(Expr, Pos),
    Var(DeclKind, Vec<VarDecl>, Pos),
    Function(Rc<FunctionDecl>),
    Return(Option<Expr>, Pos),
    If(Expr, Box<Stmt>, Option<Box<Stmt>>),
    While(Expr, Box<Stmt>),
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForOf {
        kind: DeclKind,
        target: Pattern,
        iterable: Expr,
        body: Box<Stmt>,
        pos: Pos,
    },
    ForIn {
        kind: DeclKind,
        target: Pattern,
        object: Expr,
        body: Box<Stmt>,
        pos: Pos,
    },
    Break,
    Continue,
    Throw(Expr, Pos),
    Try {
        block: Vec<Stmt>,
        catch: Option<CatchClause>,
        finally: Option<Vec<Stmt>>,
    },
    Block(Vec<Stmt>),
    Empty,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    Expr(Box<Expr>),
}

#[derive(Debug)]
pub struct FunctionDecl {
    pub name: Option<String>,
    pub params: Vec<Param>,
    pub rest: Option<String>,
    pub body: FunctionBody,
    pub is_async: bool,
    pub is_arrow: bool,
    /// Declaration text as written
    pub source: Rc<str>,
    pub pos: Pos,
}
