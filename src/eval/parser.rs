// Recursive-descent parser for the snippet language

use crate::eval::ast::{
    BinaryOp, CatchClause, DeclKind, Expr, FunctionBody, FunctionDecl, Item, LogicalOp, MemberKey,
    Param, Pattern, Pos, PropDef, Stmt, UnaryOp, VarDecl,
};
use crate::eval::error::CompileError;
use crate::eval::lexer::{Token, TokenKind, tokenize};
use std::rc::Rc;

/// Deepest statement or expression nesting accepted
const MAX_NESTING: usize = 64;

const RESERVED: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "delete", "do", "else", "false",
    "finally", "for", "function", "if", "in", "instanceof", "let", "new", "null", "return",
    "switch", "this", "throw", "true", "try", "typeof", "var", "void", "while", "yield", "await",
];

/// Whether `name` can be used as a variable or parameter name
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        && !RESERVED.contains(&name)
}

/// Parse `src` as a single expression, optionally followed by `;`
pub fn parse_expression_unit(src: &str) -> Result<Expr, CompileError> {
    let mut parser = Parser::new(src, false, false)?;
    let expr = parser.parse_expression()?;
    parser.eat_punct(";");
    parser.expect_eof()?;
    Ok(expr)
}

/// Parse `src` as a function body; `in_async` admits `await`
pub fn parse_statements_unit(src: &str, in_async: bool) -> Result<Vec<Stmt>, CompileError> {
    let mut parser = Parser::new(src, in_async, true)?;
    let mut body = Vec::new();
    while !parser.at_eof() {
        body.push(parser.parse_statement()?);
    }
    Ok(body)
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    in_async: bool,
    in_function: bool,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str, in_async: bool, in_function: bool) -> Result<Self, CompileError> {
        Ok(Self {
            src,
            tokens: tokenize(src)?,
            pos: 0,
            in_async,
            in_function,
            depth: 0,
        })
    }

    // ---- token helpers ----

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn at_punct(&self, p: &str) -> bool {
        matches!(self.peek().kind, TokenKind::Punct(q) if q == p)
    }

    fn at_ident(&self, name: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(n) if n == name)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.at_punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> Result<(), CompileError> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_eof(&self) -> Result<(), CompileError> {
        if self.at_eof() {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn position(&self) -> Pos {
        let token = self.peek();
        Pos {
            line: token.line,
            column: token.column,
        }
    }

    fn last_end(&self) -> usize {
        self.tokens[self.pos.saturating_sub(1)].end
    }

    fn error_here(&self, message: impl Into<String>) -> CompileError {
        let token = self.peek();
        CompileError::syntax(message, token.line, token.column)
    }

    fn unexpected(&self) -> CompileError {
        let token = self.peek();
        let message = match &token.kind {
            TokenKind::Eof => "Unexpected end of input".to_string(),
            TokenKind::Number(_) => "Unexpected number".to_string(),
            TokenKind::Str(_) => "Unexpected string".to_string(),
            TokenKind::Ident(name) if RESERVED.contains(&name.as_str()) => {
                format!("Unexpected token '{}'", name)
            }
            TokenKind::Ident(_) => "Unexpected identifier".to_string(),
            TokenKind::Punct(p) => format!("Unexpected token '{}'", p),
        };
        self.error_here(message)
    }

    fn enter(&mut self) -> Result<(), CompileError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(CompileError::other(
                "RangeError",
                format!("Maximum nesting depth of {} exceeded", MAX_NESTING),
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn consume_semicolon(&mut self) -> Result<(), CompileError> {
        if self.eat_punct(";") || self.at_punct("}") || self.at_eof() || self.peek().newline_before {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn binding_name(&mut self) -> Result<String, CompileError> {
        match &self.peek().kind {
            TokenKind::Ident(name) if is_identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Property names may be any identifier, keywords included
    fn property_name(&mut self) -> Result<String, CompileError> {
        let name = match &self.peek().kind {
            TokenKind::Ident(name) => name.clone(),
            TokenKind::Str(s) => s.clone(),
            TokenKind::Number(n) => crate::eval::value::number_to_string(*n),
            _ => return Err(self.unexpected()),
        };
        self.advance();
        Ok(name)
    }

    // ---- statements ----

    fn parse_statement(&mut self) -> Result<Stmt, CompileError> {
        self.enter()?;
        let stmt = self.parse_statement_inner();
        self.leave();
        stmt
    }

    fn parse_statement_inner(&mut self) -> Result<Stmt, CompileError> {
        let pos = self.position();
        if self.at_punct("{") {
            return Ok(Stmt::Block(self.parse_block()?));
        }
        if self.eat_punct(";") {
            return Ok(Stmt::Empty);
        }

        let keyword = match &self.peek().kind {
            TokenKind::Ident(name) => name.clone(),
            _ => String::new(),
        };
        match keyword.as_str() {
            "let" | "const" | "var" => {
                let kind = self.decl_kind();
                let decls = self.parse_var_decls(kind)?;
                self.consume_semicolon()?;
                Ok(Stmt::Var(kind, decls, pos))
            }
            "function" => Ok(Stmt::Function(self.parse_function(false, true)?)),
            "async"
                if matches!(&self.peek_at(1).kind, TokenKind::Ident(n) if n == "function")
                    && !self.peek_at(1).newline_before =>
            {
                Ok(Stmt::Function(self.parse_function(true, true)?))
            }
            "return" => {
                if !self.in_function {
                    return Err(self.error_here("Illegal return statement"));
                }
                self.advance();
                let value = if self.at_punct(";")
                    || self.at_punct("}")
                    || self.at_eof()
                    || self.peek().newline_before
                {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.consume_semicolon()?;
                Ok(Stmt::Return(value, pos))
            }
            "if" => {
                self.advance();
                self.expect_punct("(")?;
                let test = self.parse_expression()?;
                self.expect_punct(")")?;
                let then = Box::new(self.parse_statement()?);
                let otherwise = if self.at_ident("else") {
                    self.advance();
                    Some(Box::new(self.parse_statement()?))
                } else {
                    None
                };
                Ok(Stmt::If(test, then, otherwise))
            }
            "while" => {
                self.advance();
                self.expect_punct("(")?;
                let test = self.parse_expression()?;
                self.expect_punct(")")?;
                Ok(Stmt::While(test, Box::new(self.parse_statement()?)))
            }
            "for" => self.parse_for(),
            "break" | "continue" => {
                self.advance();
                self.consume_semicolon()?;
                Ok(if keyword == "break" {
                    Stmt::Break
                } else {
                    Stmt::Continue
                })
            }
            "throw" => {
                self.advance();
                if self.peek().newline_before {
                    return Err(self.error_here("Illegal newline after throw"));
                }
                let value = self.parse_expression()?;
                self.consume_semicolon()?;
                Ok(Stmt::Throw(value, pos))
            }
            "try" => self.parse_try(),
            _ => {
                let expr = self.parse_expression()?;
                self.consume_semicolon()?;
                Ok(Stmt::Expr(expr, pos))
            }
        }
    }

    fn decl_kind(&mut self) -> DeclKind {
        match &self.advance().kind {
            TokenKind::Ident(n) if n == "const" => DeclKind::Const,
            TokenKind::Ident(n) if n == "var" => DeclKind::Var,
            _ => DeclKind::Let,
        }
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, CompileError> {
        self.expect_punct("{")?;
        let mut body = Vec::new();
        while !self.at_punct("}") {
            if self.at_eof() {
                return Err(self.unexpected());
            }
            body.push(self.parse_statement()?);
        }
        self.advance();
        Ok(body)
    }

    fn parse_var_decls(&mut self, kind: DeclKind) -> Result<Vec<VarDecl>, CompileError> {
        let mut decls = Vec::new();
        loop {
            let target = self.parse_pattern()?;
            decls.push(self.finish_var_decl(kind, target)?);
            if !self.eat_punct(",") {
                return Ok(decls);
            }
        }
    }

    fn finish_var_decl(&mut self, kind: DeclKind, target: Pattern) -> Result<VarDecl, CompileError> {
        let init = if self.eat_punct("=") {
            Some(self.parse_assignment()?)
        } else {
            None
        };
        if init.is_none() && (kind == DeclKind::Const || !matches!(target, Pattern::Ident(_))) {
            return Err(self.error_here("Missing initializer in declaration"));
        }
        Ok(VarDecl { target, init })
    }

    fn parse_pattern(&mut self) -> Result<Pattern, CompileError> {
        if self.eat_punct("{") {
            let mut fields = Vec::new();
            while !self.eat_punct("}") {
                let key = self.property_name()?;
                let name = if self.eat_punct(":") {
                    self.binding_name()?
                } else if is_identifier(&key) {
                    key.clone()
                } else {
                    return Err(self.unexpected());
                };
                let default = if self.eat_punct("=") {
                    Some(self.parse_assignment()?)
                } else {
                    None
                };
                fields.push((key, name, default));
                if !self.at_punct("}") {
                    self.expect_punct(",")?;
                }
            }
            return Ok(Pattern::Object(fields));
        }
        if self.eat_punct("[") {
            let mut items = Vec::new();
            while !self.eat_punct("]") {
                if self.eat_punct(",") {
                    items.push(None);
                    continue;
                }
                items.push(Some(self.binding_name()?));
                if !self.at_punct("]") {
                    self.expect_punct(",")?;
                }
            }
            return Ok(Pattern::Array(items));
        }
        Ok(Pattern::Ident(self.binding_name()?))
    }

    fn parse_for(&mut self) -> Result<Stmt, CompileError> {
        let pos = self.position();
        self.advance();
        self.expect_punct("(")?;

        let mut init = None;
        if self.at_ident("let") || self.at_ident("const") || self.at_ident("var") {
            let kind = self.decl_kind();
            let target = self.parse_pattern()?;
            if self.at_ident("of") || self.at_ident("in") {
                let is_of = self.at_ident("of");
                self.advance();
                let subject = if is_of {
                    self.parse_assignment()?
                } else {
                    self.parse_expression()?
                };
                self.expect_punct(")")?;
                let body = Box::new(self.parse_statement()?);
                return Ok(if is_of {
                    Stmt::ForOf {
                        kind,
                        target,
                        iterable: subject,
                        body,
                        pos,
                    }
                } else {
                    Stmt::ForIn {
                        kind,
                        target,
                        object: subject,
                        body,
                        pos,
                    }
                });
            }
            let mut decls = vec![self.finish_var_decl(kind, target)?];
            while self.eat_punct(",") {
                let target = self.parse_pattern()?;
                decls.push(self.finish_var_decl(kind, target)?);
            }
            init = Some(Box::new(Stmt::Var(kind, decls, pos)));
        } else if !self.at_punct(";") {
            let expr_pos = self.position();
            init = Some(Box::new(Stmt::Expr(self.parse_expression()?, expr_pos)));
        }

        self.expect_punct(";")?;
        let test = if self.at_punct(";") {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(";")?;
        let update = if self.at_punct(")") {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    fn parse_try(&mut self) -> Result<Stmt, CompileError> {
        self.advance();
        let block = self.parse_block()?;
        let catch = if self.at_ident("catch") {
            self.advance();
            let param = if self.eat_punct("(") {
                let pattern = self.parse_pattern()?;
                self.expect_punct(")")?;
                Some(pattern)
            } else {
                None
            };
            Some(CatchClause {
                param,
                body: self.parse_block()?,
            })
        } else {
            None
        };
        let finally = if self.at_ident("finally") {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };
        if catch.is_none() && finally.is_none() {
            return Err(self.error_here("Missing catch or finally after try"));
        }
        Ok(Stmt::Try {
            block,
            catch,
            finally,
        })
    }

    // ---- functions ----

    /// `[async] function [name](params) { body }`
    fn parse_function(&mut self, is_async: bool, require_name: bool) -> Result<Rc<FunctionDecl>, CompileError> {
        let start = self.peek().start;
        let pos = self.position();
        if is_async {
            self.advance();
        }
        self.advance(); // function
        let name = if matches!(self.peek().kind, TokenKind::Ident(_)) {
            Some(self.binding_name()?)
        } else if require_name {
            return Err(self.error_here("Function statements require a function name"));
        } else {
            None
        };
        self.parse_function_rest(name, is_async, start, pos)
    }

    /// Parameters and body; `start` is the offset where the source text begins
    fn parse_function_rest(
        &mut self,
        name: Option<String>,
        is_async: bool,
        start: usize,
        pos: Pos,
    ) -> Result<Rc<FunctionDecl>, CompileError> {
        let (params, rest) = self.parse_params()?;
        let saved = (self.in_async, self.in_function);
        self.in_async = is_async;
        self.in_function = true;
        let body = self.parse_block();
        (self.in_async, self.in_function) = saved;

        Ok(Rc::new(FunctionDecl {
            name,
            params,
            rest,
            body: FunctionBody::Block(body?),
            is_async,
            is_arrow: false,
            source: Rc::from(&self.src[start..self.last_end()]),
            pos,
        }))
    }

    fn parse_params(&mut self) -> Result<(Vec<Param>, Option<String>), CompileError> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        let mut rest = None;
        while !self.eat_punct(")") {
            if self.eat_punct("...") {
                rest = Some(self.binding_name()?);
                self.expect_punct(")")?;
                break;
            }
            let name = self.binding_name()?;
            let default = if self.eat_punct("=") {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            params.push(Param { name, default });
            if !self.at_punct(")") {
                self.expect_punct(",")?;
            }
        }
        Ok((params, rest))
    }

    /// Whether an arrow function starts `offset` tokens ahead
    fn arrow_ahead(&self, offset: usize) -> bool {
        let is_arrow = |i: usize| matches!(self.peek_at(i).kind, TokenKind::Punct("=>"));
        match &self.peek_at(offset).kind {
            TokenKind::Ident(name) if is_identifier(name) => is_arrow(offset + 1),
            TokenKind::Punct("(") => {
                let mut depth = 0usize;
                let mut i = offset;
                loop {
                    match self.peek_at(i).kind {
                        TokenKind::Punct("(") => depth += 1,
                        TokenKind::Punct(")") => {
                            depth -= 1;
                            if depth == 0 {
                                return is_arrow(i + 1) && !self.peek_at(i + 1).newline_before;
                            }
                        }
                        TokenKind::Eof => return false,
                        _ => {}
                    }
                    i += 1;
                }
            }
            _ => false,
        }
    }

    fn parse_arrow(&mut self, is_async: bool) -> Result<Expr, CompileError> {
        let start = self.peek().start;
        let pos = self.position();
        if is_async {
            self.advance();
        }
        let (params, rest) = if self.at_punct("(") {
            self.parse_params()?
        } else {
            let name = self.binding_name()?;
            (vec![Param { name, default: None }], None)
        };
        self.expect_punct("=>")?;

        let saved = (self.in_async, self.in_function);
        self.in_async = is_async;
        let body = if self.at_punct("{") {
            self.in_function = true;
            self.parse_block().map(FunctionBody::Block)
        } else {
            self.parse_assignment().map(|e| FunctionBody::Expr(Box::new(e)))
        };
        (self.in_async, self.in_function) = saved;

        Ok(Expr::Function(Rc::new(FunctionDecl {
            name: None,
            params,
            rest,
            body: body?,
            is_async,
            is_arrow: true,
            source: Rc::from(&self.src[start..self.last_end()]),
            pos,
        })))
    }

    // ---- expressions ----

    fn parse_expression(&mut self) -> Result<Expr, CompileError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, CompileError> {
        self.enter()?;
        let expr = self.parse_assignment_inner();
        self.leave();
        expr
    }

    fn parse_assignment_inner(&mut self) -> Result<Expr, CompileError> {
        if self.arrow_ahead(0) {
            return self.parse_arrow(false);
        }
        if self.at_ident("async") && !self.peek_at(1).newline_before && self.arrow_ahead(1) {
            return self.parse_arrow(true);
        }

        let target = self.parse_conditional()?;
        let op = match self.peek().kind {
            TokenKind::Punct("=") => None,
            TokenKind::Punct("+=") => Some(BinaryOp::Add),
            TokenKind::Punct("-=") => Some(BinaryOp::Sub),
            TokenKind::Punct("*=") => Some(BinaryOp::Mul),
            TokenKind::Punct("/=") => Some(BinaryOp::Div),
            TokenKind::Punct("%=") => Some(BinaryOp::Rem),
            TokenKind::Punct("**=") => Some(BinaryOp::Pow),
            _ => return Ok(target),
        };
        if !is_assignable(&target) {
            return Err(self.error_here("Invalid left-hand side in assignment"));
        }
        self.advance();
        let value = self.parse_assignment()?;
        Ok(Expr::Assign(op, Box::new(target), Box::new(value)))
    }

    fn parse_conditional(&mut self) -> Result<Expr, CompileError> {
        let test = self.parse_binary(1)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let then = self.parse_assignment()?;
        self.expect_punct(":")?;
        let otherwise = self.parse_assignment()?;
        Ok(Expr::Conditional(
            Box::new(test),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    fn binary_op(&self) -> Option<(u8, BinaryKind)> {
        let op = match &self.peek().kind {
            TokenKind::Punct(p) => match *p {
                "??" => (1, BinaryKind::Logical(LogicalOp::Nullish)),
                "||" => (2, BinaryKind::Logical(LogicalOp::Or)),
                "&&" => (3, BinaryKind::Logical(LogicalOp::And)),
                "==" => (6, BinaryKind::Binary(BinaryOp::Eq)),
                "!=" => (6, BinaryKind::Binary(BinaryOp::NotEq)),
                "===" => (6, BinaryKind::Binary(BinaryOp::StrictEq)),
                "!==" => (6, BinaryKind::Binary(BinaryOp::StrictNotEq)),
                "<" => (7, BinaryKind::Binary(BinaryOp::Lt)),
                "<=" => (7, BinaryKind::Binary(BinaryOp::LtEq)),
                ">" => (7, BinaryKind::Binary(BinaryOp::Gt)),
                ">=" => (7, BinaryKind::Binary(BinaryOp::GtEq)),
                "+" => (9, BinaryKind::Binary(BinaryOp::Add)),
                "-" => (9, BinaryKind::Binary(BinaryOp::Sub)),
                "*" => (10, BinaryKind::Binary(BinaryOp::Mul)),
                "/" => (10, BinaryKind::Binary(BinaryOp::Div)),
                "%" => (10, BinaryKind::Binary(BinaryOp::Rem)),
                "**" => (11, BinaryKind::Binary(BinaryOp::Pow)),
                _ => return None,
            },
            TokenKind::Ident(name) if name == "in" => (7, BinaryKind::Binary(BinaryOp::In)),
            _ => return None,
        };
        Some(op)
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, CompileError> {
        let mut left = self.parse_unary()?;
        while let Some((prec, kind)) = self.binary_op() {
            if prec < min_prec {
                break;
            }
            self.advance();
            // `**` is right-associative
            let next = if kind == BinaryKind::Binary(BinaryOp::Pow) {
                prec
            } else {
                prec + 1
            };
            let right = self.parse_binary(next)?;
            left = match kind {
                BinaryKind::Binary(op) => Expr::Binary(op, Box::new(left), Box::new(right)),
                BinaryKind::Logical(op) => Expr::Logical(op, Box::new(left), Box::new(right)),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        self.enter()?;
        let expr = self.parse_unary_inner();
        self.leave();
        expr
    }

    fn parse_unary_inner(&mut self) -> Result<Expr, CompileError> {
        let unary = match &self.peek().kind {
            TokenKind::Punct("!") => Some(UnaryOp::Not),
            TokenKind::Punct("-") => Some(UnaryOp::Neg),
            TokenKind::Punct("+") => Some(UnaryOp::Plus),
            TokenKind::Ident(n) if n == "typeof" => Some(UnaryOp::Typeof),
            _ => None,
        };
        if let Some(op) = unary {
            self.advance();
            return Ok(Expr::Unary(op, Box::new(self.parse_unary()?)));
        }

        if self.at_punct("++") || self.at_punct("--") {
            let increment = self.at_punct("++");
            self.advance();
            let target = self.parse_unary()?;
            if !is_assignable(&target) {
                return Err(self.error_here("Invalid left-hand side expression in prefix operation"));
            }
            return Ok(Expr::Update {
                increment,
                prefix: true,
                target: Box::new(target),
            });
        }

        if self.at_ident("await") {
            if !self.in_async {
                return Err(self.error_here("await is only valid in async functions"));
            }
            self.advance();
            return Ok(Expr::Await(Box::new(self.parse_unary()?)));
        }

        let expr = self.parse_call_member()?;
        if (self.at_punct("++") || self.at_punct("--")) && !self.peek().newline_before {
            if !is_assignable(&expr) {
                return Err(self.error_here("Invalid left-hand side expression in postfix operation"));
            }
            let increment = self.at_punct("++");
            self.advance();
            return Ok(Expr::Update {
                increment,
                prefix: false,
                target: Box::new(expr),
            });
        }
        Ok(expr)
    }

    fn parse_call_member(&mut self) -> Result<Expr, CompileError> {
        let mut expr = if self.at_ident("new") {
            let pos = self.position();
            self.advance();
            let mut callee = self.parse_primary()?;
            loop {
                let pos = self.position();
                if self.eat_punct(".") {
                    let name = self.property_name()?;
                    callee = member(callee, MemberKey::Named(name), false, pos);
                } else {
                    break;
                }
            }
            let args = if self.at_punct("(") {
                self.parse_args()?
            } else {
                Vec::new()
            };
            Expr::New {
                callee: Box::new(callee),
                args,
                pos,
            }
        } else {
            self.parse_primary()?
        };

        loop {
            let pos = self.position();
            if self.eat_punct(".") {
                let name = self.property_name()?;
                expr = member(expr, MemberKey::Named(name), false, pos);
            } else if self.eat_punct("?.") {
                if self.at_punct("(") {
                    let args = self.parse_args()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        optional: true,
                        pos,
                    };
                } else if self.eat_punct("[") {
                    let key = self.parse_expression()?;
                    self.expect_punct("]")?;
                    expr = member(expr, MemberKey::Computed(Box::new(key)), true, pos);
                } else {
                    let name = self.property_name()?;
                    expr = member(expr, MemberKey::Named(name), true, pos);
                }
            } else if self.eat_punct("[") {
                let key = self.parse_expression()?;
                self.expect_punct("]")?;
                expr = member(expr, MemberKey::Computed(Box::new(key)), false, pos);
            } else if self.at_punct("(") {
                let args = self.parse_args()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    optional: false,
                    pos,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Item>, CompileError> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        while !self.eat_punct(")") {
            if self.eat_punct("...") {
                args.push(Item::Spread(self.parse_assignment()?));
            } else {
                args.push(Item::Expr(self.parse_assignment()?));
            }
            if !self.at_punct(")") {
                self.expect_punct(",")?;
            }
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let pos = self.position();
        match self.peek().kind.clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Str(Rc::from(s.as_str())))
            }
            TokenKind::Punct("(") => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            TokenKind::Punct("[") => self.parse_array_literal(),
            TokenKind::Punct("{") => self.parse_object_literal(),
            TokenKind::Ident(name) => match name.as_str() {
                "true" | "false" => {
                    self.advance();
                    Ok(Expr::Bool(name == "true"))
                }
                "null" => {
                    self.advance();
                    Ok(Expr::Null)
                }
                "undefined" => {
                    self.advance();
                    Ok(Expr::Undefined)
                }
                "this" => {
                    self.advance();
                    Ok(Expr::This)
                }
                "function" => Ok(Expr::Function(self.parse_function(false, false)?)),
                "async"
                    if matches!(&self.peek_at(1).kind, TokenKind::Ident(n) if n == "function")
                        && !self.peek_at(1).newline_before =>
                {
                    Ok(Expr::Function(self.parse_function(true, false)?))
                }
                _ if is_identifier(&name) => {
                    self.advance();
                    Ok(Expr::Ident(name, pos))
                }
                _ => Err(self.unexpected()),
            },
            _ => Err(self.unexpected()),
        }
    }

    fn parse_array_literal(&mut self) -> Result<Expr, CompileError> {
        self.advance();
        let mut items = Vec::new();
        while !self.eat_punct("]") {
            if self.eat_punct("...") {
                items.push(Item::Spread(self.parse_assignment()?));
            } else {
                items.push(Item::Expr(self.parse_assignment()?));
            }
            if !self.at_punct("]") {
                self.expect_punct(",")?;
            }
        }
        Ok(Expr::Array(items))
    }

    fn parse_object_literal(&mut self) -> Result<Expr, CompileError> {
        self.advance();
        let mut props = Vec::new();
        while !self.eat_punct("}") {
            if self.eat_punct("...") {
                props.push(PropDef::Spread(self.parse_assignment()?));
            } else {
                props.push(self.parse_property()?);
            }
            if !self.at_punct("}") {
                self.expect_punct(",")?;
            }
        }
        Ok(Expr::Object(props))
    }

    fn parse_property(&mut self) -> Result<PropDef, CompileError> {
        let start = self.peek().start;
        let pos = self.position();
        let key_is_ident = matches!(self.peek().kind, TokenKind::Ident(_));
        let key = self.property_name()?;

        // `get name() {}` and `async name() {}`
        let modifier = key_is_ident
            && (key == "get" || key == "async")
            && !matches!(
                self.peek().kind,
                TokenKind::Punct(":" | "(" | "," | "}")
            );
        if modifier {
            let name = self.property_name()?;
            let decl = self.parse_function_rest(Some(name.clone()), key == "async", start, pos)?;
            return Ok(if key == "get" {
                PropDef::Getter(name, decl)
            } else {
                PropDef::Init(name, Expr::Function(decl))
            });
        }

        if self.at_punct("(") {
            let decl = self.parse_function_rest(Some(key.clone()), false, start, pos)?;
            return Ok(PropDef::Init(key, Expr::Function(decl)));
        }
        if self.eat_punct(":") {
            return Ok(PropDef::Init(key, self.parse_assignment()?));
        }
        if key_is_ident && is_identifier(&key) {
            return Ok(PropDef::Init(key.clone(), Expr::Ident(key, pos)));
        }
        Err(self.unexpected())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryKind {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

fn member(object: Expr, key: MemberKey, optional: bool, pos: Pos) -> Expr {
    Expr::Member {
        object: Box::new(object),
        key,
        optional,
        pos,
    }
}

fn is_assignable(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Ident(..) | Expr::Member { optional: false, .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::error::FailureClass;

    #[test]
    fn test_expression_unit() {
        assert!(matches!(
            parse_expression_unit("1 + 2 * 3").unwrap(),
            Expr::Binary(BinaryOp::Add, _, _)
        ));
        assert!(matches!(
            parse_expression_unit("{a: 1, b: [1, 2, 3]}").unwrap(),
            Expr::Object(props) if props.len() == 2
        ));
    }

    #[test]
    fn test_statements_are_not_expressions() {
        let err = parse_expression_unit("let x = 1; return x").unwrap_err();
        assert_eq!(err.class, FailureClass::Syntax);
        assert_eq!(parse_statements_unit("let x = 1; return x", false).unwrap().len(), 2);
    }

    #[test]
    fn test_await_needs_async() {
        let err = parse_statements_unit("const r = await sleep(1); return r", false).unwrap_err();
        assert!(err.is_syntax());
        assert!(parse_statements_unit("const r = await sleep(1); return r", true).is_ok());
    }

    #[test]
    fn test_return_outside_function() {
        assert!(parse_expression_unit("return 1").unwrap_err().is_syntax());
    }

    #[test]
    fn test_arrow_and_methods_keep_source() {
        let expr = parse_expression_unit("(a, b = 2) => a + b").unwrap();
        let Expr::Function(decl) = expr else {
            panic!("expected function");
        };
        assert!(decl.is_arrow);
        assert_eq!(&*decl.source, "(a, b = 2) => a + b");
        assert_eq!(decl.params.len(), 2);

        let expr = parse_expression_unit("{ get size() { return 1 }, greet(name) { return name } }").unwrap();
        let Expr::Object(props) = expr else {
            panic!("expected object");
        };
        assert!(matches!(&props[0], PropDef::Getter(name, _) if name == "size"));
        assert!(matches!(&props[1], PropDef::Init(name, Expr::Function(d)) if name == "greet" && &*d.source == "greet(name) { return name }"));
    }

    #[test]
    fn test_nesting_limit_is_not_syntax() {
        let src = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        let err = parse_expression_unit(&src).unwrap_err();
        assert_eq!(err.class, FailureClass::Other);
    }

    #[test]
    fn test_asi_on_newline() {
        let body = parse_statements_unit("let a = 1\nlet b = 2\nreturn a + b", false).unwrap();
        assert_eq!(body.len(), 3);
    }

    #[test]
    fn test_for_of_and_destructuring() {
        let body = parse_statements_unit("for (const [k, v] of Object.entries(o)) { total += v }", false).unwrap();
        assert!(matches!(&body[0], Stmt::ForOf { target: Pattern::Array(items), .. } if items.len() == 2));
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("executor"));
        assert!(is_identifier("$x_1"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("return"));
        assert!(!is_identifier("a-b"));
    }
}
