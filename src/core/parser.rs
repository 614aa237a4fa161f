// src/core/parser.rs
//! Recursive-descent parser for SUSA with precedence parsing, spanned
//! diagnostics and panic-mode recovery. One syntax error never hides the
//! rest of the file.

use std::sync::Arc;

use crate::core::ast::{
    BinaryOp, Block, ClassDecl, Expr, ExprKind, FunctionDecl, LogicalOp, Program, Stmt, StmtKind,
    StringPart, UnaryOp,
};
use crate::core::diagnostics::{Diagnostic, ErrorKind, Location};
use crate::core::lexer::Lexer;
use crate::core::stack::ensure_sufficient_stack;
use crate::core::token::{Keyword, Operator, Punct, Token, TokenKind};

type PResult<T> = Result<T, Diagnostic>;

/// Deepest nesting accepted for expressions, and separately for statements
/// (bodies and ELIF chains).
pub const MAX_NESTING: usize = 256;

/// Parser result. `program` is present only when no error was recorded.
#[derive(Debug, Clone)]
pub struct ParseOutput {
    pub program: Option<Program>,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<Diagnostic>,
    warnings: Vec<Diagnostic>,
    loop_depth: usize,
    func_depth: usize,
    expr_depth: usize,
    block_depth: usize,
    nesting_reported: bool,
}

impl Parser {
    /// Create new parser instance; trivia is dropped and a trailing EOF
    /// token is guaranteed.
    pub fn new(tokens: Vec<Token>) -> Self {
        let mut tokens: Vec<Token> = tokens.into_iter().filter(|t| !t.kind.is_trivia()).collect();
        if !matches!(tokens.last().map(|t| &t.kind), Some(TokenKind::Eof)) {
            let (line, column, end) = tokens.last().map(|t| (t.line, t.column, t.end)).unwrap_or((1, 1, 0));
            tokens.push(Token { kind: TokenKind::Eof, lexeme: String::new(), line, column, start: end, end });
        }
        Parser {
            tokens,
            pos: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            loop_depth: 0,
            func_depth: 0,
            expr_depth: 0,
            block_depth: 0,
            nesting_reported: false,
        }
    }

    /// Main parse entrypoint.
    pub fn parse(mut self) -> ParseOutput {
        let statements = self.parse_statements(&[]);
        let program = if self.errors.is_empty() { Some(Program { statements }) } else { None };
        ParseOutput { program, errors: self.errors, warnings: self.warnings }
    }

    /* ── Statements ───────────────────────────────────────── */

    /// Parses statements until EOF or one of `terminators` (not consumed).
    fn parse_statements(&mut self, terminators: &[Keyword]) -> Vec<Stmt> {
        let mut stmts: Vec<Stmt> = Vec::new();
        let mut flagged_unreachable = false;
        loop {
            self.skip_separators();
            if self.is_at_end() || self.check_any_keyword(terminators) {
                break;
            }
            let before = self.pos;
            match self.parse_statement() {
                Ok(stmt) => {
                    let diverged = stmts.last().map(|s| is_diverging(&s.kind)).unwrap_or(false);
                    if diverged && !flagged_unreachable {
                        flagged_unreachable = true;
                        self.warnings.push(Diagnostic::warning(
                            ErrorKind::Syntax,
                            "Unreachable statement",
                            stmt.location,
                        ));
                    }
                    stmts.push(stmt);
                    if !self.at_statement_end(terminators) {
                        let tok = self.peek().clone();
                        self.errors.push(self.err_at(
                            &format!("Expected newline after statement, found {}", tok.kind),
                            tok.location(),
                        ));
                        self.synchronize();
                    }
                }
                Err(diag) => {
                    self.errors.push(diag);
                    if self.pos == before {
                        self.advance();
                    }
                    self.synchronize();
                }
            }
        }
        stmts
    }

    /// Parses a single statement based on the leading token.
    fn parse_statement(&mut self) -> PResult<Stmt> {
        self.nested_statement(|p| p.dispatch_statement())
    }

    /// Statements nested past [`MAX_NESTING`] are still consumed, so every
    /// END pairs up, but the program is rejected with one error.
    fn nested_statement(&mut self, f: impl FnOnce(&mut Self) -> PResult<Stmt>) -> PResult<Stmt> {
        if self.block_depth >= MAX_NESTING && !self.nesting_reported {
            self.nesting_reported = true;
            self.errors.push(self.err_at("Block nested too deeply", self.peek().location()));
        }
        self.block_depth += 1;
        let stmt = ensure_sufficient_stack(|| f(self));
        self.block_depth -= 1;
        stmt
    }

    fn dispatch_statement(&mut self) -> PResult<Stmt> {
        let tok = self.peek().clone();
        let kw = match tok.kind {
            TokenKind::Keyword(kw) => kw,
            _ => return self.parse_expression_statement(),
        };
        match kw {
            Keyword::Let => self.parse_let(),
            Keyword::Func => self.parse_function(),
            Keyword::Class => self.parse_class(),
            Keyword::If => self.parse_if(),
            Keyword::While => self.parse_while(),
            Keyword::For => self.parse_for(),
            Keyword::Loop => self.parse_loop(),
            Keyword::Start => self.parse_start_block(),
            Keyword::Return => self.parse_return(),
            Keyword::Print => self.parse_print(),
            Keyword::Break | Keyword::Continue => self.parse_loop_control(kw),
            Keyword::End => Err(self.err_at("Unexpected END without an open block", tok.location())),
            Keyword::Else | Keyword::Elif => {
                Err(self.err_at(&format!("Unexpected {} without matching IF", kw), tok.location()))
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_expression_statement(&mut self) -> PResult<Stmt> {
        let expr = self.parse_expression()?;
        let location = expr.location;
        Ok(Stmt::new(StmtKind::Expr(expr), location))
    }

    fn parse_let(&mut self) -> PResult<Stmt> {
        let start = self.advance().location();
        let name = self.consume_identifier("Expected variable name after LET")?;
        let type_hint = if self.match_punct(Punct::Colon) {
            Some(self.consume_identifier("Expected type name after ':'")?)
        } else {
            None
        };
        let value = if self.match_operator(Operator::Assign) { Some(self.parse_expression()?) } else { None };
        Ok(Stmt::new(StmtKind::Let { name, type_hint, value }, self.span_from(start)))
    }

    fn parse_function(&mut self) -> PResult<Stmt> {
        let start = self.advance().location();
        let name = self.consume_identifier("Expected function name after FUNC")?;
        self.consume_punct(Punct::OpenParen, "Expected '(' after function name")?;
        let mut params = Vec::new();
        if !self.check_punct(Punct::CloseParen) {
            loop {
                params.push(self.consume_identifier("Expected parameter name")?);
                if !self.match_punct(Punct::Comma) {
                    break;
                }
            }
        }
        self.consume_punct(Punct::CloseParen, "Expected ')' after parameters")?;

        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        self.func_depth += 1;
        let body = self.parse_body("function header", start);
        self.func_depth -= 1;
        self.loop_depth = saved_loops;

        let location = self.span_from(start);
        let decl = FunctionDecl { name, params, body, location };
        Ok(Stmt::new(StmtKind::Function(Arc::new(decl)), location))
    }

    fn parse_class(&mut self) -> PResult<Stmt> {
        let start = self.advance().location();
        let name = self.consume_identifier("Expected class name after CLASS")?;
        let superclass = if self.match_keyword(Keyword::Extends) {
            let sup_loc = self.peek().location();
            let sup = self.consume_identifier("Expected superclass name after EXTENDS")?;
            self.warnings.push(Diagnostic::warning(
                ErrorKind::Syntax,
                format!("Superclass '{}' is recorded but not resolved; inherited members are unavailable", sup),
                sup_loc,
            ));
            Some(sup)
        } else {
            None
        };
        let body = self.parse_body("class header", start);
        for stmt in &body.statements {
            if !matches!(stmt.kind, StmtKind::Let { .. } | StmtKind::Function(_)) {
                self.errors.push(self.err_at("Only LET and FUNC are allowed in a CLASS body", stmt.location));
            }
        }
        let location = self.span_from(start);
        let decl = ClassDecl { name, superclass, body, location };
        Ok(Stmt::new(StmtKind::Class(Arc::new(decl)), location))
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        let start = self.advance().location();
        self.parse_if_tail(start)
    }

    /// Everything after `IF`/`ELIF`/`ELSE IF`; consumes the shared END.
    fn parse_if_tail(&mut self, start: Location) -> PResult<Stmt> {
        let condition = self.header_expression();
        let inline = self.parse_opener("IF condition");

        if inline {
            let then_stmt = self.parse_statement()?;
            let then_branch = single_block(then_stmt);
            let else_branch = if self.match_keyword(Keyword::Else) {
                let else_start = self.previous().location();
                if self.match_keyword(Keyword::If) {
                    Some(single_block(self.nested_statement(|p| p.parse_if_tail(else_start))?))
                } else {
                    self.match_punct(Punct::Colon);
                    Some(single_block(self.parse_statement()?))
                }
            } else {
                None
            };
            let kind = StmtKind::If { condition, then_branch, else_branch };
            return Ok(Stmt::new(kind, self.span_from(start)));
        }

        let then_start = self.peek().location();
        let stmts = self.parse_statements(&[Keyword::End, Keyword::Else, Keyword::Elif]);
        let then_branch = Block { statements: stmts, location: then_start };

        let else_branch = if self.match_keyword(Keyword::Elif) {
            let elif_start = self.previous().location();
            Some(single_block(self.nested_statement(|p| p.parse_if_tail(elif_start))?))
        } else if self.match_keyword(Keyword::Else) {
            let else_start = self.previous().location();
            if self.match_keyword(Keyword::If) {
                Some(single_block(self.nested_statement(|p| p.parse_if_tail(else_start))?))
            } else {
                let inline_else = self.match_opener() && !self.at_line_end();
                if inline_else {
                    let stmt = self.parse_statement()?;
                    self.skip_separators();
                    self.expect_end(start);
                    Some(single_block(stmt))
                } else {
                    let stmts = self.parse_statements(&[Keyword::End]);
                    self.expect_end(start);
                    Some(Block { statements: stmts, location: else_start })
                }
            }
        } else {
            self.expect_end(start);
            None
        };

        let kind = StmtKind::If { condition, then_branch, else_branch };
        Ok(Stmt::new(kind, self.span_from(start)))
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        let start = self.advance().location();
        let condition = self.header_expression();
        let body = self.parse_loop_body("WHILE condition", start);
        Ok(Stmt::new(StmtKind::While { condition, body }, self.span_from(start)))
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        let start = self.advance().location();
        let var = self.consume_identifier("Expected loop variable name after FOR")?;
        self.consume_operator(Operator::Assign, "Expected '=' after FOR variable")?;
        let from = self.parse_expression()?;
        self.consume_keyword(Keyword::To, "Expected TO in FOR range")?;
        let to = self.parse_expression()?;
        let step = if self.match_keyword(Keyword::Step) { Some(self.parse_expression()?) } else { None };
        let body = self.parse_loop_body("FOR range", start);
        Ok(Stmt::new(StmtKind::ForRange { var, from, to, step, body }, self.span_from(start)))
    }

    fn parse_loop(&mut self) -> PResult<Stmt> {
        let start = self.advance().location();
        let named = matches!(self.peek().kind, TokenKind::Identifier(_))
            && matches!(self.peek_at(1).kind, TokenKind::Operator(Operator::Assign));
        let (var, start_value) = if named {
            let name = self.consume_identifier("Expected loop variable name")?;
            self.advance(); // '='
            let init = self.parse_expression()?;
            self.consume_keyword(Keyword::For, "Expected FOR after loop variable initializer")?;
            (Some(name), Some(init))
        } else {
            (None, None)
        };
        let count = self.parse_expression()?;
        self.consume_keyword(Keyword::Times, "Expected TIMES after loop count")?;
        let body = self.parse_loop_body("LOOP header", start);
        let kind = StmtKind::Repeat { var, start: start_value, count, body };
        Ok(Stmt::new(kind, self.span_from(start)))
    }

    fn parse_start_block(&mut self) -> PResult<Stmt> {
        let start = self.advance().location();
        self.match_punct(Punct::Colon);
        let stmts = self.parse_statements(&[Keyword::End]);
        self.expect_end(start);
        let block = Block { statements: stmts, location: start };
        Ok(Stmt::new(StmtKind::Block(block), self.span_from(start)))
    }

    fn parse_return(&mut self) -> PResult<Stmt> {
        let start = self.advance().location();
        if self.func_depth == 0 {
            self.errors.push(self.err_at("RETURN outside of a function", start));
        }
        let value = if self.at_value_end() { None } else { Some(self.parse_expression()?) };
        Ok(Stmt::new(StmtKind::Return(value), self.span_from(start)))
    }

    fn parse_print(&mut self) -> PResult<Stmt> {
        let start = self.advance().location();
        let mut args = Vec::new();
        if !self.at_value_end() {
            loop {
                args.push(self.parse_expression()?);
                if !self.match_punct(Punct::Comma) {
                    break;
                }
            }
        }
        Ok(Stmt::new(StmtKind::Print(args), self.span_from(start)))
    }

    fn parse_loop_control(&mut self, kw: Keyword) -> PResult<Stmt> {
        let location = self.advance().location();
        if self.loop_depth == 0 {
            self.errors.push(self.err_at(&format!("{} outside of a loop", kw), location));
        }
        let kind = if kw == Keyword::Break { StmtKind::Break } else { StmtKind::Continue };
        Ok(Stmt::new(kind, location))
    }

    /* ── Bodies ───────────────────────────────────────────── */

    fn parse_loop_body(&mut self, header: &str, start: Location) -> Block {
        self.loop_depth += 1;
        let body = self.parse_body(header, start);
        self.loop_depth -= 1;
        body
    }

    /// `opener stmts END`, or a single inline statement after the opener.
    fn parse_body(&mut self, header: &str, start: Location) -> Block {
        let inline = self.parse_opener(header);
        let body_start = self.peek().location();
        if inline {
            return match self.parse_statement() {
                Ok(stmt) => single_block(stmt),
                Err(diag) => {
                    self.errors.push(diag);
                    self.synchronize();
                    Block { statements: Vec::new(), location: body_start }
                }
            };
        }
        let stmts = self.parse_statements(&[Keyword::End]);
        self.expect_end(start);
        Block { statements: stmts, location: body_start }
    }

    /// Consumes `:`/THEN/DO. Returns true when a statement follows on the
    /// same line (inline body). A missing opener is reported and the rest
    /// of the header line skipped.
    fn parse_opener(&mut self, header: &str) -> bool {
        if self.match_opener() {
            return !self.at_line_end();
        }
        if self.at_line_end() {
            return false;
        }
        let tok = self.peek().clone();
        self.errors.push(self.err_at(&format!("Expected ':' after {}, found {}", header, tok.kind), tok.location()));
        while !self.at_line_end() {
            self.advance();
        }
        false
    }

    fn match_opener(&mut self) -> bool {
        self.match_punct(Punct::Colon) || self.match_keyword(Keyword::Then) || self.match_keyword(Keyword::Do)
    }

    fn expect_end(&mut self, opened_at: Location) {
        if !self.match_keyword(Keyword::End) {
            self.errors.push(self.err_at("Expected END to close block", opened_at));
        }
    }

    /// Header expression with local recovery: on error the diagnostic is
    /// recorded, the header is skipped up to its opener and a null
    /// placeholder stands in, so the body and its END still parse.
    fn header_expression(&mut self) -> Expr {
        let at = self.peek().location();
        match self.parse_expression() {
            Ok(expr) => expr,
            Err(diag) => {
                self.errors.push(diag);
                while !self.at_line_end()
                    && !self.check_punct(Punct::Colon)
                    && !self.check_keyword(Keyword::Then)
                    && !self.check_keyword(Keyword::Do)
                {
                    self.advance();
                }
                Expr::new(ExprKind::Null, at)
            }
        }
    }

    /* ── Precedence ───────────────────────────────────────── */
    pub fn parse_expression(&mut self) -> PResult<Expr> {
        self.nested_expression(|p| p.parse_assignment())
    }

    fn nested_expression(&mut self, f: impl FnOnce(&mut Self) -> PResult<Expr>) -> PResult<Expr> {
        if self.expr_depth >= MAX_NESTING {
            return Err(self.err_at("Expression nested too deeply", self.peek().location()));
        }
        self.expr_depth += 1;
        let expr = ensure_sufficient_stack(|| f(self));
        self.expr_depth -= 1;
        expr
    }

    // assignment: Identifier '=' assignment | or
    fn parse_assignment(&mut self) -> PResult<Expr> {
        let expr = self.parse_or()?;
        if self.check_operator(Operator::Assign) {
            let eq = self.advance().location();
            let value = self.parse_assignment()?;
            return match expr.kind {
                ExprKind::Identifier(name) => {
                    let location = expr.location.to(value.location);
                    Ok(Expr::new(ExprKind::Assign { name, value: Box::new(value) }, location))
                }
                _ => Err(self.err_at("Invalid assignment target", eq)),
            };
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_and()?;
        while self.match_keyword(Keyword::Or) || self.match_operator(Operator::OrOr) {
            let right = self.parse_and()?;
            expr = Expr::logical(LogicalOp::Or, expr, right);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_equality()?;
        while self.match_keyword(Keyword::And) || self.match_operator(Operator::AndAnd) {
            let right = self.parse_equality()?;
            expr = Expr::logical(LogicalOp::And, expr, right);
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_comparison()?;
        loop {
            let op = if self.match_operator(Operator::EqualEqual) {
                BinaryOp::Eq
            } else if self.match_operator(Operator::NotEqual) {
                BinaryOp::Ne
            } else {
                break;
            };
            let right = self.parse_comparison()?;
            expr = Expr::binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Operator(Operator::Less) => BinaryOp::Lt,
                TokenKind::Operator(Operator::LessEqual) => BinaryOp::Le,
                TokenKind::Operator(Operator::Greater) => BinaryOp::Gt,
                TokenKind::Operator(Operator::GreaterEqual) => BinaryOp::Ge,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            expr = Expr::binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_factor()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Operator(Operator::Plus) => BinaryOp::Add,
                TokenKind::Operator(Operator::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            expr = Expr::binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_factor(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Operator(Operator::Star) => BinaryOp::Mul,
                TokenKind::Operator(Operator::Slash) => BinaryOp::Div,
                TokenKind::Operator(Operator::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            expr = Expr::binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let op = match self.peek().kind {
            TokenKind::Operator(Operator::Minus) => Some(UnaryOp::Neg),
            TokenKind::Operator(Operator::Bang) | TokenKind::Keyword(Keyword::Not) => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            let start = self.advance().location();
            let operand = self.nested_expression(|p| p.parse_unary())?;
            let location = start.to(operand.location);
            return Ok(Expr::new(ExprKind::Unary { op, operand: Box::new(operand) }, location));
        }
        self.parse_call()
    }

    // primary ( '(' args? ')' | '[' expr ']' | '.' name )*
    fn parse_call(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.match_punct(Punct::OpenParen) {
                let mut args = Vec::new();
                if !self.check_punct(Punct::CloseParen) {
                    loop {
                        args.push(self.parse_expression()?);
                        if !self.match_punct(Punct::Comma) {
                            break;
                        }
                    }
                }
                let close = self.consume_punct(Punct::CloseParen, "Expected ')' after arguments")?.location();
                let location = expr.location.to(close);
                expr = Expr::new(ExprKind::Call { callee: Box::new(expr), args }, location);
            } else if self.match_punct(Punct::OpenBracket) {
                let index = self.parse_expression()?;
                let close = self.consume_punct(Punct::CloseBracket, "Expected ']' after index")?.location();
                let location = expr.location.to(close);
                expr = Expr::new(ExprKind::Index { target: Box::new(expr), index: Box::new(index) }, location);
            } else if self.match_punct(Punct::Dot) {
                let name_loc = self.peek().location();
                let name = self.consume_identifier("Expected member name after '.'")?;
                let location = expr.location.to(name_loc);
                expr = Expr::new(ExprKind::Member { target: Box::new(expr), name }, location);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let tok = self.peek().clone();
        let location = tok.location();
        let kind = match tok.kind {
            TokenKind::Number(v) => ExprKind::Number(v),
            TokenKind::Str(s) => ExprKind::Str(s),
            TokenKind::Interpolated(body) => {
                self.advance();
                let parts = self.split_interpolation(&body, location)?;
                return Ok(Expr::new(ExprKind::Interpolated(parts), location));
            }
            TokenKind::Keyword(Keyword::True) => ExprKind::Bool(true),
            TokenKind::Keyword(Keyword::False) => ExprKind::Bool(false),
            TokenKind::Keyword(Keyword::Null) => ExprKind::Null,
            TokenKind::Identifier(name) => ExprKind::Identifier(name),
            // Already reported by the lexer.
            TokenKind::Invalid => ExprKind::Null,
            TokenKind::Punct(Punct::OpenParen) => {
                self.advance();
                let inner = self.parse_expression()?;
                self.consume_punct(Punct::CloseParen, "Expected ')' after expression")?;
                return Ok(inner);
            }
            TokenKind::Punct(Punct::OpenBracket) => {
                self.advance();
                let mut items = Vec::new();
                if !self.check_punct(Punct::CloseBracket) {
                    loop {
                        items.push(self.parse_expression()?);
                        if !self.match_punct(Punct::Comma) {
                            break;
                        }
                    }
                }
                let close = self.consume_punct(Punct::CloseBracket, "Expected ']' after array elements")?.location();
                return Ok(Expr::new(ExprKind::Array(items), location.to(close)));
            }
            other => {
                return Err(self.err_at(&format!("Expected expression, found {}", other), location));
            }
        };
        self.advance();
        Ok(Expr::new(kind, location))
    }

    /* ── Interpolation ────────────────────────────────────── */

    /// Splits an interpolated body into literal fragments and `{expr}`
    /// placeholders. `{{`/`}}` are literal braces.
    fn split_interpolation(&mut self, body: &str, location: Location) -> PResult<Vec<StringPart>> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = body.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut inner = String::new();
                    let mut depth = 1usize;
                    for c in chars.by_ref() {
                        match c {
                            '{' => depth += 1,
                            '}' => depth -= 1,
                            _ => {}
                        }
                        if depth == 0 {
                            break;
                        }
                        inner.push(c);
                    }
                    if depth != 0 {
                        return Err(self.err_at("Unclosed '{' in interpolated string", location));
                    }
                    if !literal.is_empty() {
                        parts.push(StringPart::Literal(std::mem::take(&mut literal)));
                    }
                    let expr = parse_embedded_expression(&inner, location).map_err(|mut diags| diags.remove(0))?;
                    parts.push(StringPart::Placeholder(expr));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            parts.push(StringPart::Literal(literal));
        }
        Ok(parts)
    }

    /* ── Recovery ─────────────────────────────────────────── */

    /// Skip to the next likely statement boundary: past a newline/`;`, or up
    /// to a statement-starting keyword.
    fn synchronize(&mut self) {
        while !self.is_at_end() {
            match &self.peek().kind {
                TokenKind::Newline | TokenKind::Punct(Punct::Semicolon) => {
                    self.advance();
                    return;
                }
                TokenKind::Keyword(kw) if kw.starts_statement() => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    /* ── Token utils ─────────────────────────────────────── */
    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.pos += 1;
        }
        self.previous()
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    fn peek(&self) -> &Token {
        // Safe: there is always an EOF at the end
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, n: usize) -> &Token {
        &self.tokens[(self.pos + n).min(self.tokens.len() - 1)]
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn at_line_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Newline | TokenKind::Eof | TokenKind::Punct(Punct::Semicolon))
    }

    /// End of an optional trailing value (RETURN, PRINT).
    fn at_value_end(&self) -> bool {
        self.at_line_end() || self.check_any_keyword(&[Keyword::End, Keyword::Else, Keyword::Elif])
    }

    fn at_statement_end(&self, terminators: &[Keyword]) -> bool {
        self.at_line_end() || self.check_any_keyword(terminators)
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek().kind, TokenKind::Newline | TokenKind::Punct(Punct::Semicolon)) {
            self.advance();
        }
    }

    fn check_keyword(&self, kw: Keyword) -> bool {
        self.peek().is_keyword(kw)
    }

    fn check_any_keyword(&self, kws: &[Keyword]) -> bool {
        kws.iter().any(|kw| self.check_keyword(*kw))
    }

    fn check_punct(&self, p: Punct) -> bool {
        self.peek().kind == TokenKind::Punct(p)
    }

    fn check_operator(&self, op: Operator) -> bool {
        self.peek().kind == TokenKind::Operator(op)
    }

    fn match_keyword(&mut self, kw: Keyword) -> bool {
        if self.check_keyword(kw) {
            self.advance();
            return true;
        }
        false
    }

    fn match_punct(&mut self, p: Punct) -> bool {
        if self.check_punct(p) {
            self.advance();
            return true;
        }
        false
    }

    fn match_operator(&mut self, op: Operator) -> bool {
        if self.check_operator(op) {
            self.advance();
            return true;
        }
        false
    }

    fn consume_keyword(&mut self, kw: Keyword, msg: &str) -> PResult<&Token> {
        if self.check_keyword(kw) {
            Ok(self.advance())
        } else {
            Err(self.err_here(msg))
        }
    }

    fn consume_punct(&mut self, p: Punct, msg: &str) -> PResult<&Token> {
        if self.check_punct(p) {
            Ok(self.advance())
        } else {
            Err(self.err_here(msg))
        }
    }

    fn consume_operator(&mut self, op: Operator, msg: &str) -> PResult<&Token> {
        if self.check_operator(op) {
            Ok(self.advance())
        } else {
            Err(self.err_here(msg))
        }
    }

    fn consume_identifier(&mut self, msg: &str) -> PResult<String> {
        if let TokenKind::Identifier(name) = self.peek().kind.clone() {
            self.advance();
            Ok(name)
        } else {
            Err(self.err_here(msg))
        }
    }

    fn span_from(&self, start: Location) -> Location {
        start.to(self.previous().location())
    }

    fn err_here(&self, msg: &str) -> Diagnostic {
        let tok = self.peek();
        self.err_at(&format!("{}, found {}", msg, tok.kind), tok.location())
    }

    fn err_at(&self, msg: &str, location: Location) -> Diagnostic {
        Diagnostic::error(ErrorKind::Syntax, msg, location)
    }
}

fn single_block(stmt: Stmt) -> Block {
    let location = stmt.location;
    Block { statements: vec![stmt], location }
}

fn is_diverging(kind: &StmtKind) -> bool {
    matches!(kind, StmtKind::Return(_) | StmtKind::Break | StmtKind::Continue)
}

/// Parse tokens into a program plus diagnostics.
pub fn parse(tokens: Vec<Token>) -> ParseOutput {
    Parser::new(tokens).parse()
}

/// Parse a standalone expression (breakpoint conditions, watches, console
/// input). Every diagnostic is returned on failure.
pub fn parse_expression_source(source: &str) -> Result<Expr, Vec<Diagnostic>> {
    let mut lexer = Lexer::new(source);
    let tokens = lexer.tokenize();
    let lex_errors = lexer.into_diagnostics();
    if !lex_errors.is_empty() {
        return Err(lex_errors);
    }
    let mut parser = Parser::new(tokens);
    parser.skip_separators();
    let expr = parser.parse_expression().map_err(|d| vec![d])?;
    parser.skip_separators();
    if !parser.is_at_end() {
        let tok = parser.peek().clone();
        return Err(vec![parser.err_at(&format!("Unexpected {} after expression", tok.kind), tok.location())]);
    }
    Ok(expr)
}

/// Parse a `{expr}` template (logpoint messages) into string parts.
pub fn parse_template(source: &str) -> Result<Vec<StringPart>, Vec<Diagnostic>> {
    let mut parser = Parser::new(Vec::new());
    parser.split_interpolation(source, Location::at(1, 1)).map_err(|d| vec![d])
}

/// Placeholder expressions carry the location of the string they sit in.
fn parse_embedded_expression(text: &str, location: Location) -> Result<Expr, Vec<Diagnostic>> {
    if text.trim().is_empty() {
        return Err(vec![Diagnostic::error(
            ErrorKind::Syntax,
            "Expected expression in interpolation placeholder",
            location,
        )]);
    }
    parse_expression_source(text).map(|mut expr| {
        relocate(&mut expr, location);
        expr
    })
    .map_err(|diags| {
        diags
            .into_iter()
            .map(|mut d| {
                d.location = location;
                d
            })
            .collect()
    })
}

fn relocate(expr: &mut Expr, location: Location) {
    expr.location = location;
    match &mut expr.kind {
        ExprKind::Assign { value, .. } => relocate(value, location),
        ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
            relocate(left, location);
            relocate(right, location);
        }
        ExprKind::Unary { operand, .. } => relocate(operand, location),
        ExprKind::Call { callee, args } => {
            relocate(callee, location);
            args.iter_mut().for_each(|a| relocate(a, location));
        }
        ExprKind::Index { target, index } => {
            relocate(target, location);
            relocate(index, location);
        }
        ExprKind::Member { target, .. } => relocate(target, location),
        ExprKind::Array(items) => items.iter_mut().for_each(|a| relocate(a, location)),
        ExprKind::Interpolated(parts) => {
            for part in parts {
                if let StringPart::Placeholder(e) = part {
                    relocate(e, location);
                }
            }
        }
        _ => {}
    }
}
