use crate::ast::{BinaryOp, Expr, LogicalOp, Program, Stmt, UnaryOp};
use crate::error::{FableError, ParseErrorKind, Span};
use crate::lexer::{Literal, Token, TokenKind};
use crate::state::{ProgramState, State};
use crate::value::Value;

const EOF_NEWLINE_MSG: &str = "Expect NEWLINE or EOF after";
const BLOCK_START_MSG: &str = "Expect NEWLINE and indentation for";

/// Recursive-descent parser. Statement rules are gated both by lookahead
/// and by the scenario state machine, which advances here exactly as the
/// interpreter will advance its own copy later.
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    program_state: ProgramState,
    errors: Vec<FableError>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self::with_state(tokens, State::Global)
    }

    /// Parses as if the program were already in `state`; used by the REPL
    /// so a scenario can be entered one line at a time.
    pub fn with_state(tokens: Vec<Token>, state: State) -> Self {
        Self {
            tokens,
            current: 0,
            program_state: ProgramState::resume(state),
            errors: Vec::new(),
        }
    }

    /// Parses the whole token stream. A fault inside one declaration is
    /// recorded, the parser synchronizes to the next statement boundary,
    /// and parsing resumes, so a single pass can surface several
    /// independent errors.
    pub fn parse(&mut self) -> Result<Program, Vec<FableError>> {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }

        if self.errors.is_empty() {
            Ok(Program { statements })
        } else {
            Err(std::mem::take(&mut self.errors))
        }
    }

    fn declaration(&mut self) -> Option<Stmt> {
        match self.declaration_inner() {
            Ok(stmt) => Some(stmt),
            Err(error) => {
                self.errors.push(error);
                self.synchronize();
                None
            }
        }
    }

    fn declaration_inner(&mut self) -> Result<Stmt, FableError> {
        if self.match_kinds(&[TokenKind::Given]) {
            self.transition(State::Given)?;
            return self.var_declaration();
        }
        self.action_statement()
    }

    fn var_declaration(&mut self) -> Result<Stmt, FableError> {
        let start = self.previous().span.start;
        let name = self.consume(TokenKind::Identifier, "Expecting a variable name")?;

        let initializer = if self.match_kinds(&[TokenKind::Assign]) {
            Some(self.expression()?)
        } else {
            None
        };
        self.end_of_statement("variable")?;

        let end = self.previous().span.end;
        Ok(Stmt::Var {
            name,
            initializer,
            span: Span::new(start, end),
        })
    }

    fn action_statement(&mut self) -> Result<Stmt, FableError> {
        if self.match_kinds(&[TokenKind::And]) {
            return self.and_statement();
        }
        if self.match_kinds(&[TokenKind::When]) {
            return self.when_statement();
        }
        if self.match_kinds(&[TokenKind::Then]) {
            return self.then_statement();
        }
        if self.match_kinds(&[TokenKind::Scenario]) {
            return self.scenario_statement();
        }
        self.non_action_statement()
    }

    fn non_action_statement(&mut self) -> Result<Stmt, FableError> {
        if self.match_kinds(&[TokenKind::Newline]) {
            return Ok(Stmt::NoOp {
                span: self.previous().span.clone(),
            });
        }
        if self.is_at_end() {
            return Ok(Stmt::NoOp {
                span: self.peek().span.clone(),
            });
        }
        if self.match_kinds(&[TokenKind::If]) {
            return self.if_statement();
        }
        if self.match_kinds(&[TokenKind::Print]) {
            return self.print_statement();
        }
        if self.match_kinds(&[TokenKind::Indent]) {
            let keyword = self.previous().clone();
            let start = keyword.span.start;
            let entry = self.program_state.current();
            let statements = self.block()?;
            let end = self.previous().span.end;
            return Ok(Stmt::Block {
                statements,
                entry,
                keyword,
                span: Span::new(start, end),
            });
        }
        self.expression_statement()
    }

    /// Branch grammar depends on the scenario state: conditionals are
    /// meaningless before any scenario context exists, may contain further
    /// BDD steps directly under SCENARIO, and are restricted to plain
    /// statements inside a step.
    fn if_statement(&mut self) -> Result<Stmt, FableError> {
        let start = self.previous().span.start;
        let condition = self.expression()?;
        self.consume_block_start("if")?;

        if self.program_state.is(State::Global) {
            let token = self.peek().clone();
            return Err(self.error_at(
                &token,
                ParseErrorKind::UnexpectedToken,
                "conditional not expected in global context".to_string(),
            ));
        }

        let in_scenario = self.program_state.is(State::Scenario);
        let then_branch = if in_scenario {
            Box::new(self.action_statement()?)
        } else {
            Box::new(self.non_action_statement()?)
        };
        let else_branch = if self.match_kinds(&[TokenKind::Else]) {
            self.consume_block_start("else")?;
            let stmt = if in_scenario {
                self.action_statement()?
            } else {
                self.non_action_statement()?
            };
            Some(Box::new(stmt))
        } else {
            None
        };

        let end = self.previous().span.end;
        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
            span: Span::new(start, end),
        })
    }

    /// Under GIVEN, `And` continues the setup phase and must be
    /// assignment-shaped, so it parses exactly like a `Given` declaration.
    fn and_statement(&mut self) -> Result<Stmt, FableError> {
        if self.program_state.is(State::Given) {
            return self.var_declaration();
        }

        let keyword = self.previous().clone();
        let start = keyword.span.start;
        let expr = self.expression()?;
        self.end_of_statement("And")?;
        let end = self.previous().span.end;
        Ok(Stmt::And {
            expr,
            keyword,
            span: Span::new(start, end),
        })
    }

    fn when_statement(&mut self) -> Result<Stmt, FableError> {
        let keyword = self.previous().clone();
        let start = keyword.span.start;
        self.transition(State::When)?;

        if self.match_kinds(&[TokenKind::Colon]) {
            let statements = self.step_block("When")?;
            let end = self.previous().span.end;
            return Ok(Stmt::Block {
                statements,
                entry: State::When,
                keyword,
                span: Span::new(start, end),
            });
        }

        let expr = self.expression()?;
        self.end_of_statement("When")?;
        let end = self.previous().span.end;
        Ok(Stmt::When {
            expr,
            keyword,
            span: Span::new(start, end),
        })
    }

    fn then_statement(&mut self) -> Result<Stmt, FableError> {
        let keyword = self.previous().clone();
        let start = keyword.span.start;
        self.transition(State::Then)?;

        if self.match_kinds(&[TokenKind::Colon]) {
            let statements = self.step_block("Then")?;
            let end = self.previous().span.end;
            return Ok(Stmt::Block {
                statements,
                entry: State::Then,
                keyword,
                span: Span::new(start, end),
            });
        }

        let expr = self.expression()?;
        self.end_of_statement("Then")?;
        let end = self.previous().span.end;
        Ok(Stmt::Then {
            expr,
            keyword,
            span: Span::new(start, end),
        })
    }

    fn scenario_statement(&mut self) -> Result<Stmt, FableError> {
        let keyword = self.previous().clone();
        let start = keyword.span.start;
        self.transition(State::Scenario)?;

        let label = if self.match_kinds(&[TokenKind::Str]) {
            match &self.previous().literal {
                Some(Literal::Str(label)) => label.clone(),
                _ => String::new(),
            }
        } else {
            let token = self.peek().clone();
            return Err(self
                .error_at(
                    &token,
                    ParseErrorKind::UnexpectedToken,
                    "Expected string label".to_string(),
                )
                .with_help(
                    "Scenarios are introduced as: Scenario \"description\":".to_string(),
                ));
        };
        self.consume(
            TokenKind::Colon,
            "Expect COLON to indicate start of new block",
        )?;
        self.end_of_statement("Scenario")?;

        let end = self.previous().span.end;
        Ok(Stmt::Scenario {
            label,
            keyword,
            span: Span::new(start, end),
        })
    }

    fn print_statement(&mut self) -> Result<Stmt, FableError> {
        let start = self.previous().span.start;
        let expr = self.expression()?;
        self.end_of_statement("Print")?;
        let end = self.previous().span.end;
        Ok(Stmt::Print {
            expr,
            span: Span::new(start, end),
        })
    }

    fn expression_statement(&mut self) -> Result<Stmt, FableError> {
        let start = self.peek().span.start;
        let expr = self.expression()?;
        self.end_of_statement("Expression")?;
        let end = self.previous().span.end;
        Ok(Stmt::Expression {
            expr,
            span: Span::new(start, end),
        })
    }

    /// Consumes statements until the matching DEDENT (or EOF), recovering
    /// per declaration like the top-level loop.
    fn block(&mut self) -> Result<Vec<Stmt>, FableError> {
        let mut statements = Vec::new();

        while !self.check(TokenKind::Dedent) && !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }
        if self.check(TokenKind::Dedent) {
            self.advance();
        }

        self.check_block_end()?;
        Ok(statements)
    }

    /// Body of a `When:`/`Then:` step: non-action statements only.
    fn sub_block(&mut self) -> Result<Vec<Stmt>, FableError> {
        let mut statements = Vec::new();

        while !self.check(TokenKind::Dedent) && !self.is_at_end() {
            statements.push(self.non_action_statement()?);
        }
        if self.check(TokenKind::Dedent) {
            self.advance();
        }

        self.check_block_end()?;
        Ok(statements)
    }

    fn step_block(&mut self, name: &str) -> Result<Vec<Stmt>, FableError> {
        self.consume(
            TokenKind::Newline,
            &format!("{} {} block statement", BLOCK_START_MSG, name),
        )?;
        self.consume(
            TokenKind::Indent,
            &format!("{} {} block statement", BLOCK_START_MSG, name),
        )?;
        self.sub_block()
    }

    fn check_block_end(&mut self) -> Result<(), FableError> {
        if !self.is_at_end() && self.previous().kind != TokenKind::Dedent {
            let token = self.previous().clone();
            return Err(self.error_at(
                &token,
                ParseErrorKind::MissingBlockDelimiter,
                "Expects a dedentation or EOF after block".to_string(),
            ));
        }
        Ok(())
    }

    fn consume_block_start(&mut self, name: &str) -> Result<(), FableError> {
        self.consume(TokenKind::Colon, "Expect colon before start of block")?;
        self.consume(
            TokenKind::Newline,
            &format!("{} {} block statement", BLOCK_START_MSG, name),
        )?;
        Ok(())
    }

    fn end_of_statement(&mut self, name: &str) -> Result<(), FableError> {
        if self.is_at_end() {
            return Ok(());
        }
        self.consume(
            TokenKind::Newline,
            &format!("{} {} statement", EOF_NEWLINE_MSG, name),
        )?;
        Ok(())
    }

    fn transition(&mut self, to: State) -> Result<(), FableError> {
        let keyword = self.previous().clone();
        self.program_state.transition(to).map(|_| ()).map_err(|invalid| {
            self.error_at(
                &keyword,
                ParseErrorKind::InvalidStateTransition,
                invalid.to_string(),
            )
        })
    }

    // Expression grammar, lowest to highest precedence.

    fn expression(&mut self) -> Result<Expr, FableError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, FableError> {
        let expr = self.or()?;

        if self.match_kinds(&[TokenKind::Assign]) {
            let equals = self.previous().clone();
            let value = self.assignment()?;

            if let Expr::Variable { name, span } = expr {
                let span = Span::new(span.start, value.span().end);
                return Ok(Expr::Assign {
                    name,
                    value: Box::new(value),
                    span,
                });
            }

            return Err(self
                .error_at(
                    &equals,
                    ParseErrorKind::InvalidAssignmentTarget,
                    "Invalid assignment target".to_string(),
                )
                .with_help("Only a bare variable can be assigned to.".to_string()));
        }

        Ok(expr)
    }

    fn or(&mut self) -> Result<Expr, FableError> {
        let mut expr = self.and()?;

        while self.match_kinds(&[TokenKind::LogicalOr]) {
            let right = self.and()?;
            let span = Span::new(expr.span().start, right.span().end);
            expr = Expr::Logical {
                left: Box::new(expr),
                operator: LogicalOp::Or,
                right: Box::new(right),
                span,
            };
        }

        Ok(expr)
    }

    fn and(&mut self) -> Result<Expr, FableError> {
        let mut expr = self.equality()?;

        while self.match_kinds(&[TokenKind::LogicalAnd]) {
            let right = self.equality()?;
            let span = Span::new(expr.span().start, right.span().end);
            expr = Expr::Logical {
                left: Box::new(expr),
                operator: LogicalOp::And,
                right: Box::new(right),
                span,
            };
        }

        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr, FableError> {
        let mut expr = self.comparison()?;

        while self.match_kinds(&[TokenKind::BangEqual, TokenKind::Equal]) {
            let operator_token = self.previous().clone();
            let operator = match operator_token.kind {
                TokenKind::BangEqual => BinaryOp::NotEqual,
                _ => BinaryOp::Equal,
            };
            let right = self.comparison()?;
            expr = self.binary(expr, operator, operator_token, right);
        }

        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr, FableError> {
        let mut expr = self.term()?;

        while self.match_kinds(&[
            TokenKind::Greater,
            TokenKind::GreaterEqual,
            TokenKind::Less,
            TokenKind::LessEqual,
        ]) {
            let operator_token = self.previous().clone();
            let operator = match operator_token.kind {
                TokenKind::Greater => BinaryOp::Greater,
                TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
                TokenKind::Less => BinaryOp::Less,
                _ => BinaryOp::LessEqual,
            };
            let right = self.term()?;
            expr = self.binary(expr, operator, operator_token, right);
        }

        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr, FableError> {
        let mut expr = self.factor()?;

        while self.match_kinds(&[TokenKind::Minus, TokenKind::Plus]) {
            let operator_token = self.previous().clone();
            let operator = match operator_token.kind {
                TokenKind::Minus => BinaryOp::Subtract,
                _ => BinaryOp::Add,
            };
            let right = self.factor()?;
            expr = self.binary(expr, operator, operator_token, right);
        }

        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expr, FableError> {
        let mut expr = self.unary()?;

        while self.match_kinds(&[TokenKind::Slash, TokenKind::Star]) {
            let operator_token = self.previous().clone();
            let operator = match operator_token.kind {
                TokenKind::Slash => BinaryOp::Divide,
                _ => BinaryOp::Multiply,
            };
            let right = self.unary()?;
            expr = self.binary(expr, operator, operator_token, right);
        }

        Ok(expr)
    }

    fn binary(&self, left: Expr, operator: BinaryOp, operator_token: Token, right: Expr) -> Expr {
        let span = Span::new(left.span().start, right.span().end);
        Expr::Binary {
            left: Box::new(left),
            operator,
            operator_token,
            right: Box::new(right),
            span,
        }
    }

    fn unary(&mut self) -> Result<Expr, FableError> {
        if self.match_kinds(&[TokenKind::Bang, TokenKind::Minus]) {
            let operator_token = self.previous().clone();
            let operator = match operator_token.kind {
                TokenKind::Bang => UnaryOp::Not,
                _ => UnaryOp::Negate,
            };
            let operand = self.unary()?;
            let span = Span::new(operator_token.span.start, operand.span().end);
            return Ok(Expr::Unary {
                operator,
                operator_token,
                operand: Box::new(operand),
                span,
            });
        }

        self.call()
    }

    fn call(&mut self) -> Result<Expr, FableError> {
        let mut expr = self.primary()?;

        while self.match_kinds(&[TokenKind::LeftParen]) {
            expr = self.finish_call(expr)?;
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr, FableError> {
        let mut args = Vec::new();

        if !self.check(TokenKind::RightParen) {
            loop {
                args.push(self.expression()?);
                if !self.match_kinds(&[TokenKind::Comma]) {
                    break;
                }
            }
        }

        let paren = self.consume(TokenKind::RightParen, "Expect ')' after arguments")?;
        let span = Span::new(callee.span().start, paren.span.end);
        Ok(Expr::Call {
            callee: Box::new(callee),
            paren,
            args,
            span,
        })
    }

    fn primary(&mut self) -> Result<Expr, FableError> {
        if self.is_at_end() {
            let token = self.peek().clone();
            return Err(self.error_at(
                &token,
                ParseErrorKind::UnexpectedToken,
                "Expected expression".to_string(),
            ));
        }

        let token = self.advance().clone();

        match token.kind {
            TokenKind::False => Ok(Expr::Literal {
                value: Value::Bool(false),
                span: token.span,
            }),
            TokenKind::True => Ok(Expr::Literal {
                value: Value::Bool(true),
                span: token.span,
            }),
            TokenKind::Number => {
                let value = match token.literal {
                    Some(Literal::Number(n)) => Value::Number(n),
                    _ => Value::Nil,
                };
                Ok(Expr::Literal {
                    value,
                    span: token.span,
                })
            }
            TokenKind::Str => {
                let value = match token.literal {
                    Some(Literal::Str(ref s)) => Value::Str(s.clone()),
                    _ => Value::Nil,
                };
                Ok(Expr::Literal {
                    value,
                    span: token.span,
                })
            }
            TokenKind::Identifier => Ok(Expr::Variable {
                span: token.span.clone(),
                name: token,
            }),
            TokenKind::LeftParen => {
                let expr = self.expression()?;
                let end_token = self.consume(TokenKind::RightParen, "Expect ')' after expression")?;
                let span = Span::new(token.span.start, end_token.span.end);
                Ok(Expr::Grouping {
                    expr: Box::new(expr),
                    span,
                })
            }
            _ => Err(self.error_at(
                &token,
                ParseErrorKind::UnexpectedToken,
                "Expected expression".to_string(),
            )),
        }
    }

    // Cursor plumbing.

    fn match_kinds(&mut self, kinds: &[TokenKind]) -> bool {
        for kind in kinds {
            if self.check(*kind) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn check(&self, kind: TokenKind) -> bool {
        if self.is_at_end() {
            false
        } else {
            self.peek().kind == kind
        }
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<Token, FableError> {
        if self.check(kind) {
            return Ok(self.advance().clone());
        }

        let token = self.peek().clone();
        Err(self.error_at(&token, ParseErrorKind::UnexpectedToken, message.to_string()))
    }

    /// Discards tokens until the next statement boundary: just past a
    /// NEWLINE, or just before a statement-introducing keyword.
    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Newline {
                return;
            }
            match self.peek().kind {
                TokenKind::Scenario
                | TokenKind::Function
                | TokenKind::Given
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    fn error_at(&self, token: &Token, kind: ParseErrorKind, message: String) -> FableError {
        FableError::parse(kind, token.span.clone(), token.line, token.column, message)
    }
}
