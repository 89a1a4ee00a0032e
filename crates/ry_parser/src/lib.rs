use ry_syntax::{keyword, Expr, FunctionDecl, Literal, Stmt, Token, TokenKind};

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub line: i32,
    pub column: i32,
    pub message: String,
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lex error at {}:{}: {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for LexError {}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub line: i32,
    pub column: i32,
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "parse error at {}:{}: {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for ParseError {}

pub struct Lexer<'a> {
    source: &'a str,
    chars: std::str::Chars<'a>,
    current: Option<char>,
    index: usize,
    line: i32,
    column: i32,
    start: usize,
    token_line: i32,
    token_column: i32,
    tokens: Vec<Token>,
    errors: Vec<LexError>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut chars = source.chars();
        let current = chars.next();
        Self {
            source,
            chars,
            current,
            index: 0,
            line: 1,
            column: 1,
            start: 0,
            token_line: 1,
            token_column: 1,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Lexes the whole source. Errors do not stop the scan; the caller gets
    /// every token the lexer could still make sense of.
    pub fn scan_tokens(mut self) -> (Vec<Token>, Vec<LexError>) {
        while self.current.is_some() {
            self.start = self.index;
            self.token_line = self.line;
            self.token_column = self.column;
            self.scan_token();
        }
        self.tokens
            .push(Token::new(TokenKind::Eof, "", self.line, self.column));
        (self.tokens, self.errors)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.current?;
        self.index += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.current = self.chars.next();
        Some(ch)
    }

    fn peek(&self) -> Option<char> {
        self.current
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.clone().next()
    }

    fn matches(&mut self, expected: char) -> bool {
        if self.current == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn lexeme(&self) -> &'a str {
        &self.source[self.start..self.index]
    }

    fn add_token(&mut self, kind: TokenKind) {
        self.tokens.push(Token::new(
            kind,
            self.lexeme(),
            self.token_line,
            self.token_column,
        ));
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(LexError {
            line: self.line,
            column: self.column,
            message: message.into(),
        });
    }

    fn scan_token(&mut self) {
        let Some(ch) = self.bump() else { return };
        match ch {
            '#' => {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.bump();
                }
            }
            '+' => {
                if self.matches('+') {
                    self.add_token(TokenKind::PlusPlus);
                } else {
                    self.add_token(TokenKind::Plus);
                }
            }
            '-' => {
                if self.matches('>') {
                    self.add_token(TokenKind::Arrow);
                } else if self.matches('-') {
                    self.add_token(TokenKind::MinusMinus);
                } else {
                    self.add_token(TokenKind::Minus);
                }
            }
            '*' => self.add_token(TokenKind::Star),
            '/' => self.add_token(TokenKind::Slash),
            '%' => self.add_token(TokenKind::Percent),
            '=' => {
                if self.matches('=') {
                    self.add_token(TokenKind::EqualEqual);
                } else {
                    self.add_token(TokenKind::Equal);
                }
            }
            '!' => {
                if self.matches('=') {
                    self.add_token(TokenKind::BangEqual);
                } else {
                    self.add_token(TokenKind::Bang);
                }
            }
            '<' => {
                if self.matches('<') {
                    self.add_token(TokenKind::Shl);
                } else if self.matches('=') {
                    self.add_token(TokenKind::LessEqual);
                } else {
                    self.add_token(TokenKind::Less);
                }
            }
            '>' => {
                if self.matches('>') {
                    self.add_token(TokenKind::Shr);
                } else if self.matches('=') {
                    self.add_token(TokenKind::GreaterEqual);
                } else {
                    self.add_token(TokenKind::Greater);
                }
            }
            ':' => {
                if self.matches(':') {
                    self.add_token(TokenKind::ColonColon);
                } else {
                    self.add_token(TokenKind::Colon);
                }
            }
            '(' => self.add_token(TokenKind::LParen),
            ')' => self.add_token(TokenKind::RParen),
            '{' => self.add_token(TokenKind::LBrace),
            '}' => self.add_token(TokenKind::RBrace),
            '[' => self.add_token(TokenKind::LBracket),
            ']' => self.add_token(TokenKind::RBracket),
            ',' => self.add_token(TokenKind::Comma),
            '.' => self.add_token(TokenKind::Dot),
            ';' => self.add_token(TokenKind::Semicolon),
            '&' => self.add_token(TokenKind::Ampersand),
            '|' => self.add_token(TokenKind::Pipe),
            '^' => self.add_token(TokenKind::Caret),
            '~' => self.add_token(TokenKind::Tilde),
            '"' => self.string(),
            ' ' | '\t' | '\r' | '\n' => {}
            _ => {
                if ch.is_ascii_digit() {
                    self.number();
                } else if ch.is_ascii_alphabetic() || ch == '_' {
                    self.identifier();
                } else {
                    self.errors.push(LexError {
                        line: self.token_line,
                        column: self.token_column,
                        message: format!("Unexpected character: '{ch}'"),
                    });
                }
            }
        }
    }

    fn number(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        let text = self.lexeme().to_string();
        let value = text.parse::<f64>().unwrap_or(0.0);
        self.tokens.push(Token::with_literal(
            TokenKind::Number,
            text,
            Literal::Number(value),
            self.token_line,
            self.token_column,
        ));
    }

    fn identifier(&mut self) {
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.bump();
        }
        let text = self.lexeme();
        match keyword(text) {
            Some(kind) => self.add_token(kind),
            None => self.add_token(TokenKind::Identifier),
        }
    }

    fn push_string_segment(&mut self, value: &str, line: i32, column: i32) {
        self.tokens.push(Token::with_literal(
            TokenKind::Str,
            value,
            Literal::Str(value.to_string()),
            line,
            column,
        ));
    }

    /// Scans a string body, handling escapes and `${name}` interpolation.
    /// Interpolation desugars into concatenation at the token level:
    /// each `${name}` becomes `<segment> + name +` with the final segment
    /// appended after the closing quote.
    fn string(&mut self) {
        let mut value = String::new();
        let mut segment_line = self.token_line;
        let mut segment_column = self.token_column;

        while self.peek().is_some_and(|c| c != '"') {
            if self.peek() == Some('\\') {
                self.bump();
                let Some(escaped) = self.bump() else {
                    self.error("Unterminated string.");
                    return;
                };
                match escaped {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '"' => value.push('"'),
                    '\\' => value.push('\\'),
                    '$' => value.push('$'),
                    // Unknown escapes keep the character and drop the slash.
                    other => value.push(other),
                }
            } else if self.peek() == Some('$') && self.peek_next() == Some('{') {
                self.push_string_segment(&value, segment_line, segment_column);
                self.tokens
                    .push(Token::new(TokenKind::Plus, "+", self.line, self.column));

                self.bump();
                self.bump();
                let mut name = String::new();
                while self.peek().is_some_and(|c| c != '}') {
                    if let Some(c) = self.bump() {
                        name.push(c);
                    }
                }
                if self.peek().is_none() {
                    self.error("Unterminated interpolation.");
                    return;
                }
                self.tokens.push(Token::new(
                    TokenKind::Identifier,
                    name,
                    self.line,
                    self.column,
                ));
                self.bump();

                self.tokens
                    .push(Token::new(TokenKind::Plus, "+", self.line, self.column));

                value.clear();
                segment_line = self.line;
                segment_column = self.column;
            } else if let Some(c) = self.bump() {
                value.push(c);
            }
        }

        if self.peek().is_none() {
            self.error("Unterminated string.");
            return;
        }

        self.bump();
        self.push_string_segment(&value, segment_line, segment_column);
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    errors: Vec<ParseError>,
}

/// Parses a token stream into statements. All recoverable errors are
/// collected; any error means the program must not be compiled.
pub fn parse(tokens: Vec<Token>) -> Result<Vec<Stmt>, Vec<ParseError>> {
    Parser::new(tokens).parse()
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            errors: Vec::new(),
        }
    }

    pub fn parse(mut self) -> Result<Vec<Stmt>, Vec<ParseError>> {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            match self.declaration() {
                Ok(stmt) => statements.push(stmt),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize();
                }
            }
        }
        if self.errors.is_empty() {
            Ok(statements)
        } else {
            Err(self.errors)
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn peek_next_kind(&self) -> TokenKind {
        self.tokens
            .get(self.current + 1)
            .map(|token| token.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.is_at_end() {
            self.current += 1;
        }
        token
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_at_current(message))
        }
    }

    fn error_at_current(&self, message: &str) -> ParseError {
        let token = self.peek();
        ParseError {
            line: token.line,
            column: token.column,
            message: format!("{message} (found {})", token.kind),
        }
    }

    fn synchronize(&mut self) {
        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            match self.peek().kind {
                TokenKind::Data
                | TokenKind::Func
                | TokenKind::Class
                | TokenKind::If
                | TokenKind::While
                | TokenKind::For
                | TokenKind::Foreach
                | TokenKind::Return
                | TokenKind::Attempt
                | TokenKind::Panic
                | TokenKind::Stop
                | TokenKind::Skip
                | TokenKind::Import
                | TokenKind::Alias
                | TokenKind::Namespace => return,
                _ => {}
            }
            self.advance();
        }
    }

    fn declaration(&mut self) -> Result<Stmt, ParseError> {
        if self.matches(TokenKind::Data) {
            return self.var_declaration();
        }
        if self.matches(TokenKind::Func) {
            return Ok(Stmt::Function(self.function_decl("function")?));
        }
        if self.matches(TokenKind::Class) {
            return self.class_declaration();
        }
        self.statement()
    }

    fn var_declaration(&mut self) -> Result<Stmt, ParseError> {
        let name = self.expect(TokenKind::Identifier, "Expected variable name after 'data'")?;
        let initializer = if self.matches(TokenKind::Equal) {
            Some(self.expression()?)
        } else {
            None
        };
        self.matches(TokenKind::Semicolon);
        Ok(Stmt::Var { name, initializer })
    }

    fn function_decl(&mut self, what: &str) -> Result<FunctionDecl, ParseError> {
        let name = self.expect(
            TokenKind::Identifier,
            &format!("Expected {what} name"),
        )?;
        self.expect(TokenKind::LParen, &format!("Expected '(' after {what} name"))?;
        let mut parameters = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                parameters.push(self.expect(TokenKind::Identifier, "Expected parameter name")?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "Expected ')' after parameters")?;
        self.expect(TokenKind::LBrace, &format!("Expected '{{' before {what} body"))?;
        let body = self.block_statements()?;
        Ok(FunctionDecl {
            name,
            parameters,
            body,
        })
    }

    fn class_declaration(&mut self) -> Result<Stmt, ParseError> {
        let name = self.expect(TokenKind::Identifier, "Expected class name")?;
        let superclass = if self.matches(TokenKind::Childof) {
            Some(self.expression()?)
        } else {
            None
        };
        self.expect(TokenKind::LBrace, "Expected '{' before class body")?;
        let mut methods = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            self.expect(TokenKind::Fn, "Expected 'fn' before method")?;
            methods.push(self.function_decl("method")?);
        }
        self.expect(TokenKind::RBrace, "Expected '}' after class body")?;
        Ok(Stmt::Class {
            name,
            superclass,
            methods,
        })
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        if self.matches(TokenKind::If) {
            return self.if_statement();
        }
        if self.matches(TokenKind::While) {
            return self.while_statement();
        }
        if self.matches(TokenKind::For) {
            return self.for_statement();
        }
        if self.matches(TokenKind::Foreach) {
            return self.each_statement();
        }
        if self.matches(TokenKind::Return) {
            return self.return_statement();
        }
        if self.matches(TokenKind::Panic) {
            return self.panic_statement();
        }
        if self.matches(TokenKind::Attempt) {
            return self.attempt_statement();
        }
        if self.matches(TokenKind::Stop) {
            let keyword = self.previous().clone();
            self.matches(TokenKind::Semicolon);
            return Ok(Stmt::Stop { keyword });
        }
        if self.matches(TokenKind::Skip) {
            let keyword = self.previous().clone();
            self.matches(TokenKind::Semicolon);
            return Ok(Stmt::Skip { keyword });
        }
        if self.matches(TokenKind::Import) {
            let keyword = self.previous().clone();
            let module = self.expression()?;
            self.matches(TokenKind::Semicolon);
            return Ok(Stmt::Import { keyword, module });
        }
        if self.matches(TokenKind::Alias) {
            let name = self.expect(TokenKind::Identifier, "Expected alias name")?;
            self.expect(TokenKind::Equal, "Expected '=' after alias name")?;
            let value = self.expression()?;
            self.matches(TokenKind::Semicolon);
            return Ok(Stmt::Alias { name, value });
        }
        if self.matches(TokenKind::Namespace) {
            let name = self.expect(TokenKind::Identifier, "Expected namespace name")?;
            self.expect(TokenKind::LBrace, "Expected '{' after namespace name")?;
            let body = self.block_statements()?;
            return Ok(Stmt::Namespace { name, body });
        }
        if self.matches(TokenKind::LBrace) {
            let statements = self.block_statements()?;
            return Ok(Stmt::Block { statements });
        }
        self.expression_statement()
    }

    fn block_statements(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut statements = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            statements.push(self.declaration()?);
        }
        self.expect(TokenKind::RBrace, "Expected '}' after block")?;
        Ok(statements)
    }

    fn if_statement(&mut self) -> Result<Stmt, ParseError> {
        let condition = self.expression()?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.matches(TokenKind::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn while_statement(&mut self) -> Result<Stmt, ParseError> {
        let condition = self.expression()?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::While { condition, body })
    }

    fn for_statement(&mut self) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::LParen, "Expected '(' after 'for'")?;
        let init = if self.matches(TokenKind::Semicolon) {
            None
        } else if self.matches(TokenKind::Data) {
            Some(Box::new(self.var_declaration()?))
        } else {
            Some(Box::new(self.expression_statement()?))
        };
        let condition = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(TokenKind::Semicolon, "Expected ';' after loop condition")?;
        let increment = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(TokenKind::RParen, "Expected ')' after for clauses")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            init,
            condition,
            increment,
            body,
        })
    }

    fn each_statement(&mut self) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::Data, "Expected 'data' after 'foreach'")?;
        let id = self.expect(TokenKind::Identifier, "Expected loop variable name")?;
        self.expect(TokenKind::In, "Expected 'in' after loop variable")?;
        let collection = self.expression()?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::Each {
            id,
            collection,
            body,
        })
    }

    fn return_statement(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.previous().clone();
        let value = if self.check(TokenKind::Semicolon)
            || self.check(TokenKind::RBrace)
            || self.is_at_end()
        {
            None
        } else {
            Some(self.expression()?)
        };
        self.matches(TokenKind::Semicolon);
        Ok(Stmt::Return { keyword, value })
    }

    fn panic_statement(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.previous().clone();
        let message = if self.check(TokenKind::Semicolon)
            || self.check(TokenKind::RBrace)
            || self.is_at_end()
        {
            None
        } else {
            Some(self.expression()?)
        };
        self.matches(TokenKind::Semicolon);
        Ok(Stmt::Panic { keyword, message })
    }

    fn attempt_statement(&mut self) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::LBrace, "Expected '{' after 'attempt'")?;
        let attempt_body = self.block_statements()?;
        self.expect(TokenKind::Fail, "Expected 'fail' after attempt block")?;
        let error = self.expect(TokenKind::Identifier, "Expected error name after 'fail'")?;
        self.expect(TokenKind::LBrace, "Expected '{' after error name")?;
        let fail_body = self.block_statements()?;
        Ok(Stmt::Attempt {
            attempt_body,
            error,
            fail_body,
        })
    }

    fn expression_statement(&mut self) -> Result<Stmt, ParseError> {
        let expression = self.expression()?;
        self.matches(TokenKind::Semicolon);
        Ok(Stmt::Expression { expression })
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let expr = self.or_expr()?;
        if self.matches(TokenKind::Equal) {
            let equals = self.previous().clone();
            let value = Box::new(self.assignment()?);
            return match expr {
                Expr::Variable { name } => Ok(Expr::Assign { name, value }),
                Expr::Get { object, name } => Ok(Expr::Set {
                    object,
                    name,
                    value,
                }),
                Expr::Index {
                    object,
                    bracket,
                    index,
                } => Ok(Expr::IndexSet {
                    object,
                    bracket,
                    index,
                    value,
                }),
                _ => Err(ParseError {
                    line: equals.line,
                    column: equals.column,
                    message: "Invalid assignment target".to_string(),
                }),
            };
        }
        Ok(expr)
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.and_expr()?;
        while self.matches(TokenKind::Or) {
            let op = self.previous().clone();
            let right = self.and_expr()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.equality()?;
        while self.matches(TokenKind::And) {
            let op = self.previous().clone();
            let right = self.equality()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.comparison()?;
        while self.check(TokenKind::EqualEqual) || self.check(TokenKind::BangEqual) {
            let op = self.advance();
            let right = self.comparison()?;
            expr = Expr::Math {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.range()?;
        while self.check(TokenKind::Less)
            || self.check(TokenKind::LessEqual)
            || self.check(TokenKind::Greater)
            || self.check(TokenKind::GreaterEqual)
        {
            let op = self.advance();
            let right = self.range()?;
            expr = Expr::Math {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn range(&mut self) -> Result<Expr, ParseError> {
        let expr = self.bit_or()?;
        if self.matches(TokenKind::To) {
            let op = self.previous().clone();
            let right = self.bit_or()?;
            return Ok(Expr::Range {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            });
        }
        Ok(expr)
    }

    fn bit_or(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.bit_xor()?;
        while self.matches(TokenKind::Pipe) {
            let op = self.previous().clone();
            let right = self.bit_xor()?;
            expr = Expr::BitwiseOr {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn bit_xor(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.bit_and()?;
        while self.matches(TokenKind::Caret) {
            let op = self.previous().clone();
            let right = self.bit_and()?;
            expr = Expr::BitwiseXor {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn bit_and(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.shift()?;
        while self.matches(TokenKind::Ampersand) {
            let op = self.previous().clone();
            let right = self.shift()?;
            expr = Expr::BitwiseAnd {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn shift(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.term()?;
        while self.check(TokenKind::Shl) || self.check(TokenKind::Shr) {
            let op = self.advance();
            let right = self.term()?;
            expr = Expr::Shift {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.factor()?;
        while self.check(TokenKind::Plus) || self.check(TokenKind::Minus) {
            let op = self.advance();
            let right = self.factor()?;
            expr = Expr::Math {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.unary()?;
        while self.check(TokenKind::Star)
            || self.check(TokenKind::Slash)
            || self.check(TokenKind::Percent)
        {
            let op = self.advance();
            let right = self.unary()?;
            expr = Expr::Math {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.check(TokenKind::Minus) || self.check(TokenKind::Bang) {
            let op = self.advance();
            let right = self.unary()?;
            return Ok(Expr::Prefix {
                op,
                right: Box::new(right),
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let expr = self.call()?;
        if self.check(TokenKind::PlusPlus) || self.check(TokenKind::MinusMinus) {
            let op = self.advance();
            return Ok(Expr::Postfix {
                left: Box::new(expr),
                op,
            });
        }
        Ok(expr)
    }

    fn call(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            if self.matches(TokenKind::LParen) {
                let paren = self.previous().clone();
                let mut arguments = Vec::new();
                if !self.check(TokenKind::RParen) {
                    loop {
                        arguments.push(self.expression()?);
                        if !self.matches(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RParen, "Expected ')' after arguments")?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    paren,
                    arguments,
                };
            } else if self.matches(TokenKind::LBracket) {
                let bracket = self.previous().clone();
                let index = self.expression()?;
                self.expect(TokenKind::RBracket, "Expected ']' after index")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    bracket,
                    index: Box::new(index),
                };
            } else if self.matches(TokenKind::Dot) {
                let name = self.expect(TokenKind::Identifier, "Expected property name after '.'")?;
                expr = Expr::Get {
                    object: Box::new(expr),
                    name,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek().kind {
            TokenKind::Number
            | TokenKind::Str
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Null => {
                let value = self.advance();
                Ok(Expr::Value { value })
            }
            TokenKind::This => {
                let keyword = self.advance();
                Ok(Expr::This { keyword })
            }
            TokenKind::Identifier => {
                let mut name = self.advance();
                // Fold `a::b::c` into one variable token; the compiler
                // treats names containing `::` as fully qualified.
                while self.check(TokenKind::ColonColon) {
                    self.advance();
                    let part =
                        self.expect(TokenKind::Identifier, "Expected identifier after '::'")?;
                    name.lexeme = format!("{}::{}", name.lexeme, part.lexeme);
                }
                Ok(Expr::Variable { name })
            }
            TokenKind::LParen => {
                self.advance();
                let expression = self.expression()?;
                self.expect(TokenKind::RParen, "Expected ')' after expression")?;
                Ok(Expr::Group {
                    expression: Box::new(expression),
                })
            }
            TokenKind::LBracket => {
                let bracket = self.advance();
                let mut elements = Vec::new();
                if !self.check(TokenKind::RBracket) {
                    loop {
                        elements.push(self.expression()?);
                        if !self.matches(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBracket, "Expected ']' after list elements")?;
                Ok(Expr::List { bracket, elements })
            }
            TokenKind::LBrace => {
                let brace = self.advance();
                let mut items = Vec::new();
                if !self.check(TokenKind::RBrace) {
                    loop {
                        let key = self.map_key()?;
                        self.expect(TokenKind::Colon, "Expected ':' after map key")?;
                        let value = self.expression()?;
                        items.push((key, value));
                        if !self.matches(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBrace, "Expected '}' after map entries")?;
                Ok(Expr::Map { brace, items })
            }
            _ => Err(self.error_at_current("Expected expression")),
        }
    }

    /// A bare identifier key followed by `:` is sugar for a string key.
    fn map_key(&mut self) -> Result<Expr, ParseError> {
        if self.check(TokenKind::Identifier) && self.peek_next_kind() == TokenKind::Colon {
            let ident = self.advance();
            let value = Token::with_literal(
                TokenKind::Str,
                ident.lexeme.clone(),
                Literal::Str(ident.lexeme.clone()),
                ident.line,
                ident.column,
            );
            return Ok(Expr::Value { value });
        }
        self.expression()
    }
}

#[cfg(test)]
mod tests {
    use super::{parse, Lexer};
    use ry_syntax::{Expr, Literal, Stmt, TokenKind};

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, errors) = Lexer::new(source).scan_tokens();
        assert!(errors.is_empty(), "unexpected lex errors: {errors:?}");
        tokens.iter().map(|token| token.kind).collect()
    }

    #[test]
    fn lexes_operators_and_punctuation() {
        assert_eq!(
            kinds("( ) { } [ ] , . : :: ; -> ++ --"),
            vec![
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::Comma,
                TokenKind::Dot,
                TokenKind::Colon,
                TokenKind::ColonColon,
                TokenKind::Semicolon,
                TokenKind::Arrow,
                TokenKind::PlusPlus,
                TokenKind::MinusMinus,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_comparison_and_shift_operators() {
        assert_eq!(
            kinds("< <= << > >= >> = == ! != & | ^ ~"),
            vec![
                TokenKind::Less,
                TokenKind::LessEqual,
                TokenKind::Shl,
                TokenKind::Greater,
                TokenKind::GreaterEqual,
                TokenKind::Shr,
                TokenKind::Equal,
                TokenKind::EqualEqual,
                TokenKind::Bang,
                TokenKind::BangEqual,
                TokenKind::Ampersand,
                TokenKind::Pipe,
                TokenKind::Caret,
                TokenKind::Tilde,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_keywords_and_identifiers() {
        assert_eq!(
            kinds("data x func foreach in to childof"),
            vec![
                TokenKind::Data,
                TokenKind::Identifier,
                TokenKind::Func,
                TokenKind::Foreach,
                TokenKind::In,
                TokenKind::To,
                TokenKind::Childof,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_numbers_with_literals() {
        let (tokens, errors) = Lexer::new("42 3.14").scan_tokens();
        assert!(errors.is_empty());
        assert_eq!(tokens[0].literal, Some(Literal::Number(42.0)));
        assert_eq!(tokens[1].literal, Some(Literal::Number(3.14)));
    }

    #[test]
    fn skips_comments_to_end_of_line() {
        assert_eq!(
            kinds("1 # the rest is ignored ][\n2"),
            vec![TokenKind::Number, TokenKind::Number, TokenKind::Eof]
        );
    }

    #[test]
    fn tracks_line_and_column() {
        let (tokens, _) = Lexer::new("a\n  b").scan_tokens();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
    }

    #[test]
    fn decodes_string_escapes() {
        let (tokens, errors) = Lexer::new(r#""a\n\t\"\\\$q\z""#).scan_tokens();
        assert!(errors.is_empty());
        assert_eq!(tokens[0].literal, Some(Literal::Str("a\n\t\"\\$qz".to_string())));
    }

    #[test]
    fn interpolation_desugars_to_concatenation() {
        let (tokens, errors) = Lexer::new(r#""hi ${name}!""#).scan_tokens();
        assert!(errors.is_empty());
        let kinds: Vec<TokenKind> = tokens.iter().map(|token| token.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Str,
                TokenKind::Plus,
                TokenKind::Identifier,
                TokenKind::Plus,
                TokenKind::Str,
                TokenKind::Eof,
            ]
        );
        assert_eq!(tokens[0].literal, Some(Literal::Str("hi ".to_string())));
        assert_eq!(tokens[2].lexeme, "name");
        assert_eq!(tokens[4].literal, Some(Literal::Str("!".to_string())));
    }

    #[test]
    fn adjacent_interpolations_keep_empty_segments() {
        let (tokens, errors) = Lexer::new(r#""${a}${b}""#).scan_tokens();
        assert!(errors.is_empty());
        let kinds: Vec<TokenKind> = tokens.iter().map(|token| token.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Str,
                TokenKind::Plus,
                TokenKind::Identifier,
                TokenKind::Plus,
                TokenKind::Str,
                TokenKind::Plus,
                TokenKind::Identifier,
                TokenKind::Plus,
                TokenKind::Str,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn reports_unterminated_string() {
        let (_, errors) = Lexer::new("\"oops").scan_tokens();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("Unterminated string"));
    }

    #[test]
    fn reports_unterminated_interpolation() {
        let (_, errors) = Lexer::new("\"${name").scan_tokens();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("Unterminated interpolation"));
    }

    #[test]
    fn reports_unknown_character_and_continues() {
        let (tokens, errors) = Lexer::new("1 ` 2").scan_tokens();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("Unexpected character"));
        assert_eq!(tokens.len(), 3); // two numbers + EOF
    }

    fn parse_source(source: &str) -> Vec<Stmt> {
        let (tokens, errors) = Lexer::new(source).scan_tokens();
        assert!(errors.is_empty(), "unexpected lex errors: {errors:?}");
        parse(tokens).expect("parse")
    }

    #[test]
    fn parses_var_declaration() {
        let stmts = parse_source("data x = 1");
        assert!(matches!(
            &stmts[0],
            Stmt::Var {
                name,
                initializer: Some(_)
            } if name.lexeme == "x"
        ));
    }

    #[test]
    fn parses_multiplication_before_addition() {
        let stmts = parse_source("out(1 + 2 * 3)");
        let Stmt::Expression { expression } = &stmts[0] else {
            panic!("expected expression statement");
        };
        let Expr::Call { arguments, .. } = expression else {
            panic!("expected call");
        };
        let Expr::Math { op, right, .. } = &arguments[0] else {
            panic!("expected math expression");
        };
        assert_eq!(op.kind, TokenKind::Plus);
        assert!(matches!(&**right, Expr::Math { op, .. } if op.kind == TokenKind::Star));
    }

    #[test]
    fn parses_range_below_comparison() {
        let stmts = parse_source("data r = 1 to n + 1");
        let Stmt::Var {
            initializer: Some(Expr::Range { right, .. }),
            ..
        } = &stmts[0]
        else {
            panic!("expected range initializer");
        };
        assert!(matches!(&**right, Expr::Math { .. }));
    }

    #[test]
    fn parses_each_statement() {
        let stmts = parse_source("foreach data k in 1 to 4 { out(k) }");
        let Stmt::Each { id, collection, .. } = &stmts[0] else {
            panic!("expected each statement");
        };
        assert_eq!(id.lexeme, "k");
        assert!(matches!(collection, Expr::Range { .. }));
    }

    #[test]
    fn parses_class_with_methods_and_superclass() {
        let stmts = parse_source("class B childof A { fn init(n) { this.x = n } fn get() { return this.x } }");
        let Stmt::Class {
            name,
            superclass,
            methods,
        } = &stmts[0]
        else {
            panic!("expected class");
        };
        assert_eq!(name.lexeme, "B");
        assert!(superclass.is_some());
        assert_eq!(methods.len(), 2);
        assert_eq!(methods[0].name.lexeme, "init");
        assert_eq!(methods[0].parameters.len(), 1);
    }

    #[test]
    fn parses_attempt_fail() {
        let stmts = parse_source("attempt { out(1) } fail e { out(e) }");
        let Stmt::Attempt {
            attempt_body,
            error,
            fail_body,
        } = &stmts[0]
        else {
            panic!("expected attempt");
        };
        assert_eq!(attempt_body.len(), 1);
        assert_eq!(error.lexeme, "e");
        assert_eq!(fail_body.len(), 1);
    }

    #[test]
    fn rewrites_assignment_targets() {
        let stmts = parse_source("a = 1 p.x = 2 q[0] = 3");
        assert!(matches!(
            &stmts[0],
            Stmt::Expression {
                expression: Expr::Assign { .. }
            }
        ));
        assert!(matches!(
            &stmts[1],
            Stmt::Expression {
                expression: Expr::Set { .. }
            }
        ));
        assert!(matches!(
            &stmts[2],
            Stmt::Expression {
                expression: Expr::IndexSet { .. }
            }
        ));
    }

    #[test]
    fn folds_qualified_names() {
        let stmts = parse_source("out(math::pi)");
        let Stmt::Expression {
            expression: Expr::Call { arguments, .. },
        } = &stmts[0]
        else {
            panic!("expected call");
        };
        assert!(
            matches!(&arguments[0], Expr::Variable { name } if name.lexeme == "math::pi")
        );
    }

    #[test]
    fn parses_map_literal_with_identifier_keys() {
        let stmts = parse_source("data m = {name: \"ry\", 2: 3}");
        let Stmt::Var {
            initializer: Some(Expr::Map { items, .. }),
            ..
        } = &stmts[0]
        else {
            panic!("expected map initializer");
        };
        assert_eq!(items.len(), 2);
        assert!(
            matches!(&items[0].0, Expr::Value { value } if value.literal == Some(Literal::Str("name".to_string())))
        );
    }

    #[test]
    fn parses_for_statement() {
        let stmts = parse_source("for (data i = 0; i < 3; i++) { out(i) }");
        let Stmt::For {
            init,
            condition,
            increment,
            ..
        } = &stmts[0]
        else {
            panic!("expected for");
        };
        assert!(init.is_some());
        assert!(condition.is_some());
        assert!(matches!(increment, Some(Expr::Postfix { .. })));
    }

    #[test]
    fn collects_multiple_parse_errors() {
        let (tokens, _) = Lexer::new("data = 1\ndata = 2").scan_tokens();
        let errors = parse(tokens).expect_err("expected parse errors");
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn invalid_assignment_target_errors() {
        let (tokens, _) = Lexer::new("1 = 2").scan_tokens();
        let errors = parse(tokens).expect_err("expected parse errors");
        assert!(errors[0].message.contains("Invalid assignment target"));
    }
}
