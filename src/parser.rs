//! Recursive-descent parser with precedence climbing for binary operators.

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::ast::{Expression, Function, Prototype};
use crate::lexer::{Lexer, Token};
use crate::source::CharSource;

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum ParserError {
    #[error("unexpected {0} when expecting an expression")]
    UnexpectedToken(Token),
    #[error("expected ')'")]
    UnclosedParen,
    #[error("expected ')' or ',' in argument list")]
    MalformedArgumentList,
    #[error("expected {0} in prototype")]
    MalformedPrototype(&'static str),
}

pub type ParseResult<T> = Result<T, ParserError>;

lazy_static! {
    /// Binary operator precedences; higher binds tighter. Initialized once
    /// for the whole session and never mutated.
    static ref BIN_OP_PRECEDENCE: HashMap<char, i32> = {
        let mut table = HashMap::new();
        table.insert('<', 10);
        table.insert('+', 20);
        table.insert('-', 30);
        table.insert('*', 40);
        table
    };
}

/// Parses one top-level statement at a time from a token stream.
///
/// Holds the single lookahead token; every parse method leaves the lookahead
/// one token past what it recognized. On failure no partial AST escapes, and
/// recovery (discarding tokens) is left to the caller.
pub struct Parser<S: CharSource> {
    lexer: Lexer<S>,
    cur_tok: Token,
}

impl<S: CharSource> Parser<S> {
    /// Creates a parser over `source` and primes the lookahead.
    pub fn new(source: S) -> Parser<S> {
        let mut lexer = Lexer::new(source);
        let cur_tok = lexer.next_token();
        Parser { lexer, cur_tok }
    }

    pub fn current(&self) -> &Token {
        &self.cur_tok
    }

    /// Advances the lookahead by one token.
    pub fn next_token(&mut self) {
        self.cur_tok = self.lexer.next_token();
    }

    fn tok_precedence(&self) -> i32 {
        match self.cur_tok {
            Token::Op(op) => BIN_OP_PRECEDENCE.get(&op).copied().unwrap_or(-1),
            _ => -1,
        }
    }

    fn parse_number_expr(&mut self) -> ParseResult<Expression> {
        let value = match self.cur_tok {
            Token::Number(value) => value,
            _ => unreachable!(),
        };
        self.next_token();
        Ok(Expression::Literal(value))
    }

    fn parse_paren_expr(&mut self) -> ParseResult<Expression> {
        // eat '('
        self.next_token();
        let expr = self.parse_expression()?;
        if self.cur_tok != Token::Op(')') {
            return Err(ParserError::UnclosedParen);
        }
        // eat ')'
        self.next_token();
        Ok(expr)
    }

    /// A lone identifier is a variable reference; one followed by '(' is a
    /// call with comma-separated arguments.
    fn parse_identifier_expr(&mut self) -> ParseResult<Expression> {
        let name = match &self.cur_tok {
            Token::Ident(name) => name.clone(),
            _ => unreachable!(),
        };
        self.next_token();

        if self.cur_tok != Token::Op('(') {
            return Ok(Expression::Variable(name));
        }

        // eat '('
        self.next_token();
        let mut args = Vec::new();
        if self.cur_tok != Token::Op(')') {
            loop {
                args.push(self.parse_expression()?);
                if self.cur_tok == Token::Op(')') {
                    break;
                }
                if self.cur_tok != Token::Op(',') {
                    return Err(ParserError::MalformedArgumentList);
                }
                self.next_token();
            }
        }
        // eat ')'
        self.next_token();
        Ok(Expression::Call(name, args))
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        match &self.cur_tok {
            Token::Number(_) => self.parse_number_expr(),
            Token::Ident(_) => self.parse_identifier_expr(),
            Token::Op('(') => self.parse_paren_expr(),
            tok => Err(ParserError::UnexpectedToken(tok.clone())),
        }
    }

    pub fn parse_expression(&mut self) -> ParseResult<Expression> {
        let lhs = self.parse_primary()?;
        self.parse_bin_op_rhs(0, lhs)
    }

    /// Precedence climbing: consume `(binop primary)*` as long as the
    /// operator binds at least as tightly as `min_prec`, merging
    /// left-associatively.
    fn parse_bin_op_rhs(&mut self, min_prec: i32, mut lhs: Expression) -> ParseResult<Expression> {
        loop {
            let tok_prec = self.tok_precedence();
            if tok_prec < min_prec {
                return Ok(lhs);
            }

            let op = match self.cur_tok {
                Token::Op(op) => op,
                _ => unreachable!(),
            };
            self.next_token();

            let mut rhs = self.parse_primary()?;

            // If the operator after the right-hand side binds strictly
            // tighter, it takes the right-hand side as its left side first.
            let next_prec = self.tok_precedence();
            if tok_prec < next_prec {
                rhs = self.parse_bin_op_rhs(tok_prec + 1, rhs)?;
            }

            lhs = Expression::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_prototype(&mut self) -> ParseResult<Prototype> {
        let name = match &self.cur_tok {
            Token::Ident(name) => name.clone(),
            _ => return Err(ParserError::MalformedPrototype("function name")),
        };
        self.next_token();

        if self.cur_tok != Token::Op('(') {
            return Err(ParserError::MalformedPrototype("'('"));
        }

        let mut params = Vec::new();
        loop {
            self.next_token();
            match &self.cur_tok {
                Token::Ident(param) => params.push(param.clone()),
                _ => break,
            }
        }
        if self.cur_tok != Token::Op(')') {
            return Err(ParserError::MalformedPrototype("')'"));
        }
        // eat ')'
        self.next_token();

        Ok(Prototype { name, params })
    }

    pub fn parse_definition(&mut self) -> ParseResult<Function> {
        // eat 'def'
        self.next_token();
        let prototype = self.parse_prototype()?;
        let body = self.parse_expression()?;
        Ok(Function { prototype, body })
    }

    pub fn parse_extern(&mut self) -> ParseResult<Prototype> {
        // eat 'extern'
        self.next_token();
        self.parse_prototype()
    }

    /// Wraps a bare expression into an anonymous zero-parameter function so
    /// definitions and ad-hoc expressions share one downstream contract.
    pub fn parse_top_level_expr(&mut self) -> ParseResult<Function> {
        let body = self.parse_expression()?;
        let prototype = Prototype {
            name: String::new(),
            params: Vec::new(),
        };
        Ok(Function { prototype, body })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse_expr(input: &str) -> Expression {
        Parser::new(input.chars()).parse_expression().unwrap()
    }

    fn num(value: f64) -> Expression {
        Expression::Literal(value)
    }

    fn bin(op: char, lhs: Expression, rhs: Expression) -> Expression {
        Expression::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    #[test]
    fn tighter_operator_groups_into_right_subtree() {
        assert_eq!(
            parse_expr("1 + 2 * 3"),
            bin('+', num(1.0), bin('*', num(2.0), num(3.0)))
        );
    }

    #[test]
    fn tighter_operator_groups_into_left_subtree() {
        assert_eq!(
            parse_expr("1 * 2 + 3"),
            bin('+', bin('*', num(1.0), num(2.0)), num(3.0))
        );
    }

    #[test]
    fn equal_precedence_associates_left() {
        assert_eq!(
            parse_expr("1 - 2 - 3"),
            bin('-', bin('-', num(1.0), num(2.0)), num(3.0))
        );
    }

    #[test]
    fn minus_binds_tighter_than_plus() {
        // The default table gives '-' precedence 30 and '+' precedence 20.
        assert_eq!(
            parse_expr("1 + 2 - 3"),
            bin('+', num(1.0), bin('-', num(2.0), num(3.0)))
        );
    }

    #[test]
    fn comparison_binds_loosest() {
        assert_eq!(
            parse_expr("a < b + 1"),
            bin(
                '<',
                Expression::Variable("a".to_string()),
                bin('+', Expression::Variable("b".to_string()), num(1.0))
            )
        );
    }

    #[test]
    fn parentheses_override_precedence() {
        assert_eq!(
            parse_expr("(1 + 2) * 3"),
            bin('*', bin('+', num(1.0), num(2.0)), num(3.0))
        );
    }

    #[test]
    fn parses_calls_with_expression_arguments() {
        assert_eq!(
            parse_expr("foo(1, 2+3)"),
            Expression::Call(
                "foo".to_string(),
                vec![num(1.0), bin('+', num(2.0), num(3.0))]
            )
        );
        assert_eq!(
            parse_expr("foo()"),
            Expression::Call("foo".to_string(), vec![])
        );
    }

    #[test]
    fn parses_definition() {
        let mut parser = Parser::new("def add(a b) a + b".chars());
        assert_eq!(parser.current(), &Token::Def);
        let function = parser.parse_definition().unwrap();
        assert_eq!(
            function,
            Function {
                prototype: Prototype {
                    name: "add".to_string(),
                    params: vec!["a".to_string(), "b".to_string()],
                },
                body: bin(
                    '+',
                    Expression::Variable("a".to_string()),
                    Expression::Variable("b".to_string())
                ),
            }
        );
        assert_eq!(parser.current(), &Token::Eof);
    }

    #[test]
    fn parses_extern_declaration() {
        let mut parser = Parser::new("extern sin(x)".chars());
        let prototype = parser.parse_extern().unwrap();
        assert_eq!(
            prototype,
            Prototype {
                name: "sin".to_string(),
                params: vec!["x".to_string()],
            }
        );
    }

    #[test]
    fn wraps_bare_expression_in_anonymous_function() {
        let mut parser = Parser::new("1 + 2".chars());
        let function = parser.parse_top_level_expr().unwrap();
        assert!(function.prototype.is_anonymous());
        assert!(function.prototype.params.is_empty());
        assert_eq!(function.body, bin('+', num(1.0), num(2.0)));
    }

    #[test]
    fn leaves_lookahead_one_past_the_expression() {
        let mut parser = Parser::new("1 + 2 extern".chars());
        parser.parse_expression().unwrap();
        assert_eq!(parser.current(), &Token::Extern);
    }

    #[test]
    fn rejects_token_that_cannot_start_an_expression() {
        let err = Parser::new("+ 1".chars()).parse_expression().unwrap_err();
        assert_eq!(err, ParserError::UnexpectedToken(Token::Op('+')));
    }

    #[test]
    fn rejects_unclosed_parenthesis() {
        let err = Parser::new("(1 2".chars()).parse_expression().unwrap_err();
        assert_eq!(err, ParserError::UnclosedParen);
    }

    #[test]
    fn rejects_malformed_argument_list() {
        let err = Parser::new("foo(1 2)".chars())
            .parse_expression()
            .unwrap_err();
        assert_eq!(err, ParserError::MalformedArgumentList);
    }

    #[test]
    fn rejects_malformed_prototypes() {
        let err = Parser::new("def 1(x) x".chars())
            .parse_definition()
            .unwrap_err();
        assert_eq!(err, ParserError::MalformedPrototype("function name"));

        let err = Parser::new("def f x".chars())
            .parse_definition()
            .unwrap_err();
        assert_eq!(err, ParserError::MalformedPrototype("'('"));

        let err = Parser::new("def f( 1".chars())
            .parse_definition()
            .unwrap_err();
        assert_eq!(err, ParserError::MalformedPrototype("')'"));
    }

    #[test]
    fn rhs_failure_propagates() {
        let err = Parser::new("1 + ".chars()).parse_expression().unwrap_err();
        assert_eq!(err, ParserError::UnexpectedToken(Token::Eof));
    }
}
