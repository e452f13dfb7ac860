//! Top-level statement dispatch: classifies each statement, hands completed
//! units to the backend, and recovers from failed parses.

use std::io::{self, Write};

use crate::ast::ASTNode;
use crate::codegen::Backend;
use crate::lexer::Token;
use crate::parser::{Parser, ParserError};
use crate::source::CharSource;

pub struct Driver<'a, S: CharSource, B: Backend, W: Write> {
    parser: Parser<S>,
    backend: &'a mut B,
    diag: &'a mut W,
    prompt: bool,
}

impl<'a, S: CharSource, B: Backend, W: Write> Driver<'a, S, B, W> {
    pub fn new(parser: Parser<S>, backend: &'a mut B, diag: &'a mut W) -> Driver<'a, S, B, W> {
        Driver {
            parser,
            backend,
            diag,
            prompt: false,
        }
    }

    /// Writes a `ready> ` prompt to the sink before each statement.
    pub fn with_prompt(mut self) -> Self {
        self.prompt = true;
        self
    }

    /// Dispatches statements until end of input. Parse and codegen failures
    /// are reported to the sink and recovered from; only sink I/O can fail.
    pub fn run(&mut self) -> io::Result<()> {
        loop {
            if self.prompt {
                write!(self.diag, "ready> ")?;
                self.diag.flush()?;
            }
            match self.parser.current() {
                Token::Eof => return Ok(()),
                // ignore top-level semicolons
                Token::Op(';') => self.parser.next_token(),
                Token::Def => self.handle_definition()?,
                Token::Extern => self.handle_extern()?,
                _ => self.handle_top_level_expression()?,
            }
        }
    }

    fn handle_definition(&mut self) -> io::Result<()> {
        match self.parser.parse_definition() {
            Ok(function) => self.emit("definition", ASTNode::Function(function)),
            Err(e) => self.recover(e),
        }
    }

    fn handle_extern(&mut self) -> io::Result<()> {
        match self.parser.parse_extern() {
            Ok(prototype) => self.emit("extern", ASTNode::Extern(prototype)),
            Err(e) => self.recover(e),
        }
    }

    fn handle_top_level_expression(&mut self) -> io::Result<()> {
        match self.parser.parse_top_level_expr() {
            Ok(function) => self.emit("top-level expression", ASTNode::Function(function)),
            Err(e) => self.recover(e),
        }
    }

    fn emit(&mut self, what: &str, node: ASTNode) -> io::Result<()> {
        let result = match &node {
            ASTNode::Function(function) => self.backend.emit_function(function),
            ASTNode::Extern(prototype) => self.backend.emit_declaration(prototype),
        };
        match result {
            Ok(unit) => writeln!(self.diag, "read {}:\n{}", what, unit),
            Err(e) => writeln!(self.diag, "codegen error: {}", e),
        }
    }

    /// Reports a parse failure, then discards exactly one token so the loop
    /// always makes forward progress.
    fn recover(&mut self, error: ParserError) -> io::Result<()> {
        writeln!(self.diag, "parse error: {}", error)?;
        self.parser.next_token();
        Ok(())
    }
}
