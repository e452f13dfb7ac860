mod ast;
mod codegen;
mod driver;
mod lexer;
mod parser;
mod source;

use std::fs::File;
use std::io::{self, BufReader};

use anyhow::Context;
use clap::{App, Arg};

use codegen::Codegen;
use driver::Driver;
use parser::Parser;
use source::ReaderSource;

fn main() -> anyhow::Result<()> {
    let matches = App::new("kestrel")
        .version("0.1.0")
        .about("front end and driver for the kestrel expression language")
        .arg(
            Arg::with_name("INPUT")
                .help("source file to run; reads stdin interactively when omitted")
                .index(1),
        )
        .arg(
            Arg::with_name("no-module")
                .long("no-module")
                .help("do not print the lowered module on exit"),
        )
        .get_matches();

    let mut codegen = Codegen::new("main");
    let stderr = io::stderr();

    match matches.value_of("INPUT") {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("failed to open {}", path))?;
            let source = ReaderSource::new(BufReader::new(file));
            let mut diag = stderr.lock();
            Driver::new(Parser::new(source), &mut codegen, &mut diag).run()?;
        }
        None => {
            // The parser pulls its first token before the loop writes a
            // prompt, so show one for the very first line here.
            eprint!("ready> ");
            let stdin = io::stdin();
            let source = ReaderSource::new(stdin.lock());
            let mut diag = stderr.lock();
            Driver::new(Parser::new(source), &mut codegen, &mut diag)
                .with_prompt()
                .run()?;
        }
    }

    if !matches.is_present("no-module") {
        println!("{}", codegen.module);
    }
    Ok(())
}
