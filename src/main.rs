use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::exit;

use colored::Colorize;
use structopt::StructOpt;

use boba::{parse, Error, Lexer, Runtime, Source, Value};

#[derive(StructOpt, Debug)]
#[structopt(name = "boba", about = "The Boba programming language")]
pub struct Boba {
    /// Script to run; omit it to get a repl.
    #[structopt(parse(from_os_str))]
    path: Option<PathBuf>,

    /// Print a bytecode listing after each evaluation.
    #[structopt(long)]
    dump: bool,
}

fn main() {
    let args = Boba::from_args();

    match args.path {
        Some(path) => run_file(&path, args.dump),
        None => repl(args.dump),
    }
}

/// Evaluates a whole file, printing the value of each
/// non-nil top-level expression. The first error is fatal.
fn run_file(path: &Path, dump: bool) {
    let source = match Source::path(path) {
        Ok(source) => source,
        Err(_) => {
            eprintln!("{} could not read '{}'", "error:".red().bold(), path.display());
            exit(1);
        }
    };

    let mut runtime = Runtime::new();
    let result = Lexer::lex(source)
        .and_then(parse)
        .map_err(Error::Syntax)
        .and_then(|root| {
            for expr in &root.children {
                match runtime.eval(expr)? {
                    Value::Nil => (),
                    value => println!("{}", value),
                }
            }
            Ok(())
        });

    if dump {
        eprint!("{}", runtime.dump());
    }

    if let Err(error) = result {
        eprintln!("{}", error);
        exit(1);
    }
}

/// Reads a line at a time and evaluates it against one
/// long-lived runtime. Errors are printed and the session
/// keeps going; a fault only aborts the expression that
/// raised it.
fn repl(dump: bool) {
    let stdin = io::stdin();
    let mut runtime = Runtime::new();

    print!("> ");
    let _ = io::stdout().flush();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };

        if !line.trim().is_empty() {
            match runtime.eval_source(&line) {
                Ok(value) => println!("{}", value),
                Err(error) => eprintln!("{}", error),
            }
            if dump {
                eprint!("{}", runtime.dump());
            }
        }

        print!("> ");
        let _ = io::stdout().flush();
    }
}
