use crate::interpreter::Interpreter;
use crate::lexer::Lexer;
use crate::parser::Parser;
use std::io::{self, Write};

/// Interactive prompt. Variables, the scenario state, and the current
/// scenario label all persist between lines, so a scenario can be walked
/// through step by step.
pub fn start() {
    println!("Fable {}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' or press Ctrl+C to quit");
    println!();

    let mut interpreter = Interpreter::new();

    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            break;
        }

        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) => {
                // EOF (Ctrl+D or piped input ended)
                println!();
                break;
            }
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "exit" || line == "quit" {
                    println!("Goodbye!");
                    break;
                }

                run_line(line, &mut interpreter);
            }
            Err(error) => {
                eprintln!("Error reading input: {}", error);
                break;
            }
        }
    }
}

fn run_line(source: &str, interpreter: &mut Interpreter) {
    let mut lexer = Lexer::new(source.to_string());
    let tokens = match lexer.tokenize() {
        Ok(tokens) => tokens,
        Err(error) => {
            error.report(source, None);
            return;
        }
    };

    // Resume the state machine where the interpreter left it, so a line
    // like `When total` is legal after an earlier `Given` line.
    let mut parser = Parser::with_state(tokens, interpreter.state());
    let program = match parser.parse() {
        Ok(program) => program,
        Err(errors) => {
            for error in &errors {
                error.report(source, None);
            }
            return;
        }
    };

    // Echo the value of a bare expression; everything else runs silently
    // apart from its own output.
    if let Err(error) = interpreter.interpret_interactive(&program) {
        error.report(source, None);
    }
}
