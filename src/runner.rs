use crate::interpreter::Interpreter;
use crate::lexer::Lexer;
use crate::parser::Parser;

/// Runs a whole script through the pipeline, reporting every diagnostic to
/// stderr. Returns false if any stage faulted.
pub fn run(source: &str, filename: Option<&str>) -> bool {
    // Lexical analysis
    let mut lexer = Lexer::new(source.to_string());
    let tokens = match lexer.tokenize() {
        Ok(tokens) => tokens,
        Err(error) => {
            error.report(source, filename);
            return false;
        }
    };

    // Parsing. The parser recovers between declarations, so a failed parse
    // carries every error it found, not just the first.
    let mut parser = Parser::new(tokens);
    let program = match parser.parse() {
        Ok(program) => program,
        Err(errors) => {
            for error in &errors {
                error.report(source, filename);
            }
            return false;
        }
    };

    // Interpretation
    let mut interpreter = Interpreter::new();
    if let Err(error) = interpreter.interpret(&program) {
        error.report(source, filename);
        return false;
    }

    true
}
