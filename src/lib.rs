// Fable language interpreter library
//
// Fable is a small BDD-flavored scripting language: scenarios are written
// with `Scenario`, `Given`, `When`, `Then`, and `And` steps over a C-like
// expression language, with indentation-delimited blocks. The pipeline is
// lexer -> parser -> interpreter, and the parser and interpreter each run
// the same scenario state machine.

// Public modules
pub mod ast;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod runner;
pub mod state;
pub mod value;

// Re-export commonly used items
pub use ast::{Expr, Program, Stmt};
pub use error::{ErrorKind, FableError, Span};
pub use interpreter::{Environment, Interpreter};
pub use lexer::{Lexer, Literal, Token, TokenKind};
pub use parser::Parser;
pub use state::{ProgramState, State, TRANSITION_TABLE};
pub use value::{NativeFunction, Value};

// Re-export main functions
pub use repl::start as start_repl;
pub use runner::run;
