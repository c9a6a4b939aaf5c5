use crate::ast::{BinaryOp, Expr, LogicalOp, Program, Stmt, UnaryOp};
use crate::error::{FableError, RuntimeErrorKind};
use crate::lexer::Token;
use crate::state::{ProgramState, State};
use crate::value::{NativeFunction, Value};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Lexical scope chain. The interpreter owns the innermost environment and
/// each environment owns its enclosing one, so entering a block is a swap
/// and leaving it is a take-back.
#[derive(Debug, Default)]
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<Box<Environment>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enclosing(enclosing: Environment) -> Self {
        Self {
            values: HashMap::new(),
            enclosing: Some(Box::new(enclosing)),
        }
    }

    /// Binds in the innermost scope only; shadows any outer binding of the
    /// same name without touching it.
    pub fn define(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        match self.values.get(name) {
            Some(value) => Some(value.clone()),
            None => self.enclosing.as_ref().and_then(|e| e.get(name)),
        }
    }

    /// Rebinds the nearest existing binding. Returns false when the name is
    /// bound nowhere in the chain; assignment never creates variables.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        if let Some(slot) = self.values.get_mut(name) {
            *slot = value;
            return true;
        }
        match self.enclosing.as_mut() {
            Some(enclosing) => enclosing.assign(name, value),
            None => false,
        }
    }

    fn take_enclosing(&mut self) -> Option<Environment> {
        self.enclosing.take().map(|boxed| *boxed)
    }
}

fn clock_native(_args: &[Value]) -> Value {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    Value::Number(seconds)
}

/// Tree-walking evaluator. Re-runs the same scenario state machine the
/// parser ran, so block entry transitions that type-checked at parse time
/// stay legal at run time.
#[derive(Debug)]
pub struct Interpreter {
    environment: Environment,
    program_state: ProgramState,
    scenario_label: Option<String>,
}

impl Interpreter {
    pub fn new() -> Self {
        let mut environment = Environment::new();
        environment.define(
            "clock",
            Value::NativeFunction(NativeFunction {
                name: "clock",
                arity: 0,
                func: clock_native,
            }),
        );

        Self {
            environment,
            program_state: ProgramState::new(),
            scenario_label: None,
        }
    }

    /// Executes the program top to bottom, stopping at the first runtime
    /// fault.
    pub fn interpret(&mut self, program: &Program) -> Result<(), FableError> {
        for stmt in &program.statements {
            self.execute(stmt)?;
        }
        Ok(())
    }

    /// Like `interpret`, but echoes the value of a bare expression
    /// statement. Assignments stay silent, as do all other statement forms.
    pub fn interpret_interactive(&mut self, program: &Program) -> Result<(), FableError> {
        for stmt in &program.statements {
            match stmt {
                Stmt::Expression { expr, .. } if !matches!(expr, Expr::Assign { .. }) => {
                    let value = self.evaluate(expr)?;
                    println!("{}", value);
                }
                _ => self.execute(stmt)?,
            }
        }
        Ok(())
    }

    /// Looks a name up through the whole scope chain currently in force.
    pub fn get_variable(&self, name: &str) -> Option<Value> {
        self.environment.get(name)
    }

    pub fn scenario_label(&self) -> Option<&str> {
        self.scenario_label.as_deref()
    }

    pub fn state(&self) -> State {
        self.program_state.current()
    }

    fn execute(&mut self, stmt: &Stmt) -> Result<(), FableError> {
        match stmt {
            Stmt::Expression { expr, .. } => {
                self.evaluate(expr)?;
                Ok(())
            }
            Stmt::Print { expr, .. } => {
                let value = self.evaluate(expr)?;
                println!("{}", value);
                Ok(())
            }
            // Variable declarations only come from `Given`/`And` lines, so
            // they move the interpreter into GIVEN just as the parser did.
            Stmt::Var {
                name, initializer, ..
            } => {
                let value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                self.environment.define(&name.lexeme, value);
                self.transition(State::Given, name)
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)
                } else {
                    Ok(())
                }
            }
            Stmt::Block {
                statements,
                entry,
                keyword,
                ..
            } => {
                self.transition(*entry, keyword)?;
                self.execute_block(statements)
            }
            Stmt::Scenario { label, keyword, .. } => {
                self.transition(State::Scenario, keyword)?;
                self.scenario_label = Some(label.clone());
                Ok(())
            }
            Stmt::When { expr, keyword, .. } => {
                let value = self.evaluate(expr)?;
                println!("{}", value);
                self.transition(State::When, keyword)
            }
            Stmt::Then { expr, keyword, .. } => {
                let value = self.evaluate(expr)?;
                println!("{}", value);
                println!("{}", value.is_truthy());
                self.transition(State::Then, keyword)
            }
            Stmt::And { expr, keyword, .. } => self.execute_and(expr, keyword),
            Stmt::NoOp { .. } => Ok(()),
        }
    }

    /// `And` repeats whichever step the scenario is in. The GIVEN case is
    /// normally rewritten to a variable declaration at parse time; the arm
    /// here covers expressions fed to a live interpreter out of band.
    fn execute_and(&mut self, expr: &Expr, keyword: &Token) -> Result<(), FableError> {
        match self.program_state.current() {
            State::When => {
                let value = self.evaluate(expr)?;
                println!("{}", value);
                Ok(())
            }
            State::Then => {
                let value = self.evaluate(expr)?;
                println!("{}", value);
                println!("{}", value.is_truthy());
                Ok(())
            }
            State::Given => {
                self.evaluate(expr)?;
                Ok(())
            }
            state => {
                eprintln!(
                    "[line {}] And statement ignored in {} context",
                    keyword.line, state
                );
                Ok(())
            }
        }
    }

    fn execute_block(&mut self, statements: &[Stmt]) -> Result<(), FableError> {
        let previous = std::mem::take(&mut self.environment);
        self.environment = Environment::with_enclosing(previous);

        let result = statements.iter().try_for_each(|stmt| self.execute(stmt));

        // Restore the enclosing scope whether or not the block faulted.
        self.environment = self.environment.take_enclosing().unwrap_or_default();
        result
    }

    fn evaluate(&mut self, expr: &Expr) -> Result<Value, FableError> {
        match expr {
            Expr::Literal { value, .. } => Ok(value.clone()),
            Expr::Grouping { expr, .. } => self.evaluate(expr),
            Expr::Variable { name, .. } => self.environment.get(&name.lexeme).ok_or_else(|| {
                self.error_at(
                    name,
                    RuntimeErrorKind::UndefinedVariable,
                    format!("Undefined variable '{}'", name.lexeme),
                )
            }),
            Expr::Assign { name, value, .. } => {
                let value = self.evaluate(value)?;
                if !self.environment.assign(&name.lexeme, value.clone()) {
                    return Err(self.error_at(
                        name,
                        RuntimeErrorKind::UndefinedVariable,
                        format!("Undefined variable '{}'", name.lexeme),
                    ));
                }
                Ok(value)
            }
            Expr::Unary {
                operator,
                operator_token,
                operand,
                ..
            } => {
                let value = self.evaluate(operand)?;
                match operator {
                    UnaryOp::Negate => match value {
                        Value::Number(n) => Ok(Value::Number(-n)),
                        other => Err(self.error_at(
                            operator_token,
                            RuntimeErrorKind::TypeMismatch,
                            format!("Operand must be a number, got {}", other.type_name()),
                        )),
                    },
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                }
            }
            Expr::Logical {
                left,
                operator,
                right,
                ..
            } => {
                let left = self.evaluate(left)?;
                match operator {
                    LogicalOp::And if !left.is_truthy() => Ok(left),
                    LogicalOp::Or if left.is_truthy() => Ok(left),
                    _ => self.evaluate(right),
                }
            }
            Expr::Binary {
                left,
                operator,
                operator_token,
                right,
                ..
            } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                self.binary(left, *operator, operator_token, right)
            }
            Expr::Call {
                callee,
                paren,
                args,
                ..
            } => {
                let callee = self.evaluate(callee)?;
                let native = match callee {
                    Value::NativeFunction(native) => native,
                    other => {
                        return Err(self.error_at(
                            paren,
                            RuntimeErrorKind::TypeMismatch,
                            format!("Can only call functions, got {}", other.type_name()),
                        ));
                    }
                };
                if args.len() != native.arity {
                    return Err(self.error_at(
                        paren,
                        RuntimeErrorKind::ArityMismatch,
                        format!(
                            "Expected {} arguments but got {}",
                            native.arity,
                            args.len()
                        ),
                    ));
                }
                let mut argv = Vec::with_capacity(args.len());
                for arg in args {
                    argv.push(self.evaluate(arg)?);
                }
                Ok((native.func)(&argv))
            }
        }
    }

    fn binary(
        &self,
        left: Value,
        operator: BinaryOp,
        operator_token: &Token,
        right: Value,
    ) -> Result<Value, FableError> {
        match operator {
            BinaryOp::Add => match (left, right) {
                (Value::Number(l), Value::Number(r)) => Ok(Value::Number(l + r)),
                (Value::Str(l), Value::Str(r)) => Ok(Value::Str(l + &r)),
                (l, r) => Err(self.error_at(
                    operator_token,
                    RuntimeErrorKind::TypeMismatch,
                    format!(
                        "Operands must be two numbers or two strings, got {} and {}",
                        l.type_name(),
                        r.type_name()
                    ),
                )),
            },
            BinaryOp::Subtract => self
                .numeric_operands(left, right, operator_token)
                .map(|(l, r)| Value::Number(l - r)),
            BinaryOp::Multiply => self
                .numeric_operands(left, right, operator_token)
                .map(|(l, r)| Value::Number(l * r)),
            // Division by zero follows IEEE 754: inf, -inf, or NaN.
            BinaryOp::Divide => self
                .numeric_operands(left, right, operator_token)
                .map(|(l, r)| Value::Number(l / r)),
            BinaryOp::Greater => self
                .numeric_operands(left, right, operator_token)
                .map(|(l, r)| Value::Bool(l > r)),
            BinaryOp::GreaterEqual => self
                .numeric_operands(left, right, operator_token)
                .map(|(l, r)| Value::Bool(l >= r)),
            BinaryOp::Less => self
                .numeric_operands(left, right, operator_token)
                .map(|(l, r)| Value::Bool(l < r)),
            BinaryOp::LessEqual => self
                .numeric_operands(left, right, operator_token)
                .map(|(l, r)| Value::Bool(l <= r)),
            BinaryOp::Equal => Ok(Value::Bool(left.equals(&right))),
            BinaryOp::NotEqual => Ok(Value::Bool(!left.equals(&right))),
        }
    }

    fn numeric_operands(
        &self,
        left: Value,
        right: Value,
        operator_token: &Token,
    ) -> Result<(f64, f64), FableError> {
        match (left, right) {
            (Value::Number(l), Value::Number(r)) => Ok((l, r)),
            (l, r) => Err(self.error_at(
                operator_token,
                RuntimeErrorKind::TypeMismatch,
                format!(
                    "Operands must be numbers, got {} and {}",
                    l.type_name(),
                    r.type_name()
                ),
            )),
        }
    }

    fn transition(&mut self, to: State, keyword: &Token) -> Result<(), FableError> {
        self.program_state
            .transition(to)
            .map(|_| ())
            .map_err(|invalid| {
                self.error_at(
                    keyword,
                    RuntimeErrorKind::InvalidScenarioContext,
                    invalid.to_string(),
                )
            })
    }

    fn error_at(&self, token: &Token, kind: RuntimeErrorKind, message: String) -> FableError {
        FableError::runtime(kind, token.span.clone(), token.line, token.column, message)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_shadows_without_clobbering() {
        let mut outer = Environment::new();
        outer.define("a", Value::Number(1.0));

        let mut inner = Environment::with_enclosing(outer);
        inner.define("a", Value::Number(2.0));
        assert_eq!(inner.get("a"), Some(Value::Number(2.0)));

        let outer = inner.take_enclosing().unwrap();
        assert_eq!(outer.get("a"), Some(Value::Number(1.0)));
    }

    #[test]
    fn assign_walks_outward() {
        let mut outer = Environment::new();
        outer.define("a", Value::Number(1.0));

        let mut inner = Environment::with_enclosing(outer);
        assert!(inner.assign("a", Value::Number(5.0)));
        assert_eq!(inner.get("a"), Some(Value::Number(5.0)));
    }

    #[test]
    fn assign_never_creates() {
        let mut env = Environment::new();
        assert!(!env.assign("missing", Value::Nil));
        assert_eq!(env.get("missing"), None);
    }

    #[test]
    fn clock_is_preregistered() {
        let interpreter = Interpreter::new();
        match interpreter.get_variable("clock") {
            Some(Value::NativeFunction(native)) => {
                assert_eq!(native.name, "clock");
                assert_eq!(native.arity, 0);
            }
            other => panic!("expected native clock, got {:?}", other),
        }
    }
}
