//! Gas-metered source validation. Every visited AST node costs
//! one gas unit; `Name`, `Attribute`, and `Call` nodes cost one additional
//! unit on top of that, mirroring the original's `ast.NodeVisitor`-based
//! sandbox where `visit()` and the specific `visit_*` handler both bill gas.

use lakha_common::error::{NodeError, Result};

use crate::ast::{Expr, Program, Stmt};

pub const FORBIDDEN_NAMES: &[&str] = &[
    "exec", "eval", "open", "compile", "input", "globals", "locals", "os", "sys", "subprocess",
    "__import__",
];

pub const SAFE_BUILTINS: &[&str] = &[
    "abs", "min", "max", "sum", "len", "range", "enumerate", "int", "float", "str", "dict",
    "list", "set", "bool", "print", "set_state", "get_state", "emit_event",
];

pub struct Sandbox {
    gas_limit: u64,
    gas_used: u64,
}

impl Sandbox {
    pub fn new(gas_limit: u64) -> Self {
        Self {
            gas_limit,
            gas_used: 0,
        }
    }

    pub fn gas_used(&self) -> u64 {
        self.gas_used
    }

    fn bill(&mut self, units: u64) -> Result<()> {
        self.gas_used += units;
        if self.gas_used > self.gas_limit {
            return Err(NodeError::GasExhausted {
                used: self.gas_used,
                limit: self.gas_limit,
            });
        }
        Ok(())
    }

    pub fn validate(&mut self, program: &Program) -> Result<()> {
        for stmt in program {
            self.visit_stmt(stmt)?;
        }
        Ok(())
    }

    fn visit_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        self.bill(1)?;
        match stmt {
            Stmt::Let(_, expr) | Stmt::Assign(_, expr) | Stmt::ExprStmt(expr) => {
                self.visit_expr(expr)
            }
            Stmt::Return(Some(expr)) => self.visit_expr(expr),
            Stmt::Return(None) => Ok(()),
            Stmt::If(cond, then_body, else_body) => {
                self.visit_expr(cond)?;
                for s in then_body {
                    self.visit_stmt(s)?;
                }
                for s in else_body {
                    self.visit_stmt(s)?;
                }
                Ok(())
            }
            Stmt::For(_, iter, body) => {
                self.visit_expr(iter)?;
                for s in body {
                    self.visit_stmt(s)?;
                }
                Ok(())
            }
            Stmt::While(cond, body) => {
                self.visit_expr(cond)?;
                for s in body {
                    self.visit_stmt(s)?;
                }
                Ok(())
            }
            Stmt::FunctionDef(_, _, body) => {
                for s in body {
                    self.visit_stmt(s)?;
                }
                Ok(())
            }
        }
    }

    fn visit_expr(&mut self, expr: &Expr) -> Result<()> {
        self.bill(1)?;
        match expr {
            Expr::NoneLit
            | Expr::BoolLit(_)
            | Expr::IntLit(_)
            | Expr::FloatLit(_)
            | Expr::StrLit(_) => Ok(()),
            Expr::ListLit(items) => {
                for item in items {
                    self.visit_expr(item)?;
                }
                Ok(())
            }
            Expr::Name(name) => {
                if FORBIDDEN_NAMES.contains(&name.as_str()) {
                    return Err(NodeError::ForbiddenConstruct(format!(
                        "forbidden name: {name}"
                    )));
                }
                self.bill(1)
            }
            Expr::Attribute(base, attr) => {
                if let Expr::Name(name) = base.as_ref() {
                    if FORBIDDEN_NAMES.contains(&name.as_str()) {
                        return Err(NodeError::ForbiddenConstruct(format!(
                            "forbidden attribute access: {name}.{attr}"
                        )));
                    }
                }
                self.visit_expr(base)?;
                self.bill(1)
            }
            Expr::Call(callee, args) => {
                if let Expr::Name(name) = callee.as_ref() {
                    if !SAFE_BUILTINS.contains(&name.as_str()) && !is_identifier(name) {
                        return Err(NodeError::ForbiddenConstruct(format!(
                            "forbidden function call: {name}"
                        )));
                    }
                }
                self.visit_expr(callee)?;
                for arg in args {
                    self.visit_expr(arg)?;
                }
                self.bill(1)
            }
            Expr::UnaryOp(_, inner) => self.visit_expr(inner),
            Expr::BinOp(left, _, right) => {
                self.visit_expr(left)?;
                self.visit_expr(right)
            }
        }
    }
}

/// User-defined function names are always callable once they pass the
/// lexer's identifier grammar; only the literal forbidden names and
/// non-allowlisted built-ins are rejected.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

pub fn validate_contract_source(source: &str, gas_limit: u64) -> Result<u64> {
    let program = crate::parser::parse(source)?;
    let mut sandbox = Sandbox::new(gas_limit);
    sandbox.validate(&program)?;
    Ok(sandbox.gas_used())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_counter_contract() {
        let src = r#"
            fn increment() {
                let current = get_state("count");
                set_state("count", current);
            }
        "#;
        assert!(validate_contract_source(src, 10_000).is_ok());
    }

    #[test]
    fn rejects_forbidden_name() {
        let src = "let x = os;";
        let err = validate_contract_source(src, 10_000).unwrap_err();
        assert!(matches!(err, NodeError::ForbiddenConstruct(_)));
    }

    #[test]
    fn rejects_import_statement() {
        let src = "import foo;";
        let err = validate_contract_source(src, 10_000).unwrap_err();
        assert!(matches!(err, NodeError::ForbiddenConstruct(_)));
    }

    #[test]
    fn rejects_disallowed_call() {
        let src = "let x = eval(1);";
        let err = validate_contract_source(src, 10_000).unwrap_err();
        assert!(matches!(err, NodeError::ForbiddenConstruct(_)));
    }

    #[test]
    fn exhausts_gas_on_oversized_source() {
        let mut src = String::new();
        for i in 0..2000 {
            src.push_str(&format!("let x{i} = {i};\n"));
        }
        let err = validate_contract_source(&src, 100).unwrap_err();
        assert!(matches!(err, NodeError::GasExhausted { .. }));
    }
}
