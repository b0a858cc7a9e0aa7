//! Tree-walking interpreter for the contract scripting subset
//! "execution model"). Runs one function to completion or to gas
//! exhaustion; has no access to anything outside the injected context and
//! the built-in function table.

use std::collections::{BTreeMap, HashMap};

use lakha_common::error::{NodeError, Result};

use crate::ast::{BinOp, Expr, Program, Stmt, UnaryOp};
use crate::value::Value;

/// `{msg: caller, block: header snapshot}`, injected read-only into every
/// call.
pub struct ExecutionContext {
    pub caller: String,
    pub block_index: u64,
    pub block_timestamp: f64,
}

enum Flow {
    Normal,
    Return(Value),
}

pub struct Interpreter<'a> {
    functions: HashMap<String, (Vec<String>, Vec<Stmt>)>,
    data: &'a mut BTreeMap<String, Value>,
    events: Vec<(String, Value)>,
    context: ExecutionContext,
    gas_used: u64,
    gas_limit: u64,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        program: &Program,
        data: &'a mut BTreeMap<String, Value>,
        context: ExecutionContext,
        gas_limit: u64,
    ) -> Self {
        let mut functions = HashMap::new();
        for stmt in program {
            if let Stmt::FunctionDef(name, params, body) = stmt {
                functions.insert(name.clone(), (params.clone(), body.clone()));
            }
        }
        Self {
            functions,
            data,
            events: Vec::new(),
            context,
            gas_used: 0,
            gas_limit,
        }
    }

    pub fn take_events(self) -> Vec<(String, Value)> {
        self.events
    }

    fn bill(&mut self) -> Result<()> {
        self.gas_used += 1;
        if self.gas_used > self.gas_limit {
            return Err(NodeError::GasExhausted {
                used: self.gas_used,
                limit: self.gas_limit,
            });
        }
        Ok(())
    }

    /// Calls a contract-defined function, or one of the three always-on
    /// built-ins (`set_state`/`get_state`/`emit_event`), by name.
    pub fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Value> {
        if let Some(value) = self.call_builtin(name, &args)? {
            return Ok(value);
        }
        let (params, body) = self
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| NodeError::ContractValidationFailed(format!("function not found: {name}")))?;
        if params.len() != args.len() {
            return Err(NodeError::ContractValidationFailed(format!(
                "{name} expects {} args, got {}",
                params.len(),
                args.len()
            )));
        }
        let mut scope: HashMap<String, Value> = params.into_iter().zip(args).collect();
        match self.exec_block(&body, &mut scope)? {
            Flow::Return(v) => Ok(v),
            Flow::Normal => Ok(Value::None),
        }
    }

    fn call_builtin(&mut self, name: &str, args: &[Value]) -> Result<Option<Value>> {
        match name {
            "set_state" => {
                let (Some(key), Some(value)) = (args.first(), args.get(1)) else {
                    return Err(NodeError::ContractValidationFailed(
                        "set_state(key, value) requires 2 arguments".into(),
                    ));
                };
                self.data.insert(value_to_key(key), value.clone());
                Ok(Some(Value::Bool(true)))
            }
            "get_state" => {
                let key = args
                    .first()
                    .ok_or_else(|| NodeError::ContractValidationFailed("get_state(key) requires 1 argument".into()))?;
                Ok(Some(
                    self.data.get(&value_to_key(key)).cloned().unwrap_or(Value::None),
                ))
            }
            "emit_event" => {
                let (Some(event_name), payload) = (args.first(), args.get(1).cloned().unwrap_or(Value::None)) else {
                    return Err(NodeError::ContractValidationFailed(
                        "emit_event(name, payload) requires at least 1 argument".into(),
                    ));
                };
                self.events.push((value_to_key(event_name), payload));
                Ok(Some(Value::Bool(true)))
            }
            "len" => Ok(Some(Value::Int(match args.first() {
                Some(Value::Str(s)) => s.chars().count() as i64,
                Some(Value::List(l)) => l.len() as i64,
                Some(Value::Dict(d)) => d.len() as i64,
                _ => 0,
            }))),
            "abs" => Ok(Some(match args.first() {
                Some(Value::Int(i)) => Value::Int(i.abs()),
                Some(other) => Value::Float(other.as_f64().unwrap_or(0.0).abs()),
                None => Value::None,
            })),
            "min" | "max" => {
                let mut best = args.first().cloned().unwrap_or(Value::None);
                for v in args.iter().skip(1) {
                    let take = if name == "min" {
                        v.as_f64() < best.as_f64()
                    } else {
                        v.as_f64() > best.as_f64()
                    };
                    if take {
                        best = v.clone();
                    }
                }
                Ok(Some(best))
            }
            "sum" => {
                if let Some(Value::List(items)) = args.first() {
                    let total: f64 = items.iter().filter_map(Value::as_f64).sum();
                    Ok(Some(Value::Float(total)))
                } else {
                    Ok(Some(Value::Float(0.0)))
                }
            }
            "str" => Ok(Some(Value::Str(match args.first() {
                Some(Value::Str(s)) => s.clone(),
                Some(v) => v.to_json().to_string(),
                None => String::new(),
            }))),
            "int" => Ok(Some(Value::Int(
                args.first().and_then(Value::as_f64).unwrap_or(0.0) as i64,
            ))),
            "float" => Ok(Some(Value::Float(
                args.first().and_then(Value::as_f64).unwrap_or(0.0),
            ))),
            "bool" => Ok(Some(Value::Bool(
                args.first().map(Value::truthy).unwrap_or(false),
            ))),
            "range" => {
                let (start, end) = match args {
                    [a] => (0i64, a.as_f64().unwrap_or(0.0) as i64),
                    [a, b] => (a.as_f64().unwrap_or(0.0) as i64, b.as_f64().unwrap_or(0.0) as i64),
                    _ => {
                        return Err(NodeError::ContractValidationFailed(
                            "range() expects 1 or 2 arguments".into(),
                        ))
                    }
                };
                Ok(Some(Value::List((start..end).map(Value::Int).collect())))
            }
            "enumerate" => {
                if let Some(Value::List(items)) = args.first() {
                    Ok(Some(Value::List(
                        items
                            .iter()
                            .enumerate()
                            .map(|(i, v)| Value::List(vec![Value::Int(i as i64), v.clone()]))
                            .collect(),
                    )))
                } else {
                    Err(NodeError::ContractValidationFailed(
                        "enumerate() expects a list".into(),
                    ))
                }
            }
            "list" => Ok(Some(match args.first() {
                Some(Value::List(l)) => Value::List(l.clone()),
                _ => Value::List(Vec::new()),
            })),
            "print" => Ok(Some(Value::None)),
            _ => Ok(None),
        }
    }

    fn exec_block(&mut self, body: &[Stmt], scope: &mut HashMap<String, Value>) -> Result<Flow> {
        for stmt in body {
            match self.exec_stmt(stmt, scope)? {
                Flow::Normal => continue,
                flow @ Flow::Return(_) => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: &mut HashMap<String, Value>) -> Result<Flow> {
        self.bill()?;
        match stmt {
            Stmt::Let(name, expr) | Stmt::Assign(name, expr) => {
                let value = self.eval(expr, scope)?;
                scope.insert(name.clone(), value);
                Ok(Flow::Normal)
            }
            Stmt::ExprStmt(expr) => {
                self.eval(expr, scope)?;
                Ok(Flow::Normal)
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(e) => self.eval(e, scope)?,
                    None => Value::None,
                };
                Ok(Flow::Return(value))
            }
            Stmt::If(cond, then_body, else_body) => {
                if self.eval(cond, scope)?.truthy() {
                    self.exec_block(then_body, scope)
                } else {
                    self.exec_block(else_body, scope)
                }
            }
            Stmt::While(cond, body) => {
                while self.eval(cond, scope)?.truthy() {
                    self.bill()?;
                    match self.exec_block(body, scope)? {
                        Flow::Normal => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For(name, iter, body) => {
                let items = match self.eval(iter, scope)? {
                    Value::List(items) => items,
                    other => {
                        return Err(NodeError::ContractValidationFailed(format!(
                            "cannot iterate over {}",
                            other.type_name()
                        )))
                    }
                };
                for item in items {
                    self.bill()?;
                    scope.insert(name.clone(), item);
                    match self.exec_block(body, scope)? {
                        Flow::Normal => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::FunctionDef(..) => Ok(Flow::Normal),
        }
    }

    fn eval(&mut self, expr: &Expr, scope: &HashMap<String, Value>) -> Result<Value> {
        self.bill()?;
        match expr {
            Expr::NoneLit => Ok(Value::None),
            Expr::BoolLit(b) => Ok(Value::Bool(*b)),
            Expr::IntLit(i) => Ok(Value::Int(*i)),
            Expr::FloatLit(f) => Ok(Value::Float(*f)),
            Expr::StrLit(s) => Ok(Value::Str(s.clone())),
            Expr::ListLit(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item, scope)?);
                }
                Ok(Value::List(out))
            }
            Expr::Name(name) => self.resolve_name(name, scope),
            Expr::Attribute(base, attr) => {
                if let Expr::Name(name) = base.as_ref() {
                    if let Some(value) = self.resolve_context_attribute(name, attr) {
                        return Ok(value);
                    }
                }
                match self.eval(base, scope)? {
                    Value::Dict(d) => Ok(d.get(attr).cloned().unwrap_or(Value::None)),
                    other => Err(NodeError::ContractValidationFailed(format!(
                        "cannot access .{attr} on {}",
                        other.type_name()
                    ))),
                }
            }
            Expr::Call(callee, args) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, scope)?);
                }
                match callee.as_ref() {
                    Expr::Name(name) => self.call(name, values),
                    _ => Err(NodeError::ContractValidationFailed(
                        "only direct function calls are supported".into(),
                    )),
                }
            }
            Expr::UnaryOp(op, inner) => {
                let value = self.eval(inner, scope)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
                    UnaryOp::Neg => match value {
                        Value::Int(i) => Ok(Value::Int(-i)),
                        other => Ok(Value::Float(-other.as_f64().unwrap_or(0.0))),
                    },
                }
            }
            Expr::BinOp(left, op, right) => self.eval_binop(left, *op, right, scope),
        }
    }

    fn eval_binop(
        &mut self,
        left: &Expr,
        op: BinOp,
        right: &Expr,
        scope: &HashMap<String, Value>,
    ) -> Result<Value> {
        if op == BinOp::And {
            let l = self.eval(left, scope)?;
            return if !l.truthy() {
                Ok(l)
            } else {
                self.eval(right, scope)
            };
        }
        if op == BinOp::Or {
            let l = self.eval(left, scope)?;
            return if l.truthy() { Ok(l) } else { self.eval(right, scope) };
        }
        let l = self.eval(left, scope)?;
        let r = self.eval(right, scope)?;
        match op {
            BinOp::Add => l.add(&r),
            BinOp::Sub => l.sub(&r),
            BinOp::Mul => l.mul(&r),
            BinOp::Div => l.div(&r),
            BinOp::Eq => Ok(Value::Bool(values_equal(&l, &r))),
            BinOp::NotEq => Ok(Value::Bool(!values_equal(&l, &r))),
            BinOp::Lt => compare(&l, &r, |a, b| a < b),
            BinOp::LtEq => compare(&l, &r, |a, b| a <= b),
            BinOp::Gt => compare(&l, &r, |a, b| a > b),
            BinOp::GtEq => compare(&l, &r, |a, b| a >= b),
            BinOp::And | BinOp::Or => unreachable!("handled above"),
        }
    }

    fn resolve_name(&self, name: &str, scope: &HashMap<String, Value>) -> Result<Value> {
        if let Some(value) = scope.get(name) {
            return Ok(value.clone());
        }
        match name {
            "msg" => {
                let mut d = BTreeMap::new();
                d.insert("sender".to_string(), Value::Str(self.context.caller.clone()));
                Ok(Value::Dict(d))
            }
            "block" => {
                let mut d = BTreeMap::new();
                d.insert("index".to_string(), Value::Int(self.context.block_index as i64));
                d.insert("timestamp".to_string(), Value::Float(self.context.block_timestamp));
                Ok(Value::Dict(d))
            }
            _ => Err(NodeError::ContractValidationFailed(format!(
                "undefined name: {name}"
            ))),
        }
    }

    fn resolve_context_attribute(&self, base: &str, attr: &str) -> Option<Value> {
        match (base, attr) {
            ("msg", "sender") => Some(Value::Str(self.context.caller.clone())),
            ("block", "index") => Some(Value::Int(self.context.block_index as i64)),
            ("block", "timestamp") => Some(Value::Float(self.context.block_timestamp)),
            _ => None,
        }
    }
}

fn value_to_key(value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        other => other.to_json().to_string(),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    a.to_json() == b.to_json()
}

fn compare(a: &Value, b: &Value, f: impl Fn(f64, f64) -> bool) -> Result<Value> {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => Ok(Value::Bool(f(x, y))),
        _ => Err(NodeError::ContractValidationFailed(format!(
            "cannot compare {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn ctx() -> ExecutionContext {
        ExecutionContext {
            caller: "lakha1caller".into(),
            block_index: 1,
            block_timestamp: 1_700_000_000.0,
        }
    }

    #[test]
    fn built_in_state_round_trip() {
        let program = crate::parser::parse(
            r#"
            fn bump() {
                let current = get_state("count");
                set_state("count", 1);
            }
            "#,
        )
        .unwrap();
        let mut data: Map<String, Value> = Map::new();
        let mut interp = Interpreter::new(&program, &mut data, ctx(), 10_000);
        interp.call("bump", vec![]).unwrap();
        assert!(matches!(data.get("count"), Some(Value::Int(1))));
    }

    #[test]
    fn emits_events() {
        let program = crate::parser::parse(
            r#"
            fn greet() {
                emit_event("Greeted", msg.sender);
            }
            "#,
        )
        .unwrap();
        let mut data: Map<String, Value> = Map::new();
        let mut interp = Interpreter::new(&program, &mut data, ctx(), 10_000);
        interp.call("greet", vec![]).unwrap();
        let events = interp.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "Greeted");
    }

    #[test]
    fn while_loop_can_exhaust_gas() {
        let program = crate::parser::parse(
            r#"
            fn spin() {
                let i = 0;
                while true {
                    i = i + 1;
                }
            }
            "#,
        )
        .unwrap();
        let mut data: Map<String, Value> = Map::new();
        let mut interp = Interpreter::new(&program, &mut data, ctx(), 50);
        let err = interp.call("spin", vec![]).unwrap_err();
        assert!(matches!(err, NodeError::GasExhausted { .. }));
    }
}
