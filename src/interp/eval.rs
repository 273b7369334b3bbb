use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    fmt,
    rc::Rc,
};

use super::{
    ast::{BinOp, CmpOp, CompKind, Comprehension, Expr, FStringPart, FunctionDef, Literal, Stmt, StmtKind, Target, UnaryOp},
    builtins::{call_builtin, call_math, call_method, has_method, lookup_builtin, math_attr},
    error::{type_error, value_error, ExcType, Exception, SyntaxError},
    format::{format_value, percent_format},
    io::{CollectedOutput, PrintWriter},
    num, parse,
    resource::{ResourceLimits, ResourceTracker},
    value::{normalize_index, range_contains, range_item, range_len, slice_indices, BoundMethod, Dict, Function, Scope, Value},
};

type EResult<T> = Result<T, Exception>;

/// Why a run stopped early.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    Syntax(SyntaxError),
    Exception(Exception),
}

impl Fault {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Syntax(_) => "SyntaxError",
            Self::Exception(exc) => exc.exc_type.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Syntax(err) => &err.message,
            Self::Exception(exc) => &exc.message,
        }
    }

    pub fn line(&self) -> Option<u32> {
        match self {
            Self::Syntax(err) => Some(err.line),
            Self::Exception(exc) => exc.line,
        }
    }

    /// Resource limits, as opposed to errors in the student's logic.
    pub fn is_resource_limit(&self) -> bool {
        matches!(self, Self::Exception(exc) if exc.fatal)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax(err) => write!(f, "SyntaxError: {}", err.message),
            Self::Exception(exc) => write!(f, "{exc}"),
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub fault: Option<Fault>,
}

/// A tree-walking interpreter with a persistent global namespace.
///
/// Not `Send`: values share state through `Rc`. Keep one per thread.
#[derive(Debug)]
pub struct Interpreter {
    globals: HashMap<String, Value>,
    limits: ResourceLimits,
}

impl Interpreter {
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            globals: HashMap::new(),
            limits,
        }
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Drops every global binding.
    pub fn reset(&mut self) {
        self.globals.clear();
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Runs `source`, capturing stdout and stderr in memory.
    pub fn execute(&mut self, source: &str) -> RunOutput {
        let mut out = CollectedOutput::new(self.limits.max_output_bytes);
        let fault = self.run(source, &mut out).err();
        match &fault {
            Some(Fault::Syntax(err)) => {
                out.stderr_write(&format!("  line {}\n{}\n", err.line, Fault::Syntax(err.clone())));
            }
            Some(Fault::Exception(exc)) => out.stderr_write(&exc.traceback()),
            None => {}
        }
        let (stdout, stderr) = out.into_parts();
        RunOutput { stdout, stderr, fault }
    }

    /// Runs `source` against a caller-supplied writer.
    pub fn run(&mut self, source: &str, writer: &mut dyn PrintWriter) -> Result<(), Fault> {
        let module = parse::parse(source).map_err(Fault::Syntax)?;
        let mut ctx = Ctx {
            globals: &mut self.globals,
            frames: Vec::new(),
            handling: Vec::new(),
            tracker: ResourceTracker::new(self.limits.clone()),
            out: writer,
        };
        ctx.exec_block(&module.body).map(|_| ()).map_err(Fault::Exception)
    }
}

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

struct Frame {
    locals: Scope,
    closure: Vec<Scope>,
    /// Names declared `global` in this call.
    globals: HashSet<String>,
}

enum PyIter {
    Range { next: i64, stop: i64, step: i64 },
    Items(std::vec::IntoIter<Value>),
}

impl Iterator for PyIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            Self::Range { next, stop, step } => {
                let more = if *step > 0 { *next < *stop } else { *next > *stop };
                if !more {
                    return None;
                }
                let current = *next;
                *next = next.checked_add(*step).unwrap_or(*stop);
                Some(Value::Int(current))
            }
            Self::Items(items) => items.next(),
        }
    }
}

/// Evaluation state for one run.
pub(crate) struct Ctx<'a> {
    globals: &'a mut HashMap<String, Value>,
    frames: Vec<Frame>,
    /// Exceptions currently being handled, for bare `raise`.
    handling: Vec<Exception>,
    tracker: ResourceTracker,
    out: &'a mut dyn PrintWriter,
}

impl<'a> Ctx<'a> {
    pub(crate) fn write_stdout(&mut self, text: &str) -> EResult<()> {
        self.out.stdout_write(text)
    }

    pub(crate) fn check_len(&self, len: usize) -> EResult<()> {
        self.tracker.check_len(len).map_err(Exception::from)
    }

    fn tick(&mut self) -> EResult<()> {
        self.tracker.tick().map_err(Exception::from)
    }

    fn exec_block(&mut self, body: &[Stmt]) -> EResult<Flow> {
        for stmt in body {
            let flow = self.exec_stmt(stmt).map_err(|e| e.with_line(stmt.line))?;
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> EResult<Flow> {
        self.tick()?;
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
            }
            StmtKind::AugAssign { target, op, value } => self.aug_assign(target, *op, value)?,
            StmtKind::If { test, body, orelse } => {
                let branch = if self.eval(test)?.truthy() { body } else { orelse };
                return self.exec_block(branch);
            }
            StmtKind::While { test, body, orelse } => loop {
                self.tick()?;
                if !self.eval(test)?.truthy() {
                    return self.exec_block(orelse);
                }
                match self.exec_block(body)? {
                    Flow::Break => return Ok(Flow::Normal),
                    Flow::Return(v) => return Ok(Flow::Return(v)),
                    Flow::Normal | Flow::Continue => {}
                }
            },
            StmtKind::For { target, iter, body, orelse } => {
                let iterable = self.eval(iter)?;
                for item in self.iterate(&iterable)? {
                    self.tick()?;
                    self.assign(target, item)?;
                    match self.exec_block(body)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                return self.exec_block(orelse);
            }
            StmtKind::FunctionDef(def) => {
                let func = self.make_function(def)?;
                self.store(&def.name, func);
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                let outcome = match self.exec_block(body) {
                    Ok(Flow::Normal) => self.exec_block(orelse),
                    Ok(flow) => Ok(flow),
                    Err(exc) if exc.fatal => Err(exc),
                    Err(exc) => self.handle(exc, handlers),
                };
                if finalbody.is_empty() {
                    return outcome;
                }
                return match self.exec_block(finalbody)? {
                    Flow::Normal => outcome,
                    flow => Ok(flow),
                };
            }
            StmtKind::Raise(None) => {
                return Err(self
                    .handling
                    .last()
                    .cloned()
                    .unwrap_or_else(|| Exception::new(ExcType::RuntimeError, "No active exception to reraise")));
            }
            StmtKind::Raise(Some(expr)) => {
                return Err(match self.eval(expr)? {
                    Value::Exception(exc) => Exception {
                        line: None,
                        ..(*exc).clone()
                    },
                    Value::ExcClass(exc_type) => Exception::new(exc_type, ""),
                    _ => type_error("exceptions must derive from BaseException"),
                });
            }
            StmtKind::Assert { test, msg } => {
                if !self.eval(test)?.truthy() {
                    let message = match msg {
                        Some(m) => self.eval(m)?.py_str(),
                        None => String::new(),
                    };
                    return Err(Exception::new(ExcType::AssertionError, message));
                }
            }
            StmtKind::Import(names) => {
                for (module, alias) in names {
                    let value = import_module(module)?;
                    self.store(alias.as_deref().unwrap_or(module), value);
                }
            }
            StmtKind::ImportFrom { module, names } => {
                import_module(module)?;
                for (name, alias) in names {
                    let value = math_attr(name).map_err(|_| {
                        Exception::new(
                            ExcType::ImportError,
                            format!("cannot import name '{name}' from '{module}'"),
                        )
                    })?;
                    self.store(alias.as_deref().unwrap_or(name), value);
                }
            }
            StmtKind::Global(names) => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.globals.extend(names.iter().cloned());
                }
            }
            StmtKind::Del(targets) => {
                for target in targets {
                    self.delete(target)?;
                }
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
        }
        Ok(Flow::Normal)
    }

    fn handle(&mut self, exc: Exception, handlers: &[super::ast::ExceptHandler]) -> EResult<Flow> {
        for handler in handlers {
            let caught = match &handler.class {
                None => true,
                Some(class) => {
                    let class = self.eval(class).map_err(|e| e.with_line(handler.line))?;
                    exception_matches(&exc, &class)?
                }
            };
            if !caught {
                continue;
            }
            if let Some(name) = &handler.name {
                self.store(name, Value::Exception(Rc::new(exc.clone())));
            }
            self.handling.push(exc);
            let result = self.exec_block(&handler.body);
            self.handling.pop();
            return result;
        }
        Err(exc)
    }

    fn aug_assign(&mut self, target: &Target, op: BinOp, value: &Expr) -> EResult<()> {
        match target {
            Target::Name(name) => {
                let current = self.lookup(name)?;
                let rhs = self.eval(value)?;
                let updated = self.inplace(op, current, rhs)?;
                self.store(name, updated);
                Ok(())
            }
            Target::Subscript { value: obj, index } => {
                let obj = self.eval(obj)?;
                let key = self.eval(index)?;
                let current = self.get_item(&obj, &key)?;
                let rhs = self.eval(value)?;
                let updated = self.inplace(op, current, rhs)?;
                set_item(&obj, key, updated)
            }
            Target::Attribute { value: obj, attr } => {
                let obj = self.eval(obj)?;
                Err(no_attribute(&obj, attr))
            }
            Target::Tuple(_) | Target::Starred(_) => Err(type_error("illegal expression for augmented assignment")),
        }
    }

    fn assign(&mut self, target: &Target, value: Value) -> EResult<()> {
        match target {
            Target::Name(name) => {
                self.store(name, value);
                Ok(())
            }
            Target::Tuple(targets) => {
                if !matches!(
                    value,
                    Value::List(_) | Value::Tuple(_) | Value::Str(_) | Value::Dict(_) | Value::Set(_) | Value::Range { .. }
                ) {
                    return Err(type_error(format!(
                        "cannot unpack non-iterable {} object",
                        value.type_name()
                    )));
                }
                let mut items = self.collect(&value)?;
                let Some(star) = targets.iter().position(|t| matches!(t, Target::Starred(_))) else {
                    if items.len() != targets.len() {
                        return Err(value_error(if items.len() > targets.len() {
                            format!("too many values to unpack (expected {})", targets.len())
                        } else {
                            format!(
                                "not enough values to unpack (expected {}, got {})",
                                targets.len(),
                                items.len()
                            )
                        }));
                    }
                    for (target, item) in targets.iter().zip(items) {
                        self.assign(target, item)?;
                    }
                    return Ok(());
                };
                let fixed = targets.len() - 1;
                if items.len() < fixed {
                    return Err(value_error(format!(
                        "not enough values to unpack (expected at least {fixed}, got {})",
                        items.len()
                    )));
                }
                let after = items.split_off(items.len() - (fixed - star));
                let rest = items.split_off(star);
                for (target, item) in targets[..star].iter().zip(items) {
                    self.assign(target, item)?;
                }
                self.assign(&targets[star], Value::list(rest))?;
                for (target, item) in targets[star + 1..].iter().zip(after) {
                    self.assign(target, item)?;
                }
                Ok(())
            }
            Target::Starred(name) => {
                self.store(name, value);
                Ok(())
            }
            Target::Subscript { value: obj, index } => {
                let obj = self.eval(obj)?;
                if matches!(index.as_ref(), Expr::Slice { .. }) {
                    return Err(type_error("slice assignment is not supported"));
                }
                let key = self.eval(index)?;
                set_item(&obj, key, value)
            }
            Target::Attribute { value: obj, attr } => {
                let obj = self.eval(obj)?;
                Err(no_attribute(&obj, attr))
            }
        }
    }

    fn delete(&mut self, target: &Target) -> EResult<()> {
        match target {
            Target::Name(name) => {
                let removed = match self.frames.last() {
                    Some(frame) if !frame.globals.contains(name) => frame.locals.borrow_mut().remove(name),
                    _ => self.globals.remove(name),
                };
                removed
                    .map(|_| ())
                    .ok_or_else(|| Exception::new(ExcType::NameError, format!("name '{name}' is not defined")))
            }
            Target::Subscript { value, index } => {
                let obj = self.eval(value)?;
                let key = self.eval(index)?;
                match &obj {
                    Value::List(items) => {
                        let i = seq_index(&key, "list")?;
                        let mut items = items.borrow_mut();
                        let pos = normalize_index(i, items.len()).ok_or_else(|| {
                            Exception::new(ExcType::IndexError, "list assignment index out of range")
                        })?;
                        items.remove(pos);
                        Ok(())
                    }
                    Value::Dict(d) => {
                        let removed = d.borrow_mut().remove(&key)?;
                        removed
                            .map(|_| ())
                            .ok_or_else(|| Exception::new(ExcType::KeyError, key.py_repr()))
                    }
                    other => Err(type_error(format!(
                        "'{}' object doesn't support item deletion",
                        other.type_name()
                    ))),
                }
            }
            Target::Tuple(targets) => targets.iter().try_for_each(|t| self.delete(t)),
            Target::Starred(_) => Err(type_error("cannot delete starred")),
            Target::Attribute { value, attr } => {
                let obj = self.eval(value)?;
                Err(no_attribute(&obj, attr))
            }
        }
    }

    fn store(&mut self, name: &str, value: Value) {
        match self.frames.last() {
            Some(frame) if !frame.globals.contains(name) => {
                frame.locals.borrow_mut().insert(name.to_owned(), value);
            }
            _ => {
                self.globals.insert(name.to_owned(), value);
            }
        }
    }

    fn lookup(&self, name: &str) -> EResult<Value> {
        if let Some(frame) = self.frames.last() {
            if !frame.globals.contains(name) {
                if let Some(v) = frame.locals.borrow().get(name) {
                    return Ok(v.clone());
                }
                for scope in frame.closure.iter().rev() {
                    if let Some(v) = scope.borrow().get(name) {
                        return Ok(v.clone());
                    }
                }
            }
        }
        if let Some(v) = self.globals.get(name) {
            return Ok(v.clone());
        }
        lookup_builtin(name)
            .ok_or_else(|| Exception::new(ExcType::NameError, format!("name '{name}' is not defined")))
    }

    fn make_function(&mut self, def: &Rc<FunctionDef>) -> EResult<Value> {
        let mut defaults = Vec::with_capacity(def.params.len());
        for param in &def.params {
            defaults.push(match &param.default {
                Some(expr) => Some(self.eval(expr)?),
                None => None,
            });
        }
        let closure = match self.frames.last() {
            Some(frame) => {
                let mut scopes = frame.closure.clone();
                scopes.push(Rc::clone(&frame.locals));
                scopes
            }
            None => Vec::new(),
        };
        Ok(Value::Function(Rc::new(Function {
            def: Rc::clone(def),
            defaults,
            closure,
        })))
    }

    pub(crate) fn call(&mut self, func: Value, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> EResult<Value> {
        self.tick()?;
        match func {
            Value::Function(f) => self.call_function(&f, args, kwargs),
            Value::Builtin(b) => call_builtin(self, b, args, kwargs),
            Value::MathFn(m) => {
                if !kwargs.is_empty() {
                    let name: &'static str = m.into();
                    return Err(type_error(format!("{name}() takes no keyword arguments")));
                }
                call_math(m, &args)
            }
            Value::BoundMethod(m) => call_method(self, &m.receiver, &m.name, args, kwargs),
            Value::ExcClass(exc_type) => {
                let message = match args.as_slice() {
                    [] => String::new(),
                    [one] => one.py_str(),
                    many => Value::tuple(many.to_vec()).py_repr(),
                };
                Ok(Value::Exception(Rc::new(Exception::new(exc_type, message))))
            }
            Value::Type(name) => Err(type_error(format!("cannot create '{name}' instances"))),
            other => Err(type_error(format!("'{}' object is not callable", other.type_name()))),
        }
    }

    fn call_function(&mut self, func: &Rc<Function>, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> EResult<Value> {
        let locals = bind_arguments(func, args, kwargs)?;
        self.tracker.enter_call()?;
        self.frames.push(Frame {
            locals: Rc::new(RefCell::new(locals)),
            closure: func.closure.clone(),
            globals: HashSet::new(),
        });
        let result = self.exec_block(&func.def.body);
        self.frames.pop();
        self.tracker.leave_call();
        match result? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }

    fn iterate(&mut self, value: &Value) -> EResult<PyIter> {
        let items = match value {
            Value::Range { start, stop, step } => {
                return Ok(PyIter::Range {
                    next: *start,
                    stop: *stop,
                    step: *step,
                });
            }
            Value::List(items) => items.borrow().clone(),
            Value::Set(items) => items.borrow().values(),
            Value::Tuple(items) => items.as_ref().clone(),
            Value::Str(s) => s.chars().map(|c| Value::str(c.to_string())).collect(),
            Value::Dict(d) => d.borrow().keys(),
            other => {
                return Err(type_error(format!("'{}' object is not iterable", other.type_name())));
            }
        };
        Ok(PyIter::Items(items.into_iter()))
    }

    /// Materializes any iterable into a vector.
    pub(crate) fn collect(&mut self, value: &Value) -> EResult<Vec<Value>> {
        if let Value::Range { start, stop, step } = value {
            let len = usize::try_from(range_len(*start, *stop, *step)).unwrap_or(usize::MAX);
            self.check_len(len)?;
            let mut out = Vec::with_capacity(len);
            for item in self.iterate(value)? {
                self.tick()?;
                out.push(item);
            }
            return Ok(out);
        }
        Ok(self.iterate(value)?.collect())
    }

    fn comprehension(
        &mut self,
        generators: &[Comprehension],
        emit: &mut dyn FnMut(&mut Self) -> EResult<()>,
    ) -> EResult<()> {
        let Some((first, rest)) = generators.split_first() else {
            return emit(self);
        };
        let iterable = self.eval(&first.iter)?;
        'items: for item in self.iterate(&iterable)? {
            self.tick()?;
            self.assign(&first.target, item)?;
            for cond in &first.conds {
                if !self.eval(cond)?.truthy() {
                    continue 'items;
                }
            }
            self.comprehension(rest, emit)?;
        }
        Ok(())
    }

    fn eval(&mut self, expr: &Expr) -> EResult<Value> {
        match expr {
            Expr::Literal(lit) => Ok(match lit {
                Literal::None => Value::None,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(i) => Value::Int(*i),
                Literal::BigInt(b) => Value::BigInt(Rc::clone(b)),
                Literal::Float(f) => Value::Float(*f),
                Literal::Str(s) => Value::Str(Rc::clone(s)),
            }),
            Expr::Name(name) => self.lookup(name),
            Expr::Named { target, value } => {
                let value = self.eval(value)?;
                self.store(target, value.clone());
                Ok(value)
            }
            Expr::Starred(_) => Err(type_error("can't use starred expression here")),
            Expr::FString(parts) => self.fstring(parts).map(Value::str),
            Expr::List(items) | Expr::Tuple(items) | Expr::Set(items) => {
                let values = self.eval_items(items)?;
                match expr {
                    Expr::List(_) => Ok(Value::list(values)),
                    Expr::Tuple(_) => Ok(Value::tuple(values)),
                    _ => Value::set(values),
                }
            }
            Expr::Dict(pairs) => {
                let mut dict = Dict::default();
                for (k, v) in pairs {
                    let key = self.eval(k)?;
                    let value = self.eval(v)?;
                    dict.insert(key, value)?;
                }
                Ok(Value::dict(dict))
            }
            Expr::BinOp { left, op, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                self.binary(*op, l, r)
            }
            Expr::UnaryOp { op, operand } => {
                let v = self.eval(operand)?;
                unary(*op, &v)
            }
            Expr::And(left, right) => {
                let l = self.eval(left)?;
                if l.truthy() { self.eval(right) } else { Ok(l) }
            }
            Expr::Or(left, right) => {
                let l = self.eval(left)?;
                if l.truthy() { Ok(l) } else { self.eval(right) }
            }
            Expr::Compare { left, ops } => {
                let mut l = self.eval(left)?;
                for (op, right) in ops {
                    let r = self.eval(right)?;
                    if !compare(*op, &l, &r)? {
                        return Ok(Value::Bool(false));
                    }
                    l = r;
                }
                Ok(Value::Bool(true))
            }
            Expr::Call { func, args, kwargs } => {
                let callee = self.eval(func)?;
                let arg_values = self.eval_items(args)?;
                let mut kw_values = Vec::with_capacity(kwargs.len());
                for (name, value) in kwargs {
                    kw_values.push((name.clone(), self.eval(value)?));
                }
                self.call(callee, arg_values, kw_values)
            }
            Expr::Attribute { value, attr } => {
                let obj = self.eval(value)?;
                get_attr(obj, attr)
            }
            Expr::Subscript { value, index } => {
                let obj = self.eval(value)?;
                if let Expr::Slice { lower, upper, step } = index.as_ref() {
                    let lower = self.slice_bound(lower.as_deref())?;
                    let upper = self.slice_bound(upper.as_deref())?;
                    let step = self.slice_bound(step.as_deref())?;
                    return self.get_slice(&obj, lower, upper, step);
                }
                let key = self.eval(index)?;
                self.get_item(&obj, &key)
            }
            Expr::Slice { .. } => Err(type_error("slices are only valid inside []")),
            Expr::IfExp { test, body, orelse } => {
                if self.eval(test)?.truthy() {
                    self.eval(body)
                } else {
                    self.eval(orelse)
                }
            }
            Expr::Lambda(def) => self.make_function(def),
            Expr::Comp { kind, elt, generators } => {
                let mut items = Vec::new();
                self.comprehension(generators, &mut |ctx: &mut Self| {
                    let value = ctx.eval(elt)?;
                    items.push(value);
                    ctx.check_len(items.len())
                })?;
                match kind {
                    CompKind::Set => Value::set(items),
                    CompKind::List | CompKind::Generator => Ok(Value::list(items)),
                }
            }
            Expr::DictComp { key, value, generators } => {
                let mut dict = Dict::default();
                self.comprehension(generators, &mut |ctx: &mut Self| {
                    let k = ctx.eval(key)?;
                    let v = ctx.eval(value)?;
                    dict.insert(k, v)
                })?;
                Ok(Value::dict(dict))
            }
        }
    }

    /// Evaluates display items or call arguments, expanding `*iterable` in place.
    fn eval_items(&mut self, items: &[Expr]) -> EResult<Vec<Value>> {
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            if let Expr::Starred(inner) = item {
                let iterable = self.eval(inner)?;
                let expanded = self.collect(&iterable)?;
                self.check_len(values.len().saturating_add(expanded.len()))?;
                values.extend(expanded);
            } else {
                values.push(self.eval(item)?);
            }
        }
        Ok(values)
    }

    fn fstring(&mut self, parts: &[FStringPart]) -> EResult<String> {
        let mut out = String::new();
        for part in parts {
            match part {
                FStringPart::Literal(text) => out.push_str(text),
                FStringPart::Expr { expr, repr, spec } => {
                    let value = self.eval(expr)?;
                    let value = if *repr { Value::str(value.py_repr()) } else { value };
                    let spec = self.fstring(spec)?;
                    out.push_str(&format_value(&value, &spec)?);
                }
            }
            self.check_len(out.len())?;
        }
        Ok(out)
    }

    fn slice_bound(&mut self, expr: Option<&Expr>) -> EResult<Option<i64>> {
        let Some(expr) = expr else {
            return Ok(None);
        };
        match self.eval(expr)? {
            Value::None => Ok(None),
            Value::BigInt(b) => Ok(Some(if b.sign() == num_bigint::Sign::Minus { i64::MIN } else { i64::MAX })),
            v => v
                .as_int()
                .map(Some)
                .ok_or_else(|| type_error("slice indices must be integers or None")),
        }
    }

    fn get_slice(&mut self, obj: &Value, lower: Option<i64>, upper: Option<i64>, step: Option<i64>) -> EResult<Value> {
        match obj {
            Value::List(items) => {
                let items = items.borrow();
                let picked = slice_indices(items.len(), lower, upper, step)?;
                Ok(Value::list(picked.into_iter().map(|i| items[i].clone()).collect()))
            }
            Value::Tuple(items) => {
                let picked = slice_indices(items.len(), lower, upper, step)?;
                Ok(Value::tuple(picked.into_iter().map(|i| items[i].clone()).collect()))
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let picked = slice_indices(chars.len(), lower, upper, step)?;
                Ok(Value::str(picked.into_iter().map(|i| chars[i]).collect::<String>()))
            }
            Value::Range { .. } => {
                let items = self.collect(obj)?;
                let picked = slice_indices(items.len(), lower, upper, step)?;
                Ok(Value::list(picked.into_iter().map(|i| items[i].clone()).collect()))
            }
            other => Err(type_error(format!("'{}' object is not subscriptable", other.type_name()))),
        }
    }

    fn get_item(&mut self, obj: &Value, key: &Value) -> EResult<Value> {
        let out_of_range = |kind: &str| Exception::new(ExcType::IndexError, format!("{kind} index out of range"));
        match obj {
            Value::List(items) => {
                let items = items.borrow();
                let i = seq_index(key, "list")?;
                normalize_index(i, items.len())
                    .map(|i| items[i].clone())
                    .ok_or_else(|| out_of_range("list"))
            }
            Value::Tuple(items) => {
                let i = seq_index(key, "tuple")?;
                normalize_index(i, items.len())
                    .map(|i| items[i].clone())
                    .ok_or_else(|| out_of_range("tuple"))
            }
            Value::Str(s) => {
                let i = seq_index(key, "string")?;
                normalize_index(i, s.chars().count())
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| Value::str(c.to_string()))
                    .ok_or_else(|| out_of_range("string"))
            }
            Value::Range { start, stop, step } => {
                let i = seq_index(key, "range")?;
                range_item(*start, *stop, *step, i)
                    .map(Value::Int)
                    .ok_or_else(|| out_of_range("range object"))
            }
            Value::Dict(d) => {
                let found = d.borrow().get(key)?;
                found.ok_or_else(|| Exception::new(ExcType::KeyError, key.py_repr()))
            }
            other => Err(type_error(format!("'{}' object is not subscriptable", other.type_name()))),
        }
    }

    fn inplace(&mut self, op: BinOp, current: Value, rhs: Value) -> EResult<Value> {
        if let (BinOp::Add, Value::List(items)) = (op, &current) {
            let extra = self.collect(&rhs)?;
            let len = items.borrow().len() + extra.len();
            self.check_len(len)?;
            items.borrow_mut().extend(extra);
            return Ok(current);
        }
        self.binary(op, current, rhs)
    }

    pub(crate) fn binary(&mut self, op: BinOp, left: Value, right: Value) -> EResult<Value> {
        if let (Value::Bool(a), Value::Bool(b)) = (&left, &right) {
            match op {
                BinOp::BitAnd => return Ok(Value::Bool(*a & *b)),
                BinOp::BitOr => return Ok(Value::Bool(*a | *b)),
                BinOp::BitXor => return Ok(Value::Bool(*a ^ *b)),
                _ => {}
            }
        }
        if left.is_int() && right.is_int() {
            return num::int_op(op, &left, &right);
        }
        if left.is_number() && right.is_number() {
            let (a, b) = (num::float_of(&left)?, num::float_of(&right)?);
            return float_op(op, a, b).unwrap_or_else(|| Err(unsupported(op, &left, &right)));
        }
        match (op, &left, &right) {
            (BinOp::Add, Value::Str(a), Value::Str(b)) => {
                self.check_len(a.len() + b.len())?;
                Ok(Value::str(format!("{a}{b}")))
            }
            (BinOp::Add, Value::Str(_), other) => Err(type_error(format!(
                "can only concatenate str (not \"{}\") to str",
                other.type_name()
            ))),
            (BinOp::Add, Value::List(a), Value::List(b)) => {
                let mut items = a.borrow().clone();
                items.extend(b.borrow().iter().cloned());
                self.check_len(items.len())?;
                Ok(Value::list(items))
            }
            (BinOp::Add, Value::List(_), other) => Err(type_error(format!(
                "can only concatenate list (not \"{}\") to list",
                other.type_name()
            ))),
            (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
                let items: Vec<Value> = a.iter().chain(b.iter()).cloned().collect();
                self.check_len(items.len())?;
                Ok(Value::tuple(items))
            }
            (BinOp::Mult, Value::Str(s), n) | (BinOp::Mult, n, Value::Str(s)) if n.is_int() => {
                let count = repeat_count(n);
                self.check_len(s.len().saturating_mul(count))?;
                Ok(Value::str(s.repeat(count)))
            }
            (BinOp::Mult, Value::List(items), n) | (BinOp::Mult, n, Value::List(items)) if n.is_int() => {
                let count = repeat_count(n);
                let items = items.borrow();
                self.check_len(items.len().saturating_mul(count))?;
                Ok(Value::list(repeat_items(&items, count)))
            }
            (BinOp::Mult, Value::Tuple(items), n) | (BinOp::Mult, n, Value::Tuple(items)) if n.is_int() => {
                let count = repeat_count(n);
                self.check_len(items.len().saturating_mul(count))?;
                Ok(Value::tuple(repeat_items(items, count)))
            }
            (BinOp::Mod, Value::Str(template), args) => percent_format(template, args).map(Value::str),
            (BinOp::BitOr | BinOp::BitAnd | BinOp::Sub | BinOp::BitXor, Value::Set(a), Value::Set(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                let result = match op {
                    BinOp::BitOr => a.union(&b),
                    BinOp::BitAnd => a.intersection(&b),
                    BinOp::Sub => a.difference(&b),
                    _ => a.symmetric_difference(&b),
                };
                self.check_len(result.len())?;
                Ok(Value::from_set(result))
            }
            (BinOp::BitOr, Value::Dict(a), Value::Dict(b)) => {
                let mut merged = a.borrow().clone();
                let other = b.borrow().clone();
                for (k, v) in other.keys().into_iter().zip(other.values()) {
                    merged.insert(k, v)?;
                }
                Ok(Value::dict(merged))
            }
            _ => Err(unsupported(op, &left, &right)),
        }
    }
}

fn import_module(name: &str) -> EResult<Value> {
    match name {
        "math" => Ok(Value::Module("math")),
        other => Err(Exception::new(ExcType::ImportError, format!("No module named '{other}'"))),
    }
}

fn exception_matches(exc: &Exception, class: &Value) -> EResult<bool> {
    match class {
        Value::ExcClass(handler) => Ok(exc.exc_type.is_subclass_of(*handler)),
        Value::Tuple(classes) => {
            for class in classes.iter() {
                if exception_matches(exc, class)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(type_error(
            "catching classes that do not inherit from BaseException is not allowed",
        )),
    }
}

fn bind_arguments(func: &Function, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> EResult<HashMap<String, Value>> {
    let name = &func.def.name;
    let params = &func.def.params;
    if args.len() > params.len() {
        return Err(type_error(format!(
            "{name}() takes {} positional argument{} but {} {} given",
            params.len(),
            if params.len() == 1 { "" } else { "s" },
            args.len(),
            if args.len() == 1 { "was" } else { "were" },
        )));
    }
    let mut locals = HashMap::with_capacity(params.len());
    for (param, arg) in params.iter().zip(args) {
        locals.insert(param.name.clone(), arg);
    }
    for (key, value) in kwargs {
        if !params.iter().any(|p| p.name == key) {
            return Err(type_error(format!("{name}() got an unexpected keyword argument '{key}'")));
        }
        if locals.contains_key(&key) {
            return Err(type_error(format!("{name}() got multiple values for argument '{key}'")));
        }
        locals.insert(key, value);
    }
    let mut missing = Vec::new();
    for (param, default) in params.iter().zip(&func.defaults) {
        if locals.contains_key(&param.name) {
            continue;
        }
        match default {
            Some(value) => {
                locals.insert(param.name.clone(), value.clone());
            }
            None => missing.push(format!("'{}'", param.name)),
        }
    }
    if !missing.is_empty() {
        let listed = match missing.as_slice() {
            [init @ .., last] if !init.is_empty() => format!("{} and {last}", init.join(", ")),
            _ => missing.join(""),
        };
        return Err(type_error(format!(
            "{name}() missing {} required positional argument{}: {listed}",
            missing.len(),
            if missing.len() == 1 { "" } else { "s" },
        )));
    }
    Ok(locals)
}

fn get_attr(obj: Value, attr: &str) -> EResult<Value> {
    match &obj {
        Value::Module("math") => math_attr(attr),
        Value::Exception(exc) if attr == "args" => Ok(Value::tuple(vec![Value::str(exc.message.as_str())])),
        _ if has_method(&obj, attr) => Ok(Value::BoundMethod(Rc::new(BoundMethod {
            receiver: obj,
            name: attr.to_owned(),
        }))),
        _ => Err(no_attribute(&obj, attr)),
    }
}

fn no_attribute(obj: &Value, attr: &str) -> Exception {
    Exception::new(
        ExcType::AttributeError,
        format!("'{}' object has no attribute '{attr}'", obj.type_name()),
    )
}

fn seq_index(key: &Value, kind: &str) -> EResult<i64> {
    if let Value::BigInt(_) = key {
        return Err(Exception::new(
            ExcType::IndexError,
            "cannot fit 'int' into an index-sized integer",
        ));
    }
    key.as_int().ok_or_else(|| {
        type_error(format!(
            "{kind} indices must be integers or slices, not {}",
            key.type_name()
        ))
    })
}

fn set_item(obj: &Value, key: Value, value: Value) -> EResult<()> {
    match obj {
        Value::List(items) => {
            let i = seq_index(&key, "list")?;
            let mut items = items.borrow_mut();
            let pos = normalize_index(i, items.len())
                .ok_or_else(|| Exception::new(ExcType::IndexError, "list assignment index out of range"))?;
            items[pos] = value;
            Ok(())
        }
        Value::Dict(d) => d.borrow_mut().insert(key, value),
        other => Err(type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

/// Repetition count for `seq * n`; negative counts repeat zero times.
fn repeat_count(n: &Value) -> usize {
    match n {
        Value::BigInt(b) if b.sign() == num_bigint::Sign::Plus => usize::MAX,
        other => other.as_int().and_then(|i| usize::try_from(i).ok()).unwrap_or(0),
    }
}

fn repeat_items(items: &[Value], count: usize) -> Vec<Value> {
    if items.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(items.len() * count);
    for _ in 0..count {
        out.extend(items.iter().cloned());
    }
    out
}

fn unsupported(op: BinOp, left: &Value, right: &Value) -> Exception {
    type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

fn float_op(op: BinOp, a: f64, b: f64) -> Option<EResult<Value>> {
    let zero = |msg: &str| Err(Exception::new(ExcType::ZeroDivisionError, msg));
    let value = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mult => a * b,
        BinOp::Div if b == 0.0 => return Some(zero("float division by zero")),
        BinOp::Div => a / b,
        BinOp::FloorDiv if b == 0.0 => return Some(zero("float floor division by zero")),
        BinOp::FloorDiv => (a / b).floor(),
        BinOp::Mod if b == 0.0 => return Some(zero("float modulo")),
        BinOp::Mod => {
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) { r + b } else { r }
        }
        BinOp::Pow if a == 0.0 && b < 0.0 => {
            return Some(zero("0.0 cannot be raised to a negative power"));
        }
        BinOp::Pow => a.powf(b),
        _ => return None,
    };
    Some(Ok(Value::Float(value)))
}

fn unary(op: UnaryOp, value: &Value) -> EResult<Value> {
    let bad = |symbol: &str| {
        type_error(format!(
            "bad operand type for unary {symbol}: '{}'",
            value.type_name()
        ))
    };
    match op {
        UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
        UnaryOp::Neg => match value {
            Value::Float(f) => Ok(Value::Float(-f)),
            v => num::neg(v).ok_or_else(|| bad("-")),
        },
        UnaryOp::Pos => match value {
            Value::Float(f) => Ok(Value::Float(*f)),
            Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
            v if v.is_int() => Ok(v.clone()),
            _ => Err(bad("+")),
        },
        UnaryOp::Invert => num::invert(value).ok_or_else(|| bad("~")),
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> EResult<bool> {
    use std::cmp::Ordering;
    Ok(match op {
        CmpOp::Eq => left.py_eq(right),
        CmpOp::NotEq => !left.py_eq(right),
        CmpOp::Lt => left.py_cmp(right, "<")? == Ordering::Less,
        CmpOp::LtE => left.py_cmp(right, "<=")? != Ordering::Greater,
        CmpOp::Gt => left.py_cmp(right, ">")? == Ordering::Greater,
        CmpOp::GtE => left.py_cmp(right, ">=")? != Ordering::Less,
        CmpOp::Is => left.py_is(right),
        CmpOp::IsNot => !left.py_is(right),
        CmpOp::In => contains(right, left)?,
        CmpOp::NotIn => !contains(right, left)?,
    })
}

fn contains(container: &Value, item: &Value) -> EResult<bool> {
    match container {
        Value::Str(s) => match item {
            Value::Str(sub) => Ok(s.contains(sub.as_ref())),
            other => Err(type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => Ok(items.borrow().iter().any(|v| v.py_eq(item))),
        Value::Set(items) => items.borrow().contains(item),
        Value::Tuple(items) => Ok(items.iter().any(|v| v.py_eq(item))),
        Value::Dict(d) => d.borrow().contains(item),
        Value::Range { start, stop, step } => Ok(match item {
            Value::Float(f) => num::from_float(*f)
                .ok()
                .filter(|_| f.fract() == 0.0)
                .and_then(|v| v.as_int())
                .is_some_and(|i| range_contains(*start, *stop, *step, i)),
            other => other.as_int().is_some_and(|i| range_contains(*start, *stop, *step, i)),
        }),
        other => Err(type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> RunOutput {
        Interpreter::new(ResourceLimits::default()).execute(source)
    }

    fn stdout(source: &str) -> String {
        let out = run(source);
        assert!(out.fault.is_none(), "unexpected fault: {:?}\n{}", out.fault, out.stderr);
        out.stdout
    }

    #[test]
    fn arithmetic_follows_python() {
        assert_eq!(stdout("print(7 // 2, -7 // 2, 7 % -3, 2 ** 10, 7 / 2)"), "3 -4 -2 1024 3.5\n");
        assert_eq!(stdout("print(0.1 + 0.2, 10 / 5, 3 * 1.5)"), "0.30000000000000004 2.0 4.5\n");
        assert_eq!(stdout("print(True + True, 'ab' * 3, [0] * 2)"), "2 ababab [0, 0]\n");
    }

    #[test]
    fn control_flow_and_functions() {
        let src = "\
def fizz(n):
    out = []
    for i in range(1, n + 1):
        if i % 15 == 0:
            out.append('FizzBuzz')
        elif i % 3 == 0:
            out.append('Fizz')
        elif i % 5 == 0:
            out.append('Buzz')
        else:
            out.append(str(i))
    return out

print(', '.join(fizz(15)))
";
        assert_eq!(
            stdout(src),
            "1, 2, Fizz, 4, Buzz, Fizz, 7, 8, Fizz, Buzz, 11, Fizz, 13, 14, FizzBuzz\n"
        );
    }

    #[test]
    fn while_else_break_and_continue() {
        let src = "\
i = 0
total = 0
while i < 10:
    i += 1
    if i % 2:
        continue
    if i > 8:
        break
    total += i
else:
    total = -1
print(total)
";
        assert_eq!(stdout(src), "20\n");
    }

    #[test]
    fn closures_see_enclosing_scope() {
        let src = "\
def counter():
    def helper(n):
        if n == 0:
            return base
        return helper(n - 1) + 1
    base = 10
    return helper(3)
print(counter())
";
        assert_eq!(stdout(src), "13\n");
    }

    #[test]
    fn comprehensions_and_builtins() {
        let src = "\
squares = [x * x for x in range(6) if x % 2 == 0]
pairs = {k: v for k, v in zip('abc', [1, 2, 3])}
print(squares, pairs, sum(squares), max(squares), sorted([3, 1, 2], reverse=True))
print(sorted(['bb', 'a', 'ccc'], key=len), list(enumerate('xy')))
";
        assert_eq!(
            stdout(src),
            "[0, 4, 16] {'a': 1, 'b': 2, 'c': 3} 20 16 [3, 2, 1]\n['a', 'bb', 'ccc'] [(0, 'x'), (1, 'y')]\n"
        );
    }

    #[test]
    fn fstrings_and_format() {
        let src = "\
name = 'Ana'
score = 9.456
print(f'{name} scored {score:.1f} ({score!r})')
print('{} and {}'.format(1, 'two'), f'{42:>5}|')
";
        assert_eq!(stdout(src), "Ana scored 9.5 (9.456)\n1 and two    42|\n");
    }

    #[test]
    fn try_except_finally() {
        let src = "\
def safe_div(a, b):
    try:
        return a / b
    except ZeroDivisionError as e:
        print('error:', e)
        return None
    finally:
        print('done')
print(safe_div(1, 0))
try:
    [][1]
except LookupError:
    print('lookup')
";
        assert_eq!(stdout(src), "error: division by zero\ndone\nNone\nlookup\n");
    }

    #[test]
    fn uncaught_exception_reports_line() {
        let out = run("x = 1\nprint(x)\nprint(y)\n");
        assert_eq!(out.stdout, "1\n");
        let fault = out.fault.expect("fault");
        assert_eq!(fault.type_name(), "NameError");
        assert_eq!(fault.message(), "name 'y' is not defined");
        assert_eq!(fault.line(), Some(3));
        assert!(out.stderr.contains("NameError: name 'y' is not defined"));
    }

    #[test]
    fn syntax_errors_do_not_execute() {
        let out = run("print('hi')\nif x print(x)\n");
        assert_eq!(out.stdout, "");
        let fault = out.fault.expect("fault");
        assert_eq!(fault.type_name(), "SyntaxError");
        assert_eq!(fault.line(), Some(2));
    }

    #[test]
    fn infinite_loop_is_stopped() {
        let mut interp = Interpreter::new(ResourceLimits::default().max_operations(10_000));
        let out = interp.execute("while True:\n    pass\n");
        let fault = out.fault.expect("fault");
        assert_eq!(fault.type_name(), "TimeoutError");
        assert!(fault.is_resource_limit());
    }

    #[test]
    fn resource_limits_cannot_be_caught() {
        let mut interp = Interpreter::new(ResourceLimits::default().max_operations(5_000));
        let out = interp.execute("try:\n    while True:\n        pass\nexcept Exception:\n    print('caught')\n");
        assert_eq!(out.stdout, "");
        assert!(out.fault.expect("fault").is_resource_limit());
    }

    #[test]
    fn deep_recursion_raises_recursion_error() {
        let mut interp = Interpreter::new(ResourceLimits::default().max_call_depth(30));
        let out = interp.execute("def f(n):\n    return f(n + 1)\nf(0)\n");
        assert_eq!(out.fault.expect("fault").type_name(), "RecursionError");
    }

    #[test]
    fn globals_persist_until_reset() {
        let mut interp = Interpreter::new(ResourceLimits::default());
        assert!(interp.execute("counter = 41").fault.is_none());
        assert_eq!(interp.execute("print(counter + 1)").stdout, "42\n");
        interp.reset();
        assert!(interp.execute("print(counter)").fault.is_some());
    }

    #[test]
    fn input_is_not_available() {
        let out = run("name = input('Name? ')\n");
        assert_eq!(out.stdout, "Name? ");
        assert_eq!(out.fault.expect("fault").type_name(), "EOFError");
    }

    #[test]
    fn only_math_can_be_imported() {
        assert_eq!(stdout("import math\nprint(math.sqrt(16), math.floor(2.7))"), "4.0 2\n");
        let out = run("import os\n");
        assert_eq!(out.fault.expect("fault").message(), "No module named 'os'");
    }

    #[test]
    fn aliasing_is_shared() {
        assert_eq!(stdout("a = [1]\nb = a\nb.append(2)\nb += [3]\nprint(a, a is b)"), "[1, 2, 3] True\n");
    }

    #[test]
    fn starred_unpacking_and_arguments() {
        let src = "\
a, *b = [1, 2, 3]
*c, d = 'xyz'
e, *f, g = range(2)
print(a, b, c, d, e, f, g)
print(*b, sep='-')
print([0, *b, *'hi'])
";
        assert_eq!(stdout(src), "1 [2, 3] ['x', 'y'] z 0 [] 1\n2-3\n[0, 2, 3, 'h', 'i']\n");
        let out = run("a, *b, c = [1]\n");
        assert_eq!(
            out.fault.expect("fault").message(),
            "not enough values to unpack (expected at least 2, got 1)"
        );
    }

    #[test]
    fn walrus_binds_in_the_current_scope() {
        let src = "\
data = [3, 8, 1]
if (n := len(data)) > 2:
    print(n)
print([y for x in data if (y := x * 2) > 5], y)
";
        assert_eq!(stdout(src), "3\n[6, 16] 2\n");
    }

    #[test]
    fn integers_grow_past_64_bits() {
        let src = "\
def fact(n):
    return 1 if n <= 1 else n * fact(n - 1)
print(fact(25))
print(2 ** 100, -2 ** 63 - 1, 2 ** 64 // 3, 10 ** 20 % 7)
big = 9223372036854775807 + 1
print(big, big - 1, big == 2.0 ** 63, {big: 1}[2 ** 63])
";
        assert_eq!(
            stdout(src),
            "15511210043330985984000000\n1267650600228229401496703205376 -9223372036854775809 \
             6148914691236517205 2\n9223372036854775808 9223372036854775807 True 1\n"
        );
        let out = run("x = 2 ** 10000000\n");
        assert_eq!(out.fault.expect("fault").type_name(), "MemoryError");
    }

    #[test]
    fn extreme_ranges_raise_instead_of_wrapping() {
        let out = run("len(range(-9223372036854775807, 9223372036854775807))\n");
        let fault = out.fault.expect("fault");
        assert_eq!(fault.type_name(), "OverflowError");
        assert_eq!(fault.message(), "Python int too large to convert to C ssize_t");
        let src = "\
r = range(-9223372036854775807, 9223372036854775807)
print(9223372036854775806 in r, r[-1], r[0])
print(0 in range(9223372036854775807, -9223372036854775807, -3))
print(len(range(9223372036854775807, -9223372036854775807, -9223372036854775807)))
";
        assert_eq!(
            stdout(src),
            "True 9223372036854775806 -9223372036854775807\nFalse\n2\n"
        );
        let out = run("list(range(-9223372036854775807, 9223372036854775807))\n");
        assert_eq!(out.fault.expect("fault").type_name(), "MemoryError");
    }

    #[test]
    fn containers_keep_insertion_order_and_reject_unhashable_keys() {
        let src = "\
d = {'b': 1, 'a': 2}
d['c'] = 3
del d['b']
d['b'] = 4
s = {3, 1, 2, 1.0}
print(d, s, s | {5}, s & {2, 3}, s - {1}, s ^ {1, 9})
print({1: 'int', 1.0: 'float', True: 'bool'})
";
        assert_eq!(
            stdout(src),
            "{'a': 2, 'c': 3, 'b': 4} {3, 1, 2} {3, 1, 2, 5} {3, 2} {3, 2} {3, 2, 9}\n{1: 'bool'}\n"
        );
        let out = run("d = {[1]: 2}\n");
        assert_eq!(out.fault.expect("fault").message(), "unhashable type: 'list'");
    }

    #[test]
    fn fstring_specs_can_nest_fields() {
        assert_eq!(stdout("w = 6\nx = 3.14159\nprint(f'[{x:>{w}.{w - 4}f}] {w=}')"), "[  3.14] w=6\n");
    }
}
