// Async tree-walking interpreter for the snippet language

use crate::eval::ast::{
    BinaryOp, DeclKind, Expr, FunctionBody, FunctionDecl, Item, LogicalOp, MemberKey, Pattern, Pos,
    PropDef, Stmt, UnaryOp,
};
use crate::eval::builtins;
use crate::eval::error::{EvalResult, RuntimeError, UNCAUGHT};
use crate::eval::scope::Scope;
use crate::eval::value::{Function, FunctionKind, Object, Promise, Property, Value, error_text, number_to_string};
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Resource bounds for one interpreter
#[derive(Debug, Clone)]
pub struct EvalLimits {
    /// Statements and loop iterations before the run is aborted
    pub max_steps: u64,
    pub max_call_depth: usize,
    /// Give other tasks a turn every this many steps
    pub yield_every: u64,
}

impl Default for EvalLimits {
    fn default() -> Self {
        Self {
            max_steps: 10_000_000,
            max_call_depth: 64,
            yield_every: 4096,
        }
    }
}

/// Built-in prototypes and the global scope
pub struct Realm {
    pub object_proto: Rc<Object>,
    pub array_proto: Rc<Object>,
    pub string_proto: Rc<Object>,
    pub number_proto: Rc<Object>,
    pub globals: Rc<Scope>,
}

struct Frame {
    name: String,
    pos: Pos,
}

struct Inner {
    realm: Realm,
    limits: EvalLimits,
    logs: RefCell<Vec<String>>,
    steps: Cell<u64>,
    frames: RefCell<Vec<Frame>>,
    sync_mode: Cell<bool>,
}

/// Handle to one interpreter instance; clones share state
#[derive(Clone)]
pub struct Interpreter {
    inner: Rc<Inner>,
}

enum Completion {
    Normal,
    Return(Value),
    Break,
    Continue,
}

const STEP_LIMIT_MESSAGE: &str = "Execution step limit exceeded";

impl Interpreter {
    pub fn new(limits: EvalLimits) -> Self {
        let object_proto = Object::new("Object", None);
        let realm = Realm {
            array_proto: Object::new("Array", Some(object_proto.clone())),
            string_proto: Object::new("String", Some(object_proto.clone())),
            number_proto: Object::new("Number", Some(object_proto.clone())),
            object_proto,
            globals: Scope::root(),
        };
        let interp = Self {
            inner: Rc::new(Inner {
                realm,
                limits,
                logs: RefCell::new(Vec::new()),
                steps: Cell::new(0),
                frames: RefCell::new(Vec::new()),
                sync_mode: Cell::new(false),
            }),
        };
        builtins::install(&interp);
        interp
    }

    pub fn realm(&self) -> &Realm {
        &self.inner.realm
    }

    pub fn globals(&self) -> &Rc<Scope> {
        &self.inner.realm.globals
    }

    /// Break the reference cycles between globals, prototypes and natives
    ///
    /// The interpreter is unusable afterwards. Closures a snippet kept in
    /// its own scopes may still hold each other alive.
    pub fn release(&self) {
        let realm = &self.inner.realm;
        realm.globals.clear();
        for proto in [&realm.object_proto, &realm.array_proto, &realm.string_proto, &realm.number_proto] {
            proto.props.borrow_mut().clear();
        }
    }

    /// Lines written through `console.log` so far
    pub fn logs(&self) -> Vec<String> {
        self.inner.logs.borrow().clone()
    }

    pub fn log(&self, line: String) {
        self.inner.logs.borrow_mut().push(line);
    }

    pub fn new_object(&self) -> Rc<Object> {
        Object::new("Object", Some(self.inner.realm.object_proto.clone()))
    }

    pub fn new_error(&self, kind: &str, message: &str) -> Value {
        let obj = Object::new(kind, Some(self.inner.realm.object_proto.clone()));
        obj.set("name", Value::str(kind));
        obj.set("message", Value::str(message));
        Value::Object(obj)
    }

    /// Whether `obj` is one of the built-in root prototypes
    pub fn is_builtin_proto(&self, obj: &Rc<Object>) -> bool {
        let realm = &self.inner.realm;
        [
            &realm.object_proto,
            &realm.array_proto,
            &realm.string_proto,
            &realm.number_proto,
        ]
        .iter()
        .any(|proto| Rc::ptr_eq(proto, obj))
    }

    // ---- entry points ----

    /// Evaluate `expr` as the body of a top-level unit
    pub async fn evaluate_expression(&self, expr: &Expr, scope: &Rc<Scope>) -> EvalResult<Value> {
        self.push_frame("<anonymous>", Pos { line: 1, column: 1 });
        let result = self.eval_expr(expr, scope).await;
        self.pop_frame(result)
    }

    /// Run `body` as a top-level unit; the result is its `return` value
    pub async fn execute_body(&self, body: &[Stmt], scope: &Rc<Scope>) -> EvalResult<Value> {
        self.push_frame("<anonymous>", Pos { line: 1, column: 1 });
        let result = match self.exec_block(body, scope).await {
            Ok(Completion::Return(value)) => Ok(value),
            Ok(_) => Ok(Value::Undefined),
            Err(e) => Err(e),
        };
        self.pop_frame(result)
    }

    // ---- frames and limits ----

    fn push_frame(&self, name: &str, pos: Pos) {
        self.inner.frames.borrow_mut().push(Frame {
            name: name.to_string(),
            pos,
        });
    }

    fn pop_frame<T>(&self, result: EvalResult<T>) -> EvalResult<T> {
        let frame = self.inner.frames.borrow_mut().pop();
        result.map_err(|mut e| {
            if let Some(frame) = frame {
                e.trace
                    .push(format!("at {} ({}:{})", frame.name, frame.pos.line, frame.pos.column));
            }
            e
        })
    }

    fn mark(&self, pos: Pos) {
        if let Some(frame) = self.inner.frames.borrow_mut().last_mut() {
            frame.pos = pos;
        }
    }

    fn limit_exceeded(&self) -> bool {
        self.inner.steps.get() > self.inner.limits.max_steps
    }

    async fn step(&self) -> EvalResult<()> {
        let steps = self.inner.steps.get() + 1;
        self.inner.steps.set(steps);
        if steps > self.inner.limits.max_steps {
            return Err(RuntimeError::range_error(STEP_LIMIT_MESSAGE));
        }
        let every = self.inner.limits.yield_every;
        if every > 0 && steps % every == 0 && !self.inner.sync_mode.get() {
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    // ---- functions ----

    pub fn make_function(&self, decl: &Rc<FunctionDecl>, scope: &Rc<Scope>, name: Option<&str>) -> Value {
        let name = decl.name.as_deref().or(name).unwrap_or("").to_string();
        Value::Function(Rc::new(Function {
            name,
            is_async: decl.is_async,
            kind: FunctionKind::User {
                decl: decl.clone(),
                scope: scope.clone(),
            },
        }))
    }

    /// Call `callee`; async functions return a promise without running
    pub fn call<'a>(&'a self, callee: &'a Value, this: Value, args: Vec<Value>) -> LocalBoxFuture<'a, EvalResult<Value>> {
        async move {
            let Value::Function(func) = callee else {
                return Err(RuntimeError::type_error(format!(
                    "{} is not a function",
                    callee.to_display()
                )));
            };
            match &func.kind {
                FunctionKind::Native { call, .. } => {
                    let future = call(self.clone(), this, args);
                    if func.is_async {
                        Ok(Value::Promise(Promise::new(future)))
                    } else {
                        future.await
                    }
                }
                FunctionKind::User { .. } if func.is_async => {
                    let interp = self.clone();
                    let func = func.clone();
                    Ok(Value::Promise(Promise::new(
                        async move { interp.invoke(&func, this, args).await }.boxed_local(),
                    )))
                }
                FunctionKind::User { .. } => self.invoke(func, this, args).await,
            }
        }
        .boxed_local()
    }

    /// Call from a context that cannot suspend, such as a getter read
    /// during formatting
    pub fn call_sync(&self, callee: &Value, this: Value, args: Vec<Value>) -> EvalResult<Value> {
        let previous = self.inner.sync_mode.replace(true);
        let result = self.call(callee, this, args).now_or_never();
        self.inner.sync_mode.set(previous);
        result.unwrap_or_else(|| Err(RuntimeError::type_error("call did not complete synchronously")))
    }

    async fn invoke(&self, func: &Rc<Function>, this: Value, args: Vec<Value>) -> EvalResult<Value> {
        let FunctionKind::User { decl, scope } = &func.kind else {
            return Ok(Value::Undefined);
        };
        if self.inner.frames.borrow().len() >= self.inner.limits.max_call_depth {
            return Err(RuntimeError::range_error("Maximum call stack size exceeded"));
        }

        let name = if func.name.is_empty() { "<anonymous>" } else { func.name.as_str() };
        self.push_frame(name, decl.pos);
        let result = self.invoke_body(decl, scope, this, args).await;
        self.pop_frame(result)
    }

    async fn invoke_body(
        &self,
        decl: &Rc<FunctionDecl>,
        closure: &Rc<Scope>,
        this: Value,
        mut args: Vec<Value>,
    ) -> EvalResult<Value> {
        let scope = Scope::child(closure);
        if !decl.is_arrow {
            scope.declare("this", this, false);
        }

        let rest = if args.len() > decl.params.len() {
            args.split_off(decl.params.len())
        } else {
            Vec::new()
        };
        let mut args = args.into_iter();
        for param in &decl.params {
            let mut value = args.next().unwrap_or_default();
            if let (Value::Undefined, Some(default)) = (&value, &param.default) {
                value = self.eval_expr(default, &scope).await?;
            }
            scope.declare(&param.name, value, true);
        }
        if let Some(rest_name) = &decl.rest {
            scope.declare(rest_name, Value::array(rest), true);
        }

        match &decl.body {
            FunctionBody::Expr(expr) => self.eval_expr(expr, &scope).await,
            FunctionBody::Block(body) => match self.exec_block(body, &scope).await? {
                Completion::Return(value) => Ok(value),
                _ => Ok(Value::Undefined),
            },
        }
    }

    // ---- properties ----

    fn lookup_property(&self, target: &Value, key: &str) -> EvalResult<Option<Property>> {
        let realm = &self.inner.realm;
        Ok(match target {
            Value::Undefined | Value::Null => {
                return Err(RuntimeError::type_error(format!(
                    "Cannot read properties of {} (reading '{}')",
                    target.to_display(),
                    key
                )));
            }
            Value::Object(obj) => obj.lookup(key),
            Value::Array(items) => {
                if key == "length" {
                    Some(Property::Data(Value::Number(items.borrow().len() as f64)))
                } else if let Some(index) = array_index(key) {
                    Some(Property::Data(items.borrow().get(index).cloned().unwrap_or_default()))
                } else {
                    realm.array_proto.lookup(key)
                }
            }
            Value::Str(s) => {
                if key == "length" {
                    Some(Property::Data(Value::Number(s.chars().count() as f64)))
                } else if let Some(index) = array_index(key) {
                    Some(Property::Data(
                        s.chars()
                            .nth(index)
                            .map(|c| Value::from(c.to_string()))
                            .unwrap_or_default(),
                    ))
                } else {
                    realm.string_proto.lookup(key)
                }
            }
            Value::Number(_) => realm.number_proto.lookup(key),
            Value::Function(func) if key == "name" => Some(Property::Data(Value::str(&func.name))),
            Value::Bool(_) | Value::Function(_) | Value::Promise(_) => realm.object_proto.lookup(key),
        })
    }

    pub fn get_member<'a>(&'a self, target: &'a Value, key: &'a str) -> LocalBoxFuture<'a, EvalResult<Value>> {
        async move {
            match self.lookup_property(target, key)? {
                Some(Property::Data(value)) => Ok(value),
                Some(Property::Accessor(getter)) => {
                    self.call(&Value::Function(getter), target.clone(), Vec::new()).await
                }
                None => Ok(Value::Undefined),
            }
        }
        .boxed_local()
    }

    pub fn get_member_sync(&self, target: &Value, key: &str) -> EvalResult<Value> {
        let previous = self.inner.sync_mode.replace(true);
        let result = self.get_member(target, key).now_or_never();
        self.inner.sync_mode.set(previous);
        result.unwrap_or_else(|| Err(RuntimeError::type_error("getter did not complete synchronously")))
    }

    pub fn set_member(&self, target: &Value, key: &str, value: Value) -> EvalResult<()> {
        match target {
            Value::Undefined | Value::Null => Err(RuntimeError::type_error(format!(
                "Cannot set properties of {} (setting '{}')",
                target.to_display(),
                key
            ))),
            Value::Object(obj) => {
                // Accessors are read-only
                if !matches!(obj.get_own(key), Some(Property::Accessor(_))) {
                    obj.set(key, value);
                }
                Ok(())
            }
            Value::Array(items) => {
                if key == "length" {
                    let len = value.to_number();
                    if !(len >= 0.0 && len.fract() == 0.0 && len < 1e7) {
                        return Err(RuntimeError::range_error("Invalid array length"));
                    }
                    items.borrow_mut().resize(len as usize, Value::Undefined);
                } else if let Some(index) = array_index(key) {
                    if index >= 10_000_000 {
                        return Err(RuntimeError::range_error("Invalid array length"));
                    }
                    let mut items = items.borrow_mut();
                    if index >= items.len() {
                        items.resize(index + 1, Value::Undefined);
                    }
                    items[index] = value;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Convert a thrown runtime error into the value seen by `catch`
    pub fn error_value(&self, err: &RuntimeError) -> Value {
        if !matches!(err.value, Value::Undefined) || err.kind == UNCAUGHT {
            return err.value.clone();
        }
        self.new_error(&err.kind, &err.message)
    }

    fn throw_value(&self, value: Value) -> RuntimeError {
        match &value {
            Value::Object(obj) if obj.class.ends_with("Error") => {
                let text = error_text(obj);
                let (kind, message) = match text.split_once(": ") {
                    Some((kind, message)) => (kind.to_string(), message.to_string()),
                    None => (text, String::new()),
                };
                RuntimeError::thrown(kind, message, value)
            }
            other => RuntimeError::thrown(UNCAUGHT, crate::eval::format::inline(self, other), value),
        }
    }

    // ---- statements ----

    fn hoist(&self, body: &[Stmt], scope: &Rc<Scope>) {
        for stmt in body {
            if let Stmt::Function(decl) = stmt {
                if let Some(name) = &decl.name {
                    scope.declare(name, self.make_function(decl, scope, None), true);
                }
            }
        }
    }

    fn exec_block<'a>(&'a self, body: &'a [Stmt], scope: &'a Rc<Scope>) -> LocalBoxFuture<'a, EvalResult<Completion>> {
        async move {
            self.hoist(body, scope);
            for stmt in body {
                match self.exec_stmt(stmt, scope).await? {
                    Completion::Normal => {}
                    other => return Ok(other),
                }
            }
            Ok(Completion::Normal)
        }
        .boxed_local()
    }

    fn exec_stmt<'a>(&'a self, stmt: &'a Stmt, scope: &'a Rc<Scope>) -> LocalBoxFuture<'a, EvalResult<Completion>> {
        async move {
            self.step().await?;
            match stmt {
                Stmt::Expr(expr, pos) => {
                    self.mark(*pos);
                    self.eval_expr(expr, scope).await?;
                }
                Stmt::Var(kind, decls, pos) => {
                    self.mark(*pos);
                    for decl in decls {
                        let value = match (&decl.init, &decl.target) {
                            (Some(Expr::Function(f)), Pattern::Ident(name)) => {
                                self.make_function(f, scope, Some(name))
                            }
                            (Some(init), _) => self.eval_expr(init, scope).await?,
                            (None, _) => Value::Undefined,
                        };
                        self.bind_pattern(&decl.target, value, scope, *kind != DeclKind::Const)
                            .await?;
                    }
                }
                Stmt::Function(_) | Stmt::Empty => {}
                Stmt::Return(value, pos) => {
                    self.mark(*pos);
                    let value = match value {
                        Some(expr) => self.eval_expr(expr, scope).await?,
                        None => Value::Undefined,
                    };
                    return Ok(Completion::Return(value));
                }
                Stmt::If(test, then, otherwise) => {
                    if self.eval_expr(test, scope).await?.truthy() {
                        return self.exec_stmt(then, scope).await;
                    } else if let Some(otherwise) = otherwise {
                        return self.exec_stmt(otherwise, scope).await;
                    }
                }
                Stmt::While(test, body) => {
                    while self.eval_expr(test, scope).await?.truthy() {
                        match self.exec_stmt(body, scope).await? {
                            Completion::Break => break,
                            Completion::Return(value) => return Ok(Completion::Return(value)),
                            Completion::Normal | Completion::Continue => {}
                        }
                        self.step().await?;
                    }
                }
                Stmt::For {
                    init,
                    test,
                    update,
                    body,
                } => {
                    let loop_scope = Scope::child(scope);
                    if let Some(init) = init {
                        self.exec_stmt(init, &loop_scope).await?;
                    }
                    loop {
                        if let Some(test) = test {
                            if !self.eval_expr(test, &loop_scope).await?.truthy() {
                                break;
                            }
                        }
                        match self.exec_stmt(body, &loop_scope).await? {
                            Completion::Break => break,
                            Completion::Return(value) => return Ok(Completion::Return(value)),
                            Completion::Normal | Completion::Continue => {}
                        }
                        if let Some(update) = update {
                            self.eval_expr(update, &loop_scope).await?;
                        }
                        self.step().await?;
                    }
                }
                Stmt::ForOf {
                    kind,
                    target,
                    iterable,
                    body,
                    pos,
                } => {
                    let subject = self.eval_expr(iterable, scope).await?;
                    self.mark(*pos);
                    let items = iterate(&subject)?;
                    return self.run_each(*kind, target, items, body, scope).await;
                }
                Stmt::ForIn {
                    kind,
                    target,
                    object,
                    body,
                    pos,
                } => {
                    let subject = self.eval_expr(object, scope).await?;
                    self.mark(*pos);
                    let keys = enumerable_keys(&subject).into_iter().map(Value::from).collect();
                    return self.run_each(*kind, target, keys, body, scope).await;
                }
                Stmt::Break => return Ok(Completion::Break),
                Stmt::Continue => return Ok(Completion::Continue),
                Stmt::Throw(expr, pos) => {
                    let value = self.eval_expr(expr, scope).await?;
                    self.mark(*pos);
                    return Err(self.throw_value(value));
                }
                Stmt::Try {
                    block,
                    catch,
                    finally,
                } => {
                    let mut result = self.exec_block(block, &Scope::child(scope)).await;
                    let caught = match (&result, catch) {
                        // The step limit cannot be caught
                        (Err(err), Some(clause)) if !self.limit_exceeded() => {
                            Some((self.error_value(err), clause))
                        }
                        _ => None,
                    };
                    if let Some((error, clause)) = caught {
                        let catch_scope = Scope::child(scope);
                        if let Some(param) = &clause.param {
                            self.bind_pattern(param, error, &catch_scope, true).await?;
                        }
                        result = self.exec_block(&clause.body, &catch_scope).await;
                    }
                    if let Some(finally) = finally {
                        match self.exec_block(finally, &Scope::child(scope)).await? {
                            Completion::Normal => {}
                            abrupt => return Ok(abrupt),
                        }
                    }
                    return result;
                }
                Stmt::Block(body) => return self.exec_block(body, &Scope::child(scope)).await,
            }
            Ok(Completion::Normal)
        }
        .boxed_local()
    }

    async fn run_each(
        &self,
        kind: DeclKind,
        target: &Pattern,
        items: Vec<Value>,
        body: &Stmt,
        scope: &Rc<Scope>,
    ) -> EvalResult<Completion> {
        for item in items {
            let iteration = Scope::child(scope);
            self.bind_pattern(target, item, &iteration, kind != DeclKind::Const)
                .await?;
            match self.exec_stmt(body, &iteration).await? {
                Completion::Break => break,
                Completion::Return(value) => return Ok(Completion::Return(value)),
                Completion::Normal | Completion::Continue => {}
            }
        }
        Ok(Completion::Normal)
    }

    async fn bind_pattern(&self, pattern: &Pattern, value: Value, scope: &Rc<Scope>, mutable: bool) -> EvalResult<()> {
        match pattern {
            Pattern::Ident(name) => scope.declare(name, value, mutable),
            Pattern::Object(fields) => {
                if value.is_nullish() {
                    return Err(RuntimeError::type_error(format!(
                        "Cannot destructure '{}' as it is {}.",
                        value.to_display(),
                        value.to_display()
                    )));
                }
                for (key, name, default) in fields {
                    let mut field = self.get_member(&value, key).await?;
                    if let (Value::Undefined, Some(default)) = (&field, default) {
                        field = self.eval_expr(default, scope).await?;
                    }
                    scope.declare(name, field, mutable);
                }
            }
            Pattern::Array(names) => {
                let items = iterate(&value)?;
                for (i, name) in names.iter().enumerate() {
                    if let Some(name) = name {
                        scope.declare(name, items.get(i).cloned().unwrap_or_default(), mutable);
                    }
                }
            }
        }
        Ok(())
    }

    // ---- expressions ----

    pub fn eval_expr<'a>(&'a self, expr: &'a Expr, scope: &'a Rc<Scope>) -> LocalBoxFuture<'a, EvalResult<Value>> {
        async move {
            match expr {
                Expr::Number(n) => Ok(Value::Number(*n)),
                Expr::Str(s) => Ok(Value::Str(s.clone())),
                Expr::Bool(b) => Ok(Value::Bool(*b)),
                Expr::Null => Ok(Value::Null),
                Expr::Undefined => Ok(Value::Undefined),
                Expr::This => Ok(scope.lookup("this").unwrap_or_default()),
                Expr::Ident(name, pos) => scope.lookup(name).ok_or_else(|| {
                    self.mark(*pos);
                    RuntimeError::reference_error(format!("{} is not defined", name))
                }),
                Expr::Array(items) => Ok(Value::array(self.eval_items(items, scope).await?)),
                Expr::Object(props) => self.eval_object(props, scope).await,
                Expr::Function(decl) => Ok(self.make_function(decl, scope, None)),
                Expr::Unary(op, operand) => self.eval_unary(*op, operand, scope).await,
                Expr::Binary(op, left, right) => {
                    let left = self.eval_expr(left, scope).await?;
                    let right = self.eval_expr(right, scope).await?;
                    self.binary(*op, &left, &right)
                }
                Expr::Logical(op, left, right) => {
                    let left = self.eval_expr(left, scope).await?;
                    let short_circuit = match op {
                        LogicalOp::And => !left.truthy(),
                        LogicalOp::Or => left.truthy(),
                        LogicalOp::Nullish => !left.is_nullish(),
                    };
                    if short_circuit {
                        Ok(left)
                    } else {
                        self.eval_expr(right, scope).await
                    }
                }
                Expr::Conditional(test, then, otherwise) => {
                    if self.eval_expr(test, scope).await?.truthy() {
                        self.eval_expr(then, scope).await
                    } else {
                        self.eval_expr(otherwise, scope).await
                    }
                }
                Expr::Assign(op, target, value) => {
                    let value = match op {
                        None => match (&**value, &**target) {
                            (Expr::Function(f), Expr::Ident(name, _)) => {
                                self.make_function(f, scope, Some(name))
                            }
                            _ => self.eval_expr(value, scope).await?,
                        },
                        Some(op) => {
                            let current = self.eval_expr(target, scope).await?;
                            let rhs = self.eval_expr(value, scope).await?;
                            self.binary(*op, &current, &rhs)?
                        }
                    };
                    self.assign(target, value.clone(), scope).await?;
                    Ok(value)
                }
                Expr::Update {
                    increment,
                    prefix,
                    target,
                } => {
                    let old = self.eval_expr(target, scope).await?.to_number();
                    let new = if *increment { old + 1.0 } else { old - 1.0 };
                    self.assign(target, Value::Number(new), scope).await?;
                    Ok(Value::Number(if *prefix { new } else { old }))
                }
                Expr::Member {
                    object,
                    key,
                    optional,
                    pos,
                } => {
                    let object = self.eval_expr(object, scope).await?;
                    if *optional && object.is_nullish() {
                        return Ok(Value::Undefined);
                    }
                    let key = self.property_key(key, scope).await?;
                    self.mark(*pos);
                    self.get_member(&object, &key).await
                }
                Expr::Call {
                    callee,
                    args,
                    optional,
                    pos,
                } => self.eval_call(callee, args, *optional, *pos, scope).await,
                Expr::New { callee, args, pos } => {
                    let constructor = self.eval_expr(callee, scope).await?;
                    let args = self.eval_items(args, scope).await?;
                    self.mark(*pos);
                    self.construct(&constructor, callee, args).await
                }
                Expr::Await(operand) => match self.eval_expr(operand, scope).await? {
                    Value::Promise(promise) => promise.settle().await,
                    other => Ok(other),
                },
            }
        }
        .boxed_local()
    }

    async fn eval_items(&self, items: &[Item], scope: &Rc<Scope>) -> EvalResult<Vec<Value>> {
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Item::Expr(expr) => values.push(self.eval_expr(expr, scope).await?),
                Item::Spread(expr) => {
                    let spread = self.eval_expr(expr, scope).await?;
                    values.extend(iterate(&spread)?);
                }
            }
        }
        Ok(values)
    }

    async fn eval_object(&self, props: &[PropDef], scope: &Rc<Scope>) -> EvalResult<Value> {
        let obj = self.new_object();
        for prop in props {
            match prop {
                PropDef::Init(key, Expr::Function(decl)) => {
                    obj.set(key, self.make_function(decl, scope, Some(key)));
                }
                PropDef::Init(key, expr) => obj.set(key, self.eval_expr(expr, scope).await?),
                PropDef::Getter(key, decl) => {
                    if let Value::Function(getter) = self.make_function(decl, scope, Some(key)) {
                        obj.define_getter(key, getter);
                    }
                }
                PropDef::Spread(expr) => {
                    let source = self.eval_expr(expr, scope).await?;
                    for key in enumerable_keys(&source) {
                        let value = self.get_member(&source, &key).await?;
                        obj.set(key, value);
                    }
                }
            }
        }
        Ok(Value::Object(obj))
    }

    async fn eval_unary(&self, op: UnaryOp, operand: &Expr, scope: &Rc<Scope>) -> EvalResult<Value> {
        if op == UnaryOp::Typeof {
            if let Expr::Ident(name, _) = operand {
                if scope.lookup(name).is_none() {
                    return Ok(Value::str("undefined"));
                }
            }
        }
        let value = self.eval_expr(operand, scope).await?;
        Ok(match op {
            UnaryOp::Not => Value::Bool(!value.truthy()),
            UnaryOp::Neg => Value::Number(-value.to_number()),
            UnaryOp::Plus => Value::Number(value.to_number()),
            UnaryOp::Typeof => Value::str(value.typeof_name()),
        })
    }

    async fn eval_call(
        &self,
        callee: &Expr,
        args: &[Item],
        optional: bool,
        pos: Pos,
        scope: &Rc<Scope>,
    ) -> EvalResult<Value> {
        let (func, this) = match callee {
            Expr::Member {
                object,
                key,
                optional: member_optional,
                pos: member_pos,
            } => {
                let object = self.eval_expr(object, scope).await?;
                if *member_optional && object.is_nullish() {
                    return Ok(Value::Undefined);
                }
                let key = self.property_key(key, scope).await?;
                self.mark(*member_pos);
                (self.get_member(&object, &key).await?, object)
            }
            other => (self.eval_expr(other, scope).await?, Value::Undefined),
        };
        if optional && func.is_nullish() {
            return Ok(Value::Undefined);
        }
        let args = self.eval_items(args, scope).await?;
        self.mark(pos);
        if !matches!(func, Value::Function(_)) {
            return Err(RuntimeError::type_error(format!(
                "{} is not a function",
                describe(callee)
            )));
        }
        self.call(&func, this, args).await
    }

    async fn construct(&self, constructor: &Value, callee: &Expr, args: Vec<Value>) -> EvalResult<Value> {
        let Value::Function(func) = constructor else {
            return Err(RuntimeError::type_error(format!(
                "{} is not a constructor",
                describe(callee)
            )));
        };
        match &func.kind {
            FunctionKind::Native { .. } => self.call(constructor, Value::Undefined, args).await,
            FunctionKind::User { decl, .. } if decl.is_arrow || decl.is_async => Err(
                RuntimeError::type_error(format!("{} is not a constructor", describe(callee))),
            ),
            FunctionKind::User { .. } => {
                let class = if func.name.is_empty() { "Object" } else { func.name.as_str() };
                let instance = Value::Object(Object::new(
                    class,
                    Some(self.inner.realm.object_proto.clone()),
                ));
                match self.call(constructor, instance.clone(), args).await? {
                    result @ (Value::Object(_) | Value::Array(_)) => Ok(result),
                    _ => Ok(instance),
                }
            }
        }
    }

    async fn property_key(&self, key: &MemberKey, scope: &Rc<Scope>) -> EvalResult<String> {
        match key {
            MemberKey::Named(name) => Ok(name.clone()),
            MemberKey::Computed(expr) => Ok(self.eval_expr(expr, scope).await?.to_display()),
        }
    }

    async fn assign(&self, target: &Expr, value: Value, scope: &Rc<Scope>) -> EvalResult<()> {
        match target {
            Expr::Ident(name, pos) => {
                self.mark(*pos);
                scope.assign(name, value)
            }
            Expr::Member {
                object, key, pos, ..
            } => {
                let object = self.eval_expr(object, scope).await?;
                let key = self.property_key(key, scope).await?;
                self.mark(*pos);
                self.set_member(&object, &key, value)
            }
            _ => Err(RuntimeError::new("SyntaxError", "Invalid assignment target")),
        }
    }

    fn binary(&self, op: BinaryOp, left: &Value, right: &Value) -> EvalResult<Value> {
        let num = |f: fn(f64, f64) -> f64| Value::Number(f(left.to_number(), right.to_number()));
        Ok(match op {
            BinaryOp::Add => match (left, right) {
                (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
                (l, r) if is_stringish(l) || is_stringish(r) => {
                    Value::from(format!("{}{}", l.to_display(), r.to_display()))
                }
                _ => num(|a, b| a + b),
            },
            BinaryOp::Sub => num(|a, b| a - b),
            BinaryOp::Mul => num(|a, b| a * b),
            BinaryOp::Div => num(|a, b| a / b),
            BinaryOp::Rem => num(|a, b| a % b),
            BinaryOp::Pow => num(f64::powf),
            BinaryOp::Eq => Value::Bool(left.loose_equals(right)),
            BinaryOp::NotEq => Value::Bool(!left.loose_equals(right)),
            BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
            BinaryOp::StrictNotEq => Value::Bool(!left.strict_equals(right)),
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
                let ordering = match (left, right) {
                    (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                    _ => left.to_number().partial_cmp(&right.to_number()),
                };
                Value::Bool(match ordering {
                    None => false,
                    Some(ord) => match op {
                        BinaryOp::Lt => ord.is_lt(),
                        BinaryOp::LtEq => ord.is_le(),
                        BinaryOp::Gt => ord.is_gt(),
                        _ => ord.is_ge(),
                    },
                })
            }
            BinaryOp::In => {
                let key = left.to_display();
                match right {
                    Value::Object(_) | Value::Array(_) => {
                        Value::Bool(self.lookup_property(right, &key)?.is_some_and(|p| {
                            !matches!(p, Property::Data(Value::Undefined)) || has_own(right, &key)
                        }))
                    }
                    other => {
                        return Err(RuntimeError::type_error(format!(
                            "Cannot use 'in' operator to search for '{}' in {}",
                            key,
                            other.to_display()
                        )));
                    }
                }
            }
        })
    }
}

fn is_stringish(value: &Value) -> bool {
    matches!(
        value,
        Value::Str(_) | Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Promise(_)
    )
}

fn has_own(value: &Value, key: &str) -> bool {
    match value {
        Value::Object(obj) => obj.get_own(key).is_some(),
        Value::Array(items) => array_index(key).is_some_and(|i| i < items.borrow().len()),
        _ => false,
    }
}

fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    key.parse().ok()
}

/// Values produced by `for..of` and spread
fn iterate(value: &Value) -> EvalResult<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items.borrow().clone()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::from(c.to_string())).collect()),
        other => Err(RuntimeError::type_error(format!(
            "{} is not iterable",
            match other {
                Value::Object(_) => "object".to_string(),
                v => v.to_display(),
            }
        ))),
    }
}

/// Keys visited by `for..in` and object spread
pub fn enumerable_keys(value: &Value) -> Vec<String> {
    match value {
        Value::Object(obj) => obj.keys(),
        Value::Array(items) => (0..items.borrow().len()).map(|i| i.to_string()).collect(),
        Value::Str(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
        _ => Vec::new(),
    }
}

/// Short source-like description of a callee, for error messages
fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name, _) => name.clone(),
        Expr::This => "this".to_string(),
        Expr::Member { object, key, .. } => match key {
            MemberKey::Named(name) => format!("{}.{}", describe(object), name),
            MemberKey::Computed(inner) => match &**inner {
                Expr::Number(n) => format!("{}[{}]", describe(object), number_to_string(*n)),
                Expr::Str(s) => format!("{}[\"{}\"]", describe(object), s),
                _ => format!("{}[...]", describe(object)),
            },
        },
        Expr::Call { callee, .. } => format!("{}(...)", describe(callee)),
        _ => "expression".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::parser::{parse_expression_unit, parse_statements_unit};

    async fn run(src: &str) -> EvalResult<Value> {
        let interp = Interpreter::new(EvalLimits::default());
        let scope = Scope::child(interp.globals());
        let body = parse_statements_unit(src, true).unwrap();
        interp.execute_body(&body, &scope).await
    }

    async fn num(src: &str) -> f64 {
        match run(src).await.unwrap() {
            Value::Number(n) => n,
            other => panic!("expected number, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_arithmetic_and_closures() {
        assert_eq!(num("return 2 ** 3 ** 2").await, 512.0);
        assert_eq!(num("let n = 0; const inc = () => n++; inc(); inc(); return n").await, 2.0);
        assert_eq!(
            num("function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2) } return fib(10)").await,
            55.0
        );
    }

    #[tokio::test]
    async fn test_loops_and_destructuring() {
        let src = "let total = 0\nfor (const [k, v] of Object.entries({a: 1, b: 2})) { total += v }\nfor (let i = 0; i < 3; i++) { if (i == 1) continue; total += 10 }\nreturn total";
        assert_eq!(num(src).await, 23.0);
        assert_eq!(num("const {a, b: c = 5} = {a: 1}; return a + c").await, 6.0);
    }

    #[tokio::test]
    async fn test_try_catch_finally() {
        let src = "let log = ''\ntry { null.x } catch (e) { log += e.name } finally { log += '!' }\nreturn log";
        assert!(matches!(run(src).await.unwrap(), Value::Str(s) if &*s == "TypeError!"));
    }

    #[tokio::test]
    async fn test_this_and_getters() {
        let src = "const o = { n: 2, get twice() { return this.n * 2 }, add(x) { return this.n + x } }\nreturn o.twice + o.add(1)";
        assert_eq!(num(src).await, 7.0);
    }

    #[tokio::test]
    async fn test_async_functions_are_lazy_promises() {
        let src = "let hits = 0\nconst f = async () => { hits++; return 5 }\nconst p = f()\nconst before = hits\nconst v = await p\nreturn before * 100 + hits * 10 + v";
        assert_eq!(num(src).await, 15.0);
    }

    #[tokio::test]
    async fn test_runtime_error_trace() {
        let err = run("function boom() {\n  throw new Error('bad')\n}\nboom()").await.unwrap_err();
        assert_eq!(err.kind, "Error");
        assert_eq!(err.message, "bad");
        assert_eq!(err.trace[0], "at boom (2:3)");
        assert_eq!(err.trace[1], "at <anonymous> (4:5)");
    }

    #[tokio::test]
    async fn test_not_a_function_message() {
        let err = run("const o = {}; o.missing()").await.unwrap_err();
        assert_eq!(err.to_string(), "TypeError: o.missing is not a function");
    }

    #[tokio::test]
    async fn test_step_limit_stops_infinite_loop() {
        let interp = Interpreter::new(EvalLimits {
            max_steps: 1000,
            ..EvalLimits::default()
        });
        let scope = Scope::child(interp.globals());
        let body = parse_statements_unit("while (true) { try { } catch (e) { } }", false).unwrap();
        let err = interp.execute_body(&body, &scope).await.unwrap_err();
        assert_eq!(err.kind, "RangeError");
    }

    #[tokio::test]
    async fn test_recursion_depth_limit() {
        let err = run("function f() { return f() } return f()").await.unwrap_err();
        assert_eq!(err.message, "Maximum call stack size exceeded");
    }

    #[test]
    fn test_sync_getter_read() {
        let interp = Interpreter::new(EvalLimits::default());
        let scope = Scope::child(interp.globals());
        let expr = parse_expression_unit("{ get v() { return 41 + 1 } }").unwrap();
        let value = futures::executor::block_on(interp.evaluate_expression(&expr, &scope)).unwrap();
        assert!(matches!(interp.get_member_sync(&value, "v"), Ok(Value::Number(n)) if n == 42.0));
    }
}
