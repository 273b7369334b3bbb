//! Lowers ruff's Python AST into the sandbox's [`ast`](super::ast).
//!
//! `ruff_python_parser` does the tokenizing and grammar; this pass rejects the
//! constructs the interpreter does not run (classes, generators, `with`, ...),
//! applies the checks CPython performs at compile time (`'return' outside
//! function` and friends) and bounds nesting so deeply nested input cannot
//! overflow the stack while it is lowered or evaluated.

use std::rc::Rc;

use num_bigint::BigInt;
use ruff_python_ast::{
    self as ast, BoolOp, CmpOp as AstCmpOp, ConversionFlag, ElifElseClause, Expr as AstExpr, InterpolatedStringElement,
    Number, Operator, ParameterWithDefault, Stmt as AstStmt, UnaryOp as AstUnaryOp,
};
use ruff_python_parser::parse_module;
use ruff_text_size::{Ranged, TextRange};

use super::{
    ast::{
        BinOp, CmpOp, CompKind, Comprehension, ExceptHandler, Expr, FStringPart, FunctionDef, Literal, Module, Param,
        Stmt, StmtKind, Target, UnaryOp,
    },
    error::SyntaxError,
};

/// Maximum nesting of statements and expressions.
#[cfg(not(debug_assertions))]
const MAX_NESTING_DEPTH: u16 = 200;
/// Debug builds have much larger stack frames, so the limit is lower.
#[cfg(debug_assertions)]
const MAX_NESTING_DEPTH: u16 = 35;

type PResult<T> = Result<T, SyntaxError>;

pub fn parse(source: &str) -> PResult<Module> {
    let mut lowering = Lowering::new(source);
    let parsed = parse_module(source).map_err(|e| lowering.error(e.error.to_string(), e.range()))?;
    let body = lowering.statements(parsed.into_syntax().body)?;
    Ok(Module { body })
}

struct Lowering<'src> {
    source: &'src str,
    /// Byte offset at which each line starts.
    line_starts: Vec<usize>,
    depth_remaining: u16,
    loop_depth: u32,
    func_depth: u32,
}

impl<'src> Lowering<'src> {
    fn new(source: &'src str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(at, _)| at + 1))
            .collect();
        Self {
            source,
            line_starts,
            depth_remaining: MAX_NESTING_DEPTH,
            loop_depth: 0,
            func_depth: 0,
        }
    }

    /// 1-based line and character column of a byte offset.
    fn position(&self, offset: usize) -> (u32, u32) {
        let offset = offset.min(self.source.len());
        let index = self.line_starts.partition_point(|&start| start <= offset).saturating_sub(1);
        let line_start = self.line_starts[index];
        let column = self
            .source
            .get(line_start..offset)
            .map_or(0, |prefix| prefix.chars().count());
        (saturate(index + 1), saturate(column + 1))
    }

    fn line(&self, range: TextRange) -> u32 {
        self.position(usize::from(range.start())).0
    }

    fn error(&self, message: impl Into<String>, range: TextRange) -> SyntaxError {
        let (line, column) = self.position(usize::from(range.start()));
        SyntaxError::new(message, line, column)
    }

    fn unsupported(&self, what: &str, range: TextRange) -> SyntaxError {
        self.error(format!("{what} are not supported in this sandbox"), range)
    }

    fn enter(&mut self, range: TextRange) -> PResult<()> {
        if self.depth_remaining == 0 {
            return Err(self.error("too many nested parentheses", range));
        }
        self.depth_remaining -= 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth_remaining += 1;
    }

    // ----- statements -----

    fn statements(&mut self, body: impl IntoIterator<Item = AstStmt>) -> PResult<Vec<Stmt>> {
        body.into_iter().map(|stmt| self.statement(stmt)).collect()
    }

    fn statement(&mut self, stmt: AstStmt) -> PResult<Stmt> {
        let range = stmt.range();
        self.enter(range)?;
        let kind = self.statement_kind(stmt, range);
        self.leave();
        Ok(Stmt {
            line: self.line(range),
            kind: kind?,
        })
    }

    fn statement_kind(&mut self, stmt: AstStmt, range: TextRange) -> PResult<StmtKind> {
        Ok(match stmt {
            AstStmt::Expr(ast::StmtExpr { value, .. }) => StmtKind::Expr(self.expression(*value)?),
            AstStmt::Assign(ast::StmtAssign { targets, value, .. }) => StmtKind::Assign {
                targets: targets
                    .into_iter()
                    .map(|t| self.target(t, "assign to"))
                    .collect::<PResult<_>>()?,
                value: self.expression(*value)?,
            },
            AstStmt::AnnAssign(ast::StmtAnnAssign { target, value, .. }) => match value {
                Some(value) => StmtKind::Assign {
                    targets: vec![self.target(*target, "assign to")?],
                    value: self.expression(*value)?,
                },
                // A bare annotation declares but does not bind.
                None => StmtKind::Pass,
            },
            AstStmt::AugAssign(ast::StmtAugAssign { target, op, value, .. }) => StmtKind::AugAssign {
                target: self.target(*target, "assign to")?,
                op: self.operator(op, range)?,
                value: self.expression(*value)?,
            },
            AstStmt::If(ast::StmtIf {
                test,
                body,
                elif_else_clauses,
                ..
            }) => StmtKind::If {
                test: self.expression(*test)?,
                body: self.statements(body)?,
                orelse: self.elif_else(elif_else_clauses)?,
            },
            AstStmt::While(ast::StmtWhile { test, body, orelse, .. }) => StmtKind::While {
                test: self.expression(*test)?,
                body: self.loop_body(body)?,
                orelse: self.statements(orelse)?,
            },
            AstStmt::For(ast::StmtFor {
                is_async,
                target,
                iter,
                body,
                orelse,
                ..
            }) => {
                if is_async {
                    return Err(self.unsupported("async loops", range));
                }
                StmtKind::For {
                    target: self.target(*target, "assign to")?,
                    iter: self.expression(*iter)?,
                    body: self.loop_body(body)?,
                    orelse: self.statements(orelse)?,
                }
            }
            AstStmt::FunctionDef(def) => {
                if def.is_async {
                    return Err(self.unsupported("async functions", range));
                }
                if !def.decorator_list.is_empty() {
                    return Err(self.unsupported("decorators", range));
                }
                let params = self.parameters(*def.parameters, range)?;
                let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
                self.func_depth += 1;
                let body = self.statements(def.body);
                self.func_depth -= 1;
                self.loop_depth = saved_loops;
                StmtKind::FunctionDef(Rc::new(FunctionDef {
                    name: def.name.to_string(),
                    params,
                    body: body?,
                }))
            }
            AstStmt::Return(ast::StmtReturn { value, .. }) => {
                if self.func_depth == 0 {
                    return Err(self.error("'return' outside function", range));
                }
                StmtKind::Return(value.map(|v| self.expression(*v)).transpose()?)
            }
            AstStmt::Delete(ast::StmtDelete { targets, .. }) => StmtKind::Del(
                targets
                    .into_iter()
                    .map(|t| self.target(t, "delete"))
                    .collect::<PResult<_>>()?,
            ),
            AstStmt::Raise(ast::StmtRaise { exc, .. }) => StmtKind::Raise(exc.map(|e| self.expression(*e)).transpose()?),
            AstStmt::Try(ast::StmtTry {
                body,
                handlers,
                orelse,
                finalbody,
                is_star,
                ..
            }) => {
                if is_star {
                    return Err(self.unsupported("exception groups", range));
                }
                StmtKind::Try {
                    body: self.statements(body)?,
                    handlers: handlers
                        .into_iter()
                        .map(|h| self.handler(h))
                        .collect::<PResult<_>>()?,
                    orelse: self.statements(orelse)?,
                    finalbody: self.statements(finalbody)?,
                }
            }
            AstStmt::Assert(ast::StmtAssert { test, msg, .. }) => StmtKind::Assert {
                test: self.expression(*test)?,
                msg: msg.map(|m| self.expression(*m)).transpose()?,
            },
            AstStmt::Import(ast::StmtImport { names, .. }) => StmtKind::Import(aliases(names)),
            AstStmt::ImportFrom(ast::StmtImportFrom {
                module, names, level, ..
            }) => {
                if level > 0 {
                    return Err(self.unsupported("relative imports", range));
                }
                if names.iter().any(|alias| alias.name.as_str() == "*") {
                    return Err(self.unsupported("wildcard imports", range));
                }
                StmtKind::ImportFrom {
                    module: module.map(|m| m.to_string()).unwrap_or_default(),
                    names: aliases(names),
                }
            }
            AstStmt::Global(ast::StmtGlobal { names, .. }) => {
                StmtKind::Global(names.into_iter().map(|n| n.to_string()).collect())
            }
            AstStmt::Pass(_) => StmtKind::Pass,
            AstStmt::Break(_) => {
                if self.loop_depth == 0 {
                    return Err(self.error("'break' outside loop", range));
                }
                StmtKind::Break
            }
            AstStmt::Continue(_) => {
                if self.loop_depth == 0 {
                    return Err(self.error("'continue' not properly in loop", range));
                }
                StmtKind::Continue
            }
            AstStmt::ClassDef(_) => return Err(self.unsupported("classes", range)),
            AstStmt::With(_) => return Err(self.unsupported("'with' statements", range)),
            AstStmt::Match(_) => return Err(self.unsupported("'match' statements", range)),
            AstStmt::Nonlocal(_) => return Err(self.unsupported("'nonlocal' declarations", range)),
            AstStmt::TypeAlias(_) => return Err(self.unsupported("type aliases", range)),
            AstStmt::IpyEscapeCommand(_) => return Err(self.error("invalid syntax", range)),
        })
    }

    /// Folds `elif`/`else` clauses into nested `orelse` blocks.
    fn elif_else(&mut self, clauses: Vec<ElifElseClause>) -> PResult<Vec<Stmt>> {
        let mut orelse = Vec::new();
        for clause in clauses.into_iter().rev() {
            let line = self.line(clause.range);
            let body = self.statements(clause.body)?;
            orelse = match clause.test {
                Some(test) => vec![Stmt {
                    line,
                    kind: StmtKind::If {
                        test: self.expression(test)?,
                        body,
                        orelse,
                    },
                }],
                None => body,
            };
        }
        Ok(orelse)
    }

    fn loop_body(&mut self, body: impl IntoIterator<Item = AstStmt>) -> PResult<Vec<Stmt>> {
        self.loop_depth += 1;
        let body = self.statements(body);
        self.loop_depth -= 1;
        body
    }

    fn handler(&mut self, handler: ast::ExceptHandler) -> PResult<ExceptHandler> {
        let ast::ExceptHandler::ExceptHandler(handler) = handler;
        Ok(ExceptHandler {
            line: self.line(handler.range),
            class: handler.type_.map(|t| self.expression(*t)).transpose()?,
            name: handler.name.map(|n| n.to_string()),
            body: self.statements(handler.body)?,
        })
    }

    fn parameters(&mut self, params: ast::Parameters, range: TextRange) -> PResult<Vec<Param>> {
        if !params.posonlyargs.is_empty()
            || !params.kwonlyargs.is_empty()
            || params.vararg.is_some()
            || params.kwarg.is_some()
        {
            return Err(self.unsupported("variadic, positional-only and keyword-only parameters", range));
        }
        let mut lowered: Vec<Param> = Vec::with_capacity(params.args.len());
        for ParameterWithDefault { parameter, default, .. } in params.args {
            let name = parameter.name.to_string();
            if lowered.iter().any(|p| p.name == name) {
                return Err(self.error(
                    format!("duplicate argument '{name}' in function definition"),
                    parameter.range,
                ));
            }
            let default = default.map(|d| self.expression(*d)).transpose()?;
            lowered.push(Param { name, default });
        }
        Ok(lowered)
    }

    // ----- targets -----

    fn target(&mut self, expr: AstExpr, verb: &str) -> PResult<Target> {
        let range = expr.range();
        self.enter(range)?;
        let target = self.target_inner(expr, verb, range);
        self.leave();
        target
    }

    fn target_inner(&mut self, expr: AstExpr, verb: &str, range: TextRange) -> PResult<Target> {
        match expr {
            AstExpr::Name(ast::ExprName { id, .. }) => Ok(Target::Name(id.to_string())),
            AstExpr::Subscript(ast::ExprSubscript { value, slice, .. }) => Ok(Target::Subscript {
                value: Box::new(self.expression(*value)?),
                index: Box::new(self.expression(*slice)?),
            }),
            AstExpr::Attribute(ast::ExprAttribute { value, attr, .. }) => Ok(Target::Attribute {
                value: Box::new(self.expression(*value)?),
                attr: attr.to_string(),
            }),
            AstExpr::Tuple(ast::ExprTuple { elts, .. }) | AstExpr::List(ast::ExprList { elts, .. }) => {
                if elts.iter().filter(|e| matches!(e, AstExpr::Starred(_))).count() > 1 {
                    return Err(self.error("multiple starred expressions in assignment", range));
                }
                elts.into_iter()
                    .map(|e| match e {
                        AstExpr::Starred(ast::ExprStarred { value, range, .. }) => match *value {
                            AstExpr::Name(ast::ExprName { id, .. }) => Ok(Target::Starred(id.to_string())),
                            _ => Err(self.error(format!("cannot {verb} starred expression"), range)),
                        },
                        other => self.target(other, verb),
                    })
                    .collect::<PResult<_>>()
                    .map(Target::Tuple)
            }
            AstExpr::Starred(_) => Err(self.error("starred assignment target must be in a list or tuple", range)),
            AstExpr::Call(_) => Err(self.error(format!("cannot {verb} function call"), range)),
            AstExpr::StringLiteral(_)
            | AstExpr::FString(_)
            | AstExpr::NumberLiteral(_)
            | AstExpr::BooleanLiteral(_)
            | AstExpr::NoneLiteral(_) => Err(self.error(format!("cannot {verb} literal"), range)),
            _ => Err(self.error(format!("cannot {verb} expression"), range)),
        }
    }

    // ----- expressions -----

    fn expression(&mut self, expr: AstExpr) -> PResult<Expr> {
        let range = expr.range();
        self.enter(range)?;
        let lowered = self.expression_inner(expr, range);
        self.leave();
        lowered
    }

    fn boxed(&mut self, expr: AstExpr) -> PResult<Box<Expr>> {
        self.expression(expr).map(Box::new)
    }

    /// Elements of a call or a display, where `*items` is allowed.
    fn items(&mut self, elts: Vec<AstExpr>) -> PResult<Vec<Expr>> {
        elts.into_iter()
            .map(|e| match e {
                AstExpr::Starred(ast::ExprStarred { value, .. }) => Ok(Expr::Starred(self.boxed(*value)?)),
                other => self.expression(other),
            })
            .collect()
    }

    fn expression_inner(&mut self, expr: AstExpr, range: TextRange) -> PResult<Expr> {
        Ok(match expr {
            AstExpr::BoolOp(ast::ExprBoolOp { op, values, .. }) => {
                let mut values = values.into_iter();
                let first = values
                    .next()
                    .ok_or_else(|| self.error("invalid syntax", range))?;
                let mut left = self.expression(first)?;
                for value in values {
                    let right = self.boxed(value)?;
                    left = match op {
                        BoolOp::And => Expr::And(Box::new(left), right),
                        BoolOp::Or => Expr::Or(Box::new(left), right),
                    };
                }
                left
            }
            AstExpr::Named(ast::ExprNamed { target, value, .. }) => match *target {
                AstExpr::Name(ast::ExprName { id, .. }) => Expr::Named {
                    target: id.to_string(),
                    value: self.boxed(*value)?,
                },
                other => return Err(self.error("cannot use assignment expressions with this target", other.range())),
            },
            AstExpr::BinOp(ast::ExprBinOp { left, op, right, .. }) => Expr::BinOp {
                left: self.boxed(*left)?,
                op: self.operator(op, range)?,
                right: self.boxed(*right)?,
            },
            AstExpr::UnaryOp(ast::ExprUnaryOp { op, operand, .. }) => Expr::UnaryOp {
                op: match op {
                    AstUnaryOp::Invert => UnaryOp::Invert,
                    AstUnaryOp::Not => UnaryOp::Not,
                    AstUnaryOp::UAdd => UnaryOp::Pos,
                    AstUnaryOp::USub => UnaryOp::Neg,
                },
                operand: self.boxed(*operand)?,
            },
            AstExpr::Lambda(ast::ExprLambda { parameters, body, .. }) => {
                let params = match parameters {
                    Some(params) => self.parameters(*params, range)?,
                    None => Vec::new(),
                };
                self.func_depth += 1;
                let body = self.expression(*body);
                self.func_depth -= 1;
                Expr::Lambda(Rc::new(FunctionDef {
                    name: "<lambda>".into(),
                    params,
                    body: vec![Stmt {
                        line: self.line(range),
                        kind: StmtKind::Return(Some(body?)),
                    }],
                }))
            }
            AstExpr::If(ast::ExprIf { test, body, orelse, .. }) => Expr::IfExp {
                test: self.boxed(*test)?,
                body: self.boxed(*body)?,
                orelse: self.boxed(*orelse)?,
            },
            AstExpr::Dict(ast::ExprDict { items, .. }) => {
                let mut pairs = Vec::with_capacity(items.len());
                for ast::DictItem { key, value } in items {
                    let Some(key) = key else {
                        return Err(self.unsupported("'**' unpacking in dict displays", value.range()));
                    };
                    pairs.push((self.expression(key)?, self.expression(value)?));
                }
                Expr::Dict(pairs)
            }
            AstExpr::Set(ast::ExprSet { elts, .. }) => Expr::Set(self.items(elts)?),
            AstExpr::List(ast::ExprList { elts, .. }) => Expr::List(self.items(elts)?),
            AstExpr::Tuple(ast::ExprTuple { elts, .. }) => Expr::Tuple(self.items(elts)?),
            AstExpr::ListComp(ast::ExprListComp { elt, generators, .. }) => {
                self.comprehension(CompKind::List, *elt, generators)?
            }
            AstExpr::SetComp(ast::ExprSetComp { elt, generators, .. }) => {
                self.comprehension(CompKind::Set, *elt, generators)?
            }
            AstExpr::Generator(ast::ExprGenerator { elt, generators, .. }) => {
                self.comprehension(CompKind::Generator, *elt, generators)?
            }
            AstExpr::DictComp(ast::ExprDictComp {
                key, value, generators, ..
            }) => Expr::DictComp {
                key: match key {
                    Some(key) => self.boxed(*key)?,
                    None => return Err(self.unsupported("'**' unpacking in dict comprehensions", value.range())),
                },
                value: self.boxed(*value)?,
                generators: self.generators(generators)?,
            },
            AstExpr::Compare(ast::ExprCompare {
                left, ops, comparators, ..
            }) => {
                let left = self.boxed(*left)?;
                let ops = ops
                    .into_vec()
                    .into_iter()
                    .zip(comparators.into_vec())
                    .map(|(op, right)| Ok((compare_op(op), self.expression(right)?)))
                    .collect::<PResult<_>>()?;
                Expr::Compare { left, ops }
            }
            AstExpr::Call(ast::ExprCall { func, arguments, .. }) => {
                let func = self.boxed(*func)?;
                let ast::Arguments { args, keywords, .. } = arguments;
                let args = self.items(args.into_vec())?;
                let mut kwargs: Vec<(String, Expr)> = Vec::with_capacity(keywords.len());
                for ast::Keyword { arg, value, range, .. } in keywords {
                    let Some(name) = arg else {
                        return Err(self.unsupported("'**' argument unpacking", range));
                    };
                    let name = name.to_string();
                    if kwargs.iter().any(|(k, _)| *k == name) {
                        return Err(self.error(format!("keyword argument repeated: {name}"), range));
                    }
                    kwargs.push((name, self.expression(value)?));
                }
                Expr::Call { func, args, kwargs }
            }
            AstExpr::FString(ast::ExprFString { value, .. }) => {
                let mut parts = Vec::new();
                for part in &value {
                    match part {
                        ast::FStringPart::Literal(lit) => push_literal(&mut parts, &lit.value),
                        ast::FStringPart::FString(fstring) => {
                            for element in &fstring.elements {
                                self.fstring_element(element, &mut parts)?;
                            }
                        }
                    }
                }
                Expr::FString(parts)
            }
            AstExpr::StringLiteral(ast::ExprStringLiteral { value, .. }) => {
                Expr::Literal(Literal::Str(value.to_string().into()))
            }
            AstExpr::NumberLiteral(ast::ExprNumberLiteral { value, .. }) => match value {
                Number::Int(i) => match i.as_i64() {
                    Some(v) => Expr::Literal(Literal::Int(v)),
                    None => {
                        let big = parse_int_literal(&i.to_string())
                            .ok_or_else(|| self.error("invalid integer literal", range))?;
                        Expr::Literal(Literal::BigInt(Rc::new(big)))
                    }
                },
                Number::Float(f) => Expr::Literal(Literal::Float(f)),
                Number::Complex { .. } => return Err(self.unsupported("complex numbers", range)),
            },
            AstExpr::BooleanLiteral(ast::ExprBooleanLiteral { value, .. }) => Expr::Literal(Literal::Bool(value)),
            AstExpr::NoneLiteral(_) | AstExpr::EllipsisLiteral(_) => Expr::Literal(Literal::None),
            AstExpr::Attribute(ast::ExprAttribute { value, attr, .. }) => Expr::Attribute {
                value: self.boxed(*value)?,
                attr: attr.to_string(),
            },
            AstExpr::Subscript(ast::ExprSubscript { value, slice, .. }) => Expr::Subscript {
                value: self.boxed(*value)?,
                index: self.boxed(*slice)?,
            },
            AstExpr::Slice(ast::ExprSlice { lower, upper, step, .. }) => Expr::Slice {
                lower: lower.map(|e| self.boxed(*e)).transpose()?,
                upper: upper.map(|e| self.boxed(*e)).transpose()?,
                step: step.map(|e| self.boxed(*e)).transpose()?,
            },
            AstExpr::Name(ast::ExprName { id, .. }) => Expr::Name(id.to_string()),
            AstExpr::Starred(_) => return Err(self.error("can't use starred expression here", range)),
            AstExpr::BytesLiteral(_) => return Err(self.unsupported("bytes literals", range)),
            AstExpr::TString(_) => return Err(self.unsupported("template strings", range)),
            AstExpr::Await(_) => return Err(self.unsupported("'await' expressions", range)),
            AstExpr::Yield(_) | AstExpr::YieldFrom(_) => return Err(self.unsupported("generators", range)),
            AstExpr::IpyEscapeCommand(_) => return Err(self.error("invalid syntax", range)),
        })
    }

    fn comprehension(&mut self, kind: CompKind, elt: AstExpr, generators: Vec<ast::Comprehension>) -> PResult<Expr> {
        Ok(Expr::Comp {
            kind,
            elt: self.boxed(elt)?,
            generators: self.generators(generators)?,
        })
    }

    fn generators(&mut self, generators: Vec<ast::Comprehension>) -> PResult<Vec<Comprehension>> {
        generators
            .into_iter()
            .map(|g| {
                if g.is_async {
                    return Err(self.unsupported("async comprehensions", g.range));
                }
                Ok(Comprehension {
                    target: self.target(g.target, "assign to")?,
                    iter: self.expression(g.iter)?,
                    conds: g
                        .ifs
                        .into_iter()
                        .map(|c| self.expression(c))
                        .collect::<PResult<_>>()?,
                })
            })
            .collect()
    }

    fn fstring_element(&mut self, element: &InterpolatedStringElement, parts: &mut Vec<FStringPart>) -> PResult<()> {
        let field = match element {
            InterpolatedStringElement::Literal(lit) => {
                push_literal(parts, &lit.value);
                return Ok(());
            }
            InterpolatedStringElement::Interpolation(field) => field,
        };
        if let Some(debug) = &field.debug_text {
            let source = &self.source[field.expression.range()];
            push_literal(parts, &format!("{}{source}{}", debug.leading(), debug.trailing()));
        }
        let mut spec = Vec::new();
        if let Some(format_spec) = &field.format_spec {
            for element in &format_spec.elements {
                self.fstring_element(element, &mut spec)?;
            }
        }
        // `{x=}` shows the repr unless a conversion or spec says otherwise.
        let repr = match field.conversion {
            ConversionFlag::Repr | ConversionFlag::Ascii => true,
            ConversionFlag::Str => false,
            ConversionFlag::None => field.debug_text.is_some() && spec.is_empty(),
        };
        parts.push(FStringPart::Expr {
            expr: self.boxed((*field.expression).clone())?,
            repr,
            spec,
        });
        Ok(())
    }

    fn operator(&self, op: Operator, range: TextRange) -> PResult<BinOp> {
        Ok(match op {
            Operator::Add => BinOp::Add,
            Operator::Sub => BinOp::Sub,
            Operator::Mult => BinOp::Mult,
            Operator::Div => BinOp::Div,
            Operator::FloorDiv => BinOp::FloorDiv,
            Operator::Mod => BinOp::Mod,
            Operator::Pow => BinOp::Pow,
            Operator::BitAnd => BinOp::BitAnd,
            Operator::BitOr => BinOp::BitOr,
            Operator::BitXor => BinOp::BitXor,
            Operator::LShift => BinOp::LShift,
            Operator::RShift => BinOp::RShift,
            Operator::MatMult => return Err(self.unsupported("matrix multiplication operators", range)),
        })
    }
}

fn compare_op(op: AstCmpOp) -> CmpOp {
    match op {
        AstCmpOp::Eq => CmpOp::Eq,
        AstCmpOp::NotEq => CmpOp::NotEq,
        AstCmpOp::Lt => CmpOp::Lt,
        AstCmpOp::LtE => CmpOp::LtE,
        AstCmpOp::Gt => CmpOp::Gt,
        AstCmpOp::GtE => CmpOp::GtE,
        AstCmpOp::Is => CmpOp::Is,
        AstCmpOp::IsNot => CmpOp::IsNot,
        AstCmpOp::In => CmpOp::In,
        AstCmpOp::NotIn => CmpOp::NotIn,
    }
}

fn aliases(names: Vec<ast::Alias>) -> Vec<(String, Option<String>)> {
    names
        .into_iter()
        .map(|alias| (alias.name.to_string(), alias.asname.map(|a| a.to_string())))
        .collect()
}

/// Appends literal text, merging with a preceding literal part.
fn push_literal(parts: &mut Vec<FStringPart>, text: &str) {
    if text.is_empty() {
        return;
    }
    match parts.last_mut() {
        Some(FStringPart::Literal(last)) => last.push_str(text),
        _ => parts.push(FStringPart::Literal(text.to_owned())),
    }
}

/// Parses an integer literal too large for `i64`, honouring radix prefixes and `_`.
fn parse_int_literal(text: &str) -> Option<BigInt> {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    let (radix, digits) = match cleaned.get(..2).map(str::to_ascii_lowercase).as_deref() {
        Some("0x") => (16, &cleaned[2..]),
        Some("0o") => (8, &cleaned[2..]),
        Some("0b") => (2, &cleaned[2..]),
        _ => (10, cleaned.as_str()),
    };
    BigInt::parse_bytes(digits.as_bytes(), radix)
}

fn saturate(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_err(src: &str) -> SyntaxError {
        parse(src).expect_err("should not parse")
    }

    #[test]
    fn parses_beginner_programs() {
        let src = "\
name = 'Ada'
total = 0
for i in range(3):
    total += i
if total > 2:
    print(f\"{name} has {total}\")
elif total == 0:
    pass
else:
    print('small')
def greet(who, punct='!'):
    return 'hi ' + who + punct
squares = [n * n for n in range(5) if n % 2 == 0]
";
        let module = parse(src).expect("parse");
        assert_eq!(module.body.len(), 7);
        assert!(matches!(module.body[2].kind, StmtKind::For { .. }));
        assert!(matches!(module.body[5].kind, StmtKind::FunctionDef(_)));
        let StmtKind::If { orelse, .. } = &module.body[4].kind else {
            panic!("expected if");
        };
        assert_eq!(orelse[0].line, 7);
    }

    #[test]
    fn syntax_errors_carry_line_and_column() {
        let err = parse_err("x = 1\nif x print(x)\n");
        assert_eq!(err.line, 2);
        assert!(err.column > 1);
        let err = parse_err("s = 'héllo'\ny = (1,\n");
        assert!(err.line >= 2);
    }

    #[test]
    fn missing_block_is_reported() {
        let err = parse_err("for i in range(3):\nprint(i)\n");
        assert_eq!(err.line, 2);
    }

    #[test]
    fn return_outside_function_is_rejected() {
        assert_eq!(parse_err("return 5\n").message, "'return' outside function");
        assert_eq!(parse_err("break\n").message, "'break' outside loop");
        assert_eq!(
            parse_err("for i in x:\n    def f():\n        continue\n").message,
            "'continue' not properly in loop"
        );
        assert!(parse("def f():\n    return lambda: 1\n").is_ok());
    }

    #[test]
    fn invalid_targets_are_rejected() {
        assert!(parse("5 = x\n").is_err());
        assert!(parse("f() = 1\n").is_err());
        assert!(parse("a, *b, *c = x\n").is_err());
    }

    #[test]
    fn starred_targets_and_arguments_are_lowered() {
        let module = parse("a, *b = [1, 2, 3]\nprint(*b)\n").expect("parse");
        let StmtKind::Assign { targets, .. } = &module.body[0].kind else {
            panic!("expected assignment");
        };
        let Target::Tuple(items) = &targets[0] else {
            panic!("expected tuple target");
        };
        assert!(matches!(&items[1], Target::Starred(name) if name == "b"));
        let StmtKind::Expr(Expr::Call { args, .. }) = &module.body[1].kind else {
            panic!("expected call");
        };
        assert!(matches!(&args[0], Expr::Starred(_)));
    }

    #[test]
    fn fstring_fields_are_parsed() {
        let module = parse("print(f'{x!r:>5} and {{braces}} {y=} {z:>{w}}')\n").expect("parse");
        let StmtKind::Expr(Expr::Call { args, .. }) = &module.body[0].kind else {
            panic!("expected call");
        };
        let Expr::FString(parts) = &args[0] else {
            panic!("expected f-string");
        };
        assert!(matches!(
            &parts[0],
            FStringPart::Expr { repr: true, spec, .. } if matches!(spec.as_slice(), [FStringPart::Literal(s)] if s == ">5")
        ));
        assert!(matches!(&parts[1], FStringPart::Literal(s) if s == " and {braces} y="));
        assert!(matches!(&parts[2], FStringPart::Expr { repr: true, spec, .. } if spec.is_empty()));
        assert!(matches!(&parts[4], FStringPart::Expr { repr: false, spec, .. } if spec.len() == 2));
    }

    #[test]
    fn large_integer_literals_become_big_ints() {
        let module = parse("x = 0x1_0000_0000_0000_0000\n").expect("parse");
        let StmtKind::Assign { value, .. } = &module.body[0].kind else {
            panic!("expected assignment");
        };
        let Expr::Literal(Literal::BigInt(big)) = value else {
            panic!("expected big int literal");
        };
        assert_eq!(big.to_string(), "18446744073709551616");
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let src = format!("x = {}1{}\n", "[".repeat(250), "]".repeat(250));
        assert_eq!(parse_err(&src).message, "too many nested parentheses");
    }

    #[test]
    fn unsupported_constructs_are_rejected_with_a_clear_message() {
        for src in [
            "class A:\n    pass\n",
            "with open('f') as f:\n    pass\n",
            "def f(*args):\n    pass\n",
            "def f():\n    yield 1\n",
            "from math import *\n",
        ] {
            assert!(parse_err(src).message.contains("not supported"), "{src}");
        }
    }
}
