//! Static validation of snippets.
//!
//! The snippet is parsed into a syntax tree and every node is checked
//! against an import allowlist, a dunder-attribute ban and a call
//! denylist. Nothing is executed.
//!
//! This is a pre-filter, not a security boundary: process isolation and
//! OS resource limits still apply to everything that passes.

use crate::error::Violation;
use rustpython_parser::ast::{self, Expr, Stmt};
use rustpython_parser::{lexer, Mode, Parse, Tok};
use std::collections::HashSet;

/// Modules (by top-level component) that snippets may import.
pub const DEFAULT_ALLOWED_MODULES: &[&str] = &[
    // numeric
    "math",
    "cmath",
    "decimal",
    "fractions",
    "numbers",
    "random",
    // statistical
    "statistics",
    // combinatorial / functional
    "itertools",
    "functools",
    "operator",
    // collections
    "collections",
    "heapq",
    "bisect",
];

/// Function and method names that snippets may not call.
pub const DEFAULT_BLOCKED_CALLS: &[&str] = &[
    // file I/O
    "open",
    // dynamic evaluation
    "eval",
    "exec",
    "compile",
    "__import__",
    // interaction
    "input",
    "breakpoint",
    // scope introspection
    "globals",
    "locals",
    "vars",
    // dynamic attribute access
    "getattr",
    "setattr",
    "delattr",
    // environment / process control
    "exit",
    "quit",
    "system",
    "popen",
    "putenv",
    "fork",
    "kill",
];

/// Deepest statement, expression or pattern nesting a snippet may reach.
pub const MAX_NESTING_DEPTH: usize = 100;

/// Source path reported by the parser.
const SOURCE_PATH: &str = "<snippet>";

/// Outcome of validating one snippet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(String),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

impl From<Result<(), Violation>> for Verdict {
    fn from(result: Result<(), Violation>) -> Self {
        match result {
            Ok(()) => Verdict::Accepted,
            Err(v) => Verdict::Rejected(v.to_string()),
        }
    }
}

/// Static checks applied to extracted code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validator {
    allowed_modules: HashSet<String>,
    blocked_calls: HashSet<String>,
    max_code_length: usize,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(
            DEFAULT_ALLOWED_MODULES.iter().map(|s| s.to_string()),
            DEFAULT_BLOCKED_CALLS.iter().map(|s| s.to_string()),
            10_000,
        )
    }
}

impl Validator {
    pub fn new(
        allowed_modules: impl IntoIterator<Item = String>,
        blocked_calls: impl IntoIterator<Item = String>,
        max_code_length: usize,
    ) -> Self {
        Self {
            allowed_modules: allowed_modules.into_iter().collect(),
            blocked_calls: blocked_calls.into_iter().collect(),
            max_code_length,
        }
    }

    pub fn max_code_length(&self) -> usize {
        self.max_code_length
    }

    pub fn is_module_allowed(&self, module: &str) -> bool {
        let top = module.split('.').next().unwrap_or(module);
        self.allowed_modules.contains(top)
    }

    pub fn is_call_blocked(&self, name: &str) -> bool {
        self.blocked_calls.contains(name)
    }

    /// Validate a snippet.
    ///
    /// # Errors
    ///
    /// Returns the first `Violation` found, in source order.
    pub fn validate(&self, code: &str) -> Result<(), Violation> {
        if code.trim().is_empty() {
            return Err(Violation::NoCode);
        }

        let len = code.chars().count();
        if len > self.max_code_length {
            return Err(Violation::CodeTooLong {
                len,
                max: self.max_code_length,
            });
        }

        // Can't be passed as a process argument, and the interpreter refuses it anyway.
        if let Some(pos) = code.find('\0') {
            return Err(Violation::Syntax {
                line: line_of(code, pos),
                message: "source code cannot contain null bytes".to_string(),
            });
        }

        // Building and dropping the tree both recurse, so obviously deep
        // input is refused from the token stream first.
        check_token_nesting(code)?;

        let suite = ast::Suite::parse(code, SOURCE_PATH).map_err(|e| Violation::Syntax {
            line: line_of(code, u32::from(e.offset) as usize),
            message: e.error.to_string(),
        })?;

        self.visit_body(&suite, 0)
    }

    fn visit_body(&self, body: &[Stmt], depth: usize) -> Result<(), Violation> {
        body.iter().try_for_each(|stmt| self.visit_stmt(stmt, depth))
    }

    fn visit_exprs<'a>(
        &self,
        exprs: impl IntoIterator<Item = &'a Expr>,
        depth: usize,
    ) -> Result<(), Violation> {
        exprs
            .into_iter()
            .try_for_each(|expr| self.visit_expr(expr, depth))
    }

    fn visit_opt(&self, expr: Option<&Expr>, depth: usize) -> Result<(), Violation> {
        match expr {
            Some(expr) => self.visit_expr(expr, depth),
            None => Ok(()),
        }
    }

    fn visit_stmt(&self, stmt: &Stmt, depth: usize) -> Result<(), Violation> {
        let depth = descend(depth)?;
        match stmt {
            Stmt::Import(node) => {
                for alias in &node.names {
                    self.check_module(alias.name.as_str())?;
                }
                Ok(())
            }
            Stmt::ImportFrom(node) => self.check_import_from(node),

            Stmt::FunctionDef(node) => {
                self.visit_exprs(&node.decorator_list, depth)?;
                self.visit_type_params(&node.type_params, depth)?;
                self.visit_arguments(&node.args, depth)?;
                self.visit_opt(node.returns.as_deref(), depth)?;
                self.visit_body(&node.body, depth)
            }
            Stmt::AsyncFunctionDef(node) => {
                self.visit_exprs(&node.decorator_list, depth)?;
                self.visit_type_params(&node.type_params, depth)?;
                self.visit_arguments(&node.args, depth)?;
                self.visit_opt(node.returns.as_deref(), depth)?;
                self.visit_body(&node.body, depth)
            }
            Stmt::ClassDef(node) => {
                self.visit_exprs(&node.decorator_list, depth)?;
                self.visit_type_params(&node.type_params, depth)?;
                self.visit_exprs(&node.bases, depth)?;
                self.visit_exprs(node.keywords.iter().map(|k| &k.value), depth)?;
                self.visit_body(&node.body, depth)
            }

            Stmt::Return(node) => self.visit_opt(node.value.as_deref(), depth),
            Stmt::Delete(node) => self.visit_exprs(&node.targets, depth),
            Stmt::Assign(node) => {
                self.visit_exprs(&node.targets, depth)?;
                self.visit_expr(&node.value, depth)
            }
            Stmt::TypeAlias(node) => {
                self.visit_expr(&node.name, depth)?;
                self.visit_type_params(&node.type_params, depth)?;
                self.visit_expr(&node.value, depth)
            }
            Stmt::AugAssign(node) => {
                self.visit_expr(&node.target, depth)?;
                self.visit_expr(&node.value, depth)
            }
            Stmt::AnnAssign(node) => {
                self.visit_expr(&node.target, depth)?;
                self.visit_expr(&node.annotation, depth)?;
                self.visit_opt(node.value.as_deref(), depth)
            }

            Stmt::For(node) => {
                self.visit_expr(&node.target, depth)?;
                self.visit_expr(&node.iter, depth)?;
                self.visit_body(&node.body, depth)?;
                self.visit_body(&node.orelse, depth)
            }
            Stmt::AsyncFor(node) => {
                self.visit_expr(&node.target, depth)?;
                self.visit_expr(&node.iter, depth)?;
                self.visit_body(&node.body, depth)?;
                self.visit_body(&node.orelse, depth)
            }
            Stmt::While(node) => {
                self.visit_expr(&node.test, depth)?;
                self.visit_body(&node.body, depth)?;
                self.visit_body(&node.orelse, depth)
            }
            Stmt::If(node) => {
                self.visit_expr(&node.test, depth)?;
                self.visit_body(&node.body, depth)?;
                self.visit_body(&node.orelse, depth)
            }
            Stmt::With(node) => {
                for item in &node.items {
                    self.visit_expr(&item.context_expr, depth)?;
                    self.visit_opt(item.optional_vars.as_deref(), depth)?;
                }
                self.visit_body(&node.body, depth)
            }
            Stmt::AsyncWith(node) => {
                for item in &node.items {
                    self.visit_expr(&item.context_expr, depth)?;
                    self.visit_opt(item.optional_vars.as_deref(), depth)?;
                }
                self.visit_body(&node.body, depth)
            }
            Stmt::Match(node) => {
                self.visit_expr(&node.subject, depth)?;
                for case in &node.cases {
                    self.visit_pattern(&case.pattern, depth)?;
                    self.visit_opt(case.guard.as_deref(), depth)?;
                    self.visit_body(&case.body, depth)?;
                }
                Ok(())
            }

            Stmt::Raise(node) => {
                self.visit_opt(node.exc.as_deref(), depth)?;
                self.visit_opt(node.cause.as_deref(), depth)
            }
            Stmt::Try(node) => {
                self.visit_body(&node.body, depth)?;
                self.visit_handlers(&node.handlers, depth)?;
                self.visit_body(&node.orelse, depth)?;
                self.visit_body(&node.finalbody, depth)
            }
            Stmt::TryStar(node) => {
                self.visit_body(&node.body, depth)?;
                self.visit_handlers(&node.handlers, depth)?;
                self.visit_body(&node.orelse, depth)?;
                self.visit_body(&node.finalbody, depth)
            }
            Stmt::Assert(node) => {
                self.visit_expr(&node.test, depth)?;
                self.visit_opt(node.msg.as_deref(), depth)
            }
            Stmt::Expr(node) => self.visit_expr(&node.value, depth),

            Stmt::Global(_)
            | Stmt::Nonlocal(_)
            | Stmt::Pass(_)
            | Stmt::Break(_)
            | Stmt::Continue(_) => Ok(()),
        }
    }

    fn visit_type_params(
        &self,
        params: &[ast::TypeParam],
        depth: usize,
    ) -> Result<(), Violation> {
        for param in params {
            match param {
                ast::TypeParam::TypeVar(var) => self.visit_opt(var.bound.as_deref(), depth)?,
                ast::TypeParam::ParamSpec(_) | ast::TypeParam::TypeVarTuple(_) => {}
            }
        }
        Ok(())
    }

    fn visit_handlers(
        &self,
        handlers: &[ast::ExceptHandler],
        depth: usize,
    ) -> Result<(), Violation> {
        for handler in handlers {
            let ast::ExceptHandler::ExceptHandler(handler) = handler;
            self.visit_opt(handler.type_.as_deref(), depth)?;
            self.visit_body(&handler.body, depth)?;
        }
        Ok(())
    }

    fn visit_arguments(&self, args: &ast::Arguments, depth: usize) -> Result<(), Violation> {
        let with_defaults = args
            .posonlyargs
            .iter()
            .chain(&args.args)
            .chain(&args.kwonlyargs);
        for arg in with_defaults {
            self.visit_opt(arg.def.annotation.as_deref(), depth)?;
            self.visit_opt(arg.default.as_deref(), depth)?;
        }
        for arg in args.vararg.iter().chain(&args.kwarg) {
            self.visit_opt(arg.annotation.as_deref(), depth)?;
        }
        Ok(())
    }

    fn visit_comprehensions(
        &self,
        generators: &[ast::Comprehension],
        depth: usize,
    ) -> Result<(), Violation> {
        for generator in generators {
            self.visit_expr(&generator.target, depth)?;
            self.visit_expr(&generator.iter, depth)?;
            self.visit_exprs(&generator.ifs, depth)?;
        }
        Ok(())
    }

    fn visit_patterns(&self, patterns: &[ast::Pattern], depth: usize) -> Result<(), Violation> {
        patterns.iter().try_for_each(|p| self.visit_pattern(p, depth))
    }

    fn visit_pattern(&self, pattern: &ast::Pattern, depth: usize) -> Result<(), Violation> {
        let depth = descend(depth)?;
        match pattern {
            ast::Pattern::MatchValue(node) => self.visit_expr(&node.value, depth),
            ast::Pattern::MatchSequence(node) => self.visit_patterns(&node.patterns, depth),
            ast::Pattern::MatchMapping(node) => {
                self.visit_exprs(&node.keys, depth)?;
                self.visit_patterns(&node.patterns, depth)
            }
            ast::Pattern::MatchClass(node) => {
                self.visit_expr(&node.cls, depth)?;
                for attr in &node.kwd_attrs {
                    self.check_attribute(attr.as_str())?;
                }
                self.visit_patterns(&node.patterns, depth)?;
                self.visit_patterns(&node.kwd_patterns, depth)
            }
            ast::Pattern::MatchAs(node) => match node.pattern.as_deref() {
                Some(inner) => self.visit_pattern(inner, depth),
                None => Ok(()),
            },
            ast::Pattern::MatchOr(node) => self.visit_patterns(&node.patterns, depth),
            ast::Pattern::MatchSingleton(_) | ast::Pattern::MatchStar(_) => Ok(()),
        }
    }

    fn visit_expr(&self, expr: &Expr, depth: usize) -> Result<(), Violation> {
        let depth = descend(depth)?;
        match expr {
            Expr::Attribute(node) => {
                self.check_attribute(node.attr.as_str())?;
                self.visit_expr(&node.value, depth)
            }
            Expr::Call(node) => {
                self.check_call(&node.func)?;
                self.visit_expr(&node.func, depth)?;
                self.visit_exprs(&node.args, depth)?;
                self.visit_exprs(node.keywords.iter().map(|k| &k.value), depth)
            }

            Expr::BoolOp(node) => self.visit_exprs(&node.values, depth),
            Expr::NamedExpr(node) => {
                self.visit_expr(&node.target, depth)?;
                self.visit_expr(&node.value, depth)
            }
            Expr::BinOp(node) => {
                self.visit_expr(&node.left, depth)?;
                self.visit_expr(&node.right, depth)
            }
            Expr::UnaryOp(node) => self.visit_expr(&node.operand, depth),
            Expr::Lambda(node) => {
                self.visit_arguments(&node.args, depth)?;
                self.visit_expr(&node.body, depth)
            }
            Expr::IfExp(node) => {
                self.visit_expr(&node.test, depth)?;
                self.visit_expr(&node.body, depth)?;
                self.visit_expr(&node.orelse, depth)
            }
            Expr::Dict(node) => {
                self.visit_exprs(node.keys.iter().flatten(), depth)?;
                self.visit_exprs(&node.values, depth)
            }
            Expr::Set(node) => self.visit_exprs(&node.elts, depth),
            Expr::ListComp(node) => {
                self.visit_expr(&node.elt, depth)?;
                self.visit_comprehensions(&node.generators, depth)
            }
            Expr::SetComp(node) => {
                self.visit_expr(&node.elt, depth)?;
                self.visit_comprehensions(&node.generators, depth)
            }
            Expr::DictComp(node) => {
                self.visit_expr(&node.key, depth)?;
                self.visit_expr(&node.value, depth)?;
                self.visit_comprehensions(&node.generators, depth)
            }
            Expr::GeneratorExp(node) => {
                self.visit_expr(&node.elt, depth)?;
                self.visit_comprehensions(&node.generators, depth)
            }
            Expr::Await(node) => self.visit_expr(&node.value, depth),
            Expr::Yield(node) => self.visit_opt(node.value.as_deref(), depth),
            Expr::YieldFrom(node) => self.visit_expr(&node.value, depth),
            Expr::Compare(node) => {
                self.visit_expr(&node.left, depth)?;
                self.visit_exprs(&node.comparators, depth)
            }
            Expr::FormattedValue(node) => {
                self.visit_expr(&node.value, depth)?;
                self.visit_opt(node.format_spec.as_deref(), depth)
            }
            Expr::JoinedStr(node) => self.visit_exprs(&node.values, depth),
            Expr::Subscript(node) => {
                self.visit_expr(&node.value, depth)?;
                self.visit_expr(&node.slice, depth)
            }
            Expr::Starred(node) => self.visit_expr(&node.value, depth),
            Expr::List(node) => self.visit_exprs(&node.elts, depth),
            Expr::Tuple(node) => self.visit_exprs(&node.elts, depth),
            Expr::Slice(node) => {
                self.visit_opt(node.lower.as_deref(), depth)?;
                self.visit_opt(node.upper.as_deref(), depth)?;
                self.visit_opt(node.step.as_deref(), depth)
            }

            Expr::Name(_) | Expr::Constant(_) => Ok(()),
        }
    }

    fn check_import_from(&self, node: &ast::StmtImportFrom) -> Result<(), Violation> {
        let module = node.module.as_ref().map(|m| m.as_str());

        if node.names.iter().any(|alias| alias.name.as_str() == "*") {
            return Err(Violation::WildcardImport {
                module: module.unwrap_or(".").to_string(),
            });
        }

        let relative = node.level.as_ref().map_or(false, |level| level.to_u32() > 0);
        match module {
            Some(module) if !relative => self.check_module(module),
            _ => Err(Violation::RelativeImport),
        }
    }

    fn check_module(&self, module: &str) -> Result<(), Violation> {
        if self.is_module_allowed(module) {
            Ok(())
        } else {
            Err(Violation::ImportNotAllowed {
                module: module.to_string(),
            })
        }
    }

    fn check_attribute(&self, attr: &str) -> Result<(), Violation> {
        if is_dunder(attr) {
            Err(Violation::DunderAttribute {
                attr: attr.to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn check_call(&self, func: &Expr) -> Result<(), Violation> {
        let name = match func {
            Expr::Name(node) => node.id.as_str(),
            Expr::Attribute(node) => node.attr.as_str(),
            _ => return Ok(()),
        };
        if self.is_call_blocked(name) {
            Err(Violation::BlockedCall {
                name: name.to_string(),
            })
        } else {
            Ok(())
        }
    }
}

/// `__name__`-style identifier.
///
/// Any name both starting and ending with a double underscore counts,
/// so `____` does too.
pub fn is_dunder(name: &str) -> bool {
    name.len() >= 4 && name.starts_with("__") && name.ends_with("__")
}

/// One level deeper in the walk.
fn descend(depth: usize) -> Result<usize, Violation> {
    if depth >= MAX_NESTING_DEPTH {
        Err(Violation::TooDeeplyNested {
            max: MAX_NESTING_DEPTH,
        })
    } else {
        Ok(depth + 1)
    }
}

/// Reject token streams that nest deeper than the walk allows.
///
/// Open brackets plus the operators chained since the last separator on
/// each bracket level bound how deep the parsed expression can get.
/// Flat chains like `a and b and c` are over-counted.
fn check_token_nesting(code: &str) -> Result<(), Violation> {
    let mut levels: Vec<usize> = vec![0];
    let mut depth = 0usize;

    for token in lexer::lex(code, Mode::Module) {
        // Lexical errors are reported by the parser.
        let Ok((tok, _)) = token else {
            break;
        };

        match tok {
            Tok::Lpar | Tok::Lsqb | Tok::Lbrace => {
                if let Some(count) = levels.last_mut() {
                    *count += 1;
                }
                depth += 1;
                levels.push(0);
            }
            Tok::Rpar | Tok::Rsqb | Tok::Rbrace => {
                if levels.len() > 1 {
                    depth -= levels.pop().unwrap_or(0);
                }
            }
            Tok::Comma | Tok::Semi | Tok::Newline | Tok::Equal => {
                if let Some(count) = levels.last_mut() {
                    depth -= *count;
                    *count = 0;
                }
            }
            Tok::Plus
            | Tok::Minus
            | Tok::Star
            | Tok::Slash
            | Tok::DoubleSlash
            | Tok::Percent
            | Tok::DoubleStar
            | Tok::At
            | Tok::Vbar
            | Tok::Amper
            | Tok::CircumFlex
            | Tok::LeftShift
            | Tok::RightShift
            | Tok::Tilde
            | Tok::Dot
            | Tok::Less
            | Tok::Greater
            | Tok::EqEqual
            | Tok::NotEqual
            | Tok::LessEqual
            | Tok::GreaterEqual
            | Tok::ColonEqual
            | Tok::Not
            | Tok::And
            | Tok::Or
            | Tok::If
            | Tok::Else
            | Tok::In
            | Tok::Is
            | Tok::Lambda
            | Tok::Await
            | Tok::Yield => {
                if let Some(count) = levels.last_mut() {
                    *count += 1;
                }
                depth += 1;
            }
            _ => {}
        }

        if depth > MAX_NESTING_DEPTH {
            return Err(Violation::TooDeeplyNested {
                max: MAX_NESTING_DEPTH,
            });
        }
    }
    Ok(())
}

/// 1-based line number of a byte offset.
fn line_of(code: &str, offset: usize) -> usize {
    let end = offset.min(code.len());
    code.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}
