//! Static type checker for KataScript snippets.
//!
//! Validates a parsed [`Program`] and produces a [`TypeTable`] holding the
//! type of every expression and the built-in each library use resolves to.
//!
//! # Checks performed
//!
//! - Name resolution with block scoping, shadowing and redeclaration errors
//! - Annotation resolution and initializer compatibility
//! - Operator operand types (no implicit coercion apart from string `+`)
//! - Built-in and user function arity and argument types
//! - Control-flow context (`break`, `continue`, `return`) and missing returns
//! - Lints: unused variables, unreachable code, loose equality

use std::collections::HashMap;

use kata_types::ast::*;
use kata_types::builtin::{Builtin, GLOBAL_FUNCTIONS, NAMESPACES};
use kata_types::{
    Diagnostic, DiagnosticCode, Diagnostics, Severity, SourceFile, Span, Type, TypeTable,
};

use crate::env::{BindingKind, ScopeKind, TypeEnv};

/// Checked signature of a user function.
#[derive(Debug, Clone)]
struct FnSig {
    params: Vec<Type>,
    ret: Type,
}

/// How a built-in accepts one argument.
enum ArgSpec {
    Of(Type),
    /// Any value that is not `void`.
    Printable,
    /// `number`, `string` or `boolean`.
    Convertible,
}

// ══════════════════════════════════════════════════════════════════════════════
// TypeChecker
// ══════════════════════════════════════════════════════════════════════════════

/// The type checker. Walks the AST and collects diagnostics.
pub struct TypeChecker<'a> {
    env: TypeEnv,
    diagnostics: &'a mut Diagnostics,
    source: &'a SourceFile,
    table: TypeTable,
    functions: HashMap<String, FnSig>,
    /// Function names in declaration order.
    function_order: Vec<String>,
    /// Declared return type of the function being checked.
    return_type: Option<Type>,
    loop_depth: u32,
}

impl<'a> TypeChecker<'a> {
    pub fn new(source: &'a SourceFile, diagnostics: &'a mut Diagnostics) -> Self {
        Self {
            env: TypeEnv::new(),
            diagnostics,
            source,
            table: TypeTable::new(),
            functions: HashMap::new(),
            function_order: Vec::new(),
            return_type: None,
            loop_depth: 0,
        }
    }

    /// Type-check a whole program and return the facts the emitter needs.
    pub fn check(mut self, program: &Program) -> TypeTable {
        let signatures: Vec<FnSig> = program
            .functions()
            .map(|f| self.register_function(f))
            .collect();

        self.check_stmts(program.statements());

        for (func, sig) in program.functions().zip(signatures) {
            self.check_function(func, sig);
        }

        self.pop_scope_and_lint();
        self.table
    }

    // ══════════════════════════════════════════════════════════════════════
    // Declarations
    // ══════════════════════════════════════════════════════════════════════

    /// Functions are hoisted: every signature is known before any body runs.
    fn register_function(&mut self, func: &FunctionDecl) -> FnSig {
        let params = func
            .params
            .iter()
            .map(|p| self.resolve_annotation(&p.type_ann))
            .collect();
        let ret = match &func.ret {
            Some(ann) => self.resolve_annotation(ann),
            None => Type::Void,
        };
        let sig = FnSig { params, ret };

        let name = &func.name.name;
        if self.functions.contains_key(name) {
            self.error(
                DiagnosticCode::ALREADY_DECLARED,
                format!("Duplicate function implementation '{name}'"),
                func.name.span,
            );
        } else {
            self.functions.insert(name.clone(), sig.clone());
            self.function_order.push(name.clone());
        }
        sig
    }

    fn check_function(&mut self, func: &FunctionDecl, sig: FnSig) {
        self.env.push_scope(ScopeKind::Function);
        for (param, ty) in func.params.iter().zip(&sig.params) {
            if !self.env.define(
                &param.name.name,
                ty.clone(),
                BindingKind::Parameter,
                param.name.span,
            ) {
                self.error(
                    DiagnosticCode::ALREADY_DECLARED,
                    format!("Duplicate identifier '{}'", param.name.name),
                    param.name.span,
                );
            }
        }

        self.return_type = Some(sig.ret.clone());
        self.loop_depth = 0;
        self.check_stmts(&func.body.stmts);

        if sig.ret != Type::Void && !sig.ret.is_unknown() && !block_always_exits(&func.body) {
            let span = func.ret.as_ref().map_or(func.name.span, |r| r.span);
            self.error_with_suggestion(
                DiagnosticCode::MISSING_RETURN,
                "Function lacks ending return statement and return type does not include 'undefined'",
                span,
                format!("Add a 'return' at the end of '{}'", func.name.name),
            );
        }

        self.return_type = None;
        self.pop_scope_and_lint();
    }

    fn resolve_annotation(&mut self, ann: &TypeAnnotation) -> Type {
        match &ann.kind {
            TypeKind::Number => Type::Number,
            TypeKind::String => Type::String,
            TypeKind::Boolean => Type::Boolean,
            TypeKind::Void => Type::Void,
            TypeKind::Error => Type::Error,
            TypeKind::Array(inner) => match self.resolve_annotation(inner) {
                Type::Void => {
                    self.error(
                        DiagnosticCode::UNKNOWN_TYPE,
                        "Arrays cannot hold 'void'",
                        inner.span,
                    );
                    Type::array_of(Type::Unknown)
                }
                elem => Type::array_of(elem),
            },
            // Already reported as a missing parameter annotation.
            TypeKind::Named(name) if name.is_empty() => Type::Unknown,
            TypeKind::Named(name) => {
                self.error(
                    DiagnosticCode::UNKNOWN_TYPE,
                    format!("Cannot find name '{name}'"),
                    ann.span,
                );
                Type::Unknown
            }
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Statements
    // ══════════════════════════════════════════════════════════════════════

    /// Check a statement sequence, flagging the first statement that can
    /// never run.
    fn check_stmts<'s>(&mut self, stmts: impl IntoIterator<Item = &'s Stmt>) {
        let mut terminated = false;
        let mut warned = false;
        for stmt in stmts {
            if terminated && !warned {
                self.warning(
                    DiagnosticCode::UNREACHABLE_CODE,
                    "Unreachable code detected",
                    stmt.span(),
                );
                warned = true;
            }
            self.check_stmt(stmt);
            if matches!(stmt, Stmt::Break(_) | Stmt::Continue(_)) || always_exits(stmt) {
                terminated = true;
            }
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let(s) => self.check_let(s),
            Stmt::Assign(s) => self.check_assign(s),
            Stmt::If(s) => {
                self.check_condition(&s.condition);
                self.check_nested(&s.then_branch);
                if let Some(else_branch) = &s.else_branch {
                    self.check_nested(else_branch);
                }
            }
            Stmt::While(s) => {
                self.check_condition(&s.condition);
                self.check_loop_body(&s.body);
            }
            Stmt::DoWhile(s) => {
                self.check_loop_body(&s.body);
                self.check_condition(&s.condition);
            }
            Stmt::For(s) => {
                self.env.push_scope(ScopeKind::Block);
                if let Some(init) = &s.init {
                    self.check_stmt(init);
                }
                if let Some(condition) = &s.condition {
                    self.check_condition(condition);
                }
                self.check_loop_body(&s.body);
                if let Some(update) = &s.update {
                    self.check_stmt(update);
                }
                self.pop_scope_and_lint();
            }
            Stmt::ForOf(s) => self.check_for_of(s),
            Stmt::Break(span) => self.check_loop_exit("break", *span),
            Stmt::Continue(span) => self.check_loop_exit("continue", *span),
            Stmt::Return(s) => self.check_return(s),
            Stmt::Throw(s) => {
                let ty = self.check_expr(&s.value, None);
                if ty == Type::Void {
                    self.void_used(s.value.span);
                }
            }
            Stmt::Block(b) => self.check_block(b),
            Stmt::Expr(s) => {
                self.check_expr(&s.expr, None);
            }
        }
    }

    fn check_block(&mut self, block: &Block) {
        self.env.push_scope(ScopeKind::Block);
        self.check_stmts(&block.stmts);
        self.pop_scope_and_lint();
    }

    /// A branch or loop body: a block, or a single statement in its own scope.
    fn check_nested(&mut self, stmt: &Stmt) {
        if let Stmt::Block(b) = stmt {
            self.check_block(b);
        } else {
            self.env.push_scope(ScopeKind::Block);
            self.check_stmt(stmt);
            self.pop_scope_and_lint();
        }
    }

    fn check_loop_body(&mut self, body: &Stmt) {
        self.loop_depth += 1;
        self.check_nested(body);
        self.loop_depth -= 1;
    }

    fn check_loop_exit(&mut self, keyword: &str, span: Span) {
        if self.loop_depth == 0 {
            self.error(
                DiagnosticCode::BREAK_OUTSIDE_LOOP,
                format!(
                    "A '{keyword}' statement can only be used within an enclosing iteration statement"
                ),
                span,
            );
        }
    }

    fn check_let(&mut self, stmt: &LetStmt) {
        let name = &stmt.name.name;
        let declared = match &stmt.type_ann {
            Some(ann) => match self.resolve_annotation(ann) {
                Type::Void => {
                    self.error(
                        DiagnosticCode::TYPE_MISMATCH,
                        format!("Variable '{name}' cannot have type 'void'"),
                        ann.span,
                    );
                    Some(Type::Unknown)
                }
                ty => Some(ty),
            },
            None => None,
        };

        let init = stmt
            .init
            .as_ref()
            .map(|e| (self.check_expr(e, declared.as_ref()), e.span));

        let ty = match (declared, init) {
            (_, Some((Type::Void, span))) => {
                self.void_used(span);
                Type::Unknown
            }
            (Some(declared), Some((init_ty, span))) => {
                if !init_ty.compatible(&declared) {
                    self.mismatch(&init_ty, &declared, span);
                }
                declared
            }
            (Some(declared), None) => {
                if stmt.kind == DeclKind::Const {
                    self.const_without_init(stmt);
                }
                declared
            }
            (None, Some((init_ty, _))) => init_ty,
            (None, None) => {
                if stmt.kind == DeclKind::Const {
                    self.const_without_init(stmt);
                } else {
                    self.error_with_suggestion(
                        DiagnosticCode::MISSING_ANNOTATION,
                        format!("Variable '{name}' needs a type annotation or an initial value"),
                        stmt.name.span,
                        format!("Write 'let {name}: number' or 'let {name} = 0'"),
                    );
                }
                Type::Unknown
            }
        };

        let kind = match stmt.kind {
            DeclKind::Let => BindingKind::Let,
            DeclKind::Const => BindingKind::Const,
        };
        self.declare(&stmt.name, ty, kind);
    }

    fn declare(&mut self, name: &Ident, ty: Type, kind: BindingKind) {
        if self.env.at_root() && self.functions.contains_key(&name.name) {
            self.error(
                DiagnosticCode::ALREADY_DECLARED,
                format!("Duplicate identifier '{}'", name.name),
                name.span,
            );
            return;
        }
        if !self.env.define(&name.name, ty, kind, name.span) {
            self.error(
                DiagnosticCode::ALREADY_DECLARED,
                format!("Cannot redeclare block-scoped variable '{}'", name.name),
                name.span,
            );
        }
    }

    fn const_without_init(&mut self, stmt: &LetStmt) {
        self.error(
            DiagnosticCode::CONST_WITHOUT_INIT,
            "'const' declarations must be initialized",
            stmt.name.span,
        );
    }

    fn check_assign(&mut self, stmt: &AssignStmt) {
        let target_ty = match &stmt.target {
            AssignTarget::Variable(ident) => self.check_assign_variable(ident, stmt.op),
            AssignTarget::Index { object, index } => {
                let object_ty = self.check_expr(object, None);
                self.check_index_type(index);
                match object_ty {
                    Type::Array(elem) => *elem,
                    Type::String => {
                        self.error(
                            DiagnosticCode::TYPE_MISMATCH,
                            "Index signature in type 'string' only permits reading",
                            stmt.span,
                        );
                        Type::Unknown
                    }
                    Type::Unknown => Type::Unknown,
                    other => {
                        self.not_indexable(&other, object.span);
                        Type::Unknown
                    }
                }
            }
        };

        match stmt.op {
            AssignOp::Assign => {
                let value_ty = self.check_expr(&stmt.value, Some(&target_ty));
                if value_ty == Type::Void {
                    self.void_used(stmt.value.span);
                } else if !value_ty.compatible(&target_ty) {
                    self.mismatch(&value_ty, &target_ty, stmt.value.span);
                }
            }
            AssignOp::Compound(op) => {
                let value_ty = self.check_expr(&stmt.value, None);
                let target_span = match &stmt.target {
                    AssignTarget::Variable(ident) => ident.span,
                    AssignTarget::Index { object, .. } => object.span,
                };
                let result =
                    self.binary_result(op, &target_ty, &value_ty, target_span, stmt.value.span);
                if !result.compatible(&target_ty) {
                    self.mismatch(&result, &target_ty, stmt.span);
                }
            }
        }
    }

    fn check_assign_variable(&mut self, ident: &Ident, op: AssignOp) -> Type {
        // Only compound assignment reads the old value.
        let binding = match op {
            AssignOp::Assign => self.env.lookup(&ident.name).cloned(),
            AssignOp::Compound(_) => self.env.resolve(&ident.name).cloned(),
        };
        match binding {
            Some(binding) => {
                if binding.kind == BindingKind::Const {
                    self.error(
                        DiagnosticCode::ASSIGN_TO_CONST,
                        format!("Cannot assign to '{}' because it is a constant", ident.name),
                        ident.span,
                    );
                }
                binding.ty
            }
            None => {
                self.unknown_name(&ident.name, ident.span);
                Type::Unknown
            }
        }
    }

    fn check_for_of(&mut self, stmt: &ForOfStmt) {
        let iterable_ty = self.check_expr(&stmt.iterable, None);
        let elem = match iterable_ty {
            Type::Array(elem) => *elem,
            Type::String => Type::String,
            Type::Unknown => Type::Unknown,
            other => {
                self.error(
                    DiagnosticCode::TYPE_MISMATCH,
                    format!("Type '{other}' is not an array or a string"),
                    stmt.iterable.span,
                );
                Type::Unknown
            }
        };

        self.env.push_scope(ScopeKind::Block);
        let kind = match stmt.kind {
            DeclKind::Let => BindingKind::Let,
            DeclKind::Const => BindingKind::Const,
        };
        self.declare(&stmt.binding, elem, kind);
        self.check_loop_body(&stmt.body);
        self.pop_scope_and_lint();
    }

    fn check_return(&mut self, stmt: &ReturnStmt) {
        let Some(expected) = self.return_type.clone() else {
            if let Some(value) = &stmt.value {
                self.check_expr(value, None);
            }
            self.error(
                DiagnosticCode::RETURN_OUTSIDE_FUNCTION,
                "A 'return' statement can only be used within a function body",
                stmt.span,
            );
            return;
        };

        match &stmt.value {
            Some(value) => {
                let ty = self.check_expr(value, Some(&expected));
                if ty == Type::Void && expected == Type::Void {
                    return;
                }
                if ty == Type::Void {
                    self.void_used(value.span);
                } else if !ty.compatible(&expected) {
                    self.mismatch(&ty, &expected, value.span);
                }
            }
            None => {
                if expected != Type::Void && !expected.is_unknown() {
                    self.error(
                        DiagnosticCode::TYPE_MISMATCH,
                        format!("A function whose declared type is '{expected}' must return a value"),
                        stmt.span,
                    );
                }
            }
        }
    }

    fn check_condition(&mut self, expr: &Expr) {
        let ty = self.check_expr(expr, None);
        if !ty.compatible(&Type::Boolean) {
            self.error_with_suggestion(
                DiagnosticCode::TYPE_MISMATCH,
                format!("Condition must be of type 'boolean', got '{ty}'"),
                expr.span,
                "Compare explicitly, like 'x !== 0'",
            );
        }
    }

    fn pop_scope_and_lint(&mut self) {
        for binding in self.env.pop_scope() {
            if !binding.used
                && binding.kind != BindingKind::Parameter
                && !binding.name.starts_with('_')
            {
                self.warning(
                    DiagnosticCode::UNUSED_VARIABLE,
                    format!("'{}' is declared but its value is never read", binding.name),
                    binding.span,
                );
            }
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expressions
    // ══════════════════════════════════════════════════════════════════════

    /// Check an expression and record its type. `expected` only guides
    /// empty array literals; compatibility is checked by the caller.
    fn check_expr(&mut self, expr: &Expr, expected: Option<&Type>) -> Type {
        let ty = self.check_expr_kind(expr, expected);
        self.table.record(expr.id, ty.clone());
        ty
    }

    fn check_expr_kind(&mut self, expr: &Expr, expected: Option<&Type>) -> Type {
        match &expr.kind {
            ExprKind::NumberLit(_) => Type::Number,
            ExprKind::StringLit(_) => Type::String,
            ExprKind::BoolLit(_) => Type::Boolean,
            ExprKind::Template(parts) => {
                for part in parts {
                    if let TemplatePart::Expr(e) = part {
                        if self.check_expr(e, None) == Type::Void {
                            self.void_used(e.span);
                        }
                    }
                }
                Type::String
            }
            ExprKind::ArrayLit(items) => self.check_array_literal(items, expected, expr.span),
            ExprKind::Identifier(name) => self.check_identifier(expr, name),
            ExprKind::Call { callee, args } => self.check_call(expr, callee, args),
            ExprKind::Member { object, property } => self.check_member(expr, object, property),
            ExprKind::MethodCall {
                object,
                method,
                args,
            } => self.check_method_call(expr, object, method, args),
            ExprKind::Index { object, index } => {
                let object_ty = self.check_expr(object, None);
                self.check_index_type(index);
                match object_ty {
                    Type::Array(elem) => *elem,
                    Type::String => Type::String,
                    Type::Unknown => Type::Unknown,
                    other => {
                        self.not_indexable(&other, object.span);
                        Type::Unknown
                    }
                }
            }
            ExprKind::NewError { args } => {
                self.check_builtin_args(args, &[ArgSpec::Of(Type::String)], 0, expr.span);
                Type::Error
            }
            ExprKind::Binary { left, op, right } => {
                let left_ty = self.check_expr(left, None);
                let right_ty = self.check_expr(right, None);
                if left_ty == Type::Void {
                    self.void_used(left.span);
                    return Type::Unknown;
                }
                if right_ty == Type::Void {
                    self.void_used(right.span);
                    return Type::Unknown;
                }
                if *op == BinOp::LooseEq || *op == BinOp::LooseNe {
                    let strict = if *op == BinOp::LooseEq { "===" } else { "!==" };
                    self.warning_with_suggestion(
                        DiagnosticCode::LOOSE_EQUALITY,
                        format!("Use '{strict}' instead of '{}'", op.as_str()),
                        expr.span,
                        format!("Replace '{}' with '{strict}'", op.as_str()),
                    );
                }
                self.binary_result(*op, &left_ty, &right_ty, left.span, right.span)
            }
            ExprKind::Unary { op, operand } => self.check_unary(*op, operand),
            ExprKind::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                self.check_condition(condition);
                let then_ty = self.check_expr(then_expr, expected);
                let else_ty = self.check_expr(else_expr, expected.or(Some(&then_ty)));
                if !then_ty.compatible(&else_ty) {
                    self.error(
                        DiagnosticCode::TYPE_MISMATCH,
                        format!(
                            "Conditional branches have different types '{then_ty}' and '{else_ty}'"
                        ),
                        expr.span,
                    );
                    return Type::Unknown;
                }
                if then_ty.is_unknown() {
                    else_ty
                } else {
                    then_ty
                }
            }
            ExprKind::Paren(inner) => self.check_expr(inner, expected),
        }
    }

    fn check_array_literal(&mut self, items: &[Expr], expected: Option<&Type>, span: Span) -> Type {
        let expected_elem = expected.and_then(Type::element);
        let Some((first, rest)) = items.split_first() else {
            return match expected {
                Some(ty @ Type::Array(_)) => ty.clone(),
                Some(Type::Unknown) => Type::Unknown,
                _ => {
                    self.error_with_suggestion(
                        DiagnosticCode::EMPTY_ARRAY_NEEDS_TYPE,
                        "Empty array needs a type annotation",
                        span,
                        "Declare the element type, like 'let xs: number[] = []'",
                    );
                    Type::array_of(Type::Unknown)
                }
            };
        };

        let first_ty = self.check_element(first, expected_elem);
        let elem_ty = match (first_ty.is_unknown(), expected_elem) {
            (true, Some(e)) => e.clone(),
            _ => first_ty,
        };
        for item in rest {
            let ty = self.check_element(item, Some(&elem_ty));
            if !ty.compatible(&elem_ty) {
                self.mismatch(&ty, &elem_ty, item.span);
            }
        }
        Type::array_of(elem_ty)
    }

    fn check_element(&mut self, item: &Expr, expected: Option<&Type>) -> Type {
        match self.check_expr(item, expected) {
            Type::Void => {
                self.void_used(item.span);
                Type::Unknown
            }
            ty => ty,
        }
    }

    fn check_identifier(&mut self, expr: &Expr, name: &str) -> Type {
        if let Some(binding) = self.env.resolve(name) {
            return binding.ty.clone();
        }
        if let Some(builtin) = Builtin::global_constant(name) {
            self.table.record_builtin(expr.id, builtin);
            return Type::Number;
        }
        if self.functions.contains_key(name) || GLOBAL_FUNCTIONS.contains(&name) {
            self.error_with_suggestion(
                DiagnosticCode::TYPE_MISMATCH,
                format!("Function '{name}' cannot be used as a value"),
                expr.span,
                format!("Call it, like '{name}(...)'"),
            );
            return Type::Unknown;
        }
        if NAMESPACES.contains(&name) {
            self.error(
                DiagnosticCode::TYPE_MISMATCH,
                format!("'{name}' cannot be used as a value"),
                expr.span,
            );
            return Type::Unknown;
        }
        self.unknown_name(name, expr.span);
        Type::Unknown
    }

    fn check_call(&mut self, expr: &Expr, callee: &Ident, args: &[Expr]) -> Type {
        let name = callee.name.as_str();
        if let Some(binding) = self.env.resolve(name) {
            let ty = binding.ty.clone();
            self.check_values(args);
            if !ty.is_unknown() {
                self.not_callable(&ty, callee.span);
            }
            return Type::Unknown;
        }

        if let Some(sig) = self.functions.get(name).cloned() {
            if args.len() != sig.params.len() {
                self.wrong_arg_count(sig.params.len(), sig.params.len(), args.len(), expr.span);
                self.check_values(args);
            } else {
                for (arg, param) in args.iter().zip(&sig.params) {
                    self.check_arg(arg, &ArgSpec::Of(param.clone()));
                }
            }
            return sig.ret;
        }

        if let Some(builtin) = Builtin::global_function(name) {
            self.table.record_builtin(expr.id, builtin);
            return self.check_builtin(builtin, None, args, expr.span);
        }

        self.check_values(args);
        self.unknown_name(name, callee.span);
        Type::Unknown
    }

    /// `console`/`Math` are namespaces unless a variable shadows them.
    fn namespace_of<'e>(&self, object: &'e Expr) -> Option<&'e str> {
        match &object.kind {
            ExprKind::Identifier(name)
                if NAMESPACES.contains(&name.as_str()) && self.env.lookup(name).is_none() =>
            {
                Some(name)
            }
            _ => None,
        }
    }

    fn check_member(&mut self, expr: &Expr, object: &Expr, property: &Ident) -> Type {
        let name = property.name.as_str();
        if let Some(namespace) = self.namespace_of(object) {
            return match Builtin::namespace_member(namespace, name) {
                Some(builtin) if builtin.is_property() => {
                    self.table.record_builtin(expr.id, builtin);
                    Type::Number
                }
                Some(_) => {
                    self.method_as_property(&format!("{namespace}.{name}"), property.span);
                    Type::Unknown
                }
                None => {
                    self.error(
                        DiagnosticCode::UNKNOWN_PROPERTY,
                        format!("Property '{name}' does not exist on '{namespace}'"),
                        property.span,
                    );
                    Type::Unknown
                }
            };
        }

        let object_ty = self.check_expr(object, None);
        if object_ty.is_unknown() && !matches!(object_ty, Type::Array(_)) {
            return Type::Unknown;
        }
        if let Some(builtin) = Builtin::property(&object_ty, name) {
            self.table.record_builtin(expr.id, builtin);
            return match builtin {
                Builtin::ErrMessage => Type::String,
                _ => Type::Number,
            };
        }
        if Builtin::method(&object_ty, name).is_some() {
            self.method_as_property(name, property.span);
        } else {
            self.unknown_property(name, &object_ty, property.span);
        }
        Type::Unknown
    }

    fn check_method_call(
        &mut self,
        expr: &Expr,
        object: &Expr,
        method: &Ident,
        args: &[Expr],
    ) -> Type {
        let name = method.name.as_str();
        if let Some(namespace) = self.namespace_of(object) {
            return match Builtin::namespace_member(namespace, name) {
                Some(builtin) if !builtin.is_property() => {
                    self.table.record_builtin(expr.id, builtin);
                    self.check_builtin(builtin, None, args, expr.span)
                }
                Some(_) => {
                    self.check_values(args);
                    self.not_callable(&Type::Number, method.span);
                    Type::Unknown
                }
                None => {
                    self.check_values(args);
                    self.error(
                        DiagnosticCode::UNKNOWN_PROPERTY,
                        format!("Property '{name}' does not exist on '{namespace}'"),
                        method.span,
                    );
                    Type::Unknown
                }
            };
        }

        let object_ty = self.check_expr(object, None);
        if object_ty == Type::Unknown {
            self.check_values(args);
            return Type::Unknown;
        }
        if let Some(builtin) = Builtin::method(&object_ty, name) {
            self.table.record_builtin(expr.id, builtin);
            return self.check_builtin(builtin, Some(&object_ty), args, expr.span);
        }

        self.check_values(args);
        if let Some(builtin) = Builtin::property(&object_ty, name) {
            let ty = match builtin {
                Builtin::ErrMessage => Type::String,
                _ => Type::Number,
            };
            self.not_callable(&ty, method.span);
        } else {
            self.unknown_property(name, &object_ty, method.span);
        }
        Type::Unknown
    }

    fn check_index_type(&mut self, index: &Expr) {
        let ty = self.check_expr(index, None);
        if !ty.compatible(&Type::Number) {
            self.error(
                DiagnosticCode::TYPE_MISMATCH,
                format!("Type '{ty}' cannot be used as an index type"),
                index.span,
            );
        }
    }

    fn check_unary(&mut self, op: UnaryOp, operand: &Expr) -> Type {
        let ty = self.check_expr(operand, None);
        if ty == Type::Void {
            self.void_used(operand.span);
            return Type::Unknown;
        }
        match op {
            UnaryOp::Not => {
                if !ty.compatible(&Type::Boolean) {
                    self.error(
                        DiagnosticCode::INVALID_OPERANDS,
                        format!("Operator '!' requires a boolean operand, got '{ty}'"),
                        operand.span,
                    );
                }
                Type::Boolean
            }
            UnaryOp::Neg => {
                if !ty.compatible(&Type::Number) {
                    self.error(
                        DiagnosticCode::INVALID_OPERANDS,
                        format!("The operand of '-' must be of type 'number', got '{ty}'"),
                        operand.span,
                    );
                }
                Type::Number
            }
            UnaryOp::Plus => {
                if !matches!(
                    ty,
                    Type::Number | Type::String | Type::Boolean | Type::Unknown
                ) {
                    self.error(
                        DiagnosticCode::INVALID_OPERANDS,
                        format!("Type '{ty}' cannot be converted to a number"),
                        operand.span,
                    );
                }
                Type::Number
            }
        }
    }

    /// The type of `left op right`, reporting invalid operand types.
    fn binary_result(
        &mut self,
        op: BinOp,
        left: &Type,
        right: &Type,
        left_span: Span,
        right_span: Span,
    ) -> Type {
        let span = left_span.merge(right_span);
        match op {
            BinOp::Add => match (left, right) {
                (Type::Number, Type::Number) => Type::Number,
                (Type::String, _) | (_, Type::String) => Type::String,
                (Type::Unknown, _) | (_, Type::Unknown) => Type::Unknown,
                _ => {
                    self.invalid_operands(op, left, right, span);
                    Type::Unknown
                }
            },
            BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem | BinOp::Pow => {
                if !left.compatible(&Type::Number) {
                    self.error(
                        DiagnosticCode::INVALID_OPERANDS,
                        format!(
                            "The left-hand side of an arithmetic operation must be of type 'number', got '{left}'"
                        ),
                        left_span,
                    );
                }
                if !right.compatible(&Type::Number) {
                    self.error(
                        DiagnosticCode::INVALID_OPERANDS,
                        format!(
                            "The right-hand side of an arithmetic operation must be of type 'number', got '{right}'"
                        ),
                        right_span,
                    );
                }
                Type::Number
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                match (left, right) {
                    (Type::Number, Type::Number)
                    | (Type::String, Type::String)
                    | (Type::Unknown, _)
                    | (_, Type::Unknown) => {}
                    _ => self.invalid_operands(op, left, right, span),
                }
                Type::Boolean
            }
            BinOp::StrictEq | BinOp::StrictNe | BinOp::LooseEq | BinOp::LooseNe => {
                if !left.compatible(right) {
                    self.error(
                        DiagnosticCode::TYPE_MISMATCH,
                        format!(
                            "This comparison appears to be unintentional because the types '{left}' and '{right}' have no overlap"
                        ),
                        span,
                    );
                }
                Type::Boolean
            }
            BinOp::And | BinOp::Or => {
                for (ty, side_span) in [(left, left_span), (right, right_span)] {
                    if !ty.compatible(&Type::Boolean) {
                        self.error(
                            DiagnosticCode::INVALID_OPERANDS,
                            format!("Operator '{}' requires boolean operands, got '{ty}'", op.as_str()),
                            side_span,
                        );
                    }
                }
                Type::Boolean
            }
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Built-ins
    // ══════════════════════════════════════════════════════════════════════

    fn check_builtin(
        &mut self,
        builtin: Builtin,
        receiver: Option<&Type>,
        args: &[Expr],
        span: Span,
    ) -> Type {
        use ArgSpec::{Convertible, Of, Printable};
        let receiver_ty = receiver.cloned().unwrap_or(Type::Unknown);
        let elem = receiver_ty.element().cloned().unwrap_or(Type::Unknown);
        let number = || Of(Type::Number);
        let string = || Of(Type::String);

        match builtin {
            Builtin::Print | Builtin::Console(_) => {
                self.check_variadic(args, &Printable, 0, span);
                Type::Void
            }
            Builtin::StringOf => {
                self.check_builtin_args(args, &[Printable], 1, span);
                Type::String
            }
            Builtin::NumberOf => {
                self.check_builtin_args(args, &[Convertible], 1, span);
                Type::Number
            }
            Builtin::IsNaN => {
                self.check_builtin_args(args, &[number()], 1, span);
                Type::Boolean
            }
            Builtin::ParseInt => {
                self.check_builtin_args(args, &[string()], 1, span);
                Type::Number
            }
            Builtin::MathFloor
            | Builtin::MathCeil
            | Builtin::MathRound
            | Builtin::MathTrunc
            | Builtin::MathAbs
            | Builtin::MathSqrt
            | Builtin::MathSign => {
                self.check_builtin_args(args, &[number()], 1, span);
                Type::Number
            }
            Builtin::MathMin | Builtin::MathMax => {
                self.check_variadic(args, &number(), 0, span);
                Type::Number
            }
            Builtin::MathPow => {
                self.check_builtin_args(args, &[number(), number()], 2, span);
                Type::Number
            }
            Builtin::StrUpper
            | Builtin::StrLower
            | Builtin::StrTrim
            | Builtin::StrToString
            | Builtin::NumToString
            | Builtin::BoolToString
            | Builtin::ArrToString
            | Builtin::ErrToString => {
                self.check_builtin_args(args, &[], 0, span);
                Type::String
            }
            Builtin::StrIncludes | Builtin::StrStartsWith | Builtin::StrEndsWith => {
                self.check_builtin_args(args, &[string()], 1, span);
                Type::Boolean
            }
            Builtin::StrIndexOf => {
                self.check_builtin_args(args, &[string()], 1, span);
                Type::Number
            }
            Builtin::StrRepeat | Builtin::StrCharAt => {
                self.check_builtin_args(args, &[number()], 1, span);
                Type::String
            }
            Builtin::StrSlice => {
                self.check_builtin_args(args, &[number(), number()], 1, span);
                Type::String
            }
            Builtin::StrSplit => {
                self.check_builtin_args(args, &[string()], 1, span);
                Type::array_of(Type::String)
            }
            Builtin::NumToFixed => {
                self.check_builtin_args(args, &[number()], 0, span);
                Type::String
            }
            Builtin::ArrPush => {
                self.check_variadic(args, &Of(elem), 1, span);
                Type::Number
            }
            Builtin::ArrPop => {
                self.check_builtin_args(args, &[], 0, span);
                elem
            }
            Builtin::ArrJoin => {
                self.check_builtin_args(args, &[string()], 0, span);
                Type::String
            }
            Builtin::ArrIncludes => {
                self.check_builtin_args(args, &[Of(elem)], 1, span);
                Type::Boolean
            }
            Builtin::ArrIndexOf => {
                self.check_builtin_args(args, &[Of(elem)], 1, span);
                Type::Number
            }
            Builtin::ArrReverse => {
                self.check_builtin_args(args, &[], 0, span);
                receiver_ty
            }
            Builtin::ArrSlice => {
                self.check_builtin_args(args, &[number(), number()], 0, span);
                receiver_ty
            }
            // Property built-ins are never called; `check_method_call`
            // routes them to a not-callable error first.
            Builtin::NaN
            | Builtin::Infinity
            | Builtin::MathPi
            | Builtin::MathE
            | Builtin::StrLength
            | Builtin::ArrLength
            | Builtin::ErrMessage => {
                self.check_values(args);
                Type::Unknown
            }
        }
    }

    /// Fixed parameters; the first `required` are mandatory.
    fn check_builtin_args(&mut self, args: &[Expr], params: &[ArgSpec], required: usize, span: Span) {
        if args.len() < required || args.len() > params.len() {
            self.wrong_arg_count(required, params.len(), args.len(), span);
            self.check_values(args);
            return;
        }
        for (arg, spec) in args.iter().zip(params) {
            self.check_arg(arg, spec);
        }
    }

    fn check_variadic(&mut self, args: &[Expr], each: &ArgSpec, required: usize, span: Span) {
        if args.len() < required {
            self.error(
                DiagnosticCode::WRONG_ARG_COUNT,
                format!(
                    "Expected at least {required} {}, but got {}",
                    plural_args(required),
                    args.len()
                ),
                span,
            );
        }
        for arg in args {
            self.check_arg(arg, each);
        }
    }

    fn check_arg(&mut self, arg: &Expr, spec: &ArgSpec) {
        let expected = match spec {
            ArgSpec::Of(ty) => Some(ty),
            _ => None,
        };
        let ty = self.check_expr(arg, expected);
        if ty == Type::Void {
            self.void_used(arg.span);
            return;
        }
        let ok = match spec {
            ArgSpec::Of(expected) => ty.compatible(expected),
            ArgSpec::Printable => true,
            ArgSpec::Convertible => matches!(
                ty,
                Type::Number | Type::String | Type::Boolean | Type::Unknown
            ),
        };
        if !ok {
            let param = match spec {
                ArgSpec::Of(expected) => expected.to_string(),
                _ => "string | number | boolean".to_string(),
            };
            self.error(
                DiagnosticCode::TYPE_MISMATCH,
                format!("Argument of type '{ty}' is not assignable to parameter of type '{param}'"),
                arg.span,
            );
        }
    }

    /// Record types for arguments whose call is already known to be wrong.
    fn check_values(&mut self, args: &[Expr]) {
        for arg in args {
            self.check_expr(arg, None);
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Reporting
    // ══════════════════════════════════════════════════════════════════════

    fn unknown_name(&mut self, name: &str, span: Span) {
        let message = format!("Cannot find name '{name}'");
        match self.similar_name(name) {
            Some(candidate) => self.error_with_suggestion(
                DiagnosticCode::UNKNOWN_NAME,
                message,
                span,
                format!("Did you mean '{candidate}'?"),
            ),
            None => self.error(DiagnosticCode::UNKNOWN_NAME, message, span),
        }
    }

    /// The closest visible name within two edits, if any.
    fn similar_name(&self, name: &str) -> Option<String> {
        let candidates = self
            .env
            .visible_names()
            .chain(self.function_order.iter().map(String::as_str))
            .chain(NAMESPACES.iter().copied())
            .chain(GLOBAL_FUNCTIONS.iter().copied());

        let mut best: Option<(usize, &str)> = None;
        for candidate in candidates {
            let distance = edit_distance(name, candidate);
            if distance == 0 || distance > 2 || distance >= name.chars().count() {
                continue;
            }
            if best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, candidate));
            }
        }
        best.map(|(_, candidate)| candidate.to_string())
    }

    fn unknown_property(&mut self, name: &str, ty: &Type, span: Span) {
        self.error(
            DiagnosticCode::UNKNOWN_PROPERTY,
            format!("Property '{name}' does not exist on type '{ty}'"),
            span,
        );
    }

    fn method_as_property(&mut self, name: &str, span: Span) {
        self.error_with_suggestion(
            DiagnosticCode::TYPE_MISMATCH,
            format!("'{name}' is a method and must be called"),
            span,
            format!("Call it, like '{name}()'"),
        );
    }

    fn not_callable(&mut self, ty: &Type, span: Span) {
        self.error(
            DiagnosticCode::NOT_CALLABLE,
            format!("This expression is not callable. Type '{ty}' has no call signatures"),
            span,
        );
    }

    fn not_indexable(&mut self, ty: &Type, span: Span) {
        self.error(
            DiagnosticCode::TYPE_MISMATCH,
            format!("Type '{ty}' cannot be indexed"),
            span,
        );
    }

    fn wrong_arg_count(&mut self, min: usize, max: usize, got: usize, span: Span) {
        let expected = if min == max {
            format!("{min} {}", plural_args(min))
        } else {
            format!("{min}-{max} arguments")
        };
        self.error(
            DiagnosticCode::WRONG_ARG_COUNT,
            format!("Expected {expected}, but got {got}"),
            span,
        );
    }

    fn mismatch(&mut self, actual: &Type, expected: &Type, span: Span) {
        self.error(
            DiagnosticCode::TYPE_MISMATCH,
            format!("Type '{actual}' is not assignable to type '{expected}'"),
            span,
        );
    }

    fn invalid_operands(&mut self, op: BinOp, left: &Type, right: &Type, span: Span) {
        self.error(
            DiagnosticCode::INVALID_OPERANDS,
            format!(
                "Operator '{}' cannot be applied to types '{left}' and '{right}'",
                op.as_str()
            ),
            span,
        );
    }

    fn void_used(&mut self, span: Span) {
        self.error(
            DiagnosticCode::VOID_VALUE_USED,
            "An expression of type 'void' cannot be used here",
            span,
        );
    }

    fn diagnostic(&self, code: DiagnosticCode, message: String, span: Span) -> Diagnostic {
        let source_line = self.source.line(span.start_line).unwrap_or("").to_string();
        Diagnostic::new(&self.source.name, code, message, span, source_line)
    }

    fn error(&mut self, code: DiagnosticCode, message: impl Into<String>, span: Span) {
        let diagnostic = self.diagnostic(code, message.into(), span);
        self.diagnostics.push(diagnostic);
    }

    fn error_with_suggestion(
        &mut self,
        code: DiagnosticCode,
        message: impl Into<String>,
        span: Span,
        suggestion: impl Into<String>,
    ) {
        let diagnostic = self
            .diagnostic(code, message.into(), span)
            .with_suggestion(suggestion);
        self.diagnostics.push(diagnostic);
    }

    fn warning(&mut self, code: DiagnosticCode, message: impl Into<String>, span: Span) {
        let mut diagnostic = self.diagnostic(code, message.into(), span);
        diagnostic.severity = Severity::Warning;
        self.diagnostics.push(diagnostic);
    }

    fn warning_with_suggestion(
        &mut self,
        code: DiagnosticCode,
        message: impl Into<String>,
        span: Span,
        suggestion: impl Into<String>,
    ) {
        let mut diagnostic = self
            .diagnostic(code, message.into(), span)
            .with_suggestion(suggestion);
        diagnostic.severity = Severity::Warning;
        self.diagnostics.push(diagnostic);
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn plural_args(n: usize) -> &'static str {
    if n == 1 {
        "argument"
    } else {
        "arguments"
    }
}

/// Whether control can never fall through the end of `stmt`.
fn always_exits(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Return(_) | Stmt::Throw(_) => true,
        Stmt::Block(b) => block_always_exits(b),
        Stmt::If(s) => match &s.else_branch {
            Some(else_branch) => always_exits(&s.then_branch) && always_exits(else_branch),
            None => false,
        },
        Stmt::While(s) => is_true_literal(&s.condition) && !breaks_out(&s.body),
        Stmt::For(s) => s.condition.is_none() && !breaks_out(&s.body),
        Stmt::DoWhile(s) => always_exits(&s.body) && !breaks_out(&s.body),
        _ => false,
    }
}

fn block_always_exits(block: &Block) -> bool {
    block.stmts.iter().any(always_exits)
}

fn is_true_literal(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::BoolLit(value) => *value,
        ExprKind::Paren(inner) => is_true_literal(inner),
        _ => false,
    }
}

/// Whether `stmt` contains a `break` that leaves the enclosing loop.
fn breaks_out(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Break(_) => true,
        Stmt::Block(b) => b.stmts.iter().any(breaks_out),
        Stmt::If(s) => {
            breaks_out(&s.then_branch) || s.else_branch.as_deref().is_some_and(breaks_out)
        }
        // A nested loop owns its own breaks.
        _ => false,
    }
}

/// Levenshtein distance over chars.
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut current = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        prev = current;
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("consol", "console"), 1);
        assert_eq!(edit_distance("count", "count"), 0);
        assert_eq!(edit_distance("abc", "xyz"), 3);
    }
}
