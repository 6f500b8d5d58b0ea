//! Expression code generation.
//!
//! Every expression leaves exactly one value on the Wasm stack, except
//! calls to `void` functions and built-ins, which leave none. Strings, arrays
//! and errors are `i32` handles into the host heap; every operation on them
//! is a host call.

use kata_types::abi::{self, HostFn};
use kata_types::ast::*;
use kata_types::builtin::Builtin;
use kata_types::Type;
use wasm_encoder::{BlockType, Function, Instruction, ValType};

use crate::compiler::{call_host, FuncContext, Slot};
use crate::error::{CodegenError, CodegenResult};
use crate::types::*;

/// Emit code for an expression.
pub fn emit_expr(expr: &Expr, ctx: &mut FuncContext, f: &mut Function) -> CodegenResult<()> {
    match &expr.kind {
        ExprKind::NumberLit(n) => {
            f.instruction(&Instruction::F64Const(*n));
        }
        ExprKind::StringLit(s) => emit_string_const(s, ctx, f),
        ExprKind::Template(parts) => emit_template(parts, ctx, f)?,
        ExprKind::BoolLit(b) => {
            f.instruction(&Instruction::I32Const(i32::from(*b)));
        }
        ExprKind::ArrayLit(items) => emit_array_lit(expr, items, ctx, f)?,
        ExprKind::Identifier(name) => match ctx.types.builtin(expr.id) {
            Some(Builtin::NaN) => {
                f.instruction(&Instruction::F64Const(f64::NAN));
            }
            Some(Builtin::Infinity) => {
                f.instruction(&Instruction::F64Const(f64::INFINITY));
            }
            _ => {
                let (slot, _) = ctx.lookup(name)?;
                emit_get(slot, f);
            }
        },
        ExprKind::Call { callee, args } => match ctx.types.builtin(expr.id) {
            Some(builtin) => emit_builtin(builtin, None, args, ctx, f)?,
            None => {
                for arg in args {
                    emit_expr(arg, ctx, f)?;
                }
                let index = ctx.function_index(&callee.name)?;
                f.instruction(&Instruction::Call(index));
            }
        },
        ExprKind::Member { object, property } => {
            let builtin = ctx.types.builtin(expr.id).ok_or_else(|| {
                CodegenError::Unsupported(format!("property '{}'", property.name))
            })?;
            emit_property(builtin, object, ctx, f)?;
        }
        ExprKind::MethodCall {
            object,
            method,
            args,
        } => {
            let builtin = ctx.types.builtin(expr.id).ok_or_else(|| {
                CodegenError::Unsupported(format!("method '{}'", method.name))
            })?;
            let receiver = if is_namespace_member(builtin) {
                None
            } else {
                Some(object.as_ref())
            };
            emit_builtin(builtin, receiver, args, ctx, f)?;
        }
        ExprKind::Index { object, index } => {
            let object_ty = ctx.type_of(object)?;
            emit_expr(object, ctx, f)?;
            emit_expr(index, ctx, f)?;
            match &object_ty {
                Type::String => call_host(f, HostFn::StrAt),
                Type::Array(elem) => call_host(f, array_get(elem)?),
                other => {
                    return Err(CodegenError::Internal(format!("indexing a '{other}'")));
                }
            }
        }
        ExprKind::NewError { args } => {
            match args.first() {
                Some(message) => emit_expr(message, ctx, f)?,
                None => emit_string_const("", ctx, f),
            }
            call_host(f, HostFn::ErrNew);
        }
        ExprKind::Binary { left, op, right } => emit_binary(expr, left, *op, right, ctx, f)?,
        ExprKind::Unary { op, operand } => {
            let operand_ty = ctx.type_of(operand)?;
            emit_expr(operand, ctx, f)?;
            match (op, operand_ty) {
                (UnaryOp::Not, _) => {
                    f.instruction(&Instruction::I32Eqz);
                }
                (UnaryOp::Neg, _) => {
                    f.instruction(&Instruction::F64Neg);
                }
                (UnaryOp::Plus, Type::String) => call_host(f, HostFn::StrToNum),
                (UnaryOp::Plus, Type::Boolean) => {
                    f.instruction(&Instruction::F64ConvertI32U);
                }
                (UnaryOp::Plus, _) => {}
            }
        }
        ExprKind::Conditional {
            condition,
            then_expr,
            else_expr,
        } => {
            let block_type = match val_type(&ctx.type_of(expr)?)? {
                Some(vt) => BlockType::Result(vt),
                None => BlockType::Empty,
            };
            emit_expr(condition, ctx, f)?;
            f.instruction(&Instruction::If(block_type));
            emit_expr(then_expr, ctx, f)?;
            f.instruction(&Instruction::Else);
            emit_expr(else_expr, ctx, f)?;
            f.instruction(&Instruction::End);
        }
        ExprKind::Paren(inner) => emit_expr(inner, ctx, f)?,
    }
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Variables and constants
// ══════════════════════════════════════════════════════════════════════════════

pub fn emit_get(slot: Slot, f: &mut Function) {
    match slot {
        Slot::Local(idx) => f.instruction(&Instruction::LocalGet(idx)),
        Slot::Global(idx) => f.instruction(&Instruction::GlobalGet(idx)),
    };
}

pub fn emit_set(slot: Slot, f: &mut Function) {
    match slot {
        Slot::Local(idx) => f.instruction(&Instruction::LocalSet(idx)),
        Slot::Global(idx) => f.instruction(&Instruction::GlobalSet(idx)),
    };
}

/// Push a handle to a fresh host string holding `s`.
pub fn emit_string_const(s: &str, ctx: &mut FuncContext, f: &mut Function) {
    let (ptr, len) = ctx.intern_string(s);
    f.instruction(&Instruction::I32Const(ptr as i32));
    f.instruction(&Instruction::I32Const(len as i32));
    call_host(f, HostFn::StrConst);
}

/// Convert the value on top of the stack, of type `ty`, to a string handle.
pub fn emit_to_string(ty: &Type, f: &mut Function) -> CodegenResult<()> {
    match ty {
        Type::Number => call_host(f, HostFn::NumToStr),
        Type::Boolean => call_host(f, HostFn::BoolToStr),
        Type::String => {}
        Type::Array(_) => call_host(f, HostFn::ArrToStr),
        Type::Error => call_host(f, HostFn::ErrToStr),
        Type::Void | Type::Unknown => {
            return Err(CodegenError::Internal(format!(
                "cannot convert '{ty}' to a string"
            )));
        }
    }
    Ok(())
}

fn emit_template(parts: &[TemplatePart], ctx: &mut FuncContext, f: &mut Function) -> CodegenResult<()> {
    if parts.is_empty() {
        emit_string_const("", ctx, f);
        return Ok(());
    }
    for (i, part) in parts.iter().enumerate() {
        match part {
            TemplatePart::Literal(text) => emit_string_const(text, ctx, f),
            TemplatePart::Expr(e) => {
                let ty = ctx.type_of(e)?;
                emit_expr(e, ctx, f)?;
                emit_to_string(&ty, f)?;
            }
        }
        if i > 0 {
            call_host(f, HostFn::StrConcat);
        }
    }
    Ok(())
}

fn emit_array_lit(
    expr: &Expr,
    items: &[Expr],
    ctx: &mut FuncContext,
    f: &mut Function,
) -> CodegenResult<()> {
    let ty = ctx.type_of(expr)?;
    let elem = ty
        .element()
        .cloned()
        .ok_or_else(|| CodegenError::Internal("array literal without an array type".into()))?;

    let tmp = ctx.alloc_local(ValType::I32);
    f.instruction(&Instruction::I32Const(elem.elem_kind()));
    call_host(f, HostFn::ArrNew);
    f.instruction(&Instruction::LocalSet(tmp));

    let push = array_push(&elem)?;
    for item in items {
        f.instruction(&Instruction::LocalGet(tmp));
        emit_expr(item, ctx, f)?;
        call_host(f, push);
        f.instruction(&Instruction::Drop);
    }
    f.instruction(&Instruction::LocalGet(tmp));
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Operators
// ══════════════════════════════════════════════════════════════════════════════

fn emit_binary(
    expr: &Expr,
    left: &Expr,
    op: BinOp,
    right: &Expr,
    ctx: &mut FuncContext,
    f: &mut Function,
) -> CodegenResult<()> {
    // Short-circuit operators evaluate `right` conditionally.
    match op {
        BinOp::And => {
            emit_expr(left, ctx, f)?;
            f.instruction(&Instruction::If(BlockType::Result(ValType::I32)));
            emit_expr(right, ctx, f)?;
            f.instruction(&Instruction::Else);
            f.instruction(&Instruction::I32Const(0));
            f.instruction(&Instruction::End);
            return Ok(());
        }
        BinOp::Or => {
            emit_expr(left, ctx, f)?;
            f.instruction(&Instruction::If(BlockType::Result(ValType::I32)));
            f.instruction(&Instruction::I32Const(1));
            f.instruction(&Instruction::Else);
            emit_expr(right, ctx, f)?;
            f.instruction(&Instruction::End);
            return Ok(());
        }
        _ => {}
    }

    let left_ty = ctx.type_of(left)?;
    let right_ty = ctx.type_of(right)?;

    if op == BinOp::Add && ctx.type_of(expr)? == Type::String {
        emit_expr(left, ctx, f)?;
        emit_to_string(&left_ty, f)?;
        emit_expr(right, ctx, f)?;
        emit_to_string(&right_ty, f)?;
        call_host(f, HostFn::StrConcat);
        return Ok(());
    }

    emit_expr(left, ctx, f)?;
    emit_expr(right, ctx, f)?;
    emit_operator(op, &left_ty, f)
}

/// Apply `op` to the two operands on the stack; `left_ty` picks the
/// instruction. String `+` is handled by the caller.
pub fn emit_operator(op: BinOp, left_ty: &Type, f: &mut Function) -> CodegenResult<()> {
    match op {
        BinOp::Add => {
            f.instruction(&Instruction::F64Add);
        }
        BinOp::Sub => {
            f.instruction(&Instruction::F64Sub);
        }
        BinOp::Mul => {
            f.instruction(&Instruction::F64Mul);
        }
        BinOp::Div => {
            f.instruction(&Instruction::F64Div);
        }
        BinOp::Rem => call_host(f, HostFn::NumRem),
        BinOp::Pow => call_host(f, HostFn::NumPow),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            if *left_ty == Type::String {
                call_host(f, HostFn::StrCmp);
                f.instruction(&Instruction::I32Const(0));
                f.instruction(&match op {
                    BinOp::Lt => Instruction::I32LtS,
                    BinOp::Le => Instruction::I32LeS,
                    BinOp::Gt => Instruction::I32GtS,
                    _ => Instruction::I32GeS,
                });
            } else {
                f.instruction(&match op {
                    BinOp::Lt => Instruction::F64Lt,
                    BinOp::Le => Instruction::F64Le,
                    BinOp::Gt => Instruction::F64Gt,
                    _ => Instruction::F64Ge,
                });
            }
        }
        BinOp::StrictEq | BinOp::StrictNe | BinOp::LooseEq | BinOp::LooseNe => {
            let negated = matches!(op, BinOp::StrictNe | BinOp::LooseNe);
            match left_ty {
                Type::Number => {
                    f.instruction(&if negated {
                        Instruction::F64Ne
                    } else {
                        Instruction::F64Eq
                    });
                }
                Type::String => {
                    call_host(f, HostFn::StrEq);
                    if negated {
                        f.instruction(&Instruction::I32Eqz);
                    }
                }
                _ => {
                    f.instruction(&if negated {
                        Instruction::I32Ne
                    } else {
                        Instruction::I32Eq
                    });
                }
            }
        }
        BinOp::And | BinOp::Or => {
            return Err(CodegenError::Internal(format!(
                "'{}' needs short-circuit lowering",
                op.as_str()
            )));
        }
    }
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Built-ins
// ══════════════════════════════════════════════════════════════════════════════

fn is_namespace_member(builtin: Builtin) -> bool {
    matches!(
        builtin,
        Builtin::Console(_)
            | Builtin::MathPi
            | Builtin::MathE
            | Builtin::MathFloor
            | Builtin::MathCeil
            | Builtin::MathRound
            | Builtin::MathTrunc
            | Builtin::MathAbs
            | Builtin::MathSqrt
            | Builtin::MathSign
            | Builtin::MathMin
            | Builtin::MathMax
            | Builtin::MathPow
    )
}

fn emit_property(
    builtin: Builtin,
    object: &Expr,
    ctx: &mut FuncContext,
    f: &mut Function,
) -> CodegenResult<()> {
    match builtin {
        Builtin::MathPi => {
            f.instruction(&Instruction::F64Const(std::f64::consts::PI));
        }
        Builtin::MathE => {
            f.instruction(&Instruction::F64Const(std::f64::consts::E));
        }
        Builtin::StrLength => {
            emit_expr(object, ctx, f)?;
            call_host(f, HostFn::StrLen);
        }
        Builtin::ArrLength => {
            emit_expr(object, ctx, f)?;
            call_host(f, HostFn::ArrLen);
        }
        Builtin::ErrMessage => {
            emit_expr(object, ctx, f)?;
            call_host(f, HostFn::ErrMessage);
        }
        other => {
            return Err(CodegenError::Internal(format!(
                "{other:?} is not a property"
            )));
        }
    }
    Ok(())
}

/// Lower a built-in call. `receiver` is the value a method is called on.
fn emit_builtin(
    builtin: Builtin,
    receiver: Option<&Expr>,
    args: &[Expr],
    ctx: &mut FuncContext,
    f: &mut Function,
) -> CodegenResult<()> {
    let receiver_ty = match receiver {
        Some(object) => {
            let ty = ctx.type_of(object)?;
            emit_expr(object, ctx, f)?;
            Some(ty)
        }
        None => None,
    };
    let elem = receiver_ty.as_ref().and_then(Type::element).cloned();

    match builtin {
        // ── Output ──
        Builtin::Print => emit_console(abi::STREAM_LOG, args, ctx, f)?,
        Builtin::Console(stream) => emit_console(stream, args, ctx, f)?,

        // ── Global functions ──
        Builtin::StringOf => {
            let arg = nth_arg(args, 0)?;
            let ty = ctx.type_of(arg)?;
            emit_expr(arg, ctx, f)?;
            emit_to_string(&ty, f)?;
        }
        Builtin::NumberOf => {
            let arg = nth_arg(args, 0)?;
            let ty = ctx.type_of(arg)?;
            emit_expr(arg, ctx, f)?;
            match ty {
                Type::String => call_host(f, HostFn::StrToNum),
                Type::Boolean => {
                    f.instruction(&Instruction::F64ConvertI32U);
                }
                _ => {}
            }
        }
        Builtin::IsNaN => {
            emit_expr(nth_arg(args, 0)?, ctx, f)?;
            let tmp = ctx.alloc_local(ValType::F64);
            f.instruction(&Instruction::LocalTee(tmp));
            f.instruction(&Instruction::LocalGet(tmp));
            f.instruction(&Instruction::F64Ne);
        }
        Builtin::ParseInt => {
            emit_expr(nth_arg(args, 0)?, ctx, f)?;
            call_host(f, HostFn::StrParseInt);
        }

        // ── Math ──
        Builtin::MathFloor => emit_unary_math(args, Instruction::F64Floor, ctx, f)?,
        Builtin::MathCeil => emit_unary_math(args, Instruction::F64Ceil, ctx, f)?,
        Builtin::MathTrunc => emit_unary_math(args, Instruction::F64Trunc, ctx, f)?,
        Builtin::MathAbs => emit_unary_math(args, Instruction::F64Abs, ctx, f)?,
        Builtin::MathSqrt => emit_unary_math(args, Instruction::F64Sqrt, ctx, f)?,
        Builtin::MathRound => {
            // floor(x + 0.5): halves round towards +Infinity.
            emit_expr(nth_arg(args, 0)?, ctx, f)?;
            f.instruction(&Instruction::F64Const(0.5));
            f.instruction(&Instruction::F64Add);
            f.instruction(&Instruction::F64Floor);
        }
        Builtin::MathSign => {
            emit_expr(nth_arg(args, 0)?, ctx, f)?;
            call_host(f, HostFn::NumSign);
        }
        Builtin::MathMin => emit_fold(args, f64::INFINITY, Instruction::F64Min, ctx, f)?,
        Builtin::MathMax => emit_fold(args, f64::NEG_INFINITY, Instruction::F64Max, ctx, f)?,
        Builtin::MathPow => {
            emit_args(args, ctx, f)?;
            call_host(f, HostFn::NumPow);
        }

        // ── string ──
        Builtin::StrUpper => call_host(f, HostFn::StrUpper),
        Builtin::StrLower => call_host(f, HostFn::StrLower),
        Builtin::StrTrim => call_host(f, HostFn::StrTrim),
        Builtin::StrIncludes => emit_method(args, HostFn::StrIncludes, ctx, f)?,
        Builtin::StrIndexOf => emit_method(args, HostFn::StrIndexOf, ctx, f)?,
        Builtin::StrStartsWith => emit_method(args, HostFn::StrStartsWith, ctx, f)?,
        Builtin::StrEndsWith => emit_method(args, HostFn::StrEndsWith, ctx, f)?,
        Builtin::StrRepeat => emit_method(args, HostFn::StrRepeat, ctx, f)?,
        Builtin::StrCharAt => emit_method(args, HostFn::StrCharAt, ctx, f)?,
        Builtin::StrSplit => emit_method(args, HostFn::StrSplit, ctx, f)?,
        Builtin::StrSlice => {
            emit_expr(nth_arg(args, 0)?, ctx, f)?;
            emit_number_or(args.get(1), f64::INFINITY, ctx, f)?;
            call_host(f, HostFn::StrSlice);
        }
        Builtin::StrToString => {}

        // ── number / boolean ──
        Builtin::NumToString => call_host(f, HostFn::NumToStr),
        Builtin::NumToFixed => {
            emit_number_or(args.first(), 0.0, ctx, f)?;
            call_host(f, HostFn::NumToFixed);
        }
        Builtin::BoolToString => call_host(f, HostFn::BoolToStr),

        // ── array ──
        Builtin::ArrPush => {
            let elem = receiver_element(elem)?;
            let push = array_push(&elem)?;
            let tmp = ctx.alloc_local(ValType::I32);
            f.instruction(&Instruction::LocalSet(tmp));
            if args.is_empty() {
                f.instruction(&Instruction::LocalGet(tmp));
                call_host(f, HostFn::ArrLen);
            }
            for (i, arg) in args.iter().enumerate() {
                f.instruction(&Instruction::LocalGet(tmp));
                emit_expr(arg, ctx, f)?;
                call_host(f, push);
                // `push` evaluates to the final length.
                if i + 1 < args.len() {
                    f.instruction(&Instruction::Drop);
                }
            }
        }
        Builtin::ArrPop => {
            let elem = receiver_element(elem)?;
            call_host(
                f,
                match value_val_type(&elem)? {
                    ValType::F64 => HostFn::ArrPopF64,
                    _ => HostFn::ArrPopI32,
                },
            );
        }
        Builtin::ArrJoin => {
            match args.first() {
                Some(separator) => emit_expr(separator, ctx, f)?,
                None => emit_string_const(",", ctx, f),
            }
            call_host(f, HostFn::ArrJoin);
        }
        Builtin::ArrIncludes | Builtin::ArrIndexOf => {
            let elem = receiver_element(elem)?;
            emit_expr(nth_arg(args, 0)?, ctx, f)?;
            let is_f64 = value_val_type(&elem)? == ValType::F64;
            call_host(
                f,
                match (builtin, is_f64) {
                    (Builtin::ArrIncludes, true) => HostFn::ArrIncludesF64,
                    (Builtin::ArrIncludes, false) => HostFn::ArrIncludesI32,
                    (_, true) => HostFn::ArrIndexOfF64,
                    (_, false) => HostFn::ArrIndexOfI32,
                },
            );
        }
        Builtin::ArrReverse => call_host(f, HostFn::ArrReverse),
        Builtin::ArrSlice => {
            emit_number_or(args.first(), 0.0, ctx, f)?;
            emit_number_or(args.get(1), f64::INFINITY, ctx, f)?;
            call_host(f, HostFn::ArrSlice);
        }
        Builtin::ArrToString => call_host(f, HostFn::ArrToStr),

        // ── Error ──
        Builtin::ErrToString => call_host(f, HostFn::ErrToStr),

        Builtin::NaN
        | Builtin::Infinity
        | Builtin::MathPi
        | Builtin::MathE
        | Builtin::StrLength
        | Builtin::ArrLength
        | Builtin::ErrMessage => {
            return Err(CodegenError::Internal(format!(
                "property {builtin:?} used as a call"
            )));
        }
    }
    Ok(())
}

/// `console.*(a, b, ...)`: stage each argument, then flush one line.
fn emit_console(
    stream: i32,
    args: &[Expr],
    ctx: &mut FuncContext,
    f: &mut Function,
) -> CodegenResult<()> {
    for arg in args {
        let ty = ctx.type_of(arg)?;
        emit_expr(arg, ctx, f)?;
        call_host(
            f,
            match ty {
                Type::Number => HostFn::ConNum,
                Type::String => HostFn::ConStr,
                Type::Boolean => HostFn::ConBool,
                Type::Array(_) | Type::Error => HostFn::ConRef,
                Type::Void | Type::Unknown => {
                    return Err(CodegenError::Internal(format!("printing a '{ty}'")));
                }
            },
        );
    }
    f.instruction(&Instruction::I32Const(stream));
    call_host(f, HostFn::ConFlush);
    Ok(())
}

fn emit_unary_math(
    args: &[Expr],
    op: Instruction<'static>,
    ctx: &mut FuncContext,
    f: &mut Function,
) -> CodegenResult<()> {
    emit_expr(nth_arg(args, 0)?, ctx, f)?;
    f.instruction(&op);
    Ok(())
}

/// `Math.min` / `Math.max`: fold from the identity element.
fn emit_fold(
    args: &[Expr],
    identity: f64,
    op: Instruction<'static>,
    ctx: &mut FuncContext,
    f: &mut Function,
) -> CodegenResult<()> {
    let Some((first, rest)) = args.split_first() else {
        f.instruction(&Instruction::F64Const(identity));
        return Ok(());
    };
    emit_expr(first, ctx, f)?;
    for arg in rest {
        emit_expr(arg, ctx, f)?;
        f.instruction(&op);
    }
    Ok(())
}

/// Receiver already on the stack; push the arguments and call `host`.
fn emit_method(
    args: &[Expr],
    host: HostFn,
    ctx: &mut FuncContext,
    f: &mut Function,
) -> CodegenResult<()> {
    emit_args(args, ctx, f)?;
    call_host(f, host);
    Ok(())
}

fn emit_args(args: &[Expr], ctx: &mut FuncContext, f: &mut Function) -> CodegenResult<()> {
    for arg in args {
        emit_expr(arg, ctx, f)?;
    }
    Ok(())
}

/// An optional numeric argument with a default.
fn emit_number_or(
    arg: Option<&Expr>,
    default: f64,
    ctx: &mut FuncContext,
    f: &mut Function,
) -> CodegenResult<()> {
    match arg {
        Some(arg) => emit_expr(arg, ctx, f),
        None => {
            f.instruction(&Instruction::F64Const(default));
            Ok(())
        }
    }
}

fn nth_arg(args: &[Expr], n: usize) -> CodegenResult<&Expr> {
    args.get(n)
        .ok_or_else(|| CodegenError::Internal(format!("missing argument {}", n + 1)))
}

fn receiver_element(elem: Option<Type>) -> CodegenResult<Type> {
    elem.ok_or_else(|| CodegenError::Internal("array method without an array receiver".into()))
}

pub fn array_push(elem: &Type) -> CodegenResult<HostFn> {
    Ok(match value_val_type(elem)? {
        ValType::F64 => HostFn::ArrPushF64,
        _ => HostFn::ArrPushI32,
    })
}

pub fn array_get(elem: &Type) -> CodegenResult<HostFn> {
    Ok(match value_val_type(elem)? {
        ValType::F64 => HostFn::ArrGetF64,
        _ => HostFn::ArrGetI32,
    })
}

pub fn array_set(elem: &Type) -> CodegenResult<HostFn> {
    Ok(match value_val_type(elem)? {
        ValType::F64 => HostFn::ArrSetF64,
        _ => HostFn::ArrSetI32,
    })
}
