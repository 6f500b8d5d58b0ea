//! Statement code generation.
//!
//! Loops use a fixed label layout so `break` and `continue` are plain
//! relative branches:
//!
//! ```text
//! block $break
//!   loop $top
//!     gas tick
//!     (exit test: br_if $break)
//!     block $continue
//!       body
//!     end
//!     (update)
//!     br $top
//!   end
//! end
//! ```

use kata_types::abi::HostFn;
use kata_types::ast::*;
use kata_types::Type;
use wasm_encoder::{BlockType, Function, Instruction, ValType};

use crate::compiler::{call_host, declared_type, FuncContext, Slot};
use crate::error::{CodegenError, CodegenResult};
use crate::expr::*;
use crate::gas;
use crate::types::*;

/// Emit a sequence of statements.
pub fn emit_stmts(stmts: &[Stmt], ctx: &mut FuncContext, f: &mut Function) -> CodegenResult<()> {
    for stmt in stmts {
        emit_stmt(stmt, ctx, f)?;
    }
    Ok(())
}

/// Emit a single statement. Statements leave the stack as they found it.
pub fn emit_stmt(stmt: &Stmt, ctx: &mut FuncContext, f: &mut Function) -> CodegenResult<()> {
    match stmt {
        Stmt::Let(decl) => emit_let(decl, ctx, f),
        Stmt::Assign(assign) => emit_assign(assign, ctx, f),
        Stmt::If(s) => emit_if(s, ctx, f),
        Stmt::While(s) => emit_while(s, ctx, f),
        Stmt::DoWhile(s) => emit_do_while(s, ctx, f),
        Stmt::For(s) => emit_for(s, ctx, f),
        Stmt::ForOf(s) => emit_for_of(s, ctx, f),
        Stmt::Break(_) => {
            let depth = ctx.break_target()?;
            f.instruction(&Instruction::Br(depth));
            Ok(())
        }
        Stmt::Continue(_) => {
            let depth = ctx.continue_target()?;
            f.instruction(&Instruction::Br(depth));
            Ok(())
        }
        Stmt::Return(ret) => {
            if let Some(value) = &ret.value {
                emit_expr(value, ctx, f)?;
            }
            f.instruction(&Instruction::Return);
            Ok(())
        }
        Stmt::Throw(throw) => emit_throw(throw, ctx, f),
        Stmt::Block(block) => {
            ctx.push_scope();
            let result = emit_stmts(&block.stmts, ctx, f);
            ctx.pop_scope();
            result
        }
        Stmt::Expr(expr_stmt) => {
            let ty = ctx.type_of(&expr_stmt.expr)?;
            emit_expr(&expr_stmt.expr, ctx, f)?;
            if val_type(&ty)?.is_some() {
                f.instruction(&Instruction::Drop);
            }
            Ok(())
        }
    }
}

/// A branch or loop body in its own scope.
fn emit_nested(stmt: &Stmt, ctx: &mut FuncContext, f: &mut Function) -> CodegenResult<()> {
    ctx.push_scope();
    let result = match stmt {
        Stmt::Block(block) => emit_stmts(&block.stmts, ctx, f),
        other => emit_stmt(other, ctx, f),
    };
    ctx.pop_scope();
    result
}

// ══════════════════════════════════════════════════════════════════════════════
// Declarations and assignment
// ══════════════════════════════════════════════════════════════════════════════

fn emit_let(decl: &LetStmt, ctx: &mut FuncContext, f: &mut Function) -> CodegenResult<()> {
    let ty = declared_type(decl, ctx.types)?;
    let global = ctx.declares_global();
    let slot = if global {
        ctx.global_slot(&decl.name.name)?.0
    } else {
        Slot::Local(ctx.alloc_local(value_val_type(&ty)?))
    };

    match &decl.init {
        Some(init) => emit_expr(init, ctx, f)?,
        None => emit_default(&ty, ctx, f)?,
    }
    emit_set(slot, f);

    // Bound after the initializer so it cannot see itself.
    if let Slot::Local(idx) = slot {
        ctx.push_local(&decl.name.name, idx, ty);
    }
    Ok(())
}

/// The value of a declaration without an initializer.
fn emit_default(ty: &Type, ctx: &mut FuncContext, f: &mut Function) -> CodegenResult<()> {
    match ty {
        Type::Number => {
            f.instruction(&Instruction::F64Const(0.0));
        }
        Type::Boolean => {
            f.instruction(&Instruction::I32Const(0));
        }
        Type::String => emit_string_const("", ctx, f),
        Type::Array(elem) => {
            f.instruction(&Instruction::I32Const(elem.elem_kind()));
            call_host(f, HostFn::ArrNew);
        }
        Type::Error => {
            emit_string_const("", ctx, f);
            call_host(f, HostFn::ErrNew);
        }
        Type::Void | Type::Unknown => {
            return Err(CodegenError::Internal(format!(
                "variable of type '{ty}'"
            )));
        }
    }
    Ok(())
}

fn emit_assign(assign: &AssignStmt, ctx: &mut FuncContext, f: &mut Function) -> CodegenResult<()> {
    match &assign.target {
        AssignTarget::Variable(ident) => {
            let (slot, ty) = ctx.lookup(&ident.name)?;
            if let AssignOp::Compound(op) = assign.op {
                emit_get(slot, f);
                emit_compound_rhs(op, &ty, &assign.value, ctx, f)?;
            } else {
                emit_expr(&assign.value, ctx, f)?;
            }
            emit_set(slot, f);
        }
        AssignTarget::Index { object, index } => {
            let elem = match ctx.type_of(object)? {
                Type::Array(elem) => *elem,
                other => {
                    return Err(CodegenError::Internal(format!(
                        "element assignment on '{other}'"
                    )));
                }
            };
            let tmp_obj = ctx.alloc_local(ValType::I32);
            let tmp_idx = ctx.alloc_local(ValType::F64);
            emit_expr(object, ctx, f)?;
            f.instruction(&Instruction::LocalSet(tmp_obj));
            emit_expr(index, ctx, f)?;
            f.instruction(&Instruction::LocalSet(tmp_idx));

            f.instruction(&Instruction::LocalGet(tmp_obj));
            f.instruction(&Instruction::LocalGet(tmp_idx));
            if let AssignOp::Compound(op) = assign.op {
                f.instruction(&Instruction::LocalGet(tmp_obj));
                f.instruction(&Instruction::LocalGet(tmp_idx));
                call_host(f, array_get(&elem)?);
                emit_compound_rhs(op, &elem, &assign.value, ctx, f)?;
            } else {
                emit_expr(&assign.value, ctx, f)?;
            }
            call_host(f, array_set(&elem)?);
        }
    }
    Ok(())
}

/// With the old value of type `target_ty` on the stack, leave `old op value`.
fn emit_compound_rhs(
    op: BinOp,
    target_ty: &Type,
    value: &Expr,
    ctx: &mut FuncContext,
    f: &mut Function,
) -> CodegenResult<()> {
    let value_ty = ctx.type_of(value)?;
    emit_expr(value, ctx, f)?;
    if op == BinOp::Add && *target_ty == Type::String {
        emit_to_string(&value_ty, f)?;
        call_host(f, HostFn::StrConcat);
        Ok(())
    } else {
        emit_operator(op, target_ty, f)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Control flow
// ══════════════════════════════════════════════════════════════════════════════

fn emit_if(stmt: &IfStmt, ctx: &mut FuncContext, f: &mut Function) -> CodegenResult<()> {
    emit_expr(&stmt.condition, ctx, f)?;
    f.instruction(&Instruction::If(BlockType::Empty));
    ctx.enter_block();
    emit_nested(&stmt.then_branch, ctx, f)?;
    if let Some(else_branch) = &stmt.else_branch {
        f.instruction(&Instruction::Else);
        emit_nested(else_branch, ctx, f)?;
    }
    ctx.exit_block();
    f.instruction(&Instruction::End);
    Ok(())
}

/// Open `block $break; loop $top` and tick gas.
fn open_loop(ctx: &mut FuncContext, f: &mut Function) -> u32 {
    f.instruction(&Instruction::Block(BlockType::Empty));
    let break_depth = ctx.enter_block();
    f.instruction(&Instruction::Loop(BlockType::Empty));
    ctx.enter_block();
    gas::emit_gas_tick(f);
    break_depth
}

/// Close `loop $top; block $break`, branching back to the top first.
fn close_loop(ctx: &mut FuncContext, f: &mut Function) {
    f.instruction(&Instruction::Br(0));
    f.instruction(&Instruction::End);
    ctx.exit_block();
    f.instruction(&Instruction::End);
    ctx.exit_block();
}

/// `block $continue; body; end`
fn emit_loop_body(
    body: &Stmt,
    break_depth: u32,
    ctx: &mut FuncContext,
    f: &mut Function,
) -> CodegenResult<()> {
    f.instruction(&Instruction::Block(BlockType::Empty));
    let continue_depth = ctx.enter_block();
    ctx.push_loop(break_depth, continue_depth);
    let result = emit_nested(body, ctx, f);
    ctx.pop_loop();
    ctx.exit_block();
    f.instruction(&Instruction::End);
    result
}

/// Leave the loop when the `i32` condition on the stack is false.
fn emit_exit_unless(f: &mut Function) {
    f.instruction(&Instruction::I32Eqz);
    f.instruction(&Instruction::BrIf(1));
}

fn emit_while(stmt: &WhileStmt, ctx: &mut FuncContext, f: &mut Function) -> CodegenResult<()> {
    let break_depth = open_loop(ctx, f);
    emit_expr(&stmt.condition, ctx, f)?;
    emit_exit_unless(f);
    emit_loop_body(&stmt.body, break_depth, ctx, f)?;
    close_loop(ctx, f);
    Ok(())
}

fn emit_do_while(stmt: &WhileStmt, ctx: &mut FuncContext, f: &mut Function) -> CodegenResult<()> {
    let break_depth = open_loop(ctx, f);
    emit_loop_body(&stmt.body, break_depth, ctx, f)?;
    emit_expr(&stmt.condition, ctx, f)?;
    // Loop again while the condition holds, else fall out of both blocks.
    f.instruction(&Instruction::BrIf(0));
    f.instruction(&Instruction::End);
    ctx.exit_block();
    f.instruction(&Instruction::End);
    ctx.exit_block();
    Ok(())
}

fn emit_for(stmt: &ForStmt, ctx: &mut FuncContext, f: &mut Function) -> CodegenResult<()> {
    ctx.push_scope();
    let result = emit_for_scoped(stmt, ctx, f);
    ctx.pop_scope();
    result
}

fn emit_for_scoped(stmt: &ForStmt, ctx: &mut FuncContext, f: &mut Function) -> CodegenResult<()> {
    if let Some(init) = &stmt.init {
        emit_stmt(init, ctx, f)?;
    }
    let break_depth = open_loop(ctx, f);
    if let Some(condition) = &stmt.condition {
        emit_expr(condition, ctx, f)?;
        emit_exit_unless(f);
    }
    emit_loop_body(&stmt.body, break_depth, ctx, f)?;
    if let Some(update) = &stmt.update {
        emit_stmt(update, ctx, f)?;
    }
    close_loop(ctx, f);
    Ok(())
}

fn emit_for_of(stmt: &ForOfStmt, ctx: &mut FuncContext, f: &mut Function) -> CodegenResult<()> {
    ctx.push_scope();
    let result = emit_for_of_scoped(stmt, ctx, f);
    ctx.pop_scope();
    result
}

fn emit_for_of_scoped(
    stmt: &ForOfStmt,
    ctx: &mut FuncContext,
    f: &mut Function,
) -> CodegenResult<()> {
    let (elem, length, fetch) = match ctx.type_of(&stmt.iterable)? {
        Type::Array(elem) => {
            let fetch = array_get(&elem)?;
            (*elem, HostFn::ArrLen, fetch)
        }
        Type::String => (Type::String, HostFn::StrLen, HostFn::StrAt),
        other => {
            return Err(CodegenError::Internal(format!("iterating a '{other}'")));
        }
    };

    let tmp_seq = ctx.alloc_local(ValType::I32);
    let tmp_i = ctx.alloc_local(ValType::F64);
    emit_expr(&stmt.iterable, ctx, f)?;
    f.instruction(&Instruction::LocalSet(tmp_seq));
    f.instruction(&Instruction::F64Const(0.0));
    f.instruction(&Instruction::LocalSet(tmp_i));

    let binding = ctx.alloc_local(value_val_type(&elem)?);
    ctx.push_local(&stmt.binding.name, binding, elem);

    let break_depth = open_loop(ctx, f);

    // Length is re-read each pass; the body may push or pop.
    f.instruction(&Instruction::LocalGet(tmp_i));
    f.instruction(&Instruction::LocalGet(tmp_seq));
    call_host(f, length);
    f.instruction(&Instruction::F64Lt);
    emit_exit_unless(f);

    f.instruction(&Instruction::LocalGet(tmp_seq));
    f.instruction(&Instruction::LocalGet(tmp_i));
    call_host(f, fetch);
    f.instruction(&Instruction::LocalSet(binding));

    emit_loop_body(&stmt.body, break_depth, ctx, f)?;

    f.instruction(&Instruction::LocalGet(tmp_i));
    f.instruction(&Instruction::F64Const(1.0));
    f.instruction(&Instruction::F64Add);
    f.instruction(&Instruction::LocalSet(tmp_i));
    close_loop(ctx, f);
    Ok(())
}

fn emit_throw(stmt: &ThrowStmt, ctx: &mut FuncContext, f: &mut Function) -> CodegenResult<()> {
    let ty = ctx.type_of(&stmt.value)?;
    emit_expr(&stmt.value, ctx, f)?;
    if ty == Type::Error {
        f.instruction(&Instruction::I32Const(1));
    } else {
        emit_to_string(&ty, f)?;
        f.instruction(&Instruction::I32Const(0));
    }
    call_host(f, HostFn::Throw);
    f.instruction(&Instruction::Unreachable);
    Ok(())
}
