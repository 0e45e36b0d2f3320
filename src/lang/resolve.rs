use std::collections::HashMap;

use thiserror::Error;
use tracing::trace;

use super::{
    binding::{Binding, IdKind, local_offset, param_offset},
    node::{Block, Condition, Expr, Ident, Stmt},
    program::Program,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("resolve error: '{0}' is not declared")]
    Undeclared(String),

    #[error("resolve error: '{0}' is declared twice in the same scope")]
    Duplicate(String),

    #[error("resolve error: '{name}' takes {expected} arguments, {found} given")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    kind: IdKind,
    offset: u32,
    params: usize,
}

type Scope = HashMap<String, Entry>;

/// Fill in the binding of every identifier in `program` from the usual
/// lexical scoping rules, overwriting any binding already present.
///
/// Offsets follow [`local_offset`] and [`param_offset`]. All names of a scope
/// are visible throughout it, so procedures may call each other regardless of
/// declaration order.
pub fn resolve_program(program: &mut Program) -> Result<(), ResolveError> {
    let mut scopes = Vec::new();
    resolve_block(&mut program.block, &mut [], &mut scopes)
}

fn declare(scope: &mut Scope, ident: &mut Ident, entry: Entry) -> Result<(), ResolveError> {
    if scope.insert(ident.name.clone(), entry).is_some() {
        return Err(ResolveError::Duplicate(ident.name.clone()));
    }
    ident.binding = Some(Binding::new(entry.kind, entry.offset, 0));
    Ok(())
}

fn resolve_block(
    block: &mut Block,
    params: &mut [Ident],
    scopes: &mut Vec<Scope>,
) -> Result<(), ResolveError> {
    let cells = block.declared_cells() as u32;
    let mut scope = Scope::new();
    let mut index = 0;

    let mut next = |kind: IdKind, arity: usize| {
        let entry = Entry {
            kind,
            offset: local_offset(index, cells),
            params: arity,
        };
        index += 1;
        entry
    };

    for def in block.const_decls.iter_mut().flat_map(|d| &mut d.defs) {
        declare(&mut scope, &mut def.name, next(IdKind::Constant, 0))?;
    }
    for name in block.var_decls.iter_mut().flat_map(|d| &mut d.names) {
        declare(&mut scope, name, next(IdKind::Variable, 0))?;
    }
    for proc in &mut block.proc_decls {
        let arity = proc.params.len();
        declare(&mut scope, &mut proc.name, next(IdKind::Procedure, arity))?;
    }

    let count = params.len() as u32;
    for (j, param) in params.iter_mut().enumerate() {
        let entry = Entry {
            kind: IdKind::Variable,
            offset: param_offset(j as u32, count, cells),
            params: 0,
        };
        declare(&mut scope, param, entry)?;
    }

    trace!(depth = scopes.len(), names = scope.len(), "scope opened");
    scopes.push(scope);

    for proc in &mut block.proc_decls {
        resolve_block(&mut proc.block, &mut proc.params, scopes)?;
    }
    for stmt in &mut block.stmts {
        resolve_stmt(stmt, scopes)?;
    }

    scopes.pop();
    Ok(())
}

fn lookup(ident: &mut Ident, scopes: &[Scope]) -> Result<Entry, ResolveError> {
    for (depth, scope) in scopes.iter().enumerate().rev() {
        if let Some(entry) = scope.get(&ident.name) {
            let levels = (scopes.len() - 1 - depth) as u32;
            ident.binding = Some(Binding::new(entry.kind, entry.offset, levels));
            return Ok(*entry);
        }
    }
    Err(ResolveError::Undeclared(ident.name.clone()))
}

fn resolve_stmt(stmt: &mut Stmt, scopes: &mut Vec<Scope>) -> Result<(), ResolveError> {
    match stmt {
        Stmt::Assign { target, expr } => {
            lookup(target, scopes)?;
            resolve_expr(expr, scopes)
        }
        Stmt::Read { target } => lookup(target, scopes).map(|_| ()),
        Stmt::Print { expr } => resolve_expr(expr, scopes),
        Stmt::Call { callee, args } => {
            let entry = lookup(callee, scopes)?;
            if entry.kind == IdKind::Procedure && entry.params != args.len() {
                return Err(ResolveError::Arity {
                    name: callee.name.clone(),
                    expected: entry.params,
                    found: args.len(),
                });
            }
            args.iter_mut().try_for_each(|arg| resolve_expr(arg, scopes))
        }
        Stmt::If {
            cond,
            then_stmts,
            else_stmts,
        } => {
            resolve_cond(cond, scopes)?;
            for s in then_stmts.iter_mut().chain(else_stmts.iter_mut()) {
                resolve_stmt(s, scopes)?;
            }
            Ok(())
        }
        Stmt::While { cond, body } => {
            resolve_cond(cond, scopes)?;
            body.iter_mut().try_for_each(|s| resolve_stmt(s, scopes))
        }
        Stmt::Block(block) => resolve_block(block, &mut [], scopes),
    }
}

fn resolve_expr(expr: &mut Expr, scopes: &[Scope]) -> Result<(), ResolveError> {
    match expr {
        Expr::Number(_) => Ok(()),
        Expr::Ident(ident) => lookup(ident, scopes).map(|_| ()),
        Expr::Binary { lhs, rhs, .. } => {
            resolve_expr(lhs, scopes)?;
            resolve_expr(rhs, scopes)
        }
        Expr::Negate(inner) => resolve_expr(inner, scopes),
    }
}

fn resolve_cond(cond: &mut Condition, scopes: &[Scope]) -> Result<(), ResolveError> {
    match cond {
        Condition::Rel { lhs, rhs, .. } => {
            resolve_expr(lhs, scopes)?;
            resolve_expr(rhs, scopes)
        }
        Condition::Divisible { dividend, divisor } => {
            resolve_expr(dividend, scopes)?;
            resolve_expr(divisor, scopes)
        }
        Condition::Not(inner) => resolve_cond(inner, scopes),
        Condition::And(lhs, rhs) | Condition::Or(lhs, rhs) => {
            resolve_cond(lhs, scopes)?;
            resolve_cond(rhs, scopes)
        }
    }
}
