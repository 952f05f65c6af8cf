//! Lexical borrow checker.
//!
//! Runs on the typed AST after name resolution. Tracks per-binding move
//! state (`Owned` / `Moved` / `Consumed`), per-region borrow sets keyed by
//! `(range, mutability)`, and the release precondition. Lifetimes are
//! lexical: a borrow lives to the end of the block that created it, or until
//! the binding holding the view is overwritten. Branches are analyzed on
//! cloned overlays and joined: a binding moved in any branch is moved after
//! the join, and the union of surviving borrows is re-checked against the
//! alias rule.
//!
//! `unsafe` waives exactly one check: release-with-live-borrow. Use-after-
//! move and alias conflicts are errors inside `unsafe` as well.

use std::collections::HashMap;

use crate::ast::*;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::span::Span;
use crate::types::{builtin_type, Type, TypeInfo};

#[derive(Debug, Clone, PartialEq)]
enum MoveState {
    Moved(Span),
    Consumed(Span),
}

type RegionId = u32;

#[derive(Debug, Clone, PartialEq)]
struct BorrowInfo {
    region: RegionId,
    var: String,
    /// Constant byte bounds when statically known; `None` covers the region.
    start: Option<i64>,
    end: Option<i64>,
    mutable: bool,
    span: Span,
}

impl BorrowInfo {
    /// Range overlap on `[start, end)`; unknown bounds cover everything.
    fn overlaps(&self, other: &BorrowInfo) -> bool {
        match (self.start, self.end, other.start, other.end) {
            (Some(s1), Some(e1), Some(s2), Some(e2)) => s1 < e2 && s2 < e1,
            _ => true,
        }
    }

    fn conflicts_with(&self, other: &BorrowInfo) -> bool {
        (self.mutable || other.mutable) && self.overlaps(other)
    }
}

#[derive(Debug, Clone, Default)]
struct FnState {
    moves: HashMap<String, MoveState>,
    borrows: HashMap<RegionId, Vec<BorrowInfo>>,
    /// Owning binding -> its region.
    regions: HashMap<String, RegionId>,
    /// View binding -> the region it borrows.
    view_regions: HashMap<String, RegionId>,
}

pub struct BorrowChecker<'a> {
    pub errors: Vec<Diagnostic>,
    type_info: &'a TypeInfo,
    state: FnState,
    unsafe_depth: usize,
    next_region: RegionId,
    current_function: Option<String>,
}

impl<'a> BorrowChecker<'a> {
    pub fn new(type_info: &'a TypeInfo) -> Self {
        Self {
            errors: Vec::new(),
            type_info,
            state: FnState::default(),
            unsafe_depth: 0,
            next_region: 0,
            current_function: None,
        }
    }

    pub fn check_module(&mut self, module: &Module) {
        let mut top_vars = self.type_info.var_types.clone();
        for stmt in &module.body {
            match stmt {
                Stmt::Func(func) => {
                    if func.type_params.is_empty() {
                        self.check_function(func);
                    }
                }
                Stmt::Extern(_) | Stmt::Trait(_) | Stmt::Impl(_) | Stmt::Struct(_)
                | Stmt::Enum(_) | Stmt::Import(_) => {}
                other => self.check_stmt(other, &mut top_vars),
            }
        }
    }

    fn check_function(&mut self, func: &FunctionDef) {
        self.state = FnState::default();
        self.unsafe_depth = 0;
        self.current_function = Some(func.name.clone());
        let mut locals: HashMap<String, Type> = HashMap::new();
        for param in &func.params {
            let t = self.named_type(&param.type_ref.name);
            if t.name == "buffer" {
                let region = self.fresh_region();
                self.state.regions.insert(param.name.clone(), region);
            }
            locals.insert(param.name.clone(), t);
        }
        self.check_block(&func.body, &mut locals);
        self.current_function = None;
    }

    /// A block owns the borrows registered inside it.
    fn check_block(&mut self, body: &[Stmt], locals: &mut HashMap<String, Type>) {
        let before: Vec<BorrowInfo> = self.all_borrows();
        for stmt in body {
            self.check_stmt(stmt, locals);
        }
        self.expire_borrows_not_in(&before);
    }

    fn check_stmt(&mut self, stmt: &Stmt, locals: &mut HashMap<String, Type>) {
        match stmt {
            Stmt::Let { name, init, .. } => {
                self.check_let(name, init, locals);
            }
            Stmt::Assign { target, value, .. } => {
                self.check_expr(value, locals, true);
                self.check_expr(target, locals, false);
            }
            Stmt::AddAssign { target, value, .. } => {
                self.check_expr(target, locals, false);
                self.check_expr(value, locals, true);
            }
            Stmt::If { cond, then_body, else_body, span } => {
                self.check_expr(cond, locals, true);
                let snapshot = self.state.clone();
                let mut then_locals = locals.clone();
                self.check_block(then_body, &mut then_locals);
                let then_state = std::mem::replace(&mut self.state, snapshot.clone());
                let else_state = match else_body {
                    Some(body) => {
                        let mut else_locals = locals.clone();
                        self.check_block(body, &mut else_locals);
                        std::mem::replace(&mut self.state, snapshot.clone())
                    }
                    None => snapshot.clone(),
                };
                self.state = self.join_states(&snapshot, vec![then_state, else_state], *span);
            }
            Stmt::While { cond, body, span } => {
                self.check_expr(cond, locals, true);
                self.check_loop_body(body, locals, *span);
            }
            Stmt::Repeat { count, body, span } => {
                self.check_expr(count, locals, true);
                self.check_loop_body(body, locals, *span);
            }
            Stmt::Match { scrutinee, arms, else_body, span } => {
                self.check_expr(scrutinee, locals, true);
                let snapshot = self.state.clone();
                let mut branch_states = Vec::new();
                for arm in arms {
                    self.state = snapshot.clone();
                    let mut arm_locals = locals.clone();
                    bind_pattern_types(&arm.pattern, self.type_info, &mut arm_locals);
                    if let Some(guard) = &arm.guard {
                        self.check_expr(guard, &mut arm_locals, true);
                    }
                    self.check_block(&arm.body, &mut arm_locals);
                    branch_states.push(std::mem::replace(&mut self.state, snapshot.clone()));
                }
                match else_body {
                    Some(body) => {
                        self.state = snapshot.clone();
                        let mut else_locals = locals.clone();
                        self.check_block(body, &mut else_locals);
                        branch_states.push(std::mem::replace(&mut self.state, snapshot.clone()));
                    }
                    None => branch_states.push(snapshot.clone()),
                }
                self.state = self.join_states(&snapshot, branch_states, *span);
            }
            Stmt::Unsafe { body, .. } => {
                self.unsafe_depth += 1;
                let mut inner_locals = locals.clone();
                self.check_block(body, &mut inner_locals);
                self.unsafe_depth -= 1;
            }
            Stmt::Print { value, .. } => {
                self.check_expr(value, locals, true);
            }
            Stmt::Return { value, .. } => {
                if let Some(v) = value {
                    self.check_expr(v, locals, true);
                }
            }
            Stmt::Release { target, span } => self.check_release(target, *span, locals),
            Stmt::Func(func) => {
                if func.type_params.is_empty() {
                    let saved = std::mem::take(&mut self.state);
                    let saved_fn = self.current_function.clone();
                    self.check_function(func);
                    self.state = saved;
                    self.current_function = saved_fn;
                }
            }
            Stmt::Break { .. } | Stmt::Continue { .. } => {}
            Stmt::Extern(_) | Stmt::Struct(_) | Stmt::Enum(_) | Stmt::Trait(_) | Stmt::Impl(_)
            | Stmt::Import(_) => {}
        }
    }

    fn check_let(&mut self, name: &str, init: &Expr, locals: &mut HashMap<String, Type>) {
        // a shadowing let drops the view the old binding held
        self.drop_view_binding(name);
        match &init.kind {
            ExprKind::BufferCreate { size } => {
                self.check_expr(size, locals, true);
                let region = self.fresh_region();
                self.state.regions.insert(name.to_string(), region);
                self.state.moves.remove(name);
                locals.insert(name.to_string(), Type::buffer());
                return;
            }
            ExprKind::BorrowRange { buffer, start, end, mutable } => {
                self.check_expr(buffer, locals, false);
                self.check_expr(start, locals, true);
                self.check_expr(end, locals, true);
                if let Some(owner) = buffer.as_name() {
                    self.register_borrow(
                        owner,
                        name,
                        const_value(start),
                        const_value(end),
                        *mutable,
                        init.span,
                    );
                }
                self.state.moves.remove(name);
                locals.insert(name.to_string(), Type::view());
                return;
            }
            ExprKind::Borrow { value, mutable } => {
                self.check_expr(value, locals, false);
                if let Some(owner) = value.as_name() {
                    self.register_borrow(owner, name, None, None, *mutable, init.span);
                }
                self.state.moves.remove(name);
                locals.insert(name.to_string(), Type::view());
                return;
            }
            ExprKind::Move { value } => {
                self.check_expr(value, locals, false);
                if let Some(src) = value.as_name() {
                    self.move_binding(src, locals, value.span);
                    if let Some(region) = self.state.regions.get(src).copied() {
                        self.state.regions.insert(name.to_string(), region);
                    }
                }
                let t = self.expr_type(init, locals);
                self.state.moves.remove(name);
                locals.insert(name.to_string(), t);
                return;
            }
            _ => {}
        }
        self.check_expr(init, locals, true);
        // binding a bare name moves non-Copy values
        if let Some(src) = init.as_name() {
            self.move_binding(src, locals, init.span);
            if let Some(region) = self.state.regions.get(src).copied() {
                self.state.regions.insert(name.to_string(), region);
            }
        }
        let t = self.expr_type(init, locals);
        self.state.moves.remove(name);
        locals.insert(name.to_string(), t);
    }

    fn check_loop_body(&mut self, body: &[Stmt], locals: &mut HashMap<String, Type>, span: Span) {
        let snapshot = self.state.clone();
        let mut body_locals = locals.clone();
        self.check_block(body, &mut body_locals);
        let after = std::mem::replace(&mut self.state, snapshot.clone());
        self.state = self.join_states(&snapshot, vec![after, snapshot.clone()], span);
    }

    fn check_release(&mut self, target: &Expr, span: Span, locals: &mut HashMap<String, Type>) {
        self.check_expr(target, locals, false);
        let Some(name) = target.as_name() else { return };
        if let Some(region) = self.state.regions.get(name).copied() {
            let live = self.state.borrows.get(&region).cloned().unwrap_or_default();
            if !live.is_empty() {
                if self.unsafe_depth == 0 {
                    let first = &live[0];
                    self.errors.push(
                        Diagnostic::new(
                            DiagnosticKind::ReleaseWithLiveBorrow,
                            format!(
                                "cannot release '{name}' while view '{}' is live{}",
                                first.var,
                                self.fn_suffix()
                            ),
                            Some(span),
                        )
                        .with_label(first.span, format!("'{}' borrowed here", first.var)),
                    );
                }
                self.state.borrows.insert(region, Vec::new());
            }
        }
        self.state.moves.insert(name.to_string(), MoveState::Consumed(span));
    }

    fn check_expr(&mut self, expr: &Expr, locals: &mut HashMap<String, Type>, _allow_move: bool) {
        match &expr.kind {
            ExprKind::Name(name) => {
                self.check_read(name, expr.span);
            }
            ExprKind::Int(_) | ExprKind::Str(_) | ExprKind::Bool(_) => {}
            ExprKind::Member { value, .. } => self.check_expr(value, locals, false),
            ExprKind::Borrow { value, mutable } => {
                self.check_expr(value, locals, false);
                // an unbound borrow expression still obeys the alias rule
                if let Some(owner) = value.as_name() {
                    self.probe_borrow(owner, *mutable, expr.span);
                }
            }
            ExprKind::BorrowRange { buffer, start, end, mutable } => {
                self.check_expr(buffer, locals, false);
                self.check_expr(start, locals, true);
                self.check_expr(end, locals, true);
                if let Some(owner) = buffer.as_name() {
                    self.probe_borrow(owner, *mutable, expr.span);
                }
            }
            ExprKind::BufferCreate { size } => self.check_expr(size, locals, true),
            ExprKind::Move { value } => {
                self.check_expr(value, locals, false);
                if let Some(src) = value.as_name() {
                    self.move_binding(src, locals, value.span);
                }
            }
            ExprKind::Copy { value } => self.check_expr(value, locals, false),
            ExprKind::UnaryOp { value, .. } => self.check_expr(value, locals, true),
            ExprKind::BinOp { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                self.check_expr(left, locals, true);
                self.check_expr(right, locals, true);
            }
            ExprKind::Try { value } => self.check_expr(value, locals, true),
            ExprKind::Call { callee, args } => {
                let builtin = is_builtin_call(callee);
                for arg in args {
                    self.check_expr(arg, locals, true);
                    let Some(name) = arg.as_name() else { continue };
                    let t = locals.get(name).cloned().unwrap_or_else(Type::unit);
                    if builtin {
                        // runtime calls take an implicit immutable borrow for
                        // the duration of the call
                        if t.name == "buffer" {
                            self.probe_borrow(name, false, arg.span);
                        }
                        if is_consuming_builtin(callee) {
                            self.state.moves.insert(name.to_string(), MoveState::Consumed(arg.span));
                        }
                    } else if !t.is_copy {
                        // by-value passing moves ownership into the callee
                        self.move_binding(name, locals, arg.span);
                    }
                }
            }
        }
    }

    fn check_read(&mut self, name: &str, span: Span) {
        match self.state.moves.get(name) {
            Some(MoveState::Moved(at)) => {
                let at = *at;
                self.errors.push(
                    Diagnostic::new(
                        DiagnosticKind::UseAfterMove,
                        format!("use of moved value: '{name}'{}", self.fn_suffix()),
                        Some(span),
                    )
                    .with_label(at, "value moved here"),
                );
            }
            Some(MoveState::Consumed(at)) => {
                let at = *at;
                self.errors.push(
                    Diagnostic::new(
                        DiagnosticKind::UseAfterMove,
                        format!("use of released value: '{name}'{}", self.fn_suffix()),
                        Some(span),
                    )
                    .with_label(at, "value released here"),
                );
            }
            None => {}
        }
    }

    fn move_binding(&mut self, name: &str, locals: &HashMap<String, Type>, span: Span) {
        let Some(t) = locals.get(name) else { return };
        if t.is_copy {
            return;
        }
        if let Some(region) = self.state.regions.get(name).copied() {
            let live = self.state.borrows.get(&region).cloned().unwrap_or_default();
            if let Some(first) = live.first() {
                self.errors.push(
                    Diagnostic::new(
                        DiagnosticKind::BorrowAliasConflict,
                        format!(
                            "cannot move '{name}' while view '{}' is live{}",
                            first.var,
                            self.fn_suffix()
                        ),
                        Some(span),
                    )
                    .with_label(first.span, format!("'{}' borrowed here", first.var)),
                );
                return;
            }
        }
        self.state.moves.insert(name.to_string(), MoveState::Moved(span));
    }

    fn register_borrow(
        &mut self,
        owner: &str,
        var: &str,
        start: Option<i64>,
        end: Option<i64>,
        mutable: bool,
        span: Span,
    ) {
        let region = match self.state.regions.get(owner).copied() {
            Some(r) => r,
            // borrowing through a view binding reaches its region
            None => match self.state.view_regions.get(owner).copied() {
                Some(r) => r,
                None => return,
            },
        };
        let info = BorrowInfo { region, var: var.to_string(), start, end, mutable, span };
        let fn_suffix = self.fn_suffix();
        let live = self.state.borrows.entry(region).or_default();
        for existing in live.iter() {
            if info.conflicts_with(existing) {
                let kind_new = if mutable { "mutable" } else { "immutable" };
                let kind_old = if existing.mutable { "mutable" } else { "immutable" };
                self.errors.push(
                    Diagnostic::new(
                        DiagnosticKind::BorrowAliasConflict,
                        format!(
                            "{kind_new} borrow '{var}' overlaps {kind_old} borrow '{}'{}",
                            existing.var, fn_suffix
                        ),
                        Some(span),
                    )
                    .with_label(existing.span, format!("'{}' borrowed here", existing.var)),
                );
                return;
            }
        }
        live.push(info);
        self.state.view_regions.insert(var.to_string(), region);
    }

    /// Alias check for a borrow that is not bound to a name (or an implicit
    /// call-argument borrow): conflicts are reported, nothing is registered.
    fn probe_borrow(&mut self, owner: &str, mutable: bool, span: Span) {
        let Some(region) = self
            .state
            .regions
            .get(owner)
            .or_else(|| self.state.view_regions.get(owner))
            .copied()
        else {
            return;
        };
        let probe = BorrowInfo {
            region,
            var: "<temporary>".into(),
            start: None,
            end: None,
            mutable,
            span,
        };
        let live = self.state.borrows.get(&region).cloned().unwrap_or_default();
        for existing in &live {
            if probe.conflicts_with(existing) {
                let kind_new = if mutable { "mutable" } else { "immutable" };
                let kind_old = if existing.mutable { "mutable" } else { "immutable" };
                self.errors.push(
                    Diagnostic::new(
                        DiagnosticKind::BorrowAliasConflict,
                        format!(
                            "{kind_new} use of '{owner}' overlaps {kind_old} borrow '{}'{}",
                            existing.var,
                            self.fn_suffix()
                        ),
                        Some(span),
                    )
                    .with_label(existing.span, format!("'{}' borrowed here", existing.var)),
                );
                return;
            }
        }
    }

    fn drop_view_binding(&mut self, name: &str) {
        if let Some(region) = self.state.view_regions.remove(name) {
            if let Some(borrows) = self.state.borrows.get_mut(&region) {
                borrows.retain(|b| b.var != name);
            }
        }
    }

    fn all_borrows(&self) -> Vec<BorrowInfo> {
        self.state.borrows.values().flatten().cloned().collect()
    }

    fn expire_borrows_not_in(&mut self, keep: &[BorrowInfo]) {
        let mut expired_vars = Vec::new();
        for borrows in self.state.borrows.values_mut() {
            borrows.retain(|b| {
                let kept = keep.contains(b);
                if !kept {
                    expired_vars.push(b.var.clone());
                }
                kept
            });
        }
        for var in expired_vars {
            self.state.view_regions.remove(&var);
        }
    }

    /// Upper bound of branch states: moved anywhere ⇒ moved; the surviving
    /// borrows union, re-checked against the alias rule at the join point.
    fn join_states(&mut self, _before: &FnState, branches: Vec<FnState>, span: Span) -> FnState {
        let mut joined = FnState::default();
        for branch in &branches {
            for (name, state) in &branch.moves {
                joined
                    .moves
                    .entry(name.clone())
                    .or_insert_with(|| state.clone());
            }
            for (name, region) in &branch.regions {
                joined.regions.entry(name.clone()).or_insert(*region);
            }
            for (name, region) in &branch.view_regions {
                joined.view_regions.entry(name.clone()).or_insert(*region);
            }
            for (region, borrows) in &branch.borrows {
                let slot = joined.borrows.entry(*region).or_default();
                for b in borrows {
                    if !slot.contains(b) {
                        slot.push(b.clone());
                    }
                }
            }
        }
        // re-check the alias rule over the unioned borrow sets
        for borrows in joined.borrows.values() {
            for (i, a) in borrows.iter().enumerate() {
                for b in &borrows[i + 1..] {
                    if a.conflicts_with(b) {
                        self.errors.push(
                            Diagnostic::new(
                                DiagnosticKind::BorrowAliasConflict,
                                format!(
                                    "borrows '{}' and '{}' conflict after branch join{}",
                                    a.var,
                                    b.var,
                                    self.fn_suffix()
                                ),
                                Some(span),
                            )
                            .with_label(a.span, format!("'{}' borrowed here", a.var))
                            .with_label(b.span, format!("'{}' borrowed here", b.var)),
                        );
                    }
                }
            }
        }
        joined
    }

    fn fresh_region(&mut self) -> RegionId {
        self.next_region += 1;
        self.next_region
    }

    fn expr_type(&self, expr: &Expr, locals: &HashMap<String, Type>) -> Type {
        if let Some(name) = expr.as_name() {
            if let Some(t) = locals.get(name) {
                return t.clone();
            }
        }
        self.type_info
            .expr_types
            .get(&expr.id)
            .cloned()
            .unwrap_or_else(Type::unit)
    }

    fn named_type(&self, name: &str) -> Type {
        builtin_type(name)
            .or_else(|| self.type_info.named_types.get(name).cloned())
            .unwrap_or_else(|| Type::named(name, false))
    }

    fn fn_suffix(&self) -> String {
        match &self.current_function {
            Some(name) => format!(" (in fn {name})"),
            None => String::new(),
        }
    }
}

fn const_value(expr: &Expr) -> Option<i64> {
    match &expr.kind {
        ExprKind::Int(v) => Some(*v),
        ExprKind::UnaryOp { op: UnOp::Neg, value } => const_value(value).map(|v| -v),
        _ => None,
    }
}

fn bind_pattern_types(pattern: &Pattern, info: &TypeInfo, locals: &mut HashMap<String, Type>) {
    match pattern {
        Pattern::Bind { name, .. } => {
            locals.entry(name.clone()).or_insert_with(Type::unit);
        }
        Pattern::EnumVariant { payload, binding, .. } => {
            if let Some(b) = binding {
                locals.entry(b.clone()).or_insert_with(Type::unit);
            }
            if let Some(p) = payload {
                bind_pattern_types(p, info, locals);
            }
        }
        Pattern::Struct { fields, .. } => {
            for f in fields {
                bind_pattern_types(f, info, locals);
            }
        }
        Pattern::Wildcard { .. } | Pattern::Literal { .. } => {}
    }
}

/// Runtime-table calls take their arguments by borrow, not by move.
fn is_builtin_call(callee: &str) -> bool {
    matches!(
        callee,
        "str_len" | "str_char_at" | "str_find_char" | "str_starts_with" | "str_to_int"
            | "str_substr" | "str_trim" | "str_concat" | "str_release" | "int_to_str"
            | "bool_to_str" | "file_read" | "file_write" | "file_exists" | "file_delete"
            | "file_move" | "file_copy" | "dir_create" | "dir_exists" | "module_load"
            | "error_last" | "error_clear" | "panic" | "vec_new" | "vec_push" | "vec_get"
            | "vec_len" | "vec_release" | "tensor_create" | "tensor_matmul" | "tensor_release"
            | "channel" | "send" | "recv" | "channel_close" | "spawn" | "log_set_level"
            | "log_info" | "log_warn" | "log_error" | "net_connect" | "net_send" | "net_recv"
            | "net_close" | "rt_string_live" | "rt_vec_live" | "rt_buffer_live"
            | "rt_channel_live"
    )
}

/// Builtins that end their argument's lifetime.
fn is_consuming_builtin(callee: &str) -> bool {
    matches!(
        callee,
        "str_release" | "vec_release" | "tensor_release" | "channel_close"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::source::SourceFile;
    use crate::typeck::{ExternalContext, TypeChecker};

    fn borrow_check(src: &str) -> Vec<Diagnostic> {
        let sf = SourceFile::new(0, "test.dsy".into(), src);
        let mut module = parser::parse(&sf).expect("parse failed");
        let mut checker = TypeChecker::new(ExternalContext::default());
        let info = checker.check_module(&mut module);
        assert!(
            checker.errors.is_empty(),
            "type errors before borrowck: {:?}",
            checker.errors
        );
        let mut borrow = BorrowChecker::new(&info);
        borrow.check_module(&module);
        borrow.errors
    }

    fn kinds(diags: &[Diagnostic]) -> Vec<DiagnosticKind> {
        diags.iter().map(|d| d.kind).collect()
    }

    #[test]
    fn use_after_move_is_rejected_with_origin() {
        let errs = borrow_check(
            "module m\nfn main() -> int:\n  let a = buffer(8)\n  let b = move a\n  release a\n  return 0\n",
        );
        assert!(kinds(&errs).contains(&DiagnosticKind::UseAfterMove), "got {errs:?}");
        let diag = errs.iter().find(|d| d.kind == DiagnosticKind::UseAfterMove).unwrap();
        assert!(!diag.labels.is_empty(), "move origin label missing");
    }

    #[test]
    fn korean_move_is_the_same_rule() {
        let errs = borrow_check(
            "모듈 m\n함수 main 정의:\n  a를 8바이트로 생성한다\n  a를 b로 이동한다\n  a를 해제한다\n  0을 반환한다\n",
        );
        assert!(kinds(&errs).contains(&DiagnosticKind::UseAfterMove), "got {errs:?}");
    }

    #[test]
    fn shadowing_let_restores_ownership() {
        let errs = borrow_check(
            "module m\nfn main() -> int:\n  let a = buffer(8)\n  let b = move a\n  let a = buffer(4)\n  release a\n  release b\n  return 0\n",
        );
        assert!(errs.is_empty(), "got {errs:?}");
    }

    #[test]
    fn overlapping_mutable_borrow_conflicts() {
        let errs = borrow_check(
            "module m\nfn main() -> int:\n  let r = buffer(8)\n  let v1 = borrow mut r[0..8]\n  let v2 = borrow r[0..4]\n  return 0\n",
        );
        let diag = errs
            .iter()
            .find(|d| d.kind == DiagnosticKind::BorrowAliasConflict)
            .unwrap_or_else(|| panic!("expected alias conflict, got {errs:?}"));
        assert!(diag.message.contains("v2") && diag.message.contains("v1"));
    }

    #[test]
    fn disjoint_ranges_do_not_alias() {
        let errs = borrow_check(
            "module m\nfn main() -> int:\n  let r = buffer(8)\n  let v1 = borrow mut r[0..4]\n  let v2 = borrow mut r[4..8]\n  return 0\n",
        );
        assert!(errs.is_empty(), "got {errs:?}");
    }

    #[test]
    fn two_immutable_borrows_are_fine() {
        let errs = borrow_check(
            "module m\nfn main() -> int:\n  let r = buffer(8)\n  let v1 = borrow r[0..8]\n  let v2 = borrow r[0..8]\n  return 0\n",
        );
        assert!(errs.is_empty(), "got {errs:?}");
    }

    #[test]
    fn release_with_live_borrow_is_rejected() {
        let errs = borrow_check(
            "module m\nfn main() -> int:\n  let r = buffer(8)\n  let v = borrow r[0..8]\n  release r\n  return 0\n",
        );
        assert!(kinds(&errs).contains(&DiagnosticKind::ReleaseWithLiveBorrow), "got {errs:?}");
    }

    #[test]
    fn unsafe_waives_release_only() {
        let errs = borrow_check(
            "module m\nfn main() -> int:\n  let r = buffer(8)\n  let v = borrow r[0..8]\n  unsafe \"audited\":\n    release r\n  return 0\n",
        );
        assert!(errs.is_empty(), "got {errs:?}");
    }

    #[test]
    fn unsafe_does_not_waive_use_after_move() {
        let errs = borrow_check(
            "module m\nfn main() -> int:\n  let a = buffer(8)\n  let b = move a\n  unsafe \"audited\":\n    release a\n  return 0\n",
        );
        assert!(kinds(&errs).contains(&DiagnosticKind::UseAfterMove), "got {errs:?}");
    }

    #[test]
    fn unsafe_does_not_waive_alias_conflicts() {
        let errs = borrow_check(
            "module m\nfn main() -> int:\n  let r = buffer(8)\n  unsafe \"audited\":\n    let v1 = borrow mut r[0..8]\n    let v2 = borrow r[0..4]\n  return 0\n",
        );
        assert!(kinds(&errs).contains(&DiagnosticKind::BorrowAliasConflict), "got {errs:?}");
    }

    #[test]
    fn borrows_expire_at_block_end() {
        let errs = borrow_check(
            "module m\nfn main() -> int:\n  let r = buffer(8)\n  if true:\n    let v = borrow mut r[0..8]\n    print 1\n  release r\n  return 0\n",
        );
        assert!(errs.is_empty(), "got {errs:?}");
    }

    #[test]
    fn branch_move_propagates_to_join() {
        let errs = borrow_check(
            "module m\nfn main() -> int:\n  let a = buffer(8)\n  if true:\n    let b = move a\n    release b\n  release a\n  return 0\n",
        );
        assert!(kinds(&errs).contains(&DiagnosticKind::UseAfterMove), "got {errs:?}");
    }

    #[test]
    fn overwriting_view_binding_ends_its_borrow() {
        let errs = borrow_check(
            "module m\nfn main() -> int:\n  let r = buffer(8)\n  let v = borrow mut r[0..8]\n  let v = 1\n  let w = borrow mut r[0..8]\n  return 0\n",
        );
        assert!(errs.is_empty(), "got {errs:?}");
    }

    #[test]
    fn moving_while_borrowed_is_rejected() {
        let errs = borrow_check(
            "module m\nfn main() -> int:\n  let r = buffer(8)\n  let v = borrow r[0..8]\n  let s = move r\n  return 0\n",
        );
        assert!(kinds(&errs).contains(&DiagnosticKind::BorrowAliasConflict), "got {errs:?}");
    }

    #[test]
    fn release_then_use_is_rejected() {
        let errs = borrow_check(
            "module m\nfn main() -> int:\n  let s = int_to_str(1)\n  release s\n  print s\n  return 0\n",
        );
        assert!(kinds(&errs).contains(&DiagnosticKind::UseAfterMove), "got {errs:?}");
    }

    #[test]
    fn builtin_calls_do_not_move_their_arguments() {
        let errs = borrow_check(
            "module m\nfn main() -> int:\n  let v = vec_new()\n  let x = vec_len(v)\n  let y = vec_len(v)\n  release v\n  return x + y\n",
        );
        assert!(errs.is_empty(), "got {errs:?}");
    }

    #[test]
    fn passing_owner_to_function_moves_it() {
        let errs = borrow_check(
            "module m\nfn eat(b: buffer) -> int:\n  return 0\nfn main() -> int:\n  let a = buffer(8)\n  let x = eat(a)\n  release a\n  return x\n",
        );
        assert!(kinds(&errs).contains(&DiagnosticKind::UseAfterMove), "got {errs:?}");
    }
}
