//! AST to IR lowering.
//!
//! `try` becomes a tag test with an early-return branch; `and`/`or` become
//! branches joined by `phi`; `repeat` becomes a counted loop whose body is
//! skipped for non-positive bounds; `match` becomes a chain of tag/literal
//! tests. Releases inside `unsafe` blocks carry the waived flag.

use std::collections::HashMap;

use crate::ast::*;
use crate::ir::{Block, Instr, IrEnum, IrExtern, IrFunction, IrModule, IrParam, IrStruct, Op};
use crate::types::{Type, TypeInfo};

pub struct Lowering<'a> {
    struct_defs: &'a HashMap<String, Vec<(String, Type)>>,
    enum_defs: &'a HashMap<String, Vec<(String, Option<Type>)>>,
    type_info: &'a TypeInfo,
    blocks: Vec<Block>,
    current: usize,
    temp: u32,
    label: u32,
    /// (continue target, break target) per enclosing loop.
    loops: Vec<(String, String)>,
    unsafe_depth: usize,
    unsafe_log: Vec<String>,
}

pub fn lower_module(
    module: &Module,
    struct_defs: &HashMap<String, Vec<(String, Type)>>,
    enum_defs: &HashMap<String, Vec<(String, Option<Type>)>>,
    type_info: &TypeInfo,
) -> IrModule {
    let mut lowering = Lowering {
        struct_defs,
        enum_defs,
        type_info,
        blocks: Vec::new(),
        current: 0,
        temp: 0,
        label: 0,
        loops: Vec::new(),
        unsafe_depth: 0,
        unsafe_log: Vec::new(),
    };

    let mut structs: Vec<IrStruct> = struct_defs
        .iter()
        .map(|(name, fields)| IrStruct {
            name: name.clone(),
            fields: fields.iter().map(|(f, t)| (f.clone(), t.name.clone())).collect(),
        })
        .collect();
    structs.sort_by(|a, b| a.name.cmp(&b.name));
    let mut enums: Vec<IrEnum> = enum_defs
        .iter()
        .map(|(name, cases)| IrEnum {
            name: name.clone(),
            cases: cases
                .iter()
                .map(|(c, p)| (c.clone(), p.as_ref().map(|t| t.name.clone())))
                .collect(),
        })
        .collect();
    enums.sort_by(|a, b| a.name.cmp(&b.name));

    let mut functions = Vec::new();
    let mut externs = Vec::new();
    for stmt in &module.body {
        match stmt {
            Stmt::Func(func) => {
                if func.type_params.is_empty() {
                    functions.push(lowering.lower_function(func));
                }
            }
            Stmt::Extern(ext) => externs.push(IrExtern {
                name: ext.name.clone(),
                params: ext
                    .params
                    .iter()
                    .map(|p| IrParam { name: p.name.clone(), ty: p.type_ref.name.clone() })
                    .collect(),
                return_type: ext.return_type.name.clone(),
            }),
            _ => {}
        }
    }

    IrModule { name: module.name.clone(), functions, externs, structs, enums }
}

impl<'a> Lowering<'a> {
    fn lower_function(&mut self, func: &FunctionDef) -> IrFunction {
        self.blocks = vec![Block::new("entry")];
        self.current = 0;
        self.temp = 0;
        self.label = 0;
        self.loops.clear();
        self.unsafe_depth = 0;
        self.unsafe_log.clear();

        for stmt in &func.body {
            self.lower_stmt(stmt);
        }
        if !self.blocks[self.current].is_terminated() {
            let zero = self.fresh_temp();
            self.emit(Instr::typed(Op::Const, vec!["0".into()], zero.clone(), "int"));
            self.emit(Instr::new(Op::Ret, vec![zero]));
        }

        IrFunction {
            name: func.name.clone(),
            params: func
                .params
                .iter()
                .map(|p| IrParam { name: p.name.clone(), ty: p.type_ref.name.clone() })
                .collect(),
            return_type: func.return_type.name.clone(),
            blocks: std::mem::take(&mut self.blocks),
            unsafe_blocks: std::mem::take(&mut self.unsafe_log),
        }
    }

    fn lower_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let { name, init, .. } => match &init.kind {
                ExprKind::BufferCreate { size } => {
                    let size_v = self.lower_expr(size);
                    self.emit(Instr::typed(Op::BufCreate, vec![size_v], name.clone(), "buffer"));
                }
                ExprKind::BorrowRange { buffer, start, end, mutable } => {
                    let buf = self.lower_expr(buffer);
                    let start_v = self.lower_expr(start);
                    let end_v = self.lower_expr(end);
                    self.emit(Instr::typed(
                        Op::BufBorrow,
                        vec![buf, start_v, end_v, flag(*mutable)],
                        name.clone(),
                        "view",
                    ));
                }
                ExprKind::Borrow { value, mutable } => {
                    let v = self.lower_expr(value);
                    self.emit(Instr::typed(
                        Op::ViewBorrow,
                        vec![v, flag(*mutable)],
                        name.clone(),
                        "view",
                    ));
                }
                _ => {
                    let v = self.lower_expr(init);
                    if name != "_" {
                        self.emit(Instr::with_result(Op::Assign, vec![v], name.clone()));
                    }
                }
            },
            Stmt::Assign { target, value, .. } => {
                let v = self.lower_expr(value);
                if let ExprKind::Member { value: base, name } = &target.kind {
                    let base_v = self.lower_expr(base);
                    self.emit(Instr::new(Op::StructSet, vec![base_v, name.clone(), v]));
                }
            }
            Stmt::AddAssign { target, value, .. } => {
                let t = self.lower_expr(target);
                let v = self.lower_expr(value);
                let sum = self.fresh_temp();
                self.emit(Instr::typed(Op::Add, vec![t, v], sum.clone(), "int"));
                if let Some(name) = target.as_name() {
                    self.emit(Instr::with_result(Op::Assign, vec![sum], name.to_string()));
                }
            }
            Stmt::Print { value, .. } => {
                let v = self.lower_expr(value);
                self.emit(Instr::new(Op::Print, vec![v]));
            }
            Stmt::Return { value, .. } => {
                let v = match value {
                    Some(v) => self.lower_expr(v),
                    None => {
                        let zero = self.fresh_temp();
                        self.emit(Instr::typed(Op::Const, vec!["0".into()], zero.clone(), "int"));
                        zero
                    }
                };
                self.emit(Instr::new(Op::Ret, vec![v]));
            }
            Stmt::If { cond, then_body, else_body, .. } => {
                let cond_v = self.lower_expr(cond);
                let then_l = self.fresh_label();
                let join_l = self.fresh_label();
                let else_l = if else_body.is_some() { self.fresh_label() } else { join_l.clone() };
                self.emit(Instr::new(Op::CondBr, vec![cond_v, then_l.clone(), else_l.clone()]));
                self.start_block(&then_l);
                for inner in then_body {
                    self.lower_stmt(inner);
                }
                self.branch_to(&join_l);
                if let Some(body) = else_body {
                    self.start_block(&else_l);
                    for inner in body {
                        self.lower_stmt(inner);
                    }
                    self.branch_to(&join_l);
                }
                self.start_block(&join_l);
            }
            Stmt::While { cond, body, .. } => {
                let header = self.fresh_label();
                let body_l = self.fresh_label();
                let exit = self.fresh_label();
                self.branch_to(&header);
                self.start_block(&header);
                let cond_v = self.lower_expr(cond);
                self.emit(Instr::new(Op::CondBr, vec![cond_v, body_l.clone(), exit.clone()]));
                self.start_block(&body_l);
                self.loops.push((header.clone(), exit.clone()));
                for inner in body {
                    self.lower_stmt(inner);
                }
                self.loops.pop();
                self.branch_to(&header);
                self.start_block(&exit);
            }
            Stmt::Repeat { count, body, .. } => {
                // non-positive bounds never enter the body
                let count_v = self.lower_expr(count);
                let counter = self.fresh_temp();
                self.emit(Instr::typed(Op::Const, vec!["0".into()], counter.clone(), "int"));
                let header = self.fresh_label();
                let body_l = self.fresh_label();
                let latch = self.fresh_label();
                let exit = self.fresh_label();
                self.branch_to(&header);
                self.start_block(&header);
                let cond = self.fresh_temp();
                self.emit(Instr::typed(
                    Op::Lt,
                    vec![counter.clone(), count_v],
                    cond.clone(),
                    "bool",
                ));
                self.emit(Instr::new(Op::CondBr, vec![cond, body_l.clone(), exit.clone()]));
                self.start_block(&body_l);
                self.loops.push((latch.clone(), exit.clone()));
                for inner in body {
                    self.lower_stmt(inner);
                }
                self.loops.pop();
                self.branch_to(&latch);
                self.start_block(&latch);
                let next = self.fresh_temp();
                self.emit(Instr::typed(
                    Op::Add,
                    vec![counter.clone(), "1".into()],
                    next.clone(),
                    "int",
                ));
                self.emit(Instr::with_result(Op::Assign, vec![next], counter));
                self.branch_to(&header);
                self.start_block(&exit);
            }
            Stmt::Break { .. } => {
                if let Some((_, exit)) = self.loops.last().cloned() {
                    self.emit(Instr::new(Op::Br, vec![exit]));
                }
            }
            Stmt::Continue { .. } => {
                if let Some((target, _)) = self.loops.last().cloned() {
                    self.emit(Instr::new(Op::Br, vec![target]));
                }
            }
            Stmt::Match { scrutinee, arms, else_body, .. } => {
                self.lower_match(scrutinee, arms, else_body.as_deref());
            }
            Stmt::Release { target, span } => {
                let v = self.lower_expr(target);
                let _ = span;
                self.emit(Instr::new(Op::Release { waived: self.unsafe_depth > 0 }, vec![v]));
            }
            Stmt::Unsafe { reason, body, span } => {
                self.unsafe_log.push(format!(
                    "L{}:{} {}",
                    span.line,
                    span.column,
                    reason.as_deref().unwrap_or("missing")
                ));
                self.unsafe_depth += 1;
                for inner in body {
                    self.lower_stmt(inner);
                }
                self.unsafe_depth -= 1;
            }
            Stmt::Func(_) | Stmt::Extern(_) | Stmt::Struct(_) | Stmt::Enum(_) | Stmt::Trait(_)
            | Stmt::Impl(_) | Stmt::Import(_) => {}
        }
    }

    fn lower_match(&mut self, scrutinee: &Expr, arms: &[MatchArm], else_body: Option<&[Stmt]>) {
        let val = self.lower_expr(scrutinee);
        let join = self.fresh_label();
        let mut next = self.fresh_label();
        self.branch_to(&next);
        for arm in arms {
            self.start_block(&next);
            next = self.fresh_label();
            self.lower_pattern_test(&arm.pattern, &val, &next);
            if let Some(guard) = &arm.guard {
                let g = self.lower_expr(guard);
                let body_l = self.fresh_label();
                self.emit(Instr::new(Op::CondBr, vec![g, body_l.clone(), next.clone()]));
                self.start_block(&body_l);
            }
            for inner in &arm.body {
                self.lower_stmt(inner);
            }
            self.branch_to(&join);
        }
        self.start_block(&next);
        if let Some(body) = else_body {
            for inner in body {
                self.lower_stmt(inner);
            }
        }
        self.branch_to(&join);
        self.start_block(&join);
    }

    /// Emits the tests and bindings for one pattern; control falls through in
    /// the current block on success and jumps to `fail` otherwise.
    fn lower_pattern_test(&mut self, pattern: &Pattern, val: &str, fail: &str) {
        match pattern {
            Pattern::Wildcard { .. } => {}
            Pattern::Bind { name, .. } => {
                self.emit(Instr::with_result(Op::Assign, vec![val.to_string()], name.clone()));
            }
            Pattern::Literal { value } => {
                let lit = self.lower_expr(value);
                let cond = self.fresh_temp();
                self.emit(Instr::typed(Op::Eq, vec![val.to_string(), lit], cond.clone(), "bool"));
                let pass = self.fresh_label();
                self.emit(Instr::new(Op::CondBr, vec![cond, pass.clone(), fail.to_string()]));
                self.start_block(&pass);
            }
            Pattern::EnumVariant { enum_name, case_name, payload, binding, .. } => {
                let tag = self.fresh_temp();
                self.emit(Instr::typed(Op::EnumTag, vec![val.to_string()], tag.clone(), "int"));
                let index = self.enum_case_index(enum_name, case_name);
                let cond = self.fresh_temp();
                self.emit(Instr::typed(
                    Op::Eq,
                    vec![tag, index.to_string()],
                    cond.clone(),
                    "bool",
                ));
                let pass = self.fresh_label();
                self.emit(Instr::new(Op::CondBr, vec![cond, pass.clone(), fail.to_string()]));
                self.start_block(&pass);
                if let Some(bind_name) = binding {
                    self.emit(Instr::with_result(
                        Op::EnumPayload,
                        vec![val.to_string(), case_name.clone()],
                        bind_name.clone(),
                    ));
                } else if let Some(inner) = payload {
                    let payload_v = self.fresh_temp();
                    self.emit(Instr::with_result(
                        Op::EnumPayload,
                        vec![val.to_string(), case_name.clone()],
                        payload_v.clone(),
                    ));
                    self.lower_pattern_test(inner, &payload_v, fail);
                }
            }
            Pattern::Struct { name, fields, .. } => {
                let def_fields = self.struct_defs.get(name).cloned().unwrap_or_default();
                for (field_pattern, (field_name, _)) in fields.iter().zip(def_fields.iter()) {
                    let field_v = self.fresh_temp();
                    self.emit(Instr::with_result(
                        Op::StructGet,
                        vec![val.to_string(), field_name.clone()],
                        field_v.clone(),
                    ));
                    self.lower_pattern_test(field_pattern, &field_v, fail);
                }
            }
        }
    }

    fn lower_expr(&mut self, expr: &Expr) -> String {
        match &expr.kind {
            ExprKind::Int(v) => {
                let t = self.fresh_temp();
                self.emit(Instr::typed(Op::Const, vec![v.to_string()], t.clone(), "int"));
                t
            }
            ExprKind::Bool(b) => {
                let t = self.fresh_temp();
                self.emit(Instr::typed(Op::Const, vec![flag(*b)], t.clone(), "bool"));
                t
            }
            ExprKind::Str(s) => {
                let t = self.fresh_temp();
                let instr = Instr {
                    op: Op::ConstStr,
                    args: vec![s.clone()],
                    result: Some(t.clone()),
                    ty: Some("string".into()),
                };
                self.emit(instr);
                t
            }
            ExprKind::Name(name) => name.clone(),
            ExprKind::Member { value, name } => {
                let base = self.lower_expr(value);
                let t = self.fresh_temp();
                self.emit(Instr::with_result(Op::StructGet, vec![base, name.clone()], t.clone()));
                t
            }
            ExprKind::BinOp { left, op, right } => {
                let l = self.lower_expr(left);
                let r = self.lower_expr(right);
                let t = self.fresh_temp();
                let (ir_op, ty) = match op {
                    BinOp::Add => (Op::Add, "int"),
                    BinOp::Sub => (Op::Sub, "int"),
                    BinOp::Mul => (Op::Mul, "int"),
                    BinOp::Div => (Op::Div, "int"),
                    BinOp::Eq => (Op::Eq, "bool"),
                    BinOp::Ne => (Op::Ne, "bool"),
                    BinOp::Lt => (Op::Lt, "bool"),
                    BinOp::Gt => (Op::Gt, "bool"),
                    BinOp::Le => (Op::Le, "bool"),
                    BinOp::Ge => (Op::Ge, "bool"),
                };
                self.emit(Instr::typed(ir_op, vec![l, r], t.clone(), ty));
                t
            }
            ExprKind::UnaryOp { op, value } => {
                let v = self.lower_expr(value);
                match op {
                    UnOp::Plus => v,
                    UnOp::Neg => {
                        let t = self.fresh_temp();
                        self.emit(Instr::typed(Op::Neg, vec![v], t.clone(), "int"));
                        t
                    }
                }
            }
            ExprKind::Logical { left, op, right } => self.lower_logical(left, *op, right),
            ExprKind::Try { value } => self.lower_try(value),
            ExprKind::Call { callee, args } => self.lower_call(callee, args),
            ExprKind::Move { value } | ExprKind::Copy { value } => {
                let v = self.lower_expr(value);
                let t = self.fresh_temp();
                self.emit(Instr::with_result(Op::Assign, vec![v], t.clone()));
                t
            }
            ExprKind::Borrow { value, mutable } => {
                let v = self.lower_expr(value);
                let t = self.fresh_temp();
                self.emit(Instr::typed(Op::ViewBorrow, vec![v, flag(*mutable)], t.clone(), "view"));
                t
            }
            ExprKind::BufferCreate { size } => {
                let size_v = self.lower_expr(size);
                let t = self.fresh_temp();
                self.emit(Instr::typed(Op::BufCreate, vec![size_v], t.clone(), "buffer"));
                t
            }
            ExprKind::BorrowRange { buffer, start, end, mutable } => {
                let buf = self.lower_expr(buffer);
                let s = self.lower_expr(start);
                let e = self.lower_expr(end);
                let t = self.fresh_temp();
                self.emit(Instr::typed(
                    Op::BufBorrow,
                    vec![buf, s, e, flag(*mutable)],
                    t.clone(),
                    "view",
                ));
                t
            }
        }
    }

    /// Short-circuit lowering: branches plus a `phi` join, never bit ops.
    fn lower_logical(&mut self, left: &Expr, op: LogicalOp, right: &Expr) -> String {
        let l = self.lower_expr(left);
        let left_label = self.blocks[self.current].label.clone();
        let rhs_l = self.fresh_label();
        let join_l = self.fresh_label();
        match op {
            LogicalOp::And => {
                self.emit(Instr::new(Op::CondBr, vec![l.clone(), rhs_l.clone(), join_l.clone()]));
            }
            LogicalOp::Or => {
                self.emit(Instr::new(Op::CondBr, vec![l.clone(), join_l.clone(), rhs_l.clone()]));
            }
        }
        self.start_block(&rhs_l);
        let r = self.lower_expr(right);
        let rhs_end = self.blocks[self.current].label.clone();
        self.emit(Instr::new(Op::Br, vec![join_l.clone()]));
        self.start_block(&join_l);
        let result = self.fresh_temp();
        self.emit(Instr::typed(
            Op::Phi,
            vec![l, left_label, r, rhs_end],
            result.clone(),
            "bool",
        ));
        result
    }

    /// `try E`: tag test, early return of the failure value lifted to the
    /// outer return type, payload projection on the success path.
    fn lower_try(&mut self, inner: &Expr) -> String {
        let v = self.lower_expr(inner);
        let inner_type = self
            .type_info
            .expr_types
            .get(&inner.id)
            .map(|t| t.name.clone())
            .unwrap_or_default();
        let base = inner_type.split("__").next().unwrap_or_default().to_string();
        if (base != "Result" && base != "Option") || !self.enum_defs.contains_key(&inner_type) {
            return v;
        }
        let (ok_case, err_case) = if base == "Result" { ("Ok", "Err") } else { ("Some", "None") };
        let tag = self.fresh_temp();
        self.emit(Instr::typed(Op::EnumTag, vec![v.clone()], tag.clone(), "int"));
        let err_index = self.enum_case_index(&inner_type, err_case);
        let cond = self.fresh_temp();
        self.emit(Instr::typed(
            Op::Eq,
            vec![tag, err_index.to_string()],
            cond.clone(),
            "bool",
        ));
        let err_l = self.fresh_label();
        let ok_l = self.fresh_label();
        self.emit(Instr::new(Op::CondBr, vec![cond, err_l.clone(), ok_l.clone()]));
        self.start_block(&err_l);
        self.emit(Instr::new(Op::Ret, vec![v.clone()]));
        self.start_block(&ok_l);
        let ok_v = self.fresh_temp();
        self.emit(Instr::with_result(
            Op::EnumPayload,
            vec![v, ok_case.to_string()],
            ok_v.clone(),
        ));
        ok_v
    }

    fn lower_call(&mut self, callee: &str, args: &[Expr]) -> String {
        let arg_values: Vec<String> = args.iter().map(|a| self.lower_expr(a)).collect();
        let t = self.fresh_temp();
        if self.struct_defs.contains_key(callee) {
            let mut instr_args = vec![callee.to_string()];
            instr_args.extend(arg_values);
            self.emit(Instr::typed(Op::StructNew, instr_args, t.clone(), callee));
            return t;
        }
        if let Some((enum_name, case_name)) = callee.split_once('.') {
            if self.enum_defs.contains_key(enum_name) {
                let mut instr_args = vec![enum_name.to_string(), case_name.to_string()];
                instr_args.extend(arg_values);
                self.emit(Instr::typed(Op::EnumMake, instr_args, t.clone(), enum_name));
                return t;
            }
        }
        let mut instr_args = vec![callee.to_string()];
        instr_args.extend(arg_values);
        self.emit(Instr::with_result(Op::Call, instr_args, t.clone()));
        t
    }

    fn enum_case_index(&self, enum_name: &str, case_name: &str) -> i64 {
        self.enum_defs
            .get(enum_name)
            .and_then(|cases| cases.iter().position(|(n, _)| n == case_name))
            .map(|i| i as i64)
            .unwrap_or(-1)
    }

    // === block plumbing ===

    fn emit(&mut self, instr: Instr) {
        let block = &mut self.blocks[self.current];
        // nothing may follow a terminator; unreachable code is dropped
        if !block.is_terminated() {
            block.instrs.push(instr);
        }
    }

    fn branch_to(&mut self, label: &str) {
        self.emit(Instr::new(Op::Br, vec![label.to_string()]));
    }

    fn start_block(&mut self, label: &str) {
        self.blocks.push(Block::new(label));
        self.current = self.blocks.len() - 1;
    }

    fn fresh_temp(&mut self) -> String {
        self.temp += 1;
        format!("t{}", self.temp)
    }

    fn fresh_label(&mut self) -> String {
        self.label += 1;
        format!("bb{}", self.label)
    }
}

fn flag(b: bool) -> String {
    if b { "1".into() } else { "0".into() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::validate_module;
    use crate::parser;
    use crate::source::SourceFile;
    use crate::typeck::{ExternalContext, TypeChecker};

    fn lower(src: &str) -> IrModule {
        let sf = SourceFile::new(0, "test.dsy".into(), src);
        let mut module = parser::parse(&sf).expect("parse failed");
        let mut checker = TypeChecker::new(ExternalContext::default());
        let info = checker.check_module(&mut module);
        assert!(checker.errors.is_empty(), "type errors: {:?}", checker.errors);
        for func in checker.impl_functions.clone() {
            module.body.push(Stmt::Func(func));
        }
        for func in checker.specialized_functions.clone() {
            module.body.push(Stmt::Func(func));
        }
        let ir = lower_module(&module, &checker.struct_defs, &checker.enum_defs, &info);
        if let Err(errors) = validate_module(&ir) {
            panic!("IR validation failed: {errors:?}");
        }
        ir
    }

    fn func<'m>(ir: &'m IrModule, name: &str) -> &'m IrFunction {
        ir.functions.iter().find(|f| f.name == name).unwrap()
    }

    fn ops(f: &IrFunction) -> Vec<Op> {
        f.blocks.iter().flat_map(|b| b.instrs.iter().map(|i| i.op.clone())).collect()
    }

    #[test]
    fn blocks_are_terminated() {
        let ir = lower("module m\nfn main() -> int:\n  if 1 > 0:\n    print 1\n  return 0\n");
        for block in &func(&ir, "main").blocks {
            assert!(block.is_terminated(), "unterminated block {}", block.label);
        }
    }

    #[test]
    fn repeat_lowers_to_counted_loop() {
        let ir = lower("module m\nfn main() -> int:\n  repeat 3:\n    print 1\n  return 0\n");
        let f = func(&ir, "main");
        assert!(ops(f).contains(&Op::Lt));
        assert!(ops(f).contains(&Op::CondBr));
        assert!(f.blocks.len() >= 4);
    }

    #[test]
    fn short_circuit_uses_phi_not_bitops() {
        let ir = lower(
            "module m\nfn f(a: bool, b: bool) -> bool:\n  if a and b:\n    return true\n  return false\n",
        );
        let f = func(&ir, "f");
        assert!(ops(f).contains(&Op::Phi));
    }

    #[test]
    fn try_lowers_to_tag_branch_and_early_return() {
        let ir = lower(
            "module m\nfn inner() -> Result<int, int>:\n  return Result.Ok(41)\nfn outer() -> Result<int, int>:\n  let x = try inner()\n  return Result.Ok(x + 1)\n",
        );
        let f = func(&ir, "outer");
        let all = ops(f);
        assert!(all.contains(&Op::EnumTag));
        assert!(all.contains(&Op::EnumPayload));
        let rets = all.iter().filter(|o| **o == Op::Ret).count();
        assert!(rets >= 2, "expected the early-return branch");
    }

    #[test]
    fn release_in_unsafe_is_waived() {
        let ir = lower(
            "module m\nfn main() -> int:\n  let r = buffer(8)\n  unsafe \"audited\":\n    release r\n  return 0\n",
        );
        let f = func(&ir, "main");
        assert!(ops(f).contains(&Op::Release { waived: true }));
        assert_eq!(f.unsafe_blocks.len(), 1);
        assert!(f.unsafe_blocks[0].contains("audited"));
    }

    #[test]
    fn generic_instantiations_reach_ir_without_type_params() {
        let ir = lower(
            "module m\nfn id<T>(x: T) -> T:\n  return x\nfn main() -> int:\n  let a = id<int>(1)\n  return a\n",
        );
        assert!(ir.functions.iter().any(|f| f.name == "id__int"));
        assert!(!ir.functions.iter().any(|f| f.name == "id"));
    }

    #[test]
    fn match_lowers_to_tag_tests() {
        let ir = lower(
            "module m\nenum Shape:\n  case Dot\n  case Line: int\nfn f(s: Shape) -> int:\n  match s:\n    case Shape.Dot:\n      return 0\n    case Shape.Line(n):\n      return n\n  return 9\n",
        );
        let f = func(&ir, "f");
        let all = ops(f);
        assert!(all.iter().filter(|o| **o == Op::EnumTag).count() >= 2);
        assert!(all.contains(&Op::EnumPayload));
    }
}
