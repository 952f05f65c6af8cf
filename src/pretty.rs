//! Canonical English-surface printer.
//!
//! `print_module` emits the canonical form of an AST: parsing it back yields
//! the same tree, and a Korean-surface program prints identically to its
//! English translation. The equivalence tests lean on both facts.

use crate::ast::*;

pub fn print_module(module: &Module) -> String {
    let mut out = String::new();
    out.push_str(&format!("module {}\n", module.name));
    for stmt in &module.body {
        print_stmt(&mut out, stmt, 0);
    }
    out
}

fn indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str("  ");
    }
}

fn print_block(out: &mut String, body: &[Stmt], level: usize) {
    for stmt in body {
        print_stmt(out, stmt, level);
    }
}

fn print_stmt(out: &mut String, stmt: &Stmt, level: usize) {
    match stmt {
        Stmt::Let { name, ty, init, .. } => {
            indent(out, level);
            match ty {
                Some(t) => out.push_str(&format!("let {}: {} = {}\n", name, type_ref(t), expr(init))),
                None => out.push_str(&format!("let {} = {}\n", name, expr(init))),
            }
        }
        Stmt::Assign { target, value, .. } => {
            indent(out, level);
            out.push_str(&format!("set {} = {}\n", expr(target), expr(value)));
        }
        Stmt::AddAssign { target, value, .. } => {
            indent(out, level);
            out.push_str(&format!("add {} to {}\n", expr(value), expr(target)));
        }
        Stmt::If { cond, then_body, else_body, .. } => {
            indent(out, level);
            out.push_str(&format!("if {}:\n", expr(cond)));
            print_block(out, then_body, level + 1);
            print_else(out, else_body.as_deref(), level);
        }
        Stmt::While { cond, body, .. } => {
            indent(out, level);
            out.push_str(&format!("while {}:\n", expr(cond)));
            print_block(out, body, level + 1);
        }
        Stmt::Repeat { count, body, .. } => {
            indent(out, level);
            out.push_str(&format!("repeat {}:\n", expr(count)));
            print_block(out, body, level + 1);
        }
        Stmt::Match { scrutinee, arms, else_body, .. } => {
            indent(out, level);
            out.push_str(&format!("match {}:\n", expr(scrutinee)));
            for arm in arms {
                indent(out, level + 1);
                match &arm.guard {
                    Some(guard) => out.push_str(&format!("case {} if {}:\n", pattern(&arm.pattern), expr(guard))),
                    None => out.push_str(&format!("case {}:\n", pattern(&arm.pattern))),
                }
                print_block(out, &arm.body, level + 2);
            }
            if let Some(body) = else_body {
                indent(out, level + 1);
                out.push_str("else:\n");
                print_block(out, body, level + 2);
            }
        }
        Stmt::Print { value, .. } => {
            indent(out, level);
            out.push_str(&format!("print {}\n", expr(value)));
        }
        Stmt::Return { value, .. } => {
            indent(out, level);
            match value {
                Some(v) => out.push_str(&format!("return {}\n", expr(v))),
                None => out.push_str("return\n"),
            }
        }
        Stmt::Break { .. } => {
            indent(out, level);
            out.push_str("break\n");
        }
        Stmt::Continue { .. } => {
            indent(out, level);
            out.push_str("continue\n");
        }
        Stmt::Release { target, .. } => {
            indent(out, level);
            out.push_str(&format!("release {}\n", expr(target)));
        }
        Stmt::Unsafe { reason, body, .. } => {
            indent(out, level);
            match reason {
                Some(r) => out.push_str(&format!("unsafe {}:\n", quote(r))),
                None => out.push_str("unsafe:\n"),
            }
            print_block(out, body, level + 1);
        }
        Stmt::Func(f) => print_function(out, f, level),
        Stmt::Extern(e) => {
            indent(out, level);
            if e.is_public {
                out.push_str("export ");
            }
            out.push_str(&format!(
                "extern fn {}({}) -> {}\n",
                e.name,
                params(&e.params),
                type_ref(&e.return_type)
            ));
        }
        Stmt::Struct(s) => {
            indent(out, level);
            if s.is_public {
                out.push_str("export ");
            }
            out.push_str(&format!("struct {}{}:\n", s.name, type_params(&s.type_params)));
            for field in &s.fields {
                indent(out, level + 1);
                out.push_str(&format!("{}: {}\n", field.name, type_ref(&field.type_ref)));
            }
        }
        Stmt::Enum(e) => {
            indent(out, level);
            if e.is_public {
                out.push_str("export ");
            }
            out.push_str(&format!("enum {}{}:\n", e.name, type_params(&e.type_params)));
            for case in &e.cases {
                indent(out, level + 1);
                match &case.payload {
                    Some(p) => out.push_str(&format!("case {}: {}\n", case.name, type_ref(p))),
                    None => out.push_str(&format!("case {}\n", case.name)),
                }
            }
        }
        Stmt::Trait(t) => {
            indent(out, level);
            if t.is_public {
                out.push_str("export ");
            }
            out.push_str(&format!("trait {}{}:\n", t.name, type_params(&t.type_params)));
            for method in &t.methods {
                indent(out, level + 1);
                out.push_str(&format!(
                    "fn {}({}) -> {}\n",
                    method.name,
                    params(&method.params),
                    type_ref(&method.return_type)
                ));
            }
        }
        Stmt::Impl(i) => {
            indent(out, level);
            match &i.trait_name {
                Some(t) => out.push_str(&format!("impl {} for {}:\n", t, type_ref(&i.for_type))),
                None => out.push_str(&format!("impl {}:\n", type_ref(&i.for_type))),
            }
            for method in &i.methods {
                print_function(out, method, level + 1);
            }
        }
        Stmt::Import(i) => {
            indent(out, level);
            let keyword = if i.is_use { "use" } else { "import" };
            let module = if i.module.chars().all(|c| c.is_alphanumeric() || c == '_') {
                i.module.clone()
            } else {
                quote(&i.module)
            };
            match &i.alias {
                Some(a) => out.push_str(&format!("{keyword} {module} as {a}\n")),
                None => out.push_str(&format!("{keyword} {module}\n")),
            }
        }
    }
}

fn print_else(out: &mut String, else_body: Option<&[Stmt]>, level: usize) {
    let Some(body) = else_body else { return };
    // a lone nested `if` prints as an elif chain
    if body.len() == 1 {
        if let Stmt::If { cond, then_body, else_body, .. } = &body[0] {
            indent(out, level);
            out.push_str(&format!("elif {}:\n", expr(cond)));
            print_block(out, then_body, level + 1);
            print_else(out, else_body.as_deref(), level);
            return;
        }
    }
    indent(out, level);
    out.push_str("else:\n");
    print_block(out, body, level + 1);
}

fn print_function(out: &mut String, f: &FunctionDef, level: usize) {
    indent(out, level);
    if f.is_public {
        out.push_str("export ");
    }
    out.push_str(&format!(
        "fn {}{}({}) -> {}:\n",
        f.name,
        type_params(&f.type_params),
        params(&f.params),
        type_ref(&f.return_type)
    ));
    print_block(out, &f.body, level + 1);
}

fn params(list: &[Param]) -> String {
    list.iter()
        .map(|p| format!("{}: {}", p.name, type_ref(&p.type_ref)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn type_params(list: &[TypeParam]) -> String {
    if list.is_empty() {
        return String::new();
    }
    let inner = list
        .iter()
        .map(|p| {
            if p.bounds.is_empty() {
                p.name.clone()
            } else {
                format!("{}: {}", p.name, p.bounds.join(" + "))
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("<{inner}>")
}

pub fn type_ref(t: &TypeRef) -> String {
    if t.args.is_empty() {
        return t.name.clone();
    }
    let args = t.args.iter().map(type_ref).collect::<Vec<_>>().join(", ");
    format!("{}<{}>", t.name, args)
}

fn pattern(p: &Pattern) -> String {
    match p {
        Pattern::Wildcard { .. } => "_".into(),
        Pattern::Literal { value } => expr(value),
        Pattern::Bind { name, .. } => name.clone(),
        Pattern::Struct { name, fields, .. } => {
            let inner = fields.iter().map(pattern).collect::<Vec<_>>().join(", ");
            format!("{name}({inner})")
        }
        Pattern::EnumVariant { enum_name, case_name, payload, binding, .. } => {
            if let Some(b) = binding {
                return format!("{enum_name}.{case_name}({b})");
            }
            if let Some(p) = payload {
                return format!("{enum_name}.{case_name}({})", pattern(p));
            }
            format!("{enum_name}.{case_name}")
        }
    }
}

pub fn expr(e: &Expr) -> String {
    expr_prec(e, 0)
}

/// Precedence: or 1, and 2, comparison 3, add 4, mul 5, unary 6.
fn expr_prec(e: &Expr, min: u8) -> String {
    let (text, prec) = match &e.kind {
        ExprKind::Int(v) => (v.to_string(), 7),
        ExprKind::Str(s) => (quote(s), 7),
        ExprKind::Bool(b) => (if *b { "true".into() } else { "false".into() }, 7),
        ExprKind::Name(n) => (n.clone(), 7),
        ExprKind::Call { callee, args } => {
            let inner = args.iter().map(expr).collect::<Vec<_>>().join(", ");
            (format!("{callee}({inner})"), 7)
        }
        ExprKind::Member { value, name } => (format!("{}.{}", expr_prec(value, 7), name), 7),
        ExprKind::BufferCreate { size } => (format!("buffer({})", expr(size)), 7),
        ExprKind::BorrowRange { buffer, start, end, mutable } => {
            let kw = if *mutable { "borrow mut" } else { "borrow" };
            (format!("{kw} {}[{}..{}]", expr_prec(buffer, 7), expr(start), expr(end)), 6)
        }
        ExprKind::Borrow { value, mutable } => {
            let kw = if *mutable { "borrow mut" } else { "borrow" };
            (format!("{kw} {}", expr_prec(value, 7)), 6)
        }
        ExprKind::Move { value } => (format!("move {}", expr_prec(value, 7)), 6),
        ExprKind::Copy { value } => (format!("copy {}", expr_prec(value, 7)), 6),
        ExprKind::Try { value } => (format!("try {}", expr_prec(value, 7)), 6),
        ExprKind::UnaryOp { op, value } => {
            let symbol = match op {
                UnOp::Neg => "-",
                UnOp::Plus => "+",
            };
            (format!("{symbol}{}", expr_prec(value, 6)), 6)
        }
        ExprKind::BinOp { left, op, right } => {
            let prec = if op.is_comparison() {
                3
            } else if matches!(op, BinOp::Add | BinOp::Sub) {
                4
            } else {
                5
            };
            (
                format!(
                    "{} {} {}",
                    expr_prec(left, prec),
                    op.symbol(),
                    expr_prec(right, prec + 1)
                ),
                prec,
            )
        }
        ExprKind::Logical { left, op, right } => {
            let (symbol, prec) = match op {
                LogicalOp::Or => ("or", 1),
                LogicalOp::And => ("and", 2),
            };
            (
                format!("{} {symbol} {}", expr_prec(left, prec), expr_prec(right, prec + 1)),
                prec,
            )
        }
    };
    if prec < min {
        format!("({text})")
    } else {
        text
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::source::SourceFile;

    fn canon(src: &str) -> String {
        let sf = SourceFile::new(0, "test.dsy".into(), src);
        print_module(&parser::parse(&sf).expect("parse failed"))
    }

    #[test]
    fn round_trip_is_stable() {
        let src = "module m\nfn main() -> int:\n  let x = 1 + 2 * 3\n  if x > 3 and x < 10:\n    print x\n  else:\n    print 0\n  repeat 3:\n    add 1 to x\n  return x\n";
        let first = canon(src);
        let second = canon(&first);
        assert_eq!(first, second);
    }

    #[test]
    fn korean_prints_to_english_canonical_form() {
        let en = canon("module m\nfn main() -> int:\n  let b = buffer(8)\n  let v = borrow mut b[0..8]\n  release b\n  return 0\n");
        let ko = canon("모듈 m\n함수 main 정의:\n  b를 8바이트로 생성한다\n  v를 b의 0부터 8까지로 빌려온다(가변)\n  b을 해제한다\n  0을 반환한다\n");
        assert_eq!(en, ko);
    }

    #[test]
    fn precedence_parentheses_survive() {
        let src = "module m\nfn f(a: int) -> int:\n  return (a + 1) * 2\n";
        let first = canon(src);
        assert!(first.contains("(a + 1) * 2"));
        assert_eq!(first, canon(&first));
    }

    #[test]
    fn elif_chains_round_trip() {
        let src = "module m\nfn f(a: int) -> int:\n  if a > 2:\n    return 2\n  elif a > 1:\n    return 1\n  else:\n    return 0\n  return 9\n";
        let first = canon(src);
        assert!(first.contains("elif a > 1:"));
        assert_eq!(first, canon(&first));
    }
}
