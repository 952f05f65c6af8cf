//! Type and generic checker.
//!
//! Two passes per module: registration (imports, type definitions, traits,
//! impls, signatures) and checking. Generic structs, enums and functions are
//! templates; uses are monomorphized under mangled names
//! (`Result__int__int`) and cached so repeated instantiations share one
//! definition. Trait bounds are solved against registered impl blocks.

use std::collections::{HashMap, HashSet};

use crate::ast::*;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::span::Span;
use crate::types::{builtin_type, Type, TypeInfo};

#[derive(Debug, Clone)]
pub struct FuncSig {
    pub params: Vec<Type>,
    pub returns: Type,
}

impl FuncSig {
    pub fn new(params: Vec<Type>, returns: Type) -> Self {
        Self { params, returns }
    }
}

/// Project-wide context for one module: everything public in the other
/// modules, keyed by `module.name`.
#[derive(Debug, Clone, Default)]
pub struct ExternalContext {
    pub sigs: HashMap<String, FuncSig>,
    pub types: HashMap<String, Type>,
    pub structs: HashMap<String, Vec<(String, Type)>>,
    pub enums: HashMap<String, Vec<(String, Option<Type>)>>,
    pub generic_funcs: HashMap<String, FunctionDef>,
}

pub struct TypeChecker {
    pub errors: Vec<Diagnostic>,
    expr_types: HashMap<ExprId, Type>,
    var_types: HashMap<String, Type>,
    loop_depth: usize,
    pub func_sigs: HashMap<String, FuncSig>,
    external: ExternalContext,
    module_name: String,
    import_aliases: HashMap<String, String>,
    use_modules: Vec<String>,
    pub struct_defs: HashMap<String, Vec<(String, Type)>>,
    pub enum_defs: HashMap<String, Vec<(String, Option<Type>)>>,
    custom_types: HashMap<String, Type>,
    generic_structs: HashMap<String, (Vec<TypeParam>, Vec<(String, TypeRef)>)>,
    generic_enums: HashMap<String, (Vec<TypeParam>, Vec<(String, Option<TypeRef>)>)>,
    generic_funcs: HashMap<String, FunctionDef>,
    pub specialized_functions: Vec<FunctionDef>,
    pub impl_functions: Vec<FunctionDef>,
    trait_defs: HashMap<String, Vec<TypeParam>>,
    impl_methods: HashMap<String, HashMap<String, (String, FuncSig)>>,
    impl_traits: HashMap<String, HashSet<String>>,
    current_return_type: Option<Type>,
    builtin_sigs: HashMap<String, FuncSig>,
}

impl TypeChecker {
    pub fn new(external: ExternalContext) -> Self {
        Self {
            errors: Vec::new(),
            expr_types: HashMap::new(),
            var_types: HashMap::new(),
            loop_depth: 0,
            func_sigs: HashMap::new(),
            external,
            module_name: String::new(),
            import_aliases: HashMap::new(),
            use_modules: Vec::new(),
            struct_defs: HashMap::new(),
            enum_defs: HashMap::new(),
            custom_types: HashMap::new(),
            generic_structs: HashMap::new(),
            generic_enums: HashMap::new(),
            generic_funcs: HashMap::new(),
            specialized_functions: Vec::new(),
            impl_functions: Vec::new(),
            trait_defs: HashMap::new(),
            impl_methods: HashMap::new(),
            impl_traits: HashMap::new(),
            current_return_type: None,
            builtin_sigs: builtin_signatures(),
        }
    }

    /// A standalone checker used only to resolve type references when
    /// collecting cross-module signatures.
    pub fn resolver() -> Self {
        let mut checker = Self::new(ExternalContext::default());
        checker.predeclare_result_option(&HashSet::new(), Span::dummy());
        checker
    }

    pub fn check_module(&mut self, module: &mut Module) -> TypeInfo {
        self.module_name = module.name.clone();
        self.struct_defs = self.external.structs.clone();
        self.enum_defs = self.external.enums.clone();
        self.custom_types = self.external.types.clone();
        self.generic_funcs = self.external.generic_funcs.clone();

        let declared_enums: HashSet<String> = module
            .body
            .iter()
            .filter_map(|s| match s {
                Stmt::Enum(e) => Some(e.name.clone()),
                _ => None,
            })
            .collect();
        self.predeclare_result_option(&declared_enums, module.span);

        for stmt in &module.body {
            if let Stmt::Import(import) = stmt {
                self.register_import(import);
            }
        }
        for idx in 0..module.body.len() {
            match &mut module.body[idx] {
                Stmt::Struct(s) => {
                    let s = s.clone();
                    self.register_struct(&s);
                }
                Stmt::Enum(e) => {
                    let e = e.clone();
                    self.register_enum(&e);
                }
                Stmt::Trait(t) => {
                    let t = t.clone();
                    self.register_trait(&t);
                }
                _ => {}
            }
        }
        for idx in 0..module.body.len() {
            if let Stmt::Impl(_) = &module.body[idx] {
                let Stmt::Impl(imp) = module.body[idx].clone() else { unreachable!() };
                self.register_impl(&imp);
            }
        }
        for idx in 0..module.body.len() {
            match &mut module.body[idx] {
                Stmt::Func(func) => {
                    if !func.type_params.is_empty() {
                        self.generic_funcs.insert(func.name.clone(), func.clone());
                        continue;
                    }
                    let params = self.resolve_params(&mut func.params);
                    let returns = self.resolve_type_mut(&mut func.return_type);
                    self.func_sigs.insert(func.name.clone(), FuncSig::new(params, returns));
                }
                Stmt::Extern(ext) => {
                    let params = self.resolve_params(&mut ext.params);
                    let returns = self.resolve_type_mut(&mut ext.return_type);
                    self.func_sigs.insert(ext.name.clone(), FuncSig::new(params, returns));
                }
                _ => {}
            }
        }
        let mut impl_funcs = std::mem::take(&mut self.impl_functions);
        for func in &mut impl_funcs {
            let params = self.resolve_params(&mut func.params);
            let returns = self.resolve_type_mut(&mut func.return_type);
            self.func_sigs.insert(func.name.clone(), FuncSig::new(params, returns));
        }

        for stmt in module.body.iter_mut() {
            match stmt {
                Stmt::Func(func) => {
                    if func.type_params.is_empty() {
                        self.check_function(func);
                    }
                }
                Stmt::Extern(_) | Stmt::Trait(_) | Stmt::Impl(_) | Stmt::Struct(_) | Stmt::Enum(_) | Stmt::Import(_) => {}
                other => {
                    let mut vars = std::mem::take(&mut self.var_types);
                    self.check_stmt(other, &mut vars);
                    self.var_types = vars;
                }
            }
        }
        for func in &mut impl_funcs {
            self.check_function(func);
        }
        self.impl_functions = impl_funcs;

        TypeInfo {
            expr_types: self.expr_types.clone(),
            var_types: self.var_types.clone(),
            named_types: self.custom_types.clone(),
        }
    }

    fn predeclare_result_option(&mut self, declared: &HashSet<String>, span: Span) {
        if !self.generic_enums.contains_key("Result") && !declared.contains("Result") {
            self.generic_enums.insert(
                "Result".into(),
                (
                    vec![
                        TypeParam { name: "T".into(), bounds: vec![], span },
                        TypeParam { name: "E".into(), bounds: vec![], span },
                    ],
                    vec![
                        ("Ok".into(), Some(TypeRef::named("T", span))),
                        ("Err".into(), Some(TypeRef::named("E", span))),
                    ],
                ),
            );
        }
        if !self.generic_enums.contains_key("Option") && !declared.contains("Option") {
            self.generic_enums.insert(
                "Option".into(),
                (
                    vec![TypeParam { name: "T".into(), bounds: vec![], span }],
                    vec![
                        ("Some".into(), Some(TypeRef::named("T", span))),
                        ("None".into(), None),
                    ],
                ),
            );
        }
    }

    fn resolve_params(&mut self, params: &mut [Param]) -> Vec<Type> {
        params.iter_mut().map(|p| self.resolve_type_mut(&mut p.type_ref)).collect()
    }

    fn check_function(&mut self, func: &mut FunctionDef) {
        let mut locals: HashMap<String, Type> = HashMap::new();
        for param in &mut func.params {
            let t = self.resolve_type_mut(&mut param.type_ref);
            locals.insert(param.name.clone(), t);
        }
        self.current_return_type = Some(self.resolve_type_mut(&mut func.return_type));
        let expected = func.return_type.clone();
        for stmt in &mut func.body {
            self.check_stmt_with_return(stmt, &mut locals, Some(&expected));
        }
        self.current_return_type = None;
    }

    fn check_stmt(&mut self, stmt: &mut Stmt, locals: &mut HashMap<String, Type>) {
        self.check_stmt_with_return(stmt, locals, None);
    }

    fn check_stmt_with_return(
        &mut self,
        stmt: &mut Stmt,
        locals: &mut HashMap<String, Type>,
        return_type: Option<&TypeRef>,
    ) {
        match stmt {
            Stmt::Let { name, ty, init, span } => {
                let value_type = self.check_expr(init, locals);
                if let Some(annotation) = ty {
                    let expected = self.resolve_type_mut(annotation);
                    if expected != value_type {
                        self.errors.push(Diagnostic::new(
                            DiagnosticKind::TypeMismatch,
                            format!("let annotation mismatch: declared {expected}, found {value_type}"),
                            Some(*span),
                        ));
                    }
                    locals.insert(name.clone(), expected);
                } else {
                    locals.insert(name.clone(), value_type);
                }
            }
            Stmt::Assign { target, value, span } => {
                let value_type = self.check_expr(value, locals);
                let target_type = self.check_expr(target, locals);
                if target_type != value_type {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::TypeMismatch,
                        format!("assignment mismatch: target {target_type}, value {value_type}"),
                        Some(*span),
                    ));
                }
            }
            Stmt::AddAssign { target, value, span } => {
                let target_type = self.check_expr(target, locals);
                let value_type = self.check_expr(value, locals);
                if target_type != Type::int() || value_type != Type::int() {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::TypeMismatch,
                        "add requires int target and value",
                        Some(*span),
                    ));
                }
            }
            Stmt::If { cond, then_body, else_body, span } => {
                let cond_type = self.check_expr(cond, locals);
                if cond_type != Type::bool_() {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::TypeMismatch,
                        format!("if condition must be bool, found {cond_type}"),
                        Some(*span),
                    ));
                }
                for inner in then_body {
                    self.check_stmt_with_return(inner, locals, return_type);
                }
                if let Some(body) = else_body {
                    for inner in body {
                        self.check_stmt_with_return(inner, locals, return_type);
                    }
                }
            }
            Stmt::While { cond, body, span } => {
                let cond_type = self.check_expr(cond, locals);
                if cond_type != Type::bool_() {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::TypeMismatch,
                        format!("while condition must be bool, found {cond_type}"),
                        Some(*span),
                    ));
                }
                self.loop_depth += 1;
                for inner in body {
                    self.check_stmt_with_return(inner, locals, return_type);
                }
                self.loop_depth -= 1;
            }
            Stmt::Repeat { count, body, span } => {
                let count_type = self.check_expr(count, locals);
                if count_type != Type::int() {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::TypeMismatch,
                        format!("repeat count must be int, found {count_type}"),
                        Some(*span),
                    ));
                }
                self.loop_depth += 1;
                for inner in body {
                    self.check_stmt_with_return(inner, locals, return_type);
                }
                self.loop_depth -= 1;
            }
            Stmt::Match { .. } => self.check_match(stmt, locals, return_type),
            Stmt::Print { value, .. } => {
                self.check_expr(value, locals);
            }
            Stmt::Return { value, span } => {
                let Some(expected_ref) = return_type else { return };
                let mut expected_ref = expected_ref.clone();
                let expected = self.resolve_type_mut(&mut expected_ref);
                match value {
                    None => {
                        if expected != Type::unit() {
                            self.errors.push(Diagnostic::new(
                                DiagnosticKind::TypeMismatch,
                                format!("return value required, function returns {expected}"),
                                Some(*span),
                            ));
                        }
                    }
                    Some(v) => {
                        let actual = self.check_expr(v, locals);
                        if actual != expected && !is_panic_expr(v) {
                            self.errors.push(Diagnostic::new(
                                DiagnosticKind::TypeMismatch,
                                format!("return type mismatch: {actual} != {expected}"),
                                Some(*span),
                            ));
                        }
                    }
                }
            }
            Stmt::Break { span } => {
                if self.loop_depth == 0 {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::SyntaxError,
                        "break used outside loop",
                        Some(*span),
                    ));
                }
            }
            Stmt::Continue { span } => {
                if self.loop_depth == 0 {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::SyntaxError,
                        "continue used outside loop",
                        Some(*span),
                    ));
                }
            }
            Stmt::Release { target, span } => {
                let target_type = self.check_expr(target, locals);
                if !target_type.is_releasable() {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::TypeMismatch,
                        format!("release requires an owning runtime value, found {target_type}"),
                        Some(*span),
                    ));
                }
            }
            Stmt::Unsafe { reason, body, span } => {
                if reason.is_none() {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::UnsafeWithoutJustification,
                        "unsafe block requires a justification string",
                        Some(*span),
                    ));
                }
                for inner in body {
                    self.check_stmt_with_return(inner, locals, return_type);
                }
            }
            Stmt::Func(func) => {
                if func.type_params.is_empty() {
                    let saved = self.current_return_type.take();
                    self.check_function(func);
                    self.current_return_type = saved;
                }
            }
            Stmt::Extern(_) | Stmt::Struct(_) | Stmt::Enum(_) | Stmt::Trait(_) | Stmt::Impl(_) | Stmt::Import(_) => {}
        }
    }

    fn check_match(
        &mut self,
        stmt: &mut Stmt,
        locals: &mut HashMap<String, Type>,
        return_type: Option<&TypeRef>,
    ) {
        let Stmt::Match { scrutinee, arms, else_body, span } = stmt else { return };
        let value_type = self.check_expr(scrutinee, locals);
        let is_enum = self.enum_defs.contains_key(&value_type.name);
        let is_struct = self.struct_defs.contains_key(&value_type.name);
        if value_type != Type::int() && value_type != Type::bool_() && !is_enum && !is_struct {
            self.errors.push(Diagnostic::new(
                DiagnosticKind::TypeMismatch,
                format!("match supports int, bool, enums and structs, found {value_type}"),
                Some(*span),
            ));
        }
        let mut covered: HashSet<String> = HashSet::new();
        let mut has_irrefutable = false;
        for arm in arms.iter_mut() {
            let mut arm_locals = locals.clone();
            if is_enum {
                self.check_enum_pattern(&mut arm.pattern, &value_type, &mut arm_locals, arm.span);
            } else if is_struct {
                self.check_struct_pattern(&mut arm.pattern, &value_type, &mut arm_locals, arm.span);
            } else {
                match &mut arm.pattern {
                    Pattern::Literal { value } => {
                        let case_type = self.check_expr(value, &mut arm_locals);
                        if case_type != value_type {
                            self.errors.push(Diagnostic::new(
                                DiagnosticKind::TypeMismatch,
                                format!("match case type {case_type} does not match {value_type}"),
                                Some(arm.span),
                            ));
                        }
                    }
                    Pattern::Wildcard { .. } => {}
                    Pattern::Bind { name, .. } => {
                        arm_locals.insert(name.clone(), value_type.clone());
                    }
                    _ => {
                        self.errors.push(Diagnostic::new(
                            DiagnosticKind::TypeMismatch,
                            "match case must be a literal, binding or '_'",
                            Some(arm.span),
                        ));
                    }
                }
            }
            if let Some(guard) = &mut arm.guard {
                let guard_type = self.check_expr(guard, &mut arm_locals);
                if guard_type != Type::bool_() {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::TypeMismatch,
                        format!("match guard must be bool, found {guard_type}"),
                        Some(arm.span),
                    ));
                }
            }
            // guards never count toward exhaustiveness
            if arm.guard.is_none() {
                match &arm.pattern {
                    Pattern::Wildcard { .. } | Pattern::Bind { .. } => has_irrefutable = true,
                    Pattern::Struct { fields, .. } => {
                        if fields.iter().all(|f| {
                            matches!(f, Pattern::Wildcard { .. } | Pattern::Bind { .. })
                        }) {
                            has_irrefutable = true;
                        }
                    }
                    Pattern::EnumVariant { case_name, payload, binding, .. } => {
                        let payload_irrefutable = match payload.as_deref() {
                            None => true,
                            Some(Pattern::Wildcard { .. }) | Some(Pattern::Bind { .. }) => true,
                            Some(_) => false,
                        };
                        if binding.is_some() || payload_irrefutable {
                            covered.insert(case_name.clone());
                        }
                    }
                    Pattern::Literal { .. } => {}
                }
            }
            for inner in &mut arm.body {
                self.check_stmt_with_return(inner, &mut arm_locals, return_type);
            }
        }
        if let Some(body) = else_body {
            for inner in body {
                self.check_stmt_with_return(inner, locals, return_type);
            }
        }
        if else_body.is_none() && !has_irrefutable {
            if is_enum {
                let cases = self.enum_defs.get(&value_type.name).cloned().unwrap_or_default();
                let missing: Vec<String> = cases
                    .iter()
                    .map(|(name, _)| name.clone())
                    .filter(|name| !covered.contains(name))
                    .collect();
                if !missing.is_empty() {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::NonExhaustiveMatch,
                        format!(
                            "match on {} is missing cases: {}",
                            value_type.name,
                            missing.join(", ")
                        ),
                        Some(*span),
                    ));
                }
            } else {
                self.errors.push(Diagnostic::new(
                    DiagnosticKind::NonExhaustiveMatch,
                    format!("match on {value_type} requires a wildcard or else branch"),
                    Some(*span),
                ));
            }
        }
    }

    fn check_enum_pattern(
        &mut self,
        pattern: &mut Pattern,
        expected: &Type,
        locals: &mut HashMap<String, Type>,
        span: Span,
    ) {
        match pattern {
            Pattern::Wildcard { .. } | Pattern::Bind { .. } => {
                if let Pattern::Bind { name, .. } = pattern {
                    locals.insert(name.clone(), expected.clone());
                }
            }
            Pattern::EnumVariant { enum_name, case_name, payload, binding, .. } => {
                let expected_base = expected.name.split("__").next().unwrap_or_default();
                if *enum_name != expected.name && *enum_name == expected_base {
                    *enum_name = expected.name.clone();
                }
                if *enum_name != expected.name {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::TypeMismatch,
                        format!("pattern enum {enum_name} does not match value type {}", expected.name),
                        Some(span),
                    ));
                    return;
                }
                let Some(cases) = self.enum_defs.get(enum_name).cloned() else {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::UnknownSymbol,
                        format!("unknown enum: {enum_name}"),
                        Some(span),
                    ));
                    return;
                };
                let Some((_, payload_type)) = cases.iter().find(|(n, _)| n == case_name) else {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::UnknownSymbol,
                        format!("unknown enum case: {case_name}"),
                        Some(span),
                    ));
                    return;
                };
                if binding.is_some() && payload.is_some() {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::TypeMismatch,
                        "enum case cannot both bind and match its payload",
                        Some(span),
                    ));
                    return;
                }
                if let Some(bind_name) = binding {
                    match payload_type {
                        Some(t) => {
                            locals.insert(bind_name.clone(), t.clone());
                        }
                        None => self.errors.push(Diagnostic::new(
                            DiagnosticKind::TypeMismatch,
                            format!("enum case {case_name} has no payload to bind"),
                            Some(span),
                        )),
                    }
                    return;
                }
                if let Some(inner) = payload {
                    match payload_type {
                        Some(t) => {
                            let t = t.clone();
                            self.check_pattern(inner, &t, locals, span);
                        }
                        None => self.errors.push(Diagnostic::new(
                            DiagnosticKind::TypeMismatch,
                            format!("enum case {case_name} has no payload to match"),
                            Some(span),
                        )),
                    }
                }
            }
            _ => {
                self.errors.push(Diagnostic::new(
                    DiagnosticKind::TypeMismatch,
                    "enum match requires an enum case pattern",
                    Some(span),
                ));
            }
        }
    }

    fn check_struct_pattern(
        &mut self,
        pattern: &mut Pattern,
        expected: &Type,
        locals: &mut HashMap<String, Type>,
        span: Span,
    ) {
        match pattern {
            Pattern::Wildcard { .. } => {}
            Pattern::Bind { name, .. } => {
                locals.insert(name.clone(), expected.clone());
            }
            Pattern::Struct { name, fields, .. } => {
                if *name != expected.name {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::TypeMismatch,
                        format!("pattern struct {name} does not match value type {}", expected.name),
                        Some(span),
                    ));
                    return;
                }
                let Some(def_fields) = self.struct_defs.get(name).cloned() else {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::UnknownSymbol,
                        format!("unknown struct: {name}"),
                        Some(span),
                    ));
                    return;
                };
                if fields.len() != def_fields.len() {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::TypeMismatch,
                        format!(
                            "struct pattern field count mismatch: expected {}, got {}",
                            def_fields.len(),
                            fields.len()
                        ),
                        Some(span),
                    ));
                    return;
                }
                for (field_pattern, (_, field_type)) in fields.iter_mut().zip(def_fields.iter()) {
                    self.check_pattern(field_pattern, field_type, locals, span);
                }
            }
            _ => {
                self.errors.push(Diagnostic::new(
                    DiagnosticKind::TypeMismatch,
                    "struct match requires a struct pattern",
                    Some(span),
                ));
            }
        }
    }

    fn check_pattern(
        &mut self,
        pattern: &mut Pattern,
        expected: &Type,
        locals: &mut HashMap<String, Type>,
        span: Span,
    ) {
        match pattern {
            Pattern::Wildcard { .. } => {}
            Pattern::Bind { name, .. } => {
                locals.insert(name.clone(), expected.clone());
            }
            Pattern::Literal { value } => {
                let case_type = self.check_expr(value, locals);
                if case_type != *expected {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::TypeMismatch,
                        format!("match case type {case_type} does not match {expected}"),
                        Some(span),
                    ));
                }
            }
            Pattern::Struct { .. } => self.check_struct_pattern(pattern, expected, locals, span),
            Pattern::EnumVariant { .. } => self.check_enum_pattern(pattern, expected, locals, span),
        }
    }

    pub fn check_expr(&mut self, expr: &mut Expr, locals: &mut HashMap<String, Type>) -> Type {
        let t = self.check_expr_inner(expr, locals);
        self.expr_types.insert(expr.id, t.clone());
        t
    }

    fn check_expr_inner(&mut self, expr: &mut Expr, locals: &mut HashMap<String, Type>) -> Type {
        let span = expr.span;
        let id = expr.id;
        match &mut expr.kind {
            ExprKind::Int(_) => Type::int(),
            ExprKind::Str(_) => Type::string(),
            ExprKind::Bool(_) => Type::bool_(),
            ExprKind::Name(name) => match locals.get(name) {
                Some(t) => t.clone(),
                None => {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::UnknownSymbol,
                        format!("undefined name: {name}"),
                        Some(span),
                    ));
                    locals.insert(name.clone(), Type::unit());
                    Type::unit()
                }
            },
            ExprKind::Member { value, name } => {
                let base = self.check_expr(value, locals);
                let Some(fields) = self.struct_defs.get(&base.name).cloned() else {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::TypeMismatch,
                        format!("field access requires a struct, found {base}"),
                        Some(span),
                    ));
                    return Type::unit();
                };
                match fields.iter().find(|(f, _)| f == name) {
                    Some((_, t)) => t.clone(),
                    None => {
                        self.errors.push(Diagnostic::new(
                            DiagnosticKind::UnknownSymbol,
                            format!("unknown field: {name}"),
                            Some(span),
                        ));
                        Type::unit()
                    }
                }
            }
            ExprKind::Borrow { value, .. } => {
                let target = self.check_expr(value, locals);
                if target != Type::buffer() && target != Type::view() {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::TypeMismatch,
                        format!("borrowing requires a buffer or view, found {target}"),
                        Some(span),
                    ));
                }
                Type::view()
            }
            ExprKind::BorrowRange { buffer, start, end, .. } => {
                let target = self.check_expr(buffer, locals);
                if target != Type::buffer() {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::TypeMismatch,
                        format!("range borrow requires a buffer, found {target}"),
                        Some(span),
                    ));
                }
                for bound in [start, end] {
                    let t = self.check_expr(bound, locals);
                    if t != Type::int() {
                        self.errors.push(Diagnostic::new(
                            DiagnosticKind::TypeMismatch,
                            format!("borrow bounds must be int, found {t}"),
                            Some(span),
                        ));
                    }
                }
                Type::view()
            }
            ExprKind::BufferCreate { size } => {
                let t = self.check_expr(size, locals);
                if t != Type::int() {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::TypeMismatch,
                        format!("buffer size must be int, found {t}"),
                        Some(span),
                    ));
                }
                Type::buffer()
            }
            ExprKind::Move { value } => self.check_expr(value, locals),
            ExprKind::Copy { value } => {
                let t = self.check_expr(value, locals);
                if !t.is_copy {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::TypeMismatch,
                        format!("copy requires a Copy type, found {t}"),
                        Some(span),
                    ));
                }
                t
            }
            ExprKind::UnaryOp { value, .. } => {
                let t = self.check_expr(value, locals);
                if t != Type::int() {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::TypeMismatch,
                        format!("unary arithmetic requires int, found {t}"),
                        Some(span),
                    ));
                }
                Type::int()
            }
            ExprKind::Logical { left, right, .. } => {
                let lt = self.check_expr(left, locals);
                let rt = self.check_expr(right, locals);
                if lt != Type::bool_() || rt != Type::bool_() {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::TypeMismatch,
                        format!("logical operands must be bool, found {lt} and {rt}"),
                        Some(span),
                    ));
                }
                Type::bool_()
            }
            ExprKind::BinOp { left, op, right } => {
                let op = *op;
                let lt = self.check_expr(left, locals);
                let rt = self.check_expr(right, locals);
                if op.is_comparison() {
                    if lt != rt {
                        self.errors.push(Diagnostic::new(
                            DiagnosticKind::TypeMismatch,
                            format!("comparison operands must match: {lt} vs {rt}"),
                            Some(span),
                        ));
                    }
                    Type::bool_()
                } else {
                    if lt != Type::int() || rt != Type::int() {
                        self.errors.push(Diagnostic::new(
                            DiagnosticKind::TypeMismatch,
                            format!("arithmetic operands must be int, found {lt} and {rt}"),
                            Some(span),
                        ));
                    }
                    Type::int()
                }
            }
            ExprKind::Try { value } => {
                let inner = self.check_expr(value, locals);
                self.check_try(&inner, span)
            }
            ExprKind::Call { .. } => {
                let t = self.check_call(expr, locals);
                self.expr_types.insert(id, t.clone());
                return t;
            }
        }
    }

    /// `try E` needs `E : Result<T, E>` or `Option<T>`, with the enclosing
    /// return type sharing the base and error/none side; yields `T`.
    fn check_try(&mut self, inner: &Type, span: Span) -> Type {
        let (base, args) = split_specialized_name(&inner.name);
        if base != "Result" && base != "Option" {
            self.errors.push(Diagnostic::new(
                DiagnosticKind::TypeMismatch,
                format!("try requires Result or Option, found {inner}"),
                Some(span),
            ));
            return Type::unit();
        }
        let Some(current) = self.current_return_type.clone() else {
            self.errors.push(Diagnostic::new(
                DiagnosticKind::TypeMismatch,
                "try used outside of a function",
                Some(span),
            ));
            return Type::unit();
        };
        let (ret_base, ret_args) = split_specialized_name(&current.name);
        if ret_base != base {
            self.errors.push(Diagnostic::new(
                DiagnosticKind::TypeMismatch,
                format!("try requires the function to return {base}, found {current}"),
                Some(span),
            ));
            return Type::unit();
        }
        if base == "Result" {
            if args.len() < 2 || ret_args.len() < 2 {
                self.errors.push(Diagnostic::new(
                    DiagnosticKind::GenericArityMismatch,
                    "Result requires two type arguments",
                    Some(span),
                ));
                return Type::unit();
            }
            if args[1] != ret_args[1] {
                self.errors.push(Diagnostic::new(
                    DiagnosticKind::TypeMismatch,
                    format!("try error type {} does not match function error type {}", args[1], ret_args[1]),
                    Some(span),
                ));
                return Type::unit();
            }
            return self.resolve_simple_name(&args[0]);
        }
        if args.is_empty() || ret_args.is_empty() {
            self.errors.push(Diagnostic::new(
                DiagnosticKind::GenericArityMismatch,
                "Option requires one type argument",
                Some(span),
            ));
            return Type::unit();
        }
        self.resolve_simple_name(&args[0])
    }

    fn check_call(&mut self, expr: &mut Expr, locals: &mut HashMap<String, Type>) -> Type {
        let span = expr.span;
        let ExprKind::Call { callee, .. } = &expr.kind else { return Type::unit() };
        let mut callee = self.resolve_callee(callee.clone(), locals);
        {
            // record alias/use resolution so lowering sees the final symbol
            let ExprKind::Call { callee: slot, .. } = &mut expr.kind else { unreachable!() };
            *slot = callee.clone();
        }
        if !self.func_sigs.contains_key(&callee) && callee.contains("__") {
            self.ensure_function_specialization(&callee, span);
        }
        // method call: `obj.method(args)` rewrites to the impl symbol with
        // the receiver as a leading argument
        if let Some((prefix, method_name)) = callee.split_once('.') {
            if let Some(recv_type) = locals.get(prefix).cloned() {
                let method = self
                    .impl_methods
                    .get(&recv_type.name)
                    .and_then(|m| m.get(method_name))
                    .cloned();
                if let Some((impl_name, _)) = method {
                    let receiver_span = span;
                    let ExprKind::Call { callee: c, args } = &mut expr.kind else { unreachable!() };
                    *c = impl_name.clone();
                    let mut new_args = vec![Expr {
                        id: u32::MAX - expr.id,
                        kind: ExprKind::Name(prefix.to_string()),
                        span: receiver_span,
                    }];
                    new_args.append(args);
                    *args = new_args;
                    callee = impl_name;
                }
            }
        }
        if !self.struct_defs.contains_key(&callee) && callee.contains("__") && !callee.contains('.') {
            self.ensure_type_specialization(&callee);
        }
        // struct construction
        if let Some(fields) = self.struct_defs.get(&callee).cloned() {
            let ExprKind::Call { args, .. } = &mut expr.kind else { unreachable!() };
            if args.len() != fields.len() {
                self.errors.push(Diagnostic::new(
                    DiagnosticKind::TypeMismatch,
                    format!("struct {} expects {} fields, got {}", callee, fields.len(), args.len()),
                    Some(span),
                ));
            }
            let mut args = std::mem::take(args);
            for (idx, arg) in args.iter_mut().enumerate() {
                let arg_type = self.check_expr(arg, locals);
                if let Some((fname, ftype)) = fields.get(idx) {
                    if arg_type != *ftype {
                        self.errors.push(Diagnostic::new(
                            DiagnosticKind::TypeMismatch,
                            format!("struct field {fname} expects {ftype}, got {arg_type}"),
                            Some(span),
                        ));
                    }
                }
            }
            let ExprKind::Call { args: slot, .. } = &mut expr.kind else { unreachable!() };
            *slot = args;
            return self
                .custom_types
                .get(&callee)
                .cloned()
                .unwrap_or_else(|| Type::named(callee.clone(), false));
        }
        // enum construction: `Enum.Case(payload)`
        let callee_name = callee.clone();
        if let Some((enum_name, case_name)) = callee_name.split_once('.') {
            let mut enum_name = enum_name.to_string();
            if !self.enum_defs.contains_key(&enum_name) && enum_name.contains("__") {
                self.ensure_type_specialization(&enum_name);
            }
            if self.enum_defs.contains_key(&enum_name) {
                return self.check_enum_ctor(expr, &enum_name, case_name, locals);
            }
            if self.generic_enums.contains_key(&enum_name) {
                return self.specialize_generic_enum_case(expr, &mut enum_name, case_name, locals);
            }
        }
        let sig = self
            .builtin_sigs
            .get(&callee)
            .or_else(|| self.func_sigs.get(&callee))
            .or_else(|| self.external.sigs.get(&callee))
            .cloned();
        let Some(sig) = sig else {
            let ExprKind::Call { args, .. } = &mut expr.kind else { unreachable!() };
            let mut args = std::mem::take(args);
            for arg in args.iter_mut() {
                self.check_expr(arg, locals);
            }
            let ExprKind::Call { args: slot, .. } = &mut expr.kind else { unreachable!() };
            *slot = args;
            self.errors.push(Diagnostic::new(
                DiagnosticKind::UnknownSymbol,
                format!("unknown function: {callee}"),
                Some(span),
            ));
            return Type::unit();
        };
        let ExprKind::Call { args, .. } = &mut expr.kind else { unreachable!() };
        let mut args = std::mem::take(args);
        // `spawn(f)` / `spawn(f, ch)` take a function by name
        if callee == "spawn" {
            if args.is_empty() || args.len() > 2 {
                self.errors.push(Diagnostic::new(
                    DiagnosticKind::TypeMismatch,
                    "spawn requires 1 or 2 arguments",
                    Some(span),
                ));
            }
            if let Some(chan) = args.get_mut(1) {
                let t = self.check_expr(chan, locals);
                if t != Type::channel() {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::TypeMismatch,
                        format!("spawn channel argument must be channel, found {t}"),
                        Some(span),
                    ));
                }
            }
            let ExprKind::Call { args: slot, .. } = &mut expr.kind else { unreachable!() };
            *slot = args;
            return Type::unit();
        }
        if args.len() != sig.params.len() {
            self.errors.push(Diagnostic::new(
                DiagnosticKind::TypeMismatch,
                format!("{} expects {} arguments, got {}", callee, sig.params.len(), args.len()),
                Some(span),
            ));
        }
        for (idx, arg) in args.iter_mut().enumerate() {
            let arg_type = self.check_expr(arg, locals);
            if let Some(expected) = sig.params.get(idx) {
                if arg_type != *expected {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::TypeMismatch,
                        format!("argument {idx} of {callee} expects {expected}, got {arg_type}"),
                        Some(span),
                    ));
                }
            }
        }
        let ExprKind::Call { args: slot, .. } = &mut expr.kind else { unreachable!() };
        *slot = args;
        sig.returns
    }

    fn check_enum_ctor(
        &mut self,
        expr: &mut Expr,
        enum_name: &str,
        case_name: &str,
        locals: &mut HashMap<String, Type>,
    ) -> Type {
        let span = expr.span;
        let cases = self.enum_defs.get(enum_name).cloned().unwrap_or_default();
        let Some((_, payload_type)) = cases.iter().find(|(n, _)| n == case_name) else {
            self.errors.push(Diagnostic::new(
                DiagnosticKind::UnknownSymbol,
                format!("unknown enum case: {case_name}"),
                Some(span),
            ));
            return Type::unit();
        };
        let ExprKind::Call { args, .. } = &mut expr.kind else { return Type::unit() };
        let mut args = std::mem::take(args);
        match payload_type {
            None => {
                if !args.is_empty() {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::TypeMismatch,
                        format!("enum case {case_name} takes no payload"),
                        Some(span),
                    ));
                }
            }
            Some(expected) => {
                if args.len() != 1 {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::TypeMismatch,
                        format!("enum case {case_name} requires one payload value"),
                        Some(span),
                    ));
                } else {
                    let expected = expected.clone();
                    let arg_type = self.check_expr(&mut args[0], locals);
                    if arg_type != expected {
                        self.errors.push(Diagnostic::new(
                            DiagnosticKind::TypeMismatch,
                            format!("enum payload expects {expected}, got {arg_type}"),
                            Some(span),
                        ));
                    }
                }
            }
        }
        let ExprKind::Call { args: slot, .. } = &mut expr.kind else { unreachable!() };
        *slot = args;
        self.custom_types
            .get(enum_name)
            .cloned()
            .unwrap_or_else(|| Type::named(enum_name, false))
    }

    /// Infers the substitution for a generic enum constructor (from the
    /// payload and the enclosing return type), specializes the enum, and
    /// rewrites the callee to the specialized case.
    fn specialize_generic_enum_case(
        &mut self,
        expr: &mut Expr,
        enum_name: &mut String,
        case_name: &str,
        locals: &mut HashMap<String, Type>,
    ) -> Type {
        let span = expr.span;
        let (params, cases) = self.generic_enums.get(enum_name).cloned().unwrap();
        let Some((_, payload_ref)) = cases.iter().find(|(n, _)| n == case_name) else {
            self.errors.push(Diagnostic::new(
                DiagnosticKind::UnknownSymbol,
                format!("unknown enum case: {case_name}"),
                Some(span),
            ));
            return Type::unit();
        };
        let param_names: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
        let mut mapping: HashMap<String, Type> = HashMap::new();
        {
            let ExprKind::Call { args, .. } = &mut expr.kind else { return Type::unit() };
            let mut args_owned = std::mem::take(args);
            match payload_ref {
                None => {
                    if !args_owned.is_empty() {
                        self.errors.push(Diagnostic::new(
                            DiagnosticKind::TypeMismatch,
                            format!("enum case {case_name} takes no payload"),
                            Some(span),
                        ));
                    }
                }
                Some(payload_ref) => {
                    if args_owned.len() != 1 {
                        self.errors.push(Diagnostic::new(
                            DiagnosticKind::TypeMismatch,
                            format!("enum case {case_name} requires one payload value"),
                            Some(span),
                        ));
                    } else {
                        let arg_type = self.check_expr(&mut args_owned[0], locals);
                        if param_names.contains(&payload_ref.name) && payload_ref.args.is_empty() {
                            mapping.insert(payload_ref.name.clone(), arg_type);
                        }
                    }
                }
            }
            let ExprKind::Call { args: slot, .. } = &mut expr.kind else { unreachable!() };
            *slot = args_owned;
        }
        // fill remaining parameters from the enclosing return type
        if let Some(current) = self.current_return_type.clone() {
            let (ret_base, ret_args) = split_specialized_name(&current.name);
            if ret_base == *enum_name && ret_args.len() == param_names.len() {
                for (name, arg) in param_names.iter().zip(ret_args.iter()) {
                    mapping
                        .entry(name.clone())
                        .or_insert_with(|| self.resolve_simple_name(arg));
                }
            }
        }
        let missing: Vec<&String> =
            param_names.iter().filter(|n| !mapping.contains_key(*n)).collect();
        if !missing.is_empty() {
            self.errors.push(Diagnostic::new(
                DiagnosticKind::GenericArityMismatch,
                format!(
                    "cannot infer type parameters for {enum_name}: {}",
                    missing.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                ),
                Some(span),
            ));
        }
        let arg_types: Vec<Type> = param_names
            .iter()
            .map(|n| mapping.get(n).cloned().unwrap_or_else(Type::unit))
            .collect();
        let mut spec_ref = TypeRef {
            name: enum_name.clone(),
            args: arg_types
                .iter()
                .map(|t| TypeRef::named(t.name.clone(), span))
                .collect(),
            span,
        };
        let spec_type = self.resolve_generic_type_ref(&mut spec_ref);
        let ExprKind::Call { callee, .. } = &mut expr.kind else { unreachable!() };
        *callee = format!("{}.{}", spec_type.name, case_name);
        spec_type
    }

    fn register_struct(&mut self, def: &StructDef) {
        if !def.type_params.is_empty() {
            let fields = def.fields.iter().map(|f| (f.name.clone(), f.type_ref.clone())).collect();
            self.generic_structs.insert(def.name.clone(), (def.type_params.clone(), fields));
            return;
        }
        let mut fields = Vec::new();
        let mut is_copy = true;
        for field in &def.fields {
            let mut tref = field.type_ref.clone();
            let t = self.resolve_type_mut(&mut tref);
            if !t.is_copy {
                is_copy = false;
            }
            fields.push((field.name.clone(), t));
        }
        self.struct_defs.insert(def.name.clone(), fields);
        self.custom_types.insert(def.name.clone(), Type::named(def.name.clone(), is_copy));
    }

    fn register_enum(&mut self, def: &EnumDef) {
        if !def.type_params.is_empty() {
            let cases = def.cases.iter().map(|c| (c.name.clone(), c.payload.clone())).collect();
            self.generic_enums.insert(def.name.clone(), (def.type_params.clone(), cases));
            return;
        }
        let mut cases = Vec::new();
        for case in &def.cases {
            let payload = case.payload.clone().map(|mut p| self.resolve_type_mut(&mut p));
            cases.push((case.name.clone(), payload));
        }
        self.enum_defs.insert(def.name.clone(), cases);
        self.custom_types.insert(def.name.clone(), Type::named(def.name.clone(), false));
    }

    fn register_trait(&mut self, def: &TraitDef) {
        if self.trait_defs.contains_key(&def.name) {
            self.errors.push(Diagnostic::new(
                DiagnosticKind::AmbiguousImpl,
                format!("duplicate trait: {}", def.name),
                Some(def.span),
            ));
            return;
        }
        self.trait_defs.insert(def.name.clone(), def.type_params.clone());
    }

    fn register_impl(&mut self, def: &ImplDef) {
        let type_name = def.for_type.name.clone();
        if let Some(trait_name) = &def.trait_name {
            let traits = self.impl_traits.entry(type_name.clone()).or_default();
            if !traits.insert(trait_name.clone()) {
                self.errors.push(Diagnostic::new(
                    DiagnosticKind::AmbiguousImpl,
                    format!("multiple impls of {trait_name} for {type_name}"),
                    Some(def.span),
                ));
                return;
            }
        }
        for method in &def.methods {
            let impl_name = impl_method_name(&type_name, def.trait_name.as_deref(), &method.name);
            if self.impl_methods.get(&type_name).map(|m| m.contains_key(&method.name)).unwrap_or(false)
                && def.trait_name.is_none()
            {
                self.errors.push(Diagnostic::new(
                    DiagnosticKind::AmbiguousImpl,
                    format!("multiple definitions of method {} for {type_name}", method.name),
                    Some(method.span),
                ));
                continue;
            }
            let mut impl_func = method.clone();
            impl_func.name = impl_name.clone();
            for param in &mut impl_func.params {
                param.type_ref = substitute_self_type(&param.type_ref, &def.for_type);
            }
            impl_func.return_type = substitute_self_type(&impl_func.return_type, &def.for_type);
            let params: Vec<Type> = impl_func
                .params
                .iter()
                .map(|p| {
                    let mut tref = p.type_ref.clone();
                    self.resolve_type_mut(&mut tref)
                })
                .collect();
            let mut ret_ref = impl_func.return_type.clone();
            let sig = FuncSig::new(params, self.resolve_type_mut(&mut ret_ref));
            self.impl_methods
                .entry(type_name.clone())
                .or_default()
                .insert(method.name.clone(), (impl_name, sig));
            self.impl_functions.push(impl_func);
        }
    }

    fn register_import(&mut self, import: &Import) {
        let module = import.module.clone();
        match &import.alias {
            Some(alias) => {
                if self.import_aliases.contains_key(alias) {
                    self.errors.push(Diagnostic::new(
                        DiagnosticKind::UnknownSymbol,
                        format!("duplicate import alias: {alias}"),
                        Some(import.span),
                    ));
                } else {
                    self.import_aliases.insert(alias.clone(), module.clone());
                }
            }
            None => {
                self.import_aliases.insert(module.clone(), module.clone());
            }
        }
        if import.is_use && !self.use_modules.contains(&module) {
            self.use_modules.push(module);
        }
    }

    fn resolve_callee(&mut self, callee: String, _locals: &HashMap<String, Type>) -> String {
        if let Some((prefix, fn_name)) = callee.split_once('.') {
            let prefix = self
                .import_aliases
                .get(prefix)
                .cloned()
                .unwrap_or_else(|| prefix.to_string());
            if fn_name.contains("__") {
                let base = fn_name.split("__").next().unwrap_or_default();
                if self.external.generic_funcs.contains_key(&format!("{prefix}.{base}")) {
                    return format!("{prefix}__{fn_name}");
                }
            }
            return format!("{prefix}.{fn_name}");
        }
        if self.builtin_sigs.contains_key(&callee)
            || self.func_sigs.contains_key(&callee)
            || self.external.sigs.contains_key(&callee)
        {
            return callee;
        }
        let candidates: Vec<String> = self
            .use_modules
            .iter()
            .map(|m| format!("{m}.{callee}"))
            .filter(|full| self.external.sigs.contains_key(full))
            .collect();
        if candidates.len() == 1 {
            return candidates.into_iter().next().unwrap();
        }
        if candidates.len() > 1 {
            self.errors.push(Diagnostic::new(
                DiagnosticKind::UnknownSymbol,
                format!("ambiguous call '{callee}' via use imports"),
                None,
            ));
        }
        if callee.contains("__") {
            let base = callee.split("__").next().unwrap_or_default();
            let generic_candidates: Vec<String> = self
                .use_modules
                .iter()
                .filter(|m| self.external.generic_funcs.contains_key(&format!("{m}.{base}")))
                .map(|m| format!("{m}__{callee}"))
                .collect();
            if generic_candidates.len() == 1 {
                return generic_candidates.into_iter().next().unwrap();
            }
        }
        callee
    }

    // === generic specialization ===

    /// `name__int__string` → instantiate the generic struct/enum `name`.
    fn ensure_type_specialization(&mut self, name: &str) {
        let parts: Vec<&str> = name.split("__").collect();
        if parts.len() < 2 {
            return;
        }
        let base = parts[0];
        if !self.generic_structs.contains_key(base) && !self.generic_enums.contains_key(base) {
            return;
        }
        let mut tref = TypeRef {
            name: base.to_string(),
            args: parts[1..]
                .iter()
                .map(|p| TypeRef::named(p.to_string(), Span::dummy()))
                .collect(),
            span: Span::dummy(),
        };
        self.resolve_generic_type_ref(&mut tref);
    }

    /// `name__int` → instantiate the generic function `name` with `int`,
    /// checking trait bounds and registering the specialized definition.
    fn ensure_function_specialization(&mut self, name: &str, span: Span) {
        let parts: Vec<&str> = name.split("__").collect();
        if parts.len() < 2 {
            return;
        }
        let mut base = parts[0].to_string();
        let mut type_parts: Vec<String> = parts[1..].iter().map(|s| s.to_string()).collect();
        if !self.generic_funcs.contains_key(&base) {
            if parts.len() < 3 {
                return;
            }
            let dotted = format!("{}.{}", parts[0], parts[1]);
            if !self.generic_funcs.contains_key(&dotted) {
                return;
            }
            base = dotted;
            type_parts = parts[2..].iter().map(|s| s.to_string()).collect();
        }
        let func = self.generic_funcs.get(&base).cloned().unwrap();
        let param_names: Vec<String> = func.type_params.iter().map(|p| p.name.clone()).collect();
        if type_parts.len() != param_names.len() {
            self.errors.push(Diagnostic::new(
                DiagnosticKind::GenericArityMismatch,
                format!(
                    "generic function {base} expects {} type arguments, got {}",
                    param_names.len(),
                    type_parts.len()
                ),
                Some(span),
            ));
            return;
        }
        let arg_types: Vec<Type> = type_parts.iter().map(|p| self.resolve_simple_name(p)).collect();
        for (param, arg_type) in func.type_params.iter().zip(arg_types.iter()) {
            self.check_type_param_bounds(param, arg_type, span);
        }
        if self.func_sigs.contains_key(name) {
            return; // already instantiated: share the definition
        }
        let subst: HashMap<String, Type> =
            param_names.iter().cloned().zip(arg_types.iter().cloned()).collect();
        let mut spec_func = func.clone();
        spec_func.name = name.to_string();
        spec_func.type_params = Vec::new();
        for param in &mut spec_func.params {
            let substituted = substitute_type_params(&param.type_ref, &subst);
            param.type_ref = self.finalize_type_ref(substituted);
        }
        let substituted_ret = substitute_type_params(&spec_func.return_type, &subst);
        spec_func.return_type = self.finalize_type_ref(substituted_ret);
        let params: Vec<Type> = spec_func
            .params
            .iter()
            .map(|p| {
                let mut tref = p.type_ref.clone();
                self.resolve_type_mut(&mut tref)
            })
            .collect();
        let mut ret_ref = spec_func.return_type.clone();
        let returns = self.resolve_type_mut(&mut ret_ref);
        self.func_sigs.insert(name.to_string(), FuncSig::new(params, returns));
        let saved = self.current_return_type.take();
        self.check_function(&mut spec_func);
        self.current_return_type = saved;
        self.specialized_functions.push(spec_func);
    }

    fn check_type_param_bounds(&mut self, param: &TypeParam, actual: &Type, span: Span) {
        for bound in &param.bounds {
            let implemented = self
                .impl_traits
                .get(&actual.name)
                .map(|set| set.contains(bound))
                .unwrap_or(false);
            if implemented {
                continue;
            }
            let hint = if self.trait_defs.contains_key(bound) {
                let known: Vec<String> = self
                    .impl_traits
                    .iter()
                    .filter(|(_, traits)| traits.contains(bound))
                    .map(|(name, _)| name.clone())
                    .collect();
                if known.is_empty() {
                    "no known impls in current modules".to_string()
                } else {
                    let mut known = known;
                    known.sort();
                    format!("known impls: {}", known.join(", "))
                }
            } else {
                "trait not found".to_string()
            };
            self.errors.push(Diagnostic::new(
                DiagnosticKind::UnresolvedTraitBound,
                format!(
                    "type '{}' does not implement trait '{}' (hint: implement `impl {} for {}`; {})",
                    actual.name, bound, bound, actual.name, hint
                ),
                Some(span),
            ));
        }
    }

    // === type resolution ===

    pub fn resolve_type_mut(&mut self, tref: &mut TypeRef) -> Type {
        if !tref.args.is_empty() {
            return self.resolve_generic_type_ref(tref);
        }
        if let Some(t) = self.custom_types.get(&tref.name) {
            return t.clone();
        }
        if let Some(t) = self.resolve_external_type(&tref.name) {
            return t;
        }
        if let Some(t) = builtin_type(&tref.name) {
            return t;
        }
        Type::named(tref.name.clone(), false)
    }

    /// Specializes a generic struct/enum reference in place: the tref's name
    /// becomes the mangled instantiation and its arguments are cleared, so
    /// everything downstream sees only concrete names.
    fn resolve_generic_type_ref(&mut self, tref: &mut TypeRef) -> Type {
        let name = tref.name.clone();
        if let Some((params, fields)) = self.generic_structs.get(&name).cloned() {
            let param_names: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
            if tref.args.len() != param_names.len() {
                self.errors.push(Diagnostic::new(
                    DiagnosticKind::GenericArityMismatch,
                    format!("generic struct {name} expects {} arguments, got {}", param_names.len(), tref.args.len()),
                    Some(tref.span),
                ));
                return Type::named(name, false);
            }
            let arg_types: Vec<Type> =
                tref.args.iter_mut().map(|a| self.resolve_type_mut(a)).collect();
            for (param, arg) in params.iter().zip(arg_types.iter()) {
                self.check_type_param_bounds(param, arg, tref.span);
            }
            let subst: HashMap<String, Type> =
                param_names.into_iter().zip(arg_types.iter().cloned()).collect();
            let spec_name = specialize_name(&name, &arg_types);
            if !self.custom_types.contains_key(&spec_name) {
                let mut spec_fields = Vec::new();
                let mut is_copy = true;
                for (field_name, field_ref) in &fields {
                    let t = self.resolve_type_ref_subst(field_ref, &subst);
                    if !t.is_copy {
                        is_copy = false;
                    }
                    spec_fields.push((field_name.clone(), t));
                }
                self.struct_defs.insert(spec_name.clone(), spec_fields);
                self.custom_types.insert(spec_name.clone(), Type::named(spec_name.clone(), is_copy));
            }
            tref.name = spec_name.clone();
            tref.args.clear();
            return self.custom_types.get(&spec_name).cloned().unwrap();
        }
        if let Some((params, cases)) = self.generic_enums.get(&name).cloned() {
            let param_names: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
            if tref.args.len() != param_names.len() {
                self.errors.push(Diagnostic::new(
                    DiagnosticKind::GenericArityMismatch,
                    format!("generic enum {name} expects {} arguments, got {}", param_names.len(), tref.args.len()),
                    Some(tref.span),
                ));
                return Type::named(name, false);
            }
            let arg_types: Vec<Type> =
                tref.args.iter_mut().map(|a| self.resolve_type_mut(a)).collect();
            for (param, arg) in params.iter().zip(arg_types.iter()) {
                self.check_type_param_bounds(param, arg, tref.span);
            }
            let subst: HashMap<String, Type> =
                param_names.into_iter().zip(arg_types.iter().cloned()).collect();
            let spec_name = specialize_name(&name, &arg_types);
            if !self.custom_types.contains_key(&spec_name) {
                let mut spec_cases = Vec::new();
                for (case_name, payload) in &cases {
                    let payload = payload.as_ref().map(|p| self.resolve_type_ref_subst(p, &subst));
                    spec_cases.push((case_name.clone(), payload));
                }
                self.enum_defs.insert(spec_name.clone(), spec_cases);
                self.custom_types.insert(spec_name.clone(), Type::named(spec_name.clone(), false));
            }
            tref.name = spec_name.clone();
            tref.args.clear();
            return self.custom_types.get(&spec_name).cloned().unwrap();
        }
        self.errors.push(Diagnostic::new(
            DiagnosticKind::UnknownSymbol,
            format!("unknown generic type: {name}"),
            Some(tref.span),
        ));
        Type::named(name, false)
    }

    fn resolve_type_ref_subst(&mut self, tref: &TypeRef, subst: &HashMap<String, Type>) -> Type {
        if let Some(t) = subst.get(&tref.name) {
            return t.clone();
        }
        let mut tref = tref.clone();
        if !tref.args.is_empty() {
            for arg in &mut tref.args {
                if let Some(t) = subst.get(&arg.name) {
                    arg.name = t.name.clone();
                    arg.args.clear();
                }
            }
            return self.resolve_generic_type_ref(&mut tref);
        }
        self.resolve_type_mut(&mut tref)
    }

    fn resolve_simple_name(&mut self, name: &str) -> Type {
        let mut tref = TypeRef::named(name, Span::dummy());
        self.resolve_type_mut(&mut tref)
    }

    fn finalize_type_ref(&mut self, mut tref: TypeRef) -> TypeRef {
        let resolved = self.resolve_type_mut(&mut tref);
        TypeRef::named(resolved.name, tref.span)
    }

    fn resolve_external_type(&mut self, name: &str) -> Option<Type> {
        if self.external.types.is_empty() {
            return None;
        }
        let imported: HashSet<&String> = self.import_aliases.values().collect();
        let matches: Vec<&Type> = self
            .external
            .types
            .iter()
            .filter_map(|(full, t)| {
                let (module, type_name) = full.split_once('.')?;
                (type_name == name && imported.contains(&module.to_string())).then_some(t)
            })
            .collect();
        match matches.len() {
            1 => Some(matches[0].clone()),
            0 => None,
            _ => {
                self.errors.push(Diagnostic::new(
                    DiagnosticKind::UnknownSymbol,
                    format!("ambiguous type name: {name}"),
                    None,
                ));
                None
            }
        }
    }
}

fn impl_method_name(type_name: &str, trait_name: Option<&str>, method: &str) -> String {
    match trait_name {
        Some(t) => format!("{type_name}__{t}__{method}"),
        None => format!("{type_name}__{method}"),
    }
}

fn substitute_self_type(tref: &TypeRef, for_type: &TypeRef) -> TypeRef {
    if tref.name == "Self" {
        return for_type.clone();
    }
    if tref.args.is_empty() {
        return tref.clone();
    }
    TypeRef {
        name: tref.name.clone(),
        args: tref.args.iter().map(|a| substitute_self_type(a, for_type)).collect(),
        span: tref.span,
    }
}

fn substitute_type_params(tref: &TypeRef, subst: &HashMap<String, Type>) -> TypeRef {
    if let Some(t) = subst.get(&tref.name) {
        return TypeRef::named(t.name.clone(), tref.span);
    }
    if tref.args.is_empty() {
        return tref.clone();
    }
    TypeRef {
        name: tref.name.clone(),
        args: tref.args.iter().map(|a| substitute_type_params(a, subst)).collect(),
        span: tref.span,
    }
}

pub fn specialize_name(base: &str, args: &[Type]) -> String {
    let suffix = args
        .iter()
        .map(|a| a.name.replace('.', "__"))
        .collect::<Vec<_>>()
        .join("__");
    format!("{base}__{suffix}")
}

pub fn split_specialized_name(name: &str) -> (String, Vec<String>) {
    let mut parts = name.split("__");
    let base = parts.next().unwrap_or_default().to_string();
    (base, parts.map(|s| s.to_string()).collect())
}

fn is_panic_expr(expr: &Expr) -> bool {
    matches!(&expr.kind, ExprKind::Call { callee, .. } if callee == "panic")
}

/// Signatures mirroring the fixed runtime symbol table the emitter targets.
fn builtin_signatures() -> HashMap<String, FuncSig> {
    let mut sigs = HashMap::new();
    let mut add = |name: &str, params: Vec<Type>, returns: Type| {
        sigs.insert(name.to_string(), FuncSig::new(params, returns));
    };
    add("str_len", vec![Type::string()], Type::int());
    add("str_char_at", vec![Type::string(), Type::int()], Type::int());
    add("str_find_char", vec![Type::string(), Type::int(), Type::int()], Type::int());
    add("str_starts_with", vec![Type::string(), Type::string()], Type::bool_());
    add("str_to_int", vec![Type::string()], Type::int());
    add("str_substr", vec![Type::string(), Type::int(), Type::int()], Type::string());
    add("str_trim", vec![Type::string()], Type::string());
    add("str_concat", vec![Type::string(), Type::string()], Type::string());
    add("str_release", vec![Type::string()], Type::unit());
    add("int_to_str", vec![Type::int()], Type::string());
    add("bool_to_str", vec![Type::bool_()], Type::string());
    add("file_read", vec![Type::string()], Type::string());
    add("file_write", vec![Type::string(), Type::string()], Type::int());
    add("file_exists", vec![Type::string()], Type::bool_());
    add("file_delete", vec![Type::string()], Type::int());
    add("file_move", vec![Type::string(), Type::string()], Type::int());
    add("file_copy", vec![Type::string(), Type::string()], Type::int());
    add("dir_create", vec![Type::string()], Type::int());
    add("dir_exists", vec![Type::string()], Type::bool_());
    add("module_load", vec![Type::string()], Type::string());
    add("error_last", vec![], Type::string());
    add("error_clear", vec![], Type::unit());
    add("panic", vec![Type::string()], Type::unit());
    add("vec_new", vec![], Type::vec());
    add("vec_push", vec![Type::vec(), Type::int()], Type::unit());
    add("vec_get", vec![Type::vec(), Type::int()], Type::int());
    add("vec_len", vec![Type::vec()], Type::int());
    add("vec_release", vec![Type::vec()], Type::unit());
    add("tensor_create", vec![Type::int(), Type::int()], Type::tensor());
    add("tensor_matmul", vec![Type::tensor(), Type::tensor()], Type::tensor());
    add("tensor_release", vec![Type::tensor()], Type::unit());
    add("channel", vec![], Type::channel());
    add("send", vec![Type::channel(), Type::int()], Type::unit());
    add("recv", vec![Type::channel()], Type::int());
    add("channel_close", vec![Type::channel()], Type::unit());
    add("spawn", vec![], Type::unit());
    add("log_set_level", vec![Type::int()], Type::unit());
    add("log_info", vec![Type::string()], Type::unit());
    add("log_warn", vec![Type::string()], Type::unit());
    add("log_error", vec![Type::string()], Type::unit());
    add("net_connect", vec![Type::string(), Type::int()], Type::int());
    add("net_send", vec![Type::int(), Type::string()], Type::int());
    add("net_recv", vec![Type::int(), Type::int()], Type::string());
    add("net_close", vec![Type::int()], Type::int());
    add("rt_string_live", vec![], Type::int());
    add("rt_vec_live", vec![], Type::int());
    add("rt_buffer_live", vec![], Type::int());
    add("rt_channel_live", vec![], Type::int());
    sigs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::source::SourceFile;

    fn check(src: &str) -> (TypeChecker, Module) {
        let sf = SourceFile::new(0, "test.dsy".into(), src);
        let mut module = parser::parse(&sf).expect("parse failed");
        let mut checker = TypeChecker::new(ExternalContext::default());
        checker.check_module(&mut module);
        (checker, module)
    }

    fn kinds(checker: &TypeChecker) -> Vec<DiagnosticKind> {
        checker.errors.iter().map(|d| d.kind).collect()
    }

    #[test]
    fn accepts_well_typed_program() {
        let (checker, _) = check(
            "module m\nfn add(a: int, b: int) -> int:\n  return a + b\nfn main() -> int:\n  let x = add(1, 2)\n  return x\n",
        );
        assert!(checker.errors.is_empty(), "unexpected errors: {:?}", checker.errors);
    }

    #[test]
    fn rejects_bool_arithmetic() {
        let (checker, _) = check("module m\nfn f() -> int:\n  return true + 1\n");
        assert!(kinds(&checker).contains(&DiagnosticKind::TypeMismatch));
    }

    #[test]
    fn unknown_name_is_reported() {
        let (checker, _) = check("module m\nfn f() -> int:\n  return ghost\n");
        assert!(kinds(&checker).contains(&DiagnosticKind::UnknownSymbol));
    }

    #[test]
    fn generic_function_monomorphizes() {
        let (checker, _) = check(
            "module m\nfn id<T>(x: T) -> T:\n  return x\nfn main() -> int:\n  let a = id<int>(1)\n  let b = id<int>(2)\n  return a + b\n",
        );
        assert!(checker.errors.is_empty(), "unexpected errors: {:?}", checker.errors);
        // repeated instantiation shares one specialized definition
        assert_eq!(checker.specialized_functions.len(), 1);
        assert_eq!(checker.specialized_functions[0].name, "id__int");
        assert!(checker.specialized_functions[0].type_params.is_empty());
    }

    #[test]
    fn trait_bound_must_be_satisfied() {
        let (checker, _) = check(
            "module m\ntrait Printable:\n  fn describe(x: int) -> string\nfn show<T: Printable>(x: T) -> int:\n  return 0\nfn main() -> int:\n  return show<int>(1)\n",
        );
        assert!(kinds(&checker).contains(&DiagnosticKind::UnresolvedTraitBound));
    }

    #[test]
    fn trait_bound_satisfied_by_impl() {
        let (checker, _) = check(
            "module m\ntrait Printable:\n  fn describe(self: Self) -> string\nstruct Point:\n  x: int\n  y: int\nimpl Printable for Point:\n  fn describe(self: Point) -> string:\n    return \"point\"\nfn show<T: Printable>(x: T) -> int:\n  return 0\nfn main() -> int:\n  let p = Point(1, 2)\n  return show<Point>(p)\n",
        );
        assert!(checker.errors.is_empty(), "unexpected errors: {:?}", checker.errors);
    }

    #[test]
    fn duplicate_trait_impl_is_ambiguous() {
        let (checker, _) = check(
            "module m\ntrait Printable:\n  fn describe(self: Self) -> string\nstruct Point:\n  x: int\nimpl Printable for Point:\n  fn describe(self: Point) -> string:\n    return \"a\"\nimpl Printable for Point:\n  fn describe(self: Point) -> string:\n    return \"b\"\nfn main() -> int:\n  return 0\n",
        );
        assert!(kinds(&checker).contains(&DiagnosticKind::AmbiguousImpl));
    }

    #[test]
    fn generic_arity_is_checked() {
        let (checker, _) = check(
            "module m\nfn id<T>(x: T) -> T:\n  return x\nfn main() -> int:\n  return id<int, int>(1)\n",
        );
        assert!(kinds(&checker).contains(&DiagnosticKind::GenericArityMismatch));
    }

    #[test]
    fn try_requires_matching_return() {
        let (checker, _) = check(
            "module m\nfn inner() -> Result<int, int>:\n  return Result.Ok(1)\nfn outer() -> int:\n  let x = try inner()\n  return x\n",
        );
        assert!(kinds(&checker).contains(&DiagnosticKind::TypeMismatch));
    }

    #[test]
    fn try_propagates_ok_type() {
        let (checker, _) = check(
            "module m\nfn inner() -> Result<int, int>:\n  return Result.Ok(41)\nfn outer() -> Result<int, int>:\n  let x = try inner()\n  return Result.Ok(x + 1)\n",
        );
        assert!(checker.errors.is_empty(), "unexpected errors: {:?}", checker.errors);
    }

    #[test]
    fn non_exhaustive_match_is_rejected() {
        let (checker, _) = check(
            "module m\nenum Shape:\n  case Dot\n  case Line: int\nfn f(s: Shape) -> int:\n  match s:\n    case Shape.Dot:\n      return 0\n  return 1\n",
        );
        let errs = kinds(&checker);
        assert!(errs.contains(&DiagnosticKind::NonExhaustiveMatch), "got {errs:?}");
    }

    #[test]
    fn wildcard_satisfies_exhaustiveness() {
        let (checker, _) = check(
            "module m\nenum Shape:\n  case Dot\n  case Line: int\nfn f(s: Shape) -> int:\n  match s:\n    case Shape.Dot:\n      return 0\n    case _:\n      return 1\n  return 2\n",
        );
        assert!(checker.errors.is_empty(), "unexpected errors: {:?}", checker.errors);
    }

    #[test]
    fn guarded_arm_does_not_count() {
        let (checker, _) = check(
            "module m\nenum Shape:\n  case Dot\n  case Line: int\nfn f(s: Shape) -> int:\n  match s:\n    case Shape.Dot:\n      return 0\n    case Shape.Line(n) if n > 2:\n      return n\n  return 1\n",
        );
        assert!(kinds(&checker).contains(&DiagnosticKind::NonExhaustiveMatch));
    }

    #[test]
    fn method_calls_resolve_through_impls() {
        let (checker, module) = check(
            "module m\nstruct Point:\n  x: int\n  y: int\nimpl Point:\n  fn sum(self: Point) -> int:\n    return self.x + self.y\nfn main() -> int:\n  let p = Point(1, 2)\n  return p.sum()\n",
        );
        assert!(checker.errors.is_empty(), "unexpected errors: {:?}", checker.errors);
        // the call site was rewritten to the impl symbol
        let Stmt::Func(main) = module.body.iter().find(|s| matches!(s, Stmt::Func(f) if f.name == "main")).unwrap() else {
            unreachable!()
        };
        let Stmt::Return { value: Some(v), .. } = &main.body[1] else { panic!() };
        let ExprKind::Call { callee, args } = &v.kind else { panic!() };
        assert_eq!(callee, "Point__sum");
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn release_requires_owning_value() {
        let (checker, _) = check("module m\nfn f(x: int) -> int:\n  release x\n  return 0\n");
        assert!(kinds(&checker).contains(&DiagnosticKind::TypeMismatch));
    }

    #[test]
    fn generic_struct_specializes_under_mangled_name() {
        let (checker, _) = check(
            "module m\nstruct Pair<T>:\n  first: T\n  second: T\nfn main() -> int:\n  let p = Pair__int(1, 2)\n  return p.first\n",
        );
        assert!(checker.errors.is_empty(), "unexpected errors: {:?}", checker.errors);
        assert!(checker.struct_defs.contains_key("Pair__int"));
    }
}
