//! C11 emitter.
//!
//! One translation unit per module. All runtime services go through the
//! fixed symbol table in `rt.h`; the emitter never inlines runtime logic.
//! Blocks emit as labels with `goto`; `phi` results are materialized as
//! assignments on the incoming edges. Owning temporaries that neither
//! escape nor get released explicitly are released before each return.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::abi;
use crate::ir::{Instr, IrFunction, IrModule, Op};

/// `(module, params, return)` for a cross-module callee.
pub type ExternSignature = (String, Vec<String>, String);

pub struct CEmitter {
    /// Emit bounds guards around view/buffer/vector accesses.
    pub rt_checks: bool,
}

impl CEmitter {
    pub fn new(rt_checks: bool) -> Self {
        Self { rt_checks }
    }

    pub fn emit(
        &self,
        module: &IrModule,
        extern_signatures: &HashMap<String, ExternSignature>,
    ) -> String {
        let mut lines: Vec<String> = Vec::new();
        lines.push("#include <stdint.h>".into());
        lines.push("#include \"rt.h\"".into());
        lines.push(String::new());

        let ctx = ModuleCtx::new(module);
        for st in &module.structs {
            let c_name = ctx.struct_type_name(&st.name);
            lines.push(format!("typedef struct {c_name} {{"));
            for (field, ty) in &st.fields {
                lines.push(format!("  {} {};", ctx.map_type(ty), field));
            }
            lines.push(format!("}} {c_name};"));
        }
        for en in &module.enums {
            let c_name = ctx.enum_type_name(&en.name);
            lines.push(format!("typedef struct {c_name} {{"));
            lines.push("  int64_t tag;".into());
            lines.push("  union {".into());
            for (case, payload) in &en.cases {
                if let Some(ty) = payload {
                    lines.push(format!("    {} {};", ctx.map_type(ty), case));
                }
            }
            lines.push("  } data;".into());
            lines.push(format!("}} {c_name};"));
        }
        if !module.structs.is_empty() || !module.enums.is_empty() {
            lines.push(String::new());
        }

        for ext in &module.externs {
            let params = ext
                .params
                .iter()
                .map(|p| format!("{} {}", ctx.map_type(&p.ty), p.name))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!(
                "extern {} {}({});",
                ctx.map_type(&ext.return_type),
                ext.name,
                params
            ));
        }
        // cross-module calls need extern prototypes for the mangled symbols
        let mut extern_used: BTreeMap<String, (Vec<String>, String)> = BTreeMap::new();
        for func in &module.functions {
            for block in &func.blocks {
                for instr in &block.instrs {
                    if instr.op == Op::Call && instr.args[0].contains('.') {
                        if let Some((_, params, ret)) = extern_signatures.get(&instr.args[0]) {
                            extern_used
                                .insert(instr.args[0].clone(), (params.clone(), ret.clone()));
                        }
                    }
                }
            }
        }
        for (callee, (params, ret)) in &extern_used {
            let (mod_name, fn_name) = callee.split_once('.').unwrap();
            let sig = params
                .iter()
                .enumerate()
                .map(|(idx, p)| format!("{} arg_{}", ctx.map_type(p), idx))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!(
                "extern {} {}({});",
                ctx.map_type(ret),
                abi::mangle(mod_name, fn_name),
                sig
            ));
        }
        if !module.externs.is_empty() || !extern_used.is_empty() {
            lines.push(String::new());
        }

        for func in &module.functions {
            if func.name == "main" {
                continue;
            }
            let params = func
                .params
                .iter()
                .map(|p| format!("{} {}", ctx.map_type(&p.ty), p.name))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!(
                "{} {}({});",
                ctx.map_type(&func.return_type),
                abi::mangle(&module.name, &func.name),
                params
            ));
        }
        if !module.functions.is_empty() {
            lines.push(String::new());
        }

        for func in &module.functions {
            lines.extend(self.emit_function(func, &ctx, extern_signatures));
            lines.push(String::new());
        }
        lines.join("\n")
    }

    fn emit_function(
        &self,
        func: &IrFunction,
        ctx: &ModuleCtx,
        extern_signatures: &HashMap<String, ExternSignature>,
    ) -> Vec<String> {
        let mut out = Vec::new();
        let params = func
            .params
            .iter()
            .map(|p| format!("{} {}", ctx.map_type(&p.ty), p.name))
            .collect::<Vec<_>>()
            .join(", ");
        if func.name == "main" {
            out.push(format!("{} main({}) {{", ctx.map_type(&func.return_type), params));
        } else {
            out.push(format!(
                "{} {}({}) {{",
                ctx.map_type(&func.return_type),
                abi::mangle(&ctx.module_name, &func.name),
                params
            ));
        }

        let mut fn_ctx = FnCtx::new(func, ctx);
        // phi results exist before any predecessor jumps in
        for block in &func.blocks {
            for instr in &block.instrs {
                if instr.op == Op::Phi {
                    let result = instr.result.clone().unwrap_or_default();
                    out.push(format!("  int64_t {result} = 0;"));
                    fn_ctx.declared.insert(result.clone());
                    fn_ctx.var_types.insert(result, "int".into());
                    for pair in instr.args.chunks(2) {
                        if let [value, pred] = pair {
                            fn_ctx
                                .phi_copies
                                .entry((pred.clone(), block.label.clone()))
                                .or_default()
                                .push((instr.result.clone().unwrap_or_default(), value.clone()));
                        }
                    }
                }
            }
        }
        let referenced: HashSet<&String> = func
            .blocks
            .iter()
            .flat_map(|b| b.instrs.iter())
            .flat_map(|i| match i.op {
                Op::Br => i.args.iter().take(1).collect::<Vec<_>>(),
                Op::CondBr => i.args.iter().skip(1).collect(),
                _ => Vec::new(),
            })
            .collect();

        for block in &func.blocks {
            if referenced.contains(&block.label) {
                out.push(format!("{}: ;", label_name(&block.label)));
            }
            for instr in &block.instrs {
                out.extend(self.emit_instr(instr, &block.label, &mut fn_ctx, ctx, extern_signatures));
            }
        }
        if func.return_type == "unit" {
            out.push("  return 0;".into());
        }
        out.push("}".into());
        out
    }

    fn emit_instr(
        &self,
        instr: &Instr,
        block_label: &str,
        fn_ctx: &mut FnCtx,
        ctx: &ModuleCtx,
        extern_signatures: &HashMap<String, ExternSignature>,
    ) -> Vec<String> {
        let mut out = Vec::new();
        let args = &instr.args;
        let result = instr.result.clone().unwrap_or_default();
        match &instr.op {
            Op::Const => {
                out.push(format!("  int64_t {result} = {};", args[0]));
                fn_ctx.set_type(&result, "int");
            }
            Op::ConstStr => {
                out.push(format!("  const char* {result} = \"{}\";", escape_c(&args[0])));
                fn_ctx.set_type(&result, "string");
            }
            Op::Assign => {
                let value = &args[0];
                if fn_ctx.declared.contains(&result) {
                    out.push(format!("  {result} = {value};"));
                } else {
                    let ty = fn_ctx.var_types.get(value).cloned().unwrap_or_else(|| "int".into());
                    out.push(format!("  {} {result} = {value};", ctx.map_type(&ty)));
                    fn_ctx.set_type(&result, &ty);
                }
                if let Some(kind) = fn_ctx.owned.remove(value) {
                    if result != *value {
                        fn_ctx.owned.insert(result.clone(), kind);
                    }
                }
            }
            Op::Add | Op::Sub | Op::Mul => {
                let symbol = match instr.op {
                    Op::Add => "+",
                    Op::Sub => "-",
                    _ => "*",
                };
                // int arithmetic is modular 64-bit signed
                out.push(format!(
                    "  int64_t {result} = (int64_t)((uint64_t){} {symbol} (uint64_t){});",
                    args[0], args[1]
                ));
                fn_ctx.set_type(&result, "int");
            }
            Op::Div => {
                out.push(format!("  int64_t {result} = {} / {};", args[0], args[1]));
                fn_ctx.set_type(&result, "int");
            }
            Op::Neg => {
                out.push(format!("  int64_t {result} = -{};", args[0]));
                fn_ctx.set_type(&result, "int");
            }
            Op::Eq | Op::Ne | Op::Lt | Op::Gt | Op::Le | Op::Ge => {
                let symbol = match instr.op {
                    Op::Eq => "==",
                    Op::Ne => "!=",
                    Op::Lt => "<",
                    Op::Gt => ">",
                    Op::Le => "<=",
                    _ => ">=",
                };
                out.push(format!("  int64_t {result} = ({} {symbol} {});", args[0], args[1]));
                fn_ctx.set_type(&result, "int");
            }
            Op::Print => {
                let value = &args[0];
                match fn_ctx.var_types.get(value).map(|s| s.as_str()) {
                    Some("string") => out.push(format!("  daisy_print_str({value});")),
                    _ => out.push(format!("  daisy_print_int({value});")),
                }
            }
            Op::BufCreate => {
                out.push(format!("  DaisyBuffer {result} = daisy_buffer_create({});", args[0]));
                fn_ctx.set_type(&result, "buffer");
                fn_ctx.owned.insert(result.clone(), "buffer".into());
            }
            Op::BufBorrow => {
                if self.rt_checks {
                    out.push(format!(
                        "  if ({s} < 0 || {e} < {s} || {e} > {b}.size) {{ daisy_rt_fail(\"view.bounds\"); }}",
                        s = args[1],
                        e = args[2],
                        b = args[0]
                    ));
                }
                out.push(format!(
                    "  DaisyView {result} = daisy_buffer_borrow(&{}, {}, {}, {});",
                    args[0], args[1], args[2], args[3]
                ));
                fn_ctx.set_type(&result, "view");
            }
            Op::ViewBorrow => {
                out.push(format!(
                    "  DaisyView {result} = daisy_view_borrow({}, {});",
                    args[0], args[1]
                ));
                fn_ctx.set_type(&result, "view");
            }
            Op::Release { .. } => {
                let target = &args[0];
                match fn_ctx.var_types.get(target).map(|s| s.as_str()) {
                    Some("buffer") => out.push(format!("  daisy_buffer_release(&{target});")),
                    Some("tensor") => out.push(format!("  daisy_tensor_release(&{target});")),
                    Some("channel") => out.push(format!("  daisy_channel_release({target});")),
                    Some("string") => out.push(format!("  daisy_str_release({target});")),
                    Some("vec") => out.push(format!("  daisy_vec_release({target});")),
                    _ => {}
                }
                fn_ctx.released.insert(target.clone());
                fn_ctx.owned.remove(target);
            }
            Op::StructNew => {
                let struct_name = &args[0];
                let c_type = ctx.map_type(struct_name);
                out.push(format!("  {c_type} {result};"));
                if let Some(st) = ctx.structs.get(struct_name) {
                    for (idx, (field, _)) in st.iter().enumerate() {
                        if let Some(value) = args.get(idx + 1) {
                            out.push(format!("  {result}.{field} = {value};"));
                        }
                    }
                }
                fn_ctx.set_type(&result, struct_name);
            }
            Op::StructGet => {
                let base = &args[0];
                let field = &args[1];
                let base_type = fn_ctx.var_types.get(base).cloned();
                let field_type = base_type
                    .as_deref()
                    .and_then(|t| ctx.struct_field_type(t, field))
                    .unwrap_or_else(|| "int".into());
                out.push(format!(
                    "  {} {result} = {base}.{field};",
                    ctx.map_type(&field_type)
                ));
                fn_ctx.set_type(&result, &field_type);
            }
            Op::StructSet => {
                out.push(format!("  {}.{} = {};", args[0], args[1], args[2]));
            }
            Op::EnumMake => {
                let enum_name = &args[0];
                let case_name = &args[1];
                let c_type = ctx.map_type(enum_name);
                out.push(format!("  {c_type} {result};"));
                out.push(format!(
                    "  {result}.tag = {};",
                    ctx.enum_case_index(enum_name, case_name)
                ));
                if let Some(payload) = args.get(2) {
                    out.push(format!("  {result}.data.{case_name} = {payload};"));
                }
                fn_ctx.set_type(&result, enum_name);
            }
            Op::EnumTag => {
                out.push(format!("  int64_t {result} = {}.tag;", args[0]));
                fn_ctx.set_type(&result, "int");
            }
            Op::EnumPayload => {
                let value = &args[0];
                let case_name = &args[1];
                let enum_type = fn_ctx.var_types.get(value).cloned();
                let payload_type = enum_type
                    .as_deref()
                    .and_then(|t| ctx.enum_payload_type(t, case_name))
                    .unwrap_or_else(|| "int".into());
                out.push(format!(
                    "  {} {result} = {value}.data.{case_name};",
                    ctx.map_type(&payload_type)
                ));
                fn_ctx.set_type(&result, &payload_type);
            }
            Op::Call => out.extend(self.emit_call(instr, fn_ctx, ctx, extern_signatures)),
            Op::Phi => {}
            Op::Br => {
                let target = &args[0];
                out.extend(fn_ctx.edge_copies(block_label, target));
                out.push(format!("  goto {};", label_name(target)));
            }
            Op::CondBr => {
                let cond = &args[0];
                let then_l = &args[1];
                let else_l = &args[2];
                out.push(format!("  if ({cond}) {{"));
                for copy in fn_ctx.edge_copies(block_label, then_l) {
                    out.push(format!("  {copy}"));
                }
                out.push(format!("    goto {};", label_name(then_l)));
                out.push("  } else {".into());
                for copy in fn_ctx.edge_copies(block_label, else_l) {
                    out.push(format!("  {copy}"));
                }
                out.push(format!("    goto {};", label_name(else_l)));
                out.push("  }".into());
            }
            Op::Ret => {
                if let Some(value) = args.first() {
                    if fn_ctx.owned.contains_key(value) {
                        fn_ctx.escaped.insert(value.clone());
                    }
                }
                out.extend(fn_ctx.cleanup());
                match args.first() {
                    Some(value) => out.push(format!("  return {value};")),
                    None => out.push("  return 0;".into()),
                }
            }
        }
        out
    }

    fn emit_call(
        &self,
        instr: &Instr,
        fn_ctx: &mut FnCtx,
        ctx: &ModuleCtx,
        extern_signatures: &HashMap<String, ExternSignature>,
    ) -> Vec<String> {
        let mut out = Vec::new();
        let callee = instr.args[0].as_str();
        let args: Vec<&String> = instr.args.iter().skip(1).collect();
        let result = instr.result.clone().unwrap_or_default();
        for arg in &args {
            if matches!(
                fn_ctx.var_types.get(arg.as_str()).map(|s| s.as_str()),
                Some("buffer" | "tensor" | "channel" | "string" | "vec")
            ) {
                fn_ctx.escaped.insert((*arg).clone());
            }
        }
        macro_rules! simple {
            ($line:expr, $ty:expr, $owned:expr) => {{
                out.push($line);
                if !result.is_empty() {
                    fn_ctx.set_type(&result, $ty);
                    if $owned {
                        fn_ctx.owned.insert(result.clone(), $ty.to_string());
                    }
                }
            }};
        }
        macro_rules! unit_call {
            ($call:expr) => {{
                if !result.is_empty() {
                    out.push(format!("  int64_t {result} = 0;"));
                    fn_ctx.set_type(&result, "int");
                }
                out.push($call);
            }};
        }
        match callee {
            "str_len" => simple!(format!("  int64_t {result} = daisy_str_len({});", args[0]), "int", false),
            "str_char_at" => simple!(format!("  int64_t {result} = daisy_str_char_at({}, {});", args[0], args[1]), "int", false),
            "str_find_char" => simple!(format!("  int64_t {result} = daisy_str_find_char({}, {}, {});", args[0], args[1], args[2]), "int", false),
            "str_starts_with" => simple!(format!("  int64_t {result} = daisy_str_starts_with({}, {});", args[0], args[1]), "int", false),
            "str_to_int" => simple!(format!("  int64_t {result} = daisy_str_to_int({});", args[0]), "int", false),
            "str_substr" => simple!(format!("  const char* {result} = daisy_str_substr({}, {}, {});", args[0], args[1], args[2]), "string", true),
            "str_trim" => simple!(format!("  const char* {result} = daisy_str_trim({});", args[0]), "string", true),
            "str_concat" => simple!(format!("  const char* {result} = daisy_str_concat({}, {});", args[0], args[1]), "string", true),
            "str_release" => {
                unit_call!(format!("  daisy_str_release({});", args[0]));
                fn_ctx.released.insert(args[0].clone());
                fn_ctx.owned.remove(args[0].as_str());
            }
            "int_to_str" => simple!(format!("  const char* {result} = daisy_int_to_str({});", args[0]), "string", true),
            "bool_to_str" => simple!(format!("  const char* {result} = daisy_bool_to_str({});", args[0]), "string", true),
            "file_read" => simple!(format!("  const char* {result} = daisy_file_read({});", args[0]), "string", true),
            "file_write" => simple!(format!("  int64_t {result} = daisy_file_write({}, {});", args[0], args[1]), "int", false),
            "file_exists" => simple!(format!("  int64_t {result} = daisy_file_exists({});", args[0]), "int", false),
            "file_delete" => simple!(format!("  int64_t {result} = daisy_file_delete({});", args[0]), "int", false),
            "file_move" => simple!(format!("  int64_t {result} = daisy_file_move({}, {});", args[0], args[1]), "int", false),
            "file_copy" => simple!(format!("  int64_t {result} = daisy_file_copy({}, {});", args[0], args[1]), "int", false),
            "dir_create" => simple!(format!("  int64_t {result} = daisy_dir_create({});", args[0]), "int", false),
            "dir_exists" => simple!(format!("  int64_t {result} = daisy_dir_exists({});", args[0]), "int", false),
            "module_load" => simple!(format!("  const char* {result} = daisy_module_load({});", args[0]), "string", true),
            "error_last" => simple!(format!("  const char* {result} = daisy_error_last();"), "string", false),
            "error_clear" => unit_call!("  daisy_error_clear();".to_string()),
            "panic" => unit_call!(format!("  daisy_panic({});", args[0])),
            "vec_new" => simple!(format!("  DaisyVec* {result} = daisy_vec_new();"), "vec", true),
            "vec_push" => {
                if self.rt_checks {
                    out.push(format!("  if (!{}) {{ daisy_rt_fail(\"vec.null\"); }}", args[0]));
                }
                unit_call!(format!("  daisy_vec_push({}, {});", args[0], args[1]));
            }
            "vec_get" => {
                if self.rt_checks {
                    out.push(format!(
                        "  if (!{v} || {i} < 0 || {i} >= daisy_vec_len({v})) {{ daisy_rt_fail(\"vec.bounds\"); }}",
                        v = args[0],
                        i = args[1]
                    ));
                }
                simple!(format!("  int64_t {result} = daisy_vec_get({}, {});", args[0], args[1]), "int", false);
            }
            "vec_len" => simple!(format!("  int64_t {result} = daisy_vec_len({});", args[0]), "int", false),
            "vec_release" => {
                unit_call!(format!("  daisy_vec_release({});", args[0]));
                fn_ctx.released.insert(args[0].clone());
                fn_ctx.owned.remove(args[0].as_str());
            }
            "tensor_create" => simple!(format!("  DaisyTensor {result} = daisy_tensor_create({}, {});", args[0], args[1]), "tensor", true),
            // both operands are tensors: the fused runtime kernel
            "tensor_matmul" => simple!(format!("  DaisyTensor {result} = daisy_tensor_matmul({}, {});", args[0], args[1]), "tensor", true),
            "tensor_release" => {
                unit_call!(format!("  daisy_tensor_release(&{});", args[0]));
                fn_ctx.released.insert(args[0].clone());
                fn_ctx.owned.remove(args[0].as_str());
            }
            "channel" => simple!(format!("  DaisyChannel* {result} = daisy_channel_create();"), "channel", true),
            "send" => unit_call!(format!("  daisy_channel_send({}, {});", args[0], args[1])),
            "recv" => simple!(format!("  int64_t {result} = daisy_channel_recv({});", args[0]), "int", false),
            "channel_close" => unit_call!(format!("  daisy_channel_close({});", args[0])),
            "spawn" => {
                let target = abi::mangle(&ctx.module_name, args[0]);
                match args.len() {
                    1 => unit_call!(format!("  daisy_spawn((void*){target});")),
                    _ => unit_call!(format!(
                        "  daisy_spawn_with_channel((void*){target}, {});",
                        args[1]
                    )),
                }
            }
            "log_set_level" => unit_call!(format!("  daisy_log_set_level({});", args[0])),
            "log_info" => unit_call!(format!("  daisy_log_info({});", args[0])),
            "log_warn" => unit_call!(format!("  daisy_log_warn({});", args[0])),
            "log_error" => unit_call!(format!("  daisy_log_error({});", args[0])),
            "net_connect" => simple!(format!("  int64_t {result} = daisy_net_connect({}, {});", args[0], args[1]), "int", false),
            "net_send" => simple!(format!("  int64_t {result} = daisy_net_send({}, {});", args[0], args[1]), "int", false),
            "net_recv" => simple!(format!("  const char* {result} = daisy_net_recv({}, {});", args[0], args[1]), "string", true),
            "net_close" => simple!(format!("  int64_t {result} = daisy_net_close({});", args[0]), "int", false),
            "rt_string_live" => simple!(format!("  int64_t {result} = daisy_rt_string_live();"), "int", false),
            "rt_vec_live" => simple!(format!("  int64_t {result} = daisy_rt_vec_live();"), "int", false),
            "rt_buffer_live" => simple!(format!("  int64_t {result} = daisy_rt_buffer_live();"), "int", false),
            "rt_channel_live" => simple!(format!("  int64_t {result} = daisy_rt_channel_live();"), "int", false),
            _ => {
                let call_name = if let Some((mod_name, fn_name)) = callee.split_once('.') {
                    abi::mangle(mod_name, fn_name)
                } else if ctx.externs.contains(callee) {
                    callee.to_string()
                } else {
                    abi::mangle(&ctx.module_name, callee)
                };
                let return_type = ctx
                    .function_returns
                    .get(callee)
                    .cloned()
                    .or_else(|| extern_signatures.get(callee).map(|(_, _, r)| r.clone()));
                let c_type = return_type.as_deref().map(|t| ctx.map_type(t)).unwrap_or_else(|| "int64_t".into());
                let arg_list = args.iter().map(|a| a.as_str()).collect::<Vec<_>>().join(", ");
                out.push(format!("  {c_type} {result} = {call_name}({arg_list});"));
                if !result.is_empty() {
                    match return_type {
                        Some(ty) => {
                            fn_ctx.set_type(&result, &ty);
                            if matches!(ty.as_str(), "string" | "buffer" | "tensor" | "channel" | "vec") {
                                fn_ctx.owned.insert(result.clone(), ty);
                            }
                        }
                        None => fn_ctx.set_type(&result, "int"),
                    }
                }
            }
        }
        out
    }
}

struct ModuleCtx {
    module_name: String,
    structs: HashMap<String, Vec<(String, String)>>,
    enums: HashMap<String, Vec<(String, Option<String>)>>,
    externs: HashSet<String>,
    function_returns: HashMap<String, String>,
}

impl ModuleCtx {
    fn new(module: &IrModule) -> Self {
        let mut function_returns: HashMap<String, String> = module
            .functions
            .iter()
            .map(|f| (f.name.clone(), f.return_type.clone()))
            .collect();
        for ext in &module.externs {
            function_returns.insert(ext.name.clone(), ext.return_type.clone());
        }
        Self {
            module_name: module.name.clone(),
            structs: module
                .structs
                .iter()
                .map(|s| (s.name.clone(), s.fields.clone()))
                .collect(),
            enums: module
                .enums
                .iter()
                .map(|e| (e.name.clone(), e.cases.clone()))
                .collect(),
            externs: module.externs.iter().map(|e| e.name.clone()).collect(),
            function_returns,
        }
    }

    fn map_type(&self, name: &str) -> String {
        if self.structs.contains_key(name) {
            return self.struct_type_name(name);
        }
        if self.enums.contains_key(name) {
            return self.enum_type_name(name);
        }
        match name {
            "int" | "bool" => "int64_t".into(),
            "string" => "const char*".into(),
            "buffer" => "DaisyBuffer".into(),
            "view" => "DaisyView".into(),
            "tensor" => "DaisyTensor".into(),
            "channel" => "DaisyChannel*".into(),
            "vec" => "DaisyVec*".into(),
            _ => "int64_t".into(),
        }
    }

    fn struct_type_name(&self, name: &str) -> String {
        let (module, type_name) = self.split_type_name(name);
        format!("daisy_struct_{module}__{}", Self::sanitize(type_name))
    }

    fn enum_type_name(&self, name: &str) -> String {
        let (module, type_name) = self.split_type_name(name);
        format!("daisy_enum_{module}__{}", Self::sanitize(type_name))
    }

    fn split_type_name<'a>(&'a self, name: &'a str) -> (&'a str, &'a str) {
        match name.split_once('.') {
            Some((module, type_name)) => (module, type_name),
            None => (self.module_name.as_str(), name),
        }
    }

    fn sanitize(name: &str) -> String {
        name.chars()
            .map(|ch| if ch.is_alphanumeric() || ch == '_' { ch } else { '_' })
            .collect()
    }

    fn struct_field_type(&self, struct_name: &str, field: &str) -> Option<String> {
        self.structs
            .get(struct_name)?
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, t)| t.clone())
    }

    fn enum_payload_type(&self, enum_name: &str, case: &str) -> Option<String> {
        self.enums
            .get(enum_name)?
            .iter()
            .find(|(c, _)| c == case)
            .and_then(|(_, p)| p.clone())
    }

    fn enum_case_index(&self, enum_name: &str, case: &str) -> i64 {
        self.enums
            .get(enum_name)
            .and_then(|cases| cases.iter().position(|(c, _)| c == case))
            .map(|i| i as i64)
            .unwrap_or(0)
    }
}

struct FnCtx {
    var_types: HashMap<String, String>,
    declared: HashSet<String>,
    owned: HashMap<String, String>,
    released: HashSet<String>,
    escaped: HashSet<String>,
    phi_copies: HashMap<(String, String), Vec<(String, String)>>,
}

impl FnCtx {
    fn new(func: &IrFunction, _ctx: &ModuleCtx) -> Self {
        let mut var_types = HashMap::new();
        let mut declared = HashSet::new();
        for param in &func.params {
            var_types.insert(param.name.clone(), param.ty.clone());
            declared.insert(param.name.clone());
        }
        Self {
            var_types,
            declared,
            owned: HashMap::new(),
            released: HashSet::new(),
            escaped: HashSet::new(),
            phi_copies: HashMap::new(),
        }
    }

    fn set_type(&mut self, name: &str, ty: &str) {
        self.var_types.insert(name.to_string(), ty.to_string());
        self.declared.insert(name.to_string());
    }

    fn edge_copies(&self, pred: &str, succ: &str) -> Vec<String> {
        self.phi_copies
            .get(&(pred.to_string(), succ.to_string()))
            .map(|copies| {
                copies
                    .iter()
                    .map(|(result, value)| format!("  {result} = {value};"))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Releases owners that neither escaped nor were released explicitly.
    fn cleanup(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        let mut names: Vec<String> = self.owned.keys().cloned().collect();
        names.sort();
        for name in names {
            if self.released.contains(&name) || self.escaped.contains(&name) {
                continue;
            }
            match self.owned.get(&name).map(|s| s.as_str()) {
                Some("buffer") => out.push(format!("  daisy_buffer_release(&{name});")),
                Some("tensor") => out.push(format!("  daisy_tensor_release(&{name});")),
                Some("channel") => out.push(format!("  daisy_channel_release({name});")),
                Some("string") => out.push(format!("  daisy_str_release({name});")),
                Some("vec") => out.push(format!("  daisy_vec_release({name});")),
                _ => {}
            }
            self.released.insert(name);
        }
        out
    }
}

fn label_name(label: &str) -> String {
    format!("L_{label}")
}

fn escape_c(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::lower_module;
    use crate::parser;
    use crate::source::SourceFile;
    use crate::typeck::{ExternalContext, TypeChecker};

    fn emit(src: &str) -> String {
        emit_with(src, false)
    }

    fn emit_with(src: &str, rt_checks: bool) -> String {
        let sf = SourceFile::new(0, "test.dsy".into(), src);
        let mut module = parser::parse(&sf).expect("parse failed");
        let mut checker = TypeChecker::new(ExternalContext::default());
        let info = checker.check_module(&mut module);
        assert!(checker.errors.is_empty(), "type errors: {:?}", checker.errors);
        for func in checker.impl_functions.clone() {
            module.body.push(crate::ast::Stmt::Func(func));
        }
        for func in checker.specialized_functions.clone() {
            module.body.push(crate::ast::Stmt::Func(func));
        }
        let ir = lower_module(&module, &checker.struct_defs, &checker.enum_defs, &info);
        CEmitter::new(rt_checks).emit(&ir, &HashMap::new())
    }

    #[test]
    fn hello_emits_runtime_print() {
        let c = emit("module hello\nfn main() -> int:\n  print \"hi\"\n  return 0\n");
        assert!(c.contains("#include \"rt.h\""));
        assert!(c.contains("daisy_print_str"));
        assert!(c.contains("int64_t main()"));
        assert!(c.contains("return"));
    }

    #[test]
    fn korean_surface_emits_identical_c() {
        let en = emit("module hello\nfn main() -> int:\n  print \"hi\"\n  return 0\n");
        let ko = emit("모듈 hello\n함수 main 정의:\n  \"hi\"를 출력한다\n  0을 반환한다\n");
        assert_eq!(en, ko);
    }

    #[test]
    fn buffers_release_through_the_symbol_table() {
        let c = emit("module m\nfn main() -> int:\n  let b = buffer(8)\n  release b\n  return 0\n");
        assert!(c.contains("daisy_buffer_create(") && c.contains("daisy_buffer_release(&b);"));
    }

    #[test]
    fn unreleased_owner_is_released_before_return() {
        let c = emit("module m\nfn main() -> int:\n  let s = int_to_str(7)\n  return 0\n");
        assert!(c.contains("daisy_int_to_str"));
        assert!(c.contains("daisy_str_release(s);"));
    }

    #[test]
    fn escaping_owner_is_not_released() {
        let c = emit("module m\nfn f() -> string:\n  let s = int_to_str(7)\n  return s\n");
        assert!(!c.contains("daisy_str_release(s);"));
    }

    #[test]
    fn public_functions_get_mangled_symbols() {
        let c = emit("module util\nexport fn helper(x: int) -> int:\n  return x + 1\nfn main() -> int:\n  return helper(1)\n");
        assert!(c.contains("daisy_util__helper"));
    }

    #[test]
    fn enums_are_tagged_unions() {
        let c = emit(
            "module m\nenum Shape:\n  case Dot\n  case Line: int\nfn f(s: Shape) -> int:\n  match s:\n    case Shape.Dot:\n      return 0\n    case Shape.Line(n):\n      return n\n  return 9\nfn main() -> int:\n  return 0\n",
        );
        assert!(c.contains("int64_t tag;"));
        assert!(c.contains("union {"));
        assert!(c.contains(".tag;"));
        assert!(c.contains(".data.Line;"));
    }

    #[test]
    fn rt_checks_guard_borrows() {
        let with = emit_with(
            "module m\nfn main() -> int:\n  let b = buffer(8)\n  let v = borrow b[0..4]\n  release b\n  return 0\n",
            true,
        );
        let without = emit_with(
            "module m\nfn main() -> int:\n  let b = buffer(8)\n  let v = borrow b[0..4]\n  release b\n  return 0\n",
            false,
        );
        assert!(with.contains("daisy_rt_fail(\"view.bounds\")"));
        assert!(!without.contains("daisy_rt_fail"));
    }

    #[test]
    fn tensor_matmul_emits_fused_call() {
        let c = emit(
            "module m\nfn main() -> int:\n  let a = tensor_create(2, 2)\n  let b = tensor_create(2, 2)\n  let p = tensor_matmul(a, b)\n  return 0\n",
        );
        assert!(c.contains("daisy_tensor_matmul(a, b)"));
    }

    #[test]
    fn try_emits_goto_branches() {
        let c = emit(
            "module m\nfn inner() -> Result<int, int>:\n  return Result.Ok(41)\nfn outer() -> Result<int, int>:\n  let x = try inner()\n  return Result.Ok(x + 1)\nfn main() -> int:\n  return 0\n",
        );
        assert!(c.contains("goto L_"));
        assert!(c.contains(".tag"));
    }

    #[test]
    fn emission_is_deterministic() {
        let src = "module m\nstruct A:\n  x: int\nstruct B:\n  y: int\nfn main() -> int:\n  let a = A(1)\n  let b = B(2)\n  return a.x + b.y\n";
        assert_eq!(emit(src), emit(src));
    }
}
