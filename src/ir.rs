//! Typed SSA-like IR.
//!
//! Functions are lists of labelled blocks, each terminated by `br`,
//! `cond_br` or `ret`. Temporaries are single-assignment; named locals are
//! re-bound through `assign` at join points, and `phi` joins the
//! short-circuit forms. Tensor ops ride the generic `call` op and are fused
//! by the emitter.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Const,
    ConstStr,
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Neg,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Print,
    Call,
    BufCreate,
    BufBorrow,
    ViewBorrow,
    /// `waived` marks a release authorized by an `unsafe` block.
    Release { waived: bool },
    StructNew,
    StructGet,
    StructSet,
    EnumMake,
    EnumTag,
    EnumPayload,
    Phi,
    Br,
    CondBr,
    Ret,
}

impl Op {
    pub fn is_terminator(&self) -> bool {
        matches!(self, Op::Br | Op::CondBr | Op::Ret)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Op::Const => "const",
            Op::ConstStr => "const_str",
            Op::Assign => "assign",
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "mul",
            Op::Div => "div",
            Op::Neg => "neg",
            Op::Eq => "eq",
            Op::Ne => "ne",
            Op::Lt => "lt",
            Op::Gt => "gt",
            Op::Le => "le",
            Op::Ge => "ge",
            Op::Print => "print",
            Op::Call => "call",
            Op::BufCreate => "buf.create",
            Op::BufBorrow => "buf.borrow",
            Op::ViewBorrow => "view.borrow",
            Op::Release { waived: false } => "release",
            Op::Release { waived: true } => "release.waived",
            Op::StructNew => "struct.new",
            Op::StructGet => "struct.get",
            Op::StructSet => "struct.set",
            Op::EnumMake => "enum.make",
            Op::EnumTag => "enum.tag",
            Op::EnumPayload => "enum.payload",
            Op::Phi => "phi",
            Op::Br => "br",
            Op::CondBr => "cond_br",
            Op::Ret => "ret",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Instr {
    pub op: Op,
    pub args: Vec<String>,
    pub result: Option<String>,
    pub ty: Option<String>,
}

impl Instr {
    pub fn new(op: Op, args: Vec<String>) -> Self {
        Self { op, args, result: None, ty: None }
    }

    pub fn with_result(op: Op, args: Vec<String>, result: impl Into<String>) -> Self {
        Self { op, args, result: Some(result.into()), ty: None }
    }

    pub fn typed(
        op: Op,
        args: Vec<String>,
        result: impl Into<String>,
        ty: impl Into<String>,
    ) -> Self {
        Self { op, args, result: Some(result.into()), ty: Some(ty.into()) }
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub label: String,
    pub instrs: Vec<Instr>,
}

impl Block {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into(), instrs: Vec::new() }
    }

    pub fn is_terminated(&self) -> bool {
        self.instrs.last().map(|i| i.op.is_terminator()).unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct IrParam {
    pub name: String,
    pub ty: String,
}

#[derive(Debug, Clone)]
pub struct IrFunction {
    pub name: String,
    pub params: Vec<IrParam>,
    pub return_type: String,
    pub blocks: Vec<Block>,
    /// One entry per source `unsafe` block: "L<line>:<col> <reason>".
    pub unsafe_blocks: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct IrExtern {
    pub name: String,
    pub params: Vec<IrParam>,
    pub return_type: String,
}

#[derive(Debug, Clone)]
pub struct IrStruct {
    pub name: String,
    pub fields: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct IrEnum {
    pub name: String,
    pub cases: Vec<(String, Option<String>)>,
}

#[derive(Debug, Clone)]
pub struct IrModule {
    pub name: String,
    pub functions: Vec<IrFunction>,
    pub externs: Vec<IrExtern>,
    pub structs: Vec<IrStruct>,
    pub enums: Vec<IrEnum>,
}

impl IrModule {
    pub fn enum_case_index(&self, enum_name: &str, case_name: &str) -> i64 {
        self.enums
            .iter()
            .find(|e| e.name == enum_name)
            .and_then(|e| e.cases.iter().position(|(n, _)| n == case_name))
            .map(|i| i as i64)
            .unwrap_or(0)
    }
}

impl fmt::Display for IrModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {}", self.name)?;
        for ext in &self.externs {
            let params = ext
                .params
                .iter()
                .map(|p| format!("{}:{}", p.name, p.ty))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "extern {}({}) -> {}", ext.name, params, ext.return_type)?;
        }
        for func in &self.functions {
            let params = func
                .params
                .iter()
                .map(|p| format!("{}:{}", p.name, p.ty))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "fn {}({}) -> {}:", func.name, params, func.return_type)?;
            for line in &func.unsafe_blocks {
                writeln!(f, "  unsafe {line}")?;
            }
            for block in &func.blocks {
                writeln!(f, "  {}:", block.label)?;
                for instr in &block.instrs {
                    let args = instr.args.join(", ");
                    match (&instr.result, &instr.ty) {
                        (Some(result), Some(ty)) => {
                            writeln!(f, "    {result}:{ty} = {} {args}", instr.op.name())?
                        }
                        (Some(result), None) => {
                            writeln!(f, "    {result} = {} {args}", instr.op.name())?
                        }
                        _ => writeln!(f, "    {} {args}", instr.op.name())?,
                    }
                }
            }
        }
        Ok(())
    }
}

/// Flags uses of values that no instruction (or parameter) defines. Block
/// labels and literals are exempt. Runs before emission; failures are
/// internal errors, not user diagnostics.
pub fn validate_module(module: &IrModule) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();
    for func in &module.functions {
        errors.extend(validate_function(func));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_function(func: &IrFunction) -> Vec<String> {
    let mut defined: std::collections::HashSet<String> =
        func.params.iter().map(|p| p.name.clone()).collect();
    let mut errors = Vec::new();
    for block in &func.blocks {
        for instr in &block.instrs {
            for arg in value_uses(instr) {
                if is_literal(arg) || defined.contains(arg) {
                    continue;
                }
                errors.push(format!(
                    "{}: use before def `{}` in {}",
                    func.name,
                    arg,
                    instr.op.name()
                ));
            }
            if let Some(result) = &instr.result {
                defined.insert(result.clone());
            }
        }
    }
    errors
}

/// Which arguments are SSA values (as opposed to labels, symbol names or
/// immediate fields).
fn value_uses(instr: &Instr) -> Vec<&String> {
    let args = &instr.args;
    match &instr.op {
        Op::Const | Op::ConstStr => vec![],
        Op::Br => vec![],
        Op::CondBr => args.iter().take(1).collect(),
        Op::Call => args.iter().skip(1).collect(),
        Op::StructNew => args.iter().skip(1).collect(),
        Op::StructGet => args.iter().take(1).collect(),
        Op::StructSet => vec![&args[0], &args[2]],
        Op::EnumMake => args.iter().skip(2).collect(),
        Op::EnumTag | Op::EnumPayload => args.iter().take(1).collect(),
        Op::BufCreate => args.iter().take(1).collect(),
        Op::BufBorrow => args.iter().take(3).collect(),
        Op::ViewBorrow => args.iter().take(1).collect(),
        // phi args alternate value, predecessor label
        Op::Phi => args.iter().step_by(2).collect(),
        _ => args.iter().collect(),
    }
}

fn is_literal(value: &str) -> bool {
    value.parse::<i64>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validator_accepts_well_formed() {
        let mut block = Block::new("entry");
        block.instrs.push(Instr::typed(Op::Const, vec!["1".into()], "t1", "int"));
        block.instrs.push(Instr::with_result(Op::Add, vec!["t1".into(), "1".into()], "t2"));
        block.instrs.push(Instr::new(Op::Ret, vec!["t2".into()]));
        let module = IrModule {
            name: "m".into(),
            functions: vec![IrFunction {
                name: "f".into(),
                params: vec![],
                return_type: "int".into(),
                blocks: vec![block],
                unsafe_blocks: vec![],
            }],
            externs: vec![],
            structs: vec![],
            enums: vec![],
        };
        assert!(validate_module(&module).is_ok());
    }

    #[test]
    fn validator_flags_undefined_use() {
        let mut block = Block::new("entry");
        block.instrs.push(Instr::new(Op::Ret, vec!["ghost".into()]));
        let module = IrModule {
            name: "m".into(),
            functions: vec![IrFunction {
                name: "f".into(),
                params: vec![],
                return_type: "int".into(),
                blocks: vec![block],
                unsafe_blocks: vec![],
            }],
            externs: vec![],
            structs: vec![],
            enums: vec![],
        };
        let errors = validate_module(&module).unwrap_err();
        assert!(errors[0].contains("ghost"));
    }

    #[test]
    fn dump_is_line_oriented() {
        let mut block = Block::new("entry");
        block.instrs.push(Instr::typed(Op::Const, vec!["0".into()], "t1", "int"));
        block.instrs.push(Instr::new(Op::Ret, vec!["t1".into()]));
        let module = IrModule {
            name: "demo".into(),
            functions: vec![IrFunction {
                name: "main".into(),
                params: vec![],
                return_type: "int".into(),
                blocks: vec![block],
                unsafe_blocks: vec![],
            }],
            externs: vec![],
            structs: vec![],
            enums: vec![],
        };
        let dump = module.to_string();
        assert!(dump.contains("module demo"));
        assert!(dump.contains("t1:int = const 0"));
        assert!(dump.contains("ret t1"));
    }
}
