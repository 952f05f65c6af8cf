//! # DAISY compiler
//!
//! A small systems language with two equally authoritative prose surfaces
//! (English keywords and Korean prose) parsing into one AST, Rust-grade
//! move/borrow/region ownership, a typed SSA-like IR, and a portable C11
//! backend over a fixed runtime symbol table.
//!
//! Pipeline: source loader -> lexer -> dual-surface parser -> module
//! resolver -> type & generic checker -> borrow checker -> IR lowering ->
//! C emitter, with a per-module build cache keyed on source hash, compiler
//! version, ABI major and feature flags.
//!
//! ## Example
//! ```daisy
//! module hello
//! fn main() -> int:
//!   print "hi"
//!   return 0
//! ```
//! and its Korean translation parse to the same tree:
//! ```daisy
//! 모듈 hello
//! 함수 main 정의:
//!   "hi"를 출력한다
//!   0을 반환한다
//! ```

pub mod abi;
pub mod ast;
pub mod borrowck;
pub mod cache;
pub mod codegen;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod ir;
pub mod lexer;
pub mod lower;
pub mod manifest;
pub mod modules;
pub mod parser;
pub mod pretty;
pub mod source;
pub mod span;
pub mod typeck;
pub mod types;

pub use error::{DaisyError, DaisyResult};
pub use source::SourceFile;
pub use span::Span;

/// Compiler version; participates in build-cache keys so behavioral changes
/// invalidate stale artifacts.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const LANGUAGE_NAME: &str = "DAISY";

/// Compiles a single in-memory module to C11, without the project layer.
/// The driver is the real entry point; this is the library convenience used
/// by tests and tools.
pub fn compile_source(name: &str, source: &str) -> DaisyResult<String> {
    let sf = SourceFile::new(0, format!("{name}.dsy"), source);
    let mut module = parser::parse(&sf)?;
    let mut checker = typeck::TypeChecker::new(typeck::ExternalContext::default());
    let type_info = checker.check_module(&mut module);
    if !checker.errors.is_empty() {
        return Err(DaisyError::Diagnostics(checker.errors));
    }
    for func in checker.impl_functions.clone() {
        module.body.push(ast::Stmt::Func(func));
    }
    for func in checker.specialized_functions.clone() {
        module.body.push(ast::Stmt::Func(func));
    }
    let mut borrow = borrowck::BorrowChecker::new(&type_info);
    borrow.check_module(&module);
    if !borrow.errors.is_empty() {
        return Err(DaisyError::Diagnostics(borrow.errors));
    }
    let ir = lower::lower_module(&module, &checker.struct_defs, &checker.enum_defs, &type_info);
    if let Err(errors) = ir::validate_module(&ir) {
        return Err(DaisyError::internal(errors.join("\n")));
    }
    Ok(codegen::c::CEmitter::new(false).emit(&ir, &std::collections::HashMap::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticKind;

    fn canon(src: &str) -> String {
        let sf = SourceFile::new(0, "test.dsy".into(), src);
        pretty::print_module(&parser::parse(&sf).expect("parse failed"))
    }

    #[test]
    fn surface_equivalence_ast_and_c() {
        let en = "module demo\nfn main() -> int:\n  let b = buffer(8)\n  let v = borrow b[0..4]\n  release b\n  return 0\n";
        let ko = "모듈 demo\n함수 main 정의:\n  b를 8바이트로 생성한다\n  v를 b의 0부터 4까지로 빌려온다(불변)\n  b을 해제한다\n  0을 반환한다\n";
        assert_eq!(canon(en), canon(ko));
        // release with an expired borrow: the borrow above lives to the end
        // of the function block, so release must use a fresh program
        let en_ok = "module demo\nfn main() -> int:\n  let b = buffer(8)\n  release b\n  return 0\n";
        let ko_ok = "모듈 demo\n함수 main 정의:\n  b를 8바이트로 생성한다\n  b을 해제한다\n  0을 반환한다\n";
        assert_eq!(
            compile_source("demo", en_ok).unwrap(),
            compile_source("demo", ko_ok).unwrap()
        );
    }

    #[test]
    fn pretty_round_trip_fixed_point() {
        let sources = [
            "module m\nfn main() -> int:\n  let x = (1 + 2) * 3\n  if x > 3 and x < 100:\n    print x\n  elif x == 3:\n    print 0\n  else:\n    print 1\n  return x\n",
            "module m\nenum Shape:\n  case Dot\n  case Line: int\nfn f(s: Shape) -> int:\n  match s:\n    case Shape.Line(n) if n > 2:\n      return n\n    case Shape.Line(n):\n      return 0 - n\n    case Shape.Dot:\n      return 0\n  return 9\n",
            "module m\ntrait Printable:\n  fn describe(self: Self) -> string\nstruct Point:\n  x: int\n  y: int\nimpl Printable for Point:\n  fn describe(self: Point) -> string:\n    return \"point\"\nfn main() -> int:\n  return 0\n",
        ];
        for src in sources {
            let once = canon(src);
            assert_eq!(once, canon(&once), "round trip diverged for {src}");
        }
    }

    #[test]
    fn use_after_move_scenario() {
        let src = "module m\nfn main() -> int:\n  let a = buffer(8)\n  let b = move a\n  let n = str_len(int_to_str(1))\n  release a\n  return n\n";
        match compile_source("m", src) {
            Err(DaisyError::Diagnostics(diags)) => {
                let diag = diags.iter().find(|d| d.kind == DiagnosticKind::UseAfterMove).unwrap();
                assert!(diag.span.is_some(), "conflict span required");
                assert!(!diag.labels.is_empty(), "origin span required");
            }
            other => panic!("expected UseAfterMove, got {other:?}"),
        }
    }

    #[test]
    fn alias_conflict_scenario_names_both_views() {
        let src = "module m\nfn main() -> int:\n  let r = buffer(8)\n  let v1 = borrow mut r[0..8]\n  let v2 = borrow r[0..4]\n  return 0\n";
        match compile_source("m", src) {
            Err(DaisyError::Diagnostics(diags)) => {
                let diag = diags
                    .iter()
                    .find(|d| d.kind == DiagnosticKind::BorrowAliasConflict)
                    .unwrap();
                assert!(diag.message.contains("v1"));
                assert!(diag.message.contains("v2"));
            }
            other => panic!("expected BorrowAliasConflict, got {other:?}"),
        }
    }

    #[test]
    fn monomorphized_ir_shares_instantiations() {
        let src = "module m\nfn id<T>(x: T) -> T:\n  return x\nfn main() -> int:\n  let a = id<int>(1)\n  let b = id<int>(2)\n  return a + b\n";
        let c = compile_source("m", src).unwrap();
        let definitions = c.matches("int64_t daisy_m__id__int(int64_t x) {").count();
        assert_eq!(definitions, 1, "one definition per substitution:\n{c}");
    }
}
