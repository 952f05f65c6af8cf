//! Project compilation: manifest checks, module loading, per-module phase
//! pipeline (typecheck, borrowcheck, lower, validate, emit) and the
//! artifact set under `build/`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde_json::json;
use tracing::{debug, info};

use crate::abi;
use crate::ast::{FunctionDef, Module, Stmt};
use crate::cache::{combined_keys, module_key, BuildCache, CacheRecord, FeatureFlags};
use crate::codegen::c::{CEmitter, ExternSignature};
use crate::diagnostics::{Diagnostic, Renderer};
use crate::error::{DaisyError, DaisyResult};
use crate::ir::validate_module;
use crate::lower::lower_module;
use crate::manifest;
use crate::modules::{load_project, Project};
use crate::typeck::{ExternalContext, FuncSig, TypeChecker};
use crate::types::Type;

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub build_dir: PathBuf,
    pub emit_ir: bool,
    pub profile: bool,
    pub rt_checks: bool,
    pub lto: bool,
    /// Recorded for the link step the outer harness runs.
    pub sanitize: Option<String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            build_dir: PathBuf::from("build"),
            emit_ir: false,
            profile: false,
            rt_checks: false,
            lto: false,
            sanitize: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct BuildOutcome {
    pub c_paths: Vec<PathBuf>,
    /// Modules whose artifacts were served from the build cache.
    pub cached_modules: Vec<String>,
}

pub fn compile_project(entry: &Path, options: &BuildOptions) -> DaisyResult<BuildOutcome> {
    let overall_start = Instant::now();
    let flags = FeatureFlags { rt_checks: options.rt_checks, lto: options.lto };

    let mut search_paths = Vec::new();
    if let Some(manifest_path) = manifest::find_manifest(entry) {
        let project_manifest = manifest::load_manifest(&manifest_path)?;
        manifest::check_dependency_versions(&manifest_path, &project_manifest)?;
        // the ABI gate blocks the build before any artifact is written
        manifest::check_dependency_abi(&manifest_path, &project_manifest)?;
        search_paths = manifest::search_paths(&manifest_path, &project_manifest);
    }

    let mut project = load_project(entry, &search_paths)?;
    info!(modules = project.modules.len(), "loaded project");

    let (sigs, types, structs, enums, generic_funcs) = collect_context(&mut project);
    let extern_map: HashMap<String, ExternSignature> = sigs
        .iter()
        .map(|(name, sig)| {
            let module = name.split_once('.').map(|(m, _)| m.to_string()).unwrap_or_default();
            let params = sig.params.iter().map(|t| t.name.clone()).collect();
            (name.clone(), (module, params, sig.returns.name.clone()))
        })
        .collect();

    let base_keys: HashMap<String, String> = project
        .modules
        .iter()
        .map(|m| (m.ast.name.clone(), module_key(&m.source.text, flags)))
        .collect();
    let dep_graph: HashMap<String, Vec<String>> = project
        .modules
        .iter()
        .map(|m| (m.ast.name.clone(), project.imports_of(&m.ast)))
        .collect();
    let keys = combined_keys(&base_keys, &dep_graph);

    let cache = BuildCache::new(&options.build_dir);
    let emitter = CEmitter::new(options.rt_checks);
    let mut outcome = BuildOutcome::default();
    let mut collected_errors: Vec<Diagnostic> = Vec::new();
    let mut profile_data: HashMap<String, HashMap<String, f64>> = HashMap::new();

    for loaded in project.modules.iter_mut() {
        let module_name = loaded.ast.name.clone();
        let mut timings: HashMap<String, f64> = HashMap::new();
        let renderer = Renderer::new(&loaded.source);

        let external = ExternalContext {
            sigs: filtered(&sigs, &module_name),
            types: filtered(&types, &module_name),
            structs: filtered(&structs, &module_name),
            enums: filtered(&enums, &module_name),
            generic_funcs: filtered(&generic_funcs, &module_name),
        };
        let t0 = Instant::now();
        let mut checker = TypeChecker::new(external);
        let type_info = checker.check_module(&mut loaded.ast);
        timings.insert("typecheck".into(), t0.elapsed().as_secs_f64());
        if !checker.errors.is_empty() {
            for diag in &checker.errors {
                eprintln!("{}", renderer.render(diag));
            }
            collected_errors.extend(checker.errors);
            continue;
        }
        for func in checker.impl_functions.clone() {
            loaded.ast.body.push(Stmt::Func(func));
        }
        for func in checker.specialized_functions.clone() {
            loaded.ast.body.push(Stmt::Func(func));
        }

        let t0 = Instant::now();
        let mut borrow = crate::borrowck::BorrowChecker::new(&type_info);
        borrow.check_module(&loaded.ast);
        timings.insert("borrowcheck".into(), t0.elapsed().as_secs_f64());
        if !borrow.errors.is_empty() {
            for diag in &borrow.errors {
                eprintln!("{}", renderer.render(diag));
            }
            collected_errors.extend(borrow.errors);
            continue;
        }

        emit_unsafe_log(&loaded.ast, &options.build_dir)?;

        let key = keys.get(&module_name).cloned().unwrap_or_default();
        if let Some(record) = cache.probe(&module_name, &key) {
            debug!(module = %module_name, "build cache hit");
            outcome.c_paths.push(record.c_path.clone());
            outcome.cached_modules.push(module_name.clone());
            profile_data.insert(module_name, timings);
            continue;
        }

        let t0 = Instant::now();
        let ir = lower_module(&loaded.ast, &checker.struct_defs, &checker.enum_defs, &type_info);
        timings.insert("lower".into(), t0.elapsed().as_secs_f64());
        if let Err(errors) = validate_module(&ir) {
            return Err(DaisyError::internal(format!(
                "IR validation failed for {module_name}:\n{}",
                errors.join("\n")
            )));
        }

        let t0 = Instant::now();
        let c_code = emitter.emit(&ir, &extern_map);
        timings.insert("emit".into(), t0.elapsed().as_secs_f64());

        fs::create_dir_all(&options.build_dir).map_err(DaisyError::Io)?;
        let c_path = options.build_dir.join(format!("{module_name}.c"));
        fs::write(&c_path, &c_code).map_err(DaisyError::Io)?;
        let ir_path = if options.emit_ir {
            let path = options.build_dir.join(format!("{module_name}.ir.txt"));
            fs::write(&path, ir.to_string()).map_err(DaisyError::Io)?;
            Some(path)
        } else {
            None
        };
        let abi_path = options.build_dir.join(format!("{module_name}.abi.json"));
        fs::write(&abi_path, abi_manifest_json(&ir)).map_err(DaisyError::Io)?;
        cache
            .store(&module_name, &CacheRecord { key, c_path: c_path.clone(), ir_path, abi_path })
            .map_err(DaisyError::Io)?;
        outcome.c_paths.push(c_path);
        profile_data.insert(module_name, timings);
    }

    if !collected_errors.is_empty() {
        return Err(DaisyError::Diagnostics(collected_errors));
    }

    if options.profile {
        fs::create_dir_all(&options.build_dir).map_err(DaisyError::Io)?;
        let payload = json!({
            "total": overall_start.elapsed().as_secs_f64(),
            "modules": profile_data,
        });
        fs::write(
            options.build_dir.join("profile.json"),
            serde_json::to_string_pretty(&payload).map_err(|e| DaisyError::internal(e.to_string()))?,
        )
        .map_err(DaisyError::Io)?;
    }
    info!(
        emitted = outcome.c_paths.len(),
        cached = outcome.cached_modules.len(),
        "build finished"
    );
    Ok(outcome)
}

/// Public signatures, public type definitions and generic templates across
/// the whole project, keyed `module.name`.
#[allow(clippy::type_complexity)]
fn collect_context(
    project: &mut Project,
) -> (
    HashMap<String, FuncSig>,
    HashMap<String, Type>,
    HashMap<String, Vec<(String, Type)>>,
    HashMap<String, Vec<(String, Option<Type>)>>,
    HashMap<String, FunctionDef>,
) {
    let mut sigs = HashMap::new();
    let mut types = HashMap::new();
    let mut structs = HashMap::new();
    let mut enums = HashMap::new();
    let mut generic_funcs = HashMap::new();
    let mut resolver = TypeChecker::resolver();
    for loaded in project.modules.iter_mut() {
        let module_name = loaded.ast.name.clone();
        for stmt in loaded.ast.body.iter_mut() {
            match stmt {
                Stmt::Func(func) => {
                    if !func.type_params.is_empty() {
                        generic_funcs.insert(format!("{module_name}.{}", func.name), func.clone());
                        continue;
                    }
                    if !func.is_public {
                        continue;
                    }
                    let params = func
                        .params
                        .iter_mut()
                        .map(|p| resolver.resolve_type_mut(&mut p.type_ref))
                        .collect();
                    let returns = resolver.resolve_type_mut(&mut func.return_type);
                    sigs.insert(
                        format!("{module_name}.{}", func.name),
                        FuncSig::new(params, returns),
                    );
                }
                Stmt::Extern(ext) => {
                    if !ext.is_public {
                        continue;
                    }
                    let params = ext
                        .params
                        .iter_mut()
                        .map(|p| resolver.resolve_type_mut(&mut p.type_ref))
                        .collect();
                    let returns = resolver.resolve_type_mut(&mut ext.return_type);
                    sigs.insert(
                        format!("{module_name}.{}", ext.name),
                        FuncSig::new(params, returns),
                    );
                }
                Stmt::Struct(def) => {
                    if !def.is_public || !def.type_params.is_empty() {
                        continue;
                    }
                    let mut fields = Vec::new();
                    let mut is_copy = true;
                    for field in def.fields.iter_mut() {
                        let t = resolver.resolve_type_mut(&mut field.type_ref);
                        if !t.is_copy {
                            is_copy = false;
                        }
                        fields.push((field.name.clone(), t));
                    }
                    let full = format!("{module_name}.{}", def.name);
                    types.insert(full.clone(), Type::named(def.name.clone(), is_copy));
                    structs.insert(full, fields);
                }
                Stmt::Enum(def) => {
                    if !def.is_public || !def.type_params.is_empty() {
                        continue;
                    }
                    let mut cases = Vec::new();
                    for case in def.cases.iter_mut() {
                        let payload =
                            case.payload.as_mut().map(|p| resolver.resolve_type_mut(p));
                        cases.push((case.name.clone(), payload));
                    }
                    let full = format!("{module_name}.{}", def.name);
                    types.insert(full.clone(), Type::named(def.name.clone(), false));
                    enums.insert(full, cases);
                }
                _ => {}
            }
        }
    }
    (sigs, types, structs, enums, generic_funcs)
}

fn filtered<T: Clone>(map: &HashMap<String, T>, module_name: &str) -> HashMap<String, T> {
    let prefix = format!("{module_name}.");
    map.iter()
        .filter(|(name, _)| !name.starts_with(&prefix))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// One line per `unsafe` block: span plus justification.
fn emit_unsafe_log(module: &Module, build_dir: &Path) -> DaisyResult<()> {
    let mut entries: Vec<String> = Vec::new();
    collect_unsafe(&module.body, &mut entries);
    if entries.is_empty() {
        return Ok(());
    }
    fs::create_dir_all(build_dir).map_err(DaisyError::Io)?;
    let mut lines = vec![format!("module: {}", module.name)];
    lines.extend(entries);
    lines.push(String::new());
    fs::write(
        build_dir.join(format!("{}.unsafe.log", module.name)),
        lines.join("\n"),
    )
    .map_err(DaisyError::Io)
}

fn collect_unsafe(stmts: &[Stmt], entries: &mut Vec<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Unsafe { reason, body, span } => {
                entries.push(format!(
                    "L{}:{} {}",
                    span.line,
                    span.column,
                    reason.as_deref().unwrap_or("missing")
                ));
                collect_unsafe(body, entries);
            }
            Stmt::Func(f) => collect_unsafe(&f.body, entries),
            Stmt::If { then_body, else_body, .. } => {
                collect_unsafe(then_body, entries);
                if let Some(body) = else_body {
                    collect_unsafe(body, entries);
                }
            }
            Stmt::While { body, .. } | Stmt::Repeat { body, .. } => collect_unsafe(body, entries),
            Stmt::Match { arms, else_body, .. } => {
                for arm in arms {
                    collect_unsafe(&arm.body, entries);
                }
                if let Some(body) = else_body {
                    collect_unsafe(body, entries);
                }
            }
            _ => {}
        }
    }
}

fn abi_manifest_json(ir: &crate::ir::IrModule) -> String {
    let mut functions = Vec::new();
    for func in &ir.functions {
        if func.name == "main" {
            continue;
        }
        let params: Vec<String> = func.params.iter().map(|p| p.ty.clone()).collect();
        functions.push(json!({
            "name": func.name,
            "symbol": abi::mangle(&ir.name, &func.name),
            "params": params,
            "return": func.return_type,
            "sig": abi::signature_hash(&params, &func.return_type),
        }));
    }
    for ext in &ir.externs {
        let params: Vec<String> = ext.params.iter().map(|p| p.ty.clone()).collect();
        functions.push(json!({
            "name": ext.name,
            "symbol": ext.name,
            "params": params,
            "return": ext.return_type,
            "sig": abi::signature_hash(&params, &ext.return_type),
            "extern": true,
        }));
    }
    let manifest = json!({
        "module": ir.name,
        "abi_version": { "major": abi::ABI_VERSION_MAJOR, "minor": abi::ABI_VERSION_MINOR },
        "functions": functions,
    });
    serde_json::to_string_pretty(&manifest).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticKind;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn build(entry: &Path, build_dir: &Path) -> DaisyResult<BuildOutcome> {
        compile_project(entry, &BuildOptions { build_dir: build_dir.to_path_buf(), ..Default::default() })
    }

    fn error_kinds(err: DaisyError) -> Vec<DiagnosticKind> {
        match err {
            DaisyError::Diagnostics(diags) => diags.iter().map(|d| d.kind).collect(),
            other => panic!("expected diagnostics, got {other:?}"),
        }
    }

    #[test]
    fn hello_english_builds() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(
            dir.path(),
            "hello.dsy",
            "module hello\nfn main() -> int:\n  print \"hi\"\n  return 0\n",
        );
        let outcome = build(&entry, &dir.path().join("build")).unwrap();
        assert_eq!(outcome.c_paths.len(), 1);
        let c = fs::read_to_string(&outcome.c_paths[0]).unwrap();
        assert!(c.contains("daisy_print_str"));
        assert!(dir.path().join("build/hello.abi.json").exists());
    }

    #[test]
    fn hello_korean_emits_identical_c() {
        let dir = tempfile::tempdir().unwrap();
        let en = write(
            dir.path(),
            "hello.dsy",
            "module hello\nfn main() -> int:\n  print \"hi\"\n  return 0\n",
        );
        let out_en = build(&en, &dir.path().join("build_en")).unwrap();
        let c_en = fs::read_to_string(&out_en.c_paths[0]).unwrap();

        let ko = write(
            dir.path(),
            "hello_ko.dsy",
            "모듈 hello\n함수 main 정의:\n  \"hi\"를 출력한다\n  0을 반환한다\n",
        );
        let out_ko = build(&ko, &dir.path().join("build_ko")).unwrap();
        let c_ko = fs::read_to_string(&out_ko.c_paths[0]).unwrap();
        assert_eq!(c_en, c_ko);
    }

    #[test]
    fn use_after_move_blocks_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(
            dir.path(),
            "m.dsy",
            "module m\nfn main() -> int:\n  let a = buffer(8)\n  let b = move a\n  release a\n  return 0\n",
        );
        let err = build(&entry, &dir.path().join("build")).unwrap_err();
        assert!(error_kinds(err).contains(&DiagnosticKind::UseAfterMove));
        assert!(!dir.path().join("build/m.c").exists());
    }

    #[test]
    fn alias_conflict_blocks_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(
            dir.path(),
            "m.dsy",
            "module m\nfn main() -> int:\n  let r = buffer(8)\n  let v1 = borrow mut r[0..8]\n  let v2 = borrow r[0..4]\n  return 0\n",
        );
        let err = build(&entry, &dir.path().join("build")).unwrap_err();
        assert!(error_kinds(err).contains(&DiagnosticKind::BorrowAliasConflict));
    }

    #[test]
    fn unsafe_release_is_accepted_and_logged() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(
            dir.path(),
            "m.dsy",
            "module m\nfn main() -> int:\n  let r = buffer(8)\n  let v = borrow r[0..8]\n  unsafe \"audited\":\n    release r\n  return 0\n",
        );
        let build_dir = dir.path().join("build");
        build(&entry, &build_dir).unwrap();
        let log = fs::read_to_string(build_dir.join("m.unsafe.log")).unwrap();
        assert!(log.contains("module: m"));
        assert!(log.contains("audited"));
    }

    #[test]
    fn release_with_live_borrow_outside_unsafe_fails() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(
            dir.path(),
            "m.dsy",
            "module m\nfn main() -> int:\n  let r = buffer(8)\n  let v = borrow r[0..8]\n  release r\n  return 0\n",
        );
        let err = build(&entry, &dir.path().join("build")).unwrap_err();
        assert!(error_kinds(err).contains(&DiagnosticKind::ReleaseWithLiveBorrow));
    }

    #[test]
    fn second_build_hits_the_cache_with_identical_c() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(
            dir.path(),
            "m.dsy",
            "module m\nfn main() -> int:\n  return 41\n",
        );
        let build_dir = dir.path().join("build");
        let first = build(&entry, &build_dir).unwrap();
        assert!(first.cached_modules.is_empty());
        let c_first = fs::read_to_string(&first.c_paths[0]).unwrap();
        let second = build(&entry, &build_dir).unwrap();
        assert_eq!(second.cached_modules, vec!["m".to_string()]);
        let c_second = fs::read_to_string(&second.c_paths[0]).unwrap();
        assert_eq!(c_first, c_second);
    }

    #[test]
    fn flag_changes_invalidate_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(
            dir.path(),
            "m.dsy",
            "module m\nfn main() -> int:\n  let b = buffer(8)\n  let v = borrow b[0..4]\n  return 0\n",
        );
        let build_dir = dir.path().join("build");
        build(&entry, &build_dir).unwrap();
        let with_checks = compile_project(
            &entry,
            &BuildOptions {
                build_dir: build_dir.clone(),
                rt_checks: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(with_checks.cached_modules.is_empty(), "flags must invalidate the key");
        let c = fs::read_to_string(&with_checks.c_paths[0]).unwrap();
        assert!(c.contains("daisy_rt_fail"));
    }

    #[test]
    fn imports_compile_and_link_by_symbol() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "util.dsy",
            "module util\nexport fn helper(x: int) -> int:\n  return x + 1\n",
        );
        let entry = write(
            dir.path(),
            "app.dsy",
            "module app\nimport util\nfn main() -> int:\n  return util.helper(41)\n",
        );
        let build_dir = dir.path().join("build");
        let outcome = build(&entry, &build_dir).unwrap();
        assert_eq!(outcome.c_paths.len(), 2);
        let app_c = fs::read_to_string(build_dir.join("app.c")).unwrap();
        assert!(app_c.contains("extern int64_t daisy_util__helper(int64_t arg_0);"));
        assert!(app_c.contains("daisy_util__helper("));
    }

    #[test]
    fn abi_gate_blocks_incompatible_dependency() {
        let dir = tempfile::tempdir().unwrap();
        let dep_dir = dir.path().join("dep");
        fs::create_dir_all(dep_dir.join("src")).unwrap();
        fs::write(
            dep_dir.join("daisy.toml"),
            "[package]\nname = \"dep\"\nversion = \"1.0.0\"\nabi_major = 1\n",
        )
        .unwrap();
        fs::write(dep_dir.join("src/dep.dsy"), "module dep\n").unwrap();
        let app_dir = dir.path().join("app");
        fs::create_dir_all(&app_dir).unwrap();
        fs::write(
            app_dir.join("daisy.toml"),
            "[package]\nname = \"app\"\nversion = \"0.1.0\"\n\n[dependencies]\ndep = \"../dep\"\n",
        )
        .unwrap();
        let entry = write(&app_dir, "app.dsy", "module app\nfn main() -> int:\n  return 0\n");
        let build_dir = app_dir.join("build");
        let err = build(&entry, &build_dir).unwrap_err();
        assert!(error_kinds(err).contains(&DiagnosticKind::AbiIncompatible));
        assert!(!build_dir.exists(), "no artifacts may be written on an ABI gate failure");
    }

    #[test]
    fn emit_ir_and_profile_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(
            dir.path(),
            "m.dsy",
            "module m\nfn main() -> int:\n  repeat 3:\n    print 1\n  return 0\n",
        );
        let build_dir = dir.path().join("build");
        compile_project(
            &entry,
            &BuildOptions {
                build_dir: build_dir.clone(),
                emit_ir: true,
                profile: true,
                ..Default::default()
            },
        )
        .unwrap();
        let ir_dump = fs::read_to_string(build_dir.join("m.ir.txt")).unwrap();
        assert!(ir_dump.contains("cond_br"));
        let profile: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(build_dir.join("profile.json")).unwrap())
                .unwrap();
        assert!(profile.get("total").is_some());
        assert!(profile["modules"]["m"].get("typecheck").is_some());
    }

    #[test]
    fn try_scenario_emits_error_propagation() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(
            dir.path(),
            "m.dsy",
            "module m\nfn inner() -> Result<int, int>:\n  return Result.Err(42)\nfn outer() -> Result<int, int>:\n  let x = try inner()\n  return Result.Ok(x + 1)\nfn main() -> int:\n  return 0\n",
        );
        let outcome = build(&entry, &dir.path().join("build")).unwrap();
        let c = fs::read_to_string(&outcome.c_paths[0]).unwrap();
        assert!(c.contains(".tag ="));
        assert!(c.contains("goto "));
    }
}
