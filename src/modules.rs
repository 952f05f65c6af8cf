//! Module resolution: follows `import`/`use` directives over the search
//! paths handed in by the manifest layer, loads each module once, and
//! reports import cycles with the offending path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::ast::{Module, Stmt};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::error::{DaisyError, DaisyResult};
use crate::parser;
use crate::source::SourceFile;
use crate::span::FileId;

#[derive(Debug)]
pub struct LoadedModule {
    pub path: PathBuf,
    pub source: SourceFile,
    pub ast: Module,
}

#[derive(Debug)]
pub struct Project {
    /// Entry module first, imports in discovery order.
    pub modules: Vec<LoadedModule>,
}

impl Project {
    pub fn imports_of(&self, module: &Module) -> Vec<String> {
        let known: Vec<&str> = self.modules.iter().map(|m| m.ast.name.as_str()).collect();
        module
            .body
            .iter()
            .filter_map(|stmt| match stmt {
                Stmt::Import(i) if known.contains(&i.module.as_str()) => Some(i.module.clone()),
                _ => None,
            })
            .collect()
    }
}

pub fn load_project(entry: &Path, search_paths: &[PathBuf]) -> DaisyResult<Project> {
    let mut loader = Loader {
        search_paths,
        modules: Vec::new(),
        loaded_paths: HashMap::new(),
        next_file: 0,
    };
    let entry = entry
        .canonicalize()
        .map_err(|e| DaisyError::manifest(format!("entry not found: {} ({e})", entry.display())))?;
    let mut visiting = Vec::new();
    loader.load(&entry, &mut visiting)?;
    Ok(Project { modules: loader.modules })
}

struct Loader<'a> {
    search_paths: &'a [PathBuf],
    modules: Vec<LoadedModule>,
    loaded_paths: HashMap<PathBuf, String>,
    next_file: FileId,
}

impl<'a> Loader<'a> {
    fn load(&mut self, path: &Path, visiting: &mut Vec<String>) -> DaisyResult<()> {
        let file = self.next_file;
        self.next_file += 1;
        let source = SourceFile::read(file, path)?;
        let ast = parser::parse(&source)?;
        let name = ast.name.clone();
        if visiting.contains(&name) {
            let mut cycle = visiting.clone();
            cycle.push(name.clone());
            return Err(DaisyError::Diagnostics(vec![Diagnostic::new(
                DiagnosticKind::ImportCycle,
                format!("import cycle: {}", cycle.join(" -> ")),
                Some(ast.span),
            )]));
        }
        visiting.push(name.clone());
        self.loaded_paths.insert(path.to_path_buf(), name.clone());
        let imports: Vec<_> = ast
            .body
            .iter()
            .filter_map(|stmt| match stmt {
                Stmt::Import(i) => Some(i.clone()),
                _ => None,
            })
            .collect();
        self.modules.push(LoadedModule { path: path.to_path_buf(), source, ast });
        for import in imports {
            let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
            let import_path = self.resolve(&import.module, base_dir).ok_or_else(|| {
                DaisyError::Diagnostics(vec![Diagnostic::new(
                    DiagnosticKind::UnknownSymbol,
                    format!("module not found: {}", import.module),
                    Some(import.span),
                )])
            })?;
            let import_path = import_path.canonicalize().map_err(DaisyError::Io)?;
            match self.loaded_paths.get(&import_path) {
                Some(loaded_name) => {
                    // a back edge to a module still being loaded is a cycle
                    if visiting.contains(loaded_name) {
                        let mut cycle = visiting.clone();
                        cycle.push(loaded_name.clone());
                        return Err(DaisyError::Diagnostics(vec![Diagnostic::new(
                            DiagnosticKind::ImportCycle,
                            format!("import cycle: {}", cycle.join(" -> ")),
                            Some(import.span),
                        )]));
                    }
                }
                None => self.load(&import_path, visiting)?,
            }
        }
        visiting.pop();
        Ok(())
    }

    fn resolve(&self, name: &str, base_dir: &Path) -> Option<PathBuf> {
        let file_name = format!("{name}.dsy");
        for prefix in self.search_paths {
            let candidate = prefix.join(&file_name);
            if candidate.exists() {
                return Some(candidate);
            }
        }
        let local = base_dir.join(&file_name);
        local.exists().then_some(local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_imports_transitively() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(dir.path(), "app.dsy", "module app\nimport util\nfn main() -> int:\n  return 0\n");
        write(dir.path(), "util.dsy", "module util\nimport deep\nexport fn one() -> int:\n  return 1\n");
        write(dir.path(), "deep.dsy", "module deep\nexport fn two() -> int:\n  return 2\n");
        let project = load_project(&entry, &[]).unwrap();
        let names: Vec<_> = project.modules.iter().map(|m| m.ast.name.as_str()).collect();
        assert_eq!(names, vec!["app", "util", "deep"]);
    }

    #[test]
    fn shared_import_loads_once() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(
            dir.path(),
            "app.dsy",
            "module app\nimport a\nimport b\nfn main() -> int:\n  return 0\n",
        );
        write(dir.path(), "a.dsy", "module a\nimport shared\n");
        write(dir.path(), "b.dsy", "module b\nimport shared\n");
        write(dir.path(), "shared.dsy", "module shared\n");
        let project = load_project(&entry, &[]).unwrap();
        assert_eq!(project.modules.len(), 4);
    }

    #[test]
    fn cycles_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(dir.path(), "a.dsy", "module a\nimport b\n");
        write(dir.path(), "b.dsy", "module b\nimport a\n");
        let err = load_project(&entry, &[]).unwrap_err();
        match err {
            DaisyError::Diagnostics(diags) => {
                assert_eq!(diags[0].kind, DiagnosticKind::ImportCycle);
                assert!(diags[0].message.contains("a -> b -> a"));
            }
            other => panic!("expected diagnostics, got {other:?}"),
        }
    }

    #[test]
    fn missing_module_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(dir.path(), "a.dsy", "module a\nimport ghost\n");
        let err = load_project(&entry, &[]).unwrap_err();
        match err {
            DaisyError::Diagnostics(diags) => {
                assert_eq!(diags[0].kind, DiagnosticKind::UnknownSymbol);
            }
            other => panic!("expected diagnostics, got {other:?}"),
        }
    }
}
