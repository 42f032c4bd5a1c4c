//! `devsync closure`: print the upload set for an entry without starting a server.

use super::locate_project;
use devsync_core::closure::{DependencyResolver, ResolveWarning, UploadClosure};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;

/// Stable JSON shape of `devsync --json closure`.
#[derive(Debug, Serialize)]
struct ClosureReport {
    root: String,
    entry: String,
    file_count: usize,
    local_files: Vec<String>,
    packages: Vec<PackageReport>,
    warnings: Vec<ResolveWarning>,
}

#[derive(Debug, Serialize)]
struct PackageReport {
    name: String,
    logical_directory: String,
    real_directory: String,
    is_symlink: bool,
    files: Vec<String>,
}

impl ClosureReport {
    fn new(root: &Path, entry: &Path, closure: UploadClosure) -> Self {
        Self {
            root: root.display().to_string(),
            entry: entry.display().to_string(),
            file_count: closure.file_count(),
            local_files: closure.local_files.into_iter().map(|f| f.path).collect(),
            packages: closure
                .packages
                .into_iter()
                .map(|p| PackageReport {
                    name: p.node.name,
                    logical_directory: p.node.logical_directory,
                    real_directory: p.node.real_directory.display().to_string(),
                    is_symlink: p.node.is_symlink,
                    files: p.files.into_iter().map(|f| f.path).collect(),
                })
                .collect(),
            warnings: closure.warnings,
        }
    }
}

pub fn run(cwd: &Path, entry: Option<&Path>, json: bool) -> Result<()> {
    let project = locate_project(cwd, entry)?;

    let resolver = DependencyResolver::new(&project.root, &project.config.runtime_provided);
    let closure = resolver.resolve_closure(&project.entry).into_diagnostic()?;
    let report = ClosureReport::new(resolver.root(), &project.entry, closure);

    if json {
        let out = serde_json::to_string_pretty(&report).into_diagnostic()?;
        println!("{out}");
    } else {
        print_human(&report).into_diagnostic()?;
    }
    Ok(())
}

fn print_human(report: &ClosureReport) -> io::Result<()> {
    let mut out = io::stdout().lock();

    writeln!(out, "entry: {}", report.entry)?;
    writeln!(out, "{} files", report.file_count)?;
    writeln!(out)?;

    for path in &report.local_files {
        writeln!(out, "  {path}")?;
    }
    for package in &report.packages {
        let link = if package.is_symlink {
            format!(" -> {}", package.real_directory)
        } else {
            String::new()
        };
        writeln!(out)?;
        writeln!(out, "{} ({} files){link}", package.name, package.files.len())?;
        for path in &package.files {
            writeln!(out, "  {path}")?;
        }
    }

    if !report.warnings.is_empty() {
        writeln!(out)?;
        writeln!(out, "warnings:")?;
        for w in &report.warnings {
            writeln!(out, "  [{}] {}: {}", w.code, w.path, w.message)?;
        }
    }
    Ok(())
}
