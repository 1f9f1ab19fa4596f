#![allow(dead_code)]

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use devloop::config::{ConfigFile, load_and_validate};
use devloop::fs::FileTimestampIndex;
use devloop::project::LayoutProjectSupplier;
use devloop::types::BuildRootType;
use tempfile::TempDir;

use crate::fake_executor::FakeCompiler;

/// Layout written to `Devloop.toml` by [`ScratchProject::new`].
pub const LAYOUT: &str = r#"
[project]
name = "scratch"
build_files = ["pom.xml"]
main_class = "io.example.Main"
dependencies = ["lib"]

[[component]]
kind = "compile"
source = "src/main/java"
output = "target/classes"

[[component]]
kind = "copy"
source = "src/main/resources"
output = "target/classes"

[loop]
poll_interval = "20ms"
"#;

pub const MAIN_JAVA: &str = "src/main/java/io/example/Main.java";
pub const GREETER_JAVA: &str = "src/main/java/io/example/Greeter.java";
pub const APP_PROPERTIES: &str = "src/main/resources/app.properties";

const MAIN_SOURCE: &str = r#"package io.example;

public class Main {
    public static void main(String[] args) {
        System.out.println(new Greeter().greet("devloop"));
    }
}
"#;

const GREETER_SOURCE: &str = r#"package io.example;

public class Greeter {
    public String greet(String name) {
        return "hello " + name;
    }
}
"#;

/// A small Maven-shaped Java project in a temporary directory.
///
/// ```text
/// pom.xml
/// Devloop.toml
/// lib/dep.jar
/// src/main/java/io/example/{Main,Greeter}.java
/// src/main/resources/app.properties
/// target/classes/
/// ```
pub struct ScratchProject {
    _dir: TempDir,
    root: PathBuf,
    ticks: AtomicU64,
}

impl ScratchProject {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = dir.path().canonicalize().expect("canonicalize temp dir");
        let project = Self {
            _dir: dir,
            root,
            ticks: AtomicU64::new(0),
        };

        project.write("pom.xml", "<project><artifactId>scratch</artifactId></project>\n");
        project.write("lib/dep.jar", "PK\u{3}\u{4}");
        project.write(MAIN_JAVA, MAIN_SOURCE);
        project.write(GREETER_JAVA, GREETER_SOURCE);
        project.write(APP_PROPERTIES, "greeting=hello\n");
        fs::create_dir_all(project.output_dir()).expect("create output dir");
        project.write_config(LAYOUT);
        project
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path("target/classes")
    }

    pub fn config_path(&self) -> PathBuf {
        self.path("Devloop.toml")
    }

    /// Write `contents` to `rel`, creating parent directories.
    pub fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(&path, contents).expect("write file");
        path
    }

    pub fn remove(&self, rel: &str) {
        fs::remove_file(self.path(rel)).expect("remove file");
    }

    /// Give `rel` an mtime strictly newer than anything written or touched
    /// before, so the change is visible regardless of filesystem granularity.
    pub fn touch(&self, rel: &str) -> SystemTime {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        let time = SystemTime::now() + Duration::from_secs(2 + tick);
        let file = File::options()
            .write(true)
            .open(self.path(rel))
            .expect("open file to touch");
        file.set_modified(time).expect("set mtime");
        time
    }

    /// Rewrite `rel` and touch it.
    pub fn edit(&self, rel: &str, contents: &str) -> SystemTime {
        self.write(rel, contents);
        self.touch(rel)
    }

    pub fn write_config(&self, contents: &str) {
        self.write("Devloop.toml", contents);
    }

    pub fn config(&self) -> ConfigFile {
        load_and_validate(self.config_path()).expect("valid scratch layout")
    }

    /// Supplier for this project compiling through `compiler`.
    pub fn supplier(&self, compiler: &FakeCompiler) -> LayoutProjectSupplier {
        LayoutProjectSupplier::new(self.config()).with_compiler(Arc::new(compiler.clone()))
    }

    /// Class files under the output dir, relative and sorted.
    pub fn class_files(&self) -> Vec<String> {
        let out = self.output_dir();
        let mut files: Vec<String> = FileTimestampIndex::new(&out)
            .with_file_filter(|p| BuildRootType::JavaClasses.accepts(p))
            .entries()
            .expect("scan output dir")
            .into_iter()
            .filter_map(|(path, _)| {
                path.strip_prefix(&out)
                    .ok()
                    .map(|rel| rel.to_string_lossy().replace('\\', "/"))
            })
            .collect();
        files.sort();
        files
    }
}

impl Default for ScratchProject {
    fn default() -> Self {
        Self::new()
    }
}
