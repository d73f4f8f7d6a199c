// Shared helpers for integration tests.
//
// Provides a temporary workspace (repository root plus a fake home
// directory), an in-memory stand-in for the apt and git commands the steps
// issue, and a helper that drives the engine the way the `run` command does.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};

use workstation_provision::cli::RunOpts;
use workstation_provision::commands::run::initial_model;
use workstation_provision::config::{Config, DEFAULT_MANIFEST};
use workstation_provision::engine::{ErrorPolicy, RunResult, Runner, plan};
use workstation_provision::exec::{ExecResult, Executor};
use workstation_provision::logging::Log;
use workstation_provision::resolver::{FetchError, HttpFetch, VersionResolver};
use workstation_provision::steps::{Context, Step, registry};

fn exec_result(success: bool, stdout: impl Into<String>) -> ExecResult {
    ExecResult {
        stdout: stdout.into(),
        stderr: String::new(),
        success,
        code: Some(i32::from(!success)),
    }
}

/// In-memory apt and `git config --global`.
///
/// Packages installed through `sudo apt-get install` become visible to
/// `dpkg-query`; `git config --global <key> <value>` becomes visible to
/// `git config --global --get`.  Any other command fails.  A binary path
/// registered with [`FakeSystem::with_tool`] answers its version query.
#[derive(Debug, Default)]
pub struct FakeSystem {
    packages: Mutex<BTreeMap<String, String>>,
    git_config: Mutex<BTreeMap<String, String>>,
    tools: Mutex<BTreeMap<String, String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `<path> <args>` with `output`.
    pub fn with_tool(self, path: &Path, output: &str) -> Self {
        self.tools
            .lock()
            .unwrap()
            .insert(path.display().to_string(), output.to_string());
        self
    }

    pub fn installed(&self, name: &str) -> Option<String> {
        self.packages.lock().unwrap().get(name).cloned()
    }

    pub fn git_value(&self, key: &str) -> Option<String> {
        self.git_config.lock().unwrap().get(key).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Commands that changed state: installs and git config writes.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with("sudo ") || (c.starts_with("git config") && !c.contains("--get")))
            .collect()
    }

    fn record(&self, program: &str, args: &[&str]) {
        let mut line = program.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        self.calls.lock().unwrap().push(line);
    }
}

impl Executor for FakeSystem {
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        self.record(program, args);
        match (program, args) {
            ("sudo", [.., "apt-get", "install", "-y", spec]) => {
                let spec: &str = spec;
                let (name, version) = spec.split_once('=').unwrap_or((spec, "1.0-1"));
                self.packages
                    .lock()
                    .unwrap()
                    .insert(name.to_string(), version.to_string());
                Ok(exec_result(true, ""))
            }
            ("git", ["config", "--global", key, value]) => {
                self.git_config
                    .lock()
                    .unwrap()
                    .insert((*key).to_string(), (*value).to_string());
                Ok(exec_result(true, ""))
            }
            _ => bail!("unexpected command: {program} {}", args.join(" ")),
        }
    }

    fn run_in(&self, _dir: &Path, program: &str, args: &[&str]) -> Result<ExecResult> {
        self.record(program, args);
        bail!("unexpected command: {program} {}", args.join(" "))
    }

    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        self.record(program, args);
        match (program, args) {
            ("dpkg-query", ["-W", _, name]) => Ok(match self.installed(name) {
                Some(version) => exec_result(true, format!("install ok installed {version}")),
                None => exec_result(false, ""),
            }),
            ("git", ["config", "--global", "--get", key]) => Ok(match self.git_value(key) {
                Some(value) => exec_result(true, format!("{value}\n")),
                None => exec_result(false, ""),
            }),
            _ => Ok(match self.tools.lock().unwrap().get(program) {
                Some(output) => exec_result(true, output.clone()),
                None => exec_result(false, ""),
            }),
        }
    }

    fn which(&self, _program: &str) -> bool {
        false
    }
}

/// Every lookup times out.
#[derive(Debug, Default)]
pub struct TimeoutFetch;

impl HttpFetch for TimeoutFetch {
    fn get(&self, _url: &str) -> Result<String, FetchError> {
        Err(FetchError::Timeout)
    }
}

/// Every lookup answers with `body`.
#[derive(Debug)]
pub struct FixedFetch(pub &'static str);

impl HttpFetch for FixedFetch {
    fn get(&self, _url: &str) -> Result<String, FetchError> {
        Ok(self.0.to_string())
    }
}

/// Log that keeps every message, prefixed by its level.
#[derive(Debug, Default)]
pub struct CaptureLog {
    lines: Mutex<Vec<String>>,
}

impl CaptureLog {
    fn push(&self, level: &str, msg: &str) {
        self.lines.lock().unwrap().push(format!("{level}: {msg}"));
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl Log for CaptureLog {
    fn stage(&self, msg: &str) {
        self.push("stage", msg);
    }
    fn info(&self, msg: &str) {
        self.push("info", msg);
    }
    fn debug(&self, msg: &str) {
        self.push("debug", msg);
    }
    fn warn(&self, msg: &str) {
        self.push("warn", msg);
    }
    fn error(&self, msg: &str) {
        self.push("error", msg);
    }
    fn dry_run(&self, msg: &str) {
        self.push("dry-run", msg);
    }
}

/// An isolated repository root and home directory.
pub struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    /// Create an empty workspace with `conf/` in place.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::create_dir_all(dir.path().join("root/conf")).expect("create conf dir");
        std::fs::create_dir_all(dir.path().join("home")).expect("create home dir");
        Self { dir }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("root")
    }

    pub fn home(&self) -> PathBuf {
        self.dir.path().join("home")
    }

    /// Write the manifest.
    pub fn manifest(&self, toml: &str) -> &Self {
        std::fs::write(self.root().join(DEFAULT_MANIFEST), toml).expect("write manifest");
        self
    }

    /// Write a repository file, creating parent directories.
    pub fn repo_file(&self, rel: &str, content: &str) -> &Self {
        write_file(&self.root().join(rel), content);
        self
    }

    /// Write a file under the home directory, creating parent directories.
    pub fn home_file(&self, rel: &str, content: &str) -> &Self {
        write_file(&self.home().join(rel), content);
        self
    }

    pub fn read_home(&self, rel: &str) -> String {
        std::fs::read_to_string(self.home().join(rel)).expect("read home file")
    }

    /// Load the manifest the way the `run` command does.
    pub fn config(&self, default_version: Option<&str>) -> Config {
        Config::load(
            &self.root(),
            Path::new(DEFAULT_MANIFEST),
            &self.home(),
            default_version,
        )
        .expect("load config")
    }

    /// Build a context over `system` with `fetch` for version lookups.
    pub fn context(
        &self,
        system: Arc<FakeSystem>,
        fetch: Box<dyn HttpFetch>,
        dry_run: bool,
    ) -> (Context, Arc<CaptureLog>) {
        let log = Arc::new(CaptureLog::default());
        let ctx = Context {
            executor: system as Arc<dyn Executor>,
            log: Arc::clone(&log) as Arc<dyn Log>,
            resolver: Arc::new(VersionResolver::new(fetch)),
            home: self.home(),
            dry_run,
        };
        (ctx, log)
    }

    /// Load, build, order and run every step against `system`.
    pub fn run(&self, system: &Arc<FakeSystem>, opts: &RunOpts) -> RunResult {
        let config = self.config(None);
        let (ctx, _log) = self.context(Arc::clone(system), Box::new(TimeoutFetch), opts.dry_run);
        run_with(&config, &ctx, opts)
    }
}

/// Drive the engine over `config` with `ctx`.
pub fn run_with(config: &Config, ctx: &Context, opts: &RunOpts) -> RunResult {
    let steps = registry::build(config).expect("build steps");
    let all: Vec<&dyn Step> = steps.iter().map(AsRef::as_ref).collect();
    let ordered = plan(&all, &opts.only).expect("plan steps");
    let policy = if opts.continue_on_error {
        ErrorPolicy::Continue
    } else {
        ErrorPolicy::Abort
    };
    Runner::new(ctx, policy).execute(&ordered, initial_model(config))
}

/// `"<id> <status>"` per outcome.
pub fn statuses(result: &RunResult) -> Vec<String> {
    result
        .outcomes
        .iter()
        .map(|o| format!("{} {}", o.step_id(), o.status()))
        .collect()
}

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(path, content).expect("write file");
}
