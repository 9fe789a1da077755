//! Composition root for ovaleval.
//!
//! This crate reads catalogs, snapshots and benchmarks from disk, wires them
//! into the domain and substitution engines, and writes artifacts.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use chrono::Utc;
use ovaleval_domain::{generator_meta, Precedence, ResultDirectives, ResultsModel};
use ovaleval_subst::{Benchmark, ProcessingMode, Substituter, Substitution};
use ovaleval_types::{
    DefinitionCatalog, DirectiveDoc, HostMeta, ResultsDocument, ResultsError,
    SystemCharacteristics, Verdict,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;

pub const DEFAULT_CONFIG: &str = "ovaleval.toml";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    /// Non-boolean verdicts, worst first.
    #[serde(default)]
    pub precedence: Option<Vec<Verdict>>,
    #[serde(default)]
    pub directives: Vec<DirectiveDoc>,
    #[serde(default)]
    pub processing: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

impl AppConfig {
    pub fn precedence(&self) -> anyhow::Result<Precedence> {
        match &self.precedence {
            Some(order) => Precedence::from_slice(order).context("config: precedence"),
            None => Ok(Precedence::default()),
        }
    }

    pub fn directives(&self) -> ResultDirectives {
        ResultDirectives::from_doc(&self.directives)
    }

    pub fn processing_mode(&self) -> anyhow::Result<ProcessingMode> {
        match &self.processing {
            Some(s) => s
                .parse()
                .map_err(|e: String| anyhow!(e))
                .context("config: processing"),
            None => Ok(ProcessingMode::default()),
        }
    }
}

/// Load `config_path`, or `ovaleval.toml` in the working directory if it
/// exists, or defaults.
pub fn load_config(config_path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = PathBuf::from(DEFAULT_CONFIG);
            if p.exists() {
                p
            } else {
                return Ok(AppConfig::default());
            }
        }
    };

    let text =
        fs::read_to_string(&path).with_context(|| format!("read config {}", path.display()))?;
    let cfg: AppConfig =
        toml::from_str(&text).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

#[derive(Debug, Clone, Default)]
pub struct EvalOptions {
    pub catalog: PathBuf,
    pub snapshots: Vec<PathBuf>,
    pub config: Option<PathBuf>,
    /// Previously exported results to attach before evaluating.
    pub import: Option<PathBuf>,
}

pub struct EvalOutput {
    pub document: ResultsDocument,
    pub markdown: String,
    /// One line per evaluation problem; empty on a clean run.
    pub problems: Vec<String>,
    pub exit_code: i32,
}

/// Load inputs, evaluate every system, and build the exported document.
///
/// Evaluation problems (cycles, unknown references) are reported through
/// `problems` and exit code 2; only IO and parse failures are errors.
pub fn run_eval(opts: &EvalOptions) -> anyhow::Result<EvalOutput> {
    let cfg = load_config(opts.config.as_deref())?;
    let catalog: DefinitionCatalog = read_json(&opts.catalog, "definition catalog")?;
    let snapshots = opts
        .snapshots
        .iter()
        .map(|p| read_json::<SystemCharacteristics>(p, "system characteristics"))
        .collect::<anyhow::Result<Vec<_>>>()?;

    tracing::info!(
        definitions = catalog.definitions.len(),
        tests = catalog.tests.len(),
        snapshots = snapshots.len(),
        "inputs loaded"
    );

    let mut model = ResultsModel::new(catalog, snapshots)
        .context("build results model")?
        .with_precedence(cfg.precedence()?);

    if let Some(path) = &opts.import {
        let file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
        model
            .import(std::io::BufReader::new(file))
            .with_context(|| format!("import {}", path.display()))?;
    }

    let problems = match model.eval() {
        Ok(()) => vec![],
        Err(e) => describe(&e),
    };
    model.lock();

    let directives = cfg.directives();
    let document = model.to_document(&directives, generator_meta(Utc::now(), detect_host()));
    let markdown = ovaleval_render::render_markdown(&document);
    let exit_code = if problems.is_empty() { 0 } else { 2 };

    Ok(EvalOutput {
        document,
        markdown,
        problems,
        exit_code,
    })
}

/// Flatten an evaluation error into `code: message` lines.
pub fn describe(err: &ResultsError) -> Vec<String> {
    match err {
        ResultsError::Batch(errors) => errors.iter().flat_map(describe).collect(),
        ResultsError::Evaluation { system, problems } => problems
            .iter()
            .map(|p| format!("[{}] {}: {}", system, p.code(), p))
            .collect(),
        other => vec![format!("{}: {}", other.code(), other)],
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubstituteOptions {
    pub benchmark: PathBuf,
    pub profile: Option<String>,
    pub config: Option<PathBuf>,
    /// Overrides the configured processing mode.
    pub mode: Option<ProcessingMode>,
    /// Overrides the configured title language.
    pub language: Option<String>,
}

pub fn run_substitute(opts: &SubstituteOptions, text: &str) -> anyhow::Result<Substitution> {
    let cfg = load_config(opts.config.as_deref())?;
    let benchmark: Benchmark = read_json(&opts.benchmark, "benchmark")?;
    let policy = benchmark
        .policy(opts.profile.as_deref())
        .ok_or_else(|| {
            anyhow!(
                "profile '{}' not found in benchmark {}",
                opts.profile.as_deref().unwrap_or_default(),
                benchmark.id
            )
        })?;

    let mode = match opts.mode {
        Some(m) => m,
        None => cfg.processing_mode()?,
    };
    let mut substituter = Substituter::new().with_mode(mode);
    if let Some(lang) = opts.language.clone().or(cfg.language) {
        substituter = substituter.with_language(lang);
    }

    let out = substituter
        .run(text, &policy)
        .map_err(|e| anyhow!("{}: {}", e.code(), e))?;
    Ok(out)
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> anyhow::Result<T> {
    let bytes = fs::read(path).with_context(|| format!("read {} {}", what, path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parse {} {}", what, path.display()))
}

/// Write a file atomically: write temp + rename.
///
/// This avoids partial artifacts in CI.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

/// Create the debug log file and write its header.
///
/// The debug log is a side artifact; it never feeds into the results.
pub fn open_debug_log(path: &Path) -> anyhow::Result<fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let mut file =
        fs::File::create(path).with_context(|| format!("create {}", path.display()))?;
    writeln!(file, "# ovaleval debug log")?;
    writeln!(file, "# started: {}", Utc::now().to_rfc3339())?;
    writeln!(file)?;
    Ok(file)
}

/// Detect host metadata (OS, arch, hostname).
fn detect_host() -> Option<HostMeta> {
    Some(HostMeta {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        hostname: hostname::get().ok().and_then(|h| h.into_string().ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const CATALOG: &str = r#"{
        "definitions": [
            {"id": "def:1", "criteria": {"kind": "criterion", "test_ref": "tst:1"}},
            {"id": "def:loop", "criteria": {"kind": "extend_definition", "definition_ref": "def:loop"}}
        ],
        "tests": [{"id": "tst:1", "object_ref": "obj:1"}]
    }"#;

    const SNAPSHOT: &str = r#"{
        "id": "host-a",
        "objects": [{"id": "obj:1", "flag": "complete", "item_refs": ["item:1"]}],
        "items": [{"id": "item:1"}]
    }"#;

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let p = dir.join(name);
        fs::write(&p, text).unwrap();
        p
    }

    #[test]
    fn config_parses_all_sections() {
        let cfg: AppConfig = toml::from_str(
            r#"
            precedence = ["unknown", "error", "not applicable", "not evaluated"]
            processing = "tailoring"
            language = "de"

            [[directives]]
            result = "false"
            reported = false

            [[directives]]
            result = "true"
            reported = true
            content = "thin"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.precedence().unwrap().order()[0], Verdict::Unknown);
        assert_eq!(cfg.processing_mode().unwrap(), ProcessingMode::TAILORING);
        let d = cfg.directives();
        assert!(!d.reported(Verdict::False));
        assert!(!d.is_full(Verdict::True));
    }

    #[test]
    fn bad_precedence_is_an_error() {
        let cfg: AppConfig = toml::from_str(r#"precedence = ["error"]"#).unwrap();
        assert!(cfg.precedence().is_err());
    }

    #[test]
    fn write_atomic_creates_parents() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("a/b/results.json");
        write_atomic(&path, b"{}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn run_eval_reports_problems_with_exit_code_2() {
        let tmp = tempdir().unwrap();
        let opts = EvalOptions {
            catalog: write(tmp.path(), "catalog.json", CATALOG),
            snapshots: vec![write(tmp.path(), "host-a.json", SNAPSHOT)],
            ..Default::default()
        };
        let out = run_eval(&opts).unwrap();
        assert_eq!(out.exit_code, 2);
        assert_eq!(out.problems.len(), 1);
        assert!(out.problems[0].starts_with("[host-a] results.extend_cycle"));

        let sys = &out.document.systems[0];
        let def = sys.definitions.iter().find(|d| d.id == "def:1").unwrap();
        assert_eq!(def.result, Verdict::True);
        assert!(out.markdown.contains("def:loop"));
    }

    #[test]
    fn run_eval_missing_catalog_is_runtime_error() {
        let tmp = tempdir().unwrap();
        let opts = EvalOptions {
            catalog: tmp.path().join("missing.json"),
            ..Default::default()
        };
        let err = run_eval(&opts).err().unwrap();
        assert!(err.to_string().contains("definition catalog"));
    }

    #[test]
    fn run_substitute_with_profile() {
        let tmp = tempdir().unwrap();
        let bench = write(
            tmp.path(),
            "bench.json",
            r#"{"id": "b", "values": [{"id": "v", "instances": [{"value": "3"}]}],
                "profiles": [{"id": "p", "set_values": [{"idref": "v", "value": "7"}]}]}"#,
        );
        let mut opts = SubstituteOptions {
            benchmark: bench,
            profile: Some("p".into()),
            ..Default::default()
        };
        let out = run_substitute(&opts, r#"n=<sub idref="v"/>"#).unwrap();
        assert_eq!(out.text, "n=7");

        opts.profile = Some("nope".into());
        assert!(run_substitute(&opts, "x").is_err());
    }

    #[test]
    fn debug_log_has_header() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("logs/debug.log");
        drop(open_debug_log(&path).unwrap());
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# ovaleval debug log\n# started: "));
    }
}
