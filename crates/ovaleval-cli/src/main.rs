use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ovaleval_app::{run_eval, run_substitute, write_atomic, EvalOptions, SubstituteOptions};
use ovaleval_types::{codes, ResultsDocument};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "ovaleval",
    version,
    about = "Evaluate OVAL-style definitions against system snapshots"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate a definition catalog against one or more snapshots and write results.
    ///
    /// Exit codes: 0 clean, 2 evaluation problems (cycles, unknown references),
    /// 1 runtime error (unreadable or malformed inputs).
    #[command(
        after_help = "EXAMPLES:\n    ovaleval eval --catalog defs.json --snapshot host-a.json\n    ovaleval eval --catalog defs.json --snapshot a.json --snapshot b.json --md summary.md"
    )]
    Eval {
        /// Definition catalog (JSON)
        #[arg(long)]
        catalog: PathBuf,

        /// System characteristics snapshot (JSON); repeat for several systems
        #[arg(long = "snapshot", required = true)]
        snapshots: Vec<PathBuf>,

        /// Optional ovaleval.toml path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Previously exported results to attach before evaluating
        #[arg(long)]
        import: Option<PathBuf>,

        /// Results output path
        #[arg(long, default_value = "artifacts/ovaleval/results.json")]
        out: PathBuf,

        /// Optional markdown output path
        #[arg(long)]
        md: Option<PathBuf>,

        /// Enable debug logging (writes to artifacts/ovaleval/raw.log by default).
        /// This is a side artifact that does NOT affect results determinism.
        #[arg(long)]
        debug: bool,

        /// Custom debug log file path (implies --debug).
        #[arg(long, env = "OVALEVAL_DEBUG_LOG")]
        log_file: Option<PathBuf>,
    },

    /// Render markdown from an existing results.json.
    #[command(
        after_help = "EXAMPLES:\n    ovaleval md path/to/results.json\n    ovaleval md --report path/to/results.json --out summary.md"
    )]
    Md {
        /// Path to the results.json file (positional or via --report)
        #[arg(value_name = "REPORT")]
        report_positional: Option<PathBuf>,

        /// Path to the results.json file (alternative to positional argument)
        #[arg(long = "report", value_name = "FILE")]
        report_flag: Option<PathBuf>,

        /// Output markdown file path
        #[arg(long, default_value = "artifacts/ovaleval/summary.md")]
        out: PathBuf,
    },

    /// Resolve sub markers in a text fragment against a benchmark.
    ///
    /// The text is read from --text, --file, or stdin. The result goes to
    /// stdout; warnings go to stderr.
    #[command(
        after_help = "EXAMPLES:\n    ovaleval substitute --benchmark bench.json --text 'Set <sub idref=\"v1\"/>'\n    ovaleval substitute --benchmark bench.json --profile strict --file fix.xml"
    )]
    Substitute {
        /// Benchmark content (JSON)
        #[arg(long)]
        benchmark: PathBuf,

        /// Profile whose bindings apply
        #[arg(long)]
        profile: Option<String>,

        /// Processing mode: tailoring|document|assessment (combine with ',')
        #[arg(long)]
        mode: Option<ovaleval_subst::ProcessingMode>,

        /// Preferred title language
        #[arg(long)]
        lang: Option<String>,

        /// Optional ovaleval.toml path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Text to substitute
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,

        /// File holding the text to substitute
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Explain a stable error code (e.g., results.extend_cycle).
    #[command(
        after_help = "EXAMPLES:\n    ovaleval explain results.extend_cycle\n    ovaleval explain sub.missing_idref"
    )]
    Explain {
        /// The code to explain
        #[arg(value_name = "CODE")]
        code: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Eval {
            catalog,
            snapshots,
            config,
            import,
            out,
            md,
            debug,
            log_file,
        } => {
            let debug_log_path = if let Some(path) = log_file {
                Some(path)
            } else if debug {
                Some(PathBuf::from("artifacts/ovaleval/raw.log"))
            } else {
                None
            };
            init_logging(debug_log_path.as_deref())?;

            let opts = EvalOptions {
                catalog,
                snapshots,
                config,
                import,
            };
            match run_eval(&opts).context("run ovaleval") {
                Ok(output) => {
                    let json = serde_json::to_vec_pretty(&output.document)?;
                    write_atomic(&out, &json)?;

                    if let Some(md_path) = md {
                        write_atomic(&md_path, output.markdown.as_bytes())?;
                    }

                    for p in &output.problems {
                        eprintln!("ovaleval: {}", p);
                    }
                    eprintln!(
                        "ovaleval: {} system(s), {} problem(s)",
                        output.document.systems.len(),
                        output.problems.len()
                    );
                    std::process::exit(output.exit_code);
                }
                Err(err) => {
                    eprintln!("ovaleval: {:#}", err);
                    std::process::exit(1);
                }
            }
        }
        Command::Md {
            report_positional,
            report_flag,
            out,
        } => {
            init_logging(None)?;
            let report = report_positional
                .or(report_flag)
                .ok_or_else(|| anyhow::anyhow!("missing required argument: REPORT or --report"))?;

            let bytes = fs::read(&report).with_context(|| format!("read {}", report.display()))?;
            let doc: ResultsDocument =
                serde_json::from_slice(&bytes).with_context(|| "parse results.json")?;
            let md = ovaleval_render::render_markdown(&doc);
            write_atomic(&out, md.as_bytes())?;
        }
        Command::Substitute {
            benchmark,
            profile,
            mode,
            lang,
            config,
            text,
            file,
        } => {
            init_logging(None)?;
            let input = match (text, file) {
                (Some(t), _) => t,
                (None, Some(path)) => fs::read_to_string(&path)
                    .with_context(|| format!("read {}", path.display()))?,
                (None, None) => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("read stdin")?;
                    buf
                }
            };
            let opts = SubstituteOptions {
                benchmark,
                profile,
                config,
                mode,
                language: lang,
            };
            let out = run_substitute(&opts, &input)?;
            for w in &out.warnings {
                eprintln!("warning: {}", w);
            }
            println!("{}", out.text);
        }
        Command::Explain { code } => {
            println!("{}", explain(&code));
        }
    }

    Ok(())
}

/// Stderr logging is off unless RUST_LOG asks for it; a debug log file
/// captures everything at debug level.
fn init_logging(log_file: Option<&Path>) -> anyhow::Result<()> {
    let result = match log_file {
        Some(path) => {
            let file = ovaleval_app::open_debug_log(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new("debug"))
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => {
            let filter =
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off"));
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init()
        }
    };
    result.map_err(|e| anyhow::anyhow!("init logging: {}", e))
}

fn explain(code: &str) -> &'static str {
    match code {
        codes::RESULTS_LOCKED => "The results model was locked and a structural change (new snapshot, system, or import) was attempted. Fork the model to get an unlocked copy.",
        codes::RESULTS_UNKNOWN_DEFINITION => "A definition id is not in the definition catalog. Check the catalog matches the results being evaluated or imported.",
        codes::RESULTS_UNKNOWN_TEST => "A criterion references a test id that is not in the definition catalog.",
        codes::RESULTS_UNKNOWN_SYSTEM => "A snapshot id is not part of the model and no snapshot was embedded for it. Pass the snapshot with --snapshot.",
        codes::RESULTS_UNKNOWN_ITEM => "A test result references an item that is not in its snapshot.",
        codes::RESULTS_DUPLICATE => "The same definition, test, snapshot or system id was added twice.",
        codes::RESULTS_EXTEND_CYCLE => "Definitions extend each other in a loop. Every definition on the loop evaluates to error; break the loop in the catalog.",
        codes::RESULTS_EVALUATION_FAILED => "One or more systems reported evaluation problems; the individual problems are listed alongside.",
        codes::RESULTS_INVALID_PRECEDENCE => "The configured precedence must list error, unknown, not evaluated and not applicable exactly once each.",
        codes::RESULTS_PARSE_ERROR => "A results document could not be parsed or has an unsupported schema.",
        codes::RESULTS_IO_ERROR => "Results could not be written.",
        codes::SUB_MISSING_IDREF => "A sub marker has no idref attribute, or an empty one. Every sub must name a value or plain-text block.",
        codes::SUB_UNRESOLVED_IDREF => "A sub marker names an id the benchmark cannot resolve to text (unknown id, or a value with no bound instance or title).",
        codes::SUB_MALFORMED => "The text is not a well-formed XML fragment.",
        _ => "Unknown code. If this code was emitted, the explain registry is missing an entry (bug).",
    }
}
