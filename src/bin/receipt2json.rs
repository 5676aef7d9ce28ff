//! CLI binary for receipt2json.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, prints each stage's output as it happens, and ends
//! with the structured record or a stage-attributed failure message.
//!
//! Pipeline failures are reported, not propagated: the process exits normally
//! whether or not a record was produced.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use receipt2json::{
    extract, recognize, DocumentKind, ExtractionConfig, ExtractionOutput,
    ExtractionProgressCallback, JsonExtractError, ModelError, ProgressCallback, PromptTemplate,
    ScanError,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── Stage trace ──────────────────────────────────────────────────────────────

/// Prints every intermediate result to stdout, with an optional spinner on
/// stderr while a stage is running.
struct CliTrace {
    bar: Option<ProgressBar>,
}

impl CliTrace {
    fn new(show_spinner: bool) -> Arc<Self> {
        let bar = show_spinner.then(|| {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
            );
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        Arc::new(Self { bar })
    }

    fn set_status(&self, prefix: &str, msg: String) {
        if let Some(ref bar) = self.bar {
            bar.set_prefix(prefix.to_string());
            bar.set_message(msg);
        }
    }

    /// Print to stdout without tearing the spinner.
    fn print(&self, text: &str) {
        match self.bar {
            Some(ref bar) => bar.suspend(|| println!("{text}")),
            None => println!("{text}"),
        }
    }

    fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

impl ExtractionProgressCallback for CliTrace {
    fn on_ocr_start(&self, kind: DocumentKind) {
        self.print("--- OCR started ---");
        let what = match kind {
            DocumentKind::Image => "image",
            DocumentKind::Pdf => "PDF",
        };
        self.set_status("OCR", format!("recognising {what}…"));
    }

    fn on_page_recognized(&self, page_num: usize, total_pages: usize, chars: usize) {
        self.set_status("OCR", format!("page {page_num}/{total_pages}"));
        if total_pages > 1 {
            self.print(&dim(&format!(
                "  page {page_num}/{total_pages}: {chars} chars"
            )));
        }
    }

    fn on_ocr_complete(&self, text: &str) {
        self.print(text);
        self.print("--- OCR finished ---");
    }

    fn on_llm_start(&self, model: &str) {
        self.print("\n--- LLM extraction started ---");
        self.set_status("LLM", format!("waiting for {model}…"));
    }

    fn on_completion(&self, completion: &str) {
        self.print("\nRaw model output:\n");
        self.print(completion);
    }

    fn on_json_span(&self, span: &str) {
        self.print("\nExtracted JSON text:\n");
        self.print(span);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Receipt photo, Turkish OCR, llama2 via Ollama
  receipt2json fatura.jpg

  # Multi-page PDF invoice with English OCR and another model
  receipt2json --lang eng --model llama3 invoice.pdf

  # Only the final JSON on stdout
  receipt2json --quiet fatura.jpg > fatura.json

  # Check what tesseract sees, without a model
  receipt2json --ocr-only scan.png

  # Custom prompts (use {invoice_text} once; write literal braces as {{ }})
  receipt2json --system-prompt sys.txt --prompt-template human.txt fatura.jpg

REQUIREMENTS:
  tesseract        with the language data for --lang (e.g. tesseract-ocr-tur)
  ollama serve     running locally with the --model pulled (ollama pull llama2)
  libpdfium        for PDF input; set PDFIUM_LIB_PATH if it is not on the
                   library search path
"#;

/// Extract structured JSON from receipt and invoice scans.
#[derive(Parser, Debug)]
#[command(
    name = "receipt2json",
    version,
    about = "Extract structured JSON from receipt and invoice scans with Tesseract OCR and a local LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image (PNG, JPEG, TIFF, BMP, GIF, WebP) or PDF file.
    input: PathBuf,

    /// Tesseract language code(s), e.g. tur, eng, tur+eng.
    #[arg(short, long, default_value = "tur")]
    lang: String,

    /// Model name on the model server.
    #[arg(short, long, default_value = "llama2")]
    model: String,

    /// LLM provider (ollama, openai, anthropic, …).
    #[arg(long, default_value = "ollama")]
    provider: String,

    /// Rendering DPI for PDF pages (72–600).
    #[arg(long, default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// PDF user password for encrypted documents.
    #[arg(long)]
    password: Option<String>,

    /// File with a replacement system prompt.
    #[arg(long)]
    system_prompt: Option<PathBuf>,

    /// File with a replacement human prompt template.
    #[arg(long)]
    prompt_template: Option<PathBuf>,

    /// Path or name of the tesseract executable.
    #[arg(long, default_value = "tesseract")]
    tesseract: PathBuf,

    /// LLM temperature (0.0–2.0). Provider default when unset.
    #[arg(long)]
    temperature: Option<f32>,

    /// Max LLM output tokens. Provider default when unset.
    #[arg(long)]
    max_tokens: Option<usize>,

    /// Stop after OCR and print the recognised text.
    #[arg(long)]
    ocr_only: bool,

    /// Print only the final JSON (failures go to stderr).
    #[arg(short, long)]
    quiet: bool,

    /// Disable the spinner.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let trace = (!cli.quiet).then(|| CliTrace::new(!cli.no_progress && !cli.verbose));
    let progress = trace
        .clone()
        .map(|t| t as Arc<dyn ExtractionProgressCallback>);
    let config = build_config(&cli, progress).await?;

    // ── OCR-only mode ────────────────────────────────────────────────────
    if cli.ocr_only {
        let result = recognize(&cli.input, &config).await;
        if let Some(ref t) = trace {
            t.finish();
        }
        match result {
            Ok(doc) if cli.quiet => println!("{}", doc.text),
            Ok(_) => {}
            Err(e) => report_failure(&ScanError::from(e), cli.quiet),
        }
        return Ok(());
    }

    // ── Run extraction ───────────────────────────────────────────────────
    let result = extract(&cli.input, &config).await;
    if let Some(ref t) = trace {
        t.finish();
    }

    match result {
        Ok(output) => report_success(&output, cli.quiet),
        Err(e) => report_failure(&e, cli.quiet),
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut prompt = PromptTemplate::default();

    if let Some(ref path) = cli.system_prompt {
        let system = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        prompt = prompt
            .with_system(&system)
            .context("Invalid system prompt")?;
    }

    if let Some(ref path) = cli.prompt_template {
        let human = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt template from {:?}", path))?;
        prompt = prompt
            .with_human(&human)
            .context("Invalid prompt template")?;
    }

    let mut builder = ExtractionConfig::builder()
        .language(&cli.lang)
        .model(&cli.model)
        .provider_name(&cli.provider)
        .dpi(cli.dpi)
        .tesseract_command(&cli.tesseract)
        .prompt(prompt);

    if let Some(t) = cli.temperature {
        builder = builder.temperature(t);
    }
    if let Some(n) = cli.max_tokens {
        builder = builder.max_tokens(n);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn report_success(output: &ExtractionOutput, quiet: bool) {
    if quiet {
        println!("{}", output.record_pretty());
        return;
    }

    println!("\n--- LLM extraction finished ---");
    println!("\n{}\n", bold("Structured invoice data (JSON):"));
    println!("{}", output.record_pretty());

    if let Err(e) = output.typed_record() {
        warn!("Extracted JSON does not match the invoice schema: {}", e);
    }

    eprintln!(
        "{} {} page(s)  OCR {}ms  LLM {}ms  {}",
        green("✔"),
        output.stats.page_count,
        output.stats.ocr_duration_ms,
        output.stats.llm_duration_ms,
        dim(&format!(
            "{} tokens in / {} tokens out",
            output.stats.prompt_tokens, output.stats.completion_tokens
        )),
    );
}

/// Print a stage-attributed failure message. Goes to stdout alongside the
/// trace, or to stderr in quiet mode.
fn report_failure(err: &ScanError, quiet: bool) {
    let mut lines = Vec::new();

    match err {
        ScanError::Ocr(e) => {
            lines.push(red("Error: OCR did not return text."));
            lines.push(e.to_string());
        }
        ScanError::Model(e) => {
            let headline = match e {
                ModelError::Unavailable { .. } => {
                    "Error: the model server could not be reached. Make sure it is running."
                }
                ModelError::InvocationFailed { .. } => "Error: the LLM call failed.",
            };
            lines.push(red(headline));
            lines.push(e.to_string());
            lines.push("--- Text that was sent ---".to_string());
            lines.push(e.text_preview().to_string());
            lines.push("--- End of text ---".to_string());
        }
        ScanError::Json(JsonExtractError::NoJsonFound { .. }) => {
            lines.push(red("Warning: no JSON object found in the model output."));
            lines.push(
                "Check the model output above; a different prompt or model may be needed."
                    .to_string(),
            );
        }
        ScanError::Json(JsonExtractError::Parse { source, span }) => {
            lines.push(red(&format!(
                "Error: the model output is not valid JSON: {source}"
            )));
            lines.push("Offending JSON text:".to_string());
            lines.push(span.clone());
        }
        other => {
            lines.push(red(&format!("Error ({} stage):", other.stage())));
            lines.push(other.to_string());
        }
    }

    if !matches!(err, ScanError::Ocr(_) | ScanError::InvalidConfig(_)) {
        lines.push(String::new());
        lines.push("Invoice data could not be structured.".to_string());
    }

    let text = lines.join("\n");
    if quiet {
        eprintln!("{text}");
    } else {
        println!("\n{text}");
    }
}
