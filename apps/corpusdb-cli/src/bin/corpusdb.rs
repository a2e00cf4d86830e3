use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use corpusdb_core::config::Config;
use corpusdb_core::types::SearchFilters;
use corpusdb_hybrid::{CorpusService, IndexScope, Progress};

const USAGE: &str = "Usage: corpusdb <index|search|stats|sources|clear> [args...]

  index   [--technology T] [--path P]... [--rebuild]
  search  <query> [--technology T] [--component C] [--top-k N] [--json]
  stats
  sources [--technology T] [--component C]
  clear   [--technology T] [--path P]...";

#[derive(Debug, Default)]
struct Args {
    positional: Vec<String>,
    technology: Option<String>,
    component: Option<String>,
    paths: Vec<PathBuf>,
    top_k: Option<usize>,
    rebuild: bool,
    json: bool,
}

impl Args {
    fn parse(raw: &[String]) -> Result<Self> {
        let mut args = Args::default();
        let mut i = 0;
        while i < raw.len() {
            let value = |i: usize| raw.get(i + 1).cloned().with_context(|| format!("{} requires a value", raw[i]));
            match raw[i].as_str() {
                "--technology" | "-t" => { args.technology = Some(value(i)?); i += 1; }
                "--component" | "-c" => { args.component = Some(value(i)?); i += 1; }
                "--path" | "-p" => { args.paths.push(PathBuf::from(value(i)?)); i += 1; }
                "--top-k" | "-k" => {
                    let v = value(i)?;
                    args.top_k = Some(v.parse().with_context(|| format!("--top-k expects a number, got {v:?}"))?);
                    i += 1;
                }
                "--rebuild" => args.rebuild = true,
                "--json" => args.json = true,
                flag if flag.starts_with('-') => bail!("unknown flag {flag}\n\n{USAGE}"),
                other => args.positional.push(other.to_string()),
            }
            i += 1;
        }
        Ok(args)
    }

    fn filters(&self) -> SearchFilters {
        let mut f = SearchFilters::default();
        if let Some(t) = &self.technology { f = f.technology(t); }
        if let Some(c) = &self.component { f = f.component(c); }
        f
    }

    fn scope(&self) -> IndexScope {
        let mut scope = IndexScope::all().rebuild(self.rebuild);
        if let Some(t) = &self.technology { scope = scope.technology(t); }
        for p in &self.paths { scope = scope.path(p.clone()); }
        scope
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn progress_bar() -> Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let mut raw: Vec<String> = env::args().skip(1).collect();
    if raw.is_empty() || raw[0] == "--help" || raw[0] == "-h" {
        eprintln!("{USAGE}");
        std::process::exit(if raw.is_empty() { 1 } else { 0 });
    }
    let cmd = raw.remove(0);
    let args = Args::parse(&raw)?;

    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let settings = config.settings()?;
    let service = Arc::new(CorpusService::open(settings).await?);

    match cmd.as_str() {
        "index" => {
            let svc = service.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received; stopping after the current batch");
                    svc.cancel();
                }
            });
            let pb = progress_bar()?;
            let bar = pb.clone();
            let on_progress = Arc::new(move |p: Progress| {
                bar.set_length(p.files_total as u64);
                bar.set_position(p.files_done as u64);
                bar.set_message(format!("{} ({} chunks)", p.state, p.chunks_written));
            });
            let report = service.index_corpus_with_progress(&args.scope(), on_progress).await?;
            pb.finish_and_clear();

            println!("{} Indexing {}", if report.cancelled { "⚠️ " } else { "✅" }, if report.cancelled { "cancelled" } else { "completed" });
            println!("📂 Files: {} scanned, {} processed, {} unchanged, {} removed, {} skipped",
                report.files_scanned, report.files_processed, report.files_unchanged, report.files_removed, report.files_skipped);
            println!("📦 Chunks: {} created, {} reused, {} removed", report.chunks_created, report.chunks_reused, report.chunks_removed);
            println!("⏱  {} ms", report.duration_ms);
            for e in &report.errors { println!("  ❌ {}: {}", e.path, e.message); }
        }
        "search" => {
            if args.positional.is_empty() { bail!("search needs a query\n\n{USAGE}"); }
            let query = args.positional.join(" ");
            let top_k = args.top_k.unwrap_or(10);
            let response = service.search(&query, &args.filters(), top_k).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&response)?);
                return Ok(());
            }
            println!("🔍 Found {} results for: \"{}\"", response.results.len(), query);
            if let Some(d) = &response.degraded { println!("⚠️  Degraded search: {d:?}"); }
            for (i, r) in response.results.iter().enumerate() {
                let fmt_raw = |s: Option<f32>| s.map_or_else(|| "-".to_string(), |v| format!("{v:.4}"));
                println!("\n  {}. score={:.4}  keyword={}  vector={}  id={}", i + 1, r.score, fmt_raw(r.keyword_raw), fmt_raw(r.vector_raw), r.id);
                println!("     📄 {}  [{} / {} / {}]", r.metadata.source_path, r.metadata.technology, r.metadata.component, r.metadata.topic);
                let snippet: String = r.text.split_whitespace().collect::<Vec<_>>().join(" ").chars().take(200).collect();
                println!("     📝 {}", snippet);
            }
        }
        "stats" => {
            let stats = service.stats().await;
            let fmt_count = |c: Option<usize>| c.map_or_else(|| "unavailable".to_string(), |n| n.to_string());
            println!("📊 corpusdb stats\n================");
            println!("State: {}", stats.state);
            println!("Files: {}  Chunks: {}", stats.files, stats.chunks);
            println!("Keyword docs: {}  Vector rows: {}", fmt_count(stats.keyword_docs), fmt_count(stats.vector_rows));
            println!("Consistent: {}", if stats.is_consistent() { "yes" } else { "no" });
            if let Some(at) = stats.last_indexed_at { println!("Last indexed: {}", at.to_rfc3339()); }
            for (tech, files) in &stats.technologies { println!("  {}: {} files", tech, files); }
        }
        "sources" => {
            let sources = service.list_sources(&args.filters());
            for s in &sources {
                println!("{}  chunks={}  tech={}  component={}  indexed={}", s.path, s.chunks, s.metadata.technology, s.metadata.component, s.indexed_at.to_rfc3339());
            }
            println!("\n{} sources", sources.len());
        }
        "clear" => {
            let report = service.clear(&args.scope()).await?;
            println!("🧹 Cleared {} files ({} chunks)", report.files_removed, report.chunks_removed);
        }
        other => bail!("unknown command {other:?}\n\n{USAGE}"),
    }
    Ok(())
}
