// ┌─┐┌─┐┬ ┬┌─┐┬  ┌─┐┬─┐┌─┐┌┬┐┬─┐┌─┐┌─┐┌┬┐
// └─┐│  ├─┤│ ││  ├─┤├┬┘└─┐ │ ├┬┘├┤ ├─┤│││
// └─┘└─┘┴ ┴└─┘┴─┘┴ ┴┴└─└─┘ ┴ ┴└─└─┘┴ ┴┴ ┴

// Streaming research paper search: a query goes to a generative backend with
// web-search grounding, results stream back one JSON record per line and are
// rendered, filtered, and exported as they arrive.

mod backend;
mod cache;
mod export;
mod model;
mod orchestrator;
mod parser;
mod projection;
mod web;

use anyhow::{bail, Result};
use backend::Backend;
use clap::Parser;
use model::TARGET_RESULTS;
use orchestrator::Searcher;
use projection::{SortKey, YearWindow};
use std::time::Duration;

// CL arguments for config
#[derive(Parser, Debug)]
#[command(author, version, about = "Streaming AI research paper search", long_about = None)]
struct Args {
    /// Run a single search from the terminal instead of serving the web UI
    #[arg(short, long)]
    query: Option<String>,

    /// Stream source: "gemini" (web-search grounded) or "ollama" (local)
    #[arg(short, long, default_value = "gemini")]
    backend: String,

    #[arg(short, long, default_value = "gemini-2.5-flash")]
    model: String,

    #[arg(long, env = "GEMINI_API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,

    #[arg(long, default_value = "https://generativelanguage.googleapis.com")]
    gemini_url: String,

    #[arg(long, default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Disable web-search grounding (Gemini only)
    #[arg(long, default_value_t = false)]
    no_web_search: bool,

    /// Seconds without a stream chunk before a search is abandoned
    #[arg(long, default_value = "60")]
    stall_timeout: u64,

    #[arg(short, long, default_value = "6601")]
    port: u16,

    /// CSV output path for --query mode; derived from the query when empty
    #[arg(short, long, default_value = "")]
    output: String,

    /// Sort order for --query mode output: relevance_desc, year_desc,
    /// year_asc, citations_desc
    #[arg(long, default_value = "relevance_desc")]
    sort: String,

    /// Publication year window for --query mode output: "all" or a number
    /// of years back
    #[arg(long, default_value = "all")]
    years: String,

    /// Journal name filter for --query mode output
    #[arg(long, default_value = "")]
    journal: String,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

impl Args {
    fn build_backend(&self) -> Result<Backend> {
        match self.backend.as_str() {
            "gemini" => Backend::gemini(
                self.gemini_url.clone(),
                self.api_key.clone(),
                self.model.clone(),
                !self.no_web_search,
            ),
            "ollama" => Ok(Backend::ollama(
                self.ollama_url.clone(),
                self.model.clone(),
            )),
            other => bail!("unknown backend '{}', expected gemini or ollama", other),
        }
    }

    fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout.max(1))
    }
}

async fn run_query(args: &Args, query: &str) -> Result<()> {
    let backend = args.build_backend()?;

    println!("{}", "=".repeat(64));
    println!("   ScholarStream: streaming research paper search");
    println!("{}", "=".repeat(64));
    println!("\nQuery: {}", query);
    println!("Backend: {}", backend.describe());
    println!("Target results: {}\n", TARGET_RESULTS);

    let searcher = Searcher::new(backend, args.stall_timeout());
    let mut papers = Vec::new();
    let verbose = args.verbose;

    let outcome = searcher
        .search(query, |paper| {
            println!("{}", "=".repeat(64));
            println!("URL: {}", paper.url);
            println!(
                "Score: {}/100 ({})",
                paper.relevance_score,
                paper.relevance_tag.label()
            );
            if !paper.reasoning.is_empty() {
                println!("Reason: {}", paper.reasoning);
            }
            if verbose {
                println!("Citation: {}", export::citation(&paper));
            }
            papers.push(paper);
        })
        .await;

    match outcome {
        Ok(summary) => {
            if summary.dropped > 0 {
                println!("\nMalformed lines dropped: {}", summary.dropped);
            }
        }
        Err(e) if papers.is_empty() => return Err(e.into()),
        Err(e) => {
            // Records already streamed in stay usable.
            println!("\nSearch ended early: {}", e);
        }
    }

    let display = projection::project_now(
        &papers,
        YearWindow::parse(&args.years),
        &args.journal,
        SortKey::parse(&args.sort),
    );

    let path = if args.output.is_empty() {
        export::csv_filename(query)
    } else {
        args.output.clone()
    };
    std::fs::write(&path, export::to_csv(&display))?;

    println!("\n{}", "=".repeat(64));
    println!("Results");
    println!("{}", "=".repeat(64));
    println!("Total received: {}", papers.len());
    println!("After filters: {}", display.len());
    println!("Saved to: {}\n", path);

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    match args.query.clone() {
        Some(query) => run_query(&args, &query).await,
        None => {
            let backend = args.build_backend()?;
            web::start_web_server(args.port, backend, args.stall_timeout()).await;
            Ok(())
        }
    }
}
