//! CLI entry point for fetchbind.

use std::io::Write;
use std::path::Path;

use anyhow::{Context as _, Result, bail};
use clap::Parser;
use fetchbind::request::header::{self, HeaderOption};
use fetchbind::response::{Charset, Decompress, Dump, ErrorForStatus, Progress};
use fetchbind::{Context, FieldRule, Params, Request, RetryPolicy, cookie_add_str};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, info, warn};

mod cli;

use cli::{Args, split_header, split_pair};

/// A rules file holds either one rule or the list of top-level fields.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RulesFile {
    Fields(Vec<FieldRule>),
    Rule(FieldRule),
}

impl RulesFile {
    fn into_rule(self) -> FieldRule {
        match self {
            Self::Fields(fields) => FieldRule::default().fields(fields),
            Self::Rule(rule) => rule,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (warn)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let mut ctx = Context::background();
    if let Some(timeout) = args.timeout {
        let Some(timeout) = timeout.to_std() else {
            bail!("timeout must not be negative: {timeout}");
        };
        ctx = ctx.with_timeout(timeout);
    }
    spawn_interrupt_handler(ctx.clone());

    let request = build_request(&args, ctx)?;

    if let Some(output) = &args.output {
        let saved = download(request, output, args.overwrite, args.quiet).await?;
        info!(path = %saved.display(), "saved");
        if !args.quiet {
            println!("{}", saved.display());
        }
        return Ok(());
    }

    let root = args.select.clone().unwrap_or_default();
    if let Some(rules_path) = &args.rules {
        let rule = load_rules(rules_path)?;
        let params: Params = args
            .params
            .iter()
            .map(|raw| {
                let (key, value) = split_pair(raw);
                (key.to_string(), value.to_string())
            })
            .collect();
        let value = request.html_bind_rules(&root, &rule, &params).await?;
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else if !root.is_empty() {
        let selector = scraper::Selector::parse(&root)
            .map_err(|e| anyhow::anyhow!("invalid selector {root:?}: {e}"))?;
        let mut lines = Vec::new();
        request
            .html_query(|doc| {
                lines.extend(doc.find(&selector).iter().map(|node| node.text()));
                Ok(())
            })
            .await?;
        let mut stdout = std::io::stdout().lock();
        for line in lines {
            writeln!(stdout, "{}", line.trim())?;
        }
    } else {
        print!("{}", request.text().await?);
    }

    Ok(())
}

fn build_request(args: &Args, ctx: Context) -> Result<Request> {
    let method = Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid method {:?}", args.method))?;

    let mut request = if args.browser {
        Request::browser(ctx)
    } else {
        Request::default_preset(ctx).retry_policy(&RetryPolicy::with_max_attempts(
            u32::from(args.retries) + 1,
        ))
    };
    request = request.method(method).url(args.url.as_str());

    if let Some(query) = &args.query {
        request = request.query(query.as_str());
    }
    if !args.form.is_empty() {
        request = request.form_values(args.form.iter().map(|raw| split_pair(raw)));
    }

    let mut headers: Vec<HeaderOption> = vec![header::default_encodings()];
    for raw in &args.headers {
        match split_header(raw) {
            Some((name, value)) => headers.push(header::header_set(name, [value])),
            None => warn!(header = %raw, "ignoring header without ':'"),
        }
    }
    if !args.cookies.is_empty() {
        headers.push(cookie_add_str(args.cookies.iter().cloned()));
    }

    request = request.header_with(headers);
    if args.dump {
        request = request.process_with(Dump::stderr());
    }
    Ok(request
        .process_with(ErrorForStatus)
        .process_with(Decompress)
        .process_with(Charset::new(args.charset.as_str())))
}

fn load_rules(path: &Path) -> Result<FieldRule> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read rules file {}", path.display()))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let rules: RulesFile = if is_json {
        serde_json::from_str(&text)
            .with_context(|| format!("invalid JSON rules in {}", path.display()))?
    } else {
        serde_yaml::from_str(&text)
            .with_context(|| format!("invalid YAML rules in {}", path.display()))?
    };
    Ok(rules.into_rule())
}

async fn download(
    request: Request,
    output: &Path,
    overwrite: bool,
    quiet: bool,
) -> Result<std::path::PathBuf> {
    if quiet {
        return Ok(request.download(output, overwrite).await?);
    }

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner} {bytes}/{total_bytes} ({bytes_per_sec}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_message(output.display().to_string());
    let progress_bar = bar.clone();
    let saved = request
        .process_with(Progress::new(move |update| {
            if let Some(total) = update.total {
                progress_bar.set_length(total);
            }
            progress_bar.set_position(update.read);
        }))
        .download(output, overwrite)
        .await;
    bar.finish_and_clear();
    Ok(saved?)
}

fn spawn_interrupt_handler(ctx: Context) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling request");
            ctx.cancel();
        }
    });
}
