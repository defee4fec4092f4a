use anyhow::{Context, bail};
use clap::ArgMatches;
use colored::Colorize;
use pagehound_core::report::{ReportFormat, category_counts, save_report, total_defects, total_pages};
use pagehound_core::request::interpret_instructions;
use pagehound_core::scan::{ScanOptions, ScanOutcome, execute_scan};
use pagehound_scanner::{DetectorConfig, RendererConfig, ScanConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Load URLs from either a file or a single URL argument
pub fn load_urls_from_source(
    url: Option<&Url>,
    hosts_file: Option<&PathBuf>,
) -> Result<Vec<String>, String> {
    if let Some(hosts_file_path) = hosts_file {
        load_urls_from_file(hosts_file_path)
    } else if let Some(url) = url {
        Ok(vec![url.as_str().to_string()])
    } else {
        Err("Either --url or --hosts-file must be provided".to_string())
    }
}

/// Load seed URLs from a file, one per line. Blank lines and lines starting
/// with `#` are ignored; a leading `~` in the path is expanded.
pub fn load_urls_from_file(path: &Path) -> Result<Vec<String>, String> {
    let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
    let content = fs::read_to_string(&expanded)
        .map_err(|e| format!("Failed to read hosts file {}: {}", path.display(), e))?;

    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_url_line)
        .collect();

    if urls.is_empty() {
        return Err(format!("No valid URLs found in {}", path.display()));
    }

    Ok(urls)
}

/// Parse a single line as a URL, trying to add https:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    if let Ok(url) = Url::parse(line)
        && url.has_host()
    {
        return Some(line.to_string());
    }

    let with_scheme = format!("https://{}", line);
    if Url::parse(&with_scheme).is_ok() {
        return Some(with_scheme);
    }

    eprintln!("⚠️  Skipping invalid URL '{}'", line);
    None
}

/// Detectors to run: instructions first, then the explicit opt-outs.
pub fn detector_config_from_args(args: &ArgMatches) -> DetectorConfig {
    let mut detectors = args
        .get_one::<String>("instructions")
        .map(|text| interpret_instructions(text))
        .unwrap_or_default();

    if args.get_flag("no-images") {
        detectors.check_images = false;
    }
    if args.get_flag("no-buttons") {
        detectors.check_buttons = false;
    }
    detectors
}

pub fn scan_config_from_args(args: &ArgMatches) -> ScanConfig {
    let mut config = ScanConfig::default().with_detectors(detector_config_from_args(args));

    if let Some(max_pages) = args.get_one::<usize>("max-pages") {
        config = config.with_max_pages(*max_pages);
    }
    if let Some(max_depth) = args.get_one::<usize>("max-depth") {
        config = config.with_max_depth(*max_depth);
    }
    if let Some(timeout) = args.get_one::<u64>("timeout") {
        config = config.with_nav_timeout(Duration::from_secs(*timeout));
    }
    if let Some(settle) = args.get_one::<u64>("settle-ms") {
        config = config.with_settle(Duration::from_millis(*settle));
    }
    config.with_explore_error_pages(!args.get_flag("stop-on-http-error"))
}

pub fn renderer_config_from_args(args: &ArgMatches) -> RendererConfig {
    let mut renderer = RendererConfig::default();
    if args.get_flag("headful") {
        renderer = renderer.visible();
    }
    if let Some(path) = args.get_one::<String>("chrome-path") {
        renderer = renderer.with_chrome_path(path.as_str());
    }
    renderer
}

pub fn report_format_from_args(args: &ArgMatches) -> ReportFormat {
    args.get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text)
}

/// Install the log subscriber. `RUST_LOG` wins over `--verbose`.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub async fn handle_scan(sub_matches: &ArgMatches, quiet: bool) -> anyhow::Result<()> {
    init_tracing(sub_matches.get_flag("verbose"));

    let url = sub_matches.get_one::<Url>("url");
    let hosts_file = sub_matches.get_one::<PathBuf>("hosts-file");
    let urls = load_urls_from_source(url, hosts_file).map_err(anyhow::Error::msg)?;

    let config = scan_config_from_args(sub_matches);
    let format = report_format_from_args(sub_matches);
    debug!("Scan configuration: {:?}", config);

    if !quiet {
        print_scan_plan(&urls, &config);
    }

    let options = ScanOptions {
        urls,
        config,
        renderer: renderer_config_from_args(sub_matches),
        show_progress_bars: !quiet,
    };

    let progress_callback = Arc::new(move |msg: String| {
        if !quiet {
            println!("{}", msg);
        }
    });

    let outcomes = execute_scan(options, Some(progress_callback), None)
        .await
        .context("Scan failed")?;

    let report = format
        .render(&outcomes)
        .context("Failed to render report")?;

    match sub_matches.get_one::<PathBuf>("output") {
        Some(path) => {
            save_report(&report, path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            if !quiet {
                print_summary(&outcomes);
            }
            println!(
                "{} Report saved to {}",
                "✓".green().bold(),
                path.display().to_string().bright_white()
            );
        }
        None => print!("{}", report),
    }

    if outcomes.iter().all(ScanOutcome::is_failed) {
        bail!("No seed URL could be scanned");
    }
    Ok(())
}

fn print_scan_plan(urls: &[String], config: &ScanConfig) {
    println!("\n🔎 Scanning {} site(s)", urls.len());
    println!("Page budget: {} per site", config.max_pages);
    println!("Max depth: {}", config.max_depth);
    let mut checks = vec!["console errors", "page errors", "failed requests"];
    if config.detectors.check_images {
        checks.insert(0, "images");
    }
    if config.detectors.check_buttons {
        checks.insert(0, "buttons");
    }
    println!("Checks: {}\n", checks.join(", "));
}

fn print_summary(outcomes: &[ScanOutcome]) {
    let defects = total_defects(outcomes);
    let pages = total_pages(outcomes);
    if defects == 0 {
        println!(
            "\n{} No defects found across {} page(s)",
            "✓".green().bold(),
            pages
        );
        return;
    }

    println!(
        "\n{} {} defect(s) across {} page(s)",
        "⚠".yellow().bold(),
        defects.to_string().bright_white(),
        pages
    );
    for (category, count) in category_counts(outcomes) {
        println!("  {} {:<24} {}", "•".yellow(), category.label(), count);
    }
}
