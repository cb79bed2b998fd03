use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use console::{Emoji, Term};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use podkeep::{
    AddOutcome, App, Config, DEFAULT_CONFIG_FILE, Location, NoopReporter, ProgressEvent,
    ProgressReporter, SharedProgressReporter,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "[*] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static WARNING: Emoji<'_, '_> = Emoji("⚠️  ", "[?] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static COPY: Emoji<'_, '_> = Emoji("📋 ", "[>] ");
static TRASH: Emoji<'_, '_> = Emoji("🗑️  ", "[-] ");
static EJECT: Emoji<'_, '_> = Emoji("⏏️  ", "[^] ");

const SUMMARY_INDENT: &str = "    ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ListWhat {
    /// Episodes not yet synced
    New,
    /// Subscribed podcasts
    Pod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SyncWhat {
    /// Episodes not yet synced
    New,
}

/// Track podcast feeds, download new episodes and sync them to a player
///
/// Operations run in a fixed order: add, refresh, download, list, sync,
/// delete, delete-old, eject, mark-old.
#[derive(Parser, Debug)]
#[command(name = "podkeep")]
#[command(version)]
struct Args {
    /// Subscribe to the podcast at this feed URL
    #[arg(short = 'a', long = "add", value_name = "URL")]
    add: Option<String>,

    /// Check every subscribed feed for new episodes
    #[arg(short = 'r', long)]
    refresh: bool,

    /// Download every new episode
    #[arg(short = 'd', long)]
    download: bool,

    /// List new episodes, or subscribed podcasts with `pod`
    #[arg(short = 'l', long, value_enum, num_args = 0..=1, default_missing_value = "new")]
    list: Option<ListWhat>,

    /// Copy new downloaded episodes to the player
    #[arg(short = 's', long, value_enum, num_args = 0..=1, default_missing_value = "new")]
    sync: Option<SyncWhat>,

    /// Unsubscribe from a podcast by id, removing its episodes
    #[arg(long, value_name = "ID")]
    delete: Option<i64>,

    /// Delete old media files locally or on the player
    #[arg(long, value_enum, num_args = 0..=1, default_missing_value = "local")]
    delete_old: Option<Location>,

    /// Unmount the player
    #[arg(short = 'e', long)]
    eject: bool,

    /// Stop treating episodes older than DAYS as new
    #[arg(long, value_name = "DAYS", num_args = 0..=1, default_missing_value = "7")]
    mark_old: Option<u32>,

    /// Restrict --mark-old to one podcast
    #[arg(long, value_name = "ID", requires = "mark_old")]
    mark_old_podcast: Option<i64>,

    /// Path to the JSON config file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Maximum number of concurrent downloads (defaults to the config value)
    #[arg(short = 'c', long)]
    concurrent: Option<usize>,

    /// Quiet mode - suppress progress output
    #[arg(short, long)]
    quiet: bool,

    /// Log debug details to stderr
    #[arg(short, long)]
    verbose: bool,
}

/// Progress reporter using indicatif for terminal output
///
/// When indicatif draws nothing (stderr is not a terminal) the lines go to
/// `plain` instead, so cron runs and redirects still see every diagnostic.
struct IndicatifReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<usize, ProgressBar>>,
    main_bar: ProgressBar,
    width: usize,
    plain: Mutex<Box<dyn Write + Send>>,
}

impl IndicatifReporter {
    fn new() -> Result<Self> {
        Self::with_output(MultiProgress::new(), Box::new(std::io::stdout()))
    }

    fn with_output(multi: MultiProgress, plain: Box<dyn Write + Send>) -> Result<Self> {

        let main_style = ProgressStyle::default_bar()
            .template("{spinner:.green} {wide_msg}")
            .context("invalid progress template")?;

        let main_bar = multi.add(ProgressBar::new_spinner());
        main_bar.set_style(main_style);
        main_bar.enable_steady_tick(std::time::Duration::from_millis(100));

        let width = Term::stdout()
            .size_checked()
            .map(|(_, cols)| usize::from(cols))
            .unwrap_or(80);

        Ok(Self {
            multi,
            bars: Mutex::new(HashMap::new()),
            main_bar,
            width,
            plain: Mutex::new(plain),
        })
    }

    fn line(&self, message: String) {
        if !self.multi.is_hidden() {
            let _ = self.multi.println(message);
        } else if let Ok(mut out) = self.plain.lock() {
            let _ = writeln!(out, "{message}");
        }
    }

    fn get_or_create_bar(&self, download_id: usize) -> ProgressBar {
        let Ok(mut bars) = self.bars.lock() else {
            return ProgressBar::hidden();
        };

        if let Some(bar) = bars.get(&download_id) {
            return bar.clone();
        }

        let bar = self.multi.add(ProgressBar::new(0));
        if let Ok(style) = ProgressStyle::default_bar().template(&format!(
            "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
        )) {
            bar.set_style(style.progress_chars("█▓░"));
        }
        bars.insert(download_id, bar.clone());
        bar
    }

    fn finish_bar(&self, download_id: usize) {
        if let Ok(mut bars) = self.bars.lock()
            && let Some(bar) = bars.remove(&download_id)
        {
            bar.finish_and_clear();
        }
    }

    fn finish(&self) {
        self.main_bar.finish_and_clear();
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::FetchingFeed { podcast_title } => {
                self.main_bar
                    .set_message(format!("{SEARCH}Fetching feed: {}", podcast_title.cyan()));
            }

            ProgressEvent::FeedFailed {
                podcast_title,
                error,
            } => {
                self.line(format!(
                    "{FAILURE}{} - {}",
                    podcast_title.red().bold(),
                    error.red()
                ));
            }

            ProgressEvent::EntrySkipped {
                podcast_title,
                entry_title,
            } => {
                self.line(format!(
                    "{WARNING}{} has no link, skipping ({})",
                    entry_title.yellow(),
                    podcast_title.dimmed()
                ));
            }

            ProgressEvent::NewEpisode {
                podcast_title,
                episode_title,
                published,
                summary,
            } => {
                self.line(format!(
                    "{SPARKLE}{} {} -- {} {}",
                    "New Episode:".bold().green(),
                    podcast_title.cyan(),
                    episode_title.bold(),
                    published.format("%d/%m/%Y").to_string().dimmed()
                ));
                if let Some(summary) = summary {
                    self.line(wrap_summary(&summary, self.width));
                }
                self.line(String::new());
            }

            ProgressEvent::RefreshCompleted {
                podcast_count,
                new_episodes,
                failed_count,
            } => {
                self.main_bar.set_message("");
                self.line(format!(
                    "{PARTY}{} {} podcasts, {} new episodes, {} failed",
                    "Refresh complete:".bold().green(),
                    podcast_count.to_string().cyan(),
                    new_episodes.to_string().green().bold(),
                    colored_count(failed_count)
                ));
            }

            ProgressEvent::DownloadStarting {
                download_id,
                episode_title,
                episode_index,
                total_to_download,
                content_length,
            } => {
                let bar = self.get_or_create_bar(download_id);
                bar.set_length(content_length.unwrap_or(0));
                bar.set_position(0);
                bar.set_message(format!(
                    "[{}/{}] {}",
                    (episode_index + 1).to_string().cyan(),
                    total_to_download.to_string().cyan(),
                    truncate_title(&episode_title, 40)
                ));
            }

            ProgressEvent::DownloadProgress {
                download_id,
                bytes_downloaded,
                total_bytes,
            } => {
                let bar = self.get_or_create_bar(download_id);
                if let Some(total) = total_bytes {
                    bar.set_length(total);
                }
                bar.set_position(bytes_downloaded);
            }

            ProgressEvent::DownloadCompleted {
                download_id,
                episode_title,
                bytes_downloaded,
            } => {
                let bar = self.get_or_create_bar(download_id);
                bar.set_position(bytes_downloaded);
                self.finish_bar(download_id);
                self.line(format!(
                    "{SUCCESS}{}",
                    truncate_title(&episode_title, 60).green()
                ));
            }

            ProgressEvent::DownloadFailed {
                download_id,
                episode_title,
                error,
            } => {
                self.finish_bar(download_id);
                self.line(format!(
                    "{FAILURE}{} - {}",
                    truncate_title(&episode_title, 30).red(),
                    error.red()
                ));
            }

            ProgressEvent::AlreadyDownloaded { episode_title } => {
                self.line(format!(
                    "  {} {}",
                    "already downloaded:".dimmed(),
                    truncate_title(&episode_title, 50).dimmed()
                ));
            }

            ProgressEvent::TagFailed {
                episode_title,
                error,
            } => {
                self.line(format!(
                    "{WARNING}could not tag {} - {}",
                    truncate_title(&episode_title, 30).yellow(),
                    error.yellow()
                ));
            }

            ProgressEvent::DownloadsCompleted {
                downloaded_count,
                skipped_count,
                failed_count,
            } => {
                self.line(format!(
                    "\n{PARTY}{} {} downloaded, {} skipped, {} failed",
                    "Download complete:".bold().green(),
                    downloaded_count.to_string().green().bold(),
                    skipped_count.to_string().yellow(),
                    colored_count(failed_count)
                ));
            }

            ProgressEvent::NotDownloadedYet { file_name } => {
                self.line(format!(
                    "{WARNING}Haven't downloaded {} yet.",
                    file_name.yellow()
                ));
            }

            ProgressEvent::Copying {
                episode_title,
                destination,
            } => {
                self.line(format!(
                    "{COPY}Copying: {} {}",
                    episode_title.bold(),
                    format!("-> {}", destination.display()).dimmed()
                ));
            }

            ProgressEvent::CopyFailed {
                episode_title,
                error,
            } => {
                self.line(format!("{FAILURE}{} - {}", episode_title.red(), error.red()));
            }

            ProgressEvent::SyncCompleted {
                copied_count,
                skipped_count,
                failed_count,
            } => {
                self.line(format!(
                    "\n{PARTY}{} {} copied, {} not downloaded, {} failed",
                    "Sync complete:".bold().green(),
                    copied_count.to_string().green().bold(),
                    skipped_count.to_string().yellow(),
                    colored_count(failed_count)
                ));
            }

            ProgressEvent::MarkedOld { episode_title } => {
                self.line(format!("Marking old: {}", episode_title.dimmed()));
            }

            ProgressEvent::FileRemoved { path } => {
                self.line(format!("{TRASH}removing {}", path.display()));
            }

            ProgressEvent::RemoveFailed { path, error } => {
                self.line(format!(
                    "{FAILURE}could not remove {} - {}",
                    path.display(),
                    error.red()
                ));
            }

            ProgressEvent::UnmountRetry { attempt, error } => {
                self.main_bar.set_message(format!(
                    "{EJECT}unmount attempt {} failed ({}), retrying",
                    attempt.to_string().yellow(),
                    error.dimmed()
                ));
            }

            ProgressEvent::Ejected { point } => {
                self.line(format!(
                    "{EJECT}Ejected {}",
                    point.display().to_string().cyan()
                ));
            }
        }
    }
}

fn colored_count(count: usize) -> colored::ColoredString {
    if count > 0 {
        count.to_string().red().bold()
    } else {
        count.to_string().green()
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    console::truncate_str(title, max_len, "...").into_owned()
}

/// Word-wrap a summary to the terminal width, indenting every line
fn wrap_summary(summary: &str, width: usize) -> String {
    let available = width.saturating_sub(SUMMARY_INDENT.len()).max(20);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in summary.split_whitespace() {
        let needed = console::measure_text_width(&current)
            + usize::from(!current.is_empty())
            + console::measure_text_width(word);

        if !current.is_empty() && needed > available {
            lines.push(format!("{SUMMARY_INDENT}{current}"));
            current.clear();
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(format!("{SUMMARY_INDENT}{current}"));
    }

    lines.join("\n")
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if !args.quiet {
        println!(
            "\n{}{} {}\n",
            MICROPHONE,
            "podkeep".bold().magenta(),
            "- Podcast Aggregator".dimmed()
        );
    }

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    let max_concurrent = args.concurrent.unwrap_or(config.max_concurrent);

    let indicatif = if args.quiet {
        None
    } else {
        Some(Arc::new(IndicatifReporter::new()?))
    };
    let reporter: SharedProgressReporter = match &indicatif {
        Some(reporter) => reporter.clone() as SharedProgressReporter,
        None => NoopReporter::shared(),
    };

    let app = App::from_config(config, reporter)
        .context("Failed to start")?
        .keep_file(&args.config);
    let result = run(&app, &args, max_concurrent).await;

    if let Some(reporter) = &indicatif {
        reporter.finish();
    }

    if !result? {
        std::process::exit(1);
    }

    Ok(())
}

/// Run the requested operations in order; `Ok(false)` when every download failed
async fn run(app: &App, args: &Args, max_concurrent: usize) -> Result<bool> {
    let mut succeeded = true;

    if let Some(url) = &args.add {
        let (outcome, podcasts) = app
            .add_podcast(url)
            .await
            .context("Failed to add podcast")?;
        if let AddOutcome::AlreadyExists(_) = outcome {
            println!("{}", "Podcast already exists.".yellow());
        }
        for podcast in podcasts {
            println!("{} {}", podcast.title.bold(), podcast.feed.dimmed());
        }
    }

    if args.refresh {
        app.refresh().await.context("Failed to refresh podcasts")?;
    }

    if args.download {
        let summary = app
            .download(max_concurrent)
            .await
            .context("Failed to download episodes")?;
        if summary.failed() > 0 && summary.downloaded() == 0 {
            succeeded = false;
        }
    }

    match args.list {
        Some(ListWhat::New) => {
            for (podcast_title, episode) in app.list_new().context("Failed to list episodes")? {
                println!(
                    "{} New Ep: {} -- {} {}",
                    episode.id.to_string().cyan(),
                    podcast_title.dimmed(),
                    episode.title.bold(),
                    episode.published.format("%d/%m/%Y")
                );
                if let Some(summary) = &episode.summary {
                    let width = Term::stdout()
                        .size_checked()
                        .map(|(_, cols)| usize::from(cols))
                        .unwrap_or(80);
                    println!("{}", wrap_summary(summary, width));
                }
                println!();
            }
        }
        Some(ListWhat::Pod) => {
            for podcast in app.list_podcasts().context("Failed to list podcasts")? {
                println!("{} {}", podcast.id.to_string().cyan(), podcast.title);
            }
        }
        None => {}
    }

    if args.sync.is_some() {
        app.sync().context("Failed to sync episodes")?;
    }

    if let Some(id) = args.delete {
        let podcast = app.delete_podcast(id).context("Failed to delete podcast")?;
        println!("Deleted {}", podcast.title.bold());
    }

    if let Some(location) = args.delete_old {
        app.delete_old(location, SystemTime::now())
            .context("Failed to delete old files")?;
    }

    if args.eject {
        app.eject().await.context("Failed to eject player")?;
    }

    if let Some(days) = args.mark_old {
        app.mark_old(days, args.mark_old_podcast)
            .context("Failed to mark episodes old")?;
    }

    Ok(succeeded)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Collects everything written to it
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn diagnostics_survive_without_terminal() {
        colored::control::set_override(false);
        let captured = Captured::default();
        let reporter = IndicatifReporter::with_output(
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
            Box::new(captured.clone()),
        )
        .unwrap();

        reporter.report(ProgressEvent::NotDownloadedYet {
            file_name: "missing.mp3".to_string(),
        });
        reporter.report(ProgressEvent::SyncCompleted {
            copied_count: 0,
            skipped_count: 1,
            failed_count: 0,
        });
        reporter.finish();

        let text = captured.text();
        assert!(text.contains("Haven't downloaded missing.mp3 yet."));
        assert!(text.contains("Sync complete:"));
        assert!(text.contains("1 not downloaded"));
    }

    #[test]
    fn optional_values_use_defaults() {
        let args = Args::parse_from(["podkeep", "-l", "--delete-old", "--mark-old"]);
        assert_eq!(args.list, Some(ListWhat::New));
        assert_eq!(args.delete_old, Some(Location::Local));
        assert_eq!(args.mark_old, Some(7));
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn explicit_values_are_parsed() {
        let args = Args::parse_from([
            "podkeep",
            "--list",
            "pod",
            "--delete-old",
            "player",
            "--mark-old",
            "30",
            "--mark-old-podcast",
            "4",
        ]);
        assert_eq!(args.list, Some(ListWhat::Pod));
        assert_eq!(args.delete_old, Some(Location::Player));
        assert_eq!(args.mark_old, Some(30));
        assert_eq!(args.mark_old_podcast, Some(4));
    }

    #[test]
    fn mark_old_podcast_requires_mark_old() {
        assert!(Args::try_parse_from(["podkeep", "--mark-old-podcast", "4"]).is_err());
    }

    #[test]
    fn summaries_wrap_with_indent() {
        let wrapped = wrap_summary("one two three four five six seven eight", 24);
        for line in wrapped.lines() {
            assert!(line.starts_with(SUMMARY_INDENT));
            assert!(line.len() <= 24);
        }
        assert_eq!(
            wrapped.split_whitespace().collect::<Vec<_>>().join(" "),
            "one two three four five six seven eight"
        );
    }
}
