//! logscan - Incremental line indexing for large log files
//!
//! Indexes a file, prints its statistics and the lines matching the given
//! patterns, and optionally keeps following the file as it grows.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use logscan::indexing::IndexingEvent;
use logscan::{
    ChangeStatus, CompiledExpression, FilteredLines, IndexingConfig, IndexingWorker, LineIndex,
    LoadingStatus, Pattern, TextEncoding,
};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging for development
    env_logger::init();

    let matches = Command::new("logscan")
        .version(logscan::VERSION)
        .about("Index a large log file and filter its lines")
        .long_about(
            "logscan builds a line index of a log file in blocks, reports its line count, \
             longest line and encoding, prints the lines matching the given patterns and \
             can follow the file as it grows or gets rotated.",
        )
        .arg(
            Arg::new("file")
                .help("Path to the log file to index")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("regexp")
                .short('e')
                .long("regexp")
                .value_name("PATTERN")
                .help("Print lines matching PATTERN (all given patterns must match)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("exclude")
                .short('x')
                .long("exclude")
                .value_name("PATTERN")
                .help("Skip lines matching PATTERN")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("ignore-case")
                .short('i')
                .long("ignore-case")
                .help("Match patterns case-insensitively")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("encoding")
                .long("encoding")
                .value_name("ENC")
                .help("Force the file encoding (utf-8, utf-16le, utf-16be, latin1)"),
        )
        .arg(
            Arg::new("follow")
                .short('f')
                .long("follow")
                .help("Keep watching the file for appended data")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("interval-ms")
                .long("interval-ms")
                .value_name("N")
                .help("Polling interval for --follow, in milliseconds")
                .value_parser(clap::value_parser!(u64).range(1..))
                .default_value("1000"),
        )
        .get_matches();

    let file_path = PathBuf::from(
        matches
            .get_one::<String>("file")
            .context("file argument is required")?,
    );
    let forced_encoding = matches
        .get_one::<String>("encoding")
        .map(|name| name.parse::<TextEncoding>())
        .transpose()
        .map_err(anyhow::Error::msg)?;
    let patterns = patterns_from_args(&matches);
    let config = load_config()?;

    let index = Arc::new(LineIndex::new());
    let (worker, mut events) = IndexingWorker::new(Arc::clone(&index), config.clone())?;
    worker.attach(&file_path);

    worker.index_all(forced_encoding).await?;
    let status = wait_for_finished(&mut events).await?;
    if status != LoadingStatus::Successful {
        anyhow::bail!("Indexing {} failed: {status:?}", file_path.display());
    }
    print_statistics(&index);

    let mut filtered = if patterns.is_empty() {
        None
    } else {
        let expression = CompiledExpression::compile_all(&patterns)?;
        Some(FilteredLines::new(
            &file_path,
            Arc::clone(&index),
            expression,
            config.search_chunk_lines,
        ))
    };
    if let Some(filtered) = filtered.as_mut() {
        search_and_print(&file_path, &index, filtered)?;
        eprintln!("{} matching line(s)", filtered.match_count());
    }

    if !matches.get_flag("follow") {
        return Ok(());
    }

    let interval = Duration::from_millis(*matches.get_one::<u64>("interval-ms").unwrap_or(&1000));
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {}
        }

        worker.check_file_changes().await?;
        match wait_for_check(&mut events).await? {
            Some(ChangeStatus::DataAdded) => {
                worker.index_additional_lines().await?;
                wait_for_finished(&mut events).await?;
            }
            Some(ChangeStatus::Truncated) => {
                eprintln!("{} was truncated, indexing again", file_path.display());
                worker.index_all(forced_encoding).await?;
                wait_for_finished(&mut events).await?;
                if let Some(filtered) = filtered.as_mut() {
                    filtered.clear();
                }
                print_statistics(&index);
            }
            Some(ChangeStatus::Unchanged) | None => continue,
        }

        match filtered.as_mut() {
            Some(filtered) => search_and_print(&file_path, &index, filtered)?,
            None => print_statistics(&index),
        }
    }

    worker.interrupt();
    worker.wait_for_done().await;
    Ok(())
}

fn patterns_from_args(matches: &ArgMatches) -> Vec<Pattern> {
    let case_sensitive = !matches.get_flag("ignore-case");
    let includes = matches
        .get_many::<String>("regexp")
        .into_iter()
        .flatten()
        .map(|text| Pattern::with_flags(text.as_str(), case_sensitive, false));
    let excludes = matches
        .get_many::<String>("exclude")
        .into_iter()
        .flatten()
        .map(|text| Pattern::with_flags(text.as_str(), case_sensitive, true));
    includes.chain(excludes).collect()
}

#[cfg(feature = "config")]
fn load_config() -> Result<IndexingConfig> {
    match IndexingConfig::default_config_path() {
        Some(path) if path.exists() => IndexingConfig::load(&path)
            .with_context(|| format!("Failed to load {}", path.display())),
        _ => Ok(IndexingConfig::default()),
    }
}

#[cfg(not(feature = "config"))]
fn load_config() -> Result<IndexingConfig> {
    Ok(IndexingConfig::default())
}

/// Drain events until the running scan finishes, drawing progress on stderr
async fn wait_for_finished(events: &mut UnboundedReceiver<IndexingEvent>) -> Result<LoadingStatus> {
    while let Some(event) = events.recv().await {
        match event {
            IndexingEvent::Progress(percent) => {
                eprint!("\rindexing... {percent:3}%");
                let _ = std::io::stderr().flush();
            }
            IndexingEvent::Finished(status) => {
                eprintln!();
                return Ok(status);
            }
            IndexingEvent::FileChecked(status) => {
                log::debug!("stray check result {status:?}");
            }
        }
    }
    anyhow::bail!("indexing worker stopped")
}

/// Wait for the result of a file check; `None` if it was interrupted
async fn wait_for_check(
    events: &mut UnboundedReceiver<IndexingEvent>,
) -> Result<Option<ChangeStatus>> {
    while let Some(event) = events.recv().await {
        match event {
            IndexingEvent::FileChecked(status) => return Ok(Some(status)),
            IndexingEvent::Finished(LoadingStatus::Interrupted) => return Ok(None),
            other => log::debug!("ignoring {other:?} while checking"),
        }
    }
    anyhow::bail!("indexing worker stopped")
}

fn print_statistics(index: &LineIndex) {
    let reader = index.read();
    let encoding = reader
        .effective_encoding()
        .map_or("unknown", TextEncoding::name);
    eprintln!(
        "{} line(s), longest {} column(s), {} byte(s), encoding {encoding}",
        reader.line_count(),
        reader.max_line_length(),
        reader.indexed_size(),
    );
}

/// Search the lines not searched yet and print the new matches
fn search_and_print(path: &Path, index: &LineIndex, filtered: &mut FilteredLines) -> Result<()> {
    let first_new = filtered.match_count();
    tokio::task::block_in_place(|| filtered.search_new_lines())?;

    let encoding = index
        .read()
        .effective_encoding()
        .unwrap_or(TextEncoding::Utf8);
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for &line in &filtered.matches()[first_new..] {
        let range = index.read().line_range(line)?;
        let mut bytes = vec![0; (range.end - range.start) as usize];
        file.seek(SeekFrom::Start(range.start))?;
        file.read_exact(&mut bytes)?;

        let mut text = encoding.strip_line_terminator(&bytes);
        if line == 0 {
            text = encoding.strip_bom(text);
        }
        writeln!(out, "{}:{}", line + 1, encoding.decode(text))?;
    }
    Ok(())
}
