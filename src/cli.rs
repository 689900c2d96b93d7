use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use atty::Stream;
use clap::{Parser, Subcommand};
use lessongloss_rs::loader::{DirectorySource, LessonSource};
use lessongloss_rs::playback::{PlaybackEvent, SharedElement, SilentElement, Transition};
use lessongloss_rs::tree::{NodeTree, closest};
use lessongloss_rs::{
    Annotator, LessonSummary, LoadOutcome, NodeId, VocabEntry, Viewer, ViewerConfig, Vocabulary,
    annotate_markup,
};
use serde_json::{Value, json};
use termimad::{FmtText, MadSkin, terminal_size};
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "lessongloss-rs",
    about = "Render lessons and annotate their vocabulary",
    version
)]
pub struct Cli {
    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,

    /// JSON file with viewer settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding index.json and one JSON file per lesson.
    #[arg(long, global = true, conflicts_with = "base_url")]
    data: Option<PathBuf>,

    /// Fetch lesson data from this URL instead of a directory.
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Page location that audio references resolve against.
    #[arg(long, global = true)]
    page_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the lessons in the catalog.
    Catalog,
    /// Render and annotate a lesson.
    Show {
        /// Lesson id as listed in the catalog.
        id: String,
    },
    /// Annotate a markup fragment with a vocabulary list.
    Annotate {
        /// File containing the markup fragment.
        file: PathBuf,
        /// JSON vocabulary: a list of entries or a lesson file with a `vocab` list.
        #[arg(long)]
        vocab: PathBuf,
    },
    /// List a lesson's playback buttons and where their audio resolves to.
    Buttons {
        /// Lesson id as listed in the catalog.
        id: String,
    },
    /// Replay clicks on a lesson's playback buttons without producing sound.
    Play {
        /// Lesson id as listed in the catalog.
        id: String,
        /// Button indexes to click, or `end`, `error`, `reject` for events on the
        /// active audio.
        #[arg(required = true)]
        steps: Vec<String>,
    },
}

type DryRunViewer<S> = Viewer<S, SharedElement<SilentElement>>;

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing();
    let config = load_config(&cli)?;

    if let Command::Annotate { file, vocab } = &cli.command {
        return handle_annotate(&config, file, vocab, cli.json);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    match config.source.base_url.as_deref() {
        Some(base) => run_remote(&cli, &config, &runtime, base),
        None => {
            let source = DirectorySource::new(config.source.data_dir.clone());
            run_with_source(&cli, &config, &runtime, source)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(cli: &Cli) -> Result<ViewerConfig, Box<dyn Error>> {
    let mut config = match &cli.config {
        Some(path) => ViewerConfig::from_path(path)?,
        None => ViewerConfig::default(),
    };
    if let Some(data) = &cli.data {
        config.source.data_dir = data.clone();
        config.source.base_url = None;
    }
    if let Some(base_url) = &cli.base_url {
        config.source.base_url = Some(base_url.clone());
    }
    if let Some(page_url) = &cli.page_url {
        config.page_url = page_url.clone();
    }
    Ok(config)
}

#[cfg(feature = "http")]
fn run_remote(
    cli: &Cli,
    config: &ViewerConfig,
    runtime: &Runtime,
    base: &str,
) -> Result<(), Box<dyn Error>> {
    let base = url::Url::parse(base)?;
    run_with_source(cli, config, runtime, lessongloss_rs::HttpSource::new(base))
}

#[cfg(not(feature = "http"))]
fn run_remote(
    _cli: &Cli,
    _config: &ViewerConfig,
    _runtime: &Runtime,
    base: &str,
) -> Result<(), Box<dyn Error>> {
    Err(format!("Fetching lessons from {base} requires the `http` feature").into())
}

fn run_with_source<S: LessonSource>(
    cli: &Cli,
    config: &ViewerConfig,
    runtime: &Runtime,
    source: S,
) -> Result<(), Box<dyn Error>> {
    if let Command::Catalog = cli.command {
        return handle_catalog(runtime, &source, cli.json);
    }
    let viewer = Viewer::new(source, SharedElement::new(SilentElement::default()), config)?;
    match &cli.command {
        Command::Show { id } => handle_show(runtime, &viewer, id, cli.json),
        Command::Buttons { id } => handle_buttons(runtime, &viewer, id, cli.json),
        Command::Play { id, steps } => handle_play(runtime, &viewer, id, steps, cli.json),
        Command::Catalog | Command::Annotate { .. } => Ok(()),
    }
}

fn handle_catalog<S: LessonSource>(
    runtime: &Runtime,
    source: &S,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let catalog = runtime.block_on(source.catalog())?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }
    if catalog.lessons.is_empty() {
        println!("The catalog lists no lessons.");
        return Ok(());
    }
    let width = catalog
        .lessons
        .iter()
        .map(|entry| text_width(&entry.id))
        .max()
        .unwrap_or(2)
        .max("ID".len());
    println!("{}  TITLE", pad("ID", width));
    println!("{:-<width$}  {}", "", "-----", width = width);
    for entry in &catalog.lessons {
        println!("{}  {}", pad(&entry.id, width), entry.label());
    }
    Ok(())
}

fn load_summary<S: LessonSource>(
    runtime: &Runtime,
    viewer: &DryRunViewer<S>,
    id: &str,
) -> Result<LessonSummary, Box<dyn Error>> {
    match runtime.block_on(viewer.load(id))? {
        LoadOutcome::Rendered(summary) => Ok(summary),
        other => Err(format!("Lesson {id:?} was not rendered ({other:?})").into()),
    }
}

fn handle_show<S: LessonSource>(
    runtime: &Runtime,
    viewer: &DryRunViewer<S>,
    id: &str,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let summary = load_summary(runtime, viewer, id)?;
    let content_id = &viewer.renderer().config().content_id;
    let content = viewer.region_html(content_id).unwrap_or_default();

    if as_json {
        let payload = json!({
            "lesson": summary,
            "content_html": content,
            "page_html": viewer.html(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!("{}", summary.title);
    println!();
    println!("{content}");
    println!();
    print_vocab_table(&summary.vocabulary);
    let report = summary.annotation;
    println!(
        "\nAnnotation: {} occurrence(s) in {} text node(s), {} legacy marker(s) renamed, {} tooltip(s) backfilled, {} unparsed.",
        report.occurrences,
        report.annotated_nodes,
        report.normalized,
        report.backfilled,
        report.unparsed
    );
    if summary.literal_fallbacks > 0 {
        println!(
            "Warning: {} markup fragment(s) could not be parsed and are shown as text.",
            summary.literal_fallbacks
        );
    }
    Ok(())
}

fn handle_annotate(
    config: &ViewerConfig,
    file: &Path,
    vocab: &Path,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let markup = fs::read_to_string(file)?;
    let vocabulary = read_vocabulary(vocab)?;
    let annotator = Annotator::new(config.annotation.clone())?;
    let (annotated, report) = annotate_markup(&annotator, &markup, &vocabulary)?;
    if as_json {
        let payload = json!({ "html": annotated, "report": report });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{annotated}");
    }
    Ok(())
}

fn read_vocabulary(path: &Path) -> Result<Vocabulary, Box<dyn Error>> {
    let raw = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&raw)?;
    let entries: Vec<VocabEntry> = match value {
        Value::Array(_) => serde_json::from_value(value)?,
        Value::Object(mut fields) => match fields.remove("vocab") {
            Some(list) => serde_json::from_value(list)?,
            None => return Err(format!("{} has no `vocab` list", path.display()).into()),
        },
        _ => return Err(format!("{} is not a vocabulary list", path.display()).into()),
    };
    Ok(Vocabulary::new(entries))
}

struct ButtonRow {
    index: usize,
    region: String,
    src: String,
    resolved: String,
}

fn button_rows<S: LessonSource>(viewer: &DryRunViewer<S>, buttons: &[NodeId]) -> Vec<ButtonRow> {
    let audio_attribute = &viewer.renderer().config().audio_attribute;
    buttons
        .iter()
        .enumerate()
        .map(|(index, &button)| {
            let (src, region) = viewer.read_document(|doc| {
                let src = doc.attribute(button, audio_attribute).unwrap_or_default().to_string();
                let region = closest(doc, button, |doc, node| doc.attribute(node, "id").is_some())
                    .and_then(|node| doc.attribute(node, "id"))
                    .unwrap_or("-")
                    .to_string();
                (src, region)
            });
            let resolved = viewer
                .playback()
                .with(|controller| controller.resolve(&src))
                .map(|url| url.to_string())
                .unwrap_or_else(|err| format!("<{err}>"));
            ButtonRow {
                index,
                region,
                src,
                resolved,
            }
        })
        .collect()
}

fn handle_buttons<S: LessonSource>(
    runtime: &Runtime,
    viewer: &DryRunViewer<S>,
    id: &str,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    load_summary(runtime, viewer, id)?;
    let rows = button_rows(viewer, &viewer.playback_buttons());

    if as_json {
        let payload: Vec<_> = rows
            .iter()
            .map(|row| {
                json!({
                    "index": row.index,
                    "region": row.region,
                    "audio": row.src,
                    "resolved": row.resolved,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("Lesson \"{id}\" has no playback buttons.");
        return Ok(());
    }
    let width = rows
        .iter()
        .map(|row| text_width(&row.src))
        .max()
        .unwrap_or(5)
        .max("AUDIO".len());
    println!("{:<5}  {:<8}  {}  RESOLVED", "INDEX", "REGION", pad("AUDIO", width));
    for row in &rows {
        println!(
            "{:<5}  {:<8}  {}  {}",
            row.index,
            row.region,
            pad(&row.src, width),
            row.resolved
        );
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Click(usize),
    Event(PlaybackEvent),
}

fn parse_step(raw: &str) -> Result<Step, String> {
    match raw {
        "end" => Ok(Step::Event(PlaybackEvent::Ended)),
        "error" => Ok(Step::Event(PlaybackEvent::Error)),
        "reject" => Ok(Step::Event(PlaybackEvent::Rejected(
            "rejected by dry run".to_string(),
        ))),
        _ => raw
            .parse()
            .map(Step::Click)
            .map_err(|_| format!("Unknown step {raw:?}: expected a button index, end, error or reject")),
    }
}

fn handle_play<S: LessonSource>(
    runtime: &Runtime,
    viewer: &DryRunViewer<S>,
    id: &str,
    steps: &[String],
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let steps = steps
        .iter()
        .map(|raw| parse_step(raw))
        .collect::<Result<Vec<_>, _>>()?;
    load_summary(runtime, viewer, id)?;
    let buttons = viewer.playback_buttons();

    let mut log = Vec::with_capacity(steps.len());
    for step in &steps {
        let transition = match step {
            Step::Click(index) => {
                let button = *buttons.get(*index).ok_or_else(|| {
                    format!("Lesson \"{id}\" has {} button(s); {index} is out of range", buttons.len())
                })?;
                viewer.click(button)
            }
            Step::Event(event) => match viewer.playback().state().active() {
                Some(active) => viewer.media_event(active.handle, event.clone()),
                None => Transition::Ignored,
            },
        };
        let notices = viewer.take_notices();
        log.push((step_label(step), describe(&transition, &buttons), notices));
    }

    if as_json {
        let payload: Vec<_> = log
            .iter()
            .map(|(step, outcome, notices)| {
                json!({ "step": step, "outcome": outcome, "notices": notices })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    for (step, outcome, notices) in &log {
        println!("{step:<10} {outcome}");
        for notice in notices {
            println!("{:<10} notice: {notice}", "");
        }
    }
    Ok(())
}

fn step_label(step: &Step) -> String {
    match step {
        Step::Click(index) => format!("click #{index}"),
        Step::Event(PlaybackEvent::Ended) => "end".to_string(),
        Step::Event(PlaybackEvent::Error) => "error".to_string(),
        Step::Event(PlaybackEvent::Rejected(_)) => "reject".to_string(),
    }
}

fn describe(transition: &Transition<NodeId>, buttons: &[NodeId]) -> String {
    let label = |node: &NodeId| {
        buttons
            .iter()
            .position(|button| button == node)
            .map(|index| format!("#{index}"))
            .unwrap_or_else(|| "a detached button".to_string())
    };
    match transition {
        Transition::Ignored => "ignored".to_string(),
        Transition::Paused(button) => format!("paused {}", label(button)),
        Transition::Started {
            button,
            source,
            switched_from,
        } => match switched_from {
            Some(previous) => format!(
                "playing {} from {source}, {} reset",
                label(button),
                label(previous)
            ),
            None => format!("playing {} from {source}", label(button)),
        },
        Transition::Finished(button) => format!("finished {}", label(button)),
        Transition::Failed { button, error } => format!("failed {}: {error}", label(button)),
    }
}

fn print_vocab_table(entries: &[VocabEntry]) {
    if entries.is_empty() {
        println!("No vocabulary.");
        return;
    }
    if stdout_is_tty() {
        let mut markdown = String::from("|Word|Pinyin|Meaning|\n|:-|:-|:-|\n");
        for entry in entries {
            markdown.push_str(&format!(
                "|{}|{}|{}|\n",
                table_cell(&entry.headword),
                table_cell(entry.transliteration()),
                table_cell(entry.gloss())
            ));
        }
        let skin = MadSkin::default();
        let formatted = FmtText::from(&skin, &markdown, Some(terminal_width()));
        println!("{formatted}");
        return;
    }
    let word_width = entries
        .iter()
        .map(|entry| text_width(&entry.headword))
        .max()
        .unwrap_or(4)
        .max("WORD".len());
    let pinyin_width = entries
        .iter()
        .map(|entry| text_width(entry.transliteration()))
        .max()
        .unwrap_or(6)
        .max("PINYIN".len());
    println!(
        "{}  {}  MEANING",
        pad("WORD", word_width),
        pad("PINYIN", pinyin_width)
    );
    for entry in entries {
        println!(
            "{}  {}  {}",
            pad(&entry.headword, word_width),
            pad(entry.transliteration(), pinyin_width),
            entry.gloss()
        );
    }
}

fn table_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

/// Terminal columns taken by `text`; wide ideographs count twice.
fn text_width(text: &str) -> usize {
    text.chars()
        .map(|ch| match ch as u32 {
            0x1100..=0x115F | 0x2E80..=0xA4CF | 0xAC00..=0xD7A3 | 0xF900..=0xFAFF | 0xFF00..=0xFF60 => 2,
            0x0300..=0x036F | 0xFE00..=0xFE0F => 0,
            _ => 1,
        })
        .sum()
}

fn pad(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(text_width(text));
    format!("{text}{}", " ".repeat(fill))
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn terminal_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_parse() {
        assert_eq!(parse_step("2"), Ok(Step::Click(2)));
        assert_eq!(parse_step("end"), Ok(Step::Event(PlaybackEvent::Ended)));
        assert!(parse_step("-1").is_err());
        assert!(parse_step("stop").is_err());
    }

    #[test]
    fn widths_count_wide_characters_twice() {
        assert_eq!(text_width("北京"), 4);
        assert_eq!(text_width("Běijīng"), 7);
        assert_eq!(pad("茶", 4), "茶  ");
    }

    #[test]
    fn cli_arguments_parse() {
        let cli = Cli::try_parse_from([
            "lessongloss-rs",
            "--json",
            "--data",
            "lessons",
            "play",
            "l1",
            "0",
            "end",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.data, Some(PathBuf::from("lessons")));
        assert!(matches!(cli.command, Command::Play { ref steps, .. } if steps.len() == 2));

        let both = Cli::try_parse_from([
            "lessongloss-rs",
            "--data",
            "d",
            "--base-url",
            "https://x.test/data/",
            "catalog",
        ]);
        assert!(both.is_err());
    }
}
