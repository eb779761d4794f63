use std::error::Error;
use std::io;
use std::path::{Path, PathBuf};

use aard_render::present::{self, Piece, Run};
use aard_render::{
    ArticleSource, BuildOptions, ChannelSink, Document, DocumentBuilder, EmbeddedBlock,
    JsonDictionary, LinkHandlers, LookupError, RenderOutcome, RenderScheduler, SchedulerConfig,
    StyleRegistry, read_or_placeholder,
};
use atty::Stream;
use clap::{Parser, Subcommand};
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};
use tracing::level_filters::LevelFilter;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "aard-render",
    about = "Render dictionary articles from annotated text",
    version
)]
pub struct Cli {
    /// Emit JSON instead of formatted text.
    #[arg(long, global = true)]
    json: bool,

    /// Render worker threads (defaults to the number of CPUs).
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Deepest table nesting accepted before a build fails.
    #[arg(long, global = true)]
    max_table_depth: Option<usize>,

    /// Log at debug level to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look a word up in one or more dictionaries and render every hit.
    Show {
        word: String,
        /// Dictionary files (JSON); one render per dictionary source.
        #[arg(short, long = "dict", required = true)]
        dicts: Vec<PathBuf>,
    },
    /// List the links of an article and where activating each would go.
    Links {
        word: String,
        #[arg(short, long = "dict")]
        dict: PathBuf,
    },
    /// List the style vocabulary and its visual properties.
    Styles,
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut build = BuildOptions::default();
    if let Some(depth) = cli.max_table_depth {
        build.max_table_depth = depth;
    }
    match cli.command {
        Command::Show { word, dicts } => {
            let mut config = SchedulerConfig {
                build,
                ..SchedulerConfig::default()
            };
            if let Some(workers) = cli.workers {
                config.workers = workers;
            }
            handle_show(&word, &dicts, config, cli.json)
        }
        Command::Links { word, dict } => handle_links(&word, &dict, build, cli.json),
        Command::Styles => handle_styles(cli.json),
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn handle_show(
    word: &str,
    paths: &[PathBuf],
    config: SchedulerConfig,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let scheduler = RenderScheduler::with_config(config)?;
    let (sink, outcomes) = ChannelSink::channel();

    let mut submitted = 0usize;
    for path in paths {
        let dictionary = JsonDictionary::open(path)?;
        match read_or_placeholder(&dictionary, word) {
            Ok(article) => {
                scheduler.submit(dictionary.source().clone(), article, sink.clone());
                submitted += 1;
            }
            Err(LookupError::NotFound { dictionary, .. }) => {
                debug!(source = %dictionary, word, "no article");
            }
            Err(err) => return Err(err.into()),
        }
    }
    drop(sink);
    if submitted == 0 {
        return Err(format!("No article found for {word:?}").into());
    }

    let mut delivered: Vec<RenderOutcome> = outcomes.iter().collect();
    delivered.sort_by_key(|outcome| outcome.task);
    info!(submitted, delivered = delivered.len(), "renders finished");

    if as_json {
        let payload: Vec<_> = delivered
            .iter()
            .map(|outcome| match &outcome.result {
                Ok(document) => json!({
                    "source": outcome.source,
                    "title": outcome.title,
                    "document": document,
                }),
                Err(err) => json!({
                    "source": outcome.source,
                    "title": outcome.title,
                    "error": err.to_string(),
                }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        for outcome in &delivered {
            print_outcome(outcome);
        }
    }
    Ok(())
}

fn handle_links(
    word: &str,
    path: &Path,
    build: BuildOptions,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let dictionary = JsonDictionary::open(path)?;
    let article = read_or_placeholder(&dictionary, word)?;
    let document = DocumentBuilder::with_options(build).build_article(&article)?;
    let links: Vec<_> = document.links().collect();

    if as_json {
        let payload: Vec<_> = links
            .iter()
            .map(|link| {
                json!({
                    "start": link.range.start,
                    "end": link.range.end,
                    "text": document.slice(link.range),
                    "kind": link.kind(),
                    "target": link.target,
                    "href": link.target.href(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    if links.is_empty() {
        println!("No links in \"{}\".", article.title);
        return Ok(());
    }
    let handlers = LinkHandlers::new(
        |source, target| println!("    -> look up \"{target}\" in {source}"),
        |url| println!("    -> open {url} in a browser"),
        |anchor| println!("    -> scroll to offset {anchor}"),
    );
    let width = links
        .iter()
        .filter_map(|link| document.slice(link.range))
        .map(str::len)
        .max()
        .unwrap_or(4)
        .max("TEXT".len());
    println!("{:<width$}  {:<9}  {}", "TEXT", "KIND", "HREF", width = width);
    println!("{:-<width$}  {:-<9}  {}", "", "", "----", width = width);
    for link in links {
        let text = document.slice(link.range).unwrap_or_default();
        let kind = format!("{:?}", link.kind()).to_lowercase();
        println!(
            "{:<width$}  {:<9}  {}",
            text,
            kind,
            link.target.href(),
            width = width
        );
        handlers.activate(link);
    }
    Ok(())
}

fn handle_styles(as_json: bool) -> Result<(), Box<dyn Error>> {
    let registry = StyleRegistry::global();
    let names = registry.names();

    if as_json {
        let payload: serde_json::Map<_, _> = names
            .iter()
            .filter_map(|name| {
                let props = registry.get(name)?;
                Some(serde_json::to_value(props).map(|value| (name.to_string(), value)))
            })
            .collect::<Result<_, _>>()?;
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    let width = names.iter().map(|name| name.len()).max().unwrap_or(4).max("NAME".len());
    println!("{:<width$}  {}", "NAME", "PROPERTIES", width = width);
    println!("{:-<width$}  {}", "", "----------", width = width);
    for name in names {
        if let Some(props) = registry.get(name) {
            println!(
                "{:<width$}  {}",
                name,
                serde_json::to_string(props).unwrap_or_default(),
                width = width
            );
        }
    }
    Ok(())
}

fn print_outcome(outcome: &RenderOutcome) {
    println!("\n== {} ({}) ==", outcome.title, outcome.source);
    match &outcome.result {
        Ok(document) => render_markdown_block(&document_markdown(document)),
        Err(err) => println!("error: {err}"),
    }
}

fn document_markdown(document: &Document) -> String {
    let registry = StyleRegistry::global();
    let mut out = String::new();
    for piece in present::pieces(document, registry) {
        match piece {
            Piece::Text(run) => out.push_str(&run_markdown(&run)),
            Piece::Block(block) => out.push_str(&table_markdown(block)),
        }
    }
    out
}

fn run_markdown(run: &Run<'_>) -> String {
    let body = run.text.trim();
    if body.is_empty() {
        return run.text.to_string();
    }
    let mut marked = body.to_string();
    if run.props.family.as_deref() == Some("monospace") {
        marked = format!("`{marked}`");
    }
    if run.props.italic == Some(true) {
        marked = format!("*{marked}*");
    }
    if run.props.is_bold() {
        marked = format!("**{marked}**");
    }
    if run.link.is_some() {
        marked = format!("[{marked}]");
    }
    let lead = &run.text[..run.text.len() - run.text.trim_start().len()];
    let trail = &run.text[run.text.trim_end().len()..];
    format!("{lead}{marked}{trail}")
}

fn table_markdown(block: &EmbeddedBlock) -> String {
    let table = &block.table;
    let mut out = String::from("\n");
    for row in &table.rows {
        let Some(text) = table.document.slice(row.range) else {
            continue;
        };
        let cells: Vec<_> = text.split('\t').map(str::trim).collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    if table.rows.is_empty() {
        out.push_str(&document_markdown(&table.document));
        out.push('\n');
    }
    out
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn markdown_skin() -> MadSkin {
    MadSkin::default()
}

fn render_markdown_block(body: &str) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return;
    }
    if stdout_is_tty() {
        let skin = markdown_skin();
        let formatted = FmtText::from(&skin, trimmed, Some(markdown_width()));
        println!("{formatted}");
    } else {
        println!("{trimmed}");
    }
}
