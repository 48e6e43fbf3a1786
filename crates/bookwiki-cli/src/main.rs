use bookwiki_common::config::config_path;
use bookwiki_common::editor_io;
use bookwiki_common::telemetry::{self, TelemetryConfig};
use bookwiki_common::{Config, FileStore, HttpBackend, StoryBackend};
use bookwiki_editor_core::suggest::TriggerMatch;
use bookwiki_editor_core::{
    CatalogAdapter, EditorSession, EntityCatalog, EntityRef, FlowLayout, Namespace, PageReport,
    PaginationObserver, RawEmote, RawEntity, SuggestionPopup, Trigger, decode,
    html_to_shortcodes, normalize, render_editor_html, resolve_names,
};
use miette::{IntoDiagnostic, Result};
use serde::Deserialize;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(version, about = "BookWiki - chapter shortcode tools and story backend client", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to config file (default: $CONFIG_DIR/bookwiki/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL, overriding the config file
    #[arg(long, global = true, env = "BOOKWIKI_ENDPOINT")]
    endpoint: Option<String>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where offline commands get their entity catalog from.
#[derive(Args, Clone)]
struct CatalogArgs {
    /// JSON file with `characters`, `items`, `locations`, `lore` and `emotes`
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Fetch the catalog of this story from the backend instead
    #[arg(long, conflicts_with = "catalog")]
    story: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode stored chapter text to editor markup
    Decode {
        /// Input file (stdin if omitted)
        input: Option<PathBuf>,
        #[command(flatten)]
        catalog: CatalogArgs,
        /// Print the document tree as JSON instead
        #[arg(long)]
        json: bool,
    },
    /// Encode editor markup to stored chapter text
    Encode {
        /// Input file (stdin if omitted)
        input: Option<PathBuf>,
    },
    /// Normalise whitespace entities and shortcodes
    Normalize {
        /// Input file (stdin if omitted)
        input: Option<PathBuf>,
    },
    /// Replace mention shortcodes with entity names
    Resolve {
        /// Input file (stdin if omitted)
        input: Option<PathBuf>,
        #[command(flatten)]
        catalog: CatalogArgs,
    },
    /// Estimate the page count of a chapter
    Pages {
        /// Input file (stdin if omitted)
        input: Option<PathBuf>,
        #[command(flatten)]
        catalog: CatalogArgs,
    },
    /// List suggestion candidates for a query
    Suggest {
        /// Query typed after the trigger
        #[arg(default_value = "")]
        query: String,
        /// Trigger character: `#` for mentions, `:` for emotes
        #[arg(long, default_value = "#")]
        trigger: char,
        #[command(flatten)]
        catalog: CatalogArgs,
    },
    /// Print a story's entity catalog
    Catalog {
        /// Story id (default: from config)
        #[arg(long)]
        story: Option<u64>,
    },
    /// Manage story emotes
    Emote {
        #[command(subcommand)]
        command: EmoteCommands,
    },
    /// Upload an image, optionally appending it to a chapter
    Upload {
        file: PathBuf,
        /// Chapter to insert the image into
        #[arg(long)]
        chapter: Option<u64>,
        /// Story whose catalog resolves the chapter's mentions
        #[arg(long)]
        story: Option<u64>,
    },
    /// Save stored chapter text to the backend
    Save {
        chapter: u64,
        #[arg(long)]
        title: String,
        /// Input file (stdin if omitted)
        input: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum EmoteCommands {
    /// Rename an emote
    Rename {
        id: u64,
        name: String,
        #[arg(long)]
        story: Option<u64>,
    },
    /// Delete an emote. Chapters keep their embedded images
    Delete {
        id: u64,
        #[arg(long)]
        story: Option<u64>,
    },
}

/// Offline catalog file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CatalogFile {
    story_id: Option<u64>,
    characters: Vec<RawEntity>,
    items: Vec<RawEntity>,
    locations: Vec<RawEntity>,
    lore: Vec<RawEntity>,
    emotes: Vec<RawEmote>,
}

impl CatalogFile {
    fn into_catalog(self) -> Arc<EntityCatalog> {
        let mut adapter = CatalogAdapter::new();
        adapter.set_collection(Namespace::Character, self.characters);
        adapter.set_collection(Namespace::Item, self.items);
        adapter.set_collection(Namespace::Location, self.locations);
        adapter.set_collection(Namespace::Lore, self.lore);
        adapter.set_emotes(self.story_id.unwrap_or_default(), self.emotes);
        adapter.catalog()
    }
}

struct Context {
    config: Config,
}

impl Context {
    fn backend(&self) -> HttpBackend {
        HttpBackend::new(&self.config.endpoint)
    }

    fn story(&self, story: Option<u64>) -> Result<u64> {
        story.or(self.config.story_id).ok_or_else(|| {
            miette::miette!("No story given. Pass --story or set story_id in the config file")
        })
    }

    async fn catalog(&self, args: &CatalogArgs) -> Result<Arc<EntityCatalog>> {
        if let Some(path) = &args.catalog {
            let text = std::fs::read_to_string(path).into_diagnostic()?;
            let file: CatalogFile = serde_json::from_str(&text).into_diagnostic()?;
            return Ok(file.into_catalog());
        }
        match args.story.or(self.config.story_id) {
            Some(story) => self.remote_catalog(story).await,
            None => Ok(Arc::new(EntityCatalog::default())),
        }
    }

    async fn remote_catalog(&self, story: u64) -> Result<Arc<EntityCatalog>> {
        let mut adapter = CatalogAdapter::new();
        Ok(editor_io::load_catalog(&self.backend(), &mut adapter, story).await?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_miette();

    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    telemetry::init_tracing(TelemetryConfig::from_env("bookwiki").with_level(level));

    let store = FileStore::new(cli.config.unwrap_or_else(config_path));
    let mut config = Config::load(&store).await?.with_env();
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    let ctx = Context { config };

    match cli.command {
        Commands::Decode {
            input,
            catalog,
            json,
        } => {
            let doc = decode(&read_input(input)?, &*ctx.catalog(&catalog).await?);
            if json {
                println!("{}", serde_json::to_string_pretty(&doc).into_diagnostic()?);
            } else {
                println!("{}", render_editor_html(&doc));
            }
        }
        Commands::Encode { input } => println!("{}", html_to_shortcodes(&read_input(input)?)),
        Commands::Normalize { input } => println!("{}", normalize(&read_input(input)?)),
        Commands::Resolve { input, catalog } => {
            let catalog = ctx.catalog(&catalog).await?;
            println!("{}", resolve_names(&read_input(input)?, &catalog));
        }
        Commands::Pages { input, catalog } => {
            let doc = decode(&read_input(input)?, &*ctx.catalog(&catalog).await?);
            let mut observer = PaginationObserver::new(
                ctx.config.pagination_debounce(),
                ctx.config.runaway_threshold,
            );
            match observer.measure(&doc, &FlowLayout::new(ctx.config.page)) {
                PageReport::Count(pages) => println!("{pages}"),
                PageReport::Runaway { markers } => {
                    return Err(miette::miette!(
                        help = "raise runaway_threshold in the config file if this chapter really is that long",
                        "Page estimate ran away ({markers} pages)"
                    ));
                }
            }
        }
        Commands::Suggest {
            query,
            trigger,
            catalog,
        } => {
            let trigger = Trigger::from_char(trigger)
                .ok_or_else(|| miette::miette!("Unknown trigger {trigger:?}, use '#' or ':'"))?;
            let found = TriggerMatch {
                trigger,
                query,
                range: 0..0,
            };
            let popup = SuggestionPopup::open(found, &*ctx.catalog(&catalog).await?);
            for line in popup.render_lines() {
                println!("{line}");
            }
        }
        Commands::Catalog { story } => {
            let catalog = ctx.remote_catalog(ctx.story(story)?).await?;
            for entry in catalog.entries() {
                println!("{}", describe(entry));
            }
        }
        Commands::Emote { command } => emote(&ctx, command).await?,
        Commands::Upload {
            file,
            chapter,
            story,
        } => upload(&ctx, file, chapter, story).await?,
        Commands::Save {
            chapter,
            title,
            input,
        } => {
            let mut session = EditorSession::new(
                &read_input(input)?,
                Arc::new(EntityCatalog::default()),
                ctx.config.page,
            );
            let saved =
                editor_io::save_session(&ctx.backend(), &mut session, chapter, &title).await?;
            println!("Saved chapter {} ({})", saved.id, saved.title);
        }
    }

    Ok(())
}

async fn emote(ctx: &Context, command: EmoteCommands) -> Result<()> {
    let backend = ctx.backend();
    let mut adapter = CatalogAdapter::new();
    match command {
        EmoteCommands::Rename { id, name, story } => {
            let story = ctx.story(story)?;
            editor_io::refresh_emotes(&backend, &mut adapter, story).await?;
            editor_io::rename_emote(&backend, &mut adapter, story, id, &name).await?;
            println!("Renamed emote {id} to {}", name.trim());
        }
        EmoteCommands::Delete { id, story } => {
            let story = ctx.story(story)?;
            editor_io::delete_emote(&backend, &mut adapter, story, id).await?;
            println!("Deleted emote {id}");
        }
    }
    Ok(())
}

async fn upload(
    ctx: &Context,
    file: PathBuf,
    chapter: Option<u64>,
    story: Option<u64>,
) -> Result<()> {
    let bytes = std::fs::read(&file).into_diagnostic()?;
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image")
        .to_string();
    let backend = ctx.backend();

    let Some(chapter_id) = chapter else {
        let uploaded = backend.upload_image(bytes, &file_name).await?;
        println!("{}", uploaded.url);
        return Ok(());
    };

    let record = backend.fetch_chapter(chapter_id).await?;
    let catalog = match story.or(ctx.config.story_id) {
        Some(story) => ctx.remote_catalog(story).await?,
        None => Arc::new(EntityCatalog::default()),
    };
    let session = tokio::sync::Mutex::new(EditorSession::new(
        &record.content,
        catalog,
        ctx.config.page,
    ));
    let inserted = editor_io::upload_into_session(&backend, &session, bytes, &file_name).await?;
    let mut session = session.into_inner();
    for note in session.drain_notifications() {
        eprintln!("{note}");
    }
    if inserted.is_none() {
        return Err(miette::miette!("Upload failed, chapter left unchanged"));
    }
    editor_io::save_session(&backend, &mut session, chapter_id, &record.title).await?;
    println!("Added {file_name} to chapter {chapter_id}");
    Ok(())
}

/// One catalog line: icon, name, namespace, and how to reference it.
fn describe(entry: &EntityRef) -> String {
    let reference = match entry {
        EntityRef::Emote(emote) => emote.image_url.to_string(),
        other => match other.story_id() {
            Some(id) => format!("#{{{}:{id}}}", other.namespace()),
            None => String::new(),
        },
    };
    format!(
        "{} {} ({}) {reference}",
        entry.icon(),
        entry.display_name(),
        entry.namespace()
    )
}

fn read_input(input: Option<PathBuf>) -> Result<String> {
    match input {
        Some(path) => std::fs::read_to_string(path).into_diagnostic(),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).into_diagnostic()?;
            Ok(buf)
        }
    }
}

fn init_miette() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .color(true)
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }))
    .expect("couldn't set the miette hook");
    miette::set_panic_hook();
}
