mod allocator;
mod catalog;
mod config;
mod entry;
mod error;
mod event;
mod hooks;
mod sitemap;
mod slug;
mod sqlite_store;
mod store;

use crate::allocator::SlugAllocator;
use crate::catalog::Catalog;
use crate::config::{load_settings, Backend, Settings};
use crate::entry::{EntryId, EntryPatch, NewEntry};
use crate::hooks::{AuditJsonlHook, TracingHook};
use crate::sitemap::render_sitemap;
use crate::sqlite_store::SqliteCatalogStore;
use crate::store::{CatalogStore, InMemoryCatalogStore};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: catalog [--config PATH] <command>

Commands:
  create <label> [--slug S] [--location L] [--type T] [--nature N] [--status S] [--hidden] [--pick]
  update <id> [--label L] [--slug S] [--location L] [--type T] [--nature N] [--status S]
              [--visible true|false] [--pick true|false]
  show <slug>
  get <id>
  delete <id>
  list [--all]
  search <query>
  picks
  types [nature]
  sitemap [hostname]      XML with a hostname, JSON otherwise";

#[derive(Debug)]
enum Command {
    Create(NewEntry),
    Update(EntryId, EntryPatch),
    Show(String),
    Get(EntryId),
    Delete(EntryId),
    List { all: bool },
    Search(String),
    Picks,
    Types(Option<String>),
    Sitemap(Option<String>),
}

#[derive(Debug)]
struct CliArgs {
    config: Option<PathBuf>,
    command: Command,
}

fn parse_cli_args() -> CliArgs {
    match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("Error: {}\n\n{}", message, USAGE);
            std::process::exit(1);
        }
    }
}

fn parse_args<I: IntoIterator<Item = String>>(raw: I) -> Result<CliArgs, String> {
    let mut config = None;
    let mut rest = Vec::new();
    let mut args = raw.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            let value = args.next().ok_or("--config requires a path")?;
            config = Some(PathBuf::from(value));
        } else {
            rest.push(arg);
        }
    }

    let mut args = rest.into_iter();
    let name = args.next().ok_or("missing command")?;
    let command = match name.as_str() {
        "create" => {
            let label = args.next().ok_or("create requires a label")?;
            let mut new = NewEntry::labeled(&label);
            while let Some(flag) = args.next() {
                match flag.as_str() {
                    "--hidden" => new.visible = false,
                    "--pick" => new.top_pick = true,
                    "--slug" => new.slug_override = Some(flag_value(&flag, args.next())?),
                    "--location" => new.location = Some(flag_value(&flag, args.next())?),
                    "--type" => new.property_type = Some(flag_value(&flag, args.next())?),
                    "--nature" => new.property_nature = Some(flag_value(&flag, args.next())?),
                    "--status" => new.project_status = Some(flag_value(&flag, args.next())?),
                    other => return Err(format!("unknown create option '{}'", other)),
                }
            }
            Command::Create(new)
        }
        "update" => {
            let id = args.next().ok_or("update requires an entry id")?;
            let mut patch = EntryPatch::default();
            while let Some(flag) = args.next() {
                let value = flag_value(&flag, args.next())?;
                match flag.as_str() {
                    "--label" => patch.label = Some(value),
                    "--slug" => patch.slug_override = Some(value),
                    "--location" => patch.location = Some(value),
                    "--type" => patch.property_type = Some(value),
                    "--nature" => patch.property_nature = Some(value),
                    "--status" => patch.project_status = Some(value),
                    "--visible" => patch.visible = Some(parse_bool(&flag, &value)?),
                    "--pick" => patch.top_pick = Some(parse_bool(&flag, &value)?),
                    other => return Err(format!("unknown update option '{}'", other)),
                }
            }
            if patch.is_empty() {
                return Err("update needs at least one field to change".to_string());
            }
            Command::Update(EntryId::from(id), patch)
        }
        "show" => Command::Show(args.next().ok_or("show requires a slug")?),
        "get" => Command::Get(EntryId::from(args.next().ok_or("get requires an entry id")?)),
        "delete" => Command::Delete(EntryId::from(
            args.next().ok_or("delete requires an entry id")?,
        )),
        "list" => {
            let all = match args.next().as_deref() {
                None => false,
                Some("--all") => true,
                Some(other) => return Err(format!("unknown list option '{}'", other)),
            };
            Command::List { all }
        }
        "search" => Command::Search(args.collect::<Vec<_>>().join(" ")),
        "picks" => Command::Picks,
        "types" => Command::Types(args.next()),
        "sitemap" => Command::Sitemap(args.next()),
        other => return Err(format!("unknown command '{}'", other)),
    };

    Ok(CliArgs { config, command })
}

fn flag_value(flag: &str, value: Option<String>) -> Result<String, String> {
    value.ok_or_else(|| format!("{} requires a value", flag))
}

fn parse_bool(flag: &str, value: &str) -> Result<bool, String> {
    match value {
        "true" | "yes" | "on" => Ok(true),
        "false" | "no" | "off" => Ok(false),
        other => Err(format!("{} expects true or false, got '{}'", flag, other)),
    }
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_filter.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if settings.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn build_catalog(settings: &Settings) -> Result<Catalog> {
    let store: Arc<dyn CatalogStore> = match &settings.backend {
        Backend::Sqlite {
            path,
            pool_size,
            busy_timeout,
        } => Arc::new(
            SqliteCatalogStore::open(path, *pool_size, *busy_timeout)
                .with_context(|| format!("opening catalog database {}", path.display()))?,
        ),
        Backend::Memory => {
            tracing::warn!("using the in-memory store; nothing will persist after exit");
            Arc::new(InMemoryCatalogStore::new())
        }
    };

    let allocator = SlugAllocator::new(settings.max_attempts, &settings.fallback_prefix);
    tracing::debug!(
        max_attempts = allocator.max_attempts(),
        fallback_prefix = %settings.fallback_prefix,
        "slug allocator ready"
    );

    let mut catalog = Catalog::new(store, allocator).with_hook(Arc::new(TracingHook));
    if let Some(path) = &settings.audit_log {
        let audit = AuditJsonlHook::new(path).await?;
        catalog = catalog.with_hook(Arc::new(audit));
    }
    Ok(catalog)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(catalog: &Catalog, command: Command) -> Result<()> {
    match command {
        Command::Create(new) => {
            let entry = catalog.create_entry(new).await?;
            print_json(&entry)
        }
        Command::Update(id, patch) => {
            let entry = catalog.update_entry(&id, patch).await?;
            print_json(&entry)
        }
        Command::Show(slug) => match catalog.lookup_by_slug(&slug).await? {
            Some(entry) => print_json(&entry),
            None => Err(anyhow!("no entry with slug '{}'", slug)),
        },
        Command::Get(id) => match catalog.get_entry(&id).await? {
            Some(entry) => print_json(&entry),
            None => Err(anyhow!("no entry with id '{}'", id)),
        },
        Command::Delete(id) => {
            catalog.delete_entry(&id).await?;
            print_json(&serde_json::json!({ "deleted": id }))
        }
        Command::List { all } => print_json(&catalog.list_entries(all).await?),
        Command::Search(query) => print_json(&catalog.search(&query).await?),
        Command::Picks => print_json(&catalog.top_picks().await?),
        Command::Types(nature) => print_json(&catalog.property_types(nature.as_deref()).await?),
        Command::Sitemap(hostname) => {
            let urls = catalog.sitemap_entries().await?;
            match hostname {
                Some(hostname) => {
                    print!("{}", render_sitemap(&hostname, &urls));
                    Ok(())
                }
                None => print_json(&urls),
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let CliArgs { config, command } = parse_cli_args();

    let settings = load_settings(config.as_deref());
    init_tracing(&settings);
    for warning in &settings.warnings {
        tracing::warn!("{}", warning);
    }

    let catalog = build_catalog(&settings).await?;
    if let Err(error) = run(&catalog, command).await {
        if let Some(catalog_error) = error.downcast_ref::<crate::error::CatalogError>() {
            if catalog_error.is_retryable() {
                eprintln!("The request did not go through and can be retried.");
            }
        }
        return Err(error);
    }
    Ok(())
}
