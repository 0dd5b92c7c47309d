use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use shellcache::cache::{CacheStore, SqliteStore};
use shellcache::http::{FetchCache, Fetcher, ReqwestFetcher, Request, Response};
use shellcache::{config, logging, Config, Dispatcher, Intercept};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "shellcache")]
#[command(about = "Offline request-interception cache for a web app shell")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/shellcache/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Origin (scope URL) the cache serves
  #[arg(long, global = true)]
  origin: Option<String>,

  /// Path to the cache database (default: $XDG_DATA_HOME/shellcache/cache.db)
  #[arg(long, global = true)]
  db: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Populate the static generation from the precache list
  Install,
  /// Delete generations from earlier versions
  Activate,
  /// Intercept a single request and show the response
  Fetch {
    /// Absolute URL, or relative to the origin
    url: String,
    /// Issue the request as a page navigation
    #[arg(long)]
    navigate: bool,
    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Print the response body
    #[arg(long)]
    body: bool,
  },
  /// List cache generations
  Keys,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let _guard = logging::init(&config::data_dir()?.join("logs"))?;

  // Load configuration, command line origin wins
  let mut config = Config::load(args.config.as_deref())?;
  config.apply_origin_override(args.origin);
  let settings = config.settings()?;

  let store = Arc::new(match &args.db {
    Some(path) => SqliteStore::open_at(path)?,
    None => SqliteStore::open()?,
  });
  let fetcher = Arc::new(ReqwestFetcher::new()?);
  let dispatcher = Dispatcher::new(&settings, store.clone(), fetcher.clone());

  match args.command {
    Command::Install => {
      let report = dispatcher.on_install().await?;
      for url in &report.cached {
        println!("cached  {}", url);
      }
      for url in &report.failed {
        println!("failed  {}", url);
      }
    }
    Command::Activate => {
      let deleted = dispatcher.on_activate().await?;
      if deleted.is_empty() {
        println!("no superseded generations");
      }
      for name in deleted {
        println!("deleted {}", name);
      }
    }
    Command::Fetch {
      url,
      navigate,
      method,
      body,
    } => {
      let method = Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|e| eyre!("Invalid method '{}': {}", method, e))?;
      let url = settings
        .origin
        .join(&url)
        .map_err(|e| eyre!("Invalid URL '{}': {}", url, e))?;

      let request = if navigate {
        Request::navigate(url)
      } else {
        Request::get(url)
      }
      .with_method(method);

      let route = dispatcher.classify(&request);
      info!(url = %request.url, route = %route, "Intercepting request");
      println!("route   {}", route);

      match dispatcher.on_intercept(&request).await {
        Intercept::Respond(outcome) => {
          println!("source  {:?}", outcome.source);
          print_response(&outcome.response, body);
        }
        Intercept::Passthrough => {
          let response = fetcher.fetch(&request, FetchCache::Default).await?;
          println!("source  passthrough");
          print_response(&response, body);
        }
      }
    }
    Command::Keys => {
      for name in store.keys().await? {
        let count = store.entry_count(&name).await?;
        let marker = if settings.names.is_current(&name) {
          "*"
        } else {
          " "
        };
        let written = match store.latest_write(&name).await? {
          Some(at) => at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
          None => "never written".to_string(),
        };
        println!("{} {} ({} entries, last write {})", marker, name, count, written);
      }
    }
  }

  Ok(())
}

fn print_response(response: &Response, with_body: bool) {
  if response.is_network_error() {
    println!("status  network error");
    return;
  }

  println!("status  {}", response.status);
  for (name, value) in &response.headers {
    println!("header  {}: {}", name, value);
  }
  println!("length  {}", response.body.len());

  if with_body {
    println!();
    println!("{}", String::from_utf8_lossy(&response.body));
  }
}
