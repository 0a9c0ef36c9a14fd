mod loader;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use codegraph_core::Config;
use codegraph_core::bootstrap::{
    build_service, create_provider, load_config, persist_snapshot, restore_snapshot,
};
use codegraph_index::{CodeGraphService, GraphStore, IndexReport};
use codegraph_llm::any::AnyProvider;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::loader::{load_tree, repository_id_for};

#[derive(Parser)]
#[command(
    name = "codegraph",
    version,
    about = "Build a code graph of a repository and answer questions about it",
    after_help = r#"Examples:
  codegraph index .
  codegraph ask . "What does foo call?"
  codegraph graph . --stats-only
  codegraph neighbors . foo --depth 2
"#
)]
struct Args {
    /// Config file (defaults to $CODEGRAPH_CONFIG, then ./codegraph.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index a working copy and save its snapshot.
    Index {
        path: PathBuf,
        #[command(flatten)]
        repo: RepoArgs,
    },
    /// Answer a question about a working copy, indexing it first if needed.
    Ask {
        path: PathBuf,
        question: String,
        #[command(flatten)]
        repo: RepoArgs,
    },
    /// Print the whole graph.
    Graph {
        path: PathBuf,
        /// Print only node and edge counts.
        #[arg(long)]
        stats_only: bool,
        #[command(flatten)]
        repo: RepoArgs,
    },
    /// Print the neighbourhood of a node, given by id or by name.
    Neighbors {
        path: PathBuf,
        node: String,
        #[arg(long, default_value_t = 1)]
        depth: usize,
        #[command(flatten)]
        repo: RepoArgs,
    },
    /// Search nodes by name.
    Search {
        path: PathBuf,
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[command(flatten)]
        repo: RepoArgs,
    },
}

#[derive(clap::Args)]
struct RepoArgs {
    /// Repository id (defaults to the directory name).
    #[arg(long)]
    repo_id: Option<String>,
    /// Include files ignored by .gitignore.
    #[arg(long)]
    no_ignore: bool,
    /// Re-index even if a saved snapshot exists.
    #[arg(long)]
    reindex: bool,
}

struct App {
    config: Config,
    store: Arc<GraphStore>,
    service: CodeGraphService<AnyProvider>,
    cancel: CancellationToken,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    let provider = create_provider(&config)?;
    let store = Arc::new(GraphStore::new());
    let service = build_service(&config, provider, Arc::clone(&store));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    let app = App {
        config,
        store,
        service,
        cancel,
    };
    app.run(args.command).await
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{out}");
    Ok(())
}

impl App {
    async fn run(&self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::Index { path, repo } => {
                let repository_id = repo_id(&path, &repo);
                let report = self.index(&path, &repository_id, repo.no_ignore).await?;
                print_json(&report)
            }
            Command::Ask {
                path,
                question,
                repo,
            } => {
                let repository_id = self.ensure_indexed(&path, &repo).await?;
                match self
                    .service
                    .query_with_cancel(&repository_id, &question, &self.cancel)
                    .await
                {
                    Ok(response) => print_json(&response),
                    Err(e) => {
                        tracing::error!(repository = %repository_id, "query failed: {e}");
                        print_json(&e.into_response())?;
                        std::process::exit(1);
                    }
                }
            }
            Command::Graph {
                path,
                stats_only,
                repo,
            } => {
                let repository_id = self.ensure_indexed(&path, &repo).await?;
                let view = self.service.get_graph(&repository_id)?;
                if stats_only {
                    print_json(&view.stats)
                } else {
                    print_json(&view)
                }
            }
            Command::Neighbors {
                path,
                node,
                depth,
                repo,
            } => {
                let repository_id = self.ensure_indexed(&path, &repo).await?;
                let node_id = self.resolve_node(&repository_id, &node)?;
                let sub = self.service.get_neighbors(&repository_id, &node_id, depth)?;
                print_json(&serde_json::json!({
                    "node": node_id,
                    "depth": depth,
                    "nodes": sub.nodes,
                    "edges": sub.edges,
                }))
            }
            Command::Search {
                path,
                query,
                limit,
                repo,
            } => {
                let repository_id = self.ensure_indexed(&path, &repo).await?;
                let hits = self.service.search_nodes(&repository_id, &query, limit)?;
                print_json(&hits)
            }
        }
    }

    async fn index(
        &self,
        path: &Path,
        repository_id: &str,
        no_ignore: bool,
    ) -> anyhow::Result<IndexReport> {
        let loaded = load_tree(path, no_ignore)?;
        if !loaded.unreadable.is_empty() {
            tracing::warn!(
                count = loaded.unreadable.len(),
                "skipped source files that are not valid UTF-8"
            );
        }
        let report = self
            .service
            .index_with_cancel(repository_id, loaded.tree, &self.cancel)
            .await
            .with_context(|| format!("failed to index {}", path.display()))?;
        persist_snapshot(&self.config, &self.store, repository_id).await?;
        Ok(report)
    }

    async fn ensure_indexed(&self, path: &Path, repo: &RepoArgs) -> anyhow::Result<String> {
        let repository_id = repo_id(path, repo);
        if !repo.reindex && restore_snapshot(&self.config, &self.store, &repository_id).await? {
            tracing::debug!(repository = %repository_id, "using saved snapshot");
            return Ok(repository_id);
        }
        self.index(path, &repository_id, repo.no_ignore).await?;
        Ok(repository_id)
    }

    /// Accept a node id as-is, otherwise take the best name match.
    fn resolve_node(&self, repository_id: &str, node: &str) -> anyhow::Result<String> {
        if self.service.get_node(repository_id, node).is_ok() {
            return Ok(node.to_owned());
        }
        let hits = self.service.search_nodes(repository_id, node, 1)?;
        hits.into_iter()
            .next()
            .map(|hit| hit.node.id)
            .with_context(|| format!("no node matches {node:?}"))
    }
}

fn repo_id(path: &Path, repo: &RepoArgs) -> String {
    repo.repo_id
        .clone()
        .unwrap_or_else(|| repository_id_for(path))
}
