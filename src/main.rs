use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Path, RawQuery},
    http::{HeaderMap, Method},
    response::Redirect,
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use diesel::SqliteConnection;
use log::info;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use books_rs::config::BooksSiteConfig;
use books_rs::database;
use books_rs::handlers;
use books_rs::plugin::{BooksPlugin, Lifecycle, Site};
use books_rs::templates;

#[derive(Debug, Parser)]
#[command(version, about = "Admin screens for a book catalogue")]
struct Cli {
    /// Path to the site configuration file.
    #[arg(long, env = "BOOKS_RS_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Install tables, then serve the admin screens.
    Serve,
    /// Install the host and plugin tables.
    Activate,
    /// Run the plugin's deactivation hook.
    Deactivate,
}

fn activate(conn: &mut SqliteConnection, plugin: &dyn Lifecycle, collation: &str) -> Result<(), anyhow::Error> {
    database::install_host_tables(conn, collation).context("failed to install host tables")?;
    plugin.on_activate(conn).context("books plugin activation failed")?;
    Ok(())
}

fn load_templates(config: &BooksSiteConfig) -> Result<templates::Templates, anyhow::Error> {
    let mut base_ctx = tera::Context::new();
    base_ctx.insert("BOOKS_RS_VERSION", env!("CARGO_PKG_VERSION"));
    base_ctx.insert("DEFAULT_LANG", "en-US");

    match &config.template_dir {
        Some(dir) => {
            info!("loading templates from {:?}", dir);
            templates::Templates::from_dir(FsPath::new(dir), base_ctx)
        }
        None => templates::Templates::builtin(base_ctx),
    }
}

async fn serve(config: BooksSiteConfig) -> Result<(), anyhow::Error> {
    let dbpool = Arc::new(books_rs::new_dbconn_pool(&config.database_url)?);
    info!("created dbpool from {:?}", config.database_url);

    let templates = Arc::new(load_templates(&config)?);
    let site = Arc::new(Site::new(&config, &templates));
    {
        let mut conn = dbpool.get()?;
        activate(&mut conn, site.plugin.as_ref(), &config.schema.collation)?;
    }

    let books_list = {
        let site = site.clone();
        let dbpool = dbpool.clone();
        let templates = templates.clone();
        move |method: Method, headers: HeaderMap, RawQuery(query): RawQuery, body: Bytes| {
            handlers::books_list_handler(
                site.clone(),
                dbpool.clone(),
                templates.clone(),
                method,
                headers,
                query,
                body,
            )
        }
    };

    let mut app = Router::new()
        .route("/", get(|| async { Redirect::to(books_rs::BOOKS_LIST_PATH) }))
        .route(books_rs::BOOKS_LIST_PATH, get(books_list.clone()).post(books_list))
        .route(
            "/admin/books-list/screen-options",
            post({
                let site = site.clone();
                let dbpool = dbpool.clone();
                move |headers: HeaderMap, body: Bytes| {
                    handlers::screen_options_handler(site.clone(), dbpool.clone(), headers, body)
                }
            }),
        )
        .route(
            "/admin/books/new",
            get({
                let site = site.clone();
                let dbpool = dbpool.clone();
                move |headers: HeaderMap| handlers::new_book_handler(site.clone(), dbpool.clone(), headers)
            }),
        )
        .route(
            "/admin/books/:id/edit",
            get({
                let site = site.clone();
                let dbpool = dbpool.clone();
                let templates = templates.clone();
                move |Path(id): Path<i32>, headers: HeaderMap| {
                    handlers::edit_book_handler(site.clone(), dbpool.clone(), templates.clone(), headers, id)
                }
            }),
        )
        .route(
            "/admin/books/:id",
            post({
                let site = site.clone();
                let dbpool = dbpool.clone();
                move |Path(id): Path<i32>, headers: HeaderMap, body: Bytes| {
                    handlers::save_book_handler(site.clone(), dbpool.clone(), headers, id, body)
                }
            }),
        )
        .route(
            "/admin/books/:id/autosave",
            post({
                let site = site.clone();
                let dbpool = dbpool.clone();
                move |Path(id): Path<i32>, headers: HeaderMap, body: Bytes| {
                    handlers::autosave_handler(site.clone(), dbpool.clone(), headers, id, body)
                }
            }),
        )
        .route(
            "/admin/edit/:post_type",
            get({
                let site = site.clone();
                let dbpool = dbpool.clone();
                let templates = templates.clone();
                move |Path(post_type): Path<String>, headers: HeaderMap| {
                    handlers::edit_list_handler(site.clone(), dbpool.clone(), templates.clone(), headers, post_type)
                }
            }),
        )
        .route(
            "/admin/terms/:taxonomy/:id",
            get({
                let site = site.clone();
                let dbpool = dbpool.clone();
                let templates = templates.clone();
                move |Path((taxonomy, id)): Path<(String, i32)>, headers: HeaderMap| {
                    handlers::edit_term_handler(site.clone(), dbpool.clone(), templates.clone(), headers, taxonomy, id)
                }
            })
            .post({
                let site = site.clone();
                let dbpool = dbpool.clone();
                move |Path((taxonomy, id)): Path<(String, i32)>, headers: HeaderMap, body: Bytes| {
                    handlers::update_term_handler(site.clone(), dbpool.clone(), headers, taxonomy, id, body)
                }
            }),
        );

    if let Some(dir) = &config.template_dir {
        app = app.nest_service("/theme", ServeDir::new(FsPath::new(dir).join("static")));
    }

    let app = app.layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!("listening on {}", config.listen_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = BooksSiteConfig::load(&cli.config)?;

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Activate => {
            let dbpool = books_rs::new_dbconn_pool(&config.database_url)?;
            let mut conn = dbpool.get()?;
            activate(&mut conn, &BooksPlugin::new(&config.schema.collation), &config.schema.collation)
        }
        Command::Deactivate => {
            BooksPlugin::new(&config.schema.collation).on_deactivate();
            Ok(())
        }
    }
}
