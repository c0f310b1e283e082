//! Wiring of the books plugin into the admin host.
//!
//! The host drives the plugin through [`Lifecycle`]: activation once at
//! install time, boot once per process, and the content-save event on every
//! save of a book. Boot never fails the process; anything that goes wrong is
//! kept as a permanent admin notice and logged.

use std::sync::{Arc, RwLock};

use diesel::prelude::*;
use http::{HeaderMap, StatusCode};
use log::{info, warn};
use serde::Serialize;

use crate::auth::{self, Capability, CurrentUser};
use crate::config::{BooksSiteConfig, UserConfig};
use crate::database::{self, SchemaError};
use crate::errors::BootError;
use crate::nonce::NonceIssuer;
use crate::post_types::{self, SaveOutcome, SaveRequest};
use crate::registry::Registry;
use crate::templates::Templates;

pub trait Lifecycle: Send + Sync {
    fn on_activate(&self, conn: &mut SqliteConnection) -> Result<(), SchemaError>;

    fn on_deactivate(&self);

    fn on_boot(&self, registry: &mut Registry, templates: &Templates) -> Result<(), BootError>;

    fn on_admin_menu_load(&self, menu: &mut AdminMenu) -> Result<(), BootError>;

    fn on_content_save(
        &self,
        conn: &mut SqliteConnection,
        nonces: &NonceIssuer,
        user: &CurrentUser,
        post_id: i32,
        req: &SaveRequest,
    ) -> QueryResult<SaveOutcome>;
}

#[derive(Clone, Debug, Serialize)]
pub struct MenuPage {
    pub page_title: String,
    pub menu_title: String,
    #[serde(skip)]
    pub capability: Capability,
    pub slug: String,
    pub path: String,
    pub icon: String,
    pub position: u32,
}

#[derive(Debug, Default)]
pub struct AdminMenu {
    pages: Vec<MenuPage>,
}

impl AdminMenu {
    pub fn add_menu_page(&mut self, page: MenuPage) -> Result<(), BootError> {
        if self.page(&page.slug).is_some() {
            return Err(BootError::MenuSlugTaken(page.slug));
        }
        self.pages.push(page);
        self.pages.sort_by_key(|p| p.position);
        Ok(())
    }

    pub fn page(&self, slug: &str) -> Option<&MenuPage> {
        self.pages.iter().find(|p| p.slug == slug)
    }

    pub fn visible_to(&self, user: &CurrentUser) -> Vec<&MenuPage> {
        self.pages.iter().filter(|p| user.can(p.capability)).collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Error,
    Warning,
    Info,
}

#[derive(Clone, Debug, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

/// Notices shown at the top of every admin page for the life of the process.
#[derive(Debug, Default)]
pub struct AdminNotices {
    notices: RwLock<Vec<Notice>>,
}

impl AdminNotices {
    pub fn permanent(&self, kind: NoticeKind, message: impl Into<String>) {
        if let Ok(mut notices) = self.notices.write() {
            notices.push(Notice { kind, message: message.into() });
        }
    }

    pub fn all(&self) -> Vec<Notice> {
        self.notices.read().map(|n| n.clone()).unwrap_or_default()
    }
}

pub struct BooksPlugin {
    collation: String,
}

impl BooksPlugin {
    pub fn new(collation: &str) -> Self {
        Self { collation: collation.into() }
    }
}

impl Lifecycle for BooksPlugin {
    fn on_activate(&self, conn: &mut SqliteConnection) -> Result<(), SchemaError> {
        let created = database::install_plugin_tables(conn, &self.collation)?;
        info!("books plugin activated, created tables: {:?}", created);
        Ok(())
    }

    fn on_deactivate(&self) {
        info!("books plugin deactivated, nothing to tear down");
    }

    fn on_boot(&self, registry: &mut Registry, templates: &Templates) -> Result<(), BootError> {
        for name in ["books_list.html", "edit_book.html", "isbn_meta_box.html"] {
            if !templates.has_template(name) {
                return Err(BootError::MissingTemplate(name.into()));
            }
        }

        post_types::register_content_type(registry)?;
        post_types::register_taxonomies(registry)?;
        post_types::add_isbn_meta_box(registry)?;

        // The books list has its own screen; the default one drops the post
        // author column.
        registry.add_column_filter(crate::BOOK_POST_TYPE, |columns| {
            columns.retain(|(key, _)| key != "author")
        });
        Ok(())
    }

    fn on_admin_menu_load(&self, menu: &mut AdminMenu) -> Result<(), BootError> {
        menu.add_menu_page(MenuPage {
            page_title: "Books List".into(),
            menu_title: "Books List".into(),
            capability: Capability::ManageOptions,
            slug: crate::BOOKS_LIST_SLUG.into(),
            path: crate::BOOKS_LIST_PATH.into(),
            icon: "dashicons-list-view".into(),
            position: 3,
        })
    }

    fn on_content_save(
        &self,
        conn: &mut SqliteConnection,
        nonces: &NonceIssuer,
        user: &CurrentUser,
        post_id: i32,
        req: &SaveRequest,
    ) -> QueryResult<SaveOutcome> {
        post_types::on_save(conn, nonces, user, post_id, req)
    }
}

/// Everything admin request handlers share once the plugin has booted.
pub struct Site {
    pub plugin: Arc<dyn Lifecycle>,
    pub registry: Registry,
    pub menu: AdminMenu,
    pub notices: AdminNotices,
    pub nonces: NonceIssuer,
    pub users: Vec<UserConfig>,
    pub per_page: u32,
}

impl Site {
    pub fn new(config: &BooksSiteConfig, templates: &Templates) -> Self {
        let plugin: Arc<dyn Lifecycle> = Arc::new(BooksPlugin::new(&config.schema.collation));
        Self::boot(
            plugin,
            templates,
            NonceIssuer::new(&config.nonce_secret),
            config.users.clone(),
            config.admin.per_page,
        )
    }

    /// Boots `plugin`. Failures are reported through admin notices and the
    /// log; the site is returned either way.
    pub fn boot(
        plugin: Arc<dyn Lifecycle>,
        templates: &Templates,
        nonces: NonceIssuer,
        users: Vec<UserConfig>,
        per_page: u32,
    ) -> Self {
        let notices = AdminNotices::default();
        let mut registry = Registry::new();
        let mut menu = AdminMenu::default();

        let report = |e: BootError| {
            notices.permanent(NoticeKind::Error, e.to_string());
            warn!("{}", e);
        };
        if let Err(e) = plugin.on_boot(&mut registry, templates) {
            report(e);
        }
        if let Err(e) = plugin.on_admin_menu_load(&mut menu) {
            report(e);
        }

        Self { plugin, registry, menu, notices, nonces, users, per_page }
    }

    pub fn authenticate(&self, headers: &HeaderMap) -> Result<CurrentUser, StatusCode> {
        auth::current_user(headers, &self.users).ok_or(StatusCode::FORBIDDEN)
    }

    /// Authenticates the request and checks the user may open menu page `slug`.
    pub fn authenticate_for(&self, headers: &HeaderMap, slug: &str) -> Result<CurrentUser, StatusCode> {
        let user = self.authenticate(headers)?;
        let page = self.menu.page(slug).ok_or(StatusCode::NOT_FOUND)?;
        if !user.can(page.capability) {
            return Err(StatusCode::FORBIDDEN);
        }
        Ok(user)
    }

    /// Templates with the admin chrome (menu, notices, user) filled in.
    pub fn admin_templates(&self, templates: &Templates, user: &CurrentUser) -> Templates {
        templates
            .add_context("menu", &self.menu.visible_to(user))
            .add_context("notices", &self.notices.all())
            .add_context("current_user", &user.login)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::auth::Role;

    fn site_with(plugin: Arc<dyn Lifecycle>) -> Site {
        let templates = Templates::builtin(tera::Context::new()).unwrap();
        Site::boot(plugin, &templates, NonceIssuer::new("k"), vec![], 20)
    }

    #[test]
    fn boot_registers_books_menu_and_column_filter() {
        let site = site_with(Arc::new(BooksPlugin::new("BINARY")));
        assert!(site.notices.all().is_empty());
        assert!(site.registry.post_type("book").is_some());
        assert!(site.menu.page("books-list").is_some());

        let keys: Vec<String> = site.registry.list_columns("book").into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["cb", "title", "taxonomy-publisher", "taxonomy-author", "date"]);
    }

    struct BrokenPlugin;

    impl Lifecycle for BrokenPlugin {
        fn on_activate(&self, _: &mut SqliteConnection) -> Result<(), SchemaError> {
            Ok(())
        }
        fn on_deactivate(&self) {}
        fn on_boot(&self, _: &mut Registry, _: &Templates) -> Result<(), BootError> {
            Err(BootError::UnknownPostType("magazine".into()))
        }
        fn on_admin_menu_load(&self, menu: &mut AdminMenu) -> Result<(), BootError> {
            BooksPlugin::new("BINARY").on_admin_menu_load(menu)
        }
        fn on_content_save(
            &self,
            _: &mut SqliteConnection,
            _: &NonceIssuer,
            _: &CurrentUser,
            _: i32,
            _: &SaveRequest,
        ) -> QueryResult<SaveOutcome> {
            Ok(SaveOutcome::NotPermitted)
        }
    }

    #[test]
    fn boot_failures_become_notices() {
        let site = site_with(Arc::new(BrokenPlugin));
        let notices = site.notices.all();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::Error);
        assert_eq!(notices[0].message, "unknown post type 'magazine'");
        // the rest of boot still ran
        assert!(site.menu.page("books-list").is_some());
    }

    #[test]
    fn menu_slugs_are_unique_and_capability_gated() {
        let mut menu = AdminMenu::default();
        let plugin = BooksPlugin::new("BINARY");
        plugin.on_admin_menu_load(&mut menu).unwrap();
        assert!(plugin.on_admin_menu_load(&mut menu).is_err());

        let editor = CurrentUser { id: 2, login: "ed".into(), role: Role::Editor, session_token: "t".into() };
        assert!(menu.visible_to(&editor).is_empty());
        let admin = CurrentUser { id: 1, login: "ad".into(), role: Role::Administrator, session_token: "u".into() };
        assert_eq!(menu.visible_to(&admin).len(), 1);
    }

    #[test]
    fn activation_is_repeatable() {
        let mut conn = SqliteConnection::establish(":memory:").unwrap();
        let plugin = BooksPlugin::new("BINARY");
        plugin.on_activate(&mut conn).unwrap();
        plugin.on_activate(&mut conn).unwrap();
        assert!(database::table_exists(&mut conn, "book_info").unwrap());
    }
}
