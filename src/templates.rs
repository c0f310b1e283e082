use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::ser::Serialize;
use tera::{Context as TeraContext, Tera};

const BUILTIN: &[(&str, &str)] = &[
    ("layout.html", include_str!("../templates/layout.html")),
    ("books_list.html", include_str!("../templates/books_list.html")),
    ("edit_book.html", include_str!("../templates/edit_book.html")),
    ("edit_list.html", include_str!("../templates/edit_list.html")),
    ("edit_term.html", include_str!("../templates/edit_term.html")),
    ("isbn_meta_box.html", include_str!("../templates/isbn_meta_box.html")),
];

#[derive(Clone, Debug)]
pub struct Templates {
    tera: Arc<Tera>,
    ctx: TeraContext,
}

impl Templates {
    pub fn new(tera: Arc<Tera>, base_ctx: TeraContext) -> Self {
        Self { tera, ctx: base_ctx }
    }

    /// Admin templates compiled into the binary.
    pub fn builtin(base_ctx: TeraContext) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(BUILTIN.to_vec())
            .context("built-in templates failed to parse")?;
        Ok(Self::new(Arc::new(tera), base_ctx))
    }

    /// Loads `templates/**/*.html` under `template_dir`, overriding the
    /// built-in templates of the same name.
    pub fn from_dir(template_dir: &Path, base_ctx: TeraContext) -> Result<Self> {
        let pattern = template_dir.join("templates/**/*.html");
        let mut tera = Tera::parse(pattern.to_str().ok_or(anyhow!("non utf-8 template dir"))?)
            .context("failed to load templates")?;
        let overridden: Vec<String> = tera.get_template_names().map(String::from).collect();
        let missing: Vec<(&str, &str)> = BUILTIN
            .iter()
            .filter(|(name, _)| !overridden.iter().any(|o| o == name))
            .copied()
            .collect();
        tera.add_raw_templates(missing)
            .context("built-in templates failed to parse")?;
        Ok(Self::new(Arc::new(tera), base_ctx))
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }

    pub fn add_context<T: Serialize + ?Sized>(&self, key: &str, val: &T) -> Templates {
        let mut new_ctx = self.ctx.clone();
        new_ctx.insert(key, val);

        Templates { tera: self.tera.clone(), ctx: new_ctx }
    }

    pub fn render(&self, template: &str) -> Result<String> {
        self.tera.render(template, &self.ctx)
            .context("tera template rendering failed")
    }
}
