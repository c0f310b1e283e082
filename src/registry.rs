//! Declarations the admin screens are built from: content types, taxonomies,
//! meta boxes on the edit form and filters over list-screen columns.

use serde::Serialize;

use crate::errors::BootError;

const MAX_POST_TYPE_LEN: usize = 20;
const MAX_TAXONOMY_LEN: usize = 32;

#[derive(Clone, Debug, Default, Serialize)]
pub struct Labels {
    pub name: String,
    pub singular_name: String,
    pub menu_name: String,
    pub add_new: String,
    pub add_new_item: String,
    pub new_item: String,
    pub edit_item: String,
    pub view_item: String,
    pub all_items: String,
    pub search_items: String,
    pub not_found: String,
    pub not_found_in_trash: String,
    pub update_item: String,
    pub new_item_name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Supports {
    Title,
    Editor,
    Author,
    Thumbnail,
    Excerpt,
    Comments,
}

#[derive(Clone, Debug, Serialize)]
pub struct PostTypeArgs {
    pub labels: Labels,
    pub public: bool,
    pub publicly_queryable: bool,
    pub show_ui: bool,
    pub show_in_menu: bool,
    pub query_var: bool,
    pub rewrite_slug: String,
    pub capability_type: String,
    pub has_archive: bool,
    pub hierarchical: bool,
    pub menu_position: u32,
    pub menu_icon: String,
    pub supports: Vec<Supports>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TaxonomyArgs {
    pub labels: Labels,
    pub object_types: Vec<String>,
    pub hierarchical: bool,
    pub show_ui: bool,
    pub show_admin_column: bool,
    pub query_var: bool,
    pub rewrite_slug: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaBoxContext {
    Normal,
    Side,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaBoxPriority {
    High,
    Default,
    Low,
}

#[derive(Clone, Debug, Serialize)]
pub struct MetaBox {
    pub id: String,
    pub title: String,
    pub post_type: String,
    pub context: MetaBoxContext,
    pub priority: MetaBoxPriority,
}

/// A list-screen column as `(key, heading)`.
pub type Column = (String, String);
pub type ColumnFilter = Box<dyn Fn(&mut Vec<Column>) + Send + Sync>;

#[derive(Default)]
pub struct Registry {
    post_types: Vec<(String, PostTypeArgs)>,
    taxonomies: Vec<(String, TaxonomyArgs)>,
    meta_boxes: Vec<MetaBox>,
    column_filters: Vec<(String, ColumnFilter)>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("post_types", &self.post_types)
            .field("taxonomies", &self.taxonomies)
            .field("meta_boxes", &self.meta_boxes)
            .field("column_filters", &self.column_filters.len())
            .finish()
    }
}

fn valid_key(name: &str, max: usize) -> bool {
    !name.is_empty()
        && name.len() <= max
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_post_type(&mut self, name: &str, args: PostTypeArgs) -> Result<(), BootError> {
        if !valid_key(name, MAX_POST_TYPE_LEN) {
            return Err(BootError::InvalidName(name.into()));
        }
        if self.post_type(name).is_some() {
            return Err(BootError::AlreadyRegistered(name.into()));
        }
        self.post_types.push((name.into(), args));
        Ok(())
    }

    pub fn register_taxonomy(&mut self, name: &str, args: TaxonomyArgs) -> Result<(), BootError> {
        if !valid_key(name, MAX_TAXONOMY_LEN) {
            return Err(BootError::InvalidName(name.into()));
        }
        if self.taxonomy(name).is_some() {
            return Err(BootError::AlreadyRegistered(name.into()));
        }
        if let Some(missing) = args.object_types.iter().find(|t| self.post_type(t).is_none()) {
            return Err(BootError::UnknownPostType(missing.clone()));
        }
        self.taxonomies.push((name.into(), args));
        Ok(())
    }

    pub fn add_meta_box(&mut self, meta_box: MetaBox) -> Result<(), BootError> {
        if self.post_type(&meta_box.post_type).is_none() {
            return Err(BootError::UnknownPostType(meta_box.post_type));
        }
        self.meta_boxes.push(meta_box);
        Ok(())
    }

    /// Registers a filter over the default list-screen columns of `post_type`.
    pub fn add_column_filter<F>(&mut self, post_type: &str, filter: F)
    where
        F: Fn(&mut Vec<Column>) + Send + Sync + 'static,
    {
        self.column_filters.push((post_type.into(), Box::new(filter)));
    }

    pub fn post_type(&self, name: &str) -> Option<&PostTypeArgs> {
        self.post_types.iter().find(|(n, _)| n == name).map(|(_, a)| a)
    }

    pub fn taxonomy(&self, name: &str) -> Option<&TaxonomyArgs> {
        self.taxonomies.iter().find(|(n, _)| n == name).map(|(_, a)| a)
    }

    /// Taxonomies attached to `post_type`, in registration order.
    pub fn taxonomies_for(&self, post_type: &str) -> Vec<(&str, &TaxonomyArgs)> {
        self.taxonomies
            .iter()
            .filter(|(_, a)| a.object_types.iter().any(|t| t == post_type))
            .map(|(n, a)| (n.as_str(), a))
            .collect()
    }

    /// Meta boxes for `post_type`, highest priority first.
    pub fn meta_boxes_for(&self, post_type: &str) -> Vec<&MetaBox> {
        let mut boxes: Vec<&MetaBox> = self.meta_boxes.iter().filter(|b| b.post_type == post_type).collect();
        boxes.sort_by_key(|b| b.priority);
        boxes
    }

    /// Columns of the default edit-list screen for `post_type`, after filters.
    pub fn list_columns(&self, post_type: &str) -> Vec<Column> {
        let mut columns: Vec<Column> = vec![
            ("cb".into(), String::new()),
            ("title".into(), "Title".into()),
        ];
        let supports_author = self
            .post_type(post_type)
            .map_or(false, |a| a.supports.contains(&Supports::Author));
        if supports_author {
            columns.push(("author".into(), "Author".into()));
        }
        for (name, tax) in self.taxonomies_for(post_type) {
            if tax.show_admin_column {
                columns.push((format!("taxonomy-{}", name), tax.labels.name.clone()));
            }
        }
        columns.push(("date".into(), "Date".into()));

        for (_, filter) in self.column_filters.iter().filter(|(t, _)| t == post_type) {
            filter(&mut columns);
        }
        columns
    }
}
