use crate::{Record, Status};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type TextAccessor<R> = Arc<dyn Fn(&R) -> Option<String> + Send + Sync>;
pub type FlagAccessor<R> = Arc<dyn Fn(&R) -> Option<bool> + Send + Sync>;
pub type FilterPredicate<R> = Arc<dyn Fn(&R, &str) -> bool + Send + Sync>;
pub type Classifier<R> = Arc<dyn Fn(&R) -> Status + Send + Sync>;

/// A text-bearing field searched by free-text view queries.
pub struct SearchField<R> {
    pub name: String,
    accessor: TextAccessor<R>,
}

impl<R> SearchField<R> {
    pub fn text(&self, row: &R) -> Option<String> {
        (self.accessor)(row)
    }
}

impl<R> Clone for SearchField<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            accessor: Arc::clone(&self.accessor),
        }
    }
}

/// Declared matcher for one filter key.
pub enum FieldFilter<R> {
    /// Accessor value must equal the filter value exactly.
    Equals(TextAccessor<R>),
    /// Filter value is a boolean spelled as a string.
    Flag(FlagAccessor<R>),
    /// Arbitrary comparison, e.g. against a derived field.
    Custom(FilterPredicate<R>),
}

impl<R> Clone for FieldFilter<R> {
    fn clone(&self) -> Self {
        match self {
            FieldFilter::Equals(f) => FieldFilter::Equals(Arc::clone(f)),
            FieldFilter::Flag(f) => FieldFilter::Flag(Arc::clone(f)),
            FieldFilter::Custom(f) => FieldFilter::Custom(Arc::clone(f)),
        }
    }
}

/// `true/false`, `1/0`, `yes/no`, `on/off`, case insensitive.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl<R> FieldFilter<R> {
    pub fn matches(&self, row: &R, value: &str) -> bool {
        match self {
            FieldFilter::Equals(accessor) => {
                accessor(row).is_some_and(|actual| actual == value.trim())
            }
            FieldFilter::Flag(accessor) => match parse_flag(value) {
                Some(expected) => accessor(row).unwrap_or(false) == expected,
                // an unreadable flag never hides rows
                None => true,
            },
            FieldFilter::Custom(predicate) => predicate(row, value),
        }
    }
}

/// Soft-delete marker wins over the active flag.
pub fn classify_lifecycle(deleted: bool, active: bool) -> Status {
    if deleted {
        Status::Deleted
    } else if active {
        Status::Active
    } else {
        Status::Inactive
    }
}

/// Everything the engine needs to know about one resource's rows: which text
/// fields are searchable, which filter keys exist, and how a row's lifecycle
/// fields map onto a [`Status`].
pub struct ResourceSchema<R> {
    namespace: String,
    search_fields: Vec<SearchField<R>>,
    filters: HashMap<String, FieldFilter<R>>,
    classifier: Classifier<R>,
}

impl<R: Record> ResourceSchema<R> {
    pub fn builder(namespace: impl Into<String>) -> ResourceSchemaBuilder<R> {
        ResourceSchemaBuilder {
            namespace: namespace.into(),
            search_fields: Vec::new(),
            filters: HashMap::new(),
            classifier: Arc::new(|_| Status::Active),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn search_fields(&self) -> &[SearchField<R>] {
        &self.search_fields
    }

    pub fn filter(&self, key: &str) -> Option<&FieldFilter<R>> {
        self.filters.get(key)
    }

    pub fn filter_keys(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(String::as_str)
    }

    pub fn classify(&self, row: &R) -> Status {
        (self.classifier)(row)
    }
}

impl<R> fmt::Debug for ResourceSchema<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.filters.keys().collect();
        keys.sort();
        f.debug_struct("ResourceSchema")
            .field("namespace", &self.namespace)
            .field(
                "search_fields",
                &self.search_fields.iter().map(|s| &s.name).collect::<Vec<_>>(),
            )
            .field("filters", &keys)
            .finish()
    }
}

pub struct ResourceSchemaBuilder<R> {
    namespace: String,
    search_fields: Vec<SearchField<R>>,
    filters: HashMap<String, FieldFilter<R>>,
    classifier: Classifier<R>,
}

impl<R: Record> ResourceSchemaBuilder<R> {
    pub fn search_field<F>(mut self, name: impl Into<String>, accessor: F) -> Self
    where
        F: Fn(&R) -> Option<String> + Send + Sync + 'static,
    {
        self.search_fields.push(SearchField {
            name: name.into(),
            accessor: Arc::new(accessor),
        });
        self
    }

    pub fn filter(mut self, key: impl Into<String>, filter: FieldFilter<R>) -> Self {
        self.filters.insert(key.into(), filter);
        self
    }

    pub fn equals_filter<F>(self, key: impl Into<String>, accessor: F) -> Self
    where
        F: Fn(&R) -> Option<String> + Send + Sync + 'static,
    {
        self.filter(key, FieldFilter::Equals(Arc::new(accessor)))
    }

    pub fn flag_filter<F>(self, key: impl Into<String>, accessor: F) -> Self
    where
        F: Fn(&R) -> Option<bool> + Send + Sync + 'static,
    {
        self.filter(key, FieldFilter::Flag(Arc::new(accessor)))
    }

    pub fn custom_filter<F>(self, key: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&R, &str) -> bool + Send + Sync + 'static,
    {
        self.filter(key, FieldFilter::Custom(Arc::new(predicate)))
    }

    pub fn classifier<F>(mut self, classify: F) -> Self
    where
        F: Fn(&R) -> Status + Send + Sync + 'static,
    {
        self.classifier = Arc::new(classify);
        self
    }

    /// Classify from a soft-delete marker and an active flag.
    pub fn lifecycle<D, A>(self, is_deleted: D, is_active: A) -> Self
    where
        D: Fn(&R) -> bool + Send + Sync + 'static,
        A: Fn(&R) -> bool + Send + Sync + 'static,
    {
        self.classifier(move |row| classify_lifecycle(is_deleted(row), is_active(row)))
    }

    pub fn build(self) -> ResourceSchema<R> {
        ResourceSchema {
            namespace: self.namespace,
            search_fields: self.search_fields,
            filters: self.filters,
            classifier: self.classifier,
        }
    }
}
